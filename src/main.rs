//! dns-forward - Entry Point
//!
//! Validates the forwarder configuration and prints the upstream attempt
//! order for the next few queries.

use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dns_forward::config::LogConfig;
use dns_forward::{Config, Forward, Result};

/// One previewed query
#[derive(Serialize)]
struct AttemptOrder<'a> {
    query: u32,
    policy: &'a str,
    order: Vec<String>,
}

fn main() -> Result<()> {
    init_tracing(&LogConfig::from_env());

    info!("Starting dns-forward");

    let config = Config::from_env().inspect_err(|e| error!("Configuration error: {}", e))?;
    let forward = Forward::from_config(&config.forward)
        .inspect_err(|e| error!("Refusing to start forwarder: {}", e))?;

    info!(
        "Using policy {} over {} upstreams: {}",
        forward.policy_name(),
        forward.len(),
        forward
            .proxies()
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );

    for query in 1..=config.preview {
        let preview = AttemptOrder {
            query,
            policy: forward.policy_name(),
            order: forward.list()?.iter().map(|p| p.to_string()).collect(),
        };
        println!("{}", serde_json::to_string(&preview)?);
    }

    Ok(())
}

/// Initialize tracing; `RUST_LOG` wins over `LOG_LEVEL`
fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("dns_forward={}", log.level).into());
    let registry = tracing_subscriber::registry().with(filter);

    if log.format.eq_ignore_ascii_case("json") {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
