//! DNS forwarding core
//!
//! This module provides:
//! - The [`Forward`] aggregate that owns the upstream list and its policy
//! - Upstream ordering policies (sequential, random, round-robin)
//! - Parsing of the `forward` directive
//! - The attempt loop that walks an ordering over an [`Upstream`]

pub mod exchange;
pub mod policy;
pub mod setup;

pub use exchange::Upstream;
pub use policy::Policy;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, trace};

use crate::config::{ForwardSettings, DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_MAX_FAILS};
use crate::error::{ForwardError, Result};
use crate::models::Proxy;

/// Upper bound on upstreams per forwarder
pub const MAX_UPSTREAMS: usize = 15;

/// A configured forwarder: upstreams in configured order plus the policy that orders them
///
/// Read-only after construction apart from the policy's own cursor and the
/// per-proxy fail counters, so it can be shared behind an `Arc` without locking.
#[derive(Debug)]
pub struct Forward {
    from: String,
    proxies: Vec<Arc<Proxy>>,
    policy: Policy,
    except: Vec<String>,
    max_fails: u32,
    attempt_timeout: Duration,
}

impl Forward {
    pub fn new(from: &str, proxies: Vec<Proxy>, policy: Policy) -> Result<Self> {
        if proxies.is_empty() {
            return Err(ForwardError::NoUpstreams);
        }
        if proxies.len() > MAX_UPSTREAMS {
            return Err(ForwardError::TooManyUpstreams {
                count: proxies.len(),
                max: MAX_UPSTREAMS,
            });
        }

        Ok(Self {
            from: normalize_zone(from)?,
            proxies: proxies.into_iter().map(Arc::new).collect(),
            policy,
            except: Vec::new(),
            max_fails: DEFAULT_MAX_FAILS,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        })
    }

    /// Build a forwarder from loaded settings, failing on the first bad value
    pub fn from_config(settings: &ForwardSettings) -> Result<Self> {
        let policy = Policy::resolve(&settings.policy)?;
        let proxies = settings
            .upstreams
            .iter()
            .map(|addr| Proxy::parse(addr))
            .collect::<Result<Vec<_>>>()?;

        let forward = Self::new(&settings.from, proxies, policy)?
            .with_max_fails(settings.max_fails)
            .with_except(settings.except.as_slice())?
            .with_attempt_timeout(settings.attempt_timeout);

        info!(
            from = %forward.from,
            policy = forward.policy_name(),
            upstreams = forward.len(),
            "Forwarder configured"
        );
        Ok(forward)
    }

    /// Build a forwarder from a `forward FROM TO... { ... }` directive
    pub fn from_directive(text: &str) -> Result<Self> {
        Self::from_config(&setup::parse_forward(text)?)
    }

    pub fn with_max_fails(mut self, max_fails: u32) -> Self {
        self.max_fails = max_fails;
        self
    }

    pub fn with_except<S: AsRef<str>>(mut self, zones: &[S]) -> Result<Self> {
        self.except = zones
            .iter()
            .map(|z| normalize_zone(z.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(self)
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Attempt order for one query.
    ///
    /// Never empty. Safe to call from any number of tasks at once.
    pub fn list(&self) -> Result<Vec<Arc<Proxy>>> {
        let ordered = self.policy.list(&self.proxies)?;
        trace!(
            policy = self.policy.as_str(),
            primary = %ordered[0],
            "Ordered upstreams"
        );
        Ok(ordered)
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.as_str()
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Upstreams in configured order
    pub fn proxies(&self) -> &[Arc<Proxy>] {
        &self.proxies
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    pub fn from(&self) -> &str {
        &self.from
    }

    pub fn except(&self) -> &[String] {
        &self.except
    }

    pub fn max_fails(&self) -> u32 {
        self.max_fails
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Whether `qname` falls under `from` and outside every `except` zone
    pub fn matches(&self, qname: &str) -> bool {
        let name = match normalize_zone(qname) {
            Ok(n) => n,
            Err(_) => return false,
        };

        is_subdomain(&name, &self.from) && !self.except.iter().any(|z| is_subdomain(&name, z))
    }
}

/// Lowercase, fully-qualified form of a zone or query name
fn normalize_zone(zone: &str) -> Result<String> {
    let zone = zone.trim().to_lowercase();
    if zone.is_empty() || zone.chars().any(char::is_whitespace) {
        return Err(ForwardError::InvalidConfig(format!(
            "invalid zone '{}'",
            zone
        )));
    }

    let trimmed = zone.trim_end_matches('.');
    if trimmed.is_empty() {
        return Ok(".".to_string());
    }
    Ok(format!("{}.", trimmed))
}

fn is_subdomain(name: &str, zone: &str) -> bool {
    zone == "." || name == zone || name.ends_with(&format!(".{}", zone))
}
