use crate::error::{ForwardError, Result};
use crate::forward::setup;
use std::env;
use std::time::Duration;

/// Default consecutive failures before an upstream is skipped
pub const DEFAULT_MAX_FAILS: u32 = 2;

/// Default deadline for a single upstream attempt
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(2000);

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Forwarder configuration
    pub forward: ForwardSettings,
    /// Number of attempt orders the binary prints
    pub preview: u32,
    /// Logging configuration
    pub log: LogConfig,
}

/// Everything needed to build a [`crate::Forward`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardSettings {
    /// Zone the forwarder handles (default: ".")
    pub from: String,
    /// Upstream addresses, in configured order
    pub upstreams: Vec<String>,
    /// Policy token (sequential, random, round_robin)
    pub policy: String,
    /// Consecutive failures after which an upstream is considered down (0 = never)
    pub max_fails: u32,
    /// Sub-zones that are not forwarded
    pub except: Vec<String>,
    /// Deadline for a single upstream attempt
    pub attempt_timeout: Duration,
}

impl Default for ForwardSettings {
    fn default() -> Self {
        Self {
            from: ".".to_string(),
            upstreams: Vec::new(),
            policy: "random".to_string(),
            max_fails: DEFAULT_MAX_FAILS,
            except: Vec::new(),
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let attempt_timeout_ms: u64 = get_env_or("FORWARD_ATTEMPT_TIMEOUT_MS", "2000")
            .parse()
            .map_err(|_| {
                ForwardError::InvalidConfig(
                    "FORWARD_ATTEMPT_TIMEOUT_MS must be a valid number".into(),
                )
            })?;
        if attempt_timeout_ms == 0 {
            return Err(ForwardError::InvalidConfig(
                "FORWARD_ATTEMPT_TIMEOUT_MS must be greater than zero".into(),
            ));
        }

        let forward = match env::var("FORWARD_CONFIG") {
            Ok(path) if !path.trim().is_empty() => {
                let path = path.trim();
                let text = std::fs::read_to_string(path).map_err(|e| {
                    ForwardError::InvalidConfig(format!(
                        "FORWARD_CONFIG '{}' could not be read: {}",
                        path, e
                    ))
                })?;
                let mut settings = setup::parse_forward(&text)?;
                settings.attempt_timeout = Duration::from_millis(attempt_timeout_ms);
                settings
            }
            _ => ForwardSettings {
                from: get_env_or("FORWARD_FROM", "."),
                upstreams: split_list(&get_env_or("FORWARD_UPSTREAMS", "")),
                policy: get_env_or("FORWARD_POLICY", "random"),
                max_fails: get_env_or("FORWARD_MAX_FAILS", "2").parse().map_err(|_| {
                    ForwardError::InvalidConfig("FORWARD_MAX_FAILS must be a valid number".into())
                })?,
                except: split_list(&get_env_or("FORWARD_EXCEPT", "")),
                attempt_timeout: Duration::from_millis(attempt_timeout_ms),
            },
        };

        Ok(Config {
            forward,
            preview: get_env_or("FORWARD_PREVIEW", "1").parse().map_err(|_| {
                ForwardError::InvalidConfig("FORWARD_PREVIEW must be a valid number".into())
            })?,
            log: LogConfig::from_env(),
        })
    }
}

impl LogConfig {
    /// Logging settings alone, so tracing can start before the rest is validated
    pub fn from_env() -> Self {
        Self {
            level: get_env_or("LOG_LEVEL", "info"),
            format: get_env_or("LOG_FORMAT", "pretty"),
        }
    }
}

/// Split a comma and/or whitespace separated list, dropping empty items
fn split_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
