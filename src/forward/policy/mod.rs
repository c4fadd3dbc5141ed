//! Upstream ordering policies
//!
//! A policy turns the configured upstream list into the order in which a
//! single query should try them. Index 0 is the primary; the rest is the
//! fail-over chain.

mod random;
mod round_robin;
mod sequential;

pub use random::Random;
pub use round_robin::RoundRobin;
pub use sequential::Sequential;

use std::str::FromStr;
use std::sync::Arc;

use crate::error::{ForwardError, Result};
use crate::models::Proxy;

/// Policy names accepted in configuration
pub const POLICY_NAMES: [&str; 3] = ["random", "round_robin", "sequential"];

/// The closed set of ordering policies
#[derive(Debug)]
pub enum Policy {
    Sequential(Sequential),
    Random(Random),
    RoundRobin(RoundRobin),
}

impl Policy {
    /// Map a configuration token to a fresh policy instance.
    ///
    /// Tokens are matched exactly after trimming surrounding whitespace.
    pub fn resolve(name: &str) -> Result<Self> {
        match name.trim() {
            "sequential" => Ok(Self::Sequential(Sequential)),
            "random" => Ok(Self::Random(Random)),
            "round_robin" => Ok(Self::RoundRobin(RoundRobin::new())),
            other => Err(ForwardError::UnknownPolicy(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sequential(_) => "sequential",
            Self::Random(_) => "random",
            Self::RoundRobin(_) => "round_robin",
        }
    }

    /// Order `proxies` for one query.
    ///
    /// Always returns a permutation of the input. An empty input is a
    /// caller bug and yields [`ForwardError::EmptyProxyList`].
    pub fn list(&self, proxies: &[Arc<Proxy>]) -> Result<Vec<Arc<Proxy>>> {
        if proxies.is_empty() {
            return Err(ForwardError::EmptyProxyList);
        }

        let ordered = match self {
            Self::Sequential(p) => p.list(proxies),
            Self::Random(p) => p.list(proxies),
            Self::RoundRobin(p) => p.list(proxies),
        };
        Ok(ordered)
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::Random(Random)
    }
}

impl FromStr for Policy {
    type Err = ForwardError;

    fn from_str(s: &str) -> Result<Self> {
        Self::resolve(s)
    }
}

impl std::fmt::Display for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// `proxies[primary]` first, then every other proxy in configured order.
pub(crate) fn promote(proxies: &[Arc<Proxy>], primary: usize) -> Vec<Arc<Proxy>> {
    let mut ordered = Vec::with_capacity(proxies.len());
    ordered.push(Arc::clone(&proxies[primary]));
    ordered.extend(proxies[..primary].iter().cloned());
    ordered.extend(proxies[primary + 1..].iter().cloned());
    ordered
}
