//! Attempt loop over an ordered upstream list
//!
//! Walks the order produced by [`Forward::list`], one upstream at a time,
//! until one answers or the order is exhausted. Socket handling lives
//! behind the [`Upstream`] trait.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use super::Forward;
use crate::error::{ForwardError, Result};
use crate::models::Proxy;

/// Transport used to send one query to one upstream
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Send `query` to `proxy` and return its raw response
    async fn exchange(&self, proxy: &Proxy, query: &[u8]) -> Result<Vec<u8>>;
}

impl Forward {
    /// Forward one query, failing over along the policy's order.
    ///
    /// Upstreams at or above `max_fails` consecutive failures are skipped,
    /// unless every upstream is in that state, in which case the full
    /// order is tried.
    #[instrument(skip(self, upstream, query), fields(policy = self.policy_name()))]
    pub async fn forward<U>(&self, upstream: &U, query: &[u8]) -> Result<Vec<u8>>
    where
        U: Upstream + ?Sized,
    {
        let order = self.list()?;
        let candidates = self.usable(order);

        let mut attempts = 0;
        for proxy in candidates {
            attempts += 1;
            debug!(upstream = %proxy, attempt = attempts, "Forwarding query");

            let attempt = upstream.exchange(&proxy, query);
            let result = match timeout(self.attempt_timeout(), attempt).await {
                Ok(result) => result,
                Err(_) => Err(ForwardError::AttemptTimeout),
            };

            match result {
                Ok(response) => {
                    proxy.mark_healthy();
                    return Ok(response);
                }
                Err(e) => {
                    let fails = proxy.mark_failed();
                    warn!(upstream = %proxy, fails, error = %e, "Upstream attempt failed");
                }
            }
        }

        Err(ForwardError::AllUpstreamsFailed { attempts })
    }

    fn usable(&self, order: Vec<Arc<Proxy>>) -> Vec<Arc<Proxy>> {
        let max_fails = self.max_fails();
        let healthy: Vec<Arc<Proxy>> = order
            .iter()
            .filter(|p| !p.is_down(max_fails))
            .cloned()
            .collect();

        if healthy.is_empty() {
            warn!(
                upstreams = order.len(),
                "All upstreams are marked down, trying all of them"
            );
            return order;
        }
        healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ForwardSettings;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Clone, Copy)]
    enum Behavior {
        Answer,
        Refuse,
        Hang,
    }

    /// Scripted transport that records which upstreams were tried
    struct ScriptedUpstream {
        behavior: HashMap<String, Behavior>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedUpstream {
        fn new(behavior: &[(&str, Behavior)]) -> Self {
            Self {
                behavior: behavior
                    .iter()
                    .map(|(addr, b)| (addr.to_string(), *b))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Upstream for ScriptedUpstream {
        async fn exchange(&self, proxy: &Proxy, query: &[u8]) -> Result<Vec<u8>> {
            self.calls.lock().unwrap().push(proxy.addr().to_string());

            match self.behavior.get(proxy.addr()).copied().unwrap_or(Behavior::Refuse) {
                Behavior::Answer => {
                    let mut response = proxy.addr().as_bytes().to_vec();
                    response.extend_from_slice(query);
                    Ok(response)
                }
                Behavior::Refuse => Err(ForwardError::UpstreamFailed("connection refused".into())),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Err(ForwardError::UpstreamFailed("unreachable".into()))
                }
            }
        }
    }

    fn forward(addrs: &[&str], policy: &str, max_fails: u32) -> Forward {
        let settings = ForwardSettings {
            upstreams: addrs.iter().map(|a| a.to_string()).collect(),
            policy: policy.to_string(),
            max_fails,
            attempt_timeout: Duration::from_millis(50),
            ..ForwardSettings::default()
        };
        Forward::from_config(&settings).unwrap()
    }

    #[tokio::test]
    async fn test_fails_over_to_next_upstream() {
        let f = forward(&["1.1.1.1", "2.2.2.2", "3.3.3.3"], "sequential", 2);
        let upstream = ScriptedUpstream::new(&[
            ("1.1.1.1:53", Behavior::Refuse),
            ("2.2.2.2:53", Behavior::Answer),
        ]);

        let response = f.forward(&upstream, b"q").await.unwrap();

        assert_eq!(response, b"2.2.2.2:53q");
        assert_eq!(upstream.calls(), ["1.1.1.1:53", "2.2.2.2:53"]);
        assert_eq!(f.proxies()[0].fails(), 1);
        assert_eq!(f.proxies()[1].fails(), 0);
        assert_eq!(f.proxies()[2].fails(), 0);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_every_attempt() {
        let f = forward(&["1.1.1.1", "2.2.2.2", "3.3.3.3"], "round_robin", 0);
        let upstream = ScriptedUpstream::new(&[]);

        let err = f.forward(&upstream, b"q").await.unwrap_err();

        assert!(matches!(err, ForwardError::AllUpstreamsFailed { attempts: 3 }));
        assert_eq!(upstream.calls(), ["2.2.2.2:53", "1.1.1.1:53", "3.3.3.3:53"]);
    }

    #[tokio::test]
    async fn test_timeout_moves_to_next_upstream() {
        let f = forward(&["1.1.1.1", "2.2.2.2"], "sequential", 2);
        let upstream = ScriptedUpstream::new(&[
            ("1.1.1.1:53", Behavior::Hang),
            ("2.2.2.2:53", Behavior::Answer),
        ]);

        let response = f.forward(&upstream, b"").await.unwrap();

        assert_eq!(response, b"2.2.2.2:53");
        assert_eq!(f.proxies()[0].fails(), 1);
    }

    #[tokio::test]
    async fn test_down_upstreams_are_skipped() {
        let f = forward(&["1.1.1.1", "2.2.2.2"], "sequential", 1);
        f.proxies()[0].mark_failed();
        let upstream = ScriptedUpstream::new(&[
            ("1.1.1.1:53", Behavior::Answer),
            ("2.2.2.2:53", Behavior::Answer),
        ]);

        let response = f.forward(&upstream, b"").await.unwrap();

        assert_eq!(response, b"2.2.2.2:53");
        assert_eq!(upstream.calls(), ["2.2.2.2:53"]);
    }

    #[tokio::test]
    async fn test_all_down_tries_everything_and_recovers() {
        let f = forward(&["1.1.1.1", "2.2.2.2"], "sequential", 1);
        for proxy in f.proxies() {
            proxy.mark_failed();
        }
        let upstream = ScriptedUpstream::new(&[
            ("1.1.1.1:53", Behavior::Refuse),
            ("2.2.2.2:53", Behavior::Answer),
        ]);

        let response = f.forward(&upstream, b"").await.unwrap();

        assert_eq!(response, b"2.2.2.2:53");
        assert_eq!(upstream.calls(), ["1.1.1.1:53", "2.2.2.2:53"]);
        assert_eq!(f.proxies()[0].fails(), 2);
        assert_eq!(f.proxies()[1].fails(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_queries_spread_over_upstreams() {
        let f = Arc::new(forward(&["1.1.1.1", "2.2.2.2", "3.3.3.3"], "round_robin", 0));
        let upstream: Arc<dyn Upstream> = Arc::new(ScriptedUpstream::new(&[
            ("1.1.1.1:53", Behavior::Answer),
            ("2.2.2.2:53", Behavior::Answer),
            ("3.3.3.3:53", Behavior::Answer),
        ]));

        let mut handles = Vec::new();
        for _ in 0..30 {
            let f = Arc::clone(&f);
            let upstream = Arc::clone(&upstream);
            handles.push(tokio::spawn(async move {
                f.forward(upstream.as_ref(), b"").await.unwrap()
            }));
        }

        let mut counts: HashMap<Vec<u8>, usize> = HashMap::new();
        for handle in handles {
            *counts.entry(handle.await.unwrap()).or_default() += 1;
        }

        assert_eq!(counts.len(), 3);
        assert!(counts.values().all(|&c| c == 10));
    }
}
