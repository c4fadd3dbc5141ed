//! Sequential policy: configured order, every time

use std::sync::Arc;

use crate::models::Proxy;

/// Always tries upstreams in the order they were configured
#[derive(Debug, Clone, Copy, Default)]
pub struct Sequential;

impl Sequential {
    pub(super) fn list(&self, proxies: &[Arc<Proxy>]) -> Vec<Arc<Proxy>> {
        proxies.to_vec()
    }
}
