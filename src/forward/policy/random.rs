//! Random policy

use rand::Rng;
use std::sync::Arc;

use super::promote;
use crate::models::Proxy;

/// Picks a uniformly random primary per query.
///
/// Only the primary is random. The fail-over tail keeps configured order,
/// so two queries that draw the same primary agree on what comes next.
#[derive(Debug, Clone, Copy, Default)]
pub struct Random;

impl Random {
    pub(super) fn list(&self, proxies: &[Arc<Proxy>]) -> Vec<Arc<Proxy>> {
        if proxies.len() == 1 {
            return proxies.to_vec();
        }

        let primary = rand::thread_rng().gen_range(0..proxies.len());
        promote(proxies, primary)
    }
}
