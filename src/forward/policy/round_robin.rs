//! Round-robin policy

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::promote;
use crate::models::Proxy;

/// Rotates the primary across upstreams, one step per query
///
/// Uses a single atomic cursor, so concurrent callers never share a step.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicU64,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self {
            cursor: AtomicU64::new(0),
        }
    }

    /// Number of rotations handed out so far
    pub fn rotations(&self) -> u64 {
        self.cursor.load(Ordering::Relaxed)
    }

    pub(super) fn list(&self, proxies: &[Arc<Proxy>]) -> Vec<Arc<Proxy>> {
        // The cursor advances before it is read, so a fresh selector starts at index 1.
        let step = self.cursor.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        let primary = (step % proxies.len() as u64) as usize;
        promote(proxies, primary)
    }
}
