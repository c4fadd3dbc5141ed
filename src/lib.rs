//! dns-forward - upstream selection for a DNS forwarder
//!
//! Given a configured set of upstream resolvers and a selection policy,
//! produces for every query the order in which upstreams should be tried.
//!
//! ## Features
//!
//! - Three ordering policies: sequential, random, round-robin
//! - Lock-free round-robin rotation shared by concurrent callers
//! - Address normalization with default DNS (53) and DNS-over-TLS (853) ports
//! - `forward FROM TO... { ... }` directive parsing
//! - Fail-over attempt loop with passive failure tracking

pub mod config;
pub mod error;
pub mod forward;
pub mod models;

pub use config::{Config, ForwardSettings};
pub use error::{ForwardError, Result};
pub use forward::{Forward, Policy, Upstream};
pub use models::Proxy;
