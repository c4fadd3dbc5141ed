use thiserror::Error;

/// Unified error type for the forwarder
#[derive(Error, Debug)]
pub enum ForwardError {
    // Configuration errors
    #[error("unknown policy '{0}'")]
    UnknownPolicy(String),

    #[error("invalid upstream address: {0}")]
    InvalidAddress(String),

    #[error("no upstreams configured")]
    NoUpstreams,

    #[error("more than {max} upstreams configured: {count}")]
    TooManyUpstreams { count: usize, max: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // Invariant violations
    #[error("invariant violation: no proxies to order")]
    EmptyProxyList,

    // Attempt errors
    #[error("upstream failed: {0}")]
    UpstreamFailed(String),

    #[error("upstream attempt timed out")]
    AttemptTimeout,

    #[error("all upstreams failed after {attempts} attempts")]
    AllUpstreamsFailed { attempts: usize },

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for forwarder operations
pub type Result<T> = std::result::Result<T, ForwardError>;

impl ForwardError {
    /// Errors that must abort startup
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            ForwardError::UnknownPolicy(_)
                | ForwardError::InvalidAddress(_)
                | ForwardError::NoUpstreams
                | ForwardError::TooManyUpstreams { .. }
                | ForwardError::InvalidConfig(_)
        )
    }

    /// Errors that indicate a caller broke a precondition
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, ForwardError::EmptyProxyList)
    }

    /// Errors scoped to a single upstream attempt; the attempt loop moves on
    pub fn is_attempt_error(&self) -> bool {
        matches!(
            self,
            ForwardError::UpstreamFailed(_) | ForwardError::AttemptTimeout | ForwardError::Io(_)
        )
    }
}

// Convert from URL parse errors
impl From<url::ParseError> for ForwardError {
    fn from(err: url::ParseError) -> Self {
        ForwardError::InvalidAddress(err.to_string())
    }
}
