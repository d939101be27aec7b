//! Error types for bdl-engine

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Result type for engine capability calls
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Errors raised while building or querying the engine registry
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No installed engine handles {url}")]
    NoMatchingEngine { url: String },

    #[error("Several engines handle {url}: {}", engines.join(", "))]
    AmbiguousEngine { url: String, engines: Vec<String> },

    #[error("Unknown engine: {id}")]
    UnknownEngine { id: String },

    #[error("Engine {id} is already registered")]
    DuplicateEngine { id: String },

    #[error("Invalid pattern {pattern:?} for site {site} of engine {engine}: {message}")]
    InvalidSitePattern {
        engine: String,
        site: String,
        pattern: String,
        message: String,
    },
}

/// Failure reported by an engine while listing or downloading.
///
/// Each variant knows whether retrying can help; see [`EngineError::is_transient`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("network error: {0}")]
    Network(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("invalid content: {0}")]
    Content(String),
}

impl EngineError {
    /// Whether the failure may go away on its own (network hiccup, timeout).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }
}

impl From<std::io::Error> for EngineError {
    fn from(error: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match error.kind() {
            ErrorKind::NotFound => Self::NotFound(error.to_string()),
            ErrorKind::PermissionDenied => Self::PermissionDenied(error.to_string()),
            ErrorKind::TimedOut => Self::Timeout(error.to_string()),
            ErrorKind::InvalidData | ErrorKind::InvalidInput => Self::Content(error.to_string()),
            _ => Self::Network(error.to_string()),
        }
    }
}
