//! Error types for bdl-cli

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// Errors that can occur in CLI operations
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Error from bdl-core
    #[error(transparent)]
    Core(#[from] bdl_core::Error),

    /// Error from the engine registry
    #[error(transparent)]
    Engine(#[from] bdl_engine::Error),

    /// Error from bdl-fs
    #[error(transparent)]
    Fs(#[from] bdl_fs::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON output error
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Some of the targeted repositories did not sync cleanly
    #[error("{failed} of {total} repositories failed")]
    Failed { failed: usize, total: usize },

    /// User-facing error with a message
    #[error("{message}")]
    User { message: String },
}

impl CliError {
    /// Create a new user error with the given message
    pub fn user(message: impl Into<String>) -> Self {
        Self::User {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_message() {
        let err = CliError::Failed {
            failed: 1,
            total: 3,
        };
        assert_eq!(err.to_string(), "1 of 3 repositories failed");
    }

    #[test]
    fn test_core_error_is_transparent() {
        let err: CliError = bdl_core::Error::RepositoryLocked {
            name: "gallery".into(),
        }
        .into();
        assert!(err.to_string().contains("gallery"));
    }
}
