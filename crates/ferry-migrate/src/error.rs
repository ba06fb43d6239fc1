//! Error types for migration operations.

use thiserror::Error;

/// Migration-specific errors.
///
/// Payloads are plain strings so a single failure can be handed to every
/// caller waiting on a deduplicated request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MigrationError {
    /// A required credential was not supplied.
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    /// The remote identity endpoint rejected a credential.
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    /// The remote platform signalled that a credential has expired.
    #[error("Authentication expired: {0}")]
    AuthExpired(String),

    /// Timeout, connection reset or 5xx from the remote platform.
    #[error("Transient network error: {0}")]
    Transient(String),

    /// Malformed item or missing required field.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Remote envelope carried a non-zero code we have no special handling for.
    #[error("Server error {code}: {message}")]
    Server {
        /// Domain error code (or HTTP status for non-envelope failures).
        code: i64,
        /// Message reported by the remote platform.
        message: String,
    },

    /// Response could not be understood at all.
    #[error("Unknown server error: {0}")]
    UnknownServer(String),

    /// A referenced resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The job was cancelled by the caller.
    #[error("Migration cancelled")]
    Cancelled,
}

impl MigrationError {
    /// Whether this error came from a transport-level hiccup.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Whether this error is an auth-expiry signal.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthExpired(_))
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        self.is_transient()
    }

    /// Short machine-friendly category, used in outcome records.
    pub fn category(&self) -> &'static str {
        match self {
            Self::MissingCredential(_) | Self::InvalidCredential(_) => "credential",
            Self::AuthExpired(_) => "auth_expired",
            Self::Transient(_) => "transient",
            Self::Validation(_) => "validation",
            Self::Server { .. } => "server",
            Self::UnknownServer(_) => "unknown_server",
            Self::NotFound(_) => "not_found",
            Self::InvalidConfig(_) => "config",
            Self::Cancelled => "cancelled",
        }
    }
}

impl From<reqwest::Error> for MigrationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            Self::InvalidConfig(err.to_string())
        } else if err.is_decode() {
            Self::UnknownServer(err.to_string())
        } else {
            Self::Transient(err.to_string())
        }
    }
}

impl From<serde_json::Error> for MigrationError {
    fn from(err: serde_json::Error) -> Self {
        Self::UnknownServer(format!("invalid JSON: {err}"))
    }
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(MigrationError::Transient("reset".into()).is_retryable());
        assert!(!MigrationError::Validation("no name".into()).is_retryable());
        assert!(!MigrationError::AuthExpired("401".into()).is_retryable());
        assert!(!MigrationError::Server {
            code: 500,
            message: "boom".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_categories() {
        assert_eq!(MigrationError::Cancelled.category(), "cancelled");
        assert_eq!(
            MigrationError::AuthExpired("x".into()).category(),
            "auth_expired"
        );
    }
}
