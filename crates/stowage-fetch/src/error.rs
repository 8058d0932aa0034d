//! Error types for the bundle fetcher.

use stowage_store::StoreError;

/// Fetch errors.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Transport failure, timeout, non-success status or broken body.
    #[error("network error: {message}")]
    Network {
        message: String,
        status: Option<u16>,
    },

    /// URI could not be parsed or uses an unsupported scheme.
    #[error("invalid URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Aborted through the cancellation token.
    #[error("fetch cancelled")]
    Cancelled,

    /// Extraction into the storage root failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The blocking extraction task did not complete.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl FetchError {
    pub(crate) fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            status: None,
        }
    }

    /// Whether the failure happened on the wire.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// HTTP status for non-success responses.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Network { status, .. } => *status,
            _ => None,
        }
    }

    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidUri { .. } | Self::Config { .. } => 1,
            Self::Network { .. } => 5,
            Self::Cancelled => 130,
            Self::Store(err) => err.exit_code(),
            Self::Internal { .. } => 1,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network {
            message: err.to_string(),
            status: err.status().map(|s| s.as_u16()),
        }
    }
}

/// Result type for fetch operations.
pub type FetchResult<T> = Result<T, FetchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(FetchError::network("reset").exit_code(), 5);
        assert_eq!(FetchError::Cancelled.exit_code(), 130);
        assert_eq!(
            FetchError::InvalidUri {
                uri: "x".into(),
                reason: "no scheme".into()
            }
            .exit_code(),
            1
        );
        let store = FetchError::from(StoreError::Cancelled);
        assert_eq!(store.exit_code(), StoreError::Cancelled.exit_code());
    }

    #[test]
    fn test_status_only_for_network() {
        let err = FetchError::Network {
            message: "HTTP 404".into(),
            status: Some(404),
        };
        assert!(err.is_network());
        assert_eq!(err.status(), Some(404));
        assert_eq!(FetchError::Cancelled.status(), None);
    }
}
