//! Error types for the relay crate.

use crate::envelope::RelayResponse;
use crate::selection::SelectionError;
use hopgate_core::ConfigError;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while relaying a query.
///
/// None of these escape a single connection: the server turns each one into
/// an `{"error": ...}` envelope for the caller.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Failed to bind to the listen address.
    #[error("failed to bind to {address}: {source}")]
    BindFailed {
        address: String,
        source: std::io::Error,
    },

    /// The presented token did not match.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Connect, accept, send or receive failed.
    #[error("{context}: {source}")]
    Transport {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Payload was not valid UTF-8 or not valid JSON.
    #[error("decode error: {0}")]
    Decode(String),

    /// Request did not follow the framing rules.
    #[error("malformed request: {0}")]
    Malformed(String),

    /// No backend could be chosen.
    #[error(transparent)]
    Selection(#[from] SelectionError),

    /// The backend rejected or failed the query. Carries the message only.
    #[error("{0}")]
    Execution(String),

    /// An operation did not finish in time.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// TLS setup or handshake failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl RelayError {
    pub(crate) fn transport(context: impl Into<String>, source: std::io::Error) -> Self {
        RelayError::Transport {
            context: context.into(),
            source,
        }
    }

    /// Error envelope sent back to the caller.
    pub fn into_response(self) -> RelayResponse {
        RelayResponse::error(self.to_string())
    }
}

impl From<RelayError> for RelayResponse {
    fn from(err: RelayError) -> Self {
        err.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_error_is_verbatim() {
        let err = RelayError::Execution("Table 'sakila.nope' doesn't exist".to_string());
        assert_eq!(
            err.into_response(),
            RelayResponse::error("Table 'sakila.nope' doesn't exist")
        );
    }

    #[test]
    fn test_transport_error_keeps_context() {
        let err = RelayError::transport(
            "failed to connect to 10.0.0.1:5000",
            std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
        );
        assert!(err.to_string().starts_with("failed to connect to 10.0.0.1:5000: "));
    }
}
