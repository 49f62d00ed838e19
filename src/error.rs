//! Error types for tracehop.
//!
//! [`TracehopError`] covers startup failures (bad configuration, bind
//! errors) and is the only error that reaches `main`. [`ForwardError`]
//! covers everything that can go wrong while proxying a single request;
//! it is always recovered locally and turned into an HTTP response or a
//! log line, never into a process exit.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TracehopError {
    #[error("Invalid target URL '{url}': {reason}\n\n  {hint}")]
    InvalidTarget {
        url: String,
        reason: String,
        hint: &'static str,
    },

    #[error("Invalid address: {0}")]
    AddressParse(#[from] std::net::AddrParseError),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ForwardError {
    #[error("unsupported protocol scheme {scheme}")]
    UnsupportedScheme { scheme: String },

    #[error("could not build upstream URI: {reason}")]
    InvalidUpstreamUri { reason: String },

    #[error("upstream unreachable: {source}")]
    UpstreamUnreachable {
        #[source]
        source: BoxError,
    },

    #[error("upstream did not respond within {timeout_ms} ms")]
    UpstreamTimeout { timeout_ms: u128 },

    #[error("upstream request failed: {source}")]
    Upstream {
        #[source]
        source: BoxError,
    },

    #[error("failed to read request body: {source}")]
    BodyRead {
        #[source]
        source: BoxError,
    },

    #[error("failed to copy response body: {source}")]
    ResponseCopy {
        #[source]
        source: BoxError,
    },

    #[error("upstream response body stalled for more than {timeout_ms} ms")]
    BodyStalled { timeout_ms: u128 },
}

impl ForwardError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::UnsupportedScheme { .. } | Self::BodyRead { .. } => StatusCode::BAD_REQUEST,
            Self::InvalidUpstreamUri { .. }
            | Self::UpstreamUnreachable { .. }
            | Self::UpstreamTimeout { .. }
            | Self::Upstream { .. }
            | Self::ResponseCopy { .. }
            | Self::BodyStalled { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Body text handed to the caller. Upstream details stay in the logs.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            Self::UnsupportedScheme { .. } => self.to_string(),
            Self::BodyRead { .. } => "Bad Request".to_string(),
            _ => "Server Error".to_string(),
        }
    }
}

impl IntoResponse for ForwardError {
    fn into_response(self) -> Response {
        (self.status(), self.client_message()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_scheme_message_names_the_scheme() {
        let err = ForwardError::UnsupportedScheme {
            scheme: "ftp".into(),
        };
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.client_message(), "unsupported protocol scheme ftp");
    }

    #[test]
    fn upstream_failures_hide_details_from_caller() {
        let err = ForwardError::UpstreamUnreachable {
            source: "connection refused".into(),
        };
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.client_message(), "Server Error");
        assert!(err.to_string().contains("connection refused"));

        let err = ForwardError::UpstreamTimeout { timeout_ms: 250 };
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.client_message(), "Server Error");
    }

    #[test]
    fn body_read_failure_is_a_client_error() {
        let err = ForwardError::BodyRead {
            source: "reset".into(),
        };
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.client_message(), "Bad Request");
    }

    #[test]
    fn invalid_target_includes_hint() {
        let err = TracehopError::InvalidTarget {
            url: "ftp://x".into(),
            reason: "scheme must be http or https".into(),
            hint: "Example: --target http://localhost:9000",
        };
        let msg = err.to_string();
        assert!(msg.contains("ftp://x"));
        assert!(msg.contains("--target http://localhost:9000"));
    }
}
