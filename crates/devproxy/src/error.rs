//! Error types for rule compilation and request forwarding.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// A proxy rule that cannot be used. Fatal at start-up.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid proxy prefix {prefix:?}: {reason}")]
    InvalidPrefix { prefix: String, reason: &'static str },

    #[error("proxy prefix {prefix:?} is declared more than once")]
    DuplicatePrefix { prefix: String },

    #[error("invalid target {target:?} for prefix {prefix:?}: {reason}")]
    InvalidTarget {
        prefix: String,
        target: String,
        reason: String,
    },

    #[error("invalid rewrite pattern for prefix {prefix:?}: {source}")]
    InvalidPattern {
        prefix: String,
        #[source]
        source: regex::Error,
    },

    #[error("failed to build HTTP client for prefix {prefix:?}: {source}")]
    Client {
        prefix: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Failure while forwarding a matched request. Never fatal to the server.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("upstream request to {url} failed: {source}")]
    Upstream {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("upstream request to {url} timed out")]
    Timeout { url: String },

    #[error("rewrite of {original:?} produced unusable path {rewritten:?}")]
    InvalidRewrite { original: String, rewritten: String },

    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("failed to read request body: {0}")]
    BodyRead(String),
}

impl ProxyError {
    /// Status returned to the original caller.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Upstream { .. } | ProxyError::InvalidRewrite { .. } => {
                StatusCode::BAD_GATEWAY
            }
            ProxyError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::BodyRead(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Classify a reqwest failure for `url`.
    pub fn from_reqwest(url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            ProxyError::Timeout {
                url: url.to_string(),
            }
        } else {
            ProxyError::Upstream {
                url: url.to_string(),
                source,
            }
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let body = match &self {
            ProxyError::Upstream { .. } => "upstream connection error",
            ProxyError::Timeout { .. } => "upstream timeout",
            ProxyError::InvalidRewrite { .. } => "proxy rewrite produced an invalid path",
            ProxyError::BodyTooLarge { .. } => "request body too large",
            ProxyError::BodyRead(_) => "failed to read request body",
        };
        (self.status(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_statuses() {
        let err = ProxyError::Timeout {
            url: "https://example.com/x".to_string(),
        };
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);

        let err = ProxyError::InvalidRewrite {
            original: "/api/x".to_string(),
            rewritten: "x".to_string(),
        };
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_body_errors_are_client_errors() {
        let err = ProxyError::BodyTooLarge { limit: 16 };
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(err.to_string(), "request body exceeds 16 bytes");
    }
}
