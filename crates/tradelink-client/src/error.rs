//! Client error types.

use thiserror::Error;

/// Client error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Request exceeded its deadline and was aborted.
    #[error("Request timeout")]
    Timeout,

    /// Transport-level failure (DNS, connection refused, TLS).
    #[error("Network error. Please check your connection.")]
    Network(String),

    /// Other HTTP plumbing failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Server returned a non-2xx response.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Server-supplied `message` or `error` field, or `HTTP <status>`.
        message: String,
        /// Parsed JSON body, or the raw text wrapped in a string.
        body: Option<serde_json::Value>,
    },

    /// Login/signup/refresh rejected; the message is suitable for direct
    /// display in a form.
    #[error("{0}")]
    Auth(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Check if this is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout)
    }

    /// Check if this is a transport failure.
    pub fn is_network_error(&self) -> bool {
        matches!(self, Error::Network(_))
    }

    /// Check if this is an authentication error.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Error::Auth(_)) || matches!(self, Error::Api { status: 401, .. })
    }

    /// Check if this is a server-side error.
    pub fn is_server_error(&self) -> bool {
        matches!(self, Error::Api { status, .. } if *status >= 500)
    }

    /// The HTTP status code, for API errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;
