//! Errors raised by the HTTP client

use hwlive_core::provider::{ErrorKind, ProviderError};
use hwlive_core::resource::ResourceId;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("API error {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid signing key")]
    Signing,

    #[error("invalid header value: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),
}

impl ClientError {
    /// Connection failures, throttling and server errors are worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Http(e) => e.is_connect() || e.is_timeout(),
            ClientError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }

    /// Wrap into a provider error for the given resource
    pub fn into_provider_error(self, action: &str, id: &ResourceId) -> ProviderError {
        let kind = if self.is_not_found() {
            ErrorKind::NotFound
        } else {
            ErrorKind::Other
        };
        ProviderError::new(format!("error {}", action))
            .with_kind(kind)
            .for_resource(id.clone())
            .with_cause(self)
    }
}
