//! Error types for the streaming API client.

use thiserror::Error;

/// Errors returned by [`StreamApiClient`](super::StreamApiClient).
#[derive(Debug, Error)]
pub enum ApiError {
    /// No API key is configured; nothing was sent.
    #[error("API key not set. Configure it with `subcast config set-key <KEY>`")]
    MissingApiKey,

    /// Network-level failure (DNS, connection refused, reset, ...).
    #[error("Request to {endpoint} failed: {source}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The body could not be decoded into the expected shape.
    #[error("Malformed response from {endpoint}: {reason}")]
    Malformed {
        endpoint: &'static str,
        reason: String,
    },

    /// `GET /files` returned an empty or missing list.
    #[error("No files found in torrent response")]
    NoFiles,
}

impl ApiError {
    pub(crate) fn transport(endpoint: &'static str, source: reqwest::Error) -> Self {
        ApiError::Transport { endpoint, source }
    }

    pub(crate) fn malformed(endpoint: &'static str, reason: impl ToString) -> Self {
        ApiError::Malformed {
            endpoint,
            reason: reason.to_string(),
        }
    }

    /// True for failures of the network or HTTP layer rather than the payload
    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Transport { .. } | ApiError::Status { .. })
    }
}
