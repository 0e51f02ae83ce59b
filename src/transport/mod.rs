//! Anonymized network sessions
//!
//! This module contains everything that touches the wire on behalf of a worker:
//! - `AnonymizingTransport`: one isolated session (client, cookies, token)
//! - `IdentityProvider`: the anonymization circuit behind a transport
//! - Anti-forgery token extraction from the session handshake page

mod handshake;
mod identity;
mod session;

pub use handshake::extract_csrf_token;
pub use identity::{DirectIdentity, IdentityProvider, TorControl};
pub use session::{AnonymizingTransport, TransportSettings};

use thiserror::Error;

/// Failures of a transport or its anonymization provider
///
/// These are fatal to the worker owning the transport; retrying is the
/// caller's business.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Session handshake with {url} failed: {source}")]
    Handshake { url: String, source: reqwest::Error },

    #[error("Session handshake with {url} returned HTTP {status}")]
    HandshakeStatus { url: String, status: u16 },

    #[error("Transport has no live session")]
    NoSession,

    #[error("Anonymization provider unreachable: {0}")]
    Provider(#[from] std::io::Error),

    #[error("Anonymization provider refused request: {0}")]
    ProviderRejected(String),

    #[error("Invalid target URL: {0}")]
    InvalidUrl(String),
}

/// Failures of a single request sent through a transport
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network error for {url}: {source}")]
    Network { url: String, source: reqwest::Error },

    #[error("Malformed JSON from {url} (HTTP {status}): {source}")]
    MalformedJson {
        url: String,
        status: u16,
        source: serde_json::Error,
    },

    #[error("Response from {url} (HTTP {status}) does not match the search schema: {source}")]
    SchemaMismatch {
        url: String,
        status: u16,
        source: serde_json::Error,
    },

    #[error("Soft block on page {page}: {message} (code {code})")]
    SoftBlock {
        page: u32,
        message: String,
        code: i64,
    },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl FetchError {
    /// Split a decode failure: truncated or garbled bodies are `MalformedJson`,
    /// well-formed JSON of the wrong shape is `SchemaMismatch`.
    pub(crate) fn from_decode(url: &str, status: u16, source: serde_json::Error) -> Self {
        use serde_json::error::Category;

        let url = url.to_string();
        match source.classify() {
            Category::Data => Self::SchemaMismatch { url, status, source },
            Category::Syntax | Category::Eof | Category::Io => Self::MalformedJson { url, status, source },
        }
    }

    /// Stable name of the error kind, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network { .. } | Self::MalformedJson { .. } | Self::SoftBlock { .. } => {
                "transient-network"
            }
            Self::SchemaMismatch { .. } => "schema-mismatch",
            Self::Status { .. } => "http-status",
            Self::Transport(_) => "transport-fatal",
        }
    }
}
