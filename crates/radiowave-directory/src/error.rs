use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The mirror could not be reached or the transfer broke off.
    #[error("network error talking to {mirror}: {source}")]
    Network {
        mirror: String,
        #[source]
        source: reqwest::Error,
    },
    /// The mirror answered with a non-success status.
    #[error("{mirror} returned {status}")]
    Service { mirror: String, status: StatusCode },
    /// The body was not the JSON shape the directory documents.
    #[error("unexpected response from {mirror}: {source}")]
    InvalidResponse {
        mirror: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid mirror url '{0}'")]
    InvalidMirror(String),
    #[error("no directory mirrors configured")]
    NoMirrors,
}

impl DirectoryError {
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    pub fn is_service(&self) -> bool {
        matches!(self, Self::Service { .. } | Self::InvalidResponse { .. })
    }
}
