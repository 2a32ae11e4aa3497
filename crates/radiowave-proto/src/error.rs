use thiserror::Error;

/// Local key-value storage failed.
///
/// Never fatal: stores fall back to their empty / default value on load and
/// report write failures to the caller.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage i/o error for key '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed value for key '{key}': {source}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}
