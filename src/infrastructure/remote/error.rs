use thiserror::Error;

/// Errors that can occur talking to the remote optimization service.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("failed to connect to optimization server at {address}: {source}")]
    Connect {
        address: String,
        source: std::io::Error,
    },

    #[error("socket i/o failed: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("no reply after {attempts} attempts of {wait_ms} ms each")]
    Timeout { attempts: usize, wait_ms: u64 },

    #[error("optimization server raised: {0}")]
    ServerException(String),

    #[error("connection closed by the optimization server")]
    Closed,

    #[error("message serialization failed: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    #[error("malformed frame: {0}")]
    BadFrame(String),
}

/// Result type alias for remote operations.
pub type Result<T> = std::result::Result<T, RemoteError>;
