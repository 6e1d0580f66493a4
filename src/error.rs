use std::time::Duration;

use thiserror::Error;

/// Result type for receiver operations
pub type Result<T> = std::result::Result<T, ReceiverError>;

/// Fatal conditions of the receive pipeline
#[derive(Error, Debug)]
pub enum ReceiverError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Socket error: {0}")]
    Socket(#[from] std::io::Error),

    #[error("No datagram received for {0:?}")]
    ReceiveTimeout(Duration),

    #[error("Video sink setup failed: {0}")]
    SinkSetup(#[source] SinkError),

    #[error("Worker failed: {0}")]
    Worker(String),
}

/// Errors reported by media sinks
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Format negotiation failed: {0}")]
    Negotiation(String),
}
