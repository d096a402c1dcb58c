use thiserror::Error;

/// Errors raised while decoding frames from the chat socket.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid event: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}
