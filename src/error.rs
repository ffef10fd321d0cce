//! Error types shared by the relay server and the client orchestrator

/// Result type alias using the crate [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Room identifier is empty after trimming
    #[error("room identifier must not be empty")]
    EmptyRoomId,

    /// Display name is empty after trimming
    #[error("display name must not be empty")]
    EmptyDisplayName,

    /// Local media or negotiation capability could not be acquired.
    /// Fatal to session start.
    #[error("local capability unavailable: {0}")]
    Capability(String),

    /// Offer/answer/candidate handling failed inside the transport
    #[error("negotiation error: {0}")]
    Negotiation(String),

    /// Signaling channel to the relay is gone
    #[error("signaling error: {0}")]
    Signaling(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
