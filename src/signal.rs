use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Identifier the relay assigns to one live WebSocket connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for log lines.
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Public view of a room member as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberInfo {
    pub id: ConnectionId,
    pub display_name: String,
    pub avatar: String,
}

/// Frames sent by a client to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        room_id: String,
        display_name: String,
        avatar: String,
    },
    Offer {
        sdp: Value,
        to: ConnectionId,
    },
    Answer {
        sdp: Value,
        to: ConnectionId,
    },
    IceCandidate {
        candidate: Value,
        to: ConnectionId,
    },
    LeaveRoom,
}

/// Frames sent by the relay to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// First frame on every connection: the id the relay assigned.
    Connected { id: ConnectionId },
    /// Roster of the room before the receiver was inserted, in join order.
    ExistingUsers { users: Vec<MemberInfo> },
    UserJoined(MemberInfo),
    UserLeft { id: ConnectionId },
    #[serde(rename_all = "camelCase")]
    Offer {
        sdp: Value,
        from: ConnectionId,
        display_name: String,
        avatar: String,
    },
    Answer {
        sdp: Value,
        from: ConnectionId,
    },
    IceCandidate {
        candidate: Value,
        from: ConnectionId,
    },
    /// A relayed message could not be delivered. Only emitted when the
    /// server runs with unreachable notifications enabled.
    PeerUnavailable { to: ConnectionId },
    Error { message: String },
}

impl ServerMessage {
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
