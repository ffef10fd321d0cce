//! Signaling relay and peer connection orchestration for full-mesh
//! browser video rooms.
//!
//! The server side ([`relay`], [`room`], [`server`]) tracks room membership
//! and routes opaque negotiation payloads between connections. The client
//! side ([`client`]) decides which peer of each pair initiates and drives
//! one negotiation state machine per remote member.

pub mod app_state;
pub mod client;
pub mod config;
pub mod error;
pub mod relay;
pub mod room;
pub mod server;
pub mod signal;

pub use app_state::AppState;
pub use config::Config;
pub use error::{Error, Result};
pub use relay::Relay;
pub use room::RoomRegistry;
pub use signal::{ClientMessage, ConnectionId, MemberInfo, ServerMessage};
