//! Client-side peer connection orchestration

pub mod link;
pub mod orchestrator;
pub mod peer;
pub mod session;
pub mod transport;

pub use orchestrator::Orchestrator;
pub use peer::{CloseReason, LinkStatus, NegotiationState, PeerLink, Role};
pub use session::{Session, SessionConfig};
pub use transport::{
    LocalMedia, MediaSource, NullView, PeerTransport, RemoteMediaView, SignalSink,
    TransportEvent, TransportEvents, TransportFactory,
};
