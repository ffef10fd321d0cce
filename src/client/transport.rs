//! Capabilities the orchestrator drives but does not implement: local media
//! capture, the real-time transport, rendering, and the relay channel.

use crate::signal::{ClientMessage, ConnectionId, MemberInfo};
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

/// Signals a transport handle reports about its link.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Media can flow
    Connected,
    Disconnected,
    Failed,
    /// A local ICE candidate to send to the remote peer
    LocalCandidate(Value),
    /// Remote media arrived, identified by stream id
    RemoteStream(String),
}

pub type TransportEvents = mpsc::UnboundedSender<TransportEvent>;

/// Opaque negotiation handle for one remote peer.
#[async_trait]
pub trait PeerTransport: Send {
    /// Produce a local offer and apply it as the local description.
    async fn create_offer(&mut self) -> Result<Value>;

    /// Apply a remote offer and produce the local answer.
    async fn accept_offer(&mut self, offer: Value) -> Result<Value>;

    /// Apply the remote answer to a previously created offer.
    async fn accept_answer(&mut self, answer: Value) -> Result<()>;

    async fn add_ice_candidate(&mut self, candidate: Value) -> Result<()>;

    /// Release the handle. Called exactly once per transport.
    async fn close(&mut self);
}

#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Create a transport toward `remote`. Link health and local candidates
    /// are reported through `events`.
    async fn create(
        &self,
        remote: &ConnectionId,
        events: TransportEvents,
    ) -> Result<Box<dyn PeerTransport>>;
}

/// Locally captured media held for the whole session.
pub trait LocalMedia: Send {
    /// Stop capture. Called exactly once.
    fn release(&mut self);
}

#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn LocalMedia>>;
}

/// Outbound channel to the relay.
pub trait SignalSink: Send + Sync {
    fn send(&self, msg: ClientMessage) -> Result<()>;
}

impl SignalSink for mpsc::UnboundedSender<ClientMessage> {
    fn send(&self, msg: ClientMessage) -> Result<()> {
        mpsc::UnboundedSender::send(self, msg)
            .map_err(|_| Error::Signaling("relay channel closed".to_string()))
    }
}

/// Where remote streams get shown.
pub trait RemoteMediaView: Send + Sync {
    fn show(&self, peer: &MemberInfo, stream_id: &str);
    fn remove(&self, peer: &ConnectionId, stream_id: &str);
}

/// View that renders nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullView;

impl RemoteMediaView for NullView {
    fn show(&self, _peer: &MemberInfo, _stream_id: &str) {}
    fn remove(&self, _peer: &ConnectionId, _stream_id: &str) {}
}
