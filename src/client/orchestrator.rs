//! Peer connection orchestrator
//!
//! Keeps one link per known remote member and assigns roles by join order:
//! members in our own roster were there first, so we initiate toward them;
//! members announced later will initiate toward us. Each unordered pair
//! therefore has exactly one initiator and offers never cross.

use super::link::{LinkContext, LinkHandle, LinkInput};
use super::peer::{CloseReason, LinkStatus, PeerLink, Role};
use super::transport::{LocalMedia, RemoteMediaView, SignalSink, TransportFactory};
use crate::signal::{ClientMessage, ConnectionId, MemberInfo, ServerMessage};
use crate::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct Orchestrator {
    local_id: Option<ConnectionId>,
    media: Option<Box<dyn LocalMedia>>,
    ctx: LinkContext,
    links: HashMap<ConnectionId, LinkHandle>,
    exits: mpsc::UnboundedReceiver<ConnectionId>,
    // Link tasks cancelled by `leave_all` that may still be closing
    closing: Vec<JoinHandle<()>>,
    left: bool,
}

impl Orchestrator {
    pub fn new(
        media: Box<dyn LocalMedia>,
        factory: Arc<dyn TransportFactory>,
        signal: Arc<dyn SignalSink>,
        view: Arc<dyn RemoteMediaView>,
    ) -> Self {
        let (exits_tx, exits) = mpsc::unbounded_channel();
        Self {
            local_id: None,
            media: Some(media),
            ctx: LinkContext {
                factory,
                signal,
                view,
                exits: exits_tx,
            },
            links: HashMap::new(),
            exits,
            closing: Vec::new(),
            left: false,
        }
    }

    pub fn local_id(&self) -> Option<&ConnectionId> {
        self.local_id.as_ref()
    }

    pub fn set_local_id(&mut self, id: ConnectionId) {
        self.local_id = Some(id);
    }

    pub fn has_left(&self) -> bool {
        self.left
    }

    /// Ask the relay to admit us to `room_id`.
    pub fn join(&mut self, room_id: &str, display_name: &str, avatar: &str) -> Result<()> {
        self.ctx.signal.send(ClientMessage::JoinRoom {
            room_id: room_id.to_string(),
            display_name: display_name.to_string(),
            avatar: avatar.to_string(),
        })
    }

    /// Our own join response: everyone listed was here first.
    pub fn on_roster_received(&mut self, members: Vec<MemberInfo>) {
        info!("Room roster: {} existing members", members.len());
        for member in members {
            self.open_link(member, Role::Initiator);
        }
    }

    /// Someone joined after us and will send the offer.
    pub fn on_member_joined(&mut self, member: MemberInfo) {
        info!("{} joined", member.display_name);
        self.open_link(member, Role::Responder);
    }

    pub fn on_member_left(&mut self, id: &ConnectionId) {
        match self.links.remove(id) {
            Some(mut handle) => {
                info!("{} left", id.short());
                handle.close(CloseReason::Departed);
            }
            None => debug!("Departure of unknown member {}", id.short()),
        }
    }

    pub fn on_inbound_offer(&mut self, from: &ConnectionId, sdp: Value) {
        self.route(from, LinkInput::Offer(sdp));
    }

    pub fn on_inbound_answer(&mut self, from: &ConnectionId, sdp: Value) {
        self.route(from, LinkInput::Answer(sdp));
    }

    pub fn on_inbound_ice_candidate(&mut self, from: &ConnectionId, candidate: Value) {
        self.route(from, LinkInput::IceCandidate(candidate));
    }

    pub fn handle_server_message(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::Connected { id } => self.set_local_id(id),
            ServerMessage::ExistingUsers { users } => self.on_roster_received(users),
            ServerMessage::UserJoined(member) => self.on_member_joined(member),
            ServerMessage::UserLeft { id } => self.on_member_left(&id),
            ServerMessage::Offer { sdp, from, .. } => self.on_inbound_offer(&from, sdp),
            ServerMessage::Answer { sdp, from } => self.on_inbound_answer(&from, sdp),
            ServerMessage::IceCandidate { candidate, from } => {
                self.on_inbound_ice_candidate(&from, candidate)
            }
            ServerMessage::PeerUnavailable { to } => {
                debug!("Relay could not reach {}", to.short())
            }
            ServerMessage::Error { message } => warn!("Relay error: {}", message),
        }
    }

    /// Tear down every link, tell the relay we are leaving and release local
    /// media. Only the first call has any effect.
    pub fn leave_all(&mut self) {
        if self.left {
            return;
        }
        self.left = true;

        for (_, handle) in self.links.drain() {
            self.closing.push(handle.shut_down(CloseReason::SessionEnded));
        }
        if let Err(e) = self.ctx.signal.send(ClientMessage::LeaveRoom) {
            debug!("Leave not delivered: {}", e);
        }
        if let Some(mut media) = self.media.take() {
            media.release();
        }
        info!("Left room");
    }

    /// [`leave_all`](Self::leave_all), then wait until every link task has
    /// closed its transport.
    pub async fn leave(&mut self) {
        self.leave_all();
        for task in self.closing.drain(..) {
            if let Err(e) = task.await {
                warn!("Link task ended abnormally: {}", e);
            }
        }
    }

    /// Drop links that ended on their own (transport lost or negotiation
    /// failed).
    pub fn reap_closed(&mut self) {
        while let Ok(id) = self.exits.try_recv() {
            self.reap(&id);
        }
    }

    fn reap(&mut self, id: &ConnectionId) {
        // A newer link for the same member may already have replaced it.
        if self.links.get(id).is_some_and(LinkHandle::is_closed) {
            self.links.remove(id);
            info!("Discarded failed link to {}", id.short());
        }
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn links(&self) -> Vec<LinkStatus> {
        self.links.values().map(LinkHandle::status).collect()
    }

    pub fn link_status(&self, id: &ConnectionId) -> Option<LinkStatus> {
        self.links.get(id).map(LinkHandle::status)
    }

    pub fn watch_link(&self, id: &ConnectionId) -> Option<watch::Receiver<LinkStatus>> {
        self.links.get(id).map(LinkHandle::watch)
    }

    /// Process relay frames until the stream ends or `shutdown` fires, then
    /// leave and wait for every transport to close. Returns the orchestrator so callers can inspect final state.
    pub async fn run(
        mut self,
        mut inbound: mpsc::UnboundedReceiver<ServerMessage>,
        mut shutdown: oneshot::Receiver<()>,
    ) -> Self {
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                Some(id) = self.exits.recv() => self.reap(&id),
                msg = inbound.recv() => match msg {
                    Some(msg) => self.handle_server_message(msg),
                    None => {
                        info!("Relay connection closed");
                        break;
                    }
                },
            }
        }
        self.leave().await;
        self
    }

    fn open_link(&mut self, member: MemberInfo, role: Role) {
        if self.left {
            return;
        }
        if self.local_id.as_ref() == Some(&member.id) {
            return;
        }
        if let Some(mut stale) = self.links.remove(&member.id) {
            debug!("Replacing link to {}", member.id.short());
            stale.close(CloseReason::Departed);
        }

        debug!("Opening {:?} link to {}", role, member.id.short());
        let id = member.id.clone();
        let link = PeerLink::new(self.local_id.clone(), member, role);
        self.links.insert(id, LinkHandle::spawn(link, self.ctx.clone()));
    }

    fn route(&mut self, from: &ConnectionId, input: LinkInput) {
        match self.links.get(from) {
            Some(handle) => handle.send(input),
            None => debug!("No link for {}, dropping message", from.short()),
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.leave_all();
    }
}
