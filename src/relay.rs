//! Signaling relay
//!
//! Routes addressed negotiation messages between live connections and fans
//! membership changes out to rooms. Membership-affecting operations hold the
//! write lock while they queue every resulting notification, so the roster a
//! joiner receives and the `user-joined` frames the room receives always agree.
//! Forwarding only needs the read lock.

use crate::room::{Departure, RoomRegistry};
use crate::signal::{ClientMessage, ConnectionId, MemberInfo, ServerMessage};
use crate::Result;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

pub type Outbound = mpsc::UnboundedSender<ServerMessage>;

#[derive(Default)]
struct RelayState {
    registry: RoomRegistry,
    connections: HashMap<ConnectionId, Outbound>,
}

impl RelayState {
    fn deliver(&self, to: &ConnectionId, msg: ServerMessage) -> bool {
        match self.connections.get(to) {
            Some(tx) => tx.send(msg).is_ok(),
            None => false,
        }
    }

    fn announce_departure(&self, departure: &Departure) {
        let id = &departure.member.id;
        for peer in &departure.remaining {
            self.deliver(peer, ServerMessage::UserLeft { id: id.clone() });
        }

        if departure.room_deleted() {
            info!("Room {} deleted (empty)", departure.room_id);
        } else {
            info!(
                "{} left room {}, {} remaining",
                id.short(),
                departure.room_id,
                departure.remaining_count()
            );
        }
    }
}

#[derive(Default)]
pub struct Relay {
    state: RwLock<RelayState>,
    notify_unreachable: bool,
}

/// Which negotiation message is being relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Relayed {
    Offer,
    Answer,
    IceCandidate,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tell senders when a relayed message had no live target.
    pub fn with_unreachable_notifications(mut self, enabled: bool) -> Self {
        self.notify_unreachable = enabled;
        self
    }

    /// Register a new live connection and queue its `connected` frame.
    pub async fn connect(&self) -> (ConnectionId, mpsc::UnboundedReceiver<ServerMessage>) {
        let id = ConnectionId::random();
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(ServerMessage::Connected { id: id.clone() });

        self.state.write().await.connections.insert(id.clone(), tx);
        debug!("Connection {} registered", id.short());
        (id, rx)
    }

    /// Admit `id` to a room. The joiner gets the pre-insertion roster, every
    /// existing member gets `user-joined`.
    pub async fn join(
        &self,
        id: &ConnectionId,
        room_id: &str,
        display_name: &str,
        avatar: &str,
    ) -> Result<Vec<MemberInfo>> {
        let mut state = self.state.write().await;
        let joined = state.registry.join(id, room_id, display_name, avatar)?;

        if let Some(previous) = &joined.previous {
            state.announce_departure(previous);
        }

        let users: Vec<MemberInfo> = joined.existing.iter().map(|m| m.info()).collect();
        let me = joined.member.info();

        state.deliver(id, ServerMessage::ExistingUsers { users: users.clone() });
        for member in &joined.existing {
            state.deliver(&member.id, ServerMessage::UserJoined(me.clone()));
        }

        info!(
            "{} ({}) joined room {}, now {} members",
            me.display_name,
            id.short(),
            joined.room_id,
            users.len() + 1
        );
        Ok(users)
    }

    /// Explicit departure. No-op when `id` is not in a room.
    pub async fn leave(&self, id: &ConnectionId) -> Option<Departure> {
        let mut state = self.state.write().await;
        let departure = state.registry.leave(id)?;
        state.announce_departure(&departure);
        Some(departure)
    }

    /// Transport-level disconnect. Safe to call after an explicit leave and
    /// safe to call more than once.
    pub async fn disconnect(&self, id: &ConnectionId) -> Option<Departure> {
        let mut state = self.state.write().await;
        state.connections.remove(id);
        let departure = state.registry.leave(id)?;
        state.announce_departure(&departure);
        Some(departure)
    }

    pub async fn send_offer(&self, from: &ConnectionId, to: &ConnectionId, sdp: Value) {
        self.forward(Relayed::Offer, from, to, sdp).await
    }

    pub async fn send_answer(&self, from: &ConnectionId, to: &ConnectionId, sdp: Value) {
        self.forward(Relayed::Answer, from, to, sdp).await
    }

    pub async fn send_ice_candidate(&self, from: &ConnectionId, to: &ConnectionId, candidate: Value) {
        self.forward(Relayed::IceCandidate, from, to, candidate).await
    }

    async fn forward(&self, kind: Relayed, from: &ConnectionId, to: &ConnectionId, payload: Value) {
        let state = self.state.read().await;

        let msg = match kind {
            Relayed::Offer => {
                let Some(sender) = state.registry.member(from) else {
                    warn!("Dropping offer from {}: sender has not joined a room", from.short());
                    return;
                };
                ServerMessage::Offer {
                    sdp: payload,
                    from: from.clone(),
                    display_name: sender.display_name.clone(),
                    avatar: sender.avatar.clone(),
                }
            }
            Relayed::Answer => ServerMessage::Answer {
                sdp: payload,
                from: from.clone(),
            },
            Relayed::IceCandidate => ServerMessage::IceCandidate {
                candidate: payload,
                from: from.clone(),
            },
        };

        if state.deliver(to, msg) {
            debug!("Relayed {:?} {} -> {}", kind, from.short(), to.short());
            return;
        }

        warn!("Dropping {:?} from {}: {} is not live", kind, from.short(), to.short());
        if self.notify_unreachable {
            state.deliver(from, ServerMessage::PeerUnavailable { to: to.clone() });
        }
    }

    /// Route one client frame.
    pub async fn dispatch(&self, from: &ConnectionId, msg: ClientMessage) {
        match msg {
            ClientMessage::JoinRoom {
                room_id,
                display_name,
                avatar,
            } => {
                if let Err(e) = self.join(from, &room_id, &display_name, &avatar).await {
                    warn!("Rejected join from {}: {}", from.short(), e);
                    let state = self.state.read().await;
                    state.deliver(
                        from,
                        ServerMessage::Error {
                            message: e.to_string(),
                        },
                    );
                }
            }
            ClientMessage::Offer { sdp, to } => self.send_offer(from, &to, sdp).await,
            ClientMessage::Answer { sdp, to } => self.send_answer(from, &to, sdp).await,
            ClientMessage::IceCandidate { candidate, to } => {
                self.send_ice_candidate(from, &to, candidate).await
            }
            ClientMessage::LeaveRoom => {
                self.leave(from).await;
            }
        }
    }

    /// Queue an arbitrary frame to one connection.
    pub async fn notify(&self, to: &ConnectionId, msg: ServerMessage) -> bool {
        self.state.read().await.deliver(to, msg)
    }

    pub async fn room_of(&self, id: &ConnectionId) -> Option<String> {
        self.state.read().await.registry.room_of(id).map(str::to_string)
    }

    pub async fn members(&self, room_id: &str) -> Vec<MemberInfo> {
        self.state
            .read()
            .await
            .registry
            .members(room_id)
            .map(|members| members.iter().map(|m| m.info()).collect())
            .unwrap_or_default()
    }

    pub async fn contains_room(&self, room_id: &str) -> bool {
        self.state.read().await.registry.contains_room(room_id)
    }

    pub async fn is_live(&self, id: &ConnectionId) -> bool {
        self.state.read().await.connections.contains_key(id)
    }
}
