//! Per-peer negotiation state machine
//!
//! One [`PeerLink`] exists per known remote member. It holds no transport;
//! the link driver performs the transport calls and reports each outcome
//! back here, so every transition can be exercised without a live peer.
//!
//! ```text
//!  New ──offer sent (initiator)──▶ OfferSent ──answer applied──▶ Connected
//!   │                                                              ▲
//!   └──answer sent (responder)──▶ OfferReceived ──transport up─────┘
//!
//!  any state ──lost / departed / failed──▶ Closed (terminal)
//! ```

use crate::signal::{ConnectionId, MemberInfo};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Initiator,
    Responder,
}

/// Why a link reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The remote member left the room
    Departed,
    /// The transport reported disconnected or failed
    TransportLost,
    /// A negotiation primitive returned an error
    NegotiationFailed,
    /// The local session ended
    SessionEnded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    New,
    OfferSent,
    OfferReceived,
    Connected,
    Closed(CloseReason),
}

impl NegotiationState {
    pub fn is_closed(&self) -> bool {
        matches!(self, NegotiationState::Closed(_))
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NegotiationState::New => write!(f, "new"),
            NegotiationState::OfferSent => write!(f, "offer-sent"),
            NegotiationState::OfferReceived => write!(f, "offer-received"),
            NegotiationState::Connected => write!(f, "connected"),
            NegotiationState::Closed(reason) => write!(f, "closed ({:?})", reason),
        }
    }
}

/// An event that does not fit the current state. Logged, never surfaced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Anomaly {
    #[error("offer received while {state} as {role:?}")]
    UnexpectedOffer { state: NegotiationState, role: Role },

    #[error("answer received while {state}")]
    UnexpectedAnswer { state: NegotiationState },

    #[error("cannot send offer while {state} as {role:?}")]
    UnexpectedOfferSent { state: NegotiationState, role: Role },
}

/// What to do with an inbound ICE candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum IceDisposition {
    /// Remote description is in place; apply now
    Apply(Value),
    /// Held until the remote description is applied
    Buffered,
    /// Link is closed
    Dropped,
}

/// Snapshot of a link for observers.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkStatus {
    pub remote: ConnectionId,
    pub role: Role,
    pub state: NegotiationState,
    pub stream: Option<String>,
}

#[derive(Debug)]
pub struct PeerLink {
    local: Option<ConnectionId>,
    remote: MemberInfo,
    role: Role,
    state: NegotiationState,
    pending_candidates: Vec<Value>,
    stream: Option<String>,
}

impl PeerLink {
    pub fn new(local: Option<ConnectionId>, remote: MemberInfo, role: Role) -> Self {
        Self {
            local,
            remote,
            role,
            state: NegotiationState::New,
            pending_candidates: Vec::new(),
            stream: None,
        }
    }

    pub fn local(&self) -> Option<&ConnectionId> {
        self.local.as_ref()
    }

    pub fn remote(&self) -> &MemberInfo {
        &self.remote
    }

    pub fn remote_id(&self) -> &ConnectionId {
        &self.remote.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    pub fn stream(&self) -> Option<&str> {
        self.stream.as_deref()
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending_candidates.len()
    }

    pub fn status(&self) -> LinkStatus {
        LinkStatus {
            remote: self.remote.id.clone(),
            role: self.role,
            state: self.state,
            stream: self.stream.clone(),
        }
    }

    fn remote_description_applied(&self) -> bool {
        matches!(
            self.state,
            NegotiationState::OfferReceived | NegotiationState::Connected
        )
    }

    /// Whether an inbound offer may be answered now.
    pub fn check_offer(&self) -> Result<(), Anomaly> {
        if self.role == Role::Responder && self.state == NegotiationState::New {
            Ok(())
        } else {
            Err(Anomaly::UnexpectedOffer {
                state: self.state,
                role: self.role,
            })
        }
    }

    /// Whether an inbound answer may be applied now.
    pub fn check_answer(&self) -> Result<(), Anomaly> {
        if self.state == NegotiationState::OfferSent {
            Ok(())
        } else {
            Err(Anomaly::UnexpectedAnswer { state: self.state })
        }
    }

    /// The local offer was produced and handed to the relay.
    pub fn offer_sent(&mut self) -> Result<(), Anomaly> {
        if self.role != Role::Initiator || self.state != NegotiationState::New {
            return Err(Anomaly::UnexpectedOfferSent {
                state: self.state,
                role: self.role,
            });
        }
        self.state = NegotiationState::OfferSent;
        Ok(())
    }

    /// The remote offer was applied and our answer sent. Returns candidates
    /// buffered while no remote description was in place.
    pub fn answer_sent(&mut self) -> Result<Vec<Value>, Anomaly> {
        self.check_offer()?;
        self.state = NegotiationState::OfferReceived;
        Ok(std::mem::take(&mut self.pending_candidates))
    }

    /// The remote answer was applied. Returns buffered candidates.
    pub fn answer_applied(&mut self) -> Result<Vec<Value>, Anomaly> {
        self.check_answer()?;
        self.state = NegotiationState::Connected;
        Ok(std::mem::take(&mut self.pending_candidates))
    }

    pub fn on_ice_candidate(&mut self, candidate: Value) -> IceDisposition {
        if self.is_closed() {
            return IceDisposition::Dropped;
        }
        if self.remote_description_applied() {
            return IceDisposition::Apply(candidate);
        }
        self.pending_candidates.push(candidate);
        IceDisposition::Buffered
    }

    /// The transport reports a live link. Completes the responder side;
    /// returns whether a transition happened.
    pub fn transport_up(&mut self) -> bool {
        if self.state == NegotiationState::OfferReceived {
            self.state = NegotiationState::Connected;
            true
        } else {
            false
        }
    }

    /// Move to the terminal state. Returns `false` if already closed.
    pub fn close(&mut self, reason: CloseReason) -> bool {
        if self.is_closed() {
            return false;
        }
        self.state = NegotiationState::Closed(reason);
        self.pending_candidates.clear();
        true
    }

    pub fn attach_stream(&mut self, stream_id: String) -> bool {
        if self.is_closed() {
            return false;
        }
        self.stream = Some(stream_id);
        true
    }

    pub fn detach_stream(&mut self) -> Option<String> {
        self.stream.take()
    }
}
