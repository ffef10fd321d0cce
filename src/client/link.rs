//! Link driver: one tokio task per [`PeerLink`].
//!
//! Inbound negotiation messages for a link are queued to its task, so
//! transitions for one link never overlap while different links progress
//! independently. Teardown is a cancellation raced against whatever the task
//! is awaiting; the transport is closed on every exit path.

use super::peer::{CloseReason, IceDisposition, LinkStatus, PeerLink, Role};
use super::transport::{PeerTransport, RemoteMediaView, SignalSink, TransportEvent, TransportFactory};
use crate::signal::{ClientMessage, ConnectionId};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Negotiation messages relayed from the remote peer.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkInput {
    Offer(Value),
    Answer(Value),
    IceCandidate(Value),
}

/// Collaborators shared by every link of one orchestrator.
#[derive(Clone)]
pub struct LinkContext {
    pub factory: Arc<dyn TransportFactory>,
    pub signal: Arc<dyn SignalSink>,
    pub view: Arc<dyn RemoteMediaView>,
    /// Links that end on their own report their remote id here
    pub exits: mpsc::UnboundedSender<ConnectionId>,
}

pub struct LinkHandle {
    inputs: mpsc::UnboundedSender<LinkInput>,
    cancel: Option<oneshot::Sender<CloseReason>>,
    status: watch::Receiver<LinkStatus>,
    task: JoinHandle<()>,
}

impl LinkHandle {
    pub fn spawn(link: PeerLink, ctx: LinkContext) -> Self {
        let (inputs, inputs_rx) = mpsc::unbounded_channel();
        let (cancel, cancel_rx) = oneshot::channel();
        let (status_tx, status) = watch::channel(link.status());

        let task = tokio::spawn(run(link, ctx, inputs_rx, cancel_rx, status_tx));

        Self {
            inputs,
            cancel: Some(cancel),
            status,
            task,
        }
    }

    /// Queue an inbound message. Silently dropped once the task has ended.
    pub fn send(&self, input: LinkInput) {
        let _ = self.inputs.send(input);
    }

    /// Ask the task to tear down. Later calls do nothing.
    pub fn close(&mut self, reason: CloseReason) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(reason);
        }
    }

    pub fn status(&self) -> LinkStatus {
        self.status.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<LinkStatus> {
        self.status.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.status.borrow().state.is_closed()
    }

    /// Cancel the link and hand back its task, which completes once the
    /// transport has been closed.
    pub fn shut_down(mut self, reason: CloseReason) -> JoinHandle<()> {
        self.close(reason);
        self.task
    }
}

async fn run(
    mut link: PeerLink,
    ctx: LinkContext,
    mut inputs: mpsc::UnboundedReceiver<LinkInput>,
    mut cancel: oneshot::Receiver<CloseReason>,
    status: watch::Sender<LinkStatus>,
) {
    let remote = link.remote_id().clone();
    let (events_tx, mut events) = mpsc::unbounded_channel();

    let created = tokio::select! {
        biased;
        reason = &mut cancel => Err(reason.unwrap_or(CloseReason::SessionEnded)),
        created = ctx.factory.create(&remote, events_tx) => Ok(created),
    };

    let mut transport = match created {
        Err(reason) => return finish(&mut link, reason, &ctx, &status),
        Ok(Err(e)) => {
            warn!("Could not create transport toward {}: {}", remote.short(), e);
            return finish(&mut link, CloseReason::NegotiationFailed, &ctx, &status);
        }
        Ok(Ok(transport)) => transport,
    };

    let reason = tokio::select! {
        biased;
        reason = &mut cancel => reason.unwrap_or(CloseReason::SessionEnded),
        reason = drive(&mut link, transport.as_mut(), &ctx, &status, &mut inputs, &mut events) => reason,
    };

    transport.close().await;
    finish(&mut link, reason, &ctx, &status);
}

fn finish(
    link: &mut PeerLink,
    reason: CloseReason,
    ctx: &LinkContext,
    status: &watch::Sender<LinkStatus>,
) {
    link.close(reason);
    if let Some(stream) = link.detach_stream() {
        ctx.view.remove(link.remote_id(), &stream);
    }
    status.send_replace(link.status());

    debug!("Link to {} closed: {:?}", link.remote_id().short(), reason);
    if matches!(reason, CloseReason::TransportLost | CloseReason::NegotiationFailed) {
        let _ = ctx.exits.send(link.remote_id().clone());
    }
}

async fn drive(
    link: &mut PeerLink,
    transport: &mut dyn PeerTransport,
    ctx: &LinkContext,
    status: &watch::Sender<LinkStatus>,
    inputs: &mut mpsc::UnboundedReceiver<LinkInput>,
    events: &mut mpsc::UnboundedReceiver<TransportEvent>,
) -> CloseReason {
    if link.role() == Role::Initiator {
        if let Err(reason) = send_offer(link, transport, ctx).await {
            return reason;
        }
        status.send_replace(link.status());
    }

    let mut events_open = true;
    loop {
        let step = tokio::select! {
            input = inputs.recv() => match input {
                Some(input) => handle_input(link, transport, ctx, input).await,
                None => Err(CloseReason::SessionEnded),
            },
            event = events.recv(), if events_open => match event {
                Some(event) => handle_event(link, ctx, event),
                None => {
                    events_open = false;
                    Ok(())
                }
            },
        };

        if let Err(reason) = step {
            return reason;
        }
        status.send_replace(link.status());
    }
}

async fn send_offer(
    link: &mut PeerLink,
    transport: &mut dyn PeerTransport,
    ctx: &LinkContext,
) -> Result<(), CloseReason> {
    let remote = link.remote_id().clone();
    let offer = transport.create_offer().await.map_err(|e| {
        warn!("Failed to create offer for {}: {}", remote.short(), e);
        CloseReason::NegotiationFailed
    })?;

    ctx.signal
        .send(ClientMessage::Offer {
            sdp: offer,
            to: remote.clone(),
        })
        .map_err(|e| {
            debug!("Offer to {} not sent: {}", remote.short(), e);
            CloseReason::SessionEnded
        })?;

    link.offer_sent().map_err(|anomaly| {
        warn!("Offer toward {}: {}", remote.short(), anomaly);
        CloseReason::NegotiationFailed
    })?;
    debug!("Offer sent to {}", remote.short());
    Ok(())
}

async fn handle_input(
    link: &mut PeerLink,
    transport: &mut dyn PeerTransport,
    ctx: &LinkContext,
    input: LinkInput,
) -> Result<(), CloseReason> {
    let remote = link.remote_id().clone();

    match input {
        LinkInput::Offer(offer) => {
            if let Err(anomaly) = link.check_offer() {
                warn!("Ignoring offer from {}: {}", remote.short(), anomaly);
                return Ok(());
            }

            let answer = transport.accept_offer(offer).await.map_err(|e| {
                warn!("Failed to answer offer from {}: {}", remote.short(), e);
                CloseReason::NegotiationFailed
            })?;
            ctx.signal
                .send(ClientMessage::Answer {
                    sdp: answer,
                    to: remote.clone(),
                })
                .map_err(|_| CloseReason::SessionEnded)?;

            let pending = link.answer_sent().map_err(|_| CloseReason::NegotiationFailed)?;
            debug!("Answer sent to {}", remote.short());
            apply_candidates(transport, &remote, pending).await;
        }
        LinkInput::Answer(answer) => {
            if let Err(anomaly) = link.check_answer() {
                warn!("Ignoring answer from {}: {}", remote.short(), anomaly);
                return Ok(());
            }

            transport.accept_answer(answer).await.map_err(|e| {
                warn!("Failed to apply answer from {}: {}", remote.short(), e);
                CloseReason::NegotiationFailed
            })?;

            let pending = link.answer_applied().map_err(|_| CloseReason::NegotiationFailed)?;
            info!("Connected to {}", link.remote().display_name);
            apply_candidates(transport, &remote, pending).await;
        }
        LinkInput::IceCandidate(candidate) => match link.on_ice_candidate(candidate) {
            IceDisposition::Apply(candidate) => {
                apply_candidates(transport, &remote, vec![candidate]).await
            }
            IceDisposition::Buffered => debug!("Buffered candidate from {}", remote.short()),
            IceDisposition::Dropped => {}
        },
    }
    Ok(())
}

// A rejected candidate only loses one path; the link stays up.
async fn apply_candidates(transport: &mut dyn PeerTransport, remote: &ConnectionId, candidates: Vec<Value>) {
    for candidate in candidates {
        if let Err(e) = transport.add_ice_candidate(candidate).await {
            warn!("Candidate from {} rejected: {}", remote.short(), e);
        }
    }
}

fn handle_event(link: &mut PeerLink, ctx: &LinkContext, event: TransportEvent) -> Result<(), CloseReason> {
    match event {
        TransportEvent::Connected => {
            if link.transport_up() {
                info!("Connected to {}", link.remote().display_name);
            }
        }
        TransportEvent::Disconnected | TransportEvent::Failed => {
            info!("Link to {} lost ({:?})", link.remote().display_name, event);
            return Err(CloseReason::TransportLost);
        }
        TransportEvent::LocalCandidate(candidate) => {
            let msg = ClientMessage::IceCandidate {
                candidate,
                to: link.remote_id().clone(),
            };
            if let Err(e) = ctx.signal.send(msg) {
                debug!("Candidate not sent: {}", e);
            }
        }
        TransportEvent::RemoteStream(stream_id) => {
            if link.attach_stream(stream_id.clone()) {
                ctx.view.show(link.remote(), &stream_id);
            }
        }
    }
    Ok(())
}
