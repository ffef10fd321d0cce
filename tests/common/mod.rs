#![allow(dead_code)]

use async_trait::async_trait;
use meshcall::client::{LocalMedia, MediaSource, PeerTransport, TransportEvent, TransportEvents, TransportFactory};
use meshcall::{ConnectionId, Error, Result};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Counters shared by everything one fake client creates.
#[derive(Default)]
pub struct Probe {
    pub transports: AtomicUsize,
    pub closed: AtomicUsize,
    pub candidates_applied: AtomicUsize,
    pub media_acquired: AtomicUsize,
    pub media_released: AtomicUsize,
}

impl Probe {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Transport that answers instantly, reports itself live once it has
/// answered, and gathers one local candidate on creation. Closing takes a
/// few milliseconds.
pub struct FakeTransport {
    name: String,
    probe: Arc<Probe>,
    events: TransportEvents,
}

#[async_trait]
impl PeerTransport for FakeTransport {
    async fn create_offer(&mut self) -> Result<Value> {
        Ok(json!({"type": "offer", "sdp": format!("offer-from-{}", self.name)}))
    }

    async fn accept_offer(&mut self, offer: Value) -> Result<Value> {
        if offer["type"] != "offer" {
            return Err(Error::Negotiation("not an offer".to_string()));
        }
        let _ = self.events.send(TransportEvent::Connected);
        Ok(json!({"type": "answer", "sdp": format!("answer-from-{}", self.name)}))
    }

    async fn accept_answer(&mut self, answer: Value) -> Result<()> {
        if answer["type"] != "answer" {
            return Err(Error::Negotiation("not an answer".to_string()));
        }
        let _ = self.events.send(TransportEvent::Connected);
        Ok(())
    }

    async fn add_ice_candidate(&mut self, _candidate: Value) -> Result<()> {
        self.probe.candidates_applied.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self) {
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.probe.closed.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeFactory {
    pub name: String,
    pub probe: Arc<Probe>,
}

#[async_trait]
impl TransportFactory for FakeFactory {
    async fn create(
        &self,
        remote: &ConnectionId,
        events: TransportEvents,
    ) -> Result<Box<dyn PeerTransport>> {
        self.probe.transports.fetch_add(1, Ordering::SeqCst);
        let _ = events.send(TransportEvent::LocalCandidate(json!({
            "candidate": format!("{}->{}", self.name, remote)
        })));
        Ok(Box::new(FakeTransport {
            name: self.name.clone(),
            probe: self.probe.clone(),
            events,
        }))
    }
}

pub struct FakeMedia(pub Arc<Probe>);

impl LocalMedia for FakeMedia {
    fn release(&mut self) {
        self.0.media_released.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeSource(pub Arc<Probe>);

#[async_trait]
impl MediaSource for FakeSource {
    async fn acquire(&self) -> Result<Box<dyn LocalMedia>> {
        self.0.media_acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeMedia(self.0.clone())))
    }
}

/// Camera permission denied.
pub struct DeniedSource;

#[async_trait]
impl MediaSource for DeniedSource {
    async fn acquire(&self) -> Result<Box<dyn LocalMedia>> {
        Err(Error::Capability("permission denied".to_string()))
    }
}
