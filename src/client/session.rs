//! WebSocket client session: acquires local media, connects to the relay,
//! joins a room and runs the orchestrator until the session ends.

use super::orchestrator::Orchestrator;
use super::transport::{MediaSource, RemoteMediaView, TransportFactory};
use crate::room::normalize_room_id;
use crate::signal::{ClientMessage, ServerMessage};
use crate::{Error, Result};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Relay WebSocket endpoint, e.g. `ws://127.0.0.1:3000/ws`
    pub url: String,
    pub room_id: String,
    pub display_name: String,
    pub avatar: String,
}

pub struct Session {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<Orchestrator>,
}

impl Session {
    /// Start a session. Local media is acquired before anything touches
    /// the network; if that fails the room is never joined. A blank room id
    /// or display name is rejected before media is requested.
    pub async fn connect(
        config: SessionConfig,
        source: &dyn MediaSource,
        factory: Arc<dyn TransportFactory>,
        view: Arc<dyn RemoteMediaView>,
    ) -> Result<Self> {
        if normalize_room_id(&config.room_id).is_empty() {
            return Err(Error::EmptyRoomId);
        }
        if config.display_name.trim().is_empty() {
            return Err(Error::EmptyDisplayName);
        }

        let media = source.acquire().await.map_err(|e| match e {
            Error::Capability(_) => e,
            other => Error::Capability(other.to_string()),
        })?;

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ClientMessage>();
        // Owns the media from here on; dropping it on an error path releases it.
        let mut orchestrator = Orchestrator::new(media, factory, Arc::new(out_tx), view);

        let (ws, _) = connect_async(config.url.as_str()).await?;
        info!("Connected to relay at {}", config.url);
        let (mut write, mut read) = ws.split();

        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let text = match serde_json::to_string(&msg) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Failed to encode {:?}: {}", msg, e);
                        continue;
                    }
                };
                if write.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            let _ = write.close().await;
        });

        let (in_tx, in_rx) = mpsc::unbounded_channel::<ServerMessage>();
        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(msg) => {
                            if in_tx.send(msg).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Unreadable relay frame: {}", e),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        debug!("Relay socket error: {}", e);
                        break;
                    }
                }
            }
        });

        orchestrator.join(&config.room_id, &config.display_name, &config.avatar)?;

        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(orchestrator.run(in_rx, shutdown_rx));
        Ok(Self { shutdown, task })
    }

    /// End the session: the relay is told, local media is released, and
    /// this returns once every link's transport has been closed. Dropping
    /// the session starts the same teardown without waiting for it.
    pub async fn leave(self) -> Result<()> {
        let _ = self.shutdown.send(());
        self.task
            .await
            .map(drop)
            .map_err(|e| Error::Signaling(format!("session task failed: {}", e)))
    }
}
