// Document relay service
//
// Relays opaque frames between the peers of a named room. The relay does not
// look inside frames; whatever sync protocol the clients speak rides on top.

use async_trait::async_trait;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{BackgroundService, Latch};
use crate::config::RelayConfig;
use crate::errors::ServiceError;

/// Frame body as received from a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Binary(Vec<u8>),
    Text(String),
}

impl Payload {
    pub fn len(&self) -> usize {
        match self {
            Payload::Binary(data) => data.len(),
            Payload::Text(text) => text.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A frame published into a room
#[derive(Debug, Clone)]
pub struct Frame {
    /// Peer that published the frame
    pub sender: Uuid,
    pub payload: Payload,
}

/// Per-room state
struct Room {
    tx: broadcast::Sender<Frame>,
    created_at: DateTime<Utc>,
}

impl Room {
    fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self {
            tx,
            created_at: Utc::now(),
        }
    }
}

/// Room and peer counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelayStats {
    pub rooms: usize,
    pub peers: usize,
}

/// Relay background service
pub struct DocumentRelay {
    config: RelayConfig,
    rooms: DashMap<String, Room>,
    started: AtomicBool,
    ready: Latch,
    stop: Latch,
}

impl DocumentRelay {
    /// Create a relay; it accepts no peers until `start()` signals readiness
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            rooms: DashMap::new(),
            started: AtomicBool::new(false),
            ready: Latch::new(),
            stop: Latch::new(),
        }
    }

    /// Ready and not asked to stop
    pub fn is_running(&self) -> bool {
        self.ready.is_set() && !self.stop.is_set()
    }

    /// Join a room, creating it on first use
    pub fn join(&self, room: &str) -> Result<Peer, ServiceError> {
        if !self.is_running() {
            return Err(ServiceError::NotRunning);
        }
        if room.trim().is_empty() {
            return Err(ServiceError::InvalidRoom(room.to_string()));
        }

        // Subscribe while the shard is locked so housekeeping cannot drop the
        // room between creation and the first receiver
        let (tx, rx) = {
            let entry = self.rooms.entry(room.to_string()).or_insert_with(|| {
                debug!(room = %room, "Creating room");
                Room::new(self.config.room_capacity)
            });
            (entry.tx.clone(), entry.tx.subscribe())
        };

        Ok(Peer {
            id: Uuid::new_v4(),
            room: room.to_string(),
            tx,
            rx,
            closed: self.stop.clone(),
            max_message_bytes: self.config.max_message_bytes,
        })
    }

    /// Remove rooms nobody is subscribed to. Returns how many were removed.
    pub fn prune_empty_rooms(&self) -> usize {
        let before = self.rooms.len();
        self.rooms.retain(|name, room| {
            let keep = room.tx.receiver_count() > 0;
            if !keep {
                let age = Utc::now().signed_duration_since(room.created_at);
                debug!(room = %name, age_secs = age.num_seconds(), "Removing empty room");
            }
            keep
        });
        before.saturating_sub(self.rooms.len())
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            rooms: self.rooms.len(),
            peers: self
                .rooms
                .iter()
                .map(|room| room.tx.receiver_count())
                .sum(),
        }
    }

    /// Bridge one websocket connection into a room until either side goes away
    pub async fn serve_connection(&self, room: String, mut socket: WebSocket) {
        let mut peer = match self.join(&room) {
            Ok(peer) => peer,
            Err(e) => {
                warn!(
                    room = %room,
                    reason = e.as_label(),
                    error = %e,
                    "Rejecting websocket peer"
                );
                let _ = socket
                    .send(Message::Close(Some(CloseFrame {
                        code: close_code::AGAIN,
                        reason: e.to_string().into(),
                    })))
                    .await;
                return;
            }
        };

        info!(room = %room, peer = %peer.id(), "Peer connected");
        let (mut sink, mut stream) = socket.split();

        loop {
            tokio::select! {
                inbound = stream.next() => {
                    let payload = match inbound {
                        Some(Ok(Message::Binary(data))) => Payload::Binary(data),
                        Some(Ok(Message::Text(text))) => Payload::Text(text),
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            debug!(peer = %peer.id(), error = %e, "Websocket read failed");
                            break;
                        }
                    };

                    match peer.publish(payload) {
                        Ok(reached) => debug!(peer = %peer.id(), reached, "Relayed frame"),
                        Err(e @ ServiceError::FrameTooLarge { .. }) => {
                            warn!(
                                peer = %peer.id(),
                                reason = e.as_label(),
                                error = %e,
                                "Closing peer"
                            );
                            let _ = sink
                                .send(Message::Close(Some(CloseFrame {
                                    code: close_code::SIZE,
                                    reason: "frame too large".into(),
                                })))
                                .await;
                            break;
                        }
                        Err(e) => {
                            debug!(peer = %peer.id(), reason = e.as_label(), "Publish failed");
                            break;
                        }
                    }
                }
                outbound = peer.recv() => match outbound {
                    Ok(frame) => {
                        let message = match frame.payload {
                            Payload::Binary(data) => Message::Binary(data),
                            Payload::Text(text) => Message::Text(text),
                        };
                        if sink.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(_) => {
                        let _ = sink
                            .send(Message::Close(Some(CloseFrame {
                                code: close_code::AWAY,
                                reason: "relay shutting down".into(),
                            })))
                            .await;
                        break;
                    }
                }
            }
        }

        info!(room = %room, peer = %peer.id(), "Peer disconnected");
    }
}

#[async_trait]
impl BackgroundService for DocumentRelay {
    fn name(&self) -> &str {
        "document-relay"
    }

    async fn start(&self) -> Result<(), ServiceError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ServiceError::AlreadyStarted {
                name: self.name().to_string(),
            });
        }
        if self.stop.is_set() {
            info!("Stop requested before the relay started");
            return Ok(());
        }

        let mut cleanup = tokio::time::interval(self.config.cleanup_interval());
        cleanup.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // First tick fires immediately
        cleanup.tick().await;

        self.ready.set();
        info!(
            room_capacity = self.config.room_capacity,
            auto_clean_rooms = self.config.auto_clean_rooms,
            "Document relay ready"
        );

        loop {
            tokio::select! {
                _ = self.stop.wait() => break,
                _ = cleanup.tick() => {
                    if self.config.auto_clean_rooms {
                        let removed = self.prune_empty_rooms();
                        if removed > 0 {
                            debug!(removed, "Pruned empty rooms");
                        }
                    }
                }
            }
        }

        let closed = self.rooms.len();
        self.rooms.clear();
        info!(rooms = closed, "Document relay stopped");
        Ok(())
    }

    fn readiness(&self) -> &Latch {
        &self.ready
    }

    async fn request_stop(&self) {
        if self.stop.set() {
            debug!("Stop requested");
        }
    }

    fn is_stopped(&self) -> bool {
        self.stop.is_set()
    }
}

/// A room membership
pub struct Peer {
    id: Uuid,
    room: String,
    tx: broadcast::Sender<Frame>,
    rx: broadcast::Receiver<Frame>,
    closed: Latch,
    max_message_bytes: usize,
}

impl Peer {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    /// Publish to the room. Returns the number of other peers reached.
    pub fn publish(&self, payload: Payload) -> Result<usize, ServiceError> {
        if self.closed.is_set() {
            return Err(ServiceError::RoomClosed(self.room.clone()));
        }
        let size = payload.len();
        if size > self.max_message_bytes {
            return Err(ServiceError::FrameTooLarge {
                size,
                limit: self.max_message_bytes,
            });
        }

        self.tx
            .send(Frame {
                sender: self.id,
                payload,
            })
            .map(|receivers| receivers.saturating_sub(1))
            .map_err(|_| ServiceError::RoomClosed(self.room.clone()))
    }

    /// Next frame published by another peer
    pub async fn recv(&mut self) -> Result<Frame, ServiceError> {
        loop {
            tokio::select! {
                biased;
                _ = self.closed.wait() => {
                    return Err(ServiceError::RoomClosed(self.room.clone()));
                }
                received = self.rx.recv() => match received {
                    Ok(frame) if frame.sender == self.id => continue,
                    Ok(frame) => return Ok(frame),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(peer = %self.id, skipped, "Peer lagging, frames dropped");
                    }
                    Err(RecvError::Closed) => {
                        return Err(ServiceError::RoomClosed(self.room.clone()));
                    }
                },
            }
        }
    }
}
