//! Registry of open WebSocket connections
//!
//! This module is the server's view of the transport:
//! - Tracks every open connection and the queue feeding its writer task
//! - Delivers text frames to one connection or to all of them
//! - Closes connections with a reason string
//!
//! Each queue holds at most [`OUTBOUND_QUEUE_CAPACITY`] frames and is filled
//! with `try_send`, so the game loop never waits on a slow client. A failed
//! delivery means the writer task is gone or has fallen that far behind;
//! callers treat that connection as closed.

use crate::game::ConnectionId;
use log::{info, warn};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Frames a connection may have waiting before it counts as stalled.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 64;

/// Frames queued for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Close(String),
}

/// One open connection.
#[derive(Debug)]
pub struct Client {
    /// Identifier assigned when the connection was accepted
    pub id: ConnectionId,
    /// Remote address, for logging
    pub addr: SocketAddr,
    /// When the WebSocket handshake completed
    pub connected_at: Instant,
    sender: mpsc::Sender<Outbound>,
}

impl Client {
    pub fn new(id: ConnectionId, addr: SocketAddr, sender: mpsc::Sender<Outbound>) -> Self {
        Self {
            id,
            addr,
            connected_at: Instant::now(),
            sender,
        }
    }

    /// Queues a frame. Returns false if the writer task has stopped or its
    /// queue is full.
    fn push(&self, frame: Outbound) -> bool {
        match self.sender.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Outbound queue full for connection {}", self.id);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Manages all open connections.
#[derive(Debug, Default)]
pub struct ClientManager {
    clients: HashMap<ConnectionId, Client>,
}

impl ClientManager {
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
        }
    }

    pub fn add_client(
        &mut self,
        id: ConnectionId,
        addr: SocketAddr,
        sender: mpsc::Sender<Outbound>,
    ) {
        info!("Connection {} opened from {}", id, addr);
        self.clients.insert(id, Client::new(id, addr, sender));
    }

    /// Removes a connection. Returns false if it was already gone.
    pub fn remove_client(&mut self, id: &ConnectionId) -> bool {
        if let Some(client) = self.clients.remove(id) {
            info!(
                "Connection {} from {} closed after {:.1}s",
                client.id,
                client.addr,
                client.connected_at.elapsed().as_secs_f32()
            );
            true
        } else {
            false
        }
    }

    /// Sends a text frame to one connection.
    ///
    /// Returns false if the connection is unknown, its writer has stopped, or
    /// it is not keeping up.
    pub fn send(&self, id: ConnectionId, text: String) -> bool {
        match self.clients.get(&id) {
            Some(client) => {
                let delivered = client.push(Outbound::Text(text));
                if !delivered {
                    warn!("Failed to queue message for connection {}", id);
                }
                delivered
            }
            None => false,
        }
    }

    /// Sends a text frame to every connection except `exclude`.
    ///
    /// Returns the connections that could not take the frame.
    pub fn broadcast(&self, text: &str, exclude: Option<ConnectionId>) -> Vec<ConnectionId> {
        let mut failed = Vec::new();
        for (id, client) in &self.clients {
            if Some(*id) == exclude {
                continue;
            }
            if !client.push(Outbound::Text(text.to_string())) {
                warn!("Failed to queue broadcast for connection {}", id);
                failed.push(*id);
            }
        }
        failed
    }

    /// Asks a connection to close with `reason` and forgets it.
    pub fn close(&mut self, id: ConnectionId, reason: &str) {
        if let Some(client) = self.clients.get(&id) {
            client.push(Outbound::Close(reason.to_string()));
        }
        self.remove_client(&id);
    }

    /// Closes every connection with `reason`.
    pub fn close_all(&mut self, reason: &str) {
        let ids = self.ids();
        for id in ids {
            self.close(id, reason);
        }
    }

    pub fn ids(&self) -> Vec<ConnectionId> {
        self.clients.keys().copied().collect()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.clients.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
