//! [`Session`] – one accepted connection, as seen by the rest of the
//! server.
//!
//! A session owns nothing mutable besides its link to the connection task:
//! an unbounded sender of encoded frames. It is created when the WebSocket
//! handshake completes and removed from the registry the moment its
//! connection task ends, so delivery failure doubles as liveness
//! detection.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Registry entry for one connected client.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    path: String,
    connected_at: DateTime<Utc>,
    outbound: mpsc::UnboundedSender<String>,
}

impl Session {
    pub(crate) fn new(path: impl Into<String>, outbound: mpsc::UnboundedSender<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            path: path.into(),
            connected_at: Utc::now(),
            outbound,
        }
    }

    /// Opaque session key.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The URL path this session connected on (e.g. `/mission-control`).
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Hand an encoded frame to the connection task. Returns `false` when
    /// the task is gone, which marks this session for removal.
    pub(crate) fn deliver(&self, frame: String) -> bool {
        self.outbound.send(frame).is_ok()
    }
}
