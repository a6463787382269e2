//! The [`Transport`] seam: one complete JSON message in, one out.
//!
//! [`SocketChannel`][crate::channel::SocketChannel] talks only to this
//! trait, so the reconnect/queue machinery is identical whether the peer
//! speaks WebSocket ([`WsTransport`]) or raw TCP ([`TcpTransport`]).

use std::collections::VecDeque;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use roversim_types::SimError;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::codec::JsonFramer;

/// A connected, message-oriented link to one peer.
#[async_trait]
pub trait Transport: Send {
    /// Write one complete message.
    async fn send(&mut self, text: &str) -> Result<(), SimError>;

    /// Read the next complete message. `Ok(None)` means the peer closed the
    /// connection cleanly.
    async fn recv(&mut self) -> Result<Option<String>, SimError>;

    /// Close the connection. Best effort; errors are ignored.
    async fn close(&mut self);
}

// ────────────────────────────────────────────────────────────────────────────
// WebSocket
// ────────────────────────────────────────────────────────────────────────────

/// Frame-oriented transport: every WebSocket text frame carries exactly one
/// JSON document, so no reassembly is needed.
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsTransport {
    /// Connect to `url` (e.g. `ws://localhost:3001/simulator`).
    pub async fn connect(url: &str) -> Result<Self, SimError> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| SimError::Transport(format!("{url}: {e}")))?;
        Ok(Self { stream })
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, text: &str) -> Result<(), SimError> {
        self.stream
            .send(Message::Text(text.to_string().into()))
            .await
            .map_err(|e| SimError::Transport(e.to_string()))
    }

    async fn recv(&mut self) -> Result<Option<String>, SimError> {
        loop {
            match self.stream.next().await {
                None => return Ok(None),
                Some(Err(e)) => return Err(SimError::Transport(e.to_string())),
                Some(Ok(Message::Text(text))) => return Ok(Some(text.to_string())),
                Some(Ok(Message::Close(_))) => return Ok(None),
                // Pings are answered by tungstenite itself; binary frames are
                // not part of this protocol.
                Some(Ok(_)) => continue,
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Raw TCP
// ────────────────────────────────────────────────────────────────────────────

/// Stream-oriented transport. TCP has no message boundaries, so inbound
/// bytes run through a [`JsonFramer`] and `recv` yields one balanced JSON
/// object at a time.
pub struct TcpTransport {
    stream: TcpStream,
    framer: JsonFramer,
    ready: VecDeque<String>,
}

impl TcpTransport {
    /// Connect to `addr` (e.g. `127.0.0.1:3001`).
    pub async fn connect(addr: &str) -> Result<Self, SimError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| SimError::Transport(format!("{addr}: {e}")))?;
        Ok(Self {
            stream,
            framer: JsonFramer::new(),
            ready: VecDeque::new(),
        })
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&mut self, text: &str) -> Result<(), SimError> {
        self.stream
            .write_all(text.as_bytes())
            .await
            .map_err(|e| SimError::Transport(e.to_string()))
    }

    async fn recv(&mut self) -> Result<Option<String>, SimError> {
        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Ok(Some(frame));
            }
            let mut buf = [0u8; 4096];
            let n = self
                .stream
                .read(&mut buf)
                .await
                .map_err(|e| SimError::Transport(e.to_string()))?;
            if n == 0 {
                return Ok(None);
            }
            self.ready.extend(self.framer.push(&buf[..n]));
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.shutdown().await;
    }
}
