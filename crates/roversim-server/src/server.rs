//! [`SimulatorServer`] – accepts Mission Control and rover-server clients
//! and multiplexes traffic between them and the simulation loop.
//!
//! Three kinds of task cooperate:
//!
//! * the **accept task** listens for TCP connections and performs the
//!   WebSocket handshake, rejecting any path that was not configured;
//! * one **connection task** per session pumps frames in both directions,
//!   decoding inbound text into the shared inbound queue;
//! * the **fan-out task** drains the outbound queue and delivers each
//!   report to every live session on the addressed path, dropping
//!   sessions whose connection task has died.
//!
//! The simulation loop stays non-blocking throughout: `broadcast` is an
//! O(1) enqueue and `drain` returns immediately. `start` and `stop` are
//! both idempotent.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use roversim_bridge::codec;
use roversim_bridge::queue::{self, QueueReceiver, QueueSender};
use roversim_types::{Report, Request, SimError};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request as HsRequest, Response as HsResponse};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::accept_hdr_async;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::session::Session;

/// Listener settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// URL paths clients may connect on. Anything else is rejected at the
    /// handshake.
    pub paths: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3001".parse().expect("static address"),
            paths: vec!["/mission-control".to_string(), "/simulator".to_string()],
        }
    }
}

type SessionMap = Arc<Mutex<HashMap<Uuid, Session>>>;

/// The simulator's WebSocket server.
pub struct SimulatorServer {
    config: ServerConfig,
    sessions: SessionMap,
    inbound_tx: QueueSender<Request>,
    inbound_rx: QueueReceiver<Request>,
    outbound_tx: Option<QueueSender<(String, Report)>>,
    shutdown: Option<watch::Sender<bool>>,
    tasks: Vec<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl SimulatorServer {
    pub fn new(config: ServerConfig) -> Self {
        let (inbound_tx, inbound_rx) = queue::channel();
        Self {
            config,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            inbound_tx,
            inbound_rx,
            outbound_tx: None,
            shutdown: None,
            tasks: Vec::new(),
            local_addr: None,
        }
    }

    /// Bind the listener and spawn the accept and fan-out tasks. Starting
    /// an already-started server is a no-op.
    pub async fn start(&mut self) -> Result<(), SimError> {
        if self.shutdown.is_some() {
            debug!("server already started");
            return Ok(());
        }

        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| SimError::Transport(format!("bind {}: {e}", self.config.bind_addr)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| SimError::Transport(e.to_string()))?;
        self.local_addr = Some(local_addr);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (outbound_tx, outbound_rx) = queue::channel();
        self.outbound_tx = Some(outbound_tx);
        self.shutdown = Some(shutdown_tx);

        info!(addr = %local_addr, paths = ?self.config.paths, "simulator server listening");

        self.tasks.push(tokio::spawn(accept_loop(
            listener,
            self.config.paths.clone(),
            Arc::clone(&self.sessions),
            self.inbound_tx.clone(),
            shutdown_rx.clone(),
        )));
        self.tasks.push(tokio::spawn(fan_out_loop(
            outbound_rx,
            Arc::clone(&self.sessions),
            shutdown_rx,
        )));
        Ok(())
    }

    /// Signal every task to exit and wait for the accept and fan-out tasks.
    /// Stopping an already-stopped server is a no-op.
    pub async fn stop(&mut self) {
        let Some(shutdown) = self.shutdown.take() else {
            debug!("server already stopped");
            return;
        };
        let _ = shutdown.send(true);
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        self.outbound_tx = None;
        self.sessions.lock().expect("session registry poisoned").clear();
        info!("simulator server stopped");
    }

    /// Enqueue `report` for every session connected on `path`. Returns
    /// immediately; delivery happens on the fan-out task.
    pub fn broadcast(&self, path: &str, report: Report) {
        match &self.outbound_tx {
            Some(outbound) => {
                if outbound.push((path.to_string(), report)).is_err() {
                    warn!("fan-out task is gone; dropping broadcast");
                }
            }
            None => warn!(path = %path, "server not started; dropping broadcast"),
        }
    }

    /// Take every request received from any session since the last drain.
    /// Order is preserved per session; sessions interleave arbitrarily.
    pub fn drain(&mut self) -> Vec<Request> {
        self.inbound_rx.drain()
    }

    /// The address the listener actually bound (useful with port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Number of currently open sessions across all paths.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().expect("session registry poisoned").len()
    }
}

async fn accept_loop(
    listener: TcpListener,
    paths: Vec<String>,
    sessions: SessionMap,
    inbound: QueueSender<Request>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            result = shutdown.changed() => {
                if result.is_err() || *shutdown.borrow() {
                    return;
                }
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        tokio::spawn(run_session(
                            stream,
                            peer,
                            paths.clone(),
                            Arc::clone(&sessions),
                            inbound.clone(),
                            shutdown.clone(),
                        ));
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                }
            }
        }
    }
}

async fn run_session(
    stream: TcpStream,
    peer: SocketAddr,
    paths: Vec<String>,
    sessions: SessionMap,
    inbound: QueueSender<Request>,
    mut shutdown: watch::Receiver<bool>,
) {
    // Capture the request path during the handshake so the session can be
    // registered under it.
    let mut requested_path = String::new();
    let callback = |request: &HsRequest, response: HsResponse| {
        let path = request.uri().path().to_string();
        if paths.iter().any(|p| p == &path) {
            requested_path = path;
            Ok(response)
        } else {
            let mut rejection = ErrorResponse::new(None);
            *rejection.status_mut() = StatusCode::NOT_FOUND;
            Err(rejection)
        }
    };

    let ws_stream = match accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(e) => {
            info!(peer = %peer, error = %e, "handshake rejected");
            return;
        }
    };

    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<String>();
    let session = Session::new(requested_path.clone(), frame_tx);
    let session_id = session.id();
    sessions
        .lock()
        .expect("session registry poisoned")
        .insert(session_id, session);
    info!(peer = %peer, path = %requested_path, session = %session_id, "session opened");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    loop {
        tokio::select! {
            result = shutdown.changed() => {
                if result.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            frame = frame_rx.recv() => {
                match frame {
                    Some(text) => {
                        if ws_tx.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    // Registry entry removed (server stopping).
                    None => break,
                }
            }
            message = ws_rx.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        match codec::decode_request(text.as_str()) {
                            Ok(request) => {
                                let _ = inbound.push(request);
                            }
                            Err(e) => warn!(peer = %peer, error = %e, "dropping inbound message"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        info!(peer = %peer, error = %e, "session read failed");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    sessions
        .lock()
        .expect("session registry poisoned")
        .remove(&session_id);
    info!(peer = %peer, session = %session_id, "session closed");
}

async fn fan_out_loop(
    mut outbound: QueueReceiver<(String, Report)>,
    sessions: SessionMap,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            result = shutdown.changed() => {
                if result.is_err() || *shutdown.borrow() {
                    return;
                }
            }
            item = outbound.recv() => {
                let Some((path, report)) = item else {
                    return;
                };
                let text = match codec::encode_report(&report) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "unencodable report dropped");
                        continue;
                    }
                };
                let mut registry = sessions.lock().expect("session registry poisoned");
                let dead: Vec<Uuid> = registry
                    .values()
                    .filter(|s| s.path() == path)
                    .filter(|s| !s.deliver(text.clone()))
                    .map(Session::id)
                    .collect();
                for id in dead {
                    warn!(session = %id, "session dropped mid-send");
                    registry.remove(&id);
                }
            }
        }
    }
}
