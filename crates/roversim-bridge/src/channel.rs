//! [`SocketChannel`] – supervised client connection to the rover server.
//!
//! The channel owns a background task that connects, retries on a fixed
//! delay until it succeeds, pumps both queues while the link is up, and
//! reconnects with the same policy whenever the link drops. The simulation
//! side only ever touches the queue ends: [`send`][SocketChannel::send] is
//! an O(1) enqueue and [`drain`][SocketChannel::drain] never blocks.
//!
//! Teardown is a `watch` signal, checked at every suspension point, so the
//! task exits promptly and no background work outlives its owner. Dropping
//! the channel without calling [`shutdown`][SocketChannel::shutdown] closes
//! the queues, which the task also treats as a stop signal.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use roversim_types::{Report, Request};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::codec;
use crate::queue::{self, QueueReceiver, QueueSender};
use crate::transport::{TcpTransport, Transport, WsTransport};

/// Delay between connection attempts.
pub const RETRY_DELAY: Duration = Duration::from_secs(3);

/// Which protocol the channel speaks to its peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    WebSocket,
    Tcp,
}

/// Connection settings for a [`SocketChannel`].
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// WebSocket URL or TCP `host:port`, depending on `transport`.
    pub endpoint: String,
    pub transport: TransportKind,
    /// Delay between connection attempts. [`RETRY_DELAY`] unless a test
    /// needs something faster.
    pub retry_delay: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:3001/simulator".to_string(),
            transport: TransportKind::WebSocket,
            retry_delay: RETRY_DELAY,
        }
    }
}

/// Supervised bidirectional link between the simulation loop and one peer.
pub struct SocketChannel {
    outbound: QueueSender<Report>,
    inbound: QueueReceiver<Request>,
    connected: Arc<AtomicBool>,
    attempts: Arc<AtomicU64>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SocketChannel {
    /// Spawn the connection task. Must be called from within a tokio
    /// runtime. The task starts connecting immediately.
    pub fn connect(config: ChannelConfig) -> Self {
        let (out_tx, out_rx) = queue::channel();
        let (in_tx, in_rx) = queue::channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let connected = Arc::new(AtomicBool::new(false));
        let attempts = Arc::new(AtomicU64::new(0));

        let task = tokio::spawn(run(
            config,
            out_rx,
            in_tx,
            shutdown_rx,
            Arc::clone(&connected),
            Arc::clone(&attempts),
        ));

        Self {
            outbound: out_tx,
            inbound: in_rx,
            connected,
            attempts,
            shutdown: shutdown_tx,
            task,
        }
    }

    /// Enqueue a report for delivery. Returns immediately; the actual
    /// socket write happens on the connection task. Reports enqueued while
    /// the link is down are delivered once it comes back up.
    pub fn send(&self, report: Report) {
        if self.outbound.push(report).is_err() {
            warn!("socket channel task is gone; dropping outbound report");
        }
    }

    /// Take every request received since the last drain, in arrival order.
    pub fn drain(&mut self) -> Vec<Request> {
        self.inbound.drain()
    }

    /// Whether the link to the peer is currently up.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Number of connection attempts made so far, successful or not.
    pub fn connect_attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Stop the connection task and close the socket. In-flight sends are
    /// best effort; delivery is not guaranteed.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

async fn run(
    config: ChannelConfig,
    mut outbound: QueueReceiver<Report>,
    inbound: QueueSender<Request>,
    mut shutdown: watch::Receiver<bool>,
    connected: Arc<AtomicBool>,
    attempts: Arc<AtomicU64>,
) {
    loop {
        let Some(mut transport) = connect_with_retry(&config, &mut shutdown, &attempts).await
        else {
            return;
        };
        connected.store(true, Ordering::SeqCst);
        info!(endpoint = %config.endpoint, "connected");

        let stop = pump(&mut *transport, &mut outbound, &inbound, &mut shutdown).await;

        connected.store(false, Ordering::SeqCst);
        transport.close().await;
        if stop {
            return;
        }
        info!(endpoint = %config.endpoint, "disconnected; reconnecting");
    }
}

/// Try to connect until it works or shutdown is signalled. Returns `None`
/// on shutdown.
async fn connect_with_retry(
    config: &ChannelConfig,
    shutdown: &mut watch::Receiver<bool>,
    attempts: &AtomicU64,
) -> Option<Box<dyn Transport>> {
    loop {
        if *shutdown.borrow() {
            return None;
        }
        attempts.fetch_add(1, Ordering::SeqCst);
        let result: Result<Box<dyn Transport>, _> = match config.transport {
            TransportKind::WebSocket => WsTransport::connect(&config.endpoint)
                .await
                .map(|t| Box::new(t) as Box<dyn Transport>),
            TransportKind::Tcp => TcpTransport::connect(&config.endpoint)
                .await
                .map(|t| Box::new(t) as Box<dyn Transport>),
        };
        match result {
            Ok(transport) => return Some(transport),
            Err(e) => {
                info!(endpoint = %config.endpoint, error = %e,
                    "connect failed; retrying in {:?}", config.retry_delay);
                tokio::select! {
                    _ = tokio::time::sleep(config.retry_delay) => {}
                    result = shutdown.changed() => {
                        if result.is_err() || *shutdown.borrow() {
                            return None;
                        }
                    }
                }
            }
        }
    }
}

/// One outcome of a `select!` round in [`pump`]. Socket writes happen
/// after the select completes, once the `transport.recv()` future (and its
/// borrow) is gone.
enum Step {
    /// Shut down for good.
    Stop,
    /// Connection is no longer usable; reconnect.
    Reconnect,
    /// Write this encoded report to the peer.
    Write(String),
    /// Nothing to do this round.
    Idle,
}

/// Pump one live connection until it drops or shutdown is signalled.
/// Returns `true` when the channel should stop for good.
async fn pump(
    transport: &mut dyn Transport,
    outbound: &mut QueueReceiver<Report>,
    inbound: &QueueSender<Request>,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    loop {
        let step = tokio::select! {
            result = shutdown.changed() => {
                if result.is_err() || *shutdown.borrow() {
                    Step::Stop
                } else {
                    Step::Idle
                }
            }
            outgoing = outbound.recv() => {
                match outgoing {
                    // The owning channel was dropped without a shutdown call.
                    None => Step::Stop,
                    Some(report) => match codec::encode_report(&report) {
                        Ok(text) => Step::Write(text),
                        Err(e) => {
                            warn!(error = %e, "unencodable report dropped");
                            Step::Idle
                        }
                    },
                }
            }
            incoming = transport.recv() => {
                match incoming {
                    Ok(Some(text)) => {
                        match codec::decode_request(&text) {
                            Ok(request) => {
                                let _ = inbound.push(request);
                            }
                            Err(e) => warn!(error = %e, "dropping inbound message"),
                        }
                        Step::Idle
                    }
                    Ok(None) => {
                        info!("peer closed the connection");
                        Step::Reconnect
                    }
                    Err(e) => {
                        info!(error = %e, "read failed");
                        Step::Reconnect
                    }
                }
            }
        };

        match step {
            Step::Stop => return true,
            Step::Reconnect => return false,
            Step::Write(text) => {
                if let Err(e) = transport.send(&text).await {
                    warn!(error = %e, "send failed; dropping connection");
                    return false;
                }
            }
            Step::Idle => {}
        }
    }
}
