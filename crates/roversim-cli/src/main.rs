//! `roversim` – headless rover simulator.
//!
//! Boots the bridge core without the rendering engine:
//!
//! 1. Loads `roversim.toml` (writing a starter file on first run).
//! 2. Starts the link: the WebSocket server on port 3001, or a client
//!    channel that keeps retrying until the rover server appears.
//! 3. Drops into the simulator console on stdin.
//! 4. Runs the fixed-rate tick loop: drain, dispatch, advance, report.
//! 5. Intercepts Ctrl-C to engage the emergency stop and exit cleanly.

mod config;
mod console;
mod sim;
mod telemetry;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use colored::Colorize;
use roversim_bridge::channel::{ChannelConfig, SocketChannel, TransportKind};
use roversim_bridge::queue;
use roversim_server::{ServerConfig, SimulatorServer};
use roversim_types::{Request, SimError};
use tracing::warn;

use crate::config::{LinkMode, PeerTransport, SimConfig};
use crate::sim::{Link, Simulator};

#[tokio::main]
async fn main() {
    let _telemetry_guard = telemetry::init("roversim");
    print_banner();

    let config = load_or_create_config();

    // Console and Ctrl-C both feed the same request queue the network
    // uses, so every input path goes through the one dispatcher.
    let (console_tx, mut console_rx) = queue::channel::<Request>();
    let shutdown = Arc::new(AtomicBool::new(false));

    let ctrlc_requests = console_tx.clone();
    let ctrlc_shutdown = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "Ctrl-C received – engaging emergency stop".yellow().bold());
        let _ = ctrlc_requests.push(Request::EmergencyStop { stop: true });
        ctrlc_shutdown.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler");
    }

    let link = match start_link(&config).await {
        Ok(link) => link,
        Err(e) => {
            eprintln!("{}: {e}", "failed to start link".red());
            return;
        }
    };

    // The console REPL blocks on stdin, so it lives on its own thread.
    {
        let shutdown = Arc::clone(&shutdown);
        let requests = console_tx.clone();
        std::thread::spawn(move || {
            let mut registry = console::CommandRegistry::new();
            for command in console::built_in_commands(requests, Arc::clone(&shutdown)) {
                registry.register(command);
            }
            console::run_repl(&registry, shutdown);
            registry.clear();
        });
    }

    run_sim_loop(&config, link, &mut console_rx, shutdown).await;
    println!("{}", "Goodbye.".green());
}

/// The fixed-rate simulation loop. Never blocks on the network: all I/O
/// sits behind the queues.
async fn run_sim_loop(
    config: &SimConfig,
    mut link: Link,
    console_rx: &mut queue::QueueReceiver<Request>,
    shutdown: Arc<AtomicBool>,
) {
    let dt = 1.0 / config.tick_hz;
    let mut simulator = Simulator::build(config, Instant::now());
    let mut ticker = tokio::time::interval(Duration::from_secs_f64(dt));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        let mut requests = link.drain();
        requests.extend(console_rx.drain());
        for report in simulator.tick(requests, Instant::now(), dt) {
            link.send(report);
        }
    }

    // Flush the emergency stop the Ctrl-C handler may have queued.
    let requests = console_rx.drain();
    if !requests.is_empty() {
        simulator.tick(requests, Instant::now(), dt);
    }
    link.shutdown().await;
}

async fn start_link(config: &SimConfig) -> Result<Link, SimError> {
    match config.link.mode {
        LinkMode::Server => {
            let bind_addr = config
                .link
                .bind_addr
                .parse()
                .map_err(|e| SimError::Transport(format!("bad bind address: {e}")))?;
            let mut server = SimulatorServer::new(ServerConfig {
                bind_addr,
                paths: config.link.paths.clone(),
            });
            server.start().await?;
            println!(
                "  Listening on {} ({})",
                config.link.bind_addr.bold(),
                config.link.paths.join(", ").dimmed()
            );
            Ok(Link::Server(server))
        }
        LinkMode::Client => {
            let channel = SocketChannel::connect(ChannelConfig {
                endpoint: config.link.peer_url.clone(),
                transport: match config.link.peer_transport {
                    PeerTransport::Websocket => TransportKind::WebSocket,
                    PeerTransport::Tcp => TransportKind::Tcp,
                },
                ..ChannelConfig::default()
            });
            println!("  Connecting to {}", config.link.peer_url.bold());
            Ok(Link::Client(channel))
        }
    }
}

fn load_or_create_config() -> SimConfig {
    match config::load() {
        Ok(Some(config)) => {
            println!("  Config loaded from {}", config::config_path().display().to_string().bold());
            config
        }
        Ok(None) => {
            let config = SimConfig::default();
            match config::save_to(&config, &config::config_path()) {
                Ok(()) => println!(
                    "  Wrote starter config to {}",
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {e}", "could not write starter config".yellow()),
            }
            config
        }
        Err(e) => {
            println!("{}: {e}", "config error".red());
            println!("  Using default configuration.");
            SimConfig::default()
        }
    }
}

fn print_banner() {
    println!();
    println!("{}", "  roversim – headless rover simulator".bold());
    println!("{}", "  type 'help' for console commands".dimmed());
    println!();
}
