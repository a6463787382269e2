//! `roversim-server` – the simulator's multi-client WebSocket listener.
//!
//! Mission Control and the rover server connect *to* the simulator here,
//! each on its own URL path. Every accepted connection becomes a
//! [`Session`][session::Session]; all sessions feed one shared inbound
//! queue that the simulation loop drains once per tick, and
//! [`SimulatorServer::broadcast`][server::SimulatorServer::broadcast]
//! fans reports out to every live session on a path.

pub mod server;
pub mod session;

pub use server::{ServerConfig, SimulatorServer};
pub use session::Session;
