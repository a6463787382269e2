//! Simulation configuration – reads `roversim.toml`.
//!
//! The link mode, per-motor names and sensor wiring, camera names, and
//! sensor report periods all live here. Every field has a default, so an
//! empty file (or no file at all) yields a runnable two-wheel rover.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use roversim_rover::motor::{LimitSwitchConfig, MotorConfig};
use roversim_types::{LimitSwitch, PositionSensor};
use serde::{Deserialize, Serialize};

/// How the simulator reaches its peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkMode {
    /// Run the WebSocket server and let peers connect to us.
    #[default]
    Server,
    /// Connect out to the rover server and reconnect until it appears.
    Client,
}

/// Wire protocol for client mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerTransport {
    #[default]
    Websocket,
    Tcp,
}

/// `[link]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    #[serde(default)]
    pub mode: LinkMode,
    /// Server mode: address to listen on.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Server mode: accepted URL paths.
    #[serde(default = "default_paths")]
    pub paths: Vec<String>,
    /// Client mode: peer endpoint (WebSocket URL or TCP `host:port`).
    #[serde(default = "default_peer_url")]
    pub peer_url: String,
    #[serde(default)]
    pub peer_transport: PeerTransport,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            mode: LinkMode::default(),
            bind_addr: default_bind_addr(),
            paths: default_paths(),
            peer_url: default_peer_url(),
            peer_transport: PeerTransport::default(),
        }
    }
}

/// One `[[motors]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotorEntry {
    pub name: String,
    #[serde(default)]
    pub reverse: bool,
    #[serde(default)]
    pub position_sensor: PositionSensor,
    #[serde(default)]
    pub potentiometer_offset: f64,
    #[serde(default = "default_report_period")]
    pub status_report_period_s: f64,
    #[serde(default)]
    pub min_limit: Option<LimitEntry>,
    #[serde(default)]
    pub max_limit: Option<LimitEntry>,
}

impl MotorEntry {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reverse: false,
            position_sensor: PositionSensor::None,
            potentiometer_offset: 0.0,
            status_report_period_s: default_report_period(),
            min_limit: None,
            max_limit: None,
        }
    }

    pub fn to_motor_config(&self) -> MotorConfig {
        let limit = |entry: &Option<LimitEntry>| match entry {
            Some(entry) => LimitSwitchConfig {
                mode: entry.mode,
                position: entry.position,
            },
            None => LimitSwitchConfig::default(),
        };
        MotorConfig {
            name: self.name.clone(),
            reverse: self.reverse,
            position_sensor: self.position_sensor,
            potentiometer_offset: self.potentiometer_offset,
            min_limit: limit(&self.min_limit),
            max_limit: limit(&self.max_limit),
            status_report_period: Duration::from_secs_f64(
                self.status_report_period_s.max(0.01),
            ),
        }
    }
}

/// A limit switch in a motor entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitEntry {
    pub mode: LimitSwitch,
    /// Trigger position in degrees.
    pub position: f64,
}

/// One `[[cameras]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraEntry {
    pub name: String,
}

/// `[sensors]` section. A period of zero disables that sensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    #[serde(default = "default_report_period")]
    pub gps_report_period_s: f64,
    #[serde(default)]
    pub gps_noise_meters: f64,
    #[serde(default = "default_report_period")]
    pub imu_report_period_s: f64,
    #[serde(default = "default_lidar_period")]
    pub lidar_scan_period_s: f64,
    #[serde(default = "default_report_period")]
    pub true_pose_report_period_s: f64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            gps_report_period_s: default_report_period(),
            gps_noise_meters: 0.0,
            imu_report_period_s: default_report_period(),
            lidar_scan_period_s: default_lidar_period(),
            true_pose_report_period_s: default_report_period(),
        }
    }
}

/// The whole `roversim.toml`.
///
/// Scalar fields come before the table fields so the file serializes
/// cleanly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Simulation tick rate in Hz.
    #[serde(default = "default_tick_hz")]
    pub tick_hz: f64,
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default = "default_motors")]
    pub motors: Vec<MotorEntry>,
    #[serde(default)]
    pub cameras: Vec<CameraEntry>,
    #[serde(default)]
    pub sensors: SensorConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_hz: default_tick_hz(),
            link: LinkConfig::default(),
            motors: default_motors(),
            cameras: Vec::new(),
            sensors: SensorConfig::default(),
        }
    }
}

fn default_bind_addr() -> String {
    "127.0.0.1:3001".to_string()
}
fn default_paths() -> Vec<String> {
    vec!["/mission-control".to_string(), "/simulator".to_string()]
}
fn default_peer_url() -> String {
    "ws://localhost:3001/simulator".to_string()
}
fn default_report_period() -> f64 {
    1.0
}
fn default_lidar_period() -> f64 {
    0.5
}
fn default_tick_hz() -> f64 {
    50.0
}
fn default_motors() -> Vec<MotorEntry> {
    vec![MotorEntry::named("left_wheel"), MotorEntry::named("right_wheel")]
}

/// Return the config path: `$ROVERSIM_CONFIG` or `./roversim.toml`.
pub fn config_path() -> PathBuf {
    std::env::var("ROVERSIM_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("roversim.toml"))
}

/// Load the config from disk. Returns `None` if the file does not exist.
pub fn load() -> Result<Option<SimConfig>, String> {
    load_from(&config_path())
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &PathBuf) -> Result<Option<SimConfig>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("failed to read config at {}: {e}", path.display()))?;
    let mut config: SimConfig =
        toml::from_str(&raw).map_err(|e| format!("failed to parse config: {e}"))?;
    apply_env_overrides(&mut config);
    Ok(Some(config))
}

/// Save the config to a specific path. Used to write a starter file on
/// first run.
pub fn save_to(config: &SimConfig, path: &PathBuf) -> Result<(), String> {
    let raw =
        toml::to_string_pretty(config).map_err(|e| format!("failed to serialize config: {e}"))?;
    fs::write(path, raw).map_err(|e| format!("failed to write config at {}: {e}", path.display()))
}

/// Apply `ROVERSIM_*` environment variable overrides to `config`.
///
/// | Variable | Config field |
/// |---|---|
/// | `ROVERSIM_MODE` | `link.mode` (`server` / `client`) |
/// | `ROVERSIM_BIND_ADDR` | `link.bind_addr` |
/// | `ROVERSIM_PEER_URL` | `link.peer_url` |
/// | `ROVERSIM_TICK_HZ` | `tick_hz` |
pub fn apply_env_overrides(config: &mut SimConfig) {
    if let Ok(v) = std::env::var("ROVERSIM_MODE") {
        match v.to_lowercase().as_str() {
            "server" => config.link.mode = LinkMode::Server,
            "client" => config.link.mode = LinkMode::Client,
            _ => {}
        }
    }
    if let Ok(v) = std::env::var("ROVERSIM_BIND_ADDR") {
        config.link.bind_addr = v;
    }
    if let Ok(v) = std::env::var("ROVERSIM_PEER_URL") {
        config.link.peer_url = v;
    }
    if let Ok(v) = std::env::var("ROVERSIM_TICK_HZ")
        && let Ok(hz) = v.parse::<f64>()
        && hz > 0.0
    {
        config.tick_hz = hz;
    }
}
