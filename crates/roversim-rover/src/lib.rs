//! `roversim-rover` – the simulated rover's virtual hardware.
//!
//! Everything in this crate is touched exclusively from the simulation
//! tick; the network side only ever sees it through the request/report
//! queues. Physics is an external collaborator: it calls the
//! `set_current_*` methods, and this crate turns that state into periodic
//! wire reports.
//!
//! # Modules
//!
//! - [`motor`] – [`Motor`][motor::Motor]: run modes, power watchdog,
//!   limit switches, periodic status reports.
//! - [`camera`] – [`CameraStream`][camera::CameraStream]: the
//!   Closed/Streaming state machine and fps-paced frame reports.
//! - [`rover`] – [`Rover`][rover::Rover]: the name-keyed motor/camera
//!   registry, drive decomposition, and the emergency-stop latch.
//! - [`dispatch`] – routes one decoded [`Request`][roversim_types::Request]
//!   to the entity it names; failures are logged drops, never panics.
//! - [`sensors`] – periodic GPS/IMU/lidar/pose reporters and the
//!   world-to-rover coordinate conversions they share.

pub mod camera;
pub mod dispatch;
pub mod motor;
pub mod rover;
pub mod sensors;

pub use camera::{CameraStream, FrameSource, StreamSettings};
pub use dispatch::dispatch;
pub use motor::{LimitSwitchConfig, Motor, MotorConfig};
pub use rover::{LEFT_WHEEL, RIGHT_WHEEL, Rover};
pub use sensors::{GpsSensor, ImuSensor, LidarSensor, PoseReporter};
