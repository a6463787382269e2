//! [`Rover`] – the registry of virtual hardware on the simulated rover.
//!
//! Motors and cameras are keyed by name; the dispatcher looks entities up
//! here at dispatch time and never owns them. The rover also owns the two
//! pieces of cross-cutting state: the drive command and the emergency-stop
//! latch.

use std::collections::HashMap;
use std::time::Instant;

use roversim_types::{Report, RunMode, SimError};
use tracing::info;

use crate::camera::{CameraStream, FrameSource};
use crate::motor::Motor;

/// Motor name the left drive side listens on.
pub const LEFT_WHEEL: &str = "left_wheel";
/// Motor name the right drive side listens on.
pub const RIGHT_WHEEL: &str = "right_wheel";

/// The simulated rover: a name-keyed registry of motors and cameras.
#[derive(Default)]
pub struct Rover {
    motors: HashMap<String, Motor>,
    cameras: HashMap<String, (CameraStream, Box<dyn FrameSource>)>,
    emergency_stopped: bool,
    drive: (f64, f64),
}

impl Rover {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a motor. A motor already registered under the same name is
    /// replaced.
    pub fn add_motor(&mut self, motor: Motor) {
        self.motors.insert(motor.name().to_string(), motor);
    }

    /// Register a camera together with its frame source.
    pub fn add_camera(&mut self, camera: CameraStream, source: Box<dyn FrameSource>) {
        self.cameras
            .insert(camera.name().to_string(), (camera, source));
    }

    pub fn motor(&self, name: &str) -> Option<&Motor> {
        self.motors.get(name)
    }

    pub fn motor_mut(&mut self, name: &str) -> Option<&mut Motor> {
        self.motors.get_mut(name)
    }

    pub fn camera(&self, name: &str) -> Option<&CameraStream> {
        self.cameras.get(name).map(|(camera, _)| camera)
    }

    pub fn camera_mut(&mut self, name: &str) -> Option<&mut CameraStream> {
        self.cameras.get_mut(name).map(|(camera, _)| camera)
    }

    /// All registered motors, for the physics collaborator to advance.
    pub fn motors_mut(&mut self) -> impl Iterator<Item = &mut Motor> {
        self.motors.values_mut()
    }

    /// The last accepted drive command as `(straight, steer)`.
    pub fn drive_state(&self) -> (f64, f64) {
        self.drive
    }

    pub fn is_emergency_stopped(&self) -> bool {
        self.emergency_stopped
    }

    /// Decompose a drive command into per-wheel powers and hand them to the
    /// `left_wheel`/`right_wheel` motors.
    ///
    /// # Errors
    ///
    /// [`SimError::UnknownMotor`] when either wheel motor is missing; the
    /// other wheel is left untouched in that case.
    pub fn set_drive(&mut self, straight: f64, steer: f64, now: Instant) -> Result<(), SimError> {
        if !self.motors.contains_key(LEFT_WHEEL) {
            return Err(SimError::UnknownMotor(LEFT_WHEEL.to_string()));
        }
        if !self.motors.contains_key(RIGHT_WHEEL) {
            return Err(SimError::UnknownMotor(RIGHT_WHEEL.to_string()));
        }

        let left = (straight - steer * 0.5).clamp(-1.0, 1.0);
        let right = (straight + steer * 0.5).clamp(-1.0, 1.0);
        for (name, power) in [(LEFT_WHEEL, left), (RIGHT_WHEEL, right)] {
            // Both motors exist; checked above.
            if let Some(motor) = self.motors.get_mut(name) {
                motor.set_target_power(power, now)?;
                motor.set_mode(RunMode::RunWithPower)?;
            }
        }
        self.drive = (straight, steer);
        Ok(())
    }

    /// Engage or release the emergency stop. Engaging zeroes every motor's
    /// targets; while latched, drive and motor requests are refused by the
    /// dispatcher.
    pub fn set_emergency_stopped(&mut self, stop: bool) {
        if stop == self.emergency_stopped {
            return;
        }
        self.emergency_stopped = stop;
        if stop {
            info!("emergency stop engaged");
            self.drive = (0.0, 0.0);
            for motor in self.motors.values_mut() {
                motor.kill_power();
            }
        } else {
            info!("emergency stop released");
        }
    }

    /// Advance every motor and camera one tick, collecting the reports that
    /// came due.
    pub fn tick(&mut self, now: Instant) -> Vec<Report> {
        let mut reports = Vec::new();
        for motor in self.motors.values_mut() {
            reports.extend(motor.tick(now));
        }
        for (camera, source) in self.cameras.values_mut() {
            reports.extend(camera.tick(now, source.as_mut()));
        }
        reports
    }
}
