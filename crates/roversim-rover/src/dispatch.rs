//! Routes decoded requests to the rover hardware they name.
//!
//! [`dispatch`] runs on the simulation thread, once per drained request,
//! in arrival order. Every failure – an unknown motor or camera, a power
//! out of range, position control on a sensorless motor – is terminal for
//! that single request only: it is logged with the offending name and the
//! request is dropped with no partial side effect. Nothing here panics or
//! unwinds into the tick loop.

use std::time::Instant;

use roversim_types::{Request, RunMode};
use tracing::warn;

use crate::camera::StreamSettings;
use crate::rover::Rover;

/// Apply one request to the rover.
pub fn dispatch(rover: &mut Rover, request: Request, now: Instant) {
    match request {
        Request::Drive { straight, steer } => {
            if rover.is_emergency_stopped() {
                warn!("ignoring drive request while emergency stopped");
                return;
            }
            if let Err(e) = rover.set_drive(straight, steer, now) {
                warn!(error = %e, "drive request dropped");
            }
        }

        Request::EmergencyStop { stop } => rover.set_emergency_stopped(stop),

        Request::MotorPower { motor, power } => {
            if rover.is_emergency_stopped() {
                warn!(motor = %motor, "ignoring motor power request while emergency stopped");
                return;
            }
            let Some(target) = rover.motor_mut(&motor) else {
                warn!(motor = %motor, "unknown motor");
                return;
            };
            let result = target
                .set_target_power(power, now)
                .and_then(|_| target.set_mode(RunMode::RunWithPower));
            if let Err(e) = result {
                warn!(motor = %motor, error = %e, "motor power request dropped");
            }
        }

        Request::MotorPosition { motor, position } => {
            let Some(target) = rover.motor_mut(&motor) else {
                warn!(motor = %motor, "unknown motor");
                return;
            };
            let result = target
                .set_target_position_millidegrees(position)
                .and_then(|_| target.set_mode(RunMode::RunToPosition));
            if let Err(e) = result {
                warn!(motor = %motor, error = %e, "motor position request dropped");
            }
        }

        Request::MotorVelocity { motor, velocity } => {
            if rover.is_emergency_stopped() {
                warn!(motor = %motor, "ignoring motor velocity request while emergency stopped");
                return;
            }
            let Some(target) = rover.motor_mut(&motor) else {
                warn!(motor = %motor, "unknown motor");
                return;
            };
            let result = target
                .set_target_velocity(velocity)
                .and_then(|_| target.set_mode(RunMode::RunWithVelocity));
            if let Err(e) = result {
                warn!(motor = %motor, error = %e, "motor velocity request dropped");
            }
        }

        Request::CameraStreamOpen {
            camera,
            fps,
            width,
            height,
            intrinsic_parameters,
        } => {
            let Some(stream) = rover.camera_mut(&camera) else {
                warn!(camera = %camera, "unknown camera");
                return;
            };
            stream.open(
                StreamSettings {
                    fps,
                    width,
                    height,
                    intrinsics: intrinsic_parameters,
                },
                now,
            );
        }

        Request::CameraStreamClose { camera } => {
            let Some(stream) = rover.camera_mut(&camera) else {
                warn!(camera = %camera, "unknown camera");
                return;
            };
            stream.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraStream, FrameSource};
    use crate::motor::{Motor, MotorConfig};
    use roversim_types::{RunMode, SimError};

    struct BlankFrame;

    impl FrameSource for BlankFrame {
        fn capture(&mut self, width: u32, height: u32) -> Result<Vec<u8>, SimError> {
            Ok(vec![0u8; (width * height) as usize])
        }
    }

    fn rover(now: Instant) -> Rover {
        let mut rover = Rover::new();
        rover.add_motor(Motor::new(MotorConfig::named("arm_base"), now));
        rover.add_motor(Motor::new(
            MotorConfig::named("shoulder").with_encoder(),
            now,
        ));
        rover.add_camera(CameraStream::new("front", now), Box::new(BlankFrame));
        rover
    }

    fn open_request(camera: &str) -> Request {
        Request::CameraStreamOpen {
            camera: camera.to_string(),
            fps: 10.0,
            width: 320,
            height: 240,
            intrinsic_parameters: None,
        }
    }

    #[test]
    fn motor_power_sets_target_and_mode() {
        let now = Instant::now();
        let mut rover = rover(now);
        dispatch(
            &mut rover,
            Request::MotorPower {
                motor: "arm_base".to_string(),
                power: 0.5,
            },
            now,
        );
        let motor = rover.motor("arm_base").unwrap();
        assert_eq!(motor.target_power(), 0.5);
        assert_eq!(motor.mode(), RunMode::RunWithPower);
    }

    #[test]
    fn unknown_motor_does_not_panic_and_changes_nothing() {
        let now = Instant::now();
        let mut rover = rover(now);
        dispatch(
            &mut rover,
            Request::MotorPower {
                motor: "nonexistent".to_string(),
                power: 0.5,
            },
            now,
        );
        assert_eq!(rover.motor("arm_base").unwrap().target_power(), 0.0);
        assert_eq!(rover.motor("shoulder").unwrap().target_power(), 0.0);
    }

    #[test]
    fn out_of_range_power_is_dropped() {
        let now = Instant::now();
        let mut rover = rover(now);
        dispatch(
            &mut rover,
            Request::MotorPower {
                motor: "arm_base".to_string(),
                power: 2.0,
            },
            now,
        );
        assert_eq!(rover.motor("arm_base").unwrap().target_power(), 0.0);
    }

    #[test]
    fn position_request_converts_millidegrees_and_switches_mode() {
        let now = Instant::now();
        let mut rover = rover(now);
        dispatch(
            &mut rover,
            Request::MotorPosition {
                motor: "shoulder".to_string(),
                position: 12345,
            },
            now,
        );
        let motor = rover.motor("shoulder").unwrap();
        assert_eq!(motor.mode(), RunMode::RunToPosition);
        assert!((motor.target_position_degrees().unwrap() - 12.345).abs() < 1e-9);
    }

    #[test]
    fn position_request_on_sensorless_motor_leaves_mode_unchanged() {
        let now = Instant::now();
        let mut rover = rover(now);
        dispatch(
            &mut rover,
            Request::MotorPosition {
                motor: "arm_base".to_string(),
                position: 1000,
            },
            now,
        );
        assert_eq!(rover.motor("arm_base").unwrap().mode(), RunMode::RunWithPower);
    }

    #[test]
    fn velocity_request_switches_to_velocity_mode() {
        let now = Instant::now();
        let mut rover = rover(now);
        dispatch(
            &mut rover,
            Request::MotorVelocity {
                motor: "shoulder".to_string(),
                velocity: 12.0,
            },
            now,
        );
        let motor = rover.motor("shoulder").unwrap();
        assert_eq!(motor.mode(), RunMode::RunWithVelocity);
        assert_eq!(motor.target_velocity(), 12.0);
    }

    #[test]
    fn double_camera_open_streams_once() {
        let now = Instant::now();
        let mut rover = rover(now);
        dispatch(&mut rover, open_request("front"), now);
        assert!(rover.camera("front").unwrap().is_streaming());

        // Second open is a warn-logged no-op; the stream stays open with
        // its original settings.
        dispatch(&mut rover, open_request("front"), now);
        assert!(rover.camera("front").unwrap().is_streaming());
        assert_eq!(rover.camera("front").unwrap().settings().unwrap().fps, 10.0);
    }

    #[test]
    fn unknown_camera_open_is_dropped() {
        let now = Instant::now();
        let mut rover = rover(now);
        dispatch(&mut rover, open_request("ghost"), now);
        assert!(!rover.camera("front").unwrap().is_streaming());
    }

    #[test]
    fn camera_close_round_trip() {
        let now = Instant::now();
        let mut rover = rover(now);
        dispatch(&mut rover, open_request("front"), now);
        dispatch(
            &mut rover,
            Request::CameraStreamClose {
                camera: "front".to_string(),
            },
            now,
        );
        assert!(!rover.camera("front").unwrap().is_streaming());
    }

    #[test]
    fn emergency_stop_gates_motion_requests_until_released() {
        let now = Instant::now();
        let mut rover = rover(now);
        dispatch(&mut rover, Request::EmergencyStop { stop: true }, now);

        dispatch(
            &mut rover,
            Request::MotorPower {
                motor: "arm_base".to_string(),
                power: 0.5,
            },
            now,
        );
        assert_eq!(rover.motor("arm_base").unwrap().target_power(), 0.0);

        dispatch(&mut rover, Request::EmergencyStop { stop: false }, now);
        dispatch(
            &mut rover,
            Request::MotorPower {
                motor: "arm_base".to_string(),
                power: 0.5,
            },
            now,
        );
        assert_eq!(rover.motor("arm_base").unwrap().target_power(), 0.5);
    }
}
