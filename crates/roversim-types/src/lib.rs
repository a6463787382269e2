use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A request sent by an external peer (Mission Control or the rover server)
/// to the simulator. The wire format is a JSON object whose `type` field
/// uniquely determines the payload shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Set the rover's drive velocity. `straight` and `steer` are in [-1, 1].
    #[serde(rename = "drive")]
    Drive { straight: f64, steer: f64 },
    /// Engage or release the rover's emergency stop.
    #[serde(rename = "emergencyStop")]
    EmergencyStop { stop: bool },
    /// Run a motor with the given power in [-1, 1].
    #[serde(rename = "simMotorPowerRequest")]
    MotorPower { motor: String, power: f64 },
    /// Run a motor to the given position. Positions are transmitted in
    /// millidegrees and converted to degrees internally.
    #[serde(rename = "simMotorPositionRequest")]
    MotorPosition { motor: String, position: i64 },
    /// Run a motor at the given velocity in degrees per second.
    #[serde(rename = "simMotorVelocityRequest")]
    MotorVelocity { motor: String, velocity: f64 },
    /// Begin streaming frames from a camera.
    #[serde(rename = "simCameraStreamOpenRequest")]
    CameraStreamOpen {
        camera: String,
        fps: f64,
        width: u32,
        height: u32,
        /// Flattened 3x3 intrinsic matrix. Absent means the camera keeps its
        /// default projection.
        #[serde(
            rename = "intrinsicParameters",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        intrinsic_parameters: Option<[f64; 9]>,
    },
    /// Stop streaming frames from a camera.
    #[serde(rename = "simCameraStreamCloseRequest")]
    CameraStreamClose { camera: String },
}

impl Request {
    /// Every wire `type` tag recognised as a [`Request`].
    pub const TYPES: &'static [&'static str] = &[
        "drive",
        "emergencyStop",
        "simMotorPowerRequest",
        "simMotorPositionRequest",
        "simMotorVelocityRequest",
        "simCameraStreamOpenRequest",
        "simCameraStreamCloseRequest",
    ];

    /// Whether `tag` names a known request variant.
    pub fn is_known_type(tag: &str) -> bool {
        Self::TYPES.contains(&tag)
    }
}

/// A report sent by the simulator to an external peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Report {
    /// Periodic motor telemetry. `position` is in millidegrees, `null` when
    /// the motor has no position sensor; the sign convention follows the
    /// motor's `reverse` configuration.
    #[serde(rename = "simMotorStatusReport")]
    MotorStatus {
        motor: String,
        power: f64,
        position: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        velocity: Option<f64>,
    },
    /// Noisy GPS fix in geographic degrees.
    #[serde(rename = "simGpsPositionReport")]
    GpsPosition { latitude: f64, longitude: f64 },
    /// IMU orientation quaternion in rover coordinates.
    #[serde(rename = "simImuOrientationReport")]
    ImuOrientation { x: f64, y: f64, z: f64, w: f64 },
    /// One full lidar sweep in polar coordinates.
    #[serde(rename = "simLidarReport")]
    Lidar { points: Vec<LidarPoint> },
    /// One camera frame, base64-encoded.
    #[serde(rename = "simCameraStreamReport")]
    CameraStream { camera: String, data: String },
    /// A motor's limit switch was triggered.
    #[serde(rename = "simLimitSwitchReport")]
    LimitSwitch { motor: String, limit: LimitPosition },
    /// Ground-truth pose, bypassing all sensor noise.
    #[serde(rename = "simRoverTruePoseReport")]
    RoverTruePose { position: Vec3, rotation: Quat },
}

/// One lidar return: range in meters, bearing in radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LidarPoint {
    pub r: f64,
    pub theta: f64,
}

/// A position or translation in rover coordinates (meters).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// A rotation quaternion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quat {
    pub fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    /// The identity rotation.
    pub fn identity() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0)
    }
}

impl Default for Quat {
    fn default() -> Self {
        Self::identity()
    }
}

/// A rigid-body pose: where the rover is and which way it faces.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

/// How a motor reads and reports its position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSensor {
    /// The motor cannot read its position.
    #[default]
    None,
    /// The motor reads its position relative to its start position.
    Encoder,
    /// The motor reads its position absolutely.
    Potentiometer,
}

/// How a motor behaves when one of its limit switches is triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LimitSwitch {
    /// No limit switch installed.
    #[default]
    None,
    /// Report the trigger but keep moving.
    Report,
    /// Zero the motor's power and report the trigger.
    KillAndReport,
}

/// Which end of a motor's travel a limit switch sits at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitPosition {
    Minimum,
    Maximum,
}

/// A motor's control discipline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Run with the target power.
    #[default]
    RunWithPower,
    /// Servo toward the target position.
    RunToPosition,
    /// Hold the target velocity.
    RunWithVelocity,
}

/// Convert a wire-format position (millidegrees) to internal degrees.
pub fn millidegrees_to_degrees(millidegrees: i64) -> f64 {
    millidegrees as f64 * 1e-3
}

/// Convert an internal position (degrees) to wire-format millidegrees.
pub fn degrees_to_millidegrees(degrees: f64) -> i64 {
    (degrees * 1000.0).round() as i64
}

/// Global error type spanning transport failures, protocol violations, and
/// caller-configuration mistakes.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("unknown motor: {0}")]
    UnknownMotor(String),

    #[error("unknown camera: {0}")]
    UnknownCamera(String),

    #[error("{motor} has no position sensor")]
    NoPositionSensor { motor: String },

    #[error("motor power out of range: {0}")]
    PowerOutOfRange(f64),

    #[error("channel error: {0}")]
    Channel(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip_request(request: &Request) -> Request {
        let json = serde_json::to_string(request).unwrap();
        serde_json::from_str(&json).unwrap()
    }

    fn roundtrip_report(report: &Report) -> Report {
        let json = serde_json::to_string(report).unwrap();
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn drive_roundtrip() {
        let request = Request::Drive {
            straight: 0.75,
            steer: -0.25,
        };
        assert_eq!(roundtrip_request(&request), request);
    }

    #[test]
    fn drive_wire_tag() {
        let json = serde_json::to_string(&Request::Drive {
            straight: 1.0,
            steer: 0.0,
        })
        .unwrap();
        assert!(json.contains(r#""type":"drive""#));
    }

    #[test]
    fn emergency_stop_roundtrip() {
        let request = Request::EmergencyStop { stop: true };
        assert_eq!(roundtrip_request(&request), request);
    }

    #[test]
    fn motor_power_roundtrip() {
        let request = Request::MotorPower {
            motor: "arm_base".to_string(),
            power: -0.5,
        };
        assert_eq!(roundtrip_request(&request), request);
    }

    #[test]
    fn motor_position_parses_wire_example() {
        let request: Request = serde_json::from_str(
            r#"{"type":"simMotorPositionRequest","motor":"shoulder","position":12345}"#,
        )
        .unwrap();
        assert_eq!(
            request,
            Request::MotorPosition {
                motor: "shoulder".to_string(),
                position: 12345,
            }
        );
    }

    #[test]
    fn motor_velocity_roundtrip() {
        let request = Request::MotorVelocity {
            motor: "elbow".to_string(),
            velocity: 15.0,
        };
        assert_eq!(roundtrip_request(&request), request);
    }

    #[test]
    fn camera_open_roundtrip_with_intrinsics() {
        let request = Request::CameraStreamOpen {
            camera: "front".to_string(),
            fps: 10.0,
            width: 320,
            height: 240,
            intrinsic_parameters: Some([500.0, 0.0, 160.0, 0.0, 500.0, 120.0, 0.0, 0.0, 1.0]),
        };
        assert_eq!(roundtrip_request(&request), request);
    }

    #[test]
    fn camera_open_intrinsics_are_optional() {
        let request: Request = serde_json::from_str(
            r#"{"type":"simCameraStreamOpenRequest","camera":"front","fps":10,"width":320,"height":240}"#,
        )
        .unwrap();
        match request {
            Request::CameraStreamOpen {
                intrinsic_parameters,
                ..
            } => assert!(intrinsic_parameters.is_none()),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn camera_open_omits_absent_intrinsics() {
        let json = serde_json::to_string(&Request::CameraStreamOpen {
            camera: "front".to_string(),
            fps: 10.0,
            width: 320,
            height: 240,
            intrinsic_parameters: None,
        })
        .unwrap();
        assert!(!json.contains("intrinsicParameters"));
    }

    #[test]
    fn camera_close_roundtrip() {
        let request = Request::CameraStreamClose {
            camera: "mast".to_string(),
        };
        assert_eq!(roundtrip_request(&request), request);
    }

    #[test]
    fn every_request_tag_is_listed() {
        let requests = [
            Request::Drive {
                straight: 0.0,
                steer: 0.0,
            },
            Request::EmergencyStop { stop: false },
            Request::MotorPower {
                motor: "m".to_string(),
                power: 0.0,
            },
            Request::MotorPosition {
                motor: "m".to_string(),
                position: 0,
            },
            Request::MotorVelocity {
                motor: "m".to_string(),
                velocity: 0.0,
            },
            Request::CameraStreamOpen {
                camera: "c".to_string(),
                fps: 1.0,
                width: 1,
                height: 1,
                intrinsic_parameters: None,
            },
            Request::CameraStreamClose {
                camera: "c".to_string(),
            },
        ];
        for request in &requests {
            let value = serde_json::to_value(request).unwrap();
            let tag = value["type"].as_str().unwrap();
            assert!(Request::is_known_type(tag), "tag {tag} missing from TYPES");
        }
        assert_eq!(requests.len(), Request::TYPES.len());
    }

    #[test]
    fn motor_status_null_position_roundtrip() {
        let report = Report::MotorStatus {
            motor: "spinner".to_string(),
            power: 0.3,
            position: None,
            velocity: None,
        };
        let json = serde_json::to_string(&report).unwrap();
        // A sensorless motor still reports the position field, as null.
        assert!(json.contains(r#""position":null"#));
        assert!(!json.contains("velocity"));
        assert_eq!(roundtrip_report(&report), report);
    }

    #[test]
    fn motor_status_with_position_roundtrip() {
        let report = Report::MotorStatus {
            motor: "shoulder".to_string(),
            power: -0.1,
            position: Some(-12345),
            velocity: Some(4.5),
        };
        assert_eq!(roundtrip_report(&report), report);
    }

    #[test]
    fn gps_report_roundtrip() {
        let report = Report::GpsPosition {
            latitude: 0.00012,
            longitude: -0.00034,
        };
        assert_eq!(roundtrip_report(&report), report);
    }

    #[test]
    fn imu_report_roundtrip() {
        let report = Report::ImuOrientation {
            x: 0.0,
            y: 0.0,
            z: 0.7071,
            w: 0.7071,
        };
        assert_eq!(roundtrip_report(&report), report);
    }

    #[test]
    fn lidar_report_roundtrip() {
        let report = Report::Lidar {
            points: vec![
                LidarPoint { r: 1.5, theta: 0.0 },
                LidarPoint {
                    r: 2.25,
                    theta: 3.14,
                },
            ],
        };
        assert_eq!(roundtrip_report(&report), report);
    }

    #[test]
    fn camera_stream_report_roundtrip() {
        let report = Report::CameraStream {
            camera: "front".to_string(),
            data: "AAECAw==".to_string(),
        };
        assert_eq!(roundtrip_report(&report), report);
    }

    #[test]
    fn limit_switch_report_wire_format() {
        let json = serde_json::to_string(&Report::LimitSwitch {
            motor: "shoulder".to_string(),
            limit: LimitPosition::Minimum,
        })
        .unwrap();
        assert!(json.contains(r#""limit":"minimum""#));
    }

    #[test]
    fn true_pose_report_roundtrip() {
        let report = Report::RoverTruePose {
            position: Vec3::new(1.0, -2.0, 0.5),
            rotation: Quat::identity(),
        };
        assert_eq!(roundtrip_report(&report), report);
    }

    #[test]
    fn millidegree_conversion_matches_wire_contract() {
        let degrees = millidegrees_to_degrees(12345);
        assert!((degrees - 12.345).abs() < 1e-9);
        assert_eq!(degrees_to_millidegrees(degrees), 12345);
    }

    #[test]
    fn millidegree_conversion_preserves_sign() {
        let degrees = millidegrees_to_degrees(-12345);
        assert!((degrees + 12.345).abs() < 1e-9);
        assert_eq!(degrees_to_millidegrees(degrees), -12345);
    }

    #[test]
    fn sim_error_display_names_the_entity() {
        let err = SimError::UnknownMotor("flail".to_string());
        assert!(err.to_string().contains("flail"));

        let err = SimError::NoPositionSensor {
            motor: "spinner".to_string(),
        };
        assert!(err.to_string().contains("spinner"));
    }
}
