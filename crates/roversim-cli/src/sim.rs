//! Headless simulation assembly: the rover, its sensors, and a small
//! kinematic integrator standing in for the excluded physics engine.
//!
//! One [`Simulator::tick`] is one simulation frame: dispatch everything
//! the bridge drained, advance the virtual hardware, then collect the
//! reports that came due. The caller owns the pacing and the link.

use std::time::Instant;

use roversim_bridge::channel::SocketChannel;
use roversim_rover::camera::{CameraStream, FrameSource};
use roversim_rover::motor::Motor;
use roversim_rover::rover::{LEFT_WHEEL, RIGHT_WHEEL, Rover};
use roversim_rover::sensors::{GpsSensor, ImuSensor, LidarSensor, PoseReporter};
use roversim_rover::dispatch;
use roversim_server::SimulatorServer;
use roversim_types::{LidarPoint, Pose, Quat, Report, Request, RunMode, SimError};

use crate::config::SimConfig;

/// Top speed of the rover at full drive power, meters per second.
const MAX_SPEED: f64 = 1.5;
/// Top yaw rate at full steer, radians per second.
const MAX_YAW_RATE: f64 = 1.0;
/// Free-running motor speed at full power, degrees per second.
const MOTOR_RATE: f64 = 180.0;
/// Servo speed in position mode, degrees per second.
const SERVO_RATE: f64 = 90.0;

/// The network side of the simulation, either variant driven identically.
pub enum Link {
    /// Peers connect to us; reports go out on the `/simulator` path.
    Server(SimulatorServer),
    /// We connect out to the rover server.
    Client(SocketChannel),
}

impl Link {
    pub fn drain(&mut self) -> Vec<Request> {
        match self {
            Link::Server(server) => server.drain(),
            Link::Client(channel) => channel.drain(),
        }
    }

    pub fn send(&self, report: Report) {
        match self {
            Link::Server(server) => server.broadcast("/simulator", report),
            Link::Client(channel) => channel.send(report),
        }
    }

    pub async fn shutdown(self) {
        match self {
            Link::Server(mut server) => server.stop().await,
            Link::Client(channel) => channel.shutdown().await,
        }
    }
}

/// Deterministic synthetic camera frames for headless runs: a rolling
/// gradient so consecutive frames differ.
struct SyntheticFrames {
    counter: u8,
}

impl SyntheticFrames {
    fn new() -> Self {
        Self { counter: 0 }
    }
}

impl FrameSource for SyntheticFrames {
    fn capture(&mut self, width: u32, height: u32) -> Result<Vec<u8>, SimError> {
        self.counter = self.counter.wrapping_add(1);
        let base = self.counter;
        Ok((0..width * height)
            .map(|i| base.wrapping_add(i as u8))
            .collect())
    }
}

/// The assembled headless simulation.
pub struct Simulator {
    rover: Rover,
    gps: Option<GpsSensor>,
    imu: Option<ImuSensor>,
    lidar: Option<LidarSensor>,
    pose_reporter: Option<PoseReporter>,
    pose: Pose,
    /// Heading about the world up axis, radians; 0 faces world +z.
    heading: f64,
    lidar_sweep: Vec<LidarPoint>,
}

impl Simulator {
    /// Build the rover and sensors described by `config`. Sensor periods
    /// of zero disable that sensor.
    pub fn build(config: &SimConfig, now: Instant) -> Self {
        let mut rover = Rover::new();
        for entry in &config.motors {
            rover.add_motor(Motor::new(entry.to_motor_config(), now));
        }
        for entry in &config.cameras {
            rover.add_camera(
                CameraStream::new(entry.name.clone(), now),
                Box::new(SyntheticFrames::new()),
            );
        }

        let period = |seconds: f64| {
            (seconds > 0.0).then(|| std::time::Duration::from_secs_f64(seconds))
        };
        let sensors = &config.sensors;
        Self {
            rover,
            gps: period(sensors.gps_report_period_s)
                .map(|p| GpsSensor::new(p, sensors.gps_noise_meters, now)),
            imu: period(sensors.imu_report_period_s).map(|p| ImuSensor::new(p, now)),
            lidar: period(sensors.lidar_scan_period_s).map(|p| LidarSensor::new(p, now)),
            pose_reporter: period(sensors.true_pose_report_period_s)
                .map(|p| PoseReporter::new(p, now)),
            pose: Pose::default(),
            heading: 0.0,
            lidar_sweep: Vec::new(),
        }
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    pub fn rover(&self) -> &Rover {
        &self.rover
    }

    /// Replace the current lidar sweep (normally produced by raycasts in
    /// the rendering engine; headless runs leave it empty).
    pub fn set_lidar_sweep(&mut self, sweep: Vec<LidarPoint>) {
        self.lidar_sweep = sweep;
    }

    /// One simulation frame: dispatch, integrate, report.
    pub fn tick(&mut self, requests: Vec<Request>, now: Instant, dt: f64) -> Vec<Report> {
        for request in requests {
            dispatch(&mut self.rover, request, now);
        }

        self.advance(dt);

        let mut reports = self.rover.tick(now);
        if let Some(gps) = &mut self.gps {
            reports.extend(gps.tick(&self.pose, now));
        }
        if let Some(imu) = &mut self.imu {
            reports.extend(imu.tick(&self.pose, now));
        }
        if let Some(lidar) = &mut self.lidar {
            reports.extend(lidar.tick(&self.lidar_sweep, now));
        }
        if let Some(pose_reporter) = &mut self.pose_reporter {
            reports.extend(pose_reporter.tick(&self.pose, now));
        }
        reports
    }

    /// First-order stand-in for the physics engine: motors respond
    /// instantly to their targets and the chassis integrates the drive
    /// command.
    fn advance(&mut self, dt: f64) {
        for motor in self.rover.motors_mut() {
            match motor.mode() {
                RunMode::RunWithPower => {
                    let power = motor.target_power();
                    let _ = motor.set_current_power(power);
                    if motor.has_position_sensor() {
                        let degrees =
                            motor.current_position_degrees() + power * MOTOR_RATE * dt;
                        motor.set_current_position_degrees(degrees);
                    }
                }
                RunMode::RunToPosition => {
                    let Ok(target) = motor.target_position_degrees() else {
                        continue;
                    };
                    let current = motor.current_position_degrees();
                    let step = (SERVO_RATE * dt).min((target - current).abs());
                    let direction = (target - current).signum();
                    motor.set_current_position_degrees(current + direction * step);
                    let _ = motor.set_current_power(if step > 0.0 { direction } else { 0.0 });
                }
                RunMode::RunWithVelocity => {
                    let velocity = motor.target_velocity();
                    motor.set_current_velocity(velocity);
                    let degrees = motor.current_position_degrees() + velocity * dt;
                    motor.set_current_position_degrees(degrees);
                }
            }
        }

        // Chassis kinematics from the wheel motors themselves, so the power
        // watchdog and the emergency stop slow the rover down like real
        // drivetrain power loss would.
        let wheel = |name: &str| {
            self.rover
                .motor(name)
                .map(|m| m.target_power())
                .unwrap_or(0.0)
        };
        let (left, right) = (wheel(LEFT_WHEEL), wheel(RIGHT_WHEEL));
        let speed = (left + right) * 0.5 * MAX_SPEED;
        self.heading += (right - left) * MAX_YAW_RATE * dt;
        self.pose.position.x += speed * dt * self.heading.sin();
        self.pose.position.z += speed * dt * self.heading.cos();
        let half = self.heading * 0.5;
        self.pose.rotation = Quat::new(0.0, half.sin(), 0.0, half.cos());
    }
}
