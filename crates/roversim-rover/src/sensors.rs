//! Periodic sensor reporters.
//!
//! Each sensor watches externally-updated simulation state (the rover's
//! pose, the latest lidar sweep) and packages it into a wire report when
//! its period elapses. The physics and raycasting that produce that state
//! live in the simulation runtime; this module only converts and paces.
//!
//! Coordinate conventions: the simulation world is x-east, y-up, z-north;
//! rover coordinates are x-north, y-west, z-up. GPS assumes the world
//! origin sits on Null Island and uses a spherical-Earth approximation.

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Normal;
use roversim_types::{LidarPoint, Pose, Quat, Report, Vec3};

/// Earth's equatorial radius in meters.
const EARTH_RADIUS: f64 = 6_378_137.0;

/// Convert a position from simulation-world axes to rover axes.
pub fn world_to_rover_position(position: Vec3) -> Vec3 {
    // world z -> rover x, world -x -> rover y, world y -> rover z
    Vec3::new(position.z, -position.x, position.y)
}

/// Convert a rotation from simulation-world axes to rover axes.
pub fn world_to_rover_rotation(rotation: Quat) -> Quat {
    // world -z -> rover x, world x -> rover y, world -y -> rover z
    Quat::new(-rotation.z, rotation.x, -rotation.y, rotation.w)
}

/// Convert a ground offset in meters to geographic degrees from the
/// origin.
pub fn meters_to_geographic_degrees(meters: f64) -> f64 {
    (meters / EARTH_RADIUS).to_degrees()
}

// ────────────────────────────────────────────────────────────────────────────
// GPS
// ────────────────────────────────────────────────────────────────────────────

/// Periodically reports the rover's position as a GPS fix with Gaussian
/// noise of the configured standard deviation (meters) applied to each
/// ground axis before the geographic conversion.
pub struct GpsSensor {
    report_period: Duration,
    next_report: Instant,
    noise: Option<Normal<f64>>,
    rng: StdRng,
}

impl GpsSensor {
    pub fn new(report_period: Duration, noise_std_meters: f64, now: Instant) -> Self {
        Self {
            report_period,
            next_report: now,
            // Normal::new only fails for a non-finite or negative sigma;
            // treat those as "no noise".
            noise: Normal::new(0.0, noise_std_meters).ok().filter(|_| noise_std_meters > 0.0),
            rng: StdRng::from_entropy(),
        }
    }

    pub fn tick(&mut self, pose: &Pose, now: Instant) -> Option<Report> {
        if now < self.next_report {
            return None;
        }
        self.next_report = now + self.report_period;

        let north = pose.position.z + self.sample();
        let east = pose.position.x + self.sample();
        Some(Report::GpsPosition {
            latitude: meters_to_geographic_degrees(north),
            longitude: meters_to_geographic_degrees(east),
        })
    }

    fn sample(&mut self) -> f64 {
        match self.noise {
            Some(noise) => self.rng.sample(noise),
            None => 0.0,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// IMU
// ────────────────────────────────────────────────────────────────────────────

/// Periodically reports the rover's orientation quaternion in rover
/// coordinates.
pub struct ImuSensor {
    report_period: Duration,
    next_report: Instant,
}

impl ImuSensor {
    pub fn new(report_period: Duration, now: Instant) -> Self {
        Self {
            report_period,
            next_report: now,
        }
    }

    pub fn tick(&mut self, pose: &Pose, now: Instant) -> Option<Report> {
        if now < self.next_report {
            return None;
        }
        self.next_report = now + self.report_period;

        let q = world_to_rover_rotation(pose.rotation);
        Some(Report::ImuOrientation {
            x: q.x,
            y: q.y,
            z: q.z,
            w: q.w,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Lidar
// ────────────────────────────────────────────────────────────────────────────

/// Periodically packages the latest lidar sweep. The sweep itself comes
/// from the simulation runtime's raycasts; an empty sweep still reports.
pub struct LidarSensor {
    scan_period: Duration,
    next_scan: Instant,
}

impl LidarSensor {
    pub fn new(scan_period: Duration, now: Instant) -> Self {
        Self {
            scan_period,
            next_scan: now,
        }
    }

    pub fn tick(&mut self, points: &[LidarPoint], now: Instant) -> Option<Report> {
        if now < self.next_scan {
            return None;
        }
        self.next_scan = now + self.scan_period;
        Some(Report::Lidar {
            points: points.to_vec(),
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// True pose
// ────────────────────────────────────────────────────────────────────────────

/// Periodically reports the rover's ground-truth pose in rover
/// coordinates, bypassing all sensor noise.
pub struct PoseReporter {
    report_period: Duration,
    next_report: Instant,
}

impl PoseReporter {
    pub fn new(report_period: Duration, now: Instant) -> Self {
        Self {
            report_period,
            next_report: now,
        }
    }

    pub fn tick(&mut self, pose: &Pose, now: Instant) -> Option<Report> {
        if now < self.next_report {
            return None;
        }
        self.next_report = now + self.report_period;
        Some(Report::RoverTruePose {
            position: world_to_rover_position(pose.position),
            rotation: world_to_rover_rotation(pose.rotation),
        })
    }
}
