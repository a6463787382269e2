//! [`Motor`] – one virtual motor on the rover.
//!
//! A motor holds targets (power, position, velocity) set by the
//! dispatcher and current state set by the physics collaborator. Once per
//! tick it enforces the power watchdog, edge-triggers its limit switches,
//! and emits a status report when its per-motor period elapses.
//!
//! Positions are degrees internally and millidegrees on the wire; the
//! per-motor `reverse` flag flips the sign symmetrically on both
//! directions of that conversion.

use std::time::{Duration, Instant};

use roversim_types::{
    LimitPosition, LimitSwitch, PositionSensor, Report, RunMode, SimError,
    degrees_to_millidegrees, millidegrees_to_degrees,
};
use tracing::debug;

/// How long a power request stays in effect before the simulated watchdog
/// timer zeroes it.
pub const POWER_TIMEOUT: Duration = Duration::from_secs(1);

/// One limit switch: what it does and where along the travel it sits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimitSwitchConfig {
    pub mode: LimitSwitch,
    /// Trigger position in degrees.
    pub position: f64,
}

impl Default for LimitSwitchConfig {
    fn default() -> Self {
        Self {
            mode: LimitSwitch::None,
            position: 0.0,
        }
    }
}

/// Static configuration for one motor, supplied by the simulation config.
#[derive(Debug, Clone)]
pub struct MotorConfig {
    pub name: String,
    /// Flips the sign of wire positions for this motor.
    pub reverse: bool,
    pub position_sensor: PositionSensor,
    /// Added to reported positions when the sensor is a potentiometer.
    pub potentiometer_offset: f64,
    pub min_limit: LimitSwitchConfig,
    pub max_limit: LimitSwitchConfig,
    pub status_report_period: Duration,
}

impl MotorConfig {
    /// A sensorless, non-reversed motor reporting once per second.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reverse: false,
            position_sensor: PositionSensor::None,
            potentiometer_offset: 0.0,
            min_limit: LimitSwitchConfig::default(),
            max_limit: LimitSwitchConfig::default(),
            status_report_period: Duration::from_secs(1),
        }
    }

    pub fn with_encoder(mut self) -> Self {
        self.position_sensor = PositionSensor::Encoder;
        self
    }

    pub fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }
}

/// A motor on the rover.
#[derive(Debug)]
pub struct Motor {
    config: MotorConfig,
    mode: RunMode,
    target_power: f64,
    current_power: f64,
    target_position: f64,
    current_position: f64,
    target_velocity: f64,
    current_velocity: f64,
    power_deadline: Option<Instant>,
    min_triggered: bool,
    max_triggered: bool,
    next_status_report: Instant,
}

impl Motor {
    pub fn new(config: MotorConfig, now: Instant) -> Self {
        Self {
            config,
            mode: RunMode::RunWithPower,
            target_power: 0.0,
            current_power: 0.0,
            target_position: 0.0,
            current_position: 0.0,
            target_velocity: 0.0,
            current_velocity: 0.0,
            power_deadline: None,
            min_triggered: false,
            max_triggered: false,
            // First status report goes out on the next tick.
            next_status_report: now,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn has_position_sensor(&self) -> bool {
        self.config.position_sensor != PositionSensor::None
    }

    /// Switch the control discipline.
    ///
    /// # Errors
    ///
    /// [`SimError::NoPositionSensor`] when asked for position or velocity
    /// control on a motor that cannot read its position.
    pub fn set_mode(&mut self, mode: RunMode) -> Result<(), SimError> {
        if mode != RunMode::RunWithPower {
            self.ensure_position_sensor()?;
        }
        self.mode = mode;
        Ok(())
    }

    pub fn target_power(&self) -> f64 {
        self.target_power
    }

    /// Set the power the motor runs with in `RunWithPower` mode and arm the
    /// watchdog that zeroes it one second later.
    ///
    /// # Errors
    ///
    /// [`SimError::PowerOutOfRange`] when `|power| > 1`.
    pub fn set_target_power(&mut self, power: f64, now: Instant) -> Result<(), SimError> {
        if !(-1.0..=1.0).contains(&power) {
            return Err(SimError::PowerOutOfRange(power));
        }
        self.target_power = power;
        self.power_deadline = Some(now + POWER_TIMEOUT);
        Ok(())
    }

    pub fn current_power(&self) -> f64 {
        self.current_power
    }

    /// Record the power the physics collaborator is actually applying.
    pub fn set_current_power(&mut self, power: f64) -> Result<(), SimError> {
        if !(-1.0..=1.0).contains(&power) {
            return Err(SimError::PowerOutOfRange(power));
        }
        self.current_power = power;
        Ok(())
    }

    /// The position this motor runs toward in `RunToPosition` mode.
    pub fn target_position_degrees(&self) -> Result<f64, SimError> {
        self.ensure_position_sensor()?;
        Ok(self.target_position)
    }

    pub fn set_target_position_degrees(&mut self, degrees: f64) -> Result<(), SimError> {
        self.ensure_position_sensor()?;
        self.target_position = degrees;
        Ok(())
    }

    /// Accept a wire-format position request: millidegrees, sign flipped
    /// when the motor is reversed.
    pub fn set_target_position_millidegrees(&mut self, millidegrees: i64) -> Result<(), SimError> {
        let degrees = millidegrees_to_degrees(millidegrees) * self.sign();
        self.set_target_position_degrees(degrees)
    }

    pub fn current_position_degrees(&self) -> f64 {
        self.current_position
    }

    /// Record the position the physics collaborator has moved the motor to.
    pub fn set_current_position_degrees(&mut self, degrees: f64) {
        self.current_position = degrees;
    }

    pub fn target_velocity(&self) -> f64 {
        self.target_velocity
    }

    pub fn set_target_velocity(&mut self, velocity: f64) -> Result<(), SimError> {
        self.ensure_position_sensor()?;
        self.target_velocity = velocity;
        Ok(())
    }

    pub fn set_current_velocity(&mut self, velocity: f64) {
        self.current_velocity = velocity;
    }

    /// The wire-format position for status reports: millidegrees with this
    /// motor's sign convention, or `None` without a position sensor.
    pub fn position_millidegrees(&self) -> Option<i64> {
        match self.config.position_sensor {
            PositionSensor::None => None,
            PositionSensor::Encoder => {
                Some(degrees_to_millidegrees(self.current_position * self.sign()))
            }
            PositionSensor::Potentiometer => Some(degrees_to_millidegrees(
                (self.current_position + self.config.potentiometer_offset) * self.sign(),
            )),
        }
    }

    /// Zero the target power immediately (emergency stop).
    pub fn kill_power(&mut self) {
        self.target_power = 0.0;
        self.target_velocity = 0.0;
        self.power_deadline = None;
    }

    /// Advance one simulation tick: enforce the power watchdog, check limit
    /// switches, and emit any reports that are due.
    pub fn tick(&mut self, now: Instant) -> Vec<Report> {
        let mut reports = Vec::new();

        if self.mode == RunMode::RunWithPower
            && let Some(deadline) = self.power_deadline
            && now >= deadline
        {
            if self.target_power != 0.0 {
                debug!(motor = %self.config.name, "power watchdog expired");
            }
            self.target_power = 0.0;
            self.power_deadline = None;
        }

        self.check_limit(LimitPosition::Minimum, &mut reports);
        self.check_limit(LimitPosition::Maximum, &mut reports);

        if now >= self.next_status_report {
            reports.push(self.status_report());
            self.next_status_report = now + self.config.status_report_period;
        }

        reports
    }

    /// Build this motor's status report from its current state.
    pub fn status_report(&self) -> Report {
        Report::MotorStatus {
            motor: self.config.name.clone(),
            power: self.current_power,
            position: self.position_millidegrees(),
            velocity: (self.mode == RunMode::RunWithVelocity).then_some(self.current_velocity),
        }
    }

    fn check_limit(&mut self, which: LimitPosition, reports: &mut Vec<Report>) {
        let (config, triggered) = match which {
            LimitPosition::Minimum => (self.config.min_limit, &mut self.min_triggered),
            LimitPosition::Maximum => (self.config.max_limit, &mut self.max_triggered),
        };
        if config.mode == LimitSwitch::None {
            return;
        }
        let beyond = match which {
            LimitPosition::Minimum => self.current_position <= config.position,
            LimitPosition::Maximum => self.current_position >= config.position,
        };
        if beyond && !*triggered {
            *triggered = true;
            reports.push(Report::LimitSwitch {
                motor: self.config.name.clone(),
                limit: which,
            });
            if config.mode == LimitSwitch::KillAndReport {
                self.target_power = 0.0;
                self.power_deadline = None;
            }
        } else if !beyond {
            *triggered = false;
        }
    }

    fn sign(&self) -> f64 {
        if self.config.reverse { -1.0 } else { 1.0 }
    }

    fn ensure_position_sensor(&self) -> Result<(), SimError> {
        if self.config.position_sensor == PositionSensor::None {
            return Err(SimError::NoPositionSensor {
                motor: self.config.name.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoder_motor(name: &str, now: Instant) -> Motor {
        Motor::new(MotorConfig::named(name).with_encoder(), now)
    }

    #[test]
    fn power_out_of_range_is_rejected() {
        let now = Instant::now();
        let mut motor = Motor::new(MotorConfig::named("arm_base"), now);
        assert!(matches!(
            motor.set_target_power(1.5, now),
            Err(SimError::PowerOutOfRange(_))
        ));
        assert_eq!(motor.target_power(), 0.0);
    }

    #[test]
    fn watchdog_zeroes_power_after_the_timeout() {
        let now = Instant::now();
        let mut motor = Motor::new(MotorConfig::named("arm_base"), now);
        motor.set_target_power(0.8, now).unwrap();
        assert_eq!(motor.target_power(), 0.8);

        // Still powered within the window.
        motor.tick(now + Duration::from_millis(500));
        assert_eq!(motor.target_power(), 0.8);

        // Zeroed once the deadline passes.
        motor.tick(now + POWER_TIMEOUT + Duration::from_millis(1));
        assert_eq!(motor.target_power(), 0.0);
    }

    #[test]
    fn renewed_power_request_rearms_the_watchdog() {
        let now = Instant::now();
        let mut motor = Motor::new(MotorConfig::named("arm_base"), now);
        motor.set_target_power(0.8, now).unwrap();
        let later = now + Duration::from_millis(900);
        motor.set_target_power(0.6, later).unwrap();

        motor.tick(now + POWER_TIMEOUT + Duration::from_millis(1));
        assert_eq!(motor.target_power(), 0.6);
    }

    #[test]
    fn position_control_requires_a_sensor() {
        let now = Instant::now();
        let mut motor = Motor::new(MotorConfig::named("spinner"), now);
        assert!(matches!(
            motor.set_target_position_degrees(90.0),
            Err(SimError::NoPositionSensor { .. })
        ));
        assert!(matches!(
            motor.set_mode(RunMode::RunToPosition),
            Err(SimError::NoPositionSensor { .. })
        ));
        assert!(motor.target_position_degrees().is_err());
    }

    #[test]
    fn millidegree_request_converts_to_degrees() {
        let now = Instant::now();
        let mut motor = encoder_motor("shoulder", now);
        motor.set_target_position_millidegrees(12345).unwrap();
        assert!((motor.target_position_degrees().unwrap() - 12.345).abs() < 1e-9);
    }

    #[test]
    fn reversed_motor_flips_position_sign_both_ways() {
        let now = Instant::now();
        let mut motor = Motor::new(MotorConfig::named("shoulder").with_encoder().reversed(), now);

        motor.set_target_position_millidegrees(12345).unwrap();
        assert!((motor.target_position_degrees().unwrap() + 12.345).abs() < 1e-9);

        motor.set_current_position_degrees(12.345);
        assert_eq!(motor.position_millidegrees(), Some(-12345));
    }

    #[test]
    fn sensorless_motor_reports_null_position() {
        let now = Instant::now();
        let motor = Motor::new(MotorConfig::named("spinner"), now);
        assert_eq!(motor.position_millidegrees(), None);
        match motor.status_report() {
            Report::MotorStatus { position, .. } => assert!(position.is_none()),
            other => panic!("unexpected report: {other:?}"),
        }
    }

    #[test]
    fn potentiometer_offset_shifts_reported_position() {
        let now = Instant::now();
        let mut config = MotorConfig::named("wrist");
        config.position_sensor = PositionSensor::Potentiometer;
        config.potentiometer_offset = 10.0;
        let mut motor = Motor::new(config, now);
        motor.set_current_position_degrees(5.0);
        assert_eq!(motor.position_millidegrees(), Some(15_000));
    }

    #[test]
    fn status_reports_follow_the_configured_period() {
        let now = Instant::now();
        let mut config = MotorConfig::named("arm_base");
        config.status_report_period = Duration::from_millis(100);
        let mut motor = Motor::new(config, now);

        // Due immediately on the first tick.
        let reports = motor.tick(now);
        assert_eq!(reports.len(), 1);

        // Not due again until the period elapses.
        assert!(motor.tick(now + Duration::from_millis(50)).is_empty());
        let reports = motor.tick(now + Duration::from_millis(100));
        assert_eq!(reports.len(), 1);
    }

    #[test]
    fn velocity_mode_includes_velocity_in_status() {
        let now = Instant::now();
        let mut motor = encoder_motor("shoulder", now);
        motor.set_target_velocity(15.0).unwrap();
        motor.set_mode(RunMode::RunWithVelocity).unwrap();
        motor.set_current_velocity(14.5);
        match motor.status_report() {
            Report::MotorStatus { velocity, .. } => assert_eq!(velocity, Some(14.5)),
            other => panic!("unexpected report: {other:?}"),
        }
    }

    #[test]
    fn limit_switch_reports_once_per_crossing() {
        let now = Instant::now();
        let mut config = MotorConfig::named("shoulder").with_encoder();
        config.max_limit = LimitSwitchConfig {
            mode: LimitSwitch::Report,
            position: 90.0,
        };
        // Keep periodic status out of the way.
        config.status_report_period = Duration::from_secs(3600);
        let mut motor = Motor::new(config, now);
        motor.tick(now); // consume the initial status report

        motor.set_current_position_degrees(91.0);
        let reports = motor.tick(now + Duration::from_millis(10));
        assert!(
            reports
                .iter()
                .any(|r| matches!(r, Report::LimitSwitch { limit: LimitPosition::Maximum, .. }))
        );

        // Still beyond the limit: no repeat report.
        let reports = motor.tick(now + Duration::from_millis(20));
        assert!(reports.is_empty());

        // Back inside, then out again: a fresh report.
        motor.set_current_position_degrees(80.0);
        motor.tick(now + Duration::from_millis(30));
        motor.set_current_position_degrees(95.0);
        let reports = motor.tick(now + Duration::from_millis(40));
        assert_eq!(reports.len(), 1);
    }

    #[test]
    fn kill_and_report_limit_zeroes_power() {
        let now = Instant::now();
        let mut config = MotorConfig::named("shoulder").with_encoder();
        config.min_limit = LimitSwitchConfig {
            mode: LimitSwitch::KillAndReport,
            position: -45.0,
        };
        config.status_report_period = Duration::from_secs(3600);
        let mut motor = Motor::new(config, now);
        motor.tick(now);
        motor.set_target_power(-0.7, now).unwrap();

        motor.set_current_position_degrees(-50.0);
        let reports = motor.tick(now + Duration::from_millis(10));
        assert_eq!(reports.len(), 1);
        assert_eq!(motor.target_power(), 0.0);
    }

    #[test]
    fn kill_power_clears_targets() {
        let now = Instant::now();
        let mut motor = encoder_motor("shoulder", now);
        motor.set_target_power(0.5, now).unwrap();
        motor.kill_power();
        assert_eq!(motor.target_power(), 0.0);
        assert_eq!(motor.target_velocity(), 0.0);
    }
}
