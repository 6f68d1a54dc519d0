//! pid.rs
//! Discrete PID controller driven once per scheduler tick.
//!
//! The loop only talks to the [`Controller`] trait: a stateful stepper that clamps
//! to the last committed [`OutputRange`], can be retuned live, and can have its
//! integral/derivative memory cleared. [`PidController`] is the default implementation:
//! - integral term accumulated in output units and clamped to the range (anti-windup)
//! - optional proportional-on-measurement (proportional action folded into the sum)
//! - derivative on measurement, low-pass filtered with the filter coefficient (rad/s, 0 = off)
//! - `inverse` flips the sign of all three gains

use std::sync::Arc;

use parking_lot::Mutex;

use crate::settings::values::{OutputRange, Tuning};

pub trait Controller: Send {
    /// Advances the controller by `dt_millis` and returns the clamped output.
    fn step(&mut self, setpoint: f64, measurement: f64, dt_millis: u64) -> f64;

    /// Clears integral and derivative memory. Tuning and range are kept.
    fn reset(&mut self);

    fn retune(&mut self, tuning: Tuning);

    fn set_output_range(&mut self, range: OutputRange);

    fn tuning(&self) -> Option<Tuning>;

    fn output_range(&self) -> Option<OutputRange>;
}

/// Controller shared between the event side and the scheduler thread.
/// Tuning commits and ticks both take the lock, so a tick never sees a half-applied tuning.
pub type SharedController = Arc<Mutex<Box<dyn Controller>>>;

pub fn shared(controller: impl Controller + 'static) -> SharedController {
    let boxed: Box<dyn Controller> = Box::new(controller);
    Arc::new(Mutex::new(boxed))
}

#[derive(Debug, Default)]
pub struct PidController {
    tuning: Option<Tuning>,
    range: Option<OutputRange>,

    // Internal state
    output_sum: f64,
    filtered_derivative: f64,
    last_measurement: Option<f64>,
}

impl PidController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(tuning: Tuning, range: OutputRange) -> Self {
        Self {
            tuning: Some(tuning),
            range: Some(range),
            ..Self::default()
        }
    }

    /// Accumulated integral (and proportional-on-measurement) term.
    pub fn output_sum(&self) -> f64 {
        self.output_sum
    }

    fn clamp(&self, value: f64) -> f64 {
        match self.range {
            Some(range) => range.clamp(value),
            None => value,
        }
    }
}

impl Controller for PidController {
    fn step(&mut self, setpoint: f64, measurement: f64, dt_millis: u64) -> f64 {
        let Some(tuning) = self.tuning else {
            return 0.0;
        };
        if dt_millis == 0 {
            return self.clamp(self.output_sum);
        }

        let dt = dt_millis as f64 / 1000.0;
        let direction = if tuning.inverse() { -1.0 } else { 1.0 };
        let kp = tuning.proportional_gain() * direction;
        let ki = tuning.integral_gain() * direction;
        let kd = tuning.derivative_gain() * direction;

        let error = setpoint - measurement;
        let d_input = self.last_measurement.map_or(0.0, |prev| measurement - prev);
        self.last_measurement = Some(measurement);

        self.output_sum += ki * error * dt;
        if tuning.proportional_on_measurement() {
            self.output_sum -= kp * d_input;
        }
        self.output_sum = self.clamp(self.output_sum);

        let proportional = if tuning.proportional_on_measurement() { 0.0 } else { kp * error };

        let n = tuning.filter_coefficient();
        let alpha = if n > 0.0 { n * dt / (1.0 + n * dt) } else { 1.0 };
        let raw_derivative = -d_input / dt;
        self.filtered_derivative += alpha * (raw_derivative - self.filtered_derivative);

        self.clamp(proportional + self.output_sum + kd * self.filtered_derivative)
    }

    fn reset(&mut self) {
        self.output_sum = 0.0;
        self.filtered_derivative = 0.0;
        self.last_measurement = None;
    }

    fn retune(&mut self, tuning: Tuning) {
        self.tuning = Some(tuning);
    }

    fn set_output_range(&mut self, range: OutputRange) {
        self.range = Some(range);
        self.output_sum = range.clamp(self.output_sum);
    }

    fn tuning(&self) -> Option<Tuning> {
        self.tuning
    }

    fn output_range(&self) -> Option<OutputRange> {
        self.range
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuning(kp: f64, ki: f64, kd: f64) -> Tuning {
        Tuning::new(kp, ki, kd, 0.0, false, false).unwrap()
    }

    fn range(limit: f64) -> OutputRange {
        OutputRange::new(limit, -limit).unwrap()
    }

    #[test]
    fn untuned_controller_outputs_zero() {
        let mut pid = PidController::new();
        assert_eq!(pid.step(1.0, 0.0, 100), 0.0);
    }

    #[test]
    fn proportional_only() {
        let mut pid = PidController::with_settings(tuning(2.0, 0.0, 0.0), range(10.0));
        assert_eq!(pid.step(1.0, 0.0, 100), 2.0);
        assert_eq!(pid.step(1.0, 0.5, 100), 1.0);
    }

    #[test]
    fn inverse_flips_direction() {
        let inverse = Tuning::new(2.0, 0.0, 0.0, 0.0, false, true).unwrap();
        let mut pid = PidController::with_settings(inverse, range(10.0));
        assert_eq!(pid.step(1.0, 0.0, 100), -2.0);
    }

    #[test]
    fn integral_accumulates_and_is_clamped() {
        let mut pid = PidController::with_settings(tuning(0.0, 1.0, 0.0), range(0.25));
        let first = pid.step(1.0, 0.0, 100);
        assert!((first - 0.1).abs() < 1e-12);
        pid.step(1.0, 0.0, 100);
        let third = pid.step(1.0, 0.0, 100);
        assert_eq!(third, 0.25);
        assert_eq!(pid.output_sum(), 0.25);
    }

    #[test]
    fn output_is_clamped_to_range() {
        let mut pid = PidController::with_settings(tuning(100.0, 0.0, 0.0), range(1.0));
        assert_eq!(pid.step(1.0, 0.0, 100), 1.0);
        assert_eq!(pid.step(-1.0, 0.0, 100), -1.0);
    }

    #[test]
    fn derivative_acts_on_measurement_change() {
        let mut pid = PidController::with_settings(tuning(0.0, 0.0, 1.0), range(100.0));
        assert_eq!(pid.step(0.0, 0.0, 100), 0.0);
        // measurement rose by 0.5 over 0.1 s
        let out = pid.step(0.0, 0.5, 100);
        assert!((out + 5.0).abs() < 1e-9);
    }

    #[test]
    fn filtered_derivative_is_smaller_than_raw() {
        let filtered = Tuning::new(0.0, 0.0, 1.0, 1.0, false, false).unwrap();
        let mut pid = PidController::with_settings(filtered, range(100.0));
        pid.step(0.0, 0.0, 100);
        let out = pid.step(0.0, 0.5, 100);
        assert!(out < 0.0 && out > -5.0);
    }

    #[test]
    fn proportional_on_measurement_has_no_setpoint_kick() {
        let pom = Tuning::new(1.0, 0.0, 0.0, 0.0, true, false).unwrap();
        let mut pid = PidController::with_settings(pom, range(10.0));
        assert_eq!(pid.step(5.0, 0.0, 100), 0.0);
        assert_eq!(pid.step(5.0, 1.0, 100), -1.0);
    }

    #[test]
    fn reset_clears_memory_but_keeps_tuning() {
        let t = tuning(0.0, 1.0, 0.0);
        let r = range(10.0);
        let mut pid = PidController::with_settings(t, r);
        pid.step(1.0, 0.0, 1000);
        assert!(pid.output_sum() > 0.0);
        pid.reset();
        assert_eq!(pid.output_sum(), 0.0);
        assert_eq!(pid.tuning(), Some(t));
        assert_eq!(pid.output_range(), Some(r));
    }

    #[test]
    fn retune_round_trips() {
        let mut pid = PidController::new();
        let t = Tuning::new(1.25, 0.5, 0.125, 3.0, true, true).unwrap();
        pid.retune(t);
        assert_eq!(pid.tuning(), Some(t));
    }
}
