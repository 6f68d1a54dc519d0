//! values.rs
//! Immutable value objects committed by a settings transaction.
//!
//! Each value is validated at construction and never mutated afterwards:
//! a change is always a whole replacement. The `*Input` structs carry the raw
//! text read from the front end at the moment a command was issued.

use crate::error::ValidationError;

/// PID tuning parameters. `filter_coefficient` is never negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tuning {
    proportional_gain: f64,
    integral_gain: f64,
    derivative_gain: f64,
    filter_coefficient: f64,
    proportional_on_measurement: bool,
    inverse: bool,
}

impl Tuning {
    pub fn new(
        proportional_gain: f64,
        integral_gain: f64,
        derivative_gain: f64,
        filter_coefficient: f64,
        proportional_on_measurement: bool,
        inverse: bool,
    ) -> Result<Self, ValidationError> {
        if !(filter_coefficient >= 0.0) {
            return Err(ValidationError::new(
                "filter coefficient",
                "Value for filter coefficient must not be negative.",
            ));
        }

        Ok(Self {
            proportional_gain,
            integral_gain,
            derivative_gain,
            filter_coefficient,
            proportional_on_measurement,
            inverse,
        })
    }

    pub fn proportional_gain(&self) -> f64 {
        self.proportional_gain
    }

    pub fn integral_gain(&self) -> f64 {
        self.integral_gain
    }

    pub fn derivative_gain(&self) -> f64 {
        self.derivative_gain
    }

    pub fn filter_coefficient(&self) -> f64 {
        self.filter_coefficient
    }

    pub fn proportional_on_measurement(&self) -> bool {
        self.proportional_on_measurement
    }

    pub fn inverse(&self) -> bool {
        self.inverse
    }
}

/// Absolute output clamp. `maximum > minimum` regardless of controller direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputRange {
    maximum: f64,
    minimum: f64,
}

impl OutputRange {
    pub fn new(maximum: f64, minimum: f64) -> Result<Self, ValidationError> {
        if !(maximum > minimum) {
            return Err(ValidationError::new(
                "output range",
                "Values for output range are not a valid interval.",
            ));
        }
        Ok(Self { maximum, minimum })
    }

    pub fn maximum(&self) -> f64 {
        self.maximum
    }

    pub fn minimum(&self) -> f64 {
        self.minimum
    }

    #[inline]
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.minimum, self.maximum)
    }
}

/// Cadence and scaling of the signal calculation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalParameters {
    calculation_skip: u64,
    sample_time_millis: u64,
    offset: f64,
    factor: f64,
}

impl SignalParameters {
    pub fn new(
        calculation_skip: u64,
        sample_time_millis: u64,
        offset: f64,
        factor: f64,
    ) -> Result<Self, ValidationError> {
        if sample_time_millis == 0 {
            return Err(ValidationError::new(
                "sample time",
                "Value for sample time must be greater than 0.",
            ));
        }
        Ok(Self { calculation_skip, sample_time_millis, offset, factor })
    }

    pub fn calculation_skip(&self) -> u64 {
        self.calculation_skip
    }

    pub fn sample_time_millis(&self) -> u64 {
        self.sample_time_millis
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }
}

impl Default for SignalParameters {
    fn default() -> Self {
        Self {
            calculation_skip: 0,
            sample_time_millis: 100,
            offset: 0.0,
            factor: 1.0,
        }
    }
}

/// Display window of the live plot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotRange {
    domain_length: u64,
    range_min: f64,
    range_max: f64,
}

impl PlotRange {
    pub fn new(domain_length: u64, range_min: f64, range_max: f64) -> Result<Self, ValidationError> {
        if domain_length == 0 {
            return Err(ValidationError::new(
                "domain axis length",
                "Value for domain axis length must be greater than 0.",
            ));
        }
        if !(range_max > range_min) {
            return Err(ValidationError::new(
                "range axis",
                "Values for range axis are not a valid interval.",
            ));
        }
        Ok(Self { domain_length, range_min, range_max })
    }

    pub fn domain_length(&self) -> u64 {
        self.domain_length
    }

    pub fn range_min(&self) -> f64 {
        self.range_min
    }

    pub fn range_max(&self) -> f64 {
        self.range_max
    }
}

impl Default for PlotRange {
    fn default() -> Self {
        Self { domain_length: 20_000, range_min: -2.0, range_max: 2.0 }
    }
}

/// Raw text of the plot settings fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlotSettingsInput {
    pub domain_length: String,
    pub range_maximum: String,
    pub range_minimum: String,
}

/// Raw text of the PID settings fields; the two flags come from check boxes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PidSettingsInput {
    pub proportional_gain: String,
    pub integral_gain: String,
    pub derivative_gain: String,
    pub filter_coefficient: String,
    pub proportional_on_measurement: bool,
    pub inverse: bool,
    pub output_maximum: String,
    pub output_minimum: String,
}

/// Raw text of the signal settings fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalSettingsInput {
    pub calculation_skip: String,
    pub sample_time: String,
    pub offset: String,
    pub factor: String,
}
