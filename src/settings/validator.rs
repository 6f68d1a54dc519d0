//! validator.rs
//! Pure validation of raw text input against the harness' numeric rules.
//!
//! - `Integer`: optional sign, no leading zero except a literal `0`.
//! - `Float`: the integer shape followed by an optional `.digits` fraction.
//! - Domain predicates (`> 0`, `>= 0`, `max > min`) are applied after parsing.
//!
//! Nothing here has side effects, so a transaction can run every check before
//! committing any of them.

use crate::error::ValidationError;
use crate::settings::values::{
    OutputRange, PidSettingsInput, PlotRange, PlotSettingsInput, SignalParameters,
    SignalSettingsInput, Tuning,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Integer,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TypedValue {
    Integer(i64),
    Float(f64),
}

/// Checks `raw` against `rule` and parses it.
pub fn validate(field: &'static str, raw: &str, rule: Rule) -> Result<TypedValue, ValidationError> {
    let shaped = match rule {
        Rule::Integer => is_integer_shape(raw),
        Rule::Float => is_float_shape(raw),
    };
    if !shaped {
        return Err(cannot_parse(field));
    }

    match rule {
        Rule::Integer => raw
            .parse::<i64>()
            .map(TypedValue::Integer)
            .map_err(|_| cannot_parse(field)),
        Rule::Float => raw
            .parse::<f64>()
            .map(TypedValue::Float)
            .map_err(|_| cannot_parse(field)),
    }
}

pub fn parse_integer(field: &'static str, raw: &str) -> Result<i64, ValidationError> {
    match validate(field, raw, Rule::Integer)? {
        TypedValue::Integer(v) => Ok(v),
        TypedValue::Float(_) => Err(cannot_parse(field)),
    }
}

/// Well-shaped digit strings too long for an `f64` are rejected, not read as infinity.
pub fn parse_float(field: &'static str, raw: &str) -> Result<f64, ValidationError> {
    let value = match validate(field, raw, Rule::Float)? {
        TypedValue::Float(v) => v,
        TypedValue::Integer(v) => v as f64,
    };
    require(field, value.is_finite(), &format!("Value for {field} is out of range."))?;
    Ok(value)
}

/// Caller-supplied predicate: fails with `message` when `holds` is false.
pub fn require(field: &'static str, holds: bool, message: &str) -> Result<(), ValidationError> {
    if holds {
        Ok(())
    } else {
        Err(ValidationError::new(field, message))
    }
}

pub fn validate_plot_settings(input: &PlotSettingsInput) -> Result<PlotRange, ValidationError> {
    let domain_length = parse_integer("domain axis length", &input.domain_length)?;
    require(
        "domain axis length",
        domain_length > 0,
        "Value for domain axis length must be greater than 0.",
    )?;
    let range_maximum = parse_float("range axis maximum", &input.range_maximum)?;
    let range_minimum = parse_float("range axis minimum", &input.range_minimum)?;
    require(
        "range axis",
        range_maximum > range_minimum,
        "Values for range axis are not a valid interval.",
    )?;

    PlotRange::new(domain_length as u64, range_minimum, range_maximum)
}

pub fn validate_pid_settings(input: &PidSettingsInput) -> Result<(Tuning, OutputRange), ValidationError> {
    let proportional_gain = parse_float("proportional gain", &input.proportional_gain)?;
    let integral_gain = parse_float("integral gain", &input.integral_gain)?;
    let derivative_gain = parse_float("derivative gain", &input.derivative_gain)?;
    let filter_coefficient = parse_float("filter coefficient", &input.filter_coefficient)?;
    let output_maximum = parse_float("output maximum", &input.output_maximum)?;
    let output_minimum = parse_float("output minimum", &input.output_minimum)?;

    let tuning = Tuning::new(
        proportional_gain,
        integral_gain,
        derivative_gain,
        filter_coefficient,
        input.proportional_on_measurement,
        input.inverse,
    )?;
    let output_range = OutputRange::new(output_maximum, output_minimum)?;

    Ok((tuning, output_range))
}

pub fn validate_signal_settings(input: &SignalSettingsInput) -> Result<SignalParameters, ValidationError> {
    let calculation_skip = parse_integer("calculation skip", &input.calculation_skip)?;
    require(
        "calculation skip",
        calculation_skip >= 0,
        "Value for calculation skip must be positive.",
    )?;
    let sample_time = parse_integer("sample time", &input.sample_time)?;
    require(
        "sample time",
        sample_time > 0,
        "Value for sample time must be greater than 0.",
    )?;
    let offset = parse_float("offset", &input.offset)?;
    let factor = parse_float("factor", &input.factor)?;

    SignalParameters::new(calculation_skip as u64, sample_time as u64, offset, factor)
}

fn cannot_parse(field: &'static str) -> ValidationError {
    ValidationError::new(field, format!("Cannot parse value for {field}."))
}

// [+-]?(0|[1-9][0-9]*)
fn is_integer_shape(raw: &str) -> bool {
    let digits = raw.strip_prefix(['+', '-']).unwrap_or(raw);
    match digits.as_bytes() {
        [] => false,
        [b'0'] => true,
        [first, rest @ ..] => {
            (b'1'..=b'9').contains(first) && rest.iter().all(u8::is_ascii_digit)
        }
    }
}

// [+-]?(0|[1-9][0-9]*)(\.[0-9]+)?
fn is_float_shape(raw: &str) -> bool {
    match raw.split_once('.') {
        Some((whole, fraction)) => {
            is_integer_shape(whole)
                && !fraction.is_empty()
                && fraction.bytes().all(|b| b.is_ascii_digit())
        }
        None => is_integer_shape(raw),
    }
}
