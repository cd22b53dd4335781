//! Validation engine.
//!
//! Pure functions that decide whether a candidate satisfies a descriptor.
//! [`validate`] returns the typed value on success so callers never need a
//! second, unchecked conversion.

use std::net::Ipv4Addr;

use tracing::warn;

use crate::descriptor::ValueDescriptor;
use crate::value::{Candidate, Value, ValueError, ValueKind};

/// Tolerance on the fractional step coefficient of real values.
pub const REAL_STEP_TOLERANCE: f64 = 1e-10;

/// Whether `candidate` is acceptable for `descriptor`.
pub fn check_value(descriptor: &ValueDescriptor, candidate: &Candidate) -> bool {
    validate(descriptor, candidate).is_ok()
}

/// Validate a candidate and convert it to the descriptor's kind.
pub fn validate(descriptor: &ValueDescriptor, candidate: &Candidate) -> Result<Value, ValueError> {
    match descriptor.kind() {
        ValueKind::Integer => validate_integer(descriptor, candidate).map(Value::Integer),
        ValueKind::Enumerated => validate_enumerated(descriptor, candidate).map(Value::Enumerated),
        ValueKind::Unsigned => validate_unsigned(descriptor, candidate).map(Value::Unsigned),
        ValueKind::Counter => validate_unsigned(descriptor, candidate).map(Value::Counter),
        ValueKind::Gauge => validate_unsigned(descriptor, candidate).map(Value::Gauge),
        ValueKind::Real => validate_real(descriptor, candidate).map(Value::Real),
        ValueKind::NetworkAddress => validate_address(candidate).map(Value::NetworkAddress),
        ValueKind::TimeInterval => candidate.to_u32().map(Value::TimeInterval),
        ValueKind::Text => Ok(Value::Text(candidate.to_text())),
    }
}

fn broken(what: &str, descriptor: &ValueDescriptor) -> ValueError {
    warn!(
        "[VALIDATE] unusable {} on descriptor {}",
        what, descriptor
    );
    ValueError::BrokenConstraint(format!("{} of {}", what, descriptor.identifier()))
}

fn validate_integer(descriptor: &ValueDescriptor, candidate: &Candidate) -> Result<i32, ValueError> {
    let value = candidate.to_i32()?;
    let Some((min, max)) = descriptor.limits() else {
        return Ok(value);
    };
    let min = min.to_i32().map_err(|_| broken("minimum", descriptor))?;
    let max = max.to_i32().map_err(|_| broken("maximum", descriptor))?;
    if value < min || value > max {
        return Err(ValueError::OutOfRange {
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        });
    }

    if let Some(step) = descriptor.step() {
        let step = step.to_i32().map_err(|_| broken("step", descriptor))?;
        if step == 0 {
            return Err(broken("step", descriptor));
        }
        let offset = (i64::from(value) - i64::from(min)).unsigned_abs();
        if offset % u64::from(step.unsigned_abs()) != 0 {
            return Err(ValueError::OffStep {
                value: value.to_string(),
                min: min.to_string(),
                step: step.to_string(),
            });
        }
    }
    Ok(value)
}

fn validate_unsigned(descriptor: &ValueDescriptor, candidate: &Candidate) -> Result<u32, ValueError> {
    let value = candidate.to_u32()?;
    let Some((min, max)) = descriptor.limits() else {
        return Ok(value);
    };
    let min = min.to_u32().map_err(|_| broken("minimum", descriptor))?;
    let max = max.to_u32().map_err(|_| broken("maximum", descriptor))?;
    if value < min || value > max {
        return Err(ValueError::OutOfRange {
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        });
    }

    if let Some(step) = descriptor.step() {
        let step = step.to_u32().map_err(|_| broken("step", descriptor))?;
        if step == 0 {
            return Err(broken("step", descriptor));
        }
        if (value - min) % step != 0 {
            return Err(ValueError::OffStep {
                value: value.to_string(),
                min: min.to_string(),
                step: step.to_string(),
            });
        }
    }
    Ok(value)
}

fn validate_enumerated(descriptor: &ValueDescriptor, candidate: &Candidate) -> Result<i32, ValueError> {
    let value = candidate.to_i32()?;
    let Some(permitted) = descriptor.permitted_values() else {
        return Err(broken("permitted values", descriptor));
    };
    for allowed in permitted {
        let allowed = allowed
            .to_i32()
            .map_err(|_| broken("permitted value", descriptor))?;
        if allowed == value {
            return Ok(value);
        }
    }
    Err(ValueError::NotPermitted(value))
}

fn validate_real(descriptor: &ValueDescriptor, candidate: &Candidate) -> Result<f64, ValueError> {
    let value = candidate.to_f64()?;
    let Some((min, max)) = descriptor.limits() else {
        return Ok(value);
    };
    let min = min.to_f64().map_err(|_| broken("minimum", descriptor))?;
    let max = max.to_f64().map_err(|_| broken("maximum", descriptor))?;
    if value < min || value > max {
        return Err(ValueError::OutOfRange {
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        });
    }

    if let Some(step) = descriptor.step() {
        let step = step.to_f64().map_err(|_| broken("step", descriptor))?;
        if step <= 0.0 {
            return Err(broken("step", descriptor));
        }
        let coefficient = (value - min).abs() / step;
        // Representation error keeps the coefficient from being exactly integral.
        if coefficient.fract().abs() >= REAL_STEP_TOLERANCE {
            return Err(ValueError::OffStep {
                value: value.to_string(),
                min: min.to_string(),
                step: step.to_string(),
            });
        }
    }
    Ok(value)
}

fn validate_address(candidate: &Candidate) -> Result<Ipv4Addr, ValueError> {
    let text = match candidate {
        Candidate::Text(text) => text.trim().to_string(),
        other => Ipv4Addr::from(other.to_u32()?).to_string(),
    };
    parse_dotted_quad(&text).ok_or(ValueError::InvalidAddress(text))
}

/// Parse text that matches the dotted-quad grammar: four decimal octets in
/// `0..=255`, no sign, no leading zeros.
pub fn parse_dotted_quad(text: &str) -> Option<Ipv4Addr> {
    let mut octets = [0u8; 4];
    let mut count = 0;
    for part in text.split('.') {
        if count == 4 || part.is_empty() || part.len() > 3 {
            return None;
        }
        if !part.bytes().all(|b| b.is_ascii_digit()) || (part.len() > 1 && part.starts_with('0')) {
            return None;
        }
        octets[count] = part.parse::<u8>().ok()?;
        count += 1;
    }
    (count == 4).then(|| Ipv4Addr::from(octets))
}
