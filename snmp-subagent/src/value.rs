//! Value kinds, candidate values and typed values.
//!
//! A [`Candidate`] is whatever an outside caller offers: a number or a piece
//! of text. A [`Value`] is what the registry stores, tagged with exactly one
//! [`ValueKind`]. Moving from the first to the second always goes through a
//! conversion that can fail; nothing is coerced on a best-effort basis.

use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// The kind of a managed parameter.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    AsRefStr,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Integer,
    Enumerated,
    Unsigned,
    Counter,
    Gauge,
    Real,
    NetworkAddress,
    TimeInterval,
    Text,
}

impl ValueKind {
    /// Kinds that accept a `(minimum, maximum)` pair and a step.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::Integer | Self::Unsigned | Self::Counter | Self::Gauge | Self::Real
        )
    }

    /// Kinds validated with unsigned 32-bit arithmetic.
    pub fn is_unsigned(self) -> bool {
        matches!(self, Self::Unsigned | Self::Counter | Self::Gauge)
    }
}

/// Reasons a candidate is refused.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValueError {
    #[error("{candidate} is not representable as {domain}")]
    NotRepresentable {
        domain: &'static str,
        candidate: String,
    },

    #[error("value {value} out of range [{min}, {max}]")]
    OutOfRange {
        value: String,
        min: String,
        max: String,
    },

    #[error("value {value} not on step grid (from={min}, step={step})")]
    OffStep {
        value: String,
        min: String,
        step: String,
    },

    #[error("value {0} is not one of the permitted values")]
    NotPermitted(i32),

    #[error("{0} is not a dotted-quad address")]
    InvalidAddress(String),

    #[error("descriptor constraint is unusable: {0}")]
    BrokenConstraint(String),

    #[error("payload cannot be decoded: {0}")]
    Undecodable(String),
}

/// An untyped value offered for validation or for a write.
#[derive(Debug, Clone, PartialEq)]
pub enum Candidate {
    Signed(i64),
    Unsigned(u64),
    Real(f64),
    Text(String),
}

impl Candidate {
    fn not_representable(&self, domain: &'static str) -> ValueError {
        ValueError::NotRepresentable {
            domain,
            candidate: self.to_string(),
        }
    }

    pub fn to_i32(&self) -> Result<i32, ValueError> {
        let err = || self.not_representable("a 32-bit signed integer");
        match self {
            Self::Signed(v) => i32::try_from(*v).map_err(|_| err()),
            Self::Unsigned(v) => i32::try_from(*v).map_err(|_| err()),
            Self::Real(v) => {
                if v.fract() == 0.0 && *v >= i32::MIN as f64 && *v <= i32::MAX as f64 {
                    Ok(*v as i32)
                } else {
                    Err(err())
                }
            }
            Self::Text(s) => s.trim().parse::<i32>().map_err(|_| err()),
        }
    }

    pub fn to_u32(&self) -> Result<u32, ValueError> {
        let err = || self.not_representable("a 32-bit unsigned integer");
        match self {
            Self::Signed(v) => u32::try_from(*v).map_err(|_| err()),
            Self::Unsigned(v) => u32::try_from(*v).map_err(|_| err()),
            Self::Real(v) => {
                if v.fract() == 0.0 && *v >= 0.0 && *v <= u32::MAX as f64 {
                    Ok(*v as u32)
                } else {
                    Err(err())
                }
            }
            Self::Text(s) => s.trim().parse::<u32>().map_err(|_| err()),
        }
    }

    pub fn to_f64(&self) -> Result<f64, ValueError> {
        let value = match self {
            Self::Signed(v) => *v as f64,
            Self::Unsigned(v) => *v as f64,
            Self::Real(v) => *v,
            Self::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| self.not_representable("a floating value"))?,
        };
        if value.is_finite() {
            Ok(value)
        } else {
            Err(self.not_representable("a finite floating value"))
        }
    }

    pub fn to_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signed(v) => write!(f, "{}", v),
            Self::Unsigned(v) => write!(f, "{}", v),
            Self::Real(v) => write!(f, "{}", v),
            Self::Text(s) => write!(f, "{:?}", s),
        }
    }
}

macro_rules! candidate_from {
    ($variant:ident, $as:ty: $($t:ty),+) => {
        $(impl From<$t> for Candidate {
            fn from(v: $t) -> Self {
                Self::$variant(v as $as)
            }
        })+
    };
}

candidate_from!(Signed, i64: i8, i16, i32, i64);
candidate_from!(Unsigned, u64: u8, u16, u32, u64);
candidate_from!(Real, f64: f32, f64);

impl From<&str> for Candidate {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Candidate {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Ipv4Addr> for Candidate {
    fn from(v: Ipv4Addr) -> Self {
        Self::Unsigned(u32::from(v) as u64)
    }
}

/// A typed parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i32),
    Enumerated(i32),
    Unsigned(u32),
    Counter(u32),
    Gauge(u32),
    Real(f64),
    NetworkAddress(Ipv4Addr),
    TimeInterval(u32),
    Text(String),
}

impl Value {
    /// Returns the kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Integer(_) => ValueKind::Integer,
            Self::Enumerated(_) => ValueKind::Enumerated,
            Self::Unsigned(_) => ValueKind::Unsigned,
            Self::Counter(_) => ValueKind::Counter,
            Self::Gauge(_) => ValueKind::Gauge,
            Self::Real(_) => ValueKind::Real,
            Self::NetworkAddress(_) => ValueKind::NetworkAddress,
            Self::TimeInterval(_) => ValueKind::TimeInterval,
            Self::Text(_) => ValueKind::Text,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::Integer(v) | Self::Enumerated(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Self::Unsigned(v) | Self::Counter(v) | Self::Gauge(v) | Self::TimeInterval(v) => {
                Some(*v)
            }
            Self::NetworkAddress(a) => Some(u32::from(*a)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Real(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) | Self::Enumerated(v) => write!(f, "{}", v),
            Self::Unsigned(v) | Self::Counter(v) | Self::Gauge(v) | Self::TimeInterval(v) => {
                write!(f, "{}", v)
            }
            Self::Real(v) => write!(f, "{}", v),
            Self::NetworkAddress(a) => write!(f, "{}", a),
            Self::Text(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<Value> for Candidate {
    fn from(value: Value) -> Self {
        match value {
            Value::Integer(v) | Value::Enumerated(v) => Self::Signed(v as i64),
            Value::Unsigned(v) | Value::Counter(v) | Value::Gauge(v) | Value::TimeInterval(v) => {
                Self::Unsigned(v as u64)
            }
            Value::Real(v) => Self::Real(v),
            Value::NetworkAddress(a) => Self::from(a),
            Value::Text(s) => Self::Text(s),
        }
    }
}
