//! Wire-level representation of values at the bridge boundary.
//!
//! The bridge hands the core a [`WireValue`]: a wire type tag plus the raw
//! payload bytes. Fixed-width payloads are decoded with explicit byte-order
//! functions; nothing here reinterprets memory.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::value::{Candidate, Value, ValueKind};

/// Width of every fixed-size payload.
pub const FIXED_WIDTH: usize = 4;

/// Default upper bound on octet-string payloads.
pub const DEFAULT_MAX_OCTETS: usize = 8192;

/// Significant digits used when rendering real values as text.
pub const REAL_SIGNIFICANT_DIGITS: usize = 9;

/// Wire types understood by the bridge.
///
/// Unsigned parameters travel as `Gauge`, which shares its tag with the
/// protocol's unsigned type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum WireType {
    Integer,
    OctetString,
    IpAddress,
    Counter,
    Gauge,
    TimeTicks,
}

impl WireType {
    pub fn tag(self) -> u8 {
        match self {
            Self::Integer => 0x02,
            Self::OctetString => 0x04,
            Self::IpAddress => 0x40,
            Self::Counter => 0x41,
            Self::Gauge => 0x42,
            Self::TimeTicks => 0x43,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x02 => Some(Self::Integer),
            0x04 => Some(Self::OctetString),
            0x40 => Some(Self::IpAddress),
            0x41 => Some(Self::Counter),
            0x42 => Some(Self::Gauge),
            0x43 => Some(Self::TimeTicks),
            _ => None,
        }
    }

    /// The wire type a parameter of `kind` is exchanged as.
    pub fn for_kind(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Integer | ValueKind::Enumerated => Self::Integer,
            ValueKind::Unsigned | ValueKind::Gauge => Self::Gauge,
            ValueKind::Counter => Self::Counter,
            ValueKind::Real | ValueKind::Text => Self::OctetString,
            ValueKind::NetworkAddress => Self::IpAddress,
            ValueKind::TimeInterval => Self::TimeTicks,
        }
    }

    pub fn is_fixed_width(self) -> bool {
        self != Self::OctetString
    }
}

/// A typed payload as carried by the external protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireValue {
    pub wire_type: WireType,
    pub payload: Vec<u8>,
}

impl WireValue {
    pub fn new(wire_type: WireType, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            wire_type,
            payload: payload.into(),
        }
    }

    pub fn octets(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(WireType::OctetString, payload)
    }
}

/// Byte order of fixed-width payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endianness {
    #[default]
    Big,
    Little,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("expected wire type {expected}, got {actual}")]
    WrongType { expected: WireType, actual: WireType },

    #[error("expected a {expected}-byte payload, got {actual} bytes")]
    WrongLength { expected: usize, actual: usize },

    #[error("payload of {len} bytes exceeds the limit of {max}")]
    TooLong { len: usize, max: usize },

    #[error("payload is not valid UTF-8")]
    InvalidText,
}

/// Converts between wire values and candidates or typed values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireCodec {
    pub byte_order: Endianness,
    pub max_octets: usize,
}

impl Default for WireCodec {
    fn default() -> Self {
        Self {
            byte_order: Endianness::Big,
            max_octets: DEFAULT_MAX_OCTETS,
        }
    }
}

impl WireCodec {
    pub fn new(byte_order: Endianness, max_octets: usize) -> Self {
        Self {
            byte_order,
            max_octets,
        }
    }

    /// Verify that a wire value has the type and length expected for `kind`.
    pub fn check_type(&self, kind: ValueKind, wire: &WireValue) -> Result<(), WireError> {
        let expected = WireType::for_kind(kind);
        if wire.wire_type != expected {
            return Err(WireError::WrongType {
                expected,
                actual: wire.wire_type,
            });
        }
        if expected.is_fixed_width() {
            if wire.payload.len() != FIXED_WIDTH {
                return Err(WireError::WrongLength {
                    expected: FIXED_WIDTH,
                    actual: wire.payload.len(),
                });
            }
        } else if wire.payload.len() > self.max_octets {
            return Err(WireError::TooLong {
                len: wire.payload.len(),
                max: self.max_octets,
            });
        }
        Ok(())
    }

    /// Decode a wire value into a candidate for `kind`'s validation.
    pub fn decode(&self, kind: ValueKind, wire: &WireValue) -> Result<Candidate, WireError> {
        self.check_type(kind, wire)?;
        let candidate = match kind {
            ValueKind::Integer | ValueKind::Enumerated => {
                Candidate::Signed(i64::from(self.read_i32(&wire.payload)))
            }
            ValueKind::Unsigned
            | ValueKind::Counter
            | ValueKind::Gauge
            | ValueKind::TimeInterval
            | ValueKind::NetworkAddress => Candidate::Unsigned(u64::from(self.read_u32(&wire.payload))),
            ValueKind::Real | ValueKind::Text => Candidate::Text(decode_text(&wire.payload)?),
        };
        Ok(candidate)
    }

    /// Encode a typed value for a reply.
    pub fn encode(&self, value: &Value) -> WireValue {
        let wire_type = WireType::for_kind(value.kind());
        let payload = match value {
            Value::Integer(v) | Value::Enumerated(v) => self.write_i32(*v),
            Value::Unsigned(v) | Value::Counter(v) | Value::Gauge(v) | Value::TimeInterval(v) => {
                self.write_u32(*v)
            }
            // Replies carry addresses in network order whatever the
            // configured byte order.
            Value::NetworkAddress(addr) => {
                let mut buf = [0u8; FIXED_WIDTH];
                BigEndian::write_u32(&mut buf, u32::from(*addr));
                buf.to_vec()
            }
            Value::Real(v) => format_real(*v).into_bytes(),
            Value::Text(s) => s.as_bytes().to_vec(),
        };
        WireValue { wire_type, payload }
    }

    fn read_i32(&self, bytes: &[u8]) -> i32 {
        match self.byte_order {
            Endianness::Big => BigEndian::read_i32(bytes),
            Endianness::Little => LittleEndian::read_i32(bytes),
        }
    }

    fn read_u32(&self, bytes: &[u8]) -> u32 {
        match self.byte_order {
            Endianness::Big => BigEndian::read_u32(bytes),
            Endianness::Little => LittleEndian::read_u32(bytes),
        }
    }

    fn write_i32(&self, v: i32) -> Vec<u8> {
        let mut buf = [0u8; FIXED_WIDTH];
        match self.byte_order {
            Endianness::Big => BigEndian::write_i32(&mut buf, v),
            Endianness::Little => LittleEndian::write_i32(&mut buf, v),
        }
        buf.to_vec()
    }

    fn write_u32(&self, v: u32) -> Vec<u8> {
        let mut buf = [0u8; FIXED_WIDTH];
        match self.byte_order {
            Endianness::Big => BigEndian::write_u32(&mut buf, v),
            Endianness::Little => LittleEndian::write_u32(&mut buf, v),
        }
        buf.to_vec()
    }
}

/// Octet strings may arrive NUL-padded from fixed buffers.
fn decode_text(payload: &[u8]) -> Result<String, WireError> {
    let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
    std::str::from_utf8(&payload[..end])
        .map(str::to_string)
        .map_err(|_| WireError::InvalidText)
}

/// Render a real with nine significant digits in the shortest of fixed or
/// exponent notation, trailing zeros removed (`printf("%.9g")`).
pub fn format_real(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }

    let precision = REAL_SIGNIFICANT_DIGITS - 1;
    let scientific = format!("{:.*e}", precision, value);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return value.to_string();
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return value.to_string();
    };

    if exponent < -4 || exponent >= REAL_SIGNIFICANT_DIGITS as i32 {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_fraction(mantissa), sign, exponent.abs())
    } else {
        let decimals = (precision as i32 - exponent) as usize;
        trim_fraction(&format!("{:.*}", decimals, value)).to_string()
    }
}

fn trim_fraction(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}
