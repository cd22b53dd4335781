//! Object identifiers and their dotted text form.
//!
//! An [`Oid`] is an ordered sequence of 32-bit sub-identifiers, rendered as
//! `.1.3.6.1.4.1`. The text form is the only accepted input form: a leading
//! dot, then one or more dot-separated decimal segments.

use std::fmt;
use std::str::FromStr;

/// Errors that can occur while parsing an identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OidError {
    /// Identifier text is empty
    Empty,
    /// Identifier does not start with '.'
    MissingLeadingDot(String),
    /// A segment between two dots is empty
    EmptySegment(String),
    /// A segment contains something other than decimal digits
    InvalidSegment(String),
    /// A segment does not fit in 32 bits
    SegmentOverflow(String),
}

impl fmt::Display for OidError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "identifier is empty"),
            Self::MissingLeadingDot(s) => write!(f, "identifier must start with '.': {}", s),
            Self::EmptySegment(s) => write!(f, "identifier has an empty segment: {}", s),
            Self::InvalidSegment(s) => write!(f, "identifier segment is not a number: {}", s),
            Self::SegmentOverflow(s) => write!(f, "identifier segment out of range: {}", s),
        }
    }
}

impl std::error::Error for OidError {}

/// A hierarchical numeric identifier.
///
/// Ordering is lexicographic over the sub-identifiers, which is the order a
/// management walk visits the tree in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Oid(Vec<u32>);

impl Oid {
    /// Build an identifier from sub-identifiers.
    ///
    /// Returns `None` for an empty sequence, which has no text form.
    pub fn from_parts(parts: impl Into<Vec<u32>>) -> Option<Self> {
        let parts = parts.into();
        if parts.is_empty() { None } else { Some(Self(parts)) }
    }

    pub fn parts(&self) -> &[u32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no sub-identifiers.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `self` lies in the subtree rooted at `prefix`.
    pub fn starts_with(&self, prefix: &Oid) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Append one sub-identifier, e.g. the `.0` instance suffix of a scalar.
    pub fn child(&self, sub_id: u32) -> Self {
        let mut parts = self.0.clone();
        parts.push(sub_id);
        Self(parts)
    }
}

/// Check that text matches the identifier grammar `("." digits)+`.
pub fn is_valid_oid_text(text: &str) -> bool {
    parse_parts(text).is_ok()
}

fn parse_parts(text: &str) -> Result<Vec<u32>, OidError> {
    if text.is_empty() {
        return Err(OidError::Empty);
    }
    let Some(rest) = text.strip_prefix('.') else {
        return Err(OidError::MissingLeadingDot(text.to_string()));
    };

    let mut parts = Vec::new();
    for segment in rest.split('.') {
        if segment.is_empty() {
            return Err(OidError::EmptySegment(text.to_string()));
        }
        if !segment.bytes().all(|b| b.is_ascii_digit()) {
            return Err(OidError::InvalidSegment(segment.to_string()));
        }
        let value = segment
            .parse::<u32>()
            .map_err(|_| OidError::SegmentOverflow(segment.to_string()))?;
        parts.push(value);
    }
    Ok(parts)
}

impl FromStr for Oid {
    type Err = OidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_parts(s).map(Self)
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in &self.0 {
            write!(f, ".{}", part)?;
        }
        Ok(())
    }
}

impl TryFrom<&str> for Oid {
    type Error = OidError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_render() {
        let oid: Oid = ".1.3.6.1.4.1".parse().unwrap();
        assert_eq!(oid.parts(), &[1, 3, 6, 1, 4, 1]);
        assert_eq!(oid.to_string(), ".1.3.6.1.4.1");
    }

    #[test]
    fn test_round_trip_canonical() {
        for text in [".1", ".0", ".1.3.6.1.4.1.99999.1.2", ".4294967295.7"] {
            let oid: Oid = text.parse().unwrap();
            assert_eq!(oid.to_string(), text);
        }
    }

    #[test]
    fn test_rejects_malformed() {
        assert_eq!("".parse::<Oid>(), Err(OidError::Empty));
        assert!(matches!(
            "1.3.6".parse::<Oid>(),
            Err(OidError::MissingLeadingDot(_))
        ));
        assert!(matches!(".".parse::<Oid>(), Err(OidError::EmptySegment(_))));
        assert!(matches!(
            ".1..3".parse::<Oid>(),
            Err(OidError::EmptySegment(_))
        ));
        assert!(matches!(".1.3.".parse::<Oid>(), Err(OidError::EmptySegment(_))));
        assert!(matches!(
            ".1.x.3".parse::<Oid>(),
            Err(OidError::InvalidSegment(_))
        ));
        assert!(matches!(
            ".1.-3".parse::<Oid>(),
            Err(OidError::InvalidSegment(_))
        ));
        assert!(matches!(
            ".1.4294967296".parse::<Oid>(),
            Err(OidError::SegmentOverflow(_))
        ));
    }

    #[test]
    fn test_ordering_and_prefix() {
        let a: Oid = ".1.3.6.1".parse().unwrap();
        let b: Oid = ".1.3.6.1.2".parse().unwrap();
        let c: Oid = ".1.3.7".parse().unwrap();
        assert!(a < b);
        assert!(b < c);
        assert!(b.starts_with(&a));
        assert!(!c.starts_with(&a));
        assert_eq!(a.child(0).to_string(), ".1.3.6.1.0");
    }

    #[test]
    fn test_from_parts() {
        assert!(Oid::from_parts(Vec::<u32>::new()).is_none());
        let oid = Oid::from_parts(vec![1, 2]).unwrap();
        assert_eq!(oid.to_string(), ".1.2");
        assert_eq!(oid.len(), 2);
        assert!(!oid.is_empty());
        assert!(is_valid_oid_text(".1.2"));
        assert!(!is_valid_oid_text("1.2"));
    }
}
