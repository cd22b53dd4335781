//! Value descriptors: the typed contract of one managed parameter.
//!
//! A descriptor is built with an identifier and a kind, then refined with
//! builder calls before it is handed to the registry. The registry refuses
//! any descriptor that fails [`ValueDescriptor::check_well_formed`].

use std::fmt;

use crate::oid::{Oid, OidError};
use crate::value::{Candidate, ValueKind};

/// Rules a descriptor can break.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DescriptorError {
    #[error("malformed identifier: {0}")]
    MalformedIdentifier(#[from] OidError),

    #[error("enumerated kind requires a non-empty set of permitted values")]
    PermittedValuesRequired,

    #[error("kind {0} does not accept permitted values")]
    PermittedValuesForbidden(ValueKind),

    #[error("kind {0} does not accept limits")]
    LimitsForbidden(ValueKind),

    #[error("kind {0} does not accept a step")]
    StepForbidden(ValueKind),

    #[error("{what} {value} is not representable for kind {kind}")]
    Unrepresentable {
        what: &'static str,
        value: String,
        kind: ValueKind,
    },

    #[error("minimum {min} is greater than maximum {max}")]
    InvertedLimits { min: String, max: String },

    #[error("step {0} must be greater than zero")]
    NonPositiveStep(String),
}

/// Typed contract for one addressable parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueDescriptor {
    identifier: String,
    kind: ValueKind,
    limits: Option<(Candidate, Candidate)>,
    step: Option<Candidate>,
    permitted_values: Option<Vec<Candidate>>,
    read_only: bool,
}

impl ValueDescriptor {
    /// Create a writeable descriptor with no constraints.
    pub fn new(identifier: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            identifier: identifier.into(),
            kind,
            limits: None,
            step: None,
            permitted_values: None,
            read_only: false,
        }
    }

    pub fn with_limits(mut self, minimum: impl Into<Candidate>, maximum: impl Into<Candidate>) -> Self {
        self.limits = Some((minimum.into(), maximum.into()));
        self
    }

    /// Quantization step, measured from the minimum. Only enforced together
    /// with limits.
    pub fn with_step(mut self, step: impl Into<Candidate>) -> Self {
        self.step = Some(step.into());
        self
    }

    pub fn with_permitted_values<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Candidate>,
    {
        self.permitted_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn writeable(self, writeable: bool) -> Self {
        self.read_only(!writeable)
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn limits(&self) -> Option<(&Candidate, &Candidate)> {
        self.limits.as_ref().map(|(min, max)| (min, max))
    }

    pub fn has_limits(&self) -> bool {
        self.limits.is_some()
    }

    pub fn step(&self) -> Option<&Candidate> {
        self.step.as_ref()
    }

    pub fn has_step(&self) -> bool {
        self.step.is_some()
    }

    pub fn permitted_values(&self) -> Option<&[Candidate]> {
        self.permitted_values.as_deref()
    }

    pub fn has_permitted_values(&self) -> bool {
        self.permitted_values.is_some()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn is_writeable(&self) -> bool {
        !self.read_only
    }

    /// Parse the identifier into its sub-identifiers.
    pub fn oid(&self) -> Result<Oid, OidError> {
        self.identifier.parse()
    }

    pub fn is_well_formed(&self) -> bool {
        self.check_well_formed().is_ok()
    }

    /// Re-check every descriptor invariant and report the first violation.
    pub fn check_well_formed(&self) -> Result<(), DescriptorError> {
        self.oid()?;

        match self.kind {
            ValueKind::Enumerated => {
                match &self.permitted_values {
                    Some(values) if !values.is_empty() => {
                        for value in values {
                            value.to_i32().map_err(|_| self.unrepresentable("permitted value", value))?;
                        }
                    }
                    _ => return Err(DescriptorError::PermittedValuesRequired),
                }
                if self.has_limits() {
                    return Err(DescriptorError::LimitsForbidden(self.kind));
                }
                if self.has_step() {
                    return Err(DescriptorError::StepForbidden(self.kind));
                }
            }
            ValueKind::Integer
            | ValueKind::Unsigned
            | ValueKind::Counter
            | ValueKind::Gauge
            | ValueKind::Real => {
                if self.has_permitted_values() {
                    return Err(DescriptorError::PermittedValuesForbidden(self.kind));
                }
                self.check_numeric_constraints()?;
            }
            ValueKind::NetworkAddress | ValueKind::TimeInterval | ValueKind::Text => {
                if self.has_permitted_values() {
                    return Err(DescriptorError::PermittedValuesForbidden(self.kind));
                }
                if self.has_limits() {
                    return Err(DescriptorError::LimitsForbidden(self.kind));
                }
                if self.has_step() {
                    return Err(DescriptorError::StepForbidden(self.kind));
                }
            }
        }

        Ok(())
    }

    fn unrepresentable(&self, what: &'static str, value: &Candidate) -> DescriptorError {
        DescriptorError::Unrepresentable {
            what,
            value: value.to_string(),
            kind: self.kind,
        }
    }

    fn check_numeric_constraints(&self) -> Result<(), DescriptorError> {
        if let Some((min, max)) = &self.limits {
            let ordered = match self.kind {
                ValueKind::Integer => {
                    let lo = min.to_i32().map_err(|_| self.unrepresentable("minimum", min))?;
                    let hi = max.to_i32().map_err(|_| self.unrepresentable("maximum", max))?;
                    lo <= hi
                }
                ValueKind::Real => {
                    let lo = min.to_f64().map_err(|_| self.unrepresentable("minimum", min))?;
                    let hi = max.to_f64().map_err(|_| self.unrepresentable("maximum", max))?;
                    lo <= hi
                }
                _ => {
                    let lo = min.to_u32().map_err(|_| self.unrepresentable("minimum", min))?;
                    let hi = max.to_u32().map_err(|_| self.unrepresentable("maximum", max))?;
                    lo <= hi
                }
            };
            if !ordered {
                return Err(DescriptorError::InvertedLimits {
                    min: min.to_string(),
                    max: max.to_string(),
                });
            }
        }

        if let Some(step) = &self.step {
            let positive = match self.kind {
                ValueKind::Integer => {
                    step.to_i32().map_err(|_| self.unrepresentable("step", step))? > 0
                }
                ValueKind::Real => step.to_f64().map_err(|_| self.unrepresentable("step", step))? > 0.0,
                _ => step.to_u32().map_err(|_| self.unrepresentable("step", step))? > 0,
            };
            if !positive {
                return Err(DescriptorError::NonPositiveStep(step.to_string()));
            }
        }

        Ok(())
    }
}

impl fmt::Display for ValueDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValueDescriptor(oid: {}; kind: {}; ", self.identifier, self.kind)?;
        if let Some((min, max)) = &self.limits {
            write!(f, "min: {}; max: {}; ", min, max)?;
        }
        if let Some(step) = &self.step {
            write!(f, "step: {}; ", step)?;
        }
        if let Some(values) = &self.permitted_values {
            let rendered: Vec<String> = values.iter().map(ToString::to_string).collect();
            write!(f, "permitted: [{}]; ", rendered.join(", "))?;
        }
        write!(f, "writeable: {})", self.is_writeable())
    }
}
