//! Parameter definition files.
//!
//! ```yaml
//! parameters:
//!   - oid: ".1.3.6.1.4.1.8072.9999.1"
//!     kind: integer
//!     limits: [0, 100]
//!     step: 5
//!     initial: 20
//!   - oid: ".1.3.6.1.4.1.8072.9999.2"
//!     kind: enumerated
//!     permitted: [1, 2, 4]
//!     initial: 2
//!   - oid: ".1.3.6.1.4.1.8072.9999.3"
//!     kind: text
//!     read_only: true
//!     initial: "lab"
//! ```
//!
//! Identifiers should be quoted: a bare `.1` is read as a number by YAML.

use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::agent::Subagent;
use crate::descriptor::ValueDescriptor;
use crate::error::{AgentError, Result};
use crate::value::{Candidate, ValueKind};

/// A descriptor together with the value it is registered with.
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub descriptor: ValueDescriptor,
    pub initial: Candidate,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DefinitionFile {
    #[serde(default)]
    parameters: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Entry {
    oid: String,
    kind: ValueKind,
    #[serde(default)]
    limits: Option<(Scalar, Scalar)>,
    #[serde(default)]
    step: Option<Scalar>,
    #[serde(default)]
    permitted: Option<Vec<Scalar>>,
    initial: Scalar,
    #[serde(default)]
    read_only: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Signed(i64),
    Unsigned(u64),
    Real(f64),
    Text(String),
}

impl From<Scalar> for Candidate {
    fn from(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Signed(v) => Candidate::Signed(v),
            Scalar::Unsigned(v) => Candidate::Unsigned(v),
            Scalar::Real(v) => Candidate::Real(v),
            Scalar::Text(v) => Candidate::Text(v),
        }
    }
}

impl From<Entry> for Definition {
    fn from(entry: Entry) -> Self {
        let mut descriptor = ValueDescriptor::new(entry.oid, entry.kind).read_only(entry.read_only);
        if let Some((min, max)) = entry.limits {
            descriptor = descriptor.with_limits(min, max);
        }
        if let Some(step) = entry.step {
            descriptor = descriptor.with_step(step);
        }
        if let Some(permitted) = entry.permitted {
            descriptor = descriptor.with_permitted_values(permitted);
        }
        Definition {
            descriptor,
            initial: entry.initial.into(),
        }
    }
}

/// Load parameter definitions from a YAML file.
pub fn load_definitions_file(path: &Path) -> Result<Vec<Definition>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        AgentError::Config(format!("Failed to read definition file {:?}: {}", path, e))
    })?;
    load_definitions_str(&content)
}

/// Parse parameter definitions from a YAML string.
///
/// Only the file structure is checked here; descriptors are checked when
/// they are registered.
pub fn load_definitions_str(yaml: &str) -> Result<Vec<Definition>> {
    let file: DefinitionFile = serde_yaml::from_str(yaml)
        .map_err(|e| AgentError::Config(format!("Failed to parse definitions: {}", e)))?;
    debug!("[AGENT] Loaded {} parameter definitions", file.parameters.len());
    Ok(file.parameters.into_iter().map(Definition::from).collect())
}

/// Register definitions in order, stopping at the first failure.
///
/// Returns how many were registered. Parameters registered before the
/// failure stay registered.
pub fn register_all(agent: &Subagent, definitions: Vec<Definition>) -> Result<usize> {
    let mut registered = 0;
    for definition in definitions {
        let identifier = definition.descriptor.identifier().to_string();
        agent
            .register(definition.descriptor, definition.initial)
            .inspect_err(|e| warn!("[AGENT] Definition {} rejected: {}", identifier, e))?;
        registered += 1;
    }
    Ok(registered)
}
