//! Parameter registry.
//!
//! `ParameterRegistry` owns every registered parameter. It refuses malformed
//! descriptors and unvalidated values, so whatever it stores always satisfies
//! its descriptor.

use std::collections::BTreeMap;
use std::ops::Bound;

use tracing::{debug, warn};

use crate::descriptor::ValueDescriptor;
use crate::error::{AgentError, Result};
use crate::oid::Oid;
use crate::validate::validate;
use crate::value::{Candidate, Value};

/// A registered descriptor and its current value.
#[derive(Debug, Clone)]
pub struct Parameter {
    descriptor: ValueDescriptor,
    value: Value,
}

impl Parameter {
    pub fn descriptor(&self) -> &ValueDescriptor {
        &self.descriptor
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

/// Registry of all parameters exposed by one agent.
#[derive(Debug, Default)]
pub struct ParameterRegistry {
    parameters: BTreeMap<Oid, Parameter>,
    ready: bool,
}

impl ParameterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark start-up as complete; reads are refused before this.
    pub fn mark_ready(&mut self) {
        self.ready = true;
    }

    /// Back to the start-up state, used when the agent stops.
    pub(crate) fn clear_ready(&mut self) {
        self.ready = false;
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Check that a registration would succeed without performing it.
    pub fn check_registration(
        &self,
        descriptor: &ValueDescriptor,
        initial: &Candidate,
    ) -> Result<(Oid, Value)> {
        if let Err(reason) = descriptor.check_well_formed() {
            warn!(
                "[REGISTRY] Could not register object with an incorrect description: {} ({})",
                descriptor, reason
            );
            return Err(AgentError::MalformedDescriptor {
                identifier: descriptor.identifier().to_string(),
                reason,
            });
        }

        let oid = descriptor.oid().inspect_err(|e| {
            warn!("[REGISTRY] Could not parse OID {}: {}", descriptor.identifier(), e);
        })?;

        if self.parameters.contains_key(&oid) {
            warn!("[REGISTRY] OID {} has already been registered", oid);
            return Err(AgentError::AlreadyRegistered(oid));
        }

        let value = validate(descriptor, initial).map_err(|reason| {
            warn!(
                "[REGISTRY] Initial value {} rejected for OID {}: {}",
                initial, oid, reason
            );
            AgentError::BadValue {
                identifier: oid.clone(),
                reason,
            }
        })?;

        Ok((oid, value))
    }

    /// Register a parameter with its initial value.
    ///
    /// Fails without side effects if the descriptor is malformed, the
    /// identifier is taken, or the initial value does not validate.
    pub fn register(&mut self, descriptor: ValueDescriptor, initial: impl Into<Candidate>) -> Result<()> {
        let (oid, value) = self.check_registration(&descriptor, &initial.into())?;
        self.insert_checked(oid, descriptor, value);
        Ok(())
    }

    /// Store a parameter that already passed [`Self::check_registration`].
    pub(crate) fn insert_checked(&mut self, oid: Oid, descriptor: ValueDescriptor, value: Value) {
        debug!("[REGISTRY] OID {} has been registered [{}]", oid, value);
        self.parameters.insert(oid, Parameter { descriptor, value });
    }

    /// Remove a parameter.
    pub fn unregister(&mut self, identifier: &str) -> Result<()> {
        let oid: Oid = identifier.parse().inspect_err(|e| {
            warn!("[REGISTRY] Could not parse OID {}: {}", identifier, e);
        })?;
        self.unregister_oid(&oid)
    }

    pub fn unregister_oid(&mut self, oid: &Oid) -> Result<()> {
        if self.parameters.remove(oid).is_none() {
            warn!("[REGISTRY] OID {} is not registered", oid);
            return Err(AgentError::NotRegistered(oid.clone()));
        }
        debug!("[REGISTRY] OID {} has been unregistered", oid);
        Ok(())
    }

    /// Current value of a parameter.
    ///
    /// Reports `NotReady` before start-up completed and `NotRegistered` for
    /// unknown identifiers, so the two never look alike.
    pub fn read(&self, identifier: &str) -> Result<Value> {
        let oid: Oid = identifier.parse()?;
        self.read_oid(&oid)
    }

    pub fn read_oid(&self, oid: &Oid) -> Result<Value> {
        if !self.ready {
            return Err(AgentError::NotReady);
        }
        self.parameters
            .get(oid)
            .map(|p| p.value.clone())
            .ok_or_else(|| AgentError::NotRegistered(oid.clone()))
    }

    /// Replace the value of a parameter after validating it.
    pub fn write(&mut self, identifier: &str, candidate: impl Into<Candidate>) -> Result<()> {
        let oid: Oid = identifier.parse().inspect_err(|e| {
            warn!("[REGISTRY] Could not parse OID {}: {}", identifier, e);
        })?;
        self.write_oid(&oid, &candidate.into())
    }

    pub fn write_oid(&mut self, oid: &Oid, candidate: &Candidate) -> Result<()> {
        let Some(parameter) = self.parameters.get_mut(oid) else {
            warn!("[REGISTRY] OID {} has not been registered", oid);
            return Err(AgentError::NotRegistered(oid.clone()));
        };

        match validate(&parameter.descriptor, candidate) {
            Ok(value) => {
                debug!("[REGISTRY] OID {} = {}", oid, value);
                parameter.value = value;
                Ok(())
            }
            Err(reason) => {
                warn!(
                    "[REGISTRY] Inappropriate value {} for OID {} will be ignored: {}",
                    candidate, oid, reason
                );
                Err(AgentError::BadValue {
                    identifier: oid.clone(),
                    reason,
                })
            }
        }
    }

    /// Look up a parameter regardless of start-up state.
    pub fn get(&self, oid: &Oid) -> Option<&Parameter> {
        self.parameters.get(oid)
    }

    pub fn descriptor(&self, oid: &Oid) -> Option<&ValueDescriptor> {
        self.parameters.get(oid).map(|p| &p.descriptor)
    }

    pub fn contains(&self, oid: &Oid) -> bool {
        self.parameters.contains_key(oid)
    }

    /// Registered identifiers in tree order.
    pub fn identifiers(&self) -> impl Iterator<Item = &Oid> {
        self.parameters.keys()
    }

    /// The first registered identifier strictly after `oid`.
    pub fn next_after(&self, oid: &Oid) -> Option<&Oid> {
        self.parameters
            .range((Bound::Excluded(oid), Bound::Unbounded))
            .next()
            .map(|(k, _)| k)
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}
