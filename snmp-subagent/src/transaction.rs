//! Write transaction coordinator.
//!
//! A set request carries one or more variable bindings that must succeed or
//! fail together. The coordinator walks the batch through the phases below
//! and never mutates the registry itself:
//!
//! ```text
//! TypeCheck ──► ValueCheck ──► Apply ──► Commit
//!     │              │           │
//!     ▼              ▼           ▼
//!   (abort)        Free        Undo (siblings already applied)
//! ```
//!
//! Every binding finishes one phase before any binding enters the next, so a
//! value failure is always detected before a single change is announced.

use strum::{AsRefStr, Display};
use tracing::{debug, warn};

use crate::error::{AgentError, ErrorStatus, Result};
use crate::event::{ChangeEvent, ChangeListener, ChangeNotice};
use crate::oid::Oid;
use crate::registry::ParameterRegistry;
use crate::validate::validate;
use crate::value::{Value, ValueError};
use crate::wire::{WireCodec, WireValue};

/// One identifier/value pair of a request.
#[derive(Debug, Clone, PartialEq)]
pub struct VarBind {
    pub identifier: Oid,
    pub value: WireValue,
}

impl VarBind {
    pub fn new(identifier: Oid, value: WireValue) -> Self {
        Self { identifier, value }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
pub enum Phase {
    TypeCheck,
    ValueCheck,
    Apply,
    Commit,
    Undo,
    Free,
}

/// A phase run for one binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseRecord {
    /// Zero-based position of the binding in the request.
    pub index: usize,
    pub phase: Phase,
    pub status: ErrorStatus,
}

/// Result of a whole write transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct SetOutcome {
    pub status: ErrorStatus,
    /// One-based index of the failing binding, zero on success.
    pub error_index: usize,
    pub error: Option<AgentError>,
    pub log: Vec<PhaseRecord>,
}

impl SetOutcome {
    pub fn is_success(&self) -> bool {
        !self.status.is_error()
    }

    /// Phases run for the binding at `index`, in order.
    pub fn phases_for(&self, index: usize) -> Vec<Phase> {
        self.log
            .iter()
            .filter(|r| r.index == index)
            .map(|r| r.phase)
            .collect()
    }

    fn failed(index: usize, error: AgentError, log: Vec<PhaseRecord>) -> Self {
        Self {
            status: ErrorStatus::from(&error),
            error_index: index + 1,
            error: Some(error),
            log,
        }
    }
}

/// Drives write requests through the phase sequence.
pub struct WriteCoordinator<'a> {
    registry: &'a ParameterRegistry,
    codec: WireCodec,
    listener: &'a dyn ChangeListener,
}

impl<'a> WriteCoordinator<'a> {
    pub fn new(
        registry: &'a ParameterRegistry,
        codec: WireCodec,
        listener: &'a dyn ChangeListener,
    ) -> Self {
        Self {
            registry,
            codec,
            listener,
        }
    }

    /// Run a set request to completion.
    pub fn execute(&self, varbinds: &[VarBind]) -> SetOutcome {
        let mut log = Vec::with_capacity(varbinds.len() * 3);

        for (index, vb) in varbinds.iter().enumerate() {
            let result = self.type_check(vb);
            record(&mut log, index, Phase::TypeCheck, &result);
            if let Err(e) = result {
                return SetOutcome::failed(index, e, log);
            }
        }

        // Decoded values live here until the transaction reaches Apply.
        let mut pending: Vec<Value> = Vec::with_capacity(varbinds.len());
        for (index, vb) in varbinds.iter().enumerate() {
            let result = self.value_check(vb);
            record(&mut log, index, Phase::ValueCheck, &result);
            match result {
                Ok(value) => pending.push(value),
                Err(e) => {
                    drop(pending);
                    for (i, vb) in varbinds.iter().enumerate() {
                        debug!("[SET] Free {} ({})", i, vb.identifier);
                        log.push(PhaseRecord {
                            index: i,
                            phase: Phase::Free,
                            status: ErrorStatus::NoError,
                        });
                    }
                    return SetOutcome::failed(index, e, log);
                }
            }
        }
        drop(pending);

        let mut applied: Vec<(usize, ChangeEvent)> = Vec::with_capacity(varbinds.len());
        for (index, vb) in varbinds.iter().enumerate() {
            let result = self.apply(vb);
            record(&mut log, index, Phase::Apply, &result);
            match result {
                Ok(event) => applied.push((index, event)),
                Err(e) => {
                    for (i, event) in applied.into_iter().rev() {
                        self.undo(i, event, &mut log);
                    }
                    return SetOutcome::failed(index, e, log);
                }
            }
        }

        for (index, event) in applied {
            debug!("[SET] Commit {}: {}", index, event);
            if let Err(e) = self.listener.notify(ChangeNotice::Committed(event)) {
                warn!("[SET] Commit notice for binding {} not delivered: {}", index, e);
            }
            log.push(PhaseRecord {
                index,
                phase: Phase::Commit,
                status: ErrorStatus::NoError,
            });
        }

        SetOutcome {
            status: ErrorStatus::NoError,
            error_index: 0,
            error: None,
            log,
        }
    }

    /// TypeCheck: the target exists, is writeable and the wire type and
    /// length fit its kind.
    fn type_check(&self, vb: &VarBind) -> Result<()> {
        let descriptor = self
            .registry
            .descriptor(&vb.identifier)
            .ok_or_else(|| AgentError::NotRegistered(vb.identifier.clone()))?;

        if descriptor.is_read_only() {
            return Err(AgentError::ReadOnly(vb.identifier.clone()));
        }

        self.codec
            .check_type(descriptor.kind(), &vb.value)
            .map_err(|e| AgentError::TypeMismatch {
                identifier: vb.identifier.clone(),
                reason: e.to_string(),
            })
    }

    /// ValueCheck: decode to the native representation and validate.
    fn value_check(&self, vb: &VarBind) -> Result<Value> {
        let descriptor = self
            .registry
            .descriptor(&vb.identifier)
            .ok_or_else(|| AgentError::NotRegistered(vb.identifier.clone()))?;

        let candidate = self
            .codec
            .decode(descriptor.kind(), &vb.value)
            .map_err(|e| AgentError::BadValue {
                identifier: vb.identifier.clone(),
                reason: ValueError::Undecodable(e.to_string()),
            })?;

        validate(descriptor, &candidate).map_err(|reason| AgentError::BadValue {
            identifier: vb.identifier.clone(),
            reason,
        })
    }

    /// Apply: decode again and announce the change. Anything going wrong
    /// this late is a general error.
    fn apply(&self, vb: &VarBind) -> Result<ChangeEvent> {
        let value = self
            .value_check(vb)
            .map_err(|e| AgentError::GeneralError(format!("apply failed: {}", e)))?;
        let event = ChangeEvent::new(vb.identifier.clone(), value);
        self.listener
            .notify(ChangeNotice::Accepted(event.clone()))
            .map_err(|e| AgentError::GeneralError(e.to_string()))?;
        Ok(event)
    }

    fn undo(&self, index: usize, event: ChangeEvent, log: &mut Vec<PhaseRecord>) {
        debug!("[SET] Undo {}: {}", index, event);
        let status = match self.listener.notify(ChangeNotice::Discarded(event)) {
            Ok(()) => ErrorStatus::NoError,
            Err(e) => {
                warn!("[SET] Undo notice for binding {} not delivered: {}", index, e);
                ErrorStatus::GeneralError
            }
        };
        log.push(PhaseRecord {
            index,
            phase: Phase::Undo,
            status,
        });
    }
}

fn record<T>(log: &mut Vec<PhaseRecord>, index: usize, phase: Phase, result: &Result<T>) {
    let status = match result {
        Ok(_) => ErrorStatus::NoError,
        Err(e) => {
            warn!("[SET] {} failed for binding {}: {}", phase, index, e);
            ErrorStatus::from(e)
        }
    };
    debug!("[SET] {} {} -> {}", phase, index, status);
    log.push(PhaseRecord {
        index,
        phase,
        status,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::descriptor::ValueDescriptor;
    use crate::event::ListenerError;
    use crate::value::ValueKind;
    use crate::wire::WireType;

    #[derive(Default)]
    struct Recorder {
        notices: Mutex<Vec<ChangeNotice>>,
        refuse: Option<Oid>,
    }

    impl ChangeListener for Recorder {
        fn notify(&self, notice: ChangeNotice) -> std::result::Result<(), ListenerError> {
            if let (ChangeNotice::Accepted(e), Some(refused)) = (&notice, &self.refuse)
                && &e.identifier == refused
            {
                return Err(ListenerError("refused".into()));
            }
            self.notices.lock().unwrap().push(notice);
            Ok(())
        }
    }

    fn oid(s: &str) -> Oid {
        s.parse().unwrap()
    }

    fn int(v: i32) -> WireValue {
        WireValue::new(WireType::Integer, v.to_be_bytes())
    }

    fn registry() -> ParameterRegistry {
        let mut registry = ParameterRegistry::new();
        registry
            .register(
                ValueDescriptor::new(".1.1", ValueKind::Integer)
                    .with_limits(0, 100)
                    .with_step(5),
                0,
            )
            .unwrap();
        registry
            .register(ValueDescriptor::new(".1.2", ValueKind::Integer), 0)
            .unwrap();
        registry
            .register(ValueDescriptor::new(".1.3", ValueKind::Text).read_only(true), "ro")
            .unwrap();
        registry
    }

    #[test]
    fn test_successful_batch() {
        let registry = registry();
        let listener = Recorder::default();
        let coordinator = WriteCoordinator::new(&registry, WireCodec::default(), &listener);

        let outcome = coordinator.execute(&[
            VarBind::new(oid(".1.1"), int(20)),
            VarBind::new(oid(".1.2"), int(-3)),
        ]);
        assert!(outcome.is_success());
        assert_eq!(outcome.error_index, 0);
        assert_eq!(
            outcome.phases_for(0),
            vec![Phase::TypeCheck, Phase::ValueCheck, Phase::Apply, Phase::Commit]
        );

        let notices = listener.notices.lock().unwrap();
        let first = ChangeEvent::new(oid(".1.1"), Value::Integer(20));
        let second = ChangeEvent::new(oid(".1.2"), Value::Integer(-3));
        assert_eq!(
            *notices,
            vec![
                ChangeNotice::Accepted(first.clone()),
                ChangeNotice::Accepted(second.clone()),
                ChangeNotice::Committed(first),
                ChangeNotice::Committed(second),
            ]
        );
        // The coordinator itself never writes.
        assert_eq!(registry.get(&oid(".1.1")).unwrap().value(), &Value::Integer(0));
    }

    #[test]
    fn test_read_only_rejected_at_type_check() {
        let registry = registry();
        let listener = Recorder::default();
        let coordinator = WriteCoordinator::new(&registry, WireCodec::default(), &listener);

        let outcome = coordinator.execute(&[VarBind::new(oid(".1.3"), WireValue::octets("x"))]);
        assert_eq!(outcome.status, ErrorStatus::ReadOnly);
        assert_eq!(outcome.error_index, 1);
        assert_eq!(outcome.phases_for(0), vec![Phase::TypeCheck]);
        assert!(listener.notices.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unknown_and_wrong_type() {
        let registry = registry();
        let listener = Recorder::default();
        let coordinator = WriteCoordinator::new(&registry, WireCodec::default(), &listener);

        let outcome = coordinator.execute(&[VarBind::new(oid(".1.9"), int(1))]);
        assert_eq!(outcome.status, ErrorStatus::NoSuchName);

        let outcome = coordinator.execute(&[
            VarBind::new(oid(".1.1"), int(5)),
            VarBind::new(oid(".1.2"), WireValue::octets("5")),
        ]);
        assert_eq!(outcome.status, ErrorStatus::WrongType);
        assert_eq!(outcome.error_index, 2);
        assert!(!outcome.log.iter().any(|r| r.phase == Phase::ValueCheck));
    }

    #[test]
    fn test_bad_value_frees_batch() {
        let registry = registry();
        let listener = Recorder::default();
        let coordinator = WriteCoordinator::new(&registry, WireCodec::default(), &listener);

        let outcome = coordinator.execute(&[
            VarBind::new(oid(".1.2"), int(7)),
            VarBind::new(oid(".1.1"), int(23)),
        ]);
        assert_eq!(outcome.status, ErrorStatus::BadValue);
        assert_eq!(outcome.error_index, 2);
        assert_eq!(
            outcome.phases_for(0),
            vec![Phase::TypeCheck, Phase::ValueCheck, Phase::Free]
        );
        assert!(!outcome.log.iter().any(|r| r.phase == Phase::Apply));
        assert!(listener.notices.lock().unwrap().is_empty());
    }

    #[test]
    fn test_apply_failure_undoes_siblings() {
        let registry = registry();
        let listener = Recorder {
            refuse: Some(oid(".1.1")),
            ..Default::default()
        };
        let coordinator = WriteCoordinator::new(&registry, WireCodec::default(), &listener);

        let outcome = coordinator.execute(&[
            VarBind::new(oid(".1.2"), int(1)),
            VarBind::new(oid(".1.1"), int(10)),
        ]);
        assert_eq!(outcome.status, ErrorStatus::GeneralError);
        assert_eq!(outcome.error_index, 2);
        assert_eq!(
            outcome.phases_for(0),
            vec![Phase::TypeCheck, Phase::ValueCheck, Phase::Apply, Phase::Undo]
        );

        let notices = listener.notices.lock().unwrap();
        let event = ChangeEvent::new(oid(".1.2"), Value::Integer(1));
        assert_eq!(
            *notices,
            vec![ChangeNotice::Accepted(event.clone()), ChangeNotice::Discarded(event)]
        );
    }

    #[test]
    fn test_empty_batch_succeeds() {
        let registry = registry();
        let listener = Recorder::default();
        let coordinator = WriteCoordinator::new(&registry, WireCodec::default(), &listener);
        let outcome = coordinator.execute(&[]);
        assert!(outcome.is_success());
        assert!(outcome.log.is_empty());
    }
}
