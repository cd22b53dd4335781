//! Change notifications emitted by the write coordinator.
//!
//! Exactly one listener receives every notice. A notice is an immutable
//! value; the listener decides on its own whether to write the new value
//! back into the registry.

use std::fmt;

use crate::oid::Oid;
use crate::value::Value;

/// A write that passed validation, before any storage mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub identifier: Oid,
    pub value: Value,
}

impl ChangeEvent {
    pub fn new(identifier: Oid, value: Value) -> Self {
        Self { identifier, value }
    }

    /// Identifier in its dotted text form.
    pub fn identifier_text(&self) -> String {
        self.identifier.to_string()
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.identifier, self.value)
    }
}

/// What happened to a change inside a write transaction.
///
/// `Accepted` is always delivered before the matching `Committed` or
/// `Discarded`.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeNotice {
    /// Apply phase: the change passed every check.
    Accepted(ChangeEvent),
    /// Commit phase: every binding in the batch was applied.
    Committed(ChangeEvent),
    /// Undo phase: a sibling failed, drop the tentative change.
    Discarded(ChangeEvent),
}

impl ChangeNotice {
    pub fn event(&self) -> &ChangeEvent {
        match self {
            Self::Accepted(e) | Self::Committed(e) | Self::Discarded(e) => e,
        }
    }
}

/// The listener could not take the notice.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("change listener unavailable: {0}")]
pub struct ListenerError(pub String);

/// Receiver of change notices.
///
/// Notices are delivered on the agent worker thread. A listener must not
/// call back into the agent synchronously from `notify`; forward the notice
/// over a channel instead (the `flume::Sender` implementation does that).
pub trait ChangeListener: Send + Sync {
    fn notify(&self, notice: ChangeNotice) -> Result<(), ListenerError>;
}

impl<F> ChangeListener for F
where
    F: Fn(ChangeNotice) + Send + Sync,
{
    fn notify(&self, notice: ChangeNotice) -> Result<(), ListenerError> {
        self(notice);
        Ok(())
    }
}

impl ChangeListener for flume::Sender<ChangeNotice> {
    fn notify(&self, notice: ChangeNotice) -> Result<(), ListenerError> {
        self.send(notice)
            .map_err(|_| ListenerError("notice channel disconnected".to_string()))
    }
}

/// Listener that drops every notice.
#[derive(Debug, Default, Clone, Copy)]
pub struct IgnoreChanges;

impl ChangeListener for IgnoreChanges {
    fn notify(&self, _notice: ChangeNotice) -> Result<(), ListenerError> {
        Ok(())
    }
}
