//! Convenience re-exports.
//!
//! `use snmp_subagent::prelude::*;` brings in the types needed to build an
//! agent, register parameters and react to writes.

pub use crate::Builder;

pub use crate::agent::{Subagent, SubagentBuilder};
pub use crate::config::{AgentConfig, AgentConfigBuilder};

/// Bridge boundary.
pub use crate::bridge::{AgentBridge, GetOutcome, NullBridge, RequestHandler};
pub use crate::transaction::{Phase, SetOutcome, VarBind};
pub use crate::wire::{Endianness, WireCodec, WireType, WireValue};

pub use crate::descriptor::ValueDescriptor;
pub use crate::error::{AgentError, ErrorStatus, Result};
pub use crate::event::{ChangeEvent, ChangeListener, ChangeNotice, IgnoreChanges};
pub use crate::oid::Oid;
pub use crate::value::{Candidate, Value, ValueKind};
