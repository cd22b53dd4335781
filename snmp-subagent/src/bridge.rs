//! Boundary to the external management protocol.
//!
//! The transport itself is not part of this crate. A bridge implementation
//! owns the connection to the master agent; the worker polls it, and the
//! bridge turns incoming requests into calls on the [`RequestHandler`] it is
//! handed.

use tracing::debug;

use crate::config::AgentConfig;
use crate::error::{AgentError, ErrorStatus, Result};
use crate::event::ChangeListener;
use crate::oid::Oid;
use crate::registry::ParameterRegistry;
use crate::transaction::{SetOutcome, VarBind, WriteCoordinator};
use crate::wire::WireCodec;

/// A transport polled by the agent worker.
///
/// All methods run on the worker thread and must not block on I/O.
pub trait AgentBridge: Send + 'static {
    /// Connect to the master agent. Reads are refused until this returns.
    fn init(&mut self, config: &AgentConfig) -> Result<()>;

    /// An identifier was registered and should be served.
    fn attach(&mut self, _identifier: &Oid) -> Result<()> {
        Ok(())
    }

    /// An identifier was unregistered.
    fn detach(&mut self, _identifier: &Oid) -> Result<()> {
        Ok(())
    }

    /// Process whatever requests are pending, then return.
    fn poll(&mut self, handler: &mut RequestHandler<'_>) -> Result<()>;

    fn shutdown(&mut self) {}
}

/// Bridge without a transport. Useful when the registry is only driven
/// through the `Subagent` handle.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBridge;

impl AgentBridge for NullBridge {
    fn init(&mut self, config: &AgentConfig) -> Result<()> {
        debug!("[AGENT] {} running without a transport", config.agent_name);
        Ok(())
    }

    fn poll(&mut self, _handler: &mut RequestHandler<'_>) -> Result<()> {
        Ok(())
    }
}

/// Result of a get request.
#[derive(Debug, Clone, PartialEq)]
pub struct GetOutcome {
    pub status: ErrorStatus,
    /// 1-based position of the failing identifier, 0 on success.
    pub error_index: usize,
    pub error: Option<AgentError>,
    /// Encoded values in request order; empty on failure.
    pub bindings: Vec<VarBind>,
}

impl GetOutcome {
    pub fn is_success(&self) -> bool {
        !self.status.is_error()
    }
}

/// Entry point for requests arriving through a bridge.
pub struct RequestHandler<'a> {
    registry: &'a ParameterRegistry,
    codec: WireCodec,
    listener: &'a dyn ChangeListener,
}

impl<'a> RequestHandler<'a> {
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

    pub fn codec(&self) -> WireCodec {
        self.codec
    }

    /// Read and encode every identifier, failing on the first missing one.
    pub fn get(&mut self, identifiers: &[Oid]) -> GetOutcome {
        let mut bindings = Vec::with_capacity(identifiers.len());
        for (index, oid) in identifiers.iter().enumerate() {
            match self.registry.read_oid(oid) {
                Ok(value) => bindings.push(VarBind::new(oid.clone(), self.codec.encode(&value))),
                Err(e) => {
                    debug!("[AGENT] get {} failed: {}", oid, e);
                    return GetOutcome {
                        status: ErrorStatus::from(&e),
                        error_index: index + 1,
                        error: Some(e),
                        bindings: Vec::new(),
                    };
                }
            }
        }
        GetOutcome {
            status: ErrorStatus::NoError,
            error_index: 0,
            error: None,
            bindings,
        }
    }

    /// First registered identifier after `oid`, for walk requests.
    pub fn next_after(&self, oid: &Oid) -> Option<Oid> {
        self.registry.next_after(oid).cloned()
    }

    /// Run a set request through the write phases.
    pub fn set(&mut self, varbinds: &[VarBind]) -> SetOutcome {
        WriteCoordinator::new(self.registry, self.codec, self.listener).execute(varbinds)
    }
}
