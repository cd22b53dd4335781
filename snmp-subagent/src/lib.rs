//! # snmp-subagent
//!
//! A typed parameter registry exposed through an SNMP-style management
//! protocol. Every parameter is described by a [`ValueDescriptor`]; writes
//! arriving through the protocol run through a phased set transaction and
//! are handed to a single [`ChangeListener`], which decides whether to
//! write them back.
//!
//! ## Getting started
//!
//! ```rust,ignore
//! use snmp_subagent::prelude::*;
//!
//! let agent = Subagent::builder()
//!     .with_config(AgentConfigBuilder::default().build()?)
//!     .with_bridge(my_bridge)
//!     .with_listener(|notice: ChangeNotice| println!("{:?}", notice))
//!     .build()?;
//! agent.start()?;
//! agent.wait_ready()?;
//! agent.register(
//!     ValueDescriptor::new(".1.3.6.1.4.1.8072.9999.1", ValueKind::Integer)
//!         .with_limits(0, 100)
//!         .with_step(5),
//!     20,
//! )?;
//! ```
//!
//! The transport to the master agent is not part of this crate. Implement
//! [`AgentBridge`] for it; the worker polls the bridge and passes it a
//! [`RequestHandler`] for get and set requests.

pub mod agent;
pub mod bridge;
pub mod config;
pub mod definitions;
pub mod descriptor;
pub mod error;
pub mod event;
pub mod oid;
pub mod prelude;
pub mod registry;
pub mod transaction;
pub mod validate;
pub mod value;
pub mod wire;

pub use agent::{Subagent, SubagentBuilder};
pub use bridge::{AgentBridge, GetOutcome, NullBridge, RequestHandler};
pub use descriptor::ValueDescriptor;
pub use error::{AgentError, ErrorStatus, Result};
pub use event::{ChangeEvent, ChangeListener, ChangeNotice};
pub use oid::Oid;
pub use value::{Candidate, Value, ValueKind};

/// Builds a configured object, consuming the builder.
///
/// Implemented by [`config::AgentConfigBuilder`] and [`SubagentBuilder`].
pub trait Builder {
    /// The type produced by this builder.
    type Output;
    /// Consume the builder and construct the configured object.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    fn build(self) -> Result<Self::Output>;
}
