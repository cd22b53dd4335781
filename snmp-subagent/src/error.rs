//! Error types for the subagent

use strum::{AsRefStr, Display};

use crate::descriptor::DescriptorError;
use crate::oid::{Oid, OidError};
use crate::value::ValueError;

pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AgentError {
    #[error("malformed identifier: {0}")]
    MalformedIdentifier(#[from] OidError),

    #[error("malformed descriptor for {identifier}: {reason}")]
    MalformedDescriptor {
        identifier: String,
        reason: DescriptorError,
    },

    #[error("identifier {0} is already registered")]
    AlreadyRegistered(Oid),

    #[error("identifier {0} is not registered")]
    NotRegistered(Oid),

    #[error("identifier {0} is read-only")]
    ReadOnly(Oid),

    #[error("wire type mismatch for {identifier}: {reason}")]
    TypeMismatch { identifier: Oid, reason: String },

    #[error("bad value for {identifier}: {reason}")]
    BadValue { identifier: Oid, reason: ValueError },

    #[error("general error: {0}")]
    GeneralError(String),

    #[error("the agent has not finished start-up")]
    NotReady,

    #[error("the agent worker is not running")]
    NotRunning,

    #[error("configuration error: {0}")]
    Config(String),
}

/// Protocol error status reported back to the external bridge.
///
/// Discriminants follow the SNMP error-status numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[repr(u8)]
pub enum ErrorStatus {
    NoError = 0,
    NoSuchName = 2,
    BadValue = 3,
    ReadOnly = 4,
    GeneralError = 5,
    WrongType = 7,
}

impl ErrorStatus {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn is_error(self) -> bool {
        self != Self::NoError
    }
}

impl From<&AgentError> for ErrorStatus {
    fn from(err: &AgentError) -> Self {
        match err {
            AgentError::NotRegistered(_) | AgentError::MalformedIdentifier(_) => Self::NoSuchName,
            AgentError::ReadOnly(_) => Self::ReadOnly,
            AgentError::TypeMismatch { .. } => Self::WrongType,
            AgentError::BadValue { .. } => Self::BadValue,
            _ => Self::GeneralError,
        }
    }
}
