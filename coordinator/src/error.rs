use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

use comms::{RpcErr, specs::session::SessionId};
use machine_learning::MlErr;

/// The coordinator module's result type.
pub type Result<T> = std::result::Result<T, CoordinatorErr>;

/// The children a coordinator keeps track of, plus the external aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Preprocessor,
    Worker,
    Evaluator,
    Aggregator,
}

impl Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Preprocessor => "preprocessor",
            Role::Worker => "worker",
            Role::Evaluator => "evaluator",
            Role::Aggregator => "aggregator",
        };

        f.write_str(name)
    }
}

/// All errors that can occur in the coordinator.
#[derive(Debug)]
pub enum CoordinatorErr {
    /// A lookup arrived before the session knew the requested address.
    NotReady(Role),
    /// The event isn't valid in the session's current state.
    InvalidState {
        state: &'static str,
        event: &'static str,
    },
    /// The coordinator's mailbox is closed.
    Stopped,
    UnknownSession(SessionId),
    /// Invalid configuration, caught before starting a session.
    InvalidConfig(String),
    Dataset(MlErr),
    Io(io::Error),
    Json(serde_json::Error),
}

impl Display for CoordinatorErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady(role) => write!(f, "the {role} address isn't known yet"),
            Self::InvalidState { state, event } => write!(f, "can't handle {event} while {state}"),
            Self::Stopped => f.write_str("the coordinator has stopped"),
            Self::UnknownSession(id) => write!(f, "unknown session {id}"),
            Self::InvalidConfig(detail) => write!(f, "invalid config: {detail}"),
            Self::Dataset(e) => write!(f, "dataset error: {e}"),
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::Json(e) => write!(f, "json error: {e}"),
        }
    }
}

impl Error for CoordinatorErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Dataset(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MlErr> for CoordinatorErr {
    fn from(value: MlErr) -> Self {
        Self::Dataset(value)
    }
}

impl From<io::Error> for CoordinatorErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for CoordinatorErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Lookups answered before the address exists are retryable on the caller's side.
impl From<CoordinatorErr> for RpcErr {
    fn from(value: CoordinatorErr) -> Self {
        match value {
            CoordinatorErr::NotReady(_) | CoordinatorErr::Stopped => {
                RpcErr::Unavailable(value.to_string())
            }
            other => RpcErr::Protocol(other.to_string()),
        }
    }
}
