use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

use comms::RpcErr;
use machine_learning::MlErr;

/// The aggregator module's result type.
pub type Result<T> = std::result::Result<T, AggregatorErr>;

/// Failures of the aggregator actor and of the node that hosts it.
#[derive(Debug)]
pub enum AggregatorErr {
    /// The model refused an operation, a shape mismatch or an invalid architecture.
    Model(MlErr),
    /// The actor's mailbox is closed.
    Stopped,
    /// No actor nor factory is registered under the requested name.
    UnknownActor(String),
    Io(io::Error),
}

impl Display for AggregatorErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregatorErr::Model(e) => write!(f, "model error: {e}"),
            AggregatorErr::Stopped => f.write_str("the aggregator has stopped"),
            AggregatorErr::UnknownActor(name) => write!(f, "no actor registered as {name:?}"),
            AggregatorErr::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for AggregatorErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AggregatorErr::Model(e) => Some(e),
            AggregatorErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MlErr> for AggregatorErr {
    fn from(value: MlErr) -> Self {
        Self::Model(value)
    }
}

impl From<io::Error> for AggregatorErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// Boundary conversion for callers that only see the RPC contract.
impl From<AggregatorErr> for RpcErr {
    fn from(value: AggregatorErr) -> Self {
        match value {
            AggregatorErr::Model(e) if e.is_shape_mismatch() => RpcErr::ShapeMismatch(e.to_string()),
            AggregatorErr::Model(e) => RpcErr::Protocol(e.to_string()),
            AggregatorErr::Io(e) => e.into(),
            other => RpcErr::Unavailable(other.to_string()),
        }
    }
}
