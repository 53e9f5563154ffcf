use std::{error::Error, fmt};

use comms::RpcErr;
use machine_learning::MlErr;

/// The worker module's result type.
pub type Result<T> = std::result::Result<T, WorkerErr>;

/// Worker and evaluator failures.
#[derive(Debug)]
pub enum WorkerErr {
    /// A remote call failed for good, either it wasn't retryable or the retries ran out.
    Rpc { what: &'static str, source: RpcErr },
    /// The local model refused a snapshot or a batch.
    Model(MlErr),
    /// Training or evaluation was asked to run over no rows.
    EmptyDataset,
    /// The actor's mailbox is closed.
    Stopped,
}

impl fmt::Display for WorkerErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerErr::Rpc { what, source } => write!(f, "{what} failed: {source}"),
            WorkerErr::Model(e) => write!(f, "model error: {e}"),
            WorkerErr::EmptyDataset => f.write_str("refusing to run over an empty dataset"),
            WorkerErr::Stopped => f.write_str("the actor has stopped"),
        }
    }
}

impl Error for WorkerErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            WorkerErr::Rpc { source, .. } => Some(source),
            WorkerErr::Model(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MlErr> for WorkerErr {
    fn from(value: MlErr) -> Self {
        Self::Model(value)
    }
}
