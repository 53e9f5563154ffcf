mod client;
pub mod config;
mod connector;
pub mod error;
mod evaluator;
mod parent;
mod retry;
mod worker;

pub use client::{AggregatorClient, Delivery};
pub use config::TrainingConfig;
pub use connector::{Connector, TcpConnector};
pub use error::{Result, WorkerErr};
pub use evaluator::{Evaluator, EvaluatorHandle};
pub use parent::Parent;
pub use retry::RetryPolicy;
pub use worker::{TrainReport, Worker, WorkerHandle, WorkerState};
