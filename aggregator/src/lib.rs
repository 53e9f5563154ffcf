mod actor;
pub mod error;
mod handle;
mod link;
pub mod node;
mod remote;

pub use actor::{Aggregator, MAILBOX_SIZE, Request};
pub use error::{AggregatorErr, Result};
pub use handle::AggregatorHandle;
pub use link::AggregatorLink;
pub use node::{Factory, Node};
pub use remote::RemoteAggregator;

/// The name under which the aggregator binary exposes its actor.
pub const DEFAULT_NAME: &str = "aggregator";
