pub mod arch;
pub mod dataset;
pub mod error;
pub mod metrics;
pub mod optimization;
mod persistence;
mod wire;

pub use error::{MlErr, Result};
