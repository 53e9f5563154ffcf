pub mod config;
mod coordinator;
pub mod error;
mod preprocessor;
mod runtime;
pub mod server;
pub mod source;

pub use config::{DatasetConfig, SessionConfig};
pub use coordinator::{Coordinator, CoordinatorHandle};
pub use error::{CoordinatorErr, Result, Role};
pub use preprocessor::{Preprocessor, PreprocessorHandle};
pub use runtime::{DEFAULT_RETAINED_SESSIONS, Runtime};
