// Public modules
pub mod backend;
pub mod chat;
pub mod error;
pub mod logging;
pub mod sse;
pub mod types;

mod observability;

// Re-exports
pub use error::{Error, Result};
pub use logging::init_logging;
pub use observability::register_biometrics;
pub use types::*;
