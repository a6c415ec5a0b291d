//! Shared basics for the scope-link crates
//!
//! Provides the pieces every binary and library in the workspace needs:
//! - logging bootstrap (console + rolling file)
//! - layered configuration loading
//! - graceful shutdown signal
//! - hex formatting for raw byte traces

pub mod config;
pub mod error;
pub mod hex;
pub mod logging;
pub mod shutdown;

pub use error::{Error, Result};
pub use logging::init_logging;

