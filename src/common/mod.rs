//! Common module
//!
//! This module contains shared errors, logging setup, filesystem helpers and
//! the parameter substitutor used throughout configuration resolution.

pub mod error;
pub mod fs;
pub mod log;
pub mod substitutor;

// Re-export commonly used types and functions
pub use error::{PluginError, Result, TcConfigError, ValidationIssue};
pub use log::init_logger;
pub use substitutor::substitute;
