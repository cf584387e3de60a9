//! Startup configuration for a multi-server cluster
//!
//! This library reads a `tc-config` XML document, validates it against the
//! core schema plus the schema of every installed plugin, and produces a
//! fully defaulted configuration: every server gets a name, host, bind
//! address, log directory and ports, and every extension fragment is turned
//! into a plugin-defined value.
//!
//! # Main Features
//!
//! - Single-pass validation across the core and plugin namespaces
//! - Strict or collecting validation modes
//! - Schema-declared defaults and server defaulting rules
//! - Per-server service overrides
//! - `%`-token parameter substitution
//!
//! # Example
//!
//! ```no_run
//! use tc_config::{Result, TcConfigurationParser};
//! use tc_config::plugin::StaticPlugins;
//!
//! fn main() -> Result<()> {
//!     let parser = TcConfigurationParser::new(StaticPlugins::empty());
//!     let configuration = parser.parse_file("tc-config.xml")?;
//!
//!     for server in configuration.servers() {
//!         println!("{} listens on {}", server.display_name(), server.tsa_port_value());
//!     }
//!     Ok(())
//! }
//! ```

// Public modules
pub mod common;
pub mod config;
pub mod configuration;
pub mod parser;
pub mod plugin;
pub mod schema;
pub mod xml;

// Re-export commonly used structures and functions for convenience
pub use common::{substitute, Result, TcConfigError, ValidationIssue};
pub use configuration::TcConfiguration;
pub use parser::TcConfigurationParser;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
