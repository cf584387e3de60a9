//! Configuration module
//!
//! This module holds the typed platform configuration and the stages that
//! turn a validated document into it: binding, schema default injection and
//! the server defaulting policy.

// Submodules
pub mod binder;
pub mod defaults;
pub mod inject;
pub mod server;
mod types;

// Re-export types and functions
pub use self::binder::bind;
pub use self::inject::{Coerce, DefaultInjector, SchemaType, SimpleContent};
pub use self::server::{
    apply_platform_defaults, apply_server_defaults, compute_group_port_from_tsa_port,
    compute_management_port_from_tsa_port,
};
pub use self::types::{
    BindPort, Consistency, FailoverPriority, PluginEntry, Plugins, Property, Server, Service, ServiceOverride,
    ServiceOverrides, Servers, TcConfig, TcProperties, Voter,
};
