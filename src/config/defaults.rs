//! Default configuration values
//!
//! This module is the single source of truth for the values the server
//! defaulting policy fills in. Defaults declared by the core schema
//! (`tsa-port`, `client-reconnect-window`) are mirrored here for callers
//! that build a configuration without parsing a document.

/// Address meaning "all interfaces"
pub const WILDCARD_IP: &str = "0.0.0.0";

/// Offset of the group port from the TSA port
pub const DEFAULT_GROUPPORT_OFFSET_FROM_TSAPORT: u16 = 20;

/// Offset of the management port from the TSA port
pub const DEFAULT_MANAGEMENTPORT_OFFSET_FROM_TSAPORT: u16 = 30;

/// Lowest port a derived port wraps around to
pub const MIN_PORTNUMBER: u32 = 0x0FFF;

/// Highest valid port
pub const MAX_PORTNUMBER: u32 = 0xFFFF;

/// Default server log directory, relative to the document
pub const DEFAULT_LOGS: &str = "logs";

/// Host placeholder used when a server has neither host nor name
pub const DEFAULT_HOST: &str = "%i";

/// TSA port declared by the core schema
pub const DEFAULT_TSA_PORT: u16 = 9410;

/// Client reconnect window, in seconds, declared by the core schema
pub const DEFAULT_CLIENT_RECONNECT_WINDOW: i32 = 120;

/// Default log level
pub const LOG_LEVEL_STR: &str = "info";
