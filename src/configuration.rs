//! Resolved configuration
//!
//! The immutable result of a parse: the defaulted platform configuration,
//! every extension value in document order, and each server's effective
//! services.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;

use crate::config::{Server, TcConfig};
use crate::plugin::ExtensionConfig;

/// One resolved `<plugins>` entry
#[derive(Clone)]
pub enum ResolvedEntry {
    Config(ExtensionConfig),
    Service { id: Option<String>, config: ExtensionConfig },
}

impl ResolvedEntry {
    pub fn config(&self) -> &ExtensionConfig {
        match self {
            ResolvedEntry::Config(config) => config,
            ResolvedEntry::Service { config, .. } => config,
        }
    }
}

impl fmt::Debug for ResolvedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedEntry::Config(_) => f.write_str("Config(..)"),
            ResolvedEntry::Service { id, .. } => f.debug_struct("Service").field("id", id).finish_non_exhaustive(),
        }
    }
}

/// Fully resolved startup configuration
pub struct TcConfiguration {
    platform: TcConfig,
    source: Option<PathBuf>,
    entries: Vec<ResolvedEntry>,
    services: HashMap<String, Vec<ExtensionConfig>>,
}

impl TcConfiguration {
    pub fn new(
        platform: TcConfig,
        source: Option<PathBuf>,
        entries: Vec<ResolvedEntry>,
        services: HashMap<String, Vec<ExtensionConfig>>,
    ) -> Self {
        Self { platform, source, entries, services }
    }

    /// The defaulted platform configuration
    pub fn platform_configuration(&self) -> &TcConfig {
        &self.platform
    }

    /// Directory of the parsed document, when it came from a file
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn servers(&self) -> &[Server] {
        self.platform.server_list()
    }

    /// Every extension entry, in document order
    pub fn extension_entries(&self) -> &[ResolvedEntry] {
        &self.entries
    }

    /// Every extension value, in document order
    pub fn extension_configurations(&self) -> impl Iterator<Item = &ExtensionConfig> {
        self.entries.iter().map(ResolvedEntry::config)
    }

    /// Effective services of the server registered as `server_name`
    pub fn service_configurations(&self, server_name: &str) -> &[ExtensionConfig] {
        self.services.get(server_name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `<config>` values of type `T`, in document order
    pub fn get_extended_configuration<T: Send + Sync + 'static>(&self) -> Vec<Arc<T>> {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                ResolvedEntry::Config(config) => Arc::clone(config).downcast::<T>().ok(),
                ResolvedEntry::Service { .. } => None,
            })
            .collect()
    }

    /// Log a summary of the resolved configuration
    pub fn log_summary(&self) {
        info!("Resolved configuration:");
        match self.source() {
            Some(dir) => info!("  source: {}", dir.display()),
            None => info!("  source: <stream>"),
        }
        for server in self.servers() {
            info!(
                "  server {}: host={} bind={} tsa-port={} logs={}",
                server.display_name(),
                server.host.as_deref().unwrap_or(""),
                server.bind.as_deref().unwrap_or(""),
                server.tsa_port_value(),
                server.logs.as_deref().unwrap_or("")
            );
            info!("    services: {}", self.service_configurations(server.display_name()).len());
        }
        info!("  extensions: {}", self.entries.len());
    }
}

impl fmt::Debug for TcConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcConfiguration")
            .field("platform", &self.platform)
            .field("source", &self.source)
            .field("entries", &self.entries)
            .finish()
    }
}

/// Pretty JSON of the platform configuration
impl fmt::Display for TcConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string_pretty(&self.platform).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TcConfiguration {
        let shared: ExtensionConfig = Arc::new(7u32);
        let mut services = HashMap::new();
        services.insert("s1".to_string(), vec![Arc::clone(&shared)]);
        TcConfiguration::new(
            TcConfig::default(),
            Some(PathBuf::from("/etc/tc")),
            vec![
                ResolvedEntry::Config(Arc::new("bar".to_string())),
                ResolvedEntry::Service { id: Some("a".into()), config: shared },
                ResolvedEntry::Config(Arc::new("baz".to_string())),
            ],
            services,
        )
    }

    #[test]
    fn test_typed_lookup_keeps_order() {
        let config = sample();
        let strings = config.get_extended_configuration::<String>();
        assert_eq!(strings.len(), 2);
        assert_eq!(strings[0].as_str(), "bar");
        assert_eq!(strings[1].as_str(), "baz");
        // Service results are reached per server, not by type.
        assert!(config.get_extended_configuration::<u32>().is_empty());
        assert!(config.get_extended_configuration::<i64>().is_empty());
    }

    #[test]
    fn test_service_lookup() {
        let config = sample();
        assert_eq!(config.service_configurations("s1").len(), 1);
        assert!(config.service_configurations("missing").is_empty());
        assert_eq!(config.source(), Some(Path::new("/etc/tc")));
        assert_eq!(config.extension_configurations().count(), 3);
    }

    #[test]
    fn test_display_is_json() {
        let text = sample().to_string();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert!(value.get("servers").is_some());
    }
}
