//! Document parser
//!
//! Turns a `tc-config` document into a [`TcConfiguration`]:
//!
//! 1. discover plugins and compose the validation schema
//! 2. check well-formedness and validate every namespace in one pass
//! 3. bind the core elements, adding a server when none is declared
//! 4. inject schema defaults, then apply the server defaulting policy
//! 5. hand extension fragments to their plugins

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info};
use url::Url;

use crate::common::fs::{read_file, source_directory};
use crate::common::{Result, TcConfigError, ValidationIssue};
use crate::config::{self, DefaultInjector, PluginEntry, TcConfig};
use crate::configuration::{ResolvedEntry, TcConfiguration};
use crate::plugin::{ExtensionFragment, PluginLoader, PluginRegistry, ServerOverrides, StaticPlugins};
use crate::schema::{self, CollectedIssues, IssueHandler, StrictIssues, ValidationSchema};
use crate::xml::{parse_document, Element};

/// Parses configuration documents with the plugins a loader supplies
pub struct TcConfigurationParser {
    loader: Arc<dyn PluginLoader>,
}

impl TcConfigurationParser {
    pub fn new<L: PluginLoader + 'static>(loader: L) -> Self {
        Self { loader: Arc::new(loader) }
    }

    /// A parser that knows no extension namespaces
    pub fn without_plugins() -> Self {
        Self::new(StaticPlugins::empty())
    }

    /// Parse a file; relative paths in it resolve against its directory
    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<TcConfiguration> {
        let path = path.as_ref();
        info!("Loading configuration from {}", path.display());
        let bytes = read_file(path)?;
        self.parse_strict(&bytes, source_directory(path))
    }

    /// Parse the document a `file:` URL points at
    pub fn parse_url(&self, url: &Url) -> Result<TcConfiguration> {
        if url.scheme() != "file" {
            return Err(TcConfigError::Io(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                format!("Unsupported URL scheme '{}' in {}", url.scheme(), url),
            )));
        }
        let path = url.to_file_path().map_err(|_| {
            TcConfigError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("URL {} does not name a local file", url),
            ))
        })?;
        self.parse_file(path)
    }

    pub fn parse_str(&self, text: &str) -> Result<TcConfiguration> {
        self.parse_strict(text.as_bytes(), None)
    }

    pub fn parse_bytes(&self, bytes: &[u8]) -> Result<TcConfiguration> {
        self.parse_strict(bytes, None)
    }

    pub fn parse_reader<R: Read>(&self, mut reader: R) -> Result<TcConfiguration> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        self.parse_strict(&bytes, None)
    }

    /// Parse while collecting every validation issue into `issues`.
    ///
    /// Parsing still fails when any issue was found; the error then carries
    /// all of them, and so does `issues`.
    pub fn parse_reader_collecting<R: Read>(
        &self,
        mut reader: R,
        issues: &mut Vec<ValidationIssue>,
        source: Option<&Path>,
    ) -> Result<TcConfiguration> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;

        let (registry, schema) = self.prepare()?;
        let start = issues.len();
        let root = {
            let mut handler = CollectedIssues::new(issues);
            load_document(&bytes, &schema, &mut handler)
        };

        if issues.len() > start {
            return Err(TcConfigError::Validation(issues[start..].to_vec()));
        }
        resolve(&root?, &registry, &schema, source.map(Path::to_path_buf))
    }

    fn parse_strict(&self, bytes: &[u8], source: Option<PathBuf>) -> Result<TcConfiguration> {
        let (registry, schema) = self.prepare()?;
        let root = load_document(bytes, &schema, &mut StrictIssues)?;
        resolve(&root, &registry, &schema, source)
    }

    // The installed set may change between parses, so nothing is cached.
    fn prepare(&self) -> Result<(PluginRegistry, ValidationSchema)> {
        let registry = PluginRegistry::discover(self.loader.as_ref())?;
        let schema = ValidationSchema::compose(&registry)?;
        Ok((registry, schema))
    }
}

impl Default for TcConfigurationParser {
    fn default() -> Self {
        Self::without_plugins()
    }
}

fn load_document(bytes: &[u8], schema: &ValidationSchema, handler: &mut dyn IssueHandler) -> Result<Element> {
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            let issue = ValidationIssue::new(0, 0, format!("Document is not valid UTF-8: {}", e));
            handler.report(issue.clone())?;
            return Err(TcConfigError::Validation(vec![issue]));
        }
    };

    let root = match parse_document(text) {
        Ok(root) => root,
        Err(issue) => {
            handler.report(issue.clone())?;
            return Err(TcConfigError::Validation(vec![issue]));
        }
    };

    schema::validate(schema, &root, handler)?;
    debug!("Document validated against {} schema document(s)", schema.documents().len());
    Ok(root)
}

fn resolve(
    root: &Element,
    registry: &PluginRegistry,
    schema: &ValidationSchema,
    source: Option<PathBuf>,
) -> Result<TcConfiguration> {
    let mut platform = config::bind(root)?;
    if platform.ensure_default_server() {
        debug!("No servers declared, using a default server");
    }

    let defaults = schema.core_defaults();
    DefaultInjector::new(&defaults).apply(&mut platform)?;
    config::apply_platform_defaults(&mut platform, source.as_deref());

    let (entries, services) = resolve_extensions(&platform, registry, source.as_deref())?;
    let configuration = TcConfiguration::new(platform, source, entries, services);
    configuration.log_summary();
    Ok(configuration)
}

type ResolvedExtensions = (Vec<ResolvedEntry>, HashMap<String, Vec<crate::plugin::ExtensionConfig>>);

fn resolve_extensions(
    platform: &TcConfig,
    registry: &PluginRegistry,
    source: Option<&Path>,
) -> Result<ResolvedExtensions> {
    let plugin_entries = platform.plugins.as_ref().map(|p| p.entries.as_slice()).unwrap_or(&[]);

    let fragments: Vec<ExtensionFragment<'_>> = plugin_entries
        .iter()
        .map(|entry| match entry {
            PluginEntry::Config(fragment) => ExtensionFragment::Config(fragment),
            PluginEntry::Service(service) => ExtensionFragment::Service {
                id: service.id.as_deref(),
                fragment: &service.fragment,
            },
        })
        .collect();

    let servers: Vec<ServerOverrides<'_>> = platform
        .server_list()
        .iter()
        .map(|server| ServerOverrides {
            server: server.display_name(),
            overrides: server
                .overrides()
                .iter()
                .map(|o| (o.overrides.as_str(), o.fragment.as_ref()))
                .collect(),
        })
        .collect();

    let resolved = registry.resolve_services(&fragments, &servers, source)?;
    let entries = plugin_entries
        .iter()
        .zip(resolved.shared)
        .map(|(entry, config)| match entry {
            PluginEntry::Config(_) => ResolvedEntry::Config(config),
            PluginEntry::Service(service) => ResolvedEntry::Service {
                id: service.id.clone(),
                config,
            },
        })
        .collect();

    Ok((entries, resolved.per_server))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BindPort;

    const CORE: &str = "http://www.terracotta.org/config";

    #[test]
    fn test_minimal_document() {
        let text = format!(r#"<tc-config xmlns="{}"/>"#, CORE);
        let configuration = TcConfigurationParser::without_plugins().parse_str(&text).unwrap();

        let servers = configuration.servers();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].tsa_port.as_ref().map(|p| p.value), Some(9410));
        assert_eq!(servers[0].management_port.as_ref().map(|p| p.value), Some(9440));
        assert_eq!(
            configuration.platform_configuration().servers.as_ref().unwrap().client_reconnect_window,
            Some(120)
        );
        assert!(configuration.source().is_none());
    }

    #[test]
    fn test_strict_mode_stops_at_first_issue() {
        let text = format!(r#"<tc-config xmlns="{}"><servers><bogus/><nope/></servers></tc-config>"#, CORE);
        match TcConfigurationParser::without_plugins().parse_str(&text) {
            Err(TcConfigError::Validation(issues)) => assert_eq!(issues.len(), 1),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_malformed_document() {
        let mut issues = Vec::new();
        let result = TcConfigurationParser::without_plugins().parse_reader_collecting(
            "<tc-config".as_bytes(),
            &mut issues,
            None,
        );
        assert!(matches!(result, Err(TcConfigError::Validation(_))));
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("Malformed XML"));
    }

    #[test]
    fn test_invalid_utf8() {
        let result = TcConfigurationParser::without_plugins().parse_bytes(&[0x3c, 0xff, 0xfe]);
        match result {
            Err(TcConfigError::Validation(issues)) => assert!(issues[0].message.contains("UTF-8")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_explicit_ports() {
        let text = format!(
            r#"<tc-config xmlns="{}"><servers><server name="s1"><tsa-port>200</tsa-port></server></servers></tc-config>"#,
            CORE
        );
        let configuration = TcConfigurationParser::default().parse_str(&text).unwrap();
        let server = &configuration.servers()[0];
        assert_eq!(server.tsa_port, Some(BindPort::new(200, Some("0.0.0.0".into()))));
        assert_eq!(server.management_port, Some(BindPort::new(230, Some("0.0.0.0".into()))));
        assert_eq!(server.tsa_group_port, Some(BindPort::new(220, Some("0.0.0.0".into()))));
    }

    #[test]
    fn test_non_file_url_rejected() {
        let url = Url::parse("http://example.org/tc-config.xml").unwrap();
        assert!(matches!(
            TcConfigurationParser::default().parse_url(&url),
            Err(TcConfigError::Io(_))
        ));
    }
}
