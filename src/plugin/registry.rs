//! Namespace-indexed plugin registry and service resolution

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use log::{debug, warn};

use super::{ExtensionConfig, PluginLoader, ServiceConfigParser};
use crate::common::{Result, TcConfigError};
use crate::xml::Element;

/// The plugins installed for one parse, in discovery order
pub struct PluginRegistry {
    parsers: Vec<Arc<dyn ServiceConfigParser>>,
    by_namespace: HashMap<String, usize>,
}

/// A `<plugins>` entry awaiting resolution
#[derive(Debug, Clone, Copy)]
pub enum ExtensionFragment<'a> {
    /// `<config>`: dispatched once, not attached to any server
    Config(&'a Element),
    /// `<service>`: dispatched once and shared by every server that does not override it
    Service { id: Option<&'a str>, fragment: &'a Element },
}

/// One server's overrides, keyed by service id.
///
/// `None` means the server drops that service.
#[derive(Debug, Clone, Default)]
pub struct ServerOverrides<'a> {
    pub server: &'a str,
    pub overrides: HashMap<&'a str, Option<&'a Element>>,
}

/// Result of resolving every extension fragment
#[derive(Debug, Default)]
pub struct ResolvedServices {
    /// One result per fragment, in document order
    pub shared: Vec<ExtensionConfig>,
    /// Each server's effective services
    pub per_server: HashMap<String, Vec<ExtensionConfig>>,
}

impl PluginRegistry {
    /// Ask `loader` for the installed plugins
    pub fn discover(loader: &dyn PluginLoader) -> Result<Self> {
        Self::from_parsers(loader.load())
    }

    /// Index `parsers` by namespace; two plugins may not share one
    pub fn from_parsers(parsers: Vec<Arc<dyn ServiceConfigParser>>) -> Result<Self> {
        let mut by_namespace = HashMap::with_capacity(parsers.len());
        for (index, parser) in parsers.iter().enumerate() {
            let namespace = parser.namespace().to_string();
            if by_namespace.insert(namespace.clone(), index).is_some() {
                return Err(TcConfigError::SchemaSetup(format!(
                    "More than one plugin registered for namespace {}",
                    namespace
                )));
            }
            debug!("Registered plugin for namespace {}", namespace);
        }
        Ok(Self { parsers, by_namespace })
    }

    pub fn parsers(&self) -> &[Arc<dyn ServiceConfigParser>] {
        &self.parsers
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.parsers.iter().map(|p| p.namespace())
    }

    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }

    pub fn lookup(&self, namespace: &str) -> Option<&Arc<dyn ServiceConfigParser>> {
        self.by_namespace.get(namespace).map(|&i| &self.parsers[i])
    }

    fn require(&self, namespace: &str) -> Result<&Arc<dyn ServiceConfigParser>> {
        self.lookup(namespace)
            .ok_or_else(|| TcConfigError::UnknownNamespace(namespace.to_string()))
    }

    /// Validate and parse `fragment` with the plugin owning `namespace`
    pub fn dispatch(&self, namespace: &str, fragment: &Element, source: Option<&Path>) -> Result<ExtensionConfig> {
        let parser = self.require(namespace)?;

        parser
            .config_validator()
            .validate(fragment)
            .map_err(|message| TcConfigError::FragmentRejected {
                namespace: namespace.to_string(),
                message,
            })?;

        parser
            .parse(fragment, source)
            .map_err(|source| TcConfigError::Plugin {
                namespace: namespace.to_string(),
                source,
            })
    }

    /// Dispatch a fragment by its own element namespace
    pub fn dispatch_fragment(&self, fragment: &Element, source: Option<&Path>) -> Result<ExtensionConfig> {
        self.dispatch(fragment_namespace(fragment), fragment, source)
    }

    /// Ask the plugin owning both fragments whether they are equivalent
    pub fn validate_equivalence(&self, one: &Element, other: &Element) -> Result<()> {
        let namespace = fragment_namespace(one);
        if fragment_namespace(other) != namespace {
            return Err(TcConfigError::FragmentRejected {
                namespace: namespace.to_string(),
                message: format!("cannot compare with a fragment in namespace {}", fragment_namespace(other)),
            });
        }

        self.require(namespace)?
            .config_validator()
            .validate_against(one, other)
            .map_err(|message| TcConfigError::FragmentRejected {
                namespace: namespace.to_string(),
                message,
            })
    }

    /// Parse every service fragment once, then build each server's list.
    ///
    /// A server without an override for a service shares the fragment-level
    /// result. An override with a payload is parsed for that server only; an
    /// override without one removes the service from that server.
    pub fn resolve_services(
        &self,
        fragments: &[ExtensionFragment<'_>],
        servers: &[ServerOverrides<'_>],
        source: Option<&Path>,
    ) -> Result<ResolvedServices> {
        let mut resolved = ResolvedServices::default();
        let mut unique = Vec::with_capacity(servers.len());
        for server in servers {
            if resolved.per_server.contains_key(server.server) {
                warn!("Duplicate server name {}, keeping the first definition", server.server);
                continue;
            }
            resolved.per_server.insert(server.server.to_string(), Vec::new());
            unique.push(server);
        }

        // Plugins see fragments in document order, each service followed by its overrides.
        for entry in fragments {
            let (id, fragment) = match *entry {
                ExtensionFragment::Config(fragment) => {
                    resolved.shared.push(self.dispatch_fragment(fragment, source)?);
                    continue;
                }
                ExtensionFragment::Service { id, fragment } => (id, fragment),
            };
            let namespace = fragment_namespace(fragment);
            let shared = self.dispatch(namespace, fragment, source)?;

            for server in &unique {
                let effective = match id.and_then(|id| server.overrides.get(id)) {
                    None => Arc::clone(&shared),
                    Some(None) => {
                        debug!("Service {:?} removed on server {}", id, server.server);
                        continue;
                    }
                    Some(Some(replacement)) => {
                        let replacement_ns = fragment_namespace(replacement);
                        if replacement_ns != namespace {
                            return Err(TcConfigError::Binding(format!(
                                "Override of service {:?} on server {} is in namespace {} but the service is in {}",
                                id, server.server, replacement_ns, namespace
                            )));
                        }
                        self.dispatch(namespace, replacement, source)?
                    }
                };
                if let Some(list) = resolved.per_server.get_mut(server.server) {
                    list.push(effective);
                }
            }
            resolved.shared.push(shared);
        }

        Ok(resolved)
    }
}

fn fragment_namespace(fragment: &Element) -> &str {
    fragment.namespace().unwrap_or("")
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("namespaces", &self.namespaces().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::PluginError;
    use crate::plugin::ConfigValidator;
    use std::io::{self, Read};
    use std::sync::Mutex;

    const NS: &str = "urn:example:foo";

    struct Counting {
        seen: Mutex<Vec<String>>,
        reject: bool,
    }

    impl Counting {
        fn new() -> Self {
            Self { seen: Mutex::new(Vec::new()), reject: false }
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    struct RejectAll;

    impl ConfigValidator for RejectAll {
        fn validate(&self, _fragment: &Element) -> std::result::Result<(), String> {
            Err("not today".to_string())
        }

        fn validate_against(&self, _one: &Element, _other: &Element) -> std::result::Result<(), String> {
            Err("different".to_string())
        }
    }

    static REJECT_ALL: RejectAll = RejectAll;

    impl ServiceConfigParser for Counting {
        fn namespace(&self) -> &str {
            NS
        }

        fn xml_schema(&self) -> io::Result<Box<dyn Read + '_>> {
            Ok(Box::new(&b""[..]))
        }

        fn parse(&self, fragment: &Element, _source: Option<&Path>) -> std::result::Result<ExtensionConfig, PluginError> {
            self.seen.lock().unwrap().push(fragment.text());
            if fragment.name() == "broken" {
                return Err("cannot parse broken".into());
            }
            Ok(Arc::new(fragment.text()))
        }

        fn config_validator(&self) -> &dyn ConfigValidator {
            if self.reject {
                &REJECT_ALL
            } else {
                &crate::plugin::NOOP_VALIDATOR
            }
        }
    }

    fn foo(text: &str) -> Element {
        Element::new(Some(NS), "foo").with_text(text)
    }

    #[test]
    fn test_duplicate_namespace() {
        let parsers: Vec<Arc<dyn ServiceConfigParser>> = vec![Arc::new(Counting::new()), Arc::new(Counting::new())];
        match PluginRegistry::from_parsers(parsers) {
            Err(TcConfigError::SchemaSetup(msg)) => assert!(msg.contains(NS)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_dispatch_unknown_namespace() {
        let registry = PluginRegistry::from_parsers(Vec::new()).unwrap();
        let fragment = Element::new(Some("urn:example:bar"), "bar");
        match registry.dispatch_fragment(&fragment, None) {
            Err(TcConfigError::UnknownNamespace(ns)) => assert_eq!(ns, "urn:example:bar"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_dispatch_wraps_plugin_errors() {
        let registry = PluginRegistry::from_parsers(vec![Arc::new(Counting::new())]).unwrap();
        let broken = Element::new(Some(NS), "broken");
        match registry.dispatch(NS, &broken, None) {
            Err(TcConfigError::Plugin { namespace, source }) => {
                assert_eq!(namespace, NS);
                assert_eq!(source.to_string(), "cannot parse broken");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_validator_runs_before_parse() {
        let plugin = Arc::new(Counting { reject: true, ..Counting::new() });
        let registry = PluginRegistry::from_parsers(vec![plugin.clone()]).unwrap();

        assert!(matches!(
            registry.dispatch(NS, &foo("a"), None),
            Err(TcConfigError::FragmentRejected { .. })
        ));
        assert_eq!(plugin.calls(), 0);

        match registry.validate_equivalence(&foo("a"), &foo("b")) {
            Err(TcConfigError::FragmentRejected { message, .. }) => assert_eq!(message, "different"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_overrides_and_sharing() {
        let plugin = Arc::new(Counting::new());
        let registry = PluginRegistry::from_parsers(vec![plugin.clone()]).unwrap();

        let first = foo("shared");
        let second = foo("other");
        let replacement = foo("custom");
        let fragments = [
            ExtensionFragment::Service { id: Some("a"), fragment: &first },
            ExtensionFragment::Service { id: Some("b"), fragment: &second },
        ];

        let mut s1 = ServerOverrides { server: "s1", overrides: HashMap::new() };
        s1.overrides.insert("a", Some(&replacement));
        s1.overrides.insert("b", None);
        let s2 = ServerOverrides { server: "s2", overrides: HashMap::new() };

        let resolved = registry.resolve_services(&fragments, &[s1, s2], None).unwrap();
        assert_eq!(plugin.calls(), 3);
        assert_eq!(resolved.shared.len(), 2);

        let on_s1 = &resolved.per_server["s1"];
        assert_eq!(on_s1.len(), 1);
        assert_eq!(on_s1[0].downcast_ref::<String>().map(String::as_str), Some("custom"));

        let on_s2 = &resolved.per_server["s2"];
        assert_eq!(on_s2.len(), 2);
        assert!(Arc::ptr_eq(&on_s2[0], &resolved.shared[0]));
        assert!(Arc::ptr_eq(&on_s2[1], &resolved.shared[1]));
    }

    #[test]
    fn test_duplicate_server_names_keep_first() {
        let registry = PluginRegistry::from_parsers(vec![Arc::new(Counting::new())]).unwrap();
        let fragment = foo("x");
        let mut first = ServerOverrides { server: "s1", overrides: HashMap::new() };
        first.overrides.insert("a", None);
        let second = ServerOverrides { server: "s1", overrides: HashMap::new() };

        let resolved = registry
            .resolve_services(&[ExtensionFragment::Service { id: Some("a"), fragment: &fragment }], &[first, second], None)
            .unwrap();
        assert_eq!(resolved.per_server.len(), 1);
        assert!(resolved.per_server["s1"].is_empty());
    }

    #[test]
    fn test_fragments_dispatched_in_document_order() {
        let plugin = Arc::new(Counting::new());
        let registry = PluginRegistry::from_parsers(vec![plugin.clone()]).unwrap();

        let (config_first, service, replacement, config_last) = (foo("c1"), foo("svc"), foo("svc-s1"), foo("c2"));
        let fragments = [
            ExtensionFragment::Config(&config_first),
            ExtensionFragment::Service { id: Some("a"), fragment: &service },
            ExtensionFragment::Config(&config_last),
        ];
        let mut s1 = ServerOverrides { server: "s1", overrides: HashMap::new() };
        s1.overrides.insert("a", Some(&replacement));

        let resolved = registry.resolve_services(&fragments, &[s1], None).unwrap();
        assert_eq!(plugin.seen(), vec!["c1", "svc", "svc-s1", "c2"]);

        let shared: Vec<&str> = resolved
            .shared
            .iter()
            .filter_map(|c| c.downcast_ref::<String>().map(String::as_str))
            .collect();
        assert_eq!(shared, vec!["c1", "svc", "c2"]);
        assert_eq!(resolved.per_server["s1"].len(), 1);
    }
}
