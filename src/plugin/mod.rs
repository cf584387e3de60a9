//! Plugin contract
//!
//! A plugin owns one XML namespace. It contributes a schema for that
//! namespace and turns fragments in it into opaque configuration values.
//! Plugins are supplied by a [`PluginLoader`] that is consulted again on
//! every parse, so a parser never caches the installed set.

mod registry;

pub use self::registry::{ExtensionFragment, PluginRegistry, ResolvedServices, ServerOverrides};

use std::any::Any;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

use crate::common::PluginError;
use crate::xml::Element;

/// Opaque value produced by a plugin for one fragment.
///
/// Values are shared: servers that do not override a service hold the same
/// `Arc` as the fragment-level result.
pub type ExtensionConfig = Arc<dyn Any + Send + Sync>;

/// Plugin-specific checks on fragments.
///
/// Both checks accept by default. A rejection message is reported as a
/// fragment rejection naming the plugin's namespace.
pub trait ConfigValidator: Send + Sync {
    /// Check a single fragment before it is parsed
    fn validate(&self, _fragment: &Element) -> Result<(), String> {
        Ok(())
    }

    /// Check that two fragments describe equivalent configuration
    fn validate_against(&self, _one: &Element, _other: &Element) -> Result<(), String> {
        Ok(())
    }
}

/// Validator that accepts everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopValidator;

impl ConfigValidator for NoopValidator {}

static NOOP_VALIDATOR: NoopValidator = NoopValidator;

/// A parser for the configuration fragments of one namespace
pub trait ServiceConfigParser: Send + Sync {
    /// The namespace this plugin owns
    fn namespace(&self) -> &str;

    /// A fresh readable source of the plugin's schema.
    ///
    /// The schema's target namespace must equal [`namespace`](Self::namespace).
    fn xml_schema(&self) -> io::Result<Box<dyn Read + '_>>;

    /// Parse one fragment. `source` is the directory of the document being
    /// parsed, when it came from a file.
    fn parse(&self, fragment: &Element, source: Option<&Path>) -> Result<ExtensionConfig, PluginError>;

    fn config_validator(&self) -> &dyn ConfigValidator {
        &NOOP_VALIDATOR
    }
}

/// Supplies the currently installed plugins
pub trait PluginLoader: Send + Sync {
    fn load(&self) -> Vec<Arc<dyn ServiceConfigParser>>;
}

impl<F> PluginLoader for F
where
    F: Fn() -> Vec<Arc<dyn ServiceConfigParser>> + Send + Sync,
{
    fn load(&self) -> Vec<Arc<dyn ServiceConfigParser>> {
        self()
    }
}

/// A fixed set of plugins
#[derive(Clone, Default)]
pub struct StaticPlugins {
    plugins: Vec<Arc<dyn ServiceConfigParser>>,
}

impl StaticPlugins {
    pub fn new(plugins: Vec<Arc<dyn ServiceConfigParser>>) -> Self {
        Self { plugins }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Add a plugin
    pub fn with<P: ServiceConfigParser + 'static>(mut self, plugin: P) -> Self {
        self.plugins.push(Arc::new(plugin));
        self
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl PluginLoader for StaticPlugins {
    fn load(&self) -> Vec<Arc<dyn ServiceConfigParser>> {
        self.plugins.clone()
    }
}

impl std::fmt::Debug for StaticPlugins {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.plugins.iter().map(|p| p.namespace()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl ServiceConfigParser for Echo {
        fn namespace(&self) -> &str {
            "urn:example:echo"
        }

        fn xml_schema(&self) -> io::Result<Box<dyn Read + '_>> {
            Ok(Box::new(&b""[..]))
        }

        fn parse(&self, fragment: &Element, _source: Option<&Path>) -> Result<ExtensionConfig, PluginError> {
            Ok(Arc::new(fragment.text()))
        }
    }

    #[test]
    fn test_default_validator_accepts() {
        let fragment = Element::new(Some("urn:example:echo"), "echo");
        let validator = Echo.config_validator();
        assert!(validator.validate(&fragment).is_ok());
        assert!(validator.validate_against(&fragment, &fragment).is_ok());
    }

    #[test]
    fn test_static_plugins_load_every_time() {
        let plugins = StaticPlugins::empty().with(Echo);
        assert_eq!(plugins.len(), 1);
        assert_eq!(plugins.load().len(), 1);
        assert_eq!(plugins.load()[0].namespace(), "urn:example:echo");
        assert_eq!(format!("{:?}", plugins), "[\"urn:example:echo\"]");
    }

    #[test]
    fn test_closure_loader() {
        let loader = || vec![Arc::new(Echo) as Arc<dyn ServiceConfigParser>];
        assert_eq!(PluginLoader::load(&loader).len(), 1);
    }

    #[test]
    fn test_extension_config_downcast() {
        let fragment = Element::new(Some("urn:example:echo"), "echo").with_text("hi");
        let config = Echo.parse(&fragment, None).unwrap();
        assert_eq!(config.downcast_ref::<String>().map(String::as_str), Some("hi"));
    }
}
