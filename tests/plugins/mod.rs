//! Plugins shared by the integration tests

#![allow(dead_code)]

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tc_config::common::PluginError;
use tc_config::plugin::{ConfigValidator, ExtensionConfig, ServiceConfigParser};
use tc_config::xml::Element;

pub const CORE_NS: &str = "http://www.terracotta.org/config";
pub const FOO_NS: &str = "urn:example:foo";
pub const BAR_NS: &str = "urn:example:bar";

const FOO_XSD: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           targetNamespace="urn:example:foo" elementFormDefault="qualified">
  <xs:element name="foo" type="xs:string"/>
</xs:schema>"#;

const BAR_XSD: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           targetNamespace="urn:example:bar" elementFormDefault="qualified">
  <xs:element name="bar" type="xs:int"/>
</xs:schema>"#;

/// Value produced by [`FooPlugin`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FooConfig {
    pub value: String,
    pub source: Option<PathBuf>,
}

/// Value produced by [`BarPlugin`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarConfig(pub i32);

#[derive(Debug, Default)]
pub struct FooPlugin;

impl ServiceConfigParser for FooPlugin {
    fn namespace(&self) -> &str {
        FOO_NS
    }

    fn xml_schema(&self) -> io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(FOO_XSD.as_bytes()))
    }

    fn parse(&self, fragment: &Element, source: Option<&Path>) -> Result<ExtensionConfig, PluginError> {
        Ok(Arc::new(FooConfig {
            value: fragment.text().trim().to_string(),
            source: source.map(Path::to_path_buf),
        }))
    }
}

/// Parses non-negative `<bar:bar>` integers, checking fragments with `validator`
pub struct BarPlugin<V> {
    pub validator: V,
}

impl<V: ConfigValidator> ServiceConfigParser for BarPlugin<V> {
    fn namespace(&self) -> &str {
        BAR_NS
    }

    fn xml_schema(&self) -> io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(BAR_XSD.as_bytes()))
    }

    fn parse(&self, fragment: &Element, _source: Option<&Path>) -> Result<ExtensionConfig, PluginError> {
        let value: i32 = fragment.text().trim().parse()?;
        if value < 0 {
            return Err(format!("bar must not be negative, got {}", value).into());
        }
        Ok(Arc::new(BarConfig(value)))
    }

    fn config_validator(&self) -> &dyn ConfigValidator {
        &self.validator
    }
}

/// Wrap a body in a `tc-config` root declaring the test namespaces
pub fn document(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<tc-config xmlns="{}" xmlns:foo="{}" xmlns:bar="{}">
{}
</tc-config>"#,
        CORE_NS, FOO_NS, BAR_NS, body
    )
}
