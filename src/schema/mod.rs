//! Schema composition
//!
//! The validation schema is rebuilt for every parse from the core schema and
//! the schema of each installed plugin. Plugin documents come first so that a
//! lookup by namespace finds them before the core; validation itself covers
//! every namespace in a single pass.

pub mod defaults;
pub mod model;
pub mod validator;

pub use self::defaults::SchemaDefaults;
pub use self::model::{ComplexType, ElementDecl, QName, SchemaDocument, SimpleType};
pub use self::validator::{validate, CollectedIssues, IssueHandler, StrictIssues};

use std::collections::HashSet;
use std::io::Read;

use log::debug;

use crate::common::{Result, TcConfigError};
use crate::plugin::PluginRegistry;

/// Namespace of the core configuration schema
pub const CORE_NAMESPACE: &str = "http://www.terracotta.org/config";

/// The core configuration schema
pub const CORE_SCHEMA: &str = include_str!("tc-config.xsd");

/// Schema documents composed into one validation unit
#[derive(Debug, Clone)]
pub struct ValidationSchema {
    documents: Vec<SchemaDocument>,
}

impl ValidationSchema {
    /// Compose the core schema with every plugin schema in `registry`
    pub fn compose(registry: &PluginRegistry) -> Result<Self> {
        let mut documents = Vec::with_capacity(registry.len() + 1);

        for parser in registry.parsers() {
            let namespace = parser.namespace();
            let mut text = String::new();
            parser
                .xml_schema()
                .and_then(|mut source| source.read_to_string(&mut text))
                .map_err(|e| {
                    TcConfigError::SchemaSetup(format!("Cannot read schema for namespace {}: {}", namespace, e))
                })?;

            let document = SchemaDocument::parse(&text, namespace).map_err(TcConfigError::SchemaSetup)?;
            if document.target_namespace.as_deref() != Some(namespace) {
                return Err(TcConfigError::SchemaSetup(format!(
                    "Schema for namespace {} declares target namespace {:?}",
                    namespace, document.target_namespace
                )));
            }
            documents.push(document);
        }

        documents.push(Self::core_document()?);
        Self::from_documents(documents)
    }

    /// Compose already-parsed documents, in lookup order
    pub fn from_documents(documents: Vec<SchemaDocument>) -> Result<Self> {
        let mut seen = HashSet::new();
        for document in &documents {
            if !seen.insert(document.target_namespace.clone()) {
                return Err(TcConfigError::SchemaSetup(format!(
                    "Namespace {:?} is declared by more than one schema ({})",
                    document.target_namespace, document.origin
                )));
            }
        }

        debug!("Composed validation schema from {} document(s)", documents.len());
        Ok(Self { documents })
    }

    /// Parse the bundled core schema
    pub fn core_document() -> Result<SchemaDocument> {
        SchemaDocument::parse(CORE_SCHEMA, "tc-config.xsd").map_err(TcConfigError::SchemaSetup)
    }

    pub fn documents(&self) -> &[SchemaDocument] {
        &self.documents
    }

    /// First document declaring `namespace`
    pub fn document_for(&self, namespace: Option<&str>) -> Option<&SchemaDocument> {
        self.documents
            .iter()
            .find(|d| d.target_namespace.as_deref() == namespace)
    }

    pub fn global_element(&self, namespace: Option<&str>, local: &str) -> Option<&ElementDecl> {
        self.document_for(namespace)?.elements.get(local)
    }

    pub fn complex_type(&self, name: &QName) -> Option<&ComplexType> {
        self.document_for(name.namespace.as_deref())?
            .complex_types
            .get(&name.local)
    }

    pub fn simple_type(&self, name: &QName) -> Option<&SimpleType> {
        self.document_for(name.namespace.as_deref())?
            .simple_types
            .get(&name.local)
    }

    /// Default table for the core configuration types
    pub fn core_defaults(&self) -> SchemaDefaults {
        self.document_for(Some(CORE_NAMESPACE))
            .map(SchemaDefaults::from_document)
            .unwrap_or_default()
    }
}
