//! Schema-declared default values
//!
//! A flat `(type, field) -> literal` table generated from a schema document.
//! Fields are the local names of child elements and attributes; anonymous
//! complex types are keyed by the name of the element that declares them.

use std::collections::HashMap;

use super::model::{ComplexType, Content, Particle, SchemaDocument, Term, TypeRef};
use crate::common::{Result, TcConfigError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDefaults {
    table: HashMap<(String, String), String>,
}

impl SchemaDefaults {
    /// Empty table, for hand-authored defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect every `default=` declared in `schema`
    pub fn from_document(schema: &SchemaDocument) -> Self {
        let mut defaults = Self::new();
        for ct in schema.complex_types.values() {
            defaults.collect_complex(ct);
        }
        for decl in schema.elements.values() {
            if let Some(TypeRef::Complex(ct)) = &decl.type_ref {
                defaults.collect_complex(ct);
            }
        }
        defaults
    }

    /// Parse schema text and collect its defaults
    pub fn from_xsd(text: &str, origin: &str) -> Result<Self> {
        let schema = SchemaDocument::parse(text, origin).map_err(TcConfigError::SchemaSetup)?;
        Ok(Self::from_document(&schema))
    }

    pub fn insert(&mut self, type_name: &str, field: &str, literal: &str) {
        self.table
            .insert((type_name.to_string(), field.to_string()), literal.to_string());
    }

    /// Default literal for `field` of `type_name`
    pub fn get(&self, type_name: &str, field: &str) -> Option<&str> {
        self.table
            .get(&(type_name.to_string(), field.to_string()))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    fn collect_complex(&mut self, ct: &ComplexType) {
        for attr in &ct.attributes {
            if let Some(default) = &attr.default {
                self.insert(&ct.name, &attr.name, default);
            }
        }
        if let Content::Elements(particle) = &ct.content {
            self.collect_particle(&ct.name, particle);
        }
    }

    fn collect_particle(&mut self, owner: &str, particle: &Particle) {
        match &particle.term {
            Term::Element(decl) => {
                if let Some(default) = &decl.default {
                    self.insert(owner, &decl.name.local, default);
                }
                if let Some(TypeRef::Complex(inner)) = &decl.type_ref {
                    self.collect_complex(inner);
                }
            }
            Term::Group(_, items) => {
                for item in items {
                    self.collect_particle(owner, item);
                }
            }
            Term::Ref(_) | Term::Any(_) => {}
        }
    }
}
