//! Document validation against a composed schema
//!
//! Content models are matched greedily. XSD's unique particle attribution
//! rule means every child can be assigned to at most one particle by looking
//! at the child alone, so no backtracking is needed.

use std::collections::HashSet;

use log::debug;

use super::model::{
    ComplexType, Content, ElementDecl, GroupKind, Particle, ProcessContents, QName, SimpleType,
    Term, TypeRef, Wildcard,
};
use super::ValidationSchema;
use crate::common::{Result, TcConfigError, ValidationIssue};
use crate::xml::{Element, TextPosition};

const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";
const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";
const MAX_TYPE_DEPTH: usize = 32;

/// Receives validation issues as they are found
pub trait IssueHandler {
    /// Record an issue; returning an error aborts validation
    fn report(&mut self, issue: ValidationIssue) -> Result<()>;
}

/// Aborts on the first issue
#[derive(Debug, Default)]
pub struct StrictIssues;

impl IssueHandler for StrictIssues {
    fn report(&mut self, issue: ValidationIssue) -> Result<()> {
        Err(TcConfigError::Validation(vec![issue]))
    }
}

/// Accumulates every issue into a caller-supplied sink
#[derive(Debug)]
pub struct CollectedIssues<'a> {
    sink: &'a mut Vec<ValidationIssue>,
}

impl<'a> CollectedIssues<'a> {
    pub fn new(sink: &'a mut Vec<ValidationIssue>) -> Self {
        Self { sink }
    }
}

impl IssueHandler for CollectedIssues<'_> {
    fn report(&mut self, issue: ValidationIssue) -> Result<()> {
        debug!("Collected validation issue {}", issue);
        self.sink.push(issue);
        Ok(())
    }
}

/// Validate `root` and everything below it
pub fn validate(schema: &ValidationSchema, root: &Element, handler: &mut dyn IssueHandler) -> Result<()> {
    let mut validator = Validator {
        schema,
        handler,
        ids: HashSet::new(),
        idrefs: Vec::new(),
    };

    match schema.global_element(root.namespace(), root.name()) {
        Some(decl) => validator.element(root, decl)?,
        None => validator.issue(
            root.position(),
            format!("No declaration found for root element {}", root.qualified_name()),
        )?,
    }

    let Validator { ids, idrefs, handler, .. } = validator;
    for (idref, pos) in idrefs {
        if !ids.contains(&idref) {
            handler.report(ValidationIssue::new(
                pos.line,
                pos.column,
                format!("IDREF '{}' does not match any ID in the document", idref),
            ))?;
        }
    }

    Ok(())
}

enum Assigned<'s> {
    Decl(&'s ElementDecl),
    Wildcard(&'s Wildcard),
}

struct Mismatch {
    index: usize,
    expected: String,
}

type MatchResult<T> = std::result::Result<T, Mismatch>;

/// A simple type reference resolved one step
enum Resolved<'s> {
    Builtin(&'s str),
    Derived(&'s SimpleType),
}

/// Text of a simple-content element; an empty element takes its declared default
fn simple_content(el: &Element, default: Option<&str>) -> String {
    let text = el.text();
    match default {
        Some(default) if text.is_empty() && el.child_elements().next().is_none() => default.to_string(),
        _ => text,
    }
}

struct Validator<'s, 'h> {
    schema: &'s ValidationSchema,
    handler: &'h mut dyn IssueHandler,
    ids: HashSet<String>,
    idrefs: Vec<(String, TextPosition)>,
}

impl<'s> Validator<'s, '_> {
    fn issue(&mut self, pos: TextPosition, message: String) -> Result<()> {
        self.handler.report(ValidationIssue::new(pos.line, pos.column, message))
    }

    fn element(&mut self, el: &Element, decl: &'s ElementDecl) -> Result<()> {
        let Some(type_ref) = &decl.type_ref else {
            return Ok(());
        };

        let default = decl.default.as_deref();
        match type_ref {
            TypeRef::Complex(ct) => self.complex(el, ct, default),
            TypeRef::Simple(_) => self.simple_element(el, type_ref, default),
            TypeRef::Named(name) if name.is_builtin() && name.local == "anyType" => Ok(()),
            TypeRef::Named(name) => {
                if let Some(ct) = self.schema.complex_type(name) {
                    self.complex(el, ct, default)
                } else if name.is_builtin() || self.schema.simple_type(name).is_some() {
                    self.simple_element(el, type_ref, default)
                } else {
                    self.issue(el.position(), format!("Unknown type {} for element {}", name, el.qualified_name()))
                }
            }
        }
    }

    fn simple_element(&mut self, el: &Element, type_ref: &TypeRef, default: Option<&str>) -> Result<()> {
        for attr in el.attributes() {
            if !ignorable_attribute(attr.namespace.as_deref()) {
                self.issue(
                    el.position(),
                    format!("Attribute '{}' is not allowed in element {}", attr.name, el.qualified_name()),
                )?;
            }
        }
        if let Some(child) = el.child_elements().next() {
            self.issue(
                child.position(),
                format!("Element {} must not have child elements", el.qualified_name()),
            )?;
        }
        let text = simple_content(el, default);
        self.value(el.position(), &text, type_ref, &format!("element {}", el.qualified_name()))
    }

    fn complex(&mut self, el: &Element, ct: &'s ComplexType, default: Option<&str>) -> Result<()> {
        self.attributes(el, ct)?;

        match &ct.content {
            Content::Empty => {
                if let Some(child) = el.child_elements().next() {
                    self.issue(
                        child.position(),
                        format!("Element {} must be empty but contains {}", el.qualified_name(), child.qualified_name()),
                    )?;
                }
                if !ct.mixed && el.has_significant_text() {
                    self.issue(el.position(), format!("Element {} must not contain text", el.qualified_name()))?;
                }
                Ok(())
            }
            Content::Simple(base) => {
                if let Some(child) = el.child_elements().next() {
                    self.issue(
                        child.position(),
                        format!("Element {} must not have child elements", el.qualified_name()),
                    )?;
                }
                let text = simple_content(el, default);
                self.value(el.position(), &text, base, &format!("element {}", el.qualified_name()))
            }
            Content::Elements(particle) => {
                if !ct.mixed && el.has_significant_text() {
                    self.issue(el.position(), format!("Element {} must not contain text", el.qualified_name()))?;
                }
                self.children(el, particle)
            }
        }
    }

    fn attributes(&mut self, el: &Element, ct: &'s ComplexType) -> Result<()> {
        for attr in el.attributes() {
            if ignorable_attribute(attr.namespace.as_deref()) {
                continue;
            }
            let decl = match attr.namespace {
                None => ct.attributes.iter().find(|d| d.name == attr.name),
                Some(_) => None,
            };
            match decl {
                Some(decl) => {
                    let context = format!("attribute '{}' of {}", attr.name, el.qualified_name());
                    let any = TypeRef::Named(QName::xs("anySimpleType"));
                    let type_ref = decl.type_ref.as_ref().unwrap_or(&any);
                    self.value(el.position(), &attr.value, type_ref, &context)?;
                }
                None if ct.any_attribute => {}
                None => self.issue(
                    el.position(),
                    format!("Attribute '{}' is not allowed in element {}", attr.name, el.qualified_name()),
                )?,
            }
        }

        for decl in ct.attributes.iter().filter(|d| d.required) {
            if el.attribute(&decl.name).is_none() {
                self.issue(
                    el.position(),
                    format!("Attribute '{}' must appear on element {}", decl.name, el.qualified_name()),
                )?;
            }
        }
        Ok(())
    }

    fn children(&mut self, el: &Element, particle: &'s Particle) -> Result<()> {
        let children: Vec<&Element> = el.child_elements().collect();
        let mut assigned = Vec::with_capacity(children.len());

        match self.match_particle(particle, &children, 0, &mut assigned) {
            Ok(consumed) if consumed < children.len() => {
                let extra = children[consumed];
                self.issue(
                    extra.position(),
                    format!("Unexpected element {} in {}", extra.qualified_name(), el.qualified_name()),
                )?;
            }
            Ok(_) => {}
            Err(mismatch) => {
                let (pos, found) = match children.get(mismatch.index) {
                    Some(child) => (child.position(), format!("found {}", child.qualified_name())),
                    None => (el.position(), "content ended".to_string()),
                };
                self.issue(
                    pos,
                    format!("Invalid content in {}: expected {}, {}", el.qualified_name(), mismatch.expected, found),
                )?;
            }
        }

        for (child, assignment) in children.iter().zip(assigned) {
            match assignment {
                Assigned::Decl(decl) => self.element(child, decl)?,
                Assigned::Wildcard(wildcard) => self.wildcard_child(child, wildcard)?,
            }
        }
        Ok(())
    }

    fn wildcard_child(&mut self, child: &Element, wildcard: &Wildcard) -> Result<()> {
        if wildcard.process == ProcessContents::Skip {
            return Ok(());
        }
        match self.schema.global_element(child.namespace(), child.name()) {
            Some(decl) => self.element(child, decl),
            None if wildcard.process == ProcessContents::Lax => {
                debug!("No declaration for {}, skipping lax validation", child.qualified_name());
                Ok(())
            }
            None => self.issue(
                child.position(),
                format!("No declaration found for element {}", child.qualified_name()),
            ),
        }
    }

    fn match_particle(
        &self,
        particle: &'s Particle,
        children: &[&Element],
        mut pos: usize,
        out: &mut Vec<Assigned<'s>>,
    ) -> MatchResult<usize> {
        let mut count = 0u32;
        while particle.max.map_or(true, |max| count < max) {
            match self.match_term(&particle.term, children, pos, out)? {
                Some(next) if next > pos => {
                    pos = next;
                    count += 1;
                }
                Some(_) => {
                    count += 1;
                    break;
                }
                None => break,
            }
        }

        if count < particle.min && !self.nullable(&particle.term) {
            // A sequence that never started fails at its first required item.
            if let Term::Group(GroupKind::Sequence, items) = &particle.term {
                let mut scratch = Vec::new();
                let mut at = pos;
                for item in items {
                    at = self.match_particle(item, children, at, &mut scratch)?;
                }
            }
            return Err(Mismatch {
                index: pos,
                expected: self.describe(&particle.term),
            });
        }
        Ok(pos)
    }

    /// `Ok(None)` when the term cannot start at `pos`
    fn match_term(
        &self,
        term: &'s Term,
        children: &[&Element],
        pos: usize,
        out: &mut Vec<Assigned<'s>>,
    ) -> MatchResult<Option<usize>> {
        let Some(child) = children.get(pos) else {
            return Ok(None);
        };
        if !self.starts(term, child) {
            return Ok(None);
        }

        match term {
            Term::Element(decl) => {
                out.push(Assigned::Decl(decl));
                Ok(Some(pos + 1))
            }
            Term::Ref(name) => match self.schema.global_element(name.namespace.as_deref(), &name.local) {
                Some(decl) => {
                    out.push(Assigned::Decl(decl));
                    Ok(Some(pos + 1))
                }
                None => Ok(None),
            },
            Term::Any(wildcard) => {
                out.push(Assigned::Wildcard(wildcard));
                Ok(Some(pos + 1))
            }
            Term::Group(GroupKind::Sequence, items) => {
                let mut pos = pos;
                for item in items {
                    pos = self.match_particle(item, children, pos, out)?;
                }
                Ok(Some(pos))
            }
            Term::Group(GroupKind::Choice, items) => {
                match items.iter().find(|item| self.starts(&item.term, child)) {
                    Some(item) => self.match_particle(item, children, pos, out).map(Some),
                    None => Ok(None),
                }
            }
            Term::Group(GroupKind::All, items) => {
                let mut used = vec![false; items.len()];
                let mut pos = pos;
                while let Some(next) = children.get(pos) {
                    let found = items
                        .iter()
                        .enumerate()
                        .find(|(i, item)| !used[*i] && self.starts(&item.term, next));
                    match found {
                        Some((i, item)) => {
                            used[i] = true;
                            pos = self.match_particle(item, children, pos, out)?;
                        }
                        None => break,
                    }
                }
                if let Some(missing) = items.iter().zip(&used).find(|(item, used)| !**used && item.min > 0) {
                    return Err(Mismatch {
                        index: pos,
                        expected: self.describe(&missing.0.term),
                    });
                }
                Ok(Some(pos))
            }
        }
    }

    fn starts(&self, term: &Term, child: &Element) -> bool {
        match term {
            Term::Element(decl) => names_match(&decl.name, child),
            Term::Ref(name) => names_match(name, child),
            Term::Any(wildcard) => wildcard.namespaces.allows(child.namespace()),
            Term::Group(GroupKind::Sequence, items) => {
                for item in items {
                    if self.starts(&item.term, child) {
                        return true;
                    }
                    if item.min > 0 && !self.nullable(&item.term) {
                        return false;
                    }
                }
                false
            }
            Term::Group(_, items) => items.iter().any(|item| self.starts(&item.term, child)),
        }
    }

    fn nullable(&self, term: &Term) -> bool {
        match term {
            Term::Element(_) | Term::Ref(_) | Term::Any(_) => false,
            Term::Group(GroupKind::Choice, items) => {
                items.iter().any(|item| item.min == 0 || self.nullable(&item.term))
            }
            Term::Group(_, items) => items.iter().all(|item| item.min == 0 || self.nullable(&item.term)),
        }
    }

    fn describe(&self, term: &Term) -> String {
        match term {
            Term::Element(decl) => decl.name.to_string(),
            Term::Ref(name) => name.to_string(),
            Term::Any(_) => "an element from another namespace".to_string(),
            Term::Group(kind, items) => {
                let names: Vec<String> = items.iter().map(|item| self.describe(&item.term)).collect();
                match kind {
                    GroupKind::Choice => format!("one of ({})", names.join(" | ")),
                    _ => format!("({})", names.join(", ")),
                }
            }
        }
    }

    fn value(&mut self, pos: TextPosition, text: &str, type_ref: &TypeRef, context: &str) -> Result<()> {
        match self.check_value(text, type_ref, 0) {
            Ok(builtin) => {
                let token = text.trim();
                match builtin.as_str() {
                    "ID" => {
                        if !self.ids.insert(token.to_string()) {
                            self.issue(pos, format!("Duplicate ID '{}' in {}", token, context))?;
                        }
                    }
                    "IDREF" => self.idrefs.push((token.to_string(), pos)),
                    _ => {}
                }
                Ok(())
            }
            Err(message) => self.issue(pos, format!("Invalid value '{}' for {}: {}", text, context, message)),
        }
    }

    /// Checks `text` against a simple type, returning the built-in it derives from
    fn check_value(&self, text: &str, type_ref: &TypeRef, depth: usize) -> std::result::Result<String, String> {
        if depth > MAX_TYPE_DEPTH {
            return Err("type derivation too deep".to_string());
        }

        let resolved = match type_ref {
            TypeRef::Named(name) if name.is_builtin() => Resolved::Builtin(&name.local),
            TypeRef::Named(name) => match self.schema.simple_type(name) {
                Some(st) => Resolved::Derived(st),
                None => return Err(format!("unknown simple type {}", name)),
            },
            TypeRef::Simple(st) => Resolved::Derived(st),
            TypeRef::Complex(ct) => return Err(format!("complex type {} used as a simple type", ct.name)),
        };

        match resolved {
            Resolved::Builtin(local) => {
                check_builtin(local, text)?;
                Ok(local.to_string())
            }
            Resolved::Derived(st) => {
                let builtin = self.check_value(text, &st.base, depth + 1)?;
                check_facets(st, text, &builtin)?;
                Ok(builtin)
            }
        }
    }
}

fn names_match(name: &QName, el: &Element) -> bool {
    name.local == el.name() && name.namespace.as_deref() == el.namespace()
}

fn ignorable_attribute(namespace: Option<&str>) -> bool {
    matches!(namespace, Some(XSI_NAMESPACE) | Some(XML_NAMESPACE))
}

fn is_string_like(builtin: &str) -> bool {
    matches!(builtin, "string" | "anySimpleType")
}

fn check_integer(text: &str, min: i128, max: i128) -> std::result::Result<(), String> {
    let value: i128 = text
        .strip_prefix('+')
        .unwrap_or(text)
        .parse()
        .map_err(|_| "not an integer".to_string())?;
    if value < min || value > max {
        return Err(format!("must be between {} and {}", min, max));
    }
    Ok(())
}

fn check_builtin(local: &str, raw: &str) -> std::result::Result<(), String> {
    let text = raw.trim();
    match local {
        "string" | "normalizedString" | "anySimpleType" | "anyURI" => Ok(()),
        "token" | "language" | "Name" | "NMTOKEN" => Ok(()),
        "NCName" | "ID" | "IDREF" => {
            if text.is_empty() || text.contains(':') || text.contains(char::is_whitespace) {
                Err("not a valid NCName".to_string())
            } else {
                Ok(())
            }
        }
        "boolean" => match text {
            "true" | "false" | "1" | "0" => Ok(()),
            _ => Err("not a boolean".to_string()),
        },
        "byte" => check_integer(text, i8::MIN.into(), i8::MAX.into()),
        "short" => check_integer(text, i16::MIN.into(), i16::MAX.into()),
        "int" => check_integer(text, i32::MIN.into(), i32::MAX.into()),
        "long" => check_integer(text, i64::MIN.into(), i64::MAX.into()),
        "integer" => check_integer(text, i128::MIN, i128::MAX),
        "unsignedByte" => check_integer(text, 0, u8::MAX.into()),
        "unsignedShort" => check_integer(text, 0, u16::MAX.into()),
        "unsignedInt" => check_integer(text, 0, u32::MAX.into()),
        "unsignedLong" => check_integer(text, 0, u64::MAX.into()),
        "positiveInteger" => check_integer(text, 1, i128::MAX),
        "nonNegativeInteger" => check_integer(text, 0, i128::MAX),
        "negativeInteger" => check_integer(text, i128::MIN, -1),
        "nonPositiveInteger" => check_integer(text, i128::MIN, 0),
        "decimal" => match text.parse::<f64>() {
            Ok(v) if v.is_finite() && !text.contains(|c| c == 'e' || c == 'E') => Ok(()),
            _ => Err("not a decimal".to_string()),
        },
        "float" | "double" => match text {
            "INF" | "-INF" | "NaN" => Ok(()),
            _ => text.parse::<f64>().map(|_| ()).map_err(|_| format!("not a {}", local)),
        },
        other => Err(format!("unsupported built-in type xs:{}", other)),
    }
}

fn check_facets(st: &SimpleType, raw: &str, builtin: &str) -> std::result::Result<(), String> {
    let facets = &st.facets;
    let text = if is_string_like(builtin) { raw } else { raw.trim() };

    if !facets.enumeration.is_empty() && !facets.enumeration.iter().any(|v| v == text) {
        return Err(format!("must be one of [{}]", facets.enumeration.join(", ")));
    }

    let length = text.chars().count();
    if let Some(exact) = facets.length {
        if length != exact {
            return Err(format!("length must be {}", exact));
        }
    }
    if let Some(min) = facets.min_length {
        if length < min {
            return Err(format!("length must be at least {}", min));
        }
    }
    if let Some(max) = facets.max_length {
        if length > max {
            return Err(format!("length must be at most {}", max));
        }
    }

    let bounded = facets.min_inclusive.is_some()
        || facets.max_inclusive.is_some()
        || facets.min_exclusive.is_some()
        || facets.max_exclusive.is_some();
    if bounded {
        let value: f64 = text.parse().map_err(|_| "not a number".to_string())?;
        if let Some(min) = facets.min_inclusive {
            if value < min {
                return Err(format!("must be at least {}", min));
            }
        }
        if let Some(max) = facets.max_inclusive {
            if value > max {
                return Err(format!("must be at most {}", max));
            }
        }
        if let Some(min) = facets.min_exclusive {
            if value <= min {
                return Err(format!("must be greater than {}", min));
            }
        }
        if let Some(max) = facets.max_exclusive {
            if value >= max {
                return Err(format!("must be less than {}", max));
            }
        }
    }

    Ok(())
}
