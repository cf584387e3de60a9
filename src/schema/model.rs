//! Schema document model
//!
//! An in-memory form of the XSD subset used by the core and plugin schemas.
//! Type references stay symbolic ([`QName`]) and are resolved against the
//! composed [`ValidationSchema`](super::ValidationSchema) at validation time,
//! which is what lets one schema refer to types another one declares.

use std::collections::HashMap;
use std::fmt;

use log::debug;
use roxmltree::Node;

/// XML Schema namespace
pub const XS_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

/// Namespace-qualified name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub namespace: Option<String>,
    pub local: String,
}

impl QName {
    pub fn new(namespace: Option<&str>, local: &str) -> Self {
        Self {
            namespace: namespace.map(str::to_string),
            local: local.to_string(),
        }
    }

    /// Built-in XML Schema type
    pub fn xs(local: &str) -> Self {
        Self::new(Some(XS_NAMESPACE), local)
    }

    pub fn is_builtin(&self) -> bool {
        self.namespace.as_deref() == Some(XS_NAMESPACE)
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{}}}{}", ns, self.local),
            None => write!(f, "{}", self.local),
        }
    }
}

/// Reference to a type, either by name or declared inline
#[derive(Debug, Clone)]
pub enum TypeRef {
    Named(QName),
    Complex(Box<ComplexType>),
    Simple(Box<SimpleType>),
}

#[derive(Debug, Clone)]
pub struct ElementDecl {
    pub name: QName,
    /// `None` means `xs:anyType`
    pub type_ref: Option<TypeRef>,
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceConstraint {
    Any,
    /// Qualified and not the given (target) namespace
    Other(Option<String>),
    Only(Vec<Option<String>>),
}

impl NamespaceConstraint {
    pub fn allows(&self, namespace: Option<&str>) -> bool {
        match self {
            NamespaceConstraint::Any => true,
            NamespaceConstraint::Other(target) => {
                namespace.is_some() && namespace != target.as_deref()
            }
            NamespaceConstraint::Only(list) => list.iter().any(|n| n.as_deref() == namespace),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessContents {
    Strict,
    Lax,
    Skip,
}

#[derive(Debug, Clone)]
pub struct Wildcard {
    pub namespaces: NamespaceConstraint,
    pub process: ProcessContents,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    Sequence,
    Choice,
    All,
}

#[derive(Debug, Clone)]
pub enum Term {
    Element(ElementDecl),
    Ref(QName),
    Any(Wildcard),
    Group(GroupKind, Vec<Particle>),
}

/// A term with its occurrence bounds
#[derive(Debug, Clone)]
pub struct Particle {
    pub term: Term,
    pub min: u32,
    /// `None` means unbounded
    pub max: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct AttributeDecl {
    pub name: String,
    /// `None` means `xs:anySimpleType`
    pub type_ref: Option<TypeRef>,
    pub required: bool,
    pub default: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Content {
    Empty,
    Elements(Particle),
    Simple(TypeRef),
}

#[derive(Debug, Clone)]
pub struct ComplexType {
    /// Declared name, or the name of the element declaring it inline
    pub name: String,
    pub attributes: Vec<AttributeDecl>,
    pub any_attribute: bool,
    pub mixed: bool,
    pub content: Content,
}

#[derive(Debug, Clone, Default)]
pub struct Facets {
    pub enumeration: Vec<String>,
    pub min_inclusive: Option<f64>,
    pub max_inclusive: Option<f64>,
    pub min_exclusive: Option<f64>,
    pub max_exclusive: Option<f64>,
    pub length: Option<usize>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct SimpleType {
    pub name: Option<String>,
    pub base: TypeRef,
    pub facets: Facets,
}

/// One parsed schema source
#[derive(Debug, Clone)]
pub struct SchemaDocument {
    pub target_namespace: Option<String>,
    pub elements: HashMap<String, ElementDecl>,
    pub complex_types: HashMap<String, ComplexType>,
    pub simple_types: HashMap<String, SimpleType>,
    /// Where the schema came from, for diagnostics
    pub origin: String,
}

type ParseResult<T> = std::result::Result<T, String>;

struct Context {
    target: Option<String>,
    qualified: bool,
}

impl SchemaDocument {
    /// Parse schema text
    pub fn parse(text: &str, origin: &str) -> ParseResult<Self> {
        let doc = roxmltree::Document::parse(text)
            .map_err(|e| format!("{}: malformed schema: {}", origin, e))?;
        let root = doc.root_element();
        if !is_xs(root, "schema") {
            return Err(format!("{}: root element is not xs:schema", origin));
        }

        let ctx = Context {
            target: root.attribute("targetNamespace").map(str::to_string),
            qualified: root.attribute("elementFormDefault") == Some("qualified"),
        };

        let mut schema = SchemaDocument {
            target_namespace: ctx.target.clone(),
            elements: HashMap::new(),
            complex_types: HashMap::new(),
            simple_types: HashMap::new(),
            origin: origin.to_string(),
        };

        for child in xs_children(root) {
            match child.tag_name().name() {
                "element" => {
                    let decl = parse_element(child, &ctx, true).map_err(|e| at(origin, child, e))?;
                    schema.elements.insert(decl.name.local.clone(), decl);
                }
                "complexType" => {
                    let name = required_attr(child, "name").map_err(|e| at(origin, child, e))?;
                    let ct = parse_complex(child, &ctx, name).map_err(|e| at(origin, child, e))?;
                    schema.complex_types.insert(name.to_string(), ct);
                }
                "simpleType" => {
                    let st = parse_simple(child).map_err(|e| at(origin, child, e))?;
                    let name = st.name.clone().unwrap_or_default();
                    schema.simple_types.insert(name, st);
                }
                "annotation" | "import" | "include" => {}
                other => {
                    return Err(at(origin, child, format!("unsupported schema construct xs:{}", other)));
                }
            }
        }

        debug!(
            "Parsed schema {} for namespace {:?}: {} element(s), {} complex type(s), {} simple type(s)",
            origin,
            schema.target_namespace,
            schema.elements.len(),
            schema.complex_types.len(),
            schema.simple_types.len()
        );

        Ok(schema)
    }
}

fn at(origin: &str, node: Node<'_, '_>, message: String) -> String {
    let pos = node.document().text_pos_at(node.range().start);
    format!("{}:{}:{}: {}", origin, pos.row, pos.col, message)
}

fn is_xs(node: Node<'_, '_>, local: &str) -> bool {
    node.is_element() && node.tag_name().namespace() == Some(XS_NAMESPACE) && node.tag_name().name() == local
}

fn xs_children<'a, 'i>(node: Node<'a, 'i>) -> impl Iterator<Item = Node<'a, 'i>> {
    node.children()
        .filter(|c| c.is_element() && c.tag_name().namespace() == Some(XS_NAMESPACE))
        .filter(|c| c.tag_name().name() != "annotation")
}

fn required_attr<'a>(node: Node<'a, '_>, name: &str) -> ParseResult<&'a str> {
    node.attribute(name)
        .ok_or_else(|| format!("xs:{} is missing the '{}' attribute", node.tag_name().name(), name))
}

fn resolve_qname(node: Node<'_, '_>, value: &str) -> ParseResult<QName> {
    let (prefix, local) = match value.split_once(':') {
        Some((p, l)) => (Some(p), l),
        None => (None, value),
    };

    match node.lookup_namespace_uri(prefix) {
        Some(ns) => Ok(QName::new(Some(ns), local)),
        None if prefix.is_none() => Ok(QName::new(None, local)),
        None => Err(format!("undeclared namespace prefix in '{}'", value)),
    }
}

fn parse_occurs(node: Node<'_, '_>) -> ParseResult<(u32, Option<u32>)> {
    let min = match node.attribute("minOccurs") {
        Some(v) => v.trim().parse::<u32>().map_err(|_| format!("invalid minOccurs '{}'", v))?,
        None => 1,
    };
    let max = match node.attribute("maxOccurs") {
        Some("unbounded") => None,
        Some(v) => Some(v.trim().parse::<u32>().map_err(|_| format!("invalid maxOccurs '{}'", v))?),
        None => Some(1),
    };
    if let Some(max) = max {
        if max < min {
            return Err(format!("maxOccurs {} is less than minOccurs {}", max, min));
        }
    }
    Ok((min, max))
}

fn parse_element(node: Node<'_, '_>, ctx: &Context, global: bool) -> ParseResult<ElementDecl> {
    let name = required_attr(node, "name")?;
    let qualified = match node.attribute("form") {
        Some("qualified") => true,
        Some("unqualified") => false,
        _ => global || ctx.qualified,
    };
    let namespace = if qualified { ctx.target.as_deref() } else { None };

    let type_ref = if let Some(type_name) = node.attribute("type") {
        Some(TypeRef::Named(resolve_qname(node, type_name)?))
    } else if let Some(inline) = xs_children(node).next() {
        match inline.tag_name().name() {
            "complexType" => Some(TypeRef::Complex(Box::new(parse_complex(inline, ctx, name)?))),
            "simpleType" => Some(TypeRef::Simple(Box::new(parse_simple(inline)?))),
            other => return Err(format!("unsupported construct xs:{} in element '{}'", other, name)),
        }
    } else {
        None
    };

    Ok(ElementDecl {
        name: QName::new(namespace, name),
        type_ref,
        default: node.attribute("default").map(str::to_string),
    })
}

fn parse_particle(node: Node<'_, '_>, ctx: &Context) -> ParseResult<Particle> {
    let (min, max) = parse_occurs(node)?;
    let term = match node.tag_name().name() {
        "element" => match node.attribute("ref") {
            Some(r) => Term::Ref(resolve_qname(node, r)?),
            None => Term::Element(parse_element(node, ctx, false)?),
        },
        "any" => Term::Any(parse_wildcard(node, ctx)?),
        "sequence" => Term::Group(GroupKind::Sequence, parse_group_items(node, ctx)?),
        "choice" => Term::Group(GroupKind::Choice, parse_group_items(node, ctx)?),
        "all" => {
            let items = parse_group_items(node, ctx)?;
            if items.iter().any(|p| !matches!(p.term, Term::Element(_) | Term::Ref(_))) {
                return Err("xs:all may only contain elements".to_string());
            }
            Term::Group(GroupKind::All, items)
        }
        other => return Err(format!("unsupported particle xs:{}", other)),
    };
    Ok(Particle { term, min, max })
}

fn parse_group_items(node: Node<'_, '_>, ctx: &Context) -> ParseResult<Vec<Particle>> {
    xs_children(node).map(|c| parse_particle(c, ctx)).collect()
}

fn parse_wildcard(node: Node<'_, '_>, ctx: &Context) -> ParseResult<Wildcard> {
    let namespaces = match node.attribute("namespace").map(str::trim) {
        None | Some("##any") => NamespaceConstraint::Any,
        Some("##other") => NamespaceConstraint::Other(ctx.target.clone()),
        Some(list) => NamespaceConstraint::Only(
            list.split_whitespace()
                .map(|item| match item {
                    "##targetNamespace" => ctx.target.clone(),
                    "##local" => None,
                    uri => Some(uri.to_string()),
                })
                .collect(),
        ),
    };

    let process = match node.attribute("processContents") {
        None | Some("strict") => ProcessContents::Strict,
        Some("lax") => ProcessContents::Lax,
        Some("skip") => ProcessContents::Skip,
        Some(other) => return Err(format!("invalid processContents '{}'", other)),
    };

    Ok(Wildcard { namespaces, process })
}

fn parse_attribute(node: Node<'_, '_>) -> ParseResult<AttributeDecl> {
    let name = required_attr(node, "name")?;
    let type_ref = match node.attribute("type") {
        Some(t) => Some(TypeRef::Named(resolve_qname(node, t)?)),
        None => match xs_children(node).find(|c| is_xs(*c, "simpleType")) {
            Some(inline) => Some(TypeRef::Simple(Box::new(parse_simple(inline)?))),
            None => None,
        },
    };

    Ok(AttributeDecl {
        name: name.to_string(),
        type_ref,
        required: node.attribute("use") == Some("required"),
        default: node.attribute("default").map(str::to_string),
    })
}

fn parse_complex(node: Node<'_, '_>, ctx: &Context, name: &str) -> ParseResult<ComplexType> {
    let mut ct = ComplexType {
        name: name.to_string(),
        attributes: Vec::new(),
        any_attribute: false,
        mixed: node.attribute("mixed") == Some("true"),
        content: Content::Empty,
    };

    for child in xs_children(node) {
        match child.tag_name().name() {
            "sequence" | "choice" | "all" => ct.content = Content::Elements(parse_particle(child, ctx)?),
            "attribute" => ct.attributes.push(parse_attribute(child)?),
            "anyAttribute" => ct.any_attribute = true,
            "simpleContent" => {
                let ext = xs_children(child)
                    .find(|c| is_xs(*c, "extension"))
                    .ok_or_else(|| format!("simple content of '{}' must be an xs:extension", name))?;
                let base = resolve_qname(ext, required_attr(ext, "base")?)?;
                for part in xs_children(ext) {
                    match part.tag_name().name() {
                        "attribute" => ct.attributes.push(parse_attribute(part)?),
                        "anyAttribute" => ct.any_attribute = true,
                        other => return Err(format!("unsupported construct xs:{} in simple content", other)),
                    }
                }
                ct.content = Content::Simple(TypeRef::Named(base));
            }
            other => return Err(format!("unsupported construct xs:{} in complex type '{}'", other, name)),
        }
    }

    Ok(ct)
}

fn parse_facet_number(node: Node<'_, '_>) -> ParseResult<f64> {
    let value = required_attr(node, "value")?;
    value.trim().parse::<f64>().map_err(|_| format!("invalid numeric facet value '{}'", value))
}

fn parse_facet_length(node: Node<'_, '_>) -> ParseResult<usize> {
    let value = required_attr(node, "value")?;
    value.trim().parse::<usize>().map_err(|_| format!("invalid length facet value '{}'", value))
}

fn parse_simple(node: Node<'_, '_>) -> ParseResult<SimpleType> {
    let name = node.attribute("name").map(str::to_string);

    let Some(derivation) = xs_children(node).next() else {
        return Err("xs:simpleType without a derivation".to_string());
    };

    match derivation.tag_name().name() {
        "restriction" => {}
        // Lists and unions are accepted without content checks.
        "list" | "union" => {
            return Ok(SimpleType {
                name,
                base: TypeRef::Named(QName::xs("anySimpleType")),
                facets: Facets::default(),
            });
        }
        other => return Err(format!("unsupported simple type derivation xs:{}", other)),
    }

    let base = match derivation.attribute("base") {
        Some(b) => TypeRef::Named(resolve_qname(derivation, b)?),
        None => match xs_children(derivation).find(|c| is_xs(*c, "simpleType")) {
            Some(inline) => TypeRef::Simple(Box::new(parse_simple(inline)?)),
            None => return Err("xs:restriction without a base type".to_string()),
        },
    };

    let mut facets = Facets::default();
    for facet in xs_children(derivation) {
        match facet.tag_name().name() {
            "enumeration" => facets.enumeration.push(required_attr(facet, "value")?.to_string()),
            "minInclusive" => facets.min_inclusive = Some(parse_facet_number(facet)?),
            "maxInclusive" => facets.max_inclusive = Some(parse_facet_number(facet)?),
            "minExclusive" => facets.min_exclusive = Some(parse_facet_number(facet)?),
            "maxExclusive" => facets.max_exclusive = Some(parse_facet_number(facet)?),
            "length" => facets.length = Some(parse_facet_length(facet)?),
            "minLength" => facets.min_length = Some(parse_facet_length(facet)?),
            "maxLength" => facets.max_length = Some(parse_facet_length(facet)?),
            "simpleType" => {}
            other => debug!("Ignoring unsupported facet xs:{}", other),
        }
    }

    Ok(SimpleType { name, base, facets })
}
