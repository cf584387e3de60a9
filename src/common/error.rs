//! Error handling module
//!
//! This module defines the error type and result alias shared by every stage
//! of configuration resolution. Each failure kind is one variant, so callers
//! match on a single type regardless of where the pipeline stopped.

use std::fmt;
use std::io;

use thiserror::Error;

/// A single schema or well-formedness problem, tagged with its position in
/// the source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// 1-based line, 0 when the position is unknown
    pub line: u32,
    /// 1-based column, 0 when the position is unknown
    pub column: u32,
    /// Human readable description
    pub message: String,
}

impl ValidationIssue {
    pub fn new(line: u32, column: u32, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.column, self.message)
    }
}

/// Renders a list of issues, one per line.
struct IssueList<'a>(&'a [ValidationIssue]);

impl fmt::Display for IssueList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, issue) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "  {}", issue)?;
        }
        Ok(())
    }
}

/// Error raised by a plugin's own fragment handling
pub type PluginError = Box<dyn std::error::Error + Send + Sync>;

/// Configuration resolution error type
#[derive(Error, Debug)]
pub enum TcConfigError {
    /// Plugin schemas could not be composed (duplicate namespace, unreadable
    /// or malformed schema)
    #[error("Schema setup error: {0}")]
    SchemaSetup(String),

    /// The document violates the composed schema
    #[error("Validation failed with {} issue(s):\n{}", .0.len(), IssueList(.0))]
    Validation(Vec<ValidationIssue>),

    /// The document is schema-valid but does not map onto the configuration model
    #[error("Binding error: {0}")]
    Binding(String),

    /// No installed plugin owns the namespace of an extension element
    #[error("Can't find parser for service {0}")]
    UnknownNamespace(String),

    /// A schema default literal cannot be converted to its field's type
    #[error("Cannot apply default '{text}' to field '{field}'")]
    DefaultCoercion { field: String, text: String },

    /// A plugin's validator rejected a fragment
    #[error("Fragment in namespace {namespace} rejected: {message}")]
    FragmentRejected { namespace: String, message: String },

    /// A plugin failed while parsing its own fragment
    #[error("Plugin for namespace {namespace} failed: {source}")]
    Plugin {
        namespace: String,
        #[source]
        source: PluginError,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl TcConfigError {
    /// Validation issues carried by this error, empty for other kinds
    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            TcConfigError::Validation(issues) => issues,
            _ => &[],
        }
    }
}

/// Result type alias
///
/// This is a `Result` type alias that uses our custom `TcConfigError`.
pub type Result<T> = std::result::Result<T, TcConfigError>;
