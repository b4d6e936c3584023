//! SCIM 2.0 PATCH Operations
//!
//! This module implements the request model for SCIM PATCH per RFC 7644 Section 3.5.2.
//! Execution lives in [`super::patch_engine`].
//!
//! ## Operations
//!
//! - `add`: Add value(s) to an attribute
//! - `remove`: Remove attribute or specific value from multi-valued attribute
//! - `replace`: Replace attribute value
//!
//! Operation names are accepted in any of the casings identity providers send
//! (`add`, `Add`, `ADD`).
//!
//! ## Path Syntax
//!
//! ```text
//! path = attrPath / valuePath [subAttr]
//! attrPath = [URN ":"] ATTRNAME ["." ATTRNAME]
//! valuePath = attrPath "[" valFilter "]"
//! subAttr = "." ATTRNAME
//! ```
//!
//! ## Examples
//!
//! ```json
//! {
//!   "schemas": ["urn:ietf:params:scim:api:messages:2.0:PatchOp"],
//!   "Operations": [
//!     { "op": "replace", "path": "displayName", "value": "New Name" },
//!     { "op": "add", "path": "emails", "value": [{"type": "home", "value": "home@example.com"}] },
//!     { "op": "remove", "path": "members[value eq \"user-123\"]" }
//!   ]
//! }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::filter::{AttrPath, Filter, FilterLimits, FilterParseError, parse_path_expression};
use super::path::UnknownAttribute;
use super::schema::{Mutability, SCHEMA_PATCH_OP};

/// A SCIM PATCH request containing one or more operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchRequest {
    /// SCIM schema URIs (should contain PatchOp schema)
    pub schemas: Vec<String>,

    /// List of patch operations to apply
    #[serde(rename = "Operations", alias = "operations")]
    pub operations: Vec<PatchOp>,
}

impl PatchRequest {
    /// Create a new patch request with operations
    pub fn new(operations: Vec<PatchOp>) -> Self {
        Self {
            schemas: vec![SCHEMA_PATCH_OP.to_string()],
            operations,
        }
    }

    /// Validate the schema URN and the syntax of every path.
    pub fn validate(&self) -> Result<(), PatchError> {
        self.validate_with(&FilterLimits::default())
    }

    /// [`PatchRequest::validate`] with explicit path parser limits.
    pub fn validate_with(&self, limits: &FilterLimits) -> Result<(), PatchError> {
        if !self
            .schemas
            .iter()
            .any(|s| s.eq_ignore_ascii_case(SCHEMA_PATCH_OP))
        {
            return Err(PatchError::InvalidSchema);
        }

        for (index, op) in self.operations.iter().enumerate() {
            op.validate_with(limits).map_err(|e| PatchError::InvalidOperation {
                index,
                error: Box::new(e),
            })?;
        }

        Ok(())
    }
}

/// A single SCIM PATCH operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOp {
    /// Add value(s) to an attribute
    #[serde(alias = "Add", alias = "ADD")]
    Add {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        #[serde(default)]
        value: Value,
    },
    /// Replace attribute value
    #[serde(alias = "Replace", alias = "REPLACE")]
    Replace {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        #[serde(default)]
        value: Value,
    },
    /// Remove attribute or value
    #[serde(alias = "Remove", alias = "REMOVE")]
    Remove {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        /// Values to remove from a multi-valued attribute
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },
}

impl PatchOp {
    /// Create an add operation
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        PatchOp::Add {
            path: Some(path.into()),
            value,
        }
    }

    /// Create a replace operation
    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        PatchOp::Replace {
            path: Some(path.into()),
            value,
        }
    }

    /// Create a remove operation
    pub fn remove(path: impl Into<String>) -> Self {
        PatchOp::Remove {
            path: Some(path.into()),
            value: None,
        }
    }

    /// Operation name as it appears on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            PatchOp::Add { .. } => "add",
            PatchOp::Replace { .. } => "replace",
            PatchOp::Remove { .. } => "remove",
        }
    }

    pub fn path(&self) -> Option<&str> {
        match self {
            PatchOp::Add { path, .. }
            | PatchOp::Replace { path, .. }
            | PatchOp::Remove { path, .. } => path.as_deref(),
        }
    }

    /// Validate the operation: add needs a non-null value, remove needs a path.
    pub fn validate(&self) -> Result<(), PatchError> {
        self.validate_with(&FilterLimits::default())
    }

    /// [`PatchOp::validate`] with explicit path parser limits.
    pub fn validate_with(&self, limits: &FilterLimits) -> Result<(), PatchError> {
        match self {
            PatchOp::Add { value, .. } if value.is_null() => Err(PatchError::InvalidValue(
                "add operation requires a value".to_string(),
            )),
            PatchOp::Remove { path: None, .. } => Err(PatchError::NoTarget(
                "remove operation requires a path".to_string(),
            )),
            _ => match self.path() {
                Some(path) => parse_path_with(path, limits).map(|_| ()),
                None => Ok(()),
            },
        }
    }

    /// Get the parsed path if present
    pub fn parsed_path(&self) -> Result<Option<PatchPath>, PatchError> {
        self.path().map(parse_path).transpose()
    }
}

/// A parsed SCIM PATCH path.
///
/// For `emails[type eq "work"].value` the attribute path is `emails.value`
/// and the value filter is `type eq "work"`.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchPath {
    pub attr: AttrPath,
    /// Value filter selecting elements of a multi-valued attribute
    pub value_filter: Option<Filter>,
}

impl PatchPath {
    /// Create a simple path
    pub fn simple(attr: impl Into<String>) -> Self {
        Self {
            attr: AttrPath::simple(attr),
            value_filter: None,
        }
    }

    /// Create a nested path (e.g., "name.familyName")
    pub fn nested(attr: impl Into<String>, sub_attr: impl Into<String>) -> Self {
        Self {
            attr: AttrPath::nested(attr, sub_attr),
            value_filter: None,
        }
    }
}

impl fmt::Display for PatchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(filter) = &self.value_filter else {
            return write!(f, "{}", self.attr);
        };
        if let Some(urn) = &self.attr.urn {
            write!(f, "{}:", urn)?;
        }
        write!(f, "{}[{}]", self.attr.attr, filter)?;
        if let Some(sub) = &self.attr.sub_attr {
            write!(f, ".{}", sub)?;
        }
        Ok(())
    }
}

/// PATCH operation errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PatchError {
    /// Invalid schema in request
    #[error("Request must include the PatchOp schema")]
    InvalidSchema,

    /// Path missing where required, or nothing matched a value filter
    #[error("No target: {0}")]
    NoTarget(String),

    /// Invalid path syntax, or a path form the target attribute does not allow
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Path or value names an attribute the schemas do not declare
    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),

    /// Attempt to modify a readOnly attribute, or an immutable one that has a value
    #[error("Attribute '{attribute}' is {mutability}")]
    Mutability {
        attribute: String,
        mutability: Mutability,
    },

    /// Invalid value for attribute type
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Invalid operation at index
    #[error("Invalid operation at index {index}: {error}")]
    InvalidOperation {
        index: usize,
        error: Box<PatchError>,
    },
}

impl PatchError {
    /// The underlying error, unwrapping [`PatchError::InvalidOperation`].
    pub fn root(&self) -> &PatchError {
        match self {
            PatchError::InvalidOperation { error, .. } => error.root(),
            other => other,
        }
    }
}

impl From<FilterParseError> for PatchError {
    fn from(e: FilterParseError) -> Self {
        PatchError::InvalidPath(e.to_string())
    }
}

impl From<UnknownAttribute> for PatchError {
    fn from(e: UnknownAttribute) -> Self {
        PatchError::UnknownAttribute(e.to_string())
    }
}

/// Parse a SCIM PATCH path string.
///
/// # Examples
///
/// ```
/// use scim_engine::scim::patch::parse_path;
///
/// let path = parse_path("displayName").unwrap();
/// let path = parse_path("name.familyName").unwrap();
/// let path = parse_path("emails[type eq \"work\"].value").unwrap();
/// ```
pub fn parse_path(input: &str) -> Result<PatchPath, PatchError> {
    parse_path_with(input, &FilterLimits::default())
}

/// [`parse_path`] with explicit parser limits.
pub fn parse_path_with(input: &str, limits: &FilterLimits) -> Result<PatchPath, PatchError> {
    let (attr, value_filter) = parse_path_expression(input, limits)?;
    Ok(PatchPath { attr, value_filter })
}

// =============================================================================
// Tests
// =============================================================================
