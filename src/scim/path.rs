//! Attribute path resolution.
//!
//! Maps an [`AttrPath`] onto the schema metadata of a resource type. Names are
//! matched case-insensitively; an unqualified name is looked up in the core
//! schema first, then in each registered extension.

use thiserror::Error;

use super::filter::{AttrPath, FilterLimits, parse_path_expression};
use super::schema::{AttributeMeta, Schema};

/// An attribute path that does not exist in the resource type's schemas.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown attribute '{path}': {message}")]
pub struct UnknownAttribute {
    pub path: String,
    pub message: String,
}

impl UnknownAttribute {
    fn new(path: &AttrPath, message: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

/// A path bound to registry metadata.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedPath<'r> {
    /// Schema that declares the attribute
    pub schema: &'r Schema,
    pub attribute: &'r AttributeMeta,
    pub sub_attribute: Option<&'r AttributeMeta>,
}

impl<'r> ResolvedPath<'r> {
    /// Metadata of the innermost element the path designates.
    pub fn target(&self) -> &'r AttributeMeta {
        self.sub_attribute.unwrap_or(self.attribute)
    }
}

/// Resolve a path against a resource type's schemas (core schema first).
pub fn resolve<'r>(
    path: &AttrPath,
    schemas: &[&'r Schema],
) -> Result<ResolvedPath<'r>, UnknownAttribute> {
    let candidates: Vec<&'r Schema> = match &path.urn {
        Some(urn) => {
            let found: Vec<_> = schemas.iter().copied().filter(|s| s.is(urn)).collect();
            if found.is_empty() {
                return Err(UnknownAttribute::new(
                    path,
                    format!("schema '{}' is not registered for this resource type", urn),
                ));
            }
            found
        }
        None => schemas.to_vec(),
    };

    let Some((schema, attribute)) = candidates
        .iter()
        .find_map(|schema| schema.attribute(&path.attr).map(|attr| (*schema, attr)))
    else {
        return Err(UnknownAttribute::new(path, "no such attribute"));
    };

    let sub_attribute = match &path.sub_attr {
        None => None,
        Some(sub) => {
            if !attribute.is_complex() {
                return Err(UnknownAttribute::new(
                    path,
                    format!("'{}' is not a complex attribute", attribute.name),
                ));
            }
            Some(attribute.sub_attribute(sub).ok_or_else(|| {
                UnknownAttribute::new(
                    path,
                    format!("'{}' has no sub-attribute '{}'", attribute.name, sub),
                )
            })?)
        }
    };

    Ok(ResolvedPath {
        schema,
        attribute,
        sub_attribute,
    })
}

/// Parse and resolve a textual path such as `name.givenName` or
/// `urn:ietf:params:scim:schemas:extension:enterprise:2.0:User:manager.value`.
pub fn resolve_str<'r>(
    raw: &str,
    schemas: &[&'r Schema],
) -> Result<ResolvedPath<'r>, UnknownAttribute> {
    let (path, value_filter) =
        parse_path_expression(raw, &FilterLimits::default()).map_err(|e| UnknownAttribute {
            path: raw.to_string(),
            message: e.to_string(),
        })?;
    if value_filter.is_some() {
        return Err(UnknownAttribute {
            path: raw.to_string(),
            message: "value filters cannot be resolved to a single attribute".to_string(),
        });
    }
    resolve(&path, schemas)
}
