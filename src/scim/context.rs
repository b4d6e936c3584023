//! Per-call filter evaluation context.

use serde::{Deserialize, Serialize};

use super::filter::AttrPath;
use super::path::{ResolvedPath, UnknownAttribute, resolve};
use super::schema::{Schema, SchemaRegistry};
use crate::config::FilterConfig;

/// How filters treat attribute names the schemas do not declare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum UnknownAttributePolicy {
    /// The comparison matches nothing
    #[default]
    NoMatch,
    /// Translation fails with [`UnknownAttribute`]
    Error,
}

/// Literal form expected by the backing store.
///
/// Semantics are identical across dialects; only how literals of
/// case-insensitive comparisons appear in the emitted predicate differs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum BackendDialect {
    /// Document stores compare against pre-lowercased literals
    #[default]
    Document,
    /// Directory servers fold case through their matching rules
    Directory,
}

/// Everything filter translation and matching need besides the filter itself.
#[derive(Debug, Clone, Copy)]
pub struct FilterContext<'a> {
    pub registry: &'a SchemaRegistry,
    pub resource_type: &'a str,
    pub dialect: BackendDialect,
    pub unknown_attributes: UnknownAttributePolicy,
}

impl<'a> FilterContext<'a> {
    pub fn new(registry: &'a SchemaRegistry, resource_type: &'a str) -> Self {
        Self {
            registry,
            resource_type,
            dialect: BackendDialect::default(),
            unknown_attributes: UnknownAttributePolicy::default(),
        }
    }

    /// Context with the dialect and policy from the `[filter]` config section.
    pub fn from_config(
        registry: &'a SchemaRegistry,
        resource_type: &'a str,
        config: &FilterConfig,
    ) -> Self {
        Self::new(registry, resource_type)
            .with_dialect(config.dialect)
            .with_unknown_attributes(config.unknown_attributes)
    }

    pub fn with_dialect(mut self, dialect: BackendDialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_unknown_attributes(mut self, policy: UnknownAttributePolicy) -> Self {
        self.unknown_attributes = policy;
        self
    }

    pub(crate) fn schemas(&self) -> Vec<&'a Schema> {
        self.registry.schemas_for(self.resource_type)
    }

    /// Resolve a path, applying the unknown-attribute policy.
    ///
    /// `Ok(None)` means the attribute is unknown and the comparison matches
    /// nothing.
    pub(crate) fn resolve(
        &self,
        path: &AttrPath,
    ) -> Result<Option<ResolvedPath<'a>>, UnknownAttribute> {
        match resolve(path, &self.schemas()) {
            Ok(resolved) => Ok(Some(resolved)),
            Err(err) => self.unknown(err).map(|()| None),
        }
    }

    /// Apply the policy to an unknown attribute.
    pub(crate) fn unknown(&self, err: UnknownAttribute) -> Result<(), UnknownAttribute> {
        match self.unknown_attributes {
            UnknownAttributePolicy::NoMatch => {
                tracing::debug!(
                    resource_type = self.resource_type,
                    path = %err.path,
                    "Unknown filter attribute matches nothing"
                );
                Ok(())
            }
            UnknownAttributePolicy::Error => Err(err),
        }
    }
}
