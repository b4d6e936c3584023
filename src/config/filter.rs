use serde::{Deserialize, Serialize};

use crate::scim::{BackendDialect, FilterLimits, UnknownAttributePolicy};

/// Filter parsing and evaluation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    /// Longest accepted filter, in bytes.
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    /// Deepest accepted nesting of groups, `not` and value filters.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// What an attribute name missing from the schemas does.
    #[serde(default)]
    pub unknown_attributes: UnknownAttributePolicy,

    /// Literal form of translated predicates.
    #[serde(default)]
    pub dialect: BackendDialect,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_length: default_max_length(),
            max_depth: default_max_depth(),
            unknown_attributes: UnknownAttributePolicy::default(),
            dialect: BackendDialect::default(),
        }
    }
}

impl FilterConfig {
    pub fn limits(&self) -> FilterLimits {
        FilterLimits {
            max_length: self.max_length,
            max_depth: self.max_depth,
        }
    }
}

fn default_max_length() -> usize {
    crate::scim::filter::MAX_FILTER_LENGTH
}

fn default_max_depth() -> usize {
    crate::scim::filter::MAX_FILTER_DEPTH
}
