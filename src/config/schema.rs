use serde::{Deserialize, Serialize};

use crate::scim::{AttributeMeta, Schema};

/// Schema registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct SchemaConfig {
    /// Attach the enterprise User extension to `User`.
    #[serde(default = "default_true")]
    pub enterprise_user: bool,

    /// Additional extension schemas.
    #[serde(default)]
    pub extensions: Vec<ExtensionConfig>,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            enterprise_user: true,
            extensions: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// A custom extension schema.
///
/// Attributes use the RFC 7643 schema representation (`type`, `multiValued`,
/// `caseExact`, `mutability`, `subAttributes`).
///
/// ```toml
/// [[schema.extensions]]
/// resource_type = "User"
/// id = "urn:example:params:scim:schemas:extension:badge:2.0:User"
/// name = "Badge"
///
/// [[schema.extensions.attributes]]
/// name = "badgeNumber"
/// type = "string"
/// caseExact = true
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct ExtensionConfig {
    /// Resource type the extension attaches to.
    pub resource_type: String,

    /// Extension schema URN.
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub attributes: Vec<AttributeMeta>,
}

impl ExtensionConfig {
    pub fn to_schema(&self) -> Schema {
        Schema {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            attributes: self.attributes.clone(),
        }
    }
}
