//! SCIM 2.0 Schema Registry
//!
//! Read-only attribute metadata for every resource type per RFC 7643. The
//! registry is built once at startup (built-in User/Group schemas plus any
//! extensions declared in configuration) and shared immutably afterwards.
//!
//! Both engines consult it: the filter translator and matcher for attribute
//! types and case sensitivity, the patch engine for mutability and
//! cardinality.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::filter::AttrPath;
use crate::config::SchemaConfig;

// =============================================================================
// Schema URIs
// =============================================================================

/// SCIM Core User schema URI
pub const SCHEMA_USER: &str = "urn:ietf:params:scim:schemas:core:2.0:User";

/// SCIM Core Group schema URI
pub const SCHEMA_GROUP: &str = "urn:ietf:params:scim:schemas:core:2.0:Group";

/// SCIM Enterprise User extension schema URI
pub const SCHEMA_ENTERPRISE_USER: &str =
    "urn:ietf:params:scim:schemas:extension:enterprise:2.0:User";

/// SCIM Error schema URI
pub const SCHEMA_ERROR: &str = "urn:ietf:params:scim:api:messages:2.0:Error";

/// SCIM PatchOp schema URI
pub const SCHEMA_PATCH_OP: &str = "urn:ietf:params:scim:api:messages:2.0:PatchOp";

// =============================================================================
// Attribute Metadata
// =============================================================================

/// Attribute data types per RFC 7643 Section 2.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub enum AttributeType {
    String,
    Boolean,
    Decimal,
    Integer,
    DateTime,
    Binary,
    Reference,
    Complex,
}

impl AttributeType {
    pub fn as_str(self) -> &'static str {
        match self {
            AttributeType::String => "string",
            AttributeType::Boolean => "boolean",
            AttributeType::Decimal => "decimal",
            AttributeType::Integer => "integer",
            AttributeType::DateTime => "dateTime",
            AttributeType::Binary => "binary",
            AttributeType::Reference => "reference",
            AttributeType::Complex => "complex",
        }
    }

    /// Types whose values are JSON strings compared as text.
    pub fn is_textual(self) -> bool {
        matches!(
            self,
            AttributeType::String | AttributeType::Reference | AttributeType::Binary
        )
    }

    /// Types that support `gt`/`ge`/`lt`/`le`.
    pub fn is_ordered(self) -> bool {
        matches!(
            self,
            AttributeType::Integer | AttributeType::Decimal | AttributeType::DateTime
        )
    }
}

/// Attribute mutability per RFC 7643 Section 7.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub enum Mutability {
    ReadOnly,
    #[default]
    ReadWrite,
    Immutable,
    WriteOnly,
}

impl std::fmt::Display for Mutability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mutability::ReadOnly => write!(f, "readOnly"),
            Mutability::ReadWrite => write!(f, "readWrite"),
            Mutability::Immutable => write!(f, "immutable"),
            Mutability::WriteOnly => write!(f, "writeOnly"),
        }
    }
}

/// Metadata for a single attribute or sub-attribute.
///
/// Field names follow the RFC 7643 schema representation so extension schemas
/// can be declared in configuration the same way they are published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AttributeMeta {
    /// Attribute name (matched case-insensitively)
    pub name: String,

    /// Declared data type
    #[serde(rename = "type")]
    pub attr_type: AttributeType,

    /// Whether the attribute holds a list of values
    #[serde(default)]
    pub multi_valued: bool,

    /// Whether string comparisons are case-sensitive
    #[serde(default)]
    pub case_exact: bool,

    #[serde(default)]
    pub mutability: Mutability,

    /// Suggested values (e.g., "work", "home" for `emails.type`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub canonical_values: Vec<String>,

    /// Multi-valued attribute behaves as a set: appending an equal value is a no-op
    #[serde(default)]
    pub distinct_values: bool,

    /// Sub-attributes of a complex attribute
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_attributes: Vec<AttributeMeta>,
}

impl AttributeMeta {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            multi_valued: false,
            case_exact: false,
            mutability: Mutability::ReadWrite,
            canonical_values: Vec::new(),
            distinct_values: false,
            sub_attributes: Vec::new(),
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::String)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::Boolean)
    }

    pub fn date_time(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::DateTime)
    }

    pub fn reference(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::Reference).exact()
    }

    pub fn complex(name: impl Into<String>, sub_attributes: Vec<AttributeMeta>) -> Self {
        let mut meta = Self::new(name, AttributeType::Complex);
        meta.sub_attributes = sub_attributes;
        meta
    }

    /// Mark as multi-valued
    pub fn multi(mut self) -> Self {
        self.multi_valued = true;
        self
    }

    /// Mark as case-exact
    pub fn exact(mut self) -> Self {
        self.case_exact = true;
        self
    }

    pub fn with_mutability(mut self, mutability: Mutability) -> Self {
        self.mutability = mutability;
        self
    }

    pub fn with_canonical_values(mut self, values: &[&str]) -> Self {
        self.canonical_values = values.iter().map(|v| v.to_string()).collect();
        self
    }

    pub fn is_complex(&self) -> bool {
        self.attr_type == AttributeType::Complex
    }

    /// Find a sub-attribute by name (case-insensitive).
    pub fn sub_attribute(&self, name: &str) -> Option<&AttributeMeta> {
        self.sub_attributes
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// Whether elements carry a boolean `primary` marker.
    pub fn has_primary(&self) -> bool {
        self.multi_valued
            && self
                .sub_attribute("primary")
                .is_some_and(|p| p.attr_type == AttributeType::Boolean)
    }
}

/// A schema: a URN plus its attribute definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Schema {
    /// Schema URN (e.g., `urn:ietf:params:scim:schemas:core:2.0:User`)
    pub id: String,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub attributes: Vec<AttributeMeta>,
}

impl Schema {
    /// Find a top-level attribute by name (case-insensitive).
    pub fn attribute(&self, name: &str) -> Option<&AttributeMeta> {
        self.attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
    }

    /// URNs compare case-insensitively.
    pub fn is(&self, urn: &str) -> bool {
        self.id.eq_ignore_ascii_case(urn)
    }
}

/// A resource type: its core schema plus registered extension schemas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceType {
    /// Resource type name (e.g., "User")
    pub name: String,

    /// Core schema URN
    pub schema: String,

    /// Extension schema URNs, in registration order
    #[serde(default)]
    pub extensions: Vec<String>,
}

// =============================================================================
// Registry
// =============================================================================

/// Errors raised while assembling the registry at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Schema '{0}' is already registered")]
    DuplicateSchema(String),

    #[error("Resource type '{0}' is already registered")]
    DuplicateResourceType(String),

    #[error("Unknown resource type '{0}'")]
    UnknownResourceType(String),

    #[error("Resource type '{resource_type}' references unregistered schema '{schema}'")]
    UnknownSchema {
        resource_type: String,
        schema: String,
    },

    #[error("Invalid attribute '{attribute}' in schema '{schema}': {reason}")]
    InvalidAttribute {
        schema: String,
        attribute: String,
        reason: String,
    },
}

/// Process-wide schema metadata, immutable once built.
///
/// Construct with [`SchemaRegistry::with_defaults`] or
/// [`SchemaRegistry::from_config`], then share behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: Vec<Schema>,
    resource_types: Vec<ResourceType>,
}

impl SchemaRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// User (with the Enterprise extension) and Group.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.install_core(true);
        registry
    }

    /// Build the registry from the `[schema]` configuration section.
    pub fn from_config(config: &SchemaConfig) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        registry.install_core(config.enterprise_user);

        for extension in &config.extensions {
            registry.add_extension(&extension.resource_type, extension.to_schema())?;
        }

        tracing::debug!(
            schemas = registry.schemas.len(),
            resource_types = registry.resource_types.len(),
            "Built SCIM schema registry"
        );

        Ok(registry)
    }

    fn install_core(&mut self, enterprise_user: bool) {
        self.schemas.push(user_schema());
        self.schemas.push(group_schema());
        let mut user = ResourceType {
            name: "User".to_string(),
            schema: SCHEMA_USER.to_string(),
            extensions: Vec::new(),
        };
        if enterprise_user {
            self.schemas.push(enterprise_user_schema());
            user.extensions.push(SCHEMA_ENTERPRISE_USER.to_string());
        }
        self.resource_types.push(user);
        self.resource_types.push(ResourceType {
            name: "Group".to_string(),
            schema: SCHEMA_GROUP.to_string(),
            extensions: Vec::new(),
        });
    }

    /// Register a schema definition.
    pub fn register_schema(&mut self, schema: Schema) -> Result<(), RegistryError> {
        if self.schema(&schema.id).is_some() {
            return Err(RegistryError::DuplicateSchema(schema.id));
        }
        for attribute in &schema.attributes {
            validate_attribute(&schema.id, attribute, false)?;
        }
        self.schemas.push(schema);
        Ok(())
    }

    /// Register a resource type; all referenced schemas must already exist.
    pub fn register_resource_type(
        &mut self,
        resource_type: ResourceType,
    ) -> Result<(), RegistryError> {
        if self.resource_type(&resource_type.name).is_some() {
            return Err(RegistryError::DuplicateResourceType(resource_type.name));
        }
        for urn in std::iter::once(&resource_type.schema).chain(&resource_type.extensions) {
            if self.schema(urn).is_none() {
                return Err(RegistryError::UnknownSchema {
                    resource_type: resource_type.name.clone(),
                    schema: urn.clone(),
                });
            }
        }
        self.resource_types.push(resource_type);
        Ok(())
    }

    /// Register an extension schema and attach it to a resource type.
    pub fn add_extension(
        &mut self,
        resource_type: &str,
        schema: Schema,
    ) -> Result<(), RegistryError> {
        let index = self
            .resource_types
            .iter()
            .position(|rt| rt.name.eq_ignore_ascii_case(resource_type))
            .ok_or_else(|| RegistryError::UnknownResourceType(resource_type.to_string()))?;
        let urn = schema.id.clone();
        self.register_schema(schema)?;
        self.resource_types[index].extensions.push(urn);
        Ok(())
    }

    /// Look up a schema by URN (case-insensitive).
    pub fn schema(&self, urn: &str) -> Option<&Schema> {
        self.schemas.iter().find(|s| s.is(urn))
    }

    /// Look up a resource type by name (case-insensitive).
    pub fn resource_type(&self, name: &str) -> Option<&ResourceType> {
        self.resource_types
            .iter()
            .find(|rt| rt.name.eq_ignore_ascii_case(name))
    }

    pub fn resource_types(&self) -> &[ResourceType] {
        &self.resource_types
    }

    /// Schemas of a resource type, core schema first. Empty for unknown types.
    pub fn schemas_for(&self, resource_type: &str) -> Vec<&Schema> {
        let Some(rt) = self.resource_type(resource_type) else {
            return Vec::new();
        };
        std::iter::once(&rt.schema)
            .chain(&rt.extensions)
            .filter_map(|urn| self.schema(urn))
            .collect()
    }

    /// Extension schemas of a resource type.
    pub fn extensions_for(&self, resource_type: &str) -> Vec<&Schema> {
        self.schemas_for(resource_type).into_iter().skip(1).collect()
    }

    /// Metadata of the attribute (or sub-attribute) a path designates.
    pub fn lookup(&self, resource_type: &str, path: &AttrPath) -> Option<&AttributeMeta> {
        let schemas = self.schemas_for(resource_type);
        super::path::resolve(path, &schemas)
            .ok()
            .map(|resolved| resolved.target())
    }
}

fn validate_attribute(
    schema: &str,
    attribute: &AttributeMeta,
    nested: bool,
) -> Result<(), RegistryError> {
    let invalid = |reason: &str| RegistryError::InvalidAttribute {
        schema: schema.to_string(),
        attribute: attribute.name.clone(),
        reason: reason.to_string(),
    };

    if attribute.name.is_empty() {
        return Err(invalid("attribute name cannot be empty"));
    }
    if attribute.is_complex() {
        if nested {
            return Err(invalid("complex attributes cannot be nested"));
        }
        if attribute.sub_attributes.is_empty() {
            return Err(invalid("complex attributes must declare sub-attributes"));
        }
    } else if !attribute.sub_attributes.is_empty() {
        return Err(invalid("only complex attributes may declare sub-attributes"));
    }
    for sub in &attribute.sub_attributes {
        validate_attribute(schema, sub, true)?;
    }
    Ok(())
}

// =============================================================================
// Built-in Schemas (RFC 7643 Section 4)
// =============================================================================

/// `id`, `externalId` and `meta`, shared by every core schema.
fn common_attributes() -> Vec<AttributeMeta> {
    vec![
        AttributeMeta::string("id")
            .exact()
            .with_mutability(Mutability::ReadOnly),
        AttributeMeta::string("externalId").exact(),
        AttributeMeta::complex(
            "meta",
            vec![
                AttributeMeta::string("resourceType").exact(),
                AttributeMeta::date_time("created"),
                AttributeMeta::date_time("lastModified"),
                AttributeMeta::reference("location"),
                AttributeMeta::string("version").exact(),
            ],
        )
        .with_mutability(Mutability::ReadOnly),
    ]
}

/// Sub-attributes of the plural "value/display/type/primary" attributes.
fn plural_sub_attributes(types: &[&str]) -> Vec<AttributeMeta> {
    vec![
        AttributeMeta::string("value"),
        AttributeMeta::string("display"),
        AttributeMeta::string("type").with_canonical_values(types),
        AttributeMeta::boolean("primary"),
    ]
}

fn user_schema() -> Schema {
    let mut attributes = common_attributes();
    attributes.extend([
        AttributeMeta::string("userName"),
        AttributeMeta::complex(
            "name",
            vec![
                AttributeMeta::string("formatted"),
                AttributeMeta::string("familyName"),
                AttributeMeta::string("givenName"),
                AttributeMeta::string("middleName"),
                AttributeMeta::string("honorificPrefix"),
                AttributeMeta::string("honorificSuffix"),
            ],
        ),
        AttributeMeta::string("displayName"),
        AttributeMeta::string("nickName"),
        AttributeMeta::reference("profileUrl"),
        AttributeMeta::string("title"),
        AttributeMeta::string("userType"),
        AttributeMeta::string("preferredLanguage"),
        AttributeMeta::string("locale"),
        AttributeMeta::string("timezone"),
        AttributeMeta::boolean("active"),
        AttributeMeta::string("password")
            .exact()
            .with_mutability(Mutability::WriteOnly),
        AttributeMeta::complex("emails", plural_sub_attributes(&["work", "home", "other"]))
            .multi(),
        AttributeMeta::complex(
            "phoneNumbers",
            plural_sub_attributes(&["work", "home", "mobile", "fax", "pager", "other"]),
        )
        .multi(),
        AttributeMeta::complex(
            "ims",
            plural_sub_attributes(&["aim", "gtalk", "icq", "xmpp", "msn", "skype", "qq"]),
        )
        .multi(),
        AttributeMeta::complex("photos", {
            let mut subs = plural_sub_attributes(&["photo", "thumbnail"]);
            subs[0] = AttributeMeta::reference("value");
            subs
        })
        .multi(),
        AttributeMeta::complex(
            "addresses",
            vec![
                AttributeMeta::string("formatted"),
                AttributeMeta::string("streetAddress"),
                AttributeMeta::string("locality"),
                AttributeMeta::string("region"),
                AttributeMeta::string("postalCode"),
                AttributeMeta::string("country"),
                AttributeMeta::string("type").with_canonical_values(&["work", "home", "other"]),
                AttributeMeta::boolean("primary"),
            ],
        )
        .multi(),
        AttributeMeta::complex(
            "groups",
            vec![
                AttributeMeta::string("value"),
                AttributeMeta::reference("$ref"),
                AttributeMeta::string("display"),
                AttributeMeta::string("type").with_canonical_values(&["direct", "indirect"]),
            ],
        )
        .multi()
        .with_mutability(Mutability::ReadOnly),
        AttributeMeta::complex("entitlements", plural_sub_attributes(&[])).multi(),
        AttributeMeta::complex("roles", plural_sub_attributes(&[])).multi(),
        AttributeMeta::complex("x509Certificates", {
            let mut subs = plural_sub_attributes(&[]);
            subs[0] = AttributeMeta::new("value", AttributeType::Binary);
            subs
        })
        .multi(),
    ]);

    Schema {
        id: SCHEMA_USER.to_string(),
        name: "User".to_string(),
        description: Some("User Account".to_string()),
        attributes,
    }
}

fn group_schema() -> Schema {
    let mut attributes = common_attributes();
    attributes.extend([
        AttributeMeta::string("displayName"),
        AttributeMeta::complex(
            "members",
            vec![
                AttributeMeta::string("value")
                    .exact()
                    .with_mutability(Mutability::Immutable),
                AttributeMeta::reference("$ref").with_mutability(Mutability::Immutable),
                AttributeMeta::string("display"),
                AttributeMeta::string("type")
                    .with_canonical_values(&["User", "Group"])
                    .with_mutability(Mutability::Immutable),
            ],
        )
        .multi(),
    ]);

    Schema {
        id: SCHEMA_GROUP.to_string(),
        name: "Group".to_string(),
        description: Some("Group".to_string()),
        attributes,
    }
}

fn enterprise_user_schema() -> Schema {
    Schema {
        id: SCHEMA_ENTERPRISE_USER.to_string(),
        name: "EnterpriseUser".to_string(),
        description: Some("Enterprise User".to_string()),
        attributes: vec![
            AttributeMeta::string("employeeNumber"),
            AttributeMeta::string("costCenter"),
            AttributeMeta::string("organization"),
            AttributeMeta::string("division"),
            AttributeMeta::string("department"),
            AttributeMeta::complex(
                "manager",
                vec![
                    AttributeMeta::string("value"),
                    AttributeMeta::reference("$ref"),
                    AttributeMeta::string("displayName").with_mutability(Mutability::ReadOnly),
                ],
            ),
        ],
    }
}

// =============================================================================
// Tests
// =============================================================================
