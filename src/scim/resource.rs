//! Schema-aware resource tree.
//!
//! A SCIM resource split into one attribute map per schema: the core schema
//! first, then one section per extension. Converts from and to the wire
//! representation, where extension attributes are nested under their URN.

use serde_json::{Map, Value};
use thiserror::Error;

use super::schema::SchemaRegistry;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("Unknown resource type '{0}'")]
    UnknownResourceType(String),

    #[error("Resource must be a JSON object")]
    NotAnObject,

    #[error("Extension '{0}' must be a JSON object")]
    InvalidExtension(String),
}

/// Attributes belonging to one schema.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaSection {
    pub urn: String,
    pub attributes: Map<String, Value>,
}

/// A resource as a list of schema sections.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceTree {
    resource_type: String,
    sections: Vec<SchemaSection>,
}

impl ResourceTree {
    /// An empty resource of the given type.
    pub fn new(registry: &SchemaRegistry, resource_type: &str) -> Result<Self, ResourceError> {
        let schemas = registry.schemas_for(resource_type);
        if schemas.is_empty() {
            return Err(ResourceError::UnknownResourceType(resource_type.to_string()));
        }
        Ok(Self {
            resource_type: registry
                .resource_type(resource_type)
                .map_or_else(|| resource_type.to_string(), |rt| rt.name.clone()),
            sections: schemas
                .iter()
                .map(|schema| SchemaSection {
                    urn: schema.id.clone(),
                    attributes: Map::new(),
                })
                .collect(),
        })
    }

    /// Split a SCIM JSON resource into schema sections.
    ///
    /// The `schemas` member is dropped; it is regenerated by [`Self::to_json`].
    /// Top-level keys that are not extension URNs land in the core section.
    pub fn from_json(
        registry: &SchemaRegistry,
        resource_type: &str,
        value: Value,
    ) -> Result<Self, ResourceError> {
        let Value::Object(object) = value else {
            return Err(ResourceError::NotAnObject);
        };

        let mut tree = Self::new(registry, resource_type)?;
        for (key, value) in object {
            if key.eq_ignore_ascii_case("schemas") {
                continue;
            }
            match tree.extension_index(&key) {
                Some(index) => {
                    let Value::Object(attributes) = value else {
                        return Err(ResourceError::InvalidExtension(key));
                    };
                    tree.sections[index].attributes.extend(attributes);
                }
                None => {
                    tree.sections[0].attributes.insert(key, value);
                }
            }
        }
        Ok(tree)
    }

    /// The SCIM JSON representation, with `schemas` listing the core schema
    /// and every non-empty extension.
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        let schemas: Vec<Value> = self
            .sections
            .iter()
            .enumerate()
            .filter(|(i, section)| *i == 0 || !section.attributes.is_empty())
            .map(|(_, section)| Value::String(section.urn.clone()))
            .collect();
        object.insert("schemas".to_string(), Value::Array(schemas));

        if let Some(core) = self.sections.first() {
            object.extend(core.attributes.clone());
        }
        for section in self.sections.iter().skip(1) {
            if !section.attributes.is_empty() {
                object.insert(
                    section.urn.clone(),
                    Value::Object(section.attributes.clone()),
                );
            }
        }
        Value::Object(object)
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn sections(&self) -> &[SchemaSection] {
        &self.sections
    }

    /// Attributes of a schema section (URN matched case-insensitively).
    pub fn section(&self, urn: &str) -> Option<&Map<String, Value>> {
        self.sections
            .iter()
            .find(|s| s.urn.eq_ignore_ascii_case(urn))
            .map(|s| &s.attributes)
    }

    pub fn section_mut(&mut self, urn: &str) -> Option<&mut Map<String, Value>> {
        self.sections
            .iter_mut()
            .find(|s| s.urn.eq_ignore_ascii_case(urn))
            .map(|s| &mut s.attributes)
    }

    /// Attribute value by schema URN and name (both case-insensitive).
    pub fn get(&self, urn: &str, name: &str) -> Option<&Value> {
        self.section(urn).and_then(|attrs| get_ci(attrs, name))
    }

    pub fn get_mut(&mut self, urn: &str, name: &str) -> Option<&mut Value> {
        self.section_mut(urn).and_then(|attrs| get_ci_mut(attrs, name))
    }

    /// Set an attribute, replacing any key that differs only in case.
    ///
    /// Returns `false` if the schema section does not exist.
    pub fn set(&mut self, urn: &str, name: &str, value: Value) -> bool {
        match self.section_mut(urn) {
            Some(attrs) => {
                set_ci(attrs, name, value);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, urn: &str, name: &str) -> Option<Value> {
        self.section_mut(urn).and_then(|attrs| remove_ci(attrs, name))
    }

    fn extension_index(&self, key: &str) -> Option<usize> {
        self.sections
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, s)| s.urn.eq_ignore_ascii_case(key))
            .map(|(i, _)| i)
    }
}

// =============================================================================
// Case-insensitive map helpers
// =============================================================================

pub(crate) fn get_ci<'v>(map: &'v Map<String, Value>, name: &str) -> Option<&'v Value> {
    map.get(name).or_else(|| {
        map.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    })
}

pub(crate) fn get_ci_mut<'v>(map: &'v mut Map<String, Value>, name: &str) -> Option<&'v mut Value> {
    let key = map.keys().find(|k| k.eq_ignore_ascii_case(name))?.clone();
    map.get_mut(&key)
}

pub(crate) fn set_ci(map: &mut Map<String, Value>, name: &str, value: Value) {
    remove_ci(map, name);
    map.insert(name.to_string(), value);
}

pub(crate) fn remove_ci(map: &mut Map<String, Value>, name: &str) -> Option<Value> {
    let key = map.keys().find(|k| k.eq_ignore_ascii_case(name))?.clone();
    map.shift_remove(&key)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::scim::schema::{SCHEMA_ENTERPRISE_USER, SCHEMA_USER};

    #[test]
    fn test_from_json_splits_extensions() {
        let registry = SchemaRegistry::with_defaults();
        let tree = ResourceTree::from_json(
            &registry,
            "user",
            json!({
                "schemas": [SCHEMA_USER, SCHEMA_ENTERPRISE_USER],
                "userName": "bjensen",
                SCHEMA_ENTERPRISE_USER: {"employeeNumber": "701984"}
            }),
        )
        .unwrap();

        assert_eq!(tree.resource_type(), "User");
        assert_eq!(tree.get(SCHEMA_USER, "USERNAME"), Some(&json!("bjensen")));
        assert_eq!(
            tree.get(SCHEMA_ENTERPRISE_USER, "employeeNumber"),
            Some(&json!("701984"))
        );
        assert!(tree.get(SCHEMA_USER, "schemas").is_none());
    }

    #[test]
    fn test_to_json_lists_non_empty_schemas() {
        let registry = SchemaRegistry::with_defaults();
        let mut tree = ResourceTree::new(&registry, "User").unwrap();
        tree.set(SCHEMA_USER, "userName", json!("bjensen"));

        assert_eq!(
            tree.to_json(),
            json!({"schemas": [SCHEMA_USER], "userName": "bjensen"})
        );

        tree.set(SCHEMA_ENTERPRISE_USER, "department", json!("Tour Operations"));
        let json = tree.to_json();
        assert_eq!(json["schemas"], json!([SCHEMA_USER, SCHEMA_ENTERPRISE_USER]));
        assert_eq!(
            json[SCHEMA_ENTERPRISE_USER],
            json!({"department": "Tour Operations"})
        );
    }

    #[test]
    fn test_set_replaces_differently_cased_key() {
        let registry = SchemaRegistry::with_defaults();
        let mut tree =
            ResourceTree::from_json(&registry, "User", json!({"username": "old"})).unwrap();

        tree.set(SCHEMA_USER, "userName", json!("new"));
        let core = tree.section(SCHEMA_USER).unwrap();
        assert_eq!(core.len(), 1);
        assert_eq!(core.get("userName"), Some(&json!("new")));

        assert_eq!(tree.remove(SCHEMA_USER, "USERNAME"), Some(json!("new")));
        assert!(tree.section(SCHEMA_USER).unwrap().is_empty());
    }

    #[test]
    fn test_errors() {
        let registry = SchemaRegistry::with_defaults();
        assert_eq!(
            ResourceTree::from_json(&registry, "User", json!([])),
            Err(ResourceError::NotAnObject)
        );
        assert_eq!(
            ResourceTree::new(&registry, "Device"),
            Err(ResourceError::UnknownResourceType("Device".to_string()))
        );
        assert!(matches!(
            ResourceTree::from_json(&registry, "User", json!({SCHEMA_ENTERPRISE_USER: "x"})),
            Err(ResourceError::InvalidExtension(_))
        ));
    }
}
