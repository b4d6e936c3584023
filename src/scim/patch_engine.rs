//! SCIM PATCH execution.
//!
//! Applies an ordered list of operations to a [`ResourceTree`] using schema
//! metadata for mutability, cardinality and value types. All operations run
//! against a working copy; the caller's tree is untouched unless every
//! operation succeeds, in which case the patched copy is returned.
//!
//! ## Semantics
//!
//! | Target                          | add                        | replace                    | remove                |
//! |---------------------------------|----------------------------|----------------------------|-----------------------|
//! | single-valued attribute         | set                        | set                        | delete                |
//! | single-valued complex attribute | merge sub-attributes       | overwrite                  | delete                |
//! | multi-valued attribute          | append                     | replace the list           | delete (or the given values) |
//! | `attr[filter]`                  | path error                 | overwrite matches          | delete matches        |
//! | `attr[filter].sub`              | path error                 | set `sub` on matches       | delete `sub` on matches |
//!
//! Add never takes a `null` value. A `null` value in replace clears the
//! target. After any change to a multi-valued
//! attribute with a boolean `primary` sub-attribute, at most one element keeps
//! `primary: true`: the last one the operation touched.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::compare::{self, parse_datetime};
use super::context::{FilterContext, UnknownAttributePolicy};
use super::filter::{AttrPath, Filter, FilterLimits};
use super::matcher::{check_element_filter, try_matches_element};
use super::patch::{PatchError, PatchOp, PatchPath, PatchRequest, parse_path_with};
use super::path::{ResolvedPath, resolve};
use super::resource::{ResourceTree, get_ci, remove_ci, set_ci};
use super::schema::{AttributeMeta, AttributeType, Mutability, Schema, SchemaRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Add,
    Replace,
}

/// What a patch path designates.
enum Target<'a> {
    /// A whole extension schema section
    Extension(&'a Schema),
    Attribute(ResolvedPath<'a>),
}

/// Applies PATCH operations against the schemas of a registry.
#[derive(Debug, Clone, Copy)]
pub struct PatchEngine<'a> {
    registry: &'a SchemaRegistry,
    limits: FilterLimits,
}

impl<'a> PatchEngine<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self {
            registry,
            limits: FilterLimits::default(),
        }
    }

    /// Parser limits for patch paths and the value filters inside them.
    pub fn with_limits(mut self, limits: FilterLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Validate a request, then apply its operations.
    pub fn apply_request(
        &self,
        resource: &ResourceTree,
        request: &PatchRequest,
    ) -> Result<ResourceTree, PatchError> {
        request.validate_with(&self.limits)?;
        self.apply(resource, &request.operations)
    }

    /// Apply operations in order and return the patched resource.
    ///
    /// # Errors
    ///
    /// The first failing operation aborts the whole request with
    /// [`PatchError::InvalidOperation`] carrying its index; `resource` is
    /// never modified.
    pub fn apply(
        &self,
        resource: &ResourceTree,
        operations: &[PatchOp],
    ) -> Result<ResourceTree, PatchError> {
        let mut working = resource.clone();

        for (index, op) in operations.iter().enumerate() {
            debug!(
                index,
                op = op.kind(),
                path = op.path().unwrap_or("<none>"),
                resource_type = resource.resource_type(),
                "Applying SCIM patch operation"
            );

            if let Err(error) = self.apply_op(&mut working, op) {
                warn!(
                    index,
                    op = op.kind(),
                    path = op.path().unwrap_or("<none>"),
                    error = %error,
                    "SCIM patch operation rejected"
                );
                return Err(PatchError::InvalidOperation {
                    index,
                    error: Box::new(error),
                });
            }
        }

        Ok(working)
    }

    fn apply_op(&self, tree: &mut ResourceTree, op: &PatchOp) -> Result<(), PatchError> {
        match op {
            PatchOp::Add { path, value } => match path {
                Some(path) => self.set(tree, &self.parse_path(path)?, value, Mode::Add),
                None => self.merge(tree, value, Mode::Add),
            },
            PatchOp::Replace { path, value } => match path {
                Some(path) => self.set(tree, &self.parse_path(path)?, value, Mode::Replace),
                None => self.merge(tree, value, Mode::Replace),
            },
            PatchOp::Remove { path, value } => {
                let Some(path) = path else {
                    return Err(PatchError::NoTarget(
                        "remove operation requires a path".to_string(),
                    ));
                };
                self.remove(tree, &self.parse_path(path)?, value.as_ref())
            }
        }
    }

    fn parse_path(&self, path: &str) -> Result<PatchPath, PatchError> {
        parse_path_with(path, &self.limits)
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    fn target(&self, tree: &ResourceTree, path: &AttrPath) -> Result<Target<'a>, PatchError> {
        let schemas = self.registry.schemas_for(tree.resource_type());

        // `urn:...:enterprise:2.0:User` parses as URN `...:2.0` plus attribute `User`
        if let Some(urn) = &path.urn
            && path.sub_attr.is_none()
        {
            let full = format!("{}:{}", urn, path.attr);
            if let Some(extension) = schemas.iter().skip(1).find(|s| s.is(&full)) {
                return Ok(Target::Extension(extension));
            }
        }

        Ok(Target::Attribute(resolve(path, &schemas)?))
    }

    fn extension(&self, tree: &ResourceTree, key: &str) -> Option<&'a Schema> {
        self.registry
            .extensions_for(tree.resource_type())
            .into_iter()
            .find(|s| s.is(key))
    }

    /// Indices of the elements a value filter selects.
    fn select(
        &self,
        tree: &ResourceTree,
        parent: &ResolvedPath<'a>,
        filter: &Filter,
        items: &[Value],
    ) -> Result<Vec<usize>, PatchError> {
        let ctx = FilterContext::new(self.registry, tree.resource_type())
            .with_unknown_attributes(UnknownAttributePolicy::Error);

        // Surface unknown sub-attributes even when there are no elements
        check_element_filter(filter, parent, &ctx)?;

        let mut matched = Vec::new();
        for (index, item) in items.iter().enumerate() {
            if try_matches_element(filter, parent, item, &ctx)? {
                matched.push(index);
            }
        }
        Ok(matched)
    }

    // =========================================================================
    // add / replace
    // =========================================================================

    /// No-path add/replace: every key of the object is a path.
    fn merge(&self, tree: &mut ResourceTree, value: &Value, mode: Mode) -> Result<(), PatchError> {
        let Value::Object(object) = value else {
            return Err(PatchError::InvalidValue(
                "operation without a path requires a JSON object value".to_string(),
            ));
        };

        for (key, value) in object {
            if key.eq_ignore_ascii_case("schemas") {
                continue;
            }
            if let Some(extension) = self.extension(tree, key) {
                self.set_extension(tree, extension, value, mode)?;
                continue;
            }

            let path = self.parse_path(key)?;
            if path.value_filter.is_some() {
                return Err(PatchError::InvalidPath(format!(
                    "value filters are not allowed in attribute names: '{}'",
                    key
                )));
            }
            self.set(tree, &path, value, mode)?;
        }
        Ok(())
    }

    fn set(
        &self,
        tree: &mut ResourceTree,
        path: &PatchPath,
        value: &Value,
        mode: Mode,
    ) -> Result<(), PatchError> {
        if mode == Mode::Add && value.is_null() {
            return Err(PatchError::InvalidValue(
                "add operation requires a value".to_string(),
            ));
        }
        match (self.target(tree, &path.attr)?, &path.value_filter) {
            (Target::Extension(schema), None) => self.set_extension(tree, schema, value, mode),
            (Target::Extension(schema), Some(_)) => Err(PatchError::InvalidPath(format!(
                "value filter on extension schema '{}'",
                schema.id
            ))),
            (Target::Attribute(resolved), Some(_)) if mode == Mode::Add => {
                Err(PatchError::InvalidPath(format!(
                    "add cannot target existing '{}' elements by filter",
                    resolved.attribute.name
                )))
            }
            (Target::Attribute(resolved), Some(filter)) => {
                self.replace_filtered(tree, &resolved, filter, value)
            }
            (Target::Attribute(resolved), None) => self.set_attribute(tree, &resolved, value, mode),
        }
    }

    fn set_extension(
        &self,
        tree: &mut ResourceTree,
        schema: &'a Schema,
        value: &Value,
        mode: Mode,
    ) -> Result<(), PatchError> {
        let Value::Object(object) = value else {
            return Err(PatchError::InvalidValue(format!(
                "extension '{}' requires a JSON object",
                schema.id
            )));
        };
        for (key, value) in object {
            let path = PatchPath {
                attr: AttrPath::simple(key.clone()).with_urn(&schema.id),
                value_filter: None,
            };
            self.set(tree, &path, value, mode)?;
        }
        Ok(())
    }

    fn set_attribute(
        &self,
        tree: &mut ResourceTree,
        resolved: &ResolvedPath<'a>,
        value: &Value,
        mode: Mode,
    ) -> Result<(), PatchError> {
        if value.is_null() {
            return self.remove_attribute(tree, resolved, None);
        }

        let urn = resolved.schema.id.as_str();
        let attribute = resolved.attribute;
        let existing = tree.get(urn, &attribute.name).cloned();

        let Some(sub) = resolved.sub_attribute else {
            check_mutability(&attribute.name, attribute, existing.as_ref())?;
            let normalized = normalize(attribute, value)?;

            let updated = if attribute.multi_valued {
                let incoming = match normalized {
                    Value::Array(items) => items,
                    other => vec![other],
                };
                let mut items = match (mode, existing) {
                    (Mode::Add, Some(Value::Array(items))) => items,
                    (Mode::Add, Some(single)) if !single.is_null() => vec![single],
                    _ => Vec::new(),
                };
                let mut touched = Vec::new();
                for item in incoming {
                    if item.is_null() || (attribute.distinct_values && items.contains(&item)) {
                        continue;
                    }
                    touched.push(items.len());
                    items.push(item);
                }
                if attribute.has_primary() {
                    enforce_single_primary(&attribute.name, &mut items, &touched);
                }
                Value::Array(items)
            } else {
                match (mode, existing, normalized) {
                    (Mode::Add, Some(Value::Object(mut current)), Value::Object(incoming)) => {
                        for (key, value) in incoming {
                            set_ci(&mut current, &key, value);
                        }
                        Value::Object(current)
                    }
                    (_, _, normalized) => normalized,
                }
            };

            store(tree, urn, attribute, updated);
            return Ok(());
        };

        // Parent mutability applies to every sub-attribute
        check_mutability(&attribute.name, attribute, None)?;
        let qualified = format!("{}.{}", attribute.name, sub.name);
        let normalized = normalize(sub, value)?;

        if attribute.multi_valued {
            if mode == Mode::Add {
                return Err(PatchError::InvalidPath(format!(
                    "'{}' is multi-valued; add cannot target '{}'",
                    attribute.name, qualified
                )));
            }
            let Some(Value::Array(mut items)) = existing else {
                return Err(PatchError::NoTarget(format!(
                    "'{}' has no elements",
                    attribute.name
                )));
            };
            let touched: Vec<usize> = (0..items.len()).collect();
            set_sub_on(&qualified, sub, &mut items, &touched, &normalized)?;
            if attribute.has_primary() {
                enforce_single_primary(&attribute.name, &mut items, &touched);
            }
            store(tree, urn, attribute, Value::Array(items));
            return Ok(());
        }

        let mut object = match existing {
            Some(Value::Object(object)) => object,
            _ => Map::new(),
        };
        check_mutability(&qualified, sub, get_ci(&object, &sub.name))?;
        set_ci(&mut object, &sub.name, normalized);
        store(tree, urn, attribute, Value::Object(object));
        Ok(())
    }

    /// replace with `attr[filter]` or `attr[filter].sub`.
    fn replace_filtered(
        &self,
        tree: &mut ResourceTree,
        resolved: &ResolvedPath<'a>,
        filter: &Filter,
        value: &Value,
    ) -> Result<(), PatchError> {
        if value.is_null() {
            return self.remove_filtered(tree, resolved, filter);
        }

        let attribute = resolved.attribute;
        if !attribute.is_complex() {
            return Err(PatchError::InvalidPath(format!(
                "value filters require a complex attribute; '{}' is {}",
                attribute.name,
                attribute.attr_type.as_str()
            )));
        }
        check_mutability(&attribute.name, attribute, None)?;

        let urn = resolved.schema.id.as_str();
        let mut items = elements(tree.get(urn, &attribute.name));
        let parent = ResolvedPath {
            sub_attribute: None,
            ..*resolved
        };
        let matched = self.select(tree, &parent, filter, &items)?;
        if matched.is_empty() {
            return Err(PatchError::NoTarget(format!(
                "no '{}' element matches [{}]",
                attribute.name, filter
            )));
        }

        match resolved.sub_attribute {
            Some(sub) => {
                let qualified = format!("{}.{}", attribute.name, sub.name);
                let normalized = normalize(sub, value)?;
                set_sub_on(&qualified, sub, &mut items, &matched, &normalized)?;
            }
            None => {
                check_mutability(&attribute.name, attribute, Some(&Value::Array(items.clone())))?;
                let Value::Object(incoming) = normalize_single(attribute, value)? else {
                    return Err(PatchError::InvalidValue(format!(
                        "'{}' elements must be JSON objects",
                        attribute.name
                    )));
                };
                for &index in &matched {
                    items[index] = Value::Object(incoming.clone());
                }
            }
        }

        if attribute.has_primary() {
            enforce_single_primary(&attribute.name, &mut items, &matched);
        }
        store_elements(tree, urn, attribute, items);
        Ok(())
    }

    // =========================================================================
    // remove
    // =========================================================================

    fn remove(
        &self,
        tree: &mut ResourceTree,
        path: &PatchPath,
        value: Option<&Value>,
    ) -> Result<(), PatchError> {
        match (self.target(tree, &path.attr)?, &path.value_filter) {
            (Target::Extension(schema), None) => {
                if let Some(section) = tree.section(&schema.id) {
                    for (key, current) in section {
                        if let Some(meta) = schema.attribute(key) {
                            check_mutability(&meta.name, meta, Some(current))?;
                        }
                    }
                }
                if let Some(section) = tree.section_mut(&schema.id) {
                    section.clear();
                }
                Ok(())
            }
            (Target::Extension(schema), Some(_)) => Err(PatchError::InvalidPath(format!(
                "value filter on extension schema '{}'",
                schema.id
            ))),
            (Target::Attribute(resolved), Some(filter)) => {
                self.remove_filtered(tree, &resolved, filter)
            }
            (Target::Attribute(resolved), None) => self.remove_attribute(tree, &resolved, value),
        }
    }

    fn remove_attribute(
        &self,
        tree: &mut ResourceTree,
        resolved: &ResolvedPath<'a>,
        value: Option<&Value>,
    ) -> Result<(), PatchError> {
        let urn = resolved.schema.id.as_str();
        let attribute = resolved.attribute;
        let existing = tree.get(urn, &attribute.name).cloned();

        let Some(sub) = resolved.sub_attribute else {
            check_mutability(&attribute.name, attribute, existing.as_ref())?;
            match (value, existing) {
                // Remove the given values only
                (Some(value), Some(Value::Array(mut items))) if attribute.multi_valued => {
                    let targets = match normalize(attribute, value)? {
                        Value::Array(targets) => targets,
                        single => vec![single],
                    };
                    items.retain(|item| !targets.iter().any(|t| same_element(item, t)));
                    store(tree, urn, attribute, Value::Array(items));
                }
                _ => {
                    tree.remove(urn, &attribute.name);
                }
            }
            return Ok(());
        };

        check_mutability(&attribute.name, attribute, None)?;
        let qualified = format!("{}.{}", attribute.name, sub.name);
        let mut items = elements(existing.as_ref());
        for item in &mut items {
            if let Value::Object(object) = item {
                check_mutability(&qualified, sub, get_ci(object, &sub.name))?;
                remove_ci(object, &sub.name);
            }
        }
        store_elements(tree, urn, attribute, items);
        Ok(())
    }

    fn remove_filtered(
        &self,
        tree: &mut ResourceTree,
        resolved: &ResolvedPath<'a>,
        filter: &Filter,
    ) -> Result<(), PatchError> {
        let attribute = resolved.attribute;
        if !attribute.is_complex() {
            return Err(PatchError::InvalidPath(format!(
                "value filters require a complex attribute; '{}' is {}",
                attribute.name,
                attribute.attr_type.as_str()
            )));
        }
        check_mutability(&attribute.name, attribute, None)?;

        let urn = resolved.schema.id.as_str();
        let mut items = elements(tree.get(urn, &attribute.name));
        let parent = ResolvedPath {
            sub_attribute: None,
            ..*resolved
        };
        let matched = self.select(tree, &parent, filter, &items)?;
        if matched.is_empty() {
            debug!(
                attribute = %attribute.name,
                filter = %filter,
                "No elements matched remove filter"
            );
            return Ok(());
        }

        match resolved.sub_attribute {
            Some(sub) => {
                let qualified = format!("{}.{}", attribute.name, sub.name);
                for &index in &matched {
                    if let Value::Object(object) = &mut items[index] {
                        check_mutability(&qualified, sub, get_ci(object, &sub.name))?;
                        remove_ci(object, &sub.name);
                    }
                }
            }
            None => {
                check_mutability(&attribute.name, attribute, Some(&Value::Array(items.clone())))?;
                let mut index = 0;
                items.retain(|_| {
                    let keep = !matched.contains(&index);
                    index += 1;
                    keep
                });
            }
        }

        store_elements(tree, urn, attribute, items);
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Reject writes to readOnly attributes, and to immutable ones holding a value.
fn check_mutability(
    name: &str,
    meta: &AttributeMeta,
    existing: Option<&Value>,
) -> Result<(), PatchError> {
    let has_value = existing.is_some_and(|v| compare::any_present(&[v]));
    match meta.mutability {
        Mutability::ReadOnly => Err(PatchError::Mutability {
            attribute: name.to_string(),
            mutability: Mutability::ReadOnly,
        }),
        Mutability::Immutable if has_value => Err(PatchError::Mutability {
            attribute: name.to_string(),
            mutability: Mutability::Immutable,
        }),
        _ => Ok(()),
    }
}

/// Type-check a submitted value and canonicalize sub-attribute names.
fn normalize(meta: &AttributeMeta, value: &Value) -> Result<Value, PatchError> {
    match value {
        Value::Array(items) if meta.multi_valued => items
            .iter()
            .map(|item| normalize_single(meta, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Array(_) => Err(PatchError::InvalidValue(format!(
            "'{}' is single-valued",
            meta.name
        ))),
        other => normalize_single(meta, other),
    }
}

fn normalize_single(meta: &AttributeMeta, value: &Value) -> Result<Value, PatchError> {
    let valid = match (meta.attr_type, value) {
        (_, Value::Null) => true,
        (t, Value::String(_)) if t.is_textual() => true,
        (AttributeType::DateTime, Value::String(s)) => parse_datetime(s).is_some(),
        (AttributeType::Boolean, Value::Bool(_)) => true,
        (AttributeType::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
        (AttributeType::Decimal, Value::Number(_)) => true,
        (AttributeType::Complex, Value::Object(object)) => {
            let mut canonical = Map::new();
            for (key, sub_value) in object {
                let sub = meta.sub_attribute(key).ok_or_else(|| {
                    PatchError::UnknownAttribute(format!("{}.{}", meta.name, key))
                })?;
                if sub.mutability == Mutability::ReadOnly {
                    return Err(PatchError::Mutability {
                        attribute: format!("{}.{}", meta.name, sub.name),
                        mutability: Mutability::ReadOnly,
                    });
                }
                canonical.insert(sub.name.clone(), normalize(sub, sub_value)?);
            }
            return Ok(Value::Object(canonical));
        }
        _ => false,
    };

    if valid {
        Ok(value.clone())
    } else {
        Err(PatchError::InvalidValue(format!(
            "'{}' expects a {} value, got {}",
            meta.name,
            meta.attr_type.as_str(),
            value
        )))
    }
}

/// Set `sub` on the selected elements (or clear it for `null`).
fn set_sub_on(
    qualified: &str,
    sub: &AttributeMeta,
    items: &mut [Value],
    indices: &[usize],
    value: &Value,
) -> Result<(), PatchError> {
    for &index in indices {
        if let Value::Object(object) = &mut items[index] {
            check_mutability(qualified, sub, get_ci(object, &sub.name))?;
            if value.is_null() {
                remove_ci(object, &sub.name);
            } else {
                set_ci(object, &sub.name, value.clone());
            }
        }
    }
    Ok(())
}

/// Elements of a complex attribute; a single-valued one is a one-element list.
fn elements(value: Option<&Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items.clone(),
        Some(object @ Value::Object(_)) => vec![object.clone()],
        _ => Vec::new(),
    }
}

fn store_elements(tree: &mut ResourceTree, urn: &str, attribute: &AttributeMeta, items: Vec<Value>) {
    let value = if attribute.multi_valued {
        Value::Array(items)
    } else {
        items.into_iter().next().unwrap_or(Value::Null)
    };
    store(tree, urn, attribute, value);
}

/// Write an attribute back, dropping it when empty.
fn store(tree: &mut ResourceTree, urn: &str, attribute: &AttributeMeta, value: Value) {
    if compare::any_present(&[&value]) {
        tree.set(urn, &attribute.name, value);
    } else {
        tree.remove(urn, &attribute.name);
    }
}

fn is_primary(item: &Value) -> bool {
    item.as_object()
        .and_then(|object| get_ci(object, "primary"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Keep `primary: true` on one element only.
///
/// The winner is the last touched element that is primary, else the first
/// primary element. Siblings lose the `primary` key.
fn enforce_single_primary(attribute: &str, items: &mut [Value], touched: &[usize]) {
    let winner = touched
        .iter()
        .rev()
        .copied()
        .find(|&index| is_primary(&items[index]))
        .or_else(|| items.iter().position(is_primary));
    let Some(winner) = winner else {
        return;
    };

    for (index, item) in items.iter_mut().enumerate() {
        if index != winner
            && is_primary(item)
            && let Value::Object(object) = item
        {
            remove_ci(object, "primary");
            debug!(attribute, index, "Cleared primary flag on sibling element");
        }
    }
}

/// Element equality for value-based removal: by `value` when the target has
/// one, otherwise structurally.
fn same_element(item: &Value, target: &Value) -> bool {
    match (item, target) {
        (Value::Object(item), Value::Object(target)) => match get_ci(target, "value") {
            Some(value) => get_ci(item, "value") == Some(value),
            None => item == target,
        },
        _ => item == target,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::scim::schema::{ResourceType, SCHEMA_ENTERPRISE_USER, SCHEMA_GROUP, SCHEMA_USER};

    fn user(registry: &SchemaRegistry, value: Value) -> ResourceTree {
        ResourceTree::from_json(registry, "User", value).unwrap()
    }

    fn group(registry: &SchemaRegistry, value: Value) -> ResourceTree {
        ResourceTree::from_json(registry, "Group", value).unwrap()
    }

    fn root_error(result: Result<ResourceTree, PatchError>) -> PatchError {
        result.unwrap_err().root().clone()
    }

    #[test]
    fn test_replace_simple_attribute() {
        let registry = SchemaRegistry::with_defaults();
        let engine = PatchEngine::new(&registry);
        let resource = user(&registry, json!({"userName": "bjensen", "displayName": "Babs"}));

        let patched = engine
            .apply(&resource, &[PatchOp::replace("DISPLAYNAME", json!("Barbara"))])
            .unwrap();
        assert_eq!(patched.get(SCHEMA_USER, "displayName"), Some(&json!("Barbara")));
        // Input untouched
        assert_eq!(resource.get(SCHEMA_USER, "displayName"), Some(&json!("Babs")));
    }

    #[test]
    fn test_add_appends_to_multi_valued() {
        let registry = SchemaRegistry::with_defaults();
        let engine = PatchEngine::new(&registry);
        let resource = user(&registry, json!({"userName": "bjensen", "emails": []}));
        let op = PatchOp::add("emails", json!([{"value": "x@example.com", "type": "work"}]));

        let patched = engine.apply(&resource, &[op.clone(), op]).unwrap();
        assert_eq!(
            patched.get(SCHEMA_USER, "emails"),
            Some(&json!([
                {"value": "x@example.com", "type": "work"},
                {"value": "x@example.com", "type": "work"}
            ]))
        );

        // Absent attribute starts a new list
        let resource = user(&registry, json!({"userName": "bjensen"}));
        let patched = engine
            .apply(&resource, &[PatchOp::add("emails", json!({"value": "y@example.com"}))])
            .unwrap();
        assert_eq!(patched.get(SCHEMA_USER, "emails"), Some(&json!([{"value": "y@example.com"}])));
    }

    #[test]
    fn test_add_distinct_values_deduplicates() {
        let mut registry = SchemaRegistry::new();
        registry
            .register_schema(Schema {
                id: "urn:example:Device".to_string(),
                name: "Device".to_string(),
                description: None,
                attributes: vec![{
                    let mut tags = AttributeMeta::string("tags").multi();
                    tags.distinct_values = true;
                    tags
                }],
            })
            .unwrap();
        registry
            .register_resource_type(ResourceType {
                name: "Device".to_string(),
                schema: "urn:example:Device".to_string(),
                extensions: Vec::new(),
            })
            .unwrap();

        let engine = PatchEngine::new(&registry);
        let resource = ResourceTree::from_json(&registry, "Device", json!({"tags": ["a"]})).unwrap();
        let patched = engine
            .apply(&resource, &[PatchOp::add("tags", json!(["a", "b"]))])
            .unwrap();
        assert_eq!(patched.get("urn:example:Device", "tags"), Some(&json!(["a", "b"])));
    }

    #[test]
    fn test_add_merges_single_valued_complex() {
        let registry = SchemaRegistry::with_defaults();
        let engine = PatchEngine::new(&registry);
        let resource = user(&registry, json!({"name": {"givenName": "Barbara"}}));

        let patched = engine
            .apply(&resource, &[PatchOp::add("name", json!({"FAMILYNAME": "Jensen"}))])
            .unwrap();
        assert_eq!(
            patched.get(SCHEMA_USER, "name"),
            Some(&json!({"givenName": "Barbara", "familyName": "Jensen"}))
        );

        let patched = engine
            .apply(&resource, &[PatchOp::replace("name", json!({"familyName": "Jensen"}))])
            .unwrap();
        assert_eq!(patched.get(SCHEMA_USER, "name"), Some(&json!({"familyName": "Jensen"})));
    }

    #[test]
    fn test_replace_sub_attribute() {
        let registry = SchemaRegistry::with_defaults();
        let engine = PatchEngine::new(&registry);
        let resource = user(&registry, json!({}));

        let patched = engine
            .apply(&resource, &[PatchOp::replace("name.givenName", json!("Barbara"))])
            .unwrap();
        assert_eq!(patched.get(SCHEMA_USER, "name"), Some(&json!({"givenName": "Barbara"})));
    }

    #[test]
    fn test_remove_by_filter() {
        let registry = SchemaRegistry::with_defaults();
        let engine = PatchEngine::new(&registry);
        let resource = group(
            &registry,
            json!({"displayName": "Tour Guides", "members": [{"value": "u1"}, {"value": "u2"}]}),
        );

        let patched = engine
            .apply(&resource, &[PatchOp::remove("members[value eq \"u1\"]")])
            .unwrap();
        assert_eq!(patched.get(SCHEMA_GROUP, "members"), Some(&json!([{"value": "u2"}])));

        // No match is a no-op
        let unchanged = engine
            .apply(&resource, &[PatchOp::remove("members[value eq \"nobody\"]")])
            .unwrap();
        assert_eq!(unchanged, resource);

        // Removing the last element drops the attribute
        let patched = engine
            .apply(&patched, &[PatchOp::remove("members[value eq \"u2\"]")])
            .unwrap();
        assert!(patched.get(SCHEMA_GROUP, "members").is_none());
    }

    #[test]
    fn test_remove_with_value() {
        let registry = SchemaRegistry::with_defaults();
        let engine = PatchEngine::new(&registry);
        let resource = group(
            &registry,
            json!({"members": [{"value": "u1", "display": "One"}, {"value": "u2"}]}),
        );

        let patched = engine
            .apply(
                &resource,
                &[PatchOp::Remove {
                    path: Some("members".to_string()),
                    value: Some(json!([{"value": "u1"}])),
                }],
            )
            .unwrap();
        assert_eq!(patched.get(SCHEMA_GROUP, "members"), Some(&json!([{"value": "u2"}])));
    }

    #[test]
    fn test_remove_requires_path() {
        let registry = SchemaRegistry::with_defaults();
        let engine = PatchEngine::new(&registry);
        let resource = user(&registry, json!({}));

        let err = root_error(engine.apply(
            &resource,
            &[PatchOp::Remove {
                path: None,
                value: None,
            }],
        ));
        assert!(matches!(err, PatchError::NoTarget(_)));
    }

    #[test]
    fn test_read_only_rejected_and_input_unchanged() {
        let registry = SchemaRegistry::with_defaults();
        let engine = PatchEngine::new(&registry);
        let resource = user(&registry, json!({"id": "abc", "userName": "bjensen"}));

        let result = engine.apply(
            &resource,
            &[
                PatchOp::replace("userName", json!("changed")),
                PatchOp::replace("id", json!("x")),
            ],
        );
        match result {
            Err(PatchError::InvalidOperation { index, error }) => {
                assert_eq!(index, 1);
                assert_eq!(
                    *error,
                    PatchError::Mutability {
                        attribute: "id".to_string(),
                        mutability: Mutability::ReadOnly,
                    }
                );
            }
            other => panic!("Expected InvalidOperation, got {:?}", other),
        }
        assert_eq!(resource.get(SCHEMA_USER, "userName"), Some(&json!("bjensen")));

        let err = root_error(engine.apply(&resource, &[PatchOp::remove("groups")]));
        assert!(matches!(err, PatchError::Mutability { .. }));

        let err = root_error(engine.apply(&resource, &[PatchOp::replace("meta.version", json!("W/\"1\""))]));
        assert!(matches!(err, PatchError::Mutability { .. }));
    }

    #[test]
    fn test_immutable_rejected_when_set() {
        let registry = SchemaRegistry::with_defaults();
        let engine = PatchEngine::new(&registry);
        let resource = group(&registry, json!({"members": [{"value": "u1"}]}));

        let err = root_error(engine.apply(
            &resource,
            &[PatchOp::replace("members[value eq \"u1\"].value", json!("u9"))],
        ));
        assert_eq!(
            err,
            PatchError::Mutability {
                attribute: "members.value".to_string(),
                mutability: Mutability::Immutable,
            }
        );

        // New elements may carry immutable sub-attributes
        let patched = engine
            .apply(&resource, &[PatchOp::add("members", json!([{"value": "u2"}]))])
            .unwrap();
        assert_eq!(patched.get(SCHEMA_GROUP, "members").unwrap().as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_primary_flag_cleared_on_sibling() {
        let registry = SchemaRegistry::with_defaults();
        let engine = PatchEngine::new(&registry);
        let resource = user(
            &registry,
            json!({
                "emails": [
                    {"value": "home@example.com", "type": "home", "primary": true},
                    {"value": "work@example.com", "type": "work"}
                ]
            }),
        );

        let patched = engine
            .apply(
                &resource,
                &[PatchOp::replace("emails[type eq \"work\"].primary", json!(true))],
            )
            .unwrap();
        assert_eq!(
            patched.get(SCHEMA_USER, "emails"),
            Some(&json!([
                {"value": "home@example.com", "type": "home"},
                {"value": "work@example.com", "type": "work", "primary": true}
            ]))
        );
    }

    #[test]
    fn test_add_primary_element_wins() {
        let registry = SchemaRegistry::with_defaults();
        let engine = PatchEngine::new(&registry);
        let resource = user(
            &registry,
            json!({"emails": [{"value": "a@example.com", "primary": true}]}),
        );

        let patched = engine
            .apply(
                &resource,
                &[PatchOp::add(
                    "emails",
                    json!([{"value": "b@example.com", "primary": true}]),
                )],
            )
            .unwrap();
        let emails = patched.get(SCHEMA_USER, "emails").unwrap().as_array().unwrap();
        assert!(!is_primary(&emails[0]));
        assert!(is_primary(&emails[1]));
    }

    #[test]
    fn test_replace_filter_without_match_is_no_target() {
        let registry = SchemaRegistry::with_defaults();
        let engine = PatchEngine::new(&registry);
        let resource = user(&registry, json!({"emails": [{"value": "a@example.com", "type": "home"}]}));

        let err = root_error(engine.apply(
            &resource,
            &[PatchOp::replace("emails[type eq \"work\"].value", json!("w@example.com"))],
        ));
        assert!(matches!(err, PatchError::NoTarget(_)));
    }

    #[test]
    fn test_replace_filtered_element_wholesale() {
        let registry = SchemaRegistry::with_defaults();
        let engine = PatchEngine::new(&registry);
        let resource = user(
            &registry,
            json!({"emails": [{"value": "a@example.com", "type": "home", "display": "A"}]}),
        );

        let patched = engine
            .apply(
                &resource,
                &[PatchOp::replace(
                    "emails[type eq \"home\"]",
                    json!({"value": "b@example.com", "type": "home"}),
                )],
            )
            .unwrap();
        assert_eq!(
            patched.get(SCHEMA_USER, "emails"),
            Some(&json!([{"value": "b@example.com", "type": "home"}]))
        );
    }

    #[test]
    fn test_unknown_attribute_is_error() {
        let registry = SchemaRegistry::with_defaults();
        let engine = PatchEngine::new(&registry);
        let resource = user(&registry, json!({}));

        let err = root_error(engine.apply(&resource, &[PatchOp::replace("favoriteColor", json!("blue"))]));
        assert!(matches!(err, PatchError::UnknownAttribute(_)));

        let err = root_error(engine.apply(
            &resource,
            &[PatchOp::add("emails", json!([{"value": "a@example.com", "label": "x"}]))],
        ));
        assert_eq!(err, PatchError::UnknownAttribute("emails.label".to_string()));

        let err = root_error(engine.apply(&resource, &[PatchOp::remove("emails[kind eq \"work\"]")]));
        assert!(matches!(err, PatchError::UnknownAttribute(_)));
    }

    #[test]
    fn test_type_mismatch_is_invalid_value() {
        let registry = SchemaRegistry::with_defaults();
        let engine = PatchEngine::new(&registry);
        let resource = user(&registry, json!({}));

        for op in [
            PatchOp::replace("active", json!("yes")),
            PatchOp::replace("userName", json!(["a", "b"])),
            PatchOp::replace("emails", json!(["plain@example.com"])),
            PatchOp::add("emails", json!([{"value": "a@example.com", "primary": "yes"}])),
        ] {
            let err = root_error(engine.apply(&resource, &[op.clone()]));
            assert!(matches!(err, PatchError::InvalidValue(_)), "{:?} gave {:?}", op, err);
        }
    }

    #[test]
    fn test_null_clears_target() {
        let registry = SchemaRegistry::with_defaults();
        let engine = PatchEngine::new(&registry);
        let resource = user(&registry, json!({"title": "Tour Guide", "name": {"givenName": "B"}}));

        let patched = engine
            .apply(
                &resource,
                &[
                    PatchOp::replace("title", Value::Null),
                    PatchOp::replace("name.givenName", Value::Null),
                ],
            )
            .unwrap();
        assert!(patched.get(SCHEMA_USER, "title").is_none());
        assert!(patched.get(SCHEMA_USER, "name").is_none());
    }

    #[test]
    fn test_add_null_is_invalid_value() {
        let registry = SchemaRegistry::with_defaults();
        let engine = PatchEngine::new(&registry);
        let resource = user(&registry, json!({"title": "Tour Guide"}));

        for op in [
            PatchOp::add("title", Value::Null),
            PatchOp::add("name.givenName", Value::Null),
            PatchOp::Add {
                path: None,
                value: json!({"title": null}),
            },
        ] {
            let err = root_error(engine.apply(&resource, &[op.clone()]));
            assert!(matches!(err, PatchError::InvalidValue(_)), "{:?} gave {:?}", op, err);
            assert_eq!(op.validate().is_err(), op.path().is_some());
        }
        assert_eq!(resource.get(SCHEMA_USER, "title"), Some(&json!("Tour Guide")));
    }

    #[test]
    fn test_add_with_value_filter_is_invalid_path() {
        let registry = SchemaRegistry::with_defaults();
        let engine = PatchEngine::new(&registry);
        let resource = user(
            &registry,
            json!({"emails": [{"value": "a@example.com", "type": "work"}]}),
        );

        for op in [
            PatchOp::add("emails[type eq \"work\"]", json!({"display": "W"})),
            PatchOp::add("emails[type eq \"work\"].display", json!("W")),
            PatchOp::add("emails[type eq \"home\"]", json!({"display": "H"})),
        ] {
            let err = root_error(engine.apply(&resource, &[op.clone()]));
            assert!(matches!(err, PatchError::InvalidPath(_)), "{:?} gave {:?}", op, err);
        }

        // Replace still targets matched elements
        let patched = engine
            .apply(
                &resource,
                &[PatchOp::replace("emails[type eq \"work\"].display", json!("W"))],
            )
            .unwrap();
        assert_eq!(
            patched.get(SCHEMA_USER, "emails"),
            Some(&json!([{"value": "a@example.com", "type": "work", "display": "W"}]))
        );
    }

    #[test]
    fn test_path_limits() {
        let registry = SchemaRegistry::with_defaults();
        let resource = user(&registry, json!({"emails": [{"value": "a@example.com"}]}));
        let op = PatchOp::remove("emails[value eq \"a@example.com\"]");

        let engine = PatchEngine::new(&registry).with_limits(FilterLimits {
            max_length: 16,
            max_depth: 8,
        });
        let err = root_error(engine.apply(&resource, &[op.clone()]));
        assert!(matches!(err, PatchError::InvalidPath(_)));
        let err = root_error(engine.apply_request(&resource, &PatchRequest::new(vec![op.clone()])));
        assert!(matches!(err, PatchError::InvalidPath(_)));

        let patched = PatchEngine::new(&registry).apply(&resource, &[op]).unwrap();
        assert!(patched.get(SCHEMA_USER, "emails").is_none());
    }

    #[test]
    fn test_no_path_merge_with_extension() {
        let registry = SchemaRegistry::with_defaults();
        let engine = PatchEngine::new(&registry);
        let resource = user(&registry, json!({"userName": "bjensen"}));

        let patched = engine
            .apply(
                &resource,
                &[PatchOp::Replace {
                    path: None,
                    value: json!({
                        "schemas": ["ignored"],
                        "displayName": "Babs",
                        "name.familyName": "Jensen",
                        SCHEMA_ENTERPRISE_USER: {"employeeNumber": "701984"}
                    }),
                }],
            )
            .unwrap();
        assert_eq!(patched.get(SCHEMA_USER, "displayName"), Some(&json!("Babs")));
        assert_eq!(patched.get(SCHEMA_USER, "name"), Some(&json!({"familyName": "Jensen"})));
        assert_eq!(
            patched.get(SCHEMA_ENTERPRISE_USER, "employeeNumber"),
            Some(&json!("701984"))
        );
    }

    #[test]
    fn test_extension_paths() {
        let registry = SchemaRegistry::with_defaults();
        let engine = PatchEngine::new(&registry);
        let resource = user(&registry, json!({}));

        let patched = engine
            .apply(
                &resource,
                &[
                    PatchOp::add(SCHEMA_ENTERPRISE_USER, json!({"department": "Sales"})),
                    PatchOp::replace(
                        format!("{}:manager.value", SCHEMA_ENTERPRISE_USER),
                        json!("boss"),
                    ),
                ],
            )
            .unwrap();
        assert_eq!(
            patched.section(SCHEMA_ENTERPRISE_USER),
            Some(&json!({"department": "Sales", "manager": {"value": "boss"}})
                .as_object()
                .unwrap()
                .clone())
        );

        let cleared = engine
            .apply(&patched, &[PatchOp::remove(SCHEMA_ENTERPRISE_USER)])
            .unwrap();
        assert!(cleared.section(SCHEMA_ENTERPRISE_USER).unwrap().is_empty());
    }

    #[test]
    fn test_add_sub_attribute_of_multi_valued_needs_filter() {
        let registry = SchemaRegistry::with_defaults();
        let engine = PatchEngine::new(&registry);
        let resource = user(&registry, json!({"emails": [{"value": "a@example.com"}]}));

        let err = root_error(engine.apply(&resource, &[PatchOp::add("emails.type", json!("work"))]));
        assert!(matches!(err, PatchError::InvalidPath(_)));

        let patched = engine
            .apply(&resource, &[PatchOp::replace("emails.type", json!("work"))])
            .unwrap();
        assert_eq!(
            patched.get(SCHEMA_USER, "emails"),
            Some(&json!([{"value": "a@example.com", "type": "work"}]))
        );
    }

    #[test]
    fn test_apply_request() {
        let registry = SchemaRegistry::with_defaults();
        let engine = PatchEngine::new(&registry);
        let resource = user(&registry, json!({"active": true}));

        let request: PatchRequest = serde_json::from_value(json!({
            "schemas": ["urn:ietf:params:scim:api:messages:2.0:PatchOp"],
            "Operations": [{"op": "Replace", "path": "active", "value": false}]
        }))
        .unwrap();
        let patched = engine.apply_request(&resource, &request).unwrap();
        assert_eq!(patched.get(SCHEMA_USER, "active"), Some(&json!(false)));

        let bad = PatchRequest {
            schemas: vec![],
            operations: request.operations.clone(),
        };
        assert_eq!(engine.apply_request(&resource, &bad), Err(PatchError::InvalidSchema));
    }
}
