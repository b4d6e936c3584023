//! SCIM Filter to Predicate Translation
//!
//! This module converts SCIM filter expressions (RFC 7644) into a
//! backend-agnostic predicate tree that a persistence layer can lower into its
//! own query language (SQL, LDAP, document queries).
//!
//! ## Translation Rules
//!
//! - Attribute names are resolved against the schema registry; a comparison on
//!   a complex attribute without a sub-attribute targets its `value`
//!   sub-attribute (`emails co "x"` means `emails.value co "x"`).
//! - Literals are coerced to the attribute's declared type. When coercion
//!   fails the comparison becomes [`Predicate::Never`], never an error.
//! - `co`/`sw`/`ew` apply to strings only; `gt`/`ge`/`lt`/`le` to numbers and
//!   datetimes only. Anything else becomes [`Predicate::Never`].
//! - `eq null` and `ne null` become absence and presence tests.
//! - Value paths (`emails[type eq "work"]`) become a scoped existential,
//!   [`Predicate::Any`]: one element must satisfy the whole sub-filter.
//! - `and`/`or` chains are flattened; `Never` short-circuits.
//!
//! ## Unknown Attributes
//!
//! Under [`UnknownAttributePolicy::NoMatch`] (the default) an unknown attribute
//! turns its comparison into `Never`. Under [`UnknownAttributePolicy::Error`]
//! translation fails with [`UnknownAttribute`].
//!
//! [`UnknownAttributePolicy::NoMatch`]: super::context::UnknownAttributePolicy::NoMatch
//! [`UnknownAttributePolicy::Error`]: super::context::UnknownAttributePolicy::Error

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::compare::{self, Plan};
use super::context::{BackendDialect, FilterContext};
use super::filter::{AttrPath, CompareOp, Filter};
use super::path::{ResolvedPath, UnknownAttribute};
use super::resource::{ResourceTree, get_ci};
use super::schema::AttributeMeta;

/// A literal coerced to the type of the attribute it is compared against.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum TypedValue {
    String(String),
    Boolean(bool),
    Number(f64),
    DateTime(DateTime<Utc>),
    Null,
}

/// A fully resolved attribute reference with canonical names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttrRef {
    /// Schema URN declaring the attribute
    pub schema: String,
    pub attribute: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_attribute: Option<String>,
}

/// What a comparison reads from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Operand {
    /// An attribute of the resource
    Attribute(AttrRef),
    /// A sub-attribute of the element bound by the enclosing [`Predicate::Any`]
    Element { sub_attribute: String },
}

/// Backend-agnostic predicate tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(
    tag = "node",
    content = "args",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Predicate {
    /// Compare the operand's values against a typed literal.
    ///
    /// With `case_fold` set both sides compare lowercased. Under
    /// [`BackendDialect::Document`] the literal is already lowercased.
    Compare {
        operand: Operand,
        op: CompareOp,
        value: TypedValue,
        case_fold: bool,
    },
    /// The operand has at least one non-empty value
    Present { operand: Operand },
    /// Some element of a complex attribute satisfies the inner predicate
    Any {
        attribute: AttrRef,
        predicate: Box<Predicate>,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    /// Matches nothing
    Never,
}

/// Translate a filter into a predicate tree.
///
/// # Errors
///
/// Only under [`UnknownAttributePolicy::Error`](super::context::UnknownAttributePolicy::Error),
/// when the filter names an attribute the resource type does not declare.
///
/// # Example
///
/// ```
/// use scim_engine::scim::{FilterContext, SchemaRegistry, parse_filter, translate};
///
/// let registry = SchemaRegistry::with_defaults();
/// let ctx = FilterContext::new(&registry, "User");
/// let filter = parse_filter("emails[type eq \"work\"]").unwrap();
/// let predicate = translate(&filter, &ctx).unwrap();
/// ```
pub fn translate(filter: &Filter, ctx: &FilterContext<'_>) -> Result<Predicate, UnknownAttribute> {
    let predicate = TranslationContext { ctx }.translate_filter(filter, None)?;
    tracing::debug!(
        resource_type = ctx.resource_type,
        filter = %filter,
        "Translated SCIM filter"
    );
    Ok(predicate)
}

/// Internal context for building predicates.
struct TranslationContext<'c, 'a> {
    ctx: &'c FilterContext<'a>,
}

/// The complex attribute whose elements a value path iterates.
#[derive(Clone, Copy)]
pub(crate) struct Scope<'a> {
    pub(crate) schema: &'a str,
    pub(crate) attribute: &'a AttributeMeta,
}

impl<'c, 'a> TranslationContext<'c, 'a> {
    fn translate_filter(
        &self,
        filter: &Filter,
        scope: Option<Scope<'a>>,
    ) -> Result<Predicate, UnknownAttribute> {
        match filter {
            Filter::Compare { attr, op, value } => {
                let Some((operand, target)) = self.operand(attr, scope, true)? else {
                    return Ok(Predicate::Never);
                };
                Ok(self.translate_compare(operand, *op, compare::plan(*op, value, target)))
            }
            Filter::Present { attr } => {
                Ok(match self.operand(attr, scope, false)? {
                    Some((operand, _)) => Predicate::Present { operand },
                    None => Predicate::Never,
                })
            }
            Filter::ValuePath { attr, filter } => self.translate_value_path(attr, filter, scope),
            Filter::And(left, right) => {
                let left = self.translate_filter(left, scope)?;
                let right = self.translate_filter(right, scope)?;
                Ok(conjunction(left, right))
            }
            Filter::Or(left, right) => {
                let left = self.translate_filter(left, scope)?;
                let right = self.translate_filter(right, scope)?;
                Ok(disjunction(left, right))
            }
            Filter::Not(inner) => Ok(Predicate::Not(Box::new(
                self.translate_filter(inner, scope)?,
            ))),
        }
    }

    fn translate_compare(&self, operand: Operand, op: CompareOp, plan: Plan) -> Predicate {
        match plan {
            Plan::Never => Predicate::Never,
            Plan::Absent => Predicate::Not(Box::new(Predicate::Present { operand })),
            Plan::Present => Predicate::Present { operand },
            Plan::Values { literal, case_fold } => Predicate::Compare {
                operand,
                op,
                value: self.dialect_literal(literal, case_fold),
                case_fold,
            },
        }
    }

    /// Literal form for the backend dialect.
    fn dialect_literal(&self, literal: TypedValue, case_fold: bool) -> TypedValue {
        match (self.ctx.dialect, literal) {
            (BackendDialect::Document, TypedValue::String(s)) if case_fold => {
                TypedValue::String(s.to_lowercase())
            }
            (_, literal) => literal,
        }
    }

    /// Resolve a path to an operand and the metadata of what it reads.
    ///
    /// `implied_value` applies the "complex attribute means its `value`"
    /// rule used by comparisons. `Ok(None)` means the comparison is `Never`.
    fn operand(
        &self,
        attr: &AttrPath,
        scope: Option<Scope<'a>>,
        implied_value: bool,
    ) -> Result<Option<(Operand, &'a AttributeMeta)>, UnknownAttribute> {
        if let Some(scope) = scope {
            let Some(sub) = element_sub_attribute(self.ctx, attr, scope)? else {
                return Ok(None);
            };
            return Ok(Some((
                Operand::Element {
                    sub_attribute: sub.name.clone(),
                },
                sub,
            )));
        }

        let Some(resolved) = self.ctx.resolve(attr)? else {
            return Ok(None);
        };
        let (attr_ref, target) = attribute_target(&resolved, implied_value);
        Ok(Some((Operand::Attribute(attr_ref), target)))
    }

    fn translate_value_path(
        &self,
        attr: &AttrPath,
        filter: &Filter,
        scope: Option<Scope<'a>>,
    ) -> Result<Predicate, UnknownAttribute> {
        // The parser rejects nested value paths
        if scope.is_some() {
            return Ok(Predicate::Never);
        }
        let Some(resolved) = self.ctx.resolve(attr)? else {
            return Ok(Predicate::Never);
        };
        if !resolved.attribute.is_complex() || resolved.sub_attribute.is_some() {
            return Ok(Predicate::Never);
        }

        let inner = self.translate_filter(
            filter,
            Some(Scope {
                schema: &resolved.schema.id,
                attribute: resolved.attribute,
            }),
        )?;
        if inner == Predicate::Never {
            return Ok(Predicate::Never);
        }

        Ok(Predicate::Any {
            attribute: AttrRef {
                schema: resolved.schema.id.clone(),
                attribute: resolved.attribute.name.clone(),
                sub_attribute: None,
            },
            predicate: Box::new(inner),
        })
    }
}

/// Reference and target metadata for a resolved top-level path.
pub(crate) fn attribute_target<'a>(
    resolved: &ResolvedPath<'a>,
    implied_value: bool,
) -> (AttrRef, &'a AttributeMeta) {
    let sub = match resolved.sub_attribute {
        Some(sub) => Some(sub),
        None if implied_value && resolved.attribute.is_complex() => {
            resolved.attribute.sub_attribute("value")
        }
        None => None,
    };
    (
        AttrRef {
            schema: resolved.schema.id.clone(),
            attribute: resolved.attribute.name.clone(),
            sub_attribute: sub.map(|s| s.name.clone()),
        },
        sub.unwrap_or(resolved.attribute),
    )
}

/// Sub-attribute named inside a value filter.
///
/// Paths there name sub-attributes of the enclosing attribute. A URN prefix
/// must be the enclosing attribute's schema; a further `.sub` never matches.
pub(crate) fn element_sub_attribute<'a>(
    ctx: &FilterContext<'a>,
    attr: &AttrPath,
    scope: Scope<'a>,
) -> Result<Option<&'a AttributeMeta>, UnknownAttribute> {
    let foreign_urn = attr
        .urn
        .as_ref()
        .is_some_and(|urn| !urn.eq_ignore_ascii_case(scope.schema));
    if attr.sub_attr.is_some() || foreign_urn {
        return Ok(None);
    }
    match scope.attribute.sub_attribute(&attr.attr) {
        Some(sub) => Ok(Some(sub)),
        None => ctx
            .unknown(UnknownAttribute {
                path: format!("{}.{}", scope.attribute.name, attr.attr),
                message: format!(
                    "'{}' has no sub-attribute '{}'",
                    scope.attribute.name, attr.attr
                ),
            })
            .map(|()| None),
    }
}

fn conjunction(left: Predicate, right: Predicate) -> Predicate {
    let mut children = Vec::new();
    for side in [left, right] {
        match side {
            Predicate::Never => return Predicate::Never,
            Predicate::And(inner) => children.extend(inner),
            other => children.push(other),
        }
    }
    Predicate::And(children)
}

fn disjunction(left: Predicate, right: Predicate) -> Predicate {
    let mut children = Vec::new();
    for side in [left, right] {
        match side {
            Predicate::Never => {}
            Predicate::Or(inner) => children.extend(inner),
            other => children.push(other),
        }
    }
    match children.len() {
        0 => Predicate::Never,
        1 => children.pop().unwrap_or(Predicate::Never),
        _ => Predicate::Or(children),
    }
}

// =============================================================================
// Reference Executor
// =============================================================================

impl Predicate {
    /// Evaluate the predicate against an in-memory resource.
    pub fn evaluate(&self, resource: &ResourceTree) -> bool {
        self.evaluate_in(resource, None)
    }

    fn evaluate_in(&self, resource: &ResourceTree, element: Option<&Value>) -> bool {
        match self {
            Predicate::Compare {
                operand,
                op,
                value,
                case_fold,
            } => {
                let values = operand_values(operand, resource, element);
                compare::attribute_matches(&values, *op, value, *case_fold)
            }
            Predicate::Present { operand } => {
                compare::any_present(&operand_values(operand, resource, element))
            }
            Predicate::Any {
                attribute,
                predicate,
            } => attribute_values(attribute, resource)
                .into_iter()
                .filter(|v| v.is_object())
                .any(|elem| predicate.evaluate_in(resource, Some(elem))),
            Predicate::And(children) => children.iter().all(|p| p.evaluate_in(resource, element)),
            Predicate::Or(children) => children.iter().any(|p| p.evaluate_in(resource, element)),
            Predicate::Not(inner) => !inner.evaluate_in(resource, element),
            Predicate::Never => false,
        }
    }
}

fn operand_values<'v>(
    operand: &Operand,
    resource: &'v ResourceTree,
    element: Option<&'v Value>,
) -> Vec<&'v Value> {
    match operand {
        Operand::Attribute(attr) => attribute_values(attr, resource),
        Operand::Element { sub_attribute } => {
            let mut out = Vec::new();
            if let Some(Value::Object(object)) = element {
                compare::flatten(get_ci(object, sub_attribute), &mut out);
            }
            out
        }
    }
}

pub(crate) fn attribute_values<'v>(attr: &AttrRef, resource: &'v ResourceTree) -> Vec<&'v Value> {
    let mut values = Vec::new();
    compare::flatten(resource.get(&attr.schema, &attr.attribute), &mut values);
    match &attr.sub_attribute {
        Some(sub) => compare::sub_values(&values, sub),
        None => values,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::scim::context::UnknownAttributePolicy;
    use crate::scim::filter::parse_filter;
    use crate::scim::schema::{SCHEMA_ENTERPRISE_USER, SCHEMA_USER, SchemaRegistry};

    fn translate_user(registry: &SchemaRegistry, filter_str: &str) -> Predicate {
        let filter = parse_filter(filter_str).expect("Failed to parse filter");
        translate(&filter, &FilterContext::new(registry, "User")).expect("translation failed")
    }

    fn user_attr(attribute: &str, sub: Option<&str>) -> Operand {
        Operand::Attribute(AttrRef {
            schema: SCHEMA_USER.to_string(),
            attribute: attribute.to_string(),
            sub_attribute: sub.map(str::to_string),
        })
    }

    #[test]
    fn test_case_insensitive_eq_lowercases_literal() {
        let registry = SchemaRegistry::with_defaults();
        let predicate = translate_user(&registry, "USERNAME eq \"BJensen\"");
        assert_eq!(
            predicate,
            Predicate::Compare {
                operand: user_attr("userName", None),
                op: CompareOp::Eq,
                value: TypedValue::String("bjensen".to_string()),
                case_fold: true,
            }
        );
    }

    #[test]
    fn test_directory_dialect_keeps_literal() {
        let registry = SchemaRegistry::with_defaults();
        let ctx = FilterContext::new(&registry, "User").with_dialect(BackendDialect::Directory);
        let filter = parse_filter("userName eq \"BJensen\"").unwrap();
        match translate(&filter, &ctx).unwrap() {
            Predicate::Compare {
                value, case_fold, ..
            } => {
                assert_eq!(value, TypedValue::String("BJensen".to_string()));
                assert!(case_fold);
            }
            other => panic!("Expected Compare, got {:?}", other),
        }
    }

    #[test]
    fn test_case_exact_attribute() {
        let registry = SchemaRegistry::with_defaults();
        match translate_user(&registry, "id eq \"ABC\"") {
            Predicate::Compare {
                value, case_fold, ..
            } => {
                assert_eq!(value, TypedValue::String("ABC".to_string()));
                assert!(!case_fold);
            }
            other => panic!("Expected Compare, got {:?}", other),
        }
    }

    #[test]
    fn test_implied_value_sub_attribute() {
        let registry = SchemaRegistry::with_defaults();
        match translate_user(&registry, "emails co \"example.com\"") {
            Predicate::Compare { operand, .. } => {
                assert_eq!(operand, user_attr("emails", Some("value")));
            }
            other => panic!("Expected Compare, got {:?}", other),
        }
    }

    #[test]
    fn test_value_path_becomes_scoped_existential() {
        let registry = SchemaRegistry::with_defaults();
        let predicate = translate_user(
            &registry,
            "emails[type eq \"work\" and value co \"@example.com\"]",
        );
        assert_eq!(
            predicate,
            Predicate::Any {
                attribute: AttrRef {
                    schema: SCHEMA_USER.to_string(),
                    attribute: "emails".to_string(),
                    sub_attribute: None,
                },
                predicate: Box::new(Predicate::And(vec![
                    Predicate::Compare {
                        operand: Operand::Element {
                            sub_attribute: "type".to_string()
                        },
                        op: CompareOp::Eq,
                        value: TypedValue::String("work".to_string()),
                        case_fold: true,
                    },
                    Predicate::Compare {
                        operand: Operand::Element {
                            sub_attribute: "value".to_string()
                        },
                        op: CompareOp::Co,
                        value: TypedValue::String("@example.com".to_string()),
                        case_fold: true,
                    },
                ])),
            }
        );
    }

    #[test]
    fn test_type_mismatch_is_never() {
        let registry = SchemaRegistry::with_defaults();
        assert_eq!(translate_user(&registry, "active eq \"yes\""), Predicate::Never);
        assert_eq!(translate_user(&registry, "userName gt \"a\""), Predicate::Never);
        assert_eq!(translate_user(&registry, "active co true"), Predicate::Never);
        assert_eq!(
            translate_user(&registry, "meta.lastModified gt \"last week\""),
            Predicate::Never
        );
    }

    #[test]
    fn test_null_comparisons() {
        let registry = SchemaRegistry::with_defaults();
        assert_eq!(
            translate_user(&registry, "title eq null"),
            Predicate::Not(Box::new(Predicate::Present {
                operand: user_attr("title", None)
            }))
        );
        assert_eq!(
            translate_user(&registry, "title ne null"),
            Predicate::Present {
                operand: user_attr("title", None)
            }
        );
    }

    #[test]
    fn test_datetime_literal() {
        let registry = SchemaRegistry::with_defaults();
        match translate_user(&registry, "meta.lastModified gt \"2011-05-13T04:42:34Z\"") {
            Predicate::Compare { value, .. } => {
                assert!(matches!(value, TypedValue::DateTime(_)));
            }
            other => panic!("Expected Compare, got {:?}", other),
        }
    }

    #[test]
    fn test_logical_flattening() {
        let registry = SchemaRegistry::with_defaults();
        match translate_user(&registry, "title pr and nickName pr and locale pr") {
            Predicate::And(children) => assert_eq!(children.len(), 3),
            other => panic!("Expected And, got {:?}", other),
        }

        // Never short-circuits conjunctions and drops out of disjunctions
        assert_eq!(
            translate_user(&registry, "title pr and bogus pr"),
            Predicate::Never
        );
        assert_eq!(
            translate_user(&registry, "title pr or bogus pr"),
            Predicate::Present {
                operand: user_attr("title", None)
            }
        );
    }

    #[test]
    fn test_unknown_attribute_policy() {
        let registry = SchemaRegistry::with_defaults();
        let filter = parse_filter("favoriteColor eq \"blue\"").unwrap();

        let lenient = FilterContext::new(&registry, "User");
        assert_eq!(translate(&filter, &lenient), Ok(Predicate::Never));

        let strict = lenient.with_unknown_attributes(UnknownAttributePolicy::Error);
        let err = translate(&filter, &strict).unwrap_err();
        assert_eq!(err.path, "favoriteColor");

        let filter = parse_filter("emails[kind eq \"work\"]").unwrap();
        assert!(translate(&filter, &strict).is_err());
        assert_eq!(translate(&filter, &lenient), Ok(Predicate::Never));
    }

    #[test]
    fn test_extension_attribute() {
        let registry = SchemaRegistry::with_defaults();
        match translate_user(&registry, "employeeNumber eq \"701984\"") {
            Predicate::Compare { operand, .. } => {
                assert_eq!(
                    operand,
                    Operand::Attribute(AttrRef {
                        schema: SCHEMA_ENTERPRISE_USER.to_string(),
                        attribute: "employeeNumber".to_string(),
                        sub_attribute: None,
                    })
                );
            }
            other => panic!("Expected Compare, got {:?}", other),
        }
    }

    #[test]
    fn test_evaluate() {
        let registry = SchemaRegistry::with_defaults();
        let resource = ResourceTree::from_json(
            &registry,
            "User",
            json!({
                "userName": "BJensen",
                "emails": [
                    {"value": "bjensen@example.com", "type": "work"},
                    {"value": "babs@jensen.org", "type": "home"}
                ],
                "meta": {"lastModified": "2011-05-13T04:42:34Z"}
            }),
        )
        .unwrap();

        let eval = |f: &str| translate_user(&registry, f).evaluate(&resource);

        assert!(eval("userName eq \"bjensen\""));
        assert!(eval("emails[type eq \"work\" and value co \"example.com\"]"));
        assert!(!eval("emails[type eq \"home\" and value co \"example.com\"]"));
        assert!(eval("meta.lastModified gt \"2011-01-01T00:00:00Z\""));
        assert!(eval("title ne \"boss\""));
        assert!(eval("title eq null"));
        assert!(!eval("userName gt \"a\""));
    }

    #[test]
    fn test_predicate_serialization() {
        let registry = SchemaRegistry::with_defaults();
        let predicate = translate_user(&registry, "emails[type eq \"work\"]");
        let json = serde_json::to_value(&predicate).unwrap();
        assert_eq!(json["node"], "any");
        assert_eq!(json["args"]["attribute"]["attribute"], "emails");

        let inner = &json["args"]["predicate"];
        assert_eq!(inner["node"], "compare");
        assert_eq!(inner["args"]["operand"]["kind"], "element");
        assert_eq!(inner["args"]["operand"]["subAttribute"], "type");
        assert_eq!(inner["args"]["value"], json!({"type": "string", "value": "work"}));

        let never = serde_json::to_value(Predicate::Never).unwrap();
        assert_eq!(never, json!({"node": "never"}));
    }
}
