//! In-memory filter evaluation.
//!
//! Evaluates a parsed filter directly against a [`ResourceTree`]. Resolution,
//! coercion and operator semantics are shared with the translator, so for
//! every filter and resource `matches(f, r)` equals
//! `translate(f)?.evaluate(r)`.
//!
//! Used for filters on data that never reaches a query engine, and by the
//! patch engine to select elements of multi-valued attributes.

use serde_json::Value;

use super::compare::{self, Plan};
use super::context::FilterContext;
use super::filter::{AttrPath, CompareOp, Filter, FilterValue};
use super::path::{ResolvedPath, UnknownAttribute};
use super::predicate::{Scope, attribute_target, attribute_values, element_sub_attribute};
use super::resource::{ResourceTree, get_ci};

/// Whether the resource satisfies the filter.
///
/// Unknown attributes match nothing, even under
/// [`UnknownAttributePolicy::Error`](super::context::UnknownAttributePolicy::Error);
/// use [`try_matches`] to surface them.
pub fn matches(filter: &Filter, resource: &ResourceTree, ctx: &FilterContext<'_>) -> bool {
    try_matches(filter, resource, ctx).unwrap_or(false)
}

/// [`matches`], honoring the context's unknown-attribute policy.
pub fn try_matches(
    filter: &Filter,
    resource: &ResourceTree,
    ctx: &FilterContext<'_>,
) -> Result<bool, UnknownAttribute> {
    Matcher { ctx, resource }.eval(filter)
}

/// Whether one element of a complex attribute satisfies a value filter.
///
/// `parent` is the resolved complex attribute; attribute names in the filter
/// are its sub-attributes.
pub fn matches_element(
    filter: &Filter,
    parent: &ResolvedPath<'_>,
    element: &Value,
    ctx: &FilterContext<'_>,
) -> bool {
    try_matches_element(filter, parent, element, ctx).unwrap_or(false)
}

/// [`matches_element`], honoring the context's unknown-attribute policy.
pub fn try_matches_element<'a>(
    filter: &Filter,
    parent: &ResolvedPath<'a>,
    element: &Value,
    ctx: &FilterContext<'a>,
) -> Result<bool, UnknownAttribute> {
    let scope = Scope {
        schema: &parent.schema.id,
        attribute: parent.attribute,
    };
    ElementMatcher { ctx, scope }.eval(filter, element)
}

/// Resolve every sub-attribute a value filter names, without any element.
pub(crate) fn check_element_filter<'a>(
    filter: &Filter,
    parent: &ResolvedPath<'a>,
    ctx: &FilterContext<'a>,
) -> Result<(), UnknownAttribute> {
    let scope = Scope {
        schema: &parent.schema.id,
        attribute: parent.attribute,
    };
    ElementMatcher { ctx, scope }.check(filter)
}

struct Matcher<'c, 'a, 'r> {
    ctx: &'c FilterContext<'a>,
    resource: &'r ResourceTree,
}

impl<'c, 'a, 'r> Matcher<'c, 'a, 'r> {
    fn eval(&self, filter: &Filter) -> Result<bool, UnknownAttribute> {
        match filter {
            Filter::Compare { attr, op, value } => self.eval_compare(attr, *op, value),
            Filter::Present { attr } => {
                let Some(resolved) = self.ctx.resolve(attr)? else {
                    return Ok(false);
                };
                let (attr_ref, _) = attribute_target(&resolved, false);
                Ok(compare::any_present(&attribute_values(&attr_ref, self.resource)))
            }
            Filter::ValuePath { attr, filter } => self.eval_value_path(attr, filter),
            Filter::And(left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                Ok(left && right)
            }
            Filter::Or(left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                Ok(left || right)
            }
            Filter::Not(inner) => Ok(!self.eval(inner)?),
        }
    }

    fn eval_compare(
        &self,
        attr: &AttrPath,
        op: CompareOp,
        value: &FilterValue,
    ) -> Result<bool, UnknownAttribute> {
        let Some(resolved) = self.ctx.resolve(attr)? else {
            return Ok(false);
        };
        let (attr_ref, target) = attribute_target(&resolved, true);
        let values = attribute_values(&attr_ref, self.resource);
        Ok(apply(compare::plan(op, value, target), op, &values))
    }

    fn eval_value_path(&self, attr: &AttrPath, filter: &Filter) -> Result<bool, UnknownAttribute> {
        let Some(resolved) = self.ctx.resolve(attr)? else {
            return Ok(false);
        };
        if !resolved.attribute.is_complex() || resolved.sub_attribute.is_some() {
            return Ok(false);
        }

        let (attr_ref, _) = attribute_target(&resolved, false);
        let element_matcher = ElementMatcher {
            ctx: self.ctx,
            scope: Scope {
                schema: &resolved.schema.id,
                attribute: resolved.attribute,
            },
        };
        // Unknown sub-attributes fail even when there are no elements
        element_matcher.check(filter)?;
        for element in attribute_values(&attr_ref, self.resource) {
            if element.is_object() && element_matcher.eval(filter, element)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Evaluates a value filter against a single element.
struct ElementMatcher<'c, 'a> {
    ctx: &'c FilterContext<'a>,
    scope: Scope<'a>,
}

impl<'c, 'a> ElementMatcher<'c, 'a> {
    fn check(&self, filter: &Filter) -> Result<(), UnknownAttribute> {
        match filter {
            Filter::Compare { attr, .. } | Filter::Present { attr } => {
                element_sub_attribute(self.ctx, attr, self.scope).map(|_| ())
            }
            Filter::ValuePath { .. } => Ok(()),
            Filter::And(left, right) | Filter::Or(left, right) => {
                self.check(left)?;
                self.check(right)
            }
            Filter::Not(inner) => self.check(inner),
        }
    }

    fn eval(&self, filter: &Filter, element: &Value) -> Result<bool, UnknownAttribute> {
        match filter {
            Filter::Compare { attr, op, value } => {
                let Some(sub) = element_sub_attribute(self.ctx, attr, self.scope)? else {
                    return Ok(false);
                };
                let values = element_values(element, &sub.name);
                Ok(apply(compare::plan(*op, value, sub), *op, &values))
            }
            Filter::Present { attr } => {
                let Some(sub) = element_sub_attribute(self.ctx, attr, self.scope)? else {
                    return Ok(false);
                };
                Ok(compare::any_present(&element_values(element, &sub.name)))
            }
            // Rejected by the parser
            Filter::ValuePath { .. } => Ok(false),
            Filter::And(left, right) => {
                let left = self.eval(left, element)?;
                let right = self.eval(right, element)?;
                Ok(left && right)
            }
            Filter::Or(left, right) => {
                let left = self.eval(left, element)?;
                let right = self.eval(right, element)?;
                Ok(left || right)
            }
            Filter::Not(inner) => Ok(!self.eval(inner, element)?),
        }
    }
}

fn element_values<'v>(element: &'v Value, sub: &str) -> Vec<&'v Value> {
    let mut out = Vec::new();
    if let Value::Object(object) = element {
        compare::flatten(get_ci(object, sub), &mut out);
    }
    out
}

fn apply(plan: Plan, op: CompareOp, values: &[&Value]) -> bool {
    match plan {
        Plan::Never => false,
        Plan::Absent => !compare::any_present(values),
        Plan::Present => compare::any_present(values),
        Plan::Values { literal, case_fold } => {
            compare::attribute_matches(values, op, &literal, case_fold)
        }
    }
}
