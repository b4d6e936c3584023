//! Leaf comparison semantics shared by the translator and the matcher.
//!
//! Both engines classify a comparison with [`plan`] and then apply
//! [`attribute_matches`] to the stored values, so a filter means the same
//! thing whether it is pushed to a backend or evaluated in memory.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::filter::{CompareOp, FilterValue};
use super::predicate::TypedValue;
use super::resource::get_ci;
use super::schema::{AttributeMeta, AttributeType};

/// What a comparison reduces to once the attribute type is known.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Plan {
    /// Matches nothing (operator not applicable, or literal not coercible)
    Never,
    /// `eq null`: the attribute has no value
    Absent,
    /// `ne null`: the attribute has a value
    Present,
    /// Compare stored values against a typed literal
    Values { literal: TypedValue, case_fold: bool },
}

/// Classify `target op literal`.
pub(crate) fn plan(op: CompareOp, literal: &FilterValue, target: &AttributeMeta) -> Plan {
    let Some(literal) = coerce(literal, target.attr_type) else {
        return Plan::Never;
    };

    if literal == TypedValue::Null {
        return match op {
            CompareOp::Eq => Plan::Absent,
            CompareOp::Ne => Plan::Present,
            _ => Plan::Never,
        };
    }

    if target.is_complex() {
        return Plan::Never;
    }

    let applicable = match op {
        CompareOp::Eq | CompareOp::Ne => true,
        CompareOp::Co | CompareOp::Sw | CompareOp::Ew => target.attr_type.is_textual(),
        CompareOp::Gt | CompareOp::Ge | CompareOp::Lt | CompareOp::Le => {
            target.attr_type.is_ordered()
        }
    };
    if !applicable {
        return Plan::Never;
    }

    Plan::Values {
        literal,
        case_fold: target.attr_type.is_textual() && !target.case_exact,
    }
}

/// Coerce a filter literal to an attribute type. `None` when incompatible.
pub(crate) fn coerce(literal: &FilterValue, attr_type: AttributeType) -> Option<TypedValue> {
    match (literal, attr_type) {
        (FilterValue::Null, _) => Some(TypedValue::Null),
        (FilterValue::String(s), t) if t.is_textual() => Some(TypedValue::String(s.clone())),
        (FilterValue::String(s), AttributeType::DateTime) => {
            parse_datetime(s).map(TypedValue::DateTime)
        }
        (FilterValue::Bool(b), AttributeType::Boolean) => Some(TypedValue::Boolean(*b)),
        (FilterValue::Number(n), AttributeType::Decimal) => Some(TypedValue::Number(*n)),
        (FilterValue::Number(n), AttributeType::Integer) if n.fract() == 0.0 => {
            Some(TypedValue::Number(*n))
        }
        _ => None,
    }
}

pub(crate) fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Attribute-level comparison over every stored value.
///
/// `ne` is the negation of `eq`, so an attribute without values is "not
/// equal" to any literal. The other operators need one matching value.
pub(crate) fn attribute_matches(
    values: &[&Value],
    op: CompareOp,
    literal: &TypedValue,
    case_fold: bool,
) -> bool {
    match op {
        CompareOp::Ne => !values
            .iter()
            .any(|v| scalar_matches(v, CompareOp::Eq, literal, case_fold)),
        _ => values
            .iter()
            .any(|v| scalar_matches(v, op, literal, case_fold)),
    }
}

fn scalar_matches(value: &Value, op: CompareOp, literal: &TypedValue, case_fold: bool) -> bool {
    match (value, literal) {
        (Value::String(stored), TypedValue::String(lit)) => {
            let (stored, lit) = if case_fold {
                (stored.to_lowercase(), lit.to_lowercase())
            } else {
                (stored.clone(), lit.clone())
            };
            match op {
                CompareOp::Eq => stored == lit,
                CompareOp::Co => stored.contains(&lit),
                CompareOp::Sw => stored.starts_with(&lit),
                CompareOp::Ew => stored.ends_with(&lit),
                _ => false,
            }
        }
        (Value::Bool(stored), TypedValue::Boolean(lit)) => op == CompareOp::Eq && stored == lit,
        (Value::Number(stored), TypedValue::Number(lit)) => stored
            .as_f64()
            .is_some_and(|stored| ordering_matches(stored.partial_cmp(lit), op)),
        (Value::String(stored), TypedValue::DateTime(lit)) => parse_datetime(stored)
            .is_some_and(|stored| ordering_matches(Some(stored.cmp(lit)), op)),
        _ => false,
    }
}

fn ordering_matches(ordering: Option<std::cmp::Ordering>, op: CompareOp) -> bool {
    use std::cmp::Ordering::*;

    match (ordering, op) {
        (Some(Equal), CompareOp::Eq | CompareOp::Ge | CompareOp::Le) => true,
        (Some(Greater), CompareOp::Gt | CompareOp::Ge) => true,
        (Some(Less), CompareOp::Lt | CompareOp::Le) => true,
        _ => false,
    }
}

/// `pr`: at least one value that is not null, not an empty string and not an
/// empty object.
pub(crate) fn any_present(values: &[&Value]) -> bool {
    values.iter().any(|v| match v {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Array(a) => !a.is_empty(),
        _ => true,
    })
}

/// Flatten a stored value: arrays contribute their elements, nulls vanish.
pub(crate) fn flatten<'v>(value: Option<&'v Value>, out: &mut Vec<&'v Value>) {
    match value {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => out.extend(items.iter().filter(|v| !v.is_null())),
        Some(v) => out.push(v),
    }
}

/// Values of `sub` across the given complex values.
pub(crate) fn sub_values<'v>(containers: &[&'v Value], sub: &str) -> Vec<&'v Value> {
    let mut out = Vec::new();
    for container in containers {
        if let Value::Object(object) = container {
            flatten(get_ci(object, sub), &mut out);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn meta(attr_type: AttributeType, case_exact: bool) -> AttributeMeta {
        let mut meta = AttributeMeta::new("attr", attr_type);
        meta.case_exact = case_exact;
        meta
    }

    #[rstest]
    #[case(AttributeType::String, FilterValue::String("a".into()), true)]
    #[case(AttributeType::String, FilterValue::Number(1.0), false)]
    #[case(AttributeType::Boolean, FilterValue::Bool(true), true)]
    #[case(AttributeType::Boolean, FilterValue::String("true".into()), false)]
    #[case(AttributeType::Integer, FilterValue::Number(3.0), true)]
    #[case(AttributeType::Integer, FilterValue::Number(3.5), false)]
    #[case(AttributeType::Decimal, FilterValue::Number(3.5), true)]
    #[case(AttributeType::DateTime, FilterValue::String("2024-01-01T00:00:00Z".into()), true)]
    #[case(AttributeType::DateTime, FilterValue::String("yesterday".into()), false)]
    #[case(AttributeType::Reference, FilterValue::String("https://x".into()), true)]
    #[case(AttributeType::Complex, FilterValue::Null, true)]
    fn test_coerce(
        #[case] attr_type: AttributeType,
        #[case] literal: FilterValue,
        #[case] ok: bool,
    ) {
        assert_eq!(coerce(&literal, attr_type).is_some(), ok);
    }

    #[rstest]
    #[case(CompareOp::Eq, AttributeType::String, true)]
    #[case(CompareOp::Co, AttributeType::String, true)]
    #[case(CompareOp::Gt, AttributeType::String, false)]
    #[case(CompareOp::Co, AttributeType::Integer, false)]
    #[case(CompareOp::Gt, AttributeType::Integer, true)]
    #[case(CompareOp::Sw, AttributeType::Boolean, false)]
    #[case(CompareOp::Le, AttributeType::Boolean, false)]
    fn test_operator_applicability(
        #[case] op: CompareOp,
        #[case] attr_type: AttributeType,
        #[case] applicable: bool,
    ) {
        let literal = match attr_type {
            AttributeType::Boolean => FilterValue::Bool(true),
            AttributeType::Integer => FilterValue::Number(1.0),
            _ => FilterValue::String("x".into()),
        };
        let planned = plan(op, &literal, &meta(attr_type, false));
        assert_eq!(planned != Plan::Never, applicable, "{} on {:?}", op, attr_type);
    }

    #[test]
    fn test_null_literal_plans() {
        let target = meta(AttributeType::String, false);
        assert_eq!(plan(CompareOp::Eq, &FilterValue::Null, &target), Plan::Absent);
        assert_eq!(plan(CompareOp::Ne, &FilterValue::Null, &target), Plan::Present);
        assert_eq!(plan(CompareOp::Co, &FilterValue::Null, &target), Plan::Never);
    }

    #[test]
    fn test_case_folding() {
        let values = [&json!("BJensen")];
        let literal = TypedValue::String("bjensen".into());
        assert!(attribute_matches(&values, CompareOp::Eq, &literal, true));
        assert!(!attribute_matches(&values, CompareOp::Eq, &literal, false));
        assert!(attribute_matches(
            &values,
            CompareOp::Sw,
            &TypedValue::String("bj".into()),
            true
        ));
    }

    #[test]
    fn test_ne_is_negated_eq() {
        let literal = TypedValue::String("work".into());
        assert!(attribute_matches(&[], CompareOp::Ne, &literal, true));
        assert!(!attribute_matches(&[], CompareOp::Eq, &literal, true));

        let values = [&json!("home"), &json!("work")];
        assert!(!attribute_matches(&values, CompareOp::Ne, &literal, true));
    }

    #[test]
    fn test_datetime_ordering() {
        let values = [&json!("2011-05-13T04:42:34Z")];
        let earlier = TypedValue::DateTime(parse_datetime("2011-01-01T00:00:00Z").unwrap());
        assert!(attribute_matches(&values, CompareOp::Gt, &earlier, false));
        assert!(!attribute_matches(&values, CompareOp::Lt, &earlier, false));

        // Same instant, different offset
        let same = TypedValue::DateTime(parse_datetime("2011-05-13T06:42:34+02:00").unwrap());
        assert!(attribute_matches(&values, CompareOp::Eq, &same, false));
    }

    #[test]
    fn test_any_present() {
        assert!(!any_present(&[]));
        assert!(!any_present(&[&json!(""), &json!({})]));
        assert!(any_present(&[&json!(false)]));
        assert!(any_present(&[&json!({"value": "x"})]));
    }

    #[test]
    fn test_sub_values_flatten() {
        let emails = json!([{"value": "a"}, {"VALUE": "b"}, {"type": "work"}, null]);
        let mut containers = Vec::new();
        flatten(Some(&emails), &mut containers);
        assert_eq!(containers.len(), 3);
        assert_eq!(sub_values(&containers, "value"), vec![&json!("a"), &json!("b")]);
    }
}
