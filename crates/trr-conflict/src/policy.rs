//! Resolution policy matching and strategy application (spec.md §4.5)

use serde_json::Value;
use trr_core::types::{ConflictType, FieldConflict, PolicyCondition, PolicyStrategy, ResolutionPolicy};

fn is_null_or_empty(v: &Value) -> bool {
    matches!(v, Value::Null) || matches!(v, Value::String(s) if s.is_empty())
}

fn condition_holds(condition: PolicyCondition, source: &Value, target: &Value) -> bool {
    match condition {
        PolicyCondition::Always => true,
        PolicyCondition::OneNull => is_null_or_empty(source) != is_null_or_empty(target),
        PolicyCondition::BothPresent => !is_null_or_empty(source) && !is_null_or_empty(target),
    }
}

/// Finds the highest-priority policy (policies are pre-sorted by priority
/// desc by the caller) whose `conflict_type` matches, whose `field_name` is
/// null or matches, and whose `condition` holds.
pub fn find_matching_policy<'a>(
    policies: &'a [ResolutionPolicy],
    conflict_type: ConflictType,
    field: &FieldConflict,
) -> Option<&'a ResolutionPolicy> {
    policies.iter().find(|p| {
        p.conflict_type == conflict_type
            && p.field_name.as_deref().map(|f| f == field.field_name).unwrap_or(true)
            && condition_holds(p.condition, &field.source_value, &field.target_value)
    })
}

/// Applies a strategy to one field conflict, returning the resolved value.
/// `keep_newest`/`keep_oldest` lack a timestamp source in the staged pair
/// (spec.md §9 Open Questions): both treat source as newer as a documented
/// approximation.
pub fn apply_strategy(strategy: PolicyStrategy, field: &FieldConflict) -> Value {
    let (source, target) = (&field.source_value, &field.target_value);
    match strategy {
        PolicyStrategy::KeepSource => source.clone(),
        PolicyStrategy::KeepTarget => target.clone(),
        PolicyStrategy::KeepNewest | PolicyStrategy::KeepOldest => source.clone(),
        PolicyStrategy::PreferComplete => {
            if is_null_or_empty(source) {
                target.clone()
            } else {
                source.clone()
            }
        }
        PolicyStrategy::Concatenate => match (is_null_or_empty(source), is_null_or_empty(target)) {
            (false, false) => Value::String(format!(
                "{}; {}",
                source.as_str().map(str::to_string).unwrap_or_else(|| source.to_string()),
                target.as_str().map(str::to_string).unwrap_or_else(|| target.to_string()),
            )),
            (false, true) => source.clone(),
            (true, false) => target.clone(),
            (true, true) => Value::Null,
        },
    }
}

/// Sorts policies by priority descending, the order spec.md §3 requires at
/// match time.
pub fn sort_by_priority_desc(policies: &mut [ResolutionPolicy]) {
    policies.sort_by(|a, b| b.priority.cmp(&a.priority));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn policy(strategy: PolicyStrategy, condition: PolicyCondition, field: Option<&str>) -> ResolutionPolicy {
        ResolutionPolicy {
            conflict_type: ConflictType::FieldMismatch,
            field_name: field.map(str::to_string),
            condition,
            strategy,
            priority: 10,
        }
    }

    #[test]
    fn one_null_condition_requires_exactly_one_null() {
        let field = FieldConflict {
            field_name: "phone_number".into(),
            source_value: json!("123"),
            target_value: json!(null),
            resolution: None,
            resolved_value: None,
        };
        assert!(condition_holds(PolicyCondition::OneNull, &field.source_value, &field.target_value));

        let both_present = FieldConflict {
            field_name: "phone_number".into(),
            source_value: json!("123"),
            target_value: json!("456"),
            resolution: None,
            resolved_value: None,
        };
        assert!(!condition_holds(
            PolicyCondition::OneNull,
            &both_present.source_value,
            &both_present.target_value
        ));
    }

    #[test]
    fn prefer_complete_returns_target_when_source_empty() {
        let field = FieldConflict {
            field_name: "name".into(),
            source_value: json!(null),
            target_value: json!("Amal"),
            resolution: None,
            resolved_value: None,
        };
        assert_eq!(apply_strategy(PolicyStrategy::PreferComplete, &field), json!("Amal"));
    }

    #[test]
    fn concatenate_joins_both_present_values() {
        let field = FieldConflict {
            field_name: "notes".into(),
            source_value: json!("a"),
            target_value: json!("b"),
            resolution: None,
            resolved_value: None,
        };
        assert_eq!(apply_strategy(PolicyStrategy::Concatenate, &field), json!("a; b"));
    }

    #[test]
    fn both_present_condition_does_not_match_one_null_policy() {
        let field = FieldConflict {
            field_name: "phone_number".into(),
            source_value: json!("new"),
            target_value: json!("old"),
            resolution: None,
            resolved_value: None,
        };
        let mut policies = vec![policy(PolicyStrategy::PreferComplete, PolicyCondition::OneNull, None)];
        sort_by_priority_desc(&mut policies);
        assert!(find_matching_policy(&policies, ConflictType::FieldMismatch, &field).is_none());
    }
}
