//! Field-diff computation and conflict typing/priority (spec.md §4.5)

use serde_json::Value;
use std::collections::HashSet;
use trr_core::types::{ConflictType, FieldConflict, Priority};

const EXCLUDED_FIELDS: &[&str] = &["id", "created_at", "updated_at", "version"];

fn is_empty(v: &Value) -> bool {
    matches!(v, Value::Null) || matches!(v, Value::String(s) if s.is_empty())
}

/// Iterates the union of `source` and `target`'s top-level fields,
/// excluding `{id, created_at, updated_at, version}`, and yields a
/// `FieldConflict` for every pair that disagrees and isn't both empty/null.
pub fn compute_field_conflicts(source: &Value, target: &Value) -> Vec<FieldConflict> {
    let mut keys: HashSet<&str> = HashSet::new();
    if let Value::Object(m) = source {
        keys.extend(m.keys().map(String::as_str));
    }
    if let Value::Object(m) = target {
        keys.extend(m.keys().map(String::as_str));
    }

    let mut out = Vec::new();
    for key in keys {
        if EXCLUDED_FIELDS.contains(&key) {
            continue;
        }
        let sv = source.get(key).cloned().unwrap_or(Value::Null);
        let tv = target.get(key).cloned().unwrap_or(Value::Null);
        if sv == tv {
            continue;
        }
        if is_empty(&sv) && is_empty(&tv) {
            continue;
        }
        out.push(FieldConflict {
            field_name: key.to_string(),
            source_value: sv,
            target_value: tv,
            resolution: None,
            resolved_value: None,
        });
    }
    out.sort_by(|a, b| a.field_name.cmp(&b.field_name));
    out
}

const OWNERSHIP_FIELDS: &[&str] = &["ownership_share", "relation_type", "claim_type"];
const CLAIM_FIELDS: &[&str] = &["claim_id", "case_status", "claimant_id"];

/// Classifies the conflict type from the field conflicts and entity kind
/// (spec.md §4.5).
pub fn classify_conflict_type(
    kind: trr_core::types::EntityKind,
    field_conflicts: &[FieldConflict],
) -> ConflictType {
    use trr_core::types::EntityKind;

    if field_conflicts.iter().any(|f| OWNERSHIP_FIELDS.contains(&f.field_name.as_str())) {
        return ConflictType::OwnershipConflict;
    }
    if field_conflicts.iter().any(|f| CLAIM_FIELDS.contains(&f.field_name.as_str())) {
        return ConflictType::ClaimOverlap;
    }
    match kind {
        EntityKind::Person => ConflictType::DuplicatePerson,
        EntityKind::Building => ConflictType::DuplicateBuilding,
        EntityKind::Unit => ConflictType::DuplicateUnit,
        EntityKind::Claim => ConflictType::DuplicateClaim,
        _ => ConflictType::FieldMismatch,
    }
}

/// Priority assignment (spec.md §4.5).
pub fn assign_priority(
    conflict_type: ConflictType,
    field_conflicts: &[FieldConflict],
    match_score: f64,
) -> Priority {
    if matches!(conflict_type, ConflictType::OwnershipConflict | ConflictType::ClaimOverlap) {
        return Priority::Critical;
    }
    if match_score >= 0.9 {
        return Priority::High;
    }
    if field_conflicts.len() >= 5 {
        return Priority::High;
    }
    if match_score >= 0.7 {
        return Priority::Medium;
    }
    Priority::Low
}
