//! Conflict resolution engine: detection, auto-resolve, and the manual
//! transition API (spec.md §4.5)

use crate::diff::{assign_priority, classify_conflict_type, compute_field_conflicts};
use crate::error::{ConflictError, Result};
use crate::policy::{apply_strategy, find_matching_policy, sort_by_priority_desc};
use crate::queue::{apply_filter, QueueFilter};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use trr_core::types::{
    AuditEntry, Conflict, ConflictStatus, EntityKind, FieldConflict, ResolutionPolicy,
};
use trr_storage::Store;
use uuid::Uuid;

/// The action an operator picks in `resolve` (spec.md §4.5 "Manual transitions").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolveAction {
    Merge,
    KeepExisting,
    KeepNew,
    KeepBoth,
}

pub struct ConflictEngine {
    store: Arc<Store>,
    policies: Vec<ResolutionPolicy>,
}

impl ConflictEngine {
    pub fn new(store: Arc<Store>, mut policies: Vec<ResolutionPolicy>) -> Self {
        sort_by_priority_desc(&mut policies);
        Self { store, policies }
    }

    fn audit(&self, entry: AuditEntry) {
        if let Err(e) = self.store.append_conflict_audit(&entry) {
            tracing::warn!("failed to append conflict audit entry: {e}");
        }
    }

    /// Detects field-level conflicts between an incoming (`source`) and
    /// existing (`target`) record of the same kind, persists the resulting
    /// `Conflict`, and attempts policy-driven auto-resolution.
    pub fn detect(
        &self,
        kind: EntityKind,
        source: &Value,
        target: &Value,
        match_score: f64,
        package_id: Option<String>,
    ) -> Result<Conflict> {
        let field_conflicts = compute_field_conflicts(source, target);
        let conflict_type = classify_conflict_type(kind, &field_conflicts);
        let priority = assign_priority(conflict_type, &field_conflicts, match_score);

        let mut conflict = Conflict {
            conflict_id: Uuid::new_v4(),
            conflict_type,
            priority,
            status: ConflictStatus::Pending,
            entity_kind: kind,
            source_snapshot: source.clone(),
            target_snapshot: target.clone(),
            field_conflicts,
            match_score,
            package_id,
            created_by: None,
            assigned_to: None,
            resolved_by: None,
            created_at: Utc::now(),
            assigned_at: None,
            resolved_at: None,
            resolution_notes: None,
        };

        self.try_auto_resolve(&mut conflict);

        self.store.put_conflict(&conflict)?;
        self.audit(AuditEntry::new(
            conflict.conflict_id.to_string(),
            "DETECTED",
            None,
            Some(format!("{:?}", conflict.status)),
            serde_json::json!({ "conflict_type": format!("{:?}", conflict.conflict_type) }),
            "system",
        ));
        Ok(conflict)
    }

    /// Attempts to resolve every `FieldConflict` via the policy table. If
    /// every field resolves, moves the conflict to `auto_resolved`.
    fn try_auto_resolve(&self, conflict: &mut Conflict) {
        if conflict.field_conflicts.is_empty() {
            return;
        }
        let mut all_resolved = true;
        let mut resolved_fields: Vec<FieldConflict> = Vec::with_capacity(conflict.field_conflicts.len());

        for field in conflict.field_conflicts.drain(..) {
            let mut field = field;
            match find_matching_policy(&self.policies, conflict.conflict_type, &field) {
                Some(policy) => {
                    let resolved = apply_strategy(policy.strategy, &field);
                    field.resolution = Some(format!("{:?}", policy.strategy));
                    field.resolved_value = Some(resolved);
                }
                None => all_resolved = false,
            }
            resolved_fields.push(field);
        }
        conflict.field_conflicts = resolved_fields;

        if all_resolved {
            conflict.status = ConflictStatus::AutoResolved;
            conflict.resolution_notes = Some("MERGE".to_string());
        }
    }

    pub fn get(&self, id: &Uuid) -> Result<Conflict> {
        self.store
            .get_conflict(id)?
            .ok_or(ConflictError::NotFound(*id))
    }

    pub fn list_queue(&self, filter: &QueueFilter) -> Result<Vec<Conflict>> {
        let all = self.store.all_conflicts()?;
        Ok(apply_filter(all, filter))
    }

    pub fn assign(&self, id: &Uuid, assignee: &str) -> Result<Conflict> {
        let mut conflict = self.get(id)?;
        if conflict.status != ConflictStatus::Pending {
            return Err(ConflictError::InvalidTransition(format!(
                "cannot assign conflict in status {:?}",
                conflict.status
            )));
        }
        let old_status = format!("{:?}", conflict.status);
        conflict.status = ConflictStatus::InReview;
        conflict.assigned_to = Some(assignee.to_string());
        conflict.assigned_at = Some(Utc::now());
        self.store.put_conflict(&conflict)?;
        self.audit(AuditEntry::new(
            conflict.conflict_id.to_string(),
            "ASSIGN",
            Some(old_status),
            Some(format!("{:?}", conflict.status)),
            serde_json::json!({ "assignee": assignee }),
            assignee,
        ));
        Ok(conflict)
    }

    /// Applies the operator's resolution. `MERGE` writes the resolved
    /// per-field values into a merged snapshot of the target; `KEEP_NEW`
    /// replaces the target wholesale with the source; `KEEP_EXISTING` and
    /// `KEEP_BOTH` leave data as-is. Returns the conflict plus the merged
    /// JSON value the caller should persist into the entity's committed row
    /// via the storage contract (the engine itself is entity-kind agnostic).
    pub fn resolve(
        &self,
        id: &Uuid,
        action: ResolveAction,
        field_resolutions: Option<std::collections::HashMap<String, Value>>,
        notes: Option<String>,
        actor: &str,
    ) -> Result<(Conflict, Option<Value>)> {
        let mut conflict = self.get(id)?;
        if !matches!(conflict.status, ConflictStatus::Pending | ConflictStatus::InReview) {
            return Err(ConflictError::InvalidTransition(format!(
                "cannot resolve conflict in status {:?}",
                conflict.status
            )));
        }
        let old_status = format!("{:?}", conflict.status);

        let merged = match action {
            ResolveAction::Merge => {
                let mut target = conflict.target_snapshot.clone();
                for field in &mut conflict.field_conflicts {
                    let value = field_resolutions
                        .as_ref()
                        .and_then(|m| m.get(&field.field_name))
                        .cloned()
                        .or_else(|| field.resolved_value.clone());
                    if let Some(v) = value {
                        if let Value::Object(ref mut map) = target {
                            map.insert(field.field_name.clone(), v.clone());
                        }
                        field.resolved_value = Some(v);
                    }
                }
                Some(target)
            }
            ResolveAction::KeepNew => Some(conflict.source_snapshot.clone()),
            ResolveAction::KeepExisting | ResolveAction::KeepBoth => None,
        };

        conflict.status = ConflictStatus::Resolved;
        conflict.resolved_by = Some(actor.to_string());
        conflict.resolved_at = Some(Utc::now());
        conflict.resolution_notes = notes;
        self.store.put_conflict(&conflict)?;

        self.audit(AuditEntry::new(
            conflict.conflict_id.to_string(),
            "RESOLVE",
            Some(old_status),
            Some(format!("{:?}", conflict.status)),
            serde_json::json!({ "action": format!("{action:?}") }),
            actor,
        ));

        Ok((conflict, merged))
    }

    pub fn escalate(&self, id: &Uuid, reason: &str, actor: &str) -> Result<Conflict> {
        self.transition_terminal(id, ConflictStatus::Escalated, "ESCALATE", reason, actor)
    }

    pub fn defer(&self, id: &Uuid, reason: &str, actor: &str) -> Result<Conflict> {
        self.transition_terminal(id, ConflictStatus::Deferred, "DEFER", reason, actor)
    }

    fn transition_terminal(
        &self,
        id: &Uuid,
        new_status: ConflictStatus,
        action: &str,
        reason: &str,
        actor: &str,
    ) -> Result<Conflict> {
        let mut conflict = self.get(id)?;
        let old_status = format!("{:?}", conflict.status);
        conflict.status = new_status;
        conflict.resolution_notes = Some(reason.to_string());
        self.store.put_conflict(&conflict)?;
        self.audit(AuditEntry::new(
            conflict.conflict_id.to_string(),
            action,
            Some(old_status),
            Some(format!("{:?}", conflict.status)),
            serde_json::json!({ "reason": reason }),
            actor,
        ));
        Ok(conflict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;
    use trr_core::types::{ConflictType, PolicyCondition, PolicyStrategy};

    fn engine(policies: Vec<ResolutionPolicy>) -> (ConflictEngine, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path()).unwrap());
        (ConflictEngine::new(store, policies), dir)
    }

    #[test]
    fn phone_number_conflict_stays_pending_when_both_present() {
        let policies = vec![ResolutionPolicy {
            conflict_type: ConflictType::FieldMismatch,
            field_name: Some("phone_number".into()),
            condition: PolicyCondition::OneNull,
            strategy: PolicyStrategy::PreferComplete,
            priority: 10,
        }];
        let (engine, _dir) = engine(policies);
        let source = json!({"national_id": "12345678901", "phone_number": "099-new"});
        let target = json!({"national_id": "12345678901", "phone_number": "099-old"});
        let conflict = engine
            .detect(EntityKind::Person, &source, &target, 1.0, None)
            .unwrap();
        assert_eq!(conflict.status, ConflictStatus::Pending);
        assert_eq!(conflict.conflict_type, ConflictType::DuplicatePerson);
    }

    #[test]
    fn full_auto_resolve_moves_to_auto_resolved() {
        let policies = vec![ResolutionPolicy {
            conflict_type: ConflictType::FieldMismatch,
            field_name: None,
            condition: PolicyCondition::Always,
            strategy: PolicyStrategy::KeepSource,
            priority: 1,
        }];
        let (engine, _dir) = engine(policies);
        let source = json!({"description": "new desc"});
        let target = json!({"description": "old desc"});
        let conflict = engine
            .detect(EntityKind::Unit, &source, &target, 0.5, None)
            .unwrap();
        assert_eq!(conflict.status, ConflictStatus::AutoResolved);
    }

    #[test]
    fn assign_then_resolve_merge_writes_audit_trail() {
        let (engine, _dir) = engine(vec![]);
        let source = json!({"phone_number": "new"});
        let target = json!({"phone_number": "old"});
        let conflict = engine
            .detect(EntityKind::Person, &source, &target, 1.0, None)
            .unwrap();
        assert_eq!(conflict.status, ConflictStatus::Pending);

        let assigned = engine.assign(&conflict.conflict_id, "reviewer-1").unwrap();
        assert_eq!(assigned.status, ConflictStatus::InReview);

        let mut resolutions = std::collections::HashMap::new();
        resolutions.insert("phone_number".to_string(), json!("new"));
        let (resolved, merged) = engine
            .resolve(
                &conflict.conflict_id,
                ResolveAction::Merge,
                Some(resolutions),
                Some("merged phone".into()),
                "reviewer-1",
            )
            .unwrap();
        assert_eq!(resolved.status, ConflictStatus::Resolved);
        assert_eq!(merged.unwrap()["phone_number"], json!("new"));
    }
}
