//! Review queue filters and default ordering (spec.md §4.5 "Queue")

use trr_core::types::{Conflict, ConflictStatus, ConflictType, Priority};

#[derive(Clone, Debug, Default)]
pub struct QueueFilter {
    pub status: Option<ConflictStatus>,
    pub priority: Option<Priority>,
    pub conflict_type: Option<ConflictType>,
    pub assignee: Option<String>,
    pub offset: usize,
    pub limit: usize,
}

/// Default sort: priority (critical -> low), then `created_at` ascending.
pub fn sort_default(conflicts: &mut [Conflict]) {
    conflicts.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.created_at.cmp(&b.created_at)));
}

pub fn apply_filter(mut conflicts: Vec<Conflict>, filter: &QueueFilter) -> Vec<Conflict> {
    if let Some(status) = filter.status {
        conflicts.retain(|c| c.status == status);
    }
    if let Some(priority) = filter.priority {
        conflicts.retain(|c| c.priority == priority);
    }
    if let Some(ct) = filter.conflict_type {
        conflicts.retain(|c| c.conflict_type == ct);
    }
    if let Some(assignee) = &filter.assignee {
        conflicts.retain(|c| c.assigned_to.as_deref() == Some(assignee.as_str()));
    }
    sort_default(&mut conflicts);

    let limit = if filter.limit == 0 { conflicts.len() } else { filter.limit };
    conflicts.into_iter().skip(filter.offset).take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn conflict(priority: Priority, status: ConflictStatus) -> Conflict {
        Conflict {
            conflict_id: Uuid::new_v4(),
            conflict_type: ConflictType::FieldMismatch,
            priority,
            status,
            entity_kind: trr_core::types::EntityKind::Person,
            source_snapshot: json!({}),
            target_snapshot: json!({}),
            field_conflicts: vec![],
            match_score: 1.0,
            package_id: None,
            created_by: None,
            assigned_to: None,
            resolved_by: None,
            created_at: Utc::now(),
            assigned_at: None,
            resolved_at: None,
            resolution_notes: None,
        }
    }

    #[test]
    fn sorts_by_priority_then_created_at() {
        let mut conflicts = vec![
            conflict(Priority::Low, ConflictStatus::Pending),
            conflict(Priority::Critical, ConflictStatus::Pending),
            conflict(Priority::Medium, ConflictStatus::Pending),
        ];
        sort_default(&mut conflicts);
        assert_eq!(conflicts[0].priority, Priority::Critical);
        assert_eq!(conflicts[2].priority, Priority::Low);
    }

    #[test]
    fn filter_by_status_and_priority() {
        let conflicts = vec![
            conflict(Priority::High, ConflictStatus::Pending),
            conflict(Priority::High, ConflictStatus::Resolved),
        ];
        let filter = QueueFilter {
            status: Some(ConflictStatus::Pending),
            ..Default::default()
        };
        let out = apply_filter(conflicts, &filter);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].status, ConflictStatus::Pending);
    }
}
