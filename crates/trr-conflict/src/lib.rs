pub mod diff;
pub mod engine;
pub mod error;
pub mod policy;
pub mod queue;

pub use engine::{ConflictEngine, ResolveAction};
pub use error::{ConflictError, Result};
pub use queue::QueueFilter;

use trr_core::types::{ConflictType, PolicyCondition, PolicyStrategy, ResolutionPolicy};

/// The starter policy table a fresh deployment ships with (spec.md §4.5
/// scenario 3): contact-detail fields stay pending when both sides disagree
/// and only auto-resolve when exactly one side is missing the value.
pub fn default_policies() -> Vec<ResolutionPolicy> {
    vec![
        ResolutionPolicy {
            conflict_type: ConflictType::FieldMismatch,
            field_name: Some("phone_number".to_string()),
            condition: PolicyCondition::OneNull,
            strategy: PolicyStrategy::PreferComplete,
            priority: 10,
        },
        ResolutionPolicy {
            conflict_type: ConflictType::FieldMismatch,
            field_name: Some("notes".to_string()),
            condition: PolicyCondition::OneNull,
            strategy: PolicyStrategy::PreferComplete,
            priority: 10,
        },
        ResolutionPolicy {
            conflict_type: ConflictType::FieldMismatch,
            field_name: Some("description".to_string()),
            condition: PolicyCondition::BothPresent,
            strategy: PolicyStrategy::Concatenate,
            priority: 5,
        },
    ]
}
