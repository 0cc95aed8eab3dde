//! Vocabulary payload for `GET /vocabularies` (spec.md §4.6). Values mirror
//! the canonical codes the validator suite checks against
//! (`trr_core::types::{DOCUMENT_TYPES, CLAIM_STATUSES}` and the
//! `RelationType`/`BuildingStatus` enums) so a device can never download a
//! vocabulary the server itself would reject.

use serde_json::{json, Value};

/// One named vocabulary with its current version and the flat code list a
/// device should offer in its pick-lists.
fn vocab(version: &str, codes: &[&str]) -> Value {
    json!({ "version": version, "items": codes })
}

pub fn all_vocabularies() -> Value {
    json!({
        "document_types": vocab("1.0.0", trr_core::types::DOCUMENT_TYPES),
        "claim_statuses": vocab("1.0.0", trr_core::types::CLAIM_STATUSES),
        "relation_types": vocab(
            "1.0.0",
            &["owner", "occupant", "tenant", "guest", "heirs", "other"],
        ),
        "building_status": vocab(
            "1.0.0",
            &["intact", "minor", "major", "destroyed", "unknown"],
        ),
    })
}

pub fn versions_only() -> std::collections::HashMap<String, String> {
    let mut m = std::collections::HashMap::new();
    m.insert("document_types".to_string(), "1.0.0".to_string());
    m.insert("claim_statuses".to_string(), "1.0.0".to_string());
    m.insert("relation_types".to_string(), "1.0.0".to_string());
    m.insert("building_status".to_string(), "1.0.0".to_string());
    m
}
