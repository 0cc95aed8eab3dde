//! `extract_records` (spec.md §4.4): turns one entity document's JSON array
//! into individual records, normalizing structured IDs on ingress per
//! spec.md §9 ("standardizes on with-dashes").

use serde_json::Value;
use trr_core::types::{normalize_building_id, normalize_unit_id, EntityKind};

fn id_field(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Building => "building_id",
        EntityKind::Unit => "unit_id",
        EntityKind::Person => "person_id",
        EntityKind::Household => "household_id",
        EntityKind::Relation => "relation_id",
        EntityKind::Evidence => "evidence_id",
        EntityKind::Document => "document_id",
        EntityKind::Claim => "claim_id",
    }
}

/// Splits a document's top-level JSON array into individual record values,
/// normalizing `building_id`/`unit_id` fields and deriving a `source_id` for
/// staging (the device-carried ID if present, else a positional fallback).
pub fn extract_records(kind: EntityKind, document: &[u8]) -> serde_json::Result<Vec<(String, Value)>> {
    let array: Vec<Value> = serde_json::from_slice(document)?;
    let field = id_field(kind);
    Ok(array
        .into_iter()
        .enumerate()
        .map(|(i, mut record)| {
            normalize_id_field(kind, &mut record);
            let source_id = record
                .get(field)
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("{}[{i}]", kind.as_str()));
            (source_id, record)
        })
        .collect())
}

fn normalize_id_field(kind: EntityKind, record: &mut Value) {
    let Value::Object(map) = record else { return };
    match kind {
        EntityKind::Building => {
            if let Some(Value::String(id)) = map.get("building_id").cloned() {
                map.insert("building_id".to_string(), Value::String(normalize_building_id(&id)));
            }
        }
        EntityKind::Unit => {
            if let Some(Value::String(id)) = map.get("unit_id").cloned() {
                map.insert("unit_id".to_string(), Value::String(normalize_unit_id(&id)));
            }
            if let Some(Value::String(id)) = map.get("building_id").cloned() {
                map.insert("building_id".to_string(), Value::String(normalize_building_id(&id)));
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_building_id_on_extraction() {
        let doc = serde_json::to_vec(&json!([{"building_id": "01010200300100001", "governorate_code": "01"}])).unwrap();
        let records = extract_records(EntityKind::Building, &doc).unwrap();
        assert_eq!(records[0].0, "01-01-02-003-001-00001");
        assert_eq!(records[0].1["building_id"], "01-01-02-003-001-00001");
    }

    #[test]
    fn falls_back_to_positional_source_id_when_missing() {
        let doc = serde_json::to_vec(&json!([{"national_id": "1"}])).unwrap();
        let records = extract_records(EntityKind::Person, &doc).unwrap();
        assert_eq!(records[0].0, "person[0]");
    }
}
