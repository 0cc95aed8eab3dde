//! Commit: ID synthesis and the atomic, ordered write of one package's
//! staged records into the committed store (spec.md §4.4 "Commit", §5
//! "Ordering guarantees").

use chrono::Datelike;
use serde_json::Value;
use std::collections::HashMap;
use trr_core::types::{
    Building, Claim, Document, EntityKind, Household, Person, PersonUnitRelation, PropertyUnit,
    StagedRecord,
};
use trr_storage::{PendingWrite, Store};
use uuid::Uuid;

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

fn payload_id(payload: &Value, field: &str) -> Option<String> {
    payload.get(field)?.as_str().filter(|s| !s.is_empty()).map(str::to_string)
}

/// Synthesizes the final ID for one staged record (spec.md §4.4 "Commit",
/// step 1). Buildings and units retain their structured ID unchanged;
/// persons, households, relations, and evidence keep the surrogate UUID
/// carried in the payload or are assigned a fresh one; documents reuse an
/// existing content-hash-keyed ID when one already exists — including one
/// assigned earlier in the same commit batch, via `batch_document_ids`, so
/// two same-hash documents in one package collapse to a single ID before
/// either has actually reached the committed store; claims are assigned
/// `CL-YYYY-NNNNNN`.
pub fn synthesize_final_id(
    store: &Store,
    kind: EntityKind,
    payload: &Value,
    commit_year: i32,
    batch_document_ids: &HashMap<String, String>,
) -> trr_storage::Result<String> {
    match kind {
        EntityKind::Building | EntityKind::Unit => Ok(payload_id(payload, id_field(kind))
            .unwrap_or_else(|| Uuid::new_v4().to_string())),
        EntityKind::Document => {
            let hash = payload
                .get("content_hash")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            if let Some(id) = batch_document_ids.get(hash) {
                Ok(id.clone())
            } else if let Some(existing) = store.find_document_id_by_hash(hash)? {
                Ok(existing)
            } else {
                Ok(payload_id(payload, "document_id").unwrap_or_else(|| Uuid::new_v4().to_string()))
            }
        }
        EntityKind::Claim => {
            let seq = store.next_claim_sequence(commit_year)?;
            Ok(format!("CL-{commit_year}-{seq:06}"))
        }
        EntityKind::Person | EntityKind::Household | EntityKind::Relation | EntityKind::Evidence => {
            Ok(payload_id(payload, id_field(kind)).unwrap_or_else(|| Uuid::new_v4().to_string()))
        }
    }
}

fn with_id(mut payload: Value, field: &str, id: &str) -> Value {
    if let Value::Object(map) = &mut payload {
        map.insert(field.to_string(), Value::String(id.to_string()));
    }
    payload
}

/// Parses `payload` into its typed entity and re-serializes it into the
/// canonical bytes `commit_batch` writes, so a malformed payload fails
/// before anything touches the transaction (spec.md §4.4 evidence has no
/// dedicated committed table and never reaches this function).
fn prepare_write(kind: EntityKind, payload: Value) -> trr_storage::Result<PendingWrite> {
    Ok(match kind {
        EntityKind::Building => {
            let b: Building = serde_json::from_value(payload)?;
            PendingWrite { kind, key: b.building_id.clone(), bytes: serde_json::to_vec(&b)?, document_hash: None }
        }
        EntityKind::Unit => {
            let u: PropertyUnit = serde_json::from_value(payload)?;
            PendingWrite { kind, key: u.unit_id.clone(), bytes: serde_json::to_vec(&u)?, document_hash: None }
        }
        EntityKind::Person => {
            let p: Person = serde_json::from_value(payload)?;
            PendingWrite { kind, key: p.person_id.clone(), bytes: serde_json::to_vec(&p)?, document_hash: None }
        }
        EntityKind::Household => {
            let h: Household = serde_json::from_value(payload)?;
            PendingWrite { kind, key: h.household_id.clone(), bytes: serde_json::to_vec(&h)?, document_hash: None }
        }
        EntityKind::Relation => {
            let r: PersonUnitRelation = serde_json::from_value(payload)?;
            PendingWrite { kind, key: r.relation_id.clone(), bytes: serde_json::to_vec(&r)?, document_hash: None }
        }
        EntityKind::Document => {
            let d: Document = serde_json::from_value(payload)?;
            PendingWrite {
                kind,
                key: d.document_id.clone(),
                bytes: serde_json::to_vec(&d)?,
                document_hash: Some(d.content_hash.clone()),
            }
        }
        EntityKind::Claim => {
            let c: Claim = serde_json::from_value(payload)?;
            let key = c
                .claim_id
                .clone()
                .ok_or_else(|| trr_storage::StorageError::NotFound("claim missing final id".into()))?;
            PendingWrite { kind, key, bytes: serde_json::to_vec(&c)?, document_hash: None }
        }
        EntityKind::Evidence => unreachable!("evidence is not in EntityKind::COMMIT_ORDER"),
    })
}

/// Commits every `commit_eligible` staged record, in the kind ordering
/// spec.md §5 requires (buildings, units, persons, households, relations,
/// documents, claims — evidence has no committed table), as one atomic
/// write (spec.md §4.4 "All committed writes for one package are atomic
/// from the operator's view"): every entity row and every staged-record
/// flag update is staged in memory first, then applied together through
/// [`Store::commit_batch`]. On failure the transaction aborts before
/// anything persists, `records` is left completely untouched, and the
/// error is returned so the caller can record the package as not-committed.
pub fn commit_records(
    store: &Store,
    records: &mut [StagedRecord],
    commit_year: i32,
) -> trr_storage::Result<HashMap<String, u64>> {
    let mut counts: HashMap<String, u64> = HashMap::new();
    let mut entity_writes: Vec<PendingWrite> = Vec::new();
    let mut staged_writes: Vec<(String, Vec<u8>)> = Vec::new();
    let mut batch_document_ids: HashMap<String, String> = HashMap::new();
    let mut finalized: Vec<(usize, String)> = Vec::new();

    for &kind in EntityKind::COMMIT_ORDER.iter() {
        for (idx, record) in records.iter().enumerate() {
            if record.entity_kind != kind || !record.commit_eligible() || record.committed {
                continue;
            }
            let final_id = synthesize_final_id(store, kind, &record.payload, commit_year, &batch_document_ids)?;
            let payload = with_id(record.payload.clone(), id_field(kind), &final_id);
            let write = prepare_write(kind, payload)?;
            if let Some(hash) = &write.document_hash {
                batch_document_ids.insert(hash.clone(), final_id.clone());
            }
            entity_writes.push(write);

            let mut staged_record = record.clone();
            staged_record.committed = true;
            staged_record.final_id = Some(final_id.clone());
            let staged_key = Store::staged_key(&staged_record.package_id, &staged_record.staging_id);
            staged_writes.push((staged_key, serde_json::to_vec(&staged_record)?));

            finalized.push((idx, final_id));
            *counts.entry(kind.as_str().to_string()).or_insert(0) += 1;
        }
    }

    store.commit_batch(&entity_writes, &staged_writes)?;

    for (idx, final_id) in finalized {
        records[idx].committed = true;
        records[idx].final_id = Some(final_id);
    }

    Ok(counts)
}

pub fn current_year() -> i32 {
    chrono::Utc::now().year()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;
    use trr_core::types::StagedResolution;

    fn store() -> (Store, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        (Store::open(dir.path()).unwrap(), dir)
    }

    fn staged(kind: EntityKind, payload: Value) -> StagedRecord {
        let mut r = StagedRecord::new("pkg-1", kind, "src", payload);
        r.is_valid = true;
        r
    }

    #[test]
    fn building_retains_structured_id() {
        let (store, _dir) = store();
        let mut records = vec![staged(
            EntityKind::Building,
            json!({
                "building_id": "01-01-02-003-001-00001",
                "governorate_code": "01", "district_code": "01", "subdistrict_code": "02",
                "community_code": "003", "neighborhood_code": "001", "sequence_code": "00001",
                "building_type": null, "status": null, "floor_count": null, "unit_count": null,
                "point": null, "polygon": null
            }),
        )];
        let counts = commit_records(&store, &mut records, 2025).unwrap();
        assert_eq!(counts["building"], 1);
        assert_eq!(records[0].final_id.as_deref(), Some("01-01-02-003-001-00001"));
        assert!(store.get_building("01-01-02-003-001-00001").unwrap().is_some());
    }

    #[test]
    fn claims_get_sequential_ids_within_a_year() {
        let (store, _dir) = store();
        let mut records = vec![
            staged(
                EntityKind::Claim,
                json!({"claim_id": null, "building_id": "b1", "unit_id": null, "claimant_person_id": "p1", "claim_type": null, "case_status": null, "source": null}),
            ),
            staged(
                EntityKind::Claim,
                json!({"claim_id": null, "building_id": "b2", "unit_id": null, "claimant_person_id": "p2", "claim_type": null, "case_status": null, "source": null}),
            ),
        ];
        commit_records(&store, &mut records, 2025).unwrap();
        assert_eq!(records[0].final_id.as_deref(), Some("CL-2025-000001"));
        assert_eq!(records[1].final_id.as_deref(), Some("CL-2025-000002"));
    }

    #[test]
    fn duplicate_keep_new_is_still_committed() {
        let (store, _dir) = store();
        let mut record = staged(
            EntityKind::Person,
            json!({"person_id": "p-1", "national_id": "1", "first_name": null, "last_name": null, "phone_numbers": [], "gender": null, "year_of_birth": null, "contact": false}),
        );
        record.is_duplicate = true;
        record.resolution = Some(StagedResolution::KeepNew);
        let mut records = vec![record];
        let counts = commit_records(&store, &mut records, 2025).unwrap();
        assert_eq!(counts["person"], 1);
    }

    #[test]
    fn plain_duplicate_without_keep_new_is_skipped() {
        let (store, _dir) = store();
        let mut record = staged(
            EntityKind::Person,
            json!({"person_id": "p-1", "national_id": "1", "first_name": null, "last_name": null, "phone_numbers": [], "gender": null, "year_of_birth": null, "contact": false}),
        );
        record.is_duplicate = true;
        let mut records = vec![record];
        let counts = commit_records(&store, &mut records, 2025).unwrap();
        assert!(counts.is_empty());
    }

    #[test]
    fn document_reuses_existing_id_for_same_content_hash() {
        let (store, _dir) = store();
        store
            .put_document(&Document {
                document_id: "doc-existing".into(),
                document_type: None,
                issue_date: None,
                number: None,
                verified: false,
                content_hash: "samehash".into(),
            })
            .unwrap();
        let mut records = vec![staged(
            EntityKind::Document,
            json!({"document_id": "doc-new", "document_type": null, "issue_date": null, "number": null, "verified": false, "content_hash": "samehash"}),
        )];
        commit_records(&store, &mut records, 2025).unwrap();
        assert_eq!(records[0].final_id.as_deref(), Some("doc-existing"));
    }
}
