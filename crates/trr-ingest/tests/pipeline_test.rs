//! End-to-end pipeline scenarios (spec.md §8 "End-to-end scenarios").

use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tempfile::tempdir;
use trr_ingest::Pipeline;
use trr_storage::Store;
use trr_validate::ValidatorRegistry;

fn build_package(dir: &std::path::Path, name: &str, package_id: &str, docs: &[(&str, Value)], vocab_versions: HashMap<String, String>, schema_version: &str) -> std::path::PathBuf {
    let path = dir.join(name);

    // First pass: write every entity document so we can hash them for the checksum.
    let mut entity_bytes: Vec<(String, Vec<u8>)> = Vec::new();
    for (filename, value) in docs {
        entity_bytes.push((filename.to_string(), serde_json::to_vec(value).unwrap()));
    }
    let mut hasher = Sha256::new();
    for (_, bytes) in &entity_bytes {
        hasher.update(bytes);
    }
    let checksum = hex::encode(hasher.finalize());

    let manifest = json!({
        "package_id": package_id,
        "schema_version": schema_version,
        "created_utc": "2025-01-08T14:30:00Z",
        "device_id": "device-1",
        "app_version": "1.0.0",
        "vocab_versions": vocab_versions,
        "form_schema_version": "1.0.0",
        "checksum": checksum,
        "signature": Value::Null,
        "record_counts": Value::Null,
    });

    let file = std::fs::File::create(&path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::FileOptions::default();
    zip.start_file("manifest.json", options).unwrap();
    zip.write_all(&serde_json::to_vec(&manifest).unwrap()).unwrap();
    for (filename, bytes) in &entity_bytes {
        zip.start_file(filename, options).unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap();

    path
}

fn clean_package_docs() -> Vec<(&'static str, Value)> {
    vec![
        (
            "buildings.json",
            json!([{
                "building_id": "01-01-02-003-001-00001",
                "governorate_code": "01", "district_code": "01", "subdistrict_code": "02",
                "community_code": "003", "neighborhood_code": "001", "sequence_code": "00001",
                "building_type": null, "status": null, "floor_count": null, "unit_count": null,
                "point": {"lon": 36.2, "lat": 37.135}, "polygon": null
            }]),
        ),
        (
            "property_units.json",
            json!([{
                "unit_id": "01-01-02-003-001-00001-001",
                "building_id": "01-01-02-003-001-00001",
                "floor": null, "number": null, "unit_type": null, "description": null
            }]),
        ),
        (
            "persons.json",
            json!([{
                "person_id": "11111111-1111-1111-1111-111111111111",
                "national_id": "12345678901", "first_name": "Amal", "last_name": "K",
                "phone_numbers": [], "gender": null, "year_of_birth": null, "contact": true
            }]),
        ),
        (
            "person_unit_relations.json",
            json!([{
                "relation_id": "22222222-2222-2222-2222-222222222222",
                "person_id": "11111111-1111-1111-1111-111111111111",
                "property_unit_id": "01-01-02-003-001-00001-001",
                "relation_type": "owner", "ownership_share": 1200
            }]),
        ),
    ]
}

fn default_vocab() -> HashMap<String, String> {
    let mut v = HashMap::new();
    v.insert("building_types".to_string(), "1.0.0".to_string());
    v
}

fn setup() -> (Arc<Store>, tempfile::TempDir, tempfile::TempDir, tempfile::TempDir) {
    let store_dir = tempdir().unwrap();
    let staging_dir = tempdir().unwrap();
    let quarantine_dir = tempdir().unwrap();
    let store = Arc::new(Store::open(store_dir.path()).unwrap());
    (store, store_dir, staging_dir, quarantine_dir)
}

fn pipeline(store: Arc<Store>, staging: &std::path::Path, quarantine: &std::path::Path) -> Pipeline {
    Pipeline::new(store, ValidatorRegistry::new(None), staging.to_path_buf(), quarantine.to_path_buf())
}

#[test]
fn clean_package_stages_and_commits_four_records() {
    let (store, _sdir, staging, quarantine) = setup();
    let source_dir = tempdir().unwrap();
    let path = build_package(source_dir.path(), "clean.uhc", "pkg-clean", &clean_package_docs(), default_vocab(), "1.0.0");

    let pl = pipeline(store.clone(), staging.path(), quarantine.path());
    let staged = pl.import(&path, "tester").unwrap();
    assert!(staged.success);
    assert_eq!(staged.stage, "STAGED");

    let committed = pl.commit("pkg-clean", "tester").unwrap();
    assert!(committed.success);
    assert_eq!(committed.record_counts.values().sum::<u64>(), 4);

    let query_buildings = store.to_spatial_buildings().unwrap();
    assert_eq!(query_buildings.len(), 1);
}

#[test]
fn reimporting_the_same_package_is_an_idempotent_no_op() {
    let (store, _sdir, staging, quarantine) = setup();
    let source_dir = tempdir().unwrap();
    let path = build_package(source_dir.path(), "clean.uhc", "pkg-replay", &clean_package_docs(), default_vocab(), "1.0.0");

    let pl = pipeline(store.clone(), staging.path(), quarantine.path());
    pl.import(&path, "tester").unwrap();
    pl.commit("pkg-replay", "tester").unwrap();

    let second = pl.import(&path, "tester").unwrap();
    assert!(second.success);
    assert_eq!(second.validation_summary.get("skipped"), Some(&1));
    assert!(second.record_counts.is_empty());
}

#[test]
fn checksum_mismatch_quarantines_the_package() {
    let (store, _sdir, staging, quarantine) = setup();
    let source_dir = tempdir().unwrap();
    let path = build_package(source_dir.path(), "bad.uhc", "pkg-bad-checksum", &clean_package_docs(), default_vocab(), "1.0.0");

    // Corrupt the manifest's checksum field by rewriting the archive with a bogus value.
    let docs = clean_package_docs();
    let bogus_path = source_dir.path().join("bad2.uhc");
    let manifest = json!({
        "package_id": "pkg-bad-checksum",
        "schema_version": "1.0.0",
        "created_utc": "2025-01-08T14:30:00Z",
        "device_id": "device-1",
        "app_version": "1.0.0",
        "vocab_versions": default_vocab(),
        "form_schema_version": "1.0.0",
        "checksum": "0000000000000000000000000000000000000000000000000000000000000000",
        "signature": Value::Null,
        "record_counts": Value::Null,
    });
    let file = std::fs::File::create(&bogus_path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::FileOptions::default();
    zip.start_file("manifest.json", options).unwrap();
    zip.write_all(&serde_json::to_vec(&manifest).unwrap()).unwrap();
    for (filename, value) in &docs {
        zip.start_file(*filename, options).unwrap();
        zip.write_all(&serde_json::to_vec(value).unwrap()).unwrap();
    }
    zip.finish().unwrap();
    let _ = path; // the well-formed copy isn't used in this scenario

    let pl = pipeline(store, staging.path(), quarantine.path());
    let result = pl.import(&bogus_path, "tester").unwrap();
    assert!(!result.success);
    assert_eq!(result.stage, "FAILED");

    let quarantined: Vec<_> = std::fs::read_dir(quarantine.path()).unwrap().collect();
    assert!(!quarantined.is_empty());
    let has_reason = quarantined
        .iter()
        .any(|e| e.as_ref().unwrap().path().to_string_lossy().ends_with(".reason.txt"));
    assert!(has_reason);
}

#[test]
fn vocab_major_mismatch_fails_and_quarantines() {
    let (store, _sdir, staging, quarantine) = setup();
    let source_dir = tempdir().unwrap();
    let mut vocab = HashMap::new();
    vocab.insert("building_types".to_string(), "2.0.0".to_string());
    let path = build_package(source_dir.path(), "vocab.uhc", "pkg-vocab", &clean_package_docs(), vocab, "1.0.0");

    let pl = pipeline(store, staging.path(), quarantine.path());
    let result = pl.import(&path, "tester").unwrap();
    assert!(!result.success);
    assert_eq!(result.stage, "FAILED");
}

#[test]
fn self_intersecting_building_geometry_is_flagged_invalid() {
    let (store, _sdir, staging, quarantine) = setup();
    let source_dir = tempdir().unwrap();
    let docs = vec![(
        "buildings.json",
        json!([{
            "building_id": "01-01-02-003-001-00002",
            "governorate_code": "01", "district_code": "01", "subdistrict_code": "02",
            "community_code": "003", "neighborhood_code": "001", "sequence_code": "00002",
            "building_type": null, "status": null, "floor_count": null, "unit_count": null,
            "point": null,
            "polygon": [[
                {"lon": 0.0, "lat": 0.0}, {"lon": 1.0, "lat": 1.0},
                {"lon": 1.0, "lat": 0.0}, {"lon": 0.0, "lat": 1.0}, {"lon": 0.0, "lat": 0.0}
            ]]
        }]),
    )];
    let path = build_package(source_dir.path(), "bowtie.uhc", "pkg-bowtie", &docs, default_vocab(), "1.0.0");

    let pl = pipeline(store, staging.path(), quarantine.path());
    let result = pl.import(&path, "tester").unwrap();
    assert!(!result.success);
    assert!(result.issues.iter().any(|i| i.code == "SELF_INTERSECTION"));
}
