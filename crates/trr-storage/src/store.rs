//! Sled-backed realization of the storage contract (spec.md §6.1, §6.5)

use crate::error::{Result, StorageError};
use parking_lot::RwLock;
use serde::de::{DeserializeOwned, Error as _};
use serde::Serialize;
use sled::transaction::{Transactional, TransactionError};
use sled::{Db, Tree};
use std::convert::Infallible;
use std::path::Path;
use trr_core::types::{
    AuditEntry, Building, Claim, Conflict, Document, EntityKind, Household, Person,
    PersonUnitRelation, PropertyUnit, RegisteredDevice, StagedRecord, SyncLogEntry, UhcPackage,
};

/// One entity row to persist as part of an atomic package commit (spec.md
/// §4.4 "Commit"). `bytes` is the entity's canonical JSON encoding, already
/// serialized by the caller; `document_hash` is set only for
/// `EntityKind::Document` writes so the same transaction can also update
/// the hash→id secondary index.
pub struct PendingWrite {
    pub kind: EntityKind,
    pub key: String,
    pub bytes: Vec<u8>,
    pub document_hash: Option<String>,
}

/// Storage backend for the TRRCMS core: one `sled::Tree` per logical table,
/// matching the table list in spec.md §6.5.
pub struct Store {
    db: Db,
    buildings: Tree,
    units: Tree,
    persons: Tree,
    households: Tree,
    relations: Tree,
    evidence: Tree,
    documents: Tree,
    documents_by_hash: Tree,
    claims: Tree,
    claim_sequences: Tree,
    packages: Tree,
    staged_records: Tree,
    conflicts: Tree,
    audit_log: Tree,
    conflict_audit_log: Tree,
    devices: Tree,
    sync_log: Tree,
    /// Protects the claim-sequence read-modify-write so concurrent commits
    /// across packages don't race on the same year's counter.
    claim_seq_lock: RwLock<()>,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self {
            buildings: db.open_tree("buildings")?,
            units: db.open_tree("units")?,
            persons: db.open_tree("persons")?,
            households: db.open_tree("households")?,
            relations: db.open_tree("relations")?,
            evidence: db.open_tree("evidence")?,
            documents: db.open_tree("documents")?,
            documents_by_hash: db.open_tree("documents_by_hash")?,
            claims: db.open_tree("claims")?,
            claim_sequences: db.open_tree("claim_sequences")?,
            packages: db.open_tree("packages")?,
            staged_records: db.open_tree("staged_records")?,
            conflicts: db.open_tree("conflicts")?,
            audit_log: db.open_tree("audit_log")?,
            conflict_audit_log: db.open_tree("conflict_audit_log")?,
            devices: db.open_tree("devices")?,
            sync_log: db.open_tree("sync_log")?,
            claim_seq_lock: RwLock::new(()),
            db,
        })
    }

    fn put<T: Serialize>(tree: &Tree, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        tree.insert(key.as_bytes(), bytes)?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(tree: &Tree, key: &str) -> Result<Option<T>> {
        match tree.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn all<T: DeserializeOwned>(tree: &Tree) -> Result<Vec<T>> {
        tree.iter()
            .map(|r| {
                let (_, bytes) = r?;
                Ok(serde_json::from_slice(&bytes)?)
            })
            .collect()
    }

    // -- buildings ----------------------------------------------------

    pub fn put_building(&self, b: &Building) -> Result<()> {
        Self::put(&self.buildings, &b.building_id, b)
    }
    pub fn get_building(&self, id: &str) -> Result<Option<Building>> {
        Self::get(&self.buildings, id)
    }
    pub fn all_buildings(&self) -> Result<Vec<Building>> {
        Self::all(&self.buildings)
    }
    /// Range query by administrative code prefix (spec.md §6.1): any prefix
    /// of `GG-DD-SS-CCC-NNN-BBBBB` matches buildings whose ID starts with it.
    pub fn buildings_by_admin_prefix(&self, prefix: &str) -> Result<Vec<Building>> {
        Ok(self
            .all_buildings()?
            .into_iter()
            .filter(|b| b.building_id.starts_with(prefix))
            .collect())
    }

    // -- property units -------------------------------------------------

    pub fn put_unit(&self, u: &PropertyUnit) -> Result<()> {
        Self::put(&self.units, &u.unit_id, u)
    }
    pub fn get_unit(&self, id: &str) -> Result<Option<PropertyUnit>> {
        Self::get(&self.units, id)
    }
    pub fn all_units(&self) -> Result<Vec<PropertyUnit>> {
        Self::all(&self.units)
    }

    // -- persons ---------------------------------------------------------

    pub fn put_person(&self, p: &Person) -> Result<()> {
        Self::put(&self.persons, &p.person_id, p)
    }
    pub fn get_person(&self, id: &str) -> Result<Option<Person>> {
        Self::get(&self.persons, id)
    }
    pub fn all_persons(&self) -> Result<Vec<Person>> {
        Self::all(&self.persons)
    }
    pub fn find_person_by_national_id(&self, national_id: &str) -> Result<Option<Person>> {
        Ok(self
            .all_persons()?
            .into_iter()
            .find(|p| p.national_id.as_deref() == Some(national_id)))
    }

    // -- households --------------------------------------------------------

    pub fn put_household(&self, h: &Household) -> Result<()> {
        Self::put(&self.households, &h.household_id, h)
    }
    pub fn get_household(&self, id: &str) -> Result<Option<Household>> {
        Self::get(&self.households, id)
    }

    // -- relations -----------------------------------------------------

    pub fn put_relation(&self, r: &PersonUnitRelation) -> Result<()> {
        Self::put(&self.relations, &r.relation_id, r)
    }
    pub fn get_relation(&self, id: &str) -> Result<Option<PersonUnitRelation>> {
        Self::get(&self.relations, id)
    }

    // -- documents -------------------------------------------------------

    pub fn put_document(&self, d: &Document) -> Result<()> {
        Self::put(&self.documents, &d.document_id, d)?;
        self.documents_by_hash
            .insert(d.content_hash.as_bytes(), d.document_id.as_bytes())?;
        Ok(())
    }
    pub fn get_document(&self, id: &str) -> Result<Option<Document>> {
        Self::get(&self.documents, id)
    }
    /// Documents are deduplicated by content hash: returns the existing ID
    /// for a hash that's already been stored.
    pub fn find_document_id_by_hash(&self, hash: &str) -> Result<Option<String>> {
        Ok(self
            .documents_by_hash
            .get(hash.as_bytes())?
            .map(|v| String::from_utf8_lossy(&v).to_string()))
    }

    // -- claims ------------------------------------------------------------

    pub fn put_claim(&self, c: &Claim) -> Result<()> {
        let id = c
            .claim_id
            .as_deref()
            .ok_or_else(|| StorageError::NotFound("claim missing final id".into()))?;
        Self::put(&self.claims, id, c)
    }
    pub fn get_claim(&self, id: &str) -> Result<Option<Claim>> {
        Self::get(&self.claims, id)
    }

    /// Atomically returns `max(sequence for year) + 1`, starting at 1. The
    /// read-modify-write is serialized via `claim_seq_lock` so concurrent
    /// commits in the same process never hand out the same sequence twice;
    /// cross-process safety is delegated to sled's own atomicity of
    /// `compare_and_swap` on the counter key.
    pub fn next_claim_sequence(&self, year: i32) -> Result<u32> {
        let _guard = self.claim_seq_lock.write();
        let key = year.to_string();
        let next = self.claim_sequences.update_and_fetch(key.as_bytes(), |old| {
            let current = old
                .and_then(|b| b.try_into().ok())
                .map(u32::from_be_bytes)
                .unwrap_or(0);
            Some((current + 1).to_be_bytes().to_vec())
        })?;
        let bytes = next.ok_or_else(|| StorageError::NotFound("claim sequence".into()))?;
        let arr: [u8; 4] = bytes.as_ref().try_into().map_err(|_| {
            StorageError::Serialization(serde::de::Error::custom("bad sequence counter"))
        })?;
        Ok(u32::from_be_bytes(arr))
    }

    // -- packages / import history ---------------------------------------

    pub fn put_package(&self, p: &UhcPackage) -> Result<()> {
        Self::put(&self.packages, &p.package_id, p)
    }
    pub fn get_package(&self, id: &str) -> Result<Option<UhcPackage>> {
        Self::get(&self.packages, id)
    }
    pub fn package_exists(&self, id: &str) -> Result<bool> {
        Ok(self.packages.contains_key(id.as_bytes())?)
    }

    // -- staged records ----------------------------------------------------

    pub fn staged_key(package_id: &str, staging_id: &uuid::Uuid) -> String {
        format!("{package_id}:{staging_id}")
    }

    pub fn put_staged_record(&self, r: &StagedRecord) -> Result<()> {
        let key = Self::staged_key(&r.package_id, &r.staging_id);
        Self::put(&self.staged_records, &key, r)
    }

    pub fn staged_records_for_package(&self, package_id: &str) -> Result<Vec<StagedRecord>> {
        let prefix = format!("{package_id}:");
        self.staged_records
            .scan_prefix(prefix.as_bytes())
            .map(|r| {
                let (_, bytes) = r?;
                Ok(serde_json::from_slice(&bytes)?)
            })
            .collect()
    }

    /// Applies every entity write and every staged-record flag update for
    /// one package's commit inside a single sled transaction spanning all
    /// trees they touch (spec.md §4.4 "All committed writes for one package
    /// are atomic from the operator's view"). On any failure nothing in the
    /// batch persists — the package's pre-commit state is left untouched.
    pub fn commit_batch(
        &self,
        entity_writes: &[PendingWrite],
        staged_writes: &[(String, Vec<u8>)],
    ) -> Result<()> {
        let trees = (
            &self.buildings,
            &self.units,
            &self.persons,
            &self.households,
            &self.relations,
            &self.documents,
            &self.documents_by_hash,
            &self.claims,
            &self.staged_records,
        );

        let result: std::result::Result<(), TransactionError<Infallible>> = trees.transaction(
            |(buildings, units, persons, households, relations, documents, documents_by_hash, claims, staged_records)| {
                for w in entity_writes {
                    match w.kind {
                        EntityKind::Building => {
                            buildings.insert(w.key.as_bytes(), w.bytes.as_slice())?;
                        }
                        EntityKind::Unit => {
                            units.insert(w.key.as_bytes(), w.bytes.as_slice())?;
                        }
                        EntityKind::Person => {
                            persons.insert(w.key.as_bytes(), w.bytes.as_slice())?;
                        }
                        EntityKind::Household => {
                            households.insert(w.key.as_bytes(), w.bytes.as_slice())?;
                        }
                        EntityKind::Relation => {
                            relations.insert(w.key.as_bytes(), w.bytes.as_slice())?;
                        }
                        EntityKind::Document => {
                            documents.insert(w.key.as_bytes(), w.bytes.as_slice())?;
                            if let Some(hash) = &w.document_hash {
                                documents_by_hash.insert(hash.as_bytes(), w.key.as_bytes())?;
                            }
                        }
                        EntityKind::Claim => {
                            claims.insert(w.key.as_bytes(), w.bytes.as_slice())?;
                        }
                        EntityKind::Evidence => {}
                    }
                }
                for (key, bytes) in staged_writes {
                    staged_records.insert(key.as_bytes(), bytes.as_slice())?;
                }
                Ok(())
            },
        );

        result.map_err(|e| match e {
            TransactionError::Abort(never) => match never {},
            TransactionError::Storage(err) => StorageError::from(err),
        })
    }

    // -- conflicts -----------------------------------------------------

    pub fn put_conflict(&self, c: &Conflict) -> Result<()> {
        Self::put(&self.conflicts, &c.conflict_id.to_string(), c)
    }
    pub fn get_conflict(&self, id: &uuid::Uuid) -> Result<Option<Conflict>> {
        Self::get(&self.conflicts, &id.to_string())
    }
    pub fn all_conflicts(&self) -> Result<Vec<Conflict>> {
        Self::all(&self.conflicts)
    }

    // -- audit -----------------------------------------------------------

    pub fn append_audit(&self, entry: &AuditEntry) -> Result<()> {
        let id = self.audit_log.generate_id()?;
        Self::put(&self.audit_log, &id.to_string(), entry)
    }
    pub fn append_conflict_audit(&self, entry: &AuditEntry) -> Result<()> {
        let id = self.conflict_audit_log.generate_id()?;
        Self::put(&self.conflict_audit_log, &id.to_string(), entry)
    }
    pub fn all_audit_entries(&self) -> Result<Vec<AuditEntry>> {
        Self::all(&self.audit_log)
    }
    pub fn all_conflict_audit_entries(&self) -> Result<Vec<AuditEntry>> {
        Self::all(&self.conflict_audit_log)
    }

    // -- device registry / sync log (spec.md §4.6, §5) --------------------

    pub fn put_device(&self, d: &RegisteredDevice) -> Result<()> {
        Self::put(&self.devices, &d.device_id, d)
    }
    pub fn get_device(&self, device_id: &str) -> Result<Option<RegisteredDevice>> {
        Self::get(&self.devices, device_id)
    }
    pub fn device_exists(&self, device_id: &str) -> Result<bool> {
        Ok(self.devices.contains_key(device_id.as_bytes())?)
    }

    pub fn append_sync_log(&self, entry: &SyncLogEntry) -> Result<()> {
        let id = self.sync_log.generate_id()?;
        let key = format!("{}:{:020}", entry.device_id, id);
        Self::put(&self.sync_log, &key, entry)
    }

    /// Most recent sync-log entry for `device_id`, if any (spec.md §4.6
    /// `GET /sync/status`).
    pub fn last_sync_for_device(&self, device_id: &str) -> Result<Option<SyncLogEntry>> {
        let prefix = format!("{device_id}:");
        let mut last: Option<SyncLogEntry> = None;
        for item in self.sync_log.scan_prefix(prefix.as_bytes()) {
            let (_, bytes) = item?;
            let entry: SyncLogEntry = serde_json::from_slice(&bytes)?;
            last = Some(entry);
        }
        Ok(last)
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Snapshot of committed buildings in the shape `trr-spatial` queries
    /// over. Called by the indexed backend's `refresh` after commits that
    /// touch building geometry.
    pub fn to_spatial_buildings(&self) -> Result<Vec<trr_spatial::query::SpatialBuilding>> {
        Ok(self
            .all_buildings()?
            .into_iter()
            .map(|b| trr_spatial::query::SpatialBuilding {
                building_id: b.building_id,
                point: b.point.map(|p| (p.lon, p.lat)),
                polygon: b.polygon.map(|rings| {
                    rings
                        .into_iter()
                        .map(|ring| ring.into_iter().map(|p| (p.lon, p.lat)).collect())
                        .collect()
                }),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open() -> (Store, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        (Store::open(dir.path()).unwrap(), dir)
    }

    #[test]
    fn round_trips_a_building() {
        let (store, _dir) = open();
        let b = Building {
            building_id: "01-01-02-003-001-00001".into(),
            governorate_code: "01".into(),
            district_code: "01".into(),
            subdistrict_code: "02".into(),
            community_code: "003".into(),
            neighborhood_code: "001".into(),
            sequence_code: "00001".into(),
            building_type: None,
            status: None,
            floor_count: None,
            unit_count: None,
            point: None,
            polygon: None,
        };
        store.put_building(&b).unwrap();
        let back = store.get_building(&b.building_id).unwrap().unwrap();
        assert_eq!(back.building_id, b.building_id);
    }

    #[test]
    fn documents_dedup_by_content_hash() {
        let (store, _dir) = open();
        let d = Document {
            document_id: "doc-1".into(),
            document_type: None,
            issue_date: None,
            number: None,
            verified: false,
            content_hash: "abc123".into(),
        };
        store.put_document(&d).unwrap();
        assert_eq!(
            store.find_document_id_by_hash("abc123").unwrap(),
            Some("doc-1".to_string())
        );
        assert_eq!(store.find_document_id_by_hash("missing").unwrap(), None);
    }

    #[test]
    fn claim_sequence_is_monotonic_per_year() {
        let (store, _dir) = open();
        assert_eq!(store.next_claim_sequence(2025).unwrap(), 1);
        assert_eq!(store.next_claim_sequence(2025).unwrap(), 2);
        assert_eq!(store.next_claim_sequence(2026).unwrap(), 1);
    }

    #[test]
    fn package_existence_drives_idempotency() {
        let (store, _dir) = open();
        assert!(!store.package_exists("pkg-1").unwrap());
        let pkg = UhcPackage {
            package_id: "pkg-1".into(),
            schema_version: "1.0.0".into(),
            vocab_versions: Default::default(),
            app_version: "1.0.0".into(),
            device_id: "dev-1".into(),
            created_utc: chrono::Utc::now(),
            checksum: "x".into(),
            signature: None,
            record_counts: Default::default(),
            status: trr_core::types::PackageStatus::Received,
        };
        store.put_package(&pkg).unwrap();
        assert!(store.package_exists("pkg-1").unwrap());
    }

    #[test]
    fn commit_batch_writes_entities_and_staged_flags_together() {
        let (store, _dir) = open();
        let b = Building {
            building_id: "01-01-02-003-001-00002".into(),
            governorate_code: "01".into(),
            district_code: "01".into(),
            subdistrict_code: "02".into(),
            community_code: "003".into(),
            neighborhood_code: "001".into(),
            sequence_code: "00002".into(),
            building_type: None,
            status: None,
            floor_count: None,
            unit_count: None,
            point: None,
            polygon: None,
        };
        let staging_id = uuid::Uuid::new_v4();
        let mut record = StagedRecord::new("pkg-2", trr_core::types::EntityKind::Building, "b", serde_json::json!({}));
        record.staging_id = staging_id;
        record.committed = true;
        record.final_id = Some(b.building_id.clone());

        let writes = vec![PendingWrite {
            kind: trr_core::types::EntityKind::Building,
            key: b.building_id.clone(),
            bytes: serde_json::to_vec(&b).unwrap(),
            document_hash: None,
        }];
        let staged_key = Store::staged_key("pkg-2", &staging_id);
        let staged = vec![(staged_key, serde_json::to_vec(&record).unwrap())];

        store.commit_batch(&writes, &staged).unwrap();

        assert!(store.get_building(&b.building_id).unwrap().is_some());
        let rows = store.staged_records_for_package("pkg-2").unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].committed);
    }
}
