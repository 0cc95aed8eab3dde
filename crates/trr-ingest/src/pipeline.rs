//! The UHC ingest pipeline (spec.md §4.4 C4): verify, parse, gate, extract,
//! validate, dedup, stage, commit, in that strict linear order per package
//! (spec.md §5 "Ordering guarantees").

use crate::commit::{commit_records, current_year};
use crate::dedup::{find_duplicate_building, find_duplicate_person};
use crate::error::{IngestError, Result};
use crate::extract::extract_records;
use crate::manifest::{check_schema_version, check_vocab_versions};
use crate::package::{data_stream_checksum, open_package, ENTITY_DOCUMENTS};
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use trr_core::ports::{silent_audit, silent_progress, AuditSink, ProgressSink};
use trr_core::types::{
    AuditEntry, Building, EntityKind, ImportResult, IssueLevel, Manifest, PackageStatus, Person,
    PropertyUnit, StagedRecord, UhcPackage, ValidationIssue,
};
use trr_storage::Store;
use trr_validate::ValidatorRegistry;

pub struct Pipeline {
    store: Arc<Store>,
    registry: ValidatorRegistry,
    staging_dir: PathBuf,
    quarantine_dir: PathBuf,
    progress: ProgressSink,
    audit: AuditSink,
}

impl Pipeline {
    pub fn new(
        store: Arc<Store>,
        registry: ValidatorRegistry,
        staging_dir: impl Into<PathBuf>,
        quarantine_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            registry,
            staging_dir: staging_dir.into(),
            quarantine_dir: quarantine_dir.into(),
            progress: silent_progress(),
            audit: silent_audit(),
        }
    }

    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress = sink;
        self
    }

    pub fn with_audit(mut self, sink: AuditSink) -> Self {
        self.audit = sink;
        self
    }

    fn report(&self, stage: &str, current: u64, total: u64) {
        (self.progress)(stage, current, total);
    }

    fn log_audit(&self, entry: AuditEntry) {
        if let Err(e) = self.store.append_audit(&entry) {
            tracing::warn!("failed to append ingest audit entry: {e}");
        }
        (self.audit)(&entry);
    }

    /// Copies `source` into the quarantine directory with a timestamp-
    /// prefixed name and a sibling `.reason.txt` (spec.md §4.4
    /// "Quarantine").
    fn quarantine(&self, source: &Path, package_id: Option<&str>, reason: &str) -> Result<()> {
        std::fs::create_dir_all(&self.quarantine_dir)?;
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%fZ");
        let original_name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "package.uhc".to_string());
        let dest = self.quarantine_dir.join(format!("{stamp}_{original_name}"));
        std::fs::copy(source, &dest)?;
        std::fs::write(dest.with_extension("reason.txt"), reason)?;
        self.log_audit(AuditEntry::new(
            package_id.unwrap_or("unknown").to_string(),
            "IMPORT_FAILED",
            None,
            Some("quarantined".to_string()),
            serde_json::json!({ "reason": reason }),
            "system",
        ));
        Ok(())
    }

    fn fail(&self, source: &Path, package_id: Option<&str>, reason: &str) -> Result<ImportResult> {
        self.quarantine(source, package_id, reason)?;
        Ok(ImportResult {
            package_id: package_id.unwrap_or_default().to_string(),
            success: false,
            stage: "FAILED".to_string(),
            record_counts: HashMap::new(),
            issues: vec![ValidationIssue {
                level: IssueLevel::Error,
                entity_kind: EntityKind::Building,
                source_id: "manifest".to_string(),
                field: None,
                code: "IMPORT_FAILED".to_string(),
                message: reason.to_string(),
                suggestion: None,
            }],
            validation_summary: HashMap::new(),
        })
    }

    /// Runs verify → parse → gate → extract → validate → dedup → stage for
    /// one package file. Does not commit; the operator calls [`Self::commit`]
    /// separately.
    pub fn import(&self, source_path: &Path, actor: &str) -> Result<ImportResult> {
        self.report("signature_check", 0, 7);
        let mut reader = match open_package(source_path) {
            Ok(r) => r,
            Err(e) => return self.fail(source_path, None, &format!("failed to open package archive: {e}")),
        };

        self.report("manifest_parse", 1, 7);
        let manifest_bytes = match reader.manifest_bytes() {
            Ok(b) => b,
            Err(e) => return self.fail(source_path, None, &format!("manifest_parse failed: {e}")),
        };
        let manifest: Manifest = match serde_json::from_slice(&manifest_bytes) {
            Ok(m) => m,
            Err(e) => return self.fail(source_path, None, &format!("manifest_parse failed: {e}")),
        };

        // The manifest carries its own checksum, so the hash is taken over
        // the entity-document data stream (spec.md §6.2 "checksum: SHA-256
        // over the data stream"), not the container file itself.
        let computed_checksum = match data_stream_checksum(reader.as_mut()) {
            Ok(c) => c,
            Err(e) => {
                return self.fail(
                    source_path,
                    Some(&manifest.package_id),
                    &format!("failed to read package data stream for checksum verification: {e}"),
                )
            }
        };
        if manifest.checksum.to_ascii_lowercase() != computed_checksum {
            return self.fail(
                source_path,
                Some(&manifest.package_id),
                "checksum verification failed: manifest checksum does not match computed data-stream checksum",
            );
        }

        self.report("idempotency", 2, 7);
        if self.store.package_exists(&manifest.package_id)? {
            self.log_audit(AuditEntry::new(
                manifest.package_id.clone(),
                "DUPLICATE_PACKAGE",
                None,
                None,
                serde_json::json!({}),
                actor,
            ));
            let mut validation_summary = HashMap::new();
            validation_summary.insert("skipped".to_string(), 1);
            return Ok(ImportResult {
                package_id: manifest.package_id,
                success: true,
                stage: "SKIPPED".to_string(),
                record_counts: HashMap::new(),
                issues: vec![],
                validation_summary,
            });
        }

        self.report("schema_validate", 3, 7);
        let mut issues: Vec<ValidationIssue> = Vec::new();
        issues.extend(check_schema_version(&manifest.schema_version));

        self.report("vocab_check", 3, 7);
        let vocab_issues = check_vocab_versions(&manifest.vocab_versions);
        let vocab_fatal = vocab_issues.iter().any(|i| i.level == IssueLevel::Error);
        issues.extend(vocab_issues);
        if vocab_fatal {
            let reason = issues
                .iter()
                .find(|i| i.code == "VOCAB_MAJOR_MISMATCH")
                .map(|i| i.message.clone())
                .unwrap_or_else(|| "vocabulary major version mismatch".to_string());
            return self.fail(source_path, Some(&manifest.package_id), &reason);
        }

        self.report("extract_records", 4, 7);
        let mut staged: Vec<StagedRecord> = Vec::new();
        let mut record_counts: HashMap<String, u64> = HashMap::new();
        for (filename, kind) in ENTITY_DOCUMENTS {
            let Some(bytes) = reader.entity_bytes(filename)? else { continue };
            let records = extract_records(*kind, &bytes)
                .map_err(|e| IngestError::Fatal(format!("failed to parse {filename}: {e}")))?;
            record_counts.insert(kind.as_str().to_string(), records.len() as u64);
            for (source_id, payload) in records {
                staged.push(StagedRecord::new(&manifest.package_id, *kind, &source_id, payload));
            }
        }
        if let Ok(names) = reader.attachment_names() {
            if !names.is_empty() {
                record_counts.insert("attachment".to_string(), names.len() as u64);
            }
        }

        self.report("validate_records", 5, 7);
        for record in &mut staged {
            let record_issues = self.registry.validate(record.entity_kind, &record.source_id, &record.payload);
            record.is_valid = !record_issues.iter().any(|i| i.level == IssueLevel::Error);
            issues.extend(record_issues.clone());
            record.issues = record_issues;
        }
        self.attach_cross_entity_issues(&mut staged, &mut issues);

        self.report("detect_duplicates", 6, 7);
        self.detect_duplicates(&mut staged)?;

        self.report("staging", 7, 7);
        std::fs::create_dir_all(&self.staging_dir)?;
        std::fs::copy(source_path, self.staging_dir.join(format!("{}.uhc", manifest.package_id)))?;

        let package = UhcPackage {
            package_id: manifest.package_id.clone(),
            schema_version: manifest.schema_version.clone(),
            vocab_versions: manifest.vocab_versions.clone(),
            app_version: manifest.app_version.clone(),
            device_id: manifest.device_id.clone(),
            created_utc: manifest.created_utc,
            checksum: manifest.checksum.clone(),
            signature: manifest.signature.clone(),
            record_counts: record_counts.clone(),
            status: PackageStatus::Staging,
        };
        self.store.put_package(&package)?;
        for record in &staged {
            self.store.put_staged_record(record)?;
        }

        self.log_audit(AuditEntry::new(
            manifest.package_id.clone(),
            "STAGED",
            None,
            Some("staging".to_string()),
            serde_json::json!({ "record_counts": record_counts }),
            actor,
        ));

        let error_count = issues.iter().filter(|i| i.level == IssueLevel::Error).count();
        let warning_count = issues.iter().filter(|i| i.level == IssueLevel::Warning).count();
        let mut validation_summary = HashMap::new();
        validation_summary.insert("errors".to_string(), error_count as u64);
        validation_summary.insert("warnings".to_string(), warning_count as u64);

        Ok(ImportResult {
            package_id: manifest.package_id,
            success: error_count == 0,
            stage: "STAGED".to_string(),
            record_counts,
            issues,
            validation_summary,
        })
    }

    fn attach_cross_entity_issues(&self, staged: &mut [StagedRecord], issues: &mut Vec<ValidationIssue>) {
        let building_ids: std::collections::HashSet<String> = staged
            .iter()
            .filter(|r| r.entity_kind == EntityKind::Building)
            .map(|r| r.source_id.clone())
            .collect();
        let person_ids: std::collections::HashSet<String> = staged
            .iter()
            .filter(|r| r.entity_kind == EntityKind::Person)
            .map(|r| r.source_id.clone())
            .collect();

        let units: Vec<PropertyUnit> = staged
            .iter()
            .filter(|r| r.entity_kind == EntityKind::Unit)
            .filter_map(|r| serde_json::from_value(r.payload.clone()).ok())
            .collect();
        let relations: Vec<trr_core::types::PersonUnitRelation> = staged
            .iter()
            .filter(|r| r.entity_kind == EntityKind::Relation)
            .filter_map(|r| serde_json::from_value(r.payload.clone()).ok())
            .collect();

        let orphan_units = trr_validate::cross_entity::orphan_units(&units, &building_ids);
        let orphan_relations = trr_validate::cross_entity::orphan_relations(&relations, &person_ids);

        for issue in orphan_units.iter().chain(orphan_relations.iter()) {
            if let Some(record) = staged
                .iter_mut()
                .find(|r| r.entity_kind == issue.entity_kind && r.source_id == issue.source_id)
            {
                record.issues.push(issue.clone());
            }
        }
        issues.extend(orphan_units);
        issues.extend(orphan_relations);
    }

    fn detect_duplicates(&self, staged: &mut [StagedRecord]) -> Result<()> {
        for record in staged.iter_mut() {
            match record.entity_kind {
                EntityKind::Person => {
                    let Ok(person) = serde_json::from_value::<Person>(record.payload.clone()) else { continue };
                    if let Some(hit) = find_duplicate_person(&self.store, person.national_id.as_deref())? {
                        record.is_duplicate = true;
                        record.duplicate_of = Some(hit.duplicate_of);
                        record.duplicate_score = Some(hit.match_score);
                    }
                }
                EntityKind::Building => {
                    let Ok(building) = serde_json::from_value::<Building>(record.payload.clone()) else { continue };
                    if let Some(hit) = find_duplicate_building(&self.store, &building.building_id)? {
                        record.is_duplicate = true;
                        record.duplicate_of = Some(hit.duplicate_of);
                        record.duplicate_score = Some(hit.match_score);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Commits every `commit_eligible` staged record for `package_id`, in
    /// the ordering spec.md §5 requires. `commit_records` applies every
    /// entity write and staged-record flag update as one atomic transaction
    /// (spec.md §4.4 "atomic from the operator's view"): on a storage error
    /// nothing from this call persists, the package's status is left
    /// exactly as it was pre-commit, and a failure audit entry is written.
    pub fn commit(&self, package_id: &str, actor: &str) -> Result<ImportResult> {
        let mut package = self
            .store
            .get_package(package_id)?
            .ok_or_else(|| IngestError::Fatal(format!("unknown package_id '{package_id}'")))?;
        let mut records = self.store.staged_records_for_package(package_id)?;

        let old_status = format!("{:?}", package.status);
        let result = commit_records(&self.store, &mut records, current_year());

        match result {
            Ok(record_counts) => {
                package.status = PackageStatus::Committed;
                self.store.put_package(&package)?;
                self.log_audit(AuditEntry::new(
                    package_id.to_string(),
                    "COMMITTED",
                    Some(old_status),
                    Some("committed".to_string()),
                    serde_json::json!({ "record_counts": record_counts }),
                    actor,
                ));
                Ok(ImportResult {
                    package_id: package_id.to_string(),
                    success: true,
                    stage: "COMMITTED".to_string(),
                    record_counts,
                    issues: vec![],
                    validation_summary: HashMap::new(),
                })
            }
            Err(e) => {
                self.log_audit(AuditEntry::new(
                    package_id.to_string(),
                    "COMMIT_FAILED",
                    Some(old_status),
                    Some(format!("{:?}", package.status)),
                    serde_json::json!({ "error": e.to_string() }),
                    actor,
                ));
                Err(IngestError::Storage(e))
            }
        }
    }
}
