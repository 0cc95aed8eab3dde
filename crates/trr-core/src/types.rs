//! Entity and staging types for the TRRCMS core (spec.md §3)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// A WGS-84 point, (lon, lat) order to match the geometry codec (spec.md §4.1).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LonLat {
    pub lon: f64,
    pub lat: f64,
}

// =============================================================================
// ENTITY KIND (closed sum type, spec.md §9 "Dynamic typing -> tagged variants")
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Building,
    Unit,
    Person,
    Household,
    Relation,
    Evidence,
    Document,
    Claim,
}

impl EntityKind {
    /// All kinds, in the commit ordering required by spec.md §5
    /// (buildings, units, persons, households, relations, documents, claims).
    pub const COMMIT_ORDER: [EntityKind; 7] = [
        EntityKind::Building,
        EntityKind::Unit,
        EntityKind::Person,
        EntityKind::Household,
        EntityKind::Relation,
        EntityKind::Document,
        EntityKind::Claim,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Building => "building",
            EntityKind::Unit => "unit",
            EntityKind::Person => "person",
            EntityKind::Household => "household",
            EntityKind::Relation => "relation",
            EntityKind::Evidence => "evidence",
            EntityKind::Document => "document",
            EntityKind::Claim => "claim",
        }
    }
}

// =============================================================================
// BUILDING STATUS / RELATION TYPE / CLAIM STATUS VOCABULARIES
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildingStatus {
    Intact,
    Minor,
    Major,
    Destroyed,
    Unknown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    Owner,
    Occupant,
    Tenant,
    Guest,
    Heirs,
    Other,
}

impl RelationType {
    pub fn from_loose(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "owner" => Some(Self::Owner),
            "occupant" => Some(Self::Occupant),
            "tenant" => Some(Self::Tenant),
            "guest" => Some(Self::Guest),
            "heir" | "heirs" => Some(Self::Heirs),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

pub const CLAIM_STATUSES: &[&str] = &[
    "draft",
    "pending_submission",
    "submitted",
    "initial_screening",
    "under_review",
    "awaiting_documents",
    "conflict_detected",
    "approved",
    "rejected",
];

pub const DOCUMENT_TYPES: &[&str] = &[
    "deed",
    "lease",
    "utility_bill",
    "court_ruling",
    "identity_card",
    "inheritance_certificate",
    "power_of_attorney",
    "other",
];

// =============================================================================
// ENTITIES
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Building {
    pub building_id: String,
    pub governorate_code: String,
    pub district_code: String,
    pub subdistrict_code: String,
    pub community_code: String,
    pub neighborhood_code: String,
    pub sequence_code: String,
    pub building_type: Option<String>,
    pub status: Option<String>,
    pub floor_count: Option<u32>,
    pub unit_count: Option<u32>,
    pub point: Option<LonLat>,
    /// Exterior ring plus any hole rings, each a closed list of (lon, lat).
    pub polygon: Option<Vec<Vec<LonLat>>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertyUnit {
    pub unit_id: String,
    pub building_id: String,
    pub floor: Option<i32>,
    pub number: Option<String>,
    pub unit_type: Option<String>,
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub person_id: String,
    pub national_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_numbers: Vec<String>,
    pub gender: Option<String>,
    pub year_of_birth: Option<i32>,
    pub contact: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Household {
    pub household_id: String,
    pub property_unit_id: String,
    pub person_ids: Vec<String>,
    pub occupancy_size: Option<u32>,
    pub male_count: Option<u32>,
    pub female_count: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersonUnitRelation {
    pub relation_id: String,
    pub person_id: String,
    pub property_unit_id: String,
    pub relation_type: Option<String>,
    pub ownership_share: Option<i32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub evidence_id: String,
    pub person_unit_relation_id: Option<String>,
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub document_id: String,
    pub document_type: Option<String>,
    pub issue_date: Option<String>,
    pub number: Option<String>,
    pub verified: bool,
    /// Hex-encoded SHA-256 of the document content, used for dedup.
    pub content_hash: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub claim_id: Option<String>,
    pub building_id: String,
    pub unit_id: Option<String>,
    pub claimant_person_id: String,
    pub claim_type: Option<String>,
    pub case_status: Option<String>,
    pub source: Option<String>,
}

// =============================================================================
// ID NORMALIZATION (spec.md §9 "standardizes on with-dashes")
// =============================================================================

/// Normalizes a building/unit ID to the dashed persisted form. Devices may
/// send either form; every ingress path (manifest parsing, validators) runs
/// input through this.
pub fn normalize_building_id(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != 17 {
        return raw.trim().to_string();
    }
    format!(
        "{}-{}-{}-{}-{}-{}",
        &digits[0..2],
        &digits[2..4],
        &digits[4..6],
        &digits[6..9],
        &digits[9..12],
        &digits[12..17]
    )
}

pub fn normalize_unit_id(raw: &str) -> String {
    let trimmed = raw.trim();
    let dash_count = trimmed.matches('-').count();
    if dash_count == 7 {
        return trimmed.to_string();
    }
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != 20 {
        return trimmed.to_string();
    }
    format!(
        "{}-{}-{}-{}-{}-{}-{}",
        &digits[0..2],
        &digits[2..4],
        &digits[4..6],
        &digits[6..9],
        &digits[9..12],
        &digits[12..17],
        &digits[17..20]
    )
}

// =============================================================================
// UHC PACKAGE / MANIFEST (spec.md §3, §6.2)
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageStatus {
    Received,
    SignatureCheck,
    ManifestParse,
    SchemaValidate,
    VocabCheck,
    ExtractRecords,
    ValidateRecords,
    DetectDuplicates,
    Staging,
    Committed,
    Quarantined,
    Failed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Manifest {
    pub package_id: String,
    pub schema_version: String,
    pub created_utc: DateTime<Utc>,
    pub device_id: String,
    pub app_version: String,
    pub vocab_versions: HashMap<String, String>,
    pub form_schema_version: String,
    pub checksum: String,
    pub signature: Option<String>,
    pub record_counts: Option<HashMap<String, u64>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UhcPackage {
    pub package_id: String,
    pub schema_version: String,
    pub vocab_versions: HashMap<String, String>,
    pub app_version: String,
    pub device_id: String,
    pub created_utc: DateTime<Utc>,
    pub checksum: String,
    pub signature: Option<String>,
    pub record_counts: HashMap<String, u64>,
    pub status: PackageStatus,
}

// =============================================================================
// STAGING (spec.md §3 "Staged Record")
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueLevel {
    Error,
    Warning,
    Info,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub level: IssueLevel,
    pub entity_kind: EntityKind,
    pub source_id: String,
    pub field: Option<String>,
    pub code: String,
    pub message: String,
    pub suggestion: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StagedResolution {
    Merge,
    KeepExisting,
    KeepNew,
    KeepBoth,
    Skip,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StagedRecord {
    pub staging_id: Uuid,
    pub package_id: String,
    pub entity_kind: EntityKind,
    pub source_id: String,
    pub payload: Value,
    pub is_valid: bool,
    pub issues: Vec<ValidationIssue>,
    pub is_duplicate: bool,
    pub duplicate_of: Option<String>,
    pub duplicate_score: Option<f64>,
    pub resolution: Option<StagedResolution>,
    pub committed: bool,
    pub final_id: Option<String>,
}

impl StagedRecord {
    pub fn new(package_id: &str, entity_kind: EntityKind, source_id: &str, payload: Value) -> Self {
        Self {
            staging_id: Uuid::new_v4(),
            package_id: package_id.to_string(),
            entity_kind,
            source_id: source_id.to_string(),
            payload,
            is_valid: true,
            issues: Vec::new(),
            is_duplicate: false,
            duplicate_of: None,
            duplicate_score: None,
            resolution: None,
            committed: false,
            final_id: None,
        }
    }

    /// Whether this record is eligible for commit (spec.md §4.4 commit rule).
    pub fn commit_eligible(&self) -> bool {
        self.is_valid && (!self.is_duplicate || self.resolution == Some(StagedResolution::KeepNew))
    }
}

// =============================================================================
// CONFLICTS (spec.md §3 "Conflict", §4.5)
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictType {
    OwnershipConflict,
    ClaimOverlap,
    DuplicatePerson,
    DuplicateBuilding,
    DuplicateUnit,
    DuplicateClaim,
    FieldMismatch,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    Pending,
    InReview,
    AutoResolved,
    Resolved,
    Escalated,
    Deferred,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldConflict {
    pub field_name: String,
    pub source_value: Value,
    pub target_value: Value,
    pub resolution: Option<String>,
    pub resolved_value: Option<Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Conflict {
    pub conflict_id: Uuid,
    pub conflict_type: ConflictType,
    pub priority: Priority,
    pub status: ConflictStatus,
    pub entity_kind: EntityKind,
    pub source_snapshot: Value,
    pub target_snapshot: Value,
    pub field_conflicts: Vec<FieldConflict>,
    pub match_score: f64,
    pub package_id: Option<String>,
    pub created_by: Option<String>,
    pub assigned_to: Option<String>,
    pub resolved_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_notes: Option<String>,
}

// =============================================================================
// RESOLUTION POLICY (spec.md §3 "Resolution Policy", §4.5)
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyCondition {
    Always,
    OneNull,
    BothPresent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyStrategy {
    KeepSource,
    KeepTarget,
    KeepNewest,
    KeepOldest,
    Concatenate,
    PreferComplete,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResolutionPolicy {
    pub conflict_type: ConflictType,
    pub field_name: Option<String>,
    pub condition: PolicyCondition,
    pub strategy: PolicyStrategy,
    pub priority: i32,
}

// =============================================================================
// AUDIT (spec.md §3 "Audit entry")
// =============================================================================

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEntry {
    pub target_id: String,
    pub action: String,
    pub old_status: Option<String>,
    pub new_status: Option<String>,
    pub details: Value,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        target_id: impl Into<String>,
        action: impl Into<String>,
        old_status: Option<String>,
        new_status: Option<String>,
        details: Value,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            target_id: target_id.into(),
            action: action.into(),
            old_status,
            new_status,
            details,
            actor: actor.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Result of one ingest attempt (spec.md §9 "Exceptions for control flow ->
/// result types"). Always populated; `success` is the operator-facing verdict.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImportResult {
    pub package_id: String,
    pub success: bool,
    pub stage: String,
    pub record_counts: HashMap<String, u64>,
    pub issues: Vec<ValidationIssue>,
    pub validation_summary: HashMap<String, u64>,
}

// =============================================================================
// SYNC BOUNDARY (spec.md §4.6 C6)
// =============================================================================

/// A device known to the sync boundary (spec.md §5 "device-registry caches").
/// Devices auto-register on first `/auth` call under the default policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegisteredDevice {
    pub device_id: String,
    pub device_name: Option<String>,
    pub registered_at: DateTime<Utc>,
    pub last_seen: Option<DateTime<Utc>>,
}

/// One upload/commit sync operation, kept for `/sync/status` and forensics.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub device_id: String,
    pub action: String,
    pub details: Value,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_undashed_building_id() {
        assert_eq!(
            normalize_building_id("01010200300100001"),
            "01-01-02-003-001-00001"
        );
    }

    #[test]
    fn leaves_already_dashed_building_id() {
        let id = "01-01-02-003-001-00001";
        assert_eq!(normalize_building_id(id), id);
    }

    #[test]
    fn normalizes_undashed_unit_id() {
        assert_eq!(
            normalize_unit_id("01010200300100001001"),
            "01-01-02-003-001-00001-001"
        );
    }

    #[test]
    fn commit_eligible_requires_valid_and_not_duplicate() {
        let mut r = StagedRecord::new("p1", EntityKind::Building, "b1", Value::Null);
        assert!(r.commit_eligible());
        r.is_duplicate = true;
        assert!(!r.commit_eligible());
        r.resolution = Some(StagedResolution::KeepNew);
        assert!(r.commit_eligible());
        r.is_valid = false;
        assert!(!r.commit_eligible());
    }
}
