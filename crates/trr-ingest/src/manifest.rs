//! Manifest parsing and the schema/vocab gates (spec.md §4.4 stages
//! `manifest_parse`, `schema_validate`, `vocab_check`).

use trr_core::types::{IssueLevel, ValidationIssue};

/// Schema versions this build accepts without a warning (spec.md §4.4).
pub const SUPPORTED_SCHEMA_VERSIONS: &[&str] = &["1.0.0", "1.0.1", "1.1.0"];

/// Supported MAJOR version range per vocabulary, inclusive (spec.md §4.4,
/// §6.4 — configurable in principle; fixed at {1,1} for every vocabulary in
/// this build per spec.md scenario 5).
pub const SUPPORTED_VOCAB_MAJOR_RANGE: (u32, u32) = (1, 1);

fn issue(level: IssueLevel, code: &str, field: &str, message: String) -> ValidationIssue {
    ValidationIssue {
        level,
        entity_kind: trr_core::types::EntityKind::Building, // manifest-level issues aren't tied to an entity row
        source_id: "manifest".to_string(),
        field: Some(field.to_string()),
        code: code.to_string(),
        message,
        suggestion: None,
    }
}

/// `schema_validate`: unknown `schema_version` is a warning, not an error.
pub fn check_schema_version(schema_version: &str) -> Option<ValidationIssue> {
    if SUPPORTED_SCHEMA_VERSIONS.contains(&schema_version) {
        None
    } else {
        Some(issue(
            IssueLevel::Warning,
            "UNSUPPORTED_SCHEMA_VERSION",
            "schema_version",
            format!("schema_version '{schema_version}' is not in the supported set"),
        ))
    }
}

fn major_version(v: &str) -> Option<u32> {
    v.split('.').next()?.parse().ok()
}

/// `vocab_check`: a MAJOR mismatch is an error that aborts the pipeline; an
/// unparseable version string is a warning only.
pub fn check_vocab_versions(vocab_versions: &std::collections::HashMap<String, String>) -> Vec<ValidationIssue> {
    let (min, max) = SUPPORTED_VOCAB_MAJOR_RANGE;
    let mut out = Vec::new();
    for (name, version) in vocab_versions {
        match major_version(version) {
            Some(major) if major < min || major > max => out.push(issue(
                IssueLevel::Error,
                "VOCAB_MAJOR_MISMATCH",
                &format!("vocab_versions.{name}"),
                format!("vocabulary '{name}' major version {major} is outside supported range {min}..={max}"),
            )),
            Some(_) => {}
            None => out.push(issue(
                IssueLevel::Warning,
                "VOCAB_VERSION_UNPARSEABLE",
                &format!("vocab_versions.{name}"),
                format!("vocabulary '{name}' version '{version}' could not be parsed"),
            )),
        }
    }
    out
}
