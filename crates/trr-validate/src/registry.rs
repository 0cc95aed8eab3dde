//! Type-keyed validator registry (spec.md §9 "Inheritance and mixins ->
//! composition"): each entity kind's validator is a plain value, a function
//! from its typed payload to a list of issues, looked up by `EntityKind`
//! rather than dispatched through a class hierarchy.

use crate::validators;
use serde_json::Value;
use trr_core::types::{
    Building, Claim, Document, Evidence, EntityKind, Household, Person, PersonUnitRelation,
    PropertyUnit, ValidationIssue,
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RegionBbox {
    pub min_lat: f64,
    pub min_lng: f64,
    pub max_lat: f64,
    pub max_lng: f64,
}

impl RegionBbox {
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lng && lon <= self.max_lng && lat >= self.min_lat && lat <= self.max_lat
    }

    /// Parses `TRRCMS_REGION_BBOX` (`min_lat,min_lng,max_lat,max_lng`).
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<f64> = s.split(',').filter_map(|p| p.trim().parse().ok()).collect();
        if parts.len() != 4 {
            return None;
        }
        Some(Self {
            min_lat: parts[0],
            min_lng: parts[1],
            max_lat: parts[2],
            max_lng: parts[3],
        })
    }
}

/// Validates one record given its kind and raw JSON payload. Registering a
/// new kind means adding a match arm here and a validator function in
/// `validators` — no subclassing.
pub struct ValidatorRegistry {
    pub region: Option<RegionBbox>,
}

impl ValidatorRegistry {
    pub fn new(region: Option<RegionBbox>) -> Self {
        Self { region }
    }

    pub fn validate(&self, kind: EntityKind, source_id: &str, payload: &Value) -> Vec<ValidationIssue> {
        match kind {
            EntityKind::Building => parse_and_validate::<Building>(payload, source_id, kind, |b| {
                validators::validate_building(b, self.region)
            }),
            EntityKind::Unit => {
                parse_and_validate::<PropertyUnit>(payload, source_id, kind, validators::validate_unit)
            }
            EntityKind::Person => {
                parse_and_validate::<Person>(payload, source_id, kind, validators::validate_person)
            }
            EntityKind::Household => {
                parse_and_validate::<Household>(payload, source_id, kind, validators::validate_household)
            }
            EntityKind::Relation => parse_and_validate::<PersonUnitRelation>(
                payload,
                source_id,
                kind,
                validators::validate_relation,
            ),
            EntityKind::Evidence => {
                parse_and_validate::<Evidence>(payload, source_id, kind, validators::validate_evidence)
            }
            EntityKind::Document => {
                parse_and_validate::<Document>(payload, source_id, kind, validators::validate_document)
            }
            EntityKind::Claim => {
                parse_and_validate::<Claim>(payload, source_id, kind, validators::validate_claim)
            }
        }
    }
}

fn parse_and_validate<T: serde::de::DeserializeOwned>(
    payload: &Value,
    source_id: &str,
    kind: EntityKind,
    f: impl Fn(&T) -> Vec<ValidationIssue>,
) -> Vec<ValidationIssue> {
    match serde_json::from_value::<T>(payload.clone()) {
        Ok(entity) => f(&entity),
        Err(e) => vec![ValidationIssue {
            level: trr_core::types::IssueLevel::Error,
            entity_kind: kind,
            source_id: source_id.to_string(),
            field: None,
            code: "MALFORMED_RECORD".to_string(),
            message: format!("failed to parse {}: {e}", kind.as_str()),
            suggestion: None,
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn region_bbox_parses_region_env_format() {
        let bbox = RegionBbox::parse("32.0,35.0,37.5,42.5").unwrap();
        assert!(bbox.contains(37.0, 35.0));
        assert!(!bbox.contains(50.0, 35.0));
    }

    #[test]
    fn malformed_payload_yields_single_error_issue() {
        let reg = ValidatorRegistry::new(None);
        let issues = reg.validate(EntityKind::Building, "src-1", &json!({"not": "a building"}));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, "MALFORMED_RECORD");
    }
}
