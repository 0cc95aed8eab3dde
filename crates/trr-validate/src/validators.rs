//! Per-entity field validators (spec.md §4.3)

use regex::Regex;
use std::sync::OnceLock;
use trr_core::types::{
    Building, Claim, Document, Evidence, EntityKind, Household, IssueLevel, Person,
    PersonUnitRelation, PropertyUnit, ValidationIssue, CLAIM_STATUSES, DOCUMENT_TYPES,
};
use trr_spatial::validation::check_polygon;

use crate::registry::RegionBbox;

fn building_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{2}-\d{2}-\d{2}-\d{3}-\d{3}-\d{5}$").unwrap())
}

fn unit_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{2}-\d{2}-\d{2}-\d{3}-\d{3}-\d{5}-\d{3}$").unwrap())
}

fn national_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{11}$").unwrap())
}

fn issue(
    level: IssueLevel,
    kind: EntityKind,
    source_id: &str,
    field: Option<&str>,
    code: &str,
    message: impl Into<String>,
) -> ValidationIssue {
    ValidationIssue {
        level,
        entity_kind: kind,
        source_id: source_id.to_string(),
        field: field.map(str::to_string),
        code: code.to_string(),
        message: message.into(),
        suggestion: None,
    }
}

pub fn validate_building(b: &Building, region: Option<RegionBbox>) -> Vec<ValidationIssue> {
    let mut out = Vec::new();
    let id = &b.building_id;

    if !building_id_re().is_match(id) {
        out.push(issue(
            IssueLevel::Error,
            EntityKind::Building,
            id,
            Some("building_id"),
            "INVALID_BUILDING_ID",
            format!("'{id}' does not match the 17-digit structural pattern"),
        ));
    }

    let mut point_in_range = true;
    if let Some(p) = b.point {
        if !(-90.0..=90.0).contains(&p.lat) || !(-180.0..=180.0).contains(&p.lon) {
            point_in_range = false;
            out.push(issue(
                IssueLevel::Error,
                EntityKind::Building,
                id,
                Some("point"),
                "INVALID_COORDINATE",
                format!("lat/lng ({}, {}) out of range", p.lat, p.lon),
            ));
        } else if let Some(bbox) = region {
            if !bbox.contains(p.lon, p.lat) {
                out.push(issue(
                    IssueLevel::Warning,
                    EntityKind::Building,
                    id,
                    Some("point"),
                    "POINT_OUTSIDE_REGION",
                    "building point lies outside the configured regional bounding box",
                ));
            }
        }
    }

    if let Some(rings) = &b.polygon {
        let rings: Vec<Vec<(f64, f64)>> = rings
            .iter()
            .map(|ring| ring.iter().map(|p| (p.lon, p.lat)).collect())
            .collect();
        let regional_bbox = region.map(|r| (r.min_lng, r.min_lat, r.max_lng, r.max_lat));
        let check = check_polygon(&rings, regional_bbox);
        for (code, message) in &check.errors {
            out.push(issue(IssueLevel::Error, EntityKind::Building, id, Some("polygon"), code, message.clone()));
        }
        for (code, message) in &check.warnings {
            out.push(issue(IssueLevel::Warning, EntityKind::Building, id, Some("polygon"), code, message.clone()));
        }

        // spec.md §3 "Building" invariant: if both point and polygon are
        // present, the point must lie inside the polygon's bounding box.
        if point_in_range {
            if let Some(p) = b.point {
                if let Some(exterior) = rings.first() {
                    if !exterior.is_empty() && !ring_bbox_contains(exterior, p.lon, p.lat) {
                        out.push(issue(
                            IssueLevel::Error,
                            EntityKind::Building,
                            id,
                            Some("point"),
                            "POINT_OUTSIDE_POLYGON_BBOX",
                            "building point does not lie inside the polygon's bounding box",
                        ));
                    }
                }
            }
        }
    }

    out
}

fn ring_bbox_contains(ring: &[(f64, f64)], lon: f64, lat: f64) -> bool {
    let (mut min_lon, mut min_lat) = (f64::INFINITY, f64::INFINITY);
    let (mut max_lon, mut max_lat) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for &(rlon, rlat) in ring {
        min_lon = min_lon.min(rlon);
        max_lon = max_lon.max(rlon);
        min_lat = min_lat.min(rlat);
        max_lat = max_lat.max(rlat);
    }
    lon >= min_lon && lon <= max_lon && lat >= min_lat && lat <= max_lat
}

pub fn validate_unit(u: &PropertyUnit) -> Vec<ValidationIssue> {
    let mut out = Vec::new();
    let id = &u.unit_id;

    if u.building_id.trim().is_empty() {
        out.push(issue(
            IssueLevel::Error,
            EntityKind::Unit,
            id,
            Some("building_id"),
            "MISSING_BUILDING_ID",
            "property unit has no building_id",
        ));
    }

    if id.len() >= 20 && !unit_id_re().is_match(id) {
        out.push(issue(
            IssueLevel::Warning,
            EntityKind::Unit,
            id,
            Some("unit_id"),
            "NONSTANDARD_UNIT_ID",
            format!("'{id}' does not match the standard unit id pattern"),
        ));
    }

    out
}

pub fn validate_person(p: &Person) -> Vec<ValidationIssue> {
    let mut out = Vec::new();
    let id = &p.person_id;

    if let Some(nid) = &p.national_id {
        let stripped: String = nid.chars().filter(|c| !c.is_whitespace() && *c != '-').collect();
        if !national_id_re().is_match(&stripped) {
            out.push(issue(
                IssueLevel::Warning,
                EntityKind::Person,
                id,
                Some("national_id"),
                "INVALID_NATIONAL_ID",
                format!("'{nid}' is not an 11-digit national id"),
            ));
        }
    }

    if p.first_name.as_deref().unwrap_or("").trim().is_empty()
        && p.last_name.as_deref().unwrap_or("").trim().is_empty()
    {
        out.push(issue(
            IssueLevel::Error,
            EntityKind::Person,
            id,
            None,
            "MISSING_NAME",
            "person has neither a first nor a last name",
        ));
    }

    out
}

pub fn validate_household(h: &Household) -> Vec<ValidationIssue> {
    let mut out = Vec::new();
    let id = &h.household_id;

    if h.property_unit_id.trim().is_empty() {
        out.push(issue(
            IssueLevel::Error,
            EntityKind::Household,
            id,
            Some("property_unit_id"),
            "MISSING_PROPERTY_UNIT_ID",
            "household has no property_unit_id",
        ));
    }

    if let Some(occ) = h.occupancy_size {
        let total = h.male_count.unwrap_or(0) + h.female_count.unwrap_or(0);
        if total != 0 && total != occ {
            out.push(issue(
                IssueLevel::Warning,
                EntityKind::Household,
                id,
                Some("occupancy_size"),
                "OCCUPANCY_MISMATCH",
                format!("male+female ({total}) != occupancy_size ({occ})"),
            ));
        }
    }

    out
}

pub fn validate_claim(c: &Claim) -> Vec<ValidationIssue> {
    let mut out = Vec::new();
    let id = c.claim_id.as_deref().unwrap_or("<unassigned>");

    if let Some(status) = &c.case_status {
        if !CLAIM_STATUSES.contains(&status.as_str()) {
            out.push(issue(
                IssueLevel::Warning,
                EntityKind::Claim,
                id,
                Some("case_status"),
                "INVALID_CASE_STATUS",
                format!("'{status}' is not a recognized case status"),
            ));
        }
    }

    out
}

pub fn validate_evidence(e: &Evidence) -> Vec<ValidationIssue> {
    let mut out = Vec::new();
    if e.person_unit_relation_id.is_none() {
        out.push(issue(
            IssueLevel::Warning,
            EntityKind::Evidence,
            &e.evidence_id,
            Some("person_unit_relation_id"),
            "MISSING_RELATION_LINK",
            "evidence is not linked to a person-unit relation",
        ));
    }
    out
}

pub fn validate_document(d: &Document) -> Vec<ValidationIssue> {
    let mut out = Vec::new();
    if let Some(t) = &d.document_type {
        if !DOCUMENT_TYPES.contains(&t.as_str()) {
            out.push(issue(
                IssueLevel::Warning,
                EntityKind::Document,
                &d.document_id,
                Some("document_type"),
                "INVALID_DOCUMENT_TYPE",
                format!("'{t}' is not a recognized document type"),
            ));
        }
    }
    out
}

pub fn validate_relation(r: &PersonUnitRelation) -> Vec<ValidationIssue> {
    let mut out = Vec::new();
    let id = &r.relation_id;

    if r.person_id.trim().is_empty() {
        out.push(issue(
            IssueLevel::Error,
            EntityKind::Relation,
            id,
            Some("person_id"),
            "MISSING_PERSON_ID",
            "relation has no person_id",
        ));
    }
    if r.property_unit_id.trim().is_empty() {
        out.push(issue(
            IssueLevel::Error,
            EntityKind::Relation,
            id,
            Some("property_unit_id"),
            "MISSING_PROPERTY_UNIT_ID",
            "relation has no property_unit_id",
        ));
    }

    let relation_type = r.relation_type.as_deref();
    let parsed = relation_type.and_then(trr_core::types::RelationType::from_loose);
    if relation_type.is_some() && parsed.is_none() {
        out.push(issue(
            IssueLevel::Warning,
            EntityKind::Relation,
            id,
            Some("relation_type"),
            "INVALID_RELATION_TYPE",
            format!("'{}' is not a recognized relation type", relation_type.unwrap()),
        ));
    }

    let is_owner_or_heir = matches!(
        parsed,
        Some(trr_core::types::RelationType::Owner) | Some(trr_core::types::RelationType::Heirs)
    );
    if is_owner_or_heir {
        if let Some(share) = r.ownership_share {
            if !(0..=2400).contains(&share) {
                out.push(issue(
                    IssueLevel::Warning,
                    EntityKind::Relation,
                    id,
                    Some("ownership_share"),
                    "INVALID_SHARE",
                    format!("ownership_share {share} outside [0, 2400]"),
                ));
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn building(id: &str) -> Building {
        Building {
            building_id: id.to_string(),
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
        }
    }

    #[test]
    fn valid_building_id_passes() {
        let issues = validate_building(&building("01-01-02-003-001-00001"), None);
        assert!(issues.iter().all(|i| i.code != "INVALID_BUILDING_ID"));
    }

    #[test]
    fn malformed_building_id_errors() {
        let issues = validate_building(&building("not-an-id"), None);
        assert!(issues.iter().any(|i| i.code == "INVALID_BUILDING_ID" && i.level == IssueLevel::Error));
    }

    fn lonlat(lon: f64, lat: f64) -> trr_core::types::LonLat {
        trr_core::types::LonLat { lon, lat }
    }

    #[test]
    fn self_intersecting_polygon_is_an_error() {
        let mut b = building("01-01-02-003-001-00001");
        b.polygon = Some(vec![vec![
            lonlat(0.0, 0.0),
            lonlat(1.0, 1.0),
            lonlat(1.0, 0.0),
            lonlat(0.0, 1.0),
            lonlat(0.0, 0.0),
        ]]);
        let issues = validate_building(&b, None);
        assert!(issues.iter().any(|i| i.code == "SELF_INTERSECTION" && i.level == IssueLevel::Error));
    }

    #[test]
    fn tiny_polygon_is_too_small() {
        let mut b = building("01-01-02-003-001-00001");
        b.polygon = Some(vec![vec![
            lonlat(0.0, 0.0),
            lonlat(0.0, 0.00001),
            lonlat(0.00001, 0.0),
            lonlat(0.0, 0.0),
        ]]);
        let issues = validate_building(&b, None);
        assert!(issues.iter().any(|i| i.code == "POLYGON_TOO_SMALL" && i.level == IssueLevel::Error));
    }

    #[test]
    fn point_outside_polygon_bbox_errors() {
        let mut b = building("01-01-02-003-001-00001");
        b.point = Some(lonlat(50.0, 50.0));
        b.polygon = Some(vec![vec![
            lonlat(0.0, 0.0),
            lonlat(0.0, 1.0),
            lonlat(1.0, 1.0),
            lonlat(1.0, 0.0),
            lonlat(0.0, 0.0),
        ]]);
        let issues = validate_building(&b, None);
        assert!(issues.iter().any(|i| i.code == "POINT_OUTSIDE_POLYGON_BBOX"));
    }

    #[test]
    fn point_inside_polygon_bbox_is_clean() {
        let mut b = building("01-01-02-003-001-00001");
        b.point = Some(lonlat(0.5, 0.5));
        b.polygon = Some(vec![vec![
            lonlat(0.0, 0.0),
            lonlat(0.0, 1.0),
            lonlat(1.0, 1.0),
            lonlat(1.0, 0.0),
            lonlat(0.0, 0.0),
        ]]);
        let issues = validate_building(&b, None);
        assert!(issues.iter().all(|i| i.code != "POINT_OUTSIDE_POLYGON_BBOX"));
    }

    #[test]
    fn latitude_boundary_90_is_valid() {
        let mut b = building("01-01-02-003-001-00001");
        b.point = Some(trr_core::types::LonLat { lon: 0.0, lat: 90.0 });
        let issues = validate_building(&b, None);
        assert!(issues.iter().all(|i| i.code != "INVALID_COORDINATE"));
    }

    #[test]
    fn latitude_just_past_90_is_invalid() {
        let mut b = building("01-01-02-003-001-00001");
        b.point = Some(trr_core::types::LonLat { lon: 0.0, lat: 90.0001 });
        let issues = validate_building(&b, None);
        assert!(issues.iter().any(|i| i.code == "INVALID_COORDINATE"));
    }

    #[test]
    fn ownership_share_boundaries() {
        let mut r = PersonUnitRelation {
            relation_id: "r1".into(),
            person_id: "p1".into(),
            property_unit_id: "u1".into(),
            relation_type: Some("owner".into()),
            ownership_share: Some(2400),
        };
        assert!(validate_relation(&r).iter().all(|i| i.code != "INVALID_SHARE"));
        r.ownership_share = Some(2401);
        assert!(validate_relation(&r).iter().any(|i| i.code == "INVALID_SHARE"));
    }

    #[test]
    fn person_requires_a_name() {
        let p = Person {
            person_id: "p1".into(),
            national_id: None,
            first_name: None,
            last_name: None,
            phone_numbers: vec![],
            gender: None,
            year_of_birth: None,
            contact: false,
        };
        assert!(validate_person(&p).iter().any(|i| i.code == "MISSING_NAME"));
    }

    #[test]
    fn household_gender_mismatch_warns() {
        let h = Household {
            household_id: "h1".into(),
            property_unit_id: "u1".into(),
            person_ids: vec![],
            occupancy_size: Some(4),
            male_count: Some(1),
            female_count: Some(1),
        };
        assert!(validate_household(&h).iter().any(|i| i.code == "OCCUPANCY_MISMATCH"));
    }
}
