//! Cross-entity referential checks, run after per-record validation
//! (spec.md §4.3 "Cross-entity").

use std::collections::HashSet;
use trr_core::types::{EntityKind, IssueLevel, PersonUnitRelation, PropertyUnit, ValidationIssue};

/// Every unit's `building_id` should exist among the package's buildings.
/// Warning, not error: commit treats unresolved references as
/// forward-declared against the committed corpus.
pub fn orphan_units(units: &[PropertyUnit], building_ids: &HashSet<String>) -> Vec<ValidationIssue> {
    units
        .iter()
        .filter(|u| !building_ids.contains(&u.building_id))
        .map(|u| ValidationIssue {
            level: IssueLevel::Warning,
            entity_kind: EntityKind::Unit,
            source_id: u.unit_id.clone(),
            field: Some("building_id".into()),
            code: "ORPHAN_UNIT".into(),
            message: format!("unit references unknown building_id '{}'", u.building_id),
            suggestion: None,
        })
        .collect()
}

/// Every relation's `person_id` should exist among the package's persons.
pub fn orphan_relations(
    relations: &[PersonUnitRelation],
    person_ids: &HashSet<String>,
) -> Vec<ValidationIssue> {
    relations
        .iter()
        .filter(|r| !person_ids.contains(&r.person_id))
        .map(|r| ValidationIssue {
            level: IssueLevel::Warning,
            entity_kind: EntityKind::Relation,
            source_id: r.relation_id.clone(),
            field: Some("person_id".into()),
            code: "ORPHAN_RELATION".into(),
            message: format!("relation references unknown person_id '{}'", r.person_id),
            suggestion: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_unit_with_unknown_building() {
        let units = vec![PropertyUnit {
            unit_id: "u1".into(),
            building_id: "missing".into(),
            floor: None,
            number: None,
            unit_type: None,
            description: None,
        }];
        let known: HashSet<String> = ["known".to_string()].into_iter().collect();
        let issues = orphan_units(&units, &known);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, "ORPHAN_UNIT");
    }
}
