//! Duplicate detection (spec.md §4.4 "detect_duplicates"): exact-match
//! baselines against the committed store. Implementations may layer fuzzy
//! heuristics on top; exact-ID/exact-national-id is the required floor.

use trr_storage::Store;

pub struct DuplicateHit {
    pub duplicate_of: String,
    pub match_score: f64,
}

pub fn find_duplicate_person(store: &Store, national_id: Option<&str>) -> trr_storage::Result<Option<DuplicateHit>> {
    let Some(national_id) = national_id else {
        return Ok(None);
    };
    if national_id.is_empty() {
        return Ok(None);
    }
    Ok(store
        .find_person_by_national_id(national_id)?
        .map(|p| DuplicateHit { duplicate_of: p.person_id, match_score: 1.0 }))
}

pub fn find_duplicate_building(store: &Store, building_id: &str) -> trr_storage::Result<Option<DuplicateHit>> {
    Ok(store
        .get_building(building_id)?
        .map(|b| DuplicateHit { duplicate_of: b.building_id, match_score: 1.0 }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use trr_core::types::{Building, Person};

    fn store() -> (Store, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        (Store::open(dir.path()).unwrap(), dir)
    }

    #[test]
    fn exact_national_id_match_scores_one() {
        let (store, _dir) = store();
        store
            .put_person(&Person {
                person_id: "p-1".into(),
                national_id: Some("12345678901".into()),
                first_name: None,
                last_name: None,
                phone_numbers: vec![],
                gender: None,
                year_of_birth: None,
                contact: false,
            })
            .unwrap();
        let hit = find_duplicate_person(&store, Some("12345678901")).unwrap().unwrap();
        assert_eq!(hit.duplicate_of, "p-1");
        assert_eq!(hit.match_score, 1.0);
        assert!(find_duplicate_person(&store, Some("99999999999")).unwrap().is_none());
    }

    #[test]
    fn no_national_id_never_matches() {
        let (store, _dir) = store();
        assert!(find_duplicate_person(&store, None).unwrap().is_none());
    }

    #[test]
    fn exact_building_id_match() {
        let (store, _dir) = store();
        store
            .put_building(&Building {
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
            })
            .unwrap();
        assert!(find_duplicate_building(&store, "01-01-02-003-001-00001").unwrap().is_some());
        assert!(find_duplicate_building(&store, "01-01-02-003-001-99999").unwrap().is_none());
    }
}
