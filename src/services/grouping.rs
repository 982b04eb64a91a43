use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::services::records::Unit;

pub const UNGROUPED_BUILDING: &str = "Ungrouped";

/// Units sharing a `property_name`. Buildings are not stored anywhere; they
/// exist only as this derived grouping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Building {
    pub name: String,
    pub units: Vec<Unit>,
}

impl Building {
    pub fn unit_ids(&self) -> BTreeSet<i64> {
        self.units.iter().map(|unit| unit.id).collect()
    }
}

pub fn building_name(unit: &Unit) -> &str {
    [unit.property_name.as_deref(), unit.unit_name.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|value| !value.is_empty())
        .unwrap_or(UNGROUPED_BUILDING)
}

/// Partitions units into buildings, in the order each building is first seen.
pub fn group_by_building(units: &[Unit]) -> Vec<Building> {
    let mut buildings: Vec<Building> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for unit in units {
        let name = building_name(unit);
        match positions.get(name) {
            Some(&position) => buildings[position].units.push(unit.clone()),
            None => {
                positions.insert(name.to_string(), buildings.len());
                buildings.push(Building {
                    name: name.to_string(),
                    units: vec![unit.clone()],
                });
            }
        }
    }

    buildings
}

pub fn find_building<'a>(buildings: &'a [Building], name: &str) -> Option<&'a Building> {
    buildings.iter().find(|building| building.name == name)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{building_name, find_building, group_by_building, UNGROUPED_BUILDING};
    use crate::services::records::Unit;

    pub(crate) fn unit(id: i64, property_name: Option<&str>, unit_name: Option<&str>) -> Unit {
        Unit {
            id,
            name: format!("Unit {id}"),
            unit_name: unit_name.map(ToOwned::to_owned),
            property_name: property_name.map(ToOwned::to_owned),
            location: Some("Kololi".to_string()),
            location_id: Some(1),
            property_type: Some("apartment".to_string()),
            bedrooms: 2,
            bathrooms: 1.0,
            status: "active".to_string(),
        }
    }

    #[test]
    fn empty_input_has_no_buildings() {
        assert!(group_by_building(&[]).is_empty());
    }

    #[test]
    fn groups_in_first_seen_order() {
        let units = vec![
            unit(1, Some("Sunset Villas"), Some("A1")),
            unit(2, Some("Palm Court"), Some("P1")),
            unit(3, Some("Sunset Villas"), Some("A2")),
            unit(4, None, Some("Beach Hut")),
            unit(5, Some("  "), None),
        ];
        let buildings = group_by_building(&units);
        let names = buildings
            .iter()
            .map(|building| building.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec!["Sunset Villas", "Palm Court", "Beach Hut", UNGROUPED_BUILDING]
        );
        let sunset = find_building(&buildings, "Sunset Villas").expect("building");
        assert_eq!(sunset.unit_ids().into_iter().collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn falls_back_to_unit_name_then_sentinel() {
        assert_eq!(building_name(&unit(1, None, Some("Cabin"))), "Cabin");
        assert_eq!(building_name(&unit(1, None, None)), UNGROUPED_BUILDING);
    }
}
