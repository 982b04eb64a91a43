use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::services::grouping::{find_building, Building};

/// Which units a chart is showing. The active building is a variant of its
/// own rather than a flag stored next to the unit set, so "building selected
/// but some of its units are not" cannot be represented. `extra` holds units
/// from other buildings toggled in on top of the building.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Selection {
    AllUnits,
    Building {
        name: String,
        #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
        extra: BTreeSet<i64>,
    },
    Units(BTreeSet<i64>),
}

impl Default for Selection {
    fn default() -> Self {
        Self::Units(BTreeSet::new())
    }
}

/// How much of a group is selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Coverage {
    Empty,
    Partial,
    Full,
}

impl Coverage {
    fn of(selected: usize, total: usize) -> Self {
        if total == 0 || selected == 0 {
            Self::Empty
        } else if selected >= total {
            Self::Full
        } else {
            Self::Partial
        }
    }
}

/// The units and buildings a selection is resolved against.
#[derive(Debug, Clone)]
pub struct SelectionScope<'a> {
    buildings: &'a [Building],
    all_ids: BTreeSet<i64>,
}

impl<'a> SelectionScope<'a> {
    pub fn new(buildings: &'a [Building]) -> Self {
        let all_ids = buildings
            .iter()
            .flat_map(|building| building.units.iter().map(|unit| unit.id))
            .collect();
        Self { buildings, all_ids }
    }

    pub fn buildings(&self) -> &'a [Building] {
        self.buildings
    }

    fn building(&self, name: &str) -> Option<&'a Building> {
        find_building(self.buildings, name)
    }
}

impl Selection {
    pub fn building(name: impl Into<String>) -> Self {
        Self::Building {
            name: name.into(),
            extra: BTreeSet::new(),
        }
    }

    /// The concrete unit ids this selection denotes. Ids that are no longer
    /// part of the portfolio are dropped.
    pub fn unit_ids(&self, scope: &SelectionScope<'_>) -> BTreeSet<i64> {
        match self {
            Self::AllUnits => scope.all_ids.clone(),
            Self::Building { name, extra } => {
                let mut ids = scope
                    .building(name)
                    .map(Building::unit_ids)
                    .unwrap_or_default();
                ids.extend(extra.intersection(&scope.all_ids));
                ids
            }
            Self::Units(ids) => ids.intersection(&scope.all_ids).copied().collect(),
        }
    }

    pub fn active_building(&self) -> Option<&str> {
        match self {
            Self::Building { name, .. } => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn is_empty(&self, scope: &SelectionScope<'_>) -> bool {
        self.unit_ids(scope).is_empty()
    }

    /// True when every unit of the portfolio is selected.
    pub fn covers_all(&self, scope: &SelectionScope<'_>) -> bool {
        !scope.all_ids.is_empty() && self.unit_ids(scope) == scope.all_ids
    }

    pub fn is_building_fully_selected(&self, name: &str, scope: &SelectionScope<'_>) -> bool {
        self.building_coverage(name, scope) == Coverage::Full
    }

    pub fn building_coverage(&self, name: &str, scope: &SelectionScope<'_>) -> Coverage {
        let Some(building) = scope.building(name) else {
            return Coverage::Empty;
        };
        let selected = self.unit_ids(scope);
        let members = building.unit_ids();
        Coverage::of(members.intersection(&selected).count(), members.len())
    }

    pub fn overall_coverage(&self, scope: &SelectionScope<'_>) -> Coverage {
        Coverage::of(self.unit_ids(scope).len(), scope.all_ids.len())
    }

    /// Selecting the active building again clears the selection; any other
    /// known building replaces the current selection with its units.
    pub fn toggle_building(&self, name: &str, scope: &SelectionScope<'_>) -> Self {
        if self.active_building() == Some(name) {
            return Self::default();
        }
        match scope.building(name) {
            Some(building) => Self::building(building.name.clone()),
            None => self.clone(),
        }
    }

    /// Flips one unit. Removing a member of the active building demotes the
    /// selection to individual units; units from other buildings ride along
    /// with the building view.
    pub fn toggle_unit(&self, unit_id: i64, scope: &SelectionScope<'_>) -> Self {
        if !scope.all_ids.contains(&unit_id) {
            return self.clone();
        }
        if let Self::Building { name, extra } = self {
            let is_member = scope
                .building(name)
                .is_some_and(|building| building.units.iter().any(|unit| unit.id == unit_id));
            if !is_member {
                let mut extra = extra.clone();
                if !extra.remove(&unit_id) {
                    extra.insert(unit_id);
                }
                return Self::Building {
                    name: name.clone(),
                    extra,
                };
            }
        }
        let mut ids = self.unit_ids(scope);
        if !ids.remove(&unit_id) {
            ids.insert(unit_id);
        }
        Self::Units(ids)
    }

    /// Selects everything, or clears when everything is already selected.
    pub fn select_all(&self, scope: &SelectionScope<'_>) -> Self {
        if self.covers_all(scope) {
            Self::default()
        } else {
            Self::AllUnits
        }
    }
}
