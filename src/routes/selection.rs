use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::{
    error::{AppError, AppResult},
    repository::portfolio::load_units,
    routes::db_pool,
    schemas::{SelectionInput, SelectionPath},
    services::{
        grouping::group_by_building,
        selection::{Coverage, Selection, SelectionScope},
    },
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new().route("/selection/{op}", axum::routing::post(apply_selection))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelectionOp {
    ToggleUnit,
    ToggleBuilding,
    SelectAll,
    Resolve,
}

impl SelectionOp {
    fn parse(raw: &str) -> AppResult<Self> {
        match raw.trim() {
            "toggle_unit" | "toggle-unit" => Ok(Self::ToggleUnit),
            "toggle_building" | "toggle-building" => Ok(Self::ToggleBuilding),
            "select_all" | "select-all" => Ok(Self::SelectAll),
            "resolve" => Ok(Self::Resolve),
            other => Err(AppError::NotFound(format!(
                "Unknown selection operation '{other}'."
            ))),
        }
    }
}

#[derive(Debug, Serialize)]
struct BuildingCoverage {
    name: String,
    coverage: Coverage,
    fully_selected: bool,
    unit_count: usize,
}

/// A selection plus everything a client derives from it.
#[derive(Debug, Serialize)]
struct SelectionView {
    selection: Selection,
    unit_ids: Vec<i64>,
    active_building: Option<String>,
    coverage: Coverage,
    all_selected: bool,
    buildings: Vec<BuildingCoverage>,
}

async fn apply_selection(
    State(state): State<AppState>,
    Path(path): Path<SelectionPath>,
    Json(input): Json<SelectionInput>,
) -> AppResult<Json<SelectionView>> {
    let op = SelectionOp::parse(&path.op)?;
    let pool = db_pool(&state)?;
    let units = load_units(pool, &[]).await?;
    let buildings = group_by_building(&units);
    let scope = SelectionScope::new(&buildings);

    let next = transition(op, &input, &scope)?;
    Ok(Json(describe(next, &scope)))
}

fn transition(
    op: SelectionOp,
    input: &SelectionInput,
    scope: &SelectionScope<'_>,
) -> AppResult<Selection> {
    let current = &input.selection;
    match op {
        SelectionOp::ToggleUnit => {
            let unit_id = input
                .unit_id
                .ok_or_else(|| AppError::BadRequest("unit_id is required.".to_string()))?;
            Ok(current.toggle_unit(unit_id, scope))
        }
        SelectionOp::ToggleBuilding => {
            let name = input
                .building
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .ok_or_else(|| AppError::BadRequest("building is required.".to_string()))?;
            Ok(current.toggle_building(name, scope))
        }
        SelectionOp::SelectAll => Ok(current.select_all(scope)),
        SelectionOp::Resolve => Ok(current.clone()),
    }
}

fn describe(selection: Selection, scope: &SelectionScope<'_>) -> SelectionView {
    let buildings = scope
        .buildings()
        .iter()
        .map(|building| BuildingCoverage {
            name: building.name.clone(),
            coverage: selection.building_coverage(&building.name, scope),
            fully_selected: selection.is_building_fully_selected(&building.name, scope),
            unit_count: building.units.len(),
        })
        .collect();
    SelectionView {
        unit_ids: selection.unit_ids(scope).into_iter().collect(),
        active_building: selection.active_building().map(ToOwned::to_owned),
        coverage: selection.overall_coverage(scope),
        all_selected: selection.covers_all(scope),
        buildings,
        selection,
    }
}
