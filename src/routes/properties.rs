use axum::{
    extract::{Query, State},
    Json,
};
use serde_json::{json, Map, Value};

use crate::{
    error::AppResult,
    repository::{
        portfolio::{load_reservations, load_units, BuildingFilter},
        table_service::list_rows,
    },
    routes::db_pool,
    schemas::{clamp_limit_in_range, BuildingsAggregatedQuery, PropertiesQuery},
    services::{
        grouping::group_by_building,
        performance::building_rollups,
        records::Unit,
    },
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/properties", axum::routing::get(list_properties))
        .route("/buildings", axum::routing::get(list_buildings))
        .route(
            "/buildings/aggregated",
            axum::routing::get(aggregated_buildings),
        )
}

async fn list_properties(
    State(state): State<AppState>,
    Query(query): Query<PropertiesQuery>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;

    let mut filters = Map::new();
    if let Some(location) = non_empty_opt(query.location.as_deref()) {
        filters.insert("location__ilike".to_string(), Value::String(location));
    }
    if let Some(property_type) = non_empty_opt(query.property_type.as_deref()) {
        filters.insert("property_type".to_string(), Value::String(property_type));
    }
    if let Some(status) = non_empty_opt(query.status.as_deref()) {
        filters.insert("status".to_string(), Value::String(status));
    }

    let rows = list_rows(
        pool,
        "properties",
        Some(&filters),
        clamp_limit_in_range(query.limit, 1, 2000),
        "id",
        true,
    )
    .await?;
    let units = rows.iter().filter_map(Unit::from_row).collect::<Vec<_>>();
    Ok(Json(json!({ "data": units })))
}

async fn list_buildings(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let units = load_units(pool, &[]).await?;
    let buildings = group_by_building(&units);
    Ok(Json(json!({ "data": buildings })))
}

async fn aggregated_buildings(
    State(state): State<AppState>,
    Query(query): Query<BuildingsAggregatedQuery>,
) -> AppResult<Json<Value>> {
    let clauses = BuildingFilter::from_params(
        query.location_id.as_deref(),
        query.property_type.as_deref(),
    )?;
    let pool = db_pool(&state)?;

    let units = load_units(pool, &clauses).await?;
    if units.is_empty() {
        return Ok(Json(json!({ "data": [] })));
    }

    let mut filters = Map::new();
    filters.insert(
        "property_id".to_string(),
        Value::Array(units.iter().map(|unit| json!(unit.id)).collect()),
    );
    let reservations = load_reservations(pool, Some(&filters)).await?;

    let rollups = building_rollups(&units, &reservations, state.config.today());
    tracing::debug!(
        buildings = rollups.len(),
        units = units.len(),
        "Computed building rollups"
    );
    Ok(Json(json!({ "data": rollups })))
}

fn non_empty_opt(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToOwned::to_owned)
}
