use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{Days, NaiveDate};
use serde_json::{json, Map, Value};

use crate::{
    error::{AppError, AppResult},
    repository::table_service::list_rows,
    routes::{db_pool, parse_date_param},
    schemas::{clamp_limit_in_range, ReservationsQuery},
    services::records::Reservation,
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new().route("/reservations", axum::routing::get(list_reservations))
}

/// Reservations whose stay overlaps `[from, to]`, newest check-in first.
async fn list_reservations(
    State(state): State<AppState>,
    Query(query): Query<ReservationsQuery>,
) -> AppResult<Json<Value>> {
    let from = parse_date_param(query.from_date.as_deref(), "from")?;
    let to = parse_date_param(query.to_date.as_deref(), "to")?;

    let mut filters = Map::new();
    if let Some(raw) = query
        .property_id
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        let property_id = raw.parse::<i64>().map_err(|_| {
            AppError::BadRequest(format!("property_id must be an integer, got '{raw}'."))
        })?;
        filters.insert("property_id".to_string(), json!(property_id));
    }
    if let Some(status) = query
        .status
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        filters.insert(
            "status".to_string(),
            Value::String(status.to_ascii_lowercase()),
        );
    }
    push_overlap_filters(&mut filters, from, to);

    let pool = db_pool(&state)?;
    let rows = list_rows(
        pool,
        "reservations",
        Some(&filters),
        clamp_limit_in_range(query.limit, 1, 5000),
        "check_in",
        false,
    )
    .await?;
    let reservations = rows
        .iter()
        .filter_map(Reservation::from_row)
        .collect::<Vec<_>>();
    Ok(Json(json!({ "data": reservations })))
}

/// A stay overlaps `[from, to]` when it has at least one night in it: it
/// checks out after `from` and checks in on or before `to`.
fn push_overlap_filters(
    filters: &mut Map<String, Value>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) {
    if let Some(first_checkout) = from.and_then(|from| from.checked_add_days(Days::new(1))) {
        filters.insert(
            "check_out__gte".to_string(),
            json!(first_checkout.to_string()),
        );
    }
    if let Some(to) = to {
        filters.insert("check_in__lte".to_string(), json!(to.to_string()));
    }
}
