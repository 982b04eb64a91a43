use axum::{
    extract::{Query, State},
    Json,
};
use chrono::NaiveDate;
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    repository::portfolio::load_snapshot,
    routes::{db_pool, parse_date_param},
    schemas::{MetricsQuery, SeriesInput, TransactionsInput},
    services::{
        aggregation::series_for_selection,
        filters::{filter_list, TransactionFilters},
        grouping::group_by_building,
        ledger::{build_transactions, TransactionKind},
        metrics::{build_metrics_payload, default_range_start},
        numeric::round2,
        timeline::month_buckets,
    },
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/financials/metrics",
            axum::routing::get(financial_metrics),
        )
        .route(
            "/financials/series",
            axum::routing::post(financial_series),
        )
        .route(
            "/financials/transactions",
            axum::routing::post(financial_transactions),
        )
}

/// The dashboard payload for one date range. Payloads are cached per range
/// and day; `request_seq` is echoed back uncached so the caller can drop
/// responses to superseded requests.
async fn financial_metrics(
    State(state): State<AppState>,
    Query(query): Query<MetricsQuery>,
) -> AppResult<Json<Value>> {
    let today = state.config.today();
    let (from, to) = resolve_range(
        query.from_date.as_deref(),
        query.to_date.as_deref(),
        today,
    )?;
    let cache_key = metrics_cache_key(from, to, today, state.metrics_generation());

    if let Some(cached) = state.metrics_cache.get(&cache_key).await {
        tracing::debug!(%from, %to, "Metrics cache hit");
        return Ok(Json(with_request_seq(cached, query.request_seq)));
    }

    let pool = db_pool(&state)?;
    let snapshot = load_snapshot(pool).await?;
    let payload = build_metrics_payload(snapshot, from, to, today, &state.config.currency_code);
    let value = serde_json::to_value(&payload).map_err(|error| {
        tracing::error!(error = %error, "Could not serialize metrics payload");
        AppError::Internal("Could not build metrics.".to_string())
    })?;
    state.metrics_cache.insert(cache_key, value.clone()).await;

    Ok(Json(with_request_seq(value, query.request_seq)))
}

async fn financial_series(
    State(state): State<AppState>,
    Json(input): Json<SeriesInput>,
) -> AppResult<Json<Value>> {
    let (from, to) = resolve_range(
        input.from_date.as_deref(),
        input.to_date.as_deref(),
        state.config.today(),
    )?;
    let pool = db_pool(&state)?;
    let snapshot = load_snapshot(pool).await?;

    let buckets = month_buckets(from, to);
    let buildings = group_by_building(&snapshot.units);
    let series = series_for_selection(
        input.metric,
        &buckets,
        &snapshot,
        &buildings,
        &input.selection,
    );

    Ok(Json(json!({
        "from": from,
        "to": to,
        "metric": input.metric,
        "selection": input.selection,
        "data": series,
    })))
}

async fn financial_transactions(
    State(state): State<AppState>,
    Json(input): Json<TransactionsInput>,
) -> AppResult<Json<Value>> {
    let filters = TransactionFilters::from(input.filters);
    let pool = db_pool(&state)?;
    let snapshot = load_snapshot(pool).await?;

    let ledger = build_transactions(&snapshot);
    let kept = filter_list(&ledger, &filters);
    let total_of = |kind: TransactionKind| {
        round2(
            kept.iter()
                .filter(|transaction| transaction.kind == kind)
                .map(|transaction| transaction.amount)
                .sum::<f64>(),
        )
    };
    let payments = total_of(TransactionKind::Payment);
    let expenses = total_of(TransactionKind::Expense);

    Ok(Json(json!({
        "count": kept.len(),
        "totals": {
            "payments": payments,
            "expenses": expenses,
            "net": round2(payments - expenses),
        },
        "data": kept,
    })))
}

/// Missing `to` means today; missing `from` means the start of the six
/// month window ending at `to`.
fn resolve_range(
    from: Option<&str>,
    to: Option<&str>,
    today: NaiveDate,
) -> AppResult<(NaiveDate, NaiveDate)> {
    let to = parse_date_param(to, "to")?.unwrap_or(today);
    let from = parse_date_param(from, "from")?.unwrap_or_else(|| default_range_start(to));
    Ok((from, to))
}

fn metrics_cache_key(from: NaiveDate, to: NaiveDate, today: NaiveDate, generation: u64) -> String {
    format!("metrics:{generation}:{from}:{to}:{today}")
}

fn with_request_seq(mut payload: Value, request_seq: Option<u64>) -> Value {
    if let (Some(seq), Some(object)) = (request_seq, payload.as_object_mut()) {
        object.insert("requestSeq".to_string(), json!(seq));
    }
    payload
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::{metrics_cache_key, resolve_range, with_request_seq};
    use crate::{config::AppConfig, error::AppError, state::AppState};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn range_defaults_to_six_months_ending_today() {
        let (from, to) = resolve_range(None, None, date(2024, 5, 14)).expect("range");
        assert_eq!(from, date(2023, 12, 1));
        assert_eq!(to, date(2024, 5, 14));

        let (from, to) = resolve_range(None, Some("2024-02-10"), date(2024, 5, 14)).expect("range");
        assert_eq!(from, date(2023, 9, 1));
        assert_eq!(to, date(2024, 2, 10));
    }

    #[test]
    fn invalid_dates_are_bad_requests() {
        assert!(matches!(
            resolve_range(Some("2024-13-01"), None, date(2024, 5, 14)),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn echoes_request_sequence() {
        let payload = with_request_seq(json!({ "summary": {} }), Some(42));
        assert_eq!(payload["requestSeq"], json!(42));
        let untouched = with_request_seq(json!({ "summary": {} }), None);
        assert!(untouched.get("requestSeq").is_none());
    }

    #[tokio::test]
    async fn writes_retire_payloads_computed_before_them() {
        let state = AppState::build(AppConfig::default()).expect("state");
        let (from, to, today) = (date(2024, 1, 1), date(2024, 3, 31), date(2024, 5, 14));

        let stale_key = metrics_cache_key(from, to, today, state.metrics_generation());
        state.invalidate_metrics();
        state
            .metrics_cache
            .insert(stale_key, json!({ "summary": "stale" }))
            .await;

        let fresh_key = metrics_cache_key(from, to, today, state.metrics_generation());
        assert!(state.metrics_cache.get(&fresh_key).await.is_none());
    }
}
