use std::collections::BTreeSet;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde_json::{json, Map, Value};

use crate::{
    error::{AppError, AppResult},
    repository::{
        portfolio::load_expenses,
        table_service::{create_row, delete_row, distinct_values, list_rows},
    },
    routes::{db_pool, parse_date_param},
    schemas::{
        clamp_limit_in_range, remove_nulls, serialize_to_map, validate_input, CreateExpenseInput,
        ExpensePath, ExpensesQuery,
    },
    services::{
        numeric::round2,
        records::{Expense, PORTFOLIO_WIDE_LABEL},
        recurring::{recurring_schedule, RecurrenceFrequency},
    },
    state::AppState,
};

pub const DEFAULT_EXPENSE_CATEGORIES: &[&str] = &[
    "maintenance",
    "utilities",
    "cleaning",
    "supplies",
    "insurance",
    "taxes",
    "staff",
    "marketing",
    "other",
];

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/expenses",
            axum::routing::get(list_expenses).post(create_expense),
        )
        .route(
            "/expenses/recurring",
            axum::routing::get(list_recurring_expenses),
        )
        .route(
            "/expenses/categories",
            axum::routing::get(list_expense_categories),
        )
        .route(
            "/expenses/{expense_id}",
            axum::routing::delete(delete_expense),
        )
}

async fn list_expenses(
    State(state): State<AppState>,
    Query(query): Query<ExpensesQuery>,
) -> AppResult<Json<Value>> {
    let filters = expense_filters(&query)?;
    let pool = db_pool(&state)?;

    let rows = list_rows(
        pool,
        "expenses",
        Some(&filters),
        clamp_limit_in_range(query.limit, 1, 5000),
        "expense_date",
        false,
    )
    .await?;
    let expenses = rows.iter().filter_map(Expense::from_row).collect::<Vec<_>>();
    Ok(Json(json!({ "data": expenses })))
}

async fn create_expense(
    State(state): State<AppState>,
    Json(payload): Json<CreateExpenseInput>,
) -> AppResult<impl IntoResponse> {
    validate_input(&payload)?;
    payload.check()?;
    let pool = db_pool(&state)?;

    let mut record = remove_nulls(serialize_to_map(&payload));
    record.insert(
        "category".to_string(),
        Value::String(payload.category.trim().to_lowercase()),
    );
    record.insert(
        "status".to_string(),
        Value::String(payload.status.trim().to_lowercase()),
    );
    record.insert("amount".to_string(), json!(round2(payload.amount)));
    match payload
        .recurring_frequency
        .as_deref()
        .and_then(RecurrenceFrequency::parse)
    {
        Some(frequency) if payload.is_recurring => {
            record.insert(
                "recurring_frequency".to_string(),
                Value::String(frequency.as_str().to_string()),
            );
        }
        _ => {
            record.remove("recurring_frequency");
        }
    }

    let created = create_row(pool, "expenses", &record).await?;
    state.invalidate_metrics();
    let expense_id = created.get("id").cloned().unwrap_or(Value::Null);
    tracing::info!(
        expense_id = %expense_id,
        category = %payload.category,
        "Expense created"
    );

    let body = Expense::from_row(&created)
        .and_then(|expense| serde_json::to_value(expense).ok())
        .unwrap_or(created);
    Ok((axum::http::StatusCode::CREATED, Json(body)))
}

async fn delete_expense(
    State(state): State<AppState>,
    Path(path): Path<ExpensePath>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let deleted = delete_row(pool, "expenses", path.expense_id).await?;
    state.invalidate_metrics();
    tracing::info!(expense_id = path.expense_id, "Expense deleted");
    Ok(Json(deleted))
}

async fn list_recurring_expenses(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let expenses = load_expenses(pool, None).await?;
    let schedule = recurring_schedule(&expenses, state.config.today());
    let monthly_total: f64 = schedule.iter().map(|entry| entry.monthly_equivalent).sum();
    Ok(Json(json!({
        "data": schedule,
        "monthly_total": round2(monthly_total),
        "currency": state.config.currency_code,
    })))
}

async fn list_expense_categories(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let in_use = distinct_values(pool, "expenses", "category").await?;
    Ok(Json(json!({ "data": merge_categories(in_use) })))
}

/// Default categories plus any in use, lowercased, deduplicated and sorted.
fn merge_categories(in_use: Vec<String>) -> Vec<String> {
    DEFAULT_EXPENSE_CATEGORIES
        .iter()
        .map(|category| (*category).to_string())
        .chain(in_use)
        .map(|category| category.trim().to_lowercase())
        .filter(|category| !category.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn expense_filters(query: &ExpensesQuery) -> AppResult<Map<String, Value>> {
    let mut filters = Map::new();

    if let Some(property) = non_empty_opt(query.property.as_deref()) {
        if property.eq_ignore_ascii_case("portfolio")
            || property.eq_ignore_ascii_case(PORTFOLIO_WIDE_LABEL)
        {
            filters.insert("property_id__is_null".to_string(), Value::Bool(true));
        } else if !property.eq_ignore_ascii_case("all") {
            let property_id = property.parse::<i64>().map_err(|_| {
                AppError::BadRequest(format!(
                    "property must be 'all', 'portfolio' or a unit id, got '{property}'."
                ))
            })?;
            filters.insert("property_id".to_string(), json!(property_id));
        }
    }
    if let Some(category) = non_empty_opt(query.category.as_deref())
        .filter(|category| !category.eq_ignore_ascii_case("all"))
    {
        filters.insert(
            "category".to_string(),
            Value::String(category.to_lowercase()),
        );
    }
    if let Some(vendor) = non_empty_opt(query.vendor.as_deref()) {
        filters.insert("vendor__ilike".to_string(), Value::String(vendor));
    }
    if let Some(from) = parse_date_param(query.from_date.as_deref(), "from")? {
        filters.insert("expense_date__gte".to_string(), json!(from.to_string()));
    }
    if let Some(to) = parse_date_param(query.to_date.as_deref(), "to")? {
        filters.insert("expense_date__lte".to_string(), json!(to.to_string()));
    }

    Ok(filters)
}

fn non_empty_opt(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{expense_filters, merge_categories, DEFAULT_EXPENSE_CATEGORIES};
    use crate::schemas::ExpensesQuery;

    fn query(value: Value) -> ExpensesQuery {
        serde_json::from_value(value).expect("query")
    }

    #[test]
    fn categories_merge_defaults_with_usage() {
        let merged = merge_categories(vec!["Pool Service".to_string(), "utilities".to_string()]);
        assert_eq!(merged.len(), DEFAULT_EXPENSE_CATEGORIES.len() + 1);
        assert!(merged.contains(&"pool service".to_string()));
        let mut sorted = merged.clone();
        sorted.sort();
        assert_eq!(merged, sorted);
    }

    #[test]
    fn portfolio_filter_matches_null_property() {
        let filters = expense_filters(&query(json!({ "property": "Portfolio Wide" })))
            .expect("filters");
        assert_eq!(filters["property_id__is_null"], json!(true));

        let filters = expense_filters(&query(json!({ "property": "all", "category": "All" })))
            .expect("filters");
        assert!(filters.is_empty());
    }

    #[test]
    fn builds_typed_filters() {
        let filters = expense_filters(&query(json!({
            "property": "7",
            "category": "Utilities",
            "from": "2024-01-01",
            "to": "2024-03-31"
        })))
        .expect("filters");
        assert_eq!(filters["property_id"], json!(7));
        assert_eq!(filters["category"], json!("utilities"));
        assert_eq!(filters["expense_date__gte"], json!("2024-01-01"));
        assert_eq!(filters["expense_date__lte"], json!("2024-03-31"));
    }

    #[test]
    fn rejects_malformed_params() {
        assert!(expense_filters(&query(json!({ "property": "villa" }))).is_err());
        assert!(expense_filters(&query(json!({ "from": "yesterday" }))).is_err());
    }
}
