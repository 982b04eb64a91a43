use chrono::NaiveDate;
use serde_json::{Map, Value};
use sqlx::{postgres::PgRow, Postgres, QueryBuilder, Row};

use crate::error::AppError;

const ALLOWED_TABLES: &[&str] = &["expenses", "properties", "reservations"];

/// Upper bound for a single listing, and the page size for full-table reads.
pub const MAX_LIST_LIMIT: i64 = 10_000;

pub async fn list_rows(
    pool: &sqlx::PgPool,
    table: &str,
    filters: Option<&Map<String, Value>>,
    limit: i64,
    order_by: &str,
    ascending: bool,
) -> Result<Vec<Value>, AppError> {
    let mut query = build_list_query(table, filters, limit, 0, order_by, ascending)?;
    let rows = query.build().fetch_all(pool).await.map_err(map_db_error)?;
    Ok(read_rows(rows))
}

/// Every matching row, fetched in pages of `MAX_LIST_LIMIT` until a short
/// page comes back.
pub async fn list_all_rows(
    pool: &sqlx::PgPool,
    table: &str,
    filters: Option<&Map<String, Value>>,
    order_by: &str,
    ascending: bool,
) -> Result<Vec<Value>, AppError> {
    let mut rows = Vec::new();
    let mut offset = 0;
    loop {
        let mut query =
            build_list_query(table, filters, MAX_LIST_LIMIT, offset, order_by, ascending)?;
        let page = read_rows(query.build().fetch_all(pool).await.map_err(map_db_error)?);
        let fetched = page.len() as i64;
        rows.extend(page);
        if fetched < MAX_LIST_LIMIT {
            break;
        }
        offset += fetched;
        tracing::debug!(table, offset, "Reading next page");
    }
    Ok(rows)
}

fn build_list_query(
    table: &str,
    filters: Option<&Map<String, Value>>,
    limit: i64,
    offset: i64,
    order_by: &str,
    ascending: bool,
) -> Result<QueryBuilder<'static, Postgres>, AppError> {
    let table_name = validate_table(table)?;
    let order_name = if order_by.trim().is_empty() {
        "id"
    } else {
        validate_identifier(order_by)?
    };

    let mut query = QueryBuilder::<Postgres>::new("SELECT row_to_json(t) AS row FROM ");
    query.push(table_name).push(" t WHERE 1=1");

    if let Some(filter_map) = filters {
        for (key, value) in filter_map {
            push_filter_clause(&mut query, key, value)?;
        }
    }

    query.push(" ORDER BY t.").push(order_name);
    if ascending {
        query.push(" ASC");
    } else {
        query.push(" DESC");
    }
    if order_name != "id" {
        query.push(", t.id ASC");
    }
    query
        .push(" LIMIT ")
        .push_bind(limit.clamp(1, MAX_LIST_LIMIT));
    if offset > 0 {
        query.push(" OFFSET ").push_bind(offset);
    }
    Ok(query)
}

pub async fn get_row(pool: &sqlx::PgPool, table: &str, row_id: i64) -> Result<Value, AppError> {
    let table_name = validate_table(table)?;

    let mut query = QueryBuilder::<Postgres>::new("SELECT row_to_json(t) AS row FROM ");
    query.push(table_name).push(" t WHERE t.id = ");
    query.push_bind(row_id);
    query.push(" LIMIT 1");

    let row = query
        .build()
        .fetch_optional(pool)
        .await
        .map_err(map_db_error)?;

    row.and_then(|value| value.try_get::<Option<Value>, _>("row").ok().flatten())
        .ok_or_else(|| AppError::NotFound(format!("{table_name} record not found.")))
}

pub async fn create_row(
    pool: &sqlx::PgPool,
    table: &str,
    payload: &Map<String, Value>,
) -> Result<Value, AppError> {
    let table_name = validate_table(table)?;
    if payload.is_empty() {
        return Err(AppError::BadRequest(format!(
            "Could not create {table_name} record."
        )));
    }

    let mut query = build_insert_query(table_name, payload)?;
    let row = query
        .build()
        .fetch_optional(pool)
        .await
        .map_err(map_db_error)?;

    row.and_then(|value| value.try_get::<Option<Value>, _>("row").ok().flatten())
        .ok_or_else(|| AppError::Internal(format!("Could not create {table_name} record.")))
}

// jsonb_populate_record lets Postgres coerce column types (date, numeric,
// boolean) from the table definition.
fn build_insert_query(
    table_name: &str,
    payload: &Map<String, Value>,
) -> Result<QueryBuilder<'static, Postgres>, AppError> {
    let mut keys = payload.keys().cloned().collect::<Vec<_>>();
    keys.sort_unstable();
    for key in &keys {
        validate_identifier(key)?;
    }

    let mut query = QueryBuilder::<Postgres>::new("INSERT INTO ");
    query.push(table_name).push(" (");
    {
        let mut separated = query.separated(", ");
        for key in &keys {
            separated.push(key.trim().to_string());
        }
    }
    query.push(") SELECT ");
    {
        let mut separated = query.separated(", ");
        for key in &keys {
            separated.push("r.");
            separated.push_unseparated(key.trim().to_string());
        }
    }
    query
        .push(" FROM jsonb_populate_record(NULL::")
        .push(table_name)
        .push(", ");
    query.push_bind(Value::Object(payload.clone()));
    query
        .push(") r RETURNING row_to_json(")
        .push(table_name)
        .push(".*) AS row");
    Ok(query)
}

pub async fn delete_row(pool: &sqlx::PgPool, table: &str, row_id: i64) -> Result<Value, AppError> {
    let existing = get_row(pool, table, row_id).await?;
    let table_name = validate_table(table)?;

    let mut query = QueryBuilder::<Postgres>::new("DELETE FROM ");
    query.push(table_name).push(" t WHERE t.id = ");
    query.push_bind(row_id);
    query.build().execute(pool).await.map_err(map_db_error)?;

    Ok(existing)
}

/// Distinct non-empty values of one text column, sorted.
pub async fn distinct_values(
    pool: &sqlx::PgPool,
    table: &str,
    column: &str,
) -> Result<Vec<String>, AppError> {
    let table_name = validate_table(table)?;
    let column_name = validate_identifier(column)?;

    let mut query = QueryBuilder::<Postgres>::new("SELECT DISTINCT lower(trim(t.");
    query
        .push(column_name)
        .push("::text)) AS value FROM ")
        .push(table_name)
        .push(" t WHERE t.")
        .push(column_name)
        .push(" IS NOT NULL ORDER BY value");

    let rows = query.build().fetch_all(pool).await.map_err(map_db_error)?;
    Ok(rows
        .into_iter()
        .filter_map(|row| row.try_get::<Option<String>, _>("value").ok().flatten())
        .filter(|value| !value.is_empty())
        .collect())
}

pub(crate) fn read_rows(rows: Vec<PgRow>) -> Vec<Value> {
    rows.into_iter()
        .filter_map(|row| row.try_get::<Option<Value>, _>("row").ok().flatten())
        .collect()
}

fn validate_table(table: &str) -> Result<&str, AppError> {
    let normalized = validate_identifier(table)?;
    if ALLOWED_TABLES.contains(&normalized) {
        return Ok(normalized);
    }
    Err(AppError::Forbidden(format!(
        "Table '{normalized}' is not allowed."
    )))
}

fn validate_identifier(identifier: &str) -> Result<&str, AppError> {
    let trimmed = identifier.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(
            "Identifier cannot be empty.".to_string(),
        ));
    }
    if !trimmed.chars().all(|character| {
        character.is_ascii_lowercase() || character.is_ascii_digit() || character == '_'
    }) {
        return Err(AppError::BadRequest(format!(
            "Invalid identifier '{trimmed}'."
        )));
    }
    if trimmed
        .chars()
        .next()
        .is_some_and(|first| first.is_ascii_digit())
    {
        return Err(AppError::BadRequest(format!(
            "Invalid identifier '{trimmed}'."
        )));
    }
    Ok(trimmed)
}

#[derive(Debug, Clone, PartialEq)]
enum ScalarFilter {
    Text(String),
    Bool(bool),
    I64(i64),
    F64(f64),
    Date(NaiveDate),
}

#[derive(Debug, Clone, PartialEq)]
enum ArrayFilter {
    Text(Vec<String>),
    I64(Vec<i64>),
}

impl ArrayFilter {
    fn is_empty(&self) -> bool {
        match self {
            Self::Text(values) => values.is_empty(),
            Self::I64(values) => values.is_empty(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterOperator {
    Eq,
    Gte,
    Lte,
    ILike,
    IsNull,
}

impl FilterOperator {
    fn sql(self) -> &'static str {
        match self {
            Self::Eq => " = ",
            Self::Gte => " >= ",
            Self::Lte => " <= ",
            Self::ILike => " ILIKE ",
            Self::IsNull => " IS NULL",
        }
    }
}

/// Splits `check_in__gte` style keys into a column and an operator. Unknown
/// suffixes are treated as part of the column name.
fn parse_filter_key(filter_key: &str) -> Result<(&str, FilterOperator), AppError> {
    let (column, operator) = match filter_key.rsplit_once("__") {
        Some((column, "gte")) => (column, FilterOperator::Gte),
        Some((column, "lte")) => (column, FilterOperator::Lte),
        Some((column, "ilike")) => (column, FilterOperator::ILike),
        Some((column, "is_null")) => (column, FilterOperator::IsNull),
        Some((column, "in")) => (column, FilterOperator::Eq),
        _ => (filter_key, FilterOperator::Eq),
    };
    Ok((validate_identifier(column)?, operator))
}

fn push_filter_clause(
    query: &mut QueryBuilder<Postgres>,
    filter_key: &str,
    value: &Value,
) -> Result<(), AppError> {
    let (column, operator) = parse_filter_key(filter_key)?;

    if operator == FilterOperator::IsNull {
        query.push(" AND t.").push(column);
        if value.as_bool().unwrap_or(true) {
            query.push(" IS NULL");
        } else {
            query.push(" IS NOT NULL");
        }
        return Ok(());
    }

    match value {
        Value::Null => Ok(()),
        Value::Array(items) => {
            if operator != FilterOperator::Eq {
                return Err(AppError::BadRequest(format!(
                    "Filter '{filter_key}' does not support array values."
                )));
            }
            let filter = infer_array_filter(column, items);
            if filter.is_empty() {
                return Ok(());
            }
            query.push(" AND t.").push(column);
            match filter {
                ArrayFilter::Text(values) => {
                    query.push("::text = ANY(").push_bind(values).push(")");
                }
                ArrayFilter::I64(values) => {
                    query.push(" = ANY(").push_bind(values).push(")");
                }
            }
            Ok(())
        }
        _ => {
            query.push(" AND t.").push(column);
            if operator == FilterOperator::ILike {
                query
                    .push("::text")
                    .push(operator.sql())
                    .push_bind(format!("%{}%", escape_like(&render_scalar(value))));
                return Ok(());
            }
            match infer_scalar_filter(column, value) {
                ScalarFilter::Text(text) => {
                    query.push("::text").push(operator.sql()).push_bind(text);
                }
                ScalarFilter::Bool(flag) => {
                    query.push(operator.sql()).push_bind(flag);
                }
                ScalarFilter::I64(number) => {
                    query.push(operator.sql()).push_bind(number);
                }
                ScalarFilter::F64(number) => {
                    query.push(operator.sql()).push_bind(number);
                }
                ScalarFilter::Date(date) => {
                    query.push(operator.sql()).push_bind(date);
                }
            }
            Ok(())
        }
    }
}

/// Makes `%` and `_` in user text match literally under ILIKE.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for character in text.chars() {
        if matches!(character, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(character);
    }
    escaped
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn infer_scalar_filter(column: &str, value: &Value) -> ScalarFilter {
    match value {
        Value::Bool(flag) => ScalarFilter::Bool(*flag),
        Value::Number(number) => number
            .as_i64()
            .map(ScalarFilter::I64)
            .or_else(|| number.as_f64().map(ScalarFilter::F64))
            .unwrap_or_else(|| ScalarFilter::Text(number.to_string())),
        Value::String(text) => {
            let trimmed = text.trim();
            if is_id_column(column) {
                if let Ok(parsed) = trimmed.parse::<i64>() {
                    return ScalarFilter::I64(parsed);
                }
            }
            if is_date_column(column) {
                if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
                    return ScalarFilter::Date(parsed);
                }
            }
            ScalarFilter::Text(text.clone())
        }
        _ => ScalarFilter::Text(render_scalar(value)),
    }
}

fn infer_array_filter(column: &str, values: &[Value]) -> ArrayFilter {
    let as_ids = values
        .iter()
        .map(|value| match value {
            Value::Number(number) => number.as_i64(),
            Value::String(text) if is_id_column(column) => text.trim().parse::<i64>().ok(),
            _ => None,
        })
        .collect::<Option<Vec<i64>>>();
    match as_ids {
        Some(ids) if !ids.is_empty() => ArrayFilter::I64(ids),
        _ => ArrayFilter::Text(values.iter().map(render_scalar).collect()),
    }
}

fn is_id_column(column: &str) -> bool {
    column == "id" || column.ends_with("_id")
}

fn is_date_column(column: &str) -> bool {
    column.ends_with("_date") || matches!(column, "check_in" | "check_out" | "date")
}

pub(crate) fn map_db_error(error: sqlx::Error) -> AppError {
    let message = error.to_string();
    tracing::error!(db_error = %message, "Database query failed");

    if message.contains("23505")
        || message
            .to_ascii_lowercase()
            .contains("duplicate key value violates unique constraint")
    {
        return AppError::Conflict("Duplicate value violates a unique constraint.".to_string());
    }
    AppError::Dependency("Database operation failed.".to_string())
}
