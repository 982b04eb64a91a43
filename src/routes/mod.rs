use axum::{routing::get, Router};
use chrono::NaiveDate;

use crate::{
    error::{AppError, AppResult},
    state::AppState,
};

pub mod expenses;
pub mod financials;
pub mod health;
pub mod properties;
pub mod reservations;
pub mod selection;

pub fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .merge(properties::router())
        .merge(reservations::router())
        .merge(expenses::router())
        .merge(financials::router())
        .merge(selection::router())
}

pub(crate) fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}

/// Strict `YYYY-MM-DD` for query parameters; blank means absent.
pub(crate) fn parse_date_param(value: Option<&str>, field: &str) -> AppResult<Option<NaiveDate>> {
    match value.map(str::trim).filter(|value| !value.is_empty()) {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| AppError::BadRequest(format!("Invalid ISO date for '{field}'."))),
    }
}

#[cfg(test)]
mod tests {
    use super::parse_date_param;

    #[test]
    fn blank_dates_are_absent() {
        assert_eq!(parse_date_param(None, "from").ok(), Some(None));
        assert_eq!(parse_date_param(Some("  "), "from").ok(), Some(None));
        assert_eq!(
            parse_date_param(Some("2024-02-29"), "from").ok().flatten(),
            chrono::NaiveDate::from_ymd_opt(2024, 2, 29)
        );
        assert!(parse_date_param(Some("2023-02-29"), "from").is_err());
    }
}
