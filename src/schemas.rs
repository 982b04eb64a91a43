use serde::Deserialize;
use validator::{Validate, ValidationError};

use crate::{
    error::AppError,
    services::{
        aggregation::Metric, filters::FilterParams, recurring::RecurrenceFrequency,
        selection::Selection,
    },
};

pub fn validate_input<T: Validate>(input: &T) -> Result<(), AppError> {
    input
        .validate()
        .map_err(|errors| AppError::UnprocessableEntity(format!("Validation failed: {errors}")))
}

fn default_false() -> bool {
    false
}

fn default_expense_status() -> String {
    "paid".to_string()
}

fn default_limit_500() -> i64 {
    500
}

fn validate_iso_date(value: &str) -> Result<(), ValidationError> {
    chrono::NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| ValidationError::new("iso_date"))
}

fn validate_frequency(value: &str) -> Result<(), ValidationError> {
    RecurrenceFrequency::parse(value)
        .map(|_| ())
        .ok_or_else(|| ValidationError::new("recurring_frequency"))
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateExpenseInput {
    pub property_id: Option<i64>,
    #[validate(length(min = 1, max = 64))]
    pub category: String,
    #[validate(range(min = 0.0))]
    pub amount: f64,
    #[validate(custom(function = "validate_iso_date"))]
    pub expense_date: String,
    #[serde(default = "default_expense_status")]
    pub status: String,
    pub vendor: Option<String>,
    pub description: Option<String>,
    #[serde(default = "default_false")]
    pub is_recurring: bool,
    #[validate(custom(function = "validate_frequency"))]
    pub recurring_frequency: Option<String>,
}

impl CreateExpenseInput {
    /// Field checks `validator` cannot express on its own.
    pub fn check(&self) -> Result<(), AppError> {
        if !self.amount.is_finite() {
            return Err(AppError::UnprocessableEntity(
                "amount must be a finite number.".to_string(),
            ));
        }
        if self.category.trim().is_empty() {
            return Err(AppError::UnprocessableEntity(
                "category cannot be blank.".to_string(),
            ));
        }
        if self.status.trim().is_empty() {
            return Err(AppError::UnprocessableEntity(
                "status cannot be blank.".to_string(),
            ));
        }
        if self.is_recurring && self.recurring_frequency.is_none() {
            return Err(AppError::UnprocessableEntity(
                "recurring_frequency is required for recurring expenses.".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct ExpensesQuery {
    /// `all`, `portfolio`, or a unit id.
    pub property: Option<String>,
    pub category: Option<String>,
    pub vendor: Option<String>,
    #[serde(rename = "from")]
    pub from_date: Option<String>,
    #[serde(rename = "to")]
    pub to_date: Option<String>,
    #[serde(default = "default_limit_500")]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct ExpensePath {
    pub expense_id: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct PropertiesQuery {
    pub location: Option<String>,
    pub property_type: Option<String>,
    pub status: Option<String>,
    #[serde(default = "default_limit_500")]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct BuildingsAggregatedQuery {
    pub location_id: Option<String>,
    pub property_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct ReservationsQuery {
    pub property_id: Option<String>,
    pub status: Option<String>,
    #[serde(rename = "from")]
    pub from_date: Option<String>,
    #[serde(rename = "to")]
    pub to_date: Option<String>,
    #[serde(default = "default_limit_500")]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct MetricsQuery {
    #[serde(rename = "from")]
    pub from_date: Option<String>,
    #[serde(rename = "to")]
    pub to_date: Option<String>,
    pub request_seq: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeriesInput {
    pub metric: Metric,
    #[serde(rename = "from")]
    pub from_date: Option<String>,
    #[serde(rename = "to")]
    pub to_date: Option<String>,
    #[serde(default)]
    pub selection: Selection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionsInput {
    #[serde(default)]
    pub filters: FilterParams,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct SelectionPath {
    pub op: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SelectionInput {
    #[serde(default)]
    pub selection: Selection,
    pub unit_id: Option<i64>,
    pub building: Option<String>,
}

pub fn clamp_limit_in_range(limit: i64, minimum: i64, maximum: i64) -> i64 {
    limit.clamp(minimum, maximum)
}

pub fn serialize_to_map<T>(value: &T) -> serde_json::Map<String, serde_json::Value>
where
    T: serde::Serialize,
{
    let json = serde_json::to_value(value)
        .unwrap_or_else(|_| serde_json::Value::Object(serde_json::Map::new()));
    json.as_object().cloned().unwrap_or_default()
}

pub fn remove_nulls(
    mut map: serde_json::Map<String, serde_json::Value>,
) -> serde_json::Map<String, serde_json::Value> {
    map.retain(|_, value| !value.is_null());
    map
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{remove_nulls, serialize_to_map, validate_input, CreateExpenseInput};
    use crate::error::AppError;

    fn input(value: serde_json::Value) -> CreateExpenseInput {
        serde_json::from_value(value).expect("input")
    }

    #[test]
    fn accepts_portfolio_wide_expense() {
        let payload = input(json!({
            "category": "insurance",
            "amount": 1500,
            "expense_date": "2024-03-01"
        }));
        assert!(validate_input(&payload).is_ok());
        assert!(payload.check().is_ok());
        assert_eq!(payload.status, "paid");

        let record = remove_nulls(serialize_to_map(&payload));
        assert!(!record.contains_key("property_id"));
        assert_eq!(record["is_recurring"], json!(false));
    }

    #[test]
    fn rejects_negative_amount_and_bad_date() {
        let negative = input(json!({
            "category": "utilities", "amount": -1, "expense_date": "2024-03-01"
        }));
        assert!(matches!(
            validate_input(&negative),
            Err(AppError::UnprocessableEntity(_))
        ));

        let bad_date = input(json!({
            "category": "utilities", "amount": 10, "expense_date": "03/01/2024"
        }));
        assert!(validate_input(&bad_date).is_err());

        let blank_category = input(json!({
            "category": "", "amount": 10, "expense_date": "2024-03-01"
        }));
        assert!(validate_input(&blank_category).is_err());

        let whitespace_category = input(json!({
            "category": "   ", "amount": 10, "expense_date": "2024-03-01"
        }));
        assert!(validate_input(&whitespace_category).is_ok());
        assert!(matches!(
            whitespace_category.check(),
            Err(AppError::UnprocessableEntity(_))
        ));
    }

    #[test]
    fn recurring_needs_known_frequency() {
        let missing = input(json!({
            "category": "staff", "amount": 300, "expense_date": "2024-03-01",
            "is_recurring": true
        }));
        assert!(validate_input(&missing).is_ok());
        assert!(missing.check().is_err());

        let unknown = input(json!({
            "category": "staff", "amount": 300, "expense_date": "2024-03-01",
            "is_recurring": true, "recurring_frequency": "fortnightly"
        }));
        assert!(validate_input(&unknown).is_err());

        let known = input(json!({
            "category": "staff", "amount": 300, "expense_date": "2024-03-01",
            "is_recurring": true, "recurring_frequency": "Monthly"
        }));
        assert!(validate_input(&known).is_ok());
        assert!(known.check().is_ok());
    }
}
