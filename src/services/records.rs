use chrono::NaiveDate;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::services::{
    numeric::{numeric_field, parse_permissive_f64},
    recurring::RecurrenceFrequency,
};

pub const PORTFOLIO_WIDE_LABEL: &str = "Portfolio Wide";

/// Where an expense (or a filter) applies: the whole portfolio or one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyScope {
    Portfolio,
    Unit(i64),
}

impl PropertyScope {
    /// Decodes every spelling of "no property" the stored rows use (`null`,
    /// missing, empty, `"Portfolio Wide"`, `"portfolio"`) into one variant.
    pub fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Number(number)) => whole_number(number)
                .map(Self::Unit)
                .unwrap_or(Self::Portfolio),
            Some(Value::String(text)) => {
                let trimmed = text.trim();
                if trimmed.is_empty()
                    || trimmed.eq_ignore_ascii_case(PORTFOLIO_WIDE_LABEL)
                    || trimmed.eq_ignore_ascii_case("portfolio")
                {
                    return Self::Portfolio;
                }
                trimmed
                    .parse::<i64>()
                    .map(Self::Unit)
                    .unwrap_or(Self::Portfolio)
            }
            _ => Self::Portfolio,
        }
    }

    pub fn unit_id(self) -> Option<i64> {
        match self {
            Self::Portfolio => None,
            Self::Unit(id) => Some(id),
        }
    }
}

impl Serialize for PropertyScope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Portfolio => serializer.serialize_none(),
            Self::Unit(id) => serializer.serialize_i64(*id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Unit {
    pub id: i64,
    pub name: String,
    pub unit_name: Option<String>,
    pub property_name: Option<String>,
    pub location: Option<String>,
    pub location_id: Option<i64>,
    pub property_type: Option<String>,
    pub bedrooms: i64,
    pub bathrooms: f64,
    pub status: String,
}

impl Unit {
    pub fn from_row(row: &Value) -> Option<Self> {
        let id = row_i64(row, "id")?;
        let unit_name = row_opt_str(row, "unit_name");
        let name = row_opt_str(row, "name")
            .or_else(|| unit_name.clone())
            .unwrap_or_else(|| format!("Unit {id}"));
        Some(Self {
            id,
            name,
            unit_name,
            property_name: row_opt_str(row, "property_name"),
            location: row_opt_str(row, "location"),
            location_id: row_i64(row, "location_id"),
            property_type: row_opt_str(row, "property_type"),
            bedrooms: numeric_field(row.get("bedrooms")) as i64,
            bathrooms: numeric_field(row.get("bathrooms")),
            status: row_opt_str(row, "status").unwrap_or_else(|| "active".to_string()),
        })
    }

    /// Display name used for per-unit chart series.
    pub fn display_name(&self) -> &str {
        self.unit_name
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reservation {
    pub id: i64,
    pub property_id: i64,
    pub guest_name: Option<String>,
    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,
    pub total_amount: f64,
    pub paid_amount: f64,
    pub status: String,
    pub reservation_type: Option<String>,
}

impl Reservation {
    pub fn from_row(row: &Value) -> Option<Self> {
        Some(Self {
            id: row_i64(row, "id")?,
            property_id: row_i64(row, "property_id")?,
            guest_name: row_opt_str(row, "guest_name"),
            check_in: date_field(row, &["check_in", "check_in_date"]),
            check_out: date_field(row, &["check_out", "check_out_date"]),
            total_amount: numeric_field(row.get("total_amount")),
            paid_amount: numeric_field(row.get("paid_amount")),
            status: row_opt_str(row, "status")
                .map(|value| value.to_ascii_lowercase())
                .unwrap_or_else(|| "confirmed".to_string()),
            reservation_type: row_opt_str(row, "reservation_type"),
        })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.status.as_str(), "cancelled" | "canceled" | "no_show")
    }

    /// Number of nights of `[check_in, check_out)` that fall inside
    /// `[from, to]` (both inclusive calendar days).
    pub fn nights_within(&self, from: NaiveDate, to: NaiveDate) -> i64 {
        let (Some(check_in), Some(check_out)) = (self.check_in, self.check_out) else {
            return 0;
        };
        let start = check_in.max(from);
        let Some(end) = to.succ_opt().map(|after| check_out.min(after)) else {
            return 0;
        };
        (end - start).num_days().max(0)
    }

    pub fn total_nights(&self) -> i64 {
        match (self.check_in, self.check_out) {
            (Some(check_in), Some(check_out)) => (check_out - check_in).num_days().max(0),
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expense {
    pub id: i64,
    #[serde(rename = "property_id")]
    pub scope: PropertyScope,
    pub category: String,
    pub amount: f64,
    pub date: Option<NaiveDate>,
    pub status: String,
    pub vendor: Option<String>,
    pub description: Option<String>,
    pub recurring: bool,
    pub frequency: Option<RecurrenceFrequency>,
}

impl Expense {
    pub fn from_row(row: &Value) -> Option<Self> {
        let scope = if row.get("property_id").is_some() {
            PropertyScope::from_value(row.get("property_id"))
        } else {
            PropertyScope::from_value(row.get("property"))
        };
        Some(Self {
            id: row_i64(row, "id")?,
            scope,
            category: row_opt_str(row, "category")
                .map(|value| value.to_ascii_lowercase())
                .unwrap_or_else(|| "other".to_string()),
            amount: numeric_field(row.get("amount")),
            date: date_field(row, &["expense_date", "date"]),
            status: row_opt_str(row, "status")
                .map(|value| value.to_ascii_lowercase())
                .unwrap_or_else(|| "paid".to_string()),
            vendor: row_opt_str(row, "vendor"),
            description: row_opt_str(row, "description"),
            recurring: row_bool(row, "is_recurring") || row_bool(row, "recurring"),
            frequency: row_opt_str(row, "recurring_frequency")
                .or_else(|| row_opt_str(row, "frequency"))
                .and_then(|value| RecurrenceFrequency::parse(&value)),
        })
    }
}

/// Everything one metrics request reads: a consistent snapshot of the
/// three source tables.
#[derive(Debug, Clone, Default)]
pub struct PortfolioSnapshot {
    pub units: Vec<Unit>,
    pub reservations: Vec<Reservation>,
    pub expenses: Vec<Expense>,
}

impl PortfolioSnapshot {
    pub fn unit(&self, id: i64) -> Option<&Unit> {
        self.units.iter().find(|unit| unit.id == id)
    }
}

/// Accepts `YYYY-MM-DD` or anything with such a prefix (RFC 3339
/// timestamps). Anything else is treated as a missing date.
pub fn parse_date_lenient(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            trimmed
                .get(..10)
                .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
        })
}

fn date_field(row: &Value, keys: &[&str]) -> Option<NaiveDate> {
    keys.iter()
        .find_map(|key| row.get(*key).and_then(Value::as_str))
        .and_then(parse_date_lenient)
}

fn row_opt_str(row: &Value, key: &str) -> Option<String> {
    row.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

/// Integers, or floats with no fractional part (`3.0`).
fn whole_number(number: &serde_json::Number) -> Option<i64> {
    number
        .as_i64()
        .or_else(|| number.as_f64().filter(|n| n.fract() == 0.0).map(|n| n as i64))
}

fn row_i64(row: &Value, key: &str) -> Option<i64> {
    match row.get(key)? {
        Value::Number(number) => whole_number(number),
        Value::String(text) => parse_permissive_f64(text)
            .filter(|n| n.fract() == 0.0)
            .map(|n| n as i64),
        _ => None,
    }
}

fn row_bool(row: &Value, key: &str) -> bool {
    match row.get(key) {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(text)) => {
            let lower = text.trim().to_ascii_lowercase();
            lower == "true" || lower == "1" || lower == "yes"
        }
        Some(Value::Number(number)) => number.as_i64().is_some_and(|value| value != 0),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::{parse_date_lenient, Expense, PropertyScope, Reservation, Unit};
    use crate::services::recurring::RecurrenceFrequency;

    #[test]
    fn portfolio_sentinels_collapse_to_one_variant() {
        assert_eq!(PropertyScope::from_value(None), PropertyScope::Portfolio);
        assert_eq!(
            PropertyScope::from_value(Some(&json!(null))),
            PropertyScope::Portfolio
        );
        assert_eq!(
            PropertyScope::from_value(Some(&json!("Portfolio Wide"))),
            PropertyScope::Portfolio
        );
        assert_eq!(
            PropertyScope::from_value(Some(&json!("portfolio wide"))),
            PropertyScope::Portfolio
        );
        assert_eq!(
            PropertyScope::from_value(Some(&json!("7"))),
            PropertyScope::Unit(7)
        );
        assert_eq!(
            PropertyScope::from_value(Some(&json!(12))),
            PropertyScope::Unit(12)
        );
    }

    #[test]
    fn reads_unit_rows_leniently() {
        let unit = Unit::from_row(&json!({
            "id": 3,
            "name": "Sunset 3",
            "unit_name": "  ",
            "property_name": "Sunset Villas",
            "bedrooms": "2",
            "bathrooms": null
        }))
        .expect("unit");
        assert_eq!(unit.unit_name, None);
        assert_eq!(unit.property_name.as_deref(), Some("Sunset Villas"));
        assert_eq!(unit.bedrooms, 2);
        assert_eq!(unit.bathrooms, 0.0);
        assert_eq!(unit.status, "active");
        assert!(Unit::from_row(&json!({ "name": "no id" })).is_none());

        let float_id = Unit::from_row(&json!({ "id": 3.0, "name": "Sunset 3" })).expect("unit");
        assert_eq!(float_id.id, 3);
        assert_eq!(
            PropertyScope::from_value(Some(&json!(3.0))),
            PropertyScope::Unit(float_id.id)
        );
        assert!(Unit::from_row(&json!({ "id": 3.5, "name": "half" })).is_none());
    }

    #[test]
    fn reservation_with_bad_dates_keeps_zero_nights() {
        let reservation = Reservation::from_row(&json!({
            "id": 1,
            "property_id": 2,
            "check_in": "not a date",
            "check_out": "2024-01-05",
            "paid_amount": "NaN"
        }))
        .expect("reservation");
        assert_eq!(reservation.check_in, None);
        assert_eq!(reservation.paid_amount, 0.0);
        assert_eq!(reservation.total_nights(), 0);
    }

    #[test]
    fn counts_nights_inside_window() {
        let reservation = Reservation::from_row(&json!({
            "id": 1,
            "property_id": 2,
            "check_in": "2024-01-30",
            "check_out": "2024-02-03",
            "paid_amount": 400
        }))
        .expect("reservation");
        let jan_start = NaiveDate::from_ymd_opt(2024, 1, 1).expect("date");
        let jan_end = NaiveDate::from_ymd_opt(2024, 1, 31).expect("date");
        let feb_start = NaiveDate::from_ymd_opt(2024, 2, 1).expect("date");
        let feb_end = NaiveDate::from_ymd_opt(2024, 2, 29).expect("date");
        assert_eq!(reservation.nights_within(jan_start, jan_end), 2);
        assert_eq!(reservation.nights_within(feb_start, feb_end), 2);
        assert_eq!(reservation.total_nights(), 4);
    }

    #[test]
    fn expense_rows_decode_scope_and_recurrence() {
        let expense = Expense::from_row(&json!({
            "id": 9,
            "property_id": null,
            "category": "Utilities",
            "amount": "250.75",
            "expense_date": "2024-03-10T00:00:00Z",
            "is_recurring": true,
            "recurring_frequency": "Monthly"
        }))
        .expect("expense");
        assert_eq!(expense.scope, PropertyScope::Portfolio);
        assert_eq!(expense.category, "utilities");
        assert_eq!(expense.amount, 250.75);
        assert_eq!(expense.date, NaiveDate::from_ymd_opt(2024, 3, 10));
        assert_eq!(expense.frequency, Some(RecurrenceFrequency::Monthly));
    }

    #[test]
    fn lenient_dates() {
        assert_eq!(
            parse_date_lenient("2024-02-01"),
            NaiveDate::from_ymd_opt(2024, 2, 1)
        );
        assert_eq!(parse_date_lenient("2024-13-01"), None);
        assert_eq!(parse_date_lenient(""), None);
    }
}
