use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;

use crate::services::{
    ledger::Transaction,
    numeric::parse_permissive_f64,
    records::{parse_date_lenient, Expense, PropertyScope, PORTFOLIO_WIDE_LABEL},
};

/// Anything the ledger filters can be applied to.
pub trait Filterable {
    fn scope(&self) -> PropertyScope;
    fn category(&self) -> Option<&str>;
    fn amount(&self) -> f64;
    fn date(&self) -> Option<NaiveDate>;
    fn search_fields(&self) -> Vec<&str>;
}

impl Filterable for Expense {
    fn scope(&self) -> PropertyScope {
        self.scope
    }

    fn category(&self) -> Option<&str> {
        Some(self.category.as_str())
    }

    fn amount(&self) -> f64 {
        self.amount
    }

    fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    fn search_fields(&self) -> Vec<&str> {
        [
            Some(self.category.as_str()),
            self.vendor.as_deref(),
            self.description.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

impl Filterable for Transaction {
    fn scope(&self) -> PropertyScope {
        self.scope
    }

    fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    fn amount(&self) -> f64 {
        self.amount
    }

    fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    fn search_fields(&self) -> Vec<&str> {
        [
            Some(self.description.as_str()),
            Some(self.property_name.as_str()),
            self.category.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// Filter values as a client sends them. Everything is optional and loosely
/// typed; `TransactionFilters::from` decides what counts as "set".
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FilterParams {
    pub property: Option<Value>,
    pub category: Option<String>,
    pub amount_min: Option<Value>,
    pub amount_max: Option<Value>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub search_text: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PropertyFilter {
    #[default]
    All,
    Portfolio,
    Unit(i64),
}

impl PropertyFilter {
    fn parse(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Number(number)) => number.as_i64().map(Self::Unit).unwrap_or_default(),
            Some(Value::String(text)) => {
                let trimmed = text.trim();
                if trimmed.eq_ignore_ascii_case("portfolio")
                    || trimmed.eq_ignore_ascii_case(PORTFOLIO_WIDE_LABEL)
                {
                    Self::Portfolio
                } else {
                    trimmed.parse::<i64>().map(Self::Unit).unwrap_or_default()
                }
            }
            _ => Self::All,
        }
    }

    fn matches(self, scope: PropertyScope) -> bool {
        match self {
            Self::All => true,
            Self::Portfolio => scope == PropertyScope::Portfolio,
            Self::Unit(id) => scope == PropertyScope::Unit(id),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionFilters {
    pub property: PropertyFilter,
    pub category: Option<String>,
    pub amount_min: Option<f64>,
    pub amount_max: Option<f64>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub search_text: Option<String>,
}

fn loose_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(number) => number.as_f64().filter(|n| n.is_finite()),
        Value::String(text) => parse_permissive_f64(text),
        _ => None,
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|text| !text.is_empty())
}

impl From<FilterParams> for TransactionFilters {
    fn from(params: FilterParams) -> Self {
        Self {
            property: PropertyFilter::parse(params.property.as_ref()),
            category: non_empty(params.category.as_deref())
                .filter(|category| !category.eq_ignore_ascii_case("all"))
                .map(str::to_lowercase),
            amount_min: loose_number(params.amount_min.as_ref()),
            amount_max: loose_number(params.amount_max.as_ref()),
            date_from: non_empty(params.date_from.as_deref()).and_then(parse_date_lenient),
            date_to: non_empty(params.date_to.as_deref()).and_then(parse_date_lenient),
            search_text: non_empty(params.search_text.as_deref()).map(str::to_lowercase),
        }
    }
}

impl TransactionFilters {
    pub fn matches<T: Filterable>(&self, record: &T) -> bool {
        if !self.property.matches(record.scope()) {
            return false;
        }
        if let Some(category) = &self.category {
            let record_category = record.category().map(str::to_lowercase);
            if record_category.as_deref() != Some(category.as_str()) {
                return false;
            }
        }
        if self.amount_min.is_some_and(|min| record.amount() < min) {
            return false;
        }
        if self.amount_max.is_some_and(|max| record.amount() > max) {
            return false;
        }
        if self.date_from.is_some() || self.date_to.is_some() {
            let Some(date) = record.date() else {
                return false;
            };
            if self.date_from.is_some_and(|from| date < from)
                || self.date_to.is_some_and(|to| date > to)
            {
                return false;
            }
        }
        if let Some(needle) = &self.search_text {
            let found = record
                .search_fields()
                .iter()
                .any(|field| field.to_lowercase().contains(needle.as_str()));
            if !found {
                return false;
            }
        }
        true
    }
}

/// Keeps the records that pass every set filter, newest first. Records
/// without a date sort last; ties keep their input order.
pub fn filter_list<T: Filterable + Clone>(records: &[T], filters: &TransactionFilters) -> Vec<T> {
    let mut kept = records
        .iter()
        .filter(|record| filters.matches(*record))
        .cloned()
        .collect::<Vec<_>>();
    kept.sort_by(|left, right| right.date().cmp(&left.date()));
    kept
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{filter_list, FilterParams, PropertyFilter, TransactionFilters};
    use crate::services::records::Expense;

    fn expense(id: i64, property: serde_json::Value, category: &str, amount: f64, date: &str) -> Expense {
        Expense::from_row(&json!({
            "id": id,
            "property_id": property,
            "category": category,
            "amount": amount,
            "expense_date": date,
            "vendor": format!("Vendor {id}"),
            "description": format!("{category} work order")
        }))
        .expect("expense")
    }

    fn params(value: serde_json::Value) -> TransactionFilters {
        serde_json::from_value::<FilterParams>(value)
            .expect("params")
            .into()
    }

    #[test]
    fn category_and_min_amount_combine() {
        let expenses = vec![
            expense(1, json!(1), "maintenance", 40.0, "2024-01-01"),
            expense(2, json!(1), "maintenance", 80.0, "2024-01-02"),
            expense(3, json!(2), "utilities", 100.0, "2024-01-03"),
        ];
        let filters = params(json!({ "category": "maintenance", "amountMin": "50" }));
        let kept = filter_list(&expenses, &filters);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].amount, 80.0);
    }

    #[test]
    fn unset_filters_only_sort() {
        let expenses = vec![
            expense(1, json!(null), "staff", 10.0, "2024-01-05"),
            expense(2, json!(1), "staff", 20.0, "not-a-date"),
            expense(3, json!(2), "staff", 30.0, "2024-03-01"),
            expense(4, json!(2), "staff", 40.0, "2024-01-05"),
        ];
        let kept = filter_list(&expenses, &TransactionFilters::default());
        let ids = kept.iter().map(|expense| expense.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![3, 1, 4, 2]);
    }

    #[test]
    fn empty_and_garbage_values_are_unset() {
        let filters = params(json!({
            "property": "all",
            "category": "All",
            "amountMin": "abc",
            "amountMax": "",
            "dateFrom": "",
            "dateTo": "garbage",
            "searchText": "   "
        }));
        assert_eq!(filters, TransactionFilters::default());
    }

    #[test]
    fn property_filter_distinguishes_portfolio() {
        let expenses = vec![
            expense(1, json!(null), "insurance", 10.0, "2024-01-05"),
            expense(2, json!("Portfolio Wide"), "insurance", 10.0, "2024-01-06"),
            expense(3, json!(7), "insurance", 10.0, "2024-01-07"),
        ];
        let portfolio = params(json!({ "property": "portfolio" }));
        assert_eq!(portfolio.property, PropertyFilter::Portfolio);
        assert_eq!(filter_list(&expenses, &portfolio).len(), 2);

        let unit = params(json!({ "property": "7" }));
        let kept = filter_list(&expenses, &unit);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, 3);
    }

    #[test]
    fn date_range_and_search_are_inclusive_and_case_insensitive() {
        let expenses = vec![
            expense(1, json!(1), "cleaning", 10.0, "2024-02-01"),
            expense(2, json!(1), "cleaning", 10.0, "2024-02-29"),
            expense(3, json!(1), "cleaning", 10.0, "2024-03-01"),
            expense(4, json!(1), "repairs", 10.0, "not-a-date"),
        ];
        let filters = params(json!({
            "dateFrom": "2024-02-01",
            "dateTo": "2024-02-29",
            "searchText": "CLEANING"
        }));
        let ids = filter_list(&expenses, &filters)
            .iter()
            .map(|expense| expense.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![2, 1]);

        let by_vendor = params(json!({ "searchText": "vendor 4", "amountMax": 10 }));
        assert_eq!(filter_list(&expenses, &by_vendor).len(), 1);
    }
}
