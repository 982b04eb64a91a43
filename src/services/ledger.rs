use chrono::NaiveDate;
use serde::Serialize;

use crate::services::{
    numeric::round2,
    records::{PortfolioSnapshot, PropertyScope, PORTFOLIO_WIDE_LABEL},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Payment,
    Expense,
}

/// One ledger line, synthesized from either a reservation payment or an
/// expense.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    #[serde(rename = "property_id")]
    pub scope: PropertyScope,
    #[serde(rename = "property")]
    pub property_name: String,
    pub category: Option<String>,
    pub amount: f64,
    pub date: Option<NaiveDate>,
    pub status: String,
    pub description: String,
}

/// Unified ledger: one payment per reservation that has received money and
/// one line per expense, in no particular order.
pub fn build_transactions(snapshot: &PortfolioSnapshot) -> Vec<Transaction> {
    let property_name = |scope: PropertyScope| match scope {
        PropertyScope::Portfolio => PORTFOLIO_WIDE_LABEL.to_string(),
        PropertyScope::Unit(id) => snapshot
            .unit(id)
            .map(|unit| unit.name.clone())
            .unwrap_or_else(|| format!("Unit {id}")),
    };

    let payments = snapshot
        .reservations
        .iter()
        .filter(|reservation| reservation.paid_amount > 0.0)
        .map(|reservation| {
            let scope = PropertyScope::Unit(reservation.property_id);
            let guest = reservation
                .guest_name
                .as_deref()
                .map(|name| format!(" from {name}"))
                .unwrap_or_default();
            Transaction {
                id: format!("res-{}", reservation.id),
                kind: TransactionKind::Payment,
                scope,
                property_name: property_name(scope),
                category: reservation.reservation_type.clone(),
                amount: round2(reservation.paid_amount),
                date: reservation.check_in,
                status: reservation.status.clone(),
                description: format!("Reservation #{} payment{guest}", reservation.id),
            }
        });

    let expenses = snapshot.expenses.iter().map(|expense| Transaction {
        id: format!("exp-{}", expense.id),
        kind: TransactionKind::Expense,
        scope: expense.scope,
        property_name: property_name(expense.scope),
        category: Some(expense.category.clone()),
        amount: round2(expense.amount),
        date: expense.date,
        status: expense.status.clone(),
        description: expense
            .description
            .clone()
            .or_else(|| expense.vendor.clone())
            .unwrap_or_else(|| format!("{} expense", expense.category)),
    });

    payments.chain(expenses).collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{build_transactions, TransactionKind};
    use crate::services::{
        filters::{filter_list, FilterParams, TransactionFilters},
        grouping::tests::unit,
        records::{Expense, PortfolioSnapshot, PropertyScope, Reservation},
    };

    fn snapshot() -> PortfolioSnapshot {
        PortfolioSnapshot {
            units: vec![unit(1, Some("Sunset Villas"), None)],
            reservations: vec![
                Reservation::from_row(&json!({
                    "id": 5, "property_id": 1, "guest_name": "Awa",
                    "check_in": "2024-02-10", "check_out": "2024-02-12",
                    "paid_amount": 300, "total_amount": 300
                }))
                .expect("reservation"),
                Reservation::from_row(&json!({
                    "id": 6, "property_id": 1,
                    "check_in": "2024-02-20", "check_out": "2024-02-22",
                    "paid_amount": 0, "total_amount": 300
                }))
                .expect("reservation"),
            ],
            expenses: vec![Expense::from_row(&json!({
                "id": 8, "property_id": null, "category": "insurance",
                "amount": 120, "expense_date": "2024-02-15", "vendor": "GTI"
            }))
            .expect("expense")],
        }
    }

    #[test]
    fn unpaid_reservations_are_not_payments() {
        let transactions = build_transactions(&snapshot());
        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[0].id, "res-5");
        assert_eq!(transactions[0].kind, TransactionKind::Payment);
        assert_eq!(transactions[0].property_name, "Unit 1");
        assert_eq!(transactions[0].description, "Reservation #5 payment from Awa");
        assert_eq!(transactions[1].scope, PropertyScope::Portfolio);
        assert_eq!(transactions[1].property_name, "Portfolio Wide");
        assert_eq!(transactions[1].description, "GTI");
    }

    #[test]
    fn ledger_feeds_the_filter_pipeline() {
        let transactions = build_transactions(&snapshot());
        let filters: TransactionFilters = serde_json::from_value::<FilterParams>(json!({
            "searchText": "portfolio"
        }))
        .expect("params")
        .into();
        let kept = filter_list(&transactions, &filters);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "exp-8");

        let sorted = filter_list(&transactions, &TransactionFilters::default());
        assert_eq!(sorted[0].id, "exp-8");
    }

    #[test]
    fn serializes_with_ledger_field_names() {
        let transactions = build_transactions(&snapshot());
        let value = serde_json::to_value(&transactions[1]).expect("json");
        assert_eq!(value["type"], "expense");
        assert_eq!(value["property_id"], serde_json::Value::Null);
        assert_eq!(value["date"], "2024-02-15");
    }
}
