use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::services::{
    aggregation::{
        night_stats, occupancy_and_adr_timelines, revenue_timeline, AdrPoint, OccupancyPoint,
        RevenuePoint,
    },
    ledger::{build_transactions, Transaction},
    numeric::{round2, round4, safe_ratio},
    performance::{
        expense_comparison, property_performance, ExpenseComparison, PropertyPerformance,
    },
    records::{Expense, PortfolioSnapshot, Reservation, Unit},
    recurring::{recurring_schedule, RecurringEntry},
    timeline::month_buckets,
};

/// Default window: the month of `to` and the five before it.
pub fn default_range_start(to: NaiveDate) -> NaiveDate {
    let index = i64::from(to.year()) * 12 + i64::from(to.month0()) - 5;
    let year = index.div_euclid(12) as i32;
    let month = index.rem_euclid(12) as u32 + 1;
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(to)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub currency: String,
    pub total_revenue: f64,
    pub total_booked: f64,
    pub total_expenses: f64,
    pub net_income: f64,
    pub occupancy_rate: f64,
    pub adr: f64,
    pub revpar: f64,
    pub unit_count: usize,
    pub reservation_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsPayload {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub summary: MetricsSummary,
    pub properties: Vec<Unit>,
    pub reservations: Vec<Reservation>,
    pub expenses: Vec<Expense>,
    pub transaction_history: Vec<Transaction>,
    pub revenue_timeline_data: Vec<RevenuePoint>,
    #[serde(rename = "ADRData")]
    pub adr_data: Vec<AdrPoint>,
    pub occupancy_rate_data: Vec<OccupancyPoint>,
    pub property_expense_comparison: Vec<ExpenseComparison>,
    pub property_performance_metrics: Vec<PropertyPerformance>,
    pub recurring_expenses: Vec<RecurringEntry>,
}

/// Everything the financial dashboard renders for `[from, to]`, derived from
/// one snapshot. `from > to` yields empty timelines rather than an error.
pub fn build_metrics_payload(
    snapshot: PortfolioSnapshot,
    from: NaiveDate,
    to: NaiveDate,
    today: NaiveDate,
    currency: &str,
) -> MetricsPayload {
    let buckets = month_buckets(from, to);
    let revenue_timeline_data = revenue_timeline(&buckets, &snapshot, today);
    let (occupancy_rate_data, adr_data) = occupancy_and_adr_timelines(&buckets, &snapshot, today);
    let property_performance_metrics = property_performance(&snapshot, from, to);
    let property_expense_comparison =
        expense_comparison(&snapshot, &property_performance_metrics, from, to);
    let recurring_expenses = recurring_schedule(&snapshot.expenses, today);

    let in_range = |date: Option<NaiveDate>| date.is_some_and(|date| date >= from && date <= to);
    let active = snapshot
        .reservations
        .iter()
        .filter(|reservation| !reservation.is_cancelled())
        .collect::<Vec<_>>();
    let total_revenue: f64 = active
        .iter()
        .filter(|reservation| in_range(reservation.check_in))
        .map(|reservation| reservation.paid_amount)
        .sum();
    let total_booked: f64 = active
        .iter()
        .filter(|reservation| in_range(reservation.check_in))
        .map(|reservation| reservation.total_amount)
        .sum();
    let total_expenses: f64 = snapshot
        .expenses
        .iter()
        .filter(|expense| in_range(expense.date))
        .map(|expense| expense.amount)
        .sum();

    let days = ((to - from).num_days() + 1).max(0);
    let available_nights = snapshot.units.len() as i64 * days;
    let stats = night_stats(active.iter().copied(), from, to);
    let occupancy_rate = safe_ratio(stats.occupied_nights as f64, available_nights as f64);

    let summary = MetricsSummary {
        currency: currency.to_string(),
        total_revenue: round2(total_revenue),
        total_booked: round2(total_booked),
        total_expenses: round2(total_expenses),
        net_income: round2(total_revenue - total_expenses),
        occupancy_rate: round4(occupancy_rate),
        adr: round2(stats.adr()),
        revpar: round2(stats.adr() * occupancy_rate),
        unit_count: snapshot.units.len(),
        reservation_count: active
            .iter()
            .filter(|reservation| in_range(reservation.check_in))
            .count(),
    };

    let transaction_history = build_transactions(&snapshot);

    MetricsPayload {
        from,
        to,
        summary,
        properties: snapshot.units,
        reservations: snapshot.reservations,
        expenses: snapshot.expenses,
        transaction_history,
        revenue_timeline_data,
        adr_data,
        occupancy_rate_data,
        property_expense_comparison,
        property_performance_metrics,
        recurring_expenses,
    }
}
