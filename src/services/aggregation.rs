use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::services::{
    grouping::Building,
    numeric::{round2, round4, safe_ratio},
    records::{Expense, PortfolioSnapshot, Reservation},
    selection::{Selection, SelectionScope},
    timeline::{bucket_position, MonthBucket},
};

pub const TOTAL_SERIES_KEY: &str = "total";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BucketTotal {
    pub bucket: MonthBucket,
    pub total: f64,
}

/// Sums `value_of` per month bucket over the records accepted by
/// `predicate`. Every bucket appears in the result (zero when nothing
/// landed in it); records without a date or outside every bucket are
/// skipped.
pub fn aggregate<T, D, V, P>(
    buckets: &[MonthBucket],
    records: &[T],
    date_of: D,
    value_of: V,
    predicate: P,
) -> Vec<BucketTotal>
where
    D: Fn(&T) -> Option<NaiveDate>,
    V: Fn(&T) -> f64,
    P: Fn(&T) -> bool,
{
    let mut totals = buckets
        .iter()
        .map(|bucket| BucketTotal {
            bucket: *bucket,
            total: 0.0,
        })
        .collect::<Vec<_>>();

    for record in records {
        if !predicate(record) {
            continue;
        }
        let Some(position) = date_of(record).and_then(|date| bucket_position(buckets, date))
        else {
            continue;
        };
        let value = value_of(record);
        if value.is_finite() {
            totals[position].total += value;
        }
    }

    totals
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Revenue,
    Expenses,
    Net,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub label: &'static str,
    pub key: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub key: String,
    pub name: String,
    pub points: Vec<SeriesPoint>,
}

impl Series {
    fn from_totals(key: String, name: String, totals: &[BucketTotal]) -> Self {
        Self {
            key,
            name,
            points: totals
                .iter()
                .map(|total| SeriesPoint {
                    label: total.bucket.label(),
                    key: total.bucket.key(),
                    value: round2(total.total),
                })
                .collect(),
        }
    }
}

/// Which slice of the portfolio one series covers.
enum SeriesScope<'a> {
    Everything,
    Units(&'a BTreeSet<i64>),
}

impl SeriesScope<'_> {
    fn reservation(&self, reservation: &Reservation) -> bool {
        if reservation.is_cancelled() {
            return false;
        }
        match self {
            Self::Everything => true,
            Self::Units(ids) => ids.contains(&reservation.property_id),
        }
    }

    fn expense(&self, expense: &Expense) -> bool {
        match self {
            Self::Everything => true,
            Self::Units(ids) => expense.scope.unit_id().is_some_and(|id| ids.contains(&id)),
        }
    }
}

/// Realized revenue per bucket: `paid_amount` attributed to the check-in
/// month.
fn revenue_totals(
    buckets: &[MonthBucket],
    reservations: &[Reservation],
    scope: &SeriesScope<'_>,
) -> Vec<BucketTotal> {
    aggregate(
        buckets,
        reservations,
        |reservation| reservation.check_in,
        |reservation| reservation.paid_amount,
        |reservation| scope.reservation(reservation),
    )
}

fn expense_totals(
    buckets: &[MonthBucket],
    expenses: &[Expense],
    scope: &SeriesScope<'_>,
) -> Vec<BucketTotal> {
    aggregate(
        buckets,
        expenses,
        |expense| expense.date,
        |expense| expense.amount,
        |expense| scope.expense(expense),
    )
}

fn metric_totals(
    metric: Metric,
    buckets: &[MonthBucket],
    snapshot: &PortfolioSnapshot,
    scope: &SeriesScope<'_>,
) -> Vec<BucketTotal> {
    match metric {
        Metric::Revenue => revenue_totals(buckets, &snapshot.reservations, scope),
        Metric::Expenses => expense_totals(buckets, &snapshot.expenses, scope),
        Metric::Net => {
            let revenue = revenue_totals(buckets, &snapshot.reservations, scope);
            let expenses = expense_totals(buckets, &snapshot.expenses, scope);
            revenue
                .iter()
                .zip(expenses.iter())
                .map(|(revenue, expense)| BucketTotal {
                    bucket: revenue.bucket,
                    total: revenue.total - expense.total,
                })
                .collect()
        }
    }
}

/// Chart series for a selection: one `total` line when the selection covers
/// every unit (or nothing, which means "everything"), one line for an active
/// building, otherwise one line per selected unit.
pub fn series_for_selection(
    metric: Metric,
    buckets: &[MonthBucket],
    snapshot: &PortfolioSnapshot,
    buildings: &[Building],
    selection: &Selection,
) -> Vec<Series> {
    let scope = SelectionScope::new(buildings);

    if selection.is_empty(&scope) || selection.covers_all(&scope) {
        let totals = metric_totals(metric, buckets, snapshot, &SeriesScope::Everything);
        return vec![Series::from_totals(
            TOTAL_SERIES_KEY.to_string(),
            "All properties".to_string(),
            &totals,
        )];
    }

    let selected = selection.unit_ids(&scope);
    if let Some(name) = selection.active_building() {
        let totals = metric_totals(metric, buckets, snapshot, &SeriesScope::Units(&selected));
        return vec![Series::from_totals(
            name.to_string(),
            name.to_string(),
            &totals,
        )];
    }

    selected
        .iter()
        .map(|unit_id| {
            let only = BTreeSet::from([*unit_id]);
            let totals = metric_totals(metric, buckets, snapshot, &SeriesScope::Units(&only));
            let name = snapshot
                .unit(*unit_id)
                .map(|unit| unit.display_name().to_string())
                .unwrap_or_else(|| format!("Unit {unit_id}"));
            Series::from_totals(unit_id.to_string(), name, &totals)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenuePoint {
    pub month: &'static str,
    pub key: String,
    pub revenue: f64,
    pub expenses: f64,
    pub net: f64,
    pub realized: bool,
}

pub fn revenue_timeline(
    buckets: &[MonthBucket],
    snapshot: &PortfolioSnapshot,
    today: NaiveDate,
) -> Vec<RevenuePoint> {
    let revenue = revenue_totals(buckets, &snapshot.reservations, &SeriesScope::Everything);
    let expenses = expense_totals(buckets, &snapshot.expenses, &SeriesScope::Everything);
    revenue
        .iter()
        .zip(expenses.iter())
        .map(|(revenue, expense)| RevenuePoint {
            month: revenue.bucket.label(),
            key: revenue.bucket.key(),
            revenue: round2(revenue.total),
            expenses: round2(expense.total),
            net: round2(revenue.total - expense.total),
            realized: revenue.bucket.is_realized(today),
        })
        .collect()
}

/// Occupied nights and the revenue earned on those nights for one window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NightStats {
    pub occupied_nights: i64,
    pub nightly_revenue: f64,
}

impl NightStats {
    pub fn adr(&self) -> f64 {
        safe_ratio(self.nightly_revenue, self.occupied_nights as f64)
    }
}

/// Night-level view of reservations inside `[from, to]`: each reservation
/// contributes the nights it overlaps and the matching share of its paid
/// amount.
pub fn night_stats<'a, I>(reservations: I, from: NaiveDate, to: NaiveDate) -> NightStats
where
    I: IntoIterator<Item = &'a Reservation>,
{
    let mut stats = NightStats::default();
    for reservation in reservations {
        if reservation.is_cancelled() {
            continue;
        }
        let nights = reservation.nights_within(from, to);
        if nights == 0 {
            continue;
        }
        stats.occupied_nights += nights;
        stats.nightly_revenue += safe_ratio(
            reservation.paid_amount * nights as f64,
            reservation.total_nights() as f64,
        );
    }
    stats
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OccupancyPoint {
    pub month: &'static str,
    pub key: String,
    pub occupied_nights: i64,
    pub available_nights: i64,
    pub occupancy_rate: f64,
    pub realized: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdrPoint {
    pub month: &'static str,
    pub key: String,
    pub adr: f64,
    pub revpar: f64,
    pub realized: bool,
}

/// Monthly occupancy and ADR/RevPAR across the whole portfolio.
pub fn occupancy_and_adr_timelines(
    buckets: &[MonthBucket],
    snapshot: &PortfolioSnapshot,
    today: NaiveDate,
) -> (Vec<OccupancyPoint>, Vec<AdrPoint>) {
    let unit_count = snapshot.units.len() as i64;
    let mut occupancy = Vec::with_capacity(buckets.len());
    let mut adr = Vec::with_capacity(buckets.len());

    for bucket in buckets {
        let (Some(first), Some(last)) = (bucket.first_day(), bucket.last_day()) else {
            continue;
        };
        let stats = night_stats(&snapshot.reservations, first, last);
        let available_nights = unit_count * bucket.days();
        let occupancy_rate = safe_ratio(stats.occupied_nights as f64, available_nights as f64);
        let realized = bucket.is_realized(today);

        occupancy.push(OccupancyPoint {
            month: bucket.label(),
            key: bucket.key(),
            occupied_nights: stats.occupied_nights,
            available_nights,
            occupancy_rate: round4(occupancy_rate),
            realized,
        });
        adr.push(AdrPoint {
            month: bucket.label(),
            key: bucket.key(),
            adr: round2(stats.adr()),
            revpar: round2(stats.adr() * occupancy_rate),
            realized,
        });
    }

    (occupancy, adr)
}
