use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::services::{
    aggregation::night_stats,
    grouping::{building_name, group_by_building},
    numeric::{round2, round4, safe_ratio},
    records::{PortfolioSnapshot, PropertyScope, Reservation, Unit, PORTFOLIO_WIDE_LABEL},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyPerformance {
    pub property_id: i64,
    pub name: String,
    pub building: String,
    pub revenue: f64,
    pub expenses: f64,
    pub net: f64,
    pub reservation_count: usize,
    pub occupied_nights: i64,
    pub available_nights: i64,
    pub occupancy_rate: f64,
    pub adr: f64,
    pub revpar: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseComparison {
    pub property_id: Option<i64>,
    pub name: String,
    pub revenue: f64,
    pub expenses: f64,
}

fn in_range(date: Option<NaiveDate>, from: NaiveDate, to: NaiveDate) -> bool {
    date.is_some_and(|date| date >= from && date <= to)
}

fn range_days(from: NaiveDate, to: NaiveDate) -> i64 {
    ((to - from).num_days() + 1).max(0)
}

/// Per-unit figures over `[from, to]`. Revenue follows the check-in month
/// rule used by the timelines; occupancy and ADR are night based.
pub fn property_performance(
    snapshot: &PortfolioSnapshot,
    from: NaiveDate,
    to: NaiveDate,
) -> Vec<PropertyPerformance> {
    let days = range_days(from, to);

    snapshot
        .units
        .iter()
        .map(|unit| {
            let reservations = snapshot
                .reservations
                .iter()
                .filter(|reservation| reservation.property_id == unit.id)
                .filter(|reservation| !reservation.is_cancelled())
                .collect::<Vec<_>>();

            let booked = reservations
                .iter()
                .filter(|reservation| in_range(reservation.check_in, from, to))
                .collect::<Vec<_>>();
            let revenue: f64 = booked.iter().map(|reservation| reservation.paid_amount).sum();

            let expenses: f64 = snapshot
                .expenses
                .iter()
                .filter(|expense| expense.scope == PropertyScope::Unit(unit.id))
                .filter(|expense| in_range(expense.date, from, to))
                .map(|expense| expense.amount)
                .sum();

            let stats = night_stats(reservations.iter().copied(), from, to);
            let occupancy_rate = safe_ratio(stats.occupied_nights as f64, days as f64);

            PropertyPerformance {
                property_id: unit.id,
                name: unit.display_name().to_string(),
                building: building_name(unit).to_string(),
                revenue: round2(revenue),
                expenses: round2(expenses),
                net: round2(revenue - expenses),
                reservation_count: booked.len(),
                occupied_nights: stats.occupied_nights,
                available_nights: days,
                occupancy_rate: round4(occupancy_rate),
                adr: round2(stats.adr()),
                revpar: round2(stats.adr() * occupancy_rate),
            }
        })
        .collect()
}

/// Revenue vs expenses per unit, plus a portfolio-wide row when shared
/// expenses exist in the window.
pub fn expense_comparison(
    snapshot: &PortfolioSnapshot,
    performance: &[PropertyPerformance],
    from: NaiveDate,
    to: NaiveDate,
) -> Vec<ExpenseComparison> {
    let mut rows = performance
        .iter()
        .map(|item| ExpenseComparison {
            property_id: Some(item.property_id),
            name: item.name.clone(),
            revenue: item.revenue,
            expenses: item.expenses,
        })
        .collect::<Vec<_>>();

    let shared: f64 = snapshot
        .expenses
        .iter()
        .filter(|expense| expense.scope == PropertyScope::Portfolio)
        .filter(|expense| in_range(expense.date, from, to))
        .map(|expense| expense.amount)
        .sum();
    if shared != 0.0 {
        rows.push(ExpenseComparison {
            property_id: None,
            name: PORTFOLIO_WIDE_LABEL.to_string(),
            revenue: 0.0,
            expenses: round2(shared),
        });
    }
    rows
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildingRollup {
    pub building_name: String,
    pub location: Option<String>,
    pub property_type: Option<String>,
    pub unit_count: usize,
    pub occupied_units: usize,
    pub total_revenue: f64,
    pub occupancy_rate: f64,
}

fn is_occupied_on(reservation: &Reservation, day: NaiveDate) -> bool {
    if reservation.is_cancelled() {
        return false;
    }
    match (reservation.check_in, reservation.check_out) {
        (Some(check_in), Some(check_out)) => check_in <= day && day < check_out,
        _ => false,
    }
}

/// Per-building unit counts, units occupied on `today`, realized revenue and
/// occupancy. Buildings left without units are dropped.
pub fn building_rollups(
    units: &[Unit],
    reservations: &[Reservation],
    today: NaiveDate,
) -> Vec<BuildingRollup> {
    let mut by_unit: HashMap<i64, Vec<&Reservation>> = HashMap::new();
    for reservation in reservations {
        by_unit
            .entry(reservation.property_id)
            .or_default()
            .push(reservation);
    }

    group_by_building(units)
        .into_iter()
        .filter(|building| !building.units.is_empty())
        .map(|building| {
            let mut occupied_units = 0;
            let mut total_revenue = 0.0;
            for unit in &building.units {
                let unit_reservations = by_unit.get(&unit.id).map(Vec::as_slice).unwrap_or(&[]);
                if unit_reservations
                    .iter()
                    .any(|reservation| is_occupied_on(reservation, today))
                {
                    occupied_units += 1;
                }
                total_revenue += unit_reservations
                    .iter()
                    .filter(|reservation| !reservation.is_cancelled())
                    .map(|reservation| reservation.paid_amount)
                    .filter(|amount| amount.is_finite())
                    .sum::<f64>();
            }
            let unit_count = building.units.len();
            let first = building.units.first();
            BuildingRollup {
                location: first.and_then(|unit| unit.location.clone()),
                property_type: first.and_then(|unit| unit.property_type.clone()),
                building_name: building.name,
                unit_count,
                occupied_units,
                total_revenue: round2(total_revenue),
                occupancy_rate: round4(safe_ratio(occupied_units as f64, unit_count as f64)),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::{building_rollups, expense_comparison, property_performance};
    use crate::services::{
        grouping::tests::unit,
        records::{Expense, PortfolioSnapshot, Reservation},
    };

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn reservation(id: i64, property_id: i64, check_in: &str, check_out: &str, paid: f64, status: &str) -> Reservation {
        Reservation::from_row(&json!({
            "id": id,
            "property_id": property_id,
            "check_in": check_in,
            "check_out": check_out,
            "paid_amount": paid,
            "status": status
        }))
        .expect("reservation")
    }

    fn snapshot() -> PortfolioSnapshot {
        PortfolioSnapshot {
            units: vec![
                unit(1, Some("Sunset Villas"), Some("Villa 1")),
                unit(2, Some("Sunset Villas"), Some("Villa 2")),
                unit(3, Some("Palm Court"), Some("Palm 1")),
            ],
            reservations: vec![
                reservation(10, 1, "2024-04-01", "2024-04-11", 1000.0, "confirmed"),
                reservation(11, 1, "2024-04-20", "2024-04-25", 700.0, "cancelled"),
                reservation(12, 3, "2024-03-28", "2024-04-03", 600.0, "checked_in"),
            ],
            expenses: vec![
                Expense::from_row(&json!({
                    "id": 1, "property_id": 1, "amount": 150, "expense_date": "2024-04-02"
                }))
                .expect("expense"),
                Expense::from_row(&json!({
                    "id": 2, "property_id": "Portfolio Wide", "amount": 90, "expense_date": "2024-04-09"
                }))
                .expect("expense"),
            ],
        }
    }

    #[test]
    fn computes_per_unit_performance() {
        let snapshot = snapshot();
        let performance = property_performance(&snapshot, date(2024, 4, 1), date(2024, 4, 30));

        let villa = &performance[0];
        assert_eq!(villa.revenue, 1000.0);
        assert_eq!(villa.expenses, 150.0);
        assert_eq!(villa.net, 850.0);
        assert_eq!(villa.reservation_count, 1);
        assert_eq!(villa.occupied_nights, 10);
        assert_eq!(villa.available_nights, 30);
        assert_eq!(villa.occupancy_rate, 0.3333);
        assert_eq!(villa.adr, 100.0);
        assert_eq!(villa.revpar, 33.33);

        // Checked in during March: nights count in April, revenue does not.
        let palm = &performance[2];
        assert_eq!(palm.revenue, 0.0);
        assert_eq!(palm.occupied_nights, 2);
        assert_eq!(palm.adr, 100.0);
    }

    #[test]
    fn comparison_adds_portfolio_row() {
        let snapshot = snapshot();
        let from = date(2024, 4, 1);
        let to = date(2024, 4, 30);
        let performance = property_performance(&snapshot, from, to);
        let rows = expense_comparison(&snapshot, &performance, from, to);
        assert_eq!(rows.len(), 4);
        let last = rows.last().expect("portfolio row");
        assert_eq!(last.property_id, None);
        assert_eq!(last.expenses, 90.0);
    }

    #[test]
    fn rollups_count_units_occupied_today() {
        let snapshot = snapshot();
        let rollups = building_rollups(&snapshot.units, &snapshot.reservations, date(2024, 4, 2));
        assert_eq!(rollups.len(), 2);

        let sunset = &rollups[0];
        assert_eq!(sunset.building_name, "Sunset Villas");
        assert_eq!(sunset.unit_count, 2);
        assert_eq!(sunset.occupied_units, 1);
        assert_eq!(sunset.total_revenue, 1000.0);
        assert_eq!(sunset.occupancy_rate, 0.5);

        let palm = &rollups[1];
        assert_eq!(palm.occupied_units, 1);
        assert_eq!(palm.occupancy_rate, 1.0);
    }

    #[test]
    fn rollups_of_nothing_are_empty() {
        assert!(building_rollups(&[], &[], date(2024, 1, 1)).is_empty());
    }
}
