use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::services::{
    numeric::round2,
    records::{Expense, PropertyScope},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceFrequency {
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl RecurrenceFrequency {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            "quarterly" => Some(Self::Quarterly),
            "yearly" | "annually" | "annual" => Some(Self::Yearly),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Yearly => "yearly",
        }
    }

    /// Multiplier turning one occurrence into an average monthly cost.
    pub fn monthly_factor(self) -> f64 {
        match self {
            Self::Weekly => 52.0 / 12.0,
            Self::Monthly => 1.0,
            Self::Quarterly => 1.0 / 3.0,
            Self::Yearly => 1.0 / 12.0,
        }
    }

    fn step(self, date: NaiveDate, anchor_day: u32) -> Option<NaiveDate> {
        match self {
            Self::Weekly => date.checked_add_signed(Duration::days(7)),
            Self::Monthly => add_months_clamped(date, 1, anchor_day),
            Self::Quarterly => add_months_clamped(date, 3, anchor_day),
            Self::Yearly => add_months_clamped(date, 12, anchor_day),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecurringEntry {
    pub expense_id: i64,
    pub property_id: PropertyScope,
    pub category: String,
    pub vendor: Option<String>,
    pub description: Option<String>,
    pub amount: f64,
    pub frequency: RecurrenceFrequency,
    pub last_date: NaiveDate,
    pub next_due: NaiveDate,
    pub monthly_equivalent: f64,
}

/// First date of the series starting at `last_date` that falls strictly
/// after `today`. Month steps keep the original day of month, clamped to
/// the month's last day (Jan 31 -> Feb 29 -> Mar 31).
pub fn next_occurrence(
    last_date: NaiveDate,
    frequency: RecurrenceFrequency,
    today: NaiveDate,
) -> Option<NaiveDate> {
    let anchor_day = last_date.day();
    let mut current = frequency.step(last_date, anchor_day)?;
    if current > today {
        return Some(current);
    }

    // Jump close to `today` first so old series do not iterate for years.
    if frequency == RecurrenceFrequency::Weekly {
        let weeks_behind = (today - current).num_days() / 7;
        current = current.checked_add_signed(Duration::days(weeks_behind * 7))?;
    } else {
        let months_per_step = match frequency {
            RecurrenceFrequency::Monthly => 1,
            RecurrenceFrequency::Quarterly => 3,
            _ => 12,
        };
        let months_behind = month_index(today) - month_index(current);
        let steps = (months_behind / months_per_step).max(0);
        if steps > 0 {
            current = add_months_clamped(current, (steps * months_per_step) as u32, anchor_day)?;
        }
    }

    while current <= today {
        current = frequency.step(current, anchor_day)?;
    }
    Some(current)
}

/// Recurring expenses with their next due date, soonest first.
pub fn recurring_schedule(expenses: &[Expense], today: NaiveDate) -> Vec<RecurringEntry> {
    let mut entries = expenses
        .iter()
        .filter(|expense| expense.recurring)
        .filter_map(|expense| {
            let frequency = expense.frequency?;
            let last_date = expense.date?;
            let next_due = next_occurrence(last_date, frequency, today)?;
            Some(RecurringEntry {
                expense_id: expense.id,
                property_id: expense.scope,
                category: expense.category.clone(),
                vendor: expense.vendor.clone(),
                description: expense.description.clone(),
                amount: round2(expense.amount),
                frequency,
                last_date,
                next_due,
                monthly_equivalent: round2(expense.amount * frequency.monthly_factor()),
            })
        })
        .collect::<Vec<_>>();
    entries.sort_by(|left, right| {
        left.next_due
            .cmp(&right.next_due)
            .then(left.expense_id.cmp(&right.expense_id))
    });
    entries
}

fn month_index(date: NaiveDate) -> i64 {
    i64::from(date.year()) * 12 + i64::from(date.month0())
}

fn add_months_clamped(date: NaiveDate, months: u32, anchor_day: u32) -> Option<NaiveDate> {
    let total = month_index(date) + i64::from(months);
    let year = i32::try_from(total.div_euclid(12)).ok()?;
    let month = (total.rem_euclid(12) + 1) as u32;
    let last_day = last_day_of_month(year, month)?;
    NaiveDate::from_ymd_opt(year, month, anchor_day.min(last_day))
}

pub fn last_day_of_month(year: i32, month: u32) -> Option<u32> {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }?;
    first_of_next.pred_opt().map(|date| date.day())
}
