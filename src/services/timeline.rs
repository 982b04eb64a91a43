use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::services::recurring::last_day_of_month;

const MONTH_LABELS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// A calendar month. Identity is the `(year, month)` pair; the three-letter
/// label is only for display, so two Januaries of different years never
/// merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MonthBucket {
    pub year: i32,
    pub month: u32,
}

impl MonthBucket {
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn label(&self) -> &'static str {
        MONTH_LABELS
            .get(self.month.saturating_sub(1) as usize)
            .copied()
            .unwrap_or("???")
    }

    /// Sortable `YYYY-MM` key.
    pub fn key(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }

    pub fn index(&self) -> i64 {
        i64::from(self.year) * 12 + i64::from(self.month) - 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    pub fn last_day(&self) -> Option<NaiveDate> {
        last_day_of_month(self.year, self.month)
            .and_then(|day| NaiveDate::from_ymd_opt(self.year, self.month, day))
    }

    pub fn days(&self) -> i64 {
        last_day_of_month(self.year, self.month)
            .map(i64::from)
            .unwrap_or(0)
    }

    pub fn next(&self) -> Self {
        if self.month >= 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Realized months are the current month and everything before it;
    /// later months are projections.
    pub fn is_realized(&self, today: NaiveDate) -> bool {
        *self <= Self::of(today)
    }
}

/// One bucket per calendar month from `start`'s month through `end`'s month
/// inclusive. Empty when `end < start`.
pub fn month_buckets(start: NaiveDate, end: NaiveDate) -> Vec<MonthBucket> {
    if end < start {
        return Vec::new();
    }
    let first = MonthBucket::of(start);
    let count = MonthBucket::of(end).index() - first.index() + 1;

    let mut buckets = Vec::with_capacity(count.max(0) as usize);
    let mut current = first;
    for _ in 0..count {
        buckets.push(current);
        current = current.next();
    }
    buckets
}

/// Position of the bucket holding `date`, if any.
pub fn bucket_position(buckets: &[MonthBucket], date: NaiveDate) -> Option<usize> {
    let first = buckets.first()?;
    let offset = MonthBucket::of(date).index() - first.index();
    let position = usize::try_from(offset).ok()?;
    buckets
        .get(position)
        .filter(|bucket| bucket.contains(date))
        .map(|_| position)
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, NaiveDate};

    use super::{bucket_position, month_buckets, MonthBucket};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn builds_inclusive_month_range() {
        let buckets = month_buckets(date(2024, 1, 15), date(2024, 3, 2));
        let labels = buckets.iter().map(MonthBucket::label).collect::<Vec<_>>();
        assert_eq!(labels, vec!["Jan", "Feb", "Mar"]);
    }

    #[test]
    fn reversed_range_is_empty() {
        assert!(month_buckets(date(2024, 3, 1), date(2024, 2, 28)).is_empty());
        assert!(month_buckets(date(2024, 3, 10), date(2024, 3, 9)).is_empty());
    }

    #[test]
    fn bucket_count_matches_month_arithmetic() {
        let cases = [
            (date(2023, 11, 30), date(2024, 2, 1)),
            (date(2020, 1, 1), date(2024, 12, 31)),
            (date(2024, 6, 6), date(2024, 6, 6)),
        ];
        for (start, end) in cases {
            let expected = (i64::from(end.year()) * 12 + i64::from(end.month()))
                - (i64::from(start.year()) * 12 + i64::from(start.month()))
                + 1;
            assert_eq!(month_buckets(start, end).len() as i64, expected);
        }
    }

    #[test]
    fn multi_year_ranges_keep_years_apart() {
        let buckets = month_buckets(date(2023, 1, 1), date(2024, 1, 31));
        assert_eq!(buckets.len(), 13);
        assert_eq!(buckets[0].label(), buckets[12].label());
        assert_ne!(buckets[0], buckets[12]);
        assert_eq!(buckets[12].key(), "2024-01");
        assert_eq!(bucket_position(&buckets, date(2024, 1, 20)), Some(12));
        assert_eq!(bucket_position(&buckets, date(2023, 1, 20)), Some(0));
        assert_eq!(bucket_position(&buckets, date(2022, 12, 31)), None);
        assert_eq!(bucket_position(&buckets, date(2024, 2, 1)), None);
    }

    #[test]
    fn realized_months_include_current_month() {
        let today = date(2024, 5, 17);
        assert!(MonthBucket { year: 2024, month: 5 }.is_realized(today));
        assert!(MonthBucket { year: 2023, month: 12 }.is_realized(today));
        assert!(!MonthBucket { year: 2024, month: 6 }.is_realized(today));
    }

    #[test]
    fn month_lengths() {
        assert_eq!(MonthBucket { year: 2024, month: 2 }.days(), 29);
        assert_eq!(MonthBucket { year: 2023, month: 2 }.days(), 28);
        assert_eq!(
            MonthBucket { year: 2024, month: 12 }.last_day(),
            Some(date(2024, 12, 31))
        );
    }
}
