// 📅 Date buckets - calendar arithmetic for dashboard and analysis windows
//
// All keys are local calendar dates (YYYY-MM-DD). Weeks start on Monday,
// months on their first day. Conversions between instants and local dates
// are generic over the time zone so tests can pin one.

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Day,
    Week,
    Month,
}

impl Bucket {
    pub const ALL: [Bucket; 3] = [Bucket::Day, Bucket::Week, Bucket::Month];

    /// Value passed as `bucket` to the `group_timeseries` RPC
    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Day => "day",
            Bucket::Week => "week",
            Bucket::Month => "month",
        }
    }

    /// Normalize any date inside a bucket to the bucket's key date
    pub fn floor(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Bucket::Day => date,
            Bucket::Week => start_of_week(date),
            Bucket::Month => start_of_month(date),
        }
    }
}

// ============================================================================
// CALENDAR ARITHMETIC
// ============================================================================

pub fn start_of_week(date: NaiveDate) -> NaiveDate {
    add_days(date, -i64::from(date.weekday().num_days_from_monday()))
}

pub fn start_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn add_days(date: NaiveDate, days: i64) -> NaiveDate {
    let shifted = if days >= 0 {
        date.checked_add_days(Days::new(days as u64))
    } else {
        date.checked_sub_days(Days::new(days.unsigned_abs()))
    };
    shifted.unwrap_or(date)
}

pub fn add_months(date: NaiveDate, months: i32) -> NaiveDate {
    let shifted = if months >= 0 {
        date.checked_add_months(Months::new(months as u32))
    } else {
        date.checked_sub_months(Months::new(months.unsigned_abs()))
    };
    shifted.unwrap_or(date)
}

pub fn key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

// ============================================================================
// KEY SEQUENCES
// ============================================================================

/// Every day from `start` to `end`, inclusive
pub fn daily_keys(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    step_keys(start, end, |d| add_days(d, 1))
}

/// Every Monday from `start`'s week to `end`'s week
pub fn weekly_keys(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    step_keys(start_of_week(start), start_of_week(end), |d| add_days(d, 7))
}

/// Every first-of-month from `start`'s month to `end`'s month
pub fn monthly_keys(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    step_keys(start_of_month(start), start_of_month(end), |d| add_months(d, 1))
}

fn step_keys(start: NaiveDate, end: NaiveDate, step: impl Fn(NaiveDate) -> NaiveDate) -> Vec<NaiveDate> {
    let mut keys = Vec::new();
    let mut current = start;
    while current <= end {
        keys.push(current);
        let next = step(current);
        if next <= current {
            break;
        }
        current = next;
    }
    keys
}

// ============================================================================
// WINDOWS
// ============================================================================

/// The three analysis series windows, all ending today
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisWindow {
    pub today: NaiveDate,
    pub daily_start: NaiveDate,
    pub weekly_start: NaiveDate,
    pub monthly_start: NaiveDate,
}

impl AnalysisWindow {
    pub const DAYS: i64 = 30;
    pub const WEEKS: i64 = 12;
    pub const MONTHS: i32 = 6;

    pub fn ending(today: NaiveDate) -> Self {
        Self {
            today,
            daily_start: add_days(today, -(Self::DAYS - 1)),
            weekly_start: add_days(today, -7 * (Self::WEEKS - 1)),
            monthly_start: add_months(start_of_month(today), -(Self::MONTHS - 1)),
        }
    }

    pub fn start(&self, bucket: Bucket) -> NaiveDate {
        match bucket {
            Bucket::Day => self.daily_start,
            Bucket::Week => self.weekly_start,
            Bucket::Month => self.monthly_start,
        }
    }

    pub fn keys(&self, bucket: Bucket) -> Vec<NaiveDate> {
        match bucket {
            Bucket::Day => daily_keys(self.daily_start, self.today),
            Bucket::Week => weekly_keys(self.weekly_start, self.today),
            Bucket::Month => monthly_keys(self.monthly_start, self.today),
        }
    }

    /// Earliest date any series counts
    pub fn earliest(&self) -> NaiveDate {
        self.daily_start.min(self.weekly_start).min(self.monthly_start)
    }

    /// On or after the window start for `bucket`. The first week key may
    /// begin before `weekly_start`; days in between are not counted.
    pub fn counts(&self, bucket: Bucket, date: NaiveDate) -> bool {
        date >= self.start(bucket) && date <= self.today
    }
}

/// Half-open local date range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateSpan {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateSpan {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }
}

/// Dashboard doughnut windows; every one ends at the end of today
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DashboardWindows {
    pub today: DateSpan,
    pub week: DateSpan,
    pub month: DateSpan,
}

impl DashboardWindows {
    pub fn ending(today: NaiveDate) -> Self {
        let end = add_days(today, 1);
        Self {
            today: DateSpan { start: today, end },
            week: DateSpan {
                start: add_days(today, -6),
                end,
            },
            month: DateSpan {
                start: start_of_month(today),
                end,
            },
        }
    }
}

// ============================================================================
// LOCAL TIME
// ============================================================================

/// Calendar date of an instant in the given zone
pub fn local_date<Tz: TimeZone>(instant: &DateTime<Utc>, tz: &Tz) -> NaiveDate {
    instant.with_timezone(tz).date_naive()
}

/// Instant of local midnight starting `date`
pub fn local_day_start<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    local_to_utc(date.and_time(NaiveTime::MIN), tz)
}

/// Interpret a wall-clock time in the given zone. In a DST gap the naive
/// value is read as UTC; in an overlap the earlier instant wins.
pub fn local_to_utc<Tz: TimeZone>(naive: NaiveDateTime, tz: &Tz) -> DateTime<Utc> {
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Weekday};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_week_and_month_starts() {
        // 2025-03-13 is a Thursday
        assert_eq!(start_of_week(d(2025, 3, 13)), d(2025, 3, 10));
        assert_eq!(start_of_week(d(2025, 3, 10)), d(2025, 3, 10));
        assert_eq!(start_of_week(d(2025, 3, 16)), d(2025, 3, 10));
        assert_eq!(start_of_month(d(2025, 3, 13)), d(2025, 3, 1));
        assert_eq!(add_months(d(2025, 1, 1), -5), d(2024, 8, 1));
    }

    #[test]
    fn test_thirty_day_window_has_thirty_ascending_keys() {
        let window = AnalysisWindow::ending(d(2025, 3, 13));
        let keys = window.keys(Bucket::Day);
        assert_eq!(keys.len(), 30);
        assert_eq!(keys.first(), Some(&d(2025, 2, 12)));
        assert_eq!(keys.last(), Some(&d(2025, 3, 13)));
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_weekly_keys_are_twelve_mondays() {
        let window = AnalysisWindow::ending(d(2025, 3, 13));
        let keys = window.keys(Bucket::Week);
        assert_eq!(keys.len(), 12);
        assert!(keys.iter().all(|k| k.weekday() == Weekday::Mon));
        assert_eq!(keys.last(), Some(&d(2025, 3, 10)));
    }

    #[test]
    fn test_first_week_key_precedes_weekly_start() {
        let window = AnalysisWindow::ending(d(2025, 3, 13));
        assert_eq!(window.weekly_start, d(2024, 12, 26));
        assert_eq!(window.keys(Bucket::Week)[0], d(2024, 12, 23));
        assert_eq!(window.earliest(), d(2024, 10, 1));
        assert!(!window.counts(Bucket::Week, d(2024, 12, 23)));
        assert!(!window.counts(Bucket::Week, d(2024, 12, 25)));
        assert!(window.counts(Bucket::Week, d(2024, 12, 26)));
        assert!(window.counts(Bucket::Month, d(2024, 12, 23)));
        assert!(!window.counts(Bucket::Day, d(2025, 2, 11)));
    }

    #[test]
    fn test_monthly_keys_are_six_firsts() {
        let window = AnalysisWindow::ending(d(2025, 3, 13));
        let keys = window.keys(Bucket::Month);
        assert_eq!(keys.len(), 6);
        assert!(keys.iter().all(|k| k.day() == 1));
        assert_eq!(keys.first(), Some(&d(2024, 10, 1)));
        assert_eq!(keys.last(), Some(&d(2025, 3, 1)));
    }

    #[test]
    fn test_key_sequences_cross_year_boundary() {
        let keys = monthly_keys(d(2024, 11, 20), d(2025, 2, 3));
        let rendered: Vec<String> = keys.into_iter().map(key).collect();
        assert_eq!(rendered, vec!["2024-11-01", "2024-12-01", "2025-01-01", "2025-02-01"]);
        assert!(daily_keys(d(2025, 1, 2), d(2025, 1, 1)).is_empty());
    }

    #[test]
    fn test_dashboard_windows() {
        let w = DashboardWindows::ending(d(2025, 3, 13));
        assert!(w.today.contains(d(2025, 3, 13)));
        assert!(!w.today.contains(d(2025, 3, 14)));
        assert!(w.week.contains(d(2025, 3, 7)));
        assert!(!w.week.contains(d(2025, 3, 6)));
        assert!(w.month.contains(d(2025, 3, 1)));
        assert!(!w.month.contains(d(2025, 2, 28)));
    }

    #[test]
    fn test_local_date_and_day_start() {
        let warsaw = FixedOffset::east_opt(3600).unwrap();
        let late = Utc.with_ymd_and_hms(2025, 3, 13, 23, 30, 0).unwrap();
        assert_eq!(local_date(&late, &warsaw), d(2025, 3, 14));
        assert_eq!(
            local_day_start(d(2025, 3, 14), &warsaw),
            Utc.with_ymd_and_hms(2025, 3, 13, 23, 0, 0).unwrap()
        );
    }
}
