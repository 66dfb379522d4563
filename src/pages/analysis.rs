// 📉 Analysis - per-category daily, weekly and monthly spend lines
//
// Series are keyed by local bucket start (Monday weeks, first-of-month
// months). Amounts landing outside a window's keys are dropped.

use crate::access::Viewer;
use crate::backend::{fetch, rpc_rows, timestamp_param, Backend, Query};
use crate::buckets::{local_date, local_day_start, AnalysisWindow, Bucket};
use crate::charts::{fallback_color, pick_unit, to_points, Point, TimeUnit};
use crate::config::{Preferences, ViewMode};
use crate::entities::expense::{Expense, EXPENSE_TABLE};
use crate::entities::{Category, Group, TimeseriesRow};
use crate::error::BackendResult;
use crate::groups::{choose, pick_active, visible_groups};
use super::categories::{active_categories, PickerOrder};
use chrono::{DateTime, NaiveDate, TimeZone};
use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};

pub const TIMESERIES_RPC: &str = "group_timeseries";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySeries {
    pub name: String,
    pub color: String,
    pub daily: Vec<Point>,
    pub weekly: Vec<Point>,
    pub monthly: Vec<Point>,
}

impl CategorySeries {
    pub fn points(&self, bucket: Bucket) -> &[Point] {
        match bucket {
            Bucket::Day => &self.daily,
            Bucket::Week => &self.weekly,
            Bucket::Month => &self.monthly,
        }
    }

    pub fn unit(&self, bucket: Bucket) -> TimeUnit {
        pick_unit(self.points(bucket))
    }

    fn has_spend(&self) -> bool {
        [&self.daily, &self.weekly, &self.monthly]
            .iter()
            .any(|points| points.iter().any(|p| p.y > 0.0))
    }
}

/// Zero-filled per-category sums for the three windows
#[derive(Debug, Clone)]
pub struct SeriesBuilder {
    window: AnalysisWindow,
    sums: BTreeMap<String, [BTreeMap<NaiveDate, f64>; 3]>,
}

fn slot(bucket: Bucket) -> usize {
    match bucket {
        Bucket::Day => 0,
        Bucket::Week => 1,
        Bucket::Month => 2,
    }
}

impl SeriesBuilder {
    pub fn new(window: AnalysisWindow) -> Self {
        Self {
            window,
            sums: BTreeMap::new(),
        }
    }

    /// Add to the bucket containing `date`; false when it is outside the window
    pub fn add(&mut self, category: &str, bucket: Bucket, date: NaiveDate, amount: f64) -> bool {
        let window = self.window;
        let buckets = self.sums.entry(category.to_string()).or_insert_with(|| {
            Bucket::ALL.map(|b| window.keys(b).into_iter().map(|k| (k, 0.0)).collect())
        });
        match buckets[slot(bucket)].get_mut(&bucket.floor(date)) {
            Some(sum) => {
                *sum += amount;
                true
            }
            None => false,
        }
    }

    /// Categories with any spend, sorted by name
    pub fn finish(self, colors: &HashMap<String, String>) -> Vec<CategorySeries> {
        self.sums
            .into_iter()
            .map(|(name, [daily, weekly, monthly])| CategorySeries {
                color: colors
                    .get(&name)
                    .filter(|c| !c.is_empty())
                    .cloned()
                    .unwrap_or_else(|| fallback_color(&name).to_string()),
                daily: to_points(daily),
                weekly: to_points(weekly),
                monthly: to_points(monthly),
                name,
            })
            .filter(CategorySeries::has_spend)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisPage {
    pub mode: ViewMode,
    #[serde(skip)]
    user_id: String,
    pub currency: String,
    pub groups: Vec<Group>,
    pub group: Option<Group>,
    #[serde(skip)]
    pub window: AnalysisWindow,
    #[serde(skip)]
    colors: HashMap<String, String>,
    pub series: Vec<CategorySeries>,
}

impl AnalysisPage {
    pub fn load<Tz: TimeZone>(
        backend: &dyn Backend,
        mode: ViewMode,
        prefs: &mut Preferences,
        currency: &str,
        now: &DateTime<Tz>,
    ) -> BackendResult<Self> {
        let viewer = Viewer::load(backend)?;
        let colors = active_categories(backend, PickerOrder::Name)?
            .into_iter()
            .map(|c: Category| (c.name, c.color.unwrap_or_default()))
            .collect();

        let (groups, group) = match mode {
            ViewMode::Group => {
                let groups = visible_groups(backend, viewer.id(), viewer.is_superadmin)?;
                let (group, _) = pick_active(&groups, prefs);
                (groups, group)
            }
            ViewMode::My => (Vec::new(), None),
        };

        let mut page = Self {
            mode,
            user_id: viewer.id().to_string(),
            currency: currency.to_string(),
            groups,
            group,
            window: AnalysisWindow::ending(now.date_naive()),
            colors,
            series: Vec::new(),
        };
        page.refresh(backend, now)?;
        Ok(page)
    }

    pub fn pick_group<Tz: TimeZone>(
        &mut self,
        backend: &dyn Backend,
        id: &str,
        prefs: &mut Preferences,
        now: &DateTime<Tz>,
    ) -> BackendResult<()> {
        if self.mode != ViewMode::Group {
            return Ok(());
        }
        let Some(group) = choose(&self.groups, id, prefs) else {
            return Ok(());
        };
        self.group = Some(group);
        self.refresh(backend, now)
    }

    fn refresh<Tz: TimeZone>(&mut self, backend: &dyn Backend, now: &DateTime<Tz>) -> BackendResult<()> {
        let tz = now.timezone();
        self.window = AnalysisWindow::ending(now.date_naive());
        let mut builder = SeriesBuilder::new(self.window);

        match (self.mode, &self.group) {
            (ViewMode::My, _) => {
                let since = local_day_start(self.window.earliest(), &tz);
                let expenses: Vec<Expense> = fetch(
                    backend,
                    EXPENSE_TABLE,
                    &Query::new()
                        .select("amount, currency, spent_at_utc, category:category_id(name)")
                        .eq("user_id", &self.user_id)
                        .gte("spent_at_utc", timestamp_param(&since))
                        .order("spent_at_utc", true),
                )?;
                for expense in expenses.iter().filter(|e| e.currency == self.currency) {
                    let day = local_date(&expense.spent_at_utc, &tz);
                    for bucket in Bucket::ALL.into_iter().filter(|b| self.window.counts(*b, day)) {
                        builder.add(expense.category_name(), bucket, day, expense.amount);
                    }
                }
            }
            (ViewMode::Group, Some(group)) => {
                for bucket in Bucket::ALL {
                    let start = local_day_start(self.window.start(bucket), &tz);
                    let rows: Vec<TimeseriesRow> = rpc_rows(
                        backend,
                        TIMESERIES_RPC,
                        json!({
                            "g": group.id,
                            "start_ts": timestamp_param(&start),
                            "bucket": bucket.as_str(),
                        }),
                    )?;
                    for row in rows.iter().filter(|r| r.currency == self.currency) {
                        builder.add(row.category_name(), bucket, row.bucket_start.date_naive(), row.total);
                    }
                }
            }
            (ViewMode::Group, None) => {}
        }

        self.series = builder.finish(&self.colors);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::FakeBackend;
    use crate::entities::category::CATEGORY_TABLE;
    use crate::entities::group::GROUP_TABLE;
    use crate::entities::profile::PROFILE_TABLE;
    use crate::pages::testing::now;
    use serde_json::Value;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_builder_drops_out_of_window_and_hides_silent_categories() {
        let window = AnalysisWindow::ending(d(2025, 3, 13));
        let mut builder = SeriesBuilder::new(window);
        assert!(builder.add("Food", Bucket::Day, d(2025, 3, 12), 10.0));
        assert!(!builder.add("Food", Bucket::Day, d(2025, 1, 1), 10.0));
        assert!(builder.add("Food", Bucket::Week, d(2025, 3, 12), 10.0));
        assert!(!builder.add("Ghost", Bucket::Month, d(2024, 1, 1), 10.0));

        let series = builder.finish(&HashMap::new());
        assert_eq!(series.len(), 1);
        let food = &series[0];
        assert_eq!(food.daily.len(), 30);
        assert_eq!(food.weekly.len(), 12);
        assert_eq!(food.monthly.len(), 6);
        assert_eq!(food.weekly.last().map(|p| (p.x, p.y)), Some((d(2025, 3, 10), 10.0)));
        assert_eq!(food.color, fallback_color("Food"));
        assert_eq!(food.unit(Bucket::Week), TimeUnit::Week);
        assert_eq!(food.unit(Bucket::Month), TimeUnit::Month);
    }

    #[test]
    fn test_my_analysis_buckets_local_dates() {
        let expense = |amount: f64, cur: &str, cat: &str, at: &str| -> Value {
            json!({ "user_id": "u-1", "amount": amount, "currency": cur,
                    "spent_at_utc": at, "category": { "name": cat } })
        };
        let backend = FakeBackend::new()
            .signed_in_as("u-1", "a@example.com")
            .with_table(
                CATEGORY_TABLE,
                vec![json!({ "id": "c-1", "name": "Food", "color": "#123456", "is_active": true })],
            )
            .with_table(
                EXPENSE_TABLE,
                vec![
                    // local 2025-03-10 00:30, a Monday
                    expense(12.346, "PLN", "Food", "2025-03-09T23:30:00Z"),
                    expense(50.0, "EUR", "Fuel", "2025-03-11T10:00:00Z"),
                    expense(8.0, "PLN", "Books", "2025-03-01T10:00:00Z"),
                ],
            );

        let page =
            AnalysisPage::load(&backend, ViewMode::My, &mut Preferences::default(), "PLN", &now()).unwrap();
        let names: Vec<&str> = page.series.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Books", "Food"]);

        let food = &page.series[1];
        assert_eq!(food.color, "#123456");
        let mar10 = food.daily.iter().find(|p| p.x == d(2025, 3, 10)).unwrap();
        assert_eq!(mar10.y, 12.35);
        assert_eq!(food.weekly.last().unwrap().y, 12.35);
        assert_eq!(food.monthly.last().unwrap().y, 12.35);
    }

    #[test]
    fn test_my_weekly_series_starts_at_window_start() {
        // Monday key 2024-12-23 precedes the 12-week start of 2024-12-26
        let backend = FakeBackend::new()
            .signed_in_as("u-1", "a@example.com")
            .with_table(
                EXPENSE_TABLE,
                vec![
                    json!({ "user_id": "u-1", "amount": 50.0, "currency": "PLN",
                            "spent_at_utc": "2024-12-23T10:00:00Z", "category": { "name": "Food" } }),
                    json!({ "user_id": "u-1", "amount": 7.0, "currency": "PLN",
                            "spent_at_utc": "2024-12-26T10:00:00Z", "category": { "name": "Fuel" } }),
                ],
            );

        let page =
            AnalysisPage::load(&backend, ViewMode::My, &mut Preferences::default(), "PLN", &now()).unwrap();
        let names: Vec<&str> = page.series.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Food", "Fuel"]);

        // still inside the six-month window
        let food = &page.series[0];
        assert!(food.weekly.iter().all(|p| p.y == 0.0));
        assert_eq!(food.monthly.iter().find(|p| p.x == d(2024, 12, 1)).map(|p| p.y), Some(50.0));

        let first = page.series[1].weekly[0];
        assert_eq!((first.x, first.y), (d(2024, 12, 23), 7.0));
    }

    #[test]
    fn test_group_analysis_calls_timeseries_per_bucket() {
        let backend = FakeBackend::new()
            .signed_in_as("u-1", "a@example.com")
            .with_table(PROFILE_TABLE, vec![json!({ "user_id": "u-1", "is_superadmin": true })])
            .with_table(GROUP_TABLE, vec![json!({ "id": "g-1", "name": "Home" })])
            .with_rpc_fn(TIMESERIES_RPC, |args| {
                Ok(match args["bucket"].as_str() {
                    Some("week") => json!([
                        { "bucket_start": "2025-03-10T00:00:00Z", "category": "Food", "currency": "PLN", "total": "20" },
                        { "bucket_start": "2025-03-10T00:00:00Z", "category": "Food", "currency": "USD", "total": 99 }
                    ]),
                    _ => json!([]),
                })
            });

        let page =
            AnalysisPage::load(&backend, ViewMode::Group, &mut Preferences::default(), "PLN", &now()).unwrap();
        let calls = backend.calls_of("rpc");
        let timeseries: Vec<&Value> = calls
            .iter()
            .filter(|c| c.target == TIMESERIES_RPC)
            .map(|c| &c.payload)
            .collect();
        assert_eq!(timeseries.len(), 3);
        assert_eq!(timeseries[0]["start_ts"], "2025-02-11T23:00:00Z");
        assert_eq!(timeseries[1]["bucket"], "week");

        assert_eq!(page.series.len(), 1);
        assert_eq!(page.series[0].weekly.last().unwrap().y, 20.0);
        assert!(page.series[0].daily.iter().all(|p| p.y == 0.0));
    }
}
