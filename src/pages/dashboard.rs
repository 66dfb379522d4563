// 📈 Dashboard - summary cards and today / week / month doughnuts
//
// Only rows in the configured currency count. In Group mode every
// per-category aggregate stands in for one row dated at its first expense.

use crate::access::Viewer;
use crate::backend::{fetch, rpc_rows, Backend, Query};
use crate::buckets::{local_date, DashboardWindows, DateSpan};
use crate::charts::Doughnut;
use crate::config::{Preferences, ViewMode};
use crate::entities::expense::{Expense, EXPENSE_TABLE};
use crate::entities::{CategoryAggregate, Group};
use crate::error::BackendResult;
use crate::groups::{choose, member_groups, pick_active};
use super::group_view::BY_CATEGORY_RPC;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::json;

/// Categories left out of the non-rental month card
pub const NON_RENTAL_EXCLUDED: [&str; 2] = ["Rental", "Bills & Utilities"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpendRow {
    pub amount: f64,
    pub category: String,
    pub spent_at: DateTime<Utc>,
}

impl SpendRow {
    pub fn from_expense(expense: &Expense) -> Self {
        Self {
            amount: expense.amount,
            category: expense.category_name().to_string(),
            spent_at: expense.spent_at_utc,
        }
    }

    /// Undated aggregates count as spent now
    pub fn from_aggregate(row: &CategoryAggregate, now: DateTime<Utc>) -> Self {
        Self {
            amount: row.total,
            category: row.category_name().to_string(),
            spent_at: row.first_date.unwrap_or(now),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Cards {
    pub this_month_total: f64,
    pub this_month_count: usize,
    pub all_time_total: f64,
    pub non_rental_month: f64,
    pub average: f64,
    pub top_category: Option<String>,
}

impl Cards {
    pub fn compute<Tz: TimeZone>(rows: &[SpendRow], month: DateSpan, tz: &Tz) -> Self {
        let all_time_total: f64 = rows.iter().map(|r| r.amount).sum();
        let this_month: Vec<&SpendRow> = rows
            .iter()
            .filter(|r| month.contains(local_date(&r.spent_at, tz)))
            .collect();

        Self {
            this_month_total: this_month.iter().map(|r| r.amount).sum(),
            this_month_count: this_month.len(),
            all_time_total,
            non_rental_month: this_month
                .iter()
                .filter(|r| !NON_RENTAL_EXCLUDED.contains(&r.category.as_str()))
                .map(|r| r.amount)
                .sum(),
            average: if rows.is_empty() {
                0.0
            } else {
                all_time_total / rows.len() as f64
            },
            top_category: top_category(rows),
        }
    }
}

/// Sums must beat this to lead, so net refunds never top the list
const TOP_CATEGORY_FLOOR: f64 = -1.0;

/// Largest sum; on a tie the category seen first keeps the lead
pub fn top_category(rows: &[SpendRow]) -> Option<String> {
    let mut sums: Vec<(&str, f64)> = Vec::new();
    for row in rows {
        match sums.iter_mut().find(|(name, _)| *name == row.category) {
            Some((_, sum)) => *sum += row.amount,
            None => sums.push((&row.category, row.amount)),
        }
    }
    let mut best: Option<&str> = None;
    let mut max = TOP_CATEGORY_FLOOR;
    for (name, sum) in sums {
        if sum > max {
            max = sum;
            best = Some(name);
        }
    }
    best.map(str::to_string)
}

fn doughnut_for<Tz: TimeZone>(rows: &[SpendRow], span: DateSpan, tz: &Tz) -> Doughnut {
    Doughnut::from_pairs(
        rows.iter()
            .filter(|r| span.contains(local_date(&r.spent_at, tz)))
            .map(|r| (r.category.clone(), r.amount)),
    )
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardPage {
    pub mode: ViewMode,
    #[serde(skip)]
    user_id: String,
    pub currency: String,
    pub groups: Vec<Group>,
    pub group: Option<Group>,
    pub cards: Cards,
    pub today: Doughnut,
    pub week: Doughnut,
    pub month: Doughnut,
}

impl DashboardPage {
    pub fn load<Tz: TimeZone>(
        backend: &dyn Backend,
        mode: ViewMode,
        prefs: &mut Preferences,
        currency: &str,
        now: &DateTime<Tz>,
    ) -> BackendResult<Self> {
        let viewer = Viewer::load(backend)?;
        let (groups, group) = match mode {
            ViewMode::Group => {
                let groups = member_groups(backend, viewer.id())?;
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
            cards: Cards::default(),
            today: Doughnut::default(),
            week: Doughnut::default(),
            month: Doughnut::default(),
        };
        let rows = page.spend_rows(backend, now)?;
        page.compute(&rows, now);
        Ok(page)
    }

    /// Switch the active group and remember it
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
        let rows = self.spend_rows(backend, now)?;
        self.compute(&rows, now);
        Ok(())
    }

    fn spend_rows<Tz: TimeZone>(
        &self,
        backend: &dyn Backend,
        now: &DateTime<Tz>,
    ) -> BackendResult<Vec<SpendRow>> {
        match (self.mode, &self.group) {
            (ViewMode::My, _) => {
                let expenses: Vec<Expense> = fetch(
                    backend,
                    EXPENSE_TABLE,
                    &Query::new()
                        .select("amount, currency, category:category_id(name,color), spent_at_utc")
                        .eq("user_id", &self.user_id)
                        .eq("currency", &self.currency)
                        .order("spent_at_utc", true),
                )?;
                Ok(expenses.iter().map(SpendRow::from_expense).collect())
            }
            (ViewMode::Group, Some(group)) => {
                let aggregates: Vec<CategoryAggregate> =
                    rpc_rows(backend, BY_CATEGORY_RPC, json!({ "g": group.id }))?;
                let now_utc = now.with_timezone(&Utc);
                Ok(aggregates
                    .iter()
                    .filter(|r| r.currency == self.currency)
                    .map(|r| SpendRow::from_aggregate(r, now_utc))
                    .collect())
            }
            (ViewMode::Group, None) => Ok(Vec::new()),
        }
    }

    fn compute<Tz: TimeZone>(&mut self, rows: &[SpendRow], now: &DateTime<Tz>) {
        let tz = now.timezone();
        let windows = DashboardWindows::ending(now.date_naive());
        self.cards = Cards::compute(rows, windows.month, &tz);
        self.today = doughnut_for(rows, windows.today, &tz);
        self.week = doughnut_for(rows, windows.week, &tz);
        self.month = doughnut_for(rows, windows.month, &tz);
    }
}
