// 💸 View Expenses - personal paginated list, or read-only group aggregates
//
// My mode: filters go to the backend, ten rows per page with an exact count,
// newest first. Group mode: totals and per-category aggregates of one group,
// searched locally by category name.

use super::categories::{active_categories, PickerOrder};
use super::group_view::GroupAggregates;
use super::settle;
use crate::access::Viewer;
use crate::backend::{fetch_counted, Backend, Query};
use crate::entities::expense::{Expense, EXPENSE_TABLE};
use crate::entities::{Category, CategoryAggregate, Group};
use crate::error::{BackendResult, Notice};
use crate::filters::{filter_category_aggregates, ExpenseFilter};
use crate::groups::all_groups_sorted;
use crate::pagination::{AfterDelete, Pager};
use chrono::TimeZone;

pub const EXPENSE_COLUMNS: &str =
    "id, user_id, amount, currency, spent_at_utc, note, category_id, category:category_id(name,color)";

// ============================================================================
// EXPENSE LIST
// ============================================================================

/// One user's expenses, a page at a time
#[derive(Debug, Clone, PartialEq)]
pub struct ExpenseList {
    pub user_id: String,
    pub filter: ExpenseFilter,
    pub pager: Pager,
    pub rows: Vec<Expense>,
}

impl ExpenseList {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            filter: ExpenseFilter::default(),
            pager: Pager::new(),
            rows: Vec::new(),
        }
    }

    pub fn load<Tz: TimeZone>(&mut self, backend: &dyn Backend, tz: &Tz) -> BackendResult<()> {
        let (from, to) = self.pager.range();
        let query = Query::new()
            .select(EXPENSE_COLUMNS)
            .eq("user_id", &self.user_id);
        let query = self
            .filter
            .apply(query, tz)
            .order("spent_at_utc", false)
            .range(from, to);

        let (rows, total) = fetch_counted(backend, EXPENSE_TABLE, query)?;
        self.rows = rows;
        self.pager.total = total;
        Ok(())
    }

    /// Replace the filter and go back to the first page
    pub fn set_filter(&mut self, filter: ExpenseFilter) {
        if filter != self.filter {
            self.filter = filter;
            self.pager.reset();
        }
    }

    pub fn next_page<Tz: TimeZone>(&mut self, backend: &dyn Backend, tz: &Tz) -> BackendResult<bool> {
        if !self.pager.next() {
            return Ok(false);
        }
        self.load(backend, tz)?;
        Ok(true)
    }

    pub fn prev_page<Tz: TimeZone>(&mut self, backend: &dyn Backend, tz: &Tz) -> BackendResult<bool> {
        if !self.pager.prev() {
            return Ok(false);
        }
        self.load(backend, tz)?;
        Ok(true)
    }

    /// Delete by id, stepping back a page when the current one empties
    pub fn delete<Tz: TimeZone>(&mut self, backend: &dyn Backend, id: &str, tz: &Tz) -> BackendResult<AfterDelete> {
        backend.delete(EXPENSE_TABLE, &Query::new().eq("id", id))?;
        tracing::info!(expense = %id, "deleted expense");
        let outcome = self.pager.after_delete();
        self.load(backend, tz)?;
        Ok(outcome)
    }

    pub fn summary(&self) -> String {
        self.pager.summary()
    }
}

// ============================================================================
// MY MODE
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct MyExpensesPage {
    pub categories: Vec<Category>,
    pub list: ExpenseList,
    pub notice: Option<Notice>,
}

impl MyExpensesPage {
    pub fn load<Tz: TimeZone>(backend: &dyn Backend, tz: &Tz) -> BackendResult<Self> {
        let viewer = Viewer::load(backend)?;
        let categories = active_categories(backend, PickerOrder::Name)?;
        let mut list = ExpenseList::new(viewer.user.id);
        list.load(backend, tz)?;
        Ok(Self {
            categories,
            list,
            notice: None,
        })
    }

    pub fn apply_filter<Tz: TimeZone>(
        &mut self,
        backend: &dyn Backend,
        filter: ExpenseFilter,
        tz: &Tz,
    ) -> BackendResult<()> {
        self.list.set_filter(filter);
        let result = self.list.load(backend, tz);
        settle(&mut self.notice, "filter expenses", result)
    }

    pub fn delete<Tz: TimeZone>(&mut self, backend: &dyn Backend, id: &str, tz: &Tz) -> BackendResult<AfterDelete> {
        let result = self.list.delete(backend, id, tz);
        settle(&mut self.notice, "delete expense", result)
    }

    /// Category filter after the current one; past the last it clears
    pub fn next_category_filter(&self) -> Option<String> {
        let next = match self.list.filter.category_id.as_deref() {
            None => self.categories.first(),
            Some(id) => self
                .categories
                .iter()
                .position(|c| c.id == id)
                .and_then(|i| self.categories.get(i + 1)),
        };
        next.map(|c| c.id.clone())
    }
}

// ============================================================================
// GROUP MODE (read-only)
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct GroupExpensesPage {
    pub groups: Vec<Group>,
    pub selected: Option<String>,
    pub aggregates: GroupAggregates,
    pub search: String,
}

impl GroupExpensesPage {
    pub fn load(backend: &dyn Backend) -> BackendResult<Self> {
        let groups = all_groups_sorted(backend)?;
        let mut page = Self {
            selected: groups.first().map(|g| g.id.clone()),
            groups,
            aggregates: GroupAggregates::default(),
            search: String::new(),
        };
        if let Some(id) = page.selected.clone() {
            page.aggregates = GroupAggregates::load(backend, &id)?;
        }
        Ok(page)
    }

    pub fn select(&mut self, backend: &dyn Backend, group_id: &str) -> BackendResult<()> {
        if !self.groups.iter().any(|g| g.id == group_id) {
            return Ok(());
        }
        self.aggregates = GroupAggregates::load(backend, group_id)?;
        self.selected = Some(group_id.to_string());
        Ok(())
    }

    pub fn visible(&self) -> Vec<&CategoryAggregate> {
        filter_category_aggregates(&self.aggregates.by_category, &self.search)
    }
}
