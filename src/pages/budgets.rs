// 🎯 Budget page - personal or group budgets per scope and frequency
//
// My mode works on `user_budget`, Group mode on `group_budget` of the active
// group. Only superadmins create group budgets; members edit existing rows.

use super::categories::{active_categories, PickerOrder};
use super::settle;
use crate::access::Viewer;
use crate::backend::{fetch, Backend, Query};
use crate::config::{normalize_currency, Preferences, ViewMode, DEFAULT_CURRENCY};
use crate::entities::budget::{BudgetOwner, BudgetPayload, BudgetScope, Frequency};
use crate::entities::{Budget, Category, Group};
use crate::error::{BackendError, BackendResult, Notice};
use crate::filters::filter_budgets;
use crate::groups::{self, choose, pick_active, visible_groups};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

pub const BUDGET_COLUMNS: &str = "id, user_id, group_id, all_categories, category_id, frequency, amount, currency, note, updated_at, category:category_id(name)";
pub const INVALID_AMOUNT: &str = "Enter a valid amount";
pub const ROW_AMOUNT_NAN: &str = "Amount must be a number";
pub const DUPLICATE: &str = "A budget for this scope & frequency already exists. Edit the existing one.";
pub const GROUP_CREATE_ADMIN_ONLY: &str = "Only superadmin can create group budgets.";
pub const NO_GROUP: &str = "No group selected.";
pub const MEMBERS_ONLY: &str = "Only group members can edit group budgets.";

/// Finite and not negative
fn parse_amount(input: &str) -> Option<f64> {
    input
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|a| a.is_finite() && *a >= 0.0)
}

fn currency_or_default(input: &str) -> String {
    let currency = normalize_currency(input);
    if currency.is_empty() {
        DEFAULT_CURRENCY.to_string()
    } else {
        currency
    }
}

fn note_or_null(note: &str) -> Option<String> {
    (!note.is_empty()).then(|| note.to_string())
}

/// Scope after the current one: all categories, then each category in
/// picker order, then back to all. `None` means all categories.
fn next_scope(all: bool, category_id: &str, categories: &[Category]) -> Option<String> {
    let next = if all {
        categories.first()
    } else {
        categories
            .iter()
            .position(|c| c.id == category_id)
            .map_or(categories.first(), |i| categories.get(i + 1))
    };
    next.map(|c| c.id.clone())
}

// ============================================================================
// CREATE FORM / ROW DRAFT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetForm {
    pub scope: BudgetScope,
    pub category_id: String,
    pub frequency: Frequency,
    pub amount: String,
    currency: String,
    pub note: String,
}

impl BudgetForm {
    pub fn new(currency: &str) -> Self {
        Self {
            scope: BudgetScope::Category,
            category_id: String::new(),
            frequency: Frequency::Monthly,
            amount: String::new(),
            currency: normalize_currency(currency),
            note: String::new(),
        }
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn set_currency(&mut self, input: &str) {
        self.currency = normalize_currency(input);
    }

    /// `(frequency, all_categories, category_id)` this form would create
    pub fn combo(&self) -> (Frequency, bool, Option<String>) {
        let all = self.scope.is_all();
        let category_id = if all || self.category_id.is_empty() {
            None
        } else {
            Some(self.category_id.clone())
        };
        (self.frequency, all, category_id)
    }

    pub fn cycle_scope(&mut self, categories: &[Category]) {
        match next_scope(self.scope.is_all(), &self.category_id, categories) {
            Some(id) => {
                self.scope = BudgetScope::Category;
                self.category_id = id;
            }
            None => {
                self.scope = BudgetScope::All;
                self.category_id.clear();
            }
        }
    }

    pub fn payload(&self) -> BackendResult<BudgetPayload> {
        let amount = parse_amount(&self.amount).ok_or_else(|| BackendError::validation(INVALID_AMOUNT))?;
        let (frequency, all_categories, category_id) = self.combo();
        Ok(BudgetPayload {
            all_categories,
            category_id,
            frequency,
            amount,
            currency: currency_or_default(&self.currency),
            note: note_or_null(&self.note),
            updated_at: None,
        })
    }
}

/// Local edits of one listed budget
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetDraft {
    pub amount: String,
    pub currency: String,
    pub frequency: Frequency,
    pub note: String,
    pub all_categories: bool,
    pub category_id: String,
}

impl BudgetDraft {
    pub fn from_budget(budget: &Budget) -> Self {
        Self {
            amount: budget.amount.to_string(),
            currency: budget.currency.clone(),
            frequency: budget.frequency,
            note: budget.note.clone().unwrap_or_default(),
            all_categories: budget.all_categories,
            category_id: budget.category_id.clone().unwrap_or_default(),
        }
    }

    pub fn cycle_scope(&mut self, categories: &[Category]) {
        let next = next_scope(self.all_categories, &self.category_id, categories);
        self.all_categories = next.is_none();
        self.category_id = next.unwrap_or_default();
    }

    pub fn payload(&self, now: DateTime<Utc>) -> BackendResult<BudgetPayload> {
        let amount = parse_amount(&self.amount).ok_or_else(|| BackendError::validation(ROW_AMOUNT_NAN))?;
        let category_id = if self.all_categories || self.category_id.is_empty() {
            None
        } else {
            Some(self.category_id.clone())
        };
        Ok(BudgetPayload {
            all_categories: self.all_categories,
            category_id,
            frequency: self.frequency,
            amount,
            currency: currency_or_default(&self.currency),
            note: note_or_null(&self.note),
            updated_at: Some(now),
        })
    }
}

// ============================================================================
// PAGE
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct BudgetsPage {
    pub mode: ViewMode,
    pub viewer: Viewer,
    pub groups: Vec<Group>,
    pub group: Option<Group>,
    /// Members and superadmins may edit group rows
    pub can_edit: bool,
    pub categories: Vec<Category>,
    pub rows: Vec<Budget>,
    pub drafts: BTreeMap<String, BudgetDraft>,
    pub form: BudgetForm,
    pub search: String,
    pub notice: Option<Notice>,
}

impl BudgetsPage {
    pub fn load(
        backend: &dyn Backend,
        mode: ViewMode,
        prefs: &mut Preferences,
        default_currency: &str,
    ) -> BackendResult<Self> {
        let viewer = Viewer::load(backend)?;
        let categories = active_categories(backend, PickerOrder::Priority)?;

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
            groups,
            group,
            can_edit: mode == ViewMode::My,
            categories,
            rows: Vec::new(),
            drafts: BTreeMap::new(),
            form: BudgetForm::new(default_currency),
            search: String::new(),
            notice: None,
            viewer,
        };
        page.refresh_membership(backend)?;
        page.refresh(backend)?;
        Ok(page)
    }

    fn refresh_membership(&mut self, backend: &dyn Backend) -> BackendResult<()> {
        if self.mode == ViewMode::My {
            return Ok(());
        }
        self.can_edit = match &self.group {
            Some(group) => groups::can_edit(backend, &group.id, self.viewer.id(), self.viewer.is_superadmin)?,
            None => self.viewer.is_superadmin,
        };
        Ok(())
    }

    fn owner(&self) -> Option<BudgetOwner> {
        match self.mode {
            ViewMode::My => Some(BudgetOwner::User(self.viewer.id().to_string())),
            ViewMode::Group => self.group.as_ref().map(|g| BudgetOwner::Group(g.id.clone())),
        }
    }

    /// Newest update first; no active group means no rows
    pub fn refresh(&mut self, backend: &dyn Backend) -> BackendResult<()> {
        self.drafts.clear();
        let Some(owner) = self.owner() else {
            self.rows.clear();
            return Ok(());
        };
        self.rows = fetch(
            backend,
            owner.table(),
            &Query::new()
                .select(BUDGET_COLUMNS)
                .eq(owner.column(), owner.id())
                .order("updated_at", false),
        )?;
        Ok(())
    }

    /// Switch the active group and remember it
    pub fn pick_group(&mut self, backend: &dyn Backend, id: &str, prefs: &mut Preferences) -> BackendResult<()> {
        let Some(group) = choose(&self.groups, id, prefs) else {
            return Ok(());
        };
        self.group = Some(group);
        self.refresh_membership(backend)?;
        self.refresh(backend)
    }

    pub fn can_create(&self) -> bool {
        self.mode == ViewMode::My || self.viewer.is_superadmin
    }

    pub fn visible(&self) -> Vec<&Budget> {
        filter_budgets(&self.rows, &self.search)
    }

    /// Draft for a row, starting from the stored values
    pub fn draft_mut(&mut self, id: &str) -> Option<&mut BudgetDraft> {
        if !self.drafts.contains_key(id) {
            let budget = self.rows.iter().find(|b| b.id == id)?;
            self.drafts.insert(id.to_string(), BudgetDraft::from_budget(budget));
        }
        self.drafts.get_mut(id)
    }

    pub fn add(&mut self, backend: &dyn Backend) -> BackendResult<()> {
        let result = self.try_add(backend);
        if result.is_ok() {
            self.notice = None;
        }
        settle(&mut self.notice, "add budget", result)
    }

    fn try_add(&mut self, backend: &dyn Backend) -> BackendResult<()> {
        let payload = self.form.payload()?;
        let duplicate = self.rows.iter().any(|r| {
            r.same_combo(payload.frequency, payload.all_categories, payload.category_id.as_deref())
        });
        if duplicate {
            return Err(BackendError::validation(DUPLICATE));
        }
        if self.mode == ViewMode::Group && !self.viewer.is_superadmin {
            return Err(BackendError::forbidden(GROUP_CREATE_ADMIN_ONLY));
        }
        let owner = self.owner().ok_or_else(|| BackendError::validation(NO_GROUP))?;

        backend.insert(owner.table(), payload.to_insert(&owner))?;
        tracing::info!(
            table = owner.table(),
            frequency = payload.frequency.as_str(),
            all = payload.all_categories,
            "added budget"
        );
        self.form.amount.clear();
        self.form.note.clear();
        self.refresh(backend)
    }

    pub fn save_row(&mut self, backend: &dyn Backend, id: &str, now: DateTime<Utc>) -> BackendResult<()> {
        let result = self.try_save_row(backend, id, now);
        settle(&mut self.notice, "save budget", result)
    }

    fn try_save_row(&mut self, backend: &dyn Backend, id: &str, now: DateTime<Utc>) -> BackendResult<()> {
        if !self.can_edit {
            return Err(BackendError::forbidden(MEMBERS_ONLY));
        }
        let owner = self.owner().ok_or_else(|| BackendError::validation(NO_GROUP))?;
        let draft = match self.drafts.get(id) {
            Some(draft) => draft.clone(),
            None => {
                let budget = self
                    .rows
                    .iter()
                    .find(|b| b.id == id)
                    .ok_or_else(|| BackendError::NotFound(format!("budget {}", id)))?;
                BudgetDraft::from_budget(budget)
            }
        };
        let payload = draft.payload(now)?;
        backend.update(
            owner.table(),
            serde_json::to_value(&payload)?,
            &Query::new().eq("id", id),
        )?;
        tracing::info!(table = owner.table(), budget = %id, "updated budget");
        self.refresh(backend)
    }

    pub fn delete_row(&mut self, backend: &dyn Backend, id: &str) -> BackendResult<()> {
        let result = self.try_delete_row(backend, id);
        settle(&mut self.notice, "delete budget", result)
    }

    fn try_delete_row(&mut self, backend: &dyn Backend, id: &str) -> BackendResult<()> {
        if !self.can_edit {
            return Err(BackendError::forbidden(MEMBERS_ONLY));
        }
        let owner = self.owner().ok_or_else(|| BackendError::validation(NO_GROUP))?;
        backend.delete(owner.table(), &Query::new().eq("id", id))?;
        tracing::info!(table = owner.table(), budget = %id, "deleted budget");
        self.refresh(backend)
    }
}
