// ✏️ Add / Edit Expense - the personal entry form
//
// The date-time input is a local wall-clock value (`YYYY-MM-DDTHH:MM`),
// converted to UTC on save.

use super::categories::{active_categories, PickerOrder};
use super::expenses::ExpenseList;
use super::settle;
use crate::access::{Route, Viewer};
use crate::backend::{fetch_one, Backend, Query};
use crate::buckets::local_to_utc;
use crate::config::normalize_currency;
use crate::entities::expense::{Expense, NewExpense, EXPENSE_TABLE};
use crate::entities::Category;
use crate::error::{BackendError, BackendResult, Notice};
use crate::pagination::AfterDelete;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

pub const DATETIME_LOCAL: &str = "%Y-%m-%dT%H:%M";
pub const SAVED: &str = "Saved";
pub const CATEGORY_REQUIRED: &str = "Category is required.";
pub const INVALID_AMOUNT: &str = "Enter a valid amount";
pub const INVALID_DATE: &str = "Enter a valid date";
pub const LOAD_FAILED: &str = "Unable to load expense";

// ============================================================================
// FORM
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpenseForm {
    pub note: String,
    pub amount: String,
    currency: String,
    pub category_id: String,
    pub spent_at: String,
}

impl ExpenseForm {
    pub fn blank<Tz: TimeZone>(currency: &str, now: &DateTime<Tz>) -> Self {
        Self {
            note: String::new(),
            amount: String::new(),
            currency: normalize_currency(currency),
            category_id: String::new(),
            spent_at: now.naive_local().format(DATETIME_LOCAL).to_string(),
        }
    }

    /// Prefill from a stored row, showing its time in the local zone
    pub fn from_expense<Tz: TimeZone>(expense: &Expense, tz: &Tz, default_currency: &str) -> Self {
        let currency = if expense.currency.is_empty() {
            default_currency
        } else {
            &expense.currency
        };
        Self {
            note: expense.note_or_empty().to_string(),
            amount: expense.amount.to_string(),
            currency: normalize_currency(currency),
            category_id: expense.category_id.clone().unwrap_or_default(),
            spent_at: expense
                .spent_at_utc
                .with_timezone(tz)
                .naive_local()
                .format(DATETIME_LOCAL)
                .to_string(),
        }
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Upper-case, at most three characters
    pub fn set_currency(&mut self, input: &str) {
        self.currency = normalize_currency(input);
    }

    /// Category first, then amount, then date
    pub fn validate<Tz: TimeZone>(&self, user_id: &str, tz: &Tz) -> BackendResult<NewExpense> {
        if self.category_id.trim().is_empty() {
            return Err(BackendError::validation(CATEGORY_REQUIRED));
        }
        let amount = self
            .amount
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|a| a.is_finite())
            .ok_or_else(|| BackendError::validation(INVALID_AMOUNT))?;
        let naive = NaiveDateTime::parse_from_str(self.spent_at.trim(), DATETIME_LOCAL)
            .map_err(|_| BackendError::validation(INVALID_DATE))?;
        let note = self.note.trim();

        Ok(NewExpense {
            user_id: user_id.to_string(),
            note: (!note.is_empty()).then(|| note.to_string()),
            amount,
            currency: self.currency.clone(),
            category_id: self.category_id.trim().to_string(),
            spent_at_utc: local_to_utc(naive, tz),
        })
    }
}

// ============================================================================
// ADD EXPENSE
// ============================================================================

/// Entry form plus the "Recent" list of the user's own expenses
#[derive(Debug, Clone, PartialEq)]
pub struct AddExpensePage {
    pub display_name: String,
    pub default_currency: String,
    pub categories: Vec<Category>,
    pub form: ExpenseForm,
    pub recent: ExpenseList,
    pub notice: Option<Notice>,
}

impl AddExpensePage {
    pub fn load<Tz: TimeZone>(
        backend: &dyn Backend,
        default_currency: &str,
        now: &DateTime<Tz>,
    ) -> BackendResult<Self> {
        let viewer = Viewer::load(backend)?;
        let categories = active_categories(backend, PickerOrder::Priority)?;
        let mut recent = ExpenseList::new(viewer.user.id.clone());
        recent.load(backend, &now.timezone())?;
        Ok(Self {
            display_name: viewer.display_name,
            default_currency: default_currency.to_string(),
            categories,
            form: ExpenseForm::blank(default_currency, now),
            recent,
            notice: None,
        })
    }

    /// Insert, then reset the form and show the first page again
    pub fn save<Tz: TimeZone>(&mut self, backend: &dyn Backend, now: &DateTime<Tz>) -> BackendResult<()> {
        let tz = now.timezone();
        let result = self
            .form
            .validate(&self.recent.user_id, &tz)
            .and_then(|payload| {
                backend.insert(EXPENSE_TABLE, serde_json::to_value(&payload)?)?;
                tracing::info!(amount = payload.amount, currency = %payload.currency, "added expense");
                Ok(())
            });
        settle(&mut self.notice, "add expense", result)?;

        self.notice = Some(Notice::info(SAVED));
        self.form = ExpenseForm::blank(&self.default_currency, now);
        self.recent.pager.reset();
        let reload = self.recent.load(backend, &tz);
        settle(&mut self.notice, "reload recent expenses", reload)
    }

    pub fn delete<Tz: TimeZone>(&mut self, backend: &dyn Backend, id: &str, tz: &Tz) -> BackendResult<AfterDelete> {
        let result = self.recent.delete(backend, id, tz);
        settle(&mut self.notice, "delete expense", result)
    }

    /// Every recent row was added by the viewer
    pub fn added_by(&self) -> &str {
        &self.display_name
    }
}

// ============================================================================
// EDIT EXPENSE
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct EditExpensePage {
    pub id: String,
    pub categories: Vec<Category>,
    pub form: ExpenseForm,
    /// False when the row could not be read; the form stays blank
    pub loaded: bool,
    pub notice: Option<Notice>,
}

impl EditExpensePage {
    pub fn load<Tz: TimeZone>(
        backend: &dyn Backend,
        id: &str,
        default_currency: &str,
        now: &DateTime<Tz>,
    ) -> BackendResult<Self> {
        let categories = active_categories(backend, PickerOrder::Priority)?;
        let row: BackendResult<Expense> = fetch_one(
            backend,
            EXPENSE_TABLE,
            Query::new()
                .select("id, amount, currency, category_id, note, spent_at_utc")
                .eq("id", id),
        );

        let mut page = Self {
            id: id.to_string(),
            categories,
            form: ExpenseForm::blank(default_currency, now),
            loaded: false,
            notice: None,
        };
        match row {
            Ok(expense) => {
                page.form = ExpenseForm::from_expense(&expense, &now.timezone(), default_currency);
                page.loaded = true;
            }
            Err(err) => {
                tracing::warn!(expense = %id, error = %err, "could not load expense");
                page.notice = Some(Notice::Error(LOAD_FAILED.to_string()));
            }
        }
        Ok(page)
    }

    /// Update by id; on success the caller goes back to Add Expense
    pub fn save<Tz: TimeZone>(&mut self, backend: &dyn Backend, tz: &Tz) -> BackendResult<Route> {
        let id = self.id.clone();
        let result = self.form.validate("", tz).and_then(|payload| {
            let patch = payload.into_patch();
            backend.update(
                EXPENSE_TABLE,
                serde_json::to_value(&patch)?,
                &Query::new().eq("id", &id),
            )?;
            tracing::info!(expense = %id, "updated expense");
            Ok(Route::AddExpense)
        });
        settle(&mut self.notice, "edit expense", result)
    }
}

/// Local wall-clock text of an instant, as shown in tables
pub fn local_display<Tz: TimeZone>(ts: &DateTime<Utc>, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    ts.with_timezone(tz).format("%Y-%m-%d %H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::FakeBackend;
    use crate::entities::category::CATEGORY_TABLE;
    use crate::entities::profile::PROFILE_TABLE;
    use crate::pages::testing::now;
    use serde_json::json;

    fn backend() -> FakeBackend {
        FakeBackend::new()
            .signed_in_as("u-1", "a@example.com")
            .with_table(
                PROFILE_TABLE,
                vec![json!({ "user_id": "u-1", "username": "ania" })],
            )
            .with_table(
                CATEGORY_TABLE,
                vec![json!({ "id": "c-1", "name": "Food", "priority": 1, "is_active": true })],
            )
            .with_table(
                EXPENSE_TABLE,
                vec![json!({
                    "id": "e-1", "user_id": "u-1", "amount": 12.5, "currency": "EUR",
                    "spent_at_utc": "2025-03-10T17:30:00Z", "note": "lunch", "category_id": "c-1"
                })],
            )
    }

    #[test]
    fn test_blank_form_uses_local_time_and_default_currency() {
        let form = ExpenseForm::blank("pln", &now());
        assert_eq!(form.spent_at, "2025-03-13T12:00");
        assert_eq!(form.currency(), "PLN");
    }

    #[test]
    fn test_currency_input_is_clamped() {
        let mut form = ExpenseForm::blank("PLN", &now());
        form.set_currency("usdx");
        assert_eq!(form.currency(), "USD");
    }

    #[test]
    fn test_validation_messages() {
        let tz = now().timezone();
        let mut form = ExpenseForm::blank("PLN", &now());
        form.amount = "10".to_string();
        assert_eq!(form.validate("u-1", &tz).unwrap_err().to_string(), CATEGORY_REQUIRED);

        form.category_id = "c-1".to_string();
        form.amount = "ten".to_string();
        assert_eq!(form.validate("u-1", &tz).unwrap_err().to_string(), INVALID_AMOUNT);

        form.amount = "10.5".to_string();
        form.spent_at = "13/03/2025".to_string();
        assert_eq!(form.validate("u-1", &tz).unwrap_err().to_string(), INVALID_DATE);
    }

    #[test]
    fn test_validated_payload_converts_local_time() {
        let tz = now().timezone();
        let mut form = ExpenseForm::blank("PLN", &now());
        form.category_id = "c-1".to_string();
        form.amount = "10.5".to_string();
        form.note = "   ".to_string();
        let payload = form.validate("u-1", &tz).unwrap();
        assert_eq!(payload.note, None);
        assert_eq!(
            payload.spent_at_utc,
            Utc.with_ymd_and_hms(2025, 3, 13, 11, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_add_saves_resets_and_reloads() {
        let backend = backend();
        let mut page = AddExpensePage::load(&backend, "PLN", &now()).unwrap();
        assert_eq!(page.added_by(), "ania");
        assert_eq!(page.recent.rows.len(), 1);

        page.form.note = "coffee".to_string();
        page.form.amount = "9".to_string();
        page.form.category_id = "c-1".to_string();
        page.save(&backend, &now()).unwrap();

        assert_eq!(page.notice, Some(Notice::info(SAVED)));
        assert_eq!(page.form, ExpenseForm::blank("PLN", &now()));
        assert_eq!(page.recent.pager.total, 2);
        let insert = &backend.calls_of("insert")[0];
        assert_eq!(insert.payload["user_id"], "u-1");
        assert_eq!(insert.payload["currency"], "PLN");
    }

    #[test]
    fn test_add_without_category_does_not_insert() {
        let backend = backend();
        let mut page = AddExpensePage::load(&backend, "PLN", &now()).unwrap();
        page.form.amount = "9".to_string();
        assert!(page.save(&backend, &now()).is_err());
        assert_eq!(page.notice, Some(Notice::Error(CATEGORY_REQUIRED.to_string())));
        assert!(backend.calls_of("insert").is_empty());
    }

    #[test]
    fn test_edit_prefills_in_local_time_and_returns_to_add() {
        let backend = backend();
        let mut page = EditExpensePage::load(&backend, "e-1", "PLN", &now()).unwrap();
        assert!(page.loaded);
        assert_eq!(page.form.spent_at, "2025-03-10T18:30");
        assert_eq!(page.form.currency(), "EUR");
        assert_eq!(page.form.note, "lunch");

        page.form.amount = "20".to_string();
        let route = page.save(&backend, &now().timezone()).unwrap();
        assert_eq!(route, Route::AddExpense);
        let update = &backend.calls_of("update")[0];
        assert_eq!(update.payload["amount"], 20.0);
        assert!(update.payload.get("user_id").is_none());
    }

    #[test]
    fn test_edit_missing_row_shows_load_error() {
        let page = EditExpensePage::load(&backend(), "nope", "PLN", &now()).unwrap();
        assert!(!page.loaded);
        assert_eq!(page.notice, Some(Notice::Error(LOAD_FAILED.to_string())));
    }
}
