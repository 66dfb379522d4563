// Page view models
//
// Each page re-derives its state from the backend when it is opened and after
// every mutation it issues. Nothing is shared between pages except the
// Preferences passed in for the active group.
//
// Mutations return the backend result and also leave a Notice on the page,
// shown next to the form that triggered them.

pub mod admin_groups;
pub mod admin_users;
pub mod analysis;
pub mod audit;
pub mod budgets;
pub mod categories;
pub mod dashboard;
pub mod expense_form;
pub mod expenses;
pub mod group_view;
pub mod my_view;

pub use admin_groups::AdminGroupsPage;
pub use admin_users::AdminUsersPage;
pub use analysis::AnalysisPage;
pub use audit::AuditPage;
pub use budgets::BudgetsPage;
pub use categories::CategoriesPage;
pub use dashboard::DashboardPage;
pub use expense_form::{AddExpensePage, EditExpensePage, ExpenseForm};
pub use expenses::{ExpenseList, GroupExpensesPage, MyExpensesPage};
pub use group_view::{GroupAggregates, GroupViewPage};
pub use my_view::MyViewPage;

use crate::error::{BackendResult, Notice};

/// Store the failure of `action` as the page notice and pass the result on.
pub(crate) fn settle<T>(
    notice: &mut Option<Notice>,
    action: &str,
    result: BackendResult<T>,
) -> BackendResult<T> {
    if let Err(err) = &result {
        tracing::warn!(action, error = %err, "page action failed");
        *notice = Some(Notice::from(err));
    }
    result
}
