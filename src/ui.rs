// 🖥️ Terminal dashboard - menu tabs on top, one page in the middle, status bar
//
// Every page is a view model from the library; this module only maps keys to
// page operations and draws whatever the page holds afterwards.

use anyhow::Result;
use chrono::{Local, NaiveDate, Utc};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Cell, Chart, Dataset, GraphType, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::io;

use expense_dashboard::access::{menu, switch_mode};
use expense_dashboard::charts::{format_money, Doughnut};
use expense_dashboard::entities::budget::ALL_CATEGORIES_LABEL;
use expense_dashboard::filters::parse_day;
use expense_dashboard::pages::admin_users::ProfileField;
use expense_dashboard::pages::budgets::{BudgetDraft, BudgetForm};
use expense_dashboard::pages::categories::{CategoryDraft, CategoryField, ADMIN_ONLY};
use expense_dashboard::pages::expense_form::local_display;
use expense_dashboard::pages::{
    AddExpensePage, AdminGroupsPage, AdminUsersPage, AnalysisPage, AuditPage, BudgetsPage,
    CategoriesPage, DashboardPage, EditExpensePage, ExpenseForm, GroupExpensesPage, GroupViewPage,
    MyExpensesPage, MyViewPage,
};
use expense_dashboard::{
    check_access, sign_out, Backend, BackendError, BackendResult, Bucket, ExpenseFilter, Group,
    Notice, Preferences, Route, Shell, Theme, ViewMode,
};

// ============================================================================
// APP STATE
// ============================================================================

enum Page {
    Message(String),
    MyView(MyViewPage),
    GroupView(GroupViewPage),
    Dashboard(DashboardPage),
    AddExpense(AddExpensePage),
    EditExpense(EditExpensePage),
    MyExpenses(MyExpensesPage),
    GroupExpenses(GroupExpensesPage),
    Categories(CategoriesPage),
    Budgets(BudgetsPage),
    Analysis(AnalysisPage),
    Audit(AuditPage),
    AdminUsers(AdminUsersPage),
    AdminGroups(AdminGroupsPage),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormField {
    Amount,
    Currency,
    Note,
    SpentAt,
}

impl FormField {
    fn label(&self) -> &'static str {
        match self {
            FormField::Amount => "Amount",
            FormField::Currency => "Currency",
            FormField::Note => "Note",
            FormField::SpentAt => "When (YYYY-MM-DDTHH:MM)",
        }
    }

    fn current(&self, form: &ExpenseForm) -> String {
        match self {
            FormField::Amount => form.amount.clone(),
            FormField::Currency => form.currency().to_string(),
            FormField::Note => form.note.clone(),
            FormField::SpentAt => form.spent_at.clone(),
        }
    }

    fn set(&self, form: &mut ExpenseForm, value: &str) {
        match self {
            FormField::Amount => form.amount = value.to_string(),
            FormField::Currency => form.set_currency(value),
            FormField::Note => form.note = value.to_string(),
            FormField::SpentAt => form.spent_at = value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterField {
    Currency,
    From,
    To,
}

impl FilterField {
    fn current(&self, filter: &ExpenseFilter) -> String {
        let day = |d: Option<NaiveDate>| d.map(|d| d.to_string()).unwrap_or_default();
        match self {
            FilterField::Currency => filter.currency.clone(),
            FilterField::From => day(filter.from),
            FilterField::To => day(filter.to),
        }
    }

    fn apply(&self, filter: &mut ExpenseFilter, value: &str) -> BackendResult<()> {
        match self {
            FilterField::Currency => filter.currency = value.trim().to_uppercase(),
            FilterField::From => filter.from = parse_day(value)?,
            FilterField::To => filter.to = parse_day(value)?,
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BudgetField {
    Amount,
    Currency,
    Note,
}

impl BudgetField {
    fn of_form(&self, form: &BudgetForm) -> String {
        match self {
            BudgetField::Amount => form.amount.clone(),
            BudgetField::Currency => form.currency().to_string(),
            BudgetField::Note => form.note.clone(),
        }
    }

    fn set_form(&self, form: &mut BudgetForm, value: &str) {
        match self {
            BudgetField::Amount => form.amount = value.trim().to_string(),
            BudgetField::Currency => form.set_currency(value),
            BudgetField::Note => form.note = value.to_string(),
        }
    }

    fn of_draft(&self, draft: &BudgetDraft) -> String {
        match self {
            BudgetField::Amount => draft.amount.clone(),
            BudgetField::Currency => draft.currency.clone(),
            BudgetField::Note => draft.note.clone(),
        }
    }

    fn set_draft(&self, draft: &mut BudgetDraft, value: &str) {
        let slot = match self {
            BudgetField::Amount => &mut draft.amount,
            BudgetField::Currency => &mut draft.currency,
            BudgetField::Note => &mut draft.note,
        };
        *slot = value.trim().to_string();
    }
}

/// Inputs of the account provisioning form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UserField {
    Email,
    Username,
    FullName,
    Password,
    Groups,
}

fn category_value(draft: &CategoryDraft, field: CategoryField) -> String {
    match field {
        CategoryField::Name => draft.name.clone(),
        CategoryField::Priority => draft.priority.clone(),
        CategoryField::Color => draft.color.clone(),
        CategoryField::Icon => draft.icon.clone(),
    }
}

fn category_label(field: CategoryField) -> &'static str {
    match field {
        CategoryField::Name => "name",
        CategoryField::Priority => "priority",
        CategoryField::Color => "color (#rrggbb)",
        CategoryField::Icon => "icon",
    }
}

fn profile_label(field: ProfileField) -> &'static str {
    match field {
        ProfileField::Username => "username",
        ProfileField::FullName => "full name",
        ProfileField::Email => "email",
    }
}

/// What the status-bar prompt writes to on Enter. Row targets carry the id
/// of the row that was selected when the prompt opened.
#[derive(Debug, Clone, PartialEq, Eq)]
enum InputTarget {
    Field(FormField),
    Search,
    Filter(FilterField),
    NewBudget(BudgetField),
    RowBudget(String, BudgetField),
    NewCategory(CategoryField),
    RowCategory(String, CategoryField),
    NewUser(UserField),
    RowProfile(String, ProfileField),
    UserGroups(String),
    ResetPassword(String),
    NewGroup,
    RenameGroup(String),
    GroupMembers(String),
}

impl InputTarget {
    fn label(&self) -> String {
        let budget = |f: &BudgetField| match f {
            BudgetField::Amount => "amount",
            BudgetField::Currency => "currency",
            BudgetField::Note => "note",
        };
        match self {
            InputTarget::Field(field) => field.label().to_string(),
            InputTarget::Search => "Search".to_string(),
            InputTarget::Filter(FilterField::Currency) => "Currency filter".to_string(),
            InputTarget::Filter(FilterField::From) => "From (YYYY-MM-DD)".to_string(),
            InputTarget::Filter(FilterField::To) => "To (YYYY-MM-DD)".to_string(),
            InputTarget::NewBudget(f) => format!("New budget {}", budget(f)),
            InputTarget::RowBudget(_, f) => format!("Budget {}", budget(f)),
            InputTarget::NewCategory(f) => format!("New category {}", category_label(*f)),
            InputTarget::RowCategory(_, f) => format!("Category {}", category_label(*f)),
            InputTarget::NewUser(f) => match f {
                UserField::Email => "New user email",
                UserField::Username => "New user username",
                UserField::FullName => "New user full name",
                UserField::Password => "New user password",
                UserField::Groups => "New user groups (comma-separated)",
            }
            .to_string(),
            InputTarget::RowProfile(_, f) => format!("User {}", profile_label(*f)),
            InputTarget::UserGroups(_) => "Groups (comma-separated)".to_string(),
            InputTarget::ResetPassword(_) => "New password".to_string(),
            InputTarget::NewGroup => "New group name".to_string(),
            InputTarget::RenameGroup(_) => "Rename group".to_string(),
            InputTarget::GroupMembers(_) => "Members (comma-separated)".to_string(),
        }
    }

    /// Typed characters are masked in the status bar
    fn is_secret(&self) -> bool {
        matches!(
            self,
            InputTarget::NewUser(UserField::Password) | InputTarget::ResetPassword(_)
        )
    }

    /// Search and filters start the list over
    fn resets_selection(&self) -> bool {
        matches!(self, InputTarget::Search | InputTarget::Filter(_))
    }
}

/// Pages with their own keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
    MyExpenses,
    Budgets,
    Categories,
    AdminUsers,
    AdminGroups,
}

/// Page operation behind a key
#[derive(Debug, Clone, PartialEq, Eq)]
enum Binding {
    Prompt(InputTarget),
    /// Frequency of the add form, or of the row draft with this id
    CycleFrequency(Option<String>),
    CycleScope(Option<String>),
    /// Submit the page's add form
    Create,
    SaveRow(String),
    ToggleActive(String),
    CycleCategoryFilter,
    ClearFilter,
}

/// Lowercase keys work on the page's add form, uppercase ones on the
/// selected row. Row keys do nothing without a selection.
fn binding(screen: Screen, key: char, selected: Option<&str>) -> Option<Binding> {
    use Binding::*;
    use InputTarget as T;

    let row = |f: fn(String) -> Binding| selected.map(|id| f(id.to_string()));
    match (screen, key) {
        (Screen::MyExpenses, 'c') => Some(CycleCategoryFilter),
        (Screen::MyExpenses, 'u') => Some(Prompt(T::Filter(FilterField::Currency))),
        (Screen::MyExpenses, '<') => Some(Prompt(T::Filter(FilterField::From))),
        (Screen::MyExpenses, '>') => Some(Prompt(T::Filter(FilterField::To))),
        (Screen::MyExpenses, 'x') => Some(ClearFilter),

        (Screen::Budgets, 'a') => Some(Prompt(T::NewBudget(BudgetField::Amount))),
        (Screen::Budgets, 'u') => Some(Prompt(T::NewBudget(BudgetField::Currency))),
        (Screen::Budgets, 'o') => Some(Prompt(T::NewBudget(BudgetField::Note))),
        (Screen::Budgets, 'f') => Some(CycleFrequency(None)),
        (Screen::Budgets, 'c') => Some(CycleScope(None)),
        (Screen::Budgets, 's') => Some(Create),
        (Screen::Budgets, 'A') => row(|id| Prompt(T::RowBudget(id, BudgetField::Amount))),
        (Screen::Budgets, 'U') => row(|id| Prompt(T::RowBudget(id, BudgetField::Currency))),
        (Screen::Budgets, 'O') => row(|id| Prompt(T::RowBudget(id, BudgetField::Note))),
        (Screen::Budgets, 'F') => row(|id| CycleFrequency(Some(id))),
        (Screen::Budgets, 'C') => row(|id| CycleScope(Some(id))),
        (Screen::Budgets, 'S') => row(SaveRow),

        (Screen::Categories, 'n') => Some(Prompt(T::NewCategory(CategoryField::Name))),
        (Screen::Categories, 'p') => Some(Prompt(T::NewCategory(CategoryField::Priority))),
        (Screen::Categories, 'c') => Some(Prompt(T::NewCategory(CategoryField::Color))),
        (Screen::Categories, 'i') => Some(Prompt(T::NewCategory(CategoryField::Icon))),
        (Screen::Categories, 's') => Some(Create),
        (Screen::Categories, 'N') => row(|id| Prompt(T::RowCategory(id, CategoryField::Name))),
        (Screen::Categories, 'P') => row(|id| Prompt(T::RowCategory(id, CategoryField::Priority))),
        (Screen::Categories, 'C') => row(|id| Prompt(T::RowCategory(id, CategoryField::Color))),
        (Screen::Categories, 'I') => row(|id| Prompt(T::RowCategory(id, CategoryField::Icon))),
        (Screen::Categories, 'S') => row(SaveRow),

        (Screen::AdminUsers, 'e') => Some(Prompt(T::NewUser(UserField::Email))),
        (Screen::AdminUsers, 'n') => Some(Prompt(T::NewUser(UserField::Username))),
        (Screen::AdminUsers, 'f') => Some(Prompt(T::NewUser(UserField::FullName))),
        (Screen::AdminUsers, 'w') => Some(Prompt(T::NewUser(UserField::Password))),
        (Screen::AdminUsers, 'g') => Some(Prompt(T::NewUser(UserField::Groups))),
        (Screen::AdminUsers, 's') => Some(Create),
        (Screen::AdminUsers, 'E') => row(|id| Prompt(T::RowProfile(id, ProfileField::Email))),
        (Screen::AdminUsers, 'N') => row(|id| Prompt(T::RowProfile(id, ProfileField::Username))),
        (Screen::AdminUsers, 'F') => row(|id| Prompt(T::RowProfile(id, ProfileField::FullName))),
        (Screen::AdminUsers, 'S') => row(SaveRow),
        (Screen::AdminUsers, 'G') => row(|id| Prompt(T::UserGroups(id))),
        (Screen::AdminUsers, 'P') => row(|id| Prompt(T::ResetPassword(id))),
        (Screen::AdminUsers, 'a') => row(ToggleActive),

        (Screen::AdminGroups, 'n') => Some(Prompt(T::NewGroup)),
        (Screen::AdminGroups, 'R') => row(|id| Prompt(T::RenameGroup(id))),
        (Screen::AdminGroups, 'M') => row(|id| Prompt(T::GroupMembers(id))),
        _ => None,
    }
}

struct Input {
    target: InputTarget,
    buffer: String,
}

pub struct App<'a> {
    backend: &'a dyn Backend,
    prefs: Preferences,
    currency: String,
    shell: Option<Shell>,
    route: Route,
    page: Page,
    state: TableState,
    bucket: Bucket,
    input: Option<Input>,
    confirm_delete: Option<String>,
    show_detail: bool,
    notice: Option<Notice>,
    quit: bool,
}

impl<'a> App<'a> {
    pub fn new(backend: &'a dyn Backend, prefs: Preferences, currency: impl Into<String>) -> Self {
        Self {
            backend,
            prefs,
            currency: currency.into(),
            shell: None,
            route: Route::Login,
            page: Page::Message(String::new()),
            state: TableState::default(),
            bucket: Bucket::Day,
            input: None,
            confirm_delete: None,
            show_detail: false,
            notice: None,
            quit: false,
        }
    }

    /// Landing page of the saved view mode
    pub fn open_initial(&mut self) {
        let route = match self.prefs.view_mode {
            ViewMode::My => Route::MyView,
            ViewMode::Group => Route::GroupView,
        };
        self.open(route);
    }

    pub fn into_preferences(self) -> Preferences {
        self.prefs
    }

    /// Access check, then load the page for `route`
    pub fn open(&mut self, route: Route) {
        self.input = None;
        self.confirm_delete = None;
        self.show_detail = false;
        self.notice = None;
        self.state = TableState::default();

        let backend = self.backend;
        let shell = match check_access(backend) {
            Ok(shell) => shell,
            Err(e) => return self.fail(e),
        };
        if let Some(denial) = shell.denial() {
            self.page = Page::Message(denial.to_string());
            self.shell = Some(shell);
            return;
        }

        let route = route.guarded(&shell.viewer);
        self.shell = Some(shell);
        if let Some(mode) = route.forced_mode() {
            self.prefs.view_mode = mode;
        }

        match self.load(&route) {
            Ok(page) => {
                tracing::debug!(route = %route.path(), "opened page");
                self.page = page;
                self.route = route;
                if self.row_count() > 0 {
                    self.state.select(Some(0));
                }
            }
            Err(e) => {
                self.route = route;
                self.fail(e);
            }
        }
    }

    fn load(&mut self, route: &Route) -> BackendResult<Page> {
        let backend = self.backend;
        let now = Local::now();
        let mode = self.prefs.view_mode;
        let currency = self.currency.clone();

        let page = match route {
            Route::Login => Page::Message("Signed out. Run `expense-dashboard login`.".to_string()),
            Route::MyView => Page::MyView(MyViewPage::load(backend)?),
            Route::GroupView => Page::GroupView(GroupViewPage::load(backend)?),
            Route::Dashboard => Page::Dashboard(DashboardPage::load(
                backend,
                mode,
                &mut self.prefs,
                &currency,
                &now,
            )?),
            Route::AddExpense => Page::AddExpense(AddExpensePage::load(backend, &currency, &now)?),
            Route::EditExpense(id) => {
                Page::EditExpense(EditExpensePage::load(backend, id, &currency, &now)?)
            }
            Route::ViewExpenses => match mode {
                ViewMode::My => Page::MyExpenses(MyExpensesPage::load(backend, &Local)?),
                ViewMode::Group => Page::GroupExpenses(GroupExpensesPage::load(backend)?),
            },
            Route::Categories => Page::Categories(CategoriesPage::load(backend)?),
            Route::Budget => {
                Page::Budgets(BudgetsPage::load(backend, mode, &mut self.prefs, &currency)?)
            }
            Route::Analysis => Page::Analysis(AnalysisPage::load(
                backend,
                mode,
                &mut self.prefs,
                &currency,
                &now,
            )?),
            Route::Audit => Page::Audit(AuditPage::load(backend)?),
            Route::AdminUsers => Page::AdminUsers(AdminUsersPage::load(backend)?),
            Route::AdminGroups => Page::AdminGroups(AdminGroupsPage::load(backend)?),
        };
        Ok(page)
    }

    fn fail(&mut self, err: BackendError) {
        if err.requires_login() {
            self.page = Page::Message("Session expired. Run `expense-dashboard login`.".to_string());
        }
        self.notice = Some(Notice::from(&err));
    }

    /// Keep the value, or show the error in the status bar
    fn note<T>(&mut self, result: BackendResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.fail(e);
                None
            }
        }
    }

    fn is_superadmin(&self) -> bool {
        self.shell
            .as_ref()
            .map(|s| s.viewer.is_superadmin)
            .unwrap_or(false)
    }

    fn display_name(&self) -> &str {
        self.shell
            .as_ref()
            .map(|s| s.viewer.display_name.as_str())
            .unwrap_or("")
    }

    /// Menu entry the current route belongs to
    fn menu_route(&self) -> Route {
        match &self.route {
            Route::EditExpense(_) => Route::AddExpense,
            other => other.clone(),
        }
    }

    fn step_menu(&mut self, forward: bool) {
        let items = menu(self.prefs.view_mode, self.is_superadmin());
        if items.is_empty() {
            return;
        }
        let current = self.menu_route();
        let next = match items.iter().position(|item| item.route == current) {
            Some(i) if forward => (i + 1) % items.len(),
            Some(i) => (i + items.len() - 1) % items.len(),
            None => 0,
        };
        let route = items[next].route.clone();
        self.open(route);
    }

    fn toggle_mode(&mut self) {
        let current = self.prefs.view_mode;
        let (mode, route) = switch_mode(current, current.toggled(), &self.route);
        self.prefs.view_mode = mode;
        tracing::info!(mode = mode.as_str(), "switched view mode");
        self.open(route);
    }

    fn refresh(&mut self) {
        let route = self.route.clone();
        self.open(route);
    }

    fn sign_out(&mut self) {
        let result = sign_out(self.backend);
        if let Some(route) = self.note(result) {
            self.prefs.forget_session();
            self.route = route;
            self.quit = true;
        }
    }

    // ------------------------------------------------------------------
    // Rows and selection
    // ------------------------------------------------------------------

    fn row_count(&self) -> usize {
        match &self.page {
            Page::GroupView(p) => p.aggregates.by_category.len(),
            Page::AddExpense(p) => p.recent.rows.len(),
            Page::MyExpenses(p) => p.list.rows.len(),
            Page::GroupExpenses(p) => p.visible().len(),
            Page::Categories(p) => p.rows.len(),
            Page::Budgets(p) => p.visible().len(),
            Page::Audit(p) => p.entries.len(),
            Page::AdminUsers(p) => p.profiles.len(),
            Page::AdminGroups(p) => p.groups.len(),
            _ => 0,
        }
    }

    fn selected_id(&self) -> Option<String> {
        let i = self.state.selected()?;
        match &self.page {
            Page::AddExpense(p) => p.recent.rows.get(i).map(|e| e.id.clone()),
            Page::MyExpenses(p) => p.list.rows.get(i).map(|e| e.id.clone()),
            Page::Categories(p) => p.rows.get(i).map(|r| r.category.id.clone()),
            Page::Budgets(p) => p.visible().get(i).map(|b| b.id.clone()),
            Page::AdminUsers(p) => p.profiles.get(i).map(|u| u.user_id.clone()),
            Page::AdminGroups(p) => p.groups.get(i).map(|g| g.id.clone()),
            _ => None,
        }
    }

    pub fn next(&mut self) {
        let len = self.row_count();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.row_count();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
    }

    // ------------------------------------------------------------------
    // Page actions
    // ------------------------------------------------------------------

    fn turn_page(&mut self, forward: bool) {
        let backend = self.backend;
        let result = match &mut self.page {
            Page::MyExpenses(p) if forward => p.list.next_page(backend, &Local),
            Page::MyExpenses(p) => p.list.prev_page(backend, &Local),
            Page::AddExpense(p) if forward => p.recent.next_page(backend, &Local),
            Page::AddExpense(p) => p.recent.prev_page(backend, &Local),
            _ => Ok(false),
        };
        if let Some(true) = self.note(result) {
            self.state.select(Some(0));
        }
    }

    /// Cycle the active group on pages that have one
    fn next_group(&mut self) {
        let backend = self.backend;
        let now = Local::now();
        let prefs = &mut self.prefs;
        let result = match &mut self.page {
            Page::GroupView(p) => match following(&p.groups, p.selected.as_ref().map(|g| g.id.as_str())) {
                Some(id) => p.select(backend, &id),
                None => Ok(()),
            },
            Page::GroupExpenses(p) => match following(&p.groups, p.selected.as_deref()) {
                Some(id) => p.select(backend, &id),
                None => Ok(()),
            },
            Page::Dashboard(p) => match following(&p.groups, p.group.as_ref().map(|g| g.id.as_str())) {
                Some(id) => p.pick_group(backend, &id, prefs, &now),
                None => Ok(()),
            },
            Page::Budgets(p) => match following(&p.groups, p.group.as_ref().map(|g| g.id.as_str())) {
                Some(id) => p.pick_group(backend, &id, prefs),
                None => Ok(()),
            },
            Page::Analysis(p) => match following(&p.groups, p.group.as_ref().map(|g| g.id.as_str())) {
                Some(id) => p.pick_group(backend, &id, prefs, &now),
                None => Ok(()),
            },
            _ => Ok(()),
        };
        self.note(result);
        self.state.select(if self.row_count() > 0 { Some(0) } else { None });
    }

    fn next_bucket(&mut self) {
        self.bucket = match self.bucket {
            Bucket::Day => Bucket::Week,
            Bucket::Week => Bucket::Month,
            Bucket::Month => Bucket::Day,
        };
    }

    fn form_mut(&mut self) -> Option<&mut ExpenseForm> {
        match &mut self.page {
            Page::AddExpense(p) => Some(&mut p.form),
            Page::EditExpense(p) => Some(&mut p.form),
            _ => None,
        }
    }

    fn start_field(&mut self, field: FormField) {
        if self.form_mut().is_some() {
            self.prompt(InputTarget::Field(field));
        }
    }

    fn start_search(&mut self) {
        if matches!(self.page, Page::MyExpenses(_) | Page::GroupExpenses(_) | Page::Budgets(_)) {
            self.prompt(InputTarget::Search);
        }
    }

    fn prompt(&mut self, target: InputTarget) {
        let buffer = self.prefill(&target);
        self.input = Some(Input { target, buffer });
    }

    /// Current value of what the prompt edits
    fn prefill(&self, target: &InputTarget) -> String {
        match (target, &self.page) {
            (InputTarget::Field(f), Page::AddExpense(p)) => f.current(&p.form),
            (InputTarget::Field(f), Page::EditExpense(p)) => f.current(&p.form),
            (InputTarget::Search, Page::MyExpenses(p)) => p.list.filter.search.clone(),
            (InputTarget::Search, Page::GroupExpenses(p)) => p.search.clone(),
            (InputTarget::Search, Page::Budgets(p)) => p.search.clone(),
            (InputTarget::Filter(f), Page::MyExpenses(p)) => f.current(&p.list.filter),
            (InputTarget::NewBudget(f), Page::Budgets(p)) => f.of_form(&p.form),
            (InputTarget::RowBudget(id, f), Page::Budgets(p)) => match p.drafts.get(id) {
                Some(draft) => f.of_draft(draft),
                None => p
                    .rows
                    .iter()
                    .find(|b| &b.id == id)
                    .map(|b| f.of_draft(&BudgetDraft::from_budget(b)))
                    .unwrap_or_default(),
            },
            (InputTarget::NewCategory(f), Page::Categories(p)) => category_value(&p.adding, *f),
            (InputTarget::RowCategory(id, f), Page::Categories(p)) => p
                .rows
                .iter()
                .find(|r| &r.category.id == id)
                .map(|r| category_value(&r.draft, *f))
                .unwrap_or_default(),
            (InputTarget::NewUser(f), Page::AdminUsers(p)) => match f {
                UserField::Email => p.new_user.email.clone(),
                UserField::Username => p.new_user.username.clone(),
                UserField::FullName => p.new_user.full_name.clone(),
                UserField::Password => String::new(),
                UserField::Groups => p
                    .groups
                    .iter()
                    .filter(|g| p.new_user.group_ids.contains(&g.id))
                    .map(|g| g.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            },
            (InputTarget::RowProfile(id, f), Page::AdminUsers(p)) => p
                .profiles
                .iter()
                .find(|u| &u.user_id == id)
                .and_then(|u| match f {
                    ProfileField::Username => u.username.clone(),
                    ProfileField::FullName => u.full_name.clone(),
                    ProfileField::Email => u.email.clone(),
                })
                .unwrap_or_default(),
            (InputTarget::UserGroups(id), Page::AdminUsers(p)) => p.group_names_of(id),
            (InputTarget::NewGroup, Page::AdminGroups(p)) => p.new_group_name.clone(),
            (InputTarget::RenameGroup(id), Page::AdminGroups(p)) => p
                .groups
                .iter()
                .find(|g| &g.id == id)
                .map(|g| g.name.clone())
                .unwrap_or_default(),
            (InputTarget::GroupMembers(id), Page::AdminGroups(p)) => p.member_names_of(id),
            _ => String::new(),
        }
    }

    fn commit_input(&mut self) {
        let Some(Input { target, buffer }) = self.input.take() else {
            return;
        };
        self.notice = None;
        let resets = target.resets_selection();
        let backend = self.backend;
        let result = match (target, &mut self.page) {
            (InputTarget::Field(field), Page::AddExpense(p)) => {
                field.set(&mut p.form, &buffer);
                Ok(())
            }
            (InputTarget::Field(field), Page::EditExpense(p)) => {
                field.set(&mut p.form, &buffer);
                Ok(())
            }
            (InputTarget::Search, Page::MyExpenses(p)) => {
                let mut filter = p.list.filter.clone();
                filter.search = buffer;
                p.apply_filter(backend, filter, &Local)
            }
            (InputTarget::Search, Page::GroupExpenses(p)) => {
                p.search = buffer;
                Ok(())
            }
            (InputTarget::Search, Page::Budgets(p)) => {
                p.search = buffer;
                Ok(())
            }
            (InputTarget::Filter(field), Page::MyExpenses(p)) => {
                let mut filter = p.list.filter.clone();
                field
                    .apply(&mut filter, &buffer)
                    .and_then(|_| p.apply_filter(backend, filter, &Local))
            }
            (InputTarget::NewBudget(field), Page::Budgets(p)) => {
                field.set_form(&mut p.form, &buffer);
                Ok(())
            }
            (InputTarget::RowBudget(id, field), Page::Budgets(p)) => {
                if let Some(draft) = p.draft_mut(&id) {
                    field.set_draft(draft, &buffer);
                }
                Ok(())
            }
            (InputTarget::NewCategory(field), Page::Categories(p)) => {
                p.adding.set(field, &buffer);
                Ok(())
            }
            (InputTarget::RowCategory(_, _), Page::Categories(p)) if p.read_only() => {
                Err(BackendError::forbidden(ADMIN_ONLY))
            }
            (InputTarget::RowCategory(id, field), Page::Categories(p)) => {
                p.edit(&id, field, &buffer);
                Ok(())
            }
            (InputTarget::NewUser(UserField::Groups), Page::AdminUsers(p)) => p.set_new_user_groups(&buffer),
            (InputTarget::NewUser(field), Page::AdminUsers(p)) => {
                let user = &mut p.new_user;
                match field {
                    UserField::Email => user.email = buffer.trim().to_string(),
                    UserField::Username => user.username = buffer.trim().to_string(),
                    UserField::FullName => user.full_name = buffer.trim().to_string(),
                    UserField::Password => user.password = buffer,
                    UserField::Groups => {}
                }
                Ok(())
            }
            (InputTarget::RowProfile(id, field), Page::AdminUsers(p)) => {
                p.edit_local(&id, field, buffer.trim());
                Ok(())
            }
            (InputTarget::UserGroups(id), Page::AdminUsers(p)) => p.set_groups_named(backend, &id, &buffer),
            (InputTarget::ResetPassword(id), Page::AdminUsers(p)) => p.reset_password(backend, &id, &buffer),
            (InputTarget::NewGroup, Page::AdminGroups(p)) => {
                p.new_group_name = buffer;
                p.create(backend)
            }
            (InputTarget::RenameGroup(id), Page::AdminGroups(p)) => p.rename(backend, &id, &buffer),
            (InputTarget::GroupMembers(id), Page::AdminGroups(p)) => p.set_members_named(backend, &id, &buffer),
            _ => Ok(()),
        };
        self.note(result);
        if resets {
            self.state.select(if self.row_count() > 0 { Some(0) } else { None });
        } else {
            self.clamp_selection();
        }
    }

    /// Keep the selection inside the rows after a reload
    fn clamp_selection(&mut self) {
        let len = self.row_count();
        match self.state.selected() {
            _ if len == 0 => self.state.select(None),
            Some(i) if i >= len => self.state.select(Some(len - 1)),
            None => self.state.select(Some(0)),
            _ => {}
        }
    }

    fn screen(&self) -> Option<Screen> {
        match &self.page {
            Page::MyExpenses(_) => Some(Screen::MyExpenses),
            Page::Budgets(_) => Some(Screen::Budgets),
            Page::Categories(_) => Some(Screen::Categories),
            Page::AdminUsers(_) => Some(Screen::AdminUsers),
            Page::AdminGroups(_) => Some(Screen::AdminGroups),
            _ => None,
        }
    }

    /// Page-specific key; false when the page has no use for it
    fn page_key(&mut self, key: char) -> bool {
        let Some(screen) = self.screen() else {
            return false;
        };
        let selected = self.selected_id();
        match binding(screen, key, selected.as_deref()) {
            Some(action) => {
                self.run_binding(action);
                true
            }
            None => false,
        }
    }

    fn run_binding(&mut self, action: Binding) {
        if let Binding::Prompt(target) = action {
            self.prompt(target);
            return;
        }
        self.notice = None;
        let backend = self.backend;
        let now = Utc::now();
        let result = match (action, &mut self.page) {
            (Binding::CycleFrequency(None), Page::Budgets(p)) => {
                p.form.frequency = p.form.frequency.next();
                Ok(())
            }
            (Binding::CycleFrequency(Some(id)), Page::Budgets(p)) => {
                if let Some(draft) = p.draft_mut(&id) {
                    draft.frequency = draft.frequency.next();
                }
                Ok(())
            }
            (Binding::CycleScope(None), Page::Budgets(p)) => {
                p.form.cycle_scope(&p.categories);
                Ok(())
            }
            (Binding::CycleScope(Some(id)), Page::Budgets(p)) => {
                let categories = p.categories.clone();
                if let Some(draft) = p.draft_mut(&id) {
                    draft.cycle_scope(&categories);
                }
                Ok(())
            }
            (Binding::Create, Page::Budgets(p)) => p.add(backend),
            (Binding::Create, Page::Categories(p)) => p.add(backend),
            (Binding::Create, Page::AdminUsers(p)) => p.create_user(backend),
            (Binding::SaveRow(id), Page::Budgets(p)) => p.save_row(backend, &id, now),
            (Binding::SaveRow(id), Page::Categories(p)) => p.save_row(backend, &id, now),
            (Binding::SaveRow(id), Page::AdminUsers(p)) => p.save_profile(backend, &id),
            (Binding::ToggleActive(id), Page::AdminUsers(p)) => p.toggle_active(backend, &id),
            (Binding::CycleCategoryFilter, Page::MyExpenses(p)) => {
                let mut filter = p.list.filter.clone();
                filter.category_id = p.next_category_filter();
                p.apply_filter(backend, filter, &Local)
            }
            (Binding::ClearFilter, Page::MyExpenses(p)) => p.apply_filter(backend, ExpenseFilter::default(), &Local),
            _ => Ok(()),
        };
        self.note(result);
        self.clamp_selection();
    }

    /// Next active category in picker order
    fn cycle_category(&mut self) {
        let (categories, form) = match &mut self.page {
            Page::AddExpense(p) => (&p.categories, &mut p.form),
            Page::EditExpense(p) => (&p.categories, &mut p.form),
            _ => return,
        };
        if categories.is_empty() {
            return;
        }
        let next = match categories.iter().position(|c| c.id == form.category_id) {
            Some(i) => (i + 1) % categories.len(),
            None => 0,
        };
        form.category_id = categories[next].id.clone();
    }

    fn save(&mut self) {
        let backend = self.backend;
        let now = Local::now();
        let result = match &mut self.page {
            Page::AddExpense(p) => p.save(backend, &now).map(|_| None),
            Page::EditExpense(p) => p.save(backend, &Local).map(Some),
            _ => Ok(None),
        };
        if let Some(Some(route)) = self.note(result) {
            self.open(route);
        }
    }

    fn edit_selected(&mut self) {
        if let Some(id) = self.selected_id() {
            if matches!(self.page, Page::AddExpense(_) | Page::MyExpenses(_)) {
                self.open(Route::EditExpense(id));
            }
        }
    }

    fn ask_delete(&mut self) {
        if let Some(id) = self.selected_id() {
            self.confirm_delete = Some(id);
        }
    }

    fn delete_confirmed(&mut self, id: &str) {
        let backend = self.backend;
        let result = match &mut self.page {
            Page::AddExpense(p) => p.delete(backend, id, &Local).map(|_| ()),
            Page::MyExpenses(p) => p.delete(backend, id, &Local).map(|_| ()),
            Page::Categories(p) => p.delete_row(backend, id),
            Page::Budgets(p) => p.delete_row(backend, id),
            Page::AdminUsers(p) => p.delete_user(backend, id),
            Page::AdminGroups(p) => p.delete(backend, id),
            _ => Ok(()),
        };
        self.note(result);
        self.clamp_selection();
    }

    /// Notice of the page, falling back to the app-level one
    fn current_notice(&self) -> Option<&Notice> {
        let page_notice = match &self.page {
            Page::AddExpense(p) => p.notice.as_ref(),
            Page::EditExpense(p) => p.notice.as_ref(),
            Page::MyExpenses(p) => p.notice.as_ref(),
            Page::Categories(p) => p.notice.as_ref(),
            Page::Budgets(p) => p.notice.as_ref(),
            Page::AdminUsers(p) => p.notice.as_ref(),
            Page::AdminGroups(p) => p.notice.as_ref(),
            _ => None,
        };
        self.notice.as_ref().or(page_notice)
    }
}

fn following(groups: &[Group], current: Option<&str>) -> Option<String> {
    if groups.is_empty() {
        return None;
    }
    let next = match groups.iter().position(|g| Some(g.id.as_str()) == current) {
        Some(i) => (i + 1) % groups.len(),
        None => 0,
    };
    Some(groups[next].id.clone())
}

// ============================================================================
// EVENT LOOP
// ============================================================================

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    while !app.quit {
        terminal.draw(|f| ui(f, app))?;

        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        if let Some(input) = app.input.as_mut() {
            match key.code {
                KeyCode::Enter => app.commit_input(),
                KeyCode::Esc => app.input = None,
                KeyCode::Backspace => {
                    input.buffer.pop();
                }
                KeyCode::Char(c) => input.buffer.push(c),
                _ => {}
            }
            continue;
        }

        if let Some(id) = app.confirm_delete.take() {
            if key.code == KeyCode::Char('y') {
                app.delete_confirmed(&id);
            }
            continue;
        }

        if let KeyCode::Char(c) = key.code {
            if app.page_key(c) {
                continue;
            }
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => app.quit = true,
            KeyCode::Tab => app.step_menu(true),
            KeyCode::BackTab => app.step_menu(false),
            KeyCode::Char('m') => app.toggle_mode(),
            KeyCode::Char('t') => {
                let theme = app.prefs.toggle_theme();
                tracing::debug!(theme = theme.as_str(), "toggled theme");
            }
            KeyCode::Char('r') => app.refresh(),
            KeyCode::Char('L') => app.sign_out(),
            KeyCode::Char('g') => app.next_group(),
            KeyCode::Char('b') => app.next_bucket(),
            KeyCode::Char('/') => app.start_search(),
            KeyCode::Char('a') => app.start_field(FormField::Amount),
            KeyCode::Char('u') => app.start_field(FormField::Currency),
            KeyCode::Char('o') => app.start_field(FormField::Note),
            KeyCode::Char('w') => app.start_field(FormField::SpentAt),
            KeyCode::Char('c') => app.cycle_category(),
            KeyCode::Char('s') => app.save(),
            KeyCode::Char('e') => app.edit_selected(),
            KeyCode::Char('d') => app.ask_delete(),
            KeyCode::Enter => {
                if matches!(app.page, Page::Audit(_)) {
                    app.show_detail = !app.show_detail;
                } else {
                    app.edit_selected();
                }
            }
            KeyCode::Char('n') | KeyCode::Right => app.turn_page(true),
            KeyCode::Char('p') | KeyCode::Left => app.turn_page(false),
            KeyCode::Down | KeyCode::Char('j') => app.next(),
            KeyCode::Up | KeyCode::Char('k') => app.previous(),
            _ => {}
        }
    }
    Ok(())
}

// ============================================================================
// RENDERING
// ============================================================================

struct Palette {
    base: Style,
    accent: Color,
    muted: Color,
}

fn palette(theme: Theme) -> Palette {
    match theme {
        Theme::Dark => Palette {
            base: Style::default().fg(Color::White).bg(Color::Reset),
            accent: Color::Yellow,
            muted: Color::DarkGray,
        },
        Theme::Light => Palette {
            base: Style::default().fg(Color::Black).bg(Color::White),
            accent: Color::Blue,
            muted: Color::Gray,
        },
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let colors = palette(app.prefs.theme);
    f.render_widget(Block::default().style(colors.base), f.size());

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Menu
            Constraint::Min(0),    // Page
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app, &colors);
    render_page(f, chunks[1], app, &colors);
    render_status_bar(f, chunks[2], app, &colors);
}

fn render_header(f: &mut Frame, area: Rect, app: &App, colors: &Palette) {
    let current = app.menu_route();
    let mut spans = vec![];
    for (i, item) in menu(app.prefs.view_mode, app.is_superadmin()).iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw(" │ "));
        }
        let style = if item.route == current {
            Style::default()
                .fg(colors.accent)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(colors.muted)
        };
        spans.push(Span::styled(item.label, style));
    }
    spans.push(Span::raw("  |  "));
    spans.push(Span::styled(
        app.prefs.view_mode.title(),
        Style::default().fg(Color::Cyan),
    ));
    spans.push(Span::raw("  |  "));
    spans.push(Span::raw(app.display_name().to_string()));

    let header = Paragraph::new(vec![Line::from(spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    f.render_widget(header, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App, colors: &Palette) {
    let mut spans = vec![];

    if let Some(input) = &app.input {
        let shown = if input.target.is_secret() {
            "•".repeat(input.buffer.chars().count())
        } else {
            input.buffer.clone()
        };
        spans.push(Span::styled(
            format!(" {}: ", input.target.label()),
            Style::default().fg(colors.accent),
        ));
        spans.push(Span::raw(format!("{}▏", shown)));
        spans.push(Span::styled("  (Enter keep, Esc cancel)", Style::default().fg(colors.muted)));
    } else if app.confirm_delete.is_some() {
        spans.push(Span::styled(
            " Delete selected row? (y/n)",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ));
    } else {
        if let Some(notice) = app.current_notice() {
            let color = if notice.is_error() { Color::Red } else { Color::Green };
            spans.push(Span::styled(format!(" {} ", notice.text()), Style::default().fg(color)));
            spans.push(Span::raw("|"));
        }
        for (key, what) in [
            ("Tab", " Page"),
            ("m", " Mode"),
            ("g", " Group"),
            ("r", " Refresh"),
            ("t", " Theme"),
            ("n/p", " More"),
            ("/", " Search"),
        ] {
            spans.push(Span::raw(" "));
            spans.push(Span::styled(key, Style::default().fg(colors.accent)));
            spans.push(Span::raw(what));
        }
        spans.push(Span::raw(" "));
        spans.push(Span::styled("q", Style::default().fg(Color::Red)));
        spans.push(Span::raw(" Quit"));
    }

    let status_bar = Paragraph::new(vec![Line::from(spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(colors.base),
    );
    f.render_widget(status_bar, area);
}

fn render_page(f: &mut Frame, area: Rect, app: &mut App, colors: &Palette) {
    let title = format!(" {} ", app.route.title());
    match &app.page {
        Page::Message(text) => {
            let body = Paragraph::new(vec![Line::from(""), Line::from(format!("  {}", text))])
                .block(framed(title));
            f.render_widget(body, area);
        }
        Page::MyView(p) => render_my_view(f, area, p, title),
        Page::GroupView(p) => render_group_view(f, area, p, &mut app.state, colors),
        Page::Dashboard(p) => render_dashboard(f, area, p, colors),
        Page::AddExpense(p) => {
            let chunks = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
                .split(area);
            render_form(f, chunks[0], &p.form, &p.categories, title, colors);
            let rows = p
                .recent
                .rows
                .iter()
                .map(|e| {
                    Row::new(vec![
                        Cell::from(local_display(&e.spent_at_utc, &Local)),
                        Cell::from(e.category_name().to_string()),
                        Cell::from(format_money(e.amount, &e.currency)),
                        Cell::from(p.added_by().to_string()),
                        Cell::from(truncate(e.note_or_empty(), 24)),
                    ])
                })
                .collect();
            let table = data_table(
                rows,
                &["When", "Category", "Amount", "Added by", "Note"],
                vec![
                    Constraint::Length(17),
                    Constraint::Length(16),
                    Constraint::Length(14),
                    Constraint::Length(14),
                    Constraint::Min(10),
                ],
                format!(" Recent - {} ", p.recent.summary()),
                colors,
            );
            f.render_stateful_widget(table, chunks[1], &mut app.state);
        }
        Page::EditExpense(p) => {
            if p.loaded {
                render_form(f, area, &p.form, &p.categories, title, colors);
            } else {
                f.render_widget(Paragraph::new("").block(framed(title)), area);
            }
        }
        Page::MyExpenses(p) => {
            let rows = p
                .list
                .rows
                .iter()
                .map(|e| {
                    Row::new(vec![
                        Cell::from(local_display(&e.spent_at_utc, &Local)),
                        Cell::from(e.category_name().to_string())
                            .style(Style::default().fg(hex_color(e.category_color()))),
                        Cell::from(format_money(e.amount, &e.currency)),
                        Cell::from(truncate(e.note_or_empty(), 40)),
                    ])
                })
                .collect();
            let search = filter_summary(&p.list.filter, &p.categories);
            let table = data_table(
                rows,
                &["When", "Category", "Amount", "Note"],
                vec![
                    Constraint::Length(17),
                    Constraint::Length(20),
                    Constraint::Length(16),
                    Constraint::Min(10),
                ],
                format!(" My Expenses - {}{} - c/u/</> filter, x clear ", p.list.summary(), search),
                colors,
            );
            f.render_stateful_widget(table, area, &mut app.state);
        }
        Page::GroupExpenses(p) => {
            let group = p
                .selected
                .as_ref()
                .and_then(|id| p.groups.iter().find(|g| &g.id == id))
                .map(|g| g.name.as_str())
                .unwrap_or("no group");
            let rows = p.visible().into_iter().map(aggregate_row).collect();
            let table = data_table(
                rows,
                &["Category", "Currency", "Total", "Entries"],
                aggregate_widths(),
                format!(" {} - search \"{}\" ", group, p.search),
                colors,
            );
            f.render_stateful_widget(table, area, &mut app.state);
        }
        Page::Categories(p) => {
            let area = if p.read_only() {
                area
            } else {
                let chunks = split_form(area);
                let adding = &p.adding;
                let form = key_line(
                    colors,
                    &[
                        ("n", "Name", adding.name.as_str()),
                        ("p", "Priority", adding.priority.as_str()),
                        ("c", "Color", adding.color.as_str()),
                        ("i", "Icon", adding.icon.as_str()),
                    ],
                    "[s] Add",
                );
                f.render_widget(Paragraph::new(form).block(framed(" New category ".to_string())), chunks[0]);
                chunks[1]
            };
            let rows = p
                .rows
                .iter()
                .map(|r| {
                    let c = &r.category;
                    let d = &r.draft;
                    Row::new(vec![
                        Cell::from(dirty_mark(r.dirty, &d.name))
                            .style(Style::default().fg(hex_color(c.color.as_deref()))),
                        Cell::from(d.priority.clone()),
                        Cell::from(d.color.clone()),
                        Cell::from(d.icon.clone()),
                        Cell::from(if c.is_active { "yes" } else { "no" }),
                    ])
                })
                .collect();
            let suffix = if p.read_only() {
                "(read-only) "
            } else {
                "- N/P/C/I edit row, S save "
            };
            let table = data_table(
                rows,
                &["Name", "Priority", "Color", "Icon", "Active"],
                vec![
                    Constraint::Length(24),
                    Constraint::Length(10),
                    Constraint::Length(10),
                    Constraint::Length(8),
                    Constraint::Length(8),
                ],
                format!("{}{}", title, suffix),
                colors,
            );
            f.render_stateful_widget(table, area, &mut app.state);
        }
        Page::Budgets(p) => {
            let owner = match (&p.mode, &p.group) {
                (ViewMode::Group, Some(g)) => g.name.clone(),
                (ViewMode::Group, None) => "no group".to_string(),
                (ViewMode::My, _) => p.viewer.display_name.clone(),
            };
            let area = if p.can_create() {
                let chunks = split_form(area);
                let form = &p.form;
                let scope = scope_name(form.scope.is_all(), &form.category_id, &p.categories);
                let line = key_line(
                    colors,
                    &[
                        ("c", "Scope", scope.as_str()),
                        ("f", "Every", form.frequency.title()),
                        ("a", "Amount", form.amount.as_str()),
                        ("u", "Currency", form.currency()),
                        ("o", "Note", form.note.as_str()),
                    ],
                    "[s] Add",
                );
                f.render_widget(Paragraph::new(line).block(framed(" New budget ".to_string())), chunks[0]);
                chunks[1]
            } else {
                area
            };
            let rows = p
                .visible()
                .into_iter()
                .map(|b| {
                    let draft = p
                        .drafts
                        .get(&b.id)
                        .filter(|d| **d != BudgetDraft::from_budget(b));
                    match draft {
                        Some(d) => Row::new(vec![
                            Cell::from(dirty_mark(
                                true,
                                &scope_name(d.all_categories, &d.category_id, &p.categories),
                            )),
                            Cell::from(d.frequency.title()),
                            Cell::from(format!("{} {}", d.amount, d.currency)),
                            Cell::from(truncate(&d.note, 30)),
                        ]),
                        None => Row::new(vec![
                            Cell::from(b.scope_label().to_string()),
                            Cell::from(b.frequency.title()),
                            Cell::from(format_money(b.amount, &b.currency)),
                            Cell::from(truncate(b.note.as_deref().unwrap_or(""), 30)),
                        ]),
                    }
                })
                .collect();
            let hint = if p.can_edit { "- A/U/O/F/C edit row, S save " } else { "" };
            let table = data_table(
                rows,
                &["Scope", "Frequency", "Amount", "Note"],
                vec![
                    Constraint::Length(24),
                    Constraint::Length(10),
                    Constraint::Length(16),
                    Constraint::Min(10),
                ],
                format!(" Budgets - {} {}", owner, hint),
                colors,
            );
            f.render_stateful_widget(table, area, &mut app.state);
        }
        Page::Analysis(p) => render_analysis(f, area, p, app.bucket, colors),
        Page::Audit(p) => {
            let area = if app.show_detail {
                let chunks = Layout::default()
                    .direction(Direction::Horizontal)
                    .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
                    .split(area);
                let detail = app
                    .state
                    .selected()
                    .and_then(|i| p.entries.get(i))
                    .map(|e| {
                        let mut lines = vec![Line::styled(" OLD", Style::default().fg(colors.accent))];
                        lines.extend(e.old_pretty().lines().map(|l| Line::from(format!(" {}", l))));
                        lines.push(Line::styled(" NEW", Style::default().fg(colors.accent)));
                        lines.extend(e.new_pretty().lines().map(|l| Line::from(format!(" {}", l))));
                        lines
                    })
                    .unwrap_or_default();
                f.render_widget(Paragraph::new(detail).block(framed(" Change ".to_string())), chunks[1]);
                chunks[0]
            } else {
                area
            };
            let rows = p
                .entries
                .iter()
                .map(|e| {
                    Row::new(vec![
                        Cell::from(
                            e.performed_at
                                .map(|at| local_display(&at, &Local))
                                .unwrap_or_default(),
                        ),
                        Cell::from(e.actor().to_string()),
                        Cell::from(e.action.clone().unwrap_or_default()),
                        Cell::from(e.category_name.clone().unwrap_or_default()),
                        Cell::from(e.changed_summary()),
                    ])
                })
                .collect();
            let table = data_table(
                rows,
                &["When", "Who", "Action", "Category", "Changed"],
                vec![
                    Constraint::Length(17),
                    Constraint::Length(16),
                    Constraint::Length(8),
                    Constraint::Length(16),
                    Constraint::Min(10),
                ],
                title,
                colors,
            );
            f.render_stateful_widget(table, area, &mut app.state);
        }
        Page::AdminUsers(p) => {
            let chunks = split_form(area);
            let user = &p.new_user;
            let password = "•".repeat(user.password.chars().count());
            let groups: Vec<&str> = p
                .groups
                .iter()
                .filter(|g| user.group_ids.contains(&g.id))
                .map(|g| g.name.as_str())
                .collect();
            let groups = groups.join(", ");
            let form = key_line(
                colors,
                &[
                    ("e", "Email", user.email.as_str()),
                    ("n", "Username", user.username.as_str()),
                    ("f", "Full name", user.full_name.as_str()),
                    ("w", "Password", password.as_str()),
                    ("g", "Groups", groups.as_str()),
                ],
                "[s] Create",
            );
            f.render_widget(Paragraph::new(form).block(framed(" New user ".to_string())), chunks[0]);
            let area = chunks[1];
            let rows = p
                .profiles
                .iter()
                .map(|u| {
                    let groups: Vec<&str> = p
                        .groups_of(&u.user_id)
                        .iter()
                        .filter_map(|id| p.groups.iter().find(|g| &g.id == id))
                        .map(|g| g.name.as_str())
                        .collect();
                    Row::new(vec![
                        Cell::from(u.username.clone().unwrap_or_default()),
                        Cell::from(u.full_name.clone().unwrap_or_default()),
                        Cell::from(u.email.clone().unwrap_or_default()),
                        Cell::from(if u.is_active { "active" } else { "inactive" }).style(
                            Style::default().fg(if u.is_active { Color::Green } else { Color::Red }),
                        ),
                        Cell::from(if u.is_superadmin { "yes" } else { "" }),
                        Cell::from(groups.join(", ")),
                    ])
                })
                .collect();
            let table = data_table(
                rows,
                &["Username", "Full name", "Email", "Status", "Admin", "Groups"],
                vec![
                    Constraint::Length(14),
                    Constraint::Length(18),
                    Constraint::Length(26),
                    Constraint::Length(9),
                    Constraint::Length(6),
                    Constraint::Min(10),
                ],
                format!("{}- E/N/F edit, S save, G groups, P password, a active ", title),
                colors,
            );
            f.render_stateful_widget(table, area, &mut app.state);
        }
        Page::AdminGroups(p) => {
            let labels = p.member_labels();
            let rows = p
                .groups
                .iter()
                .map(|g| {
                    let members = p.members_of(&g.id);
                    let names: Vec<&str> = labels
                        .iter()
                        .filter(|(id, _)| members.contains(id))
                        .map(|(_, label)| label.as_str())
                        .collect();
                    let name_style = if g.is_protected() {
                        Style::default().fg(colors.muted)
                    } else {
                        Style::default()
                    };
                    Row::new(vec![
                        Cell::from(g.name.clone()).style(name_style),
                        Cell::from(names.join(", ")),
                    ])
                })
                .collect();
            let table = data_table(
                rows,
                &["Group", "Members"],
                vec![Constraint::Length(24), Constraint::Min(10)],
                format!("{}- n new, R rename, M members ", title),
                colors,
            );
            f.render_stateful_widget(table, area, &mut app.state);
        }
    }
}

fn render_my_view(f: &mut Frame, area: Rect, page: &MyViewPage, title: String) {
    let mut lines = vec![
        Line::from(""),
        Line::from(vec![
            Span::raw("  Welcome, "),
            Span::styled(page.display_name.clone(), Style::default().add_modifier(Modifier::BOLD)),
        ]),
        Line::from(""),
        Line::from(format!("  Entries: {}", page.entries)),
        Line::from(""),
    ];
    if page.totals.is_empty() {
        lines.push(Line::from("  No expenses yet"));
    }
    for total in &page.totals {
        lines.push(Line::from(format!("  {}", format_money(total.total, &total.currency))));
    }
    f.render_widget(Paragraph::new(lines).block(framed(title)), area);
}

fn render_group_view(f: &mut Frame, area: Rect, page: &GroupViewPage, state: &mut TableState, colors: &Palette) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(page.aggregates.totals.len() as u16 + 3),
            Constraint::Min(0),
        ])
        .split(area);

    let name = page.selected.as_ref().map(|g| g.name.as_str()).unwrap_or("no group");
    let mut lines: Vec<Line> = page
        .aggregates
        .totals
        .iter()
        .map(|t| Line::from(format!("  {}  ({} entries)", format_money(t.total, &t.currency), t.cnt)))
        .collect();
    if lines.is_empty() {
        lines.push(Line::from("  No expenses in this group"));
    }
    f.render_widget(
        Paragraph::new(lines).block(framed(format!(" {} - totals ", name))),
        chunks[0],
    );

    let rows = page.aggregates.by_category.iter().map(aggregate_row).collect();
    let table = data_table(
        rows,
        &["Category", "Currency", "Total", "Entries"],
        aggregate_widths(),
        " By category ".to_string(),
        colors,
    );
    f.render_stateful_widget(table, chunks[1], state);
}

fn render_dashboard(f: &mut Frame, area: Rect, page: &DashboardPage, colors: &Palette) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(9), Constraint::Min(0)])
        .split(area);

    let cards = &page.cards;
    let currency = page.currency.as_str();
    let scope = match (&page.mode, &page.group) {
        (ViewMode::Group, Some(g)) => format!(" Dashboard - {} ", g.name),
        (ViewMode::Group, None) => " Dashboard - no group ".to_string(),
        (ViewMode::My, _) => " Dashboard ".to_string(),
    };
    let card = |label: &str, value: String| {
        Line::from(vec![
            Span::styled(format!("  {:<22}", label), Style::default().fg(Color::Cyan)),
            Span::raw(value),
        ])
    };
    let lines = vec![
        Line::from(""),
        card("This month", format_money(cards.this_month_total, currency)),
        card("Entries this month", cards.this_month_count.to_string()),
        card("All time", format_money(cards.all_time_total, currency)),
        card("Month without rent", format_money(cards.non_rental_month, currency)),
        card("Average entry", format_money(cards.average, currency)),
        card("Top category", cards.top_category.clone().unwrap_or_else(|| "—".to_string())),
    ];
    f.render_widget(Paragraph::new(lines).block(framed(scope)), chunks[0]);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
        ])
        .split(chunks[1]);
    render_doughnut(f, columns[0], " Today ", &page.today, currency, colors);
    render_doughnut(f, columns[1], " Last 7 days ", &page.week, currency, colors);
    render_doughnut(f, columns[2], " This month ", &page.month, currency, colors);
}

fn render_doughnut(f: &mut Frame, area: Rect, title: &str, chart: &Doughnut, currency: &str, colors: &Palette) {
    if chart.is_empty() {
        let empty = Paragraph::new(vec![Line::from(""), Line::from("  No spending")])
            .block(framed(title.to_string()));
        f.render_widget(empty, area);
        return;
    }
    let rows = chart
        .slices
        .iter()
        .map(|s| {
            Row::new(vec![
                Cell::from("■").style(Style::default().fg(hex_color(Some(s.color)))),
                Cell::from(s.label.clone()),
                Cell::from(format_money(s.value, currency)),
            ])
        })
        .collect();
    let table = data_table(
        rows,
        &["", "Share", "Amount"],
        vec![Constraint::Length(2), Constraint::Min(12), Constraint::Length(14)],
        format!("{}- {} ", title, format_money(chart.total, currency)),
        colors,
    );
    f.render_widget(table, area);
}

fn render_analysis(f: &mut Frame, area: Rect, page: &AnalysisPage, bucket: Bucket, colors: &Palette) {
    let start = page.window.start(bucket);
    let end = page.window.keys(bucket).last().copied().unwrap_or(start);
    let offset = |d: NaiveDate| (d - start).num_days() as f64;

    let group = match (&page.mode, &page.group) {
        (ViewMode::Group, Some(g)) => format!("{} - ", g.name),
        _ => String::new(),
    };
    let title = format!(" Analysis - {}{} by {} (b) ", group, page.currency, bucket.as_str());

    if page.series.is_empty() {
        let empty = Paragraph::new(vec![Line::from(""), Line::from("  No spending in this window")])
            .block(framed(title));
        f.render_widget(empty, area);
        return;
    }

    let data: Vec<(String, Color, Vec<(f64, f64)>)> = page
        .series
        .iter()
        .map(|s| {
            let points = s.points(bucket).iter().map(|p| (offset(p.x), p.y)).collect();
            (s.name.clone(), hex_color(Some(s.color.as_str())), points)
        })
        .collect();
    let max_y = data
        .iter()
        .flat_map(|(_, _, points)| points.iter().map(|(_, y)| *y))
        .fold(0.0, f64::max)
        .max(1.0);

    let datasets = data
        .iter()
        .map(|(name, color, points)| {
            Dataset::default()
                .name(name.clone())
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(*color))
                .data(points)
        })
        .collect();

    let chart = Chart::new(datasets)
        .block(framed(title))
        .x_axis(
            Axis::default()
                .style(Style::default().fg(colors.muted))
                .bounds([0.0, offset(end).max(1.0)])
                .labels(vec![Span::raw(start.to_string()), Span::raw(end.to_string())]),
        )
        .y_axis(
            Axis::default()
                .style(Style::default().fg(colors.muted))
                .bounds([0.0, max_y])
                .labels(vec![Span::raw("0"), Span::raw(format!("{:.0}", max_y))]),
        );
    f.render_widget(chart, area);
}

fn render_form(
    f: &mut Frame,
    area: Rect,
    form: &ExpenseForm,
    categories: &[expense_dashboard::Category],
    title: String,
    colors: &Palette,
) {
    let category = categories
        .iter()
        .find(|c| c.id == form.category_id)
        .map(|c| c.name.as_str())
        .unwrap_or("— pick one —");
    let field = |key: &str, label: &str, value: &str| {
        Line::from(vec![
            Span::styled(format!("  [{}] ", key), Style::default().fg(colors.accent)),
            Span::styled(format!("{:<10}", label), Style::default().fg(Color::Cyan)),
            Span::raw(value.to_string()),
        ])
    };
    let lines = vec![
        Line::from(""),
        field("c", "Category", category),
        field("a", "Amount", &form.amount),
        field("u", "Currency", form.currency()),
        field("w", "When", &form.spent_at),
        field("o", "Note", &form.note),
        Line::from(""),
        Line::from(vec![
            Span::styled("  [s] ", Style::default().fg(colors.accent)),
            Span::raw("Save"),
        ]),
    ];
    f.render_widget(Paragraph::new(lines).block(framed(title)), area);
}

// ============================================================================
// HELPERS
// ============================================================================

/// Form strip above a table
fn split_form(area: Rect) -> std::rc::Rc<[Rect]> {
    Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(area)
}

fn key_line<'a>(colors: &Palette, fields: &[(&'a str, &'a str, &'a str)], submit: &'a str) -> Line<'a> {
    let mut spans = vec![];
    for (key, label, value) in fields {
        spans.push(Span::styled(format!(" [{}] ", key), Style::default().fg(colors.accent)));
        spans.push(Span::styled(format!("{}: ", label), Style::default().fg(Color::Cyan)));
        spans.push(Span::raw(value.to_string()));
    }
    spans.push(Span::styled(format!("  {}", submit), Style::default().fg(colors.accent)));
    Line::from(spans)
}

/// Unsaved rows get a leading `*`
fn dirty_mark(dirty: bool, text: &str) -> String {
    if dirty {
        format!("* {}", text)
    } else {
        text.to_string()
    }
}

fn scope_name(all: bool, category_id: &str, categories: &[expense_dashboard::Category]) -> String {
    if all {
        return ALL_CATEGORIES_LABEL.to_string();
    }
    categories
        .iter()
        .find(|c| c.id == category_id)
        .map(|c| c.name.clone())
        .unwrap_or_else(|| "— pick one —".to_string())
}

/// Active filters for the list title
fn filter_summary(filter: &ExpenseFilter, categories: &[expense_dashboard::Category]) -> String {
    let mut parts = vec![];
    if !filter.search.is_empty() {
        parts.push(format!("\"{}\"", filter.search));
    }
    if let Some(id) = &filter.category_id {
        let name = categories.iter().find(|c| &c.id == id).map(|c| c.name.as_str());
        parts.push(name.unwrap_or(id.as_str()).to_string());
    }
    if !filter.currency.is_empty() {
        parts.push(filter.currency.clone());
    }
    match (filter.from, filter.to) {
        (None, None) => {}
        (from, to) => parts.push(format!(
            "{}..{}",
            from.map(|d| d.to_string()).unwrap_or_default(),
            to.map(|d| d.to_string()).unwrap_or_default()
        )),
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" - {}", parts.join(", "))
    }
}

fn framed(title: String) -> Block<'static> {
    Block::default().borders(Borders::ALL).title(title)
}

fn data_table<'a>(
    rows: Vec<Row<'a>>,
    headers: &[&'static str],
    widths: Vec<Constraint>,
    title: String,
    colors: &Palette,
) -> Table<'a> {
    let header_cells = headers.iter().map(|h| {
        Cell::from(*h).style(
            Style::default()
                .fg(colors.accent)
                .add_modifier(Modifier::BOLD),
        )
    });
    let header = Row::new(header_cells).height(1);

    Table::new(rows, widths)
        .header(header)
        .block(framed(title))
        .highlight_style(Style::default().bg(colors.muted).add_modifier(Modifier::BOLD))
        .highlight_symbol("→ ")
}

fn aggregate_row(row: &expense_dashboard::CategoryAggregate) -> Row<'static> {
    Row::new(vec![
        Cell::from(row.category_name().to_string())
            .style(Style::default().fg(hex_color(row.color.as_deref()))),
        Cell::from(row.currency.clone()),
        Cell::from(format!("{:.2}", row.total)),
        Cell::from(row.cnt.to_string()),
    ])
}

fn aggregate_widths() -> Vec<Constraint> {
    vec![
        Constraint::Length(24),
        Constraint::Length(10),
        Constraint::Length(14),
        Constraint::Length(8),
    ]
}

/// `#rrggbb` to a terminal colour; anything else is plain gray
fn hex_color(hex: Option<&str>) -> Color {
    let parsed = hex
        .and_then(|h| h.strip_prefix('#'))
        .filter(|h| h.len() == 6)
        .and_then(|h| u32::from_str_radix(h, 16).ok());
    match parsed {
        Some(rgb) => Color::Rgb((rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8),
        None => Color::Gray,
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
