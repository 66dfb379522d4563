// 🔐 Access - session guard, app gate, routes and the navigation menu
//
// Every screen starts here: no session means Login, a session whose user
// fails `user_can_use_app` sees the gate message, everyone else gets the
// menu for their view mode and role.

use crate::backend::{current_user, fetch_optional, rpc_flag, AuthUser, Backend, Query};
use crate::config::ViewMode;
use crate::entities::profile::{Profile, PROFILE_TABLE};
use crate::error::{BackendError, BackendResult};
use serde::Serialize;
use serde_json::json;

pub const GATE_RPC: &str = "user_can_use_app";
pub const ACCESS_DENIED: &str = "Not active / not in any group. Contact superadmin.";
pub const SIGN_IN_DENIED: &str = "Not active or not in any group.";
pub const SUPERADMIN_ONLY: &str = "Superadmin only.";

// ============================================================================
// VIEWER
// ============================================================================

/// Signed-in user plus the profile flags pages need
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Viewer {
    pub user: AuthUser,
    pub display_name: String,
    pub is_superadmin: bool,
}

impl Viewer {
    pub fn load(backend: &dyn Backend) -> BackendResult<Self> {
        let user = current_user(backend)?;
        let profile: Option<Profile> = fetch_optional(
            backend,
            PROFILE_TABLE,
            Query::new()
                .select("user_id,full_name,username,email,is_active,is_superadmin")
                .eq("user_id", &user.id),
        )?;
        Ok(Self::from_parts(user, profile.as_ref()))
    }

    pub fn from_parts(user: AuthUser, profile: Option<&Profile>) -> Self {
        let email = user.email.clone().unwrap_or_default();
        let display_name = match profile {
            Some(p) => p.display_name(&email),
            None => email,
        };
        Self {
            is_superadmin: profile.map(|p| p.is_superadmin).unwrap_or(false),
            display_name,
            user,
        }
    }

    pub fn id(&self) -> &str {
        &self.user.id
    }

    pub fn require_superadmin(&self) -> BackendResult<()> {
        if self.is_superadmin {
            Ok(())
        } else {
            Err(BackendError::forbidden(SUPERADMIN_ONLY))
        }
    }
}

/// Result of the shell check run before any page is shown
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Shell {
    pub viewer: Viewer,
    pub allowed: bool,
}

impl Shell {
    pub fn denial(&self) -> Option<&'static str> {
        (!self.allowed).then_some(ACCESS_DENIED)
    }
}

/// NotAuthenticated when there is no session
pub fn check_access(backend: &dyn Backend) -> BackendResult<Shell> {
    let viewer = Viewer::load(backend)?;
    let allowed = rpc_flag(backend, GATE_RPC, json!({}))?;
    if !allowed {
        tracing::info!(user = %viewer.user.id, "app gate refused access");
    }
    Ok(Shell { viewer, allowed })
}

/// Password sign-in followed by the app gate; lands on My View.
pub fn sign_in(backend: &dyn Backend, email: &str, password: &str) -> BackendResult<Route> {
    let session = backend.sign_in_with_password(email.trim(), password)?;
    if !rpc_flag(backend, GATE_RPC, json!({}))? {
        tracing::warn!(user = %session.user.id, "signed in but not allowed to use the app");
        if let Err(e) = backend.sign_out() {
            tracing::warn!(error = %e, "sign-out after refused login failed");
        }
        return Err(BackendError::forbidden(SIGN_IN_DENIED));
    }
    tracing::info!(user = %session.user.id, "signed in");
    Ok(Route::MyView)
}

pub fn sign_out(backend: &dyn Backend) -> BackendResult<Route> {
    backend.sign_out()?;
    tracing::info!("signed out");
    Ok(Route::Login)
}

// ============================================================================
// ROUTES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Route {
    Login,
    MyView,
    GroupView,
    Dashboard,
    AddExpense,
    EditExpense(String),
    ViewExpenses,
    Categories,
    Budget,
    Analysis,
    Audit,
    AdminUsers,
    AdminGroups,
}

impl Route {
    pub fn path(&self) -> String {
        match self {
            Route::Login => "/login".to_string(),
            Route::MyView => "/me".to_string(),
            Route::GroupView => "/group".to_string(),
            Route::Dashboard => "/dashboard".to_string(),
            Route::AddExpense => "/me/add".to_string(),
            Route::EditExpense(id) => format!("/me/edit/{}", id),
            Route::ViewExpenses => "/view".to_string(),
            Route::Categories => "/categories".to_string(),
            Route::Budget => "/budget".to_string(),
            Route::Analysis => "/analysis".to_string(),
            Route::Audit => "/audit".to_string(),
            Route::AdminUsers => "/admin/users".to_string(),
            Route::AdminGroups => "/admin/groups".to_string(),
        }
    }

    pub fn parse(path: &str) -> Option<Self> {
        let path = path.trim_end_matches('/');
        let route = match path {
            "" | "/" | "/me" => Route::MyView,
            "/login" => Route::Login,
            "/group" => Route::GroupView,
            "/dashboard" => Route::Dashboard,
            "/me/add" => Route::AddExpense,
            "/view" => Route::ViewExpenses,
            "/categories" => Route::Categories,
            "/budget" => Route::Budget,
            "/analysis" => Route::Analysis,
            "/audit" => Route::Audit,
            "/admin/users" => Route::AdminUsers,
            "/admin/groups" => Route::AdminGroups,
            other => {
                let id = other.strip_prefix("/me/edit/")?;
                if id.is_empty() || id.contains('/') {
                    return None;
                }
                Route::EditExpense(id.to_string())
            }
        };
        Some(route)
    }

    pub fn title(&self) -> &'static str {
        match self {
            Route::Login => "Sign in",
            Route::MyView => "My View",
            Route::GroupView => "Group View",
            Route::Dashboard => "Dashboard",
            Route::AddExpense => "Add Expense",
            Route::EditExpense(_) => "Edit Expense",
            Route::ViewExpenses => "View Expenses",
            Route::Categories => "Categories",
            Route::Budget => "Budget",
            Route::Analysis => "Analysis",
            Route::Audit => "Audit Logs",
            Route::AdminUsers => "User Management",
            Route::AdminGroups => "Group Management",
        }
    }

    /// Expense entry pages always run in My mode
    pub fn forced_mode(&self) -> Option<ViewMode> {
        match self {
            Route::AddExpense | Route::EditExpense(_) => Some(ViewMode::My),
            _ => None,
        }
    }

    pub fn is_admin_only(&self) -> bool {
        matches!(self, Route::AdminUsers | Route::AdminGroups)
    }

    /// Where a viewer actually lands when asking for this route
    pub fn guarded(self, viewer: &Viewer) -> Route {
        if self.is_admin_only() && !viewer.is_superadmin {
            Route::Dashboard
        } else {
            self
        }
    }
}

/// Group mode when the entry path is under /group
pub fn initial_mode(path: &str) -> ViewMode {
    if path.starts_with("/group") {
        ViewMode::Group
    } else {
        ViewMode::My
    }
}

/// Switching keeps Dashboard and View Expenses in place and sends every
/// other page to the matching landing page.
pub fn switch_mode(current: ViewMode, next: ViewMode, route: &Route) -> (ViewMode, Route) {
    if current == next {
        return (current, route.clone());
    }
    let path = route.path();
    if path.starts_with("/dashboard") || path.starts_with("/view") {
        return (next, route.clone());
    }
    let landing = match next {
        ViewMode::My => Route::MyView,
        ViewMode::Group => Route::GroupView,
    };
    (next, landing)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuItem {
    pub label: &'static str,
    pub route: Route,
}

pub fn menu(mode: ViewMode, is_superadmin: bool) -> Vec<MenuItem> {
    let mut routes = vec![Route::Dashboard];
    if mode == ViewMode::My {
        routes.push(Route::AddExpense);
    }
    routes.extend([
        Route::ViewExpenses,
        Route::Categories,
        Route::Budget,
        Route::Analysis,
        Route::Audit,
    ]);
    if is_superadmin {
        routes.extend([Route::AdminUsers, Route::AdminGroups]);
    }
    routes
        .into_iter()
        .map(|route| MenuItem {
            label: route.title(),
            route,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::FakeBackend;

    fn profile_row(user_id: &str, admin: bool) -> serde_json::Value {
        json!({
            "user_id": user_id,
            "username": "ania",
            "full_name": "Anna Nowak",
            "is_active": true,
            "is_superadmin": admin
        })
    }

    #[test]
    fn test_no_session_requires_login() {
        let backend = FakeBackend::new().with_rpc(GATE_RPC, json!(true));
        let err = check_access(&backend).unwrap_err();
        assert!(err.requires_login());
    }

    #[test]
    fn test_gate_blocks_inactive_users() {
        let backend = FakeBackend::new()
            .signed_in_as("u-1", "a@example.com")
            .with_table(PROFILE_TABLE, vec![profile_row("u-1", false)])
            .with_rpc(GATE_RPC, json!(false));

        let shell = check_access(&backend).unwrap();
        assert!(!shell.allowed);
        assert_eq!(shell.denial(), Some(ACCESS_DENIED));
        assert_eq!(shell.viewer.display_name, "Anna Nowak");
    }

    #[test]
    fn test_display_name_falls_back_to_email_without_profile() {
        let backend = FakeBackend::new()
            .signed_in_as("u-1", "a@example.com")
            .with_rpc(GATE_RPC, json!(true));
        let shell = check_access(&backend).unwrap();
        assert!(shell.allowed);
        assert_eq!(shell.viewer.display_name, "a@example.com");
        assert!(!shell.viewer.is_superadmin);
    }

    #[test]
    fn test_sign_in_runs_gate() {
        let backend = FakeBackend::new()
            .with_account("a@example.com", "pw", "u-1")
            .with_rpc(GATE_RPC, json!(false));
        let err = sign_in(&backend, "a@example.com", "pw").unwrap_err();
        assert_eq!(err.to_string(), SIGN_IN_DENIED);
        assert!(backend.session().is_none());
        assert_eq!(backend.calls_of("sign_out").len(), 1);

        let wrong = sign_in(&backend, "a@example.com", "nope").unwrap_err();
        assert_eq!(wrong.to_string(), "Invalid login credentials");

        let ok = FakeBackend::new()
            .with_account("a@example.com", "pw", "u-1")
            .with_rpc(GATE_RPC, json!(true));
        assert_eq!(sign_in(&ok, "a@example.com", "pw").unwrap(), Route::MyView);
        assert_eq!(sign_out(&ok).unwrap(), Route::Login);
        assert!(ok.session().is_none());
    }

    #[test]
    fn test_refused_sign_in_survives_failed_sign_out() {
        let backend = FakeBackend::new()
            .with_account("a@example.com", "pw", "u-1")
            .with_rpc(GATE_RPC, json!(false));
        // rpc calls leave the queued failure for sign-out
        backend.fail_next("logout unavailable");
        let err = sign_in(&backend, "a@example.com", "pw").unwrap_err();
        assert_eq!(err.to_string(), SIGN_IN_DENIED);
        assert!(backend.session().is_none());
    }

    #[test]
    fn test_route_paths_round_trip() {
        for route in [
            Route::Login,
            Route::MyView,
            Route::GroupView,
            Route::Dashboard,
            Route::AddExpense,
            Route::EditExpense("e-1".to_string()),
            Route::ViewExpenses,
            Route::AdminGroups,
        ] {
            assert_eq!(Route::parse(&route.path()), Some(route));
        }
        assert_eq!(Route::parse("/me/edit/"), None);
        assert_eq!(Route::parse("/nowhere"), None);
    }

    #[test]
    fn test_initial_mode_and_switching() {
        assert_eq!(initial_mode("/group"), ViewMode::Group);
        assert_eq!(initial_mode("/dashboard"), ViewMode::My);

        let (mode, route) = switch_mode(ViewMode::My, ViewMode::Group, &Route::Dashboard);
        assert_eq!((mode, route), (ViewMode::Group, Route::Dashboard));

        let (_, route) = switch_mode(ViewMode::My, ViewMode::Group, &Route::ViewExpenses);
        assert_eq!(route, Route::ViewExpenses);

        let (_, route) = switch_mode(ViewMode::My, ViewMode::Group, &Route::Budget);
        assert_eq!(route, Route::GroupView);

        let (_, route) = switch_mode(ViewMode::Group, ViewMode::My, &Route::Analysis);
        assert_eq!(route, Route::MyView);

        let (mode, route) = switch_mode(ViewMode::My, ViewMode::My, &Route::Budget);
        assert_eq!((mode, route), (ViewMode::My, Route::Budget));
    }

    #[test]
    fn test_menu_by_mode_and_role() {
        let labels = |items: Vec<MenuItem>| items.into_iter().map(|i| i.label).collect::<Vec<_>>();

        let my = labels(menu(ViewMode::My, false));
        assert_eq!(
            my,
            vec!["Dashboard", "Add Expense", "View Expenses", "Categories", "Budget", "Analysis", "Audit Logs"]
        );

        let group = labels(menu(ViewMode::Group, false));
        assert!(!group.contains(&"Add Expense"));

        let admin = labels(menu(ViewMode::Group, true));
        assert!(admin.ends_with(&["User Management", "Group Management"]));
    }

    #[test]
    fn test_admin_routes_redirect_non_admins() {
        let user = AuthUser {
            id: "u-1".to_string(),
            email: None,
        };
        let viewer = Viewer::from_parts(user.clone(), None);
        assert_eq!(Route::AdminUsers.guarded(&viewer), Route::Dashboard);
        assert_eq!(Route::Budget.guarded(&viewer), Route::Budget);
        assert!(viewer.require_superadmin().is_err());

        let admin: Profile = serde_json::from_value(profile_row("u-1", true)).unwrap();
        let viewer = Viewer::from_parts(user, Some(&admin));
        assert_eq!(Route::AdminUsers.guarded(&viewer), Route::AdminUsers);
    }
}
