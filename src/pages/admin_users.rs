// 🛡️ User Management (superadmin only)
//
// Profiles are edited in place; account creation, password resets and
// deletion go through privileged serverless functions.

use super::settle;
use crate::access::Viewer;
use crate::backend::{fetch, Backend, Query};
use crate::entities::group::GROUP_TABLE;
use crate::entities::profile::PROFILE_TABLE;
use crate::entities::{Group, GroupMember, Profile};
use crate::error::{BackendError, BackendResult, Notice};
use crate::groups::{all_memberships, join_names, pairs_for_user, resolve_names, MembershipDiff};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeSet;

pub const PROVISION_FN: &str = "provision_user";
pub const RESET_PASSWORD_FN: &str = "admin_reset_password";
pub const DELETE_USER_FN: &str = "admin_delete_user";

pub const USER_CREATED: &str = "User created.";
pub const PROVISION_FAILED: &str = "Provision failed (check function + env vars).";
pub const PASSWORD_RESET: &str = "Password reset.";
pub const RESET_FAILED: &str = "Reset failed";
pub const USER_DELETED: &str = "User deleted.";
pub const DELETE_FAILED: &str = "Delete failed";
pub const CANNOT_DELETE_SUPERADMIN: &str = "Cannot delete superadmin";
pub const CANNOT_DELETE_SELF: &str = "Cannot delete yourself";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileField {
    Username,
    FullName,
    Email,
}

/// Body of the `provision_user` function
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub full_name: String,
    pub password: String,
    pub group_ids: BTreeSet<String>,
}

/// Keep the backend message; an empty one becomes `fallback`
fn message_or(err: BackendError, fallback: &str) -> BackendError {
    match err {
        BackendError::Api { status, message } if message.trim().is_empty() => {
            BackendError::api(status, fallback)
        }
        other => other,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdminUsersPage {
    pub viewer: Viewer,
    pub profiles: Vec<Profile>,
    pub groups: Vec<Group>,
    pub memberships: Vec<GroupMember>,
    pub new_user: NewUser,
    pub notice: Option<Notice>,
}

impl AdminUsersPage {
    /// Fails with Forbidden for anyone but a superadmin
    pub fn load(backend: &dyn Backend) -> BackendResult<Self> {
        let viewer = Viewer::load(backend)?;
        viewer.require_superadmin()?;
        let mut page = Self {
            viewer,
            profiles: Vec::new(),
            groups: Vec::new(),
            memberships: Vec::new(),
            new_user: NewUser::default(),
            notice: None,
        };
        page.reload(backend)?;
        Ok(page)
    }

    pub fn reload(&mut self, backend: &dyn Backend) -> BackendResult<()> {
        self.profiles = fetch(
            backend,
            PROFILE_TABLE,
            &Query::new()
                .select("user_id, username, full_name, email, is_active, is_superadmin")
                .order("created_at", true),
        )?;
        self.groups = fetch(
            backend,
            GROUP_TABLE,
            &Query::new().select("id,name").order("name", true),
        )?;
        self.memberships = all_memberships(backend)?;
        Ok(())
    }

    pub fn groups_of(&self, user_id: &str) -> BTreeSet<String> {
        self.memberships
            .iter()
            .filter(|m| m.user_id == user_id)
            .map(|m| m.group_id.clone())
            .collect()
    }

    fn group_options(&self) -> Vec<(String, String)> {
        self.groups.iter().map(|g| (g.id.clone(), g.name.clone())).collect()
    }

    /// Group names of the user, comma-separated
    pub fn group_names_of(&self, user_id: &str) -> String {
        join_names(&self.groups_of(user_id), &self.group_options())
    }

    /// Memberships for the user from a comma-separated list of group names
    pub fn set_groups_named(&mut self, backend: &dyn Backend, user_id: &str, names: &str) -> BackendResult<()> {
        let resolved = resolve_names(names, &self.group_options());
        let selected = settle(&mut self.notice, "set user groups", resolved)?;
        self.set_groups_for_user(backend, user_id, &selected)
    }

    /// Groups the next provisioned user joins
    pub fn set_new_user_groups(&mut self, names: &str) -> BackendResult<()> {
        let resolved = resolve_names(names, &self.group_options());
        let selected = settle(&mut self.notice, "pick new user groups", resolved)?;
        self.new_user.group_ids = selected;
        Ok(())
    }

    /// Typing into a profile cell; nothing is written until save
    pub fn edit_local(&mut self, user_id: &str, field: ProfileField, value: &str) {
        if let Some(profile) = self.profiles.iter_mut().find(|p| p.user_id == user_id) {
            let slot = match field {
                ProfileField::Username => &mut profile.username,
                ProfileField::FullName => &mut profile.full_name,
                ProfileField::Email => &mut profile.email,
            };
            *slot = Some(value.to_string());
        }
    }

    pub fn save_profile(&mut self, backend: &dyn Backend, user_id: &str) -> BackendResult<()> {
        let result = self.try_save_profile(backend, user_id);
        settle(&mut self.notice, "save profile", result)
    }

    fn try_save_profile(&mut self, backend: &dyn Backend, user_id: &str) -> BackendResult<()> {
        let profile = self
            .profiles
            .iter()
            .find(|p| p.user_id == user_id)
            .ok_or_else(|| BackendError::NotFound(format!("profile {}", user_id)))?;
        backend.update(
            PROFILE_TABLE,
            json!({
                "username": profile.username,
                "full_name": profile.full_name,
                "email": profile.email,
            }),
            &Query::new().eq("user_id", user_id),
        )?;
        tracing::info!(user = %user_id, "saved profile");
        self.reload(backend)
    }

    pub fn toggle_active(&mut self, backend: &dyn Backend, user_id: &str) -> BackendResult<()> {
        let result = self.try_toggle_active(backend, user_id);
        settle(&mut self.notice, "toggle user", result)
    }

    fn try_toggle_active(&mut self, backend: &dyn Backend, user_id: &str) -> BackendResult<()> {
        let current = self
            .profiles
            .iter()
            .find(|p| p.user_id == user_id)
            .map(|p| p.is_active)
            .ok_or_else(|| BackendError::NotFound(format!("profile {}", user_id)))?;
        backend.update(
            PROFILE_TABLE,
            json!({ "is_active": !current }),
            &Query::new().eq("user_id", user_id),
        )?;
        tracing::info!(user = %user_id, active = !current, "toggled user");
        self.reload(backend)
    }

    /// Make the user's memberships exactly `selected`
    pub fn set_groups_for_user(
        &mut self,
        backend: &dyn Backend,
        user_id: &str,
        selected: &BTreeSet<String>,
    ) -> BackendResult<()> {
        let current = pairs_for_user(user_id, &self.groups_of(user_id));
        let next = pairs_for_user(user_id, selected);
        let diff = MembershipDiff::between(&current, &next);
        let result = diff.apply(backend).and_then(|_| self.reload(backend));
        settle(&mut self.notice, "set user groups", result)
    }

    pub fn create_user(&mut self, backend: &dyn Backend) -> BackendResult<()> {
        let result = serde_json::to_value(&self.new_user)
            .map_err(BackendError::from)
            .and_then(|body| backend.invoke(PROVISION_FN, body))
            .map_err(|err| message_or(err, PROVISION_FAILED));
        settle(&mut self.notice, "provision user", result)?;

        tracing::info!(email = %self.new_user.email, "provisioned user");
        self.notice = Some(Notice::info(USER_CREATED));
        self.new_user = NewUser::default();
        let reload = self.reload(backend);
        settle(&mut self.notice, "reload users", reload)
    }

    /// An empty password does nothing
    pub fn reset_password(&mut self, backend: &dyn Backend, user_id: &str, password: &str) -> BackendResult<()> {
        if password.is_empty() {
            return Ok(());
        }
        let result = backend
            .invoke(RESET_PASSWORD_FN, json!({ "user_id": user_id, "password": password }))
            .map_err(|err| message_or(err, RESET_FAILED));
        settle(&mut self.notice, "reset password", result)?;
        tracing::info!(user = %user_id, "reset password");
        self.notice = Some(Notice::info(PASSWORD_RESET));
        Ok(())
    }

    pub fn delete_user(&mut self, backend: &dyn Backend, user_id: &str) -> BackendResult<()> {
        let is_superadmin = self
            .profiles
            .iter()
            .any(|p| p.user_id == user_id && p.is_superadmin);
        let result = if is_superadmin {
            Err(BackendError::forbidden(CANNOT_DELETE_SUPERADMIN))
        } else if user_id == self.viewer.id() {
            Err(BackendError::forbidden(CANNOT_DELETE_SELF))
        } else {
            backend
                .invoke(DELETE_USER_FN, json!({ "user_id": user_id }))
                .map(|_| ())
                .map_err(|err| message_or(err, DELETE_FAILED))
        };
        settle(&mut self.notice, "delete user", result)?;

        tracing::info!(user = %user_id, "deleted user");
        self.notice = Some(Notice::info(USER_DELETED));
        let reload = self.reload(backend);
        settle(&mut self.notice, "reload users", reload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::FakeBackend;
    use crate::entities::group::GROUP_MEMBER_TABLE;

    fn backend(admin: bool) -> FakeBackend {
        FakeBackend::new()
            .signed_in_as("u-1", "root@example.com")
            .with_table(
                PROFILE_TABLE,
                vec![
                    json!({ "user_id": "u-1", "username": "root", "is_superadmin": admin,
                            "created_at": "2025-01-01T00:00:00Z" }),
                    json!({ "user_id": "u-2", "username": "ania", "is_active": true,
                            "created_at": "2025-01-02T00:00:00Z" }),
                    json!({ "user_id": "u-3", "username": "boss", "is_superadmin": true,
                            "created_at": "2025-01-03T00:00:00Z" }),
                ],
            )
            .with_table(
                GROUP_TABLE,
                vec![json!({ "id": "g-1", "name": "Home" }), json!({ "id": "g-2", "name": "Trip" })],
            )
            .with_table(GROUP_MEMBER_TABLE, vec![json!({ "group_id": "g-1", "user_id": "u-2" })])
    }

    #[test]
    fn test_non_admin_is_refused() {
        let err = AdminUsersPage::load(&backend(false)).unwrap_err();
        assert!(matches!(err, BackendError::Forbidden(_)));
    }

    #[test]
    fn test_edit_then_save_profile() {
        let backend = backend(true);
        let mut page = AdminUsersPage::load(&backend).unwrap();
        assert_eq!(page.profiles.len(), 3);
        page.edit_local("u-2", ProfileField::FullName, "Anna Nowak");
        page.save_profile(&backend, "u-2").unwrap();

        let update = &backend.calls_of("update")[0];
        assert_eq!(update.payload["full_name"], "Anna Nowak");
        assert_eq!(update.payload["username"], "ania");
        assert_eq!(page.profiles[1].label(), "Anna Nowak");
    }

    #[test]
    fn test_toggle_active_flips_flag() {
        let backend = backend(true);
        let mut page = AdminUsersPage::load(&backend).unwrap();
        page.toggle_active(&backend, "u-2").unwrap();
        assert!(!page.profiles[1].is_active);
    }

    #[test]
    fn test_group_checkboxes_apply_diff() {
        let backend = backend(true);
        let mut page = AdminUsersPage::load(&backend).unwrap();
        let selected: BTreeSet<String> = ["g-2".to_string()].into_iter().collect();
        page.set_groups_for_user(&backend, "u-2", &selected).unwrap();

        assert_eq!(page.groups_of("u-2"), selected);
        assert_eq!(backend.calls_of("insert").len(), 1);
        assert_eq!(backend.calls_of("delete").len(), 1);
    }

    #[test]
    fn test_groups_by_name() {
        let backend = backend(true);
        let mut page = AdminUsersPage::load(&backend).unwrap();
        assert_eq!(page.group_names_of("u-2"), "Home");

        page.set_groups_named(&backend, "u-2", "home, TRIP").unwrap();
        assert_eq!(page.group_names_of("u-2"), "Home, Trip");

        let err = page.set_groups_named(&backend, "u-2", "Boat").unwrap_err();
        assert_eq!(err.to_string(), "Unknown name: Boat");
        assert_eq!(page.notice.as_ref().map(|n| n.text()), Some("Unknown name: Boat"));
        assert_eq!(page.group_names_of("u-2"), "Home, Trip");

        page.set_new_user_groups("trip").unwrap();
        assert_eq!(page.new_user.group_ids, ["g-2".to_string()].into_iter().collect::<BTreeSet<_>>());
    }

    #[test]
    fn test_create_user_messages() {
        let backend = backend(true);
        let mut page = AdminUsersPage::load(&backend).unwrap();
        page.new_user.email = "new@example.com".to_string();
        page.new_user.group_ids.insert("g-1".to_string());
        page.create_user(&backend).unwrap();
        assert_eq!(page.notice, Some(Notice::info(USER_CREATED)));
        assert_eq!(page.new_user, NewUser::default());
        let invoke = &backend.calls_of("invoke")[0];
        assert_eq!(invoke.target, PROVISION_FN);
        assert_eq!(invoke.payload["group_ids"], json!(["g-1"]));

        backend.fail_next("");
        assert!(page.create_user(&backend).is_err());
        assert_eq!(page.notice, Some(Notice::Error(PROVISION_FAILED.to_string())));

        backend.fail_next("email already registered");
        assert!(page.create_user(&backend).is_err());
        assert_eq!(page.notice.as_ref().map(Notice::text), Some("email already registered"));
    }

    #[test]
    fn test_reset_password() {
        let backend = backend(true);
        let mut page = AdminUsersPage::load(&backend).unwrap();
        page.reset_password(&backend, "u-2", "").unwrap();
        assert!(backend.calls_of("invoke").is_empty());

        page.reset_password(&backend, "u-2", "s3cret!").unwrap();
        assert_eq!(page.notice, Some(Notice::info(PASSWORD_RESET)));
    }

    #[test]
    fn test_delete_guards() {
        let backend = backend(true);
        let mut page = AdminUsersPage::load(&backend).unwrap();

        assert!(page.delete_user(&backend, "u-3").is_err());
        assert_eq!(page.notice.as_ref().map(Notice::text), Some(CANNOT_DELETE_SUPERADMIN));

        // the viewer's own row is a superadmin; clear it to reach the self check
        page.profiles[0].is_superadmin = false;
        assert!(page.delete_user(&backend, "u-1").is_err());
        assert_eq!(page.notice.as_ref().map(Notice::text), Some(CANNOT_DELETE_SELF));
        assert!(backend.calls_of("invoke").is_empty());

        page.delete_user(&backend, "u-2").unwrap();
        assert_eq!(page.notice, Some(Notice::info(USER_DELETED)));
    }
}
