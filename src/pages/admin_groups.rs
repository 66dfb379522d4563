// 👥 Group Management (superadmin only)
//
// `superadmingroup` is immutable: never renamed, never deleted.

use super::settle;
use crate::access::Viewer;
use crate::backend::{fetch, Backend, Query};
use crate::entities::group::{GROUP_TABLE, PROTECTED_GROUP};
use crate::entities::profile::PROFILE_TABLE;
use crate::entities::{Group, GroupMember, Profile};
use crate::error::{BackendError, BackendResult, Notice};
use crate::groups::{all_memberships, join_names, pairs_for_group, resolve_names, MembershipDiff};
use serde_json::json;
use std::collections::BTreeSet;

pub const IMMUTABLE_GROUP: &str = "Immutable group cannot be deleted.";

#[derive(Debug, Clone, PartialEq)]
pub struct AdminGroupsPage {
    pub groups: Vec<Group>,
    pub profiles: Vec<Profile>,
    pub memberships: Vec<GroupMember>,
    pub new_group_name: String,
    pub notice: Option<Notice>,
}

impl AdminGroupsPage {
    /// Fails with Forbidden for anyone but a superadmin
    pub fn load(backend: &dyn Backend) -> BackendResult<Self> {
        Viewer::load(backend)?.require_superadmin()?;
        let mut page = Self {
            groups: Vec::new(),
            profiles: Vec::new(),
            memberships: Vec::new(),
            new_group_name: String::new(),
            notice: None,
        };
        page.reload(backend)?;
        Ok(page)
    }

    pub fn reload(&mut self, backend: &dyn Backend) -> BackendResult<()> {
        self.groups = fetch(
            backend,
            GROUP_TABLE,
            &Query::new().select("id,name").order("name", true),
        )?;
        self.profiles = fetch(
            backend,
            PROFILE_TABLE,
            &Query::new()
                .select("user_id, full_name, username, email")
                .order("username", true),
        )?;
        self.memberships = all_memberships(backend)?;
        Ok(())
    }

    pub fn members_of(&self, group_id: &str) -> BTreeSet<String> {
        self.memberships
            .iter()
            .filter(|m| m.group_id == group_id)
            .map(|m| m.user_id.clone())
            .collect()
    }

    /// Checkbox labels, full name → username → email
    pub fn member_labels(&self) -> Vec<(String, String)> {
        self.profiles
            .iter()
            .map(|p| (p.user_id.clone(), p.label()))
            .collect()
    }

    /// Member labels of the group, comma-separated
    pub fn member_names_of(&self, group_id: &str) -> String {
        join_names(&self.members_of(group_id), &self.member_labels())
    }

    /// Members from a comma-separated list of labels
    pub fn set_members_named(&mut self, backend: &dyn Backend, group_id: &str, names: &str) -> BackendResult<()> {
        let resolved = resolve_names(names, &self.member_labels());
        let selected = settle(&mut self.notice, "set group members", resolved)?;
        self.set_members(backend, group_id, &selected)
    }

    /// Blank names are ignored
    pub fn create(&mut self, backend: &dyn Backend) -> BackendResult<()> {
        let name = self.new_group_name.trim().to_string();
        if name.is_empty() {
            return Ok(());
        }
        let result = backend
            .insert(GROUP_TABLE, json!({ "name": name }))
            .and_then(|_| {
                tracing::info!(group = %name, "created group");
                self.new_group_name.clear();
                self.reload(backend)
            });
        settle(&mut self.notice, "create group", result)
    }

    /// Only writes when the name changed; the protected group is skipped
    pub fn rename(&mut self, backend: &dyn Backend, id: &str, name: &str) -> BackendResult<()> {
        let Some(group) = self.groups.iter().find(|g| g.id == id) else {
            return Ok(());
        };
        if group.is_protected() || group.name == name {
            return Ok(());
        }
        let result = backend
            .update(GROUP_TABLE, json!({ "name": name }), &Query::new().eq("id", id))
            .and_then(|_| {
                tracing::info!(group = %id, name, "renamed group");
                self.reload(backend)
            });
        settle(&mut self.notice, "rename group", result)
    }

    pub fn delete(&mut self, backend: &dyn Backend, id: &str) -> BackendResult<()> {
        let protected = self
            .groups
            .iter()
            .any(|g| g.id == id && g.name == PROTECTED_GROUP);
        let result = if protected {
            Err(BackendError::forbidden(IMMUTABLE_GROUP))
        } else {
            backend
                .delete(GROUP_TABLE, &Query::new().eq("id", id))
                .and_then(|_| {
                    tracing::info!(group = %id, "deleted group");
                    self.reload(backend)
                })
        };
        settle(&mut self.notice, "delete group", result)
    }

    /// Make the group's members exactly `selected`
    pub fn set_members(
        &mut self,
        backend: &dyn Backend,
        group_id: &str,
        selected: &BTreeSet<String>,
    ) -> BackendResult<()> {
        let current = pairs_for_group(group_id, &self.members_of(group_id));
        let next = pairs_for_group(group_id, selected);
        let diff = MembershipDiff::between(&current, &next);
        let result = diff.apply(backend).and_then(|_| self.reload(backend));
        settle(&mut self.notice, "set group members", result)
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
                    json!({ "user_id": "u-1", "username": "root", "is_superadmin": admin }),
                    json!({ "user_id": "u-2", "full_name": "Anna Nowak", "username": "ania" }),
                    json!({ "user_id": "u-3", "email": "ghost@example.com" }),
                ],
            )
            .with_table(
                GROUP_TABLE,
                vec![
                    json!({ "id": "g-0", "name": PROTECTED_GROUP }),
                    json!({ "id": "g-1", "name": "Home" }),
                ],
            )
            .with_table(
                GROUP_MEMBER_TABLE,
                vec![
                    json!({ "group_id": "g-1", "user_id": "u-1" }),
                    json!({ "group_id": "g-1", "user_id": "u-2" }),
                ],
            )
    }

    #[test]
    fn test_non_admin_is_refused() {
        assert!(matches!(
            AdminGroupsPage::load(&backend(false)),
            Err(BackendError::Forbidden(_))
        ));
    }

    #[test]
    fn test_create_trims_and_skips_blank() {
        let backend = backend(true);
        let mut page = AdminGroupsPage::load(&backend).unwrap();
        page.new_group_name = "   ".to_string();
        page.create(&backend).unwrap();
        assert!(backend.calls_of("insert").is_empty());

        page.new_group_name = "  Trip ".to_string();
        page.create(&backend).unwrap();
        assert!(page.groups.iter().any(|g| g.name == "Trip"));
        assert!(page.new_group_name.is_empty());
    }

    #[test]
    fn test_protected_group_is_immutable() {
        let backend = backend(true);
        let mut page = AdminGroupsPage::load(&backend).unwrap();

        page.rename(&backend, "g-0", "admins").unwrap();
        page.rename(&backend, "g-1", "Home").unwrap();
        assert!(backend.calls_of("update").is_empty());

        let err = page.delete(&backend, "g-0").unwrap_err();
        assert_eq!(err.to_string(), IMMUTABLE_GROUP);
        assert!(backend.calls_of("delete").is_empty());

        page.rename(&backend, "g-1", "House").unwrap();
        assert!(page.groups.iter().any(|g| g.name == "House"));
    }

    #[test]
    fn test_set_members_and_labels() {
        let backend = backend(true);
        let mut page = AdminGroupsPage::load(&backend).unwrap();
        let selected: BTreeSet<String> = ["u-2", "u-3"].iter().map(|s| s.to_string()).collect();
        page.set_members(&backend, "g-1", &selected).unwrap();
        assert_eq!(page.members_of("g-1"), selected);

        let labels: Vec<String> = page.member_labels().into_iter().map(|(_, l)| l).collect();
        assert!(labels.contains(&"Anna Nowak".to_string()));
        assert!(labels.contains(&"ghost@example.com".to_string()));
    }

    #[test]
    fn test_members_by_label() {
        let backend = backend(true);
        let mut page = AdminGroupsPage::load(&backend).unwrap();
        page.set_members_named(&backend, "g-1", "anna nowak, ghost@example.com").unwrap();
        assert_eq!(page.member_names_of("g-1"), "Anna Nowak, ghost@example.com");
        assert_eq!(backend.calls_of("insert").len(), 1);
        assert_eq!(backend.calls_of("delete").len(), 1);

        assert!(page.set_members_named(&backend, "g-1", "nobody").is_err());
        assert_eq!(page.members_of("g-1").len(), 2);
    }
}
