// 👥 Groups - visible groups, the active-group choice, membership edits
//
// The active group is remembered in Preferences so every group-mode page
// opens on the same group.

use crate::backend::{fetch, fetch_optional, Backend, Query};
use crate::config::Preferences;
use crate::entities::group::{Group, GroupMember, GROUP_MEMBER_TABLE, GROUP_TABLE};
use crate::error::{BackendError, BackendResult};
use std::collections::BTreeSet;

/// Groups the user belongs to, ordered by name
pub fn member_groups(backend: &dyn Backend, user_id: &str) -> BackendResult<Vec<Group>> {
    let memberships: Vec<GroupMember> = fetch(
        backend,
        GROUP_MEMBER_TABLE,
        &Query::new().select("group_id,user_id").eq("user_id", user_id),
    )?;
    if memberships.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<&str> = memberships.iter().map(|m| m.group_id.as_str()).collect();
    fetch(
        backend,
        GROUP_TABLE,
        &Query::new()
            .select("id,name")
            .in_list("id", ids)
            .order("name", true),
    )
}

/// Every group for a superadmin, the user's own groups for anyone else
pub fn visible_groups(
    backend: &dyn Backend,
    user_id: &str,
    is_superadmin: bool,
) -> BackendResult<Vec<Group>> {
    if is_superadmin {
        fetch(
            backend,
            GROUP_TABLE,
            &Query::new().select("id,name").order("name", true),
        )
    } else {
        member_groups(backend, user_id)
    }
}

/// All readable groups sorted by name, ignoring case
pub fn all_groups_sorted(backend: &dyn Backend) -> BackendResult<Vec<Group>> {
    let mut groups: Vec<Group> = fetch(backend, GROUP_TABLE, &Query::new().select("id,name"))?;
    groups.sort_by_cached_key(|g| g.name.to_lowercase());
    Ok(groups)
}

/// Stored group when it is still visible, otherwise the first one (which
/// then becomes the stored choice). Returns true when prefs changed.
pub fn pick_active(groups: &[Group], prefs: &mut Preferences) -> (Option<Group>, bool) {
    if let Some(stored) = &prefs.active_group {
        if let Some(listed) = groups.iter().find(|g| g.id == stored.id) {
            let name = if stored.name.is_empty() {
                listed.name.clone()
            } else {
                stored.name.clone()
            };
            return (
                Some(Group {
                    id: stored.id.clone(),
                    name,
                }),
                false,
            );
        }
    }
    match groups.first() {
        Some(first) => {
            prefs.remember_group(first);
            (Some(first.clone()), true)
        }
        None => (None, false),
    }
}

/// Explicit pick from a group selector
pub fn choose(groups: &[Group], id: &str, prefs: &mut Preferences) -> Option<Group> {
    let group = groups.iter().find(|g| g.id == id)?.clone();
    prefs.remember_group(&group);
    Some(group)
}

pub fn is_member(backend: &dyn Backend, group_id: &str, user_id: &str) -> BackendResult<bool> {
    let row: Option<GroupMember> = fetch_optional(
        backend,
        GROUP_MEMBER_TABLE,
        Query::new()
            .select("group_id,user_id")
            .eq("group_id", group_id)
            .eq("user_id", user_id),
    )?;
    Ok(row.is_some())
}

/// Superadmins count as members for editing
pub fn can_edit(
    backend: &dyn Backend,
    group_id: &str,
    user_id: &str,
    is_superadmin: bool,
) -> BackendResult<bool> {
    if is_superadmin {
        return Ok(true);
    }
    is_member(backend, group_id, user_id)
}

pub fn all_memberships(backend: &dyn Backend) -> BackendResult<Vec<GroupMember>> {
    fetch(
        backend,
        GROUP_MEMBER_TABLE,
        &Query::new().select("group_id,user_id"),
    )
}

// ============================================================================
// MEMBERSHIP DIFF
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipDiff {
    pub to_add: Vec<GroupMember>,
    pub to_remove: Vec<GroupMember>,
}

impl MembershipDiff {
    /// Pairs to insert and delete so `current` becomes `next`
    pub fn between(current: &BTreeSet<GroupMember>, next: &BTreeSet<GroupMember>) -> Self {
        Self {
            to_add: next.difference(current).cloned().collect(),
            to_remove: current.difference(next).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    /// One bulk insert, then one delete per removed pair
    pub fn apply(&self, backend: &dyn Backend) -> BackendResult<()> {
        if !self.to_add.is_empty() {
            backend.insert(GROUP_MEMBER_TABLE, serde_json::to_value(&self.to_add)?)?;
        }
        for pair in &self.to_remove {
            backend.delete(
                GROUP_MEMBER_TABLE,
                &Query::new()
                    .eq("group_id", &pair.group_id)
                    .eq("user_id", &pair.user_id),
            )?;
        }
        tracing::info!(
            added = self.to_add.len(),
            removed = self.to_remove.len(),
            "updated group memberships"
        );
        Ok(())
    }
}

pub fn pairs_for_user<'a, I>(user_id: &str, group_ids: I) -> BTreeSet<GroupMember>
where
    I: IntoIterator<Item = &'a String>,
{
    group_ids
        .into_iter()
        .map(|group_id| GroupMember {
            group_id: group_id.clone(),
            user_id: user_id.to_string(),
        })
        .collect()
}

pub fn pairs_for_group<'a, I>(group_id: &str, user_ids: I) -> BTreeSet<GroupMember>
where
    I: IntoIterator<Item = &'a String>,
{
    user_ids
        .into_iter()
        .map(|user_id| GroupMember {
            group_id: group_id.to_string(),
            user_id: user_id.clone(),
        })
        .collect()
}

/// Ids for a comma-separated list of names, matched ignoring case. A blank
/// list selects nothing; an unmatched name fails the whole list.
pub fn resolve_names(input: &str, options: &[(String, String)]) -> BackendResult<BTreeSet<String>> {
    input
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| {
            let wanted = name.to_lowercase();
            options
                .iter()
                .find(|(_, label)| label.to_lowercase() == wanted)
                .map(|(id, _)| id.clone())
                .ok_or_else(|| BackendError::validation(format!("Unknown name: {}", name)))
        })
        .collect()
}

/// Names for `ids`, in option order, joined the way `resolve_names` reads them
pub fn join_names(ids: &BTreeSet<String>, options: &[(String, String)]) -> String {
    options
        .iter()
        .filter(|(id, _)| ids.contains(id))
        .map(|(_, label)| label.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::FakeBackend;
    use serde_json::json;

    fn group(id: &str, name: &str) -> Group {
        Group {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    fn backend() -> FakeBackend {
        FakeBackend::new()
            .with_table(
                GROUP_TABLE,
                vec![
                    json!({ "id": "g-1", "name": "flat" }),
                    json!({ "id": "g-2", "name": "Family" }),
                    json!({ "id": "g-3", "name": "superadmingroup" }),
                ],
            )
            .with_table(
                GROUP_MEMBER_TABLE,
                vec![
                    json!({ "group_id": "g-1", "user_id": "u-1" }),
                    json!({ "group_id": "g-2", "user_id": "u-1" }),
                    json!({ "group_id": "g-2", "user_id": "u-2" }),
                ],
            )
    }

    #[test]
    fn test_resolve_names_ignores_case_and_blanks() {
        let options = vec![
            ("g-1".to_string(), "Flat".to_string()),
            ("g-2".to_string(), "Żagle".to_string()),
        ];
        let ids = resolve_names(" flat , ŻAGLE,, ", &options).unwrap();
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec!["g-1", "g-2"]);
        assert!(resolve_names("  ", &options).unwrap().is_empty());

        let err = resolve_names("flat, boat", &options).unwrap_err();
        assert_eq!(err.to_string(), "Unknown name: boat");

        let ids: BTreeSet<String> = ["g-2".to_string()].into_iter().collect();
        assert_eq!(join_names(&ids, &options), "Żagle");
    }

    #[test]
    fn test_visible_groups_member_vs_admin() {
        let backend = backend();
        let mine = visible_groups(&backend, "u-2", false).unwrap();
        assert_eq!(mine, vec![group("g-2", "Family")]);

        let all = visible_groups(&backend, "u-2", true).unwrap();
        assert_eq!(all.len(), 3);

        assert!(visible_groups(&backend, "nobody", false).unwrap().is_empty());
    }

    #[test]
    fn test_all_groups_sorted_ignores_case() {
        let names: Vec<String> = all_groups_sorted(&backend())
            .unwrap()
            .into_iter()
            .map(|g| g.name)
            .collect();
        assert_eq!(names, vec!["Family", "flat", "superadmingroup"]);
    }

    #[test]
    fn test_pick_active_prefers_stored_group() {
        let groups = vec![group("g-1", "flat"), group("g-2", "Family")];
        let mut prefs = Preferences::default();
        prefs.remember_group(&group("g-2", "Family (old name)"));

        let (active, changed) = pick_active(&groups, &mut prefs);
        assert_eq!(active, Some(group("g-2", "Family (old name)")));
        assert!(!changed);
    }

    #[test]
    fn test_pick_active_falls_back_to_first_and_persists() {
        let groups = vec![group("g-1", "flat"), group("g-2", "Family")];
        let mut prefs = Preferences::default();
        prefs.remember_group(&group("gone", "Deleted"));

        let (active, changed) = pick_active(&groups, &mut prefs);
        assert_eq!(active, Some(group("g-1", "flat")));
        assert!(changed);
        assert_eq!(prefs.active_group, Some(group("g-1", "flat")));

        let mut empty = Preferences::default();
        assert_eq!(pick_active(&[], &mut empty), (None, false));
    }

    #[test]
    fn test_stored_group_without_name_uses_list_name() {
        let groups = vec![group("g-1", "flat")];
        let mut prefs = Preferences::default();
        prefs.remember_group(&group("g-1", ""));
        assert_eq!(pick_active(&groups, &mut prefs).0, Some(group("g-1", "flat")));
    }

    #[test]
    fn test_choose_remembers_pick() {
        let groups = vec![group("g-1", "flat"), group("g-2", "Family")];
        let mut prefs = Preferences::default();
        assert_eq!(choose(&groups, "g-2", &mut prefs), Some(group("g-2", "Family")));
        assert_eq!(prefs.active_group, Some(group("g-2", "Family")));
        assert_eq!(choose(&groups, "zzz", &mut prefs), None);
    }

    #[test]
    fn test_membership_checks() {
        let backend = backend();
        assert!(is_member(&backend, "g-1", "u-1").unwrap());
        assert!(!is_member(&backend, "g-1", "u-2").unwrap());
        assert!(can_edit(&backend, "g-1", "u-2", true).unwrap());
    }

    #[test]
    fn test_membership_diff_applies_inserts_and_deletes() {
        let backend = backend();
        let current = pairs_for_user("u-1", &["g-1".to_string(), "g-2".to_string()]);
        let next = pairs_for_user("u-1", &["g-2".to_string(), "g-3".to_string()]);

        let diff = MembershipDiff::between(&current, &next);
        assert_eq!(diff.to_add, vec![GroupMember { group_id: "g-3".into(), user_id: "u-1".into() }]);
        assert_eq!(diff.to_remove, vec![GroupMember { group_id: "g-1".into(), user_id: "u-1".into() }]);

        diff.apply(&backend).unwrap();
        let rows = backend.rows(GROUP_MEMBER_TABLE);
        assert_eq!(rows.len(), 3);
        assert!(!rows.contains(&json!({ "group_id": "g-1", "user_id": "u-1" })));
        assert_eq!(backend.calls_of("insert").len(), 1);
        assert_eq!(backend.calls_of("delete").len(), 1);

        assert!(MembershipDiff::between(&next, &next).is_empty());
    }
}
