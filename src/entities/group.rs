// Group - users sharing aggregated expense views and budgets

use serde::{Deserialize, Serialize};

pub const GROUP_TABLE: &str = "group";
pub const GROUP_MEMBER_TABLE: &str = "group_member";

/// The superadmin group can be neither renamed nor deleted
pub const PROTECTED_GROUP: &str = "superadmingroup";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
}

impl Group {
    pub fn is_protected(&self) -> bool {
        self.name == PROTECTED_GROUP
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupMember {
    pub group_id: String,
    pub user_id: String,
}
