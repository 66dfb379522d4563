// Budget - target spend per scope (one category or all) and frequency
//
// Personal budgets live in `user_budget`, group budgets in `group_budget`;
// both share the same shape apart from the owner column.

use super::{de, CategoryRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const USER_BUDGET_TABLE: &str = "user_budget";
pub const GROUP_BUDGET_TABLE: &str = "group_budget";
pub const ALL_CATEGORIES_LABEL: &str = "All categories";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Weekly,
    #[default]
    Monthly,
    Yearly,
}

impl Frequency {
    pub const ALL: [Frequency; 3] = [Frequency::Weekly, Frequency::Monthly, Frequency::Yearly];

    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Yearly => "yearly",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Frequency::Weekly => "Weekly",
            Frequency::Monthly => "Monthly",
            Frequency::Yearly => "Yearly",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Frequency::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s.trim()))
    }

    pub fn next(&self) -> Self {
        match self {
            Frequency::Weekly => Frequency::Monthly,
            Frequency::Monthly => Frequency::Yearly,
            Frequency::Yearly => Frequency::Weekly,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BudgetScope {
    #[default]
    Category,
    All,
}

impl BudgetScope {
    pub fn is_all(&self) -> bool {
        matches!(self, BudgetScope::All)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub id: String,

    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default)]
    pub group_id: Option<String>,

    #[serde(default)]
    pub all_categories: bool,

    #[serde(default)]
    pub category_id: Option<String>,

    #[serde(default)]
    pub frequency: Frequency,

    #[serde(default, deserialize_with = "de::number")]
    pub amount: f64,

    #[serde(default)]
    pub currency: String,

    #[serde(default)]
    pub note: Option<String>,

    #[serde(default, deserialize_with = "de::opt_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub category: Option<CategoryRef>,
}

impl Budget {
    pub fn scope(&self) -> BudgetScope {
        if self.all_categories {
            BudgetScope::All
        } else {
            BudgetScope::Category
        }
    }

    /// Name shown in the list and matched by search
    pub fn scope_label(&self) -> &str {
        if self.all_categories {
            ALL_CATEGORIES_LABEL
        } else {
            self.category
                .as_ref()
                .and_then(|c| c.name.as_deref())
                .unwrap_or("")
        }
    }

    /// Same (frequency, scope, category) combination
    pub fn same_combo(&self, frequency: Frequency, all_categories: bool, category_id: Option<&str>) -> bool {
        self.frequency == frequency
            && self.all_categories == all_categories
            && self.category_id.as_deref() == category_id
    }
}

/// Who a budget belongs to, which picks the table and owner column
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BudgetOwner {
    User(String),
    Group(String),
}

impl BudgetOwner {
    pub fn table(&self) -> &'static str {
        match self {
            BudgetOwner::User(_) => USER_BUDGET_TABLE,
            BudgetOwner::Group(_) => GROUP_BUDGET_TABLE,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            BudgetOwner::User(_) => "user_id",
            BudgetOwner::Group(_) => "group_id",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            BudgetOwner::User(id) | BudgetOwner::Group(id) => id,
        }
    }
}

/// Write payload; the owner column is added on insert only
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetPayload {
    pub all_categories: bool,
    pub category_id: Option<String>,
    pub frequency: Frequency,
    pub amount: f64,
    pub currency: String,
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl BudgetPayload {
    pub fn to_insert(&self, owner: &BudgetOwner) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let serde_json::Value::Object(map) = &mut value {
            map.insert(
                owner.column().to_string(),
                serde_json::Value::String(owner.id().to_string()),
            );
        }
        value
    }
}
