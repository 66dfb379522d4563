// 💸 Expense - one personal spend entry
//
// Owned by `user_id`; the embedded `category` comes from the
// `category:category_id(name,color)` relation in the select list.

use super::{de, CategoryRef, UNCATEGORIZED};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const EXPENSE_TABLE: &str = "expense";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default, deserialize_with = "de::number")]
    pub amount: f64,

    #[serde(default)]
    pub currency: String,

    #[serde(deserialize_with = "de::timestamp")]
    pub spent_at_utc: DateTime<Utc>,

    #[serde(default)]
    pub note: Option<String>,

    #[serde(default)]
    pub category_id: Option<String>,

    #[serde(default)]
    pub category: Option<CategoryRef>,
}

impl Expense {
    pub fn category_name(&self) -> &str {
        self.category
            .as_ref()
            .and_then(|c| c.name.as_deref())
            .filter(|n| !n.is_empty())
            .unwrap_or(UNCATEGORIZED)
    }

    pub fn category_color(&self) -> Option<&str> {
        self.category.as_ref().and_then(|c| c.color.as_deref())
    }

    pub fn note_or_empty(&self) -> &str {
        self.note.as_deref().unwrap_or("")
    }
}

/// Insert payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewExpense {
    pub user_id: String,
    pub note: Option<String>,
    pub amount: f64,
    pub currency: String,
    pub category_id: String,
    pub spent_at_utc: DateTime<Utc>,
}

/// Update payload (ownership never changes)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpensePatch {
    pub note: Option<String>,
    pub amount: f64,
    pub currency: String,
    pub category_id: String,
    pub spent_at_utc: DateTime<Utc>,
}

impl NewExpense {
    pub fn into_patch(self) -> ExpensePatch {
        ExpensePatch {
            note: self.note,
            amount: self.amount,
            currency: self.currency,
            category_id: self.category_id,
            spent_at_utc: self.spent_at_utc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_expense_from_embedded_select() {
        let expense: Expense = serde_json::from_value(json!({
            "id": "e-1",
            "amount": "12.50",
            "currency": "PLN",
            "spent_at_utc": "2025-02-01T18:00:00+00:00",
            "note": null,
            "category": { "name": "Groceries" }
        }))
        .unwrap();

        assert_eq!(expense.amount, 12.5);
        assert_eq!(expense.category_name(), "Groceries");
        assert_eq!(expense.note_or_empty(), "");
        assert_eq!(
            expense.spent_at_utc,
            Utc.with_ymd_and_hms(2025, 2, 1, 18, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_missing_category_is_uncategorized() {
        let expense: Expense = serde_json::from_value(json!({
            "amount": 3,
            "currency": "PLN",
            "spent_at_utc": "2025-02-01T18:00:00Z",
            "category": null
        }))
        .unwrap();
        assert_eq!(expense.category_name(), UNCATEGORIZED);
        assert_eq!(expense.category_color(), None);
    }

    #[test]
    fn test_new_expense_serializes_nullable_note() {
        let payload = NewExpense {
            user_id: "u-1".to_string(),
            note: None,
            amount: 10.0,
            currency: "PLN".to_string(),
            category_id: "c-1".to_string(),
            spent_at_utc: Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap(),
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["note"], serde_json::Value::Null);
        assert_eq!(value["spent_at_utc"], "2025-01-01T12:00:00Z");
    }
}
