// 🔍 Filters - list filters pushed to the backend or applied client-side
//
// Personal expense filters become query parameters. Group aggregates and
// budget lists are small and already loaded, so they are searched locally.

use crate::backend::{timestamp_param, Query};
use crate::buckets::{add_days, local_day_start};
use crate::entities::{Budget, CategoryAggregate};
use crate::error::{BackendError, BackendResult};
use chrono::{NaiveDate, TimeZone};

pub const BAD_DAY: &str = "Enter a date as YYYY-MM-DD";

/// Typed date bound; blank clears it
pub fn parse_day(input: &str) -> BackendResult<Option<NaiveDate>> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| BackendError::validation(BAD_DAY))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpenseFilter {
    /// Substring of the note
    pub search: String,
    pub category_id: Option<String>,
    pub currency: String,
    /// First local day included
    pub from: Option<NaiveDate>,
    /// Last local day included
    pub to: Option<NaiveDate>,
}

impl ExpenseFilter {
    pub fn is_empty(&self) -> bool {
        self.search.trim().is_empty()
            && self.category_id.is_none()
            && self.currency.trim().is_empty()
            && self.from.is_none()
            && self.to.is_none()
    }

    pub fn apply<Tz: TimeZone>(&self, mut query: Query, tz: &Tz) -> Query {
        let search = self.search.trim();
        if !search.is_empty() {
            query = query.ilike("note", format!("%{}%", search));
        }
        if let Some(category_id) = self.category_id.as_deref().filter(|c| !c.is_empty()) {
            query = query.eq("category_id", category_id);
        }
        let currency = self.currency.trim();
        if !currency.is_empty() {
            query = query.eq("currency", currency.to_uppercase());
        }
        if let Some(from) = self.from {
            query = query.gte("spent_at_utc", timestamp_param(&local_day_start(from, tz)));
        }
        if let Some(to) = self.to {
            let next_day = local_day_start(add_days(to, 1), tz);
            query = query.lt("spent_at_utc", timestamp_param(&next_day));
        }
        query
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

/// Case-insensitive category-name search over group aggregates
pub fn filter_category_aggregates<'a>(
    rows: &'a [CategoryAggregate],
    search: &str,
) -> Vec<&'a CategoryAggregate> {
    let needle = search.trim().to_lowercase();
    rows.iter()
        .filter(|r| needle.is_empty() || contains_ci(r.category.as_deref().unwrap_or(""), &needle))
        .collect()
}

/// Case-insensitive search over the shown scope name and the frequency
pub fn filter_budgets<'a>(rows: &'a [Budget], search: &str) -> Vec<&'a Budget> {
    let needle = search.trim().to_lowercase();
    rows.iter()
        .filter(|b| {
            needle.is_empty()
                || contains_ci(b.scope_label(), &needle)
                || contains_ci(b.frequency.as_str(), &needle)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Filter;
    use chrono::{FixedOffset, Utc};
    use serde_json::json;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_parse_day() {
        assert_eq!(parse_day(" 2025-03-09 ").unwrap(), Some(d(2025, 3, 9)));
        assert_eq!(parse_day("  ").unwrap(), None);
        assert_eq!(parse_day("09.03.2025").unwrap_err().to_string(), BAD_DAY);
        assert!(parse_day("2025-02-30").is_err());
    }

    #[test]
    fn test_empty_filter_adds_nothing() {
        let filter = ExpenseFilter::default();
        assert!(filter.is_empty());
        assert!(filter.apply(Query::new(), &Utc).filters().is_empty());
    }

    #[test]
    fn test_filter_translation() {
        let filter = ExpenseFilter {
            search: " coffee ".to_string(),
            category_id: Some("c-1".to_string()),
            currency: "eur".to_string(),
            from: Some(d(2025, 3, 1)),
            to: Some(d(2025, 3, 31)),
        };
        let query = filter.apply(Query::new(), &Utc);
        assert_eq!(
            query.filters(),
            &[
                Filter::ILike("note".into(), "%coffee%".into()),
                Filter::Eq("category_id".into(), "c-1".into()),
                Filter::Eq("currency".into(), "EUR".into()),
                Filter::Gte("spent_at_utc".into(), "2025-03-01T00:00:00Z".into()),
                Filter::Lt("spent_at_utc".into(), "2025-04-01T00:00:00Z".into()),
            ]
        );
    }

    #[test]
    fn test_to_day_includes_whole_local_day() {
        let warsaw = FixedOffset::east_opt(3600).unwrap();
        let filter = ExpenseFilter {
            to: Some(d(2025, 3, 31)),
            ..Default::default()
        };
        let query = filter.apply(Query::new(), &warsaw);
        assert_eq!(
            query.filters(),
            &[Filter::Lt("spent_at_utc".into(), "2025-03-31T23:00:00Z".into())]
        );
    }

    #[test]
    fn test_category_aggregate_search() {
        let rows: Vec<CategoryAggregate> = serde_json::from_value(json!([
            { "category": "Groceries", "currency": "PLN", "total": 10, "cnt": 1 },
            { "category": "Rental", "currency": "PLN", "total": 900, "cnt": 1 },
            { "category": null, "currency": "PLN", "total": 1, "cnt": 1 }
        ]))
        .unwrap();
        assert_eq!(filter_category_aggregates(&rows, "").len(), 3);
        let hits = filter_category_aggregates(&rows, "GROC");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].category_name(), "Groceries");
    }

    #[test]
    fn test_budget_search_matches_scope_and_frequency() {
        let rows: Vec<Budget> = serde_json::from_value(json!([
            { "id": "1", "all_categories": true, "frequency": "monthly", "amount": 1, "currency": "PLN" },
            { "id": "2", "all_categories": false, "category_id": "c", "frequency": "weekly",
              "amount": 1, "currency": "PLN", "category": { "name": "Fuel" } }
        ]))
        .unwrap();
        assert_eq!(filter_budgets(&rows, "all").len(), 1);
        assert_eq!(filter_budgets(&rows, "fuel")[0].id, "2");
        assert_eq!(filter_budgets(&rows, "WEEK")[0].id, "2");
        assert_eq!(filter_budgets(&rows, "  ").len(), 2);
    }
}
