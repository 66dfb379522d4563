// Aggregate rows returned by the group RPCs
//
//   group_aggregate_totals(g)                -> GroupTotal
//   group_aggregate_by_category(g)           -> CategoryAggregate
//   group_timeseries(g, start_ts, bucket)    -> TimeseriesRow

use super::{de, UNCATEGORIZED};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupTotal {
    #[serde(default)]
    pub currency: String,
    #[serde(default, deserialize_with = "de::number")]
    pub total: f64,
    #[serde(default, deserialize_with = "de::count")]
    pub cnt: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryAggregate {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub currency: String,
    #[serde(default, deserialize_with = "de::number")]
    pub total: f64,
    #[serde(default, deserialize_with = "de::count")]
    pub cnt: i64,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default, deserialize_with = "de::opt_timestamp")]
    pub first_date: Option<DateTime<Utc>>,
}

impl CategoryAggregate {
    pub fn category_name(&self) -> &str {
        self.category
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or(UNCATEGORIZED)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeseriesRow {
    #[serde(deserialize_with = "de::timestamp")]
    pub bucket_start: DateTime<Utc>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub currency: String,
    #[serde(default, deserialize_with = "de::number")]
    pub total: f64,
}

impl TimeseriesRow {
    pub fn category_name(&self) -> &str {
        self.category
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or(UNCATEGORIZED)
    }
}
