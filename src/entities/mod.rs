// Entity Models - transient copies of rows owned by the remote database
//
// The database enforces uniqueness, foreign keys and access control. These
// structs only describe the row shapes the pages read and write; nothing here
// outlives a page mount.

pub mod aggregate;
pub mod audit;
pub mod budget;
pub mod category;
pub mod expense;
pub mod group;
pub mod profile;

pub use aggregate::{CategoryAggregate, GroupTotal, TimeseriesRow};
pub use audit::AuditEntry;
pub use budget::{Budget, BudgetOwner, BudgetPayload, BudgetScope, Frequency};
pub use category::{Category, CategoryPayload, CategoryRef};
pub use expense::{Expense, ExpensePatch, NewExpense};
pub use group::{Group, GroupMember};
pub use profile::Profile;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

pub const UNCATEGORIZED: &str = "(uncategorized)";

/// Accepts RFC 3339, Postgres text output, naive timestamps (UTC) and plain
/// dates (UTC midnight).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
        if let Ok(ts) = DateTime::parse_from_str(raw, fmt) {
            return Some(ts.with_timezone(&Utc));
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Lenient deserializers: PostgREST renders numeric/bigint as numbers, some
/// RPCs return them as strings.
pub(crate) mod de {
    use chrono::{DateTime, Utc};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(f64),
        Text(String),
    }

    fn to_f64<E: Error>(raw: Option<Raw>) -> Result<f64, E> {
        match raw {
            None => Ok(0.0),
            Some(Raw::Num(n)) => Ok(n),
            Some(Raw::Text(s)) if s.trim().is_empty() => Ok(0.0),
            Some(Raw::Text(s)) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| E::custom(format!("invalid number: {}", s))),
        }
    }

    pub fn number<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        to_f64(Option::<Raw>::deserialize(d)?)
    }

    pub fn count<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        Ok(to_f64::<D::Error>(Option::<Raw>::deserialize(d)?)? as i64)
    }

    pub fn timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_timestamp(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp: {}", raw)))
    }

    pub fn opt_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(d)? {
            None => Ok(None),
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => super::parse_timestamp(&raw)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid timestamp: {}", raw))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_timestamp_shapes() {
        let expected = Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2025-03-14T09:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2025-03-14T10:30:00+01:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-03-14 09:30:00+00"), Some(expected));
        assert_eq!(parse_timestamp("2025-03-14T09:30:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2025-03-14"),
            Some(Utc.with_ymd_and_hms(2025, 3, 14, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }
}
