// 🌐 Backend - the managed service every page talks to
//
// The service owns persistence, auth, row-level security and aggregation.
// This module only describes its client protocol: sign in/out, table
// select/insert/update/delete, named RPCs and serverless functions.
//
// `Backend` is object-safe so pages take `&dyn Backend`; the typed helpers
// below deserialize rows on top of the JSON primitives.

pub mod query;
pub mod rest;

#[cfg(test)]
pub(crate) mod fake;

pub use query::{timestamp_param, Filter, Order, Query};
pub use rest::RestBackend;

use crate::error::{BackendError, BackendResult};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// SESSION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix seconds
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

impl Session {
    /// Treat tokens as expired a little early so a request in flight does
    /// not cross the boundary.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(at) => now.timestamp() >= at - 30,
            None => false,
        }
    }
}

/// Rows from a select, plus the exact total when it was requested
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fetched {
    pub rows: Vec<Value>,
    pub count: Option<u64>,
}

// ============================================================================
// BACKEND TRAIT
// ============================================================================

pub trait Backend {
    fn sign_in_with_password(&self, email: &str, password: &str) -> BackendResult<Session>;

    fn sign_out(&self) -> BackendResult<()>;

    fn session(&self) -> Option<Session>;

    fn select(&self, table: &str, query: &Query) -> BackendResult<Fetched>;

    /// `rows` is a single object or an array of objects
    fn insert(&self, table: &str, rows: Value) -> BackendResult<()>;

    fn update(&self, table: &str, patch: Value, filter: &Query) -> BackendResult<()>;

    fn delete(&self, table: &str, filter: &Query) -> BackendResult<()>;

    fn rpc(&self, function: &str, args: Value) -> BackendResult<Value>;

    /// Serverless function call (privileged operations)
    fn invoke(&self, function: &str, body: Value) -> BackendResult<Value>;
}

// ============================================================================
// TYPED HELPERS
// ============================================================================

pub fn current_user(backend: &dyn Backend) -> BackendResult<AuthUser> {
    backend
        .session()
        .map(|s| s.user)
        .ok_or(BackendError::NotAuthenticated)
}

pub fn fetch<T: DeserializeOwned>(
    backend: &dyn Backend,
    table: &str,
    query: &Query,
) -> BackendResult<Vec<T>> {
    let fetched = backend.select(table, query)?;
    decode_rows(fetched.rows)
}

/// Rows plus exact count; the query is switched to count mode
pub fn fetch_counted<T: DeserializeOwned>(
    backend: &dyn Backend,
    table: &str,
    query: Query,
) -> BackendResult<(Vec<T>, u64)> {
    let fetched = backend.select(table, &query.count_exact())?;
    let count = fetched.count.unwrap_or(fetched.rows.len() as u64);
    Ok((decode_rows(fetched.rows)?, count))
}

/// Zero or one row
pub fn fetch_optional<T: DeserializeOwned>(
    backend: &dyn Backend,
    table: &str,
    query: Query,
) -> BackendResult<Option<T>> {
    let fetched = backend.select(table, &query.range(0, 0))?;
    match fetched.rows.into_iter().next() {
        Some(row) => Ok(Some(serde_json::from_value(row)?)),
        None => Ok(None),
    }
}

/// Exactly one row, otherwise NotFound
pub fn fetch_one<T: DeserializeOwned>(
    backend: &dyn Backend,
    table: &str,
    query: Query,
) -> BackendResult<T> {
    fetch_optional(backend, table, query)?
        .ok_or_else(|| BackendError::NotFound(format!("{} row", table)))
}

/// RPC returning a set of rows; `null` is treated as empty
pub fn rpc_rows<T: DeserializeOwned>(
    backend: &dyn Backend,
    function: &str,
    args: Value,
) -> BackendResult<Vec<T>> {
    match backend.rpc(function, args)? {
        Value::Null => Ok(Vec::new()),
        Value::Array(rows) => decode_rows(rows),
        other => Err(BackendError::Parse(format!(
            "{} returned {}, expected rows",
            function,
            kind_of(&other)
        ))),
    }
}

/// RPC returning a single boolean (e.g. `user_can_use_app`)
pub fn rpc_flag(backend: &dyn Backend, function: &str, args: Value) -> BackendResult<bool> {
    Ok(match backend.rpc(function, args)? {
        Value::Bool(b) => b,
        Value::Array(items) => items.first().map(truthy).unwrap_or(false),
        other => truthy(&other),
    })
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty() && s != "false",
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> BackendResult<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(BackendError::from))
        .collect()
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeBackend;
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Row {
        id: String,
    }

    #[test]
    fn test_session_expiry_has_margin() {
        let now = Utc::now();
        let session = Session {
            access_token: "t".to_string(),
            refresh_token: None,
            expires_at: Some(now.timestamp() + 10),
            user: AuthUser {
                id: "u".to_string(),
                email: None,
            },
        };
        assert!(session.is_expired(now));

        let fresh = Session {
            expires_at: Some(now.timestamp() + 3600),
            ..session.clone()
        };
        assert!(!fresh.is_expired(now));

        let no_expiry = Session {
            expires_at: None,
            ..session
        };
        assert!(!no_expiry.is_expired(now));
    }

    #[test]
    fn test_current_user_requires_session() {
        let backend = FakeBackend::new();
        assert!(matches!(
            current_user(&backend),
            Err(BackendError::NotAuthenticated)
        ));

        let backend = FakeBackend::new().signed_in_as("u-1", "a@example.com");
        assert_eq!(current_user(&backend).unwrap().id, "u-1");
    }

    #[test]
    fn test_fetch_helpers() {
        let backend = FakeBackend::new().with_table(
            "thing",
            vec![json!({"id": "a"}), json!({"id": "b"}), json!({"id": "c"})],
        );

        let all: Vec<Row> = fetch(&backend, "thing", &Query::new()).unwrap();
        assert_eq!(all.len(), 3);

        let (page, total): (Vec<Row>, u64) =
            fetch_counted(&backend, "thing", Query::new().range(0, 1)).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(total, 3);

        let one: Option<Row> =
            fetch_optional(&backend, "thing", Query::new().eq("id", "b")).unwrap();
        assert_eq!(one, Some(Row { id: "b".to_string() }));

        let missing = fetch_one::<Row>(&backend, "thing", Query::new().eq("id", "zzz"));
        assert!(matches!(missing, Err(BackendError::NotFound(_))));
    }

    #[test]
    fn test_rpc_helpers() {
        let backend = FakeBackend::new()
            .with_rpc("user_can_use_app", json!(true))
            .with_rpc("empty", Value::Null)
            .with_rpc("rows", json!([{"id": "x"}]))
            .with_rpc("scalar", json!(5));

        assert!(rpc_flag(&backend, "user_can_use_app", json!({})).unwrap());
        assert!(rpc_rows::<Row>(&backend, "empty", json!({})).unwrap().is_empty());
        assert_eq!(rpc_rows::<Row>(&backend, "rows", json!({})).unwrap().len(), 1);
        assert!(matches!(
            rpc_rows::<Row>(&backend, "scalar", json!({})),
            Err(BackendError::Parse(_))
        ));
    }
}
