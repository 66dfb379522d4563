// In-memory Backend for page tests.
//
// Evaluates Query filters/order/range over JSON rows, records every call,
// and answers RPCs/functions from registered handlers. Column selection and
// embedded relations are not evaluated: seed rows already carry them.

use super::{AuthUser, Backend, Fetched, Filter, Query, Session};
use crate::error::{BackendError, BackendResult};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Mutex;

type Handler = Box<dyn Fn(&Value) -> BackendResult<Value> + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub kind: &'static str,
    pub target: String,
    pub payload: Value,
}

#[derive(Default)]
pub struct FakeBackend {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    rpcs: Mutex<HashMap<String, Handler>>,
    functions: Mutex<HashMap<String, Handler>>,
    session: Mutex<Option<Session>>,
    password: Mutex<Option<(String, String, AuthUser)>>,
    fail_next: Mutex<Option<String>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in_as(self, user_id: &str, email: &str) -> Self {
        *self.session.lock().unwrap() = Some(session_for(user_id, email));
        self
    }

    /// Accept exactly this email/password pair
    pub fn with_account(self, email: &str, password: &str, user_id: &str) -> Self {
        *self.password.lock().unwrap() = Some((
            email.to_string(),
            password.to_string(),
            AuthUser {
                id: user_id.to_string(),
                email: Some(email.to_string()),
            },
        ));
        self
    }

    pub fn with_table(self, table: &str, rows: Vec<Value>) -> Self {
        self.tables.lock().unwrap().insert(table.to_string(), rows);
        self
    }

    pub fn with_rpc(self, name: &str, response: Value) -> Self {
        self.with_rpc_fn(name, move |_| Ok(response.clone()))
    }

    pub fn with_rpc_fn<F>(self, name: &str, handler: F) -> Self
    where
        F: Fn(&Value) -> BackendResult<Value> + Send + Sync + 'static,
    {
        self.rpcs.lock().unwrap().insert(name.to_string(), Box::new(handler));
        self
    }

    pub fn with_function<F>(self, name: &str, handler: F) -> Self
    where
        F: Fn(&Value) -> BackendResult<Value> + Send + Sync + 'static,
    {
        self.functions
            .lock()
            .unwrap()
            .insert(name.to_string(), Box::new(handler));
        self
    }

    /// Next mutating call (insert/update/delete/invoke) fails with this message
    pub fn fail_next(&self, message: &str) {
        *self.fail_next.lock().unwrap() = Some(message.to_string());
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_of(&self, kind: &str) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.kind == kind).collect()
    }

    fn record(&self, kind: &'static str, target: &str, payload: Value) {
        self.calls.lock().unwrap().push(Call {
            kind,
            target: target.to_string(),
            payload,
        });
    }

    fn take_failure(&self) -> BackendResult<()> {
        match self.fail_next.lock().unwrap().take() {
            Some(message) => Err(BackendError::api(400, message)),
            None => Ok(()),
        }
    }
}

pub fn session_for(user_id: &str, email: &str) -> Session {
    Session {
        access_token: format!("token-{}", user_id),
        refresh_token: None,
        expires_at: None,
        user: AuthUser {
            id: user_id.to_string(),
            email: Some(email.to_string()),
        },
    }
}

impl Backend for FakeBackend {
    fn sign_in_with_password(&self, email: &str, password: &str) -> BackendResult<Session> {
        let account = self.password.lock().unwrap().clone();
        match account {
            Some((e, p, user)) if e == email && p == password => {
                let session = Session {
                    access_token: format!("token-{}", user.id),
                    refresh_token: Some("refresh".to_string()),
                    expires_at: None,
                    user,
                };
                *self.session.lock().unwrap() = Some(session.clone());
                Ok(session)
            }
            _ => Err(BackendError::api(400, "Invalid login credentials")),
        }
    }

    fn sign_out(&self) -> BackendResult<()> {
        self.record("sign_out", "", Value::Null);
        *self.session.lock().unwrap() = None;
        self.take_failure()
    }

    fn session(&self) -> Option<Session> {
        self.session.lock().unwrap().clone()
    }

    fn select(&self, table: &str, query: &Query) -> BackendResult<Fetched> {
        self.record("select", table, Value::String(format!("{:?}", query.to_params())));
        let tables = self.tables.lock().unwrap();
        let mut rows: Vec<Value> = tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| query.filters().iter().all(|f| matches(row, f)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        rows.sort_by(|a, b| {
            for order in query.ordering() {
                let ord = compare_fields(a.get(&order.column), b.get(&order.column));
                let ord = if order.ascending { ord } else { ord.reverse() };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });

        let total = rows.len() as u64;
        if let Some((from, to)) = query.bounds() {
            rows = rows
                .into_iter()
                .skip(from as usize)
                .take((to - from + 1) as usize)
                .collect();
        }

        Ok(Fetched {
            rows,
            count: query.wants_count().then_some(total),
        })
    }

    fn insert(&self, table: &str, rows: Value) -> BackendResult<()> {
        self.record("insert", table, rows.clone());
        self.take_failure()?;
        let new_rows = match rows {
            Value::Array(items) => items,
            other => vec![other],
        };
        let mut tables = self.tables.lock().unwrap();
        let target = tables.entry(table.to_string()).or_default();
        for mut row in new_rows {
            if let Value::Object(map) = &mut row {
                map.entry("id")
                    .or_insert_with(|| Value::String(uuid::Uuid::new_v4().to_string()));
            }
            target.push(row);
        }
        Ok(())
    }

    fn update(&self, table: &str, patch: Value, filter: &Query) -> BackendResult<()> {
        self.record("update", table, patch.clone());
        self.take_failure()?;
        let patch: Map<String, Value> = match patch {
            Value::Object(map) => map,
            _ => return Err(BackendError::validation("patch must be an object")),
        };
        let mut tables = self.tables.lock().unwrap();
        if let Some(rows) = tables.get_mut(table) {
            for row in rows.iter_mut() {
                if filter.filters().iter().all(|f| matches(row, f)) {
                    if let Value::Object(map) = row {
                        for (k, v) in &patch {
                            map.insert(k.clone(), v.clone());
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn delete(&self, table: &str, filter: &Query) -> BackendResult<()> {
        self.record(
            "delete",
            table,
            Value::String(format!("{:?}", filter.to_params())),
        );
        self.take_failure()?;
        let mut tables = self.tables.lock().unwrap();
        if let Some(rows) = tables.get_mut(table) {
            rows.retain(|row| !filter.filters().iter().all(|f| matches(row, f)));
        }
        Ok(())
    }

    fn rpc(&self, function: &str, args: Value) -> BackendResult<Value> {
        self.record("rpc", function, args.clone());
        let rpcs = self.rpcs.lock().unwrap();
        match rpcs.get(function) {
            Some(handler) => handler(&args),
            None => Err(BackendError::api(404, format!("function {} not found", function))),
        }
    }

    fn invoke(&self, function: &str, body: Value) -> BackendResult<Value> {
        self.record("invoke", function, body.clone());
        self.take_failure()?;
        let functions = self.functions.lock().unwrap();
        match functions.get(function) {
            Some(handler) => handler(&body),
            None => Ok(Value::Null),
        }
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn compare_text(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    }
}

fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a.and_then(as_text), b.and_then(as_text)) {
        (Some(x), Some(y)) => compare_text(&x, &y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn matches(row: &Value, filter: &Filter) -> bool {
    let field = row.get(filter.column()).and_then(as_text);
    let Some(field) = field else {
        return false;
    };
    match filter {
        Filter::Eq(_, v) => &field == v,
        Filter::In(_, values) => values.contains(&field),
        Filter::ILike(_, pattern) => {
            let needle = pattern.trim_matches('%').to_lowercase();
            field.to_lowercase().contains(&needle)
        }
        Filter::Gte(_, v) => compare_text(&field, v) != Ordering::Less,
        Filter::Lte(_, v) => compare_text(&field, v) != Ordering::Greater,
        Filter::Lt(_, v) => compare_text(&field, v) == Ordering::Less,
    }
}
