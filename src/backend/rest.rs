// RestBackend - blocking HTTP client for the hosted Postgres/REST/auth stack
//
// Auth:      /auth/v1/token?grant_type=password|refresh_token, /auth/v1/logout
// Tables:    /rest/v1/{table} (GET/POST/PATCH/DELETE + PostgREST filters)
// RPC:       /rest/v1/rpc/{fn}
// Functions: /functions/v1/{name}

use super::query::parse_content_range;
use super::{AuthUser, Backend, Fetched, Query, Session};
use crate::config::BackendConfig;
use crate::error::{BackendError, BackendResult};
use chrono::Utc;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::CONTENT_RANGE;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::RwLock;

pub struct RestBackend {
    config: BackendConfig,
    http: Client,
    session: RwLock<Option<Session>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let expires_at = self
            .expires_at
            .or_else(|| self.expires_in.map(|secs| Utc::now().timestamp() + secs));
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

impl RestBackend {
    pub fn new(config: BackendConfig) -> BackendResult<Self> {
        if config.anon_key.trim().is_empty() {
            return Err(BackendError::MissingConfig("EXPENSE_BACKEND_ANON_KEY"));
        }
        let http = Client::builder().user_agent(config.user_agent.clone()).build()?;
        Ok(Self {
            config,
            http,
            session: RwLock::new(None),
        })
    }

    pub fn from_env() -> BackendResult<Self> {
        Self::new(BackendConfig::from_env()?)
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Reuse a session persisted from an earlier run
    pub fn restore_session(&self, session: Session) {
        self.store_session(Some(session));
    }

    fn current_session(&self) -> Option<Session> {
        match self.session.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn store_session(&self, session: Option<Session>) {
        match self.session.write() {
            Ok(mut guard) => *guard = session,
            Err(poisoned) => *poisoned.into_inner() = session,
        }
    }

    fn bearer(&self) -> String {
        self.current_session()
            .map(|s| s.access_token)
            .unwrap_or_else(|| self.config.anon_key.clone())
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.config.endpoint(path))
            .header("apikey", &self.config.anon_key)
            .bearer_auth(self.bearer())
    }

    fn send(&self, builder: RequestBuilder, label: &str) -> BackendResult<Response> {
        let response = builder.send()?;
        let status = response.status();
        tracing::debug!(request = label, status = status.as_u16(), "backend response");

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().unwrap_or_default();
        let message = error_message(&body)
            .or_else(|| status.canonical_reason().map(str::to_string))
            .unwrap_or_else(|| format!("request failed with status {}", status.as_u16()));
        tracing::warn!(request = label, status = status.as_u16(), %message, "backend error");
        Err(BackendError::api(status.as_u16(), message))
    }

    fn token_request(&self, grant_type: &str, body: Value) -> BackendResult<Session> {
        let builder = self
            .http
            .post(self.config.endpoint("auth/v1/token"))
            .query(&[("grant_type", grant_type)])
            .header("apikey", &self.config.anon_key)
            .json(&body);
        let token: TokenResponse = self.send(builder, "auth/token")?.json()?;
        let session = token.into_session();
        self.store_session(Some(session.clone()));
        Ok(session)
    }

    /// Refresh an expired access token once, before the next data request
    fn refresh_if_expired(&self) -> BackendResult<()> {
        let Some(session) = self.current_session() else {
            return Ok(());
        };
        if !session.is_expired(Utc::now()) {
            return Ok(());
        }

        match session.refresh_token {
            Some(refresh_token) => {
                tracing::info!(user = %session.user.id, "refreshing expired session");
                match self.token_request("refresh_token", json!({ "refresh_token": refresh_token })) {
                    Ok(_) => Ok(()),
                    Err(e) => {
                        self.store_session(None);
                        Err(e)
                    }
                }
            }
            None => {
                self.store_session(None);
                Err(BackendError::NotAuthenticated)
            }
        }
    }

    fn table_request(&self, method: Method, table: &str, query: &Query) -> BackendResult<RequestBuilder> {
        self.refresh_if_expired()?;
        Ok(self
            .request(method, &format!("rest/v1/{}", table))
            .query(&query.to_params()))
    }
}

impl Backend for RestBackend {
    fn sign_in_with_password(&self, email: &str, password: &str) -> BackendResult<Session> {
        let session = self.token_request(
            "password",
            json!({ "email": email.trim(), "password": password }),
        )?;
        tracing::info!(user = %session.user.id, "signed in");
        Ok(session)
    }

    fn sign_out(&self) -> BackendResult<()> {
        if self.current_session().is_none() {
            return Ok(());
        }
        let result = self
            .send(self.request(Method::POST, "auth/v1/logout"), "auth/logout")
            .map(|_| ());
        // Local session is dropped even if the server already forgot it
        self.store_session(None);
        result
    }

    fn session(&self) -> Option<Session> {
        self.current_session()
    }

    fn select(&self, table: &str, query: &Query) -> BackendResult<Fetched> {
        let mut builder = self.table_request(Method::GET, table, query)?;
        if query.wants_count() {
            builder = builder.header("Prefer", "count=exact");
        }

        let response = self.send(builder, table)?;
        let count = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range);
        let rows: Vec<Value> = response.json()?;

        Ok(Fetched {
            count: if query.wants_count() { count } else { None },
            rows,
        })
    }

    fn insert(&self, table: &str, rows: Value) -> BackendResult<()> {
        let builder = self
            .table_request(Method::POST, table, &Query::new())?
            .header("Prefer", "return=minimal")
            .json(&rows);
        self.send(builder, table)?;
        Ok(())
    }

    fn update(&self, table: &str, patch: Value, filter: &Query) -> BackendResult<()> {
        let builder = self
            .table_request(Method::PATCH, table, filter)?
            .header("Prefer", "return=minimal")
            .json(&patch);
        self.send(builder, table)?;
        Ok(())
    }

    fn delete(&self, table: &str, filter: &Query) -> BackendResult<()> {
        let builder = self
            .table_request(Method::DELETE, table, filter)?
            .header("Prefer", "return=minimal");
        self.send(builder, table)?;
        Ok(())
    }

    fn rpc(&self, function: &str, args: Value) -> BackendResult<Value> {
        self.refresh_if_expired()?;
        let builder = self
            .request(Method::POST, &format!("rest/v1/rpc/{}", function))
            .json(&args);
        let body = self.send(builder, function)?.text()?;
        parse_body(&body)
    }

    fn invoke(&self, function: &str, body: Value) -> BackendResult<Value> {
        self.refresh_if_expired()?;
        let builder = self
            .request(Method::POST, &format!("functions/v1/{}", function))
            .json(&body);
        let text = self.send(builder, function)?.text()?;
        parse_body(&text)
    }
}

/// Empty bodies are null; non-JSON bodies come back as a string
fn parse_body(body: &str) -> BackendResult<Value> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string())))
}

/// First human-readable message in an error payload
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["message", "msg", "error_description", "error"]
        .iter()
        .filter_map(|key| value.get(*key))
        .filter_map(|v| v.as_str())
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}
