// Expense Dashboard - JSON API
//
// Read-only views of the same page models the terminal dashboard uses, served
// for one signed-in account. The backend client is blocking, so every handler
// runs its page load on the blocking pool.

use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::{Arc, Mutex};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use expense_dashboard::access::Viewer;
use expense_dashboard::export::{fetch_all, write_csv};
use expense_dashboard::pages::{
    AnalysisPage, AuditPage, DashboardPage, ExpenseList, GroupAggregates, MyViewPage,
};
use expense_dashboard::{
    check_access, sign_in, Backend, BackendError, BackendResult, Expense, ExpenseFilter, Group,
    Preferences, RestBackend, ViewMode,
};

const DEFAULT_ADDR: &str = "0.0.0.0:3000";

/// Shared application state
#[derive(Clone)]
struct AppState {
    backend: Arc<RestBackend>,
    /// Active group for the group-mode views, kept in memory only
    active_group: Arc<Mutex<Option<Group>>>,
    currency: String,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ModeParams {
    mode: Option<String>,
    group: Option<String>,
}

impl ModeParams {
    fn mode(&self) -> ViewMode {
        self.mode
            .as_deref()
            .and_then(ViewMode::parse)
            .unwrap_or_default()
    }
}

#[derive(Debug, Default, Deserialize)]
struct ExpenseParams {
    #[serde(default)]
    search: String,
    category: Option<String>,
    #[serde(default)]
    currency: String,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    /// 1-based
    page: Option<u64>,
}

/// One page of the signed-in user's expenses
#[derive(Serialize)]
struct ExpensePageResponse {
    rows: Vec<Expense>,
    total: u64,
    page: u64,
    page_count: u64,
    summary: String,
}

fn status_for(err: &BackendError) -> StatusCode {
    match err {
        e if e.requires_login() => StatusCode::UNAUTHORIZED,
        BackendError::Forbidden(_) => StatusCode::FORBIDDEN,
        BackendError::Validation(_) => StatusCode::BAD_REQUEST,
        BackendError::NotFound(_) => StatusCode::NOT_FOUND,
        BackendError::MissingConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_GATEWAY,
    }
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(ApiResponse::<()>::err(message))).into_response()
}

/// Run a blocking page load and wrap its result
async fn respond<T, F>(state: AppState, load: F) -> Response
where
    T: Serialize + Send + 'static,
    F: FnOnce(&AppState) -> BackendResult<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(move || load(&state)).await {
        Ok(Ok(data)) => (StatusCode::OK, Json(ApiResponse::ok(data))).into_response(),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "request failed");
            error_response(status_for(&e), e.to_string())
        }
        Err(e) => {
            tracing::error!(error = %e, "handler task failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Run `f` on a snapshot of the active group; the lock is only held to read
/// it and to store whatever group `f` picked.
fn with_prefs<T>(active_group: &Mutex<Option<Group>>, f: impl FnOnce(&mut Preferences) -> T) -> T {
    let lock = || match active_group.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    let before = lock().clone();
    let mut prefs = Preferences {
        active_group: before.clone(),
        ..Preferences::default()
    };
    let out = f(&mut prefs);
    if prefs.active_group != before {
        *lock() = prefs.active_group;
    }
    out
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/access - Viewer and app gate
async fn get_access(State(state): State<AppState>) -> Response {
    respond(state, |s| check_access(&*s.backend)).await
}

/// GET /api/my - Personal totals per currency
async fn get_my_view(State(state): State<AppState>) -> Response {
    respond(state, |s| MyViewPage::load(&*s.backend)).await
}

/// GET /api/dashboard?mode=my|group&group=<id>
async fn get_dashboard(State(state): State<AppState>, Query(params): Query<ModeParams>) -> Response {
    respond(state, move |s| {
        let backend = &*s.backend;
        let now = Local::now();
        with_prefs(&s.active_group, |prefs| -> BackendResult<DashboardPage> {
            let mut page = DashboardPage::load(backend, params.mode(), prefs, &s.currency, &now)?;
            if let Some(id) = &params.group {
                page.pick_group(backend, id, prefs, &now)?;
            }
            Ok(page)
        })
    })
    .await
}

/// GET /api/analysis?mode=my|group&group=<id>
async fn get_analysis(State(state): State<AppState>, Query(params): Query<ModeParams>) -> Response {
    respond(state, move |s| {
        let backend = &*s.backend;
        let now = Local::now();
        with_prefs(&s.active_group, |prefs| -> BackendResult<AnalysisPage> {
            let mut page = AnalysisPage::load(backend, params.mode(), prefs, &s.currency, &now)?;
            if let Some(id) = &params.group {
                page.pick_group(backend, id, prefs, &now)?;
            }
            Ok(page)
        })
    })
    .await
}

/// GET /api/expenses?search=&category=&currency=&from=&to=&page=
async fn get_expenses(State(state): State<AppState>, Query(params): Query<ExpenseParams>) -> Response {
    respond(state, move |s| {
        let backend = &*s.backend;
        let viewer = Viewer::load(backend)?;
        let mut list = ExpenseList::new(viewer.user.id);
        list.set_filter(ExpenseFilter {
            search: params.search,
            category_id: params.category.filter(|c| !c.is_empty()),
            currency: params.currency,
            from: params.from,
            to: params.to,
        });
        list.pager.page = params.page.unwrap_or(1).saturating_sub(1);
        list.load(backend, &Local)?;
        Ok(ExpensePageResponse {
            total: list.pager.total,
            page: list.pager.page + 1,
            page_count: list.pager.page_count(),
            summary: list.summary(),
            rows: list.rows,
        })
    })
    .await
}

/// GET /api/groups/:id/summary - Totals and per-category aggregates
async fn get_group_summary(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    respond(state, move |s| GroupAggregates::load(&*s.backend, &id)).await
}

/// GET /api/audit - Newest change first
async fn get_audit(State(state): State<AppState>) -> Response {
    respond(state, |s| AuditPage::load(&*s.backend)).await
}

/// GET /api/export.csv - Every expense of the account as CSV
async fn get_export(State(state): State<AppState>) -> Response {
    let result = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
        let backend = &*state.backend;
        let viewer = Viewer::load(backend)?;
        let expenses = fetch_all(backend, viewer.id())?;
        let mut out = Vec::new();
        write_csv(&mut out, &expenses)?;
        Ok(out)
    })
    .await;

    match result {
        Ok(Ok(body)) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                (header::CONTENT_DISPOSITION, "attachment; filename=\"expenses.csv\""),
            ],
            body,
        )
            .into_response(),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "export failed");
            error_response(StatusCode::BAD_GATEWAY, e.to_string())
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

// ============================================================================
// Main Server
// ============================================================================

/// Backend signed in from EXPENSE_EMAIL / EXPENSE_PASSWORD, or the session
/// saved by `expense-dashboard login`.
fn connect() -> Result<RestBackend> {
    let backend = RestBackend::from_env().context("configuring backend")?;

    match (env::var("EXPENSE_EMAIL"), env::var("EXPENSE_PASSWORD")) {
        (Ok(email), Ok(password)) => {
            sign_in(&backend, &email, &password).context("signing in")?;
        }
        _ => {
            let path = Preferences::default_path().context("no user config directory")?;
            let session = Preferences::load(&path)?
                .session
                .context("no credentials: set EXPENSE_EMAIL/EXPENSE_PASSWORD or run `expense-dashboard login`")?;
            backend.restore_session(session);
        }
    }

    let user = backend.session().map(|s| s.user.id).unwrap_or_default();
    tracing::info!(%user, "backend session ready");
    Ok(backend)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("expense_dashboard=info,tower_http=info")),
        )
        .init();

    println!("🌐 Expense Dashboard - API Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // The blocking client has to be created and dropped outside the runtime
    let backend = Arc::new(connect()?);
    println!("✓ Connected to {}", backend.config().url);

    let state = AppState {
        currency: backend.config().default_currency.clone(),
        backend: Arc::clone(&backend),
        active_group: Arc::new(Mutex::new(None)),
    };

    let runtime = tokio::runtime::Runtime::new().context("starting runtime")?;
    runtime.block_on(serve(state))?;
    drop(runtime);

    Ok(())
}

async fn serve(state: AppState) -> Result<()> {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/access", get(get_access))
        .route("/my", get(get_my_view))
        .route("/dashboard", get(get_dashboard))
        .route("/analysis", get(get_analysis))
        .route("/expenses", get(get_expenses))
        .route("/groups/:id/summary", get(get_group_summary))
        .route("/audit", get(get_audit))
        .route("/export.csv", get(get_export))
        .with_state(state);

    let app = Router::new().nest("/api", api_routes).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    let addr = env::var("EXPENSE_SERVER_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;

    println!("\n🚀 Server running on http://{}", addr);
    println!("   API: http://{}/api/dashboard", addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await.context("serving")?;
    Ok(())
}
