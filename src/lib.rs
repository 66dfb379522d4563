// Expense Dashboard - Core Library
// Exposes all modules for use in the terminal dashboard, API server, and tests

pub mod error;
pub mod config;
pub mod backend;      // Remote service client (REST/RPC/functions)
pub mod entities;     // Row types
pub mod pagination;
pub mod buckets;      // Day/week/month calendar keys
pub mod filters;
pub mod charts;
pub mod access;       // Session guard, gate, routes, menu
pub mod groups;
pub mod pages;        // Per-page view models
pub mod export;

// Re-export commonly used types
pub use error::{BackendError, BackendResult, Notice};
pub use config::{BackendConfig, Preferences, Theme, ViewMode, DEFAULT_CURRENCY};
pub use backend::{AuthUser, Backend, Query, RestBackend, Session};
pub use entities::{
    AuditEntry, Budget, Category, CategoryAggregate, Expense, Group, GroupMember, GroupTotal,
    Profile, TimeseriesRow,
};
pub use pagination::{AfterDelete, Pager, PAGE_SIZE};
pub use buckets::{AnalysisWindow, Bucket, DashboardWindows};
pub use filters::ExpenseFilter;
pub use charts::{Doughnut, Point, TimeUnit};
pub use access::{check_access, sign_in, sign_out, MenuItem, Route, Shell, Viewer};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
