// ⚠️ Backend errors - every remote failure ends up as an inline message
//
// The Display text of each variant is exactly what a page shows next to the
// form that triggered the call. No retry, no recovery: the page re-displays
// the message and stays usable.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Error payload returned by the remote service (PostgREST, auth, functions)
    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("not signed in")]
    NotAuthenticated,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("missing configuration: {0}")]
    MissingConfig(&'static str),
}

impl BackendError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        BackendError::Api {
            status,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        BackendError::Validation(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        BackendError::Forbidden(message.into())
    }

    /// True when the user has to go back through the login screen
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            BackendError::NotAuthenticated | BackendError::Api { status: 401, .. }
        )
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Parse(err.to_string())
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Outcome message attached to a page, shown near the triggering form
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Info(String),
    Error(String),
}

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Notice::Info(text.into())
    }

    pub fn text(&self) -> &str {
        match self {
            Notice::Info(t) | Notice::Error(t) => t,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Notice::Error(_))
    }
}

impl From<&BackendError> for Notice {
    fn from(err: &BackendError) -> Self {
        Notice::Error(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_displays_backend_message() {
        let err = BackendError::api(400, "duplicate key value violates unique constraint");
        assert_eq!(err.to_string(), "duplicate key value violates unique constraint");
        assert!(!err.requires_login());
    }

    #[test]
    fn test_unauthorized_requires_login() {
        assert!(BackendError::NotAuthenticated.requires_login());
        assert!(BackendError::api(401, "JWT expired").requires_login());
    }

    #[test]
    fn test_notice_from_error() {
        let notice = Notice::from(&BackendError::validation("Category is required."));
        assert!(notice.is_error());
        assert_eq!(notice.text(), "Category is required.");
    }
}
