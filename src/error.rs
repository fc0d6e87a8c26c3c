//! Error taxonomy for the portal session flow.
//!
//! Any of these aborts the whole session: the portal's anti-forgery tokens
//! rotate on every response, so there is no way to resume a half-finished
//! flow. Row-level parse failures live in [`crate::records::RowParseError`]
//! and only drop a single agent's table.

use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    /// The login POST came back without the session-identity cookie.
    /// An HTTP 200 with no cookie still lands here.
    #[error("authentication failed: no session cookie in response (check user and password)")]
    Auth,

    /// An expected hidden input, form field, select, or table is missing.
    /// Either the site markup changed or the page is degraded.
    #[error("unexpected page structure: missing {field}")]
    PageStructure { field: String },

    /// The server answered with a non-success HTTP status.
    #[error("request failed with status {status}")]
    Transient { status: StatusCode },

    /// Connection, TLS, or timeout failure from the HTTP client.
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl PortalError {
    pub(crate) fn missing(field: impl Into<String>) -> Self {
        Self::PageStructure {
            field: field.into(),
        }
    }
}
