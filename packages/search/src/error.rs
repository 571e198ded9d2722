//! Error type for the search pipeline.

use std::time::Duration;

use planning_pulse_geocoder::GeocodeError;
use planning_pulse_search_models::ErrorKind;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors from querying, ranking or paging planning applications.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The search term could not be turned into coordinates.
    #[error(transparent)]
    Geocode(#[from] GeocodeError),

    /// HTTP request to the backend failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A backend row or error body could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The backend rejected the request.
    #[error("Backend error (HTTP {status}{}): {message}", code.as_deref().map(|c| format!(", {c}")).unwrap_or_default())]
    Backend {
        /// HTTP status code.
        status: u16,
        /// `PostgREST` / Postgres error code, if reported.
        code: Option<String>,
        /// Error message.
        message: String,
    },

    /// The spatial procedure is not installed on the backend.
    #[error("Backend function '{function}' is missing: {message}")]
    FunctionMissing {
        /// Procedure name.
        function: String,
        /// Error message reported by the backend.
        message: String,
    },

    /// The query did not finish in time.
    #[error("Search timed out after {after:?}")]
    Timeout {
        /// The deadline that elapsed.
        after: Duration,
    },

    /// The query parameters are unusable.
    #[error("Invalid query: {message}")]
    InvalidQuery {
        /// What was wrong.
        message: String,
    },

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SearchError {
    /// Maps this error onto the shared failure taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Geocode(e) => e.kind(),
            Self::Http(e) if e.is_timeout() => ErrorKind::Timeout,
            Self::Http(e) if e.is_decode() => ErrorKind::Unknown,
            Self::Http(_) => ErrorKind::Network,
            Self::Backend { status, .. } if *status >= 500 => ErrorKind::Network,
            Self::Backend { .. } | Self::Json(_) | Self::Config(_) => ErrorKind::Unknown,
            Self::FunctionMissing { .. } => ErrorKind::BackendFunctionMissing,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::InvalidQuery { .. } => ErrorKind::InvalidInput,
        }
    }
}
