//! Decides how a failed search is presented.

use planning_pulse_search_models::ErrorKind;
use serde::Serialize;
use strum_macros::{AsRefStr, Display};

/// How the caller should surface a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureDisposition {
    /// Log only; never shown.
    Silent,
    /// Show with a retry action.
    Retryable,
    /// Show with advice on changing the input.
    Actionable,
    /// Show a generic error with a retry action.
    Generic,
}

/// A classified failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureReport {
    /// Failure class.
    pub kind: ErrorKind,
    /// How to surface it.
    pub disposition: FailureDisposition,
    /// Text for the user; `None` when silent.
    pub user_message: Option<&'static str>,
}

const TIMEOUT_MESSAGE: &str = "The search is taking longer than expected. Please try again.";
const NETWORK_MESSAGE: &str = "Unable to reach the search service. Check your connection and try again.";
const NOT_FOUND_MESSAGE: &str = "Location not found. Try a full postcode or specific location name.";
const GENERIC_MESSAGE: &str = "Search error, please try again.";

/// Classifies a failure of kind `kind`.
///
/// Timeouts and network errors are silent when the current search already
/// has results on screen.
#[must_use]
pub const fn classify_failure(kind: ErrorKind, has_partial_results: bool) -> FailureReport {
    let (disposition, user_message) = match kind {
        ErrorKind::BackendFunctionMissing => (FailureDisposition::Silent, None),
        ErrorKind::Timeout | ErrorKind::Network if has_partial_results => {
            (FailureDisposition::Silent, None)
        }
        ErrorKind::Timeout => (FailureDisposition::Retryable, Some(TIMEOUT_MESSAGE)),
        ErrorKind::Network => (FailureDisposition::Retryable, Some(NETWORK_MESSAGE)),
        ErrorKind::NotFound | ErrorKind::InvalidInput => {
            (FailureDisposition::Actionable, Some(NOT_FOUND_MESSAGE))
        }
        ErrorKind::Unknown => (FailureDisposition::Generic, Some(GENERIC_MESSAGE)),
    };

    FailureReport {
        kind,
        disposition,
        user_message,
    }
}
