#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Search-term geocoding for UK planning searches.
//!
//! Turns whatever a resident typed into the search box (a postcode, an
//! outcode, a place name or a provider place id) into a coordinate pair
//! using a multi-provider strategy configured via TOML files in
//! `services/`:
//!
//! 1. **postcodes.io** (priority 1): free, no API key, full postcodes and
//!    outcodes.
//! 2. **Google Geocoding** (priority 2): place names and place ids.
//!    Skipped when no API key is configured.
//! 3. **Nominatim / OpenStreetMap** (priority 3): place names, 1 req/sec
//!    rate limit.
//!
//! Every provider call runs under a timeout and an exponential backoff
//! retry. When every provider fails, the [`resolver`] falls back to a
//! static table of UK towns and cities (see [`uk_places`]).

pub mod cache;
pub mod google;
pub mod nominatim;
pub mod postcodes_io;
pub mod resolver;
pub mod retry;
pub mod service_registry;
pub mod term;
pub mod uk_places;

use std::time::Duration;

use planning_pulse_search_models::{Coordinates, ErrorKind};
use thiserror::Error;

pub use resolver::{CoordinateResolver, GeocodeStrategy, Resolution, ResolutionSource};
pub use term::SearchTerm;

/// A geocoding result with coordinates and metadata.
#[derive(Debug, Clone)]
pub struct GeocodedLocation {
    /// Resolved coordinates (WGS84).
    pub coordinates: Coordinates,
    /// The matched/canonical name returned by the geocoder.
    pub matched_name: Option<String>,
    /// Which provider resolved this term.
    pub provider: GeocodingProvider,
    /// Whether this was an exact or approximate match.
    pub match_quality: MatchQuality,
}

/// Which geocoding provider resolved a term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeocodingProvider {
    /// postcodes.io.
    PostcodesIo,
    /// Google Geocoding API.
    Google,
    /// Nominatim / OpenStreetMap.
    Nominatim,
}

/// Quality of the geocoding match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchQuality {
    /// Exact postcode or place match.
    Exact,
    /// Approximate match (outcode centroid, fuzzy place).
    Approximate,
}

/// A single strategy's failure, kept for the composite error.
#[derive(Debug)]
pub struct StrategyFailure {
    /// Strategy name (e.g. `"postcodes_io"`).
    pub strategy: String,
    /// What went wrong.
    pub error: GeocodeError,
}

/// Errors from geocoding operations.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimited,

    /// The lookup did not complete in time.
    #[error("Geocoding timed out after {after:?}")]
    Timeout {
        /// The deadline that elapsed.
        after: Duration,
    },

    /// The search box was empty.
    #[error("Search term is empty")]
    EmptyTerm,

    /// The provider rejected the postcode as malformed.
    #[error("Invalid postcode: {postcode}")]
    InvalidPostcode {
        /// The rejected postcode.
        postcode: String,
    },

    /// The provider does not know the outcode.
    #[error("Invalid outcode: {outcode}")]
    InvalidOutcode {
        /// The rejected outcode.
        outcode: String,
    },

    /// The provider answered but had no match.
    #[error("No location found for '{term}'")]
    NotFound {
        /// The term that was looked up.
        term: String,
    },

    /// The provider answered with an unexpected status.
    #[error("{provider} unavailable: {reason}")]
    Unavailable {
        /// Provider name.
        provider: String,
        /// Status or reason reported.
        reason: String,
    },

    /// The provider refused the request itself (bad key, malformed
    /// parameters). Retrying cannot help.
    #[error("{provider} rejected the request: {reason}")]
    Rejected {
        /// Provider name.
        provider: String,
        /// Status or reason reported.
        reason: String,
    },

    /// Every strategy failed.
    #[error("All geocoding strategies failed for '{term}' ({} failures)", failures.len())]
    Exhausted {
        /// The term that was looked up.
        term: String,
        /// Individual strategy failures, in the order they were tried.
        failures: Vec<StrategyFailure>,
    },
}

impl GeocodeError {
    /// Maps this error onto the shared failure taxonomy.
    ///
    /// For [`GeocodeError::Exhausted`] the most actionable underlying kind
    /// wins: invalid input, then timeout, then network, then not found.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Http(e) if e.is_timeout() => ErrorKind::Timeout,
            Self::Http(e) if e.is_decode() => ErrorKind::Unknown,
            Self::Http(_) | Self::RateLimited | Self::Unavailable { .. } => ErrorKind::Network,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::EmptyTerm | Self::InvalidPostcode { .. } | Self::InvalidOutcode { .. } => {
                ErrorKind::InvalidInput
            }
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Parse { .. } | Self::Rejected { .. } => ErrorKind::Unknown,
            Self::Exhausted { failures, .. } => {
                let kinds: Vec<ErrorKind> = failures.iter().map(|f| f.error.kind()).collect();
                [
                    ErrorKind::InvalidInput,
                    ErrorKind::Timeout,
                    ErrorKind::Network,
                    ErrorKind::NotFound,
                ]
                .into_iter()
                .find(|k| kinds.contains(k))
                .unwrap_or(ErrorKind::NotFound)
            }
        }
    }

    /// Whether the same lookup may succeed if retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited) || self.kind().is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(error: GeocodeError) -> StrategyFailure {
        StrategyFailure {
            strategy: "test".to_string(),
            error,
        }
    }

    #[test]
    fn kinds() {
        assert_eq!(GeocodeError::RateLimited.kind(), ErrorKind::Network);
        assert!(GeocodeError::RateLimited.is_retryable());
        assert_eq!(
            GeocodeError::InvalidOutcode {
                outcode: "ZZ9".to_string()
            }
            .kind(),
            ErrorKind::InvalidInput
        );
        assert!(
            !GeocodeError::NotFound {
                term: "x".to_string()
            }
            .is_retryable()
        );
    }

    #[test]
    fn exhausted_reports_most_actionable_kind() {
        let err = GeocodeError::Exhausted {
            term: "x".to_string(),
            failures: vec![
                failure(GeocodeError::NotFound {
                    term: "x".to_string(),
                }),
                failure(GeocodeError::Timeout {
                    after: Duration::from_secs(10),
                }),
            ],
        };
        assert_eq!(err.kind(), ErrorKind::Timeout);

        let empty = GeocodeError::Exhausted {
            term: "x".to_string(),
            failures: Vec::new(),
        };
        assert_eq!(empty.kind(), ErrorKind::NotFound);
    }
}
