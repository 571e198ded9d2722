#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Shared types for the planning application search pipeline.
//!
//! These types describe planning applications as returned by the backend,
//! the user-facing filter and sort selections, and the error taxonomy used
//! to decide how failures are presented. They are shared by the geocoder,
//! spatial and search crates.

pub mod clock;

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A WGS84 coordinate pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lng: f64,
}

impl Coordinates {
    /// Creates a coordinate pair.
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Whether both components are finite and inside the valid WGS84 range.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.4}, {:.4})", self.lat, self.lng)
    }
}

/// A geographic bounding box in WGS84 coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Western longitude boundary.
    pub west: f64,
    /// Southern latitude boundary.
    pub south: f64,
    /// Eastern longitude boundary.
    pub east: f64,
    /// Northern latitude boundary.
    pub north: f64,
}

impl BoundingBox {
    /// Creates a new bounding box from the given coordinates.
    #[must_use]
    pub const fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }
}

/// How a free-text search term was interpreted.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TermKind {
    /// A full UK postcode (e.g. `SW1A 1AA`).
    Postcode,
    /// The outward half of a UK postcode (e.g. `SW1A`).
    Outcode,
    /// An opaque provider place identifier.
    PlaceId,
    /// Anything else: a town, street or landmark name.
    PlaceName,
}

/// Distance of an application from the search centre.
///
/// Backends return either a number of kilometres or a display string such
/// as `"0.5 mi"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Distance {
    /// Great-circle distance in kilometres.
    Km(f64),
    /// Pre-formatted display text.
    Text(String),
}

impl Distance {
    /// Numeric value used for ordering.
    ///
    /// For text distances this is the leading number (`"2.0 mi"` → `2.0`).
    /// Returns `None` when no number can be read.
    #[must_use]
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Km(km) if km.is_nan() => None,
            Self::Km(km) => Some(*km),
            Self::Text(text) => leading_number(text),
        }
    }
}

fn leading_number(text: &str) -> Option<f64> {
    let trimmed = text.trim_start();
    let end = trimmed
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || c == '.' || (i == 0 && c == '-')))
        .map_or(trimmed.len(), |(i, _)| i);
    trimmed[..end].parse().ok()
}

/// A planning application row as returned by the backend.
///
/// Only the fields the search pipeline reads are typed; every other
/// column is preserved in [`Application::extra`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Application {
    /// Primary key.
    pub id: i64,
    /// Council reference (e.g. `"24/01234/FUL"`).
    #[serde(default)]
    pub reference: Option<String>,
    /// Short title.
    #[serde(default)]
    pub title: Option<String>,
    /// Proposal description.
    #[serde(default)]
    pub description: Option<String>,
    /// Site address.
    #[serde(default)]
    pub address: Option<String>,
    /// Free-text decision status as published by the council.
    #[serde(default)]
    pub status: Option<String>,
    /// Site latitude.
    #[serde(default)]
    pub latitude: Option<f64>,
    /// Site longitude.
    #[serde(default)]
    pub longitude: Option<f64>,
    /// Distance from the search centre.
    #[serde(default)]
    pub distance: Option<Distance>,
    /// Development classification.
    #[serde(default)]
    pub classification: Option<String>,
    /// Category label.
    #[serde(default)]
    pub category: Option<String>,
    /// Short application type code.
    #[serde(default, rename = "type")]
    pub application_type: Option<String>,
    /// Long-form application type.
    #[serde(default)]
    pub application_type_full: Option<String>,
    /// Estimated community impact.
    #[serde(default)]
    pub impact_score: Option<f64>,
    /// Upstream text relevance score.
    #[serde(default)]
    pub relevance_score: Option<f64>,
    /// Date the application was submitted.
    #[serde(default)]
    pub submission_date: Option<String>,
    /// Date the application was validated.
    #[serde(default)]
    pub valid_date: Option<String>,
    /// Date public consultation closes.
    #[serde(default)]
    pub consultation_end_date: Option<String>,
    /// Remaining backend columns (documents, images, ...).
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Application {
    /// Site coordinates, when both components are present.
    #[must_use]
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some(Coordinates::new(lat, lng)),
            _ => None,
        }
    }

    /// Submission date, falling back to the validation date.
    #[must_use]
    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submission_date
            .as_deref()
            .and_then(parse_date)
            .or_else(|| self.valid_date.as_deref().and_then(parse_date))
    }

    /// End of the public consultation period.
    #[must_use]
    pub fn consultation_ends_at(&self) -> Option<DateTime<Utc>> {
        self.consultation_end_date.as_deref().and_then(parse_date)
    }
}

/// Parses the date formats seen in council feeds: RFC 3339 timestamps,
/// ISO dates and UK `dd/mm/yyyy` dates.
#[must_use]
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d", "%d/%m/%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// User-selected filters. Each key holds at most one active value.
///
/// Field order is fixed so the JSON form is stable and can be used as part
/// of a cache key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Status bucket or free-text status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Application type.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub application_type: Option<String>,
    /// Development classification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<String>,
    /// Free-text search.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl SearchFilters {
    /// Returns a copy with blank values and the UI's `"all"` option removed.
    #[must_use]
    pub fn normalized(&self) -> Self {
        fn clean(value: Option<&String>) -> Option<String> {
            value
                .map(|v| v.trim())
                .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("all"))
                .map(str::to_string)
        }

        Self {
            status: clean(self.status.as_ref()),
            application_type: clean(self.application_type.as_ref()),
            classification: clean(self.classification.as_ref()),
            search: clean(self.search.as_ref()),
        }
    }

    /// Whether no filter is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let n = self.normalized();
        n.status.is_none()
            && n.application_type.is_none()
            && n.classification.is_none()
            && n.search.is_none()
    }

    /// Stable JSON form used in cache keys.
    #[must_use]
    pub fn cache_fragment(&self) -> String {
        serde_json::to_string(&self.normalized()).unwrap_or_default()
    }
}

/// Coarse status groups offered by the status filter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum StatusBucket {
    /// Awaiting a decision.
    #[strum(serialize = "Under Review")]
    #[serde(rename = "Under Review")]
    UnderReview,
    /// Permission granted.
    Approved,
    /// Permission refused.
    Declined,
    /// Anything not matching the other buckets (withdrawn, appeal, ...).
    Other,
}

impl StatusBucket {
    /// Substrings (lowercase) that place a status in this bucket.
    #[must_use]
    pub const fn keywords(self) -> &'static [&'static str] {
        match self {
            Self::UnderReview => &["under consideration", "under review"],
            Self::Approved => &["approved", "granted"],
            Self::Declined => &["declined", "refused"],
            Self::Other => &[],
        }
    }

    /// Buckets that have their own keywords.
    #[must_use]
    pub const fn named() -> &'static [Self] {
        &[Self::UnderReview, Self::Approved, Self::Declined]
    }

    /// Buckets a free-text status.
    #[must_use]
    pub fn of(status: &str) -> Self {
        let lower = status.to_lowercase();
        Self::named()
            .iter()
            .copied()
            .find(|bucket| bucket.keywords().iter().any(|k| lower.contains(k)))
            .unwrap_or(Self::Other)
    }
}

/// Result ordering offered by the sort control.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum SortOrder {
    /// Most recently submitted first.
    Newest,
    /// Closest first.
    Distance,
    /// Consultation closing soonest first.
    #[strum(
        to_string = "closingSoon",
        serialize = "closing-soon",
        serialize = "closing_soon"
    )]
    ClosingSoon,
    /// Highest impact first.
    Impact,
}

impl SortOrder {
    /// Parses a sort name, returning `None` for unknown names so callers
    /// can leave the order untouched.
    #[must_use]
    pub fn parse_lenient(name: &str) -> Option<Self> {
        name.trim().parse().ok()
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Number of items across all pages.
    pub total_count: usize,
    /// `max(1, ceil(total_count / page_size))`.
    pub total_pages: usize,
    /// Zero-based page index.
    pub page: usize,
    /// Requested page size.
    pub page_size: usize,
}

/// Failure classes shared by every stage of the pipeline.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Connection failure or transport error.
    Network,
    /// The operation did not finish within its deadline.
    Timeout,
    /// No geocoding match or no results.
    NotFound,
    /// Malformed postcode or outcode.
    InvalidInput,
    /// The backend spatial procedure does not exist.
    BackendFunctionMissing,
    /// Anything else.
    Unknown,
}

impl ErrorKind {
    /// Whether retrying the same request may succeed.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_distance_reads_leading_number() {
        assert_eq!(Distance::Text("2.0 mi".to_string()).value(), Some(2.0));
        assert_eq!(Distance::Text(" 0.5mi".to_string()).value(), Some(0.5));
        assert_eq!(Distance::Text("n/a".to_string()).value(), None);
        assert_eq!(Distance::Km(1.25).value(), Some(1.25));
    }

    #[test]
    fn distance_deserializes_number_or_text() {
        let n: Distance = serde_json::from_str("3.5").unwrap();
        let t: Distance = serde_json::from_str("\"1.0 mi\"").unwrap();
        assert_eq!(n, Distance::Km(3.5));
        assert_eq!(t, Distance::Text("1.0 mi".to_string()));
    }

    #[test]
    fn status_buckets() {
        assert_eq!(StatusBucket::of("Under consideration"), StatusBucket::UnderReview);
        assert_eq!(StatusBucket::of("Approved with conditions"), StatusBucket::Approved);
        assert_eq!(StatusBucket::of("Refused"), StatusBucket::Declined);
        assert_eq!(StatusBucket::of("Withdrawn"), StatusBucket::Other);
        assert_eq!("under review".parse::<StatusBucket>(), Ok(StatusBucket::UnderReview));
    }

    #[test]
    fn sort_order_parsing() {
        assert_eq!(SortOrder::parse_lenient("closingSoon"), Some(SortOrder::ClosingSoon));
        assert_eq!(SortOrder::parse_lenient("newest"), Some(SortOrder::Newest));
        assert_eq!(SortOrder::parse_lenient("alphabetical"), None);
    }

    #[test]
    fn filters_cache_fragment_is_stable() {
        let a = SearchFilters {
            status: Some("Approved".to_string()),
            search: Some("  ".to_string()),
            ..SearchFilters::default()
        };
        let b = SearchFilters {
            status: Some(" Approved ".to_string()),
            application_type: Some("all".to_string()),
            ..SearchFilters::default()
        };
        assert_eq!(a.cache_fragment(), r#"{"status":"Approved"}"#);
        assert_eq!(a.cache_fragment(), b.cache_fragment());
        assert!(SearchFilters::default().is_empty());
    }

    #[test]
    fn application_keeps_unknown_columns() {
        let row = serde_json::json!({
            "id": 7,
            "title": "Rear extension",
            "status": "Under consideration",
            "latitude": 51.5,
            "longitude": -0.12,
            "type": "Householder",
            "image": "https://example.org/a.jpg",
            "submission_date": "2024-03-01"
        });
        let app: Application = serde_json::from_value(row).unwrap();
        assert_eq!(app.application_type.as_deref(), Some("Householder"));
        assert!(app.extra.contains_key("image"));
        assert_eq!(app.coordinates(), Some(Coordinates::new(51.5, -0.12)));
        assert_eq!(
            app.submitted_at().map(|d| d.date_naive()),
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
    }

    #[test]
    fn parses_uk_dates() {
        let d = parse_date("15/04/2024").unwrap();
        assert_eq!(d.date_naive(), NaiveDate::from_ymd_opt(2024, 4, 15).unwrap());
        assert!(parse_date("").is_none());
        assert!(parse_date("soon").is_none());
    }
}
