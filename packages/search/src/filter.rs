//! Conjunctive filtering of application lists.
//!
//! - `status`: the buckets `Under Review`, `Approved` and `Declined` match
//!   their keyword sets, `Other` matches anything outside them, and any
//!   other value is a case-insensitive substring match.
//! - `classification`: keyword search over title and description (plus the
//!   row's own classification and category); `other` always matches.
//! - `type`: substring of the type or full type description.
//! - `search`: substring of description, address, reference, title or
//!   category.

use planning_pulse_search_models::{Application, SearchFilters, StatusBucket};

/// Keyword sets for the classification filter.
static CLASSIFICATIONS: &[(&str, &[&str])] = &[
    (
        "residential",
        &[
            "residential",
            "dwelling",
            "house",
            "flat",
            "apartment",
            "bungalow",
            "housing",
        ],
    ),
    (
        "commercial",
        &[
            "commercial",
            "retail",
            "shop",
            "office",
            "restaurant",
            "cafe",
            "business",
            "warehouse",
            "industrial",
        ],
    ),
    (
        "extension",
        &[
            "extension",
            "loft",
            "conservatory",
            "dormer",
            "porch",
            "outbuilding",
        ],
    ),
    ("trees", &["tree", "tpo", "hedge", "fell", "pruning"]),
    ("change_of_use", &["change of use", "conversion"]),
    ("demolition", &["demolition", "demolish"]),
    (
        "heritage",
        &["listed building", "conservation area", "heritage"],
    ),
    (
        "infrastructure",
        &["telecommunications", "mast", "road", "highway", "utility"],
    ),
];

/// Catch-all classification value.
const OTHER_CLASSIFICATION: &str = "other";

/// Whether `app` passes every active filter.
#[must_use]
pub fn matches(app: &Application, filters: &SearchFilters) -> bool {
    let filters = filters.normalized();

    filters.status.as_deref().is_none_or(|s| status_matches(app, s))
        && filters
            .application_type
            .as_deref()
            .is_none_or(|t| type_matches(app, t))
        && filters
            .classification
            .as_deref()
            .is_none_or(|c| classification_matches(app, c))
        && filters.search.as_deref().is_none_or(|q| text_matches(app, q))
}

/// Returns the applications passing every active filter, in input order.
#[must_use]
pub fn filter_applications(applications: &[Application], filters: &SearchFilters) -> Vec<Application> {
    if filters.is_empty() {
        return applications.to_vec();
    }
    applications
        .iter()
        .filter(|app| matches(app, filters))
        .cloned()
        .collect()
}

fn contains_ci(haystack: Option<&str>, needle_lower: &str) -> bool {
    haystack.is_some_and(|h| h.to_lowercase().contains(needle_lower))
}

fn status_matches(app: &Application, wanted: &str) -> bool {
    let status = app.status.as_deref().unwrap_or_default();

    match wanted.parse::<StatusBucket>() {
        Ok(StatusBucket::Other) => StatusBucket::of(status) == StatusBucket::Other,
        Ok(bucket) => {
            let lower = status.to_lowercase();
            bucket.keywords().iter().any(|k| lower.contains(k))
        }
        Err(_) => contains_ci(app.status.as_deref(), &wanted.to_lowercase()),
    }
}

fn type_matches(app: &Application, wanted: &str) -> bool {
    let wanted = wanted.to_lowercase();
    contains_ci(app.application_type.as_deref(), &wanted)
        || contains_ci(app.application_type_full.as_deref(), &wanted)
}

fn classification_keywords(name: &str) -> Option<&'static [&'static str]> {
    let key = name.trim().to_lowercase().replace([' ', '-'], "_");
    CLASSIFICATIONS
        .iter()
        .find(|(n, _)| *n == key)
        .map(|(_, keywords)| *keywords)
}

fn classification_matches(app: &Application, wanted: &str) -> bool {
    if wanted.eq_ignore_ascii_case(OTHER_CLASSIFICATION) {
        return true;
    }

    let haystack = [
        app.title.as_deref(),
        app.description.as_deref(),
        app.classification.as_deref(),
        app.category.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(" ")
    .to_lowercase();

    match classification_keywords(wanted) {
        Some(keywords) => keywords.iter().any(|k| haystack.contains(k)),
        None => haystack.contains(&wanted.to_lowercase()),
    }
}

fn text_matches(app: &Application, query: &str) -> bool {
    let query = query.to_lowercase();
    [
        app.description.as_deref(),
        app.address.as_deref(),
        app.reference.as_deref(),
        app.title.as_deref(),
        app.category.as_deref(),
    ]
    .into_iter()
    .any(|field| contains_ci(field, &query))
}
