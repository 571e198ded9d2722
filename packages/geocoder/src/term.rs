//! Search term normalization and classification.
//!
//! Residents type many shapes of location into the search box:
//! - Full postcodes: `"SW1A 1AA"`, `"sw1a1aa"`
//! - Outcodes: `"M1"`, `"SW1A"`
//! - Google place ids: `"ChIJdd4hrwug2EcRmSrV3Vo6llI"`
//! - Anything else: `"Camden Town"`, `"10 Downing Street, London"`
//!
//! This module decides which lookup a term should go to and produces the
//! simplified place name used for the second place-name attempt.

use std::sync::LazyLock;

use planning_pulse_search_models::TermKind;
use regex::Regex;

use crate::GeocodeError;

/// Full UK postcode, optional space before the inward code. ASCII only:
/// Unicode case folding would let `\u{212A}` (Kelvin sign) match `K`.
static POSTCODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i-u)^[A-Z]{1,2}[0-9][A-Z0-9]?\s?[0-9][A-Z]{2}$").expect("valid regex")
});

/// Outward code only, ASCII.
static OUTCODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i-u)^[A-Z]{1,2}[0-9][A-Z0-9]?$").expect("valid regex"));

/// Google place ids start with `ChIJ` and are URL-safe base64.
static PLACE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ChIJ[A-Za-z0-9_-]{16,}$").expect("valid regex"));

/// Postcode-shaped fragments embedded in a longer address.
static EMBEDDED_POSTCODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[A-Z]{1,2}[0-9][A-Z0-9]?(?:\s?[0-9][A-Z]{2})?\b").expect("valid regex")
});

/// Leading house numbers ("10", "10a", "10-12").
static HOUSE_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+[A-Za-z]?(?:-\d+[A-Za-z]?)?\s+").expect("valid regex"));

/// Whole segments that carry no location information.
static NOISE_SEGMENTS: &[&str] = &[
    "uk",
    "u.k.",
    "united kingdom",
    "great britain",
    "gb",
    "england",
    "scotland",
    "wales",
    "northern ireland",
];

/// A normalized, classified search term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTerm {
    /// The input exactly as typed.
    pub raw: String,
    /// Canonical form: postcodes upper-cased with a single space before the
    /// inward code, outcodes upper-cased, everything else trimmed with
    /// whitespace collapsed.
    pub normalized: String,
    /// How the term was classified.
    pub kind: TermKind,
}

impl SearchTerm {
    /// Normalizes and classifies `raw`.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::EmptyTerm`] if `raw` is blank.
    pub fn parse(raw: &str) -> Result<Self, GeocodeError> {
        let collapsed = collapse_whitespace(raw);
        if collapsed.is_empty() {
            return Err(GeocodeError::EmptyTerm);
        }

        let kind = classify(&collapsed);
        let normalized = match kind {
            TermKind::Postcode => format_postcode(&collapsed),
            TermKind::Outcode => collapsed.to_uppercase(),
            TermKind::PlaceId | TermKind::PlaceName => collapsed,
        };

        Ok(Self {
            raw: raw.to_string(),
            normalized,
            kind,
        })
    }

    /// Builds a place-name term without re-classifying it.
    #[must_use]
    pub fn place_name(name: &str) -> Self {
        Self {
            raw: name.to_string(),
            normalized: collapse_whitespace(name),
            kind: TermKind::PlaceName,
        }
    }
}

/// Classifies a trimmed term.
#[must_use]
pub fn classify(term: &str) -> TermKind {
    let term = term.trim();
    if POSTCODE_RE.is_match(term) {
        TermKind::Postcode
    } else if OUTCODE_RE.is_match(term) {
        TermKind::Outcode
    } else if PLACE_ID_RE.is_match(term) {
        TermKind::PlaceId
    } else {
        TermKind::PlaceName
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Formats a postcode as `OUTWARD INWARD`.
fn format_postcode(postcode: &str) -> String {
    let compact: String = postcode
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();
    let split = compact
        .char_indices()
        .rev()
        .nth(2)
        .map_or(0, |(idx, _)| idx);
    let (outward, inward) = compact.split_at(split);
    format!("{outward} {inward}")
}

/// Extracts a shorter, more geocodable place name from a long query.
///
/// Drops embedded postcodes and country names, keeps the last remaining
/// comma-separated segment (usually the town), takes the text after a
/// trailing "near"/"in", and strips leading house numbers. Returns `None`
/// when the result would be empty or identical to the input.
#[must_use]
pub fn simplify_place_name(name: &str) -> Option<String> {
    let without_postcodes = EMBEDDED_POSTCODE_RE.replace_all(name, " ");

    let segment = without_postcodes
        .split(',')
        .map(collapse_whitespace)
        .filter(|s| !s.is_empty())
        .filter(|s| !NOISE_SEGMENTS.contains(&s.to_lowercase().as_str()))
        .next_back()?;

    let lower = segment.to_lowercase();
    let tail = [" near ", " in ", " around "]
        .iter()
        .filter_map(|sep| lower.rfind(sep).map(|idx| idx + sep.len()))
        .max()
        .map_or(segment.as_str(), |start| segment.get(start..).unwrap_or(&segment));

    let simplified = HOUSE_NUMBER_RE.replace(tail.trim(), "").trim().to_string();

    if simplified.is_empty() || simplified.eq_ignore_ascii_case(collapse_whitespace(name).as_str())
    {
        None
    } else {
        Some(simplified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_postcodes() {
        assert_eq!(classify("SW1A 1AA"), TermKind::Postcode);
        assert_eq!(classify("sw1a1aa"), TermKind::Postcode);
        assert_eq!(classify("M1 1AE"), TermKind::Postcode);
        assert_eq!(classify("  EC1A 1BB "), TermKind::Postcode);
    }

    #[test]
    fn classifies_outcodes() {
        assert_eq!(classify("SW1A"), TermKind::Outcode);
        assert_eq!(classify("m1"), TermKind::Outcode);
        assert_eq!(classify("LS10"), TermKind::Outcode);
    }

    #[test]
    fn classifies_place_ids_and_names() {
        assert_eq!(classify("ChIJdd4hrwug2EcRmSrV3Vo6llI"), TermKind::PlaceId);
        assert_eq!(classify("Liverpool"), TermKind::PlaceName);
        assert_eq!(classify("Camden Town"), TermKind::PlaceName);
        assert_eq!(classify("SW1A 1AAX"), TermKind::PlaceName);
    }

    #[test]
    fn normalizes_postcode_spacing_and_case() {
        let term = SearchTerm::parse("sw1a1aa").unwrap();
        assert_eq!(term.normalized, "SW1A 1AA");
        assert_eq!(term.kind, TermKind::Postcode);

        let term = SearchTerm::parse("  Camden   Town ").unwrap();
        assert_eq!(term.normalized, "Camden Town");
    }

    #[test]
    fn non_ascii_case_variants_are_place_names() {
        let term = SearchTerm::parse("SW1A 1\u{212A}A").unwrap();
        assert_eq!(term.kind, TermKind::PlaceName);
        assert_eq!(term.normalized, "SW1A 1\u{212A}A");
        assert_eq!(classify("\u{212A}T1"), TermKind::PlaceName);
    }

    #[test]
    fn postcode_split_respects_char_boundaries() {
        assert_eq!(format_postcode("sw1a1\u{212A}a"), "SW1A 1\u{212A}A");
        assert_eq!(format_postcode("m11ae"), "M1 1AE");
    }

    #[test]
    fn empty_term_is_rejected() {
        assert!(matches!(
            SearchTerm::parse("   "),
            Err(GeocodeError::EmptyTerm)
        ));
    }

    #[test]
    fn simplifies_addresses() {
        assert_eq!(
            simplify_place_name("10 Downing Street, Westminster, London SW1A 2AA").as_deref(),
            Some("London")
        );
        assert_eq!(
            simplify_place_name("Liverpool, UK").as_deref(),
            Some("Liverpool")
        );
        assert_eq!(
            simplify_place_name("new flats near Hebden Bridge").as_deref(),
            Some("Hebden Bridge")
        );
        assert_eq!(simplify_place_name("Leeds"), None);
        assert_eq!(simplify_place_name("UK"), None);
    }
}
