//! Nominatim / OpenStreetMap geocoder client.
//!
//! Used for place names when Google is not configured or has no match.
//! Nominatim has strict rate limits: **1 request per second** maximum on
//! the public instance, and requires an identifying `User-Agent`.
//!
//! See <https://nominatim.org/release-docs/develop/api/Search/>

use planning_pulse_search_models::Coordinates;

use crate::{GeocodeError, GeocodedLocation, GeocodingProvider, MatchQuality};

/// Geocodes a free-form place name, restricted to `country_codes`.
///
/// The caller is responsible for rate limiting (see `rate_limit_ms` in the
/// service TOML configuration).
///
/// # Errors
///
/// Returns [`GeocodeError`] if the HTTP request or response parsing fails.
pub async fn geocode_freeform(
    client: &reqwest::Client,
    base_url: &str,
    country_codes: &str,
    query: &str,
) -> Result<Option<GeocodedLocation>, GeocodeError> {
    let resp = client
        .get(base_url)
        .query(&[
            ("q", query),
            ("countrycodes", country_codes),
            ("format", "jsonv2"),
            ("limit", "1"),
        ])
        .send()
        .await?;

    if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(GeocodeError::RateLimited);
    }

    if !resp.status().is_success() {
        return Err(GeocodeError::Unavailable {
            provider: "Nominatim".to_string(),
            reason: format!("HTTP {}", resp.status()),
        });
    }

    let body: serde_json::Value = resp.json().await?;
    parse_response(&body)
}

/// Parses Nominatim JSON response.
fn parse_response(body: &serde_json::Value) -> Result<Option<GeocodedLocation>, GeocodeError> {
    let results = body.as_array().ok_or_else(|| GeocodeError::Parse {
        message: "Nominatim response is not an array".to_string(),
    })?;

    let Some(first) = results.first() else {
        return Ok(None);
    };

    let lat = first["lat"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| GeocodeError::Parse {
            message: "Missing lat in Nominatim response".to_string(),
        })?;

    let lon = first["lon"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| GeocodeError::Parse {
            message: "Missing lon in Nominatim response".to_string(),
        })?;

    let display_name = first["display_name"].as_str().map(String::from);

    Ok(Some(GeocodedLocation {
        coordinates: Coordinates::new(lat, lon),
        matched_name: display_name,
        provider: GeocodingProvider::Nominatim,
        match_quality: MatchQuality::Approximate,
    }))
}
