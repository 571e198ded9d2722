//! Google Geocoding API client.
//!
//! Resolves both free-text place names (`address=`, biased to the UK via
//! `region=`) and place ids handed over by the autocomplete widget
//! (`place_id=`). Requires an API key; the service registry entry names
//! the environment variable that holds it.
//!
//! See <https://developers.google.com/maps/documentation/geocoding/requests-geocoding>

use planning_pulse_search_models::Coordinates;

use crate::{GeocodeError, GeocodedLocation, GeocodingProvider, MatchQuality};

/// What to ask Google for.
#[derive(Debug, Clone, Copy)]
pub enum GoogleQuery<'a> {
    /// Free-text address or place name.
    Address(&'a str),
    /// A Google place id.
    PlaceId(&'a str),
}

/// Geocodes a place name or place id.
///
/// # Errors
///
/// Returns [`GeocodeError::RateLimited`] on `OVER_QUERY_LIMIT`,
/// [`GeocodeError::Rejected`] when the key or request is refused,
/// [`GeocodeError::Unavailable`] for other error statuses, and
/// transport/parse errors otherwise.
pub async fn geocode(
    client: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    region: &str,
    query: GoogleQuery<'_>,
) -> Result<Option<GeocodedLocation>, GeocodeError> {
    let (param, value) = match query {
        GoogleQuery::Address(address) => ("address", address),
        GoogleQuery::PlaceId(place_id) => ("place_id", place_id),
    };

    let resp = client
        .get(base_url)
        .query(&[(param, value), ("region", region), ("key", api_key)])
        .send()
        .await?;

    if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(GeocodeError::RateLimited);
    }

    let body: serde_json::Value = resp.json().await?;
    parse_response(&body)
}

fn status_reason(status: &str, body: &serde_json::Value) -> String {
    match body["error_message"].as_str() {
        Some(detail) if !detail.is_empty() => format!("{status}: {detail}"),
        _ => status.to_string(),
    }
}

/// Parses a Geocoding API response, mapping its `status` field.
fn parse_response(body: &serde_json::Value) -> Result<Option<GeocodedLocation>, GeocodeError> {
    let status = body["status"].as_str().unwrap_or("UNKNOWN_ERROR");

    match status {
        "OK" => {}
        "ZERO_RESULTS" => return Ok(None),
        "OVER_QUERY_LIMIT" | "OVER_DAILY_LIMIT" => return Err(GeocodeError::RateLimited),
        "REQUEST_DENIED" | "INVALID_REQUEST" => {
            return Err(GeocodeError::Rejected {
                provider: "Google".to_string(),
                reason: status_reason(status, body),
            });
        }
        other => {
            return Err(GeocodeError::Unavailable {
                provider: "Google".to_string(),
                reason: status_reason(other, body),
            });
        }
    }

    let Some(first) = body["results"].as_array().and_then(|r| r.first()) else {
        return Ok(None);
    };

    let location = first.pointer("/geometry/location").ok_or_else(|| GeocodeError::Parse {
        message: "Google result missing geometry.location".to_string(),
    })?;

    let lat = location["lat"].as_f64().ok_or_else(|| GeocodeError::Parse {
        message: "latitude is not a number".to_string(),
    })?;
    let lng = location["lng"].as_f64().ok_or_else(|| GeocodeError::Parse {
        message: "longitude is not a number".to_string(),
    })?;

    let exact = first
        .pointer("/geometry/location_type")
        .and_then(serde_json::Value::as_str)
        == Some("ROOFTOP");

    Ok(Some(GeocodedLocation {
        coordinates: Coordinates::new(lat, lng),
        matched_name: first["formatted_address"].as_str().map(String::from),
        provider: GeocodingProvider::Google,
        match_quality: if exact {
            MatchQuality::Exact
        } else {
            MatchQuality::Approximate
        },
    }))
}
