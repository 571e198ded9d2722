//! postcodes.io client for UK postcodes and outcodes.
//!
//! Free, no API key. Both endpoints answer
//! `{"status": 200, "result": {"latitude": .., "longitude": ..}}` and use
//! HTTP 404 with an `error` message for unknown or malformed codes.
//!
//! - Postcode: `GET /postcodes/{postcode}`
//! - Outcode: `GET /outcodes/{outcode}` (centroid of the postal district)
//!
//! See <https://postcodes.io/docs>

use planning_pulse_search_models::Coordinates;

use crate::{GeocodeError, GeocodedLocation, GeocodingProvider, MatchQuality};

/// Looks up a full postcode.
///
/// `postcode` may contain spaces; they are removed before the request.
///
/// # Errors
///
/// Returns [`GeocodeError::InvalidPostcode`] when postcodes.io rejects the
/// format, [`GeocodeError::NotFound`] for well-formed but unknown (e.g.
/// terminated) postcodes, and transport/parse errors otherwise.
pub async fn lookup_postcode(
    client: &reqwest::Client,
    base_url: &str,
    postcode: &str,
) -> Result<GeocodedLocation, GeocodeError> {
    let compact: String = postcode.split_whitespace().collect();
    let url = format!("{base_url}/postcodes/{compact}");
    let (status, body) = get_json(client, &url).await?;

    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(if error_message(&body).contains("invalid") {
            GeocodeError::InvalidPostcode {
                postcode: postcode.to_string(),
            }
        } else {
            GeocodeError::NotFound {
                term: postcode.to_string(),
            }
        });
    }
    check_status(status)?;

    parse_response(&body, MatchQuality::Exact)?.ok_or_else(|| GeocodeError::NotFound {
        term: postcode.to_string(),
    })
}

/// Looks up an outcode (postal district) and returns its centroid.
///
/// # Errors
///
/// Returns [`GeocodeError::InvalidOutcode`] when postcodes.io does not know
/// the outcode, and transport/parse errors otherwise.
pub async fn lookup_outcode(
    client: &reqwest::Client,
    base_url: &str,
    outcode: &str,
) -> Result<GeocodedLocation, GeocodeError> {
    let url = format!("{base_url}/outcodes/{}", outcode.trim());
    let (status, body) = get_json(client, &url).await?;

    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(GeocodeError::InvalidOutcode {
            outcode: outcode.to_string(),
        });
    }
    check_status(status)?;

    parse_response(&body, MatchQuality::Approximate)?.ok_or_else(|| GeocodeError::NotFound {
        term: outcode.to_string(),
    })
}

async fn get_json(
    client: &reqwest::Client,
    url: &str,
) -> Result<(reqwest::StatusCode, serde_json::Value), GeocodeError> {
    let resp = client.get(url).send().await?;
    let status = resp.status();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(GeocodeError::RateLimited);
    }

    // Error bodies are JSON too, but tolerate proxies returning HTML.
    let body = resp.json().await.unwrap_or(serde_json::Value::Null);
    Ok((status, body))
}

fn check_status(status: reqwest::StatusCode) -> Result<(), GeocodeError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(GeocodeError::Unavailable {
            provider: "postcodes.io".to_string(),
            reason: format!("HTTP {status}"),
        })
    }
}

fn error_message(body: &serde_json::Value) -> String {
    body["error"].as_str().unwrap_or_default().to_lowercase()
}

/// Parses a postcodes.io success body.
///
/// Returns `Ok(None)` when the result has no coordinates (postcodes.io
/// reports `null` lat/lng for some non-geographic postcodes).
pub(crate) fn parse_response(
    body: &serde_json::Value,
    quality: MatchQuality,
) -> Result<Option<GeocodedLocation>, GeocodeError> {
    let result = body.get("result").ok_or_else(|| GeocodeError::Parse {
        message: "postcodes.io response missing 'result'".to_string(),
    })?;

    let (Some(lat), Some(lng)) = (result["latitude"].as_f64(), result["longitude"].as_f64())
    else {
        return Ok(None);
    };

    let matched_name = result["postcode"]
        .as_str()
        .or_else(|| result["outcode"].as_str())
        .map(String::from);

    Ok(Some(GeocodedLocation {
        coordinates: Coordinates::new(lat, lng),
        matched_name,
        provider: GeocodingProvider::PostcodesIo,
        match_quality: quality,
    }))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Trimmed postcodes.io answer for `SW1A 1AA`.
    pub(crate) fn sw1a_1aa_body() -> serde_json::Value {
        serde_json::json!({
            "status": 200,
            "result": {
                "postcode": "SW1A 1AA",
                "outcode": "SW1A",
                "incode": "1AA",
                "latitude": 51.501009,
                "longitude": -0.141588,
                "admin_district": "Westminster",
                "country": "England"
            }
        })
    }

    #[test]
    fn parses_postcode_result() {
        let loc = parse_response(&sw1a_1aa_body(), MatchQuality::Exact)
            .unwrap()
            .unwrap();
        assert!((loc.coordinates.lat - 51.5010).abs() < 0.01);
        assert!((loc.coordinates.lng - -0.1416).abs() < 0.01);
        assert_eq!(loc.matched_name.as_deref(), Some("SW1A 1AA"));
        assert_eq!(loc.provider, GeocodingProvider::PostcodesIo);
    }

    #[test]
    fn parses_outcode_result() {
        let body = serde_json::json!({
            "status": 200,
            "result": { "outcode": "M1", "latitude": 53.4781, "longitude": -2.2337 }
        });
        let loc = parse_response(&body, MatchQuality::Approximate)
            .unwrap()
            .unwrap();
        assert_eq!(loc.matched_name.as_deref(), Some("M1"));
        assert_eq!(loc.match_quality, MatchQuality::Approximate);
    }

    #[test]
    fn null_coordinates_mean_no_match() {
        let body = serde_json::json!({
            "status": 200,
            "result": { "postcode": "GIR 0AA", "latitude": null, "longitude": null }
        });
        assert!(parse_response(&body, MatchQuality::Exact).unwrap().is_none());
    }

    #[test]
    fn missing_result_is_parse_error() {
        let body = serde_json::json!({ "status": 200 });
        assert!(matches!(
            parse_response(&body, MatchQuality::Exact),
            Err(GeocodeError::Parse { .. })
        ));
    }

    #[test]
    fn reads_error_message() {
        let body = serde_json::json!({ "status": 404, "error": "Invalid postcode" });
        assert_eq!(error_message(&body), "invalid postcode");
        assert_eq!(error_message(&serde_json::Value::Null), "");
    }
}
