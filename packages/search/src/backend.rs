//! Spatial backend abstraction and the Supabase (`PostgREST`) client.
//!
//! The backend exposes two remote procedures:
//!
//! - `get_nearby_applications(center_lat, center_lng, radius_km,
//!   page_size, page_number)` returning application rows ordered by
//!   distance
//! - `get_nearby_applications_count(center_lat, center_lng, radius_km)`
//!   returning the number of rows in the circle
//!
//! and a plain `applications` table used for the bounding-box fallback
//! when the procedures are not installed.

use async_trait::async_trait;
use planning_pulse_search_models::{Application, BoundingBox, Coordinates, SearchFilters, StatusBucket};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::SearchError;
use crate::config::SupabaseSettings;

/// Procedure and table names.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Row-returning spatial procedure.
    pub nearby_function: String,
    /// Count procedure paired with `nearby_function`.
    pub count_function: String,
    /// Table queried by the bounding-box fallback.
    pub table: String,
    /// Table that receives search telemetry.
    pub search_log_table: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            nearby_function: "get_nearby_applications".to_string(),
            count_function: "get_nearby_applications_count".to_string(),
            table: "applications".to_string(),
            search_log_table: "search_logs".to_string(),
        }
    }
}

/// Arguments to the nearby procedures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearbyParams {
    /// Centre latitude.
    pub center_lat: f64,
    /// Centre longitude.
    pub center_lng: f64,
    /// Radius in kilometres.
    pub radius_km: f64,
    /// Radius in metres, for procedures that take it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radius_meters: Option<f64>,
    /// Rows per page.
    pub page_size: usize,
    /// Zero-based page.
    pub page_number: usize,
}

impl NearbyParams {
    /// Builds procedure arguments.
    #[must_use]
    pub fn new(
        center: Coordinates,
        radius_km: f64,
        page_size: usize,
        page_number: usize,
        send_radius_meters: bool,
    ) -> Self {
        Self {
            center_lat: center.lat,
            center_lng: center.lng,
            radius_km,
            radius_meters: send_radius_meters.then_some(radius_km * 1000.0),
            page_size,
            page_number,
        }
    }
}

/// A bounding-box table query.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxQuery {
    /// Area to fetch.
    pub bbox: BoundingBox,
    /// Filters applied as case-insensitive substring matches.
    pub filters: SearchFilters,
    /// Maximum rows.
    pub limit: usize,
    /// Rows to skip.
    pub offset: usize,
}

/// Rows plus the backend's total, when it reported one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendRows {
    /// Decoded rows.
    pub rows: Vec<Application>,
    /// Total rows matching the query across all pages.
    pub total_count: Option<usize>,
}

/// Where application rows come from.
#[async_trait]
pub trait SpatialBackend: Send + Sync {
    /// Calls the nearby procedure.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::FunctionMissing`] when the procedure is not
    /// installed, and transport or backend errors otherwise.
    async fn nearby(&self, params: &NearbyParams) -> Result<Vec<Application>, SearchError>;

    /// Calls the count procedure.
    ///
    /// # Errors
    ///
    /// As [`Self::nearby`].
    async fn nearby_count(&self, params: &NearbyParams) -> Result<usize, SearchError>;

    /// Runs a bounding-box range query on the applications table.
    ///
    /// # Errors
    ///
    /// Returns transport or backend errors.
    async fn within_box(&self, query: &BoxQuery) -> Result<BackendRows, SearchError>;
}

/// Whether a backend error means the procedure does not exist.
///
/// Matches `PostgREST`'s `PGRST202` ("could not find the function"),
/// Postgres `42883` (undefined function) and the corresponding messages.
#[must_use]
pub fn is_function_missing(code: Option<&str>, message: &str) -> bool {
    if matches!(code, Some("PGRST202" | "42883")) {
        return true;
    }
    let message = message.to_lowercase();
    message.contains("could not find the function")
        || (message.contains("function") && message.contains("does not exist"))
}

/// Thin `PostgREST` client for a Supabase project.
#[derive(Debug, Clone)]
pub struct SupabaseClient {
    client: reqwest::Client,
    rest_url: String,
    anon_key: String,
}

impl SupabaseClient {
    /// Creates a client for the project in `settings`.
    #[must_use]
    pub fn new(client: reqwest::Client, settings: &SupabaseSettings) -> Self {
        Self {
            client,
            rest_url: format!("{}/rest/v1", settings.url.trim_end_matches('/')),
            anon_key: settings.anon_key.clone(),
        }
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.anon_key)
    }

    /// `POST /rest/v1/rpc/{function}`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::FunctionMissing`] for a missing procedure,
    /// [`SearchError::Backend`] for other error statuses, and transport
    /// errors.
    pub async fn rpc<T: Serialize + Sync>(
        &self,
        function: &str,
        args: &T,
    ) -> Result<Value, SearchError> {
        let url = format!("{}/rpc/{function}", self.rest_url);
        let resp = self.authorized(self.client.post(&url)).json(args).send().await?;
        let resp = check_response(resp, Some(function)).await?;
        Ok(resp.json().await?)
    }

    /// `GET /rest/v1/{table}` with `Prefer: count=exact`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Backend`] for error statuses and transport
    /// errors.
    pub async fn select(
        &self,
        table: &str,
        params: &[(String, String)],
    ) -> Result<(Value, Option<usize>), SearchError> {
        let url = format!("{}/{table}", self.rest_url);
        let resp = self
            .authorized(self.client.get(&url))
            .header("Prefer", "count=exact")
            .query(params)
            .send()
            .await?;
        let resp = check_response(resp, None).await?;

        let total = resp
            .headers()
            .get(reqwest::header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total);

        Ok((resp.json().await?, total))
    }

    /// `POST /rest/v1/{table}` with `Prefer: return=minimal`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Backend`] for error statuses and transport
    /// errors.
    pub async fn insert<T: Serialize + Sync>(&self, table: &str, row: &T) -> Result<(), SearchError> {
        let url = format!("{}/{table}", self.rest_url);
        let resp = self
            .authorized(self.client.post(&url))
            .header("Prefer", "return=minimal")
            .json(row)
            .send()
            .await?;
        check_response(resp, None).await?;
        Ok(())
    }
}

/// Turns a non-success response into a typed error.
async fn check_response(
    resp: reqwest::Response,
    function: Option<&str>,
) -> Result<reqwest::Response, SearchError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body: Value = resp.json().await.unwrap_or(Value::Null);
    let code = body["code"].as_str().map(String::from);
    let message = body["message"]
        .as_str()
        .map_or_else(|| format!("HTTP {status}"), String::from);

    if let Some(function) = function
        && is_function_missing(code.as_deref(), &message)
    {
        return Err(SearchError::FunctionMissing {
            function: function.to_string(),
            message,
        });
    }

    Err(SearchError::Backend {
        status: status.as_u16(),
        code,
        message,
    })
}

/// Reads the total from `Content-Range: 0-24/3573` (or `*/0`).
fn parse_content_range_total(header: &str) -> Option<usize> {
    header.rsplit_once('/')?.1.trim().parse().ok()
}

/// Decodes a JSON array of rows, skipping rows that do not decode.
///
/// # Errors
///
/// Returns [`SearchError::InvalidQuery`] if `body` is not an array.
pub fn decode_rows(body: Value) -> Result<Vec<Application>, SearchError> {
    let Value::Array(items) = body else {
        return Err(SearchError::InvalidQuery {
            message: "expected a JSON array of rows".to_string(),
        });
    };

    let total = items.len();
    let rows: Vec<Application> = items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(app) => Some(app),
            Err(e) => {
                log::warn!("Skipping undecodable application row: {e}");
                None
            }
        })
        .collect();

    if rows.len() < total {
        log::warn!("{} of {total} rows could not be decoded", total - rows.len());
    }
    Ok(rows)
}

/// Reads the count procedure's answer (a bare number or `[{"count": n}]`).
fn decode_count(body: &Value) -> Option<usize> {
    let value = match body {
        Value::Array(items) => items.first().and_then(|first| {
            first
                .as_object()
                .and_then(|obj| obj.values().next())
                .or(Some(first))
        })?,
        other => other,
    };
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
        .and_then(|n| usize::try_from(n).ok())
}

/// Strips characters with meaning in `PostgREST` filter syntax.
fn ilike_pattern(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .filter(|c| !matches!(c, '*' | '%' | ',' | '(' | ')' | '"'))
        .collect();
    format!("*{}*", cleaned.trim())
}

/// Query-string filters for a bounding-box fetch.
#[must_use]
pub fn box_query_params(query: &BoxQuery) -> Vec<(String, String)> {
    let bbox = &query.bbox;
    let mut params = vec![
        ("select".to_string(), "*".to_string()),
        ("latitude".to_string(), format!("gte.{}", bbox.south)),
        ("latitude".to_string(), format!("lte.{}", bbox.north)),
        ("longitude".to_string(), format!("gte.{}", bbox.west)),
        ("longitude".to_string(), format!("lte.{}", bbox.east)),
    ];

    let filters = query.filters.normalized();

    if let Some(status) = &filters.status {
        match status.parse::<StatusBucket>() {
            Ok(StatusBucket::Other) => {}
            Ok(bucket) => {
                let alternatives: Vec<String> = bucket
                    .keywords()
                    .iter()
                    .map(|k| format!("status.ilike.{}", ilike_pattern(k)))
                    .collect();
                params.push(("or".to_string(), format!("({})", alternatives.join(","))));
            }
            Err(_) => {
                params.push((
                    "status".to_string(),
                    format!("ilike.{}", ilike_pattern(status)),
                ));
            }
        }
    }

    if let Some(kind) = &filters.application_type {
        params.push(("type".to_string(), format!("ilike.{}", ilike_pattern(kind))));
    }

    if let Some(classification) = &filters.classification
        && !classification.eq_ignore_ascii_case("other")
    {
        params.push((
            "classification".to_string(),
            format!("ilike.{}", ilike_pattern(classification)),
        ));
    }

    params.push(("limit".to_string(), query.limit.to_string()));
    if query.offset > 0 {
        params.push(("offset".to_string(), query.offset.to_string()));
    }
    params
}

/// [`SpatialBackend`] backed by a Supabase project.
#[derive(Debug, Clone)]
pub struct SupabaseBackend {
    client: SupabaseClient,
    config: BackendConfig,
}

impl SupabaseBackend {
    /// Creates the backend.
    #[must_use]
    pub const fn new(client: SupabaseClient, config: BackendConfig) -> Self {
        Self { client, config }
    }
}

/// Count procedures take only the centre and radius.
#[derive(Serialize)]
struct CountArgs {
    center_lat: f64,
    center_lng: f64,
    radius_km: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    radius_meters: Option<f64>,
}

#[async_trait]
impl SpatialBackend for SupabaseBackend {
    async fn nearby(&self, params: &NearbyParams) -> Result<Vec<Application>, SearchError> {
        let body = self.client.rpc(&self.config.nearby_function, params).await?;
        decode_rows(body)
    }

    async fn nearby_count(&self, params: &NearbyParams) -> Result<usize, SearchError> {
        let args = CountArgs {
            center_lat: params.center_lat,
            center_lng: params.center_lng,
            radius_km: params.radius_km,
            radius_meters: params.radius_meters,
        };
        let body = self.client.rpc(&self.config.count_function, &args).await?;
        decode_count(&body).ok_or_else(|| SearchError::InvalidQuery {
            message: format!("unexpected count response: {body}"),
        })
    }

    async fn within_box(&self, query: &BoxQuery) -> Result<BackendRows, SearchError> {
        let (body, total_count) = self
            .client
            .select(&self.config.table, &box_query_params(query))
            .await?;
        Ok(BackendRows {
            rows: decode_rows(body)?,
            total_count,
        })
    }
}
