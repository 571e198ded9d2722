//! Spatial query construction and execution.
//!
//! Calls the backend's nearby procedure (rows and count together). If the
//! procedure is not installed the builder quietly switches to a
//! bounding-box range query on the applications table and trims rows
//! outside the exact radius. The whole fetch races a timeout, and first
//! pages go through the [`ResultCache`].

use std::sync::Arc;
use std::time::Duration;

use planning_pulse_search_models::{Application, Coordinates, SearchFilters};
use serde::Deserialize;

use crate::SearchError;
use crate::backend::{BackendRows, BoxQuery, NearbyParams, SpatialBackend};
use crate::cache::ResultCache;

/// Smallest allowed row cap.
pub const MIN_ROW_CAP: usize = 100;

/// Largest allowed row cap.
pub const MAX_ROW_CAP: usize = 500;

/// Query limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Maximum rows per fetch, clamped to `100..=500`.
    pub row_cap: usize,
    /// Deadline for a whole fetch, in milliseconds.
    pub timeout_ms: u64,
    /// Also send `radius_meters` to the procedures.
    pub send_radius_meters: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            row_cap: MAX_ROW_CAP,
            timeout_ms: 20_000,
            send_radius_meters: false,
        }
    }
}

impl QueryConfig {
    /// Row cap clamped to the allowed range.
    #[must_use]
    pub fn effective_row_cap(&self) -> usize {
        self.row_cap.clamp(MIN_ROW_CAP, MAX_ROW_CAP)
    }
}

/// One spatial fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialQuery {
    /// Search centre.
    pub center: Coordinates,
    /// Radius in kilometres.
    pub radius_km: f64,
    /// Active filters.
    pub filters: SearchFilters,
    /// Zero-based backend page.
    pub page: usize,
    /// Rows per backend page, capped by the row cap.
    pub page_size: usize,
}

/// Result of a spatial fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutcome {
    /// Rows in backend order.
    pub applications: Vec<Application>,
    /// Total rows matching across all pages.
    pub total_count: usize,
    /// Whether the bounding-box fallback was used.
    pub used_fallback: bool,
    /// Whether the rows came from the result cache.
    pub from_cache: bool,
}

/// Runs [`SpatialQuery`]s against a backend.
pub struct SpatialQueryBuilder {
    backend: Arc<dyn SpatialBackend>,
    cache: Arc<ResultCache>,
    config: QueryConfig,
}

impl std::fmt::Debug for SpatialQueryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialQueryBuilder")
            .field("cache", &self.cache)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SpatialQueryBuilder {
    /// Creates a builder.
    #[must_use]
    pub fn new(
        backend: Arc<dyn SpatialBackend>,
        cache: Arc<ResultCache>,
        config: QueryConfig,
    ) -> Self {
        Self {
            backend,
            cache,
            config,
        }
    }

    /// The shared result cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// Executes `query`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::InvalidQuery`] for an invalid centre or
    /// radius, [`SearchError::Timeout`] when the deadline passes, and any
    /// backend error other than a missing procedure.
    pub async fn execute(&self, query: &SpatialQuery) -> Result<QueryOutcome, SearchError> {
        validate(query)?;

        let filters = query.filters.normalized();
        let page_size = query.page_size.clamp(1, self.config.effective_row_cap());

        if query.page == 0
            && let Some(entry) = self
                .cache
                .get(query.center, query.radius_km, page_size, &filters)
        {
            return Ok(QueryOutcome {
                applications: entry.data,
                total_count: entry.total_count,
                used_fallback: entry.used_fallback,
                from_cache: true,
            });
        }

        let after = Duration::from_millis(self.config.timeout_ms);
        let outcome = tokio::time::timeout(after, self.fetch(query, &filters, page_size))
            .await
            .map_err(|_| SearchError::Timeout { after })??;

        if query.page == 0 {
            self.cache.set(
                query.center,
                query.radius_km,
                page_size,
                &filters,
                outcome.applications.clone(),
                outcome.total_count,
                outcome.used_fallback,
            );
        }

        Ok(outcome)
    }

    async fn fetch(
        &self,
        query: &SpatialQuery,
        filters: &SearchFilters,
        page_size: usize,
    ) -> Result<QueryOutcome, SearchError> {
        let params = NearbyParams::new(
            query.center,
            query.radius_km,
            page_size,
            query.page,
            self.config.send_radius_meters,
        );

        let rpc = futures::try_join!(
            self.backend.nearby(&params),
            self.backend.nearby_count(&params)
        );

        match rpc {
            Ok((applications, total_count)) => {
                log::debug!(
                    "nearby procedure returned {} rows ({total_count} total)",
                    applications.len()
                );
                Ok(QueryOutcome {
                    total_count: total_count.max(applications.len()),
                    applications,
                    used_fallback: false,
                    from_cache: false,
                })
            }
            Err(SearchError::FunctionMissing { function, message }) => {
                log::info!("{function} unavailable ({message}), using bounding box query");
                self.fetch_box(query, filters, page_size).await
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch_box(
        &self,
        query: &SpatialQuery,
        filters: &SearchFilters,
        page_size: usize,
    ) -> Result<QueryOutcome, SearchError> {
        let box_query = BoxQuery {
            bbox: planning_pulse_spatial::bounding_box(query.center, query.radius_km),
            filters: filters.clone(),
            limit: page_size,
            offset: query.page.saturating_mul(page_size),
        };

        let BackendRows { rows, total_count } = self.backend.within_box(&box_query).await?;
        let fetched = rows.len();
        let applications = trim_to_radius(rows, query.center, query.radius_km);
        let removed = fetched - applications.len();

        log::debug!(
            "bounding box returned {fetched} rows, {removed} outside {} km",
            query.radius_km
        );

        let total_count = match total_count {
            Some(total) if total > fetched => total.saturating_sub(removed),
            _ => applications.len(),
        };

        Ok(QueryOutcome {
            applications,
            total_count,
            used_fallback: true,
            from_cache: false,
        })
    }
}

fn validate(query: &SpatialQuery) -> Result<(), SearchError> {
    if !query.center.is_valid() {
        return Err(SearchError::InvalidQuery {
            message: format!("invalid centre {}", query.center),
        });
    }
    if !(query.radius_km.is_finite() && query.radius_km > 0.0) {
        return Err(SearchError::InvalidQuery {
            message: format!("radius must be positive, got {}", query.radius_km),
        });
    }
    Ok(())
}

/// Keeps rows inside the exact Haversine circle.
fn trim_to_radius(
    rows: Vec<Application>,
    center: Coordinates,
    radius_km: f64,
) -> Vec<Application> {
    rows.into_iter()
        .filter(|app| {
            app.coordinates()
                .is_some_and(|point| planning_pulse_spatial::within_radius(center, point, radius_km))
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;

    pub(crate) const LONDON: Coordinates = Coordinates::new(51.5074, -0.1278);

    pub(crate) fn app_at(id: i64, lat: f64, lng: f64) -> Application {
        Application {
            id,
            latitude: Some(lat),
            longitude: Some(lng),
            ..Application::default()
        }
    }

    /// In-memory backend. `rpc_installed = false` answers every procedure
    /// call with a missing-function error.
    #[derive(Default)]
    pub(crate) struct FakeBackend {
        pub(crate) rows: Vec<Application>,
        pub(crate) rpc_installed: bool,
        pub(crate) delay: Option<Duration>,
        pub(crate) fail_with_status: Option<u16>,
        pub(crate) rpc_calls: AtomicU32,
        pub(crate) box_calls: AtomicU32,
        pub(crate) last_box: Mutex<Option<BoxQuery>>,
    }

    impl FakeBackend {
        pub(crate) fn with_rpc(rows: Vec<Application>) -> Self {
            Self {
                rows,
                rpc_installed: true,
                ..Self::default()
            }
        }

        pub(crate) fn without_rpc(rows: Vec<Application>) -> Self {
            Self {
                rows,
                ..Self::default()
            }
        }

        async fn pause(&self) -> Result<(), SearchError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(status) = self.fail_with_status {
                return Err(SearchError::Backend {
                    status,
                    code: None,
                    message: "boom".to_string(),
                });
            }
            Ok(())
        }

        fn missing(&self) -> Result<(), SearchError> {
            if self.rpc_installed {
                Ok(())
            } else {
                Err(SearchError::FunctionMissing {
                    function: "get_nearby_applications".to_string(),
                    message: "Could not find the function".to_string(),
                })
            }
        }
    }

    #[async_trait]
    impl SpatialBackend for FakeBackend {
        async fn nearby(&self, params: &NearbyParams) -> Result<Vec<Application>, SearchError> {
            self.rpc_calls.fetch_add(1, Ordering::SeqCst);
            self.pause().await?;
            self.missing()?;
            let center = Coordinates::new(params.center_lat, params.center_lng);
            Ok(trim_to_radius(self.rows.clone(), center, params.radius_km)
                .into_iter()
                .skip(params.page_number * params.page_size)
                .take(params.page_size)
                .collect())
        }

        async fn nearby_count(&self, params: &NearbyParams) -> Result<usize, SearchError> {
            self.pause().await?;
            self.missing()?;
            let center = Coordinates::new(params.center_lat, params.center_lng);
            Ok(trim_to_radius(self.rows.clone(), center, params.radius_km).len())
        }

        async fn within_box(&self, query: &BoxQuery) -> Result<BackendRows, SearchError> {
            self.box_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_box.lock().unwrap() = Some(query.clone());
            let inside: Vec<Application> = self
                .rows
                .iter()
                .filter(|app| {
                    app.coordinates()
                        .is_some_and(|p| planning_pulse_spatial::bbox_contains(&query.bbox, p))
                })
                .cloned()
                .collect();
            Ok(BackendRows {
                total_count: Some(inside.len()),
                rows: inside
                    .into_iter()
                    .skip(query.offset)
                    .take(query.limit)
                    .collect(),
            })
        }
    }

    fn builder(backend: FakeBackend) -> (SpatialQueryBuilder, Arc<FakeBackend>) {
        let backend = Arc::new(backend);
        let builder = SpatialQueryBuilder::new(
            backend.clone(),
            Arc::new(ResultCache::default()),
            QueryConfig::default(),
        );
        (builder, backend)
    }

    fn query(radius_km: f64) -> SpatialQuery {
        SpatialQuery {
            center: LONDON,
            radius_km,
            filters: SearchFilters::default(),
            page: 0,
            page_size: 500,
        }
    }

    #[tokio::test]
    async fn uses_nearby_procedure_when_installed() {
        let (builder, backend) = builder(FakeBackend::with_rpc(vec![
            app_at(1, 51.5080, -0.1280),
            app_at(2, 53.4084, -2.9916),
        ]));

        let outcome = builder.execute(&query(5.0)).await.unwrap();
        assert_eq!(outcome.applications.len(), 1);
        assert_eq!(outcome.total_count, 1);
        assert!(!outcome.used_fallback);
        assert_eq!(backend.box_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn falls_back_to_bounding_box_and_trims_corners() {
        // Inside the box but outside the circle: the north-east corner.
        let corner = app_at(3, 51.5074 + 0.044, -0.1278 + 0.07);
        let (builder, backend) = builder(FakeBackend::without_rpc(vec![
            app_at(1, 51.5080, -0.1280),
            corner,
            app_at(2, 53.4084, -2.9916),
        ]));

        let outcome = builder.execute(&query(5.0)).await.unwrap();
        assert!(outcome.used_fallback);
        assert_eq!(
            outcome.applications.iter().map(|a| a.id).collect::<Vec<_>>(),
            vec![1]
        );
        assert_eq!(outcome.total_count, 1);
        assert_eq!(backend.box_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn caches_first_page_only() {
        let (builder, backend) = builder(FakeBackend::with_rpc(vec![app_at(1, 51.5080, -0.1280)]));

        builder.execute(&query(5.0)).await.unwrap();
        let again = builder.execute(&query(5.0)).await.unwrap();
        assert!(again.from_cache);
        assert_eq!(backend.rpc_calls.load(Ordering::SeqCst), 1);

        let second_page = SpatialQuery {
            page: 1,
            ..query(5.0)
        };
        let outcome = builder.execute(&second_page).await.unwrap();
        assert!(!outcome.from_cache);
        assert_eq!(builder.cache().len(), 1);
    }

    #[tokio::test]
    async fn larger_page_size_is_not_served_a_smaller_cached_page() {
        let rows: Vec<Application> = (0_i32..20)
            .map(|i| app_at(i64::from(i), 51.5074 + f64::from(i) * 0.0005, -0.1278))
            .collect();
        let (builder, backend) = builder(FakeBackend::with_rpc(rows));

        let small = SpatialQuery {
            page_size: 5,
            ..query(5.0)
        };
        assert_eq!(builder.execute(&small).await.unwrap().applications.len(), 5);

        let full = builder.execute(&query(5.0)).await.unwrap();
        assert!(!full.from_cache);
        assert_eq!(full.applications.len(), 20);
        assert_eq!(backend.rpc_calls.load(Ordering::SeqCst), 2);

        let again = builder.execute(&small).await.unwrap();
        assert!(again.from_cache);
        assert_eq!(again.applications.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_backend_times_out() {
        let backend = FakeBackend {
            delay: Some(Duration::from_secs(60)),
            ..FakeBackend::with_rpc(Vec::new())
        };
        let (builder, _backend) = builder(backend);

        let err = builder.execute(&query(5.0)).await.unwrap_err();
        assert!(matches!(err, SearchError::Timeout { .. }));
        assert!(builder.cache().is_empty());
    }

    #[tokio::test]
    async fn other_backend_errors_are_not_absorbed() {
        let backend = FakeBackend {
            fail_with_status: Some(503),
            ..FakeBackend::with_rpc(Vec::new())
        };
        let (builder, backend) = builder(backend);

        let err = builder.execute(&query(5.0)).await.unwrap_err();
        assert!(matches!(err, SearchError::Backend { status: 503, .. }));
        assert_eq!(backend.box_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejects_bad_radius_and_centre() {
        let (builder, _backend) = builder(FakeBackend::with_rpc(Vec::new()));
        assert!(matches!(
            builder.execute(&query(0.0)).await,
            Err(SearchError::InvalidQuery { .. })
        ));

        let off_planet = SpatialQuery {
            center: Coordinates::new(123.0, 0.0),
            ..query(5.0)
        };
        assert!(matches!(
            builder.execute(&off_planet).await,
            Err(SearchError::InvalidQuery { .. })
        ));
    }

    #[tokio::test]
    async fn box_query_is_capped_and_filtered() {
        let (builder, backend) = builder(FakeBackend::without_rpc(Vec::new()));
        let mut q = query(5.0);
        q.page_size = 10_000;
        q.filters.status = Some("all".to_string());
        q.filters.application_type = Some("Householder".to_string());
        builder.execute(&q).await.unwrap();

        let sent = backend.last_box.lock().unwrap().clone().unwrap();
        assert_eq!(sent.limit, MAX_ROW_CAP);
        assert_eq!(sent.filters.status, None);
        assert_eq!(sent.filters.application_type.as_deref(), Some("Householder"));
    }

    #[test]
    fn row_cap_is_clamped() {
        let low = QueryConfig {
            row_cap: 5,
            ..QueryConfig::default()
        };
        let high = QueryConfig {
            row_cap: 5_000,
            ..QueryConfig::default()
        };
        assert_eq!(low.effective_row_cap(), MIN_ROW_CAP);
        assert_eq!(high.effective_row_cap(), MAX_ROW_CAP);
    }
}
