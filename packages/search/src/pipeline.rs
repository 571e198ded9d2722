//! The end-to-end search: resolve → query → score → filter/sort/paginate.

use std::sync::Arc;
use std::time::Instant;

use planning_pulse_geocoder::cache::CoordinateCache;
use planning_pulse_geocoder::resolver::{self, CoordinateResolver};
use planning_pulse_search_models::{
    Application, Coordinates, Page, SearchFilters, SortOrder, TermKind, clock::system_clock,
};
use serde::Serialize;

use crate::backend::{SupabaseBackend, SupabaseClient};
use crate::cache::ResultCache;
use crate::config::{PipelineConfig, SupabaseSettings};
use crate::failure::{FailureDisposition, FailureReport, classify_failure};
use crate::paginate::apply;
use crate::query::{SpatialQuery, SpatialQueryBuilder};
use crate::session::SearchSession;
use crate::telemetry::{SearchEvent, SearchTelemetry, telemetry_for};
use crate::SearchError;

/// A search as entered by the user.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    /// Postcode, outcode, place name or place id.
    pub term: String,
    /// Radius in kilometres; the configured default when `None`.
    pub radius_km: Option<f64>,
    /// Active filters.
    pub filters: SearchFilters,
    /// Sort order; `None` keeps the relevance/distance ranking.
    pub sort: Option<SortOrder>,
    /// Zero-based page.
    pub page: usize,
    /// Results per page; the configured default when `None`.
    pub page_size: Option<usize>,
}

impl SearchRequest {
    /// A first-page request for `term` with defaults for everything else.
    #[must_use]
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            radius_km: None,
            filters: SearchFilters::default(),
            sort: None,
            page: 0,
            page_size: None,
        }
    }
}

/// A page of ranked results.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    /// Normalized search term.
    pub term: String,
    /// How the term was classified.
    pub term_kind: TermKind,
    /// Search centre.
    pub coordinates: Coordinates,
    /// How the centre was found.
    pub location_source: String,
    /// Radius searched.
    pub radius_km: f64,
    /// The requested page.
    pub page: Page<Application>,
    /// Rows the backend reported inside the radius before client filters.
    pub backend_total: usize,
    /// Whether the bounding-box fallback was used.
    pub used_fallback: bool,
    /// Whether the rows came from the result cache.
    pub from_cache: bool,
}

/// What a caller holding a [`SearchSession`] should do with a result.
#[derive(Debug)]
pub enum SearchOutcome {
    /// Show these results.
    Delivered(Box<SearchResponse>),
    /// A newer search replaced this one; discard.
    Stale,
    /// The search failed.
    Failed {
        /// How to present the failure.
        report: FailureReport,
        /// The underlying error.
        error: SearchError,
    },
}

/// Runs searches.
pub struct SearchPipeline {
    resolver: Arc<CoordinateResolver>,
    query: SpatialQueryBuilder,
    telemetry: Arc<dyn SearchTelemetry>,
    config: PipelineConfig,
}

impl std::fmt::Debug for SearchPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchPipeline")
            .field("resolver", &self.resolver)
            .field("query", &self.query)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SearchPipeline {
    /// Assembles a pipeline from its parts.
    #[must_use]
    pub fn new(
        resolver: Arc<CoordinateResolver>,
        query: SpatialQueryBuilder,
        telemetry: Arc<dyn SearchTelemetry>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            resolver,
            query,
            telemetry,
            config,
        }
    }

    /// Builds a pipeline against the Supabase project named in the
    /// environment, with geocoders from the service registry.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if `SUPABASE_URL` or
    /// `SUPABASE_ANON_KEY` is missing, and [`SearchError::Geocode`] if the
    /// HTTP client cannot be built.
    pub fn from_env(config: PipelineConfig) -> Result<Self, SearchError> {
        let settings = SupabaseSettings::from_env()?;
        let http = resolver::http_client()?;
        let supabase = SupabaseClient::new(http.clone(), &settings);

        let clock = system_clock();
        let coordinate_cache = Arc::new(CoordinateCache::new(config.coordinate_cache, clock.clone()));
        let result_cache = Arc::new(ResultCache::new(config.cache, clock));

        let resolver = Arc::new(CoordinateResolver::from_services(
            &http,
            coordinate_cache,
            config.resolver.clone(),
        ));
        log::info!("Geocoders: {}", resolver.strategy_names().join(", "));

        let backend = Arc::new(SupabaseBackend::new(supabase.clone(), config.backend.clone()));
        let query = SpatialQueryBuilder::new(backend, result_cache, config.query);

        let telemetry =
            telemetry_for(config.telemetry, &supabase, &config.backend.search_log_table);

        Ok(Self::new(resolver, query, telemetry, config))
    }

    /// The coordinate resolver.
    #[must_use]
    pub fn resolver(&self) -> &CoordinateResolver {
        &self.resolver
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs one search.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Geocode`] when the term cannot be resolved,
    /// and any query error that the fallback does not absorb.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError> {
        let started = Instant::now();
        let radius_km = request.radius_km.unwrap_or(self.config.default_radius_km);

        self.telemetry.record(SearchEvent::Started {
            term: request.term.clone(),
            radius_km,
        });

        let result = self.execute(request, radius_km).await;

        match &result {
            Ok(response) => {
                log::info!(
                    "'{}': {} results near {} ({})",
                    response.term,
                    response.page.total_count,
                    response.coordinates,
                    response.location_source
                );
                self.telemetry.record(SearchEvent::Completed {
                    term: request.term.clone(),
                    result_count: response.page.total_count,
                    duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    used_fallback: response.used_fallback,
                });
            }
            Err(e) => {
                self.telemetry.record(SearchEvent::Failed {
                    term: request.term.clone(),
                    kind: e.kind(),
                    message: e.to_string(),
                });
            }
        }

        result
    }

    async fn execute(
        &self,
        request: &SearchRequest,
        radius_km: f64,
    ) -> Result<SearchResponse, SearchError> {
        let resolution = self.resolver.resolve_detailed(&request.term).await?;
        let center = resolution.coordinates;
        let filters = request.filters.normalized();

        let outcome = self
            .query
            .execute(&SpatialQuery {
                center,
                radius_km,
                filters: filters.clone(),
                page: 0,
                page_size: self.config.query.effective_row_cap(),
            })
            .await?;

        let scored = planning_pulse_spatial::score::score(&outcome.applications, center);
        let page_size = request.page_size.unwrap_or(self.config.page_size);
        let page = apply(&scored, &filters, request.sort, request.page, page_size);

        Ok(SearchResponse {
            term: resolution.term.normalized,
            term_kind: resolution.term.kind,
            coordinates: center,
            location_source: resolution.source.to_string(),
            radius_km,
            page,
            backend_total: outcome.total_count,
            used_fallback: outcome.used_fallback,
            from_cache: outcome.from_cache,
        })
    }

    /// Runs a search within `session`, dropping it if superseded and
    /// classifying any failure for display.
    pub async fn run(&self, session: &SearchSession, request: &SearchRequest) -> SearchOutcome {
        let ticket = session.begin(&request.term);
        let result = self.search(request).await;

        if !session.is_current(&ticket) {
            log::debug!(
                "Discarding results for '{}' (search #{}): superseded",
                ticket.term(),
                ticket.generation()
            );
            return SearchOutcome::Stale;
        }

        match result {
            Ok(response) => {
                session.mark_delivered(&ticket);
                SearchOutcome::Delivered(Box::new(response))
            }
            Err(error) => {
                let report = classify_failure(error.kind(), session.has_results(&ticket));
                if report.disposition == FailureDisposition::Silent {
                    log::debug!("'{}': suppressed error: {error}", ticket.term());
                } else {
                    log::warn!("'{}': search failed: {error}", ticket.term());
                }
                SearchOutcome::Failed { report, error }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use planning_pulse_geocoder::resolver::{GeocodeStrategy, ResolverConfig};
    use planning_pulse_geocoder::retry::RetryPolicy;
    use planning_pulse_geocoder::{
        GeocodeError, GeocodedLocation, GeocodingProvider, MatchQuality, SearchTerm,
    };
    use planning_pulse_search_models::Distance;

    use super::*;
    use crate::query::QueryConfig;
    use crate::query::tests::{FakeBackend, LONDON, app_at};
    use crate::telemetry::tests::RecordingTelemetry;

    /// Geocodes every place name to central London after `delay`, and
    /// rejects every postcode.
    struct LondonOnly {
        delay: Duration,
    }

    #[async_trait]
    impl GeocodeStrategy for LondonOnly {
        fn name(&self) -> &str {
            "london_only"
        }

        fn accepts(&self, _kind: TermKind) -> bool {
            true
        }

        async fn lookup(&self, term: &SearchTerm) -> Result<GeocodedLocation, GeocodeError> {
            tokio::time::sleep(self.delay).await;
            if term.kind == TermKind::Postcode {
                return Err(GeocodeError::InvalidPostcode {
                    postcode: term.normalized.clone(),
                });
            }
            Ok(GeocodedLocation {
                coordinates: LONDON,
                matched_name: Some("London".to_string()),
                provider: GeocodingProvider::Nominatim,
                match_quality: MatchQuality::Approximate,
            })
        }
    }

    fn pipeline(
        backend: FakeBackend,
        delay: Duration,
    ) -> (SearchPipeline, Arc<RecordingTelemetry>) {
        let resolver = CoordinateResolver::new(
            vec![Box::new(LondonOnly { delay })],
            Arc::new(CoordinateCache::default()),
            ResolverConfig {
                retry: RetryPolicy::no_retry(),
                ..ResolverConfig::default()
            },
        );
        let query = SpatialQueryBuilder::new(
            Arc::new(backend),
            Arc::new(ResultCache::default()),
            QueryConfig::default(),
        );
        let telemetry = Arc::new(RecordingTelemetry::default());
        let pipeline = SearchPipeline::new(
            Arc::new(resolver),
            query,
            telemetry.clone(),
            PipelineConfig::default(),
        );
        (pipeline, telemetry)
    }

    fn rows() -> Vec<Application> {
        let mut near = app_at(1, 51.5080, -0.1280);
        near.status = Some("Approved".to_string());
        let mut further = app_at(2, 51.5200, -0.1000);
        further.status = Some("Under consideration".to_string());
        let mut relevant = app_at(3, 51.5300, -0.1500);
        relevant.status = Some("Approved".to_string());
        relevant.relevance_score = Some(0.9);
        let far_away = app_at(4, 53.4084, -2.9916);
        vec![near, further, relevant, far_away]
    }

    #[tokio::test]
    async fn resolves_queries_scores_and_pages() {
        let (pipeline, telemetry) = pipeline(FakeBackend::without_rpc(rows()), Duration::ZERO);

        let mut request = SearchRequest::new("Camden Town");
        request.filters.status = Some("Approved".to_string());
        let response = pipeline.search(&request).await.unwrap();

        assert!(response.used_fallback);
        assert_eq!(response.term_kind, TermKind::PlaceName);
        assert_eq!(response.backend_total, 3);
        assert_eq!(response.page.total_count, 2);
        let ids: Vec<i64> = response.page.items.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![3, 1]);
        assert!(matches!(response.page.items[1].distance, Some(Distance::Km(d)) if d < 0.1));

        let events = telemetry.events.lock().unwrap();
        assert!(matches!(events[0], SearchEvent::Started { .. }));
        assert!(matches!(
            events[1],
            SearchEvent::Completed { result_count: 2, used_fallback: true, .. }
        ));
    }

    #[tokio::test]
    async fn explicit_sort_and_page_size() {
        let (pipeline, _telemetry) = pipeline(FakeBackend::with_rpc(rows()), Duration::ZERO);

        let mut request = SearchRequest::new("Camden Town");
        request.sort = Some(SortOrder::Distance);
        request.page_size = Some(2);
        request.page = 1;
        let response = pipeline.search(&request).await.unwrap();

        assert!(!response.used_fallback);
        assert_eq!(response.page.total_count, 3);
        assert_eq!(response.page.total_pages, 2);
        let ids: Vec<i64> = response.page.items.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![3]);
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_search_is_stale() {
        let (pipeline, _telemetry) = pipeline(FakeBackend::with_rpc(rows()), Duration::from_millis(100));
        let session = SearchSession::new();

        let request = SearchRequest::new("Leeds");
        let (outcome, ()) = tokio::join!(pipeline.run(&session, &request), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            session.begin("York");
        });

        assert!(matches!(outcome, SearchOutcome::Stale));
    }

    #[tokio::test]
    async fn invalid_postcode_is_actionable() {
        let (pipeline, telemetry) = pipeline(FakeBackend::with_rpc(rows()), Duration::ZERO);
        let session = SearchSession::new();

        let outcome = pipeline.run(&session, &SearchRequest::new("ZZ99 9ZZ")).await;
        let SearchOutcome::Failed { report, error } = outcome else {
            panic!("expected failure");
        };
        assert_eq!(report.disposition, FailureDisposition::Actionable);
        assert!(matches!(error, SearchError::Geocode(_)));

        let events = telemetry.events.lock().unwrap();
        assert!(matches!(events.last(), Some(SearchEvent::Failed { .. })));
    }

    #[tokio::test]
    async fn network_error_is_silent_when_results_are_showing() {
        let backend = FakeBackend {
            fail_with_status: Some(503),
            ..FakeBackend::with_rpc(rows())
        };
        let (pipeline, _telemetry) = pipeline(backend, Duration::ZERO);
        let session = SearchSession::new();

        let first = session.begin("Leeds");
        session.mark_delivered(&first);

        let outcome = pipeline.run(&session, &SearchRequest::new("Leeds")).await;
        let SearchOutcome::Failed { report, .. } = outcome else {
            panic!("expected failure");
        };
        assert_eq!(report.disposition, FailureDisposition::Silent);

        let outcome = pipeline.run(&session, &SearchRequest::new("York")).await;
        let SearchOutcome::Failed { report, .. } = outcome else {
            panic!("expected failure");
        };
        assert_eq!(report.disposition, FailureDisposition::Retryable);
    }

    #[tokio::test]
    async fn delivered_results_are_marked() {
        let (pipeline, _telemetry) = pipeline(FakeBackend::with_rpc(rows()), Duration::ZERO);
        let session = SearchSession::new();

        let outcome = pipeline.run(&session, &SearchRequest::new("Leeds")).await;
        assert!(matches!(outcome, SearchOutcome::Delivered(_)));
        assert!(session.has_results(&session.begin("Leeds")));
    }
}
