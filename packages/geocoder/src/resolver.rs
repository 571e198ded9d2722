//! Turns a search term into coordinates.
//!
//! Resolution order:
//!
//! 1. The shared [`CoordinateCache`] (normalized key, then lowercase key).
//! 2. Pinned locations from configuration.
//! 3. Each [`GeocodeStrategy`] that accepts the term's kind, in order, under
//!    a per-call timeout and exponential backoff retry.
//! 4. For place names, one more pass with a simplified name.
//! 5. The offline UK city table, then the configured fallback city.
//!
//! A definitive "invalid postcode/outcode" answer stops the chain and is
//! returned as an error rather than being papered over by the city table.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use planning_pulse_search_models::{Coordinates, ErrorKind, TermKind};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::cache::CoordinateCache;
use crate::google::{self, GoogleQuery};
use crate::retry::{self, RetryPolicy};
use crate::service_registry::{self, ProviderConfig};
use crate::term::{self, SearchTerm};
use crate::{GeocodeError, GeocodedLocation, StrategyFailure, nominatim, postcodes_io, uk_places};

/// User agent sent to every geocoding provider.
pub const USER_AGENT: &str = concat!("planning-pulse/", env!("CARGO_PKG_VERSION"));

/// One way of geocoding a term.
#[async_trait]
pub trait GeocodeStrategy: Send + Sync {
    /// Short identifier used in logs and composite errors.
    fn name(&self) -> &str;

    /// Whether this strategy can handle terms of `kind`.
    fn accepts(&self, kind: TermKind) -> bool;

    /// Looks up `term`.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::NotFound`] when the provider has no match and
    /// any transport or provider error otherwise.
    async fn lookup(&self, term: &SearchTerm) -> Result<GeocodedLocation, GeocodeError>;
}

/// postcodes.io for full postcodes and outcodes.
#[derive(Debug, Clone)]
pub struct PostcodesIoStrategy {
    client: reqwest::Client,
    base_url: String,
}

impl PostcodesIoStrategy {
    /// Creates the strategy against `base_url`.
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl GeocodeStrategy for PostcodesIoStrategy {
    fn name(&self) -> &str {
        "postcodes_io"
    }

    fn accepts(&self, kind: TermKind) -> bool {
        matches!(kind, TermKind::Postcode | TermKind::Outcode)
    }

    async fn lookup(&self, term: &SearchTerm) -> Result<GeocodedLocation, GeocodeError> {
        match term.kind {
            TermKind::Outcode => {
                postcodes_io::lookup_outcode(&self.client, &self.base_url, &term.normalized).await
            }
            _ => postcodes_io::lookup_postcode(&self.client, &self.base_url, &term.normalized).await,
        }
    }
}

/// Google Geocoding for place names and place ids.
#[derive(Debug, Clone)]
pub struct GoogleStrategy {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    region: String,
}

impl GoogleStrategy {
    /// Creates the strategy with an API key.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            region: region.into(),
        }
    }
}

#[async_trait]
impl GeocodeStrategy for GoogleStrategy {
    fn name(&self) -> &str {
        "google"
    }

    fn accepts(&self, kind: TermKind) -> bool {
        matches!(kind, TermKind::PlaceId | TermKind::PlaceName)
    }

    async fn lookup(&self, term: &SearchTerm) -> Result<GeocodedLocation, GeocodeError> {
        let query = if term.kind == TermKind::PlaceId {
            GoogleQuery::PlaceId(&term.normalized)
        } else {
            GoogleQuery::Address(&term.normalized)
        };

        google::geocode(&self.client, &self.base_url, &self.api_key, &self.region, query)
            .await?
            .ok_or_else(|| GeocodeError::NotFound {
                term: term.normalized.clone(),
            })
    }
}

/// Nominatim for place names, throttled to one request per interval.
#[derive(Debug)]
pub struct NominatimStrategy {
    client: reqwest::Client,
    base_url: String,
    country_codes: String,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl NominatimStrategy {
    /// Creates the strategy with a minimum gap between requests.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        country_codes: impl Into<String>,
        min_interval: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            country_codes: country_codes.into(),
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[async_trait]
impl GeocodeStrategy for NominatimStrategy {
    fn name(&self) -> &str {
        "nominatim"
    }

    fn accepts(&self, kind: TermKind) -> bool {
        kind == TermKind::PlaceName
    }

    async fn lookup(&self, term: &SearchTerm) -> Result<GeocodedLocation, GeocodeError> {
        self.throttle().await;
        nominatim::geocode_freeform(
            &self.client,
            &self.base_url,
            &self.country_codes,
            &term.normalized,
        )
        .await?
        .ok_or_else(|| GeocodeError::NotFound {
            term: term.normalized.clone(),
        })
    }
}

/// A hardcoded answer for a term that providers handle badly.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PinnedLocation {
    /// The term as a user would type it. Matching ignores case and spaces.
    pub term: String,
    /// Latitude to return.
    pub lat: f64,
    /// Longitude to return.
    pub lng: f64,
}

impl PinnedLocation {
    fn matches(&self, term: &SearchTerm) -> bool {
        squash(&self.term) == squash(&term.normalized)
    }
}

fn squash(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Resolver behaviour.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Deadline for each provider call, in milliseconds.
    pub timeout_ms: u64,
    /// Retry policy applied to each provider call.
    pub retry: RetryPolicy,
    /// Whether to consult the offline city table after providers fail.
    pub use_city_table: bool,
    /// City table entry used when nothing else matched. `None` turns
    /// total failure into an error.
    pub fallback_city: Option<String>,
    /// Terms answered without asking any provider.
    pub pinned: Vec<PinnedLocation>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            retry: RetryPolicy::default(),
            use_city_table: true,
            fallback_city: Some(uk_places::DEFAULT_PLACE.to_string()),
            pinned: Vec::new(),
        }
    }
}

/// Where a resolution came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionSource {
    /// The coordinate cache.
    Cache,
    /// A pinned location.
    Pinned,
    /// A strategy, by name.
    Provider(String),
    /// A strategy, after simplifying the place name to the given text.
    SimplifiedName(String),
    /// The offline city table.
    CityTable,
    /// The configured fallback city.
    DefaultCity,
}

impl fmt::Display for ResolutionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cache => f.write_str("cache"),
            Self::Pinned => f.write_str("pinned"),
            Self::Provider(name) => f.write_str(name),
            Self::SimplifiedName(name) => write!(f, "simplified name '{name}'"),
            Self::CityTable => f.write_str("city table"),
            Self::DefaultCity => f.write_str("default city"),
        }
    }
}

/// A successful resolution with provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Resolved point.
    pub coordinates: Coordinates,
    /// The parsed term.
    pub term: SearchTerm,
    /// How it was resolved.
    pub source: ResolutionSource,
    /// Canonical name reported by the provider or table, if any.
    pub matched_name: Option<String>,
}

/// Resolves search terms through an ordered list of strategies.
pub struct CoordinateResolver {
    strategies: Vec<Box<dyn GeocodeStrategy>>,
    cache: Arc<CoordinateCache>,
    config: ResolverConfig,
}

impl fmt::Debug for CoordinateResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.strategies.iter().map(|s| s.name()).collect();
        f.debug_struct("CoordinateResolver")
            .field("strategies", &names)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builds the HTTP client shared by provider strategies.
///
/// # Errors
///
/// Returns [`GeocodeError::Http`] if the TLS backend cannot be initialized.
pub fn http_client() -> Result<reqwest::Client, GeocodeError> {
    Ok(reqwest::Client::builder().user_agent(USER_AGENT).build()?)
}

impl CoordinateResolver {
    /// Creates a resolver over explicit strategies.
    #[must_use]
    pub fn new(
        strategies: Vec<Box<dyn GeocodeStrategy>>,
        cache: Arc<CoordinateCache>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            strategies,
            cache,
            config,
        }
    }

    /// Creates a resolver from the enabled services in the registry.
    ///
    /// Google is skipped when its API key variable is unset or empty.
    #[must_use]
    pub fn from_services(
        client: &reqwest::Client,
        cache: Arc<CoordinateCache>,
        config: ResolverConfig,
    ) -> Self {
        let mut strategies: Vec<Box<dyn GeocodeStrategy>> = Vec::new();

        for service in service_registry::enabled_services() {
            match service.provider {
                ProviderConfig::PostcodesIo { base_url } => {
                    strategies.push(Box::new(PostcodesIoStrategy::new(client.clone(), base_url)));
                }
                ProviderConfig::Google {
                    base_url,
                    api_key_env,
                    region,
                } => match std::env::var(&api_key_env) {
                    Ok(key) if !key.trim().is_empty() => {
                        strategies.push(Box::new(GoogleStrategy::new(
                            client.clone(),
                            base_url,
                            key,
                            region,
                        )));
                    }
                    _ => {
                        log::info!("{}: {api_key_env} not set, skipping", service.name);
                    }
                },
                ProviderConfig::Nominatim {
                    base_url,
                    country_codes,
                    rate_limit_ms,
                } => {
                    strategies.push(Box::new(NominatimStrategy::new(
                        client.clone(),
                        base_url,
                        country_codes,
                        Duration::from_millis(rate_limit_ms),
                    )));
                }
            }
        }

        Self::new(strategies, cache, config)
    }

    /// Names of the configured strategies, in order.
    #[must_use]
    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Resolves `raw` to coordinates.
    ///
    /// # Errors
    ///
    /// See [`Self::resolve_detailed`].
    pub async fn resolve(&self, raw: &str) -> Result<Coordinates, GeocodeError> {
        Ok(self.resolve_detailed(raw).await?.coordinates)
    }

    /// Resolves `raw` and reports how the answer was found.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::EmptyTerm`] for a blank term, and
    /// [`GeocodeError::Exhausted`] when every strategy failed and no
    /// fallback applied (always the case after an invalid postcode or
    /// outcode).
    pub async fn resolve_detailed(&self, raw: &str) -> Result<Resolution, GeocodeError> {
        let term = SearchTerm::parse(raw)?;
        let lower = term.normalized.to_lowercase();

        if let Some(coordinates) = self
            .cache
            .get(&term.normalized)
            .or_else(|| self.cache.get(&lower))
        {
            log::debug!("'{}': cache hit", term.normalized);
            return Ok(Resolution {
                coordinates,
                term,
                source: ResolutionSource::Cache,
                matched_name: None,
            });
        }

        if let Some(pinned) = self.config.pinned.iter().find(|p| p.matches(&term)) {
            log::debug!("'{}': pinned location", term.normalized);
            return Ok(Resolution {
                coordinates: Coordinates::new(pinned.lat, pinned.lng),
                term,
                source: ResolutionSource::Pinned,
                matched_name: Some(pinned.term.clone()),
            });
        }

        let mut failures = Vec::new();

        if let Some((name, location)) = self.try_strategies(&term, &mut failures).await {
            self.remember(&term, location.coordinates);
            return Ok(Resolution {
                coordinates: location.coordinates,
                term,
                source: ResolutionSource::Provider(name),
                matched_name: location.matched_name,
            });
        }

        let invalid = failures
            .iter()
            .any(|f| f.error.kind() == ErrorKind::InvalidInput);

        if invalid {
            return Err(GeocodeError::Exhausted {
                term: term.normalized,
                failures,
            });
        }

        if term.kind == TermKind::PlaceName
            && let Some(simpler) = term::simplify_place_name(&term.normalized)
        {
            log::info!("'{}': retrying as '{simpler}'", term.normalized);
            let simplified = SearchTerm::place_name(&simpler);
            if let Some((_, location)) = self.try_strategies(&simplified, &mut failures).await {
                self.remember(&term, location.coordinates);
                return Ok(Resolution {
                    coordinates: location.coordinates,
                    term,
                    source: ResolutionSource::SimplifiedName(simpler),
                    matched_name: location.matched_name,
                });
            }
        }

        for failure in &failures {
            log::warn!(
                "'{}': {} failed: {}",
                term.normalized,
                failure.strategy,
                failure.error
            );
        }

        if self.config.use_city_table
            && let Some((name, coordinates)) = uk_places::lookup(&term.normalized)
        {
            log::info!("'{}': using city table entry '{name}'", term.normalized);
            return Ok(Resolution {
                coordinates,
                term,
                source: ResolutionSource::CityTable,
                matched_name: Some(name.to_string()),
            });
        }

        if let Some((name, coordinates)) = self
            .config
            .fallback_city
            .as_deref()
            .and_then(uk_places::lookup)
        {
            log::warn!(
                "'{}': nothing matched, defaulting to '{name}'",
                term.normalized
            );
            return Ok(Resolution {
                coordinates,
                term,
                source: ResolutionSource::DefaultCity,
                matched_name: Some(name.to_string()),
            });
        }

        Err(GeocodeError::Exhausted {
            term: term.normalized,
            failures,
        })
    }

    /// Runs every accepting strategy until one succeeds.
    ///
    /// Stops early after an invalid-input answer.
    async fn try_strategies(
        &self,
        term: &SearchTerm,
        failures: &mut Vec<StrategyFailure>,
    ) -> Option<(String, GeocodedLocation)> {
        let timeout = Duration::from_millis(self.config.timeout_ms);

        for strategy in self.strategies.iter().filter(|s| s.accepts(term.kind)) {
            let name = strategy.name();
            log::debug!("'{}': trying {name}", term.normalized);

            let result = retry::retry_with_backoff(&self.config.retry, name, || {
                retry::with_timeout(timeout, strategy.lookup(term))
            })
            .await;

            match result {
                Ok(location) => {
                    log::debug!(
                        "'{}': {name} -> {}",
                        term.normalized,
                        location.coordinates
                    );
                    return Some((name.to_string(), location));
                }
                Err(error) => {
                    let stop = error.kind() == ErrorKind::InvalidInput;
                    failures.push(StrategyFailure {
                        strategy: name.to_string(),
                        error,
                    });
                    if stop {
                        break;
                    }
                }
            }
        }

        None
    }

    fn remember(&self, term: &SearchTerm, coordinates: Coordinates) {
        self.cache.insert(&term.normalized, coordinates);
        self.cache.insert(&term.normalized.to_lowercase(), coordinates);
    }
}
