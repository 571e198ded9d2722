//! Pipeline settings.
//!
//! Everything has a default so an empty TOML file (or none at all) gives a
//! working pipeline. Secrets and endpoints come from the environment:
//!
//! - `SUPABASE_URL`: project URL, e.g. `https://abcd.supabase.co`
//! - `SUPABASE_ANON_KEY`: anon (public) API key
//! - `GOOGLE_MAPS_API_KEY`: optional, enables Google geocoding
//!
//! Example `planning_pulse.toml`:
//!
//! ```toml
//! default_radius_km = 3.0
//!
//! [query]
//! row_cap = 300
//! timeout_ms = 15000
//!
//! telemetry = "log"
//!
//! [cache]
//! ttl_secs = 600
//!
//! [[resolver.pinned]]
//! term = "E1 6AN"
//! lat = 51.5205
//! lng = -0.0731
//! ```

use std::path::Path;

use planning_pulse_geocoder::cache::CoordinateCacheConfig;
use planning_pulse_geocoder::resolver::ResolverConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::backend::BackendConfig;
use crate::cache::ResultCacheConfig;
use crate::query::QueryConfig;
use crate::telemetry::TelemetrySink;

/// Environment variable holding the Supabase project URL.
pub const SUPABASE_URL_ENV: &str = "SUPABASE_URL";

/// Environment variable holding the Supabase anon key.
pub const SUPABASE_ANON_KEY_ENV: &str = "SUPABASE_ANON_KEY";

/// Errors from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid TOML for [`PipelineConfig`].
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A required environment variable is not set.
    #[error("{name} environment variable not set")]
    MissingEnv {
        /// Variable name.
        name: String,
    },

    /// A value is out of range.
    #[error("Invalid configuration: {message}")]
    Invalid {
        /// Description.
        message: String,
    },
}

/// All pipeline settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Radius used when a request does not give one.
    pub default_radius_km: f64,
    /// Results per page when a request does not give a size.
    pub page_size: usize,
    /// Spatial query limits.
    pub query: QueryConfig,
    /// Result cache bounds.
    pub cache: ResultCacheConfig,
    /// Coordinate cache bounds.
    pub coordinate_cache: CoordinateCacheConfig,
    /// Geocoding behaviour.
    pub resolver: ResolverConfig,
    /// Backend procedure and table names.
    pub backend: BackendConfig,
    /// Where search events go.
    pub telemetry: TelemetrySink,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_radius_km: 5.0,
            page_size: 20,
            query: QueryConfig::default(),
            cache: ResultCacheConfig::default(),
            coordinate_cache: CoordinateCacheConfig::default(),
            resolver: ResolverConfig::default(),
            backend: BackendConfig::default(),
            telemetry: TelemetrySink::Supabase,
        }
    }
}

impl PipelineConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Toml`] for malformed TOML and
    /// [`ConfigError::Invalid`] for unusable values.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`Self::from_toml_str`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        log::debug!("Loading pipeline config from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.default_radius_km.is_finite() && self.default_radius_km > 0.0) {
            return Err(ConfigError::Invalid {
                message: format!(
                    "default_radius_km must be positive, got {}",
                    self.default_radius_km
                ),
            });
        }
        if self.page_size == 0 {
            return Err(ConfigError::Invalid {
                message: "page_size must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Supabase project endpoint and key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupabaseSettings {
    /// Project URL without trailing slash.
    pub url: String,
    /// Anon API key, sent as `apikey` and bearer token.
    pub anon_key: String,
}

impl SupabaseSettings {
    /// Reads [`SUPABASE_URL_ENV`] and [`SUPABASE_ANON_KEY_ENV`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnv`] if either is unset or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: required_env(SUPABASE_URL_ENV)?
                .trim_end_matches('/')
                .to_string(),
            anon_key: required_env(SUPABASE_ANON_KEY_ENV)?,
        })
    }
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingEnv {
            name: name.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.cache.ttl_secs, 15 * 60);
        assert_eq!(config.cache.capacity, 10);
        assert_eq!(config.query.row_cap, 500);
        assert_eq!(config.resolver.timeout_ms, 10_000);
    }

    #[test]
    fn parses_nested_sections() {
        let config = PipelineConfig::from_toml_str(
            r#"
            default_radius_km = 3.0
            telemetry = "log"

            [query]
            row_cap = 250

            [resolver]
            fallback_city = "manchester"

            [resolver.retry]
            max_attempts = 2

            [[resolver.pinned]]
            term = "E1 6AN"
            lat = 51.5205
            lng = -0.0731
            "#,
        )
        .unwrap();

        assert!((config.default_radius_km - 3.0).abs() < f64::EPSILON);
        assert_eq!(config.telemetry, TelemetrySink::Log);
        assert_eq!(config.query.row_cap, 250);
        assert_eq!(config.query.timeout_ms, 20_000);
        assert_eq!(config.resolver.fallback_city.as_deref(), Some("manchester"));
        assert_eq!(config.resolver.retry.max_attempts, 2);
        assert_eq!(config.resolver.retry.initial_delay_ms, 500);
        assert_eq!(config.resolver.pinned.len(), 1);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            PipelineConfig::from_toml_str("default_radius_km = -1.0"),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            PipelineConfig::from_toml_str("page_size = 0"),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            PipelineConfig::from_toml_str("page_size = \"lots\""),
            Err(ConfigError::Toml(_))
        ));
    }
}
