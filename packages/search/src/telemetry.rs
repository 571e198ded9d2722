//! Best-effort search event reporting.
//!
//! [`SearchTelemetry::record`] returns immediately and never fails; sinks
//! that talk to the network do so on a spawned task and only log their
//! own errors. Nothing here can slow down or fail a search.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use planning_pulse_search_models::ErrorKind;
use serde::{Deserialize, Serialize};

use crate::backend::SupabaseClient;

/// Configured destination for search events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetrySink {
    /// Insert into the backend's search log table.
    #[default]
    Supabase,
    /// Write to the log at debug level.
    Log,
    /// Drop events.
    Off,
}

/// What happened during a search.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SearchEvent {
    /// A search began.
    Started {
        /// Search term as typed.
        term: String,
        /// Radius in kilometres.
        radius_km: f64,
    },
    /// A search produced results.
    Completed {
        /// Search term as typed.
        term: String,
        /// Rows after filtering.
        result_count: usize,
        /// Wall time in milliseconds.
        duration_ms: u64,
        /// Whether the bounding-box fallback was used.
        used_fallback: bool,
    },
    /// A search failed.
    Failed {
        /// Search term as typed.
        term: String,
        /// Failure class.
        kind: ErrorKind,
        /// Error text.
        message: String,
    },
}

/// Receives search events.
pub trait SearchTelemetry: Send + Sync {
    /// Records `event`. Must return promptly and swallow its own errors.
    fn record(&self, event: SearchEvent);
}

/// Discards every event.
pub struct NullTelemetry;

impl SearchTelemetry for NullTelemetry {
    fn record(&self, _event: SearchEvent) {}
}

/// Returns a shared [`NullTelemetry`].
#[must_use]
pub fn null_telemetry() -> Arc<dyn SearchTelemetry> {
    Arc::new(NullTelemetry)
}

/// Writes events to the `log` facade at debug level.
pub struct LogTelemetry;

impl SearchTelemetry for LogTelemetry {
    fn record(&self, event: SearchEvent) {
        log::debug!("search event: {event:?}");
    }
}

/// Builds the sink selected by `sink`; `table` is the search log table.
#[must_use]
pub fn telemetry_for(
    sink: TelemetrySink,
    client: &SupabaseClient,
    table: &str,
) -> Arc<dyn SearchTelemetry> {
    match sink {
        TelemetrySink::Supabase => Arc::new(SupabaseTelemetry::new(client.clone(), table)),
        TelemetrySink::Log => Arc::new(LogTelemetry),
        TelemetrySink::Off => null_telemetry(),
    }
}

/// A row in the search log table.
#[derive(Debug, Serialize)]
struct SearchLogRow {
    #[serde(flatten)]
    event: SearchEvent,
    created_at: DateTime<Utc>,
}

/// Inserts events into the backend's search log table.
#[derive(Debug, Clone)]
pub struct SupabaseTelemetry {
    client: SupabaseClient,
    table: String,
}

impl SupabaseTelemetry {
    /// Creates the sink.
    #[must_use]
    pub fn new(client: SupabaseClient, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }
}

impl SearchTelemetry for SupabaseTelemetry {
    fn record(&self, event: SearchEvent) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            log::debug!("No runtime, dropping search event");
            return;
        };

        let client = self.client.clone();
        let table = self.table.clone();
        let row = SearchLogRow {
            event,
            created_at: Utc::now(),
        };

        handle.spawn(async move {
            if let Err(e) = client.insert(&table, &row).await {
                log::debug!("Failed to record search event: {e}");
            }
        });
    }
}
