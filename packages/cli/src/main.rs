#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for planning application search.
//!
//! Needs `SUPABASE_URL` and `SUPABASE_ANON_KEY` for `search`. Set
//! `GOOGLE_MAPS_API_KEY` to enable the Google geocoder. Log output is
//! controlled with `RUST_LOG`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use planning_pulse_geocoder::cache::CoordinateCache;
use planning_pulse_geocoder::resolver::{self, CoordinateResolver};
use planning_pulse_geocoder::{SearchTerm, service_registry};
use planning_pulse_search::session::SearchSession;
use planning_pulse_search::{PipelineConfig, SearchOutcome, SearchPipeline, SearchRequest};
use planning_pulse_search_models::{Distance, SearchFilters, SortOrder};

#[derive(Parser)]
#[command(name = "planning_pulse", about = "Search UK planning applications near a place")]
struct Cli {
    /// Pipeline config file (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search for applications around a postcode or place
    Search {
        /// Postcode, outcode or place name (e.g., "SW1A 1AA", "Hebden Bridge")
        term: String,
        /// Search radius in kilometres
        #[arg(long)]
        radius: Option<f64>,
        /// Status bucket ("Under Review", "Approved", ...) or free text
        #[arg(long)]
        status: Option<String>,
        /// Application type
        #[arg(long = "type")]
        application_type: Option<String>,
        /// Development classification (e.g., `residential`)
        #[arg(long)]
        classification: Option<String>,
        /// Free-text search over description, address and reference
        #[arg(long)]
        query: Option<String>,
        /// Sort order: newest, distance, impact or closingSoon
        #[arg(long)]
        sort: Option<String>,
        /// Zero-based page number
        #[arg(long, default_value = "0")]
        page: usize,
        /// Results per page
        #[arg(long)]
        page_size: Option<usize>,
        /// Print the response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve a search term to coordinates without querying the backend
    Resolve {
        /// Postcode, outcode or place name
        term: String,
    },
    /// Show how a search term is classified
    Classify {
        /// Postcode, outcode or place name
        term: String,
    },
    /// List the configured geocoding services
    Services,
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    Ok(match path {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    })
}

#[allow(clippy::too_many_lines)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Search {
            term,
            radius,
            status,
            application_type,
            classification,
            query,
            sort,
            page,
            page_size,
            json,
        } => {
            let sort = match sort.as_deref() {
                Some(name) => {
                    let parsed = SortOrder::parse_lenient(name);
                    if parsed.is_none() {
                        log::warn!("Unknown sort order '{name}', keeping ranked order");
                    }
                    parsed
                }
                None => None,
            };

            let request = SearchRequest {
                term,
                radius_km: radius,
                filters: SearchFilters {
                    status,
                    application_type,
                    classification,
                    search: query,
                },
                sort,
                page,
                page_size,
            };

            let pipeline = SearchPipeline::from_env(config)?;
            let session = SearchSession::new();

            match pipeline.run(&session, &request).await {
                SearchOutcome::Delivered(response) if json => {
                    println!("{}", serde_json::to_string_pretty(&response)?);
                }
                SearchOutcome::Delivered(response) => {
                    println!(
                        "{} ({}) -> {} via {}",
                        response.term,
                        response.term_kind,
                        response.coordinates,
                        response.location_source
                    );
                    println!(
                        "{} matching within {} km, page {}/{}{}",
                        response.page.total_count,
                        response.radius_km,
                        response.page.page + 1,
                        response.page.total_pages,
                        if response.used_fallback { " (bounding box)" } else { "" }
                    );
                    println!();
                    println!("{:>8}  {:<18} {:<20} ADDRESS", "KM", "REFERENCE", "STATUS");
                    println!("{}", "-".repeat(80));
                    for app in &response.page.items {
                        let km = app
                            .distance
                            .as_ref()
                            .and_then(Distance::value)
                            .map_or_else(|| "-".to_string(), |km| format!("{km:.2}"));
                        println!(
                            "{km:>8}  {:<18} {:<20} {}",
                            app.reference.as_deref().unwrap_or("-"),
                            app.status.as_deref().unwrap_or("-"),
                            app.address.as_deref().unwrap_or("-"),
                        );
                    }
                }
                SearchOutcome::Stale => {
                    log::warn!("Search was superseded");
                }
                SearchOutcome::Failed { report, error } => {
                    log::debug!("{error}");
                    eprintln!(
                        "{}",
                        report.user_message.unwrap_or("Search error, please try again.")
                    );
                    std::process::exit(1);
                }
            }
        }
        Commands::Resolve { term } => {
            let resolver = CoordinateResolver::from_services(
                &resolver::http_client()?,
                Arc::new(CoordinateCache::new(
                    config.coordinate_cache,
                    planning_pulse_search_models::clock::system_clock(),
                )),
                config.resolver,
            );
            log::info!("Geocoders: {}", resolver.strategy_names().join(", "));

            let resolution = resolver.resolve_detailed(&term).await?;
            println!(
                "{} ({}) -> {} via {}{}",
                resolution.term.normalized,
                resolution.term.kind,
                resolution.coordinates,
                resolution.source,
                resolution
                    .matched_name
                    .map(|name| format!(" [{name}]"))
                    .unwrap_or_default()
            );
        }
        Commands::Classify { term } => {
            let parsed = SearchTerm::parse(&term)?;
            println!("{} -> {}", parsed.normalized, parsed.kind);
        }
        Commands::Services => {
            println!("{:<5} {:<14} {:<8} NAME", "PRI", "ID", "ENABLED");
            println!("{}", "-".repeat(50));
            for service in service_registry::all_services() {
                println!(
                    "{:<5} {:<14} {:<8} {}",
                    service.priority, service.id, service.enabled, service.name
                );
            }
        }
    }

    Ok(())
}
