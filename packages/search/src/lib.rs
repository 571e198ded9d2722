#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Radius search over UK planning applications.
//!
//! A search runs through these stages:
//!
//! 1. The term is resolved to coordinates by
//!    [`planning_pulse_geocoder::CoordinateResolver`].
//! 2. [`query::SpatialQueryBuilder`] fetches rows inside the radius from the
//!    backend, falling back to a bounding-box query when the spatial
//!    procedure is missing, and caches first pages.
//! 3. Rows are annotated with distance and ranked by
//!    [`planning_pulse_spatial::score::score`].
//! 4. [`filter`], [`sort`] and [`paginate`] produce the requested page.
//!
//! [`pipeline::SearchPipeline`] runs the whole thing and reports events to
//! [`telemetry`]. [`session::SearchSession`] and [`failure`] decide whether
//! a finished search is shown and how errors are presented.

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod failure;
pub mod filter;
pub mod paginate;
pub mod pipeline;
pub mod query;
pub mod session;
pub mod sort;
pub mod telemetry;

pub use config::PipelineConfig;
pub use error::SearchError;
pub use pipeline::{SearchOutcome, SearchPipeline, SearchRequest, SearchResponse};
