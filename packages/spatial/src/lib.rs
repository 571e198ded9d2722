#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Spatial helpers for radius searches.
//!
//! Provides the Haversine great-circle distance, the degrees-per-kilometre
//! bounding box used when the backend spatial procedure is unavailable,
//! and the distance/relevance scorer applied to every result set.

pub mod score;

use geo::{Intersects, Point, Rect, coord};
use planning_pulse_search_models::{BoundingBox, Coordinates};

/// Mean Earth radius used by the Haversine formula, in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Kilometres per degree of latitude used for bounding boxes.
pub const KM_PER_DEGREE: f64 = 111.32;

/// 111.32 km/deg is slightly more than the 111.19 km/deg of the Haversine
/// sphere, so the box is widened to stay a superset of the circle.
const BOX_MARGIN: f64 = 1.01;

/// Great-circle distance between two points in kilometres.
#[must_use]
pub fn haversine_km(from: Coordinates, to: Coordinates) -> f64 {
    let d_lat = (to.lat - from.lat).to_radians();
    let d_lng = (to.lng - from.lng).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + from.lat.to_radians().cos() * to.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Computes the lat/lng box enclosing a circle of `radius_km` around
/// `center`.
///
/// `latDiff = r / 111.32`, `lngDiff = r / (111.32 * cos(lat))`, clamped to
/// the valid coordinate range. Near the poles the longitude span covers
/// the whole globe.
#[must_use]
pub fn bounding_box(center: Coordinates, radius_km: f64) -> BoundingBox {
    let radius_km = radius_km.max(0.0);
    let lat_diff = radius_km / KM_PER_DEGREE * BOX_MARGIN;

    let cos_lat = center.lat.to_radians().cos();
    let lng_diff = if cos_lat.abs() < 1e-9 {
        180.0
    } else {
        (radius_km / (KM_PER_DEGREE * cos_lat.abs()) * BOX_MARGIN).min(180.0)
    };

    BoundingBox::new(
        (center.lng - lng_diff).max(-180.0),
        (center.lat - lat_diff).max(-90.0),
        (center.lng + lng_diff).min(180.0),
        (center.lat + lat_diff).min(90.0),
    )
}

/// Whether `point` lies inside (or on the edge of) `bbox`.
#[must_use]
pub fn bbox_contains(bbox: &BoundingBox, point: Coordinates) -> bool {
    let rect = Rect::new(
        coord! { x: bbox.west, y: bbox.south },
        coord! { x: bbox.east, y: bbox.north },
    );
    rect.intersects(&Point::new(point.lng, point.lat))
}

/// Whether `point` is within `radius_km` of `center` by great-circle
/// distance.
#[must_use]
pub fn within_radius(center: Coordinates, point: Coordinates, radius_km: f64) -> bool {
    haversine_km(center, point) <= radius_km
}
