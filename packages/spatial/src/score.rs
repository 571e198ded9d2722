//! Distance and relevance scoring.
//!
//! Every result set is annotated with its great-circle distance from the
//! search centre before it reaches the filter/sort stage. Rows carrying an
//! upstream relevance score are ranked ahead of the rest.

use std::cmp::Ordering;

use planning_pulse_search_models::{Application, Coordinates, Distance};

use crate::haversine_km;

/// Returns scored copies of `applications`, ordered by relevance then
/// distance.
///
/// Each copy gets `distance` set to the Haversine distance in kilometres,
/// or `+∞` when the row has no coordinates. Rows with a positive relevance
/// score come first (highest first, then nearest); all other rows follow
/// by ascending distance. The sort is stable.
#[must_use]
pub fn score(applications: &[Application], center: Coordinates) -> Vec<Application> {
    let mut scored: Vec<Application> = applications
        .iter()
        .map(|app| {
            let km = app
                .coordinates()
                .map_or(f64::INFINITY, |coords| haversine_km(center, coords));
            Application {
                distance: Some(Distance::Km(km)),
                ..app.clone()
            }
        })
        .collect();

    let missing = scored
        .iter()
        .filter(|a| a.coordinates().is_none())
        .count();
    if missing > 0 {
        log::debug!(
            "{missing}/{} applications have no coordinates and will sort last",
            scored.len()
        );
    }

    scored.sort_by(compare_scored);
    scored
}

/// Relevance score treated as a ranking signal.
///
/// Unset, zero, negative and NaN scores all mean "no signal".
#[must_use]
pub fn relevance_signal(app: &Application) -> Option<f64> {
    app.relevance_score.filter(|s| s.is_finite() && *s > 0.0)
}

fn scored_km(app: &Application) -> f64 {
    app.distance
        .as_ref()
        .and_then(Distance::value)
        .unwrap_or(f64::INFINITY)
}

fn compare_scored(a: &Application, b: &Application) -> Ordering {
    match (relevance_signal(a), relevance_signal(b)) {
        (Some(x), Some(y)) => y
            .total_cmp(&x)
            .then_with(|| scored_km(a).total_cmp(&scored_km(b))),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => scored_km(a).total_cmp(&scored_km(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::destination;

    const CENTER: Coordinates = Coordinates::new(51.5074, -0.1278);

    fn app_at(id: i64, coords: Option<Coordinates>) -> Application {
        Application {
            id,
            latitude: coords.map(|c| c.lat),
            longitude: coords.map(|c| c.lng),
            ..Application::default()
        }
    }

    fn ids(apps: &[Application]) -> Vec<i64> {
        apps.iter().map(|a| a.id).collect()
    }

    #[test]
    fn annotates_distance_without_touching_input() {
        let input = vec![app_at(1, Some(destination(CENTER, 90.0, 2.0)))];
        let out = score(&input, CENTER);
        assert!(input[0].distance.is_none());
        let km = out[0].distance.as_ref().and_then(Distance::value).unwrap();
        assert!((km - 2.0).abs() < 1e-6);
    }

    #[test]
    fn orders_by_distance_and_puts_missing_coordinates_last() {
        let input = vec![
            app_at(1, None),
            app_at(2, Some(destination(CENTER, 0.0, 3.0))),
            app_at(3, Some(destination(CENTER, 0.0, 1.0))),
        ];
        let out = score(&input, CENTER);
        assert_eq!(ids(&out), vec![3, 2, 1]);
        assert_eq!(out[2].distance, Some(Distance::Km(f64::INFINITY)));
    }

    #[test]
    fn positive_relevance_dominates_distance() {
        let mut far = app_at(1, Some(destination(CENTER, 0.0, 9.0)));
        far.relevance_score = Some(0.4);
        let mut farther = app_at(2, Some(destination(CENTER, 0.0, 12.0)));
        farther.relevance_score = Some(0.9);
        let near = app_at(3, Some(destination(CENTER, 0.0, 0.5)));

        let out = score(&[far, farther, near], CENTER);
        assert_eq!(ids(&out), vec![2, 1, 3]);
    }

    #[test]
    fn equal_relevance_falls_back_to_distance() {
        let mut far = app_at(1, Some(destination(CENTER, 0.0, 9.0)));
        far.relevance_score = Some(0.5);
        let mut near = app_at(2, Some(destination(CENTER, 180.0, 1.0)));
        near.relevance_score = Some(0.5);
        let unscored = app_at(3, Some(destination(CENTER, 0.0, 0.2)));

        let out = score(&[far, near, unscored], CENTER);
        assert_eq!(ids(&out), vec![2, 1, 3]);
    }

    #[test]
    fn zero_negative_and_nan_scores_are_no_signal() {
        let mut zero = app_at(1, Some(destination(CENTER, 0.0, 3.0)));
        zero.relevance_score = Some(0.0);
        let mut negative = app_at(2, Some(destination(CENTER, 0.0, 2.0)));
        negative.relevance_score = Some(-1.0);
        let mut nan = app_at(3, Some(destination(CENTER, 0.0, 1.0)));
        nan.relevance_score = Some(f64::NAN);

        let out = score(&[zero, negative, nan], CENTER);
        assert_eq!(ids(&out), vec![3, 2, 1]);
    }

    #[test]
    fn ties_keep_input_order() {
        let spot = Some(destination(CENTER, 45.0, 1.0));
        let out = score(&[app_at(1, spot), app_at(2, spot), app_at(3, spot)], CENTER);
        assert_eq!(ids(&out), vec![1, 2, 3]);
    }
}
