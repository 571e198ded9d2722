//! Stable orderings for the sort control.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use planning_pulse_search_models::{Application, SortOrder};

/// Sorts in place. `None` (an unknown sort name) leaves the order alone.
///
/// All sorts are stable: rows with equal keys keep their relative order.
pub fn sort_applications(applications: &mut [Application], order: Option<SortOrder>) {
    let Some(order) = order else {
        return;
    };

    match order {
        SortOrder::Newest => {
            applications.sort_by(|a, b| newest_key(b).cmp(&newest_key(a)));
        }
        SortOrder::Distance => {
            applications.sort_by(|a, b| distance_key(a).total_cmp(&distance_key(b)));
        }
        SortOrder::Impact => {
            applications.sort_by(|a, b| impact_key(b).total_cmp(&impact_key(a)));
        }
        SortOrder::ClosingSoon => {
            applications.sort_by(|a, b| closing_cmp(a.consultation_ends_at(), b.consultation_ends_at()));
        }
    }
}

/// Submission (or validation) date; missing dates count as the epoch.
fn newest_key(app: &Application) -> DateTime<Utc> {
    app.submitted_at().unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Leading number of the distance; missing or unreadable sorts last.
fn distance_key(app: &Application) -> f64 {
    app.distance
        .as_ref()
        .and_then(planning_pulse_search_models::Distance::value)
        .filter(|d| !d.is_nan())
        .unwrap_or(f64::INFINITY)
}

/// Impact score; missing or NaN counts as zero.
fn impact_key(app: &Application) -> f64 {
    app.impact_score.filter(|s| !s.is_nan()).unwrap_or(0.0)
}

/// Ascending by date with missing dates last.
fn closing_cmp(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use planning_pulse_search_models::Distance;

    use super::*;

    fn ids(apps: &[Application]) -> Vec<i64> {
        apps.iter().map(|a| a.id).collect()
    }

    fn at_distance(id: i64, text: &str) -> Application {
        Application {
            id,
            distance: Some(Distance::Text(text.to_string())),
            ..Application::default()
        }
    }

    #[test]
    fn distance_sorts_text_distances_numerically() {
        let mut apps = vec![
            at_distance(1, "2.0 mi"),
            at_distance(2, "0.5 mi"),
            at_distance(3, "1.0 mi"),
        ];
        sort_applications(&mut apps, Some(SortOrder::Distance));
        let order: Vec<_> = apps
            .iter()
            .map(|a| a.distance.as_ref().and_then(Distance::value).unwrap())
            .collect();
        assert_eq!(order, vec![0.5, 1.0, 2.0]);
    }

    #[test]
    fn missing_distance_sorts_last_and_ties_are_stable() {
        let mut apps = vec![
            Application {
                id: 1,
                ..Application::default()
            },
            at_distance(2, "1.0 mi"),
            Application {
                id: 3,
                distance: Some(Distance::Km(1.0)),
                ..Application::default()
            },
            at_distance(4, "0.2 mi"),
        ];
        sort_applications(&mut apps, Some(SortOrder::Distance));
        assert_eq!(ids(&apps), vec![4, 2, 3, 1]);
    }

    #[test]
    fn newest_first_with_missing_dates_as_epoch() {
        let mut apps = vec![
            Application {
                id: 1,
                submission_date: Some("2024-01-10".to_string()),
                ..Application::default()
            },
            Application {
                id: 2,
                ..Application::default()
            },
            Application {
                id: 3,
                valid_date: Some("15/03/2024".to_string()),
                ..Application::default()
            },
            Application {
                id: 4,
                submission_date: Some("2024-01-10T09:00:00Z".to_string()),
                ..Application::default()
            },
        ];
        sort_applications(&mut apps, Some(SortOrder::Newest));
        assert_eq!(ids(&apps), vec![3, 4, 1, 2]);
    }

    #[test]
    fn impact_descending_with_missing_as_zero() {
        let mut apps = vec![
            Application {
                id: 1,
                impact_score: Some(-1.0),
                ..Application::default()
            },
            Application {
                id: 2,
                ..Application::default()
            },
            Application {
                id: 3,
                impact_score: Some(7.5),
                ..Application::default()
            },
            Application {
                id: 4,
                impact_score: Some(0.0),
                ..Application::default()
            },
        ];
        sort_applications(&mut apps, Some(SortOrder::Impact));
        assert_eq!(ids(&apps), vec![3, 2, 4, 1]);
    }

    #[test]
    fn closing_soon_ascending_missing_last() {
        let mut apps = vec![
            Application {
                id: 1,
                ..Application::default()
            },
            Application {
                id: 2,
                consultation_end_date: Some("2024-06-30".to_string()),
                ..Application::default()
            },
            Application {
                id: 3,
                consultation_end_date: Some("2024-06-01".to_string()),
                ..Application::default()
            },
        ];
        sort_applications(&mut apps, Some(SortOrder::ClosingSoon));
        assert_eq!(ids(&apps), vec![3, 2, 1]);
    }

    #[test]
    fn unknown_sort_is_a_no_op() {
        let mut apps = vec![at_distance(1, "3 mi"), at_distance(2, "1 mi")];
        sort_applications(&mut apps, SortOrder::parse_lenient("cheapest"));
        assert_eq!(ids(&apps), vec![1, 2]);

        sort_applications(&mut apps, SortOrder::parse_lenient("closing-soon"));
        assert_eq!(ids(&apps), vec![1, 2]);

        sort_applications(&mut apps, SortOrder::parse_lenient("distance"));
        assert_eq!(ids(&apps), vec![2, 1]);
    }
}
