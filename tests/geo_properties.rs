use bookinghse::geo::{
    distance_stats, group_by_distance, haversine_km, search_within_radius, GeoPoint, Locatable,
};
use proptest::prelude::*;

#[derive(Debug, Clone)]
struct Site {
    id: usize,
    point: Option<GeoPoint>,
}

impl Locatable for Site {
    fn location(&self) -> Option<GeoPoint> {
        self.point
    }
}

fn point() -> impl Strategy<Value = GeoPoint> {
    (-90.0f64..=90.0, -180.0f64..=180.0).prop_map(|(lat, lon)| GeoPoint { lat, lon })
}

// Roughly the Italian peninsula, where most searches happen.
fn italian_point() -> impl Strategy<Value = GeoPoint> {
    (36.5f64..47.0, 6.5f64..18.5).prop_map(|(lat, lon)| GeoPoint { lat, lon })
}

fn sites() -> impl Strategy<Value = Vec<Site>> {
    prop::collection::vec(prop::option::weighted(0.9, italian_point()), 0..40).prop_map(|points| {
        points
            .into_iter()
            .enumerate()
            .map(|(id, point)| Site { id, point })
            .collect()
    })
}

proptest! {
    #[test]
    fn distance_is_symmetric_and_bounded(a in point(), b in point()) {
        let ab = haversine_km(a, b);
        let ba = haversine_km(b, a);
        prop_assert!(ab >= 0.0);
        prop_assert!((ab - ba).abs() < 1e-6);
        prop_assert!(ab <= std::f64::consts::PI * 6371.0 + 1e-6);
    }

    #[test]
    fn distance_to_self_is_zero(a in point()) {
        prop_assert!(haversine_km(a, a).abs() < 1e-9);
    }

    #[test]
    fn search_results_are_sorted_and_in_range(
        sites in sites(),
        center in italian_point(),
        radius in 1.0f64..500.0,
    ) {
        let with_location = sites.iter().filter(|s| s.point.is_some()).count();
        let results = search_within_radius(sites, center, radius);

        prop_assert!(results.len() <= with_location);
        for pair in results.windows(2) {
            prop_assert!(pair[0].distance_km <= pair[1].distance_km);
            if pair[0].distance_km == pair[1].distance_km {
                prop_assert!(pair[0].item.id < pair[1].item.id);
            }
        }
        for result in &results {
            prop_assert!(result.item.point.is_some());
            prop_assert!(result.distance_km <= radius);
        }
    }

    #[test]
    fn groups_partition_the_results(sites in sites(), center in italian_point()) {
        let results = search_within_radius(sites, center, 500.0);
        let total = results.len();
        let stats = distance_stats(&results);
        let groups = group_by_distance(results);

        prop_assert_eq!(groups.nearby.len() + groups.close.len() + groups.far.len(), total);
        prop_assert!(groups.nearby.iter().all(|r| r.distance_km <= 10.0));
        prop_assert!(groups.close.iter().all(|r| r.distance_km > 10.0 && r.distance_km <= 25.0));
        prop_assert!(groups.far.iter().all(|r| r.distance_km > 25.0));

        match stats {
            None => prop_assert_eq!(total, 0),
            Some(stats) => {
                prop_assert_eq!(stats.count, total);
                prop_assert!(stats.min_km <= stats.average_km + 1e-9);
                prop_assert!(stats.average_km <= stats.max_km + 1e-9);
            }
        }
    }
}
