//! Distance-based provider search.
//!
//! A plain linear scan: every candidate is measured against the search
//! centre with the haversine formula, kept if within the radius, then
//! ordered by distance. Provider counts per search are in the hundreds,
//! so no spatial index is involved.

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

pub const EARTH_RADIUS_KM: f64 = 6371.0;
pub const DEFAULT_RADIUS_KM: f64 = 50.0;
pub const MAX_RADIUS_KM: f64 = 500.0;

pub const NEARBY_KM: f64 = 10.0;
pub const CLOSE_KM: f64 = 25.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Result<Self> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(AppError::Validation(format!("Latitudine non valida: {lat}")));
        }
        if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
            return Err(AppError::Validation(format!("Longitudine non valida: {lon}")));
        }
        Ok(Self { lat, lon })
    }
}

/// Anything with an optional position on the map.
pub trait Locatable {
    fn location(&self) -> Option<GeoPoint>;
}

#[derive(Debug, Clone, Serialize)]
pub struct WithDistance<T> {
    #[serde(flatten)]
    pub item: T,
    pub distance_km: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DistanceGroups<T> {
    pub nearby: Vec<WithDistance<T>>,
    pub close: Vec<WithDistance<T>>,
    pub far: Vec<WithDistance<T>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DistanceStats {
    pub count: usize,
    pub min_km: f64,
    pub max_km: f64,
    pub average_km: f64,
}

pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Resolve a requested radius: default when absent, rejected when not a
/// positive finite number, clamped to [`MAX_RADIUS_KM`].
pub fn normalize_radius(radius_km: Option<f64>) -> Result<f64> {
    let radius = radius_km.unwrap_or(DEFAULT_RADIUS_KM);
    if !radius.is_finite() || radius <= 0.0 {
        return Err(AppError::Validation(format!("Raggio di ricerca non valido: {radius}")));
    }
    Ok(radius.min(MAX_RADIUS_KM))
}

pub fn search_within_radius<T, I>(items: I, center: GeoPoint, radius_km: f64) -> Vec<WithDistance<T>>
where
    T: Locatable,
    I: IntoIterator<Item = T>,
{
    let mut results: Vec<WithDistance<T>> = items
        .into_iter()
        .filter_map(|item| {
            let point = item.location()?;
            let distance_km = haversine_km(center, point);
            (distance_km <= radius_km).then_some(WithDistance { item, distance_km })
        })
        .collect();

    // Stable sort keeps input order for equal distances.
    results.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    results
}

pub fn group_by_distance<T>(results: Vec<WithDistance<T>>) -> DistanceGroups<T> {
    let mut groups = DistanceGroups {
        nearby: Vec::new(),
        close: Vec::new(),
        far: Vec::new(),
    };

    for result in results {
        if result.distance_km <= NEARBY_KM {
            groups.nearby.push(result);
        } else if result.distance_km <= CLOSE_KM {
            groups.close.push(result);
        } else {
            groups.far.push(result);
        }
    }

    groups
}

pub fn distance_stats<T>(results: &[WithDistance<T>]) -> Option<DistanceStats> {
    if results.is_empty() {
        return None;
    }

    let (min_km, max_km, sum) = results.iter().fold(
        (f64::INFINITY, f64::NEG_INFINITY, 0.0),
        |(min, max, sum), r| (min.min(r.distance_km), max.max(r.distance_km), sum + r.distance_km),
    );

    Some(DistanceStats {
        count: results.len(),
        min_km,
        max_km,
        average_km: sum / results.len() as f64,
    })
}

pub fn format_distance(km: f64) -> String {
    // Decide on the rounded value so 999.6 m reads as a kilometre.
    let metres = (km * 1000.0).round();
    if metres < 1000.0 {
        format!("{} m", metres as i64)
    } else {
        format!("{km:.1} km")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Place {
        name: &'static str,
        at: Option<GeoPoint>,
    }

    impl Locatable for Place {
        fn location(&self) -> Option<GeoPoint> {
            self.at
        }
    }

    fn point(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).unwrap()
    }

    fn place(name: &'static str, lat: f64, lon: f64) -> Place {
        Place {
            name,
            at: Some(point(lat, lon)),
        }
    }

    const MILANO: (f64, f64) = (45.4642, 9.1900);

    #[test]
    fn haversine_matches_known_distance() {
        // Milano Duomo to Roma Colosseo, roughly 477 km as the crow flies.
        let d = haversine_km(point(45.4642, 9.1900), point(41.8902, 12.4922));
        assert!((d - 477.0).abs() < 3.0, "got {d}");
    }

    #[test]
    fn haversine_is_zero_for_same_point() {
        let p = point(MILANO.0, MILANO.1);
        assert_eq!(haversine_km(p, p), 0.0);
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert!(GeoPoint::new(91.0, 0.0).is_err());
        assert!(GeoPoint::new(0.0, -180.5).is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn radius_defaults_and_clamps() {
        assert_eq!(normalize_radius(None).unwrap(), DEFAULT_RADIUS_KM);
        assert_eq!(normalize_radius(Some(10_000.0)).unwrap(), MAX_RADIUS_KM);
        assert!(normalize_radius(Some(0.0)).is_err());
        assert!(normalize_radius(Some(-5.0)).is_err());
        assert!(normalize_radius(Some(f64::INFINITY)).is_err());
    }

    #[test]
    fn search_filters_sorts_and_skips_unlocated() {
        let center = point(MILANO.0, MILANO.1);
        let places = vec![
            place("bergamo", 45.6983, 9.6773),
            place("sesto", 45.5353, 9.2346),
            Place { name: "nowhere", at: None },
            place("roma", 41.9028, 12.4964),
            place("monza", 45.5845, 9.2744),
        ];

        let results = search_within_radius(places, center, 60.0);
        let names: Vec<_> = results.iter().map(|r| r.item.name).collect();
        assert_eq!(names, vec!["sesto", "monza", "bergamo"]);
        assert!(results.windows(2).all(|w| w[0].distance_km <= w[1].distance_km));
    }

    #[test]
    fn groups_split_on_thresholds() {
        let center = point(MILANO.0, MILANO.1);
        let places = vec![
            place("sesto", 45.5353, 9.2346),
            place("monza", 45.5845, 9.2744),
            place("bergamo", 45.6983, 9.6773),
        ];
        let groups = group_by_distance(search_within_radius(places, center, 100.0));

        assert_eq!(groups.nearby.len(), 1);
        assert_eq!(groups.close.len(), 1);
        assert_eq!(groups.far.len(), 1);
        assert_eq!(groups.far[0].item.name, "bergamo");
    }

    #[test]
    fn stats_cover_min_max_average() {
        let results = vec![
            WithDistance { item: (), distance_km: 2.0 },
            WithDistance { item: (), distance_km: 4.0 },
            WithDistance { item: (), distance_km: 9.0 },
        ];
        let stats = distance_stats(&results).unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.min_km, 2.0);
        assert_eq!(stats.max_km, 9.0);
        assert_eq!(stats.average_km, 5.0);

        let empty: Vec<WithDistance<()>> = Vec::new();
        assert!(distance_stats(&empty).is_none());
    }

    #[test]
    fn formats_meters_and_kilometers() {
        assert_eq!(format_distance(0.85), "850 m");
        assert_eq!(format_distance(3.24), "3.2 km");
        assert_eq!(format_distance(12.0), "12.0 km");
        assert_eq!(format_distance(0.9996), "1.0 km");
        assert_eq!(format_distance(0.9994), "999 m");
    }
}
