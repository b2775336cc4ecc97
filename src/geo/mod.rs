pub mod nominatim;
pub mod search;

pub use nominatim::{GeocodeResult, NominatimClient};
pub use search::{
    distance_stats, format_distance, group_by_distance, haversine_km, normalize_radius, search_within_radius,
    DistanceGroups, DistanceStats, GeoPoint, Locatable, WithDistance,
};
