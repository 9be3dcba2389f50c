//! Distance and name-similarity primitives shared by linkage and conflict
//! detection.

use crate::model::GeoPoint;

/// Mean Earth radius (IUGG), metres.
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Great-circle distance in metres (haversine).
///
/// Returns NaN when either point is non-finite; callers screen positions
/// with [`GeoPoint::is_valid`] first.
pub fn distance_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Lowercase, trim, collapse internal whitespace.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Exact match after normalization, or similarity at or above `threshold`.
pub fn names_similar(a: &str, b: &str, threshold: f64) -> bool {
    let (na, nb) = (normalize_name(a), normalize_name(b));
    na == nb || strsim::normalized_levenshtein(&na, &nb) >= threshold
}
