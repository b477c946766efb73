use geo::HaversineDistance;
use geo::Point;

/// Assumed speed for the unmapped stretch between a query point and its snapped node
pub const LAST_MILE_SPEED_KMH: f64 = 40.0;

/// Great-circle distance in kilometres
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let p1 = Point::new(lon1, lat1);
    let p2 = Point::new(lon2, lat2);
    p1.haversine_distance(&p2) / 1000.0
}

/// Minutes needed to cover `km` at `speed_kmh`
pub fn minutes_at(km: f64, speed_kmh: f64) -> f64 {
    km / speed_kmh * 60.0
}
