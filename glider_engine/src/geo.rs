//! Great-circle distance and the unit conversions used by the sample pipeline.

pub const METERS_TO_FEET: f64 = 3.28084;
pub const KMH_TO_MPH: f64 = 0.621371;
const FEET_PER_MILE: f64 = 5280.0;
const SECONDS_PER_HOUR: f64 = 3600.0;
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance in meters between two points given in decimal degrees.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let to_rad = |deg: f64| deg.to_radians();
    let dlat = to_rad(lat2 - lat1);
    let dlon = to_rad(lon2 - lon1);
    let a = (dlat / 2.0).sin().powi(2)
        + to_rad(lat1).cos() * to_rad(lat2).cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Converts a ground distance covered in `seconds` to miles per hour.
pub fn meters_per_second_to_mph(meters: f64, seconds: f64) -> f64 {
    if seconds == 0.0 {
        return 0.0;
    }
    (meters / seconds) * METERS_TO_FEET / FEET_PER_MILE * SECONDS_PER_HOUR
}
