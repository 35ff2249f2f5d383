//! Ground elevation lookup seam.
//!
//! The analyzer only ever asks for a single point; loading and indexing the
//! elevation model is left to the caller.

/// Source of ground elevation in meters above mean sea level.
pub trait ElevationService {
    /// Elevation at the given point, or `None` when the model has no data there.
    fn elevation_at(&self, latitude: f64, longitude: f64) -> Option<f64>;
}

/// Elevation service without any data; every lookup is unavailable.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoElevation;

impl ElevationService for NoElevation {
    fn elevation_at(&self, _latitude: f64, _longitude: f64) -> Option<f64> {
        None
    }
}

impl<F> ElevationService for F
where
    F: Fn(f64, f64) -> Option<f64>,
{
    fn elevation_at(&self, latitude: f64, longitude: f64) -> Option<f64> {
        self(latitude, longitude)
    }
}
