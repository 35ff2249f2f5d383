//! Pressure altitude to MSL/AGL normalization.

use tracing::debug;

use crate::geo::METERS_TO_FEET;

/// Offsets above this many meters are implausible and replaced by zero.
pub const MAX_DATUM_OFFSET_M: i32 = 150;

/// One-time correction of pressure altitude against ground elevation at the
/// first accepted fix of a flight.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AltitudeDatum {
    pub offset_m: i32,
    /// Ground elevation at the datum point; 0 when unavailable.
    pub ground_m: f64,
}

impl AltitudeDatum {
    pub fn establish(pressure_altitude: i32, ground: Option<f64>) -> Self {
        let Some(ground_m) = ground else {
            debug!(
                pressure_altitude,
                "No elevation data at start point, altitude offset 0"
            );
            return Self::default();
        };
        let mut offset_m = pressure_altitude - ground_m.trunc() as i32;
        if offset_m > MAX_DATUM_OFFSET_M {
            offset_m = 0;
        }
        debug!(
            "Calculating surface height and altitude offset at start pressure alt: {}; surface: {}; offset: {}",
            pressure_altitude,
            ground_m.trunc() as i64,
            offset_m
        );
        Self { offset_m, ground_m }
    }

    /// Pressure altitude corrected by the datum offset, in meters.
    pub fn apply(&self, pressure_altitude: i32) -> i32 {
        pressure_altitude - self.offset_m
    }
}

/// Height above ground in feet given MSL feet and the ground elevation in meters.
pub fn agl_feet(msl_ft: f64, ground_m: Option<f64>) -> (f64, f64) {
    let ground_ft = ground_m.map(|g| (g * METERS_TO_FEET).trunc()).unwrap_or(0.0);
    (msl_ft - ground_ft, ground_ft)
}

pub fn meters_to_feet(meters: i32) -> f64 {
    METERS_TO_FEET * f64::from(meters)
}
