//! Flight and engine-run detection for IGC glider flight-recorder traces.
//!
//! A trace is consumed line by line: records are decoded, fixes are
//! validated and normalized against ground elevation, and a flight state
//! machine plus a bank of engine-run detectors turn the accepted fixes into
//! one [`FlightRecord`] per detected flight.

pub mod altitude;
pub mod analyzer;
pub mod elevation;
pub mod engine;
pub mod flight;
pub mod geo;
pub mod record;
pub mod report;
pub mod sensor;
pub mod validate;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use analyzer::{
    analyze_reader, analyze_str, TraceAnalyzer, TraceHeader, TraceStats, TraceSummary,
};
pub use elevation::{ElevationService, NoElevation};
pub use engine::{Edge, EdgeKind, EngineRun, ThresholdEdges};
pub use flight::{FlightRecord, LandingKind};
pub use report::report_header;
pub use sensor::{Channel, PrimaryChannel, SensorMap};

/// MOP power levels evaluated when no thresholds are configured.
pub const DEFAULT_MOP_THRESHOLDS: [u32; 5] = [300, 400, 500, 600, 700];

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to read trace")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    /// Ordered MOP thresholds, one detector and one report column each.
    pub mop_thresholds: Vec<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mop_thresholds: DEFAULT_MOP_THRESHOLDS.to_vec(),
        }
    }
}

impl EngineConfig {
    pub fn with_thresholds(mop_thresholds: Vec<u32>) -> Result<Self, EngineError> {
        let config = Self { mop_thresholds };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        for (i, threshold) in self.mop_thresholds.iter().enumerate() {
            if *threshold == 0 {
                return Err(EngineError::InvalidConfig(
                    "MOP thresholds must be > 0".into(),
                ));
            }
            if self.mop_thresholds[..i].contains(threshold) {
                return Err(EngineError::InvalidConfig(format!(
                    "duplicate MOP threshold {threshold}"
                )));
            }
        }
        Ok(())
    }
}
