//! Takeoff/landing detection and the finished flight record.

use std::fmt;

use chrono::{NaiveDate, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::{Edge, EngineRun, ThresholdEdges};
use crate::sensor::PrimaryChannel;
use crate::validate::Sample;

pub const TAKEOFF_SPEED_MPH: f64 = 35.0;
pub const LANDING_SPEED_MPH: f64 = 15.0;
pub const LANDING_AGL_FT: f64 = 200.0;
/// Landing candidates absorbed as noise before one counts.
pub const LANDING_NOISE_SAMPLES: u32 = 5;
pub const HOME_RADIUS_M: f64 = 1500.0;
/// Margin added to the start altitude for the start pressure reference.
pub const START_REFERENCE_MARGIN_M: i32 = 180;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum LandingKind {
    #[serde(rename = "HOME")]
    Home,
    #[serde(rename = "LOUT")]
    Outlanding,
}

impl LandingKind {
    pub fn classify(distance_m: f64) -> Self {
        if distance_m > HOME_RADIUS_M {
            LandingKind::Outlanding
        } else {
            LandingKind::Home
        }
    }
}

impl fmt::Display for LandingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LandingKind::Home => f.write_str("HOME"),
            LandingKind::Outlanding => f.write_str("LOUT"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FlightPhase {
    Idle,
    Airborne,
    Landed,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FlightEvent {
    Takeoff { time: NaiveTime },
    Landing { time: NaiveTime },
}

#[derive(Clone, Debug)]
pub struct FlightStateMachine {
    phase: FlightPhase,
    takeoff_time: Option<NaiveTime>,
    landing_candidates: u32,
}

impl Default for FlightStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl FlightStateMachine {
    pub fn new() -> Self {
        Self {
            phase: FlightPhase::Idle,
            takeoff_time: None,
            landing_candidates: 0,
        }
    }

    pub fn is_airborne(&self) -> bool {
        self.phase == FlightPhase::Airborne
    }

    pub fn takeoff_time(&self) -> Option<NaiveTime> {
        self.takeoff_time
    }

    /// Advance on one accepted sample. `has_previous` is false for the first
    /// fix of a flight attempt, which never counts towards a landing.
    pub fn observe(&mut self, sample: &Sample, has_previous: bool) -> Option<FlightEvent> {
        match self.phase {
            FlightPhase::Idle => {
                if sample.speed_mph >= TAKEOFF_SPEED_MPH {
                    self.phase = FlightPhase::Airborne;
                    self.takeoff_time = Some(sample.time);
                    return Some(FlightEvent::Takeoff { time: sample.time });
                }
                None
            }
            FlightPhase::Airborne => {
                if !has_previous
                    || sample.speed_mph > LANDING_SPEED_MPH
                    || sample.agl_ft > LANDING_AGL_FT
                {
                    return None;
                }
                self.landing_candidates += 1;
                if self.landing_candidates <= LANDING_NOISE_SAMPLES {
                    return None;
                }
                self.phase = FlightPhase::Landed;
                Some(FlightEvent::Landing { time: sample.time })
            }
            FlightPhase::Landed => None,
        }
    }
}

/// Landing minus takeoff, wrapped forward by a day when the flight crosses midnight.
pub fn flight_duration(takeoff: NaiveTime, landing: NaiveTime) -> TimeDelta {
    let delta = landing.signed_duration_since(takeoff);
    if delta < TimeDelta::zero() {
        delta + TimeDelta::days(1)
    } else {
        delta
    }
}

/// Summary of one detected flight.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FlightRecord {
    pub date: Option<NaiveDate>,
    pub glider_type: String,
    pub glider_id: Option<String>,
    pub pilot: Option<String>,
    pub takeoff: NaiveTime,
    pub landing: NaiveTime,
    pub duration_s: i64,
    pub landing_kind: LandingKind,
    pub landing_distance_m: f64,
    pub max_msl_ft: f64,
    pub max_agl_ft: f64,
    pub start_altitude_m: i32,
    pub start_pressure_reference_m: i32,
    pub primary_channel: PrimaryChannel,
    pub engine_runs: Vec<EngineRun>,
    pub enl_noise: Vec<Edge>,
    pub mop: Vec<ThresholdEdges>,
    pub closed_at_end_of_trace: bool,
}

impl FlightRecord {
    pub fn duration(&self) -> TimeDelta {
        TimeDelta::seconds(self.duration_s)
    }

    pub(crate) fn log_summary(&self) {
        debug!(
            "Glider: {} Date: {} Flight Time: {} Landing: {} Start Alt: {} ft MSL",
            self.glider_type,
            self.date_text(),
            self.duration_text(),
            self.landing_kind,
            (f64::from(self.start_altitude_m) * crate::geo::METERS_TO_FEET).trunc() as i64,
        );
        debug!(
            "Start Time: {} Stop Time: {} Max Altitude: {} [{}] ft MSL",
            self.takeoff.format("%H%M%S"),
            self.landing.format("%H%M%S"),
            self.max_msl_ft.trunc() as i64,
            self.max_agl_ft.trunc() as i64,
        );
    }
}
