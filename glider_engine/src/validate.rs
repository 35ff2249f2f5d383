//! Position fix validation and outlier rejection.
//!
//! Every length-conforming `B` record ends in one of three verdicts:
//! - accepted: becomes the current fix and feeds the state machines
//! - rejected: dropped, the current fix stays exactly as it was
//! - discarded: becomes the current fix but is not fed downstream

use std::fmt;

use chrono::NaiveTime;
use serde::Serialize;

use crate::altitude::{agl_feet, meters_to_feet, AltitudeDatum};
use crate::elevation::ElevationService;
use crate::geo::{haversine_distance, meters_per_second_to_mph, KMH_TO_MPH};
use crate::record::PositionRecord;
use crate::sensor::{Channel, ChannelValues, SensorMap};

const MAX_STEP_DISTANCE_M: f64 = 5000.0;
const MIN_PRESSURE_ALTITUDE: i32 = -500;
const MAX_PRESSURE_JUMP: i32 = 800;
const SPEED_SPIKE_FACTOR: f64 = 15.0;

/// One accepted (or discarded) position fix with its derived values.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Sample {
    pub time: NaiveTime,
    pub latitude: f64,
    pub longitude: f64,
    /// Raw pressure altitude in meters.
    pub pressure_altitude: i32,
    pub gnss_altitude: Option<i32>,
    /// Pressure altitude after the datum offset, in meters.
    pub altitude_m: i32,
    pub msl_ft: f64,
    pub agl_ft: f64,
    pub ground_ft: f64,
    pub speed_mph: f64,
    pub distance_m: f64,
    #[serde(skip)]
    pub channels: ChannelValues,
}

impl Sample {
    pub fn channel(&self, channel: Channel) -> Option<u32> {
        self.channels.get(channel)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    ZeroTime,
    InvalidTime,
    Hemisphere,
    LatitudeDegrees,
    LongitudeDegrees,
    VoidFix,
    PositionJump,
    SixtySeconds,
    PressureAltitude,
    PressureJump,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiscardReason {
    ZeroElapsed,
    SpeedSpike,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RejectReason::ZeroTime => "time is 000000",
            RejectReason::InvalidTime => "time out of range",
            RejectReason::Hemisphere => "invalid hemisphere flags",
            RejectReason::LatitudeDegrees => "latitude degrees out of range",
            RejectReason::LongitudeDegrees => "longitude degrees out of range",
            RejectReason::VoidFix => "void fix",
            RejectReason::PositionJump => "position jump over 5000 m",
            RejectReason::SixtySeconds => "seconds field is 60",
            RejectReason::PressureAltitude => "implausible pressure altitude",
            RejectReason::PressureJump => "pressure altitude jump over 800",
        };
        f.write_str(text)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    Accepted {
        sample: Sample,
        previous: Option<Sample>,
    },
    Rejected(RejectReason),
    Discarded(DiscardReason),
}

/// Per-flight-attempt validator state: the current fix, the datum and running maxima.
#[derive(Clone, Debug, Default)]
pub struct SampleValidator {
    current: Option<Sample>,
    accepted: u32,
    datum: AltitudeDatum,
    takeoff_point: Option<(f64, f64)>,
    max_altitude_m: i32,
    max_agl_ft: f64,
    start_altitude_m: Option<i32>,
}

impl SampleValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&Sample> {
        self.current.as_ref()
    }

    /// Number of fixes that passed the rejection rules since the last reset.
    pub fn accepted_count(&self) -> u32 {
        self.accepted
    }

    /// Position of the first accepted fix of this flight attempt.
    pub fn takeoff_point(&self) -> Option<(f64, f64)> {
        self.takeoff_point
    }

    pub fn max_altitude_m(&self) -> i32 {
        self.max_altitude_m
    }

    pub fn max_agl_ft(&self) -> f64 {
        self.max_agl_ft
    }

    /// Altitude reference recorded at the first fix above zero, in meters.
    pub fn start_altitude_m(&self) -> Option<i32> {
        self.start_altitude_m
    }

    pub fn push<E: ElevationService + ?Sized>(
        &mut self,
        record: &PositionRecord<'_>,
        sensors: &SensorMap,
        elevation: &E,
    ) -> Verdict {
        let (latitude, longitude) = match check_position(record) {
            Ok(position) => position,
            Err(reason) => return Verdict::Rejected(reason),
        };

        let previous = self.current.clone();
        let distance_m = previous
            .as_ref()
            .map(|p| haversine_distance(p.latitude, p.longitude, latitude, longitude))
            .unwrap_or(0.0);

        if record.validity == b'V' {
            return Verdict::Rejected(RejectReason::VoidFix);
        }
        if distance_m > MAX_STEP_DISTANCE_M {
            return Verdict::Rejected(RejectReason::PositionJump);
        }
        if record.time.second == 60 {
            return Verdict::Rejected(RejectReason::SixtySeconds);
        }
        let pressure = record.pressure_altitude;
        if pressure < MIN_PRESSURE_ALTITUDE || pressure == 0 {
            return Verdict::Rejected(RejectReason::PressureAltitude);
        }
        if let Some(prev) = previous.as_ref().filter(|_| self.accepted > 0) {
            if (prev.pressure_altitude - pressure).abs() > MAX_PRESSURE_JUMP {
                return Verdict::Rejected(RejectReason::PressureJump);
            }
        }
        let Some(time) =
            NaiveTime::from_hms_opt(record.time.hour, record.time.minute, record.time.second)
        else {
            return Verdict::Rejected(RejectReason::InvalidTime);
        };

        self.accepted += 1;
        if self.accepted == 1 {
            self.datum =
                AltitudeDatum::establish(pressure, elevation.elevation_at(latitude, longitude));
            self.takeoff_point = Some((latitude, longitude));
        }

        let altitude_m = self.datum.apply(pressure);
        if altitude_m > self.max_altitude_m {
            self.max_altitude_m = altitude_m;
        }
        if self.start_altitude_m.is_none() && altitude_m > 0 {
            self.start_altitude_m = Some(if self.datum.offset_m == 0 {
                self.datum.ground_m.trunc() as i32
            } else {
                altitude_m
            });
        }

        let msl_ft = meters_to_feet(altitude_m);
        let channels = sensors.read_values(record.line());
        let previous_speed = previous.as_ref().map(|p| p.speed_mph).unwrap_or(0.0);
        let mut sample = Sample {
            time,
            latitude,
            longitude,
            pressure_altitude: pressure,
            gnss_altitude: record.gnss_altitude,
            altitude_m,
            msl_ft,
            agl_ft: msl_ft,
            ground_ft: 0.0,
            speed_mph: previous_speed,
            distance_m,
            channels,
        };

        let elapsed = previous
            .as_ref()
            .map(|p| time.signed_duration_since(p.time).num_seconds())
            .unwrap_or(1);
        if elapsed == 0 {
            self.current = Some(sample);
            return Verdict::Discarded(DiscardReason::ZeroElapsed);
        }

        sample.speed_mph = if sensors.is_declared(Channel::Gsp) {
            f64::from(channels.get(Channel::Gsp).unwrap_or(0)) * KMH_TO_MPH
        } else {
            meters_per_second_to_mph(distance_m, elapsed as f64)
        };
        if previous_speed != 0.0 && sample.speed_mph > SPEED_SPIKE_FACTOR * previous_speed {
            self.current = Some(sample);
            return Verdict::Discarded(DiscardReason::SpeedSpike);
        }

        let (agl_ft, ground_ft) = agl_feet(msl_ft, elevation.elevation_at(latitude, longitude));
        sample.agl_ft = agl_ft;
        sample.ground_ft = ground_ft;
        if agl_ft > self.max_agl_ft {
            self.max_agl_ft = agl_ft;
        }

        self.current = Some(sample.clone());
        Verdict::Accepted { sample, previous }
    }
}

/// Step one and two of validation: flags and coordinate ranges, then signed degrees.
fn check_position(record: &PositionRecord<'_>) -> Result<(f64, f64), RejectReason> {
    if record.time.is_zero() {
        return Err(RejectReason::ZeroTime);
    }
    let south = match record.lat_hemisphere {
        b'N' => false,
        b'S' => true,
        _ => return Err(RejectReason::Hemisphere),
    };
    let west = match record.lon_hemisphere {
        b'E' => false,
        b'W' => true,
        _ => return Err(RejectReason::Hemisphere),
    };
    if record.lat_degrees == 0 || record.lat_degrees > 90 {
        return Err(RejectReason::LatitudeDegrees);
    }
    if record.lon_degrees > 180 {
        return Err(RejectReason::LongitudeDegrees);
    }

    let mut latitude =
        f64::from(record.lat_degrees) + f64::from(record.lat_minutes_milli) / 60000.0;
    let mut longitude =
        f64::from(record.lon_degrees) + f64::from(record.lon_minutes_milli) / 60000.0;
    if latitude > 90.0 {
        return Err(RejectReason::LatitudeDegrees);
    }
    if longitude > 180.0 {
        return Err(RejectReason::LongitudeDegrees);
    }
    if south {
        latitude = -latitude;
    }
    if west {
        longitude = -longitude;
    }
    Ok((latitude, longitude))
}
