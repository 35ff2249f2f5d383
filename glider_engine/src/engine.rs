//! Engine-run detection from extension channels.
//!
//! All detectors share one two-threshold hysteresis shape: a reading above
//! `on_above` while off records a rising edge, a reading below `off_below`
//! while on records a falling edge. Rising edges are only armed once the
//! flight is airborne.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::sensor::{Channel, PrimaryChannel, SensorMap};
use crate::validate::Sample;

/// Falling-edge level shared by the per-threshold MOP detectors.
pub const MOP_OFF_BELOW: u32 = 50;
pub const ENL_NOISE_ON_ABOVE: u32 = 600;
pub const ENL_NOISE_OFF_BELOW: u32 = 250;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    On,
    Off,
}

/// One detector transition with the altitude at which it happened.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    pub kind: EdgeKind,
    pub time: NaiveTime,
    pub msl_ft: f64,
    pub agl_ft: f64,
}

impl Edge {
    fn at(kind: EdgeKind, sample: &Sample) -> Self {
        Self {
            kind,
            time: sample.time,
            msl_ft: sample.msl_ft,
            agl_ft: sample.agl_ft,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Hysteresis {
    on_above: u32,
    off_below: u32,
    on: bool,
}

impl Hysteresis {
    pub fn new(on_above: u32, off_below: u32) -> Self {
        Self {
            on_above,
            off_below,
            on: false,
        }
    }

    pub fn step(&mut self, value: u32, armed: bool) -> Option<EdgeKind> {
        if !self.on && armed && value > self.on_above {
            self.on = true;
            Some(EdgeKind::On)
        } else if self.on && value < self.off_below {
            self.on = false;
            Some(EdgeKind::Off)
        } else {
            None
        }
    }
}

/// Edges recorded for one configured MOP threshold.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ThresholdEdges {
    pub threshold: u32,
    pub edges: Vec<Edge>,
}

/// A rising edge of the primary channel and its matching falling edge.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EngineRun {
    pub on: Edge,
    pub off: Edge,
    /// True when no falling edge was seen and the run was closed at flight end.
    pub closed_at_flight_end: bool,
}

impl EngineRun {
    pub fn duration_s(&self) -> i64 {
        self.off.time.signed_duration_since(self.on.time).num_seconds()
    }

    /// Whole minutes, truncated.
    pub fn minutes(&self) -> i64 {
        self.duration_s() / 60
    }

    /// Height gained (or lost) between the edges, in whole feet.
    pub fn height_gain_ft(&self) -> i64 {
        self.off.msl_ft.trunc() as i64 - self.on.msl_ft.trunc() as i64
    }
}

/// Sample context the detectors need besides the current fix.
#[derive(Clone, Copy, Debug)]
pub struct DetectorInput<'a> {
    pub sample: &'a Sample,
    pub previous: Option<&'a Sample>,
    pub airborne: bool,
    pub takeoff_time: Option<NaiveTime>,
}

/// Per-flight detector bank: primary channel, one per MOP threshold and ENL noise.
#[derive(Clone, Debug)]
pub struct EngineDetectors {
    primary: Option<(PrimaryChannel, Hysteresis)>,
    primary_edges: Vec<Edge>,
    mop: Vec<(Hysteresis, ThresholdEdges)>,
    enl_noise: Hysteresis,
    enl_edges: Vec<Edge>,
}

impl EngineDetectors {
    pub fn new(mop_thresholds: &[u32]) -> Self {
        Self {
            primary: None,
            primary_edges: Vec::new(),
            mop: mop_thresholds
                .iter()
                .map(|&threshold| {
                    (
                        Hysteresis::new(threshold, MOP_OFF_BELOW),
                        ThresholdEdges {
                            threshold,
                            edges: Vec::new(),
                        },
                    )
                })
                .collect(),
            enl_noise: Hysteresis::new(ENL_NOISE_ON_ABOVE, ENL_NOISE_OFF_BELOW),
            enl_edges: Vec::new(),
        }
    }

    /// Back to the all-off state with no recorded edges, keeping the thresholds.
    pub fn reset(&mut self) {
        let thresholds: Vec<u32> = self.mop.iter().map(|(_, t)| t.threshold).collect();
        *self = Self::new(&thresholds);
    }

    pub fn observe(&mut self, sensors: &SensorMap, input: DetectorInput<'_>) {
        let sample = input.sample;

        if let Some(mop) = sample.channel(Channel::Mop) {
            for (hysteresis, record) in &mut self.mop {
                if let Some(kind) = hysteresis.step(mop, input.airborne) {
                    record.edges.push(Edge::at(kind, sample));
                }
            }
        }

        self.observe_primary(sensors.primary(), input);

        if !sensors.is_declared(Channel::Rpm) {
            let enl = sample.channel(Channel::Enl).unwrap_or(0);
            if let Some(kind) = self.enl_noise.step(enl, input.airborne) {
                self.enl_edges.push(Edge::at(kind, sample));
            }
        }
    }

    fn observe_primary(&mut self, primary: PrimaryChannel, input: DetectorInput<'_>) {
        let (Some(channel), Some((on_above, off_below))) = (primary.channel(), primary.limits())
        else {
            return;
        };
        let sample = input.sample;
        let value = sample.channel(channel).unwrap_or(0);
        if self.primary.map(|(current, _)| current) != Some(primary) {
            self.primary = Some((primary, Hysteresis::new(on_above, off_below)));
        }
        let Some((_, hysteresis)) = self.primary.as_mut() else {
            return;
        };

        let edge = match hysteresis.step(value, input.airborne) {
            // An engine already running at takeoff is credited from the takeoff fix.
            Some(EdgeKind::On) => match input.previous {
                Some(prev) if Some(prev.time) == input.takeoff_time => Edge {
                    kind: EdgeKind::On,
                    time: prev.time,
                    msl_ft: prev.msl_ft,
                    agl_ft: prev.msl_ft - sample.ground_ft,
                },
                _ => Edge::at(EdgeKind::On, sample),
            },
            Some(EdgeKind::Off) => Edge::at(EdgeKind::Off, sample),
            None => return,
        };
        self.primary_edges.push(edge);
    }

    pub fn primary_edges(&self) -> &[Edge] {
        &self.primary_edges
    }

    pub fn enl_edges(&self) -> &[Edge] {
        &self.enl_edges
    }

    pub fn mop_edges(&self) -> impl Iterator<Item = &ThresholdEdges> {
        self.mop.iter().map(|(_, edges)| edges)
    }

    /// Pair primary edges into runs; a dangling rising edge is closed at `last`.
    pub fn engine_runs(&self, last: &Sample) -> Vec<EngineRun> {
        let pairs = self.primary_edges.chunks_exact(2);
        let dangling = pairs.remainder().first().map(|on| EngineRun {
            on: on.clone(),
            off: Edge::at(EdgeKind::Off, last),
            closed_at_flight_end: true,
        });
        pairs
            .map(|pair| EngineRun {
                on: pair[0].clone(),
                off: pair[1].clone(),
                closed_at_flight_end: false,
            })
            .chain(dangling)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::ChannelValues;

    fn sample(second: u32, channels: ChannelValues) -> Sample {
        Sample {
            time: NaiveTime::from_hms_opt(12, 0, second).unwrap(),
            latitude: 45.0,
            longitude: -72.0,
            pressure_altitude: 1000,
            gnss_altitude: None,
            altitude_m: 1000,
            msl_ft: 3280.84 + f64::from(second),
            agl_ft: 2000.0,
            ground_ft: 1280.0,
            speed_mph: 50.0,
            distance_m: 20.0,
            channels,
        }
    }

    fn airborne<'a>(sample: &'a Sample, previous: Option<&'a Sample>) -> DetectorInput<'a> {
        DetectorInput {
            sample,
            previous,
            airborne: true,
            takeoff_time: NaiveTime::from_hms_opt(11, 0, 0),
        }
    }

    fn mop_sensors() -> SensorMap {
        let mut sensors = SensorMap::new();
        sensors.declare(Channel::Mop, 36);
        sensors
    }

    #[test]
    fn hysteresis_needs_arming_and_alternates() {
        let mut h = Hysteresis::new(500, 50);
        assert_eq!(h.step(900, false), None);
        assert_eq!(h.step(900, true), Some(EdgeKind::On));
        assert_eq!(h.step(900, true), None);
        assert_eq!(h.step(100, true), None);
        assert_eq!(h.step(10, false), Some(EdgeKind::Off));
        assert_eq!(h.step(10, true), None);
        assert_eq!(h.step(900, true), Some(EdgeKind::On));
    }

    #[test]
    fn mop_thresholds_run_independently() {
        let sensors = mop_sensors();
        let mut detectors = EngineDetectors::new(&[300, 400]);
        let values = [0, 0, 350, 350, 40];
        let samples: Vec<Sample> = values
            .iter()
            .enumerate()
            .map(|(i, &v)| sample(i as u32, ChannelValues::default().with(Channel::Mop, v)))
            .collect();
        for s in &samples {
            detectors.observe(&sensors, airborne(s, None));
        }

        let mop: Vec<&ThresholdEdges> = detectors.mop_edges().collect();
        assert_eq!(mop[0].threshold, 300);
        let kinds: Vec<(EdgeKind, NaiveTime)> =
            mop[0].edges.iter().map(|e| (e.kind, e.time)).collect();
        assert_eq!(
            kinds,
            vec![(EdgeKind::On, samples[2].time), (EdgeKind::Off, samples[4].time)]
        );
        assert!(mop[1].edges.is_empty());
        // 350 never crosses the MOP primary limit of 500
        assert!(detectors.primary_edges().is_empty());
    }

    #[test]
    fn primary_rising_edge_aligns_to_takeoff_fix() {
        let sensors = mop_sensors();
        let mut detectors = EngineDetectors::new(&[]);
        let mut takeoff = sample(0, ChannelValues::default().with(Channel::Mop, 0));
        takeoff.time = NaiveTime::from_hms_opt(11, 0, 0).unwrap();
        let running = sample(1, ChannelValues::default().with(Channel::Mop, 800));
        detectors.observe(&sensors, airborne(&running, Some(&takeoff)));

        let edges = detectors.primary_edges();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].time, takeoff.time);
        assert_eq!(edges[0].msl_ft, takeoff.msl_ft);
        assert_eq!(edges[0].agl_ft, takeoff.msl_ft - running.ground_ft);
    }

    #[test]
    fn dangling_run_is_closed_at_last_sample() {
        let mut sensors = SensorMap::new();
        sensors.declare(Channel::Rpm, 36);
        let mut detectors = EngineDetectors::new(&[]);
        let rpm = |v| ChannelValues::default().with(Channel::Rpm, v);
        let samples = [
            sample(0, rpm(60)),
            sample(1, rpm(30)),
            sample(2, rpm(10)),
            sample(3, rpm(70)),
            sample(4, rpm(70)),
        ];
        for s in &samples {
            detectors.observe(&sensors, airborne(s, None));
        }
        let runs = detectors.engine_runs(&samples[4]);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].on.time, samples[0].time);
        assert_eq!(runs[0].off.time, samples[2].time);
        assert!(!runs[0].closed_at_flight_end);
        assert_eq!(runs[1].on.time, samples[3].time);
        assert_eq!(runs[1].off.time, samples[4].time);
        assert!(runs[1].closed_at_flight_end);
        assert_eq!(runs[0].height_gain_ft(), 2);
        // RPM is declared, so ENL noise stays silent
        assert!(detectors.enl_edges().is_empty());
    }

    #[test]
    fn primary_limits_follow_the_declared_channel() {
        let mut sensors = SensorMap::new();
        sensors.declare(Channel::Enl, 36);
        let mut detectors = EngineDetectors::new(&[]);
        let values = |enl, rpm| {
            ChannelValues::default()
                .with(Channel::Enl, enl)
                .with(Channel::Rpm, rpm)
        };

        // 60 is far below the ENL limit of 600
        let quiet = sample(0, values(60, 60));
        detectors.observe(&sensors, airborne(&quiet, None));
        assert!(detectors.primary_edges().is_empty());

        sensors.declare(Channel::Rpm, 39);
        let running = sample(1, values(60, 60));
        detectors.observe(&sensors, airborne(&running, None));
        let edges = detectors.primary_edges();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].kind, EdgeKind::On);
        assert_eq!(edges[0].time, running.time);
    }

    #[test]
    fn enl_noise_only_without_rpm_channel() {
        let mut sensors = SensorMap::new();
        sensors.declare(Channel::Enl, 36);
        let mut detectors = EngineDetectors::new(&[300]);
        let enl = |v| ChannelValues::default().with(Channel::Enl, v);
        for (i, v) in [100, 700, 400, 200].into_iter().enumerate() {
            let s = sample(i as u32, enl(v));
            detectors.observe(&sensors, airborne(&s, None));
        }
        let kinds: Vec<EdgeKind> = detectors.enl_edges().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EdgeKind::On, EdgeKind::Off]);
        assert_eq!(detectors.primary_edges().len(), 2);

        detectors.reset();
        assert!(detectors.enl_edges().is_empty());
        assert_eq!(detectors.mop_edges().count(), 1);
    }
}
