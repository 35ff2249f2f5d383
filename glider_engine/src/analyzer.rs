//! Per-file driver: decodes lines and runs validator, detectors and flight
//! state machine over them in order.

use std::io::BufRead;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::altitude::meters_to_feet;
use crate::elevation::ElevationService;
use crate::engine::{DetectorInput, EngineDetectors};
use crate::flight::{
    flight_duration, FlightEvent, FlightRecord, FlightStateMachine, LandingKind,
    START_REFERENCE_MARGIN_M,
};
use crate::geo::haversine_distance;
use crate::record::{decode_line, HeaderRecord, PositionRecord, Record};
use crate::report::UNKNOWN;
use crate::sensor::SensorMap;
use crate::validate::{Sample, SampleValidator, Verdict};
use crate::{EngineConfig, EngineError};

/// Header fields that persist across all flights of a file.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TraceHeader {
    pub date: Option<NaiveDate>,
    pub glider_type: Option<String>,
    pub glider_id: Option<String>,
    pub pilot: Option<String>,
}

impl TraceHeader {
    fn apply(&mut self, header: HeaderRecord) {
        match header {
            HeaderRecord::Date(date) => self.date = date,
            HeaderRecord::GliderType(value) => {
                self.glider_type.get_or_insert(value);
            }
            HeaderRecord::GliderId(value) => {
                self.glider_id.get_or_insert(value);
            }
            HeaderRecord::Pilot(value) => {
                self.pilot.get_or_insert(value);
            }
            HeaderRecord::Other => {}
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TraceStats {
    pub lines: usize,
    pub positions: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub discarded: usize,
    pub malformed: usize,
    pub length_mismatch: usize,
}

#[derive(Clone, Debug)]
pub struct TraceSummary {
    pub header: TraceHeader,
    pub sensors: SensorMap,
    pub flights: Vec<FlightRecord>,
    pub stats: TraceStats,
}

/// Everything that resets when a flight is emitted.
#[derive(Clone, Debug)]
struct ParserState {
    validator: SampleValidator,
    flight: FlightStateMachine,
    detectors: EngineDetectors,
    start_reference_m: i32,
}

impl ParserState {
    fn new(mop_thresholds: &[u32]) -> Self {
        Self {
            validator: SampleValidator::new(),
            flight: FlightStateMachine::new(),
            detectors: EngineDetectors::new(mop_thresholds),
            start_reference_m: 0,
        }
    }

    fn reset(&mut self) {
        self.validator = SampleValidator::new();
        self.flight = FlightStateMachine::new();
        self.detectors.reset();
        self.start_reference_m = 0;
    }
}

pub struct TraceAnalyzer<'a, E: ElevationService + ?Sized> {
    elevation: &'a E,
    header: TraceHeader,
    sensors: SensorMap,
    expected_len: Option<usize>,
    state: ParserState,
    flights: Vec<FlightRecord>,
    stats: TraceStats,
}

impl<'a, E: ElevationService + ?Sized> TraceAnalyzer<'a, E> {
    pub fn new(config: &EngineConfig, elevation: &'a E) -> Self {
        Self {
            elevation,
            header: TraceHeader::default(),
            sensors: SensorMap::new(),
            expected_len: None,
            state: ParserState::new(&config.mop_thresholds),
            flights: Vec::new(),
            stats: TraceStats::default(),
        }
    }

    pub fn feed_line(&mut self, raw: &str) {
        let line = raw.trim();
        self.stats.lines += 1;

        if line.starts_with('B') {
            // The first fix fixes the record length unless an I record already did.
            let expected = *self.expected_len.get_or_insert(line.len());
            if line.len() != expected {
                self.stats.length_mismatch += 1;
                trace!(
                    line = self.stats.lines,
                    len = line.len(),
                    expected,
                    "Skipping position record with unexpected length"
                );
                return;
            }
        }

        match decode_line(line) {
            Ok(Record::Header(header)) => self.header.apply(header),
            Ok(Record::SensorDeclaration(declaration)) => {
                for (channel, offset) in declaration.channels {
                    self.sensors.declare(channel, offset);
                }
                if let Some(len) = declaration.record_len {
                    self.expected_len = Some(len);
                }
                debug!(
                    primary = %self.sensors.primary(),
                    record_len = ?self.expected_len,
                    "Sensor declaration"
                );
            }
            Ok(Record::Position(record)) => self.on_position(&record),
            Ok(Record::Unrecognized) => {}
            Err(err) => {
                self.stats.malformed += 1;
                trace!(line = self.stats.lines, %err, "Skipping malformed record");
            }
        }
    }

    fn on_position(&mut self, record: &PositionRecord<'_>) {
        self.stats.positions += 1;
        match self
            .state
            .validator
            .push(record, &self.sensors, self.elevation)
        {
            Verdict::Accepted { sample, previous } => {
                self.stats.accepted += 1;
                self.advance(&sample, previous.as_ref());
            }
            Verdict::Rejected(reason) => {
                self.stats.rejected += 1;
                trace!(line = self.stats.lines, %reason, "Rejected fix");
            }
            Verdict::Discarded(reason) => {
                self.stats.discarded += 1;
                trace!(line = self.stats.lines, ?reason, "Discarded fix");
            }
        }
    }

    fn advance(&mut self, sample: &Sample, previous: Option<&Sample>) {
        let state = &mut self.state;
        state.detectors.observe(
            &self.sensors,
            DetectorInput {
                sample,
                previous,
                airborne: state.flight.is_airborne(),
                takeoff_time: state.flight.takeoff_time(),
            },
        );

        match state.flight.observe(sample, previous.is_some()) {
            Some(FlightEvent::Takeoff { time }) => {
                state.start_reference_m =
                    state.validator.start_altitude_m().unwrap_or(0) + START_REFERENCE_MARGIN_M;
                debug!(
                    takeoff = %time.format("%H%M%S"),
                    start_reference_m = state.start_reference_m,
                    "Takeoff"
                );
            }
            Some(FlightEvent::Landing { .. }) => self.emit(sample, false),
            None => {}
        }
    }

    fn emit(&mut self, landing: &Sample, end_of_trace: bool) {
        let state = &self.state;
        let Some(takeoff) = state.flight.takeoff_time() else {
            return;
        };
        let landing_distance_m = state
            .validator
            .takeoff_point()
            .map(|(lat, lon)| haversine_distance(lat, lon, landing.latitude, landing.longitude))
            .unwrap_or(0.0);

        let record = FlightRecord {
            date: self.header.date,
            glider_type: self
                .header
                .glider_type
                .clone()
                .unwrap_or_else(|| UNKNOWN.to_string()),
            glider_id: self.header.glider_id.clone(),
            pilot: self.header.pilot.clone(),
            takeoff,
            landing: landing.time,
            duration_s: flight_duration(takeoff, landing.time).num_seconds(),
            landing_kind: LandingKind::classify(landing_distance_m),
            landing_distance_m,
            max_msl_ft: meters_to_feet(state.validator.max_altitude_m()),
            max_agl_ft: state.validator.max_agl_ft(),
            start_altitude_m: state.validator.start_altitude_m().unwrap_or(0),
            start_pressure_reference_m: state.start_reference_m,
            primary_channel: self.sensors.primary(),
            engine_runs: state.detectors.engine_runs(landing),
            enl_noise: state.detectors.enl_edges().to_vec(),
            mop: state.detectors.mop_edges().cloned().collect(),
            closed_at_end_of_trace: end_of_trace,
        };
        record.log_summary();
        self.flights.push(record);
        self.state.reset();
    }

    /// Close any flight still airborne at the last fix and return the results.
    pub fn finish(mut self) -> TraceSummary {
        if self.state.flight.is_airborne() {
            if let Some(last) = self.state.validator.current().cloned() {
                debug!(
                    last_fix = %last.time.format("%H%M%S"),
                    "End of trace, no landing found; closing flight at last fix"
                );
                self.emit(&last, true);
            }
        }
        TraceSummary {
            header: self.header,
            sensors: self.sensors,
            flights: self.flights,
            stats: self.stats,
        }
    }
}

/// Analyze a whole trace from a reader. Invalid UTF-8 is replaced, never fatal.
pub fn analyze_reader<R, E>(
    mut reader: R,
    elevation: &E,
    config: &EngineConfig,
) -> Result<TraceSummary, EngineError>
where
    R: BufRead,
    E: ElevationService + ?Sized,
{
    let mut analyzer = TraceAnalyzer::new(config, elevation);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        analyzer.feed_line(&String::from_utf8_lossy(&buf));
    }
    Ok(analyzer.finish())
}

pub fn analyze_str<E: ElevationService + ?Sized>(
    text: &str,
    elevation: &E,
    config: &EngineConfig,
) -> TraceSummary {
    let mut analyzer = TraceAnalyzer::new(config, elevation);
    for line in text.lines() {
        analyzer.feed_line(line);
    }
    analyzer.finish()
}
