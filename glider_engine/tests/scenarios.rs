use chrono::{NaiveDate, NaiveTime};
use glider_engine::record::{decode_line, Record};
use glider_engine::validate::{RejectReason, SampleValidator, Verdict};
use glider_engine::{
    analyze_reader, analyze_str, report_header, EdgeKind, EngineConfig, LandingKind, NoElevation,
    PrimaryChannel, SensorMap,
};

/// Position fix at 45°30'N 72°15'W plus `lat_milli` thousandths of a minute north.
fn fix(time: &str, lat_milli: u32, validity: char, pressure: i32, extensions: &str) -> String {
    format!("B{time}45{lat_milli:05}N07215000W{validity}{pressure:05}00500{extensions}")
}

fn t(h: u32, m: u32, s: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, s).unwrap()
}

fn trace(lines: &[String]) -> String {
    let mut text = lines.join("\r\n");
    text.push_str("\r\n");
    text
}

fn flat_ground(_lat: f64, _lon: f64) -> Option<f64> {
    Some(300.0)
}

/// Ground-speed-only trace: `fast` fixes at 065 km/h, then `slow` fixes at 016 km/h
/// about 100 ft AGL.
fn gsp_flight(start: (u32, u32, u32), fast: usize, slow: usize, lat_step: u32) -> Vec<String> {
    let first = t(start.0, start.1, start.2);
    (0..fast + slow)
        .map(|i| {
            let time = (first + chrono::TimeDelta::seconds(i as i64)).format("%H%M%S");
            if i < fast {
                fix(&time.to_string(), 30000 + lat_step * i as u32, 'A', 310, "065")
            } else {
                fix(&time.to_string(), 30000 + lat_step * fast as u32, 'A', 340, "016")
            }
        })
        .collect()
}

#[test]
fn header_only_trace_reports_date_and_type() {
    let text = "AXXX001\nHFDTE010124\nHFGTYGLIDERTYPE:ASW-20\n";
    let summary = analyze_str(text, &NoElevation, &EngineConfig::default());
    assert_eq!(summary.header.date, NaiveDate::from_ymd_opt(2024, 1, 1));
    assert_eq!(summary.header.glider_type.as_deref(), Some("ASW-20"));
    assert!(summary.flights.is_empty());
}

#[test]
fn landing_follows_five_noise_samples() {
    let mut lines = vec![
        "HFDTE010124".to_string(),
        "HFGTYGLIDERTYPE:ASW-20".to_string(),
        "I013638GSP".to_string(),
    ];
    lines.extend(gsp_flight((12, 0, 0), 3, 6, 0));
    let summary = analyze_str(&trace(&lines), &flat_ground, &EngineConfig::default());

    assert_eq!(summary.flights.len(), 1);
    let flight = &summary.flights[0];
    assert_eq!(flight.takeoff, t(12, 0, 0));
    assert_eq!(flight.landing, t(12, 0, 8));
    assert_eq!(flight.duration_text(), "0:00:08");
    assert_eq!(flight.landing_kind, LandingKind::Home);
    assert!(!flight.closed_at_end_of_trace);
    assert_eq!(flight.start_altitude_m, 300);
    assert_eq!(flight.start_pressure_reference_m, 480);
    assert_eq!(flight.primary_channel, PrimaryChannel::None);
    assert!(flight.engine_runs.is_empty());

    let row = flight.report_row("x.igc", &[300]);
    assert_eq!(row[0], "01/01/2024");
    assert_eq!(row[2], "ASW-20");
    assert_eq!(row[4], "120000");
    assert_eq!(row[5], "120008");
    assert_eq!(row[6], "HOME");
    assert_eq!(row[7], "");
    assert_eq!(row[8], "");
}

#[test]
fn mop_thresholds_see_independent_edges() {
    let mut lines = vec!["I013638MOP".to_string()];
    for (i, mop) in [0, 0, 350, 350, 40].into_iter().enumerate() {
        // 0.02 minutes of latitude per second is roughly 83 mph
        lines.push(fix(
            &format!("1200{i:02}"),
            30000 + 20 * i as u32,
            'A',
            500,
            &format!("{mop:03}"),
        ));
    }
    let config = EngineConfig::with_thresholds(vec![300, 400]).unwrap();
    let summary = analyze_str(&trace(&lines), &NoElevation, &config);

    assert_eq!(summary.flights.len(), 1);
    let flight = &summary.flights[0];
    assert!(flight.closed_at_end_of_trace);
    assert_eq!(flight.takeoff, t(12, 0, 1));
    assert_eq!(flight.landing, t(12, 0, 4));

    let at_300: Vec<(EdgeKind, NaiveTime)> = flight.mop[0]
        .edges
        .iter()
        .map(|e| (e.kind, e.time))
        .collect();
    assert_eq!(flight.mop[0].threshold, 300);
    assert_eq!(
        at_300,
        vec![(EdgeKind::On, t(12, 0, 2)), (EdgeKind::Off, t(12, 0, 4))]
    );
    assert_eq!(flight.mop[1].threshold, 400);
    assert!(flight.mop[1].edges.is_empty());
    // 350 stays below the MOP engine-run limit
    assert!(flight.engine_runs.is_empty());
}

#[test]
fn void_fix_never_touches_validator_state() {
    let sensors = SensorMap::new();
    let mut validator = SampleValidator::new();
    let lines = [
        fix("120000", 30000, 'A', 500, ""),
        fix("120001", 31000, 'V', 500, ""),
    ];

    for line in &lines {
        let Ok(Record::Position(record)) = decode_line(line) else {
            panic!("not a position record: {line}");
        };
        let before = (validator.current().cloned(), validator.accepted_count());
        let verdict = validator.push(&record, &sensors, &NoElevation);
        if record.validity == b'V' {
            assert_eq!(verdict, Verdict::Rejected(RejectReason::VoidFix));
            assert_eq!(
                (validator.current().cloned(), validator.accepted_count()),
                before
            );
        }
    }
    assert_eq!(validator.accepted_count(), 1);
    assert_eq!(validator.current().map(|s| s.time), Some(t(12, 0, 0)));

    let summary = analyze_str(&trace(&lines), &NoElevation, &EngineConfig::default());
    assert_eq!(summary.stats.accepted, 1);
    assert_eq!(summary.stats.rejected, 1);
}

#[test]
fn engine_run_is_reported_with_height_gain() {
    let mut lines = vec![
        "HFDTE040724".to_string(),
        "HFGTYGLIDERTYPE:ASH-26E".to_string(),
        "I023638GSP3941MOP".to_string(),
    ];
    let steps = [
        ("120000", 500, 0),
        ("120030", 600, 800),
        ("120100", 700, 800),
        ("120130", 800, 800),
        ("120200", 900, 20),
    ];
    for (time, pressure, mop) in steps {
        lines.push(fix(time, 30000, 'A', pressure, &format!("080{mop:03}")));
    }
    let summary = analyze_str(&trace(&lines), &NoElevation, &EngineConfig::default());

    assert_eq!(summary.sensors.primary(), PrimaryChannel::Mop);
    assert_eq!(summary.flights.len(), 1);
    let flight = &summary.flights[0];
    assert_eq!(flight.engine_runs.len(), 1);
    let run = &flight.engine_runs[0];
    // the engine was already running at takeoff
    assert_eq!(run.on.time, t(12, 0, 0));
    assert_eq!(run.off.time, t(12, 2, 0));
    assert_eq!(run.minutes(), 2);
    assert_eq!(
        flight.sensor_summary(),
        "ASH-26E's MOP monitor reports Engine Run 2 minutes, starts at T=120000 and: 1640 msl [1640 agl]; Height gain/loss is: 1312"
    );
    assert_eq!(
        flight.mop_summary(300),
        "ASH-26E Motor noise registered by MOP sensor (threshold 300) at t=['120030', '120200'] and [1968, 2952]AGL"
    );
    assert!(flight.enl_noise.is_empty());
    assert_eq!(flight.year_key(), "2024");
}

#[test]
fn distant_landing_is_an_outlanding() {
    let mut lines = vec!["I013638GSP".to_string()];
    // 0.5 minutes of latitude per fast fix, landing about 3.7 km north of takeoff
    lines.extend(gsp_flight((13, 0, 0), 4, 6, 500));
    let summary = analyze_str(&trace(&lines), &flat_ground, &EngineConfig::default());

    assert_eq!(summary.flights.len(), 1);
    let flight = &summary.flights[0];
    assert_eq!(flight.landing_kind, LandingKind::Outlanding);
    assert!(flight.landing_distance_m > 1500.0);
    assert_eq!(flight.report_row("y.igc", &[])[6], "LOUT");
    assert_eq!(flight.glider_type, "Unknown");
    assert_eq!(flight.date_text(), "Unknown");
}

#[test]
fn several_flights_in_one_trace() {
    let mut lines = vec!["HFGTYGLIDERTYPE:LS4".to_string(), "I013638GSP".to_string()];
    lines.extend(gsp_flight((10, 0, 0), 3, 6, 0));
    lines.extend(gsp_flight((14, 0, 0), 3, 6, 0));
    let summary = analyze_str(&trace(&lines), &flat_ground, &EngineConfig::default());

    let times: Vec<(NaiveTime, NaiveTime)> = summary
        .flights
        .iter()
        .map(|f| (f.takeoff, f.landing))
        .collect();
    assert_eq!(
        times,
        vec![(t(10, 0, 0), t(10, 0, 8)), (t(14, 0, 0), t(14, 0, 8))]
    );
    assert!(summary.flights.iter().all(|f| f.glider_type == "LS4"));
}

#[test]
fn flight_across_midnight_wraps_duration() {
    let mut lines = vec!["I013638GSP".to_string()];
    lines.push(fix("235958", 30000, 'A', 310, "065"));
    lines.push(fix("235959", 30000, 'A', 310, "065"));
    for s in 1..=6 {
        lines.push(fix(&format!("0000{s:02}"), 30000, 'A', 340, "016"));
    }
    let summary = analyze_str(&trace(&lines), &flat_ground, &EngineConfig::default());

    assert_eq!(summary.flights.len(), 1);
    let flight = &summary.flights[0];
    assert_eq!(flight.landing, t(0, 0, 6));
    assert_eq!(flight.duration_s, 8);
    assert_eq!(flight.duration_text(), "0:00:08");
}

#[test]
fn unlanded_flight_is_closed_at_last_fix() {
    let mut lines = vec!["I013638GSP".to_string()];
    lines.extend(gsp_flight((9, 0, 0), 5, 0, 0));
    let summary = analyze_str(&trace(&lines), &flat_ground, &EngineConfig::default());

    assert_eq!(summary.flights.len(), 1);
    assert!(summary.flights[0].closed_at_end_of_trace);
    assert_eq!(summary.flights[0].landing, t(9, 0, 4));
}

#[test]
fn coordinate_extremes() {
    let lines = [
        "B1200009000000N18000000EA0050000500".to_string(),
        "B1200019000100N18000000EA0050000500".to_string(),
        "B1200029000000N18000100EA0050000500".to_string(),
    ];
    let summary = analyze_str(&trace(&lines), &NoElevation, &EngineConfig::default());
    assert_eq!(summary.stats.accepted, 1);
    assert_eq!(summary.stats.rejected, 2);
}

#[test]
fn analysis_is_repeatable() {
    let mut lines = vec!["HFDTE150723".to_string(), "I013638GSP".to_string()];
    lines.extend(gsp_flight((11, 0, 0), 3, 6, 100));
    let text = trace(&lines);
    let config = EngineConfig::default();

    let first = analyze_str(&text, &flat_ground, &config);
    let second = analyze_reader(text.as_bytes(), &flat_ground, &config).unwrap();
    assert_eq!(first.flights, second.flights);
    assert_eq!(first.stats, second.stats);
    assert_eq!(
        first.flights[0].report_row("a.igc", &config.mop_thresholds).len(),
        report_header(&config.mop_thresholds).len()
    );
}

#[test]
fn enl_noise_text_and_run_open_at_end_of_trace() {
    let mut lines = vec![
        "HFGTYGLIDERTYPE:DG-400".to_string(),
        "I023638GSP3941ENL".to_string(),
    ];
    for (i, enl) in [0, 0, 700, 700, 700, 100, 0, 700].into_iter().enumerate() {
        lines.push(fix(&format!("1200{i:02}"), 30000, 'A', 500, &format!("080{enl:03}")));
    }
    let summary = analyze_str(&trace(&lines), &NoElevation, &EngineConfig::default());

    assert_eq!(summary.sensors.primary(), PrimaryChannel::Enl);
    assert_eq!(summary.flights.len(), 1);
    let flight = &summary.flights[0];
    assert!(flight.closed_at_end_of_trace);

    let runs: Vec<(NaiveTime, NaiveTime, bool)> = flight
        .engine_runs
        .iter()
        .map(|r| (r.on.time, r.off.time, r.closed_at_flight_end))
        .collect();
    assert_eq!(
        runs,
        vec![
            (t(12, 0, 2), t(12, 0, 5), false),
            (t(12, 0, 7), t(12, 0, 7), true),
        ]
    );
    // both runs are shorter than a minute, so only the noise line is reported
    assert_eq!(
        flight.sensor_summary(),
        "DG-400 Motor noise registered by ENL sensor at t=['120002', '120005', '120007'] \
         and [1640, 1640, 1640]AGL"
    );
}
