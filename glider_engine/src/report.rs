//! Text rendering of flight records for the flight-time report.

use std::fmt::Display;

use chrono::{NaiveTime, TimeDelta};

use crate::engine::Edge;
use crate::flight::FlightRecord;

pub const UNKNOWN: &str = "Unknown";

/// Report column names for the given MOP thresholds.
pub fn report_header(thresholds: &[u32]) -> Vec<String> {
    let mut header: Vec<String> = [
        "Date (MM/DD/YYYY)",
        "File",
        "Gtype",
        "Flight Time",
        "Start Time",
        "End Time",
        "Landing",
        "Sensor Info",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    header.extend(thresholds.iter().map(|t| format!("Sensor Info ({t})")));
    header
}

/// `H:MM:SS`, hours unpadded.
pub fn format_duration(duration: TimeDelta) -> String {
    let total = duration.num_seconds();
    let sign = if total < 0 { "-" } else { "" };
    let total = total.abs();
    format!(
        "{sign}{}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

pub fn format_clock(time: NaiveTime) -> String {
    time.format("%H%M%S").to_string()
}

fn bracket_list<T, I>(items: I) -> String
where
    T: Display,
    I: IntoIterator<Item = T>,
{
    let parts: Vec<String> = items.into_iter().map(|i| i.to_string()).collect();
    format!("[{}]", parts.join(", "))
}

fn edge_times(edges: &[Edge]) -> String {
    bracket_list(edges.iter().map(|e| format!("'{}'", format_clock(e.time))))
}

fn edge_agls(edges: &[Edge]) -> String {
    bracket_list(edges.iter().map(|e| e.agl_ft.trunc() as i64))
}

impl FlightRecord {
    pub fn date_text(&self) -> String {
        self.date
            .map(|d| d.format("%m/%d/%Y").to_string())
            .unwrap_or_else(|| UNKNOWN.to_string())
    }

    /// Key of the per-year report this flight belongs to.
    pub fn year_key(&self) -> String {
        self.date
            .map(|d| d.format("%Y").to_string())
            .unwrap_or_else(|| UNKNOWN.to_string())
    }

    pub fn duration_text(&self) -> String {
        format_duration(self.duration())
    }

    /// One line per reported engine run followed by the ENL noise line, if any.
    pub fn sensor_summary(&self) -> String {
        let mut lines = Vec::new();
        for run in &self.engine_runs {
            let minutes = run.minutes();
            if minutes <= 0 {
                continue;
            }
            lines.push(format!(
                "{}'s {} monitor reports Engine Run {} minutes, starts at T={} and: {} msl [{} agl]; Height gain/loss is: {}",
                self.glider_type,
                self.primary_channel,
                minutes,
                format_clock(run.on.time),
                run.on.msl_ft.trunc() as i64,
                run.on.agl_ft.trunc() as i64,
                run.height_gain_ft(),
            ));
        }
        if !self.enl_noise.is_empty() {
            lines.push(format!(
                "{} Motor noise registered by ENL sensor at t={} and {}AGL",
                self.glider_type,
                edge_times(&self.enl_noise),
                edge_agls(&self.enl_noise),
            ));
        }
        lines.join("\n")
    }

    /// Edge summary for one MOP threshold; empty when it never fired.
    pub fn mop_summary(&self, threshold: u32) -> String {
        self.mop
            .iter()
            .find(|m| m.threshold == threshold && !m.edges.is_empty())
            .map(|m| {
                format!(
                    "{} Motor noise registered by MOP sensor (threshold {}) at t={} and {}AGL",
                    self.glider_type,
                    threshold,
                    edge_times(&m.edges),
                    edge_agls(&m.edges),
                )
            })
            .unwrap_or_default()
    }

    /// Report row in [`report_header`] column order.
    pub fn report_row(&self, file_name: &str, thresholds: &[u32]) -> Vec<String> {
        let mut row = vec![
            self.date_text(),
            file_name.to_string(),
            self.glider_type.clone(),
            self.duration_text(),
            format_clock(self.takeoff),
            format_clock(self.landing),
            self.landing_kind.to_string(),
            self.sensor_summary(),
        ];
        row.extend(thresholds.iter().map(|&t| self.mop_summary(t)));
        row
    }
}
