//! Fixed-width IGC record decoding.
//!
//! Only three record types matter here:
//! - `H` headers carry the flight date, glider type, registration and pilot
//! - `I` declares the extension channels appended to every `B` record
//! - `B` is one position fix
//!
//! Everything else (A, C, E, F, G, L, ...) decodes to [`Record::Unrecognized`].

use chrono::NaiveDate;
use thiserror::Error;

use crate::sensor::Channel;

/// Minimum length of a `B` record: everything up to and including GNSS altitude.
pub const POSITION_RECORD_MIN_LEN: usize = 35;

const EXTENSION_FIELD_LEN: usize = 7;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("sensor declaration count '{0}' is not a positive number")]
    SensorCount(String),
    #[error("position record too short ({0} characters)")]
    Truncated(usize),
    #[error("position record field '{field}' is not numeric")]
    NotNumeric { field: &'static str },
    #[error("position record time {0:02}{1:02}{2:02} is out of range")]
    TimeOutOfRange(u32, u32, u32),
    #[error("header '{0}' has no value")]
    EmptyHeader(&'static str),
}

#[derive(Debug, PartialEq)]
pub enum Record<'a> {
    Header(HeaderRecord),
    SensorDeclaration(SensorDeclaration),
    Position(PositionRecord<'a>),
    Unrecognized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderRecord {
    /// `HFDTE`; `None` when the date could not be read.
    Date(Option<NaiveDate>),
    GliderType(String),
    GliderId(String),
    Pilot(String),
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SensorDeclaration {
    /// Declared channels with the 1-based offset of their value.
    pub channels: Vec<(Channel, usize)>,
    /// Total `B` record length implied by the last declared extension.
    pub record_len: Option<usize>,
}

/// `HHMMSS` as written; seconds may read 60 and are range-checked by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawTime {
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl RawTime {
    pub fn is_zero(&self) -> bool {
        self.hour == 0 && self.minute == 0 && self.second == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionRecord<'a> {
    line: &'a str,
    pub time: RawTime,
    pub lat_degrees: u32,
    pub lat_minutes_milli: u32,
    pub lat_hemisphere: u8,
    pub lon_degrees: u32,
    pub lon_minutes_milli: u32,
    pub lon_hemisphere: u8,
    pub validity: u8,
    pub pressure_altitude: i32,
    pub gnss_altitude: Option<i32>,
}

impl<'a> PositionRecord<'a> {
    /// The undecoded line, used to read extension channels.
    pub fn line(&self) -> &'a str {
        self.line
    }
}

/// Decode one line with its line terminator already stripped.
pub fn decode_line(line: &str) -> Result<Record<'_>, RecordError> {
    match line.as_bytes().first() {
        Some(b'H') => decode_header(line).map(Record::Header),
        Some(b'I') => decode_sensor_declaration(line).map(Record::SensorDeclaration),
        Some(b'B') => decode_position(line).map(Record::Position),
        _ => Ok(Record::Unrecognized),
    }
}

fn decode_header(line: &str) -> Result<HeaderRecord, RecordError> {
    let mut parts = line.split(':');
    let key = parts.next().unwrap_or_default();
    match key {
        "HFGTYGLIDERTYPE" => {
            let value = parts.next().ok_or(RecordError::EmptyHeader("HFGTYGLIDERTYPE"))?;
            Ok(HeaderRecord::GliderType(value.split_whitespace().collect()))
        }
        "HFGIDGLIDERID" => {
            let value = parts.next().ok_or(RecordError::EmptyHeader("HFGIDGLIDERID"))?;
            Ok(HeaderRecord::GliderId(value.trim().to_string()))
        }
        "HFPLTPILOTINCHARGE" | "HFPLTPILOT" => {
            let value = parts.next().ok_or(RecordError::EmptyHeader("HFPLTPILOT"))?;
            Ok(HeaderRecord::Pilot(value.trim().to_string()))
        }
        _ if line.starts_with("HFDTE") => Ok(HeaderRecord::Date(parse_flight_date(line))),
        _ => Ok(HeaderRecord::Other),
    }
}

/// `HFDTEDDMMYY` or `HFDTEDATE:DDMMYY,NN`.
fn parse_flight_date(line: &str) -> Option<NaiveDate> {
    let digits = match line.split_once(':') {
        Some((_, rest)) => rest.split(',').next().unwrap_or_default(),
        None => line.get(5..line.len().min(12))?,
    };
    let digits = digits.trim();
    let day: u32 = digits.get(0..2)?.parse().ok()?;
    let month: u32 = digits.get(2..4)?.parse().ok()?;
    let year: i32 = digits.get(4..6)?.parse().ok()?;
    NaiveDate::from_ymd_opt(2000 + year, month, day)
}

fn decode_sensor_declaration(line: &str) -> Result<SensorDeclaration, RecordError> {
    let count_field = line.get(1..3).unwrap_or_default();
    let count = if count_field.len() == 2 && count_field.bytes().all(|b| b.is_ascii_digit()) {
        count_field.parse::<usize>().unwrap_or(0)
    } else {
        0
    };
    if count == 0 {
        return Err(RecordError::SensorCount(count_field.to_string()));
    }

    let mut declaration = SensorDeclaration::default();
    for i in 0..count {
        // Each field is SS FF CCC: start byte, finish byte, three-letter code.
        let code_at = 3 + 4 + i * EXTENSION_FIELD_LEN;
        let Some(channel) = line.get(code_at..code_at + 3).and_then(Channel::from_tag) else {
            continue;
        };
        let start = line
            .get(code_at - 4..code_at - 2)
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(0);
        if start > 0 {
            declaration.channels.push((channel, start));
        }
    }

    declaration.record_len = line
        .len()
        .checked_sub(5)
        .and_then(|from| line.get(from..from + 2))
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|len| *len > 0);
    Ok(declaration)
}

fn decode_position(line: &str) -> Result<PositionRecord<'_>, RecordError> {
    if line.len() < POSITION_RECORD_MIN_LEN {
        return Err(RecordError::Truncated(line.len()));
    }
    let bytes = line.as_bytes();

    let time = RawTime {
        hour: numeric(line, 1..3, "hour")?,
        minute: numeric(line, 3..5, "minute")?,
        second: numeric(line, 5..7, "second")?,
    };
    if time.hour > 23 || time.minute > 59 || time.second > 60 {
        return Err(RecordError::TimeOutOfRange(time.hour, time.minute, time.second));
    }

    Ok(PositionRecord {
        line,
        time,
        lat_degrees: numeric(line, 7..9, "latitude degrees")?,
        lat_minutes_milli: numeric(line, 9..14, "latitude minutes")?,
        lat_hemisphere: bytes[14],
        lon_degrees: numeric(line, 15..18, "longitude degrees")?,
        lon_minutes_milli: numeric(line, 18..23, "longitude minutes")?,
        lon_hemisphere: bytes[23],
        validity: bytes[24],
        pressure_altitude: numeric(line, 25..30, "pressure altitude")?,
        gnss_altitude: numeric(line, 30..35, "gnss altitude").ok(),
    })
}

fn numeric<T: std::str::FromStr>(
    line: &str,
    range: std::ops::Range<usize>,
    field: &'static str,
) -> Result<T, RecordError> {
    line.get(range)
        .and_then(|s| s.trim().parse().ok())
        .ok_or(RecordError::NotNumeric { field })
}
