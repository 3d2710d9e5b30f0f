//! Durable result storage.
//!
//! A sink is write-once and sequential: one header row, then one row per
//! completed set-point, each flushed before `append` returns so a killed
//! process keeps every record it reported.

pub mod csv_sink;

pub use csv_sink::CsvSink;

use crate::error::AppResult;
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};

/// Column headers of the output file.
pub const HEADER: [&str; 3] = ["Timestamp", "Set Voltage (V)", "Measured Voltage (V)"];

/// Timestamp layout: ISO-8601 local time with microseconds (sortable as text).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// One completed set-point.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRecord {
    /// Local wall-clock time the reading was taken
    pub timestamp: NaiveDateTime,
    pub set_voltage: f64,
    /// `NaN` when the meter reply could not be parsed
    pub measured_voltage: f64,
}

impl MeasurementRecord {
    /// Record stamped with the current local time.
    pub fn now(set_voltage: f64, measured_voltage: f64) -> Self {
        Self {
            timestamp: chrono::Local::now().naive_local(),
            set_voltage,
            measured_voltage,
        }
    }

    pub fn timestamp_text(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

/// Append-only measurement sink.
pub trait ResultSink: Send {
    /// Append one record; it is on disk (OS buffers flushed) when this returns.
    fn append(&mut self, record: &MeasurementRecord) -> AppResult<()>;

    /// Flush and release the file. Further appends fail.
    fn close(&mut self) -> AppResult<()>;

    fn records_written(&self) -> usize;

    fn path(&self) -> &Path;
}

/// Adds a `.csv` extension unless the path already ends in one (any case).
pub fn with_csv_extension(path: &Path) -> PathBuf {
    let has_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
    if has_csv {
        path.to_path_buf()
    } else {
        let mut name = path.as_os_str().to_owned();
        name.push(".csv");
        PathBuf::from(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_extension_added() {
        assert_eq!(with_csv_extension(Path::new("measurements")), PathBuf::from("measurements.csv"));
        assert_eq!(with_csv_extension(Path::new("run.v2")), PathBuf::from("run.v2.csv"));
    }

    #[test]
    fn test_csv_extension_kept() {
        assert_eq!(with_csv_extension(Path::new("data/sweep.csv")), PathBuf::from("data/sweep.csv"));
        assert_eq!(with_csv_extension(Path::new("SWEEP.CSV")), PathBuf::from("SWEEP.CSV"));
    }

    #[test]
    fn test_timestamp_text_is_sortable() {
        let early = MeasurementRecord {
            timestamp: chrono::NaiveDate::from_ymd_opt(2024, 3, 9)
                .and_then(|d| d.and_hms_micro_opt(9, 5, 1, 42))
                .unwrap(),
            set_voltage: 0.0,
            measured_voltage: 0.0,
        };
        let late = MeasurementRecord {
            timestamp: chrono::NaiveDate::from_ymd_opt(2024, 11, 20)
                .and_then(|d| d.and_hms_micro_opt(17, 0, 0, 0))
                .unwrap(),
            ..early.clone()
        };
        assert_eq!(early.timestamp_text(), "2024-03-09T09:05:01.000042");
        assert!(early.timestamp_text() < late.timestamp_text());
    }
}
