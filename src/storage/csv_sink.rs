//! CSV result sink with clean feature flag handling.

use super::{MeasurementRecord, ResultSink};
use crate::error::AppResult;
use std::path::Path;

#[cfg(feature = "storage_csv")]
mod csv_enabled {
    use super::*;
    use crate::error::SweepError;
    use crate::storage::HEADER;
    use std::fs::File;
    use std::path::PathBuf;

    pub struct CsvSink {
        path: PathBuf,
        writer: Option<csv::Writer<File>>,
        written: usize,
    }

    impl CsvSink {
        /// Create (or truncate) `path` and write the header row.
        ///
        /// # Errors
        ///
        /// `Io` if the file cannot be created, `Storage` if the header cannot
        /// be written.
        pub fn create(path: &Path) -> AppResult<Self> {
            let file = File::create(path)?;
            let mut writer = csv::Writer::from_writer(file);
            writer.write_record(HEADER)?;
            writer.flush()?;

            tracing::info!("CSV sink created at '{}'", path.display());
            Ok(Self {
                path: path.to_path_buf(),
                writer: Some(writer),
                written: 0,
            })
        }
    }

    impl ResultSink for CsvSink {
        fn append(&mut self, record: &MeasurementRecord) -> AppResult<()> {
            let writer = self.writer.as_mut().ok_or_else(|| {
                SweepError::Storage(format!("CSV sink '{}' is closed", self.path.display()))
            })?;
            writer.write_record(&[
                record.timestamp_text(),
                record.set_voltage.to_string(),
                record.measured_voltage.to_string(),
            ])?;
            writer.flush()?;
            self.written += 1;
            Ok(())
        }

        fn close(&mut self) -> AppResult<()> {
            if let Some(mut writer) = self.writer.take() {
                writer.flush()?;
                tracing::info!(
                    "CSV sink '{}' closed after {} records",
                    self.path.display(),
                    self.written
                );
            }
            Ok(())
        }

        fn records_written(&self) -> usize {
            self.written
        }

        fn path(&self) -> &Path {
            &self.path
        }
    }
}

#[cfg(not(feature = "storage_csv"))]
mod csv_disabled {
    use super::*;
    use crate::error::SweepError;

    pub struct CsvSink;

    impl CsvSink {
        pub fn create(_path: &Path) -> AppResult<Self> {
            Err(SweepError::FeatureNotEnabled("storage_csv".to_string()))
        }
    }

    impl ResultSink for CsvSink {
        fn append(&mut self, _record: &MeasurementRecord) -> AppResult<()> {
            Err(SweepError::FeatureNotEnabled("storage_csv".to_string()))
        }

        fn close(&mut self) -> AppResult<()> {
            Ok(())
        }

        fn records_written(&self) -> usize {
            0
        }

        fn path(&self) -> &Path {
            Path::new("")
        }
    }
}

#[cfg(feature = "storage_csv")]
pub use csv_enabled::CsvSink;

#[cfg(not(feature = "storage_csv"))]
pub use csv_disabled::CsvSink;

#[cfg(all(test, feature = "storage_csv"))]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn read_lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_header_written_on_create() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweep.csv");
        let sink = CsvSink::create(&path).unwrap();
        assert_eq!(sink.records_written(), 0);
        assert_eq!(
            read_lines(&path),
            vec!["Timestamp,Set Voltage (V),Measured Voltage (V)"]
        );
    }

    #[test]
    fn test_rows_are_durable_without_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweep.csv");
        let mut sink = CsvSink::create(&path).unwrap();

        sink.append(&MeasurementRecord::now(0.5, 0.49998)).unwrap();
        sink.append(&MeasurementRecord::now(1.0, f64::NAN)).unwrap();

        // Read while the sink is still open
        let lines = read_lines(&path);
        assert_eq!(lines.len(), 3);
        assert!(lines[1].ends_with(",0.5,0.49998"));
        assert!(lines[2].ends_with(",1,NaN"));
        assert_eq!(sink.records_written(), 2);
    }

    #[test]
    fn test_existing_file_is_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweep.csv");
        std::fs::write(&path, "stale\nrows\nhere\n").unwrap();

        let mut sink = CsvSink::create(&path).unwrap();
        sink.close().unwrap();
        assert_eq!(read_lines(&path).len(), 1);
    }

    #[test]
    fn test_append_after_close_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::create(&dir.path().join("sweep.csv")).unwrap();
        sink.close().unwrap();
        sink.close().unwrap();
        let err = sink.append(&MeasurementRecord::now(0.0, 0.0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoFault);
    }

    #[test]
    fn test_uncreatable_path_is_io_fault() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("sweep.csv");
        let err = CsvSink::create(&path).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::IoFault);
    }
}
