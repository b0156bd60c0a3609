//! Append-only CSV result log

use crate::error::{AppError, Result};
use crate::executor::sanitize;
use crate::models::ResultRecord;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Header row, fixed column order
pub const CSV_HEADER: &str = "delay,bandwidth,filesize,transmission_ms,error";

/// Durable, append-only result log. Every row is synced before `append`
/// returns.
#[derive(Debug)]
pub struct ResultSink {
    path: PathBuf,
    file: File,
    rows_written: usize,
}

impl ResultSink {
    /// Open (or create) the log, writing the header only into an empty file
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let open_err = |e: std::io::Error| {
            AppError::config(format!("Cannot open result log '{}': {}", path.display(), e))
        };

        let mut file = OpenOptions::new().create(true).append(true).open(&path).map_err(open_err)?;
        let empty = file.metadata().map_err(open_err)?.len() == 0;

        if empty {
            writeln!(file, "{}", CSV_HEADER).map_err(open_err)?;
            file.sync_data().map_err(open_err)?;
        }

        Ok(Self {
            path,
            file,
            rows_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows appended through this handle
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Append one record and sync it to disk
    pub fn append(&mut self, record: &ResultRecord) -> Result<()> {
        let line = format_row(record);
        self.file
            .write_all(line.as_bytes())
            .and_then(|_| self.file.flush())
            .and_then(|_| self.file.sync_data())
            .map_err(|e| AppError::io(format!("Failed to append to '{}': {}", self.path.display(), e)))?;

        self.rows_written += 1;
        Ok(())
    }
}

/// Render one CSV row, newline included
pub fn format_row(record: &ResultRecord) -> String {
    let elapsed = record.elapsed_ms().map(|ms| ms.to_string()).unwrap_or_default();
    let error = record.error().map(sanitize).unwrap_or_default();
    format!(
        "{},{},{},{},{}\n",
        record.delay, record.bandwidth, record.size, elapsed, error
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Trial, TrialOutcome};
    use tempfile::TempDir;

    fn trial(delay: &str, bandwidth: &str, size: &str) -> Trial {
        Trial::new(0, delay.parse().unwrap(), bandwidth.parse().unwrap(), size.parse().unwrap())
    }

    #[test]
    fn test_success_row() {
        let record = ResultRecord::from_outcome(&trial("0ms", "1Mbps", "10K"), &TrialOutcome::Success { elapsed_ms: 42 });
        assert_eq!(format_row(&record), "0ms,1Mbps,10K,42,\n");
    }

    #[test]
    fn test_error_rows_have_empty_elapsed() {
        let t = trial("30ms", "10Mbps", "1M");
        let timeout = ResultRecord::from_outcome(&t, &TrialOutcome::Timeout);
        assert_eq!(format_row(&timeout), "30ms,10Mbps,1M,,TIMEOUT\n");

        let exit = ResultRecord::from_outcome(
            &t,
            &TrialOutcome::ProcessError { exit_code: 1, message: "bad, \"worse\"\nworst".into() },
        );
        let row = format_row(&exit);
        assert_eq!(row, "30ms,10Mbps,1M,,EXIT_1: bad worse worst\n");
        assert_eq!(row.trim_end().split(',').count(), 5);
    }

    #[test]
    fn test_header_written_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.csv");
        let t = trial("0ms", "1Mbps", "10K");

        {
            let mut sink = ResultSink::open(&path).unwrap();
            sink.append(&ResultRecord::from_outcome(&t, &TrialOutcome::Success { elapsed_ms: 42 })).unwrap();
            assert_eq!(sink.rows_written(), 1);
        }
        {
            let mut sink = ResultSink::open(&path).unwrap();
            sink.append(&ResultRecord::from_outcome(&t, &TrialOutcome::Timeout)).unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines, vec![CSV_HEADER, "0ms,1Mbps,10K,42,", "0ms,1Mbps,10K,,TIMEOUT"]);
    }

    #[test]
    fn test_open_failure_is_config_error() {
        let dir = TempDir::new().unwrap();
        let err = ResultSink::open(dir.path().join("missing").join("results.csv")).unwrap_err();
        assert_eq!(err.category(), "CONFIG");
    }
}
