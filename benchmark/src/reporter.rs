// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 p11perf contributors

//! JSON report output.
//!
//! Writes a [`ReportDocument`] to a timestamped file, an explicit path or
//! any writer such as stdout.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::metrics::ReportDocument;

/// Errors that can occur during report generation.
#[derive(Debug, Error)]
pub enum ReporterError {
    #[error("Failed to write report: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// JSON reporter for benchmark results.
pub struct JsonReporter {
    /// Output directory for timestamped reports
    output_dir: PathBuf,
}

impl JsonReporter {
    /// Create a new JSON reporter with the specified output directory.
    pub fn new(output_dir: impl AsRef<Path>) -> Result<Self, ReporterError> {
        let output_dir = output_dir.as_ref().to_path_buf();
        fs::create_dir_all(&output_dir)?;
        Ok(Self { output_dir })
    }

    /// Save a report to `p11perf_<timestamp>_<run id>.json` in the output directory.
    ///
    /// Returns the path to the created file.
    pub fn save(&self, report: &ReportDocument) -> Result<PathBuf, ReporterError> {
        let timestamp = report.timestamp.format("%Y-%m-%dT%H-%M-%SZ");
        let filename = format!("p11perf_{}_{}.json", timestamp, report.run_id.simple());
        let filepath = self.output_dir.join(filename);
        Self::save_to(&filepath, report)?;
        Ok(filepath)
    }

    /// Save a report to an explicit path.
    pub fn save_to(path: impl AsRef<Path>, report: &ReportDocument) -> Result<(), ReporterError> {
        let file = File::create(path)?;
        Self::write(BufWriter::new(file), report)
    }

    /// Write a pretty-printed report to any writer.
    pub fn write(mut writer: impl Write, report: &ReportDocument) -> Result<(), ReporterError> {
        serde_json::to_writer_pretty(&mut writer, report)?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }

    /// List all existing report files in the output directory.
    pub fn list_reports(&self) -> Result<Vec<PathBuf>, ReporterError> {
        let mut reports = Vec::new();
        for entry in fs::read_dir(&self.output_dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                reports.push(path);
            }
        }
        reports.sort();
        Ok(reports)
    }

    /// Load an existing report from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<ReportDocument, ReporterError> {
        let file = File::open(path)?;
        let report = serde_json::from_reader(file)?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{Outcome, Report};
    use p11perf_core::clock::ClockPrecision;
    use p11perf_core::config::{ConfigLoader, RawRunConfig};
    use p11perf_core::soft::SoftToken;
    use p11perf_core::token::Token;
    use p11perf_core::vendor::Vendor;
    use tempfile::TempDir;

    fn document() -> ReportDocument {
        let config = ConfigLoader::validate(RawRunConfig::default()).unwrap();
        let mut report = Report::new();
        report.insert(
            "HMAC SHA1",
            "hmac-160",
            Outcome::Failed {
                reason: "object not found".to_string(),
            },
        );
        ReportDocument::new(
            &config,
            SoftToken::new(Vendor::Generic).info(),
            ClockPrecision::from_steps(&[25.0, 30.0]),
            &report,
            false,
        )
    }

    #[test]
    fn test_reporter_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let reporter = JsonReporter::new(temp_dir.path()).unwrap();
        let report = document();

        let path = reporter.save(&report).unwrap();
        assert!(path.exists());
        assert_eq!(reporter.list_reports().unwrap(), vec![path.clone()]);

        let loaded = JsonReporter::load(&path).unwrap();
        assert_eq!(loaded.run_id, report.run_id);
        assert_eq!(loaded.results.len(), 1);
        assert_eq!(loaded.failed(), 1);
        assert_eq!(loaded.configuration.vendor, Vendor::Generic);
    }

    #[test]
    fn test_write_to_buffer() {
        let mut buffer = Vec::new();
        JsonReporter::write(&mut buffer, &document()).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("\"benchmark_suite\": \"p11perf\""));
        assert!(text.ends_with('\n'));
    }
}
