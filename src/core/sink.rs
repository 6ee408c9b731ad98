//! Result Sink
//!
//! Writes the final assessments as flat result records, one JSON object per line.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::models::{AppError, AppResult, ErrorCode, RiskAssessment};

pub trait ResultSink: Send + Sync {
    fn write(&self, assessments: &[RiskAssessment]) -> AppResult<()>;
}

pub struct JsonlResultSink {
    path: PathBuf,
}

impl JsonlResultSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sink_error(&self, err: impl std::error::Error + Send + Sync + 'static) -> AppError {
        AppError::with_source(
            ErrorCode::SinkWriteFailed,
            format!("Failed to write results to {}", self.path.display()),
            err,
        )
    }
}

impl ResultSink for JsonlResultSink {
    /// Replaces the file with one record per assessment
    fn write(&self, assessments: &[RiskAssessment]) -> AppResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.sink_error(e))?;
        }

        let file = File::create(&self.path).map_err(|e| self.sink_error(e))?;
        let mut writer = BufWriter::new(file);
        for assessment in assessments {
            serde_json::to_writer(&mut writer, &assessment.to_record()).map_err(|e| self.sink_error(e))?;
            writer.write_all(b"\n").map_err(|e| self.sink_error(e))?;
        }
        writer.flush().map_err(|e| self.sink_error(e))?;

        info!("📝 Wrote {} results to {}", assessments.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResultRecord;
    use chrono::{DateTime, Utc};

    #[test]
    fn test_sink_writes_flat_records() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlResultSink::new(dir.path().join("scores.jsonl"));
        let failed = RiskAssessment::failed("0xabc", "timeout", DateTime::<Utc>::default());

        sink.write(&[failed]).unwrap();

        let content = fs::read_to_string(sink.path()).unwrap();
        let records: Vec<ResultRecord> = content.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].risk_score, 999);
        assert_eq!(records[0].risk_category, "Very High Risk");
        assert_eq!(records[0].error, "timeout");
        assert_eq!(records[0].total_transactions, 0);
    }
}
