use super::Report;
use crate::core::{ArchiveError, Result};
use crate::storage::persistence::atomic_write;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Destination for the per-run report artifact
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Persist the report and return where it went
    async fn write_report(&self, report: &Report) -> Result<String>;
}

/// Writes `archive_report_YYYY-MM-DD.json` under a directory.
///
/// A second run on the same calendar day replaces that day's file.
pub struct FileReportSink {
    dir: PathBuf,
}

impl FileReportSink {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, report: &Report) -> PathBuf {
        self.dir.join(report.file_name())
    }
}

#[async_trait]
impl ReportSink for FileReportSink {
    async fn write_report(&self, report: &Report) -> Result<String> {
        let path = self.path_for(report);
        let json = report
            .to_json_pretty()
            .map_err(|err| ArchiveError::ReportWrite(err.to_string()))?;
        atomic_write(&path, json.as_bytes())
            .await
            .map_err(|err| ArchiveError::ReportWrite(err.to_string()))?;
        Ok(path.display().to_string())
    }
}

/// Keeps reports in memory
#[derive(Default)]
pub struct MemoryReportSink {
    reports: Mutex<Vec<Report>>,
}

impl MemoryReportSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn reports(&self) -> Vec<Report> {
        self.reports.lock().await.clone()
    }
}

#[async_trait]
impl ReportSink for MemoryReportSink {
    async fn write_report(&self, report: &Report) -> Result<String> {
        let mut reports = self.reports.lock().await;
        reports.push(report.clone());
        Ok(format!("memory://reports/{}", reports.len() - 1))
    }
}
