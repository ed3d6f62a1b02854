use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tracing::info;

use super::{GeneralReport, LatencyList, UrlHitCsv};
use crate::config::RunConfiguration;
use crate::stats::Summary;

/// Writes the three report files of a run into a directory.
pub struct ReportWriter {
    prefix: String,
    dir: PathBuf,
}

impl ReportWriter {
    pub fn new(prefix: impl Into<String>, dir: impl AsRef<Path>) -> Self {
        Self {
            prefix: prefix.into(),
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Write the general report, the url hit csv and the raw latency list.
    /// Returns the paths written.
    pub fn write(&self, summary: &Summary, config: &RunConfiguration) -> Result<Vec<PathBuf>> {
        self.write_at(Local::now(), summary, config)
    }

    fn write_at(
        &self,
        now: DateTime<Local>,
        summary: &Summary,
        config: &RunConfiguration,
    ) -> Result<Vec<PathBuf>> {
        let stamp = format!("{}_{}", now.format("%Y%B%-d"), now.timestamp());
        let reports = [
            (
                "general_report",
                GeneralReport { summary, config }.to_string(),
            ),
            ("url_hit_report", UrlHitCsv(summary).to_string()),
            ("time_report", LatencyList(summary).to_string()),
        ];

        let mut paths = Vec::with_capacity(reports.len());
        for (kind, content) in reports {
            let path = self
                .dir
                .join(format!("{}_{}_{}.txt", self.prefix, kind, stamp));
            std::fs::write(&path, content)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!("Wrote {}", path.display());
            paths.push(path);
        }
        Ok(paths)
    }
}
