// ==============================================================================
// report.rs - Run Report
// ==============================================================================
// Description: JSON summary of one generator run (counts, issues, files)
// Created: 2026-10-15
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

use crate::diagnostics::Diagnostics;
use crate::output::WrittenFile;
use crate::upload::FileType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UploadStatus {
    NotRequested,
    Submitted { build_tag: String },
    Failed { build_tag: String, reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedFile {
    #[serde(flatten)]
    pub file: WrittenFile,
    pub upload: UploadStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub file_type: FileType,
    pub release_version: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub diagnostics: Diagnostics,
    pub files: Vec<GeneratedFile>,
}

impl RunReport {
    pub fn file_name(release_version: &str) -> String {
        format!("run-report-{}.json", release_version)
    }

    pub fn summary_line(&self) -> String {
        self.diagnostics.summary_line(self.file_type)
    }

    pub fn upload_failures(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.upload, UploadStatus::Failed { .. }))
            .count()
    }

    /// Write `run-report-<release>.json` into `dir`
    pub fn write_json(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(Self::file_name(&self.release_version));
        let json = serde_json::to_string_pretty(self).context("Failed to serialize run report")?;
        std::fs::write(&path, json).with_context(|| format!("Failed to write run report {:?}", path))?;

        info!("Run report written to {:?}", path);
        Ok(path)
    }
}
