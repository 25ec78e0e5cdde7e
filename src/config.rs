// ==============================================================================
// config.rs - Generator Configuration
// ==============================================================================
// Description: Immutable run configuration passed to the generator
// Created: 2026-10-15
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::normalizer::AnchorPolicy;
use crate::output::{default_source_id, OutputFormat, VcfLayout};

/// Scaffolds excluded unless the caller overrides the skip-set
pub const DEFAULT_SKIP_CHROMOSOMES: [&str; 1] = ["Unmapped_Scaffold_8_D1580_D1567"];

pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("release version must not be empty")]
    EmptyRelease,

    #[error("release version '{0}' contains characters not allowed in file names")]
    InvalidRelease(String),

    #[error("worker count must be at least 1")]
    NoWorkers,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratorConfig {
    /// Release/build token stamped into headers and file names
    pub release_version: String,
    pub skip_chromosomes: BTreeSet<String>,
    pub output_dir: PathBuf,
    /// Per-chromosome FASTA files; `None` disables REF validation
    pub fasta_dir: Option<PathBuf>,
    pub format: OutputFormat,
    pub layout: VcfLayout,
    pub anchor_policy: AnchorPolicy,
    /// gzip the output files
    pub compress: bool,
    pub upload: bool,
    pub upload_timeout: Duration,
    /// Partitions processed concurrently
    pub workers: usize,
    /// `##fileDate`; fixed per run so re-runs reproduce the same bytes
    pub file_date: NaiveDate,
    pub source_id: String,
}

impl GeneratorConfig {
    pub fn new(release_version: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            release_version: release_version.into(),
            skip_chromosomes: DEFAULT_SKIP_CHROMOSOMES.iter().map(|c| c.to_string()).collect(),
            output_dir: output_dir.into(),
            fasta_dir: None,
            format: OutputFormat::default(),
            layout: VcfLayout::default(),
            anchor_policy: AnchorPolicy::default(),
            compress: false,
            upload: false,
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
            workers: default_workers(),
            file_date: Utc::now().date_naive(),
            source_id: default_source_id(),
        }
    }

    pub fn with_skip_chromosomes<I, S>(mut self, chromosomes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip_chromosomes = chromosomes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_fasta_dir(mut self, fasta_dir: impl Into<PathBuf>) -> Self {
        self.fasta_dir = Some(fasta_dir.into());
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_layout(mut self, layout: VcfLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_anchor_policy(mut self, policy: AnchorPolicy) -> Self {
        self.anchor_policy = policy;
        self
    }

    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn with_upload(mut self, upload: bool, timeout: Duration) -> Self {
        self.upload = upload;
        self.upload_timeout = timeout;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_file_date(mut self, file_date: NaiveDate) -> Self {
        self.file_date = file_date;
        self
    }

    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = source_id.into();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let release = self.release_version.trim();
        if release.is_empty() {
            return Err(ConfigError::EmptyRelease);
        }
        if release.contains(['/', '\\', '\0']) || release.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidRelease(self.release_version.clone()));
        }
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        Ok(())
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}
