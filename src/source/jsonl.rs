// ==============================================================================
// source/jsonl.rs - JSON Lines Row Source
// ==============================================================================
// Description: Reads an exported variant query result, one JSON object per line
// Created: 2026-10-13
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{RowBatch, RowSource, SourceError};
use crate::diagnostics::{DataIssue, MalformedReason};
use crate::models::VariantRow;

/// JSON-lines export of the variant query (`.jsonl` or `.jsonl.gz`)
#[derive(Debug, Clone)]
pub struct JsonLinesSource {
    path: PathBuf,
    /// Undecodable lines tolerated before the source gives up; `None`
    /// counts every such line as malformed and keeps reading
    pub max_errors: Option<usize>,
}

impl JsonLinesSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_errors: None,
        }
    }

    pub fn with_max_errors(mut self, max: usize) -> Self {
        self.max_errors = Some(max);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<Box<dyn BufRead>, SourceError> {
        let file = File::open(&self.path).map_err(|e| match e.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                SourceError::Unavailable(format!("{}: {}", self.path.display(), e))
            }
            _ => SourceError::Io(e),
        })?;

        let reader: Box<dyn Read> = if self.path.extension().is_some_and(|ext| ext == "gz") {
            Box::new(MultiGzDecoder::new(file))
        } else {
            Box::new(file)
        };
        Ok(Box::new(BufReader::new(reader)))
    }
}

impl RowSource for JsonLinesSource {
    fn fetch(&mut self) -> Result<RowBatch, SourceError> {
        info!("Reading variant rows from {:?}", self.path);
        let reader = self.open()?;
        let mut batch = RowBatch::default();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<VariantRow>(line) {
                Ok(row) => batch.rows.push(row),
                Err(e) => {
                    debug!("Undecodable row at line {}: {}", index + 1, e);
                    batch.undecodable.push(DataIssue::MalformedRow {
                        row: format!("line {}", index + 1),
                        reason: MalformedReason::Undecodable(e.to_string()),
                    });

                    if let Some(max) = self.max_errors {
                        if batch.undecodable.len() > max {
                            return Err(SourceError::TooManyErrors {
                                count: batch.undecodable.len(),
                                max,
                            });
                        }
                    }
                }
            }
        }

        info!(
            "Read {} rows ({} undecodable) from {:?}",
            batch.rows_read(),
            batch.undecodable.len(),
            self.path
        );
        Ok(batch)
    }
}
