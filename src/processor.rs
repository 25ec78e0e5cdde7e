// ==============================================================================
// processor.rs - Variant File Generation Run Controller
// ==============================================================================
// Description: Drives rows -> partitions -> normalized/merged records -> files
// Created: 2026-10-15
// Modified: 2026-10-19
// Version: 1.1.0
// ==============================================================================
// Run order:
//   1. Bulk fetch from the row source (fatal on failure, nothing written)
//   2. Partition by chromosome, honouring the skip-set
//   3. Normalize + merge each partition on the blocking pool (bounded)
//   4. Sort and write files (temp file + rename)
//   5. Optional upload, failures recorded per file
//   6. Summary line and run report
// ==============================================================================

use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::GeneratorConfig;
use crate::diagnostics::{DataIssue, Diagnostics};
use crate::merger::RecordMerger;
use crate::models::{ChromosomeFile, VariantRow};
use crate::normalizer::{AnchorPolicy, Normalizer};
use crate::output::{finalize, sort_chromosomes, OutputFormat, OutputWriter, VcfLayout, WrittenFile};
use crate::partitioner::Partitioner;
use crate::reference::{FastaDirectory, ReferenceSource};
use crate::report::{GeneratedFile, RunReport, UploadStatus};
use crate::source::RowSource;
use crate::upload::{FileType, NoUploader, UploadError, Uploader};

/// Result of one chromosome partition
#[derive(Debug)]
pub struct PartitionResult {
    pub file: ChromosomeFile,
    pub diagnostics: Diagnostics,
}

pub struct VariantFileGenerator<U = NoUploader> {
    config: GeneratorConfig,
    reference: Option<Arc<dyn ReferenceSource>>,
    uploader: U,
}

impl VariantFileGenerator<NoUploader> {
    /// Validate the configuration and open the FASTA directory, if any.
    ///
    /// A configured FASTA directory that does not exist only disables REF
    /// validation; it is not an error.
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        config.validate().context("Invalid generator configuration")?;

        let reference = match &config.fasta_dir {
            Some(dir) if dir.is_dir() => {
                let fasta = FastaDirectory::open(dir)?;
                Some(Arc::new(fasta) as Arc<dyn ReferenceSource>)
            }
            Some(dir) => {
                warn!("FASTA directory {:?} not found, REF validation disabled", dir);
                None
            }
            None => None,
        };

        Ok(Self {
            config,
            reference,
            uploader: NoUploader,
        })
    }
}

impl<U: Uploader> VariantFileGenerator<U> {
    /// Replace the reference used for REF validation
    pub fn with_reference(mut self, reference: Arc<dyn ReferenceSource>) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn with_uploader<V: Uploader>(self, uploader: V) -> VariantFileGenerator<V> {
        VariantFileGenerator {
            config: self.config,
            reference: self.reference,
            uploader,
        }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Run the whole pipeline once. The source is drained on the blocking
    /// pool, so file or database readers never stall the runtime.
    ///
    /// # Errors
    /// Source failures (`SourceError`, reachable via `downcast_ref`) abort
    /// the run before anything is written. Write failures abort as well.
    /// Data-quality problems and upload failures never do; they end up in
    /// the report's diagnostics.
    pub async fn process<S>(&self, mut source: S) -> Result<RunReport>
    where
        S: RowSource + Send + 'static,
    {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(
            "Starting variant file generation run {} for release {}",
            run_id, self.config.release_version
        );

        let batch = tokio::task::spawn_blocking(move || source.fetch())
            .await
            .context("Row source task failed")?
            .context("Failed to fetch variant rows")?;

        let mut diagnostics = Diagnostics::new();
        diagnostics.rows_read = batch.rows_read();
        for issue in batch.undecodable {
            diagnostics.record(issue);
        }

        let partitions = Partitioner::new(&self.config.skip_chromosomes).partition(batch.rows, &mut diagnostics);
        info!(
            "Processing {} chromosomes with up to {} workers",
            partitions.placed.len(),
            self.config.workers
        );

        let mut files = self.process_partitions(partitions.placed, &mut diagnostics).await?;
        sort_chromosomes(&mut files);
        diagnostics.records_emitted = files.iter().map(|f| f.records.len()).sum();

        let writer = self.writer();
        let layout = self.config.layout;
        let written = tokio::task::spawn_blocking(move || write_files(&writer, layout, &files))
            .await
            .context("Output task failed")??;

        let generated = self.upload_files(written, &mut diagnostics).await;

        let report = RunReport {
            run_id,
            file_type: FileType::Vcf,
            release_version: self.config.release_version.clone(),
            started_at,
            finished_at: Utc::now(),
            diagnostics,
            files: generated,
        };

        info!("{}", report.summary_line());
        std::fs::create_dir_all(&self.config.output_dir)
            .with_context(|| format!("Failed to create output directory {:?}", self.config.output_dir))?;
        report.write_json(&self.config.output_dir)?;

        Ok(report)
    }

    async fn process_partitions(
        &self,
        placed: BTreeMap<String, Vec<VariantRow>>,
        diagnostics: &mut Diagnostics,
    ) -> Result<Vec<ChromosomeFile>> {
        let semaphore = Arc::new(Semaphore::new(self.config.workers));
        let mut tasks = JoinSet::new();

        for (chromosome, rows) in placed {
            let permit = semaphore.clone().acquire_owned().await?;
            let reference = self.reference.clone();
            let policy = self.config.anchor_policy;

            tasks.spawn_blocking(move || {
                let _permit = permit;
                process_partition(chromosome, rows, policy, reference.as_deref())
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            results.push(joined.context("Partition task failed")?);
        }

        // completion order varies; merge in chromosome order
        results.sort_by(|a, b| natord::compare(&a.file.chromosome, &b.file.chromosome));
        let mut files = Vec::with_capacity(results.len());
        for result in results {
            diagnostics.merge(result.diagnostics);
            files.push(result.file);
        }
        Ok(files)
    }

    fn writer(&self) -> OutputWriter {
        OutputWriter::new(
            &self.config.output_dir,
            &self.config.release_version,
            self.config.file_date,
        )
        .with_format(self.config.format)
        .with_compression(self.config.compress)
        .with_source_id(&self.config.source_id)
    }

    async fn upload_files(&self, written: Vec<WrittenFile>, diagnostics: &mut Diagnostics) -> Vec<GeneratedFile> {
        let mut generated = Vec::with_capacity(written.len());

        for file in written {
            let upload = if !self.config.upload {
                UploadStatus::NotRequested
            } else if file.format == OutputFormat::Tab {
                info!("Skipping upload of debug file {}", file.file_name());
                UploadStatus::NotRequested
            } else {
                let build_tag = file.build_tag();
                match self.submit(&file.path, &build_tag).await {
                    Ok(()) => UploadStatus::Submitted { build_tag },
                    Err(e) => {
                        diagnostics.record(DataIssue::UploadFailure {
                            file: file.file_name(),
                            reason: e.to_string(),
                        });
                        UploadStatus::Failed {
                            build_tag,
                            reason: e.to_string(),
                        }
                    }
                }
            };
            generated.push(GeneratedFile { file, upload });
        }
        generated
    }

    async fn submit(&self, path: &Path, build_tag: &str) -> Result<(), UploadError> {
        let timeout = self.config.upload_timeout;
        match tokio::time::timeout(timeout, self.uploader.submit(path, FileType::Vcf, build_tag)).await {
            Ok(result) => result,
            Err(_) => Err(UploadError::Timeout(timeout)),
        }
    }
}

/// Normalize and merge one chromosome's rows
pub fn process_partition(
    chromosome: String,
    rows: Vec<VariantRow>,
    policy: AnchorPolicy,
    reference: Option<&dyn ReferenceSource>,
) -> PartitionResult {
    let mut diagnostics = Diagnostics::new();

    let sequence = match reference.map(|r| r.load(&chromosome)).transpose() {
        Ok(sequence) => sequence.flatten(),
        Err(e) => {
            warn!("Reference for chromosome {} unreadable, REF validation skipped: {:#}", chromosome, e);
            None
        }
    };
    if reference.is_some() && sequence.is_none() {
        debug!("No reference sequence for chromosome {}", chromosome);
    }

    let normalizer = Normalizer::new(policy).with_reference(sequence.as_ref());
    let mut merger = RecordMerger::new(chromosome.as_str());

    for row in &rows {
        match normalizer.normalize(row) {
            Ok(normalized) => {
                for issue in normalized.issues {
                    diagnostics.record(issue);
                }
                for issue in merger.add(normalized.variant) {
                    diagnostics.record(issue);
                }
            }
            Err(issue) => diagnostics.record(issue),
        }
    }

    let file = finalize(chromosome, merger.finish());
    info!(
        "Chromosome {}: {} rows -> {} records ({} malformed)",
        file.chromosome,
        rows.len(),
        file.records.len(),
        diagnostics.rows_malformed
    );

    PartitionResult { file, diagnostics }
}

/// Write the finalized chromosomes per the layout; empty chromosomes get no file
fn write_files(writer: &OutputWriter, layout: VcfLayout, files: &[ChromosomeFile]) -> Result<Vec<WrittenFile>> {
    let non_empty: Vec<ChromosomeFile> = files.iter().filter(|f| !f.is_empty()).cloned().collect();
    for file in files.iter().filter(|f| f.is_empty()) {
        info!("Chromosome {} has no records, no file written", file.chromosome);
    }

    match layout {
        VcfLayout::PerChromosome => non_empty.iter().map(|file| writer.write_chromosome(file)).collect(),
        VcfLayout::Combined if non_empty.is_empty() => Ok(Vec::new()),
        VcfLayout::Combined => Ok(vec![writer.write_combined(&non_empty)?]),
    }
}
