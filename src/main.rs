// ==============================================================================
// main.rs - Variant File Generator Entry Point
// ==============================================================================
// Description: Command line entry point: JSON-lines rows in, VCF files out
// Created: 2026-10-15
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use variant_file_generator::config::{GeneratorConfig, DEFAULT_SKIP_CHROMOSOMES};
use variant_file_generator::normalizer::AnchorPolicy;
use variant_file_generator::output::{OutputFormat, VcfLayout};
use variant_file_generator::source::JsonLinesSource;
use variant_file_generator::upload::FmsUploader;
use variant_file_generator::VariantFileGenerator;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON-lines export of the variant query (.jsonl or .jsonl.gz)
    #[arg(long, env = "VARIANT_ROWS")]
    rows: PathBuf,

    /// Release version stamped into headers and file names
    #[arg(long, env = "RELEASE_VERSION")]
    release_version: String,

    /// Output directory (created if missing)
    #[arg(long, env = "OUTPUT_DIR", default_value = "output")]
    output_dir: PathBuf,

    /// Directory of per-chromosome FASTA files for REF validation
    #[arg(long, env = "FASTA_DIR")]
    fasta_dir: Option<PathBuf>,

    /// Chromosome ids to exclude (replaces the default skip-set)
    #[arg(long = "skip-chromosome", value_delimiter = ',')]
    skip_chromosomes: Vec<String>,

    /// Write the tab-delimited debug format instead of VCF
    #[arg(long)]
    tab: bool,

    #[arg(long, value_enum, default_value_t = VcfLayout::PerChromosome)]
    layout: VcfLayout,

    #[arg(long, value_enum, default_value_t = AnchorPolicy::IndelOnly)]
    anchor_policy: AnchorPolicy,

    /// gzip the generated files
    #[arg(long)]
    compress: bool,

    /// Submit generated files to the FMS
    #[arg(long)]
    upload: bool,

    /// FMS base URL
    #[arg(long, env = "FMS_API_URL")]
    fms_api_url: Option<String>,

    /// FMS API key (or use API_KEY_FILE env var)
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Per-file upload timeout in seconds
    #[arg(long, env = "UPLOAD_TIMEOUT_SECS", default_value_t = 300)]
    upload_timeout: u64,

    /// Chromosomes processed concurrently (defaults to available cores)
    #[arg(long, env = "GENERATOR_WORKERS")]
    workers: Option<usize>,

    /// Fixed ##fileDate (YYYY-MM-DD), for reproducible output
    #[arg(long, env = "FILE_DATE")]
    file_date: Option<NaiveDate>,

    /// Undecodable input lines tolerated before the run aborts (unbounded if unset)
    #[arg(long, env = "MAX_ROW_ERRORS")]
    max_row_errors: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "variant_file_generator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Variant file generator starting...");

    let args = Args::parse();
    let config = build_config(&args);
    let generator = VariantFileGenerator::new(config)?;
    let mut source = JsonLinesSource::new(&args.rows);
    if let Some(max) = args.max_row_errors {
        source = source.with_max_errors(max);
    }

    let result = if args.upload {
        let api_key = resolve_api_key(args.api_key.clone())?;
        let api_url = args
            .fms_api_url
            .clone()
            .context("FMS_API_URL must be provided when --upload is set")?;
        let uploader = FmsUploader::new(
            api_url,
            api_key,
            &args.release_version,
            Duration::from_secs(args.upload_timeout),
        )?;
        generator.with_uploader(uploader).process(source).await
    } else {
        generator.process(source).await
    };

    match result {
        Ok(report) => {
            if report.upload_failures() > 0 {
                warn!("{} file(s) failed to upload", report.upload_failures());
            }
            info!("Generated {} file(s) for release {}", report.files.len(), report.release_version);
            Ok(())
        }
        Err(e) => {
            error!("Variant file generation failed: {:#}", e);
            Err(e)
        }
    }
}

fn build_config(args: &Args) -> GeneratorConfig {
    let skip: Vec<String> = if args.skip_chromosomes.is_empty() {
        DEFAULT_SKIP_CHROMOSOMES.iter().map(|c| c.to_string()).collect()
    } else {
        args.skip_chromosomes.clone()
    };

    let mut config = GeneratorConfig::new(&args.release_version, &args.output_dir)
        .with_skip_chromosomes(skip)
        .with_format(if args.tab { OutputFormat::Tab } else { OutputFormat::Vcf })
        .with_layout(args.layout)
        .with_anchor_policy(args.anchor_policy)
        .with_compression(args.compress)
        .with_upload(args.upload, Duration::from_secs(args.upload_timeout));

    if let Some(fasta_dir) = &args.fasta_dir {
        config = config.with_fasta_dir(fasta_dir);
    }
    if let Some(workers) = args.workers {
        config = config.with_workers(workers);
    }
    if let Some(file_date) = args.file_date {
        config = config.with_file_date(file_date);
    }
    config
}

/// API key from the flag/env, or from the file named by API_KEY_FILE
fn resolve_api_key(api_key: Option<String>) -> Result<String> {
    if let Some(key) = api_key {
        return Ok(key);
    }
    if let Ok(file_path) = std::env::var("API_KEY_FILE") {
        return std::fs::read_to_string(&file_path)
            .with_context(|| format!("Failed to read API_KEY_FILE {}", file_path))
            .map(|s| s.trim().to_string());
    }
    anyhow::bail!("API_KEY or API_KEY_FILE must be provided when --upload is set");
}
