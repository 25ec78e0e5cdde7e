// ==============================================================================
// output.rs - VCF and Tab File Writer
// ==============================================================================
// Description: Sorts merged records and writes VCF or tab-delimited files
// Created: 2026-10-14
// Modified: 2026-10-19
// Version: 1.2.0
// ==============================================================================
// Files are written to a temporary sibling and renamed into place, so a
// reader never observes a half-written file. Gzip output uses a zero mtime
// so re-runs over the same rows are byte-identical.
// ==============================================================================

use anyhow::{Context, Result};
use chrono::NaiveDate;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::models::{ChromosomeFile, InfoKey, MergedRecord, RecordFlag, ValueSet};
use crate::upload::COMBINED_BUILD_TAG;

/// Output file flavours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// VCF 4.2 (distribution format)
    #[default]
    Vcf,
    /// One column per field, for eyeballing merges
    Tab,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Vcf => "vcf",
            OutputFormat::Tab => "tab",
        }
    }
}

/// How chromosomes map onto files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum VcfLayout {
    /// variants-<release>-<chrom>.vcf per chromosome
    #[default]
    PerChromosome,
    /// A single variants-<release>.vcf
    Combined,
}

/// Metadata written into every file header
#[derive(Debug, Clone)]
pub struct HeaderInfo {
    pub release_version: String,
    pub file_date: NaiveDate,
    pub source_id: String,
    pub assemblies: ValueSet,
    pub species: ValueSet,
    pub contigs: Vec<String>,
}

/// A file that reached its final path
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WrittenFile {
    pub path: PathBuf,
    pub format: OutputFormat,
    pub chromosomes: Vec<String>,
    pub records: usize,
    pub assemblies: ValueSet,
    pub sha256: String,
}

impl WrittenFile {
    /// Upload subtype: the single assembly, or COMBINED
    pub fn build_tag(&self) -> String {
        match (self.assemblies.len(), self.assemblies.first()) {
            (1, Some(assembly)) => assembly.to_string(),
            _ => COMBINED_BUILD_TAG.to_string(),
        }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Position, then REF, then ALT
pub fn sort_records(records: &mut [MergedRecord]) {
    records.sort_by(|a, b| {
        (a.position, &a.reference, &a.alternate).cmp(&(b.position, &b.reference, &b.alternate))
    });
}

/// Sorted, emit-ready chromosome
pub fn finalize(chromosome: impl Into<String>, mut records: Vec<MergedRecord>) -> ChromosomeFile {
    sort_records(&mut records);
    ChromosomeFile {
        chromosome: chromosome.into(),
        records,
    }
}

/// Natural chromosome order: 1, 2, ..., 10, X
pub fn sort_chromosomes(files: &mut [ChromosomeFile]) {
    files.sort_by(|a, b| natord::compare(&a.chromosome, &b.chromosome));
}

/// Writes finalized chromosomes into the output directory
#[derive(Debug, Clone)]
pub struct OutputWriter {
    output_dir: PathBuf,
    release_version: String,
    format: OutputFormat,
    compress: bool,
    file_date: NaiveDate,
    source_id: String,
}

impl OutputWriter {
    pub fn new(output_dir: impl Into<PathBuf>, release_version: impl Into<String>, file_date: NaiveDate) -> Self {
        Self {
            output_dir: output_dir.into(),
            release_version: release_version.into(),
            format: OutputFormat::Vcf,
            compress: false,
            file_date,
            source_id: default_source_id(),
        }
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = source_id.into();
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// `variants-<release>[-<chrom>].<ext>[.gz]`
    pub fn file_name(&self, chromosome: Option<&str>) -> String {
        let mut name = format!("variants-{}", sanitize_file_component(&self.release_version));
        if let Some(chromosome) = chromosome {
            name.push('-');
            name.push_str(&sanitize_file_component(chromosome));
        }
        name.push('.');
        name.push_str(self.format.extension());
        if self.compress {
            name.push_str(".gz");
        }
        name
    }

    /// One file for one chromosome
    pub fn write_chromosome(&self, file: &ChromosomeFile) -> Result<WrittenFile> {
        let path = self.output_dir.join(self.file_name(Some(&file.chromosome)));
        self.write(&path, std::slice::from_ref(file))
    }

    /// One file for every chromosome, in the order given
    pub fn write_combined(&self, files: &[ChromosomeFile]) -> Result<WrittenFile> {
        let path = self.output_dir.join(self.file_name(None));
        self.write(&path, files)
    }

    fn write(&self, path: &Path, files: &[ChromosomeFile]) -> Result<WrittenFile> {
        let header = self.header_info(files);
        let records: Vec<&MergedRecord> = files.iter().flat_map(|f| f.records.iter()).collect();

        write_atomic(path, self.compress, |out| match self.format {
            OutputFormat::Vcf => write_vcf(out, &header, &records),
            OutputFormat::Tab => write_tab(out, &header, &records),
        })?;

        let sha256 = compute_sha256(path)?;
        info!("Wrote {} records to {:?}", records.len(), path);

        Ok(WrittenFile {
            path: path.to_path_buf(),
            format: self.format,
            chromosomes: header.contigs,
            records: records.len(),
            assemblies: header.assemblies,
            sha256,
        })
    }

    fn header_info(&self, files: &[ChromosomeFile]) -> HeaderInfo {
        let mut assemblies = ValueSet::default();
        let mut species = ValueSet::default();
        for file in files {
            assemblies.extend(file.assemblies().iter());
            species.extend(file.species().iter());
        }

        HeaderInfo {
            release_version: self.release_version.clone(),
            file_date: self.file_date,
            source_id: self.source_id.clone(),
            assemblies,
            species,
            contigs: files.iter().map(|f| f.chromosome.clone()).collect(),
        }
    }
}

pub fn default_source_id() -> String {
    format!("{}-v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

/// Write through a temp file in the destination directory, then rename
fn write_atomic<F>(path: &Path, compress: bool, body: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let dir = path
        .parent()
        .with_context(|| format!("Output path {:?} has no parent directory", path))?;
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create output directory {:?}", dir))?;

    let temp = NamedTempFile::new_in(dir).with_context(|| format!("Failed to create temp file in {:?}", dir))?;
    debug!("Writing {:?} via {:?}", path, temp.path());

    let buffered = BufWriter::new(temp.as_file());
    if compress {
        let mut encoder = GzEncoder::new(buffered, Compression::default());
        body(&mut encoder)?;
        encoder.finish()?.flush()?;
    } else {
        let mut buffered = buffered;
        body(&mut buffered)?;
        buffered.flush()?;
    }
    temp.as_file().sync_all()?;

    // NamedTempFile is created 0600
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(temp.path(), std::fs::Permissions::from_mode(0o644))?;
    }

    temp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to move output into place at {:?}", path))?;
    Ok(())
}

fn write_vcf(out: &mut dyn Write, header: &HeaderInfo, records: &[&MergedRecord]) -> Result<()> {
    writeln!(out, "##fileformat=VCFv4.3")?;
    writeln!(out, "##fileDate={}", header.file_date.format("%Y%m%d"))?;
    writeln!(out, "##source={}", header.source_id)?;
    writeln!(out, "##releaseVersion={}", header.release_version)?;
    if !header.assemblies.is_empty() {
        writeln!(out, "##reference={}", header.assemblies.join(","))?;
    }
    if !header.species.is_empty() {
        writeln!(out, "##species={}", header.species.join(","))?;
    }
    for contig in &header.contigs {
        writeln!(out, "##contig=<ID={}>", contig)?;
    }
    for key in InfoKey::ALL {
        writeln!(
            out,
            "##INFO=<ID={},Number=.,Type=String,Description=\"{}\">",
            key.as_str(),
            key.description()
        )?;
    }
    for flag in RecordFlag::ALL {
        writeln!(out, "##FILTER=<ID={},Description=\"{}\">", flag.as_str(), flag.description())?;
    }
    writeln!(out, "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO")?;

    for record in records {
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t.\t{}\t{}",
            record.chromosome,
            record.position,
            format_id(record),
            record.reference,
            record.alternate,
            record.filter_field(),
            format_info(record)
        )?;
    }
    Ok(())
}

/// `Key=v1,v2;Key2=v` in vocabulary order, `.` when empty
pub fn format_info(record: &MergedRecord) -> String {
    let fields: Vec<String> = record
        .info
        .iter()
        .map(|(key, values)| {
            let encoded: Vec<String> = values.iter().map(encode_info_value).collect();
            format!("{}={}", key.as_str(), encoded.join(","))
        })
        .collect();

    if fields.is_empty() {
        ".".to_string()
    } else {
        fields.join(";")
    }
}

/// Characters INFO values cannot carry
const INFO_RESERVED: [char; 8] = [';', '=', ',', '%', ' ', '\t', '\n', '\r'];
/// Characters a single ID cannot carry (`;` separates IDs)
const ID_RESERVED: [char; 6] = [';', '%', ' ', '\t', '\n', '\r'];

/// Percent-encode the characters INFO values cannot carry
pub fn encode_info_value(value: &str) -> String {
    percent_encode(value, &INFO_RESERVED)
}

/// VCF ID column: each contributing id encoded, `;`-joined, `.` when none
pub fn format_id(record: &MergedRecord) -> String {
    if record.ids.is_empty() {
        return ".".to_string();
    }
    let encoded: Vec<String> = record.ids.iter().map(|id| percent_encode(id, &ID_RESERVED)).collect();
    encoded.join(";")
}

fn percent_encode(value: &str, reserved: &[char]) -> String {
    let mut encoded = String::with_capacity(value.len());
    for c in value.chars() {
        if reserved.contains(&c) {
            encoded.push_str(&format!("%{:02X}", c as u32));
        } else {
            encoded.push(c);
        }
    }
    encoded
}

const TAB_COLUMNS: [&str; 17] = [
    "chromosome",
    "position",
    "id",
    "reference",
    "alternate",
    "filter",
    "alleles",
    "genes",
    "consequence",
    "impact",
    "dataProvider",
    "hgvs",
    "soTerm",
    "symbol",
    "assembly",
    "species",
    "contributors",
];

fn write_tab(out: &mut dyn Write, header: &HeaderInfo, records: &[&MergedRecord]) -> Result<()> {
    let rule = "#".repeat(72);
    writeln!(out, "{}", rule)?;
    writeln!(out, "#")?;
    writeln!(out, "# Variants")?;
    writeln!(out, "# Source: {}", header.source_id)?;
    writeln!(out, "# Release Version: {}", header.release_version)?;
    writeln!(out, "# Date: {}", header.file_date.format("%Y-%m-%d"))?;
    if !header.assemblies.is_empty() {
        writeln!(out, "# Assemblies: {}", header.assemblies.join(", "))?;
    }
    writeln!(out, "#")?;
    writeln!(out, "{}", rule)?;

    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_writer(out);
    writer.write_record(TAB_COLUMNS)?;

    for record in records {
        let info = |key: InfoKey| record.info.get(key).map(|values| values.join(",")).unwrap_or_default();
        writer.write_record([
            record.chromosome.clone(),
            record.position.to_string(),
            record.id_field(),
            record.reference.clone(),
            record.alternate.clone(),
            record.filter_field(),
            info(InfoKey::Alleles),
            info(InfoKey::Genes),
            info(InfoKey::Consequence),
            info(InfoKey::Impact),
            info(InfoKey::DataProvider),
            info(InfoKey::Hgvs),
            info(InfoKey::SoTerm),
            info(InfoKey::Symbol),
            record.assembly.clone().unwrap_or_default(),
            record.species.clone().unwrap_or_default(),
            record.contributors.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Keep chromosome and release tokens safe inside a file name
fn sanitize_file_component(name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(128)
        .collect();

    if safe.is_empty() || safe.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        safe
    }
}

/// Hex SHA-256 of a file on disk
pub fn compute_sha256(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("Failed to open {:?} for hashing", path))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InfoFields, NormalizedVariant};
    use flate2::read::MultiGzDecoder;
    use noodles_vcf as vcf;
    use noodles_vcf::variant::record::AlternateBases;
    use std::collections::BTreeSet;
    use tempfile::tempdir;

    fn record(chromosome: &str, position: u64, reference: &str, alternate: &str, id: &str) -> MergedRecord {
        let mut info = InfoFields::default();
        info.insert(InfoKey::Alleles, format!("{}-allele", id));
        MergedRecord::from_variant(NormalizedVariant {
            chromosome: chromosome.to_string(),
            position,
            reference: reference.to_string(),
            alternate: alternate.to_string(),
            id: Some(id.to_string()),
            info,
            assembly: Some("GRCz11".to_string()),
            species: Some("Danio rerio".to_string()),
            flags: BTreeSet::new(),
        })
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    #[test]
    fn test_records_sort_by_position_ref_alt() {
        let file = finalize(
            "1",
            vec![
                record("1", 300, "A", "G", "V3"),
                record("1", 100, "C", "T", "V2"),
                record("1", 100, "C", "A", "V1"),
                record("1", 100, "AC", "A", "V0"),
            ],
        );
        let order: Vec<_> = file.records.iter().map(|r| r.id_field()).collect();
        assert_eq!(order, vec!["V0", "V1", "V2", "V3"]);
    }

    #[test]
    fn test_chromosomes_sort_naturally() {
        let mut files: Vec<_> = ["10", "2", "X", "1"].iter().map(|c| finalize(*c, Vec::new())).collect();
        sort_chromosomes(&mut files);
        let order: Vec<_> = files.iter().map(|f| f.chromosome.as_str()).collect();
        assert_eq!(order, vec!["1", "2", "10", "X"]);
    }

    #[test]
    fn test_info_encoding() {
        assert_eq!(encode_info_value("a;b=c,d%e f"), "a%3Bb%3Dc%2Cd%25e%20f");
        assert_eq!(encode_info_value("line\nbreak\t"), "line%0Abreak%09");

        let mut merged = record("1", 1, "A", "G", "V1");
        merged.info.insert(InfoKey::Alleles, "A;2");
        merged.info.insert(InfoKey::Impact, "HIGH");
        assert_eq!(format_info(&merged), "Alleles=V1-allele,A%3B2;Impact=HIGH");

        merged.info = InfoFields::default();
        assert_eq!(format_info(&merged), ".");
    }

    #[test]
    fn test_id_column_encodes_separators() {
        let mut merged = record("1", 1, "A", "G", "ZFIN:ZDB-ALT-1");
        merged.ids.insert("odd id;with%chars");
        assert_eq!(format_id(&merged), "ZFIN:ZDB-ALT-1;odd%20id%3Bwith%25chars");

        merged.ids = ValueSet::default();
        assert_eq!(format_id(&merged), ".");

        let dir = tempdir().unwrap();
        let mut spaced = record("1", 5, "A", "G", "V 1");
        spaced.info = InfoFields::default();
        let written = OutputWriter::new(dir.path(), "7.3.0", date())
            .write_chromosome(&finalize("1", vec![spaced]))
            .unwrap();
        let text = std::fs::read_to_string(&written.path).unwrap();
        assert!(text.ends_with("1\t5\tV%201\tA\tG\t.\t.\t.\n"));
    }

    #[test]
    fn test_file_names() {
        let writer = OutputWriter::new("/out", "7.3.0", date());
        assert_eq!(writer.file_name(Some("1")), "variants-7.3.0-1.vcf");
        assert_eq!(writer.file_name(None), "variants-7.3.0.vcf");
        assert_eq!(writer.file_name(Some("../etc")), "variants-7.3.0-.._etc.vcf");

        let writer = writer.with_format(OutputFormat::Tab).with_compression(true);
        assert_eq!(writer.file_name(Some("X")), "variants-7.3.0-X.tab.gz");
    }

    #[test]
    fn test_vcf_output_reads_back() {
        let dir = tempdir().unwrap();
        let mut merged = record("1", 99, "GA", "G", "V1");
        merged.ids.insert("V2");
        merged.info.insert(InfoKey::Hgvs, "NC_007112.7:g.100del");
        merged.flags.insert(RecordFlag::MetaConflict);
        let file = finalize("1", vec![record("1", 500, "C", "T", "V3"), merged]);

        let written = OutputWriter::new(dir.path(), "7.3.0", date())
            .write_chromosome(&file)
            .unwrap();
        assert_eq!(written.path, dir.path().join("variants-7.3.0-1.vcf"));
        assert_eq!(written.records, 2);
        assert_eq!(written.build_tag(), "GRCz11");
        assert_eq!(written.sha256.len(), 64);

        let text = std::fs::read_to_string(&written.path).unwrap();
        assert!(text.starts_with("##fileformat=VCFv4.3\n##fileDate=20261019\n"));
        assert!(text.contains("##reference=GRCz11\n"));
        assert!(text.contains("#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n"));
        assert!(text.contains(
            "1\t99\tV1;V2\tGA\tG\t.\tMetaConflict\tAlleles=V1-allele;HGVS=NC_007112.7:g.100del\n"
        ));

        let mut reader = vcf::io::reader::Builder::default()
            .build_from_path(&written.path)
            .unwrap();
        let header = reader.read_header().unwrap();
        assert_eq!(header.contigs().len(), 1);
        assert_eq!(header.infos().len(), InfoKey::ALL.len());

        let records: Vec<_> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].reference_sequence_name(), "1");
        let position = records[0].variant_start().unwrap().unwrap();
        assert_eq!(usize::from(position), 99);
        assert_eq!(records[1].reference_bases().to_string(), "C");
        let alternate = records[1].alternate_bases().iter().next().unwrap().unwrap().to_string();
        assert_eq!(alternate, "T");
    }

    #[test]
    fn test_combined_gzip_output_is_deterministic() {
        let dir = tempdir().unwrap();
        let files = vec![
            finalize("1", vec![record("1", 10, "A", "G", "V1")]),
            finalize("2", vec![record("2", 20, "C", "T", "V2")]),
        ];
        let writer = OutputWriter::new(dir.path(), "7.3.0", date()).with_compression(true);

        let first = writer.write_combined(&files).unwrap();
        let first_bytes = std::fs::read(&first.path).unwrap();
        let second = writer.write_combined(&files).unwrap();
        assert_eq!(first_bytes, std::fs::read(&second.path).unwrap());
        assert_eq!(first.sha256, second.sha256);
        assert_eq!(first.chromosomes, vec!["1", "2"]);

        let mut text = String::new();
        MultiGzDecoder::new(File::open(&first.path).unwrap())
            .read_to_string(&mut text)
            .unwrap();
        assert!(text.contains("##contig=<ID=1>\n##contig=<ID=2>\n"));
        assert!(text.ends_with("2\t20\tV2\tC\tT\t.\t.\tAlleles=V2-allele\n"));
    }

    #[test]
    fn test_tab_output() {
        let dir = tempdir().unwrap();
        let file = finalize("1", vec![record("1", 10, "A", "G", "V1")]);
        let written = OutputWriter::new(dir.path(), "7.3.0", date())
            .with_format(OutputFormat::Tab)
            .with_source_id("test-source")
            .write_chromosome(&file)
            .unwrap();

        let text = std::fs::read_to_string(&written.path).unwrap();
        let lines: Vec<_> = text.lines().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("chromosome\tposition\tid\treference"));
        assert_eq!(
            lines[1],
            "1\t10\tV1\tA\tG\t.\tV1-allele\t\t\t\t\t\t\t\tGRCz11\tDanio rerio\t1"
        );
        assert!(text.contains("# Source: test-source\n"));
    }

    #[test]
    fn test_multi_assembly_build_tag() {
        let mut assemblies = ValueSet::default();
        assemblies.extend(["GRCz11", "GRCh38"]);
        let written = WrittenFile {
            path: PathBuf::from("/out/variants-7.3.0.vcf"),
            format: OutputFormat::Vcf,
            chromosomes: vec!["1".to_string()],
            records: 1,
            assemblies,
            sha256: String::new(),
        };
        assert_eq!(written.build_tag(), COMBINED_BUILD_TAG);
        assert_eq!(written.file_name(), "variants-7.3.0.vcf");
    }
}
