// ==============================================================================
// reference.rs - FASTA Reference Sequence Reader
// ==============================================================================
// Description: Per-chromosome reference sequences for REF cross-validation
// Created: 2026-10-13
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use anyhow::{Context, Result};
use bio::io::fasta;
use flate2::read::MultiGzDecoder;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

const FASTA_EXTENSIONS: [&str; 4] = ["fa", "fasta", "fna", "fas"];

/// Upper-cased nucleotide sequence of one chromosome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChromosomeSequence {
    pub name: String,
    bases: Vec<u8>,
}

impl ChromosomeSequence {
    pub fn new(name: impl Into<String>, bases: impl AsRef<[u8]>) -> Self {
        Self {
            name: name.into(),
            bases: bases.as_ref().to_ascii_uppercase(),
        }
    }

    pub fn len(&self) -> usize {
        self.bases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }

    /// Bases `[position, position + length)`, 1-based
    pub fn slice(&self, position: u64, length: usize) -> Option<&[u8]> {
        let start = usize::try_from(position.checked_sub(1)?).ok()?;
        let end = start.checked_add(length)?;
        self.bases.get(start..end)
    }

    /// Single base at a 1-based position
    pub fn base(&self, position: u64) -> Option<u8> {
        self.slice(position, 1).map(|bases| bases[0])
    }
}

/// Source of reference sequences keyed by chromosome id
pub trait ReferenceSource: Send + Sync {
    /// `Ok(None)` when this source has nothing for the chromosome
    fn load(&self, chromosome: &str) -> Result<Option<ChromosomeSequence>>;
}

/// Directory of per-chromosome FASTA files
///
/// A chromosome `1` resolves to `1.fa`, `chr1.fa`, `1.fasta`, ... with an
/// optional `.gz` suffix. Multi-record files are searched for a record whose
/// id matches; a single-record file is taken as-is.
#[derive(Debug, Clone)]
pub struct FastaDirectory {
    root: PathBuf,
    files: BTreeMap<String, PathBuf>,
}

impl FastaDirectory {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let mut files = BTreeMap::new();

        for entry in WalkDir::new(&root).max_depth(1).follow_links(true) {
            let entry = entry.with_context(|| format!("Failed to list FASTA directory {:?}", root))?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(stem) = fasta_stem(entry.path()) {
                files.entry(stem).or_insert_with(|| entry.path().to_path_buf());
            }
        }

        info!("Found {} FASTA files in {:?}", files.len(), root);
        Ok(Self { root, files })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    fn resolve(&self, chromosome: &str) -> Option<&PathBuf> {
        name_candidates(chromosome)
            .iter()
            .find_map(|candidate| self.files.get(candidate))
    }
}

impl ReferenceSource for FastaDirectory {
    fn load(&self, chromosome: &str) -> Result<Option<ChromosomeSequence>> {
        let Some(path) = self.resolve(chromosome) else {
            debug!("No FASTA file for chromosome {}", chromosome);
            return Ok(None);
        };

        debug!("Loading reference for chromosome {} from {:?}", chromosome, path);
        let file = File::open(path).with_context(|| format!("Failed to open FASTA file {:?}", path))?;
        let reader: Box<dyn Read> = if path.extension().is_some_and(|ext| ext == "gz") {
            Box::new(MultiGzDecoder::new(file))
        } else {
            Box::new(file)
        };

        let candidates = name_candidates(chromosome);
        let mut only_record = None;
        let mut record_count = 0usize;

        for record in fasta::Reader::new(reader).records() {
            let record = record.with_context(|| format!("Failed to read FASTA record in {:?}", path))?;
            record_count += 1;

            if candidates.iter().any(|candidate| candidate == record.id()) {
                return Ok(Some(ChromosomeSequence::new(chromosome, record.seq())));
            }
            if record_count == 1 {
                only_record = Some(record);
            } else {
                only_record = None;
            }
        }

        Ok(only_record.map(|record| ChromosomeSequence::new(chromosome, record.seq())))
    }
}

/// Fixed sequences, for tests and embedding
#[derive(Debug, Clone, Default)]
pub struct InMemoryReference {
    sequences: HashMap<String, ChromosomeSequence>,
}

impl InMemoryReference {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sequence(mut self, chromosome: &str, bases: &str) -> Self {
        self.sequences
            .insert(chromosome.to_string(), ChromosomeSequence::new(chromosome, bases));
        self
    }
}

impl ReferenceSource for InMemoryReference {
    fn load(&self, chromosome: &str) -> Result<Option<ChromosomeSequence>> {
        Ok(self.sequences.get(chromosome).cloned())
    }
}

/// `1` and `chr1` name the same chromosome
fn name_candidates(chromosome: &str) -> Vec<String> {
    let mut candidates = vec![chromosome.to_string()];
    match chromosome.strip_prefix("chr") {
        Some(bare) if !bare.is_empty() => candidates.push(bare.to_string()),
        _ => candidates.push(format!("chr{}", chromosome)),
    }
    candidates
}

/// File name without the FASTA (and gzip) extensions
fn fasta_stem(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let name = name.strip_suffix(".gz").unwrap_or(name);
    let (stem, extension) = name.rsplit_once('.')?;

    if stem.is_empty() || !FASTA_EXTENSIONS.contains(&extension.to_ascii_lowercase().as_str()) {
        return None;
    }
    Some(stem.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_sequence_slice_is_one_based() {
        let sequence = ChromosomeSequence::new("1", "acgtAC");
        assert_eq!(sequence.slice(1, 2), Some(&b"AC"[..]));
        assert_eq!(sequence.slice(5, 2), Some(&b"AC"[..]));
        assert_eq!(sequence.base(4), Some(b'T'));
        assert_eq!(sequence.slice(6, 2), None);
        assert_eq!(sequence.slice(0, 1), None);
    }

    #[test]
    fn test_fasta_stem() {
        assert_eq!(fasta_stem(Path::new("/x/chr1.fa")), Some("chr1".to_string()));
        assert_eq!(fasta_stem(Path::new("/x/2.fasta.gz")), Some("2".to_string()));
        assert_eq!(fasta_stem(Path::new("/x/notes.txt")), None);
        assert_eq!(fasta_stem(Path::new("/x/.fa")), None);
    }

    #[test]
    fn test_directory_resolves_chr_prefix() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("chr1.fa"), ">chr1 test\nACGT\nTTGG\n").unwrap();

        let reference = FastaDirectory::open(dir.path()).unwrap();
        assert_eq!(reference.file_count(), 1);

        let sequence = reference.load("1").unwrap().unwrap();
        assert_eq!(sequence.len(), 8);
        assert_eq!(sequence.slice(4, 3), Some(&b"TTT"[..]));
        assert!(reference.load("2").unwrap().is_none());
    }

    #[test]
    fn test_directory_reads_gzip_and_picks_matching_record() {
        let dir = tempdir().unwrap();
        let file = File::create(dir.path().join("X.fa.gz")).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(b">Y\nCCCC\n>X\ngattaca\n").unwrap();
        encoder.finish().unwrap();

        let reference = FastaDirectory::open(dir.path()).unwrap();
        let sequence = reference.load("X").unwrap().unwrap();
        assert_eq!(sequence.slice(1, 7), Some(&b"GATTACA"[..]));
    }

    #[test]
    fn test_multi_record_file_without_match() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("3.fa"), ">a\nAC\n>b\nGT\n").unwrap();

        let reference = FastaDirectory::open(dir.path()).unwrap();
        assert!(reference.load("3").unwrap().is_none());
    }

    #[test]
    fn test_in_memory_reference() {
        let reference = InMemoryReference::new().with_sequence("1", "ACGT");
        assert_eq!(reference.load("1").unwrap().unwrap().base(2), Some(b'C'));
        assert!(reference.load("2").unwrap().is_none());
    }
}
