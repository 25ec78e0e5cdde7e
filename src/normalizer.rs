// ==============================================================================
// normalizer.rs - Variant Row Normalization
// ==============================================================================
// Description: Derives VCF coordinates, REF/ALT and INFO sets from query rows
// Created: 2026-10-13
// Modified: 2026-10-19
// Version: 1.1.0
// ==============================================================================
// Anchoring rule:
//   The query returns the last base of the left flank as `paddingLeft`.
//   An anchored variant is written as pad+ref / pad+alt at start-1.
//   Which rows get anchored is decided by AnchorPolicy.
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::diagnostics::{DataIssue, MalformedReason};
use crate::models::{InfoFields, InfoKey, NormalizedVariant, RecordFlag, VariantRow};
use crate::reference::ChromosomeSequence;

/// IUPAC nucleotide codes accepted in REF/ALT
const NUCLEOTIDES: &[u8] = b"ACGTNRYKMSWBDHV";

/// When the padding base is prefixed to the alleles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum AnchorPolicy {
    /// Only when REF or ALT would otherwise be empty
    #[default]
    IndelOnly,
    /// Whenever the row carries a padding base
    WhenPadded,
}

/// Output of a successful normalization
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub variant: NormalizedVariant,
    /// Non-fatal findings (reference mismatches)
    pub issues: Vec<DataIssue>,
}

/// Row-to-variant normalizer for one chromosome partition
#[derive(Debug, Clone, Copy)]
pub struct Normalizer<'a> {
    policy: AnchorPolicy,
    reference: Option<&'a ChromosomeSequence>,
}

impl<'a> Normalizer<'a> {
    pub fn new(policy: AnchorPolicy) -> Self {
        Self {
            policy,
            reference: None,
        }
    }

    /// Enable REF cross-validation against this chromosome's sequence
    pub fn with_reference(mut self, reference: Option<&'a ChromosomeSequence>) -> Self {
        self.reference = reference;
        self
    }

    /// Normalize one row.
    ///
    /// # Returns
    /// * `Ok(Normalized)` - variant plus any reference findings
    /// * `Err(DataIssue::MalformedRow)` - row cannot be represented
    pub fn normalize(&self, row: &VariantRow) -> Result<Normalized, DataIssue> {
        let label = row_label(row);
        let malformed = |reason: MalformedReason| DataIssue::MalformedRow {
            row: label.clone(),
            reason,
        };

        let chromosome = non_empty(row.chromosome.as_deref())
            .ok_or_else(|| malformed(MalformedReason::MissingField("chromosome")))?;
        let start = row
            .start
            .ok_or_else(|| malformed(MalformedReason::MissingField("start")))?;
        if start == 0 {
            return Err(malformed(MalformedReason::PositionOutOfRange(0)));
        }

        let raw_reference = row
            .genomic_reference_sequence
            .as_deref()
            .ok_or_else(|| malformed(MalformedReason::MissingField("genomicReferenceSequence")))?;
        let reference = clean_allele("genomicReferenceSequence", raw_reference).map_err(&malformed)?;
        let alternate = clean_allele(
            "genomicVariantSequence",
            row.genomic_variant_sequence.as_deref().unwrap_or(""),
        )
        .map_err(&malformed)?;
        let is_indel = reference.is_empty() || alternate.is_empty();
        let wants_padding = match self.policy {
            AnchorPolicy::WhenPadded => true,
            AnchorPolicy::IndelOnly => is_indel,
        };
        // Padding is only checked when it becomes part of the alleles
        let padding = if wants_padding {
            padding_base(row.padding_left.as_deref()).map_err(&malformed)?
        } else {
            None
        };

        let anchor = match padding {
            Some(base) => Some(base),
            None if is_indel => self.reference_anchor(start),
            None => None,
        };

        let (position, reference, alternate) = match anchor {
            Some(base) => {
                if start < 2 {
                    return Err(malformed(MalformedReason::PositionOutOfRange(start as i64 - 1)));
                }
                (start - 1, format!("{}{}", base, reference), format!("{}{}", base, alternate))
            }
            None if is_indel => return Err(malformed(MalformedReason::MissingAnchor)),
            None => (start, reference, alternate),
        };

        if reference == alternate {
            return Err(malformed(MalformedReason::RefEqualsAlt(reference)));
        }

        let id = non_empty(row.global_id.as_deref()).map(str::to_string);
        let mut flags = BTreeSet::new();
        let mut issues = Vec::new();

        if let Some(sequence) = self.reference {
            let variant = id.clone().unwrap_or_else(|| label.clone());
            if let Some(issue) = cross_check(sequence, chromosome, &variant, position, &reference) {
                flags.insert(RecordFlag::RefMismatch);
                issues.push(issue);
            }
        }

        Ok(Normalized {
            variant: NormalizedVariant {
                chromosome: chromosome.to_string(),
                position,
                reference,
                alternate,
                id,
                info: collect_info(row),
                assembly: non_empty(row.assembly.as_deref()).map(str::to_string),
                species: non_empty(row.species.as_deref()).map(str::to_string),
                flags,
            },
            issues,
        })
    }

    /// Base before `start` taken from the reference, for unpadded indels
    fn reference_anchor(&self, start: u64) -> Option<char> {
        let base = self.reference?.base(start.checked_sub(1)?)?;
        NUCLEOTIDES.contains(&base).then_some(base as char)
    }
}

/// Bases at the variant position must spell REF; `N` in the reference matches anything
fn cross_check(
    sequence: &ChromosomeSequence,
    chromosome: &str,
    variant: &str,
    position: u64,
    reference: &str,
) -> Option<DataIssue> {
    let Some(found) = sequence.slice(position, reference.len()) else {
        return Some(DataIssue::ReferenceOutOfRange {
            variant: variant.to_string(),
            chromosome: chromosome.to_string(),
            position,
            length: reference.len(),
            reference_length: sequence.len(),
        });
    };

    let matches = found
        .iter()
        .zip(reference.as_bytes())
        .all(|(fasta, expected)| *fasta == b'N' || fasta.eq_ignore_ascii_case(expected));

    if matches {
        None
    } else {
        Some(DataIssue::ReferenceMismatch {
            variant: variant.to_string(),
            chromosome: chromosome.to_string(),
            position,
            expected: reference.to_string(),
            found: String::from_utf8_lossy(found).to_string(),
        })
    }
}

fn collect_info(row: &VariantRow) -> InfoFields {
    let mut info = InfoFields::default();
    info.extend(InfoKey::Alleles, row.alleles.iter());
    info.extend(InfoKey::Genes, row.allele_of_genes.iter());
    info.extend(InfoKey::Consequence, row.gene_level_consequence.iter());
    info.extend(InfoKey::Impact, row.impact.iter());

    let scalars = [
        (InfoKey::DataProvider, row.data_provider.as_deref()),
        (InfoKey::Hgvs, row.hgvs_nomenclature.as_deref()),
        (InfoKey::SoTerm, row.so_term.as_deref()),
        // symbolText is the markup-free rendering of symbol
        (InfoKey::Symbol, non_empty(row.symbol_text.as_deref()).or(row.symbol.as_deref())),
    ];
    for (key, value) in scalars {
        if let Some(value) = non_empty(value) {
            info.insert(key, value);
        }
    }
    info
}

/// Upper-cased allele; `-` and blank mean an empty allele
fn clean_allele(field: &'static str, raw: &str) -> Result<String, MalformedReason> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "-" {
        return Ok(String::new());
    }

    let allele = trimmed.to_ascii_uppercase();
    if allele.bytes().all(|base| NUCLEOTIDES.contains(&base)) {
        Ok(allele)
    } else {
        Err(MalformedReason::InvalidAllele {
            field,
            value: trimmed.to_string(),
        })
    }
}

/// Last character of the padding field, if any
fn padding_base(raw: Option<&str>) -> Result<Option<char>, MalformedReason> {
    let Some(padding) = non_empty(raw) else {
        return Ok(None);
    };
    let Some(base) = padding.chars().last().map(|c| c.to_ascii_uppercase()) else {
        return Ok(None);
    };

    if base.is_ascii() && NUCLEOTIDES.contains(&(base as u8)) {
        Ok(Some(base))
    } else {
        Err(MalformedReason::InvalidAllele {
            field: "paddingLeft",
            value: padding.to_string(),
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Identifier used in diagnostics for rows that may lack a global id
fn row_label(row: &VariantRow) -> String {
    if let Some(id) = non_empty(row.global_id.as_deref()) {
        return id.to_string();
    }
    match (non_empty(row.chromosome.as_deref()), row.start) {
        (Some(chromosome), Some(start)) => format!("{}:{}", chromosome, start),
        _ => "<unidentified row>".to_string(),
    }
}
