// ==============================================================================
// models.rs - Variant Data Models
// ==============================================================================
// Description: Query-row, normalized, and merged variant structures
// Created: 2026-10-12
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One result row of the variant graph query.
///
/// Field names follow the aliases the query returns (`globalId`,
/// `genomicReferenceSequence`, ...). Every scalar is optional because the
/// graph does not enforce presence; required fields are checked by the
/// normalizer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VariantRow {
    pub chromosome: Option<String>,
    pub global_id: Option<String>,
    /// Last base of the left flank (`right(v.paddingLeft, 1)` in the query)
    pub padding_left: Option<String>,
    pub genomic_reference_sequence: Option<String>,
    pub genomic_variant_sequence: Option<String>,
    pub hgvs_nomenclature: Option<String>,
    pub data_provider: Option<String>,
    pub symbol: Option<String>,
    pub symbol_text: Option<String>,
    pub assembly: Option<String>,
    #[serde(deserialize_with = "collection")]
    pub alleles: Vec<String>,
    #[serde(deserialize_with = "collection")]
    pub allele_of_genes: Vec<String>,
    #[serde(deserialize_with = "collection")]
    pub gene_level_consequence: Vec<String>,
    #[serde(deserialize_with = "collection")]
    pub impact: Vec<String>,
    /// 1-based, inclusive
    #[serde(deserialize_with = "coordinate")]
    pub start: Option<u64>,
    /// 1-based, inclusive
    #[serde(deserialize_with = "coordinate")]
    pub end: Option<u64>,
    pub species: Option<String>,
    pub so_term: Option<String>,
}

/// Collection columns come back as a list, `null`, or `''` (the query's
/// `CASE ... ELSE ''` branch).
#[derive(Deserialize)]
#[serde(untagged)]
enum CollectionValue {
    One(String),
    Many(Vec<Option<String>>),
}

fn collection<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = match Option::<CollectionValue>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(CollectionValue::One(value)) => vec![value],
        Some(CollectionValue::Many(values)) => values.into_iter().flatten().collect(),
    };

    Ok(items
        .into_iter()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CoordinateValue {
    Number(u64),
    Text(String),
}

fn coordinate<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<CoordinateValue>::deserialize(deserializer)? {
        None => Ok(None),
        Some(CoordinateValue::Number(value)) => Ok(Some(value)),
        Some(CoordinateValue::Text(text)) => {
            let text = text.trim();
            if text.is_empty() {
                return Ok(None);
            }
            text.parse::<u64>()
                .map(Some)
                .map_err(|e| serde::de::Error::custom(format!("invalid coordinate '{}': {}", text, e)))
        }
    }
}

/// Fixed INFO vocabulary, in serialization order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum InfoKey {
    Alleles,
    Genes,
    Consequence,
    Impact,
    DataProvider,
    Hgvs,
    SoTerm,
    Symbol,
}

impl InfoKey {
    pub const ALL: [InfoKey; 8] = [
        InfoKey::Alleles,
        InfoKey::Genes,
        InfoKey::Consequence,
        InfoKey::Impact,
        InfoKey::DataProvider,
        InfoKey::Hgvs,
        InfoKey::SoTerm,
        InfoKey::Symbol,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InfoKey::Alleles => "Alleles",
            InfoKey::Genes => "Genes",
            InfoKey::Consequence => "Consequence",
            InfoKey::Impact => "Impact",
            InfoKey::DataProvider => "DataProvider",
            InfoKey::Hgvs => "HGVS",
            InfoKey::SoTerm => "SOTerm",
            InfoKey::Symbol => "Symbol",
        }
    }

    /// Text for the `##INFO` header line
    pub fn description(&self) -> &'static str {
        match self {
            InfoKey::Alleles => "Allele identifiers carrying this variant",
            InfoKey::Genes => "Genes the alleles are alleles of",
            InfoKey::Consequence => "Gene-level consequence",
            InfoKey::Impact => "Predicted impact of the consequence",
            InfoKey::DataProvider => "Data provider",
            InfoKey::Hgvs => "HGVS nomenclature",
            InfoKey::SoTerm => "Sequence Ontology variant type",
            InfoKey::Symbol => "Allele symbol",
        }
    }
}

/// Insertion-ordered set of annotation values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueSet(Vec<String>);

impl ValueSet {
    /// Adds a value unless it is empty or already present
    pub fn insert(&mut self, value: impl Into<String>) -> bool {
        let value = value.into();
        if value.is_empty() || self.0.contains(&value) {
            return false;
        }
        self.0.push(value);
        true
    }

    pub fn extend<I, S>(&mut self, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for value in values {
            self.insert(value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn join(&self, separator: &str) -> String {
        self.0.join(separator)
    }
}

impl<S: Into<String>> FromIterator<S> for ValueSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = ValueSet::default();
        set.extend(iter);
        set
    }
}

/// INFO annotations keyed by the fixed vocabulary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoFields(BTreeMap<InfoKey, ValueSet>);

impl InfoFields {
    pub fn insert(&mut self, key: InfoKey, value: impl Into<String>) {
        self.0.entry(key).or_default().insert(value);
    }

    pub fn extend<I, S>(&mut self, key: InfoKey, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0.entry(key).or_default().extend(values);
    }

    pub fn get(&self, key: InfoKey) -> Option<&ValueSet> {
        self.0.get(&key).filter(|set| !set.is_empty())
    }

    /// Set union per key; values keep their first-appearance order
    pub fn union(&mut self, other: &InfoFields) {
        for (key, values) in &other.0 {
            self.extend(*key, values.iter());
        }
    }

    /// Non-empty entries in vocabulary order
    pub fn iter(&self) -> impl Iterator<Item = (InfoKey, &ValueSet)> {
        self.0
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(key, values)| (*key, values))
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

/// Data-quality flags carried into the FILTER column
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecordFlag {
    /// REF does not match the FASTA reference
    RefMismatch,
    /// Contributors disagree on species or assembly
    MetaConflict,
}

impl RecordFlag {
    pub const ALL: [RecordFlag; 2] = [RecordFlag::RefMismatch, RecordFlag::MetaConflict];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordFlag::RefMismatch => "RefMismatch",
            RecordFlag::MetaConflict => "MetaConflict",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            RecordFlag::RefMismatch => "REF does not match the reference sequence",
            RecordFlag::MetaConflict => "Contributing rows disagree on species or assembly",
        }
    }
}

/// A row reduced to VCF coordinates and annotations
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedVariant {
    pub chromosome: String,
    /// 1-based position of the first base of `reference`
    pub position: u64,
    pub reference: String,
    pub alternate: String,
    /// Global variant id, `None` renders as `.`
    pub id: Option<String>,
    pub info: InfoFields,
    pub assembly: Option<String>,
    pub species: Option<String>,
    pub flags: BTreeSet<RecordFlag>,
}

impl NormalizedVariant {
    pub fn merge_key(&self) -> MergeKey {
        (self.position, self.reference.clone(), self.alternate.clone())
    }

    pub fn id_or_dot(&self) -> &str {
        self.id.as_deref().unwrap_or(".")
    }
}

/// (position, REF, ALT) within one chromosome
pub type MergeKey = (u64, String, String);

/// One output line: every row normalizing to the same key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedRecord {
    pub chromosome: String,
    pub position: u64,
    pub reference: String,
    pub alternate: String,
    pub ids: ValueSet,
    pub info: InfoFields,
    pub assembly: Option<String>,
    pub species: Option<String>,
    pub flags: BTreeSet<RecordFlag>,
    pub contributors: usize,
}

impl MergedRecord {
    pub fn from_variant(variant: NormalizedVariant) -> Self {
        let mut ids = ValueSet::default();
        if let Some(id) = &variant.id {
            ids.insert(id.as_str());
        }

        Self {
            chromosome: variant.chromosome,
            position: variant.position,
            reference: variant.reference,
            alternate: variant.alternate,
            ids,
            info: variant.info,
            assembly: variant.assembly,
            species: variant.species,
            flags: variant.flags,
            contributors: 1,
        }
    }

    /// VCF ID column
    pub fn id_field(&self) -> String {
        if self.ids.is_empty() {
            ".".to_string()
        } else {
            self.ids.join(";")
        }
    }

    /// VCF FILTER column: `.` when unflagged
    pub fn filter_field(&self) -> String {
        if self.flags.is_empty() {
            ".".to_string()
        } else {
            self.flags.iter().map(|flag| flag.as_str()).collect::<Vec<_>>().join(";")
        }
    }
}

/// Finalized, sorted records of one chromosome
#[derive(Debug, Clone, PartialEq)]
pub struct ChromosomeFile {
    pub chromosome: String,
    pub records: Vec<MergedRecord>,
}

impl ChromosomeFile {
    /// Distinct assemblies in record order
    pub fn assemblies(&self) -> ValueSet {
        self.records.iter().filter_map(|r| r.assembly.clone()).collect()
    }

    pub fn species(&self) -> ValueSet {
        self.records.iter().filter_map(|r| r.species.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
