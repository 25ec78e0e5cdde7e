// ==============================================================================
// merger.rs - Record Deduplicator/Merger
// ==============================================================================
// Description: Collapses variants sharing (position, REF, ALT) into one record
// Created: 2026-10-14
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use std::collections::HashMap;
use tracing::debug;

use crate::diagnostics::DataIssue;
use crate::models::{MergeKey, MergedRecord, NormalizedVariant, RecordFlag};

/// Per-chromosome accumulator of merged records
#[derive(Debug)]
pub struct RecordMerger {
    chromosome: String,
    records: HashMap<MergeKey, MergedRecord>,
}

impl RecordMerger {
    pub fn new(chromosome: impl Into<String>) -> Self {
        Self {
            chromosome: chromosome.into(),
            records: HashMap::new(),
        }
    }

    /// Fold one variant in; returns the metadata conflicts it caused.
    pub fn add(&mut self, variant: NormalizedVariant) -> Vec<DataIssue> {
        let key = variant.merge_key();
        let Some(record) = self.records.get_mut(&key) else {
            self.records.insert(key, MergedRecord::from_variant(variant));
            return Vec::new();
        };

        debug!(
            "Merging {} into {}:{} {}>{}",
            variant.id_or_dot(),
            self.chromosome,
            record.position,
            record.reference,
            record.alternate
        );

        let mut issues = Vec::new();
        for (field, kept, incoming) in [
            ("species", &mut record.species, variant.species),
            ("assembly", &mut record.assembly, variant.assembly),
        ] {
            let Some(value) = incoming else {
                continue;
            };
            // first-seen value wins; a missing one is filled in silently
            let current = kept.get_or_insert_with(|| value.clone());
            if *current != value {
                issues.push(DataIssue::MetadataConflict {
                    chromosome: self.chromosome.clone(),
                    position: key.0,
                    reference: key.1.clone(),
                    alternate: key.2.clone(),
                    field,
                    kept: current.clone(),
                    conflicting: value,
                });
            }
        }

        if !issues.is_empty() {
            record.flags.insert(RecordFlag::MetaConflict);
        }
        if let Some(id) = variant.id {
            record.ids.insert(id);
        }
        record.info.union(&variant.info);
        record.flags.extend(variant.flags);
        record.contributors += 1;
        issues
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Merged records in no particular order
    pub fn finish(self) -> Vec<MergedRecord> {
        self.records.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InfoFields, InfoKey};
    use std::collections::BTreeSet;

    fn variant(id: &str, alleles: &[&str], species: &str) -> NormalizedVariant {
        let mut info = InfoFields::default();
        info.extend(InfoKey::Alleles, alleles.iter().copied());
        NormalizedVariant {
            chromosome: "1".to_string(),
            position: 500,
            reference: "C".to_string(),
            alternate: "T".to_string(),
            id: Some(id.to_string()),
            info,
            assembly: Some("GRCz11".to_string()),
            species: Some(species.to_string()),
            flags: BTreeSet::new(),
        }
    }

    #[test]
    fn test_identical_keys_merge_info() {
        let mut merger = RecordMerger::new("1");
        assert!(merger.add(variant("V1", &["A1"], "Danio rerio")).is_empty());
        assert!(merger.add(variant("V2", &["A2", "A1"], "Danio rerio")).is_empty());

        let records = merger.finish();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.info.get(InfoKey::Alleles).unwrap().join(","), "A1,A2");
        assert_eq!(record.id_field(), "V1;V2");
        assert_eq!(record.contributors, 2);
        assert!(record.flags.is_empty());
    }

    #[test]
    fn test_species_conflict_keeps_first_and_flags() {
        let mut merger = RecordMerger::new("1");
        merger.add(variant("V1", &["A1"], "Danio rerio"));
        let issues = merger.add(variant("V2", &["A2"], "Mus musculus"));

        assert!(matches!(
            &issues[..],
            [DataIssue::MetadataConflict { field: "species", kept, conflicting, .. }]
                if kept == "Danio rerio" && conflicting == "Mus musculus"
        ));

        let record = &merger.finish()[0];
        assert_eq!(record.species.as_deref(), Some("Danio rerio"));
        assert!(record.flags.contains(&RecordFlag::MetaConflict));
        assert_eq!(record.info.get(InfoKey::Alleles).unwrap().join(","), "A1,A2");
    }

    #[test]
    fn test_missing_metadata_is_filled_without_conflict() {
        let mut merger = RecordMerger::new("1");
        let mut first = variant("V1", &[], "Danio rerio");
        first.assembly = None;
        merger.add(first);
        assert!(merger.add(variant("V2", &[], "Danio rerio")).is_empty());

        let record = &merger.finish()[0];
        assert_eq!(record.assembly.as_deref(), Some("GRCz11"));
    }

    #[test]
    fn test_distinct_alternates_stay_separate() {
        let mut merger = RecordMerger::new("1");
        merger.add(variant("V1", &["A1"], "Danio rerio"));
        let mut other = variant("V2", &["A2"], "Danio rerio");
        other.alternate = "G".to_string();
        merger.add(other);

        assert_eq!(merger.len(), 2);
    }
}
