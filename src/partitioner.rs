// ==============================================================================
// partitioner.rs - Chromosome Partitioner
// ==============================================================================
// Description: Splits the row stream into per-chromosome buckets
// Created: 2026-10-13
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::diagnostics::{DataIssue, Diagnostics};
use crate::models::VariantRow;

/// Rows grouped by chromosome id
#[derive(Debug, Clone, Default)]
pub struct Partitions {
    pub placed: BTreeMap<String, Vec<VariantRow>>,
    /// Rows with no chromosome; only counted, never written
    pub unplaced: usize,
}

impl Partitions {
    pub fn row_count(&self) -> usize {
        self.placed.values().map(Vec::len).sum::<usize>() + self.unplaced
    }
}

#[derive(Debug, Clone)]
pub struct Partitioner<'a> {
    skip: &'a BTreeSet<String>,
}

impl<'a> Partitioner<'a> {
    pub fn new(skip: &'a BTreeSet<String>) -> Self {
        Self { skip }
    }

    /// Route every row to its chromosome bucket.
    ///
    /// Skip-set members are dropped and counted in `rows_skipped`. Rows with
    /// a blank chromosome are dropped and counted as unplaced, with an
    /// `UnplacedRow` issue. Ids are compared exactly, after trimming.
    pub fn partition(&self, rows: Vec<VariantRow>, diagnostics: &mut Diagnostics) -> Partitions {
        let mut partitions = Partitions::default();

        for row in rows {
            let chromosome = row
                .chromosome
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string);

            match chromosome {
                Some(chromosome) if self.skip.contains(&chromosome) => {
                    diagnostics.rows_skipped += 1;
                }
                Some(chromosome) => {
                    partitions.placed.entry(chromosome).or_default().push(row);
                }
                None => {
                    diagnostics.rows_unplaced += 1;
                    diagnostics.record(DataIssue::UnplacedRow {
                        row: row.global_id.unwrap_or_else(|| "<no id>".to_string()),
                    });
                    partitions.unplaced += 1;
                }
            }
        }

        debug!(
            "Partitioned rows into {} chromosomes ({} skipped, {} unplaced)",
            partitions.placed.len(),
            diagnostics.rows_skipped,
            partitions.unplaced
        );
        partitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(chromosome: Option<&str>, id: &str) -> VariantRow {
        VariantRow {
            chromosome: chromosome.map(str::to_string),
            global_id: Some(id.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_skip_set_and_unplaced_rows() {
        let skip: BTreeSet<String> = ["Unmapped_Scaffold_8_D1580_D1567".to_string()].into();
        let rows = vec![
            row(Some("1"), "V1"),
            row(Some("Unmapped_Scaffold_8_D1580_D1567"), "V2"),
            row(None, "V3"),
            row(Some(" 2 "), "V4"),
            row(Some("1"), "V5"),
            row(Some(""), "V6"),
        ];

        let mut diagnostics = Diagnostics::new();
        let partitions = Partitioner::new(&skip).partition(rows, &mut diagnostics);

        let chromosomes: Vec<_> = partitions.placed.keys().cloned().collect();
        assert_eq!(chromosomes, vec!["1", "2"]);
        assert_eq!(partitions.placed["1"].len(), 2);
        assert_eq!(partitions.unplaced, 2);
        assert_eq!(partitions.row_count(), 5);

        assert_eq!(diagnostics.rows_skipped, 1);
        assert_eq!(diagnostics.rows_unplaced, 2);
        assert_eq!(diagnostics.rows_malformed, 0);
        assert_eq!(diagnostics.issues.len(), 2);
        assert!(matches!(&diagnostics.issues[0], DataIssue::UnplacedRow { row } if row == "V3"));
    }

    #[test]
    fn test_skip_set_is_exact_match() {
        let skip: BTreeSet<String> = ["MT".to_string()].into();
        let mut diagnostics = Diagnostics::new();
        let partitions =
            Partitioner::new(&skip).partition(vec![row(Some("mt"), "V1"), row(Some("MT"), "V2")], &mut diagnostics);

        assert_eq!(partitions.placed.len(), 1);
        assert!(partitions.placed.contains_key("mt"));
        assert_eq!(diagnostics.rows_skipped, 1);
    }
}
