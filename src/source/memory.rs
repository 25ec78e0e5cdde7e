// ==============================================================================
// source/memory.rs - In-Memory Row Source
// ==============================================================================
// Description: Fixed row set, for embedding the generator and for tests
// Created: 2026-10-13
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use super::{RowBatch, RowSource, SourceError};
use crate::models::VariantRow;

#[derive(Debug, Clone)]
pub struct MemorySource {
    rows: Vec<VariantRow>,
    unavailable: Option<String>,
}

impl MemorySource {
    pub fn new(rows: Vec<VariantRow>) -> Self {
        Self {
            rows,
            unavailable: None,
        }
    }

    /// Source whose every fetch fails with `SourceError::Unavailable`
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            rows: Vec::new(),
            unavailable: Some(reason.into()),
        }
    }
}

impl RowSource for MemorySource {
    fn fetch(&mut self) -> Result<RowBatch, SourceError> {
        if let Some(reason) = &self.unavailable {
            return Err(SourceError::Unavailable(reason.clone()));
        }

        Ok(RowBatch {
            rows: self.rows.clone(),
            undecodable: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_is_repeatable() {
        let row = VariantRow {
            chromosome: Some("1".to_string()),
            ..Default::default()
        };
        let mut source = MemorySource::new(vec![row.clone()]);

        assert_eq!(source.fetch().unwrap().rows, vec![row.clone()]);
        assert_eq!(source.fetch().unwrap().rows, vec![row]);
    }

    #[test]
    fn test_unavailable() {
        let mut source = MemorySource::unavailable("connection refused");
        let err = source.fetch().unwrap_err();
        assert_eq!(err.to_string(), "row source unavailable: connection refused");
    }
}
