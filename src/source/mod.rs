// ==============================================================================
// source/mod.rs - Variant Row Sources
// ==============================================================================
// Description: Bulk row sources feeding the generator
// Created: 2026-10-13
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

pub mod jsonl;
pub mod memory;

pub use jsonl::JsonLinesSource;
pub use memory::MemorySource;

use thiserror::Error;

use crate::diagnostics::DataIssue;
use crate::models::VariantRow;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("row source unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("too many undecodable rows ({count} > {max})")]
    TooManyErrors { count: usize, max: usize },
}

/// Everything one fetch produced
#[derive(Debug, Clone, Default)]
pub struct RowBatch {
    pub rows: Vec<VariantRow>,
    /// Lines that could not be decoded into a row (`MalformedRow` issues)
    pub undecodable: Vec<DataIssue>,
}

impl RowBatch {
    /// Rows seen by the source, decoded or not
    pub fn rows_read(&self) -> usize {
        self.rows.len() + self.undecodable.len()
    }
}

/// One-shot bulk fetch of the variant query result
pub trait RowSource {
    fn fetch(&mut self) -> Result<RowBatch, SourceError>;
}
