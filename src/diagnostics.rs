// ==============================================================================
// diagnostics.rs - Per-Run Data Quality Diagnostics
// ==============================================================================
// Description: Typed data-quality issues and the per-run counters they feed
// Created: 2026-10-12
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::upload::FileType;

/// Issues kept verbatim in the report; later ones are only counted
pub const MAX_RECORDED_ISSUES: usize = 10_000;

/// Why a row could not become a VCF record
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedReason {
    #[error("missing required field {0}")]
    MissingField(&'static str),

    #[error("invalid {field} '{value}'")]
    InvalidAllele { field: &'static str, value: String },

    #[error("indel has neither a padding base nor a reference anchor")]
    MissingAnchor,

    #[error("REF equals ALT ({0})")]
    RefEqualsAlt(String),

    #[error("position {0} is outside the chromosome")]
    PositionOutOfRange(i64),

    #[error("undecodable row: {0}")]
    Undecodable(String),
}

/// Non-fatal problems accumulated over a run
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataIssue {
    #[error("malformed row {row}: {reason}")]
    MalformedRow { row: String, reason: MalformedReason },

    #[error("row {row} has no chromosome, routed to the unplaced bucket")]
    UnplacedRow { row: String },

    #[error("{variant} at {chromosome}:{position}: REF {expected} does not match reference {found}")]
    ReferenceMismatch {
        variant: String,
        chromosome: String,
        position: u64,
        expected: String,
        found: String,
    },

    #[error("{variant} at {chromosome}:{position}: REF of length {length} runs past the reference end ({reference_length})")]
    ReferenceOutOfRange {
        variant: String,
        chromosome: String,
        position: u64,
        length: usize,
        reference_length: usize,
    },

    #[error("{chromosome}:{position} {reference}>{alternate}: {field} '{conflicting}' conflicts with '{kept}'")]
    MetadataConflict {
        chromosome: String,
        position: u64,
        reference: String,
        alternate: String,
        field: &'static str,
        kept: String,
        conflicting: String,
    },

    #[error("upload of {file} failed: {reason}")]
    UploadFailure { file: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MalformedRow,
    UnplacedRow,
    ReferenceMismatch,
    MetadataConflict,
    UploadFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl DataIssue {
    pub fn kind(&self) -> IssueKind {
        match self {
            DataIssue::MalformedRow { .. } => IssueKind::MalformedRow,
            DataIssue::UnplacedRow { .. } => IssueKind::UnplacedRow,
            DataIssue::ReferenceMismatch { .. } | DataIssue::ReferenceOutOfRange { .. } => {
                IssueKind::ReferenceMismatch
            }
            DataIssue::MetadataConflict { .. } => IssueKind::MetadataConflict,
            DataIssue::UploadFailure { .. } => IssueKind::UploadFailure,
        }
    }

    pub fn severity(&self) -> Severity {
        match self.kind() {
            IssueKind::UnplacedRow => Severity::Info,
            IssueKind::MalformedRow | IssueKind::ReferenceMismatch | IssueKind::MetadataConflict => {
                Severity::Warning
            }
            IssueKind::UploadFailure => Severity::Error,
        }
    }
}

/// Counters and issues for one run (or one partition before merging)
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    pub rows_read: usize,
    /// Rows whose chromosome is in the skip-set
    pub rows_skipped: usize,
    pub rows_unplaced: usize,
    pub rows_malformed: usize,
    pub records_emitted: usize,
    pub counts: BTreeMap<IssueKind, usize>,
    pub issues: Vec<DataIssue>,
    pub issues_dropped: usize,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count an issue and keep it for the report
    pub fn record(&mut self, issue: DataIssue) {
        if issue.kind() == IssueKind::MalformedRow {
            self.rows_malformed += 1;
        }
        *self.counts.entry(issue.kind()).or_insert(0) += 1;

        if self.issues.len() < MAX_RECORDED_ISSUES {
            match issue.severity() {
                Severity::Info => debug!("{}", issue),
                Severity::Warning | Severity::Error => warn!("{}", issue),
            }
            self.issues.push(issue);
        } else {
            debug!("{}", issue);
            self.issues_dropped += 1;
        }
    }

    pub fn count(&self, kind: IssueKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    /// Total warnings across every issue kind
    pub fn warnings(&self) -> usize {
        self.counts.values().sum()
    }

    /// Rows that never reached a record
    pub fn rows_dropped(&self) -> usize {
        self.rows_skipped + self.rows_unplaced + self.rows_malformed
    }

    pub fn merge(&mut self, other: Diagnostics) {
        self.rows_read += other.rows_read;
        self.rows_skipped += other.rows_skipped;
        self.rows_unplaced += other.rows_unplaced;
        self.rows_malformed += other.rows_malformed;
        self.records_emitted += other.records_emitted;
        for (kind, count) in other.counts {
            *self.counts.entry(kind).or_insert(0) += count;
        }

        let room = MAX_RECORDED_ISSUES.saturating_sub(self.issues.len());
        let incoming = other.issues.len();
        self.issues.extend(other.issues.into_iter().take(room));
        self.issues_dropped += other.issues_dropped + incoming.saturating_sub(room);
    }

    /// One-line run summary for a file type
    pub fn summary_line(&self, file_type: FileType) -> String {
        format!(
            "{}: rows read {}, rows skipped {} (skip-set {}, unplaced {}, malformed {}), records emitted {}, warnings {}",
            file_type.as_str(),
            self.rows_read,
            self.rows_dropped(),
            self.rows_skipped,
            self.rows_unplaced,
            self.rows_malformed,
            self.records_emitted,
            self.warnings()
        )
    }
}
