// ==============================================================================
// lib.rs - Variant File Generator Library
// ==============================================================================
// Description: Library interface for the variant file generator modules
// Created: 2026-10-12
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

pub mod config;
pub mod diagnostics;
pub mod merger;
pub mod models;
pub mod normalizer;
pub mod output;
pub mod partitioner;
pub mod processor;
pub mod reference;
pub mod report;
pub mod source;
pub mod upload;

pub use config::GeneratorConfig;
pub use processor::VariantFileGenerator;
pub use report::RunReport;
