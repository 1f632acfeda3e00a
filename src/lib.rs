//! # Genotype Risk
//!
//! Classifies genotype calls from consumer raw-data files and VCFs against a
//! curated knowledge base of risk variants.
//!
//! ## Features
//!
//! - Format detection for 23andMe raw data and multi-sample VCF (plain or compressed)
//! - Phase-aware genotype decoding with multi-allelic ALT resolution
//! - Genotype-table and risk-allele-counting classification strategies
//! - Per-sample category scores and de-duplicated recommendations
//! - Per-category protocols with priority grades and bucketed recommendations
//! - Cross-sample shared / unique risk variant comparison
//! - Multi-threaded batch analysis with JSON, CSV and TSV reports

pub mod analysis;
pub mod classifier;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod knowledge_base;
pub mod output;
pub mod parsers;
pub mod protocol;
pub mod types;

// Re-export key types
pub use analysis::{SampleAnalyzer, SampleComparator};
pub use classifier::Classification;
pub use config::EngineConfig;
pub use discovery::FileDiscovery;
pub use engine::{Engine, FileAnalysis};
pub use error::EngineError;
pub use knowledge_base::{KnowledgeBase, KnowledgeBaseEntry, RiskModel, ValidationIssue};
pub use output::{ReportFormat, ReportGenerator};
pub use parsers::{detect_format, FileParser, ParsedGeneticData};
pub use protocol::{CategoryProtocol, ProtocolGenerator, ProtocolPriority};
pub use types::*;
