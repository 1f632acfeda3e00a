use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::analysis::{SampleAnalyzer, SampleComparator};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::knowledge_base::KnowledgeBase;
use crate::parsers::{self, ParsedGeneticData};
use crate::protocol::{CategoryProtocol, ProtocolGenerator};
use crate::types::*;

/// Everything produced from one input file or text blob
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileAnalysis {
    pub source: Option<String>,
    pub format: FileFormat,
    pub genome_build: Option<String>,
    pub samples: Vec<String>,
    pub total_records: usize,
    pub skipped_lines: usize,
    pub analyses: Vec<AnalysisResult>,
    /// Category protocols per sample id
    pub protocols: BTreeMap<String, Vec<CategoryProtocol>>,
}

impl FileAnalysis {
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Entry point tying detection, parsing, analysis and comparison together.
///
/// The knowledge base sits behind an `Arc` so clones of the engine can run on
/// separate threads without copying it.
#[derive(Debug, Clone)]
pub struct Engine {
    knowledge_base: Arc<KnowledgeBase>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(knowledge_base: Arc<KnowledgeBase>, config: EngineConfig) -> Self {
        Self {
            knowledge_base,
            config,
        }
    }

    pub fn with_defaults(knowledge_base: KnowledgeBase) -> Self {
        Self::new(Arc::new(knowledge_base), EngineConfig::default())
    }

    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.knowledge_base
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn detect_format(&self, content: &str) -> FileFormat {
        parsers::detect_format_with_limit(content, self.config.detection_scan_lines)
    }

    pub fn parse(&self, content: &str, format: FileFormat) -> Result<ParsedGeneticData, EngineError> {
        parsers::parse(content, format, &self.config)
    }

    pub fn analyze(&self, variants: &[Variant], sample_id: &str) -> AnalysisResult {
        SampleAnalyzer::new(&self.knowledge_base).analyze(variants, sample_id)
    }

    pub fn analyze_all(&self, data: &ParsedGeneticData) -> Vec<AnalysisResult> {
        SampleAnalyzer::new(&self.knowledge_base).analyze_all(&data.variants, &data.samples)
    }

    pub fn compare(&self, analyses: &[AnalysisResult]) -> ComparisonResult {
        SampleComparator::new().compare(analyses)
    }

    pub fn protocols(&self, result: &AnalysisResult) -> Vec<CategoryProtocol> {
        ProtocolGenerator::new(&self.knowledge_base).generate(result)
    }

    /// Detect, parse and analyze every sample of `content`
    #[instrument(skip_all, fields(bytes = content.len()))]
    pub fn analyze_text(&self, content: &str) -> Result<FileAnalysis, EngineError> {
        self.analyze_with(content, &self.config)
    }

    /// Like [`Engine::analyze_text`], naming a single-sample 23andMe upload
    /// `sample_name`. VCF samples keep their header names.
    #[instrument(skip_all, fields(bytes = content.len(), sample = sample_name))]
    pub fn analyze_text_as(&self, content: &str, sample_name: &str) -> Result<FileAnalysis, EngineError> {
        let config = self.config.clone().with_default_sample_name(sample_name);
        self.analyze_with(content, &config)
    }

    fn analyze_with(&self, content: &str, config: &EngineConfig) -> Result<FileAnalysis, EngineError> {
        let format = parsers::detect_format_with_limit(content, config.detection_scan_lines);
        if !format.is_supported() {
            return Err(EngineError::FormatUndetected);
        }

        let data = parsers::parse(content, format, config)?;
        let analyses = self.analyze_all(&data);
        let protocols = analyses
            .iter()
            .map(|analysis| (analysis.sample_id.clone(), self.protocols(analysis)))
            .collect();

        info!(
            "Analyzed {} sample(s) from {} input",
            analyses.len(),
            format
        );

        Ok(FileAnalysis {
            source: None,
            format,
            genome_build: data.genome_build,
            samples: data.samples,
            total_records: data.variants.len(),
            skipped_lines: data.skipped_lines,
            analyses,
            protocols,
        })
    }
}
