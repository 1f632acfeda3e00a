//! Raw data readers: format detection, decompression and the per-dialect parsers.

use anyhow::{Context, Result};
use bzip2::read::BzDecoder;
use flate2::read::MultiGzDecoder;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use tracing::{debug, info};
use xz2::read::XzDecoder;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::types::{FileFormat, Variant};

pub mod genotype;
pub mod twentythree;
pub mod vcf;

pub use genotype::{
    decode_genotype, resolve_allele, resolve_genotype, ResolvedAllele, ResolvedGenotype,
};
pub use twentythree::TwentyThreeAndMeParser;
pub use vcf::VcfParser;

lazy_static! {
    static ref RSID_DATA_LINE: Regex = Regex::new(r"^rs\d+\s+").expect("rsid line pattern is valid");
    static ref TWENTYTHREE_HEADER: Regex =
        Regex::new(r"(?i)^#+\s*rsid\b").expect("23andMe header pattern is valid");
}

const COMPRESSION_EXTENSIONS: [&str; 4] = ["gz", "bgz", "bz2", "xz"];

/// Common interface for the dialect parsers
pub trait GeneticDataParser {
    fn format(&self) -> FileFormat;
    fn parse_text(&self, content: &str) -> Result<ParsedGeneticData, EngineError>;
}

/// Parsed genetic data container
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedGeneticData {
    pub format: FileFormat,
    pub samples: Vec<String>,
    pub variants: Vec<Variant>,
    pub genome_build: Option<String>,
    /// Non-comment, non-blank lines seen
    pub data_lines: usize,
    pub skipped_lines: usize,
}

impl ParsedGeneticData {
    pub fn new(format: FileFormat, samples: Vec<String>) -> Self {
        Self {
            format,
            samples,
            ..Default::default()
        }
    }

    pub fn add_variant(&mut self, variant: Variant) {
        self.variants.push(variant);
    }

    pub fn record_skip(&mut self, line_number: usize, error: &EngineError) {
        debug!("Skipping line {}: {}", line_number, error);
        self.skipped_lines += 1;
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    pub fn get_variant(&self, rsid: &str) -> Option<&Variant> {
        self.variants
            .iter()
            .find(|variant| variant.rsid.as_deref() == Some(rsid))
    }
}

/// Classify text as 23andMe, VCF or unknown using the default scan window
pub fn detect_format(content: &str) -> FileFormat {
    detect_format_with_limit(content, EngineConfig::default().detection_scan_lines)
}

/// Rules, first match wins:
/// 1. the first non-empty line is a `##fileformat=VCF` header
/// 2. a comment line within the first `scan_lines` lines announces the
///    23andMe column header (`# rsid ...`)
/// 3. any non-comment line starts with `rs<digits>` and whitespace
pub fn detect_format_with_limit(content: &str, scan_lines: usize) -> FileFormat {
    let first_line = content.lines().map(str::trim).find(|line| !line.is_empty());
    if first_line.is_some_and(|line| line.starts_with("##fileformat=VCF")) {
        return FileFormat::Vcf;
    }

    let has_header = content
        .lines()
        .take(scan_lines)
        .any(|line| TWENTYTHREE_HEADER.is_match(line.trim_start()));

    let has_rsid_line = || {
        content
            .lines()
            .filter(|line| !line.starts_with('#'))
            .any(|line| RSID_DATA_LINE.is_match(line.trim_start()))
    };

    if has_header || has_rsid_line() {
        FileFormat::TwentyThreeAndMe
    } else {
        FileFormat::Unknown
    }
}

/// Run the matching dialect parser; empty results are an error
pub fn parse(
    content: &str,
    format: FileFormat,
    config: &EngineConfig,
) -> Result<ParsedGeneticData, EngineError> {
    let parser: Box<dyn GeneticDataParser> = match format {
        FileFormat::TwentyThreeAndMe => Box::new(TwentyThreeAndMeParser::from_config(config)),
        FileFormat::Vcf => Box::new(VcfParser::from_config(config)),
        FileFormat::Unknown => return Err(EngineError::FormatUndetected),
    };

    let data = parser.parse_text(content)?;
    if data.is_empty() {
        return Err(EngineError::NoVariants {
            format: parser.format(),
        });
    }

    info!(
        "Parsed {} variants for {} sample(s) from {} input ({} lines skipped)",
        data.len(),
        data.samples.len(),
        format,
        data.skipped_lines
    );

    Ok(data)
}

/// Strip `chr` prefixes and map the mitochondrial alias `M` to `MT`
pub fn normalize_chromosome(raw: &str) -> String {
    let trimmed = raw.trim();
    let stripped = match trimmed.get(..3) {
        Some(prefix) if prefix.eq_ignore_ascii_case("chr") && trimmed.len() > 3 => &trimmed[3..],
        _ => trimmed,
    };

    match stripped.to_ascii_uppercase().as_str() {
        "M" | "MT" => "MT".to_string(),
        "X" => "X".to_string(),
        "Y" => "Y".to_string(),
        _ => stripped.to_string(),
    }
}

/// Sample name for a single-sample file: the file name without its
/// compression and data extensions (`alice.txt.gz` -> `alice`)
pub fn sample_name_from_path(path: &Path) -> Option<String> {
    let compressed = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| COMPRESSION_EXTENSIONS.iter().any(|c| c.eq_ignore_ascii_case(ext)));
    let inner = if compressed {
        Path::new(path.file_stem()?)
    } else {
        path
    };

    let stem = inner.file_stem()?.to_str()?;
    (!stem.is_empty()).then(|| stem.to_string())
}

/// Open a file, transparently decompressing `.gz`, `.bz2` and `.xz`
pub fn open_input(path: &Path) -> Result<Box<dyn BufRead>> {
    let file =
        File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());

    let reader: Box<dyn Read> = match extension.as_deref() {
        Some("gz") | Some("bgz") => Box::new(MultiGzDecoder::new(file)),
        Some("bz2") => Box::new(BzDecoder::new(file)),
        Some("xz") => Box::new(XzDecoder::new(file)),
        _ => Box::new(file),
    };

    Ok(Box::new(BufReader::new(reader)))
}

pub fn read_input(path: &Path) -> Result<String> {
    let mut content = String::new();
    open_input(path)?
        .read_to_string(&mut content)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    Ok(content)
}

/// Path-based front end: read, detect, parse
pub struct FileParser {
    config: EngineConfig,
    name_samples_by_file: bool,
}

impl FileParser {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            name_samples_by_file: true,
        }
    }

    /// Keep `default_sample_name` for every 23andMe file
    pub fn with_fixed_sample_name(mut self) -> Self {
        self.name_samples_by_file = false;
        self
    }

    /// 23andMe files are named after the file unless the config was given an
    /// explicit sample name
    pub fn parse(&self, path: &Path) -> Result<ParsedGeneticData> {
        let content = read_input(path)?;
        let format = detect_format_with_limit(&content, self.config.detection_scan_lines);
        debug!("Detected {} format for {}", format, path.display());

        let config = match sample_name_from_path(path) {
            Some(name) if self.name_samples_by_file => {
                self.config.clone().with_default_sample_name(name)
            }
            _ => self.config.clone(),
        };

        parse(&content, format, &config)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }
}
