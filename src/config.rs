use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::EngineError;

/// Engine-level settings, loadable from a TOML file.
///
/// Every field has a default, so a partial file only overrides what it names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Sample identifier used for single-sample 23andMe input
    pub default_sample_name: String,
    /// How many leading lines, comments included, format detection scans
    /// for the 23andMe header
    pub detection_scan_lines: usize,
    /// 23andMe genotype strings treated as no-calls
    pub no_call_markers: Vec<String>,
    /// FORMAT key that holds the genotype in VCF sample columns
    pub genotype_tag: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_sample_name: "sample".to_string(),
            detection_scan_lines: 50,
            no_call_markers: vec!["--".to_string(), "00".to_string()],
            genotype_tag: "GT".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, EngineError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, EngineError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn with_default_sample_name(mut self, name: impl Into<String>) -> Self {
        self.default_sample_name = name.into();
        self
    }
}
