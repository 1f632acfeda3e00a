use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

lazy_static! {
    static ref RSID_PATTERN: Regex = Regex::new(r"^rs\d+$").expect("rsid pattern is valid");
}

/// Returns true for reference SNP identifiers of the form `rs<digits>`
pub fn is_valid_rsid(rsid: &str) -> bool {
    RSID_PATTERN.is_match(rsid)
}

/// Raw data dialects understood by the engine
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    #[serde(rename = "23andme")]
    TwentyThreeAndMe,
    Vcf,
    #[default]
    Unknown,
}

impl FileFormat {
    pub fn is_supported(&self) -> bool {
        !matches!(self, FileFormat::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::TwentyThreeAndMe => "23andMe",
            FileFormat::Vcf => "VCF",
            FileFormat::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a genotype call: an index into REF + ALT, or the `.` marker
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AlleleIndex {
    Called(u32),
    Missing,
}

impl fmt::Display for AlleleIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlleleIndex::Called(index) => write!(f, "{}", index),
            AlleleIndex::Missing => f.write_str("."),
        }
    }
}

/// Decoded genotype call for one sample at one variant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Genotype {
    pub allele_indices: Vec<AlleleIndex>,
    pub phased: bool,
}

impl Genotype {
    pub fn new(allele_indices: Vec<AlleleIndex>, phased: bool) -> Self {
        Self {
            allele_indices,
            phased,
        }
    }

    /// A fully missing call (`./.` for ploidy 2)
    pub fn missing(ploidy: usize) -> Self {
        Self {
            allele_indices: vec![AlleleIndex::Missing; ploidy],
            phased: false,
        }
    }

    pub fn ploidy(&self) -> usize {
        self.allele_indices.len()
    }

    pub fn is_no_call(&self) -> bool {
        self.allele_indices
            .iter()
            .all(|index| matches!(index, AlleleIndex::Missing))
    }

    pub fn is_homozygous(&self) -> bool {
        self.allele_indices.len() >= 2
            && !self.is_no_call()
            && self
                .allele_indices
                .windows(2)
                .all(|pair| pair[0] == pair[1])
    }

    pub fn is_heterozygous(&self) -> bool {
        let called: BTreeSet<u32> = self
            .allele_indices
            .iter()
            .filter_map(|index| match index {
                AlleleIndex::Called(i) => Some(*i),
                AlleleIndex::Missing => None,
            })
            .collect();
        called.len() > 1
    }
}

impl fmt::Display for Genotype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let separator = if self.phased { "|" } else { "/" };
        let parts: Vec<String> = self
            .allele_indices
            .iter()
            .map(|index| index.to_string())
            .collect();
        f.write_str(&parts.join(separator))
    }
}

/// Represents a single genetic variant and the calls of every sample at it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Variant {
    pub chromosome: String,
    pub position: u64,
    pub rsid: Option<String>,
    pub reference_allele: String,
    pub alternate_alleles: Vec<String>,
    pub per_sample_genotype: BTreeMap<String, Genotype>,
}

impl Variant {
    pub fn genotype_for(&self, sample_id: &str) -> Option<&Genotype> {
        self.per_sample_genotype.get(sample_id)
    }

    pub fn is_multi_allelic(&self) -> bool {
        self.alternate_alleles.len() > 1
    }
}

/// Health categories used to group knowledge base findings
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HealthCategory {
    Longevity,
    Detox,
    Metabolism,
    SkinAging,
    BrainHealth,
    Other(String),
}

impl HealthCategory {
    /// Lenient parse: case-insensitive, accepts `_`, `-` or spaces as separators.
    /// Anything unrecognized is kept verbatim as `Other`.
    pub fn parse(raw: &str) -> Self {
        let normalized: String = raw
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == '-' || c == ' ' { '_' } else { c })
            .collect();

        match normalized.as_str() {
            "longevity" => HealthCategory::Longevity,
            "detox" | "detoxification" => HealthCategory::Detox,
            "metabolism" => HealthCategory::Metabolism,
            "skin_aging" | "skin" => HealthCategory::SkinAging,
            "brain_health" | "brain" => HealthCategory::BrainHealth,
            _ => HealthCategory::Other(raw.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            HealthCategory::Longevity => "longevity",
            HealthCategory::Detox => "detox",
            HealthCategory::Metabolism => "metabolism",
            HealthCategory::SkinAging => "skin_aging",
            HealthCategory::BrainHealth => "brain_health",
            HealthCategory::Other(name) => name,
        }
    }
}

impl fmt::Display for HealthCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Categories travel as plain strings so they can key JSON objects.
impl Serialize for HealthCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for HealthCategory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(HealthCategory::parse(&raw))
    }
}

/// Severity assigned by a knowledge base entry; ordered for reporting
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[serde(alias = "PROTECTIVE", alias = "Protective")]
    Protective,
    #[serde(alias = "LOW", alias = "Low")]
    Low,
    #[serde(alias = "MODERATE", alias = "Moderate")]
    Moderate,
    #[serde(alias = "HIGH", alias = "High")]
    High,
}

impl RiskLevel {
    pub fn status(&self) -> RiskStatus {
        match self {
            RiskLevel::Protective | RiskLevel::Low => RiskStatus::Normal,
            RiskLevel::Moderate => RiskStatus::Carrier,
            RiskLevel::High => RiskStatus::AtRisk,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Protective => "protective",
            RiskLevel::Low => "low",
            RiskLevel::Moderate => "moderate",
            RiskLevel::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk-allele dose view of a classification, used for numeric scoring
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RiskStatus {
    Normal,
    Carrier,
    AtRisk,
    Unknown,
}

impl RiskStatus {
    pub fn from_risk_allele_count(count: u32) -> Self {
        match count {
            0 => RiskStatus::Normal,
            1 => RiskStatus::Carrier,
            _ => RiskStatus::AtRisk,
        }
    }

    /// Weight added to a category score
    pub fn ordinal(&self) -> u32 {
        match self {
            RiskStatus::Normal | RiskStatus::Unknown => 0,
            RiskStatus::Carrier => 1,
            RiskStatus::AtRisk => 2,
        }
    }

    pub fn risk_level(&self) -> RiskLevel {
        match self {
            RiskStatus::Normal | RiskStatus::Unknown => RiskLevel::Low,
            RiskStatus::Carrier => RiskLevel::Moderate,
            RiskStatus::AtRisk => RiskLevel::High,
        }
    }

    pub fn is_risk_positive(&self) -> bool {
        self.ordinal() > 0
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskStatus::Normal => "normal",
            RiskStatus::Carrier => "carrier",
            RiskStatus::AtRisk => "at_risk",
            RiskStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for RiskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A knowledge base variant as classified for one sample
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluatedVariant {
    pub rsid: String,
    pub gene: String,
    pub category: HealthCategory,
    pub risk_level: RiskLevel,
    pub status: RiskStatus,
    pub risk_allele_count: u32,
    pub genotype_display: String,
    pub phased: bool,
}

impl EvaluatedVariant {
    pub fn is_risk_positive(&self) -> bool {
        self.status.is_risk_positive()
    }
}

/// Per-sample analysis outcome
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AnalysisResult {
    pub sample_id: String,
    pub evaluated_variants: Vec<EvaluatedVariant>,
    pub recommendations: BTreeSet<String>,
    pub category_risk_scores: BTreeMap<HealthCategory, u32>,
    /// Every record that carried a genotype cell for this sample
    pub total_variants_seen: usize,
    pub unknown_rsid_count: usize,
    pub no_call_count: usize,
    pub skipped_alleles: usize,
    pub knowledge_base_version: Option<String>,
}

impl AnalysisResult {
    pub fn new(sample_id: impl Into<String>, knowledge_base_version: Option<String>) -> Self {
        Self {
            sample_id: sample_id.into(),
            knowledge_base_version,
            ..Default::default()
        }
    }

    /// rsids whose classification is above LOW / normal
    pub fn risk_rsids(&self) -> BTreeSet<String> {
        self.evaluated_variants
            .iter()
            .filter(|variant| variant.is_risk_positive())
            .map(|variant| variant.rsid.clone())
            .collect()
    }

    pub fn variants_by_category(&self) -> BTreeMap<&HealthCategory, Vec<&EvaluatedVariant>> {
        let mut groups: BTreeMap<&HealthCategory, Vec<&EvaluatedVariant>> = BTreeMap::new();
        for variant in &self.evaluated_variants {
            groups.entry(&variant.category).or_default().push(variant);
        }
        groups
    }

    pub fn high_priority_variants(&self) -> Vec<&EvaluatedVariant> {
        self.evaluated_variants
            .iter()
            .filter(|variant| variant.risk_level == RiskLevel::High)
            .collect()
    }

    /// Highest scoring category. Ties go to the category that sorts first;
    /// `None` when no category scored above zero.
    pub fn top_category(&self) -> Option<(&HealthCategory, u32)> {
        let mut best: Option<(&HealthCategory, u32)> = None;
        for (category, score) in &self.category_risk_scores {
            if *score == 0 {
                continue;
            }
            match best {
                Some((_, best_score)) if best_score >= *score => {}
                _ => best = Some((category, *score)),
            }
        }
        best
    }
}

/// Shared and sample-specific risk variants across analyses
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ComparisonResult {
    pub sample_ids: Vec<String>,
    pub shared_risk_rsids: BTreeSet<String>,
    pub unique_risk_rsids: BTreeMap<String, BTreeSet<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rsid_pattern() {
        assert!(is_valid_rsid("rs1801133"));
        assert!(!is_valid_rsid("rs"));
        assert!(!is_valid_rsid("i3000001"));
        assert!(!is_valid_rsid("rs12a"));
    }

    #[test]
    fn test_risk_level_ordering() {
        assert!(RiskLevel::Protective < RiskLevel::Low);
        assert!(RiskLevel::Low < RiskLevel::Moderate);
        assert!(RiskLevel::Moderate < RiskLevel::High);
    }

    #[test]
    fn test_risk_level_deserialize_aliases() {
        let levels: Vec<RiskLevel> =
            serde_json::from_str(r#"["low", "HIGH", "Moderate", "protective"]"#).unwrap();
        assert_eq!(
            levels,
            vec![
                RiskLevel::Low,
                RiskLevel::High,
                RiskLevel::Moderate,
                RiskLevel::Protective
            ]
        );
    }

    #[test]
    fn test_health_category_parse() {
        assert_eq!(HealthCategory::parse("SKIN_AGING"), HealthCategory::SkinAging);
        assert_eq!(HealthCategory::parse("brain health"), HealthCategory::BrainHealth);
        assert_eq!(
            HealthCategory::parse("methylation"),
            HealthCategory::Other("methylation".to_string())
        );
    }

    #[test]
    fn test_category_as_json_key() {
        let mut scores = BTreeMap::new();
        scores.insert(HealthCategory::Detox, 2u32);
        scores.insert(HealthCategory::Other("methylation".to_string()), 1);

        let json = serde_json::to_string(&scores).unwrap();
        assert_eq!(json, r#"{"detox":2,"methylation":1}"#);

        let back: BTreeMap<HealthCategory, u32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, scores);
    }

    #[test]
    fn test_genotype_display_and_zygosity() {
        let phased = Genotype::new(vec![AlleleIndex::Called(0), AlleleIndex::Called(1)], true);
        assert_eq!(phased.to_string(), "0|1");
        assert!(phased.is_heterozygous());
        assert!(!phased.is_homozygous());

        let missing = Genotype::missing(2);
        assert_eq!(missing.to_string(), "./.");
        assert!(missing.is_no_call());
        assert!(!missing.is_homozygous());

        let hom = Genotype::new(vec![AlleleIndex::Called(1), AlleleIndex::Called(1)], false);
        assert!(hom.is_homozygous());
    }

    #[test]
    fn test_top_category_tie_breaks_on_category_order() {
        let mut result = AnalysisResult::new("s1", None);
        result.category_risk_scores.insert(HealthCategory::Metabolism, 2);
        result.category_risk_scores.insert(HealthCategory::Detox, 2);
        result.category_risk_scores.insert(HealthCategory::Longevity, 0);

        assert_eq!(result.top_category(), Some((&HealthCategory::Detox, 2)));
    }

    #[test]
    fn test_top_category_none_when_all_zero() {
        let mut result = AnalysisResult::new("s1", None);
        result.category_risk_scores.insert(HealthCategory::Detox, 0);
        assert_eq!(result.top_category(), None);
    }
}
