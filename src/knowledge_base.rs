//! Curated variant knowledge base: rsid → gene, category, risk model and advice.
//!
//! Loaded once (JSON or CSV), then shared read-only between analyses.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

use crate::classifier::canonical_genotype;
use crate::error::EngineError;
use crate::types::{is_valid_rsid, HealthCategory, RiskLevel};

const METADATA_KEY: &str = "metadata";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeBaseMetadata {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub citation: Option<String>,
    #[serde(default)]
    pub generated_by: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Provenance {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub citation: Option<String>,
}

/// How an entry turns a genotype into a risk classification
#[derive(Debug, Clone, PartialEq)]
pub enum RiskModel {
    /// Canonical (sorted, uppercase) genotype → level
    GenotypeTable(HashMap<String, RiskLevel>),
    /// Nucleotides whose copies are counted
    RiskAlleles(Vec<String>),
}

impl RiskModel {
    pub fn genotype_table<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, RiskLevel)>,
        K: AsRef<str>,
    {
        RiskModel::GenotypeTable(
            pairs
                .into_iter()
                .map(|(genotype, level)| (canonical_genotype(genotype.as_ref()), level))
                .collect(),
        )
    }

    pub fn risk_alleles<I, S>(alleles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        RiskModel::RiskAlleles(
            alleles
                .into_iter()
                .map(|allele| allele.as_ref().trim().to_ascii_uppercase())
                .filter(|allele| !allele.is_empty())
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RiskModel::GenotypeTable(table) => table.is_empty(),
            RiskModel::RiskAlleles(alleles) => alleles.is_empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeBaseEntry {
    pub gene: String,
    pub category: HealthCategory,
    pub risk_model: RiskModel,
    pub description: String,
    pub recommendations: Vec<String>,
    pub source: Option<String>,
    pub provenance: Option<Provenance>,
}

impl KnowledgeBaseEntry {
    pub fn new(gene: impl Into<String>, category: HealthCategory, risk_model: RiskModel) -> Self {
        Self {
            gene: gene.into(),
            category,
            risk_model,
            description: String::new(),
            recommendations: Vec::new(),
            source: None,
            provenance: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_recommendations<I, S>(mut self, recommendations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recommendations = recommendations.into_iter().map(Into::into).collect();
        self
    }
}

/// A finding reported by [`KnowledgeBase::validate`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub rsid: Option<String>,
    pub message: String,
}

impl ValidationIssue {
    fn global(message: impl Into<String>) -> Self {
        Self {
            rsid: None,
            message: message.into(),
        }
    }

    fn entry(rsid: &str, message: impl Into<String>) -> Self {
        Self {
            rsid: Some(rsid.to_string()),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    metadata: KnowledgeBaseMetadata,
    entries: HashMap<String, KnowledgeBaseEntry>,
}

// Wire shape of one JSON entry
#[derive(Debug, Deserialize)]
struct RawEntry {
    gene: String,
    #[serde(default)]
    category: Option<HealthCategory>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    recommendations: Vec<String>,
    #[serde(default)]
    risk_genotypes: Option<HashMap<String, RiskLevel>>,
    #[serde(default)]
    risk_alleles: Option<Vec<String>>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    provenance: Option<Provenance>,
}

impl From<RawEntry> for KnowledgeBaseEntry {
    fn from(raw: RawEntry) -> Self {
        let risk_model = match (raw.risk_genotypes, raw.risk_alleles) {
            (Some(table), _) if !table.is_empty() => RiskModel::genotype_table(table),
            (_, Some(alleles)) => RiskModel::risk_alleles(alleles),
            _ => RiskModel::RiskAlleles(Vec::new()),
        };

        Self {
            gene: raw.gene,
            category: raw
                .category
                .unwrap_or_else(|| HealthCategory::Other("other".to_string())),
            risk_model,
            description: raw.description,
            recommendations: raw.recommendations,
            source: raw.source,
            provenance: raw.provenance,
        }
    }
}

// Wire shape of one CSV row
#[derive(Debug, Deserialize)]
struct CsvRow {
    rsid: String,
    gene: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    risk_alleles: String,
    #[serde(default)]
    recommendations: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    provenance_version: String,
    #[serde(default)]
    provenance_citation: String,
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl CsvRow {
    fn into_entry(self) -> (String, KnowledgeBaseEntry) {
        let category = if self.category.trim().is_empty() {
            HealthCategory::Other("other".to_string())
        } else {
            HealthCategory::parse(&self.category)
        };

        let provenance_version = non_empty(self.provenance_version);
        let provenance_citation = non_empty(self.provenance_citation);
        let provenance = (provenance_version.is_some() || provenance_citation.is_some()).then(|| {
            Provenance {
                version: provenance_version,
                citation: provenance_citation,
            }
        });

        let recommendations = self
            .recommendations
            .split('|')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>();

        let entry = KnowledgeBaseEntry {
            source: non_empty(self.source),
            provenance,
            ..KnowledgeBaseEntry::new(
                self.gene.trim(),
                category,
                RiskModel::risk_alleles(self.risk_alleles.split(',')),
            )
            .with_description(self.description.trim())
            .with_recommendations(recommendations)
        };

        (self.rsid.trim().to_string(), entry)
    }
}

impl KnowledgeBase {
    pub fn new(metadata: KnowledgeBaseMetadata, entries: HashMap<String, KnowledgeBaseEntry>) -> Self {
        Self { metadata, entries }
    }

    pub fn with_entry(mut self, rsid: impl Into<String>, entry: KnowledgeBaseEntry) -> Self {
        self.entries.insert(rsid.into(), entry);
        self
    }

    pub fn get(&self, rsid: &str) -> Option<&KnowledgeBaseEntry> {
        self.entries.get(rsid)
    }

    pub fn contains(&self, rsid: &str) -> bool {
        self.entries.contains_key(rsid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn metadata(&self) -> &KnowledgeBaseMetadata {
        &self.metadata
    }

    pub fn version(&self) -> Option<&str> {
        self.metadata.version.as_deref()
    }

    /// Entries sorted by rsid
    pub fn entries(&self) -> BTreeMap<&str, &KnowledgeBaseEntry> {
        self.entries
            .iter()
            .map(|(rsid, entry)| (rsid.as_str(), entry))
            .collect()
    }

    pub fn rsids_in_category(&self, category: &HealthCategory) -> Vec<&str> {
        self.entries()
            .into_iter()
            .filter(|(_, entry)| &entry.category == category)
            .map(|(rsid, _)| rsid)
            .collect()
    }

    /// JSON object keyed by rsid; `metadata` is reserved for the header block
    pub fn from_json_str(content: &str) -> Result<Self, EngineError> {
        let root: Map<String, Value> = match serde_json::from_str::<Value>(content)? {
            Value::Object(map) => map,
            _ => {
                return Err(EngineError::KnowledgeBase(
                    "top-level JSON value must be an object".to_string(),
                ))
            }
        };

        let mut metadata = KnowledgeBaseMetadata::default();
        let mut entries = HashMap::with_capacity(root.len());

        for (key, value) in root {
            if key == METADATA_KEY {
                metadata = serde_json::from_value(value)
                    .map_err(|e| EngineError::KnowledgeBase(format!("metadata: {}", e)))?;
                continue;
            }

            let raw: RawEntry = serde_json::from_value(value)
                .map_err(|e| EngineError::KnowledgeBase(format!("entry {}: {}", key, e)))?;
            entries.insert(key, KnowledgeBaseEntry::from(raw));
        }

        debug!("Decoded {} knowledge base entries from JSON", entries.len());
        Ok(Self::new(metadata, entries))
    }

    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, EngineError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut entries = HashMap::new();
        for row in csv_reader.deserialize::<CsvRow>() {
            let (rsid, entry) = row?.into_entry();
            if rsid.is_empty() {
                continue;
            }
            entries.insert(rsid, entry);
        }

        debug!("Decoded {} knowledge base entries from CSV", entries.len());
        Ok(Self::new(KnowledgeBaseMetadata::default(), entries))
    }

    /// Load by extension: `.csv` is tabular, anything else is JSON
    pub fn from_path(path: &Path) -> Result<Self, EngineError> {
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);

        let knowledge_base = if is_csv {
            Self::from_csv_reader(fs::File::open(path)?)?
        } else {
            Self::from_json_str(&fs::read_to_string(path)?)?
        };

        info!(
            "Loaded knowledge base {} with {} entries (version {})",
            path.display(),
            knowledge_base.len(),
            knowledge_base.version().unwrap_or("unversioned")
        );
        Ok(knowledge_base)
    }

    /// Consistency report; an empty list means the knowledge base is clean.
    pub fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if self.entries.is_empty() {
            issues.push(ValidationIssue::global("knowledge base has no entries"));
        }
        if self.metadata.version.is_none() {
            issues.push(ValidationIssue::global("metadata.version is missing"));
        }

        for (rsid, entry) in self.entries() {
            if !is_valid_rsid(rsid) {
                issues.push(ValidationIssue::entry(rsid, "key is not an rs identifier"));
            }
            if entry.gene.trim().is_empty() {
                issues.push(ValidationIssue::entry(rsid, "gene is empty"));
            }
            if entry.risk_model.is_empty() {
                issues.push(ValidationIssue::entry(
                    rsid,
                    "neither risk_genotypes nor risk_alleles is populated",
                ));
            }
            if entry.recommendations.is_empty() {
                issues.push(ValidationIssue::entry(rsid, "no recommendations"));
            }
            if let RiskModel::GenotypeTable(table) = &entry.risk_model {
                for genotype in table.keys() {
                    if !genotype.chars().all(|c| c.is_ascii_alphabetic()) {
                        issues.push(ValidationIssue::entry(
                            rsid,
                            format!("genotype key '{}' is not nucleotide text", genotype),
                        ));
                    }
                }
            }
            match &entry.provenance {
                Some(provenance) if provenance.citation.is_some() => {}
                _ => issues.push(ValidationIssue::entry(rsid, "provenance citation is missing")),
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON_KB: &str = r#"{
        "metadata": {"version": "2024.1", "citation": "curated panel"},
        "rs1801133": {
            "gene": "MTHFR",
            "category": "detox",
            "description": "C677T",
            "recommendations": ["Consider methylfolate"],
            "risk_genotypes": {"CC": "low", "TC": "moderate", "TT": "high"},
            "provenance": {"version": "1", "citation": "PMID:1"}
        },
        "rs4680": {
            "gene": "COMT",
            "category": "Brain Health",
            "recommendations": ["Manage stress"],
            "risk_alleles": ["a"],
            "risk_genotypes": {}
        }
    }"#;

    #[test]
    fn test_from_json() {
        let kb = KnowledgeBase::from_json_str(JSON_KB).unwrap();

        assert_eq!(kb.len(), 2);
        assert_eq!(kb.version(), Some("2024.1"));
        assert!(!kb.contains(METADATA_KEY));

        let mthfr = kb.get("rs1801133").unwrap();
        assert_eq!(mthfr.category, HealthCategory::Detox);
        match &mthfr.risk_model {
            RiskModel::GenotypeTable(table) => {
                // keys are canonicalized at load time
                assert_eq!(table.get("CT"), Some(&RiskLevel::Moderate));
                assert!(!table.contains_key("TC"));
            }
            other => panic!("unexpected model {:?}", other),
        }

        let comt = kb.get("rs4680").unwrap();
        assert_eq!(comt.category, HealthCategory::BrainHealth);
        assert_eq!(comt.risk_model, RiskModel::RiskAlleles(vec!["A".to_string()]));
    }

    #[test]
    fn test_json_rejects_non_object() {
        assert!(matches!(
            KnowledgeBase::from_json_str("[1, 2]"),
            Err(EngineError::KnowledgeBase(_))
        ));
        assert!(matches!(
            KnowledgeBase::from_json_str("{not json"),
            Err(EngineError::Json(_))
        ));
    }

    #[test]
    fn test_json_entry_without_gene_is_rejected() {
        let err = KnowledgeBase::from_json_str(r#"{"rs1": {"category": "detox"}}"#).unwrap_err();
        assert!(err.to_string().contains("rs1"));
    }

    #[test]
    fn test_from_csv() {
        let csv = "\
rsid,gene,description,risk_alleles,recommendations,category,source,provenance_version,provenance_citation
rs429358,APOE,E4 marker,\"C\",Exercise daily | Mediterranean diet,longevity,SNPedia,3,PMID:42
rs762551,CYP1A2,caffeine,\"A, C\",Limit caffeine,metabolism,,,
";
        let kb = KnowledgeBase::from_csv_reader(csv.as_bytes()).unwrap();

        assert_eq!(kb.len(), 2);
        let apoe = kb.get("rs429358").unwrap();
        assert_eq!(apoe.category, HealthCategory::Longevity);
        assert_eq!(apoe.gene, "APOE");
        assert_eq!(apoe.description, "E4 marker");
        assert_eq!(
            apoe.recommendations,
            vec!["Exercise daily".to_string(), "Mediterranean diet".to_string()]
        );
        assert_eq!(apoe.source.as_deref(), Some("SNPedia"));
        assert_eq!(
            apoe.provenance.as_ref().and_then(|p| p.citation.as_deref()),
            Some("PMID:42")
        );

        let cyp = kb.get("rs762551").unwrap();
        assert_eq!(
            cyp.risk_model,
            RiskModel::RiskAlleles(vec!["A".to_string(), "C".to_string()])
        );
        assert!(cyp.provenance.is_none());
        assert!(cyp.source.is_none());
    }

    #[test]
    fn test_validate_reports_issues() {
        let kb = KnowledgeBase::default().with_entry(
            "snp1",
            KnowledgeBaseEntry::new("", HealthCategory::Detox, RiskModel::RiskAlleles(vec![])),
        );

        let issues = kb.validate();
        let messages: Vec<&str> = issues.iter().map(|i| i.message.as_str()).collect();

        assert!(messages.contains(&"metadata.version is missing"));
        assert!(messages.contains(&"key is not an rs identifier"));
        assert!(messages.contains(&"gene is empty"));
        assert!(messages.contains(&"no recommendations"));
        assert!(messages.contains(&"provenance citation is missing"));
    }

    #[test]
    fn test_validate_clean_entry() {
        let kb = KnowledgeBase::from_json_str(JSON_KB).unwrap();
        let issues: Vec<_> = kb
            .validate()
            .into_iter()
            .filter(|issue| issue.rsid.as_deref() == Some("rs1801133"))
            .collect();
        assert!(issues.is_empty(), "unexpected issues: {:?}", issues);
    }

    #[test]
    fn test_rsids_in_category_sorted() {
        let kb = KnowledgeBase::default()
            .with_entry(
                "rs2",
                KnowledgeBaseEntry::new("B", HealthCategory::Detox, RiskModel::risk_alleles(["T"])),
            )
            .with_entry(
                "rs1",
                KnowledgeBaseEntry::new("A", HealthCategory::Detox, RiskModel::risk_alleles(["G"])),
            );
        assert_eq!(kb.rsids_in_category(&HealthCategory::Detox), vec!["rs1", "rs2"]);
    }
}
