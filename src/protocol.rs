//! Per-category action plans built from one sample's analysis.
//!
//! Each category with at least one evaluated variant gets a
//! [`CategoryProtocol`]: a priority grade plus the recommendations of its
//! risk-positive variants, sorted into supplement, dietary and lifestyle
//! buckets by keyword.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

use crate::knowledge_base::KnowledgeBase;
use crate::types::*;

const SUPPLEMENT_KEYWORDS: [&str; 6] = ["supplement", "vitamin", "mineral", "omega", "nac", "glutathione"];
const DIETARY_KEYWORDS: [&str; 5] = ["diet", "food", "eat", "intake", "meal"];

/// Categories with more evaluated variants than this are at least medium priority
const MEDIUM_PRIORITY_VARIANT_COUNT: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolPriority {
    Low,
    Medium,
    High,
}

impl ProtocolPriority {
    /// High with any HIGH variant, medium above two variants, low otherwise
    pub fn grade(variants: &[&EvaluatedVariant]) -> Self {
        if variants
            .iter()
            .any(|variant| variant.risk_level == RiskLevel::High)
        {
            ProtocolPriority::High
        } else if variants.len() > MEDIUM_PRIORITY_VARIANT_COUNT {
            ProtocolPriority::Medium
        } else {
            ProtocolPriority::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolPriority::Low => "low",
            ProtocolPriority::Medium => "medium",
            ProtocolPriority::High => "high",
        }
    }
}

impl fmt::Display for ProtocolPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bucket a recommendation falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    Supplement,
    Dietary,
    Lifestyle,
}

impl RecommendationKind {
    /// Case-insensitive keyword match; supplement keywords win over dietary ones
    pub fn of(recommendation: &str) -> Self {
        let lower = recommendation.to_lowercase();
        if SUPPLEMENT_KEYWORDS.iter().any(|word| lower.contains(word)) {
            RecommendationKind::Supplement
        } else if DIETARY_KEYWORDS.iter().any(|word| lower.contains(word)) {
            RecommendationKind::Dietary
        } else {
            RecommendationKind::Lifestyle
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryProtocol {
    pub category: HealthCategory,
    pub priority: ProtocolPriority,
    pub genes: BTreeSet<String>,
    pub variant_count: usize,
    pub high_risk_count: usize,
    pub recommendations: BTreeSet<String>,
    pub supplements: Vec<String>,
    pub dietary_advice: Vec<String>,
    pub lifestyle_changes: Vec<String>,
}

impl CategoryProtocol {
    fn push_recommendation(&mut self, recommendation: &str) {
        if !self.recommendations.insert(recommendation.to_string()) {
            return;
        }
        let bucket = match RecommendationKind::of(recommendation) {
            RecommendationKind::Supplement => &mut self.supplements,
            RecommendationKind::Dietary => &mut self.dietary_advice,
            RecommendationKind::Lifestyle => &mut self.lifestyle_changes,
        };
        bucket.push(recommendation.to_string());
    }
}

/// Builds protocols against the knowledge base the analysis was run with
pub struct ProtocolGenerator<'kb> {
    knowledge_base: &'kb KnowledgeBase,
}

impl<'kb> ProtocolGenerator<'kb> {
    pub fn new(knowledge_base: &'kb KnowledgeBase) -> Self {
        Self { knowledge_base }
    }

    /// One protocol per category with evaluated variants, in category order
    pub fn generate(&self, result: &AnalysisResult) -> Vec<CategoryProtocol> {
        let protocols: Vec<CategoryProtocol> = result
            .variants_by_category()
            .into_iter()
            .map(|(category, variants)| self.category_protocol(category, &variants))
            .collect();

        debug!(
            "Sample {}: {} protocol(s), {} high priority",
            result.sample_id,
            protocols.len(),
            protocols
                .iter()
                .filter(|p| p.priority == ProtocolPriority::High)
                .count()
        );

        protocols
    }

    fn category_protocol(
        &self,
        category: &HealthCategory,
        variants: &[&EvaluatedVariant],
    ) -> CategoryProtocol {
        let mut protocol = CategoryProtocol {
            category: category.clone(),
            priority: ProtocolPriority::grade(variants),
            genes: variants.iter().map(|variant| variant.gene.clone()).collect(),
            variant_count: variants.len(),
            high_risk_count: variants
                .iter()
                .filter(|variant| variant.risk_level == RiskLevel::High)
                .count(),
            recommendations: BTreeSet::new(),
            supplements: Vec::new(),
            dietary_advice: Vec::new(),
            lifestyle_changes: Vec::new(),
        };

        let recommendations = variants
            .iter()
            .filter(|variant| variant.is_risk_positive())
            .filter_map(|variant| self.knowledge_base.get(&variant.rsid))
            .flat_map(|entry| entry.recommendations.iter());
        for recommendation in recommendations {
            protocol.push_recommendation(recommendation);
        }

        protocol
    }
}

pub fn generate_protocols(result: &AnalysisResult, knowledge_base: &KnowledgeBase) -> Vec<CategoryProtocol> {
    ProtocolGenerator::new(knowledge_base).generate(result)
}
