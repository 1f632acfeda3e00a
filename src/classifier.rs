//! Genotype → risk classification.
//!
//! Two strategies, picked by the knowledge base entry's [`RiskModel`]:
//! a genotype lookup table, or counting copies of designated risk alleles.

use std::collections::HashMap;

use crate::knowledge_base::RiskModel;
use crate::types::{RiskLevel, RiskStatus};

/// Both views of one classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub risk_level: RiskLevel,
    pub status: RiskStatus,
    pub risk_allele_count: u32,
}

impl Classification {
    pub fn unknown() -> Self {
        Self {
            risk_level: RiskLevel::Low,
            status: RiskStatus::Unknown,
            risk_allele_count: 0,
        }
    }

    pub fn from_risk_level(risk_level: RiskLevel) -> Self {
        let status = risk_level.status();
        Self {
            risk_level,
            status,
            risk_allele_count: status.ordinal(),
        }
    }

    pub fn from_risk_allele_count(risk_allele_count: u32) -> Self {
        let status = RiskStatus::from_risk_allele_count(risk_allele_count);
        Self {
            risk_level: status.risk_level(),
            status,
            risk_allele_count,
        }
    }

    pub fn is_risk_positive(&self) -> bool {
        self.status.is_risk_positive()
    }
}

/// Uppercase and sort the characters so `TC` and `CT` share one key
pub fn canonical_genotype(genotype: &str) -> String {
    let mut chars: Vec<char> = genotype
        .trim()
        .chars()
        .map(|c| c.to_ascii_uppercase())
        .collect();
    chars.sort_unstable();
    chars.into_iter().collect()
}

/// Deletion, insertion and structural markers that cannot be dosed
pub fn is_placeholder_marker(marker: &str) -> bool {
    let marker = marker.trim();
    if marker.is_empty() || (marker.starts_with('<') && marker.ends_with('>')) {
        return true;
    }
    matches!(
        marker.to_ascii_uppercase().as_str(),
        "-" | "." | "*" | "D" | "I" | "DEL" | "INS"
    )
}

/// Table lookup on the canonical genotype; a miss is LOW.
pub fn classify_by_table(genotype: &str, table: &HashMap<String, RiskLevel>) -> Classification {
    let level = table
        .get(&canonical_genotype(genotype))
        .copied()
        .unwrap_or(RiskLevel::Low);
    Classification::from_risk_level(level)
}

/// Count alleles matching any risk allele. Placeholders on either side make
/// the dose meaningless, so those calls are UNKNOWN.
pub fn count_risk_alleles<S: AsRef<str>>(
    alleles: &[S],
    risk_alleles: &[String],
    reference: &str,
) -> Classification {
    if risk_alleles.is_empty()
        || is_placeholder_marker(reference)
        || risk_alleles.iter().any(|risk| is_placeholder_marker(risk))
    {
        return Classification::unknown();
    }

    let count = alleles
        .iter()
        .map(AsRef::<str>::as_ref)
        .filter(|allele| risk_alleles.iter().any(|risk| risk.eq_ignore_ascii_case(allele)))
        .count() as u32;

    Classification::from_risk_allele_count(count)
}

pub fn classify<S: AsRef<str>>(model: &RiskModel, alleles: &[S], reference: &str) -> Classification {
    match model {
        RiskModel::GenotypeTable(table) => {
            let genotype: String = alleles.iter().map(AsRef::<str>::as_ref).collect();
            classify_by_table(&genotype, table)
        }
        RiskModel::RiskAlleles(risk_alleles) => count_risk_alleles(alleles, risk_alleles, reference),
    }
}
