use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use crate::classifier::{classify, Classification};
use crate::knowledge_base::{KnowledgeBase, KnowledgeBaseEntry, RiskModel};
use crate::parsers::resolve_genotype;
use crate::types::*;

/// Per-sample risk analyzer over a shared knowledge base
pub struct SampleAnalyzer<'kb> {
    knowledge_base: &'kb KnowledgeBase,
}

impl<'kb> SampleAnalyzer<'kb> {
    pub fn new(knowledge_base: &'kb KnowledgeBase) -> Self {
        Self { knowledge_base }
    }

    /// Evaluate every variant that carries a call for `sample_id`.
    ///
    /// Records without an rsid, or with one the knowledge base lacks, count
    /// toward `total_variants_seen` and `unknown_rsid_count` only. Calls with no
    /// resolvable allele count as no-calls and are not evaluated.
    pub fn analyze(&self, variants: &[Variant], sample_id: &str) -> AnalysisResult {
        let mut result = AnalysisResult::new(
            sample_id,
            self.knowledge_base.version().map(str::to_string),
        );

        for variant in variants {
            let Some(genotype) = variant.genotype_for(sample_id) else {
                continue;
            };
            result.total_variants_seen += 1;

            let Some((rsid, entry)) = variant
                .rsid
                .as_deref()
                .and_then(|rsid| self.knowledge_base.get(rsid).map(|entry| (rsid, entry)))
            else {
                result.unknown_rsid_count += 1;
                continue;
            };

            let resolved = resolve_genotype(
                genotype,
                &variant.reference_allele,
                &variant.alternate_alleles,
            );
            result.skipped_alleles += resolved.skipped;

            if resolved.is_no_call() {
                result.no_call_count += 1;
                continue;
            }

            let classification = self.classify_call(entry, &resolved.nucleotides(), genotype, variant);
            self.record(&mut result, rsid, entry, classification, &resolved.display(), genotype.phased);
        }

        debug!(
            "Sample {}: {} seen, {} evaluated, {} unknown, {} no-calls",
            sample_id,
            result.total_variants_seen,
            result.evaluated_variants.len(),
            result.unknown_rsid_count,
            result.no_call_count
        );

        result
    }

    /// Analyze several samples of the same variant set in parallel
    pub fn analyze_all(&self, variants: &[Variant], samples: &[String]) -> Vec<AnalysisResult> {
        info!("Analyzing {} sample(s) against {} variants", samples.len(), variants.len());
        samples
            .par_iter()
            .map(|sample_id| self.analyze(variants, sample_id))
            .collect()
    }

    fn classify_call(
        &self,
        entry: &KnowledgeBaseEntry,
        nucleotides: &[&str],
        genotype: &Genotype,
        variant: &Variant,
    ) -> Classification {
        match &entry.risk_model {
            // Tables are keyed by diploid genotypes: a haploid call is read as homozygous
            RiskModel::GenotypeTable(_) if genotype.ploidy() == 1 => classify(
                &entry.risk_model,
                &[nucleotides[0], nucleotides[0]],
                &variant.reference_allele,
            ),
            _ => classify(&entry.risk_model, nucleotides, &variant.reference_allele),
        }
    }

    fn record(
        &self,
        result: &mut AnalysisResult,
        rsid: &str,
        entry: &KnowledgeBaseEntry,
        classification: Classification,
        genotype_display: &str,
        phased: bool,
    ) {
        *result
            .category_risk_scores
            .entry(entry.category.clone())
            .or_insert(0) += classification.status.ordinal();

        if classification.is_risk_positive() {
            result
                .recommendations
                .extend(entry.recommendations.iter().cloned());
        }

        result.evaluated_variants.push(EvaluatedVariant {
            rsid: rsid.to_string(),
            gene: entry.gene.clone(),
            category: entry.category.clone(),
            risk_level: classification.risk_level,
            status: classification.status,
            risk_allele_count: classification.risk_allele_count,
            genotype_display: genotype_display.to_string(),
            phased,
        });
    }
}

/// Cross-sample comparison of risk-positive rsids
pub struct SampleComparator;

impl Default for SampleComparator {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleComparator {
    pub fn new() -> Self {
        Self
    }

    /// Shared = risk-positive in every sample. With a single sample the shared
    /// set is empty and everything is unique to it.
    ///
    /// Repeated sample ids are suffixed `#2`, `#3`, ... in input order so each
    /// analysis keeps its own entry.
    pub fn compare(&self, analyses: &[AnalysisResult]) -> ComparisonResult {
        let risk_sets: Vec<BTreeSet<String>> = analyses
            .par_iter()
            .map(|analysis| analysis.risk_rsids())
            .collect();

        let shared_risk_rsids: BTreeSet<String> = if risk_sets.len() < 2 {
            BTreeSet::new()
        } else {
            risk_sets[0]
                .iter()
                .filter(|rsid| risk_sets[1..].iter().all(|set| set.contains(*rsid)))
                .cloned()
                .collect()
        };

        let sample_ids = distinct_sample_ids(analyses);
        let unique_risk_rsids: BTreeMap<String, BTreeSet<String>> = sample_ids
            .iter()
            .zip(&risk_sets)
            .map(|(sample_id, risk_set)| {
                let unique = risk_set.difference(&shared_risk_rsids).cloned().collect();
                (sample_id.clone(), unique)
            })
            .collect();

        ComparisonResult {
            sample_ids,
            shared_risk_rsids,
            unique_risk_rsids,
        }
    }
}

fn distinct_sample_ids(analyses: &[AnalysisResult]) -> Vec<String> {
    let mut taken: BTreeSet<String> = analyses.iter().map(|a| a.sample_id.clone()).collect();
    let mut seen = BTreeSet::new();

    analyses
        .iter()
        .map(|analysis| {
            let id = &analysis.sample_id;
            if seen.insert(id.clone()) {
                return id.clone();
            }

            let label = (2..)
                .map(|n| format!("{}#{}", id, n))
                .find(|candidate| !taken.contains(candidate))
                .unwrap_or_else(|| id.clone());
            warn!("Duplicate sample id {} compared as {}", id, label);
            taken.insert(label.clone());
            label
        })
        .collect()
}

/// Single-sample analysis without constructing an analyzer
pub fn analyze(variants: &[Variant], sample_id: &str, knowledge_base: &KnowledgeBase) -> AnalysisResult {
    SampleAnalyzer::new(knowledge_base).analyze(variants, sample_id)
}

pub fn compare(analyses: &[AnalysisResult]) -> ComparisonResult {
    SampleComparator::new().compare(analyses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::decode_genotype;

    fn knowledge_base() -> KnowledgeBase {
        KnowledgeBase::default()
            .with_entry(
                "rs1801133",
                KnowledgeBaseEntry::new(
                    "MTHFR",
                    HealthCategory::Detox,
                    RiskModel::genotype_table([
                        ("CC", RiskLevel::Low),
                        ("CT", RiskLevel::Moderate),
                        ("TT", RiskLevel::High),
                    ]),
                )
                .with_recommendations(["Consider methylfolate"]),
            )
            .with_entry(
                "rs4680",
                KnowledgeBaseEntry::new(
                    "COMT",
                    HealthCategory::BrainHealth,
                    RiskModel::risk_alleles(["A"]),
                )
                .with_recommendations(["Manage stress", "Consider magnesium"]),
            )
    }

    fn variant(rsid: Option<&str>, reference: &str, alts: &[&str], calls: &[(&str, &str)]) -> Variant {
        Variant {
            chromosome: "1".to_string(),
            position: 100,
            rsid: rsid.map(str::to_string),
            reference_allele: reference.to_string(),
            alternate_alleles: alts.iter().map(|a| a.to_string()).collect(),
            per_sample_genotype: calls
                .iter()
                .map(|(sample, gt)| (sample.to_string(), decode_genotype(gt).unwrap()))
                .collect(),
        }
    }

    #[test]
    fn test_table_entry_heterozygous() {
        let kb = knowledge_base();
        let variants = vec![variant(Some("rs1801133"), "C", &["T"], &[("s1", "0/1")])];

        let result = SampleAnalyzer::new(&kb).analyze(&variants, "s1");

        assert_eq!(result.evaluated_variants.len(), 1);
        let evaluated = &result.evaluated_variants[0];
        assert_eq!(evaluated.genotype_display, "CT");
        assert_eq!(evaluated.risk_level, RiskLevel::Moderate);
        assert_eq!(evaluated.status, RiskStatus::Carrier);
        assert!(!evaluated.phased);
        assert_eq!(result.category_risk_scores[&HealthCategory::Detox], 1);
        assert!(result.recommendations.contains("Consider methylfolate"));
    }

    #[test]
    fn test_unknown_rsids_only_counted() {
        let kb = knowledge_base();
        let variants = vec![
            variant(Some("rs999"), "A", &["G"], &[("s1", "1/1")]),
            variant(None, "A", &["G"], &[("s1", "0/1")]),
        ];

        let result = analyze(&variants, "s1", &kb);

        assert_eq!(result.total_variants_seen, 2);
        assert_eq!(result.unknown_rsid_count, 2);
        assert!(result.evaluated_variants.is_empty());
        assert!(result.category_risk_scores.is_empty());
        assert!(result.recommendations.is_empty());
    }

    #[test]
    fn test_no_call_not_evaluated() {
        let kb = knowledge_base();
        let variants = vec![variant(Some("rs4680"), "G", &["A"], &[("s1", "./.")])];

        let result = analyze(&variants, "s1", &kb);

        assert_eq!(result.total_variants_seen, 1);
        assert_eq!(result.no_call_count, 1);
        assert!(result.evaluated_variants.is_empty());
    }

    #[test]
    fn test_out_of_range_alleles_are_skipped() {
        let kb = knowledge_base();
        let variants = vec![variant(Some("rs4680"), "G", &["A"], &[("s1", "1/3")])];

        let result = analyze(&variants, "s1", &kb);

        assert_eq!(result.skipped_alleles, 1);
        let evaluated = &result.evaluated_variants[0];
        assert_eq!(evaluated.genotype_display, "A");
        assert_eq!(evaluated.status, RiskStatus::Carrier);
    }

    #[test]
    fn test_haploid_call_reads_as_homozygous_for_tables() {
        let kb = knowledge_base();
        let variants = vec![variant(Some("rs1801133"), "C", &["T"], &[("s1", "1")])];

        let result = analyze(&variants, "s1", &kb);

        assert_eq!(result.evaluated_variants[0].risk_level, RiskLevel::High);
        assert_eq!(result.evaluated_variants[0].genotype_display, "T");
    }

    #[test]
    fn test_normal_calls_still_score_their_category() {
        let kb = knowledge_base();
        let variants = vec![variant(Some("rs4680"), "G", &["A"], &[("s1", "0/0")])];

        let result = analyze(&variants, "s1", &kb);

        assert_eq!(result.category_risk_scores[&HealthCategory::BrainHealth], 0);
        assert!(result.recommendations.is_empty());
    }

    #[test]
    fn test_recommendations_deduplicated() {
        let kb = KnowledgeBase::default()
            .with_entry(
                "rs1",
                KnowledgeBaseEntry::new("A", HealthCategory::Longevity, RiskModel::risk_alleles(["T"]))
                    .with_recommendations(["Exercise"]),
            )
            .with_entry(
                "rs2",
                KnowledgeBaseEntry::new("B", HealthCategory::Longevity, RiskModel::risk_alleles(["G"]))
                    .with_recommendations(["Exercise", "Sleep"]),
            );
        let variants = vec![
            variant(Some("rs1"), "C", &["T"], &[("s1", "1/1")]),
            variant(Some("rs2"), "A", &["G"], &[("s1", "0/1")]),
        ];

        let result = analyze(&variants, "s1", &kb);

        assert_eq!(result.recommendations.len(), 2);
        assert_eq!(result.category_risk_scores[&HealthCategory::Longevity], 3);
    }

    #[test]
    fn test_analyze_all_preserves_sample_order() {
        let kb = knowledge_base();
        let variants = vec![variant(
            Some("rs4680"),
            "G",
            &["A"],
            &[("alice", "0|1"), ("bob", "1|1"), ("carol", "0|0")],
        )];
        let samples: Vec<String> = ["alice", "bob", "carol"].iter().map(|s| s.to_string()).collect();

        let results = SampleAnalyzer::new(&kb).analyze_all(&variants, &samples);

        let ids: Vec<&str> = results.iter().map(|r| r.sample_id.as_str()).collect();
        assert_eq!(ids, vec!["alice", "bob", "carol"]);
        assert_eq!(results[1].evaluated_variants[0].status, RiskStatus::AtRisk);
    }

    #[test]
    fn test_compare_shared_and_unique() {
        let kb = knowledge_base();
        let variants = vec![
            variant(Some("rs4680"), "G", &["A"], &[("alice", "0|1"), ("bob", "1|1")]),
            variant(Some("rs1801133"), "C", &["T"], &[("alice", "0|0"), ("bob", "1|1")]),
        ];
        let analyzer = SampleAnalyzer::new(&kb);
        let analyses = vec![analyzer.analyze(&variants, "alice"), analyzer.analyze(&variants, "bob")];

        let comparison = SampleComparator::new().compare(&analyses);

        assert_eq!(comparison.sample_ids, vec!["alice".to_string(), "bob".to_string()]);
        assert_eq!(comparison.shared_risk_rsids, BTreeSet::from(["rs4680".to_string()]));
        assert!(comparison.unique_risk_rsids["alice"].is_empty());
        assert_eq!(
            comparison.unique_risk_rsids["bob"],
            BTreeSet::from(["rs1801133".to_string()])
        );
    }

    #[test]
    fn test_compare_single_and_empty() {
        let kb = knowledge_base();
        let variants = vec![variant(Some("rs4680"), "G", &["A"], &[("alice", "1/1")])];
        let single = compare(&[analyze(&variants, "alice", &kb)]);

        assert!(single.shared_risk_rsids.is_empty());
        assert_eq!(
            single.unique_risk_rsids["alice"],
            BTreeSet::from(["rs4680".to_string()])
        );

        let empty = compare(&[]);
        assert!(empty.sample_ids.is_empty());
        assert!(empty.shared_risk_rsids.is_empty());
        assert!(empty.unique_risk_rsids.is_empty());
    }

    #[test]
    fn test_compare_keeps_samples_with_the_same_id() {
        let kb = knowledge_base();
        let first = vec![
            variant(Some("rs1801133"), "C", &["T"], &[("sample", "1/1")]),
            variant(Some("rs4680"), "G", &["A"], &[("sample", "0/0")]),
        ];
        let second = vec![
            variant(Some("rs1801133"), "C", &["T"], &[("sample", "0/0")]),
            variant(Some("rs4680"), "G", &["A"], &[("sample", "1/1")]),
        ];
        let analyses = vec![analyze(&first, "sample", &kb), analyze(&second, "sample", &kb)];

        let comparison = compare(&analyses);

        assert_eq!(
            comparison.sample_ids,
            vec!["sample".to_string(), "sample#2".to_string()]
        );
        assert_eq!(comparison.unique_risk_rsids.len(), 2);
        assert_eq!(
            comparison.unique_risk_rsids["sample"],
            BTreeSet::from(["rs1801133".to_string()])
        );
        assert_eq!(
            comparison.unique_risk_rsids["sample#2"],
            BTreeSet::from(["rs4680".to_string()])
        );
        assert!(comparison.shared_risk_rsids.is_empty());
    }

    #[test]
    fn test_duplicate_labels_avoid_existing_ids() {
        let analyses: Vec<AnalysisResult> = ["a", "a#2", "a"]
            .iter()
            .map(|id| AnalysisResult::new(*id, None))
            .collect();

        assert_eq!(
            distinct_sample_ids(&analyses),
            vec!["a".to_string(), "a#2".to_string(), "a#3".to_string()]
        );
    }
}
