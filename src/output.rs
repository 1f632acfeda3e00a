use anyhow::{Context, Result};
use chrono::Local;
use csv::WriterBuilder;
use serde::Serialize;
use serde_json::to_string_pretty;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::engine::FileAnalysis;
use crate::types::*;

/// Supported report formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Csv,
    Json,
    Tsv,
    All,
}

#[derive(Serialize)]
struct BatchReport<'a> {
    generated_at: String,
    files: &'a [FileAnalysis],
    #[serde(skip_serializing_if = "Option::is_none")]
    comparison: Option<&'a ComparisonResult>,
}

/// Report generator for analysis results
pub struct ReportGenerator {
    output_dir: PathBuf,
}

impl ReportGenerator {
    pub fn new(output_dir: &Path) -> Result<Self> {
        fs::create_dir_all(output_dir).with_context(|| {
            format!("Failed to create output directory {}", output_dir.display())
        })?;

        Ok(Self {
            output_dir: output_dir.to_path_buf(),
        })
    }

    /// Generate reports in the requested format(s), returning the written paths
    pub fn generate(
        &self,
        files: &[FileAnalysis],
        comparison: Option<&ComparisonResult>,
        format: ReportFormat,
    ) -> Result<Vec<PathBuf>> {
        let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
        let mut written = Vec::new();

        if matches!(format, ReportFormat::Json | ReportFormat::All) {
            written.push(self.generate_json_report(files, comparison, &timestamp)?);
        }
        if matches!(format, ReportFormat::Csv | ReportFormat::All) {
            written.extend(self.generate_delimited_reports(files, comparison, b',', "csv", &timestamp)?);
        }
        if matches!(format, ReportFormat::Tsv | ReportFormat::All) {
            written.extend(self.generate_delimited_reports(files, comparison, b'\t', "tsv", &timestamp)?);
        }

        info!("Wrote {} report file(s) to {}", written.len(), self.output_dir.display());
        Ok(written)
    }

    fn generate_json_report(
        &self,
        files: &[FileAnalysis],
        comparison: Option<&ComparisonResult>,
        timestamp: &str,
    ) -> Result<PathBuf> {
        let path = self.output_dir.join(format!("report_{}.json", timestamp));
        let report = BatchReport {
            generated_at: Local::now().to_rfc3339(),
            files,
            comparison,
        };

        let json_content =
            to_string_pretty(&report).with_context(|| "Failed to serialize results to JSON")?;
        fs::write(&path, json_content)
            .with_context(|| format!("Failed to write JSON report to {}", path.display()))?;

        Ok(path)
    }

    fn generate_delimited_reports(
        &self,
        files: &[FileAnalysis],
        comparison: Option<&ComparisonResult>,
        delimiter: u8,
        extension: &str,
        timestamp: &str,
    ) -> Result<Vec<PathBuf>> {
        let mut written = vec![
            self.write_variants(files, delimiter, extension, timestamp)?,
            self.write_category_scores(files, delimiter, extension, timestamp)?,
            self.write_protocols(files, delimiter, extension, timestamp)?,
        ];
        if let Some(comparison) = comparison {
            written.push(self.write_comparison(comparison, delimiter, extension, timestamp)?);
        }
        Ok(written)
    }

    fn write_variants(
        &self,
        files: &[FileAnalysis],
        delimiter: u8,
        extension: &str,
        timestamp: &str,
    ) -> Result<PathBuf> {
        let path = self
            .output_dir
            .join(format!("variants_{}.{}", timestamp, extension));
        let mut wtr = WriterBuilder::new()
            .delimiter(delimiter)
            .from_path(&path)
            .with_context(|| format!("Failed to create writer for {}", path.display()))?;

        wtr.write_record([
            "source",
            "sample_id",
            "rsid",
            "gene",
            "category",
            "genotype",
            "phased",
            "risk_level",
            "status",
            "risk_allele_count",
        ])?;

        for file in files {
            let source = file.source.as_deref().unwrap_or("-");
            for analysis in &file.analyses {
                for variant in &analysis.evaluated_variants {
                    wtr.write_record([
                        source,
                        analysis.sample_id.as_str(),
                        variant.rsid.as_str(),
                        variant.gene.as_str(),
                        variant.category.as_str(),
                        variant.genotype_display.as_str(),
                        variant.phased.to_string().as_str(),
                        variant.risk_level.as_str(),
                        variant.status.as_str(),
                        variant.risk_allele_count.to_string().as_str(),
                    ])?;
                }
            }
        }

        wtr.flush()?;
        Ok(path)
    }

    fn write_category_scores(
        &self,
        files: &[FileAnalysis],
        delimiter: u8,
        extension: &str,
        timestamp: &str,
    ) -> Result<PathBuf> {
        let path = self
            .output_dir
            .join(format!("category_scores_{}.{}", timestamp, extension));
        let mut wtr = WriterBuilder::new()
            .delimiter(delimiter)
            .from_path(&path)
            .with_context(|| format!("Failed to create writer for {}", path.display()))?;

        wtr.write_record(["source", "sample_id", "category", "score"])?;
        for file in files {
            let source = file.source.as_deref().unwrap_or("-");
            for analysis in &file.analyses {
                for (category, score) in &analysis.category_risk_scores {
                    wtr.write_record([
                        source,
                        analysis.sample_id.as_str(),
                        category.as_str(),
                        score.to_string().as_str(),
                    ])?;
                }
            }
        }

        wtr.flush()?;
        Ok(path)
    }

    /// One row per bucketed recommendation; a protocol without any still gets a row
    fn write_protocols(
        &self,
        files: &[FileAnalysis],
        delimiter: u8,
        extension: &str,
        timestamp: &str,
    ) -> Result<PathBuf> {
        let path = self
            .output_dir
            .join(format!("protocols_{}.{}", timestamp, extension));
        let mut wtr = WriterBuilder::new()
            .delimiter(delimiter)
            .from_path(&path)
            .with_context(|| format!("Failed to create writer for {}", path.display()))?;

        wtr.write_record(["source", "sample_id", "category", "priority", "kind", "recommendation"])?;
        for file in files {
            let source = file.source.as_deref().unwrap_or("-");
            for (sample_id, protocols) in &file.protocols {
                for protocol in protocols {
                    let buckets = [
                        ("supplement", &protocol.supplements),
                        ("dietary", &protocol.dietary_advice),
                        ("lifestyle", &protocol.lifestyle_changes),
                    ];
                    let rows: Vec<(&str, &str)> = buckets
                        .iter()
                        .flat_map(|(kind, items)| items.iter().map(move |item| (*kind, item.as_str())))
                        .collect();

                    if rows.is_empty() {
                        wtr.write_record([
                            source,
                            sample_id.as_str(),
                            protocol.category.as_str(),
                            protocol.priority.as_str(),
                            "",
                            "",
                        ])?;
                    }
                    for (kind, recommendation) in rows {
                        wtr.write_record([
                            source,
                            sample_id.as_str(),
                            protocol.category.as_str(),
                            protocol.priority.as_str(),
                            kind,
                            recommendation,
                        ])?;
                    }
                }
            }
        }

        wtr.flush()?;
        Ok(path)
    }

    fn write_comparison(
        &self,
        comparison: &ComparisonResult,
        delimiter: u8,
        extension: &str,
        timestamp: &str,
    ) -> Result<PathBuf> {
        let path = self
            .output_dir
            .join(format!("comparison_{}.{}", timestamp, extension));
        let mut wtr = WriterBuilder::new()
            .delimiter(delimiter)
            .from_path(&path)
            .with_context(|| format!("Failed to create writer for {}", path.display()))?;

        wtr.write_record(["rsid", "scope", "sample_id"])?;
        for rsid in &comparison.shared_risk_rsids {
            wtr.write_record([rsid.as_str(), "shared", ""])?;
        }
        for (sample_id, rsids) in &comparison.unique_risk_rsids {
            for rsid in rsids {
                wtr.write_record([rsid.as_str(), "unique", sample_id.as_str()])?;
            }
        }

        wtr.flush()?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CategoryProtocol, ProtocolPriority};
    use std::collections::{BTreeMap, BTreeSet};
    use tempfile::TempDir;

    fn sample_batch() -> Vec<FileAnalysis> {
        let mut analysis = AnalysisResult::new("alice", Some("1.0".to_string()));
        analysis.evaluated_variants.push(EvaluatedVariant {
            rsid: "rs4680".to_string(),
            gene: "COMT".to_string(),
            category: HealthCategory::BrainHealth,
            risk_level: RiskLevel::Moderate,
            status: RiskStatus::Carrier,
            risk_allele_count: 1,
            genotype_display: "GA".to_string(),
            phased: true,
        });
        analysis
            .category_risk_scores
            .insert(HealthCategory::BrainHealth, 1);

        let protocol = CategoryProtocol {
            category: HealthCategory::BrainHealth,
            priority: ProtocolPriority::Low,
            genes: BTreeSet::from(["COMT".to_string()]),
            variant_count: 1,
            high_risk_count: 0,
            recommendations: BTreeSet::from(["Manage stress".to_string()]),
            supplements: Vec::new(),
            dietary_advice: Vec::new(),
            lifestyle_changes: vec!["Manage stress".to_string()],
        };

        vec![FileAnalysis {
            format: FileFormat::Vcf,
            samples: vec!["alice".to_string()],
            total_records: 1,
            analyses: vec![analysis],
            protocols: BTreeMap::from([("alice".to_string(), vec![protocol])]),
            ..Default::default()
        }
        .with_source("family.vcf")]
    }

    #[test]
    fn test_json_report() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let generator = ReportGenerator::new(temp_dir.path())?;

        let written = generator.generate(&sample_batch(), None, ReportFormat::Json)?;
        assert_eq!(written.len(), 1);

        let content = fs::read_to_string(&written[0])?;
        let value: serde_json::Value = serde_json::from_str(&content)?;
        assert_eq!(value["files"][0]["source"], "family.vcf");
        assert_eq!(value["files"][0]["analyses"][0]["category_risk_scores"]["brain_health"], 1);
        assert!(value.get("comparison").is_none());
        assert_eq!(value["files"][0]["protocols"]["alice"][0]["priority"], "low");
        Ok(())
    }

    #[test]
    fn test_tsv_reports_with_comparison() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let generator = ReportGenerator::new(&temp_dir.path().join("out"))?;

        let comparison = ComparisonResult {
            sample_ids: vec!["alice".to_string(), "bob".to_string()],
            shared_risk_rsids: BTreeSet::from(["rs4680".to_string()]),
            unique_risk_rsids: BTreeMap::from([
                ("alice".to_string(), BTreeSet::new()),
                ("bob".to_string(), BTreeSet::from(["rs1801133".to_string()])),
            ]),
        };

        let written = generator.generate(&sample_batch(), Some(&comparison), ReportFormat::Tsv)?;
        assert_eq!(written.len(), 4);

        let variants = fs::read_to_string(&written[0])?;
        let mut lines = variants.lines();
        assert!(lines.next().unwrap_or_default().starts_with("source\tsample_id\trsid"));
        assert_eq!(
            lines.next(),
            Some("family.vcf\talice\trs4680\tCOMT\tbrain_health\tGA\ttrue\tmoderate\tcarrier\t1")
        );

        let protocol_rows = fs::read_to_string(&written[2])?;
        assert!(protocol_rows.contains("family.vcf\talice\tbrain_health\tlow\tlifestyle\tManage stress"));

        let comparison_rows = fs::read_to_string(&written[3])?;
        assert!(comparison_rows.contains("rs4680\tshared\t"));
        assert!(comparison_rows.contains("rs1801133\tunique\tbob"));
        Ok(())
    }

    #[test]
    fn test_all_formats() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let generator = ReportGenerator::new(temp_dir.path())?;

        let written = generator.generate(&sample_batch(), None, ReportFormat::All)?;
        assert_eq!(written.len(), 7);
        assert!(written.iter().all(|path| path.exists()));
        Ok(())
    }
}
