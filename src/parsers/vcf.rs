use std::collections::BTreeMap;
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::parsers::{decode_genotype, normalize_chromosome, ParsedGeneticData};
use crate::types::*;

const MIN_COLUMNS: usize = 8;
const FIRST_SAMPLE_COLUMN: usize = 9;

/// VCF parser for Variant Call Format files, any number of samples
pub struct VcfParser {
    genotype_tag: String,
}

impl Default for VcfParser {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl VcfParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            genotype_tag: config.genotype_tag.clone(),
        }
    }

    pub fn parse_text(&self, content: &str) -> Result<ParsedGeneticData, EngineError> {
        let mut data = ParsedGeneticData::new(FileFormat::Vcf, Vec::new());

        for (idx, line) in content.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }

            if line.starts_with('#') {
                self.parse_header_line(line, &mut data);
                continue;
            }

            data.data_lines += 1;
            match self.parse_variant_line(line, idx + 1, &data.samples) {
                Ok(variant) => data.add_variant(variant),
                Err(e) => data.record_skip(idx + 1, &e),
            }
        }

        Ok(data)
    }

    fn parse_header_line(&self, line: &str, data: &mut ParsedGeneticData) {
        if let Some(reference) = line.strip_prefix("##reference=") {
            data.genome_build = Some(reference.trim().to_string());
        } else if line.starts_with("#CHROM") {
            data.samples = line
                .split('\t')
                .skip(FIRST_SAMPLE_COLUMN)
                .map(|name| name.trim().to_string())
                .collect();
            debug!("VCF header declares {} sample(s)", data.samples.len());
        }
    }

    pub fn parse_variant_line(
        &self,
        line: &str,
        line_number: usize,
        samples: &[String],
    ) -> Result<Variant, EngineError> {
        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() < MIN_COLUMNS {
            return Err(EngineError::InsufficientColumns {
                line: line_number,
                found: parts.len(),
                expected: MIN_COLUMNS,
            });
        }

        let position: u64 = parts[1]
            .trim()
            .parse()
            .map_err(|_| EngineError::InvalidPosition {
                line: line_number,
                value: parts[1].to_string(),
            })?;

        let reference = parts[3].trim();
        if reference.is_empty() || reference == "." {
            return Err(EngineError::InvalidRecord {
                line: line_number,
                details: "missing REF allele".to_string(),
            });
        }

        let alternate_alleles = parse_alternates(parts[4]).ok_or_else(|| {
            EngineError::InvalidRecord {
                line: line_number,
                details: format!("empty entry in ALT list '{}'", parts[4]),
            }
        })?;

        let mut per_sample_genotype = BTreeMap::new();
        if parts.len() > FIRST_SAMPLE_COLUMN {
            let gt_index = parts[8]
                .split(':')
                .position(|key| key == self.genotype_tag);

            for (sample, cell) in samples.iter().zip(&parts[FIRST_SAMPLE_COLUMN..]) {
                let genotype = self.sample_genotype(cell, gt_index, line_number);
                per_sample_genotype.insert(sample.clone(), genotype);
            }
        }

        Ok(Variant {
            chromosome: normalize_chromosome(parts[0]),
            position,
            rsid: extract_rsid(parts[2]),
            reference_allele: reference.to_string(),
            alternate_alleles,
            per_sample_genotype,
        })
    }

    /// Missing GT keys and undecodable cells both become a fully missing call.
    fn sample_genotype(&self, cell: &str, gt_index: Option<usize>, line_number: usize) -> Genotype {
        let token = gt_index.and_then(|index| cell.split(':').nth(index));
        match token {
            Some(token) => decode_genotype(token).unwrap_or_else(|e| {
                debug!("Line {}: {}", line_number, e);
                Genotype::missing(2)
            }),
            None => Genotype::missing(2),
        }
    }
}

/// `.` means no alternates. `None` if the list has an empty entry.
fn parse_alternates(field: &str) -> Option<Vec<String>> {
    let field = field.trim();
    if field.is_empty() || field == "." {
        return Some(Vec::new());
    }

    field
        .split(',')
        .map(|allele| {
            let allele = allele.trim();
            (!allele.is_empty()).then(|| allele.to_string())
        })
        .collect()
}

/// First `rs` identifier of a `;`-separated ID column
fn extract_rsid(field: &str) -> Option<String> {
    field
        .split(';')
        .map(str::trim)
        .find(|id| is_valid_rsid(id))
        .map(str::to_string)
}

impl super::GeneticDataParser for VcfParser {
    fn format(&self) -> FileFormat {
        FileFormat::Vcf
    }

    fn parse_text(&self, content: &str) -> Result<ParsedGeneticData, EngineError> {
        self.parse_text(content)
    }
}
