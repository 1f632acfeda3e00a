use std::collections::BTreeMap;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::parsers::{normalize_chromosome, ParsedGeneticData};
use crate::types::*;

/// 23andMe parser for raw DNA data files.
///
/// These files carry no REF/ALT columns, so each record stores the alleles it
/// observed: the first distinct nucleotide becomes the reference and any other
/// becomes an alternate. Indices in the genotype point into that list.
pub struct TwentyThreeAndMeParser {
    sample_name: String,
    no_call_markers: Vec<String>,
}

impl Default for TwentyThreeAndMeParser {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl TwentyThreeAndMeParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            sample_name: config.default_sample_name.clone(),
            no_call_markers: config.no_call_markers.clone(),
        }
    }

    pub fn with_sample_name(mut self, name: impl Into<String>) -> Self {
        self.sample_name = name.into();
        self
    }

    pub fn parse_text(&self, content: &str) -> Result<ParsedGeneticData, EngineError> {
        let mut data = ParsedGeneticData::new(
            FileFormat::TwentyThreeAndMe,
            vec![self.sample_name.clone()],
        );

        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            data.data_lines += 1;
            match self.parse_data_line(line, idx + 1) {
                Ok(Some(variant)) => data.add_variant(variant),
                Ok(None) => data.skipped_lines += 1,
                Err(e) => data.record_skip(idx + 1, &e),
            }
        }

        Ok(data)
    }

    /// `Ok(None)` means the line is valid but carries nothing to keep:
    /// a no-call or an internal (non-`rs`) identifier.
    pub fn parse_data_line(
        &self,
        line: &str,
        line_number: usize,
    ) -> Result<Option<Variant>, EngineError> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 4 {
            return Err(EngineError::InsufficientColumns {
                line: line_number,
                found: parts.len(),
                expected: 4,
            });
        }

        let rsid = parts[0];
        let genotype_str = parts[3];
        if !rsid.starts_with("rs") || self.is_no_call(genotype_str) {
            return Ok(None);
        }

        let position: u64 = parts[2]
            .parse()
            .map_err(|_| EngineError::InvalidPosition {
                line: line_number,
                value: parts[2].to_string(),
            })?;

        let Some((reference_allele, alternate_alleles, genotype)) =
            observed_alleles(genotype_str)?
        else {
            return Ok(None);
        };

        let mut per_sample_genotype = BTreeMap::new();
        per_sample_genotype.insert(self.sample_name.clone(), genotype);

        Ok(Some(Variant {
            chromosome: normalize_chromosome(parts[1]),
            position,
            rsid: Some(rsid.to_string()),
            reference_allele,
            alternate_alleles,
            per_sample_genotype,
        }))
    }

    fn is_no_call(&self, genotype: &str) -> bool {
        self.no_call_markers.iter().any(|marker| marker == genotype)
    }
}

/// Split a nucleotide genotype such as `AG` into (reference, alternates, genotype).
/// `-` positions are missing; `None` when nothing was observed.
fn observed_alleles(
    genotype: &str,
) -> Result<Option<(String, Vec<String>, Genotype)>, EngineError> {
    let mut reference: Option<String> = None;
    let mut alternates: Vec<String> = Vec::new();
    let mut indices = Vec::with_capacity(genotype.len());

    for ch in genotype.chars() {
        if ch == '-' {
            indices.push(AlleleIndex::Missing);
            continue;
        }
        if !ch.is_ascii_alphabetic() {
            return Err(EngineError::MalformedGenotype(genotype.to_string()));
        }

        let allele = ch.to_ascii_uppercase().to_string();
        let index = if reference.as_deref() == Some(allele.as_str()) {
            0
        } else if let Some(pos) = alternates.iter().position(|alt| *alt == allele) {
            pos + 1
        } else if reference.is_none() {
            reference = Some(allele);
            0
        } else {
            alternates.push(allele);
            alternates.len()
        };
        indices.push(AlleleIndex::Called(index as u32));
    }

    Ok(reference.map(|reference| (reference, alternates, Genotype::new(indices, false))))
}

impl super::GeneticDataParser for TwentyThreeAndMeParser {
    fn format(&self) -> FileFormat {
        FileFormat::TwentyThreeAndMe
    }

    fn parse_text(&self, content: &str) -> Result<ParsedGeneticData, EngineError> {
        self.parse_text(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::resolve_genotype;

    const SAMPLE: &str = "\
# This data file generated by 23andMe
# rsid\tchromosome\tposition\tgenotype
rs4680\t22\t19951271\tAG
rs1801133\t1\t11856378\tTT
i3000001\t1\t100\tAA
rs999\t1\t200\t--
rs12345\tMT\t300\tA
rs555\t2\tnot_a_number\tCC
";

    #[test]
    fn test_parse_sample_file() {
        let data = TwentyThreeAndMeParser::new().parse_text(SAMPLE).unwrap();

        assert_eq!(data.format, FileFormat::TwentyThreeAndMe);
        assert_eq!(data.samples, vec!["sample".to_string()]);
        assert_eq!(data.len(), 3);
        assert_eq!(data.data_lines, 6);
        assert_eq!(data.skipped_lines, 3);
    }

    #[test]
    fn test_observed_alleles_heterozygous() {
        let data = TwentyThreeAndMeParser::new().parse_text(SAMPLE).unwrap();
        let variant = data.get_variant("rs4680").unwrap();

        assert_eq!(variant.reference_allele, "A");
        assert_eq!(variant.alternate_alleles, vec!["G".to_string()]);
        let genotype = variant.genotype_for("sample").unwrap();
        assert!(!genotype.phased);

        let resolved = resolve_genotype(
            genotype,
            &variant.reference_allele,
            &variant.alternate_alleles,
        );
        assert_eq!(resolved.display(), "AG");
    }

    #[test]
    fn test_observed_alleles_homozygous_and_haploid() {
        let data = TwentyThreeAndMeParser::new().parse_text(SAMPLE).unwrap();

        let hom = data.get_variant("rs1801133").unwrap();
        assert_eq!(hom.reference_allele, "T");
        assert!(hom.alternate_alleles.is_empty());
        assert_eq!(
            hom.genotype_for("sample").unwrap().allele_indices,
            vec![AlleleIndex::Called(0), AlleleIndex::Called(0)]
        );

        let haploid = data.get_variant("rs12345").unwrap();
        assert_eq!(haploid.chromosome, "MT");
        assert_eq!(haploid.genotype_for("sample").unwrap().ploidy(), 1);
    }

    #[test]
    fn test_custom_sample_name() {
        let data = TwentyThreeAndMeParser::new()
            .with_sample_name("alice")
            .parse_text("rs4680\t22\t19951271\tGG\n")
            .unwrap();
        assert_eq!(data.samples, vec!["alice".to_string()]);
        assert!(data.variants[0].genotype_for("alice").is_some());
    }

    #[test]
    fn test_no_call_markers_from_config() {
        let config = EngineConfig {
            no_call_markers: vec!["NN".to_string()],
            ..EngineConfig::default()
        };
        let parser = TwentyThreeAndMeParser::from_config(&config);

        assert!(parser.is_no_call("NN"));
        assert!(!parser.is_no_call("--"));
        assert!(matches!(parser.parse_data_line("rs1\t1\t100\tNN", 1), Ok(None)));
        assert!(matches!(
            TwentyThreeAndMeParser::new().parse_data_line("rs1\t1\t100\t00", 1),
            Ok(None)
        ));
    }

    #[test]
    fn test_short_line_is_an_error() {
        let parser = TwentyThreeAndMeParser::new();
        assert!(matches!(
            parser.parse_data_line("rs1\t1\t100", 7),
            Err(EngineError::InsufficientColumns {
                line: 7,
                found: 3,
                expected: 4
            })
        ));
    }

    #[test]
    fn test_non_nucleotide_genotype_is_malformed() {
        let parser = TwentyThreeAndMeParser::new();
        assert!(matches!(
            parser.parse_data_line("rs1\t1\t100\tA1", 1),
            Err(EngineError::MalformedGenotype(_))
        ));
    }

    #[test]
    fn test_space_separated_columns() {
        let data = TwentyThreeAndMeParser::new()
            .parse_text("rs4680 22 19951271 ag\n")
            .unwrap();
        assert_eq!(data.variants[0].reference_allele, "A");
        assert_eq!(data.variants[0].alternate_alleles, vec!["G".to_string()]);
    }
}
