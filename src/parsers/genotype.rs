use crate::error::EngineError;
use crate::types::{AlleleIndex, Genotype};

/// Nucleotide text behind an allele index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedAllele<'a> {
    Nucleotides(&'a str),
    Missing,
}

impl<'a> ResolvedAllele<'a> {
    pub fn as_str(&self) -> &'a str {
        match self {
            ResolvedAllele::Nucleotides(allele) => *allele,
            ResolvedAllele::Missing => ".",
        }
    }
}

/// Decode a VCF GT token such as `0/1`, `1|1`, `./.` or a haploid `1`.
///
/// `|` marks the call as phased, `/` as unphased. A token with no separator
/// is a haploid call.
pub fn decode_genotype(token: &str) -> Result<Genotype, EngineError> {
    let token = token.trim();

    let (components, phased): (Vec<&str>, bool) = if token.contains('|') {
        (token.split('|').collect(), true)
    } else if token.contains('/') {
        (token.split('/').collect(), false)
    } else {
        (vec![token], false)
    };

    let allele_indices = components
        .into_iter()
        .map(|component| parse_allele_index(component, token))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Genotype::new(allele_indices, phased))
}

fn parse_allele_index(component: &str, token: &str) -> Result<AlleleIndex, EngineError> {
    if component == "." {
        return Ok(AlleleIndex::Missing);
    }

    if component.is_empty() || !component.bytes().all(|b| b.is_ascii_digit()) {
        return Err(EngineError::MalformedGenotype(token.to_string()));
    }

    component
        .parse::<u32>()
        .map(AlleleIndex::Called)
        .map_err(|_| EngineError::MalformedGenotype(token.to_string()))
}

/// Map an allele index onto REF (index 0) or ALT[index - 1]
pub fn resolve_allele<'a>(
    index: AlleleIndex,
    reference: &'a str,
    alternates: &'a [String],
) -> Result<ResolvedAllele<'a>, EngineError> {
    match index {
        AlleleIndex::Missing => Ok(ResolvedAllele::Missing),
        AlleleIndex::Called(0) => Ok(ResolvedAllele::Nucleotides(reference)),
        AlleleIndex::Called(i) => alternates
            .get(i as usize - 1)
            .map(|allele| ResolvedAllele::Nucleotides(allele.as_str()))
            .ok_or(EngineError::AlleleIndexOutOfRange {
                index: i,
                alternates: alternates.len(),
            }),
    }
}

/// All alleles of a genotype call, resolved against one variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedGenotype<'a> {
    pub calls: Vec<ResolvedAllele<'a>>,
    /// Indices that pointed past the ALT list
    pub skipped: usize,
    pub phased: bool,
}

impl<'a> ResolvedGenotype<'a> {
    pub fn nucleotides(&self) -> Vec<&'a str> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                ResolvedAllele::Nucleotides(allele) => Some(*allele),
                ResolvedAllele::Missing => None,
            })
            .collect()
    }

    pub fn is_no_call(&self) -> bool {
        self.nucleotides().is_empty()
    }

    pub fn display(&self) -> String {
        self.calls.iter().map(|call| call.as_str()).collect()
    }
}

/// Resolve every index of `genotype`; out-of-range indices are counted and dropped.
pub fn resolve_genotype<'a>(
    genotype: &Genotype,
    reference: &'a str,
    alternates: &'a [String],
) -> ResolvedGenotype<'a> {
    let mut calls = Vec::with_capacity(genotype.ploidy());
    let mut skipped = 0;

    for index in &genotype.allele_indices {
        match resolve_allele(*index, reference, alternates) {
            Ok(call) => calls.push(call),
            Err(e) => {
                tracing::debug!("Skipping allele: {}", e);
                skipped += 1;
            }
        }
    }

    ResolvedGenotype {
        calls,
        skipped,
        phased: genotype.phased,
    }
}
