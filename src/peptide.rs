//! Locating peptides inside their candidate parent proteins.

use crate::intervals::Interval;
use crate::modifications::{ModificationSite, parse_filtered_tag, strip_isobaric_labels};
use crate::sequence_store::SequenceStore;
use std::fmt;

const MODIFICATION_DELIMITER: &str = "__";

/// A report peptide split into its residues and its modification tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeptideRecord {
    pub raw_peptide: String,
    /// Tag after `__` with isobaric label segments removed.
    pub mod_tag: String,
    pub modifications: Vec<ModificationSite>,
}

impl PeptideRecord {
    pub fn parse(input: &str) -> Self {
        let mut parts = input.split(MODIFICATION_DELIMITER);
        let raw_peptide = parts.next().unwrap_or_default().trim().to_string();
        let tag = parts.next().unwrap_or_default();
        let mod_tag = strip_isobaric_labels(tag);
        let modifications = parse_filtered_tag(&mod_tag);
        Self {
            raw_peptide,
            mod_tag,
            modifications,
        }
    }
}

/// Where a peptide sits within one candidate protein, 1-based inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occurrence {
    Found { start: usize, end: usize },
    SequenceUnavailable,
    NotFound,
}

impl Occurrence {
    pub fn interval(&self) -> Option<Interval> {
        match self {
            Self::Found { start, end } => Some((*start, *end)),
            Self::SequenceUnavailable | Self::NotFound => None,
        }
    }
}

impl fmt::Display for Occurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Found { start, end } => write!(f, "{start}-{end}"),
            Self::SequenceUnavailable => f.write_str("0-0"),
            Self::NotFound => f.write_str("NA"),
        }
    }
}

/// First exact, case-sensitive match of `peptide` within `sequence`.
pub fn locate(peptide: &str, sequence: Option<&str>) -> Occurrence {
    let Some(sequence) = sequence.filter(|value| !value.is_empty()) else {
        return Occurrence::SequenceUnavailable;
    };
    if peptide.is_empty() {
        return Occurrence::NotFound;
    }
    match sequence.find(peptide) {
        Some(index) => Occurrence::Found {
            start: index + 1,
            end: index + peptide.len(),
        },
        None => Occurrence::NotFound,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProteinHit {
    pub protein_id: String,
    pub occurrence: Occurrence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModificationOccurrence {
    pub residue: char,
    pub position: usize,
}

impl fmt::Display for ModificationOccurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.residue, self.position)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Resolution {
    /// One hit per candidate protein, in candidate order.
    pub hits: Vec<ProteinHit>,
    pub modifications: Vec<ModificationOccurrence>,
}

/// Splits a `;`-separated protein cell, trimming whitespace around ids.
pub fn split_candidates(cell: &str) -> Vec<String> {
    cell.split(';')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn resolve(record: &PeptideRecord, candidates: &[String], store: &SequenceStore) -> Resolution {
    let hits = candidates
        .iter()
        .map(|protein_id| ProteinHit {
            protein_id: protein_id.clone(),
            occurrence: locate(
                &record.raw_peptide,
                store.get(protein_id).map(|sequence| sequence.residues.as_str()),
            ),
        })
        .collect::<Vec<_>>();

    let modifications = hits
        .iter()
        .filter_map(|hit| hit.occurrence.interval())
        .flat_map(|(start, _)| {
            record.modifications.iter().filter_map(move |site| {
                Some(ModificationOccurrence {
                    residue: site.residue?,
                    position: site.absolute_position(start)?,
                })
            })
        })
        .collect();

    Resolution {
        hits,
        modifications,
    }
}
