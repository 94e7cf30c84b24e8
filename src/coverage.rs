//! Per-protein sequence coverage aggregated over a whole report.
//!
//! Coverage is collected in one pass over every row through a
//! [`CoverageBuilder`], then frozen into a [`CoverageTable`] that later rows
//! read from.

use crate::intervals::{Interval, covered_length, union};
use crate::peptide::ProteinHit;
use crate::sequence_store::SequenceStore;
use crate::utils::round_decimal;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct ProteinCoverage {
    pub intervals: Vec<Interval>,
    pub covered_count: usize,
    pub ratio: f64,
}

#[derive(Debug, Default)]
pub struct CoverageBuilder {
    observed: HashMap<String, Vec<Interval>>,
}

impl CoverageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records every candidate protein of a row; only located peptides add
    /// an interval.
    pub fn add_hits(&mut self, hits: &[ProteinHit]) {
        for hit in hits {
            let intervals = self.observed.entry(hit.protein_id.clone()).or_default();
            if let Some(interval) = hit.occurrence.interval() {
                intervals.push(interval);
            }
        }
    }

    /// Merges the collected intervals. Proteins without a known, non-zero
    /// length are left out of the table.
    pub fn finish(self, store: &SequenceStore) -> CoverageTable {
        let proteins = self
            .observed
            .into_iter()
            .filter_map(|(protein_id, intervals)| {
                let length = store.get(&protein_id).map(|sequence| sequence.len())?;
                if length == 0 {
                    return None;
                }
                let intervals = union(&intervals);
                let covered_count = covered_length(&intervals);
                let ratio = round_decimal(covered_count as f64 / length as f64, 2);
                Some((
                    protein_id,
                    ProteinCoverage {
                        intervals,
                        covered_count,
                        ratio,
                    },
                ))
            })
            .collect();
        CoverageTable { proteins }
    }
}

#[derive(Debug, Default, Clone)]
pub struct CoverageTable {
    proteins: HashMap<String, ProteinCoverage>,
}

impl CoverageTable {
    pub fn get(&self, protein_id: &str) -> Option<&ProteinCoverage> {
        self.proteins.get(protein_id)
    }

    /// Coverage ratios for a row's candidates, in candidate order, skipping
    /// proteins absent from the table.
    pub fn ratios_for(&self, candidates: &[String]) -> Vec<f64> {
        candidates
            .iter()
            .filter_map(|protein_id| self.get(protein_id).map(|coverage| coverage.ratio))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.proteins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proteins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::CoverageBuilder;
    use crate::peptide::{Occurrence, ProteinHit};
    use crate::sequence_store::{Sequence, SequenceStore};

    fn hit(protein_id: &str, occurrence: Occurrence) -> ProteinHit {
        ProteinHit {
            protein_id: protein_id.to_string(),
            occurrence,
        }
    }

    fn found(start: usize, end: usize) -> Occurrence {
        Occurrence::Found { start, end }
    }

    #[test]
    fn coverage_merges_across_rows() {
        let store = SequenceStore::from_sequences([Sequence::new("P1", "ABCDEFGHIJ")]);
        let mut builder = CoverageBuilder::new();
        builder.add_hits(&[hit("P1", found(1, 3))]);
        builder.add_hits(&[hit("P1", found(3, 4))]);
        builder.add_hits(&[hit("P1", found(6, 10))]);

        let table = builder.finish(&store);
        let coverage = table.get("P1").expect("expected P1 coverage");
        assert_eq!(coverage.intervals, vec![(1, 4), (6, 10)]);
        assert_eq!(coverage.covered_count, 9);
        assert_eq!(coverage.ratio, 0.9);
    }

    #[test]
    fn unknown_proteins_are_skipped_in_row_ratios() {
        let store = SequenceStore::from_sequences([
            Sequence::new("P1", "ABCD"),
            Sequence::new("P2", "ABCDEF"),
        ]);
        let mut builder = CoverageBuilder::new();
        builder.add_hits(&[
            hit("P1", found(1, 2)),
            hit("P9", Occurrence::SequenceUnavailable),
            hit("P2", Occurrence::NotFound),
        ]);

        let table = builder.finish(&store);
        let candidates = ["P1", "P9", "P2"].map(str::to_string);
        assert_eq!(table.ratios_for(&candidates), vec![0.5, 0.0]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn ratio_rounds_to_two_decimals() {
        let store = SequenceStore::from_sequences([Sequence::new("P1", "ABC")]);
        let mut builder = CoverageBuilder::new();
        builder.add_hits(&[hit("P1", found(1, 2))]);
        let table = builder.finish(&store);
        assert_eq!(table.ratios_for(&["P1".to_string()]), vec![0.67]);
    }
}
