//! Protein sequences keyed by normalized FASTA identifier.

use crate::errors::Result;
use crate::table::open_text_reader;
use crate::utils::round_decimal;
use bio::io::fasta;
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

const WATER_AVERAGE_MASS: f64 = 18.0153;
const AMBIGUOUS_RESIDUES: [char; 3] = ['X', 'B', 'Z'];

#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    pub id: String,
    pub residues: String,
    pub molecular_weight: Option<f64>,
}

impl Sequence {
    pub fn new(id: impl Into<String>, residues: impl Into<String>) -> Self {
        let residues = residues.into();
        let molecular_weight = molecular_weight(&residues);
        Self {
            id: id.into(),
            residues,
            molecular_weight,
        }
    }

    pub fn len(&self) -> usize {
        self.residues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.residues.is_empty()
    }
}

#[derive(Debug, Default, Clone)]
pub struct SequenceStore {
    sequences: HashMap<String, Sequence>,
}

impl SequenceStore {
    /// Loads the FASTA at `path`, keeping only records whose normalized id is
    /// in `wanted`. The first record wins when an id repeats.
    pub fn load_filtered(path: &str, wanted: &HashSet<String>) -> Result<Self> {
        let reader = fasta::Reader::new(open_text_reader(path)?);
        let mut store = Self::default();
        let mut scanned = 0_usize;
        for record in reader.records() {
            let record = record?;
            scanned += 1;
            let id = normalize_identifier(record.id());
            if !wanted.contains(id) {
                continue;
            }
            let residues = String::from_utf8_lossy(record.seq()).into_owned();
            store.insert(Sequence::new(id, residues));
        }
        info!(
            path = %path,
            scanned,
            retained = store.len(),
            requested = wanted.len(),
            "loaded protein sequences"
        );
        Ok(store)
    }

    pub fn from_sequences(sequences: impl IntoIterator<Item = Sequence>) -> Self {
        let mut store = Self::default();
        for sequence in sequences {
            store.insert(sequence);
        }
        store
    }

    fn insert(&mut self, sequence: Sequence) {
        if self.sequences.contains_key(&sequence.id) {
            warn!(id = %sequence.id, "duplicate sequence identifier; keeping first record");
            return;
        }
        if sequence.molecular_weight.is_none() && !sequence.is_empty() {
            warn!(id = %sequence.id, "sequence has residues without a known mass; molecular weight omitted");
        }
        self.sequences.insert(sequence.id.clone(), sequence);
    }

    pub fn get(&self, id: &str) -> Option<&Sequence> {
        self.sequences.get(id)
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }
}

/// `sp|P12345|NAME_HUMAN` becomes `P12345`; ids without `|` are kept whole.
pub fn normalize_identifier(raw: &str) -> &str {
    let mut tokens = raw.split('|');
    let first = tokens.next().unwrap_or(raw);
    tokens.next().unwrap_or(first)
}

/// Average molecular weight in Daltons, rounded to two decimals.
///
/// Ambiguous residues `X`, `B` and `Z` are dropped first; any other residue
/// without a known mass makes the weight undefined.
pub fn molecular_weight(residues: &str) -> Option<f64> {
    let mut total = 0.0;
    let mut count = 0_usize;
    for residue in residues.chars().map(|ch| ch.to_ascii_uppercase()) {
        if AMBIGUOUS_RESIDUES.contains(&residue) {
            continue;
        }
        total += average_residue_mass(residue)?;
        count += 1;
    }
    if count == 0 {
        return None;
    }
    let bonds = (count - 1) as f64;
    Some(round_decimal(total - bonds * WATER_AVERAGE_MASS, 2))
}

/// Free amino acid average masses.
fn average_residue_mass(residue: char) -> Option<f64> {
    let mass = match residue {
        'A' => 89.0932,
        'C' => 121.1582,
        'D' => 133.1027,
        'E' => 147.1293,
        'F' => 165.1891,
        'G' => 75.0666,
        'H' => 155.1546,
        'I' => 131.1729,
        'K' => 146.1876,
        'L' => 131.1729,
        'M' => 149.2113,
        'N' => 132.1179,
        'O' => 255.3134,
        'P' => 115.1305,
        'Q' => 146.1445,
        'R' => 174.201,
        'S' => 105.0926,
        'T' => 119.1192,
        'U' => 168.0532,
        'V' => 117.1463,
        'W' => 204.2252,
        'Y' => 181.1885,
        _ => return None,
    };
    Some(mass)
}
