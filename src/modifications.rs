//! Parsing of the modification tag carried after `__` in a peptide string.
//!
//! A tag is a `;`-separated list of segments such as `M3(Oxidation)`. Each
//! segment contributes one [`ModificationSite`]: the first ASCII letter is the
//! modified residue and the digit run after it is the position within the
//! peptide. Scanning stops at the first `(`.

const ISOBARIC_LABELS: [&str; 3] = ["itraq", "tmt", "carbamidomethyl"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModificationSite {
    pub residue: Option<char>,
    /// 1-based position inside the peptide.
    pub position: Option<usize>,
}

impl ModificationSite {
    /// Absolute protein position for a peptide starting at `peptide_start`.
    /// `None` when the tag has no position or the sum does not fit a `usize`.
    pub fn absolute_position(&self, peptide_start: usize) -> Option<usize> {
        let local = self.position?;
        peptide_start
            .checked_add(local)
            .map(|position| position.saturating_sub(1))
    }
}

/// Drops isobaric labelling and fixed carbamidomethyl segments from a tag.
pub fn strip_isobaric_labels(tag: &str) -> String {
    tag.split(';')
        .map(str::trim)
        .filter(|segment| {
            let lowered = segment.to_lowercase();
            !ISOBARIC_LABELS
                .iter()
                .any(|label| lowered.contains(label))
        })
        .collect::<Vec<_>>()
        .join(";")
}

/// Parses a tag that has already been filtered with [`strip_isobaric_labels`].
pub fn parse_filtered_tag(tag: &str) -> Vec<ModificationSite> {
    if tag.is_empty() {
        return Vec::new();
    }
    tag.split(';').map(parse_segment).collect()
}

pub fn parse_modification_tag(tag: &str) -> Vec<ModificationSite> {
    parse_filtered_tag(&strip_isobaric_labels(tag))
}

fn parse_segment(segment: &str) -> ModificationSite {
    let mut residue = None;
    let mut digits = String::new();

    for ch in segment.chars() {
        if residue.is_none() && ch.is_ascii_alphabetic() {
            residue = Some(ch);
        } else if residue.is_some() && ch.is_ascii_digit() {
            digits.push(ch);
        } else if ch == '(' {
            break;
        }
    }

    let position = if digits.is_empty() {
        None
    } else {
        digits.parse::<usize>().ok()
    };
    ModificationSite { residue, position }
}

#[cfg(test)]
mod tests {
    use super::{ModificationSite, parse_modification_tag, strip_isobaric_labels};

    fn site(residue: char, position: Option<usize>) -> ModificationSite {
        ModificationSite {
            residue: Some(residue),
            position,
        }
    }

    #[test]
    fn parses_single_oxidation() {
        assert_eq!(parse_modification_tag("M3(Oxidation)"), vec![site('M', Some(3))]);
    }

    #[test]
    fn isobaric_only_tag_is_empty() {
        assert!(parse_modification_tag("TMT6plex").is_empty());
        assert!(parse_modification_tag("").is_empty());
    }

    #[test]
    fn filters_labels_case_insensitively() {
        assert_eq!(
            strip_isobaric_labels("K7(TMT6plex); M3(Oxidation) ;C2(Carbamidomethyl);N1(iTRAQ4plex)"),
            "M3(Oxidation)"
        );
    }

    #[test]
    fn parses_multiple_segments_in_order() {
        assert_eq!(
            parse_modification_tag("S12(Phospho);M3(Oxidation)"),
            vec![site('S', Some(12)), site('M', Some(3))]
        );
    }

    #[test]
    fn segment_without_digits_has_no_position() {
        assert_eq!(parse_modification_tag("Acetyl"), vec![site('A', None)]);
    }

    #[test]
    fn stops_at_parenthesis() {
        assert_eq!(parse_modification_tag("Y4(Nitro 45)"), vec![site('Y', Some(4))]);
    }

    #[test]
    fn later_letters_are_ignored() {
        assert_eq!(parse_modification_tag("M1x5"), vec![site('M', Some(15))]);
    }

    #[test]
    fn absolute_position_is_offset_from_peptide_start() {
        assert_eq!(site('M', Some(3)).absolute_position(10), Some(12));
        assert_eq!(site('M', None).absolute_position(10), None);
    }

    #[test]
    fn oversized_local_position_has_no_absolute_position() {
        let sites = parse_modification_tag("M18446744073709551615(Oxidation)");
        assert_eq!(sites, vec![site('M', Some(usize::MAX))]);
        assert_eq!(sites[0].absolute_position(3), None);
        assert_eq!(sites[0].absolute_position(1), None);
    }
}
