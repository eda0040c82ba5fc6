//! Elemental composition of peptides as needed for the isotope model

use serde::{Deserialize, Serialize};

use crate::system::{da, Mass};

/// The elements occurring in (unmodified) peptides, in the order of the composition array
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub enum Element {
    C,
    H,
    N,
    O,
    S,
}

impl Element {
    pub const ALL: [Self; 5] = [Self::C, Self::H, Self::N, Self::O, Self::S];

    /// The natural isotopes of this element as (mass, abundance), most abundant first,
    /// every next isotope one neutron heavier than the previous listed one
    pub const fn isotopes(self) -> &'static [(f64, f64)] {
        match self {
            Self::C => &[(12.0, 0.9893), (13.00335483507, 0.0107)],
            Self::H => &[(1.00782503207, 0.999_885), (2.01410177812, 0.000_115)],
            Self::N => &[(14.00307400443, 0.996_36), (15.00010889888, 0.003_64)],
            Self::O => &[
                (15.99491461957, 0.997_57),
                (16.99913175650, 0.000_38),
                (17.99915961286, 0.002_05),
            ],
            Self::S => &[
                (31.9720711744, 0.9499),
                (32.9714589098, 0.0075),
                (33.967867004, 0.0425),
                (35.96708071, 0.0001),
            ],
        }
    }

    /// The monoisotopic mass of this element
    pub const fn monoisotopic_mass(self) -> f64 {
        self.isotopes()[0].0
    }
}

/// The elemental composition of a peptide, C/H/N/O/S counts
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, Serialize, Deserialize)]
pub struct PeptideFormula {
    counts: [u32; 5],
}

impl PeptideFormula {
    /// Build the formula for a peptide sequence from its residue composition.
    /// Cysteine is counted as carbamidomethyl cysteine and residues tagged
    /// `[147]` (oxidized methionine) gain one oxygen. Bracketed tags other than
    /// 147 and characters that are not residues are ignored. The composition
    /// starts from H₂O for the termini.
    pub fn from_residues(sequence: &str) -> Self {
        let mut formula = Self::default();
        formula.add(Element::H, 2);
        formula.add(Element::O, 1);

        let mut tag = String::new();
        let mut in_tag = false;
        for residue in sequence.chars() {
            match residue {
                '[' => {
                    tag.clear();
                    in_tag = true;
                }
                ']' => {
                    in_tag = false;
                    if tag.parse::<u32>() == Ok(147) {
                        formula.add(Element::O, 1);
                    }
                }
                c if in_tag => tag.push(c),
                'A' => formula.add_all([3, 5, 1, 1, 0]),
                'R' => formula.add_all([6, 12, 4, 1, 0]),
                'N' => formula.add_all([4, 6, 2, 2, 0]),
                'D' => formula.add_all([4, 5, 1, 3, 0]),
                // carbamidomethylation of C
                'C' => formula.add_all([5, 8, 2, 2, 1]),
                'Q' => formula.add_all([5, 8, 2, 2, 0]),
                'E' => formula.add_all([5, 7, 1, 3, 0]),
                'G' => formula.add_all([2, 3, 1, 1, 0]),
                'H' => formula.add_all([6, 7, 3, 1, 0]),
                'I' | 'L' => formula.add_all([6, 11, 1, 1, 0]),
                'K' => formula.add_all([6, 12, 2, 1, 0]),
                'M' => formula.add_all([5, 9, 1, 1, 1]),
                'F' => formula.add_all([9, 9, 1, 1, 0]),
                'P' => formula.add_all([5, 7, 1, 1, 0]),
                'S' => formula.add_all([3, 5, 1, 2, 0]),
                'T' => formula.add_all([4, 7, 1, 2, 0]),
                'W' => formula.add_all([11, 10, 2, 1, 0]),
                'Y' => formula.add_all([9, 9, 1, 2, 0]),
                'V' => formula.add_all([5, 9, 1, 1, 0]),
                _ => (),
            }
        }
        formula
    }

    fn add(&mut self, element: Element, count: u32) {
        self.counts[element as usize] += count;
    }

    fn add_all(&mut self, counts: [u32; 5]) {
        for (total, count) in self.counts.iter_mut().zip(counts) {
            *total += count;
        }
    }

    /// The number of atoms of the given element
    pub const fn count(&self, element: Element) -> u32 {
        self.counts[element as usize]
    }

    /// Iterate over all (element, count) pairs with a non zero count
    pub fn elements(&self) -> impl Iterator<Item = (Element, u32)> + '_ {
        Element::ALL
            .into_iter()
            .zip(self.counts)
            .filter(|(_, count)| *count > 0)
    }

    /// The monoisotopic mass of this formula
    pub fn monoisotopic_mass(&self) -> Mass {
        da(self
            .elements()
            .map(|(element, count)| element.monoisotopic_mass() * f64::from(count))
            .sum())
    }
}

impl std::fmt::Display for PeptideFormula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (element, count) in self.elements() {
            write!(f, "{element:?}{count}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glycine() {
        // G + H2O: C2H5NO2
        let formula = PeptideFormula::from_residues("G");
        assert_eq!(formula.count(Element::C), 2);
        assert_eq!(formula.count(Element::H), 5);
        assert_eq!(formula.count(Element::N), 1);
        assert_eq!(formula.count(Element::O), 2);
        assert_eq!(formula.count(Element::S), 0);
        assert!((formula.monoisotopic_mass().value - 75.032_028).abs() < 1e-5);
    }

    #[test]
    fn carbamidomethyl_cysteine() {
        // C as carbamidomethyl-C: C5H10NO3S (residue C5H8N2O2S + H2O + ... )
        let formula = PeptideFormula::from_residues("C");
        assert_eq!(formula.count(Element::C), 5);
        assert_eq!(formula.count(Element::S), 1);
        assert_eq!(formula.count(Element::N), 2);
    }

    #[test]
    fn oxidation_tag() {
        let plain = PeptideFormula::from_residues("PEPTIDEM");
        let oxidized = PeptideFormula::from_residues("PEPTIDEM[147]");
        assert_eq!(oxidized.count(Element::O), plain.count(Element::O) + 1);
        assert_eq!(oxidized.count(Element::C), plain.count(Element::C));
    }

    #[test]
    fn tag_digits_not_counted_as_residues() {
        let tagged = PeptideFormula::from_residues("PEPS[79]K");
        let plain = PeptideFormula::from_residues("PEPSK");
        assert_eq!(tagged, plain);
    }
}
