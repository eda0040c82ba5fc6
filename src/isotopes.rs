//! The theoretical isotope model of the identified peptides

use std::collections::HashMap;

use itertools::Itertools;
use ndarray::{arr1, concatenate, s, Array1, Axis};
use probability::distribution::{Binomial, Discrete};
use std::cmp::Ordering;

use crate::chemistry::C13_C12_MASS_DIFFERENCE;
use crate::formula::PeptideFormula;
use crate::identification::Identification;
use crate::system::{da, Mass};

impl PeptideFormula {
    /// Get the isotopic distribution, using the natural isotope abundances.
    /// The return is an array with the probability per offset: the first
    /// element is the base (monoisotopic) peak, every consecutive peak is one
    /// neutron heavier. The probability is normalized to (approximately) 1
    /// total area.
    ///
    /// This approximation slightly overestimates the tail end of the
    /// distribution as it does not take the number of already chosen atoms
    /// for lower weighed isotopes into account.
    pub fn isotopic_distribution(&self, threshold: f64) -> Array1<f64> {
        let mut result = arr1(&[1.0]);
        for (element, amount) in self.elements() {
            let amount = amount as usize;
            let isotopes = element.isotopes();
            if isotopes.len() < 2 {
                // Only a single species, so no distribution is needed
                continue;
            }
            let base = isotopes[0];
            let isotopes = isotopes
                .iter()
                .skip(1)
                .map(|i| ((i.0 - base.0).round() as usize, i.1))
                .collect_vec();

            for (offset, probability) in isotopes {
                let binomial = Binomial::new(amount, probability);

                // See how many numbers are below the threshold from the end of the distribution
                let tail = (0..=amount)
                    .rev()
                    .map(|t| binomial.mass(t))
                    .take_while(|a| *a < threshold)
                    .count();

                // Get all numbers from the start to the tail threshold,
                // interwoven with zeros to land on the correct offsets
                let mut distribution: Array1<f64> = (0..=amount - tail)
                    .map(|t| binomial.mass(t))
                    .flat_map(|a| {
                        std::iter::once(a)
                            .chain(std::iter::repeat(0.0))
                            .take(offset)
                    })
                    .collect();

                // Make the lengths equal
                match result.len().cmp(&distribution.len()) {
                    Ordering::Less => {
                        result
                            .append(
                                Axis(0),
                                Array1::zeros(distribution.len() - result.len()).view(),
                            )
                            .unwrap();
                    }
                    Ordering::Greater => {
                        distribution
                            .append(
                                Axis(0),
                                Array1::zeros(result.len() - distribution.len()).view(),
                            )
                            .unwrap();
                    }
                    Ordering::Equal => (),
                }

                // Combine distribution with the previous distribution
                let mut new = Array1::zeros(result.len());
                for (i, a) in distribution.into_iter().enumerate() {
                    new += &(concatenate(
                        Axis(0),
                        &[
                            Array1::zeros(i).view(),
                            result.slice(s![0..result.len() - i]),
                        ],
                    )
                    .unwrap()
                        * a);
                }

                result = new;
            }
        }
        result
    }
}

/// The isotope model for one peptide sequence: the mass shifts relative to
/// the search engine reported peptide mass, with the abundance of every
/// isotope normalized to the most abundant one.
pub type IsotopeDistribution = Vec<(Mass, f64)>;

/// Compute the theoretical isotope distribution for every distinct peptide
/// sequence among the identifications. Kept are the first
/// `num_isotopes_required` isotopes plus any with a normalized abundance
/// above 0.1.
pub fn theoretical_isotope_distributions(
    identifications: &[Identification],
    num_isotopes_required: usize,
) -> HashMap<String, IsotopeDistribution> {
    let mut distributions: HashMap<String, IsotopeDistribution> = HashMap::new();

    for identification in identifications {
        if distributions.contains_key(&identification.sequence) {
            continue;
        }

        let formula = PeptideFormula::from_residues(&identification.sequence);
        let abundances = formula.isotopic_distribution(1e-8);
        let monoisotopic = formula.monoisotopic_mass();

        let highest_abundance = abundances.iter().copied().fold(f64::MIN, f64::max);

        let mut kept = Vec::new();
        for (offset, abundance) in abundances.iter().enumerate() {
            let mass = monoisotopic.value + offset as f64 * C13_C12_MASS_DIFFERENCE;
            let shift = da(mass - identification.peptide_mass.value);
            let normalized = abundance / highest_abundance;

            if kept.len() < num_isotopes_required || normalized > 0.1 {
                kept.push((shift, normalized));
            }
        }
        distributions.insert(identification.sequence.clone(), kept);
    }

    distributions
}

/// Set the peak finding mass of every identification: the monoisotopic mass
/// shifted to the most abundant isotope of its sequence.
pub fn set_peak_finding_masses(
    identifications: &mut [Identification],
    distributions: &HashMap<String, IsotopeDistribution>,
) {
    for identification in identifications {
        let most_abundant_shift = distributions
            .get(&identification.sequence)
            .and_then(|distribution| {
                distribution
                    .iter()
                    .find(|(_, abundance)| *abundance == 1.0)
                    .map(|(shift, _)| *shift)
            })
            .unwrap_or(da(0.0));

        identification.peak_finding_mass =
            identification.monoisotopic_mass + most_abundant_shift;
    }
}

/// The contiguous range of charge states observed over all identifications
pub fn charge_state_range(identifications: &[Identification]) -> Vec<i32> {
    let Some((min, max)) = identifications
        .iter()
        .map(|identification| identification.precursor_charge)
        .minmax()
        .into_option()
    else {
        return Vec::new();
    };
    (min..=max).collect()
}
