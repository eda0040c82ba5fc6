//! Reading PSM files and matching them to their MS2 spectra

mod design;
mod psm;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::helper_functions::f64_bits;
use crate::system::{Mass, Time};

pub use design::read_experimental_design;
pub use psm::{read_psms, PsmData, PsmFormat, PsmVersion, ASSIGN_CONFIDENCE, PERCOLATOR, TIDE_SEARCH};

/// A single peptide identification: one PSM matched to its MS2 spectrum,
/// carrying everything the quantifier needs to know about the peptide.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Identification {
    /// The base peptide sequence
    pub sequence: String,
    /// The modified sequence, empty when the PSM dialect does not carry one
    pub modifications: String,
    /// The charge of the precursor
    pub precursor_charge: i32,
    /// The neutral monoisotopic mass of the peptide
    pub monoisotopic_mass: Mass,
    /// The mass at which chromatogram building starts, the monoisotopic mass
    /// shifted to the most abundant isotope. Set by the isotope model.
    pub peak_finding_mass: Mass,
    /// The peptide mass as reported by the search engine
    pub peptide_mass: Mass,
    /// The spectrum file this identification was made in
    pub spectral_file: PathBuf,
    /// The retention time of the identifying MS2 scan
    pub ms2_retention_time: Time,
    /// The scan number of the identifying MS2 scan
    pub scan_id: usize,
    /// The protein groups this peptide maps to
    pub protein_groups: BTreeSet<String>,
    /// Whether this peptide may contribute to protein quantification
    pub use_for_protein_quant: bool,
}

impl Identification {
    /// The modified sequence, falling back to the base sequence when the PSM
    /// dialect did not record modifications. This is the key peptides are
    /// grouped under.
    pub fn modified_sequence(&self) -> &str {
        if self.modifications.is_empty() {
            &self.sequence
        } else {
            &self.modifications
        }
    }
}

impl PartialEq for Identification {
    fn eq(&self, other: &Self) -> bool {
        self.sequence == other.sequence
            && self.modifications == other.modifications
            && self.precursor_charge == other.precursor_charge
            && f64_bits(self.monoisotopic_mass.value) == f64_bits(other.monoisotopic_mass.value)
            && f64_bits(self.peak_finding_mass.value) == f64_bits(other.peak_finding_mass.value)
            && f64_bits(self.peptide_mass.value) == f64_bits(other.peptide_mass.value)
            && self.spectral_file == other.spectral_file
            && f64_bits(self.ms2_retention_time.value) == f64_bits(other.ms2_retention_time.value)
            && self.scan_id == other.scan_id
    }
}

impl Eq for Identification {}

impl Hash for Identification {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sequence.hash(state);
        self.modifications.hash(state);
        self.precursor_charge.hash(state);
        f64_bits(self.monoisotopic_mass.value).hash(state);
        f64_bits(self.peptide_mass.value).hash(state);
        self.spectral_file.hash(state);
        f64_bits(self.ms2_retention_time.value).hash(state);
        self.scan_id.hash(state);
    }
}

/// Match the PSM map against the MS2 scans of one spectrum file. Every MS2
/// scan with a PSM becomes an identification; scans without one are dropped.
/// `ms2_scan_times` maps the native scan number to the scan start time.
pub fn create_identifications(
    psms: &std::collections::BTreeMap<usize, PsmData>,
    spectral_file: &Path,
    ms2_scan_times: &HashMap<usize, Time>,
) -> Vec<Identification> {
    let mut identifications = Vec::new();
    for (&scan_id, &retention_time) in ms2_scan_times {
        let Some(psm) = psms.get(&scan_id) else {
            continue;
        };
        let protein_groups = psm
            .proteins
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        identifications.push(Identification {
            sequence: psm.sequence.clone(),
            modifications: psm.modifications.clone().unwrap_or_default(),
            precursor_charge: psm.z,
            monoisotopic_mass: psm.peptide_mass,
            // filled in by the isotope model
            peak_finding_mass: psm.peptide_mass,
            peptide_mass: psm.peptide_mass,
            spectral_file: spectral_file.to_path_buf(),
            ms2_retention_time: retention_time,
            scan_id,
            protein_groups,
            use_for_protein_quant: true,
        });
    }
    identifications
}

/// Deduplicate identifications gathered over all spectrum files and return
/// them in a deterministic order.
pub fn deduplicate(identifications: Vec<Identification>) -> Vec<Identification> {
    let mut unique: Vec<Identification> = identifications
        .into_iter()
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    unique.sort_by(|a, b| {
        (&a.spectral_file, a.scan_id, &a.sequence, a.precursor_charge).cmp(&(
            &b.spectral_file,
            b.scan_id,
            &b.sequence,
            b.precursor_charge,
        ))
    });
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::{da, seconds};

    fn identification(scan_id: usize) -> Identification {
        Identification {
            sequence: "PEPTIDE".to_string(),
            modifications: String::new(),
            precursor_charge: 2,
            monoisotopic_mass: da(799.36),
            peak_finding_mass: da(799.36),
            peptide_mass: da(799.36),
            spectral_file: PathBuf::from("run1.mzML"),
            ms2_retention_time: seconds(65.0),
            scan_id,
            protein_groups: BTreeSet::new(),
            use_for_protein_quant: true,
        }
    }

    #[test]
    fn deduplication() {
        let ids = vec![identification(5), identification(5), identification(6)];
        let unique = deduplicate(ids);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].scan_id, 5);
        assert_eq!(unique[1].scan_id, 6);
    }

    #[test]
    fn modified_sequence_fallback() {
        let mut id = identification(1);
        assert_eq!(id.modified_sequence(), "PEPTIDE");
        id.modifications = "PEPT[80]IDE".to_string();
        assert_eq!(id.modified_sequence(), "PEPT[80]IDE");
    }
}
