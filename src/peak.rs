//! Chromatographic peaks and the isotopic envelopes they are built from

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::chemistry::to_mass;
use crate::identification::Identification;
use crate::index::IndexedPeak;
use crate::system::Time;

/// A matched group of isotope peaks at one scan: the peak the ladder was
/// centered on, the charge it was built at, and the summed isotope intensity
/// (charge normalized at construction).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IsotopicEnvelope {
    /// The peak this envelope is centered on, an exact copy of the tuple in the index
    pub indexed_peak: IndexedPeak,
    /// The charge state the envelope was built at
    pub charge_state: i32,
    /// The envelope intensity
    pub intensity: f64,
}

impl IsotopicEnvelope {
    /// Create an envelope, dividing the summed isotope intensity by the charge
    pub fn new(indexed_peak: IndexedPeak, charge_state: i32, summed_intensity: f64) -> Self {
        Self {
            indexed_peak,
            charge_state,
            intensity: summed_intensity / f64::from(charge_state),
        }
    }

    /// Scale the intensity by a normalization factor
    pub fn normalize(&mut self, factor: f64) {
        self.intensity *= factor;
    }
}

impl PartialEq for IsotopicEnvelope {
    fn eq(&self, other: &Self) -> bool {
        self.charge_state == other.charge_state && self.indexed_peak == other.indexed_peak
    }
}

impl Eq for IsotopicEnvelope {}

/// One peptide elution event: the envelopes across consecutive MS1 scans
/// (possibly over several charge states) tied to the identification(s) that
/// claimed it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChromatographicPeak {
    /// The spectrum file this peak was found in
    pub spectral_file: PathBuf,
    /// All identifications resolved onto this peak
    pub identifications: Vec<Identification>,
    /// The envelopes this peak consists of
    pub isotopic_envelopes: Vec<IsotopicEnvelope>,
    /// The envelope of maximum intensity
    pub apex: Option<IsotopicEnvelope>,
    /// The reported intensity, apex or summed depending on the integrate setting
    pub intensity: f64,
    /// The ppm difference between the apex mass and the closest identification
    pub mass_error_ppm: f64,
    /// The number of distinct charge states among the envelopes
    pub num_charge_states: usize,
    /// Whether this peak was inferred by match between runs instead of an MS2 identification
    pub is_mbr: bool,
    /// The score of the match between runs inference, when applicable
    pub mbr_score: f64,
    /// The retention time of the valley this peak was split at, when it was
    pub split_rt: Option<Time>,
    /// The number of distinct base sequences among the identifications
    pub num_ids_by_base_seq: usize,
    /// The number of distinct modified sequences among the identifications
    pub num_ids_by_full_seq: usize,
}

impl ChromatographicPeak {
    /// Start a peak from a single identification; envelopes are appended as
    /// the chromatograms per charge state are processed.
    pub fn new(identification: Identification, is_mbr: bool, spectral_file: PathBuf) -> Self {
        Self {
            spectral_file,
            identifications: vec![identification],
            isotopic_envelopes: Vec::new(),
            apex: None,
            intensity: 0.0,
            mass_error_ppm: f64::NAN,
            num_charge_states: 0,
            is_mbr,
            mbr_score: 0.0,
            split_rt: None,
            num_ids_by_base_seq: 1,
            num_ids_by_full_seq: 1,
        }
    }

    /// Recompute intensity, apex, mass error, and the charge state count from
    /// the current envelopes.
    pub fn calculate_intensity(&mut self, integrate: bool) {
        if self.isotopic_envelopes.is_empty() {
            self.intensity = 0.0;
            self.mass_error_ppm = f64::NAN;
            self.num_charge_states = 0;
            self.apex = None;
            return;
        }

        // ties resolve to the earliest envelope
        let mut apex = self.isotopic_envelopes[0].clone();
        for envelope in &self.isotopic_envelopes[1..] {
            if envelope.intensity > apex.intensity {
                apex = envelope.clone();
            }
        }

        self.intensity = if integrate {
            self.isotopic_envelopes
                .iter()
                .map(|envelope| envelope.intensity)
                .sum()
        } else {
            apex.intensity
        };

        let apex_mass = to_mass(apex.indexed_peak.mz, apex.charge_state);
        self.mass_error_ppm = f64::NAN;
        for identification in &self.identifications {
            let error = (apex_mass.value - identification.peak_finding_mass.value)
                / identification.peak_finding_mass.value
                * 1e6;
            if self.mass_error_ppm.is_nan() || error.abs() < self.mass_error_ppm.abs() {
                self.mass_error_ppm = error;
            }
        }

        self.num_charge_states = self
            .isotopic_envelopes
            .iter()
            .map(|envelope| envelope.charge_state)
            .collect::<HashSet<_>>()
            .len();

        self.apex = Some(apex);
    }

    /// Recount the distinct base and modified sequences among the identifications
    pub fn resolve_identifications(&mut self) {
        self.num_ids_by_base_seq = self
            .identifications
            .iter()
            .map(|identification| identification.sequence.as_str())
            .collect::<HashSet<_>>()
            .len();
        self.num_ids_by_full_seq = self
            .identifications
            .iter()
            .map(|identification| identification.modified_sequence())
            .collect::<HashSet<_>>()
            .len();
    }

    /// Merge another peak sharing this peak's apex into this one: union of
    /// identifications and envelopes, then recompute.
    pub fn merge_with(&mut self, other: Self, integrate: bool) {
        let own_peaks: HashSet<IndexedPeak> = self
            .isotopic_envelopes
            .iter()
            .map(|envelope| envelope.indexed_peak)
            .collect();

        for identification in other.identifications {
            if !self.identifications.contains(&identification) {
                self.identifications.push(identification);
            }
        }
        self.resolve_identifications();

        self.isotopic_envelopes.extend(
            other
                .isotopic_envelopes
                .into_iter()
                .filter(|envelope| !own_peaks.contains(&envelope.indexed_peak)),
        );

        self.calculate_intensity(integrate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::{da, seconds, th};
    use std::collections::BTreeSet;

    fn identification(sequence: &str) -> Identification {
        Identification {
            sequence: sequence.to_string(),
            modifications: String::new(),
            precursor_charge: 2,
            monoisotopic_mass: da(998.49),
            peak_finding_mass: da(998.49),
            peptide_mass: da(998.49),
            spectral_file: PathBuf::from("run1.mzML"),
            ms2_retention_time: seconds(65.0),
            scan_id: 6,
            protein_groups: BTreeSet::new(),
            use_for_protein_quant: true,
        }
    }

    fn envelope(scan_index: usize, intensity: f64) -> IsotopicEnvelope {
        IsotopicEnvelope {
            indexed_peak: IndexedPeak {
                mz: th(500.2525),
                intensity,
                scan_index,
                retention_time: seconds(60.0 + scan_index as f64),
            },
            charge_state: 2,
            intensity,
        }
    }

    #[test]
    fn envelope_intensity_is_charge_normalized() {
        let envelope = IsotopicEnvelope::new(
            IndexedPeak {
                mz: th(500.0),
                intensity: 10.0,
                scan_index: 0,
                retention_time: seconds(0.0),
            },
            2,
            100.0,
        );
        assert!((envelope.intensity - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn apex_and_intensity() {
        let mut peak = ChromatographicPeak::new(identification("PEPTIDEK"), false, "run1.mzML".into());
        peak.isotopic_envelopes = vec![envelope(0, 10.0), envelope(1, 30.0), envelope(2, 20.0)];

        peak.calculate_intensity(false);
        assert!((peak.intensity - 30.0).abs() < f64::EPSILON);
        assert_eq!(peak.apex.as_ref().unwrap().indexed_peak.scan_index, 1);
        assert_eq!(peak.num_charge_states, 1);

        peak.calculate_intensity(true);
        assert!((peak.intensity - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_peak_has_no_apex() {
        let mut peak = ChromatographicPeak::new(identification("PEPTIDEK"), false, "run1.mzML".into());
        peak.calculate_intensity(false);
        assert!(peak.apex.is_none());
        assert!(peak.intensity == 0.0);
        assert!(peak.mass_error_ppm.is_nan());
    }

    #[test]
    fn merge_unions_envelopes_and_identifications() {
        let mut a = ChromatographicPeak::new(identification("PEPTIDEK"), false, "run1.mzML".into());
        a.isotopic_envelopes = vec![envelope(0, 10.0), envelope(1, 30.0)];
        a.calculate_intensity(false);

        let mut b = ChromatographicPeak::new(identification("OTHERSEQ"), false, "run1.mzML".into());
        b.isotopic_envelopes = vec![envelope(1, 30.0), envelope(2, 5.0)];
        b.calculate_intensity(false);

        a.merge_with(b, false);
        assert_eq!(a.identifications.len(), 2);
        // the shared envelope at scan 1 is not duplicated
        assert_eq!(a.isotopic_envelopes.len(), 3);
        assert_eq!(a.num_ids_by_base_seq, 2);
        assert_eq!(a.num_ids_by_full_seq, 2);
    }
}
