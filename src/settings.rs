//! The immutable configuration record threaded through the pipeline

use serde::{Deserialize, Serialize};

use crate::tolerance::PpmTolerance;

/// All tunable parameters of the quantification pipeline. Constructed once at
/// startup and passed by reference; nothing mutates it afterwards.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct LfqSettings {
    /// Minimum number of isotopes that have to be found in the unshifted ladder for a valid envelope
    pub num_isotopes_required: usize,
    /// The ppm tolerance used while walking the extracted ion chromatogram
    pub peak_finding_ppm_tolerance: f64,
    /// The stricter ppm tolerance applied to the finished chromatogram
    pub ppm_tolerance: f64,
    /// The ppm tolerance for matching individual isotope peaks
    pub isotope_tolerance_ppm: f64,
    /// Only build chromatograms at the charge of the identification itself
    pub id_specific_charge_state: bool,
    /// How many consecutive scans without a matching peak end the chromatogram walk
    pub missed_scans_allowed: usize,
    /// Report the summed envelope intensity instead of the apex intensity
    pub integrate: bool,
    /// Valley depth (relative to the surrounding signal) above which a peak is split
    pub discrimination_factor_to_cut_peak: f64,
    /// Also quantify peptides whose peaks map to more than one sequence
    pub quantify_ambiguous_peptides: bool,
    /// Let peptides shared between protein groups contribute to protein quantification
    pub use_shared_peptides_for_protein_quant: bool,
    /// Normalize intensities across fractions, bioreps, and techreps
    pub normalize: bool,
    /// Persist the MS1 peak index of every run for later match-between-runs use
    pub match_between_runs: bool,
    /// Reserved for match-between-runs peak inference
    pub match_between_runs_ppm_tolerance: f64,
    /// Reserved for match-between-runs peak inference (minutes)
    pub max_mbr_window: f64,
    /// Reserved for match-between-runs peak inference
    pub require_msms_id_in_condition: bool,
    /// Worker count for the per-identification quantification stage
    pub max_threads: usize,
}

impl Default for LfqSettings {
    fn default() -> Self {
        Self {
            num_isotopes_required: 2,
            peak_finding_ppm_tolerance: 20.0,
            ppm_tolerance: 10.0,
            isotope_tolerance_ppm: 5.0,
            id_specific_charge_state: false,
            missed_scans_allowed: 1,
            integrate: false,
            discrimination_factor_to_cut_peak: 0.6,
            quantify_ambiguous_peptides: false,
            use_shared_peptides_for_protein_quant: false,
            normalize: false,
            match_between_runs: false,
            match_between_runs_ppm_tolerance: 10.0,
            max_mbr_window: 2.5,
            require_msms_id_in_condition: false,
            max_threads: 4,
        }
    }
}

impl LfqSettings {
    /// The chromatogram walk tolerance
    pub fn peak_finding_tolerance(&self) -> PpmTolerance {
        PpmTolerance::new(self.peak_finding_ppm_tolerance)
    }

    /// The post-walk filter tolerance
    pub fn ppm_tolerance(&self) -> PpmTolerance {
        PpmTolerance::new(self.ppm_tolerance)
    }

    /// The isotope ladder tolerance
    pub fn isotope_tolerance(&self) -> PpmTolerance {
        PpmTolerance::new(self.isotope_tolerance_ppm)
    }
}
