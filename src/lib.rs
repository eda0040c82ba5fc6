#![doc = include_str!("../README.md")]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::must_use_candidate,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::wildcard_imports,
    clippy::module_name_repetitions,
    clippy::suboptimal_flops,
    clippy::too_many_lines
)]

mod helper_functions;

pub mod chemistry;
#[doc(hidden)]
pub mod csv;
pub mod error;
mod formula;
pub mod identification;
mod index;
mod isotopes;
mod normalize;
mod optim;
mod peak;
pub mod quant;
mod raw;
mod results;
mod settings;
mod stats;
pub mod system;
mod tolerance;

use std::fs;
use std::path::{Path, PathBuf};

pub use crate::formula::{Element, PeptideFormula};
pub use crate::identification::{
    create_identifications, deduplicate, read_experimental_design, read_psms, Identification,
    PsmVersion,
};
pub use crate::index::{IndexedPeak, PeakIndex, ScanInfo};
pub use crate::isotopes::{
    charge_state_range, set_peak_finding_masses, theoretical_isotope_distributions,
    IsotopeDistribution,
};
pub use crate::normalize::normalize_results;
pub use crate::peak::{ChromatographicPeak, IsotopicEnvelope};
pub use crate::quant::{quantify_ms2_identified_peptides, resolve_file_peaks};
pub use crate::results::{
    median_polish, DetectionType, LfqResults, Peptide, ProteinGroup, SpectraFileInfo,
};
pub use crate::settings::LfqSettings;
pub use crate::tolerance::PpmTolerance;

use crate::error::{Context, CustomError};

#[macro_use]
extern crate uom;

/// Run the full label free quantification pipeline: read the PSMs, quantify
/// every identification in every spectrum file, optionally normalize across
/// runs, roll up to proteins, and write the output tables into `output_dir`.
/// # Errors
/// On any fatal problem: missing or unreadable inputs, or unwritable outputs.
/// Per identification failures only reduce coverage.
pub fn run_lfq(
    psm_file: &Path,
    psm_format: PsmVersion,
    spectra_files: &[PathBuf],
    experimental_design: Option<&Path>,
    output_dir: &Path,
    settings: &LfqSettings,
) -> Result<LfqResults, CustomError> {
    log::info!("Loading PSM data from {}", psm_file.display());
    let psms = read_psms(psm_file, psm_format)?;
    log::info!("Read {} PSMs", psms.len());

    fs::create_dir_all(output_dir).map_err(|error| {
        CustomError::error(
            "Could not create output directory",
            error,
            Context::show(output_dir.to_string_lossy()),
        )
    })?;

    let file_infos = read_experimental_design(spectra_files, experimental_design)?;
    let mut results = LfqResults::new(file_infos);

    // match the PSMs against the MS2 scans of every file
    let mut all_identifications = Vec::new();
    for file in spectra_files {
        let ms2_scan_times = raw::read_ms2_scan_times(file)?;
        log::info!(
            "Read {} MS2 scans from {}",
            ms2_scan_times.len(),
            file.display()
        );
        all_identifications.extend(create_identifications(&psms, file, &ms2_scan_times));
    }
    let mut all_identifications = deduplicate(all_identifications);
    log::info!("{} identifications to quantify", all_identifications.len());

    let distributions =
        theoretical_isotope_distributions(&all_identifications, settings.num_isotopes_required);
    set_peak_finding_masses(&mut all_identifications, &distributions);
    let charge_states = charge_state_range(&all_identifications);

    for file in spectra_files {
        let ms1_spectra = raw::read_ms1_spectra(file)?;
        log::info!(
            "Read {} MS1 scans from {}",
            ms1_spectra.len(),
            file.display()
        );
        let index = PeakIndex::build(ms1_spectra);

        log::info!("Quantifying MS2 identified peptides, this may take some time...");
        let peaks = quantify_ms2_identified_peptides(
            file,
            &all_identifications,
            &charge_states,
            &index,
            &distributions,
            settings,
        );

        if settings.match_between_runs {
            let file_name = file
                .file_stem()
                .map_or_else(|| "index".to_string(), |stem| stem.to_string_lossy().to_string());
            let index_path = output_dir.join(format!("{file_name}.peakindex.bin"));
            index.write_to(&index_path)?;
            log::info!("Wrote the MS1 peak index to {}", index_path.display());
        }

        let resolved = resolve_file_peaks(peaks, settings.integrate);
        results.peaks.insert(file.clone(), resolved);
        log::info!("Finished processing {}", file.display());
    }

    results.set_peptides_and_protein_groups(&all_identifications);

    if settings.normalize {
        normalize_results(&mut results, settings);
    }

    results.calculate_peptide_results(settings.quantify_ambiguous_peptides);
    results.calculate_protein_results_median_polish(settings.use_shared_peptides_for_protein_quant);

    log::info!("Writing output...");
    results.write_peaks(&output_dir.join("peaks.txt"))?;
    results.write_peptides(&output_dir.join("peptides.txt"))?;
    results.write_proteins(&output_dir.join("proteins.txt"))?;

    Ok(results)
}
