//! Quantification of MS2 identified peptides: for every identification in a
//! spectrum file, build the chromatograms over all charge states, validate
//! the isotopic envelopes, cut the peak, and resolve conflicting peaks.

mod cut;
mod envelope;
mod xic;


use std::collections::HashMap;
use std::path::Path;

use itertools::Itertools;
use rayon::prelude::*;

use crate::chemistry::to_mass;
use crate::identification::Identification;
use crate::index::{IndexedPeak, PeakIndex};
use crate::isotopes::IsotopeDistribution;
use crate::peak::ChromatographicPeak;
use crate::settings::LfqSettings;

pub use cut::cut_peak;
pub use envelope::isotopic_envelopes;
pub use xic::peak_find;

/// Quantify every identification made in one spectrum file. The
/// identifications are split into contiguous slices, one per worker; each
/// slice produces its peaks independently and the results are merged after
/// the join.
pub fn quantify_ms2_identified_peptides(
    spectral_file: &Path,
    all_identifications: &[Identification],
    charge_states: &[i32],
    index: &PeakIndex,
    distributions: &HashMap<String, IsotopeDistribution>,
    settings: &LfqSettings,
) -> Vec<ChromatographicPeak> {
    let ms2_ids: Vec<&Identification> = all_identifications
        .iter()
        .filter(|identification| identification.spectral_file == spectral_file)
        .collect();

    if ms2_ids.is_empty() || index.is_empty() {
        return Vec::new();
    }

    let chunk_size = ms2_ids.len().div_ceil(settings.max_threads.max(1));
    ms2_ids
        .par_chunks(chunk_size)
        .flat_map_iter(|chunk| {
            chunk
                .iter()
                .filter_map(|identification| {
                    quantify_identification(
                        spectral_file,
                        identification,
                        charge_states,
                        index,
                        distributions,
                        settings,
                    )
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Build the chromatographic peak of a single identification, or None when no
/// valid envelope survives.
fn quantify_identification(
    spectral_file: &Path,
    identification: &Identification,
    charge_states: &[i32],
    index: &PeakIndex,
    distributions: &HashMap<String, IsotopeDistribution>,
    settings: &LfqSettings,
) -> Option<ChromatographicPeak> {
    let mut peak = ChromatographicPeak::new(
        identification.clone(),
        false,
        spectral_file.to_path_buf(),
    );

    let Some(distribution) = distributions.get(&identification.sequence) else {
        return None;
    };
    let peak_finding_tolerance = settings.peak_finding_tolerance();
    let ppm_tolerance = settings.ppm_tolerance();

    for &charge_state in charge_states {
        if settings.id_specific_charge_state && charge_state != identification.precursor_charge {
            continue;
        }

        let mut xic = peak_find(
            identification.ms2_retention_time,
            identification.peak_finding_mass,
            charge_state,
            peak_finding_tolerance,
            index,
            settings.missed_scans_allowed,
        );

        // the chromatogram walk ran at the wider tolerance, now drop
        // everything outside the stricter one
        xic.retain(|p| {
            ppm_tolerance.within(to_mass(p.mz, charge_state), identification.peak_finding_mass)
        });

        peak.isotopic_envelopes.extend(isotopic_envelopes(
            &xic,
            identification,
            charge_state,
            distribution,
            index,
            settings,
        ));
    }

    peak.calculate_intensity(settings.integrate);

    cut_peak(
        &mut peak,
        identification.ms2_retention_time,
        settings.discrimination_factor_to_cut_peak,
        settings.integrate,
    );

    if peak.isotopic_envelopes.is_empty() {
        return None;
    }

    // trim to the scan range covered at the precursor charge
    let (min_scan, max_scan) = peak
        .isotopic_envelopes
        .iter()
        .filter(|envelope| envelope.charge_state == identification.precursor_charge)
        .map(|envelope| envelope.indexed_peak.scan_index)
        .minmax()
        .into_option()?;

    peak.isotopic_envelopes.retain(|envelope| {
        (min_scan..=max_scan).contains(&envelope.indexed_peak.scan_index)
    });

    peak.calculate_intensity(settings.integrate);
    Some(peak)
}

/// Merge duplicate peaks and resolve match-between-runs against MS2
/// conflicts for one file: after this no two peaks of the file share an apex.
pub fn resolve_file_peaks(
    mut peaks: Vec<ChromatographicPeak>,
    integrate: bool,
) -> Vec<ChromatographicPeak> {
    peaks.retain(|peak| !(peak.is_mbr && peak.isotopic_envelopes.is_empty()));

    // MS2 identified peaks take precedence over inferred ones
    peaks.sort_by_key(|peak| peak.is_mbr);

    let mut resolved: Vec<ChromatographicPeak> = Vec::new();
    let mut by_apex: HashMap<IndexedPeak, ChromatographicPeak> = HashMap::new();
    let mut apex_order: Vec<IndexedPeak> = Vec::new();

    for mut peak in peaks {
        peak.calculate_intensity(integrate);
        peak.resolve_identifications();

        let Some(apex) = peak.apex.clone() else {
            if !peak.is_mbr {
                resolved.push(peak);
            }
            continue;
        };

        match by_apex.entry(apex.indexed_peak) {
            std::collections::hash_map::Entry::Vacant(entry) => {
                apex_order.push(apex.indexed_peak);
                entry.insert(peak);
            }
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                let stored = entry.get_mut();
                if !peak.is_mbr && !stored.is_mbr {
                    stored.merge_with(peak, integrate);
                } else if peak.is_mbr && !stored.is_mbr {
                    // an MS2 backed peak wins over the inferred one
                } else if peak.is_mbr && stored.is_mbr {
                    if peak.identifications.first().map(Identification::modified_sequence)
                        == stored.identifications.first().map(Identification::modified_sequence)
                    {
                        stored.merge_with(peak, integrate);
                    } else if peak.mbr_score > stored.mbr_score {
                        *stored = peak;
                    }
                }
            }
        }
    }

    resolved.extend(
        apex_order
            .into_iter()
            .filter_map(|apex| by_apex.remove(&apex)),
    );
    resolved
}
