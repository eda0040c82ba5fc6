//! Cross run intensity normalization: fractions, then bioreps/conditions,
//! then techreps, each pass scaling envelope intensities and recomputing the
//! peptide results.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::optim::{NelderMead, ParameterBounds};
use crate::results::{LfqResults, SpectraFileInfo};
use crate::settings::LfqSettings;
use crate::stats::median;

/// Run all three normalization passes. The reference is always the first
/// condition's first biological replicate.
pub fn normalize_results(results: &mut LfqResults, settings: &LfqSettings) {
    results.calculate_peptide_results(settings.quantify_ambiguous_peptides);

    log::info!("Normalizing fractions");
    normalize_fractions(results, settings);
    results.calculate_peptide_results(settings.quantify_ambiguous_peptides);

    log::info!("Normalizing bioreps and conditions");
    normalize_bioreps(results, settings);
    results.calculate_peptide_results(settings.quantify_ambiguous_peptides);

    log::info!("Normalizing techreps");
    normalize_techreps(results, settings);
    results.calculate_peptide_results(settings.quantify_ambiguous_peptides);
}

/// Scale every envelope of the file and recompute the peak intensities
fn apply_factor(results: &mut LfqResults, file: &Path, factor: f64, integrate: bool) {
    if let Some(peaks) = results.peaks.get_mut(file) {
        for peak in peaks {
            for envelope in &mut peak.isotopic_envelopes {
                envelope.normalize(factor);
            }
            peak.calculate_intensity(integrate);
        }
    }
}

fn conditions(results: &LfqResults) -> Vec<String> {
    results
        .spectra_files
        .iter()
        .map(|file| file.condition.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn bioreps_of_condition(results: &LfqResults, condition: &str) -> Vec<usize> {
    results
        .spectra_files
        .iter()
        .filter(|file| file.condition == condition)
        .map(|file| file.biorep)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn files_where(
    results: &LfqResults,
    predicate: impl Fn(&SpectraFileInfo) -> bool,
) -> Vec<SpectraFileInfo> {
    results
        .spectra_files
        .iter()
        .filter(|file| predicate(file))
        .cloned()
        .collect()
}

/// Align the fractions of every (condition, biorep) against the reference
/// sample by fitting one factor per fraction.
fn normalize_fractions(results: &mut LfqResults, settings: &LfqSettings) {
    if results
        .spectra_files
        .iter()
        .map(|file| file.fraction)
        .max()
        .unwrap_or(0)
        == 0
    {
        return;
    }

    let conditions = conditions(results);
    let reference_files = files_where(results, |file| {
        file.condition == conditions[0] && file.biorep == 0 && file.techrep == 0
    });
    let num_fractions = reference_files
        .iter()
        .map(|file| file.fraction)
        .max()
        .map_or(0, |max| max + 1);
    if num_fractions == 0 {
        return;
    }

    let peptide_keys: Vec<String> = results.peptides.keys().cloned().collect();

    for condition in &conditions {
        for biorep in bioreps_of_condition(results, condition) {
            if biorep == 0 && condition == &conditions[0] {
                // the reference sample is not normalized
                continue;
            }
            log::info!("Normalizing condition \"{condition}\" biorep {}", biorep + 1);

            let biorep_files = files_where(results, |file| {
                file.condition == *condition && file.biorep == biorep && file.techrep == 0
            });
            if biorep_files.iter().any(|file| file.fraction >= num_fractions) {
                log::warn!(
                    "Skipped normalizing condition \"{condition}\" biorep {}: the fraction counts do not match the reference",
                    biorep + 1
                );
                continue;
            }

            // peptides quantified in both the reference and this sample
            let mut reference = Vec::new();
            let mut sample = Vec::new();
            for key in &peptide_keys {
                let peptide = &results.peptides[key];
                let mut reference_row = vec![0.0; num_fractions];
                let mut sample_row = vec![0.0; num_fractions];
                for file in &reference_files {
                    reference_row[file.fraction] = peptide.intensity(&file.full_path);
                }
                for file in &biorep_files {
                    sample_row[file.fraction] = peptide.intensity(&file.full_path);
                }
                if reference_row.iter().any(|intensity| *intensity > 0.0)
                    && sample_row.iter().any(|intensity| *intensity > 0.0)
                {
                    reference.push(reference_row.iter().sum::<f64>());
                    sample.push(sample_row);
                }
            }

            if reference.is_empty() {
                log::warn!(
                    "No shared peptides to normalize condition \"{condition}\" biorep {} against the reference",
                    biorep + 1
                );
                return;
            }

            let factors = normalization_factors(&reference, &sample, num_fractions);
            for file in &biorep_files {
                apply_factor(
                    results,
                    &file.full_path,
                    factors[file.fraction],
                    settings.integrate,
                );
            }
        }
    }
}

/// The summed log intensity misfit of a sample against the reference under
/// the given per fraction factors
fn normalization_error(reference: &[f64], sample: &[Vec<f64>], factors: &[f64]) -> f64 {
    let mut total_error = 0.0;
    for (reference_intensity, sample_row) in reference.iter().zip(sample) {
        let normalized: f64 = sample_row
            .iter()
            .zip(factors)
            .map(|(intensity, factor)| intensity * factor)
            .sum();
        if normalized <= 0.0 || *reference_intensity <= 0.0 {
            continue;
        }
        total_error += (normalized.ln() - reference_intensity.ln()).abs();
    }
    total_error
}

/// Fit the per fraction factors in [0.3, 3]: a coarse one dimensional sweep
/// per fraction for the starting point, then Nelder-Mead.
fn normalization_factors(reference: &[f64], sample: &[Vec<f64>], num_fractions: usize) -> Vec<f64> {
    let bounds = vec![ParameterBounds::new(0.3, 3.0); num_fractions];
    let mut best_factors = vec![1.0; num_fractions];
    let unit_error = normalization_error(reference, sample, &best_factors);

    for fraction in 0..num_fractions {
        let mut best_fraction_error = f64::INFINITY;
        let mut factors = vec![1.0; num_fractions];
        let mut candidate = bounds[fraction].min;
        while candidate <= bounds[fraction].max {
            factors[fraction] = (candidate * 100.0).round() / 100.0;
            let error = normalization_error(reference, sample, &factors);
            if error < best_fraction_error {
                best_fraction_error = error;
                best_factors[fraction] = factors[fraction];
            }
            candidate += 0.01;
        }
    }

    let mut optimizer = NelderMead::new(bounds, best_factors.clone(), 10);
    let result =
        optimizer.optimize_best(|factors| normalization_error(reference, sample, factors));

    if result.error < unit_error {
        best_factors = result.parameters;
    }
    best_factors
}

/// Scale every (condition, biorep) onto the reference sample by the median
/// per peptide fold change of the summed intensities.
fn normalize_bioreps(results: &mut LfqResults, settings: &LfqSettings) {
    let conditions = conditions(results);
    let reference_files = files_where(results, |file| {
        file.condition == conditions[0] && file.biorep == 0 && file.techrep == 0
    });

    let peptide_keys: Vec<String> = results.peptides.keys().cloned().collect();
    let reference_sums: Vec<f64> = peptide_keys
        .iter()
        .map(|key| {
            reference_files
                .iter()
                .map(|file| results.peptides[key].intensity(&file.full_path))
                .sum()
        })
        .collect();

    for condition in &conditions {
        for biorep in bioreps_of_condition(results, condition) {
            let biorep_files = files_where(results, |file| {
                file.condition == *condition && file.biorep == biorep
            });
            let techrep0_files: Vec<&SpectraFileInfo> = biorep_files
                .iter()
                .filter(|file| file.techrep == 0)
                .collect();

            let mut fold_changes = Vec::new();
            for (key, reference_sum) in peptide_keys.iter().zip(&reference_sums) {
                let candidate_sum: f64 = techrep0_files
                    .iter()
                    .map(|file| results.peptides[key].intensity(&file.full_path))
                    .sum();
                if *reference_sum > 0.0 && candidate_sum > 0.0 {
                    fold_changes.push(candidate_sum / reference_sum);
                }
            }

            if fold_changes.is_empty() {
                log::warn!(
                    "No shared peptides between condition \"{condition}\" biorep {} and the reference, biorep normalization aborted",
                    biorep + 1
                );
                return;
            }

            let normalization_factor = 1.0 / median(&fold_changes);
            let files: Vec<PathBuf> = biorep_files
                .iter()
                .map(|file| file.full_path.clone())
                .collect();
            for file in files {
                apply_factor(results, &file, normalization_factor, settings.integrate);
            }
        }
    }
}

/// Scale every technical replicate beyond the first onto the first one
fn normalize_techreps(results: &mut LfqResults, settings: &LfqSettings) {
    let peptide_keys: Vec<String> = results.peptides.keys().cloned().collect();

    for condition in conditions(results) {
        for biorep in bioreps_of_condition(results, &condition) {
            let fractions: BTreeSet<usize> = results
                .spectra_files
                .iter()
                .filter(|file| file.condition == condition && file.biorep == biorep)
                .map(|file| file.fraction)
                .collect();

            for fraction in fractions {
                let mut techreps = files_where(results, |file| {
                    file.condition == condition
                        && file.biorep == biorep
                        && file.fraction == fraction
                });
                techreps.sort_by_key(|file| file.techrep);

                for techrep in techreps.iter().skip(1) {
                    let mut fold_changes = Vec::new();
                    for key in &peptide_keys {
                        let peptide = &results.peptides[key];
                        let first_intensity = peptide.intensity(&techreps[0].full_path);
                        let this_intensity = peptide.intensity(&techrep.full_path);
                        if first_intensity > 0.0 && this_intensity > 0.0 {
                            fold_changes.push(this_intensity / first_intensity);
                        }
                    }

                    if fold_changes.is_empty() {
                        log::warn!(
                            "No shared peptides between technical replicates of condition \"{condition}\" biorep {biorep} fraction {fraction}, techrep normalization aborted",
                        );
                        return;
                    }

                    let normalization_factor = 1.0 / median(&fold_changes);
                    apply_factor(
                        results,
                        &techrep.full_path,
                        normalization_factor,
                        settings.integrate,
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identification::Identification;
    use crate::index::IndexedPeak;
    use crate::peak::{ChromatographicPeak, IsotopicEnvelope};
    use crate::system::{da, seconds, th};
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    fn file_info(
        path: &str,
        condition: &str,
        biorep: usize,
        fraction: usize,
        techrep: usize,
    ) -> SpectraFileInfo {
        SpectraFileInfo {
            full_path: PathBuf::from(path),
            condition: condition.to_string(),
            biorep,
            techrep,
            fraction,
        }
    }

    fn identification(sequence: &str, file: &str) -> Identification {
        Identification {
            sequence: sequence.to_string(),
            modifications: String::new(),
            precursor_charge: 1,
            monoisotopic_mass: da(998.49),
            peak_finding_mass: da(998.49),
            peptide_mass: da(998.49),
            spectral_file: PathBuf::from(file),
            ms2_retention_time: seconds(65.0),
            scan_id: 1,
            protein_groups: BTreeSet::new(),
            use_for_protein_quant: true,
        }
    }

    fn peak(sequence: &str, file: &str, intensity: f64) -> ChromatographicPeak {
        let mut peak =
            ChromatographicPeak::new(identification(sequence, file), false, file.into());
        peak.isotopic_envelopes.push(IsotopicEnvelope {
            indexed_peak: IndexedPeak {
                mz: th(999.5),
                intensity,
                scan_index: 5,
                retention_time: seconds(65.0),
            },
            charge_state: 1,
            intensity,
        });
        peak.calculate_intensity(false);
        peak
    }

    fn results_with(
        files: Vec<SpectraFileInfo>,
        peaks: Vec<(&str, &str, f64)>,
    ) -> LfqResults {
        let mut results = LfqResults::new(files);
        let identifications: Vec<Identification> = peaks
            .iter()
            .map(|(sequence, file, _)| identification(sequence, file))
            .collect();
        results.set_peptides_and_protein_groups(&identifications);
        for (sequence, file, intensity) in peaks {
            results
                .peaks
                .get_mut(&PathBuf::from(file))
                .unwrap()
                .push(peak(sequence, file, intensity));
        }
        results
    }

    fn settings() -> LfqSettings {
        LfqSettings {
            normalize: true,
            ..LfqSettings::default()
        }
    }

    #[test]
    fn fractions_align_the_sample_totals() {
        let mut results = results_with(
            vec![
                file_info("a0.mzML", "A", 0, 0, 0),
                file_info("a1.mzML", "A", 0, 1, 0),
                file_info("b0.mzML", "B", 0, 0, 0),
                file_info("b1.mzML", "B", 0, 1, 0),
            ],
            vec![
                ("PEPTIDEX", "a0.mzML", 100.0),
                ("PEPTIDEX", "a1.mzML", 200.0),
                ("PEPTIDEX", "b0.mzML", 50.0),
                ("PEPTIDEX", "b1.mzML", 400.0),
            ],
        );
        let settings = settings();

        results.calculate_peptide_results(false);
        normalize_fractions(&mut results, &settings);
        results.calculate_peptide_results(false);

        let peptide = &results.peptides["PEPTIDEX"];
        let reference_total = peptide.intensity(Path::new("a0.mzML"))
            + peptide.intensity(Path::new("a1.mzML"));
        let sample_total = peptide.intensity(Path::new("b0.mzML"))
            + peptide.intensity(Path::new("b1.mzML"));
        assert!((reference_total - 300.0).abs() < 1e-9);
        assert!(
            (sample_total - reference_total).abs() / reference_total <= 0.01,
            "sample total {sample_total} is not within 1% of {reference_total}"
        );
    }

    #[test]
    fn bioreps_scale_to_unit_median_fold_change() {
        let mut results = results_with(
            vec![
                file_info("a.mzML", "A", 0, 0, 0),
                file_info("b.mzML", "B", 0, 0, 0),
            ],
            vec![
                ("PEPTIDEX", "a.mzML", 100.0),
                ("PEPTIDEX", "b.mzML", 200.0),
                ("PEPTIDEY", "a.mzML", 80.0),
                ("PEPTIDEY", "b.mzML", 160.0),
            ],
        );
        let settings = settings();

        results.calculate_peptide_results(false);
        normalize_bioreps(&mut results, &settings);
        results.calculate_peptide_results(false);

        let x = &results.peptides["PEPTIDEX"];
        assert!((x.intensity(Path::new("b.mzML")) - 100.0).abs() < 1e-9);
        let y = &results.peptides["PEPTIDEY"];
        assert!((y.intensity(Path::new("b.mzML")) - 80.0).abs() < 1e-9);
        // the reference is untouched (its own fold change is one)
        assert!((x.intensity(Path::new("a.mzML")) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn techreps_scale_to_the_first_replicate() {
        let mut results = results_with(
            vec![
                file_info("t0.mzML", "A", 0, 0, 0),
                file_info("t1.mzML", "A", 0, 0, 1),
            ],
            vec![
                ("PEPTIDEX", "t0.mzML", 100.0),
                ("PEPTIDEX", "t1.mzML", 400.0),
            ],
        );
        let settings = settings();

        results.calculate_peptide_results(false);
        normalize_techreps(&mut results, &settings);
        results.calculate_peptide_results(false);

        let peptide = &results.peptides["PEPTIDEX"];
        assert!((peptide.intensity(Path::new("t1.mzML")) - 100.0).abs() < 1e-9);
        assert!((peptide.intensity(Path::new("t0.mzML")) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn normalization_is_idempotent() {
        let mut results = results_with(
            vec![
                file_info("a.mzML", "A", 0, 0, 0),
                file_info("b.mzML", "B", 0, 0, 0),
            ],
            vec![
                ("PEPTIDEX", "a.mzML", 100.0),
                ("PEPTIDEX", "b.mzML", 250.0),
                ("PEPTIDEY", "a.mzML", 90.0),
                ("PEPTIDEY", "b.mzML", 225.0),
            ],
        );
        let settings = settings();

        normalize_results(&mut results, &settings);
        let after_first: Vec<f64> = ["a.mzML", "b.mzML"]
            .iter()
            .flat_map(|file| {
                results
                    .peptides
                    .values()
                    .map(|peptide| peptide.intensity(Path::new(file)))
                    .collect::<Vec<_>>()
            })
            .collect();

        normalize_results(&mut results, &settings);
        let after_second: Vec<f64> = ["a.mzML", "b.mzML"]
            .iter()
            .flat_map(|file| {
                results
                    .peptides
                    .values()
                    .map(|peptide| peptide.intensity(Path::new(file)))
                    .collect::<Vec<_>>()
            })
            .collect();

        for (first, second) in after_first.iter().zip(&after_second) {
            assert!(
                (first - second).abs() / first.max(1e-12) <= 0.01,
                "{second} deviates more than 1% from {first}"
            );
        }
    }

    #[test]
    fn empty_overlap_aborts_the_pass() {
        let mut results = results_with(
            vec![
                file_info("a.mzML", "A", 0, 0, 0),
                file_info("b.mzML", "B", 0, 0, 0),
            ],
            vec![
                ("PEPTIDEX", "a.mzML", 100.0),
                ("PEPTIDEY", "b.mzML", 200.0),
            ],
        );
        let settings = settings();

        results.calculate_peptide_results(false);
        normalize_bioreps(&mut results, &settings);
        results.calculate_peptide_results(false);

        // nothing changed
        assert!(
            (results.peptides["PEPTIDEX"].intensity(Path::new("a.mzML")) - 100.0).abs() < 1e-9
        );
        assert!(
            (results.peptides["PEPTIDEY"].intensity(Path::new("b.mzML")) - 200.0).abs() < 1e-9
        );
    }
}
