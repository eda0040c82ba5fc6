//! The results store: peaks by file, peptide rows, protein groups, and the
//! tab delimited output writers.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use itertools::Itertools;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::chemistry::to_mz;
use crate::error::{Context, CustomError};
use crate::identification::Identification;
use crate::peak::ChromatographicPeak;
use crate::stats::median;
use crate::system::time::min;

/// One spectrum file with its place in the experimental design
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct SpectraFileInfo {
    pub full_path: PathBuf,
    pub condition: String,
    pub biorep: usize,
    pub techrep: usize,
    pub fraction: usize,
}

impl SpectraFileInfo {
    /// A file outside any experimental design: single condition, first
    /// replicate, unfractionated
    pub fn new(full_path: PathBuf) -> Self {
        Self {
            full_path,
            condition: String::new(),
            biorep: 0,
            techrep: 0,
            fraction: 0,
        }
    }
}

impl Ord for SpectraFileInfo {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (
            self.biorep,
            self.fraction,
            &self.condition,
            &self.full_path,
            self.techrep,
        )
            .cmp(&(
                other.biorep,
                other.fraction,
                &other.condition,
                &other.full_path,
                other.techrep,
            ))
    }
}

impl PartialOrd for SpectraFileInfo {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// How a peptide was (or was not) quantified in a file
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Serialize, Deserialize)]
pub enum DetectionType {
    MSMS,
    MBR,
    #[default]
    NotDetected,
    MSMSAmbiguousPeakfinding,
    MSMSIdentifiedButNotQuantified,
    Imputed,
}

impl fmt::Display for DetectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::MSMS => "MSMS",
                Self::MBR => "MBR",
                Self::NotDetected => "NotDetected",
                Self::MSMSAmbiguousPeakfinding => "MSMSAmbiguousPeakfinding",
                Self::MSMSIdentifiedButNotQuantified => "MSMSIdentifiedButNotQuantified",
                Self::Imputed => "Imputed",
            }
        )
    }
}

/// One peptide row: the per file intensities and detection types of a
/// modified sequence
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Peptide {
    sequence: String,
    modified_sequence: String,
    use_for_protein_quant: bool,
    protein_groups: BTreeSet<String>,
    intensities: HashMap<PathBuf, f64>,
    detection_types: HashMap<PathBuf, DetectionType>,
}

impl Peptide {
    pub fn new(
        sequence: String,
        modified_sequence: String,
        use_for_protein_quant: bool,
        protein_groups: BTreeSet<String>,
    ) -> Self {
        Self {
            sequence,
            modified_sequence,
            use_for_protein_quant,
            protein_groups,
            intensities: HashMap::new(),
            detection_types: HashMap::new(),
        }
    }

    pub fn sequence(&self) -> &str {
        &self.sequence
    }

    pub fn modified_sequence(&self) -> &str {
        &self.modified_sequence
    }

    pub fn protein_groups(&self) -> &BTreeSet<String> {
        &self.protein_groups
    }

    pub fn insert_protein_group(&mut self, protein_group: String) {
        self.protein_groups.insert(protein_group);
    }

    pub fn use_for_protein_quant(&self) -> bool {
        self.use_for_protein_quant
    }

    pub fn intensity(&self, file: &Path) -> f64 {
        self.intensities.get(file).copied().unwrap_or(0.0)
    }

    pub fn set_intensity(&mut self, file: &Path, intensity: f64) {
        self.intensities.insert(file.to_path_buf(), intensity);
    }

    pub fn detection_type(&self, file: &Path) -> DetectionType {
        self.detection_types.get(file).copied().unwrap_or_default()
    }

    pub fn set_detection_type(&mut self, file: &Path, detection_type: DetectionType) {
        self.detection_types
            .insert(file.to_path_buf(), detection_type);
    }

    /// A peptide counts as unambiguously quantified when it has any intensity
    /// and any detection that is not flagged ambiguous
    pub fn unambiguous_quant(&self) -> bool {
        self.intensities.values().any(|intensity| *intensity > 0.0)
            && self
                .detection_types
                .values()
                .any(|detection| *detection != DetectionType::MSMSAmbiguousPeakfinding)
    }
}

/// A protein group with its per file intensities (set on the first file of
/// every (condition, biorep) sample)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProteinGroup {
    pub name: String,
    intensities: HashMap<PathBuf, f64>,
}

impl ProteinGroup {
    pub fn new(name: String) -> Self {
        Self {
            name,
            intensities: HashMap::new(),
        }
    }

    pub fn intensity(&self, file: &Path) -> f64 {
        self.intensities.get(file).copied().unwrap_or(0.0)
    }

    pub fn set_intensity(&mut self, file: &Path, intensity: f64) {
        self.intensities.insert(file.to_path_buf(), intensity);
    }
}

/// Everything the pipeline produces, and the peptide/protein level
/// calculations over it
#[derive(Clone, Debug, Default)]
pub struct LfqResults {
    /// The resolved chromatographic peaks per spectrum file
    pub peaks: BTreeMap<PathBuf, Vec<ChromatographicPeak>>,
    /// The peptide rows keyed by modified sequence
    pub peptides: BTreeMap<String, Peptide>,
    /// The protein groups keyed by name
    pub protein_groups: BTreeMap<String, ProteinGroup>,
    /// The spectrum files with their experimental design annotations
    pub spectra_files: Vec<SpectraFileInfo>,
}

impl LfqResults {
    pub fn new(spectra_files: Vec<SpectraFileInfo>) -> Self {
        Self {
            peaks: spectra_files
                .iter()
                .map(|file| (file.full_path.clone(), Vec::new()))
                .collect(),
            peptides: BTreeMap::new(),
            protein_groups: BTreeMap::new(),
            spectra_files,
        }
    }

    /// Register the peptide row and protein groups of every identification
    pub fn set_peptides_and_protein_groups(&mut self, identifications: &[Identification]) {
        for identification in identifications {
            let peptide = self
                .peptides
                .entry(identification.modified_sequence().to_string())
                .or_insert_with(|| {
                    Peptide::new(
                        identification.sequence.clone(),
                        identification.modified_sequence().to_string(),
                        identification.use_for_protein_quant,
                        BTreeSet::new(),
                    )
                });
            for protein_group in &identification.protein_groups {
                peptide.insert_protein_group(protein_group.clone());
                self.protein_groups
                    .entry(protein_group.clone())
                    .or_insert_with(|| ProteinGroup::new(protein_group.clone()));
            }
        }
    }

    /// The distinct (condition, biorep) samples with their files, ordered by
    /// condition then biorep
    pub fn samples(&self) -> Vec<(String, usize, Vec<SpectraFileInfo>)> {
        let mut samples: BTreeMap<(String, usize), Vec<SpectraFileInfo>> = BTreeMap::new();
        for file in &self.spectra_files {
            samples
                .entry((file.condition.clone(), file.biorep))
                .or_default()
                .push(file.clone());
        }
        samples
            .into_iter()
            .map(|((condition, biorep), mut files)| {
                files.sort();
                (condition, biorep, files)
            })
            .collect()
    }

    /// Fill the peptide rows from the resolved peaks: per file the highest
    /// intensity unambiguous peak of every modified sequence sets its
    /// intensity and detection type, then ambiguous peaks are reported.
    pub fn calculate_peptide_results(&mut self, quantify_ambiguous: bool) {
        let files: Vec<PathBuf> = self
            .spectra_files
            .iter()
            .map(|file| file.full_path.clone())
            .collect();
        for peptide in self.peptides.values_mut() {
            for file in &files {
                peptide.set_detection_type(file, DetectionType::NotDetected);
                peptide.set_intensity(file, 0.0);
            }
        }

        for (file, file_peaks) in &self.peaks {
            let mut grouped: BTreeMap<&str, Vec<&ChromatographicPeak>> = BTreeMap::new();
            for peak in file_peaks {
                if peak.num_ids_by_full_seq == 1 {
                    grouped
                        .entry(peak.identifications[0].modified_sequence())
                        .or_default()
                        .push(peak);
                }
            }

            for (sequence, peaks) in grouped {
                let best_peak = peaks
                    .iter()
                    .max_by(|a, b| a.intensity.total_cmp(&b.intensity))
                    .unwrap();
                let intensity = best_peak.intensity;

                let detection_type = if best_peak.is_mbr && intensity > 0.0 {
                    DetectionType::MBR
                } else if !best_peak.is_mbr && intensity > 0.0 {
                    DetectionType::MSMS
                } else if !best_peak.is_mbr {
                    DetectionType::MSMSIdentifiedButNotQuantified
                } else {
                    DetectionType::NotDetected
                };

                if let Some(peptide) = self.peptides.get_mut(sequence) {
                    peptide.set_intensity(file, intensity);
                    peptide.set_detection_type(file, detection_type);
                }
            }

            // report ambiguous quantification
            for peak in file_peaks {
                if peak.num_ids_by_full_seq <= 1 {
                    continue;
                }
                for identification in &peak.identifications {
                    let Some(peptide) = self.peptides.get_mut(identification.modified_sequence())
                    else {
                        continue;
                    };
                    let already_recorded = peptide.intensity(file);
                    let fraction_ambiguous =
                        peak.intensity / (already_recorded + peak.intensity);

                    if quantify_ambiguous {
                        if already_recorded.abs() < 0.01 {
                            peptide.set_intensity(file, peak.intensity);
                            peptide
                                .set_detection_type(file, DetectionType::MSMSAmbiguousPeakfinding);
                        } else if fraction_ambiguous > 0.3 {
                            peptide
                                .set_detection_type(file, DetectionType::MSMSAmbiguousPeakfinding);
                        }
                    } else if fraction_ambiguous > 0.3 {
                        peptide.set_detection_type(file, DetectionType::MSMSAmbiguousPeakfinding);
                        peptide.set_intensity(file, 0.0);
                    }
                }
            }
        }

        if !quantify_ambiguous {
            self.handle_ambiguity_in_fractions();
        }
    }

    /// In fractionated samples, a peptide whose highest intensity fraction is
    /// ambiguous cannot be trusted in any fraction of that sample: zero them.
    fn handle_ambiguity_in_fractions(&mut self) {
        let mut to_zero: Vec<(String, Vec<PathBuf>)> = Vec::new();

        for (_, _, sample_files) in self.samples() {
            let fractions: BTreeSet<usize> =
                sample_files.iter().map(|file| file.fraction).collect();
            if fractions.len() <= 1 {
                continue;
            }

            // summed peak intensity per (file, modified sequence), for
            // ambiguous entries whose recorded intensity was zeroed
            let mut summed: HashMap<(&Path, &str), f64> = HashMap::new();
            for file in &sample_files {
                if let Some(file_peaks) = self.peaks.get(&file.full_path) {
                    for peak in file_peaks {
                        for identification in &peak.identifications {
                            *summed
                                .entry((
                                    file.full_path.as_path(),
                                    identification.modified_sequence(),
                                ))
                                .or_default() += peak.intensity;
                        }
                    }
                }
            }

            for (key, peptide) in &self.peptides {
                let mut ambiguity_observed = false;
                let mut fraction_intensities = Vec::new();

                for file in &sample_files {
                    let mut intensity = peptide.intensity(&file.full_path);
                    let detection_type = peptide.detection_type(&file.full_path);

                    if detection_type == DetectionType::MSMSAmbiguousPeakfinding {
                        ambiguity_observed = true;
                        intensity = summed
                            .get(&(file.full_path.as_path(), peptide.modified_sequence()))
                            .copied()
                            .unwrap_or(0.0);
                    }
                    fraction_intensities.push((intensity, detection_type));
                }

                if ambiguity_observed {
                    let highest = fraction_intensities
                        .iter()
                        .max_by(|a, b| a.0.total_cmp(&b.0))
                        .unwrap();
                    if highest.1 == DetectionType::MSMSAmbiguousPeakfinding {
                        to_zero.push((
                            key.clone(),
                            sample_files.iter().map(|f| f.full_path.clone()).collect(),
                        ));
                    }
                }
            }
        }

        for (key, files) in to_zero {
            if let Some(peptide) = self.peptides.get_mut(&key) {
                for file in files {
                    peptide.set_intensity(&file, 0.0);
                }
            }
        }
    }

    /// Roll the peptide intensities up to protein intensities with a weighted
    /// median polish over the log2 peptide × sample matrix.
    pub fn calculate_protein_results_median_polish(&mut self, use_shared_peptides: bool) {
        let samples = self.samples();
        let num_samples = samples.len();
        let files: Vec<PathBuf> = self
            .spectra_files
            .iter()
            .map(|file| file.full_path.clone())
            .collect();

        let peptides = &self.peptides;
        let mut protein_to_peptides: BTreeMap<&str, Vec<&Peptide>> = BTreeMap::new();
        for peptide in peptides.values() {
            if !peptide.unambiguous_quant()
                || !peptide.use_for_protein_quant()
                || (peptide.protein_groups().len() > 1 && !use_shared_peptides)
            {
                continue;
            }
            for protein_group in peptide.protein_groups() {
                protein_to_peptides
                    .entry(protein_group)
                    .or_default()
                    .push(peptide);
            }
        }

        for (name, protein_group) in &mut self.protein_groups {
            for file in &files {
                protein_group.set_intensity(file, 0.0);
            }

            let Some(protein_peptides) = protein_to_peptides.get(name.as_str()) else {
                continue;
            };

            // peptide × sample log2 intensity matrix, top row and left column
            // hold the column and row effects
            let mut matrix =
                Array2::<f64>::zeros((protein_peptides.len() + 1, num_samples + 1));

            for (sample_index, (_, _, sample_files)) in samples.iter().enumerate() {
                let mut by_fraction: BTreeMap<usize, Vec<&SpectraFileInfo>> = BTreeMap::new();
                for file in sample_files {
                    by_fraction.entry(file.fraction).or_default().push(file);
                }

                for (peptide_index, peptide) in protein_peptides.iter().enumerate() {
                    // the fraction with the highest intensity is the sample
                    // intensity; replicates of one fraction are averaged
                    let mut sample_intensity = 0.0;
                    for replicates in by_fraction.values() {
                        let mut fraction_intensity = 0.0;
                        let mut replicates_with_valid_values = 0;
                        for replicate in replicates {
                            let intensity = peptide.intensity(&replicate.full_path);
                            if intensity > 0.0 {
                                fraction_intensity += intensity;
                                replicates_with_valid_values += 1;
                            }
                        }
                        if replicates_with_valid_values > 0 {
                            fraction_intensity /= f64::from(replicates_with_valid_values);
                        }
                        if fraction_intensity > sample_intensity {
                            sample_intensity = fraction_intensity;
                        }
                    }

                    matrix[[peptide_index + 1, sample_index + 1]] = if sample_intensity == 0.0 {
                        f64::NAN
                    } else {
                        sample_intensity.log2()
                    };
                }
            }

            // peptides with a single measurement cannot anchor a comparison
            // across samples, unless nothing better exists
            let peptides_with_more_than_one_measurement = (1..matrix.nrows())
                .filter(|&row| {
                    (1..matrix.ncols())
                        .filter(|&column| !matrix[[row, column]].is_nan())
                        .count()
                        > 1
                })
                .count();
            if peptides_with_more_than_one_measurement > 0 {
                for row in 1..matrix.nrows() {
                    let valid = (0..matrix.ncols())
                        .filter(|&column| {
                            let cell = matrix[[row, column]];
                            !cell.is_nan() && cell != 0.0
                        })
                        .count();
                    if valid < 2 && num_samples >= 2 {
                        for column in 1..matrix.ncols() {
                            matrix[[row, column]] = f64::NAN;
                        }
                    }
                }
            }

            median_polish(&mut matrix, 10, 0.0001);

            let overall_effect = matrix[[0, 0]];
            let reference_intensity =
                2.0_f64.powf(overall_effect) * protein_peptides.len() as f64;

            // samples with measurements but a zero column effect may not be
            // comparable across runs at all
            let sample_has_measurement: Vec<bool> = samples
                .iter()
                .map(|(_, _, sample_files)| {
                    sample_files.iter().any(|file| {
                        protein_peptides
                            .iter()
                            .any(|peptide| peptide.intensity(&file.full_path) != 0.0)
                    })
                })
                .collect();
            let unquantifiable: Vec<usize> = samples
                .iter()
                .enumerate()
                .filter(|(sample_index, _)| {
                    sample_has_measurement[*sample_index]
                        && matrix[[0, sample_index + 1]] == 0.0
                })
                .map(|(sample_index, _)| sample_index)
                .collect();

            for (sample_index, (_, _, sample_files)) in samples.iter().enumerate() {
                if !sample_has_measurement[sample_index] {
                    continue;
                }
                let Some(first_file) = sample_files.first() else {
                    continue;
                };
                if unquantifiable.len() > 1 && unquantifiable.contains(&sample_index) {
                    protein_group.set_intensity(&first_file.full_path, f64::NAN);
                } else {
                    let column_effect = matrix[[0, sample_index + 1]];
                    protein_group.set_intensity(
                        &first_file.full_path,
                        2.0_f64.powf(column_effect) * reference_intensity,
                    );
                }
            }
        }
    }

    /// Write one row per chromatographic peak, sorted by file and descending
    /// intensity.
    /// # Errors
    /// If the file cannot be created or written.
    pub fn write_peaks(&self, path: &Path) -> Result<(), CustomError> {
        let mut writer = create(path)?;
        let header = [
            "File Name",
            "Base Sequence",
            "Full Sequence",
            "Peptide Monoisotopic Mass",
            "MS2 Retention Time",
            "Precursor Charge",
            "Theoretical MZ",
            "Peak intensity",
            "Num Charge States Observed",
            "Peak Detection Type",
            "PSMs Mapped",
            "Peak Split Valley RT",
            "Peak Apex Mass Error (ppm)",
        ];
        writeln!(writer, "{}", header.join("\t")).map_err(|e| write_error(path, e))?;

        for (file, file_peaks) in &self.peaks {
            let mut sorted: Vec<&ChromatographicPeak> = file_peaks.iter().collect();
            sorted.sort_by(|a, b| b.intensity.total_cmp(&a.intensity));

            for peak in sorted {
                let first = &peak.identifications[0];
                let base_sequences = peak
                    .identifications
                    .iter()
                    .map(|identification| identification.sequence.as_str())
                    .collect::<BTreeSet<_>>()
                    .iter()
                    .join("|");
                let full_sequences = peak
                    .identifications
                    .iter()
                    .map(Identification::modified_sequence)
                    .collect::<BTreeSet<_>>()
                    .iter()
                    .join("|");
                let ms2_retention_time = if peak.is_mbr {
                    String::new()
                } else {
                    format!("{}", first.ms2_retention_time.get::<min>())
                };

                writeln!(
                    writer,
                    "{}\t{base_sequences}\t{full_sequences}\t{}\t{ms2_retention_time}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                    file.display(),
                    first.monoisotopic_mass.value,
                    first.precursor_charge,
                    to_mz(first.monoisotopic_mass, first.precursor_charge).value,
                    peak.intensity,
                    peak.num_charge_states,
                    if peak.is_mbr { "MBR" } else { "MSMS" },
                    peak.identifications.len(),
                    peak.split_rt.map_or(0.0, |rt| rt.get::<min>()),
                    peak.mass_error_ppm,
                )
                .map_err(|e| write_error(path, e))?;
            }
        }
        Ok(())
    }

    /// Write the peptide × file intensity and detection type matrix
    /// # Errors
    /// If the file cannot be created or written.
    pub fn write_peptides(&self, path: &Path) -> Result<(), CustomError> {
        let mut writer = create(path)?;
        writeln!(
            writer,
            "Sequence\tModified Sequence\t{}\t{}",
            self.spectra_files
                .iter()
                .map(|file| format!("Intensity_{}", file.full_path.display()))
                .join("\t"),
            self.spectra_files
                .iter()
                .map(|file| format!("Detection Type_{}", file.full_path.display()))
                .join("\t"),
        )
        .map_err(|e| write_error(path, e))?;

        for peptide in self.peptides.values() {
            writeln!(
                writer,
                "{}\t{}\t{}\t{}",
                peptide.sequence(),
                peptide.modified_sequence(),
                self.spectra_files
                    .iter()
                    .map(|file| peptide.intensity(&file.full_path).to_string())
                    .join("\t"),
                self.spectra_files
                    .iter()
                    .map(|file| peptide.detection_type(&file.full_path).to_string())
                    .join("\t"),
            )
            .map_err(|e| write_error(path, e))?;
        }
        Ok(())
    }

    /// Write the protein group × sample intensity matrix
    /// # Errors
    /// If the file cannot be created or written.
    pub fn write_proteins(&self, path: &Path) -> Result<(), CustomError> {
        let mut writer = create(path)?;
        let samples = self.samples();
        writeln!(
            writer,
            "Protein Group\t{}",
            samples
                .iter()
                .map(|(condition, biorep, _)| format!("Intensity_{condition}_{biorep}"))
                .join("\t"),
        )
        .map_err(|e| write_error(path, e))?;

        for (name, protein_group) in &self.protein_groups {
            writeln!(
                writer,
                "{name}\t{}",
                samples
                    .iter()
                    .map(|(_, _, sample_files)| {
                        sample_files
                            .first()
                            .map_or(0.0, |file| protein_group.intensity(&file.full_path))
                            .to_string()
                    })
                    .join("\t"),
            )
            .map_err(|e| write_error(path, e))?;
        }
        Ok(())
    }
}

fn create(path: &Path) -> Result<BufWriter<File>, CustomError> {
    File::create(path).map(BufWriter::new).map_err(|error| {
        CustomError::error(
            "Could not create output file",
            error,
            Context::show(path.to_string_lossy()),
        )
    })
}

fn write_error(path: &Path, error: std::io::Error) -> CustomError {
    CustomError::error(
        "Could not write output file",
        error,
        Context::show(path.to_string_lossy()),
    )
}

/// Weighted median polish: iteratively strip row and column effects from the
/// matrix (data in `[1.., 1..]`, effects accumulate in column and row 0) until
/// the sum of absolute residuals stops improving. The effects are weighted
/// means with weights `1 / max(1e-4, (value − median)²)`, which behaves like a
/// median polish while staying robust to missing values.
pub fn median_polish(table: &mut Array2<f64>, max_iterations: usize, improvement_cutoff: f64) {
    // subtract the overall effect
    let all_values: Vec<f64> = table
        .iter()
        .copied()
        .filter(|cell| !cell.is_nan() && *cell != 0.0)
        .collect();
    if !all_values.is_empty() {
        let overall_effect = median(&all_values);
        table[[0, 0]] += overall_effect;
        for row in 1..table.nrows() {
            for column in 1..table.ncols() {
                table[[row, column]] -= overall_effect;
            }
        }
    }

    let mut sum_absolute_residuals = f64::MAX;

    for _ in 0..max_iterations {
        // subtract row effects
        for row in 0..table.nrows() {
            let row_values: Vec<f64> = (1..table.ncols())
                .map(|column| table[[row, column]])
                .filter(|cell| !cell.is_nan())
                .collect();
            if let Some(row_effect) = weighted_effect(&row_values) {
                table[[row, 0]] += row_effect;
                for column in 1..table.ncols() {
                    table[[row, column]] -= row_effect;
                }
            }
        }

        // subtract column effects
        for column in 0..table.ncols() {
            let column_values: Vec<f64> = (1..table.nrows())
                .map(|row| table[[row, column]])
                .filter(|cell| !cell.is_nan())
                .collect();
            if let Some(column_effect) = weighted_effect(&column_values) {
                table[[0, column]] += column_effect;
                for row in 1..table.nrows() {
                    table[[row, column]] -= column_effect;
                }
            }
        }

        let iteration_sum: f64 = table
            .slice(ndarray::s![1.., 1..])
            .iter()
            .filter(|cell| !cell.is_nan())
            .map(|cell| cell.abs())
            .sum();

        if ((iteration_sum - sum_absolute_residuals) / sum_absolute_residuals).abs()
            < improvement_cutoff
        {
            break;
        }
        sum_absolute_residuals = iteration_sum;
    }
}

fn weighted_effect(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let center = median(values);
    let weights: Vec<f64> = values
        .iter()
        .map(|value| 1.0 / (value - center).powi(2).max(0.0001))
        .collect();
    let weighted_sum: f64 = values
        .iter()
        .zip(&weights)
        .map(|(value, weight)| value * weight)
        .sum();
    Some(weighted_sum / weights.iter().sum::<f64>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::{da, seconds};
    use std::collections::BTreeSet;

    fn file_info(path: &str, condition: &str, biorep: usize) -> SpectraFileInfo {
        SpectraFileInfo {
            full_path: PathBuf::from(path),
            condition: condition.to_string(),
            biorep,
            techrep: 0,
            fraction: 0,
        }
    }

    fn identification(sequence: &str, file: &str, scan_id: usize) -> Identification {
        Identification {
            sequence: sequence.to_string(),
            modifications: String::new(),
            precursor_charge: 2,
            monoisotopic_mass: da(998.49),
            peak_finding_mass: da(998.49),
            peptide_mass: da(998.49),
            spectral_file: PathBuf::from(file),
            ms2_retention_time: seconds(65.0),
            scan_id,
            protein_groups: BTreeSet::from(["PROT1".to_string()]),
            use_for_protein_quant: true,
        }
    }

    fn msms_peak(sequence: &str, file: &str, scan_id: usize, intensity: f64) -> ChromatographicPeak {
        let mut peak =
            ChromatographicPeak::new(identification(sequence, file, scan_id), false, file.into());
        peak.intensity = intensity;
        peak
    }

    #[test]
    fn spectra_file_ordering() {
        let mut files = vec![
            file_info("b.mzML", "A", 1),
            file_info("a.mzML", "A", 0),
            file_info("c.mzML", "A", 0),
        ];
        files.sort();
        assert_eq!(files[0].full_path, PathBuf::from("a.mzML"));
        assert_eq!(files[1].full_path, PathBuf::from("c.mzML"));
        assert_eq!(files[2].full_path, PathBuf::from("b.mzML"));
    }

    #[test]
    fn peptide_results_detection_types() {
        let files = vec![file_info("run1.mzML", "A", 0)];
        let mut results = LfqResults::new(files);

        let ids = vec![
            identification("PEPTIDEK", "run1.mzML", 1),
            identification("QUANTLESS", "run1.mzML", 2),
        ];
        results.set_peptides_and_protein_groups(&ids);

        results.peaks.get_mut(Path::new("run1.mzML")).unwrap().extend([
            msms_peak("PEPTIDEK", "run1.mzML", 1, 5e5),
            msms_peak("PEPTIDEK", "run1.mzML", 3, 2e5),
            msms_peak("QUANTLESS", "run1.mzML", 2, 0.0),
        ]);

        results.calculate_peptide_results(false);

        let file = Path::new("run1.mzML");
        let quantified = &results.peptides["PEPTIDEK"];
        assert_eq!(quantified.detection_type(file), DetectionType::MSMS);
        // the highest intensity peak of the sequence wins
        assert!((quantified.intensity(file) - 5e5).abs() < f64::EPSILON);

        let unquantified = &results.peptides["QUANTLESS"];
        assert_eq!(
            unquantified.detection_type(file),
            DetectionType::MSMSIdentifiedButNotQuantified
        );
        assert!(unquantified.intensity(file) == 0.0);

        // intensity is zero exactly for the not quantified detection types
        for peptide in results.peptides.values() {
            let zero = peptide.intensity(file) == 0.0;
            let not_quantified = matches!(
                peptide.detection_type(file),
                DetectionType::NotDetected | DetectionType::MSMSIdentifiedButNotQuantified
            );
            assert_eq!(zero, not_quantified);
        }
    }

    #[test]
    fn ambiguous_peak_zeroes_the_peptide() {
        let files = vec![file_info("run1.mzML", "A", 0)];
        let mut results = LfqResults::new(files);

        let ids = vec![
            identification("PEPTIDEK", "run1.mzML", 1),
            identification("OTHERSEQ", "run1.mzML", 2),
        ];
        results.set_peptides_and_protein_groups(&ids);

        // one peak claimed by two different sequences
        let mut ambiguous = msms_peak("PEPTIDEK", "run1.mzML", 1, 4e5);
        ambiguous
            .identifications
            .push(identification("OTHERSEQ", "run1.mzML", 2));
        ambiguous.resolve_identifications();
        assert_eq!(ambiguous.num_ids_by_full_seq, 2);
        results
            .peaks
            .get_mut(Path::new("run1.mzML"))
            .unwrap()
            .push(ambiguous);

        results.calculate_peptide_results(false);

        let file = Path::new("run1.mzML");
        for key in ["PEPTIDEK", "OTHERSEQ"] {
            let peptide = &results.peptides[key];
            assert_eq!(
                peptide.detection_type(file),
                DetectionType::MSMSAmbiguousPeakfinding
            );
            assert!(peptide.intensity(file) == 0.0);
        }
    }

    #[test]
    fn ambiguous_peak_adopted_when_quantifying_ambiguous() {
        let files = vec![file_info("run1.mzML", "A", 0)];
        let mut results = LfqResults::new(files);

        let ids = vec![
            identification("PEPTIDEK", "run1.mzML", 1),
            identification("OTHERSEQ", "run1.mzML", 2),
        ];
        results.set_peptides_and_protein_groups(&ids);

        let mut ambiguous = msms_peak("PEPTIDEK", "run1.mzML", 1, 4e5);
        ambiguous
            .identifications
            .push(identification("OTHERSEQ", "run1.mzML", 2));
        ambiguous.resolve_identifications();
        results
            .peaks
            .get_mut(Path::new("run1.mzML"))
            .unwrap()
            .push(ambiguous);

        results.calculate_peptide_results(true);

        let file = Path::new("run1.mzML");
        for key in ["PEPTIDEK", "OTHERSEQ"] {
            let peptide = &results.peptides[key];
            assert_eq!(
                peptide.detection_type(file),
                DetectionType::MSMSAmbiguousPeakfinding
            );
            assert!((peptide.intensity(file) - 4e5).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn median_polish_strips_row_and_column_effects() {
        // peptides P1 (100, 200) and P2 (150, 300): sample 2 is twice sample 1
        let mut matrix = Array2::<f64>::zeros((3, 3));
        matrix[[1, 1]] = 100.0_f64.log2();
        matrix[[1, 2]] = 200.0_f64.log2();
        matrix[[2, 1]] = 150.0_f64.log2();
        matrix[[2, 2]] = 300.0_f64.log2();

        median_polish(&mut matrix, 10, 0.0001);

        let column_difference = matrix[[0, 2]] - matrix[[0, 1]];
        assert!((column_difference - 1.0).abs() < 1e-9);
        // residuals are gone
        assert!(matrix[[1, 1]].abs() < 1e-9);
        assert!(matrix[[2, 2]].abs() < 1e-9);
    }

    #[test]
    fn protein_rollup_doubles_with_the_samples() {
        let files = vec![
            file_info("run1.mzML", "A", 0),
            file_info("run2.mzML", "B", 0),
        ];
        let mut results = LfqResults::new(files);

        let ids = vec![
            identification("PEPTIDEK", "run1.mzML", 1),
            identification("SEQVENCER", "run1.mzML", 2),
        ];
        results.set_peptides_and_protein_groups(&ids);

        let run1 = Path::new("run1.mzML");
        let run2 = Path::new("run2.mzML");
        {
            let peptide = results.peptides.get_mut("PEPTIDEK").unwrap();
            peptide.set_intensity(run1, 100.0);
            peptide.set_intensity(run2, 200.0);
            peptide.set_detection_type(run1, DetectionType::MSMS);
            peptide.set_detection_type(run2, DetectionType::MSMS);
        }
        {
            let peptide = results.peptides.get_mut("SEQVENCER").unwrap();
            peptide.set_intensity(run1, 150.0);
            peptide.set_intensity(run2, 300.0);
            peptide.set_detection_type(run1, DetectionType::MSMS);
            peptide.set_detection_type(run2, DetectionType::MSMS);
        }

        results.calculate_protein_results_median_polish(false);

        let protein = &results.protein_groups["PROT1"];
        let sample1 = protein.intensity(run1);
        let sample2 = protein.intensity(run2);
        assert!(sample1 > 0.0);
        assert!((sample2 / sample1 - 2.0).abs() < 1e-6);
    }

    #[test]
    fn shared_peptides_are_skipped_unless_requested() {
        let files = vec![file_info("run1.mzML", "A", 0)];
        let mut results = LfqResults::new(files);

        let mut shared = identification("PEPTIDEK", "run1.mzML", 1);
        shared.protein_groups =
            BTreeSet::from(["PROT1".to_string(), "PROT2".to_string()]);
        results.set_peptides_and_protein_groups(&[shared]);

        let run1 = Path::new("run1.mzML");
        {
            let peptide = results.peptides.get_mut("PEPTIDEK").unwrap();
            peptide.set_intensity(run1, 100.0);
            peptide.set_detection_type(run1, DetectionType::MSMS);
        }

        results.calculate_protein_results_median_polish(false);
        assert!(results.protein_groups["PROT1"].intensity(run1) == 0.0);

        results.calculate_protein_results_median_polish(true);
        assert!(results.protein_groups["PROT1"].intensity(run1) > 0.0);
    }
}
