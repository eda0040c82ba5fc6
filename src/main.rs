use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use log::info;

use rustylfq::{run_lfq, LfqSettings, PsmVersion};

/// Label free quantification of peptides and proteins from tandem MS data
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// The peptide spectrum matches, tab delimited (gzip accepted)
    psm_file: PathBuf,

    /// The spectrum files the PSMs were made from
    #[arg(required = true)]
    spectrum_files: Vec<PathBuf>,

    /// The dialect of the PSM file: tide-search, assign-confidence, or percolator
    #[arg(long, default_value = "tide-search")]
    psm_file_format: PsmVersion,

    /// Tab delimited table assigning every spectrum file its condition,
    /// biorep, fraction, and techrep
    #[arg(long)]
    experimental_design: Option<PathBuf>,

    /// Where the output tables are written
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Worker count for the quantification stage
    #[arg(long, default_value_t = 4)]
    threads: usize,

    /// Minimum isotopes required for a valid isotopic envelope
    #[arg(long, default_value_t = 2)]
    num_isotopes_required: usize,

    /// The ppm tolerance of the chromatogram walk
    #[arg(long, default_value_t = 20.0)]
    peak_finding_ppm_tolerance: f64,

    /// The stricter ppm tolerance applied after the walk
    #[arg(long, default_value_t = 10.0)]
    ppm_tolerance: f64,

    /// The ppm tolerance for matching isotope peaks
    #[arg(long, default_value_t = 5.0)]
    isotope_tolerance_ppm: f64,

    /// Only build chromatograms at the charge of the identification
    #[arg(long)]
    id_specific_charge_state: bool,

    /// Consecutive missed scans ending the chromatogram walk
    #[arg(long, default_value_t = 1)]
    missed_scans_allowed: usize,

    /// Report the summed envelope intensity instead of the apex intensity
    #[arg(long)]
    integrate: bool,

    /// Valley depth above which a chromatographic peak is split
    #[arg(long, default_value_t = 0.6)]
    discrimination_factor_to_cut_peak: f64,

    /// Also quantify peptides with ambiguous peaks
    #[arg(long)]
    quantify_ambiguous_peptides: bool,

    /// Let shared peptides contribute to protein quantification
    #[arg(long)]
    use_shared_peptides_for_protein_quant: bool,

    /// Normalize intensities across fractions, bioreps, and techreps
    #[arg(long)]
    normalize: bool,

    /// Persist the MS1 peak index of every run for later match between runs use
    #[arg(long)]
    match_between_runs: bool,

    /// Reserved for match between runs peak inference
    #[arg(long, default_value_t = 10.0)]
    match_between_runs_ppm_tolerance: f64,

    /// Reserved for match between runs peak inference (minutes)
    #[arg(long, default_value_t = 2.5)]
    max_mbr_window: f64,

    /// Reserved for match between runs peak inference
    #[arg(long)]
    require_msms_id_in_condition: bool,
}

impl Args {
    fn settings(&self) -> LfqSettings {
        LfqSettings {
            num_isotopes_required: self.num_isotopes_required,
            peak_finding_ppm_tolerance: self.peak_finding_ppm_tolerance,
            ppm_tolerance: self.ppm_tolerance,
            isotope_tolerance_ppm: self.isotope_tolerance_ppm,
            id_specific_charge_state: self.id_specific_charge_state,
            missed_scans_allowed: self.missed_scans_allowed,
            integrate: self.integrate,
            discrimination_factor_to_cut_peak: self.discrimination_factor_to_cut_peak,
            quantify_ambiguous_peptides: self.quantify_ambiguous_peptides,
            use_shared_peptides_for_protein_quant: self.use_shared_peptides_for_protein_quant,
            normalize: self.normalize,
            match_between_runs: self.match_between_runs,
            match_between_runs_ppm_tolerance: self.match_between_runs_ppm_tolerance,
            max_mbr_window: self.max_mbr_window,
            require_msms_id_in_condition: self.require_msms_id_in_condition,
            max_threads: self.threads,
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let settings = args.settings();

    rayon::ThreadPoolBuilder::new()
        .num_threads(settings.max_threads)
        .build_global()
        .ok();

    let start = Instant::now();
    match run_lfq(
        &args.psm_file,
        args.psm_file_format,
        &args.spectrum_files,
        args.experimental_design.as_deref(),
        &args.output_dir,
        &settings,
    ) {
        Ok(results) => {
            let quantified = results
                .peaks
                .values()
                .map(|peaks| peaks.len())
                .sum::<usize>();
            info!(
                "Quantified {quantified} peaks over {} files in {:.1} s",
                results.spectra_files.len(),
                start.elapsed().as_secs_f64()
            );
        }
        Err(error) => {
            log::error!("{error}");
            std::process::exit(1);
        }
    }
}
