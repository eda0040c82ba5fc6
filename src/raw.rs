//! Adapters for reading raw spectrum files through mzdata

use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use mzdata::prelude::*;
use mzdata::spectrum::{MultiLayerSpectrum, RefPeakDataLevel};
use mzdata::MZReader;
use regex::Regex;

use crate::error::{Context, CustomError};
use crate::system::{seconds, Time};

/// One MS1 spectrum reduced to what the peak index needs
#[derive(Clone, Debug)]
pub struct Ms1Spectrum {
    /// The native scan number (one based), or the ordinal when the file has no native scan ids
    pub scan_number: usize,
    /// The scan start time
    pub retention_time: Time,
    /// The centroided peak list as (mz, intensity)
    pub peaks: Vec<(f64, f64)>,
}

/// Extract the native `scan=N` id from a spectrum identifier
fn native_scan_number(id: &str) -> Option<usize> {
    static SCAN_ID: OnceLock<Regex> = OnceLock::new();
    SCAN_ID
        .get_or_init(|| Regex::new(r"scan=(\d+)").unwrap())
        .captures(id)
        .and_then(|captures| captures[1].parse().ok())
}

fn open(path: &Path) -> Result<MZReader<std::fs::File>, CustomError> {
    MZReader::open_path(path).map_err(|error| {
        CustomError::error(
            "Could not open spectrum file",
            error,
            Context::show(path.to_string_lossy()),
        )
    })
}

fn peak_list(spectrum: &MultiLayerSpectrum) -> Vec<(f64, f64)> {
    match spectrum.peaks() {
        RefPeakDataLevel::Missing => Vec::new(),
        RefPeakDataLevel::RawData(arrays) => match (arrays.mzs(), arrays.intensities()) {
            (Ok(mzs), Ok(intensities)) => mzs
                .iter()
                .zip(intensities.iter())
                .map(|(mz, intensity)| (*mz, f64::from(*intensity)))
                .collect(),
            _ => Vec::new(),
        },
        RefPeakDataLevel::Centroid(peaks) => peaks
            .iter()
            .map(|peak| (peak.mz, f64::from(peak.intensity)))
            .collect(),
        RefPeakDataLevel::Deconvoluted(peaks) => peaks
            .iter()
            .map(|peak| (peak.mz(), f64::from(peak.intensity)))
            .collect(),
    }
}

/// Read all MS1 spectra of a file, in file order
/// # Errors
/// If the file cannot be opened or read.
pub fn read_ms1_spectra(path: &Path) -> Result<Vec<Ms1Spectrum>, CustomError> {
    let reader = open(path)?;
    let mut spectra = Vec::new();
    for (ordinal, spectrum) in reader.enumerate() {
        if spectrum.ms_level() != 1 {
            continue;
        }
        let scan_number = native_scan_number(spectrum.id()).unwrap_or(ordinal + 1);
        spectra.push(Ms1Spectrum {
            scan_number,
            retention_time: seconds(spectrum.start_time() * 60.0),
            peaks: peak_list(&spectrum),
        });
    }
    Ok(spectra)
}

/// Read the scan start times of all MS2 spectra of a file, keyed by the
/// native scan number. MS2 scans without a native `scan=N` id are skipped.
/// # Errors
/// If the file cannot be opened or read.
pub fn read_ms2_scan_times(path: &Path) -> Result<HashMap<usize, Time>, CustomError> {
    let reader = open(path)?;
    let mut times = HashMap::new();
    for spectrum in reader {
        if spectrum.ms_level() != 2 {
            continue;
        }
        let Some(scan_number) = native_scan_number(spectrum.id()) else {
            continue;
        };
        times.insert(scan_number, seconds(spectrum.start_time() * 60.0));
    }
    Ok(times)
}
