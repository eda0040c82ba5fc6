//! Extracted ion chromatogram construction: walk the peak index forward and
//! backward in retention time from the precursor scan

use crate::index::{IndexedPeak, PeakIndex};
use crate::system::{Mass, Time};
use crate::tolerance::PpmTolerance;

/// Build the chromatogram for a target mass at one charge state. The walk
/// starts at the precursor scan of the identifying MS2 scan and extends in
/// both directions until more than `missed_scans_allowed` consecutive scans
/// yield no matching peak. The result is sorted by retention time.
pub fn peak_find(
    ms2_retention_time: Time,
    mass: Mass,
    charge: i32,
    tolerance: PpmTolerance,
    index: &PeakIndex,
    missed_scans_allowed: usize,
) -> Vec<IndexedPeak> {
    let mut xic = Vec::new();
    let precursor_scan_index = index.precursor_scan_index(ms2_retention_time);
    let num_scans = index.scans().len();

    // go right
    let mut missed_scans = 0;
    for t in precursor_scan_index..num_scans {
        match index.find(mass, t, tolerance, charge) {
            Some(peak) => {
                missed_scans = 0;
                xic.push(*peak);
            }
            None if t != precursor_scan_index => missed_scans += 1,
            None => (),
        }
        if missed_scans > missed_scans_allowed {
            break;
        }
    }

    // go left
    let mut missed_scans = 0;
    for t in (0..precursor_scan_index).rev() {
        match index.find(mass, t, tolerance, charge) {
            Some(peak) => {
                missed_scans = 0;
                xic.push(*peak);
            }
            None => missed_scans += 1,
        }
        if missed_scans > missed_scans_allowed {
            break;
        }
    }

    xic.sort_by(|a, b| a.retention_time.value.total_cmp(&b.retention_time.value));
    xic
}
