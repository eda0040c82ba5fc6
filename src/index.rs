//! The indexed MS1 peak store: every peak of every MS1 scan, binned by m/z
//! bucket and keyed by scan, plus the ordered scan registry of the file.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::chemistry::{to_mass, to_mz, BINS_PER_DALTON};
use crate::error::{Context, CustomError};
use crate::helper_functions::f64_bits;
use crate::raw::Ms1Spectrum;
use crate::system::{seconds, th, Mass, MassOverCharge, Time};
use crate::tolerance::PpmTolerance;

/// One peak of one MS1 scan as stored in the index. Immutable after
/// construction; the same tuple is handed out by every lookup.
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct IndexedPeak {
    /// The m/z of the peak
    pub mz: MassOverCharge,
    /// The intensity of the peak
    pub intensity: f64,
    /// The zero based index of the containing scan among the MS1 scans of the file
    pub scan_index: usize,
    /// The retention time of the containing scan
    pub retention_time: Time,
}

impl PartialEq for IndexedPeak {
    fn eq(&self, other: &Self) -> bool {
        f64_bits(self.mz.value) == f64_bits(other.mz.value) && self.scan_index == other.scan_index
    }
}

impl Eq for IndexedPeak {}

impl Hash for IndexedPeak {
    fn hash<H: Hasher>(&self, state: &mut H) {
        f64_bits(self.mz.value).hash(state);
    }
}

/// One MS1 scan in the registry of a file
#[derive(Copy, Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct ScanInfo {
    /// The native (one based) scan number
    pub scan_number: usize,
    /// The zero based index of this scan among the MS1 scans of the file
    pub scan_index: usize,
    /// The scan start time (kept in seconds, converted only at boundaries)
    pub retention_time: Time,
}

/// The peak index of one spectrum file: integer m/z bucket → scan index →
/// peak, alongside the ordered scan registry.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PeakIndex {
    bins: HashMap<u32, BTreeMap<usize, IndexedPeak>>,
    scans: Vec<ScanInfo>,
}

impl PeakIndex {
    /// Build the index from the MS1 spectra of one file, in file order. Every
    /// spectrum gets the next zero based scan index; every peak lands in the
    /// bucket `round(mz × BINS_PER_DALTON)`. When two peaks of one scan share
    /// a bucket the first one is kept.
    pub fn build(spectra: impl IntoIterator<Item = Ms1Spectrum>) -> Self {
        let mut index = Self::default();
        for (scan_index, spectrum) in spectra.into_iter().enumerate() {
            index.scans.push(ScanInfo {
                scan_number: spectrum.scan_number,
                scan_index,
                retention_time: spectrum.retention_time,
            });
            for (mz, intensity) in spectrum.peaks {
                let bucket = (mz * BINS_PER_DALTON).round() as u32;
                index
                    .bins
                    .entry(bucket)
                    .or_default()
                    .entry(scan_index)
                    .or_insert(IndexedPeak {
                        mz: th(mz),
                        intensity,
                        scan_index,
                        retention_time: spectrum.retention_time,
                    });
            }
        }
        index
    }

    /// The ordered scan registry of this file
    pub fn scans(&self) -> &[ScanInfo] {
        &self.scans
    }

    /// Whether the index holds any peaks
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Find the peak closest to the target mass in the given scan, or None
    /// when no peak in the scan falls within the tolerance. The search covers
    /// every bucket the tolerance window can touch at the given charge, and
    /// tolerance checks run on the mass computed back from the peak m/z.
    pub fn find(
        &self,
        target_mass: Mass,
        scan_index: usize,
        tolerance: PpmTolerance,
        charge: i32,
    ) -> Option<&IndexedPeak> {
        let min_mz = to_mz(tolerance.minimum_value(target_mass), charge);
        let max_mz = to_mz(tolerance.maximum_value(target_mass), charge);
        let floor = (min_mz.value * BINS_PER_DALTON).floor() as u32;
        let ceiling = (max_mz.value * BINS_PER_DALTON).ceil() as u32;

        let mut best: Option<(&IndexedPeak, f64)> = None;
        for bucket in floor..=ceiling {
            let Some(bin) = self.bins.get(&bucket) else {
                continue;
            };
            let Some(peak) = bin.get(&scan_index) else {
                continue;
            };
            let experimental_mass = to_mass(peak.mz, charge);
            if !tolerance.within(experimental_mass, target_mass) {
                continue;
            }
            let offset = (experimental_mass.value - target_mass.value).abs();
            if best.map_or(true, |(_, best_offset)| offset < best_offset) {
                best = Some((peak, offset));
            }
        }
        best.map(|(peak, _)| peak)
    }

    /// The index of the precursor scan for an MS2 scan at the given retention
    /// time: the latest MS1 scan starting at or before it, or the first scan
    /// when the MS2 time precedes every MS1 scan.
    pub fn precursor_scan_index(&self, ms2_retention_time: Time) -> usize {
        let mut precursor = 0;
        for scan in &self.scans {
            if scan.retention_time <= ms2_retention_time {
                precursor = scan.scan_index;
            } else {
                break;
            }
        }
        precursor
    }

    /// Write this index to disk in the stable binary format
    /// # Errors
    /// If the file cannot be created or written.
    pub fn write_to(&self, path: &Path) -> Result<(), CustomError> {
        let file = File::create(path).map_err(|error| {
            CustomError::error(
                "Could not create index file",
                error,
                Context::show(path.to_string_lossy()),
            )
        })?;
        bincode::serialize_into(BufWriter::new(file), &WireIndex::from(self)).map_err(|error| {
            CustomError::error(
                "Could not write index file",
                error,
                Context::show(path.to_string_lossy()),
            )
        })
    }

    /// Read an index written by [`Self::write_to`]
    /// # Errors
    /// If the file cannot be opened or does not hold a valid index.
    pub fn read_from(path: &Path) -> Result<Self, CustomError> {
        let file = File::open(path).map_err(|error| {
            CustomError::error(
                "Could not open index file",
                error,
                Context::show(path.to_string_lossy()),
            )
        })?;
        let wire: WireIndex =
            bincode::deserialize_from(BufReader::new(file)).map_err(|error| {
                CustomError::error(
                    "Could not read index file",
                    error,
                    Context::show(path.to_string_lossy()),
                )
            })?;
        Ok(Self::from(wire))
    }
}

// The on disk representation, kept independent of the in memory layout so the
// format stays stable: bucket → scan index → peak tuple, plus the scan list.

#[derive(Serialize, Deserialize)]
struct WirePeak {
    mz: f64,
    intensity: f64,
    scan_index: i32,
    retention_time: f64,
}

#[derive(Serialize, Deserialize)]
struct WireScan {
    scan_number: i32,
    scan_index: i32,
    retention_time: f64,
}

#[derive(Serialize, Deserialize)]
struct WireIndex {
    peaks: BTreeMap<i32, BTreeMap<i32, WirePeak>>,
    scans: Vec<WireScan>,
}

impl From<&PeakIndex> for WireIndex {
    fn from(index: &PeakIndex) -> Self {
        Self {
            peaks: index
                .bins
                .iter()
                .map(|(bucket, bin)| {
                    (
                        *bucket as i32,
                        bin.iter()
                            .map(|(scan_index, peak)| {
                                (
                                    *scan_index as i32,
                                    WirePeak {
                                        mz: peak.mz.value,
                                        intensity: peak.intensity,
                                        scan_index: peak.scan_index as i32,
                                        retention_time: peak.retention_time.value,
                                    },
                                )
                            })
                            .collect(),
                    )
                })
                .collect(),
            scans: index
                .scans
                .iter()
                .map(|scan| WireScan {
                    scan_number: scan.scan_number as i32,
                    scan_index: scan.scan_index as i32,
                    retention_time: scan.retention_time.value,
                })
                .collect(),
        }
    }
}

impl From<WireIndex> for PeakIndex {
    fn from(wire: WireIndex) -> Self {
        Self {
            bins: wire
                .peaks
                .into_iter()
                .map(|(bucket, bin)| {
                    (
                        bucket as u32,
                        bin.into_iter()
                            .map(|(scan_index, peak)| {
                                (
                                    scan_index as usize,
                                    IndexedPeak {
                                        mz: th(peak.mz),
                                        intensity: peak.intensity,
                                        scan_index: peak.scan_index as usize,
                                        retention_time: seconds(peak.retention_time),
                                    },
                                )
                            })
                            .collect(),
                    )
                })
                .collect(),
            scans: wire
                .scans
                .into_iter()
                .map(|scan| ScanInfo {
                    scan_number: scan.scan_number as usize,
                    scan_index: scan.scan_index as usize,
                    retention_time: seconds(scan.retention_time),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::system::da;

    /// Build a one peak per scan test index: `peaks` is (scan ordinal, mz, intensity),
    /// scans run at one second spacing starting at `start_rt`
    pub(crate) fn test_index(num_scans: usize, start_rt: f64, peaks: &[(usize, f64, f64)]) -> PeakIndex {
        PeakIndex::build((0..num_scans).map(|scan| Ms1Spectrum {
            scan_number: scan + 1,
            retention_time: seconds(start_rt + scan as f64),
            peaks: peaks
                .iter()
                .filter(|(s, _, _)| *s == scan)
                .map(|(_, mz, intensity)| (*mz, *intensity))
                .collect(),
        }))
    }

    #[test]
    fn find_within_tolerance() {
        let index = test_index(10, 60.0, &[(5, 500.25, 1e6)]);
        let target = to_mass(th(500.25), 2);
        let found = index
            .find(target, 5, PpmTolerance::new(10.0), 2)
            .expect("peak should be found");
        assert_eq!(found.scan_index, 5);
        assert!((found.intensity - 1e6).abs() < f64::EPSILON);
        // not present on another scan
        assert!(index.find(target, 4, PpmTolerance::new(10.0), 2).is_none());
        // far away mass misses
        assert!(index
            .find(da(1500.0), 5, PpmTolerance::new(10.0), 2)
            .is_none());
    }

    #[test]
    fn find_returns_closest() {
        let index = test_index(
            1,
            60.0,
            &[(0, 500.2500, 1.0), (0, 500.2501, 2.0)],
        );
        // both peaks are within 10 ppm of the first peak's mass, the closer one wins
        let target = to_mass(th(500.2500), 1);
        let found = index.find(target, 0, PpmTolerance::new(10.0), 1).unwrap();
        assert!((found.mz.value - 500.2500).abs() < 1e-9);
    }

    #[test]
    fn find_with_zero_tolerance_returns_same_peak() {
        let index = test_index(3, 60.0, &[(1, 433.53, 5e4)]);
        let peak = *index
            .find(to_mass(th(433.53), 2), 1, PpmTolerance::new(10.0), 2)
            .unwrap();
        let again = index
            .find(to_mass(peak.mz, 2), peak.scan_index, PpmTolerance::new(0.0), 2)
            .unwrap();
        assert_eq!(*again, peak);
    }

    #[test]
    fn precursor_scan_lookup() {
        let index = test_index(10, 60.0, &[]);
        // scans at 60..=69 s
        assert_eq!(index.precursor_scan_index(seconds(65.5)), 5);
        assert_eq!(index.precursor_scan_index(seconds(200.0)), 9);
        // an MS1 scan starting exactly at the MS2 time is the precursor
        assert_eq!(index.precursor_scan_index(seconds(65.0)), 5);
        assert_eq!(index.precursor_scan_index(seconds(64.999)), 4);
        // before the first scan: the walk starts at the first scan
        assert_eq!(index.precursor_scan_index(seconds(10.0)), 0);
    }

    #[test]
    fn round_trip_on_disk() {
        let index = test_index(4, 60.0, &[(0, 500.25, 1e5), (2, 500.2503, 2e5), (2, 731.31, 3e4)]);
        let path = std::env::temp_dir().join("rustylfq_index_round_trip.bin");
        index.write_to(&path).unwrap();
        let restored = PeakIndex::read_from(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(index.scans(), restored.scans());
        for (bucket, bin) in &index.bins {
            let restored_bin = &restored.bins[bucket];
            for (scan, peak) in bin {
                let restored_peak = &restored_bin[scan];
                assert_eq!(peak, restored_peak);
                assert_eq!(
                    f64_bits(peak.intensity),
                    f64_bits(restored_peak.intensity)
                );
                assert_eq!(
                    f64_bits(peak.retention_time.value),
                    f64_bits(restored_peak.retention_time.value)
                );
            }
        }
    }

    #[test]
    fn restored_index_gives_identical_chromatograms() {
        let index = test_index(
            10,
            60.0,
            &[(3, 500.25, 1e5), (4, 500.25, 4e5), (5, 500.25, 9e5), (6, 500.25, 2e5)],
        );
        let path = std::env::temp_dir().join("rustylfq_index_xic_round_trip.bin");
        index.write_to(&path).unwrap();
        let restored = PeakIndex::read_from(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let target = to_mass(th(500.25), 2);
        let original_xic = crate::quant::peak_find(
            seconds(65.2),
            target,
            2,
            PpmTolerance::new(20.0),
            &index,
            1,
        );
        let restored_xic = crate::quant::peak_find(
            seconds(65.2),
            target,
            2,
            PpmTolerance::new(20.0),
            &restored,
            1,
        );
        assert_eq!(original_xic, restored_xic);
        assert_eq!(original_xic.len(), 4);
        for (a, b) in original_xic.iter().zip(&restored_xic) {
            assert_eq!(f64_bits(a.intensity), f64_bits(b.intensity));
            assert_eq!(f64_bits(a.mz.value), f64_bits(b.mz.value));
        }
    }
}
