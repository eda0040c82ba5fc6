use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::csv::{parse_csv, CsvLine};
use crate::error::CustomError;
use crate::system::{da, th, Mass, MassOverCharge};

static NUMBER_ERROR: (&str, &str) = (
    "Invalid PSM line",
    "This column is not a number but it is required to be a number in this format",
);

/// The column layout of one PSM dialect. The three dialects share their
/// required columns and differ in which optional ones they carry.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct PsmFormat {
    version: PsmVersion,
    scan: &'static str,
    z: &'static str,
    precursor_mz: &'static str,
    peptide_mass: &'static str,
    sequence: &'static str,
    modifications: Option<&'static str>,
    proteins: Option<&'static str>,
}

/// The data from a single PSM
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct PsmData {
    /// The scan number of the matched MS2 spectrum
    pub scan: usize,
    /// The charge of the precursor
    pub z: i32,
    /// The m/z of the precursor as recorded in the spectrum
    pub precursor_mz: MassOverCharge,
    /// The neutral monoisotopic mass of the matched peptide
    pub peptide_mass: Mass,
    /// The matched peptide sequence
    pub sequence: String,
    /// The modified peptide sequence, where the dialect carries one
    pub modifications: Option<String>,
    /// The protein(s) this peptide maps to, comma separated
    pub proteins: Option<String>,
    /// The dialect this PSM was read as
    pub version: PsmVersion,
}

impl PsmData {
    /// Parse a single line, automatically determining the dialect
    /// # Errors
    /// When the line fits none of the known dialects
    pub fn parse(source: &CsvLine) -> Result<(Self, &'static PsmFormat), CustomError> {
        for format in [&TIDE_SEARCH, &ASSIGN_CONFIDENCE, &PERCOLATOR] {
            if let Ok(psm) = Self::parse_specific(source, format) {
                return Ok((psm, format));
            }
        }
        Err(CustomError::error(
            "Invalid PSM line",
            "The correct dialect could not be determined automatically",
            source.full_context(),
        ))
    }

    /// Parse a single line with the given dialect
    /// # Errors
    /// When a required column is missing or does not parse
    pub fn parse_specific(source: &CsvLine, format: &PsmFormat) -> Result<Self, CustomError> {
        Ok(Self {
            scan: number(source, format.scan)?,
            z: number(source, format.z)?,
            precursor_mz: th(number(source, format.precursor_mz)?),
            peptide_mass: da(number(source, format.peptide_mass)?),
            sequence: required_text(source, format.sequence)?,
            modifications: optional_text(source, format.modifications),
            proteins: optional_text(source, format.proteins),
            version: format.version,
        })
    }
}

/// Parse a numeric column, pointing at the offending cell on failure
fn number<T: FromStr>(line: &CsvLine, column: &str) -> Result<T, CustomError> {
    let (text, range) = line.index_column(column)?;
    text.trim()
        .parse()
        .map_err(|_| CustomError::error(NUMBER_ERROR.0, NUMBER_ERROR.1, line.range_context(range.clone())))
}

fn required_text(line: &CsvLine, column: &str) -> Result<String, CustomError> {
    line.index_column(column)
        .map(|(text, _)| text.trim().to_string())
}

/// A column the dialect may not carry, or that may be empty on this line
fn optional_text(line: &CsvLine, column: Option<&str>) -> Option<String> {
    column
        .and_then(|column| line.index_column(column).ok())
        .map(|(text, _)| text.trim().to_string())
        .filter(|text| !text.is_empty() && text != "-")
}

/// tide-search output
pub const TIDE_SEARCH: PsmFormat = PsmFormat {
    version: PsmVersion::TideSearch,
    scan: "scan",
    z: "charge",
    precursor_mz: "spectrum precursor m/z",
    peptide_mass: "peptide mass",
    sequence: "sequence",
    modifications: Some("modifications"),
    proteins: Some("protein id"),
};

/// assign-confidence output
pub const ASSIGN_CONFIDENCE: PsmFormat = PsmFormat {
    version: PsmVersion::AssignConfidence,
    scan: "scan",
    z: "charge",
    precursor_mz: "spectrum precursor m/z",
    peptide_mass: "peptide mass",
    sequence: "sequence",
    modifications: None,
    proteins: Some("protein id"),
};

/// percolator output
pub const PERCOLATOR: PsmFormat = PsmFormat {
    version: PsmVersion::Percolator,
    scan: "scan",
    z: "charge",
    precursor_mz: "spectrum precursor m/z",
    peptide_mass: "peptide mass",
    sequence: "sequence",
    modifications: None,
    proteins: Some("protein id"),
};

/// All possible PSM dialects
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, Serialize, Deserialize)]
pub enum PsmVersion {
    /// The tab delimited output of tide-search
    #[default]
    TideSearch,
    /// The tab delimited output of assign-confidence
    AssignConfidence,
    /// The tab delimited output of percolator
    Percolator,
}

impl PsmVersion {
    /// The format definition for this dialect
    pub const fn format(self) -> &'static PsmFormat {
        match self {
            Self::TideSearch => &TIDE_SEARCH,
            Self::AssignConfidence => &ASSIGN_CONFIDENCE,
            Self::Percolator => &PERCOLATOR,
        }
    }
}

impl FromStr for PsmVersion {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tide-search" => Ok(Self::TideSearch),
            "assign-confidence" => Ok(Self::AssignConfidence),
            "percolator" => Ok(Self::Percolator),
            _ => Err(format!(
                "'{s}' is not a PSM file format, use one of: tide-search, assign-confidence, percolator"
            )),
        }
    }
}

impl std::fmt::Display for PsmVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::TideSearch => "tide-search",
                Self::AssignConfidence => "assign-confidence",
                Self::Percolator => "percolator",
            }
        )
    }
}

/// Read a PSM file into a scan number keyed map. Rows that do not parse are
/// skipped with a logged warning, duplicate scan numbers keep the last row.
/// # Errors
/// If the file cannot be opened or its header does not fit the dialect.
pub fn read_psms(
    path: impl AsRef<Path>,
    version: PsmVersion,
) -> Result<BTreeMap<usize, PsmData>, CustomError> {
    let format = version.format();
    let mut psms = BTreeMap::new();
    for line in parse_csv(path, b'\t')? {
        match line.and_then(|line| PsmData::parse_specific(&line, format)) {
            Ok(psm) => {
                psms.insert(psm.scan, psm);
            }
            Err(error) => log::warn!("Skipped PSM row: {error}"),
        }
    }
    Ok(psms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csv::parse_csv_raw;
    use std::io::BufReader;

    const TIDE_DATA: &str = "scan\tcharge\tspectrum precursor m/z\tpeptide mass\tsequence\tmodifications\tprotein id\n\
        812\t2\t500.2547\t998.4948\tLVNELTEFAK\tLVNELTEFAK\tsp|P02769|ALBU_BOVIN\n\
        813\t3\t427.0921\t1278.2545\tHLVDEPQNLIK\tHLVDEPQNLIK\tsp|P02769|ALBU_BOVIN\n";

    const ASSIGN_DATA: &str = "scan\tcharge\tspectrum precursor m/z\tpeptide mass\tsequence\n\
        812\t2\t500.2547\t998.4948\tLVNELTEFAK\n";

    #[test]
    fn tide_search() {
        let lines = parse_csv_raw(BufReader::new(TIDE_DATA.as_bytes()), b'\t').unwrap();
        for line in lines.map(Result::unwrap) {
            let psm = PsmData::parse_specific(&line, &TIDE_SEARCH).unwrap();
            assert!(psm.modifications.is_some());
            assert!(psm.proteins.is_some());
        }
    }

    #[test]
    fn tide_detect() {
        let lines = parse_csv_raw(BufReader::new(TIDE_DATA.as_bytes()), b'\t').unwrap();
        for line in lines.map(Result::unwrap) {
            let (psm, format) = PsmData::parse(&line).unwrap();
            assert_eq!(format, &TIDE_SEARCH);
            assert!(psm.z == 2 || psm.z == 3);
        }
    }

    #[test]
    fn assign_confidence() {
        let lines = parse_csv_raw(BufReader::new(ASSIGN_DATA.as_bytes()), b'\t').unwrap();
        for line in lines.map(Result::unwrap) {
            let psm = PsmData::parse_specific(&line, &ASSIGN_CONFIDENCE).unwrap();
            assert_eq!(psm.sequence, "LVNELTEFAK");
            assert_eq!(psm.modifications, None);
            assert!((psm.peptide_mass.value - 998.4948).abs() < 1e-9);
        }
    }

    #[test]
    fn missing_required_column_is_an_error() {
        let data = "scan\tcharge\tsequence\n812\t2\tLVNELTEFAK\n";
        let lines = parse_csv_raw(BufReader::new(data.as_bytes()), b'\t').unwrap();
        for line in lines.map(Result::unwrap) {
            assert!(PsmData::parse_specific(&line, &ASSIGN_CONFIDENCE).is_err());
        }
    }

    #[test]
    fn empty_optional_column_reads_as_absent() {
        let data = "scan\tcharge\tspectrum precursor m/z\tpeptide mass\tsequence\tmodifications\tprotein id\n\
            812\t2\t500.2547\t998.4948\tLVNELTEFAK\t\t-\n";
        let lines = parse_csv_raw(BufReader::new(data.as_bytes()), b'\t').unwrap();
        for line in lines.map(Result::unwrap) {
            let psm = PsmData::parse_specific(&line, &TIDE_SEARCH).unwrap();
            assert_eq!(psm.modifications, None);
            assert_eq!(psm.proteins, None);
        }
    }

    #[test]
    fn last_psm_wins() {
        let data = "scan\tcharge\tspectrum precursor m/z\tpeptide mass\tsequence\n\
            812\t2\t500.2547\t998.4948\tLVNELTEFAK\n\
            812\t2\t500.2547\t998.4948\tKAFETLENVL\n";
        let lines = parse_csv_raw(BufReader::new(data.as_bytes()), b'\t').unwrap();
        let mut psms = BTreeMap::new();
        for line in lines.map(Result::unwrap) {
            let psm = PsmData::parse_specific(&line, &ASSIGN_CONFIDENCE).unwrap();
            psms.insert(psm.scan, psm);
        }
        assert_eq!(psms.len(), 1);
        assert_eq!(psms[&812].sequence, "KAFETLENVL");
    }
}
