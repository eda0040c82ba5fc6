use std::path::{Path, PathBuf};

use crate::csv::parse_csv;
use crate::error::CustomError;
use crate::results::SpectraFileInfo;

static NUMBER_ERROR: (&str, &str) = (
    "Invalid experimental design line",
    "This column is not a number but it is required to be a number in this format",
);

/// Read the experimental design table assigning every spectrum file its
/// condition, biological replicate, fraction, and technical replicate.
/// Files are matched on the `file name` column against either the file name
/// or the full path of the given spectrum files. Without a design table every
/// file gets the default single sample annotation.
/// # Errors
/// If the table cannot be read or a listed file is not among the spectrum files.
pub fn read_experimental_design(
    spectra_files: &[PathBuf],
    design: Option<&Path>,
) -> Result<Vec<SpectraFileInfo>, CustomError> {
    let mut infos: Vec<SpectraFileInfo> = spectra_files
        .iter()
        .map(|file| SpectraFileInfo::new(file.clone()))
        .collect();

    let Some(design) = design else {
        return Ok(infos);
    };

    for line in parse_csv(design, b'\t')? {
        let line = line?;
        let (name, _) = line.index_column("file name")?;
        let info = infos
            .iter_mut()
            .find(|info| {
                info.full_path.to_string_lossy() == name
                    || info
                        .full_path
                        .file_name()
                        .is_some_and(|file_name| file_name.to_string_lossy() == name)
            })
            .ok_or_else(|| {
                CustomError::error(
                    "Unknown file in experimental design",
                    format!("The file '{name}' is not among the given spectrum files"),
                    line.full_context(),
                )
            })?;
        info.condition = line.index_column("condition")?.0.to_string();
        info.biorep = parse_number(&line, "biorep")?;
        info.fraction = parse_number(&line, "fraction")?;
        info.techrep = parse_number(&line, "techrep")?;
    }
    Ok(infos)
}

fn parse_number(line: &crate::csv::CsvLine, column: &str) -> Result<usize, CustomError> {
    let (value, range) = line.index_column(column)?;
    value.trim().parse().map_err(|_| {
        CustomError::error(NUMBER_ERROR.0, NUMBER_ERROR.1, line.range_context(range.clone()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_single_sample() {
        let files = vec![PathBuf::from("a.mzML"), PathBuf::from("b.mzML")];
        let infos = read_experimental_design(&files, None).unwrap();
        assert_eq!(infos.len(), 2);
        assert!(infos.iter().all(|i| i.condition.is_empty()
            && i.biorep == 0
            && i.fraction == 0
            && i.techrep == 0));
    }

    #[test]
    fn design_table_is_applied() {
        let design_path = std::env::temp_dir().join("rustylfq_design_test.tsv");
        std::fs::write(
            &design_path,
            "file name\tcondition\tbiorep\tfraction\ttechrep\n\
             a.mzML\tcontrol\t0\t0\t0\n\
             b.mzML\ttreated\t1\t2\t1\n",
        )
        .unwrap();

        let files = vec![PathBuf::from("data/a.mzML"), PathBuf::from("b.mzML")];
        let infos = read_experimental_design(&files, Some(&design_path)).unwrap();
        std::fs::remove_file(&design_path).ok();

        // matched on the file name even though the full path differs
        assert_eq!(infos[0].condition, "control");
        assert_eq!(infos[1].condition, "treated");
        assert_eq!(infos[1].biorep, 1);
        assert_eq!(infos[1].fraction, 2);
        assert_eq!(infos[1].techrep, 1);
    }

    #[test]
    fn unknown_file_is_an_error() {
        let design_path = std::env::temp_dir().join("rustylfq_design_unknown.tsv");
        std::fs::write(
            &design_path,
            "file name\tcondition\tbiorep\tfraction\ttechrep\nmissing.mzML\tA\t0\t0\t0\n",
        )
        .unwrap();

        let files = vec![PathBuf::from("a.mzML")];
        let result = read_experimental_design(&files, Some(&design_path));
        std::fs::remove_file(&design_path).ok();
        assert!(result.is_err());
    }
}
