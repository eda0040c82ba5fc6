//! Methods for reading and parsing tab or comma separated files. (Internal use mostly).

use std::{
    fs::File,
    io::{BufRead, BufReader},
    ops::Range,
};

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Context, CustomError},
    helper_functions::check_extension,
};

/// A single line in a delimited text file, holding the headers it was read under
#[derive(Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub struct CsvLine {
    line_index: usize,
    line: String,
    fields: Vec<(String, Range<usize>)>,
}

impl CsvLine {
    /// Get the line index (0 based)
    pub const fn line_index(&self) -> usize {
        self.line_index
    }

    /// Get the full line
    pub fn line(&self) -> &str {
        &self.line
    }

    /// Get the column headers
    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.0.as_str())
    }

    /// Get the number of columns
    pub fn number_of_columns(&self) -> usize {
        self.fields.len()
    }

    /// Get the context for the specified range in the original line
    pub fn range_context(&self, range: Range<usize>) -> Context {
        Context::line(self.line_index, self.line.clone(), range.start, range.len())
    }

    /// Get the context for the whole line
    pub fn full_context(&self) -> Context {
        Context::full_line(self.line_index, self.line.clone())
    }

    /// Get the range of a specified column
    pub fn range(&self, index: usize) -> &Range<usize> {
        &self.fields[index].1
    }

    /// Get the specified column, by column name
    /// # Errors
    /// If the given name is not a column header return an error
    pub fn index_column(&self, name: &str) -> Result<(&str, &Range<usize>), CustomError> {
        self.fields
            .iter()
            .find(|f| f.0 == name)
            .map(|f| (&self.line[f.1.clone()], &f.1))
            .ok_or_else(|| {
                CustomError::error(
                    "Could not find given column",
                    format!("This file does not contain the needed column '{name}'"),
                    self.full_context(),
                )
            })
    }
}

impl std::ops::Index<usize> for CsvLine {
    type Output = str;
    fn index(&self, index: usize) -> &str {
        &self.line[self.fields[index].1.clone()]
    }
}

impl std::fmt::Display for CsvLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.line_index + 1, self.line)
    }
}

/// Parse a delimited text file into an iterator with the parsed lines.
/// Gzipped files (detected by their extension) are decompressed transparently.
/// # Errors
/// If the file cannot be opened or the header line could not be read.
pub fn parse_csv(
    path: impl AsRef<std::path::Path>,
    separator: u8,
) -> Result<Box<dyn Iterator<Item = Result<CsvLine, CustomError>>>, CustomError> {
    let file = File::open(path.as_ref()).map_err(|e| {
        CustomError::error(
            "Could not open file",
            e,
            Context::show(path.as_ref().to_string_lossy()),
        )
    })?;
    if check_extension(path, "gz") {
        Ok(Box::new(parse_csv_raw(GzDecoder::new(file), separator)?))
    } else {
        Ok(Box::new(parse_csv_raw(file, separator)?))
    }
}

/// Parse a delimited text file from a raw reader, taking the first line as header
/// # Errors
/// If the header line could not be read.
pub fn parse_csv_raw<T: std::io::Read>(
    reader: T,
    separator: u8,
) -> Result<CsvLineIter<T>, CustomError> {
    let reader = BufReader::new(reader);
    let mut lines = reader.lines().enumerate();
    let (_, header_line) = lines.next().ok_or_else(|| {
        CustomError::error("Could not parse file", "The file is empty", Context::None)
    })?;
    let header_line = header_line
        .map_err(|err| CustomError::error("Could not read header line", err, Context::None))?;
    let header = split_line(&header_line, separator)
        .into_iter()
        .map(|r| header_line[r].to_lowercase())
        .collect();

    Ok(CsvLineIter {
        lines,
        header,
        separator,
    })
}

/// An iterator returning parsed lines
pub struct CsvLineIter<T: std::io::Read> {
    lines: std::iter::Enumerate<std::io::Lines<BufReader<T>>>,
    header: Vec<String>,
    separator: u8,
}

impl<T: std::io::Read> Iterator for CsvLineIter<T> {
    type Item = Result<CsvLine, CustomError>;
    fn next(&mut self) -> Option<Self::Item> {
        self.lines.next().map(|(line_index, line)| {
            let line = match line {
                Ok(line) => line.trim_end().to_string(),
                Err(err) => {
                    return Err(CustomError::error(
                        "Could not read line",
                        err,
                        Context::full_line(line_index, "(failed)"),
                    ))
                }
            };
            if line.is_empty() {
                return Err(CustomError::error(
                    "Empty line",
                    "The line is empty",
                    Context::full_line(line_index, line),
                ));
            }
            let row = split_line(&line, self.separator);
            if self.header.len() == row.len() {
                Ok(CsvLine {
                    line_index,
                    line,
                    fields: self.header.iter().cloned().zip(row).collect(),
                })
            } else {
                Err(CustomError::error(
                    "Incorrect number of columns",
                    format!(
                        "{} columns were expected but {} were found",
                        self.header.len(),
                        row.len()
                    ),
                    Context::full_line(line_index, line),
                ))
            }
        })
    }
}

/// Split a line on the separator, with all fields trimmed of surrounding whitespace
fn split_line(line: &str, separator: u8) -> Vec<Range<usize>> {
    let mut row = Vec::new();
    let mut start = 0;
    for (index, byte) in line.bytes().enumerate() {
        if byte == separator {
            row.push(trim_range(line, start..index));
            start = index + 1;
        }
    }
    row.push(trim_range(line, start..line.len()));
    row
}

fn trim_range(line: &str, range: Range<usize>) -> Range<usize> {
    let text = &line[range.clone()];
    let from_start = text.len() - text.trim_start().len();
    let from_end = text.len() - text.trim_end().len();
    range.start + from_start..range.end - from_end
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;

    #[test]
    fn tab_separated() {
        let data = "scan\tcharge\tsequence\n42\t2\tPEPTIDE\n";
        let lines: Vec<_> = parse_csv_raw(BufReader::new(data.as_bytes()), b'\t')
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(lines.len(), 1);
        assert_eq!(&lines[0][0], "42");
        assert_eq!(lines[0].index_column("sequence").unwrap().0, "PEPTIDE");
    }

    #[test]
    fn trims_whitespace() {
        let data = "a\tb\n 1 \t x\n";
        let lines: Vec<_> = parse_csv_raw(BufReader::new(data.as_bytes()), b'\t')
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(&lines[0][0], "1");
        assert_eq!(&lines[0][1], "x");
    }

    #[test]
    fn wrong_column_count() {
        let data = "a\tb\n1\n";
        let mut lines = parse_csv_raw(BufReader::new(data.as_bytes()), b'\t').unwrap();
        assert!(lines.next().unwrap().is_err());
    }

    #[test]
    fn gzipped_file() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let path = std::env::temp_dir().join("rustylfq_csv_test.tsv.gz");
        let mut encoder = GzEncoder::new(
            std::fs::File::create(&path).unwrap(),
            Compression::default(),
        );
        encoder
            .write_all(b"scan\tsequence\n7\tPEPTIDE\n")
            .unwrap();
        encoder.finish().unwrap();

        let lines: Vec<_> = parse_csv(&path, b'\t')
            .unwrap()
            .map(Result::unwrap)
            .collect();
        std::fs::remove_file(&path).ok();

        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].index_column("scan").unwrap().0, "7");
        assert_eq!(lines[0].index_column("sequence").unwrap().0, "PEPTIDE");
    }

    #[test]
    fn missing_column_is_a_context_rich_error() {
        let data = "a\tb\n1\t2\n";
        let line = parse_csv_raw(BufReader::new(data.as_bytes()), b'\t')
            .unwrap()
            .next()
            .unwrap()
            .unwrap();
        let error = line.index_column("c").unwrap_err();
        assert!(error.long_description().contains('c'));
    }
}
