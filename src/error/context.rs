use serde::*;
use std::fmt;

/// A struct to define the context of an error message
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum Context {
    /// When no context can be given
    None,
    /// When only a line (e.g. a filename) can be shown
    Show {
        /// The line to be shown to the user (e.g. filename)
        line: String,
    },
    /// When a full line is faulty and no special position can be annotated
    FullLine {
        /// The line number to recognise where the error is located
        line_index: usize,
        /// The line to show the issue itself
        line: String,
    },
    /// When a special position can be annotated on a line.
    /// ```text
    ///      |
    /// 104  | scan	charge	spectrum precursor m/z
    ///      |      ^^^^^^
    /// ```
    Line {
        /// The line index to recognise where the error is located
        line_index: usize,
        /// The line to show the issue itself
        line: String,
        /// The offset of the special position to be annotated
        offset: usize,
        /// The length of the special position to be annotated
        length: usize,
    },
}

#[allow(clippy::needless_pass_by_value)] // the impl ToString should be passed like this, otherwise &str gives errors
impl Context {
    /// Creates a new context when no context can be given
    pub const fn none() -> Self {
        Self::None
    }

    /// Creates a new context when only a line (e.g. filename) can be shown
    pub fn show(line: impl std::string::ToString) -> Self {
        Self::Show {
            line: line.to_string().replace('\t', " "),
        }
    }

    /// Creates a new context when a full line is faulty and no special position can be annotated
    pub fn full_line(line_index: usize, line: impl std::string::ToString) -> Self {
        Self::FullLine {
            line_index,
            line: line.to_string().replace('\t', " "),
        }
    }

    /// Creates a new context when a special position can be annotated on a line
    pub fn line(
        line_index: usize,
        line: impl std::string::ToString,
        offset: usize,
        length: usize,
    ) -> Self {
        Self::Line {
            line_index,
            line: line.to_string().replace('\t', " "),
            offset,
            length,
        }
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => Ok(()),
            Self::Show { line } => write!(f, "\n{line}"),
            Self::FullLine { line_index, line } => write!(f, "\n{}: {line}", line_index + 1),
            Self::Line {
                line_index,
                line,
                offset,
                length,
            } => {
                let number = (line_index + 1).to_string();
                write!(
                    f,
                    "\n{number}: {line}\n{}{}",
                    " ".repeat(number.len() + 2 + offset),
                    "^".repeat((*length).max(1)),
                )
            }
        }
    }
}
