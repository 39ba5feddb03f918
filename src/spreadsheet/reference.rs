//! Spreadsheet coordinate algebra.
//!
//! Cells and ranges are kept as data (`"AR"`, `"A3:AR53"`) so that a range
//! declared in configuration can be re-parsed, shifted and formatted back
//! without losing the spelling the author used.
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

/// Errors related to Excel-style cell and range parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("Invalid cell format '{0}'")]
    InvalidCellFormat(String),

    #[error("Invalid range format '{0}'")]
    InvalidRangeFormat(String),

    #[error("Cell '{0}' lies outside the sheet (last cell is XFD1048576)")]
    CellOutOfBounds(String),
}

/// Last 1-based row of a worksheet.
pub const MAX_ROW: u32 = 1_048_576;

/// Last 0-based column index of a worksheet (`XFD`).
pub const MAX_COLUMN: usize = 16_383;

/// A single cell coordinate such as `A3`, or a bare column such as `AR`.
///
/// `row == 0` means no row was given; it marks the open end of a range.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct CellRef {
    /// Column letters exactly as written
    pub column: String,
    /// 1-based row number, 0 when absent
    pub row: u32,
}

/// An Excel-style range made of two cell coordinates.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct CellRange {
    pub start: CellRef,
    pub end: CellRef,
}

impl CellRef {
    pub fn new(column: impl Into<String>, row: u32) -> Self {
        CellRef {
            column: column.into(),
            row,
        }
    }

    /// Parses a cell coordinate by splitting at the first digit.
    ///
    /// Text before the first digit is the column, the remainder is the row.
    /// Without any digit the whole text is the column and the row is 0.
    pub fn parse(text: &str) -> Result<Self, RangeError> {
        match text.find(|c: char| c.is_ascii_digit()) {
            Some(index) => {
                let row = text[index..]
                    .parse::<u32>()
                    .map_err(|_| RangeError::InvalidCellFormat(text.to_owned()))?;
                Ok(CellRef::new(&text[..index], row))
            }
            None => Ok(CellRef::new(text, 0)),
        }
    }

    /// Fails when the column lies past `XFD` or the row past 1048576.
    pub fn check_bounds(&self) -> Result<(), RangeError> {
        let column_fits = self.column.is_empty()
            || !self.column.chars().all(|c| c.is_ascii_alphabetic())
            || self.column_index().map_or(false, |index| index <= MAX_COLUMN);
        if column_fits && self.row <= MAX_ROW {
            Ok(())
        } else {
            Err(RangeError::CellOutOfBounds(self.to_string()))
        }
    }

    /// Returns true when this coordinate carries an explicit row.
    #[inline]
    pub fn has_row(&self) -> bool {
        self.row > 0
    }

    /// 0-based column index, None when the column is empty or not letters.
    pub fn column_index(&self) -> Option<usize> {
        col_to_index(&self.column)
    }
}

impl Display for CellRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.row == 0 {
            write!(f, "{}", self.column)
        } else {
            write!(f, "{}{}", self.column, self.row)
        }
    }
}

impl FromStr for CellRef {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CellRef::parse(s)
    }
}

impl CellRange {
    pub fn new(start: CellRef, end: CellRef) -> Self {
        CellRange { start, end }
    }

    /// Parses a range such as `A3:AR`. Exactly one `:` separator is required.
    pub fn parse(text: &str) -> Result<Self, RangeError> {
        let mut parts = text.split(':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(start), Some(end), None) => Ok(CellRange {
                start: CellRef::parse(start)?,
                end: CellRef::parse(end)?,
            }),
            _ => Err(RangeError::InvalidRangeFormat(text.to_owned())),
        }
    }

    /// Same range with only the start row replaced.
    pub fn with_start_row(&self, row: u32) -> Self {
        CellRange {
            start: CellRef::new(self.start.column.as_str(), row),
            end: self.end.clone(),
        }
    }

    /// Same range with the end coordinate replaced.
    pub fn with_end(&self, end: CellRef) -> Self {
        CellRange {
            start: self.start.clone(),
            end,
        }
    }

    /// Fails when either corner lies outside the sheet.
    pub fn check_bounds(&self) -> Result<(), RangeError> {
        self.start.check_bounds()?;
        self.end.check_bounds()
    }

    /// A range whose end row is not specified reads to the bottom of the sheet.
    #[inline]
    pub fn is_open_ended(&self) -> bool {
        !self.end.has_row()
    }
}

impl Display for CellRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

impl FromStr for CellRange {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CellRange::parse(s)
    }
}

/// Converts column letters to a 0-based index: A = 0, Z = 25, AA = 26.
/// None when the letters are empty, not letters, or overflow `usize`.
pub(crate) fn col_to_index(letters: &str) -> Option<usize> {
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    letters
        .to_ascii_uppercase()
        .chars()
        .map(|c| c as usize - 'A' as usize + 1)
        .try_fold(0usize, |index, digit| index.checked_mul(26)?.checked_add(digit))
        .map(|column| column - 1)
}

/// Converts a 0-based column index back to letters.
pub(crate) fn index_to_col(index: usize) -> String {
    let mut column = index + 1;
    let mut letters = String::new();
    while column > 0 {
        column -= 1;
        letters.insert(0, (b'A' + (column % 26) as u8) as char);
        column /= 26;
    }
    letters
}

/// Excel-style reference of a 0-based (row, column) position, e.g. `C5`.
pub(crate) fn index_to_reference(row: usize, column: usize) -> String {
    format!("{}{}", index_to_col(column), row + 1)
}
