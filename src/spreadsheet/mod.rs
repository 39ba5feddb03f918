//! # Spreadsheet Processing Module
//!
//! Reads a worksheet through calamine and cuts a rectangular region out of
//! it: header handling, open-ended ranges, stop-at-empty-row and per column
//! type inference. The region is what the `read_sheet` table function hands
//! over to DuckDB.
pub(crate) mod criteria;
pub mod reference;

use crate::database::column::{Column, ColumnType};
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::reference::{index_to_col, index_to_reference, RangeError};
use calamine::{open_workbook_auto, Data, DataType, Reader};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use thiserror::Error;

/// Custom error types for spreadsheet operations.
#[derive(Error, Debug)]
pub enum SpreadsheetError {
    /// Error raised by the workbook decoder
    #[error("Cannot read workbook '{file_name}': {source}")]
    Workbook {
        file_name: String,
        #[source]
        source: calamine::Error,
    },

    /// Requested sheet not found or spreadsheet is empty
    #[error("Sheet '{sheet}' not found in '{file_name}'")]
    SheetNotFound { file_name: String, sheet: String },

    /// The selected region has no column at all
    #[error("Empty sheet or missing data in '{file_name}'")]
    EmptySheet { file_name: String },

    /// Range option could not be parsed or selects no column
    #[error("Invalid range: {0}")]
    InvalidRange(#[from] RangeError),
}

/// Represents a single cell in a spreadsheet with its position and value.
#[derive(Clone, Debug)]
pub(crate) struct Cell {
    /// Row index (0-based)
    pub(crate) row: usize,
    /// Column index (0-based)
    pub(crate) column: usize,
    /// The actual cell data from the spreadsheet
    pub(crate) value: Data,
}

impl Cell {
    fn empty(row: usize, column: usize) -> Self {
        Cell {
            row,
            column,
            value: Data::Empty,
        }
    }

    /// Get Excel-style cell position.
    pub(crate) fn reference(&self) -> String {
        index_to_reference(self.row, self.column)
    }

    /// Empty cells, empty strings and error values count as no data.
    pub(crate) fn is_empty(&self) -> bool {
        match &self.value {
            Data::Empty | Data::Error(_) => true,
            Data::String(value) => value.trim().is_empty(),
            _ => false,
        }
    }

    pub(crate) fn get_bool(&self) -> Option<bool> {
        self.value.get_bool()
    }

    pub(crate) fn get_bigint(&self) -> Option<i64> {
        match self.value {
            Data::Int(value) => Some(value),
            Data::Float(value) => Some(value as i64),
            _ => None,
        }
    }

    pub(crate) fn get_double(&self) -> Option<f64> {
        match self.value {
            Data::Int(value) => Some(value as f64),
            Data::Float(value) => Some(value),
            _ => None,
        }
    }

    /// Extracts the string representation of the cell value.
    ///
    /// Dates and times are rendered in ISO form; errors and empty cells
    /// have no representation.
    pub(crate) fn get_varchar(&self) -> Option<String> {
        match &self.value {
            Data::Bool(value) => Some(value.to_string()),
            Data::Int(value) => Some(value.to_string()),
            Data::Float(value) => Some(value.to_string()),
            Data::String(value) if value.is_empty() => None,
            Data::String(value) => Some(value.to_owned()),
            Data::DateTime(_) => match ColumnType::of(self) {
                Some(ColumnType::Time) => self.get_time().map(|time| time.to_string()),
                Some(ColumnType::Date) => self.get_date().map(|date| date.to_string()),
                _ => self.get_datetime().map(|datetime| datetime.to_string()),
            },
            Data::DateTimeIso(value) | Data::DurationIso(value) => Some(value.to_owned()),
            _ => None,
        }
    }

    /// Handles both Excel's numeric datetime format and ISO strings.
    pub(crate) fn get_datetime(&self) -> Option<NaiveDateTime> {
        match &self.value {
            Data::DateTime(_) => self.value.as_datetime(),
            Data::DateTimeIso(value) => DateTime::parse_from_rfc3339(value)
                .map(|datetime| datetime.naive_local())
                .ok()
                .or_else(|| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").ok())
                .or_else(|| {
                    NaiveDate::parse_from_str(value, "%Y-%m-%d")
                        .ok()
                        .and_then(|date| date.and_hms_opt(0, 0, 0))
                }),
            _ => None,
        }
    }

    pub(crate) fn get_date(&self) -> Option<NaiveDate> {
        self.get_datetime().map(|datetime| datetime.date())
    }

    pub(crate) fn get_time(&self) -> Option<NaiveTime> {
        self.get_datetime().map(|datetime| datetime.time())
    }
}

/// A worksheet loaded into memory with its used boundaries.
#[derive(Debug)]
pub(crate) struct Sheet {
    /// Source file, kept for error messages
    pub(crate) file_name: String,
    /// Sheet name
    pub(crate) name: String,
    /// Used area, None when the sheet holds no cell at all
    pub(crate) bounds: Option<Bounds>,
    /// Index mapping from (row, column) to cell value
    pub(crate) cells: HashMap<(usize, usize), Data>,
}

/// Inclusive 0-based boundaries of the used area of a sheet.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Bounds {
    pub(crate) row_lower_bound: usize,
    pub(crate) row_upper_bound: usize,
    pub(crate) column_lower_bound: usize,
    pub(crate) column_upper_bound: usize,
}

/// Rows cut from a sheet, ready to be streamed into DuckDB.
#[derive(Debug)]
pub(crate) struct Region {
    pub(crate) columns: Vec<Column>,
    pub(crate) rows: Vec<Vec<Cell>>,
}

/// Opens a workbook and loads one sheet, the first one when no name is given.
pub(crate) fn open_sheet(path: &Path, sheet_name: Option<&str>) -> Result<Sheet, SpreadsheetError> {
    let file_name = path.to_string_lossy().to_string();
    let mut workbook = open_workbook_auto(path).map_err(|source| SpreadsheetError::Workbook {
        file_name: file_name.to_owned(),
        source,
    })?;
    let names = workbook.sheet_names();
    let name = match sheet_name {
        Some(name) if names.iter().any(|it| it == name) => name.to_owned(),
        Some(name) => Err(SpreadsheetError::SheetNotFound {
            file_name: file_name.to_owned(),
            sheet: name.to_owned(),
        })?,
        None => names.first().cloned().ok_or_else(|| SpreadsheetError::SheetNotFound {
            file_name: file_name.to_owned(),
            sheet: String::new(),
        })?,
    };
    let range = workbook
        .worksheet_range(&name)
        .map_err(|source| SpreadsheetError::Workbook {
            file_name: file_name.to_owned(),
            source,
        })?;

    let bounds = match (range.start(), range.end()) {
        (Some(start), Some(end)) if !range.is_empty() => Some(Bounds {
            row_lower_bound: start.0 as usize,
            row_upper_bound: end.0 as usize,
            column_lower_bound: start.1 as usize,
            column_upper_bound: end.1 as usize,
        }),
        _ => None,
    };
    let mut cells = HashMap::new();
    if let Some(bounds) = bounds {
        for (row, column, value) in range.used_cells() {
            cells.insert(
                (bounds.row_lower_bound + row, bounds.column_lower_bound + column),
                value.to_owned(),
            );
        }
    }
    Ok(Sheet {
        file_name,
        name,
        bounds,
        cells,
    })
}

impl Sheet {
    /// Gets a cell at the specified position, an empty cell when nothing is stored there.
    pub(crate) fn get(&self, row: usize, column: usize) -> Cell {
        match self.cells.get(&(row, column)) {
            Some(value) => Cell {
                row,
                column,
                value: value.to_owned(),
            },
            None => Cell::empty(row, column),
        }
    }

    /// Cuts the region described by the criteria out of the sheet.
    ///
    /// Missing range parts fall back to the used area of the sheet: an open
    /// end row reads through the last used row. With `header` the first row
    /// of the region names the columns, otherwise columns are named by their
    /// letters. Empty or repeated header names are replaced by the column
    /// letter or suffixed with a counter.
    pub(crate) fn region(&self, criteria: &Criteria) -> Result<Region, SpreadsheetError> {
        let range = criteria.range.as_ref();
        let start_column = range
            .filter(|range| !range.start.column.is_empty())
            .map(|range| range.start.column_index().ok_or_else(|| RangeError::InvalidRangeFormat(range.to_string())))
            .transpose()?;
        let end_column = range
            .filter(|range| !range.end.column.is_empty())
            .map(|range| range.end.column_index().ok_or_else(|| RangeError::InvalidRangeFormat(range.to_string())))
            .transpose()?;
        let start_row = range.filter(|range| range.start.has_row()).map(|range| range.start.row as usize - 1);
        let end_row = range.filter(|range| range.end.has_row()).map(|range| range.end.row as usize - 1);

        let column_lower_bound = start_column
            .or(self.bounds.map(|bounds| bounds.column_lower_bound))
            .ok_or_else(|| SpreadsheetError::EmptySheet {
                file_name: self.file_name.to_owned(),
            })?;
        let column_upper_bound = end_column
            .or(self.bounds.map(|bounds| bounds.column_upper_bound))
            .unwrap_or(column_lower_bound);
        if column_upper_bound < column_lower_bound {
            return Err(RangeError::InvalidRangeFormat(
                range.map(|range| range.to_string()).unwrap_or_default(),
            )
            .into());
        }
        let row_lower_bound = start_row
            .or(self.bounds.map(|bounds| bounds.row_lower_bound))
            .unwrap_or(0);
        // rows beyond the used area are all empty
        let row_upper_bound = match (end_row, self.bounds) {
            (Some(end_row), Some(bounds)) => end_row.min(bounds.row_upper_bound),
            (None, Some(bounds)) => bounds.row_upper_bound,
            (_, None) => row_lower_bound,
        };

        let columns_span = column_lower_bound..=column_upper_bound;
        let (names, first_data_row) = if criteria.header {
            (self.header(row_lower_bound, columns_span.clone()), row_lower_bound + 1)
        } else {
            (columns_span.clone().map(index_to_col).collect(), row_lower_bound)
        };

        let mut rows = Vec::new();
        if self.bounds.is_some() {
            for row in first_data_row..=row_upper_bound {
                let record: Vec<Cell> = columns_span.clone().map(|column| self.get(row, column)).collect();
                if criteria.stop_at_empty && record.iter().all(Cell::is_empty) {
                    break;
                }
                rows.push(record);
            }
        }

        let columns = names
            .into_iter()
            .enumerate()
            .map(|(index, name)| Column {
                name,
                kind: if criteria.all_varchar {
                    ColumnType::Varchar
                } else {
                    ColumnType::detect(rows.iter().map(|record| ColumnType::of(&record[index])))
                },
            })
            .collect();
        Ok(Region { columns, rows })
    }

    /// Reads column names from a header row.
    fn header(&self, row: usize, columns: std::ops::RangeInclusive<usize>) -> Vec<String> {
        let mut seen = HashSet::new();
        columns
            .map(|column| {
                let name = self
                    .get(row, column)
                    .get_varchar()
                    .map(|name| name.trim().to_owned())
                    .filter(|name| !name.is_empty())
                    .unwrap_or_else(|| index_to_col(column));
                let mut unique = name.to_owned();
                let mut counter = 1;
                while !seen.insert(unique.to_ascii_lowercase()) {
                    unique = format!("{name}_{counter}");
                    counter += 1;
                }
                unique
            })
            .collect()
    }
}
