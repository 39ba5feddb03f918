use crate::spreadsheet::reference::CellRange;

/// Criteria for selecting a region of rows from a sheet.
#[derive(Clone, Debug, Default)]
pub(crate) struct Criteria {
    /// Sheet to read, first sheet when absent.
    pub(crate) sheet: Option<String>,

    /// Data range within the sheet. An open end row reads to the last used row.
    pub(crate) range: Option<CellRange>,

    /// Treat the first row of the range as column names.
    pub(crate) header: bool,

    /// Stop reading when encountering a completely empty row.
    pub(crate) stop_at_empty: bool,

    /// Expose every column as VARCHAR instead of inferring types.
    pub(crate) all_varchar: bool,
}
