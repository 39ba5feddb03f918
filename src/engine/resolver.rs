//! Turns a relative range into a concrete one once its anchor is ingested.
use crate::config::{EndRowPolicy, RelativeRange};
use crate::spreadsheet::reference::{CellRange, CellRef};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    #[error("Anchor import #{anchor} has no range to place dependents after")]
    UnresolvedRelativeRange { anchor: usize },

    #[error("Relative range resolves to row {row}, outside the sheet")]
    RowOutOfBounds { row: i64 },
}

/// Effective range and header flag of an ingested anchor.
#[derive(Copy, Clone, Debug)]
pub struct Anchor<'a> {
    pub range: &'a CellRange,
    pub header: bool,
}

/// Where the anchor's data ends.
///
/// An explicit end row is used as is. An open end is computed from the
/// number of rows the anchor stored for the document; under
/// [`EndRowPolicy::HeaderAware`] a headerless anchor counts one row less.
pub fn anchor_end<E, F>(anchor: Anchor<'_>, policy: EndRowPolicy, count_rows: F) -> Result<CellRange, E>
where
    E: From<ResolveError>,
    F: FnOnce() -> Result<u64, E>,
{
    if !anchor.range.is_open_ended() {
        return Ok(anchor.range.clone());
    }
    let mut rows = count_rows()? as i64;
    if policy == EndRowPolicy::HeaderAware && !anchor.header {
        rows -= 1;
    }
    let row = i64::from(anchor.range.start.row) + rows;
    let row = u32::try_from(row).map_err(|_| ResolveError::RowOutOfBounds { row })?;
    Ok(anchor.range.with_end(CellRef::new(anchor.range.end.column.as_str(), row)))
}

/// The anchor's range moved to start `rows_offset` rows after the anchor's
/// end row. The end reference, open or not, is kept.
pub fn dependent_range(template: &CellRange, anchor_end: &CellRange, rows_offset: i64) -> Result<CellRange, ResolveError> {
    let row = i64::from(anchor_end.end.row) + rows_offset;
    match u32::try_from(row) {
        Ok(start) if start > 0 => Ok(template.with_start_row(start)),
        _ => Err(ResolveError::RowOutOfBounds { row }),
    }
}

/// Resolves a relative range against an ingested anchor.
pub fn resolve<E, F>(anchor: Anchor<'_>, relative: &RelativeRange, count_rows: F) -> Result<CellRange, E>
where
    E: From<ResolveError>,
    F: FnOnce() -> Result<u64, E>,
{
    let end = anchor_end(anchor, relative.end_row_policy, count_rows)?;
    Ok(dependent_range(anchor.range, &end, relative.rows_offset)?)
}
