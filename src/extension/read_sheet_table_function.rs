//! # Read Sheet Table Function
//!
//! Implements `read_sheet(path, sheet, range, header, stop_at_empty,
//! all_varchar)`, the table-valued spreadsheet reader the ingestion
//! statements select from.
use crate::database::column::ColumnType;
use crate::extension::{
    AllVarcharParam, HeaderParam, NamedParam, RangeParam, SheetParam, StopAtEmptyParam,
};
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::{open_sheet, Cell, Region};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use duckdb::{
    core::{DataChunkHandle, FlatVector, Inserter, LogicalTypeHandle, LogicalTypeId},
    ffi::{duckdb_date, duckdb_time, duckdb_timestamp},
    vtab::{BindInfo, InitInfo, TableFunctionInfo, VTab},
};
use std::{error::Error, path::Path, sync::atomic::AtomicUsize, sync::atomic::Ordering};
use tracing::debug;

/// Rows emitted per output chunk, below DuckDB's standard vector size.
const STEP: usize = 1000;

/// Parameters for the read_sheet table function.
struct ReadSheetParameters {
    /// Path to the spreadsheet file
    file_name: String,
    criteria: Criteria,
}

impl TryFrom<&BindInfo> for ReadSheetParameters {
    type Error = Box<dyn Error>;

    /// Extracts parameters from DuckDB bind information.
    /// Flags that are not given default to false.
    fn try_from(bind: &BindInfo) -> Result<Self, Self::Error> {
        Ok(ReadSheetParameters {
            file_name: bind.get_parameter(0).to_string(),
            criteria: Criteria {
                sheet: SheetParam::read(bind)?,
                range: RangeParam::read(bind)?,
                header: HeaderParam::read(bind)?.unwrap_or(false),
                stop_at_empty: StopAtEmptyParam::read(bind)?.unwrap_or(false),
                all_varchar: AllVarcharParam::read(bind)?.unwrap_or(false),
            },
        })
    }
}

/// Bind data for the read_sheet table function: the whole region is
/// materialized at bind time so the schema and the rows agree.
pub(crate) struct ReadSheetBindData {
    region: Region,
}

/// Initialization data for the read_sheet table function.
pub(crate) struct ReadSheetInitData {
    /// Next region row to emit
    row: AtomicUsize,
}

pub(crate) struct ReadSheetTableFunction;

impl VTab for ReadSheetTableFunction {
    type InitData = ReadSheetInitData;
    type BindData = ReadSheetBindData;

    /// Opens the sheet, cuts the requested region and registers the
    /// inferred columns as the result schema.
    fn bind(bind: &BindInfo) -> Result<Self::BindData, Box<dyn Error>> {
        let parameters = ReadSheetParameters::try_from(bind)?;
        let sheet = open_sheet(
            Path::new(&parameters.file_name),
            parameters.criteria.sheet.as_deref(),
        )?;
        let region = sheet.region(&parameters.criteria)?;
        debug!(
            file = %sheet.file_name,
            sheet = %sheet.name,
            rows = region.rows.len(),
            columns = ?region.columns.iter().map(|column| (column.name.as_str(), column.kind.as_str())).collect::<Vec<_>>(),
            "bound spreadsheet region"
        );

        for column in &region.columns {
            bind.add_result_column(
                column.name.as_str(),
                LogicalTypeHandle::from(column.kind.to_logical_type_id()),
            );
        }
        Ok(ReadSheetBindData { region })
    }

    fn init(_: &InitInfo) -> Result<Self::InitData, Box<dyn Error>> {
        Ok(ReadSheetInitData {
            row: AtomicUsize::new(0),
        })
    }

    /// Emits the region in chunks of at most `STEP` rows.
    fn func(
        func: &TableFunctionInfo<Self>,
        output: &mut DataChunkHandle,
    ) -> Result<(), Box<dyn Error>> {
        let bind = func.get_bind_data();
        let init = func.get_init_data();
        let rows = &bind.region.rows;
        let lower = init.row.fetch_add(STEP, Ordering::Relaxed).min(rows.len());
        let upper = (lower + STEP).min(rows.len());

        output.set_len(upper - lower);
        for (index, column) in bind.region.columns.iter().enumerate() {
            let mut vector = output.flat_vector(index);
            for (offset, record) in rows[lower..upper].iter().enumerate() {
                populate(&mut vector, offset, column.kind, &record[index]);
            }
        }
        Ok(())
    }

    fn parameters() -> Option<Vec<LogicalTypeHandle>> {
        Some(vec![LogicalTypeHandle::from(LogicalTypeId::Varchar)])
    }

    fn named_parameters() -> Option<Vec<(String, LogicalTypeHandle)>> {
        Some(vec![
            SheetParam::definition(),
            RangeParam::definition(),
            HeaderParam::definition(),
            StopAtEmptyParam::definition(),
            AllVarcharParam::definition(),
        ])
    }
}

/// Writes one cell into a column vector, NULL when the cell has no value of
/// the column's type.
fn populate(vector: &mut FlatVector, index: usize, kind: ColumnType, cell: &Cell) {
    let written = match kind {
        ColumnType::Varchar => cell
            .get_varchar()
            .map(|value| vector.insert(index, value.as_str())),
        ColumnType::Boolean => cell.get_bool().map(|value| primitive_setter(vector, index, value)),
        ColumnType::BigInt => cell.get_bigint().map(|value| primitive_setter(vector, index, value)),
        ColumnType::Double => cell.get_double().map(|value| primitive_setter(vector, index, value)),
        ColumnType::Timestamp => cell.get_datetime().map(|value| datetime_setter(vector, index, value)),
        ColumnType::Date => cell.get_date().map(|value| date_setter(vector, index, value)),
        ColumnType::Time => cell.get_time().map(|value| time_setter(vector, index, value)),
    };
    if written.is_none() {
        if !cell.is_empty() {
            debug!(cell = %cell.reference(), kind = kind.as_str(), "value does not fit column type, writing NULL");
        }
        vector.set_null(index);
    }
}

/// Sets a primitive value in a DuckDB vector using direct memory access.
fn primitive_setter<T>(vector: &mut FlatVector, index: usize, value: T) {
    unsafe {
        let pointer: *mut T = vector.as_mut_ptr();
        std::ptr::write(pointer.add(index), value);
    }
}

/// Microseconds since Unix epoch.
fn datetime_setter(vector: &mut FlatVector, index: usize, value: NaiveDateTime) {
    unsafe {
        let pointer: *mut duckdb_timestamp = vector.as_mut_ptr();
        let pointer = pointer.add(index);
        (*pointer).micros = value.and_utc().timestamp_micros();
    }
}

/// Days since January 1, 1970.
fn date_setter(vector: &mut FlatVector, index: usize, value: NaiveDate) {
    unsafe {
        let pointer: *mut duckdb_date = vector.as_mut_ptr();
        let pointer = pointer.add(index);
        // Convert from Common Era days to Unix epoch days
        (*pointer).days = value.num_days_from_ce() - 719_163;
    }
}

/// Microseconds since midnight.
fn time_setter(vector: &mut FlatVector, index: usize, value: NaiveTime) {
    unsafe {
        let pointer: *mut duckdb_time = vector.as_mut_ptr();
        let pointer = pointer.add(index);
        (*pointer).micros =
            value.num_seconds_from_midnight() as i64 * 1_000_000 + (value.nanosecond() / 1_000) as i64;
    }
}
