//! # Extension Core Module
//!
//! Named parameter handling for the `read_sheet` table function that the
//! payout store registers on its DuckDB connection.
use crate::spreadsheet::reference::{CellRange, RangeError};
use duckdb::core::{LogicalTypeHandle, LogicalTypeId};
use duckdb::vtab::BindInfo;

pub(crate) mod read_sheet_table_function;

/// Name under which the spreadsheet reader is registered.
pub const READ_SHEET_FUNCTION: &str = "read_sheet";

/// Trait for handling named parameters in DuckDB table functions.
///
/// # Type Parameters
///
/// * `T` - The type of the parameter value
pub(crate) trait NamedParam<T> {
    /// Returns the parameter name as used in SQL
    fn name() -> &'static str;

    /// Returns the DuckDB logical type for this parameter
    fn kind() -> LogicalTypeHandle;

    /// Returns the complete parameter definition (name and type)
    fn definition() -> (String, LogicalTypeHandle) {
        (Self::name().to_string(), Self::kind())
    }

    /// Extracts the parameter value from bind information, None if not provided
    fn read(bind: &BindInfo) -> Result<Option<T>, RangeError>;
}

/// Sheet name parameter handler
pub(crate) struct SheetParam;

/// Range parameter handler
pub(crate) struct RangeParam;

/// Header parameter handler
pub(crate) struct HeaderParam;

/// Stop-at-empty-row parameter handler
pub(crate) struct StopAtEmptyParam;

/// All-varchar parameter handler
pub(crate) struct AllVarcharParam;

impl NamedParam<String> for SheetParam {
    fn name() -> &'static str {
        "sheet"
    }

    fn kind() -> LogicalTypeHandle {
        LogicalTypeHandle::from(LogicalTypeId::Varchar)
    }

    fn read(bind: &BindInfo) -> Result<Option<String>, RangeError> {
        Ok(bind.get_named_parameter(Self::name()).map(|value| value.to_string()))
    }
}

impl NamedParam<CellRange> for RangeParam {
    fn name() -> &'static str {
        "range"
    }

    fn kind() -> LogicalTypeHandle {
        LogicalTypeHandle::from(LogicalTypeId::Varchar)
    }

    fn read(bind: &BindInfo) -> Result<Option<CellRange>, RangeError> {
        bind.get_named_parameter(Self::name())
            .map(|value| {
                let range = CellRange::parse(value.to_string().as_str())?;
                range.check_bounds()?;
                Ok(range)
            })
            .transpose()
    }
}

/// Reads a BOOLEAN named parameter through its textual form.
fn read_flag(bind: &BindInfo, name: &str) -> Option<bool> {
    bind.get_named_parameter(name)
        .map(|value| value.to_string().eq_ignore_ascii_case("true"))
}

impl NamedParam<bool> for HeaderParam {
    fn name() -> &'static str {
        "header"
    }

    fn kind() -> LogicalTypeHandle {
        LogicalTypeHandle::from(LogicalTypeId::Boolean)
    }

    fn read(bind: &BindInfo) -> Result<Option<bool>, RangeError> {
        Ok(read_flag(bind, Self::name()))
    }
}

impl NamedParam<bool> for StopAtEmptyParam {
    fn name() -> &'static str {
        "stop_at_empty"
    }

    fn kind() -> LogicalTypeHandle {
        LogicalTypeHandle::from(LogicalTypeId::Boolean)
    }

    fn read(bind: &BindInfo) -> Result<Option<bool>, RangeError> {
        Ok(read_flag(bind, Self::name()))
    }
}

impl NamedParam<bool> for AllVarcharParam {
    fn name() -> &'static str {
        "all_varchar"
    }

    fn kind() -> LogicalTypeHandle {
        LogicalTypeHandle::from(LogicalTypeId::Boolean)
    }

    fn read(bind: &BindInfo) -> Result<Option<bool>, RangeError> {
        Ok(read_flag(bind, Self::name()))
    }
}
