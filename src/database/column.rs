use crate::spreadsheet::Cell;
use calamine::Data;
use duckdb::core::LogicalTypeId;

/// Supported column data types for spreadsheet data.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum ColumnType {
    /// Boolean values (true/false)
    Boolean,
    /// 64-bit signed integers
    BigInt,
    /// Double-precision floating point numbers
    Double,
    /// Variable-length strings
    Varchar,
    /// Date and time with microsecond precision
    Timestamp,
    /// Date without time component
    Date,
    /// Time without date component
    Time,
}

/// Represents a column in a spreadsheet region with name and data type.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Column {
    /// Column name (from header row or column letters)
    pub(crate) name: String,
    /// Column data type
    pub(crate) kind: ColumnType,
}

impl ColumnType {
    /// Returns the string representation of the column type for DuckDB.
    pub(crate) const fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Boolean => "boolean",
            ColumnType::BigInt => "bigint",
            ColumnType::Double => "double",
            ColumnType::Varchar => "varchar",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Date => "date",
            ColumnType::Time => "time",
        }
    }

    /// Infers the narrowest type able to hold a single cell.
    /// Empty and error cells carry no type information.
    pub(crate) fn of(cell: &Cell) -> Option<Self> {
        match &cell.value {
            Data::Bool(_) => Some(ColumnType::Boolean),
            Data::Int(_) => Some(ColumnType::BigInt),
            Data::Float(value) if value.fract() == 0.0 => Some(ColumnType::BigInt),
            Data::Float(_) => Some(ColumnType::Double),
            Data::DateTime(value) if value.as_f64() < 1.0 => Some(ColumnType::Time),
            Data::DateTime(value) if value.as_f64().fract() == 0.0 => Some(ColumnType::Date),
            Data::DateTime(_) => Some(ColumnType::Timestamp),
            Data::DateTimeIso(value) if !value.contains('T') => Some(ColumnType::Date),
            Data::DateTimeIso(_) => Some(ColumnType::Timestamp),
            Data::String(value) if value.is_empty() => None,
            Data::String(_) | Data::DurationIso(_) => Some(ColumnType::Varchar),
            _ => None,
        }
    }

    /// Converts column type to DuckDB's logical type ID.
    pub(crate) const fn to_logical_type_id(&self) -> LogicalTypeId {
        match self {
            Self::Boolean => LogicalTypeId::Boolean,
            Self::BigInt => LogicalTypeId::Bigint,
            Self::Double => LogicalTypeId::Double,
            Self::Varchar => LogicalTypeId::Varchar,
            Self::Timestamp => LogicalTypeId::Timestamp,
            Self::Date => LogicalTypeId::Date,
            Self::Time => LogicalTypeId::Time,
        }
    }

    /// Detects the most specific common type from a collection of candidate types.
    /// Falls back to VARCHAR if types are inconsistent or empty.
    pub(crate) fn detect<I>(types: I) -> ColumnType
    where
        I: IntoIterator<Item = Option<ColumnType>>,
    {
        let types: Vec<ColumnType> = types.into_iter().flatten().collect();
        if types.is_empty() {
            ColumnType::Varchar
        } else if types.iter().all(ColumnType::is_boolean) {
            ColumnType::Boolean
        } else if types.iter().all(ColumnType::is_int) {
            ColumnType::BigInt
        } else if types.iter().all(ColumnType::is_float) {
            ColumnType::Double
        } else if types.iter().all(ColumnType::is_date) {
            ColumnType::Date
        } else if types.iter().all(ColumnType::is_time) {
            ColumnType::Time
        } else if types.iter().all(ColumnType::is_datetime) {
            ColumnType::Timestamp
        } else {
            ColumnType::Varchar
        }
    }

    #[inline]
    pub(crate) fn is_boolean(&self) -> bool {
        matches!(self, ColumnType::Boolean)
    }

    #[inline]
    pub(crate) fn is_int(&self) -> bool {
        matches!(self, ColumnType::BigInt)
    }

    /// Returns true for integer or floating point values.
    #[inline]
    pub(crate) fn is_float(&self) -> bool {
        matches!(self, ColumnType::BigInt | ColumnType::Double)
    }

    #[inline]
    pub(crate) fn is_date(&self) -> bool {
        matches!(self, ColumnType::Date)
    }

    #[inline]
    pub(crate) fn is_time(&self) -> bool {
        matches!(self, ColumnType::Time)
    }

    /// Returns true if this column type represents date/time related values.
    #[inline]
    pub(crate) fn is_datetime(&self) -> bool {
        matches!(self, ColumnType::Timestamp | ColumnType::Date | ColumnType::Time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_and_doubles_widen_to_double() {
        let kind = ColumnType::detect([Some(ColumnType::BigInt), Some(ColumnType::Double), None]);
        assert_eq!(kind, ColumnType::Double);
    }

    #[test]
    fn mixed_text_falls_back_to_varchar() {
        let kind = ColumnType::detect([Some(ColumnType::BigInt), Some(ColumnType::Varchar)]);
        assert_eq!(kind, ColumnType::Varchar);
    }

    #[test]
    fn dates_and_timestamps_widen_to_timestamp() {
        let kind = ColumnType::detect([Some(ColumnType::Date), Some(ColumnType::Timestamp)]);
        assert_eq!(kind, ColumnType::Timestamp);
    }

    #[test]
    fn empty_column_is_varchar() {
        assert_eq!(ColumnType::detect([None, None]), ColumnType::Varchar);
    }

    #[test]
    fn integral_floats_are_integers() {
        let cell = Cell {
            row: 0,
            column: 0,
            value: Data::Float(42.0),
        };
        assert_eq!(ColumnType::of(&cell), Some(ColumnType::BigInt));
        let cell = Cell {
            row: 0,
            column: 0,
            value: Data::Float(42.5),
        };
        assert_eq!(ColumnType::of(&cell), Some(ColumnType::Double));
    }
}
