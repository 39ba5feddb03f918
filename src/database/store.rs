//! # Payout Store
//!
//! Embedded DuckDB database holding one table per import and the ledger of
//! processed documents. All statements go through a single connection
//! guarded by a mutex; the lock is held for one operation at a time.
use crate::config::{quote_literal, SchemaPolicy};
use crate::extension::read_sheet_table_function::ReadSheetTableFunction;
use crate::extension::READ_SHEET_FUNCTION;
use crate::record::{DocumentId, FieldValue, Projection};
use chrono::{DateTime, NaiveDate, NaiveTime};
use duckdb::types::{TimeUnit, Value};
use duckdb::{params, Connection};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Cannot prepare database directory '{}': {source}", .path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),

    #[error("Database connection lock was poisoned")]
    LockPoisoned,

    #[error("Cannot resolve schema of table '{table}': {source}")]
    SchemaResolutionFailed {
        table: String,
        #[source]
        source: duckdb::Error,
    },

    #[error("Cannot insert into table '{table}': by name: {by_name}; positional: {positional}")]
    IngestionFailed {
        table: String,
        by_name: duckdb::Error,
        positional: duckdb::Error,
    },

    #[error("Columns of the sheet do not match table '{table}' in order (missing {missing:?}, unexpected {unexpected:?})")]
    SchemaMismatch {
        table: String,
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    #[error("Cannot insert into table '{table}': {source}")]
    InsertFailed {
        table: String,
        #[source]
        source: duckdb::Error,
    },

    #[error("Projection over table '{table}' failed: {cause}")]
    ProjectionQueryFailed { table: String, cause: ProjectionFailure },
}

/// Why a projection produced no usable row.
#[derive(Error, Debug)]
pub enum ProjectionFailure {
    #[error("{0}")]
    Query(#[from] duckdb::Error),

    #[error("no row for document {0}")]
    MissingRow(DocumentId),

    #[error("cannot decode {0}")]
    Decode(String),
}

/// The `read_sheet(...)` call reading one import's region.
#[derive(Clone, Debug)]
pub struct SheetSource {
    path: PathBuf,
    options: String,
}

impl SheetSource {
    /// `options` is the comma separated clause rendered from an import;
    /// a trailing comma is tolerated.
    pub fn new(path: impl Into<PathBuf>, options: impl Into<String>) -> Self {
        SheetSource {
            path: path.into(),
            options: options.into(),
        }
    }

    pub fn to_sql(&self) -> String {
        let path = quote_literal(&self.path.to_string_lossy());
        let options = self.options.trim().trim_end_matches(',');
        if options.is_empty() {
            format!("{READ_SHEET_FUNCTION}({path})")
        } else {
            format!("{READ_SHEET_FUNCTION}({path}, {options})")
        }
    }
}

/// Quotes a SQL identifier.
pub fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

pub struct PayoutStore {
    connection: Mutex<Connection>,
}

impl PayoutStore {
    /// Opens or creates the database file, creating missing parent
    /// directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Directory {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        debug!(path = %path.display(), "opening payout database");
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(connection: Connection) -> Result<Self, StoreError> {
        connection.register_table_function::<ReadSheetTableFunction>(READ_SHEET_FUNCTION)?;
        super::ledger::create_ledger(&connection)?;
        Ok(PayoutStore {
            connection: Mutex::new(connection),
        })
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.connection.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Creates the table of an import from the reader's schema when it does
    /// not exist yet. The table starts with a `document_id` column.
    pub fn ensure_table(&self, table: &str, document_id: DocumentId, source: &SheetSource) -> Result<(), StoreError> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} AS SELECT CAST({} AS BIGINT) AS document_id, * FROM {} LIMIT 0",
            quote_identifier(table),
            document_id,
            source.to_sql(),
        );
        debug!(sql = %sql, "ensuring table");
        let connection = self.lock()?;
        connection
            .execute_batch(&sql)
            .map_err(|source| StoreError::SchemaResolutionFailed {
                table: table.to_owned(),
                source,
            })
    }

    /// Appends the rows of a sheet region tagged with the document id,
    /// returning how many rows were written.
    pub fn insert_rows(
        &self,
        table: &str,
        document_id: DocumentId,
        source: &SheetSource,
        policy: SchemaPolicy,
    ) -> Result<usize, StoreError> {
        let connection = self.lock()?;
        match policy {
            SchemaPolicy::Tolerant => insert_tolerant(&connection, table, document_id, source),
            SchemaPolicy::Strict => insert_strict(&connection, table, document_id, source),
            SchemaPolicy::Evolve => insert_evolving(&connection, table, document_id, source),
        }
    }

    /// Rows a document holds in a table.
    pub fn count_rows(&self, table: &str, document_id: DocumentId) -> Result<u64, StoreError> {
        let sql = format!(
            "SELECT count(*) FROM {} WHERE document_id = ?",
            quote_identifier(table)
        );
        let connection = self.lock()?;
        let count: i64 = connection.query_row(&sql, params![document_id.get()], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    /// Column names and types of a table, `document_id` included.
    pub fn table_columns(&self, table: &str) -> Result<Vec<(String, String)>, StoreError> {
        let connection = self.lock()?;
        Ok(describe(&connection, &format!("DESCRIBE {}", quote_identifier(table)))?)
    }

    /// Evaluates a struct literal over one document's rows and returns the
    /// fields of the first result row.
    pub fn project(&self, table: &str, select_expression: &str, document_id: DocumentId) -> Result<Projection, StoreError> {
        let failed = |cause: ProjectionFailure| StoreError::ProjectionQueryFailed {
            table: table.to_owned(),
            cause,
        };
        let sql = format!(
            "SELECT {} FROM {} WHERE document_id = ?",
            select_expression,
            quote_identifier(table)
        );
        debug!(sql = %sql, document_id = %document_id, "projecting");

        let connection = self.lock()?;
        let mut statement = connection
            .prepare(&sql)
            .map_err(|e| failed(e.into()))?;
        let mut rows = statement
            .query(params![document_id.get()])
            .map_err(|e| failed(e.into()))?;
        let row = rows
            .next()
            .map_err(|e| failed(e.into()))?
            .ok_or_else(|| failed(ProjectionFailure::MissingRow(document_id)))?;
        let value: Value = row.get(0).map_err(|e| failed(e.into()))?;
        decode_projection(value).map_err(failed)
    }
}

/// Runs a DESCRIBE statement, returning `(column_name, column_type)` pairs.
fn describe(connection: &Connection, sql: &str) -> Result<Vec<(String, String)>, duckdb::Error> {
    let mut statement = connection.prepare(sql)?;
    let columns = statement
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}

fn describe_source(connection: &Connection, source: &SheetSource) -> Result<Vec<(String, String)>, duckdb::Error> {
    describe(connection, &format!("DESCRIBE SELECT * FROM {}", source.to_sql()))
}

/// Table columns other than `document_id`.
fn describe_table(connection: &Connection, table: &str) -> Result<Vec<(String, String)>, duckdb::Error> {
    let columns = describe(connection, &format!("DESCRIBE {}", quote_identifier(table)))?;
    Ok(columns
        .into_iter()
        .filter(|(name, _)| !name.eq_ignore_ascii_case("document_id"))
        .collect())
}

fn lowercase_names(columns: &[(String, String)]) -> HashSet<String> {
    columns.iter().map(|(name, _)| name.to_lowercase()).collect()
}

fn positional_insert(connection: &Connection, table: &str, document_id: DocumentId, source: &SheetSource) -> Result<usize, duckdb::Error> {
    let sql = format!(
        "INSERT INTO {} SELECT CAST({} AS BIGINT) AS document_id, * FROM {}",
        quote_identifier(table),
        document_id,
        source.to_sql(),
    );
    debug!(sql = %sql, "inserting by position");
    connection.execute(&sql, [])
}

fn by_name_insert(
    connection: &Connection,
    table: &str,
    document_id: DocumentId,
    source: &SheetSource,
    columns: &[String],
) -> Result<usize, duckdb::Error> {
    let projection = if columns.is_empty() {
        "*".to_string()
    } else {
        columns
            .iter()
            .map(|column| quote_identifier(column))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let sql = format!(
        "INSERT INTO {} BY NAME SELECT CAST({} AS BIGINT) AS document_id, {} FROM {}",
        quote_identifier(table),
        document_id,
        projection,
        source.to_sql(),
    );
    debug!(sql = %sql, "inserting by name");
    connection.execute(&sql, [])
}

/// Inserts the columns the sheet shares with the table by name, then falls
/// back to a positional insert.
fn insert_tolerant(connection: &Connection, table: &str, document_id: DocumentId, source: &SheetSource) -> Result<usize, StoreError> {
    let by_name = describe_source(connection, source)
        .and_then(|source_columns| {
            let table_columns = describe_table(connection, table)?;
            let known = lowercase_names(&table_columns);
            let provided = lowercase_names(&source_columns);
            let (shared, dropped): (Vec<String>, Vec<String>) = source_columns
                .into_iter()
                .map(|(name, _)| name)
                .partition(|name| known.contains(&name.to_lowercase()));
            let padded: Vec<&str> = table_columns
                .iter()
                .map(|(name, _)| name.as_str())
                .filter(|name| !provided.contains(&name.to_lowercase()))
                .collect();
            if !dropped.is_empty() || !padded.is_empty() {
                warn!(table = %table, dropped = ?dropped, padded_with_null = ?padded, "sheet columns differ from table");
            }
            Ok(shared)
        })
        .and_then(|shared| by_name_insert(connection, table, document_id, source, &shared));

    match by_name {
        Ok(inserted) => Ok(inserted),
        Err(by_name) => {
            warn!(table = %table, error = %by_name, "insert by name failed, retrying by position");
            positional_insert(connection, table, document_id, source).map_err(|positional| StoreError::IngestionFailed {
                table: table.to_owned(),
                by_name,
                positional,
            })
        }
    }
}

/// Inserts by position after checking the sheet has exactly the table's
/// columns in the same order.
fn insert_strict(connection: &Connection, table: &str, document_id: DocumentId, source: &SheetSource) -> Result<usize, StoreError> {
    let insert_failed = |source: duckdb::Error| StoreError::InsertFailed {
        table: table.to_owned(),
        source,
    };
    let source_columns = describe_source(connection, source).map_err(insert_failed)?;
    let table_columns = describe_table(connection, table).map_err(insert_failed)?;
    let provided = lowercase_names(&source_columns);
    let known = lowercase_names(&table_columns);

    let missing: Vec<String> = table_columns
        .iter()
        .filter(|(name, _)| !provided.contains(&name.to_lowercase()))
        .map(|(name, _)| name.clone())
        .collect();
    let unexpected: Vec<String> = source_columns
        .iter()
        .filter(|(name, _)| !known.contains(&name.to_lowercase()))
        .map(|(name, _)| name.clone())
        .collect();
    let in_order = source_columns
        .iter()
        .map(|(name, _)| name.to_lowercase())
        .eq(table_columns.iter().map(|(name, _)| name.to_lowercase()));
    if !in_order {
        return Err(StoreError::SchemaMismatch {
            table: table.to_owned(),
            missing,
            unexpected,
        });
    }
    positional_insert(connection, table, document_id, source).map_err(insert_failed)
}

/// Adds the sheet's new columns to the table, then inserts by name.
fn insert_evolving(connection: &Connection, table: &str, document_id: DocumentId, source: &SheetSource) -> Result<usize, StoreError> {
    let insert_failed = |source: duckdb::Error| StoreError::InsertFailed {
        table: table.to_owned(),
        source,
    };
    let source_columns = describe_source(connection, source).map_err(insert_failed)?;
    let known = lowercase_names(&describe_table(connection, table).map_err(insert_failed)?);
    for (name, kind) in &source_columns {
        if !known.contains(&name.to_lowercase()) {
            let sql = format!(
                "ALTER TABLE {} ADD COLUMN {} {}",
                quote_identifier(table),
                quote_identifier(name),
                kind
            );
            debug!(sql = %sql, "evolving table");
            connection.execute_batch(&sql).map_err(insert_failed)?;
        }
    }
    let columns: Vec<String> = source_columns.into_iter().map(|(name, _)| name).collect();
    by_name_insert(connection, table, document_id, source, &columns).map_err(insert_failed)
}

/// Converts the struct produced by an export's select expression.
fn decode_projection(value: Value) -> Result<Projection, ProjectionFailure> {
    match value {
        Value::Struct(fields) => fields
            .iter()
            .map(|(name, value)| Ok((name.clone(), decode_value(value)?)))
            .collect::<Result<Vec<_>, ProjectionFailure>>()
            .map(Projection::new),
        other => Err(ProjectionFailure::Decode(format!("{other:?} as a struct"))),
    }
}

fn decode_value(value: &Value) -> Result<FieldValue, ProjectionFailure> {
    let field = match value {
        Value::Null => FieldValue::Null,
        Value::Boolean(value) => FieldValue::Bool(*value),
        Value::TinyInt(value) => FieldValue::Int(i64::from(*value)),
        Value::SmallInt(value) => FieldValue::Int(i64::from(*value)),
        Value::Int(value) => FieldValue::Int(i64::from(*value)),
        Value::BigInt(value) => FieldValue::Int(*value),
        Value::UTinyInt(value) => FieldValue::Int(i64::from(*value)),
        Value::USmallInt(value) => FieldValue::Int(i64::from(*value)),
        Value::UInt(value) => FieldValue::Int(i64::from(*value)),
        Value::UBigInt(value) => match i64::try_from(*value) {
            Ok(value) => FieldValue::Int(value),
            Err(_) => FieldValue::Float(*value as f64),
        },
        Value::HugeInt(value) => match i64::try_from(*value) {
            Ok(value) => FieldValue::Int(value),
            Err(_) => FieldValue::Float(*value as f64),
        },
        Value::Float(value) => FieldValue::Float(f64::from(*value)),
        Value::Double(value) => FieldValue::Float(*value),
        Value::Decimal(value) => value
            .to_string()
            .parse()
            .map(FieldValue::Float)
            .map_err(|_| ProjectionFailure::Decode(format!("decimal {value}")))?,
        Value::Text(value) | Value::Enum(value) => FieldValue::Text(value.clone()),
        Value::Date32(days) => NaiveDate::from_ymd_opt(1970, 1, 1)
            .and_then(|epoch| epoch.checked_add_signed(chrono::Duration::days(i64::from(*days))))
            .map(FieldValue::Date)
            .ok_or_else(|| ProjectionFailure::Decode(format!("date {days}")))?,
        Value::Timestamp(unit, amount) => DateTime::from_timestamp_micros(to_micros(*unit, *amount))
            .map(|timestamp| FieldValue::Timestamp(timestamp.naive_utc()))
            .ok_or_else(|| ProjectionFailure::Decode(format!("timestamp {amount}")))?,
        Value::Time64(unit, amount) => {
            let micros = to_micros(*unit, *amount);
            NaiveTime::from_num_seconds_from_midnight_opt(
                (micros / 1_000_000) as u32,
                ((micros % 1_000_000) * 1_000) as u32,
            )
            .map(|time| FieldValue::Text(time.format("%H:%M:%S").to_string()))
            .ok_or_else(|| ProjectionFailure::Decode(format!("time {amount}")))?
        }
        other => return Err(ProjectionFailure::Decode(format!("{other:?}"))),
    };
    Ok(field)
}

fn to_micros(unit: TimeUnit, amount: i64) -> i64 {
    match unit {
        TimeUnit::Second => amount.saturating_mul(1_000_000),
        TimeUnit::Millisecond => amount.saturating_mul(1_000),
        TimeUnit::Microsecond => amount,
        TimeUnit::Nanosecond => amount / 1_000,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(id: i64) -> DocumentId {
        DocumentId::try_from(id).unwrap()
    }

    #[test]
    fn sheet_source_drops_trailing_comma() {
        let source = SheetSource::new("/tmp/it's.xlsx", "header=true,sheet='Payout Breakup',");
        assert_eq!(
            source.to_sql(),
            "read_sheet('/tmp/it''s.xlsx', header=true,sheet='Payout Breakup')"
        );
        assert_eq!(SheetSource::new("a.xlsx", "").to_sql(), "read_sheet('a.xlsx')");
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_identifier("orders"), "\"orders\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn projection_decodes_struct_fields() {
        let store = PayoutStore::open_in_memory().unwrap();
        {
            let connection = store.lock().unwrap();
            connection
                .execute_batch(
                    "CREATE TABLE t (document_id BIGINT, amount DOUBLE, day DATE, ref VARCHAR);
                     INSERT INTO t VALUES (1, 10.5, DATE '2024-03-01', 'UTR1'), (1, 4.5, DATE '2024-03-31', NULL);",
                )
                .unwrap();
        }
        let projection = store
            .project(
                "t",
                "{ final_payout_amt: sum(amount), period_end: max(day), total_orders: count(*), utr_number: max(ref), missing: NULL }",
                document(1),
            )
            .unwrap();
        assert_eq!(projection.get("final_payout_amt"), Some(&FieldValue::Float(15.0)));
        assert_eq!(
            projection.get("period_end"),
            Some(&FieldValue::Date(NaiveDate::from_ymd_opt(2024, 3, 31).unwrap()))
        );
        assert_eq!(projection.get("total_orders"), Some(&FieldValue::Int(2)));
        assert_eq!(projection.get("utr_number"), Some(&FieldValue::Text("UTR1".to_string())));
        assert_eq!(projection.get("missing"), Some(&FieldValue::Null));
    }

    #[test]
    fn projection_without_rows_fails() {
        let store = PayoutStore::open_in_memory().unwrap();
        store
            .lock()
            .unwrap()
            .execute_batch("CREATE TABLE t (document_id BIGINT, amount DOUBLE)")
            .unwrap();
        let error = store.project("t", "{ amount: amount }", document(9)).unwrap_err();
        assert!(matches!(
            error,
            StoreError::ProjectionQueryFailed {
                cause: ProjectionFailure::MissingRow(_),
                ..
            }
        ));
    }

    #[test]
    fn count_rows_is_scoped_to_the_document() {
        let store = PayoutStore::open_in_memory().unwrap();
        store
            .lock()
            .unwrap()
            .execute_batch("CREATE TABLE t (document_id BIGINT, x INTEGER); INSERT INTO t VALUES (1, 1), (1, 2), (2, 3);")
            .unwrap();
        assert_eq!(store.count_rows("t", document(1)).unwrap(), 2);
        assert_eq!(store.count_rows("t", document(3)).unwrap(), 0);
    }
}
