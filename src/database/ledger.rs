//! Ledger of documents that were extracted, so repeated runs skip them.
use crate::database::store::{PayoutStore, StoreError};
use crate::record::DocumentId;
use duckdb::{params, Connection};
use tracing::debug;

pub(crate) fn create_ledger(connection: &Connection) -> Result<(), duckdb::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS processed_documents (
            document_id BIGINT PRIMARY KEY,
            file_name VARCHAR,
            platform VARCHAR,
            processed_at TIMESTAMP DEFAULT current_timestamp
        )",
    )
}

impl PayoutStore {
    pub fn is_processed(&self, document_id: DocumentId) -> Result<bool, StoreError> {
        let connection = self.lock()?;
        let count: i64 = connection.query_row(
            "SELECT count(*) FROM processed_documents WHERE document_id = ?",
            params![document_id.get()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Records a document as processed. Marking it twice keeps the first entry.
    pub fn mark_processed(&self, document_id: DocumentId, file_name: &str, platform: &str) -> Result<(), StoreError> {
        let connection = self.lock()?;
        let inserted = connection.execute(
            "INSERT OR IGNORE INTO processed_documents (document_id, file_name, platform) VALUES (?, ?, ?)",
            params![document_id.get(), file_name, platform],
        )?;
        debug!(document_id = %document_id, inserted, "marked document processed");
        Ok(())
    }
}
