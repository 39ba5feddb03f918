//! # Payout Engine
//!
//! Runs a platform plan against one settlement document: every import is
//! read into its table in dependency order, then every export is projected
//! and merged into a single [`PayoutRecord`].
pub mod resolver;

use crate::config::PlatformPlan;
use crate::database::store::{PayoutStore, SheetSource};
use crate::error::{PayoutError, ResultStep, Stage};
use crate::record::{DocumentId, PayoutRecord};
use crate::spreadsheet::reference::CellRange;
use resolver::{Anchor, ResolveError};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Outcome of one import.
#[derive(Clone, Debug, PartialEq)]
pub struct IngestedImport {
    /// Declaration index of the import
    pub index: usize,
    pub table: String,
    /// Range the reader was given, if any
    pub range: Option<CellRange>,
    pub rows: usize,
}

/// Cheap to clone; clones share one store, so several documents can be
/// processed from different threads.
#[derive(Clone)]
pub struct PayoutEngine {
    store: Arc<PayoutStore>,
}

impl PayoutEngine {
    pub fn new(store: Arc<PayoutStore>) -> Self {
        PayoutEngine { store }
    }

    pub fn store(&self) -> &PayoutStore {
        &self.store
    }

    /// Ingests a document's sheets and projects them into a payout record.
    /// The record's `platform` is set to `platform`, and its outlet falls back
    /// to the plan's outlet name when no export filled it.
    #[instrument(skip_all, fields(document_id = %document_id, platform = %platform, file = %file_path.display()))]
    pub fn ingest_and_project(
        &self,
        document_id: DocumentId,
        file_path: &Path,
        platform: &str,
        plan: &PlatformPlan,
    ) -> Result<PayoutRecord, PayoutError> {
        if !file_path.is_file() {
            return Err(PayoutError::SourceFileMissing(file_path.to_path_buf()));
        }

        let imports = self.ingest(document_id, file_path, plan)?;
        info!(
            imports = imports.len(),
            rows = imports.iter().map(|import| import.rows).sum::<usize>(),
            "ingested document"
        );

        let mut record = self.project(document_id, plan)?;
        record.platform = Some(platform.to_owned());
        if record.outlet_name.as_deref().map_or(true, str::is_empty) {
            record.outlet_name = plan.outlet_name().map(str::to_owned);
        }
        Ok(record)
    }

    /// Reads every import of the plan into its table.
    pub fn ingest(&self, document_id: DocumentId, file_path: &Path, plan: &PlatformPlan) -> Result<Vec<IngestedImport>, PayoutError> {
        let mut effective: Vec<Option<CellRange>> = vec![None; plan.config().import_configs.len()];
        let mut imports = Vec::with_capacity(effective.len());
        for step in plan.steps() {
            let range = match (&step.config.relative_range, step.anchor) {
                (Some(relative), Some(anchor)) => {
                    let anchor_range = effective[anchor]
                        .as_ref()
                        .ok_or(ResolveError::UnresolvedRelativeRange { anchor })
                        .at_step(plan.platform(), Stage::Import, step.index)?;
                    let anchor_header = plan.import(anchor).map_or(false, |config| config.header);
                    let anchor_table = plan.table(anchor).unwrap_or_default();
                    let range = resolver::resolve::<PayoutError, _>(
                        Anchor {
                            range: anchor_range,
                            header: anchor_header,
                        },
                        relative,
                        || Ok(self.store.count_rows(anchor_table, document_id)?),
                    )
                    .at_step(plan.platform(), Stage::Import, step.index)?;
                    debug!(index = step.index, anchor, range = %range, "resolved relative range");
                    Some(range)
                }
                _ => step
                    .config
                    .declared_range()
                    .at_step(plan.platform(), Stage::Import, step.index)?,
            };

            let config = match &range {
                Some(range) => step.config.with_range(range),
                None => step.config.clone(),
            };
            let source = SheetSource::new(file_path, config.option_string());
            let rows = self
                .store
                .ensure_table(step.table, document_id, &source)
                .and_then(|_| {
                    self.store
                        .insert_rows(step.table, document_id, &source, config.schema_policy)
                })
                .at_step(plan.platform(), Stage::Import, step.index)?;
            debug!(index = step.index, table = %step.table, rows, "imported sheet region");

            effective[step.index] = range.clone();
            imports.push(IngestedImport {
                index: step.index,
                table: step.table.to_owned(),
                range,
                rows,
            });
        }
        Ok(imports)
    }

    /// Merges every export projection into a fresh record, later exports
    /// overwriting earlier ones field by field.
    pub fn project(&self, document_id: DocumentId, plan: &PlatformPlan) -> Result<PayoutRecord, PayoutError> {
        let mut record = PayoutRecord::default();
        for (index, export) in plan.exports().iter().enumerate() {
            if export.reader_configs.is_empty() {
                debug!(index, table = %export.table_name, "export has no columns, skipping");
                continue;
            }
            let projection = self
                .store
                .project(&export.table_name, &export.select_expression(), document_id)
                .at_step(plan.platform(), Stage::Export, index)?;
            record
                .merge(&projection)
                .at_step(plan.platform(), Stage::Export, index)?;
        }
        Ok(record)
    }
}
