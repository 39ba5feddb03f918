//! # Payout Sheet
//!
//! Extracts a canonical payout record from the settlement spreadsheets that
//! food delivery platforms send to restaurants.
//!
//! ## Flow
//!
//! - **Configuration**: a JSON file declares, per platform, which sheet
//!   regions to import and how to project the imported rows into record
//!   fields. It is validated once into a [`PayoutRegistry`].
//! - **Ingestion**: every import is read into a DuckDB table through the
//!   `read_sheet` table function, tagged with the document id. Imports whose
//!   position depends on where another section ended are resolved after
//!   their anchor.
//! - **Projection**: each export evaluates a struct of SQL expressions over
//!   the document's rows; the results are merged into a [`PayoutRecord`].
//!
//! ## Example
//!
//! ```no_run
//! use payout_sheet::{DocumentId, PayoutConfigs, PayoutEngine, PayoutStore};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = PayoutConfigs::load("payout_configs.json")?;
//! let engine = PayoutEngine::new(Arc::new(PayoutStore::open("data/payout.duckdb")?));
//! let plan = registry.platform("swiggy").ok_or("unknown platform")?;
//! let record = engine.ingest_and_project(
//!     DocumentId::try_from(17).map_err(|_| "bad id")?,
//!     "statement.xlsx".as_ref(),
//!     "swiggy",
//!     plan,
//! )?;
//! println!("{}", record.final_payout_amt);
//! # Ok(())
//! # }
//! ```
pub mod config;
pub mod database;
pub mod engine;
pub mod error;
mod extension;
pub mod logging;
pub mod record;
pub mod spreadsheet;

pub use config::{PayoutConfigs, PayoutRegistry, PlatformPlan};
pub use database::{PayoutStore, SheetSource, StoreError};
pub use engine::PayoutEngine;
pub use error::PayoutError;
pub use record::{DocumentId, FieldValue, PayoutRecord, Projection};
