pub(crate) mod column;
mod ledger;
pub mod store;

pub use store::{PayoutStore, SheetSource, StoreError};
