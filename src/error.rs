use crate::config::ConfigError;
use crate::database::store::StoreError;
use crate::engine::resolver::ResolveError;
use crate::record::RecordError;
use crate::spreadsheet::reference::RangeError;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use thiserror::Error;

/// Main error type of the payout engine.
/// Aggregates the module errors and records which configuration step failed.
#[derive(Error, Debug)]
pub enum PayoutError {
    #[error("{stage} config #{index} of platform '{platform}' failed: {source}")]
    Step {
        platform: String,
        stage: Stage,
        index: usize,
        #[source]
        source: Box<PayoutError>,
    },

    #[error("Document id must be positive, got {0}")]
    InvalidDocumentId(i64),

    #[error("Source file '{}' does not exist or is not a file", .0.display())]
    SourceFileMissing(PathBuf),

    #[error("{0}")]
    RangeError(#[from] RangeError),

    #[error("{0}")]
    ConfigError(#[from] ConfigError),

    #[error("{0}")]
    StoreError(#[from] StoreError),

    #[error("{0}")]
    ResolveError(#[from] ResolveError),

    #[error("{0}")]
    RecordError(#[from] RecordError),
}

/// Half of a platform configuration a step belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Stage {
    Import,
    Export,
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Import => write!(f, "import"),
            Stage::Export => write!(f, "export"),
        }
    }
}

impl PayoutError {
    /// The innermost error, past any step context.
    pub fn root(&self) -> &PayoutError {
        match self {
            PayoutError::Step { source, .. } => source.root(),
            other => other,
        }
    }
}

pub(crate) trait ResultStep<T> {
    fn at_step(self, platform: &str, stage: Stage, index: usize) -> Result<T, PayoutError>;
}

impl<T, E: Into<PayoutError>> ResultStep<T> for Result<T, E> {
    fn at_step(self, platform: &str, stage: Stage, index: usize) -> Result<T, PayoutError> {
        self.map_err(|e| PayoutError::Step {
            platform: platform.to_owned(),
            stage,
            index,
            source: Box::new(e.into()),
        })
    }
}
