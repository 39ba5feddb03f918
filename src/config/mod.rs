//! # Payout Configuration
//!
//! Declarative description of how each platform's payout spreadsheet is
//! ingested (`import_configs`) and projected back into a payout record
//! (`export_configs`). The JSON document is loaded once, validated into a
//! [`PayoutRegistry`] and never mutated afterwards.
pub mod plan;
pub mod registry;

pub use plan::{ImportStep, PayoutRegistry, PlatformPlan};
pub use registry::TableRegistry;

use crate::spreadsheet::reference::{CellRange, RangeError};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors detected while loading or validating the payout configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read payout config '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid payout config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Import #{index} of platform '{platform}' has an invalid range: {source}")]
    InvalidRange {
        platform: String,
        index: usize,
        #[source]
        source: RangeError,
    },

    #[error("Import #{index} of platform '{platform}' refers to unknown anchor '{anchor}'")]
    UnresolvedRelativeRange {
        platform: String,
        index: usize,
        anchor: String,
    },

    #[error("Import #{anchor} of platform '{platform}' is used as an anchor but declares no range")]
    AnchorWithoutRange { platform: String, anchor: usize },

    #[error("Imports {imports:?} of platform '{platform}' depend on each other")]
    DependencyCycle { platform: String, imports: Vec<usize> },

    #[error("Import name '{name}' is declared twice in platform '{platform}'")]
    DuplicateImportName { platform: String, name: String },

    #[error("'{identifier}' in platform '{platform}' is not a valid identifier")]
    InvalidIdentifier { platform: String, identifier: String },

    #[error(
        "Two imports of platform '{platform}' derive table '{table}' from the same sheet and range; \
         imports without a fixed range on a shared sheet need an explicit table_name"
    )]
    DerivedTableCollision { table: String, platform: String },

    #[error("Table '{table}' of platform '{platform}' collides with a table declared by platform '{owner}'")]
    TableNameCollision {
        table: String,
        platform: String,
        owner: String,
    },
}

/// Top level of the configuration file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PayoutConfigs {
    #[serde(default)]
    pub platforms: BTreeMap<String, PlatformConfig>,
}

/// Import and export declarations of one platform.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Outlet written to records whose exports leave it empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outlet_name: Option<String>,
    #[serde(default)]
    pub import_configs: Vec<ImportConfig>,
    #[serde(default)]
    pub export_configs: Vec<ExportConfig>,
}

/// One spreadsheet region to ingest into a table.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Label other imports use to anchor on this one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_relative_range",
        skip_serializing_if = "Option::is_none"
    )]
    pub relative_range: Option<RelativeRange>,
    #[serde(default)]
    pub header: bool,
    #[serde(default)]
    pub stop_at_empty: bool,
    #[serde(default)]
    pub all_varchar: bool,
    #[serde(default)]
    pub schema_policy: SchemaPolicy,
}

/// Places an import's start row relative to where its anchor ended.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RelativeRange {
    pub anchor: ConfigRef,
    pub rows_offset: i64,
    pub end_row_policy: EndRowPolicy,
}

/// Reference to another import of the same platform.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigRef {
    /// Position in the platform's import list
    Index(usize),
    /// Value of the anchor's `name`
    Name(String),
}

/// How the anchor's row count turns into its end row.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndRowPolicy {
    /// Subtract one row when the anchor has no header row
    #[default]
    HeaderAware,
    /// Use the stored row count as is
    Literal,
}

/// What to do when a spreadsheet's columns differ from the table's.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaPolicy {
    /// Drop unknown columns, pad missing ones with NULL, fall back to positional insert
    #[default]
    Tolerant,
    /// Columns must match the table exactly
    Strict,
    /// Add unknown columns to the table before inserting
    Evolve,
}

/// One projection from an ingested table into payout record fields.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default)]
    pub table_name: String,
    #[serde(default)]
    pub reader_configs: Vec<ReaderConfig>,
}

/// A record field and the SQL expression computing it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReaderConfig {
    pub column_name: String,
    pub expression: String,
}

/// Wire shape of `relative_range`, including the legacy
/// `relative_config_index` form where 0 meant "no dependency".
#[derive(Deserialize)]
struct RawRelativeRange {
    #[serde(default)]
    anchor: Option<ConfigRef>,
    #[serde(default)]
    relative_config_index: Option<usize>,
    #[serde(default)]
    rows_offset: i64,
    #[serde(default)]
    end_row_policy: EndRowPolicy,
}

fn deserialize_relative_range<'de, D>(deserializer: D) -> Result<Option<RelativeRange>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<RawRelativeRange> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|raw| {
        let anchor = match (raw.anchor, raw.relative_config_index) {
            (Some(anchor), _) => anchor,
            (None, Some(index)) if index > 0 => ConfigRef::Index(index),
            _ => return None,
        };
        Some(RelativeRange {
            anchor,
            rows_offset: raw.rows_offset,
            end_row_policy: raw.end_row_policy,
        })
    }))
}

impl Display for ConfigRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigRef::Index(index) => write!(f, "#{index}"),
            ConfigRef::Name(name) => write!(f, "{name}"),
        }
    }
}

/// Treats empty strings, which older config files use for "unset", as absent.
fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.is_empty())
}

/// Quotes a SQL string literal.
pub(crate) fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

impl PayoutConfigs {
    /// Reads and validates the configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<PayoutRegistry, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)?.validate()
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Checks every platform and freezes the configuration.
    pub fn validate(self) -> Result<PayoutRegistry, ConfigError> {
        PayoutRegistry::build(self)
    }
}

impl ImportConfig {
    pub fn sheet(&self) -> Option<&str> {
        non_empty(&self.sheet)
    }

    pub fn range(&self) -> Option<&str> {
        non_empty(&self.range)
    }

    pub fn name(&self) -> Option<&str> {
        non_empty(&self.name)
    }

    pub fn table_name(&self) -> Option<&str> {
        non_empty(&self.table_name)
    }

    /// The declared range, parsed and checked against the sheet limits.
    pub fn declared_range(&self) -> Result<Option<CellRange>, RangeError> {
        self.range()
            .map(|text| {
                let range = CellRange::parse(text)?;
                range.check_bounds()?;
                Ok(range)
            })
            .transpose()
    }

    /// Copy of this import reading another range.
    pub fn with_range(&self, range: &CellRange) -> ImportConfig {
        ImportConfig {
            range: Some(range.to_string()),
            ..self.clone()
        }
    }

    /// Renders the reader options that are set, in the fixed order
    /// `header`, `stop_at_empty`, `all_varchar`, `sheet`, `range`.
    ///
    /// Every fragment but `range` keeps a trailing comma; unset flags and
    /// fields are left out entirely.
    pub fn option_string(&self) -> String {
        let mut options = String::new();
        if self.header {
            options.push_str("header=true,");
        }
        if self.stop_at_empty {
            options.push_str("stop_at_empty=true,");
        }
        if self.all_varchar {
            options.push_str("all_varchar=true,");
        }
        if let Some(sheet) = self.sheet() {
            options.push_str(&format!("sheet={},", quote_literal(sheet)));
        }
        if let Some(range) = self.range() {
            options.push_str(&format!("range={}", quote_literal(range)));
        }
        options
    }
}

impl ExportConfig {
    /// Renders the struct literal `{ col1: expr1, col2: expr2 }`.
    pub fn select_expression(&self) -> String {
        let fields = self
            .reader_configs
            .iter()
            .map(|reader| format!("{}: {}", reader.column_name, reader.expression))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{{ {fields} }}")
    }
}

/// Table an import writes into.
///
/// An explicit `table_name` is returned verbatim. Otherwise the name is
/// `payout_<platform>_<sheet>_<range>` with the platform lower-cased, spaces
/// of the sheet and colons of the range turned into underscores, and any
/// remaining character that is not a letter, digit or underscore replaced.
pub fn derive_table_name(platform: &str, config: &ImportConfig) -> String {
    if let Some(table_name) = config.table_name() {
        return table_name.to_owned();
    }
    registry::sanitize_identifier(&format!(
        "payout_{}_{}_{}",
        platform.to_lowercase(),
        config.sheet().unwrap_or_default().replace(' ', "_"),
        config.range().unwrap_or_default().replace(':', "_"),
    ))
}
