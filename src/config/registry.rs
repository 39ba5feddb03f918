use crate::config::{derive_table_name, ConfigError, ImportConfig};
use regex::Regex;
use std::collections::HashMap;

/// Checks for a plain SQL identifier: a letter or underscore followed by
/// letters, digits or underscores.
pub fn is_identifier(value: &str) -> bool {
    let pattern = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Hardcode regex pattern");
    pattern.is_match(value)
}

/// Replaces every character that is not a letter, digit or underscore.
pub fn sanitize_identifier(value: &str) -> String {
    let pattern = Regex::new(r"[^A-Za-z0-9_]").expect("Hardcode regex pattern");
    pattern.replace_all(value, "_").into_owned()
}

#[derive(Clone, Debug)]
struct TableEntry {
    platform: String,
    explicit: bool,
}

/// Every table declared by every platform, keyed case-insensitively the
/// way the database resolves names.
///
/// Explicit names may be shared between imports of one platform, which then
/// append into the same table. Derived names are unique per sheet and range,
/// so a second declaration of the same derived table is always a collision.
#[derive(Clone, Debug, Default)]
pub struct TableRegistry {
    tables: HashMap<String, TableEntry>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves and claims the table of an import.
    pub fn register(&mut self, platform: &str, config: &ImportConfig) -> Result<String, ConfigError> {
        let explicit = config.table_name().is_some();
        let table = derive_table_name(platform, config);
        if !is_identifier(&table) {
            return Err(ConfigError::InvalidIdentifier {
                platform: platform.to_owned(),
                identifier: table,
            });
        }

        let key = table.to_lowercase();
        match self.tables.get(&key) {
            Some(entry) if entry.explicit && explicit && entry.platform == platform => Ok(table),
            Some(entry) if !explicit && !entry.explicit && entry.platform == platform => {
                Err(ConfigError::DerivedTableCollision {
                    table,
                    platform: platform.to_owned(),
                })
            }
            Some(entry) => Err(ConfigError::TableNameCollision {
                table,
                platform: platform.to_owned(),
                owner: entry.platform.clone(),
            }),
            None => {
                self.tables.insert(
                    key,
                    TableEntry {
                        platform: platform.to_owned(),
                        explicit,
                    },
                );
                Ok(table)
            }
        }
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains_key(&table.to_lowercase())
    }

    /// Platform owning a table, if any.
    pub fn owner(&self, table: &str) -> Option<&str> {
        self.tables
            .get(&table.to_lowercase())
            .map(|entry| entry.platform.as_str())
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
