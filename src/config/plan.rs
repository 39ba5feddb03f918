//! Validated, immutable view of the payout configuration.
use crate::config::registry::{is_identifier, TableRegistry};
use crate::config::{ConfigError, ConfigRef, ExportConfig, ImportConfig, PayoutConfigs, PlatformConfig};
use crate::record::PayoutRecord;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Every platform of a configuration that passed validation.
#[derive(Clone, Debug, Default)]
pub struct PayoutRegistry {
    platforms: BTreeMap<String, PlatformPlan>,
    tables: TableRegistry,
}

/// Execution plan of one platform: its imports in dependency order with
/// their resolved tables and anchors.
#[derive(Clone, Debug)]
pub struct PlatformPlan {
    platform: String,
    config: PlatformConfig,
    order: Vec<usize>,
    tables: Vec<String>,
    anchors: Vec<Option<usize>>,
}

/// One import as scheduled by its plan.
#[derive(Copy, Clone, Debug)]
pub struct ImportStep<'a> {
    /// Position of the import in the platform's declaration list
    pub index: usize,
    pub config: &'a ImportConfig,
    pub table: &'a str,
    /// Declaration index of the import this one is placed after
    pub anchor: Option<usize>,
}

impl PayoutRegistry {
    pub(crate) fn build(configs: PayoutConfigs) -> Result<Self, ConfigError> {
        let mut tables = TableRegistry::new();
        let mut platforms = BTreeMap::new();
        for (platform, config) in configs.platforms {
            let plan = PlatformPlan::build(&platform, config, &mut tables)?;
            debug!(platform = %platform, order = ?plan.order, tables = ?plan.tables, "validated platform");
            platforms.insert(platform, plan);
        }
        Ok(PayoutRegistry { platforms, tables })
    }

    pub fn platform(&self, name: &str) -> Option<&PlatformPlan> {
        self.platforms.get(name)
    }

    pub fn platforms(&self) -> impl Iterator<Item = &PlatformPlan> {
        self.platforms.values()
    }

    pub fn tables(&self) -> &TableRegistry {
        &self.tables
    }

    pub fn len(&self) -> usize {
        self.platforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.platforms.is_empty()
    }

    /// Drops platforms whose identifier is not one of the known document
    /// tags, logging each one. Their tables stay reserved.
    pub fn retain_platforms<S: AsRef<str>>(&mut self, known_tags: &[S]) {
        self.platforms.retain(|platform, _| {
            let known = known_tags.iter().any(|tag| tag.as_ref() == platform);
            if !known {
                warn!(platform = %platform, "platform has no matching document tag, skipping");
            }
            known
        });
    }

    /// First platform named by one of a document's tags.
    pub fn platform_for_tags<S: AsRef<str>>(&self, tags: &[S]) -> Option<&PlatformPlan> {
        tags.iter().find_map(|tag| self.platforms.get(tag.as_ref()))
    }
}

impl PlatformPlan {
    fn build(platform: &str, config: PlatformConfig, tables: &mut TableRegistry) -> Result<Self, ConfigError> {
        let imports = &config.import_configs;

        for (index, import) in imports.iter().enumerate() {
            import
                .declared_range()
                .map_err(|source| ConfigError::InvalidRange {
                    platform: platform.to_owned(),
                    index,
                    source,
                })?;
        }

        let anchors = anchors(platform, imports)?;
        let order = schedule(platform, &anchors)?;

        let table_names = imports
            .iter()
            .map(|import| tables.register(platform, import))
            .collect::<Result<Vec<_>, _>>()?;

        for export in &config.export_configs {
            check_export(platform, export, &table_names)?;
        }

        Ok(PlatformPlan {
            platform: platform.to_owned(),
            order,
            tables: table_names,
            anchors,
            config,
        })
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    pub fn outlet_name(&self) -> Option<&str> {
        self.config.outlet_name.as_deref().filter(|name| !name.is_empty())
    }

    /// Declaration indexes in execution order.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn import(&self, index: usize) -> Option<&ImportConfig> {
        self.config.import_configs.get(index)
    }

    pub fn table(&self, index: usize) -> Option<&str> {
        self.tables.get(index).map(String::as_str)
    }

    /// Imports in an order where every anchor precedes its dependents.
    pub fn steps(&self) -> impl Iterator<Item = ImportStep<'_>> {
        self.order.iter().map(move |&index| ImportStep {
            index,
            config: &self.config.import_configs[index],
            table: &self.tables[index],
            anchor: self.anchors[index],
        })
    }

    pub fn exports(&self) -> &[ExportConfig] {
        &self.config.export_configs
    }
}

/// Declaration index of each import's anchor.
fn anchors(platform: &str, imports: &[ImportConfig]) -> Result<Vec<Option<usize>>, ConfigError> {
    let mut names = BTreeMap::new();
    for (index, import) in imports.iter().enumerate() {
        if let Some(name) = import.name() {
            if names.insert(name, index).is_some() {
                return Err(ConfigError::DuplicateImportName {
                    platform: platform.to_owned(),
                    name: name.to_owned(),
                });
            }
        }
    }
    imports
        .iter()
        .enumerate()
        .map(|(index, import)| resolve_anchor(platform, imports, &names, index, import))
        .collect()
}

fn resolve_anchor(
    platform: &str,
    imports: &[ImportConfig],
    names: &BTreeMap<&str, usize>,
    index: usize,
    import: &ImportConfig,
) -> Result<Option<usize>, ConfigError> {
    let Some(relative) = &import.relative_range else {
        return Ok(None);
    };
    let unresolved = || ConfigError::UnresolvedRelativeRange {
        platform: platform.to_owned(),
        index,
        anchor: relative.anchor.to_string(),
    };
    let anchor = match &relative.anchor {
        ConfigRef::Index(anchor) if *anchor < imports.len() => *anchor,
        ConfigRef::Index(_) => return Err(unresolved()),
        ConfigRef::Name(name) => *names.get(name.as_str()).ok_or_else(unresolved)?,
    };
    if anchor == index {
        return Err(ConfigError::DependencyCycle {
            platform: platform.to_owned(),
            imports: vec![index],
        });
    }
    // Relative anchors inherit their range from their own anchor.
    let anchor_config = &imports[anchor];
    if anchor_config.range().is_none() && anchor_config.relative_range.is_none() {
        return Err(ConfigError::AnchorWithoutRange {
            platform: platform.to_owned(),
            anchor,
        });
    }
    Ok(Some(anchor))
}

/// Topological order of the imports. Among imports that are ready, the one
/// declared first runs first, so independent imports keep their order.
fn schedule(platform: &str, anchors: &[Option<usize>]) -> Result<Vec<usize>, ConfigError> {
    let mut dependents = vec![Vec::new(); anchors.len()];
    let mut ready = BTreeSet::new();
    for (index, anchor) in anchors.iter().enumerate() {
        match anchor {
            Some(anchor) => dependents[*anchor].push(index),
            None => {
                ready.insert(index);
            }
        }
    }

    let mut order = Vec::with_capacity(anchors.len());
    while let Some(index) = ready.pop_first() {
        order.push(index);
        ready.extend(dependents[index].iter().copied());
    }

    if order.len() < anchors.len() {
        let imports = (0..anchors.len())
            .filter(|index| !order.contains(index))
            .collect();
        return Err(ConfigError::DependencyCycle {
            platform: platform.to_owned(),
            imports,
        });
    }
    Ok(order)
}

fn check_export(platform: &str, export: &ExportConfig, tables: &[String]) -> Result<(), ConfigError> {
    let invalid = |identifier: &str| ConfigError::InvalidIdentifier {
        platform: platform.to_owned(),
        identifier: identifier.to_owned(),
    };
    if !is_identifier(&export.table_name) {
        return Err(invalid(&export.table_name));
    }
    if !tables.iter().any(|table| table.eq_ignore_ascii_case(&export.table_name)) {
        warn!(platform = %platform, table = %export.table_name, "export reads a table no import of this platform writes");
    }
    for reader in &export.reader_configs {
        if !is_identifier(&reader.column_name) {
            return Err(invalid(&reader.column_name));
        }
        if !PayoutRecord::FIELDS.contains(&reader.column_name.as_str()) {
            warn!(platform = %platform, column = %reader.column_name, "export column is not a payout record field and will be ignored");
        }
    }
    Ok(())
}
