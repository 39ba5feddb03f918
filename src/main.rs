use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use payout_sheet::{logging, DocumentId, PayoutConfigs, PayoutEngine, PayoutError, PayoutStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// File types the spreadsheet reader accepts.
const SUPPORTED_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];

#[derive(Parser, Debug)]
#[command(name = "payout-sheet", version, about = "Extract payout records from platform settlement spreadsheets")]
struct Cli {
    /// DuckDB database file
    #[arg(long, env = "PAYOUT_DB_PATH", default_value = "data/payout.duckdb", global = true)]
    db: PathBuf,

    /// Payout configuration JSON
    #[arg(long, env = "PAYOUT_CONFIG_PATH", default_value = "payout_configs.json", global = true)]
    config: PathBuf,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Document tags that exist; configured platforms outside this list are skipped
    #[arg(long = "known-tag", env = "PAYOUT_KNOWN_TAGS", value_delimiter = ',', global = true)]
    known_tags: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract the payout record of one document and print it as JSON
    Extract {
        #[arg(long)]
        document_id: i64,

        /// Settlement spreadsheet
        #[arg(long)]
        file: PathBuf,

        /// Platform identifier
        #[arg(long, conflicts_with = "tags", required_unless_present = "tags")]
        platform: Option<String>,

        /// Document tags; the first one naming a platform selects it
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Extract even when the document is already in the ledger
        #[arg(long)]
        force: bool,
    },
    /// Validate the configuration and print each platform's import order
    Check,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    let mut registry = PayoutConfigs::load(&cli.config)
        .with_context(|| format!("Failed to load payout config {}", cli.config.display()))?;
    if !cli.known_tags.is_empty() {
        registry.retain_platforms(&cli.known_tags);
    }

    match cli.command {
        Command::Check => {
            for plan in registry.platforms() {
                let order = plan
                    .order()
                    .iter()
                    .map(|&index| format!("#{index} -> {}", plan.table(index).unwrap_or_default()))
                    .collect::<Vec<_>>();
                println!("{}: {}", plan.platform(), order.join(", "));
            }
            info!(platforms = registry.len(), "configuration is valid");
            Ok(())
        }
        Command::Extract {
            document_id,
            file,
            platform,
            tags,
            force,
        } => {
            let document_id = DocumentId::try_from(document_id).map_err(PayoutError::InvalidDocumentId)?;
            let extension = file
                .extension()
                .and_then(|extension| extension.to_str())
                .map(str::to_lowercase)
                .unwrap_or_default();
            if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
                bail!("Unsupported file type: {}", file.display());
            }

            let plan = match &platform {
                Some(platform) => registry.platform(platform),
                None => registry.platform_for_tags(&tags),
            };
            let Some(plan) = plan else {
                bail!("No payout configuration for platform {platform:?} / tags {tags:?}");
            };

            let store = Arc::new(
                PayoutStore::open(&cli.db)
                    .with_context(|| format!("Failed to open database {}", cli.db.display()))?,
            );
            if !force && store.is_processed(document_id)? {
                warn!(document_id = %document_id, "document already processed, skipping");
                return Ok(());
            }

            let engine = PayoutEngine::new(Arc::clone(&store));
            let mut record = engine.ingest_and_project(document_id, &file, plan.platform(), plan)?;
            if record.utr_number.is_none() {
                record.utr_number = file
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned());
            }

            println!("{}", serde_json::to_string_pretty(&record)?);
            let file_name = file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            store.mark_processed(document_id, &file_name, plan.platform())?;
            info!(document_id = %document_id, platform = %plan.platform(), "document processed");
            Ok(())
        }
    }
}
