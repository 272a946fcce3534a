//! disease-cli - administer the disease normalizer database.
//!
//! Usage:
//!   disease-cli check-db --verbose
//!   disease-cli update --sources ncit mondo --normalize
//!   disease-cli update --all --normalize --data-dir ./data
//!   disease-cli update-normalized
//!   disease-cli drop-db
//!   disease-cli dump --output ./dumps

use std::collections::BTreeSet;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use futures::TryStreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{error, info};

use disease_api::init_tracing;
use disease_core::defaults::ENV_DATA_DIR;
use disease_core::{DiseaseStore, RecordType, SourceName};
use disease_db::{create_store, Confirmer, DropGuard, StoreContext};
use disease_etl::{update_normalized, update_source, JsonLinesLoader, MergeSummary};

#[derive(Parser)]
#[command(
    name = "disease-cli",
    author,
    version,
    about = "Administer the disease normalizer database",
    propagate_version = true
)]
struct Cli {
    /// Store URL (defaults to DISEASE_NORM_DB_URL)
    #[arg(long, global = true)]
    db_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the schema exists and every table is populated.
    /// Exits with status 1 otherwise.
    CheckDb {
        /// Print the result to the console
        #[arg(short, long)]
        verbose: bool,
    },

    /// Replace source data from pre-transformed JSON-lines files
    Update {
        /// Sources to update, separated by spaces or commas
        #[arg(short, long, num_args = 1.., value_delimiter = ',')]
        sources: Vec<String>,

        /// Update every source
        #[arg(long, conflicts_with = "sources")]
        all: bool,

        /// Rebuild merged concepts afterwards
        #[arg(long)]
        normalize: bool,

        /// Directory holding `<source>_meta.json` and `<source>.jsonl`
        /// (defaults to DISEASE_NORM_DATA_DIR)
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
    },

    /// Rebuild merged concepts from every stored Mondo record
    UpdateNormalized,

    /// Delete all stored data
    DropDb,

    /// Write normalized output (merged concepts and ungrouped records) to a
    /// JSON-lines file
    Dump {
        /// Existing directory to write into
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
}

/// Asks on the terminal.
struct StdinConfirmer;

impl Confirmer for StdinConfirmer {
    fn confirm(&self, prompt: &str) -> bool {
        print!("{} [y/N]: ", prompt);
        if std::io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        if std::io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let _log_guard = init_tracing(
        "disease_cli=info,disease_etl=info,disease_db=info",
        "disease-cli.log",
    );

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(subsystem = "cli", error = %e, "Command failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut context = StoreContext::from_env()?;
    if matches!(cli.command, Commands::DropDb) {
        let guard = DropGuard::from_env()?.with_confirmer(Arc::new(StdinConfirmer));
        context = context.with_drop_guard(guard);
    }
    let store = create_store(cli.db_url.as_deref(), context).await?;

    let code = match cli.command {
        Commands::CheckDb { verbose } => {
            if check_db(store.as_ref(), verbose).await? {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Commands::Update {
            sources,
            all,
            normalize,
            data_dir,
        } => {
            update(store.as_ref(), &sources, all, normalize, data_dir).await?;
            ExitCode::SUCCESS
        }
        Commands::UpdateNormalized => {
            report_merge(&update_normalized(store.as_ref(), None).await?);
            ExitCode::SUCCESS
        }
        Commands::DropDb => {
            store.drop_db().await?;
            ExitCode::SUCCESS
        }
        Commands::Dump { output } => {
            let path = dump(store.as_ref(), &output).await?;
            println!("Wrote {}", path.display());
            ExitCode::SUCCESS
        }
    };

    store.close().await?;
    Ok(code)
}

/// Whether the schema exists and every table has data.
async fn check_db(store: &dyn DiseaseStore, verbose: bool) -> anyhow::Result<bool> {
    if !store.check_schema_initialized().await? {
        if verbose {
            println!("Health check failed: DB schema uninitialized.");
        }
        return Ok(false);
    }
    if !store.check_tables_populated().await? {
        if verbose {
            println!("Health check failed: DB is incompletely populated.");
        }
        return Ok(false);
    }

    let msg = "DB health check successful: tables appear complete.";
    if verbose {
        println!("{}", msg);
    }
    info!(subsystem = "cli", backend = store.backend_name(), "{}", msg);
    Ok(true)
}

async fn update(
    store: &dyn DiseaseStore,
    sources: &[String],
    all: bool,
    normalize: bool,
    data_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let selected = if all {
        SourceName::ALL.to_vec()
    } else {
        parse_sources(sources)?
    };

    if selected.is_empty() {
        if !normalize {
            bail!("Must either enter 1 or more sources, or use `--all`");
        }
        report_merge(&update_normalized(store, None).await?);
        return Ok(());
    }

    let data_dir = match data_dir {
        Some(dir) => dir,
        None => std::env::var(ENV_DATA_DIR)
            .map(PathBuf::from)
            .map_err(|_| anyhow!("No data directory; pass --data-dir or set {}", ENV_DATA_DIR))?,
    };

    let mut processed = BTreeSet::new();
    for src in selected {
        let loader = JsonLinesLoader::new(src, &data_dir);
        let ids = update_source(store, &loader)
            .await
            .with_context(|| format!("updating {}", src))?;
        processed.extend(ids);
    }

    if normalize {
        report_merge(&update_normalized(store, Some(processed)).await?);
    }
    info!(subsystem = "cli", "Database update successful");
    Ok(())
}

/// Source names from `--sources`, which may also be space-separated within
/// one argument.
fn parse_sources(raw: &[String]) -> anyhow::Result<Vec<SourceName>> {
    let mut names = BTreeSet::new();
    let mut invalid = Vec::new();
    for name in raw.iter().flat_map(|s| s.split_whitespace()) {
        match name.parse::<SourceName>() {
            Ok(src) => {
                names.insert(src);
            }
            Err(_) => invalid.push(name.to_string()),
        }
    }
    if !invalid.is_empty() {
        bail!("Not valid source(s): {}", invalid.join(", "));
    }
    Ok(names.into_iter().collect())
}

fn report_merge(summary: &MergeSummary) {
    info!(
        subsystem = "cli",
        drivers = summary.drivers_processed,
        groups = summary.groups_built,
        merged = summary.merged_written,
        skipped = summary.skipped_drivers.len(),
        overlapping = summary.overlapping_ids.len(),
        "Merged concept generation complete"
    );
}

/// Write every normalized record as one JSON object per line. Returns the
/// file written.
async fn dump(store: &dyn DiseaseStore, output: &Path) -> anyhow::Result<PathBuf> {
    if !output.is_dir() {
        bail!("Output directory {} does not exist", output.display());
    }
    let path = output.join(format!(
        "disease_norm_{}.jsonl",
        chrono::Utc::now().format("%Y%m%d%H%M%S")
    ));
    let file = tokio::fs::File::create(&path)
        .await
        .with_context(|| format!("creating {}", path.display()))?;
    let mut writer = tokio::io::BufWriter::new(file);

    let mut count = 0usize;
    let mut records = store.all_records(RecordType::Merger);
    while let Some(record) = records.try_next().await? {
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
        count += 1;
    }
    writer.flush().await?;

    info!(
        subsystem = "cli",
        op = "dump",
        record_count = count,
        path = %path.display(),
        "Database dump successful"
    );
    Ok(path)
}
