//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use vocabsync_core::{
    BatchOptions, BatchSummary, IngestContext, JobStage, ProgressReporter, diff_store, ingest,
    run_batch, write_reports,
};
use vocabsync_shared::{
    AppConfig, JobError, PersistMode, SheetUpdate, VocabFormat, VocabularyJob, column,
    init_config, load_config, load_config_from, validate_config,
};
use vocabsync_storage::Ledger;
use vocabsync_storage::tsv::{export_tsv, import_tsv};
use vocabsync_store::{DeleteOutcome, StoreClient};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// vocabsync: publish SKOS vocabularies to a triple store.
#[derive(Parser)]
#[command(
    name = "vocabsync",
    version,
    about = "Download, repair, and publish SKOS vocabularies listed in a job ledger.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.vocabsync/vocabsync.toml).
    #[arg(long, global = true, env = "VOCABSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum Persist {
    PerJob,
    EndOfRun,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Process every ready row of the ledger.
    Run {
        /// Jobs processed concurrently (overrides `pipeline.workers`).
        #[arg(short, long)]
        workers: Option<usize>,

        /// When results are written back (overrides `pipeline.persist`).
        #[arg(long)]
        persist: Option<Persist>,
    },

    /// Ingest one vocabulary without touching the ledger.
    Ingest {
        /// Source URL (`.zip` and `.gz` payloads are unpacked).
        #[arg(long)]
        url: String,

        /// File type: rdf, ttl, n3, or nt.
        #[arg(short, long)]
        format: String,

        /// Concept scheme label.
        #[arg(short, long)]
        label: String,

        /// Short name used for the catalog entry and archive file.
        #[arg(short, long, default_value = "vocabulary")]
        short_name: String,

        /// Target graph; detected from the concepts when omitted.
        #[arg(long)]
        namespace: Option<String>,

        /// Language tag for untagged labels.
        #[arg(long)]
        default_language: Option<String>,
    },

    /// Named graph operations against the store.
    Graph {
        #[command(subcommand)]
        action: GraphAction,
    },

    /// Compare the store's graphs with the ledger's namespaces.
    Diff {
        /// Only print the comparison.
        #[arg(long)]
        no_reports: bool,
    },

    /// Job ledger maintenance.
    Ledger {
        #[command(subcommand)]
        action: LedgerAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Graph subcommands.
#[derive(Subcommand)]
pub(crate) enum GraphAction {
    /// Delete a named graph.
    Delete { uri: String },
    /// Replace a named graph with the content of a file.
    Put {
        uri: String,
        file: PathBuf,
        /// File type; taken from the file extension when omitted.
        #[arg(short, long)]
        format: Option<String>,
    },
    /// Download a named graph as Turtle.
    Get {
        uri: String,
        /// Output file (defaults to stdout).
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// List the store's named graphs.
    List,
}

/// Ledger subcommands.
#[derive(Subcommand)]
pub(crate) enum LedgerAction {
    /// Replace all ledger rows with a TSV sheet.
    Import { file: PathBuf },
    /// Write the ledger as TSV.
    Export {
        /// Output file (defaults to stdout).
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Show ledger rows and their last result.
    List,
    /// Show recent batch runs.
    Runs {
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Config and tracing setup
// ---------------------------------------------------------------------------

/// Load and validate the configuration selected by `--config`.
pub(crate) fn load(cli: &Cli) -> Result<AppConfig> {
    if matches!(
        cli.command,
        Command::Config {
            action: ConfigAction::Init
        }
    ) {
        return Ok(AppConfig::default());
    }

    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    validate_config(&config)?;
    Ok(config)
}

/// Initialize tracing based on CLI flags and `[logging]`.
pub(crate) fn init_tracing(cli: &Cli, config: &AppConfig) -> Result<()> {
    use tracing_subscriber::fmt::writer::BoxMakeWriter;
    use tracing_subscriber::{EnvFilter, fmt};

    let level = match cli.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("vocabsync={level}")));

    let (writer, ansi) = match &config.logging.file {
        Some(name) => {
            let path = config.data.output_dir().join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .wrap_err_with(|| format!("cannot create {}", parent.display()))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .wrap_err_with(|| format!("cannot open log file {}", path.display()))?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(writer)
                .with_ansi(ansi)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(writer)
                .init();
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli, config: AppConfig) -> Result<()> {
    match cli.command {
        Command::Run { workers, persist } => cmd_run(config, workers, persist).await,
        Command::Ingest {
            url,
            format,
            label,
            short_name,
            namespace,
            default_language,
        } => {
            let job = VocabularyJob {
                position: 0,
                title: label,
                source_url: url,
                file_type: format,
                short_name,
                namespace,
                ready: true,
            };
            cmd_ingest(config, job, default_language).await
        }
        Command::Graph { action } => {
            let store = StoreClient::new(&config.store)?;
            match action {
                GraphAction::Delete { uri } => cmd_graph_delete(&store, &uri).await,
                GraphAction::Put { uri, file, format } => {
                    cmd_graph_put(&store, &uri, &file, format.as_deref()).await
                }
                GraphAction::Get { uri, out } => cmd_graph_get(&store, &uri, out.as_deref()).await,
                GraphAction::List => cmd_graph_list(&store).await,
            }
        }
        Command::Diff { no_reports } => cmd_diff(&config, no_reports).await,
        Command::Ledger { action } => match action {
            LedgerAction::Import { file } => cmd_ledger_import(&config, &file).await,
            LedgerAction::Export { out } => cmd_ledger_export(&config, out.as_deref()).await,
            LedgerAction::List => cmd_ledger_list(&config).await,
            LedgerAction::Runs { limit } => cmd_ledger_runs(&config, limit).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&config).await,
        },
    }
}

async fn open_ledger(config: &AppConfig, readonly: bool) -> Result<Ledger> {
    Ledger::open_configured(&config.ledger, &config.data.base_dir(), readonly)
        .await
        .wrap_err("cannot open the job ledger")
}

// ---------------------------------------------------------------------------
// Pipeline commands
// ---------------------------------------------------------------------------

async fn cmd_run(config: AppConfig, workers: Option<usize>, persist: Option<Persist>) -> Result<()> {
    let mut options = BatchOptions::from(&config.pipeline);
    if let Some(workers) = workers {
        if workers == 0 {
            return Err(eyre!("--workers must be at least 1"));
        }
        options.workers = workers;
    }
    if let Some(persist) = persist {
        options.persist = match persist {
            Persist::PerJob => PersistMode::PerJob,
            Persist::EndOfRun => PersistMode::EndOfRun,
        };
    }

    let ledger = open_ledger(&config, false).await?;
    let ctx = Arc::new(IngestContext::from_config(&config)?);
    info!(workers = options.workers, persist = ?options.persist, "starting batch");

    let summary = run_batch(ctx, &ledger, options, Arc::new(CliProgress::new())).await?;

    println!();
    println!("  Batch finished");
    if let Some(run_id) = &summary.run_id {
        println!("  Run:       {run_id}");
    }
    println!("  Rows:      {}", summary.stats.total);
    println!("  Succeeded: {}", summary.stats.succeeded);
    println!("  Failed:    {}", summary.stats.failed);
    println!("  Skipped:   {}", summary.stats.skipped);
    if summary.ledger_write_failures > 0 {
        println!("  Ledger write failures: {}", summary.ledger_write_failures);
    }
    println!("  Time:      {:.1}s", summary.elapsed_ms as f64 / 1000.0);
    println!();
    Ok(())
}

async fn cmd_ingest(
    mut config: AppConfig,
    job: VocabularyJob,
    default_language: Option<String>,
) -> Result<()> {
    if default_language.is_some() {
        config.pipeline.default_language = default_language;
    }
    let ctx = IngestContext::from_config(&config)?;
    let progress = CliProgress::new();
    let outcome = ingest(&ctx, &job, &progress).await;
    progress.spinner.finish_and_clear();

    println!("{}", serde_json::to_string_pretty(&outcome.update)?);
    if let Some(path) = &outcome.archived {
        println!("Archived: {}", path.display());
    }
    match outcome.update.error {
        None => Ok(()),
        Some(error) => Err(eyre!("{}: {}", error.kind(), error.message())),
    }
}

// ---------------------------------------------------------------------------
// Graph commands
// ---------------------------------------------------------------------------

async fn cmd_graph_delete(store: &StoreClient, uri: &str) -> Result<()> {
    match store.delete_graph(uri).await? {
        DeleteOutcome::Deleted => println!("Deleted <{uri}>"),
        DeleteOutcome::NotFound => println!("No graph <{uri}>"),
    }
    Ok(())
}

async fn cmd_graph_put(store: &StoreClient, uri: &str, file: &Path, format: Option<&str>) -> Result<()> {
    let token = match format {
        Some(token) => token.to_string(),
        None => file
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_string(),
    };
    let format = VocabFormat::from_token(&token)
        .ok_or_else(|| eyre!("{}", JobError::InvalidMimeType { token }))?;
    let payload =
        std::fs::read(file).wrap_err_with(|| format!("cannot read {}", file.display()))?;

    let receipt = store.replace(uri, payload, format.mime_type()).await?;
    println!("Uploaded {} triples into <{uri}>", receipt.triple_count);
    Ok(())
}

async fn cmd_graph_get(store: &StoreClient, uri: &str, out: Option<&Path>) -> Result<()> {
    let turtle = store.get_graph(uri).await?;
    match out {
        Some(path) => {
            std::fs::write(path, &turtle)
                .wrap_err_with(|| format!("cannot write {}", path.display()))?;
            println!("Wrote <{uri}> to {}", path.display());
        }
        None => print!("{turtle}"),
    }
    Ok(())
}

async fn cmd_graph_list(store: &StoreClient) -> Result<()> {
    for graph in store.list_graphs().await? {
        println!("{graph}");
    }
    Ok(())
}

async fn cmd_diff(config: &AppConfig, no_reports: bool) -> Result<()> {
    let store = StoreClient::new(&config.store)?;
    let ledger = open_ledger(config, true).await?;
    let diff = diff_store(&store, &ledger).await?;

    println!("Store graphs:  {}", diff.store_graphs);
    println!("Ledger graphs: {}", diff.ledger_graphs);
    for ns in &diff.duplicates {
        println!("  duplicate in ledger: {ns}");
    }
    for ns in &diff.not_in_store {
        println!("  missing from store:  {ns}");
    }
    for ns in &diff.not_in_ledger {
        println!("  missing from ledger: {ns}");
    }
    if diff.in_sync() {
        println!("Store and ledger are in sync.");
    }

    if !no_reports {
        let dir = write_reports(&diff, &config.data.output_dir())?;
        println!("Reports written to {}", dir.display());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Ledger commands
// ---------------------------------------------------------------------------

async fn cmd_ledger_import(config: &AppConfig, file: &Path) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .wrap_err_with(|| format!("cannot read {}", file.display()))?;
    let rows = import_tsv(&text)?;
    let ledger = open_ledger(config, false).await?;
    ledger.replace_rows(&rows).await?;
    println!("Imported {} rows from {}", rows.len(), file.display());
    Ok(())
}

async fn cmd_ledger_export(config: &AppConfig, out: Option<&Path>) -> Result<()> {
    let ledger = open_ledger(config, true).await?;
    let text = export_tsv(&ledger.load_rows().await?);
    match out {
        Some(path) => {
            std::fs::write(path, text)
                .wrap_err_with(|| format!("cannot write {}", path.display()))?;
            println!("Exported ledger to {}", path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}

async fn cmd_ledger_list(config: &AppConfig) -> Result<()> {
    let ledger = open_ledger(config, true).await?;
    let rows = ledger.load_rows().await?;
    if rows.is_empty() {
        println!("Ledger is empty. Import a sheet with `vocabsync ledger import <file.tsv>`.");
        return Ok(());
    }

    println!(
        "{:>4}  {:<16} {:<5} {:>9}  {:<40} ERROR",
        "POS", "SHORT NAME", "READY", "TRIPLES", "NAMESPACE"
    );
    for row in &rows {
        println!(
            "{:>4}  {:<16} {:<5} {:>9}  {:<40} {}",
            row.position,
            row.cell(column::SHORT_NAME),
            row.cell(column::READY),
            row.cell(column::TRIPLE_COUNT),
            row.cell(column::GENERATED_NAMESPACE),
            row.cell(column::ERROR_KIND),
        );
    }
    Ok(())
}

async fn cmd_ledger_runs(config: &AppConfig, limit: usize) -> Result<()> {
    let ledger = open_ledger(config, true).await?;
    for run in ledger.list_runs(limit).await? {
        let stats = match run.stats {
            Some(s) => format!(
                "{} rows, {} ok, {} failed, {} skipped",
                s.total, s.succeeded, s.failed, s.skipped
            ),
            None => "unfinished".to_string(),
        };
        println!("{}  {}  {stats}", run.id, run.started_at);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Config commands
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn job_started(&self, job: &VocabularyJob, current: usize, total: usize) {
        self.spinner
            .set_message(format!("[{current}/{total}] {}", job.short_name));
    }

    fn stage(&self, job: &VocabularyJob, stage: JobStage) {
        self.spinner
            .set_message(format!("{}: {}", job.short_name, stage.label()));
    }

    fn job_finished(&self, short_name: &str, update: &SheetUpdate) {
        let line = match &update.error {
            None => format!(
                "  ok    {short_name} ({} triples)",
                update.triple_count.unwrap_or(0)
            ),
            Some(error) => format!("  fail  {short_name}: {}", error.kind()),
        };
        self.spinner.println(line);
    }

    fn done(&self, _summary: &BatchSummary) {
        self.spinner.finish_and_clear();
    }
}
