//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use autograph_core::{
    BuildContext, BuildRequest, BuildResult, BuildSettings, Intervention, ProgressReporter,
    build_snapshot, record_intervention,
};
use autograph_export::{DirectorySink, ExportSink, export_build};
use autograph_shared::{
    AppConfig, AutographError, BuildId, SourceId, SourceKind, init_config, load_config,
};
use autograph_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Autograph: versioned knowledge-graph snapshots.
#[derive(Parser)]
#[command(
    name = "autograph",
    version,
    about = "Build immutable, versioned knowledge-graph snapshots from extracted assertions.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Metadata database path (overrides `storage.db_path`).
    #[arg(long, env = "AUTOGRAPH_DB", global = true)]
    pub db: Option<PathBuf>,

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

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// List registered extraction sources.
    Sources,

    /// Extraction source management.
    Source {
        #[command(subcommand)]
        action: SourceAction,
    },

    /// Record a batch of manual corrections from a JSON file.
    Intervene {
        /// Corrections file: {add_entity, del_entity, add_relation, del_relation}.
        #[arg(long)]
        file: PathBuf,
    },

    /// Build a new graph snapshot from the given sources.
    Build {
        /// Source ID to include (repeatable).
        #[arg(long = "source", required = true, num_args = 1..)]
        sources: Vec<SourceId>,

        /// Description stored on the build.
        #[arg(long, default_value = "")]
        desc: String,

        /// Node computations in flight (overrides `build.concurrency`).
        #[arg(long)]
        concurrency: Option<usize>,

        /// Export the build right after it commits.
        #[arg(long)]
        export: bool,

        /// Print the build result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List committed builds.
    Builds,

    /// Export a build as entity and relation CSV tables.
    Export {
        /// Build ID (the graph version).
        #[arg(long)]
        build: BuildId,

        /// Output directory (overrides `export.output_dir`).
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Source subcommands.
#[derive(Subcommand)]
pub(crate) enum SourceAction {
    /// Register a new extraction source.
    Add {
        #[arg(long)]
        name: String,

        #[arg(long, default_value = "")]
        desc: String,

        /// model or human.
        #[arg(long, default_value = "model")]
        kind: SourceKind,
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
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "autograph=info",
        1 => "autograph=debug",
        _ => "autograph=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let db = cli.db;
    match cli.command {
        Command::Sources => cmd_sources(db.as_deref()).await,
        Command::Source { action } => match action {
            SourceAction::Add { name, desc, kind } => {
                cmd_source_add(db.as_deref(), &name, &desc, kind).await
            }
        },
        Command::Intervene { file } => cmd_intervene(db.as_deref(), &file).await,
        Command::Build {
            sources,
            desc,
            concurrency,
            export,
            json,
        } => cmd_build(db.as_deref(), sources, &desc, concurrency, export, json).await,
        Command::Builds => cmd_builds(db.as_deref()).await,
        Command::Export { build, out } => cmd_export(db.as_deref(), build, out.as_deref()).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

/// Load config and open the metadata store, `--db` winning over the file.
async fn open_storage(db: Option<&Path>) -> Result<(AppConfig, Storage)> {
    let config = load_config()?;
    let path = match db {
        Some(p) => p.to_path_buf(),
        None => config.storage.resolved_db_path()?,
    };
    info!(path = %path.display(), "opening metadata store");
    let storage = Storage::open(&path).await?;
    Ok((config, storage))
}

// ---------------------------------------------------------------------------
// Source registry
// ---------------------------------------------------------------------------

async fn cmd_sources(db: Option<&Path>) -> Result<()> {
    let (_config, storage) = open_storage(db).await?;
    let sources = storage.list_sources().await?;

    if sources.is_empty() {
        println!("No sources registered.");
        return Ok(());
    }

    println!("  {:>6}  {:<20}  {:<18}  DESCRIPTION", "ID", "NAME", "KIND");
    for source in sources {
        println!(
            "  {:>6}  {:<20}  {:<18}  {}",
            source.id, source.name, source.kind, source.desc
        );
    }
    Ok(())
}

async fn cmd_source_add(db: Option<&Path>, name: &str, desc: &str, kind: SourceKind) -> Result<()> {
    let (_config, storage) = open_storage(db).await?;
    let source = storage.insert_source(name, desc, kind).await?;
    info!(id = %source.id, name, %kind, "registered source");
    println!("Source {} registered ({kind}).", source.id);
    Ok(())
}

async fn cmd_intervene(db: Option<&Path>, file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file).map_err(|e| AutographError::io(file, e))?;
    let intervention: Intervention = serde_json::from_str(&content)
        .map_err(|e| eyre!("invalid corrections file '{}': {e}", file.display()))?;

    let (_config, storage) = open_storage(db).await?;
    match record_intervention(&storage, &intervention).await? {
        Some(source) => println!("Recorded corrections as source {} ({}).", source.id, source.name),
        None => println!("Corrections file is empty; nothing recorded."),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Builds
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn node_built(&self, name: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Creating nodes [{current}/{total}] {name}"));
    }

    fn done(&self, _result: &BuildResult) {
        self.spinner.finish_and_clear();
    }
}

async fn cmd_build(
    db: Option<&Path>,
    sources: Vec<SourceId>,
    desc: &str,
    concurrency: Option<usize>,
    export: bool,
    json: bool,
) -> Result<()> {
    let (config, storage) = open_storage(db).await?;

    let mut settings = BuildSettings::from(&config);
    if let Some(n) = concurrency {
        if n == 0 {
            return Err(eyre!("--concurrency must be at least 1"));
        }
        settings.concurrency = n;
    }

    // Ctrl-C cancels the build and rolls it back.
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling build");
            on_signal.cancel();
        }
    });

    let reporter = CliProgress::new();
    let ctx = BuildContext::new(&storage)
        .with_settings(settings)
        .with_cancel(cancel)
        .with_progress(&reporter);
    let request = BuildRequest {
        source_ids: sources,
        description: desc.to_string(),
    };

    let outcome = build_snapshot(&ctx, &request).await;
    if outcome.is_err() {
        reporter.spinner.finish_and_clear();
    }
    let result = build_outcome(outcome)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        let elapsed = result.finish_time - result.start_time;
        println!();
        println!("  Build committed!");
        println!("  Version:  {}", result.build_id);
        println!("  Sources:  {}", result.source_snapshot_map.len());
        println!("  Nodes:    {}", result.node_count);
        println!("  Deleted:  {}", result.deleted_names.len());
        println!(
            "  Time:     {:.1}s",
            elapsed.num_milliseconds() as f64 / 1000.0
        );
        println!();
    }

    if export {
        write_export(&storage, &config, result.build_id, None).await?;
    }
    Ok(())
}

/// A cancelled build is still a failed command.
fn build_outcome(outcome: autograph_shared::Result<BuildResult>) -> Result<BuildResult> {
    match outcome {
        Ok(result) => Ok(result),
        Err(AutographError::Cancelled) => Err(eyre!("build cancelled; nothing was written")),
        Err(e) => Err(e.into()),
    }
}

async fn cmd_builds(db: Option<&Path>) -> Result<()> {
    let (_config, storage) = open_storage(db).await?;
    let builds = storage.list_builds().await?;

    if builds.is_empty() {
        println!("No builds yet.");
        return Ok(());
    }

    println!("  {:>8}  {:<25}  DESCRIPTION", "VERSION", "CREATED");
    for build in builds {
        println!(
            "  {:>8}  {:<25}  {}",
            build.id,
            build.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            build.description
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

async fn cmd_export(db: Option<&Path>, build: BuildId, out: Option<&Path>) -> Result<()> {
    let (config, storage) = open_storage(db).await?;
    write_export(&storage, &config, build, out).await
}

async fn write_export(
    storage: &Storage,
    config: &AppConfig,
    build: BuildId,
    out: Option<&Path>,
) -> Result<()> {
    let dir = match out {
        Some(p) => p.to_path_buf(),
        None => PathBuf::from(&config.export.output_dir),
    };

    let tables = export_build(storage, build, config.export.page_size).await?;
    let sink = DirectorySink::new(&dir);
    sink.write(&tables)?;

    println!(
        "Exported build {build}: {} entities, {} relations",
        tables.entity_rows, tables.relation_rows
    );
    println!("  {}", sink.entities_path(build).display());
    println!("  {}", sink.relations_path(build).display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
