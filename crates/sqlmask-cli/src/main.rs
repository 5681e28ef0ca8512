//! sqlmask CLI - deterministic SQLite anonymization and subsetting.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use sqlmask::{
    catalog, draft_config, inspect, plan, Config, FkMode, MaskError, MaskOptions, Orchestrator,
    Registry, TriggerMode,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "sqlmask")]
#[command(about = "Deterministic SQLite anonymization and subsetting")]
#[command(version)]
struct Cli {
    /// Salt for deterministic hashing
    #[arg(long, default_value = "", global = true)]
    salt: String,

    /// Seed for deterministic generation
    #[arg(long, default_value = "0", global = true)]
    seed: i64,

    /// Foreign key enforcement on the output: on or off
    #[arg(long, default_value = "on", global = true)]
    fk: String,

    /// Trigger creation on the output: on or off
    #[arg(long, default_value = "on", global = true)]
    triggers: String,

    /// Parallel transform workers
    #[arg(long, default_value = "4", global = true)]
    jobs: usize,

    /// Temporary directory for the output connection
    #[arg(long, global = true)]
    tempdir: Option<PathBuf>,

    /// Output results as JSON to stdout
    #[arg(long, global = true)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text", global = true)]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info", global = true)]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy a SQLite database with masking
    Copy {
        /// Input SQLite file
        #[arg(long = "in")]
        input: PathBuf,

        /// Output SQLite file
        #[arg(long = "out")]
        output: PathBuf,

        /// Mask configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Subset and mask a SQLite database
    Sample {
        /// Input SQLite file
        #[arg(long = "in")]
        input: PathBuf,

        /// Output SQLite file
        #[arg(long = "out")]
        output: PathBuf,

        /// Mask configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Inspect schema and detect PII candidates
    Inspect {
        /// Input SQLite file
        #[arg(long = "in")]
        input: PathBuf,

        /// Write a draft mask config to a path, or - for stdout
        #[arg(long)]
        draft: Option<String>,
    },

    /// Show the transformation plan
    Plan {
        /// Input SQLite file
        #[arg(long = "in")]
        input: PathBuf,

        /// Mask configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MaskError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let cancel = setup_signal_handler();

    match &cli.command {
        Commands::Copy {
            input,
            output,
            config,
        } => run_copy(&cli, input, output, config.as_deref(), false, cancel).await,
        Commands::Sample {
            input,
            output,
            config,
        } => run_copy(&cli, input, output, config.as_deref(), true, cancel).await,
        Commands::Inspect { input, draft } => run_inspect(&cli, input, draft.as_deref()),
        Commands::Plan { input, config } => run_plan(&cli, input, config.as_deref()),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, MaskError> {
    serde_json::to_string_pretty(value).map_err(|e| MaskError::Config(format!("encode JSON: {e}")))
}

async fn run_copy(
    cli: &Cli,
    input: &std::path::Path,
    output: &std::path::Path,
    config: Option<&std::path::Path>,
    subset: bool,
    cancel: CancellationToken,
) -> Result<(), MaskError> {
    let config = Config::load(config)?;
    let options = MaskOptions {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        config,
        salt: cli.salt.clone(),
        seed: cli.seed,
        fk_mode: cli.fk.parse::<FkMode>()?,
        triggers: cli.triggers.parse::<TriggerMode>()?,
        jobs: cli.jobs,
        temp_dir: cli.tempdir.clone(),
        subset,
    };

    let orchestrator = Orchestrator::new(options)?;
    let report = tokio::task::spawn_blocking(move || orchestrator.run(&cancel))
        .await
        .map_err(|e| MaskError::Io(std::io::Error::other(e)))??;

    if cli.output_json {
        println!("{}", to_json(&report)?);
    } else {
        println!("Mask completed!");
        println!(
            "  Tables: {} copied, {} skipped",
            report.tables_copied, report.tables_skipped
        );
        println!("  Rows: {}", report.rows_copied);
    }
    Ok(())
}

fn run_inspect(cli: &Cli, input: &std::path::Path, draft: Option<&str>) -> Result<(), MaskError> {
    let conn = catalog::open_input(input)?;
    let report = inspect(&conn)?;

    if cli.output_json {
        println!("{}", to_json(&report)?);
    } else {
        println!("Tables:");
        for table in &report.tables {
            println!("- {} ({} rows)", table.name, table.rows);
            if !table.pii_candidates.is_empty() {
                println!("  PII candidates: {}", table.pii_candidates.join(", "));
            }
        }
    }

    if let Some(path) = draft {
        let schema = catalog::load_schema(&conn)?;
        let yaml = serde_yaml::to_string(&draft_config(&schema))
            .map_err(|e| MaskError::Config(format!("encode draft config: {e}")))?;
        let contents = format!("# Draft mask config\n{yaml}");
        if path == "-" {
            print!("{contents}");
        } else {
            std::fs::write(path, contents)?;
        }
    }

    info!("inspect complete");
    Ok(())
}

fn run_plan(
    cli: &Cli,
    input: &std::path::Path,
    config: Option<&std::path::Path>,
) -> Result<(), MaskError> {
    let config = Config::load(config)?;
    let conn = catalog::open_input(input)?;
    let report = plan(&conn, &config, &Registry::with_builtins())?;

    if cli.output_json {
        println!("{}", to_json(&report)?);
        info!("plan complete");
        return Ok(());
    }

    println!("Plan:");
    for table in &report.tables {
        println!("- {}", table.name);
        if table.columns.is_empty() {
            println!("  (no transforms)");
            continue;
        }
        for column in &table.columns {
            println!("  - {}: {}", column.column, column.transformer);
        }
    }

    info!("plan complete");
    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Cancel the returned token on SIGINT or SIGTERM so the run can roll back
/// and exit cleanly.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel = CancellationToken::new();

    let token = cancel.clone();
    tokio::spawn(async move {
        let Ok(mut sigint) = signal(SignalKind::interrupt()) else {
            return;
        };
        sigint.recv().await;
        eprintln!("\nReceived SIGINT. Cancelling...");
        token.cancel();
    });

    let token = cancel.clone();
    tokio::spawn(async move {
        let Ok(mut sigterm) = signal(SignalKind::terminate()) else {
            return;
        };
        sigterm.recv().await;
        eprintln!("\nReceived SIGTERM. Cancelling...");
        token.cancel();
    });

    cancel
}

#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Cancelling...");
            token.cancel();
        }
    });
    cancel
}
