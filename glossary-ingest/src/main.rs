//! glossary - AI/ML glossary data pipeline and API server
//!
//! Every subcommand prints a JSON summary on stdout. Failures print
//! `{"success": false, "error": ...}` and exit with status 1. Logs go to
//! stderr and, when configured, to `logging.log_file`.

mod cli;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use cli::{Cli, Command};
use glossary_common::config::{
    load_toml_config, write_toml_config, RootFolderInitializer, RootFolderResolver, TomlConfig,
    OPENAI_API_KEY_ENV,
};
use glossary_common::db::init_database;
use glossary_common::events::EventBus;
use glossary_ingest::generation::{
    client_from_config, default_checkpoint_path, store_api_key, BatchReport, Checkpoint,
    FillOrder, GenerationError, GenerationObserver, GenerationRunner, GenerationSettings,
};
use glossary_ingest::services::{self, ImportOptions, IncrementalImporter, ProcessOptions};
use glossary_ingest::table::SheetTable;
use glossary_ingest::AppState;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let outcome = match load_toml_config(&cli.config_path()) {
        Ok(config) => match init_tracing(&config) {
            Ok(()) => run(cli, config).await,
            Err(e) => Err(e),
        },
        Err(e) => Err(e.into()),
    };

    if let Err(e) = outcome {
        tracing::error!(error = %format!("{:#}", e), "Command failed");
        println!(
            "{}",
            json!({"success": false, "error": format!("{:#}", e)})
        );
        std::process::exit(1);
    }
}

/// `RUST_LOG` overrides `logging.level`
fn init_tracing(config: &TomlConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=info", config.logging.level)));

    let file_layer = match &config.logging.log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}

fn print_summary<T: Serialize>(summary: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(summary)?);
    Ok(())
}

async fn run(cli: Cli, config: TomlConfig) -> Result<()> {
    let config_path = cli.config_path();
    let root_folder = RootFolderResolver::new("glossary")
        .with_cli_arg(cli.root_folder.clone())
        .with_toml(&config)
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);

    match cli.command {
        Command::Serve { port, bind } => serve(initializer, config, port, bind).await,

        Command::Process {
            input,
            output,
            chunk_size,
            max_chunks,
            import,
        } => {
            let options = ProcessOptions {
                chunk_size: chunk_size.max(1),
                max_chunks,
            };
            let (dataset, summary) = services::process_file(&input, &output, &options, |done, total| {
                info!("Processed chunk {} of {}", done, total);
            })?;

            if import {
                let db = open_database(&initializer).await?;
                let imported = services::import_dataset(&db, &dataset).await?;
                print_summary(&json!({"processing": summary, "imported": imported}))
            } else {
                print_summary(&summary)
            }
        }

        Command::Split {
            input,
            output_dir,
            chunk_size,
        } => print_summary(&services::split_dataset(&input, &output_dir, chunk_size)?),

        Command::ExportChunks {
            input,
            output_dir,
            chunk_size,
        } => {
            let table = SheetTable::load(&input)?;
            let summary = services::export_raw_chunks(
                &table,
                &input.display().to_string(),
                &output_dir,
                chunk_size,
            )?;
            print_summary(&summary)
        }

        Command::Convert {
            input,
            output,
            validate,
        } => print_summary(&services::convert(&input, &output, validate)?),

        Command::Inspect { input } => {
            let table = SheetTable::load(&input)?;
            print_summary(&services::inspect(&table))
        }

        Command::Import {
            input,
            force_all,
            dry_run,
            chunk_size,
            apply,
            work_dir,
        } => {
            let mut options =
                ImportOptions::new(work_dir.unwrap_or_else(|| initializer.root_folder().join("import")));
            options.force_all = force_all;
            options.dry_run = dry_run;
            options.chunk_size = chunk_size.max(1);

            let (plan, summary) = IncrementalImporter::new(options).run(&input, |done, total| {
                info!("Compared chunk {} of {}", done, total);
            })?;

            if apply && !dry_run {
                let db = open_database(&initializer).await?;
                let applied = services::apply_changes(&db, &plan).await?;
                print_summary(&json!({"import": summary, "applied_terms": applied}))
            } else {
                print_summary(&summary)
            }
        }

        Command::Execute { sql_file } => {
            let db = open_database(&initializer).await?;
            services::execute_sql_file(&db, &sql_file).await?;
            print_summary(&json!({
                "success": true,
                "sql_file": sql_file.display().to_string(),
            }))
        }

        Command::Generate {
            input,
            mode,
            workers,
            batch_size,
            reset_checkpoint,
            checkpoint,
        } => {
            let order: FillOrder = mode.parse()?;
            let checkpoint = checkpoint.unwrap_or_else(|| default_checkpoint_path(&input));
            if reset_checkpoint {
                Checkpoint::reset(&checkpoint)?;
            }
            generate(&initializer, &config, &input, &checkpoint, order, workers, batch_size).await
        }

        Command::SetApiKey { key } => {
            let db = open_database(&initializer).await?;
            store_api_key(&db, &key).await?;
            print_summary(&json!({
                "success": true,
                "database": initializer.database_path().display().to_string(),
            }))
        }

        Command::InitConfig { force } => {
            if config_path.exists() && !force {
                anyhow::bail!(
                    "Config file already exists: {} (use --force to replace it)",
                    config_path.display()
                );
            }
            let mut config = config;
            if config.root_folder.is_none() {
                config.root_folder = Some(initializer.root_folder().display().to_string());
            }
            write_toml_config(&config, &config_path)?;
            info!(path = %config_path.display(), "Wrote configuration");
            print_summary(&json!({
                "success": true,
                "config": config_path.display().to_string(),
            }))
        }
    }
}

async fn open_database(initializer: &RootFolderInitializer) -> Result<sqlx::SqlitePool> {
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;
    let db = init_database(&initializer.database_path()).await?;
    Ok(db)
}

/// Progress bar over missing cells
struct ProgressBarObserver {
    bar: ProgressBar,
}

#[async_trait]
impl GenerationObserver for ProgressBarObserver {
    async fn on_start(&self, total_cells: usize, _batch_total: usize) {
        self.bar.set_length(total_cells as u64);
    }

    async fn on_batch(&self, report: &BatchReport) {
        self.bar.set_position(report.total_attempted as u64);
        self.bar.set_message(format!(
            "batch {}/{} ${:.4}",
            report.batch_number, report.batch_total, report.cost_usd
        ));
    }
}

async fn generate(
    initializer: &RootFolderInitializer,
    config: &TomlConfig,
    input: &Path,
    checkpoint: &Path,
    order: FillOrder,
    workers: Option<usize>,
    batch_size: Option<usize>,
) -> Result<()> {
    let db = open_database(initializer).await?;
    let client = client_from_config(Some(&db), config)
        .await?
        .ok_or(GenerationError::MissingApiKey(OPENAI_API_KEY_ENV))?;

    let settings = GenerationSettings::from_config(config)
        .with_workers(workers, batch_size)
        .with_order(order);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current batch");
            ctrl_c.cancel();
        }
    });

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")?
            .progress_chars("##-"),
    );
    let observer = ProgressBarObserver { bar };

    let report = GenerationRunner::new(&client, settings)
        .with_cancellation(cancel)
        .run(input, checkpoint, &observer)
        .await?;
    observer.bar.finish_and_clear();

    print_summary(&report)
}

async fn serve(
    initializer: RootFolderInitializer,
    config: TomlConfig,
    port: Option<u16>,
    bind: Option<String>,
) -> Result<()> {
    info!("Starting glossary API server");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let db = open_database(&initializer).await?;
    info!("Database: {}", initializer.database_path().display());

    let interrupted = glossary_ingest::db::operations::fail_interrupted_operations(&db).await?;
    if interrupted > 0 {
        warn!(interrupted, "Marked operations from a previous run as failed");
    }

    let event_bus = EventBus::new(100);

    let client = client_from_config(Some(&db), &config).await?;
    if client.is_none() {
        warn!("No OpenAI API key configured; AI generation is disabled");
    }

    let address = format!(
        "{}:{}",
        bind.unwrap_or_else(|| config.bind_address.clone()),
        port.unwrap_or(config.port)
    );

    let mut state = AppState::new(db, event_bus, config, initializer.root_folder().to_path_buf());
    if let Some(client) = client {
        state = state.with_completion_client(Arc::new(client));
    }

    let app = glossary_ingest::build_router(state);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind to {}", address))?;
    info!("Listening on http://{}", address);
    info!("Health check: http://{}/api/health", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
