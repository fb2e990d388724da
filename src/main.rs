use std::fs;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::LevelFilter;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};
use tokio::runtime::Runtime;
use uuid::Uuid;

use rust_zipper::cli::Args;
use rust_zipper::cloud::client::init_shared_client;
use rust_zipper::cloud::s3::S3Store;
use rust_zipper::config::PipelineConfig;
use rust_zipper::handler::{destination_key, ResultEnvelope, TriggerEvent, ZipHandler};
use rust_zipper::models::SourceObjectRef;
use rust_zipper::pipeline::PipelineCoordinator;

fn main() -> Result<()> {
    // Parse arguments
    let args = Args::parse();

    // Initialize logging
    initialize_logging(args.verbose)?;

    // Load and process configuration
    let config = load_config(&args)?;
    let source = resolve_source(&args)?;
    let request_id = args
        .request_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let runtime = Runtime::new().context("Failed to create tokio runtime")?;
    let envelope = runtime.block_on(run(&config, source, request_id))?;

    println!(
        "{}",
        serde_json::to_string_pretty(&envelope).context("Failed to serialize result")?
    );
    if !envelope.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

/// Initialize logging with the specified verbosity level
fn initialize_logging(verbose: bool) -> Result<()> {
    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    TermLogger::init(
        log_level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )
    .context("Failed to initialize logger")?;
    Ok(())
}

/// Configuration file and environment, overridden by command-line flags
fn load_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::load(args.config.as_deref())?;

    if let Some(region) = &args.region {
        config.region = Some(region.clone());
    }
    if let Some(profile) = &args.profile {
        config.profile = Some(profile.clone());
    }
    if let Some(folder) = &args.archive_folder {
        config.archive_folder_path = folder.clone();
    }
    if let Some(prefix) = &args.destination_prefix {
        config.destination_prefix = prefix.clone();
    }
    Ok(config)
}

fn resolve_source(args: &Args) -> Result<SourceObjectRef> {
    if let Some(path) = &args.event {
        let json = fs::read_to_string(path)
            .context(format!("Failed to read event file: {}", path.display()))?;
        return TriggerEvent::from_json(&json)?.source();
    }
    match (&args.bucket, &args.key) {
        (Some(bucket), Some(key)) => Ok(SourceObjectRef::new(bucket.clone(), key.clone())),
        _ => bail!("Either --event or both --bucket and --key must be given"),
    }
}

async fn run(
    config: &PipelineConfig,
    source: SourceObjectRef,
    request_id: String,
) -> Result<ResultEnvelope> {
    let client = init_shared_client(config.region.as_deref(), config.profile.as_deref())
        .context("Failed to create S3 client")?;
    let store = Arc::new(S3Store::new(client));
    let coordinator = PipelineCoordinator::new(store, config.stage_options());

    let archive_file_path = destination_key(&config.destination_prefix, &source.key)?;
    let handler = ZipHandler::new(coordinator, source, request_id, archive_file_path)?
        .with_archive_folder(config.archive_folder_path.clone());
    Ok(handler.process().await)
}
