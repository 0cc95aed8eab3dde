//! trrcms - TRRCMS core administrative binary.
//!
//! `trrcms ingest --file <path> --as <user>` runs a full import
//! synchronously and prints the resulting `ImportResult` as JSON
//! (spec.md §6.4). `trrcms serve` boots the local-network sync boundary.

mod config;

use clap::Parser;
use config::{Cli, Command};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use trr_ingest::Pipeline;
use trr_storage::Store;
use trr_validate::{RegionBbox, ValidatorRegistry};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_format);

    let region = cli.region_bbox.as_deref().and_then(RegionBbox::parse);
    if cli.region_bbox.is_some() && region.is_none() {
        error!("TRRCMS_REGION_BBOX set but not parseable as min_lat,min_lng,max_lat,max_lng");
    }

    let store = match Store::open(&cli.data_dir) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("failed to open store at {}: {e}", cli.data_dir.display());
            return ExitCode::from(2);
        }
    };
    let registry = ValidatorRegistry::new(region);
    let pipeline = Arc::new(Pipeline::new(store.clone(), registry, cli.staging_dir.clone(), cli.quarantine_dir.clone()));

    match cli.command {
        Command::Ingest { file, actor, commit } => run_ingest(pipeline, &file, &actor, commit),
        Command::Serve { port, auth_secret } => {
            run_serve(store, pipeline, &cli.staging_dir, &cli.quarantine_dir, port, auth_secret).await
        }
    }
}

fn init_logging(format: &str) {
    let filter = EnvFilter::from_default_env().add_directive("trr_cli=info".parse().unwrap());
    let registry = tracing_subscriber::registry().with(filter);
    if format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

fn run_ingest(pipeline: Arc<Pipeline>, file: &std::path::Path, actor: &str, commit: bool) -> ExitCode {
    let result = match pipeline.import(file, actor) {
        Ok(r) => r,
        Err(e) => {
            error!("fatal ingest failure: {e}");
            println!("{}", serde_json::json!({ "success": false, "stage": "FATAL", "error": e.to_string() }));
            return ExitCode::from(2);
        }
    };

    let result = if commit && result.success && result.stage == "STAGED" {
        match pipeline.commit(&result.package_id, actor) {
            Ok(committed) => committed,
            Err(e) => {
                error!("commit failed for {}: {e}", result.package_id);
                println!("{}", serde_json::to_string_pretty(&result).unwrap());
                return ExitCode::from(2);
            }
        }
    } else {
        result
    };

    println!("{}", serde_json::to_string_pretty(&result).unwrap_or_default());
    if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

async fn run_serve(
    store: Arc<Store>,
    pipeline: Arc<Pipeline>,
    staging_dir: &std::path::Path,
    quarantine_dir: &std::path::Path,
    port: u16,
    auth_secret: Option<String>,
) -> ExitCode {
    let mut config = trr_sync::SyncConfig::new(staging_dir.to_path_buf(), quarantine_dir.to_path_buf());
    config.port = port;
    if let Some(secret) = auth_secret {
        config.auth_secret = secret.into_bytes();
    } else {
        info!("no TRRCMS_AUTH_SECRET provided, generated a random secret for this process");
    }

    let server = trr_sync::SyncServer::new(config, store, pipeline);
    if let Err(e) = server.run().await {
        error!("sync server error: {e}");
        return ExitCode::from(2);
    }
    ExitCode::SUCCESS
}
