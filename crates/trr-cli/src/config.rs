//! CLI argument/env parsing (spec.md §6.4).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// trrcms - field-data reconciliation and spatial query core
#[derive(Parser, Debug)]
#[command(name = "trrcms")]
#[command(about = "TRRCMS ingest pipeline and sync boundary administrative CLI")]
pub struct Cli {
    /// Sled data directory for the committed store
    #[arg(long, env = "TRRCMS_DATA_DIR", default_value = "./data/trrcms")]
    pub data_dir: PathBuf,

    /// Staging directory for verbatim uploaded packages
    #[arg(long, env = "TRRCMS_STAGING_DIR", default_value = "./data/staging")]
    pub staging_dir: PathBuf,

    /// Quarantine directory for packages that fail gating
    #[arg(long, env = "TRRCMS_QUARANTINE_DIR", default_value = "./data/quarantine")]
    pub quarantine_dir: PathBuf,

    /// Regional bounding box (min_lat,min_lng,max_lat,max_lng) used by the
    /// validator's coordinate-range warnings
    #[arg(long, env = "TRRCMS_REGION_BBOX")]
    pub region_bbox: Option<String>,

    /// Log format (json or pretty)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a full import synchronously and print the ImportResult as JSON
    /// (spec.md §6.4). Exit 0 on success, 1 on validation errors, 2 on
    /// fatal failure.
    Ingest {
        /// Path to the .uhc package file
        #[arg(long)]
        file: PathBuf,

        /// Actor recorded in the audit log
        #[arg(long = "as", default_value = "cli")]
        actor: String,

        /// Commit the package immediately after staging if it has zero
        /// validation errors (supplementary convenience; spec.md's
        /// `ingest` command only stages by default)
        #[arg(long)]
        commit: bool,
    },

    /// Start the local-network sync boundary (supplementary: spec.md §6.4
    /// names only `ingest`, but the daemon needs a CLI entry point to boot
    /// C6 for manual/local testing)
    Serve {
        /// Port for the sync HTTP server
        #[arg(long, env = "TRRCMS_SYNC_PORT", default_value_t = trr_sync::config::DEFAULT_PORT)]
        port: u16,

        /// HMAC secret for device bearer tokens. A random secret is
        /// generated if unset (spec.md §4.6)
        #[arg(long, env = "TRRCMS_AUTH_SECRET")]
        auth_secret: Option<String>,
    },
}
