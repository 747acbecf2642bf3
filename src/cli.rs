//! CLI command definitions using clap.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// dbclaim - database claim reconciler
#[derive(Parser, Debug)]
#[command(name = "dbclaim")]
#[command(version)]
#[command(about = "Reconcile database claims against clustered and standalone backing stores")]
#[command(
    long_about = "dbclaim drives database claims through dependency resolution, finalizer bookkeeping and hash-gated provisioning jobs, using in-memory collaborators loaded from YAML manifests."
)]
pub struct Cli {
    /// Configuration file (TOML). Missing files fall back to defaults.
    #[arg(short, long, global = true, default_value = "dbclaim.toml")]
    pub config: PathBuf,

    /// Log filter, overridden by RUST_LOG
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Format of the printed resources
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Yaml)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Multi-document YAML, loadable as manifests
    Yaml,
    /// A single JSON array
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Reconcile every claim in a manifest file and print the final resources
    Simulate {
        /// Multi-document YAML with claims and backing stores
        #[arg(short, long)]
        manifests: PathBuf,

        /// Stop after this many rounds (defaults to the configured limit)
        #[arg(long)]
        max_rounds: Option<usize>,

        /// Do not sleep for requested requeue delays
        #[arg(long, default_value_t = false)]
        no_wait: bool,

        /// Make every provisioning job fail
        #[arg(long, default_value_t = false)]
        fail_jobs: bool,
    },

    /// Provision, then delete one claim and print the final resources
    Delete {
        /// Multi-document YAML with claims and backing stores
        #[arg(short, long)]
        manifests: PathBuf,

        /// Claim to delete, as namespace/name
        #[arg(long)]
        claim: String,

        /// Stop after this many rounds per phase
        #[arg(long)]
        max_rounds: Option<usize>,
    },

    /// Validate the configuration file and print the effective settings
    CheckConfig,
}
