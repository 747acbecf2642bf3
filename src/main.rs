//! # dbclaim
//!
//! Entry point for the database claim reconciler.
//!
//! ## Commands
//!
//! 1. **simulate** - Load manifests, reconcile every claim until it settles
//!    and print the resulting resources
//! 2. **delete** - Same, then run the deletion protocol for one claim
//! 3. **check-config** - Validate the configuration file
//!
//! ## Error Handling
//!
//! Every step returns `anyhow::Result` with context attached at the point of
//! failure. A claim that does not settle makes the process exit non-zero.

#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use dbclaim::cli::{Cli, Commands, OutputFormat};
use dbclaim::config::{ConfigSource, OperatorConfig};
use dbclaim::manifest;
use dbclaim::simulate::{SimulateOptions, Simulation, SimulationReport};
use dbclaim_core::ObjectKey;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, source) = OperatorConfig::load(&cli.config)?;

    init_tracing(cli.log_level.as_deref().or(config.log_level.as_deref()));
    match source {
        ConfigSource::File(path) => info!(path = %path.display(), "Configuration loaded"),
        ConfigSource::Defaults => info!(
            path = %cli.config.display(),
            "No configuration file, using defaults"
        ),
    }

    let start_time = Instant::now();
    let report = match cli.command {
        Commands::Simulate {
            manifests,
            max_rounds,
            no_wait,
            fail_jobs,
        } => {
            let options = SimulateOptions {
                max_rounds: max_rounds.unwrap_or(config.simulation.max_rounds),
                wait: !no_wait,
                jobs_succeed: !fail_jobs,
            };
            Some(simulate(&config, options, &manifests, cli.output).await?)
        }
        Commands::Delete {
            manifests,
            claim,
            max_rounds,
        } => {
            let key: ObjectKey = claim
                .parse()
                .with_context(|| format!("Invalid claim reference '{claim}'"))?;
            let options = SimulateOptions {
                max_rounds: max_rounds.unwrap_or(config.simulation.max_rounds),
                wait: false,
                jobs_succeed: true,
            };
            Some(delete(&config, options, &manifests, &key, cli.output).await?)
        }
        Commands::CheckConfig => {
            let rendered =
                toml::to_string_pretty(&config).context("Failed to render configuration")?;
            println!("{rendered}");
            None
        }
    };

    info!(elapsed = ?start_time.elapsed(), "dbclaim finished");

    match report {
        Some(report) if !report.all_settled() => {
            for (key, outcome) in report.outcomes.iter().filter(|(_, o)| !o.is_settled()) {
                warn!(claim = %key, ?outcome, "Claim did not settle");
            }
            anyhow::bail!("{} claim(s) did not settle", unsettled(&report))
        }
        _ => Ok(()),
    }
}

/// Initialize tracing subscriber with environment filter.
fn init_tracing(default_filter: Option<&str>) {
    let default_filter = default_filter.unwrap_or("info");
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn simulate(
    config: &OperatorConfig,
    options: SimulateOptions,
    manifests: &Path,
    output: OutputFormat,
) -> Result<SimulationReport> {
    let sim = Simulation::new(config.reconciler.clone(), options)
        .context("Failed to build reconciler")?;
    let claims = manifest::seed(&sim.store, manifest::load(manifests)?).await;
    info!(claims = claims.len(), "Manifests loaded");

    let report = sim.run(&claims).await;
    print_resources(&sim, output).await?;
    Ok(report)
}

async fn delete(
    config: &OperatorConfig,
    options: SimulateOptions,
    manifests: &Path,
    key: &ObjectKey,
    output: OutputFormat,
) -> Result<SimulationReport> {
    let sim = Simulation::new(config.reconciler.clone(), options)
        .context("Failed to build reconciler")?;
    let claims = manifest::seed(&sim.store, manifest::load(manifests)?).await;
    if !claims.contains(key) {
        anyhow::bail!("Claim {key} is not in the manifests");
    }

    let provisioned = sim.run(&claims).await;
    if !provisioned.all_settled() {
        warn!(
            unsettled = unsettled(&provisioned),
            "Deleting before every claim settled"
        );
    }

    let report = sim
        .delete(key)
        .await
        .with_context(|| format!("Failed to delete claim {key}"))?;
    print_resources(&sim, output).await?;
    Ok(report)
}

async fn print_resources(sim: &Simulation, output: OutputFormat) -> Result<()> {
    let resources = manifest::snapshot(&sim.store).await;
    match output {
        OutputFormat::Yaml => print!("{}", manifest::render(&resources)?),
        OutputFormat::Json => println!("{}", manifest::render_json(&resources)?),
    }
    Ok(())
}

fn unsettled(report: &SimulationReport) -> usize {
    report.outcomes.values().filter(|o| !o.is_settled()).count()
}
