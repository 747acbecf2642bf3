//! Operator configuration loaded from TOML.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dbclaim_reconciler::ReconcilerConfig;
use serde::{Deserialize, Serialize};

/// Top-level configuration for the `dbclaim` binary.
///
/// ```toml
/// log_level = "debug"
///
/// [reconciler]
/// finalizer = "dbclaim.io/databaseclaim"
/// dependency_requeue_secs = 10
/// job_poll_secs = 5
/// preserve_jobs = false
///
/// [simulation]
/// max_rounds = 50
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OperatorConfig {
    /// Default filter when neither `RUST_LOG` nor `--log-level` is set.
    #[serde(default)]
    pub log_level: Option<String>,

    #[serde(default)]
    pub reconciler: ReconcilerConfig,

    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Limits for the local requeue-aware driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
        }
    }
}

const fn default_max_rounds() -> usize {
    20
}

/// Where the loaded configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// The file did not exist.
    Defaults,
}

impl OperatorConfig {
    /// Parse configuration from a TOML document and validate it.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid TOML or fails validation.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `path`.
    ///
    /// A missing file yields the defaults; an unreadable or invalid one is an
    /// error. Runs before logging is set up, so the source is returned for
    /// the caller to report.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<(Self, ConfigSource)> {
        if !path.exists() {
            return Ok((Self::default(), ConfigSource::Defaults));
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;
        let config = Self::from_toml(&raw)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        Ok((config, ConfigSource::File(path.to_path_buf())))
    }

    /// # Errors
    ///
    /// Returns an error if the reconciler section is invalid or the
    /// simulation round limit is zero.
    pub fn validate(&self) -> Result<()> {
        self.reconciler
            .validate()
            .context("Invalid [reconciler] section")?;

        if self.simulation.max_rounds == 0 {
            anyhow::bail!("simulation.max_rounds must be greater than 0");
        }

        Ok(())
    }
}
