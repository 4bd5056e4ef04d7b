//! Configuration handling for the recplot CLI
//!
//! Supports loading configuration from recplot.toml files with CLI argument overrides.

use anyhow::{Context, Result};
use recplot_core::{BinParams, StoreConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "recplot.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub matrix: MatrixConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Worker threads used when filling several samples
    #[serde(default = "default_threads")]
    pub threads: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Hits written per batch transaction
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixConfig {
    /// Approximate position bin width in bases
    #[serde(default = "default_bin_width")]
    pub bin_width: u64,

    /// Identity bin height in percent
    #[serde(default = "default_id_step")]
    pub id_step: f64,

    /// Hits at or below this identity are left out
    #[serde(default = "default_id_lower")]
    pub id_lower: f64,
}

// Default value functions
fn default_threads() -> usize { num_cpus::get() }
fn default_batch_size() -> usize { StoreConfig::default().batch_size }
fn default_bin_width() -> u64 { BinParams::default().bin_width }
fn default_id_step() -> f64 { BinParams::default().id_step }
fn default_id_lower() -> f64 { BinParams::default().id_lower }

impl Default for GeneralConfig {
    fn default() -> Self {
        Self { threads: default_threads() }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self { batch_size: default_batch_size() }
    }
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            bin_width: default_bin_width(),
            id_step: default_id_step(),
            id_lower: default_id_lower(),
        }
    }
}

impl Config {
    /// Load configuration from file or use defaults
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                Self::load_from_file(path)?
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    log::info!("Loading configuration from: {}", DEFAULT_CONFIG_FILE);
                    Self::load_from_file(&default_path)?
                } else {
                    log::debug!("Using default configuration");
                    Self::default()
                }
            }
        };

        Ok(config)
    }

    /// Load configuration from a specific TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse configuration file: {}", path.display()))?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = Self::to_toml(self)?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write configuration file: {}", path.display()))?;

        Ok(())
    }

    /// Generate example configuration file content
    pub fn example_toml() -> Result<String> {
        Self::to_toml(&Self::default())
    }

    fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    pub fn store_config(&self, batch_size: Option<usize>) -> StoreConfig {
        StoreConfig {
            batch_size: batch_size.unwrap_or(self.ingest.batch_size),
        }
    }

    pub fn bin_params(&self, bin_width: Option<u64>, id_step: Option<f64>, id_lower: Option<f64>) -> BinParams {
        BinParams {
            bin_width: bin_width.unwrap_or(self.matrix.bin_width),
            id_step: id_step.unwrap_or(self.matrix.id_step),
            id_lower: id_lower.unwrap_or(self.matrix.id_lower),
        }
    }
}
