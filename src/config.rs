//! TOML configuration.
//!
//! ```toml
//! [db]
//! path = "./data/logsift.sqlite"
//!
//! [ingest]
//! host_name = "web-1"
//! time_layout = "%Y/%m/%d %H:%M:%S"
//! field_extractors = ['(\w+)=(\w+)', '^(?P<_time>\d{4}/\d{2}/\d{2} \d{2}:\d{2}:\d{2})']
//!
//! [publisher]
//! batch_size = 1000
//! flush_interval_ms = 1000
//! ```
//!
//! Only `[db]` is required. See [`load_config`] for validation rules.

use anyhow::{Context, Result};
use logsift_core::extract::FieldExtractor;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub publisher: PublisherConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_host_name")]
    pub host_name: String,
    /// chrono `strftime` layout used to parse the `_time` field.
    #[serde(default = "default_time_layout")]
    pub time_layout: String,
    #[serde(default = "default_field_extractors")]
    pub field_extractors: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            host_name: default_host_name(),
            time_layout: default_time_layout(),
            field_extractors: default_field_extractors(),
        }
    }
}

fn default_host_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}
fn default_time_layout() -> String {
    "%Y/%m/%d %H:%M:%S".to_string()
}
fn default_field_extractors() -> Vec<String> {
    vec![
        r"(\w+)=(\w+)".to_string(),
        r"^(?P<_time>\d{4}/\d{2}/\d{2} \d{2}:\d{2}:\d{2})".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct PublisherConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

fn default_batch_size() -> usize {
    1000
}
fn default_flush_interval_ms() -> u64 {
    1000
}

impl PublisherConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

impl IngestConfig {
    /// Compile the configured extraction rules.
    pub fn extractor(&self) -> Result<FieldExtractor> {
        FieldExtractor::from_patterns(&self.field_extractors)
            .context("ingest.field_extractors contains an invalid regex")
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.publisher.batch_size == 0 {
        anyhow::bail!("publisher.batch_size must be > 0");
    }
    if config.publisher.flush_interval_ms == 0 {
        anyhow::bail!("publisher.flush_interval_ms must be > 0");
    }
    if config.ingest.time_layout.trim().is_empty() {
        anyhow::bail!("ingest.time_layout must not be empty");
    }
    config.ingest.extractor()?;

    Ok(config)
}
