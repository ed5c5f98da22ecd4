// Runtime configuration for the dex tool
// Priority: CLI args > Environment variables > Config file > Defaults

use crate::api::DEFAULT_API_BASE;
use crate::sync::SyncOptions;
use crate::types::DEFAULT_CEILING;
use anyhow::{anyhow, Context, Result};
use clap::Args;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_DB_PATH: &str = "./dex.db";
pub const DEFAULT_CONFIG_FILE: &str = "dex.toml";

/// Settings shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct SettingsArgs {
    /// Base URL of the PokeAPI-compatible endpoint
    #[arg(long, global = true, env = "DEX_API_URL")]
    pub api_url: Option<String>,

    /// Path to the SQLite store
    #[arg(long, global = true, env = "DEX_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Per-request timeout in milliseconds (1000-120000)
    #[arg(long, global = true, env = "DEX_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// Exclusive upper id bound of a sync run (2-1026)
    #[arg(long, global = true, env = "DEX_CEILING")]
    pub ceiling: Option<u32>,

    /// Download sprite and shiny artwork after the records
    #[arg(long, global = true, env = "DEX_FETCH_IMAGES")]
    pub fetch_images: Option<bool>,

    /// Optional config file (TOML); defaults to ./dex.toml when present
    #[arg(long, global = true, env = "DEX_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Values accepted from the TOML config file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub api_url: Option<String>,
    pub db_path: Option<PathBuf>,
    pub timeout_ms: Option<u64>,
    pub ceiling: Option<u32>,
    pub fetch_images: Option<bool>,
}

impl ConfigFile {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid config file")
    }

    fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        Self::parse(&text)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub api_url: String,
    pub db_path: PathBuf,
    pub timeout_ms: u64,
    pub ceiling: u32,
    pub fetch_images: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_BASE.to_string(),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            timeout_ms: 10_000,
            ceiling: DEFAULT_CEILING,
            fetch_images: true,
        }
    }
}

/// Validate that a value is within a given range (inclusive)
fn validate_in_range<T>(val: T, min: T, max: T, name: &str) -> Result<T>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    if val < min || val > max {
        Err(anyhow!("{name} must be in range [{min}, {max}], got {val}"))
    } else {
        Ok(val)
    }
}

/// Validate URL format (basic check)
fn validate_url(url: &str, name: &str) -> Result<()> {
    if url.is_empty() {
        return Err(anyhow!("{name} cannot be empty"));
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(anyhow!("{name} must start with http:// or https://"))
    }
}

impl Config {
    /// Resolve settings, reading the config file named in `args` (or
    /// `./dex.toml` if it exists).
    pub fn load(args: &SettingsArgs) -> Result<Self> {
        let file = match &args.config {
            Some(path) => ConfigFile::read(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    ConfigFile::read(default)?
                } else {
                    ConfigFile::default()
                }
            }
        };
        Self::resolve(args, &file)
    }

    /// Merge CLI/env values over file values over defaults, then validate.
    pub fn resolve(args: &SettingsArgs, file: &ConfigFile) -> Result<Self> {
        let defaults = Config::default();

        let api_url = args
            .api_url
            .clone()
            .or_else(|| file.api_url.clone())
            .unwrap_or(defaults.api_url);
        validate_url(&api_url, "DEX_API_URL")?;

        let db_path = args
            .db_path
            .clone()
            .or_else(|| file.db_path.clone())
            .unwrap_or(defaults.db_path);

        let timeout_ms = args
            .timeout_ms
            .or(file.timeout_ms)
            .unwrap_or(defaults.timeout_ms);
        let timeout_ms = validate_in_range(timeout_ms, 1000, 120_000, "DEX_TIMEOUT_MS")?;

        let ceiling = args.ceiling.or(file.ceiling).unwrap_or(defaults.ceiling);
        let ceiling = validate_in_range(ceiling, 2, 1026, "DEX_CEILING")?;

        let fetch_images = args
            .fetch_images
            .or(file.fetch_images)
            .unwrap_or(defaults.fetch_images);

        Ok(Config {
            api_url,
            db_path,
            timeout_ms,
            ceiling,
            fetch_images,
        })
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            ceiling: self.ceiling,
            fetch_images: self.fetch_images,
        }
    }

    /// Size of a complete Pokédex under this configuration.
    pub fn target_count(&self) -> u32 {
        self.ceiling - 1
    }

    pub fn print_summary(&self) {
        log::info!("Dex configuration:");
        log::info!("  API: {}", self.api_url);
        log::info!("  Store: {}", self.db_path.display());
        log::info!("  Timeout: {}ms", self.timeout_ms);
        log::info!("  Ids: 1..{}", self.ceiling);
        log::info!("  Images: {}", self.fetch_images);
    }
}
