use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::Deserialize;

use crate::duration::deserialize_duration;

/// Default cooldown after the market-data API reports a rate limit.
fn default_rate_limit_cooldown() -> Duration {
    Duration::from_secs(61)
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("reports/portfolio")
}

/// Rows below this USD value are left out of the styled spreadsheet.
fn default_min_styled_value_usd() -> Decimal {
    Decimal::ONE
}

/// CoinMarketCap API settings.
#[derive(Debug, Deserialize)]
pub struct CoinMarketCapConfig {
    pub api_key: SecretString,

    /// Override for the API host (tests, sandbox).
    #[serde(default)]
    pub base_url: Option<String>,

    /// How long to wait before retrying a rate-limited request.
    #[serde(
        default = "default_rate_limit_cooldown",
        deserialize_with = "deserialize_duration"
    )]
    pub rate_limit_cooldown: Duration,

    /// Give up after this many consecutive rate-limit responses for one
    /// request. Unset means retry until the API answers.
    #[serde(default)]
    pub max_rate_limit_retries: Option<u32>,
}

/// API credentials for one exchange.
///
/// For Coinbase, `api_key` is the CDP key name and `secret_key` the EC
/// private key in PEM form.
#[derive(Debug, Deserialize)]
pub struct ExchangeCredentials {
    pub api_key: SecretString,
    pub secret_key: SecretString,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ExchangesConfig {
    pub binance: Option<ExchangeCredentials>,
    pub bingx: Option<ExchangeCredentials>,
    pub bybit: Option<ExchangeCredentials>,
    pub coinbase: Option<ExchangeCredentials>,
    pub gate: Option<ExchangeCredentials>,
}

/// Wallet addresses per network.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NetworksConfig {
    pub ethereum: Vec<String>,
    pub solana: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ManualBalancesConfig {
    /// CSV with `source,symbol,balance` columns. Relative paths are resolved
    /// from the config file's directory.
    pub csv_file: Option<PathBuf>,
}

/// Report output settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Directory for generated reports. Relative paths are resolved from the
    /// config file's directory.
    pub output_dir: PathBuf,

    /// Abort instead of writing an empty report when no source is active.
    pub require_sources: bool,

    pub min_styled_value_usd: Decimal,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            require_sources: false,
            min_styled_value_usd: default_min_styled_value_usd(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub coinmarketcap: Option<CoinMarketCapConfig>,

    pub exchanges: ExchangesConfig,

    pub networks: NetworksConfig,

    /// Symbols to drop per source, keyed by source code (e.g. `binance`).
    pub ignore_tokens: HashMap<String, Vec<String>>,

    pub manual_balances: Option<ManualBalancesConfig>,

    pub report: ReportConfig,
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load config and resolve relative paths against the file's directory.
    pub fn load_resolved(path: &Path) -> Result<Self> {
        let path = path
            .canonicalize()
            .with_context(|| format!("Config file not found: {}", path.display()))?;
        let config_dir = path
            .parent()
            .context("Config file has no parent directory")?;

        let mut config = Self::load(&path)?;
        config.resolve_paths(config_dir);
        Ok(config)
    }

    /// Make every relative path in the config absolute, relative to `config_dir`.
    pub fn resolve_paths(&mut self, config_dir: &Path) {
        self.report.output_dir = resolve_path(config_dir, &self.report.output_dir);
        if let Some(manual) = self.manual_balances.as_mut() {
            if let Some(csv_file) = manual.csv_file.as_mut() {
                *csv_file = resolve_path(config_dir, csv_file);
            }
        }
    }
}

fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `./cryptonaire.toml` if it exists in current directory
/// 2. `~/.config/cryptonaire/cryptonaire.toml` (XDG config directory)
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from("cryptonaire.toml");
    if local_config.exists() {
        return local_config;
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("cryptonaire").join("cryptonaire.toml");
    }

    local_config
}
