//! Balance sources: exchanges, blockchain networks and the manual CSV file.
//!
//! Every source reports its balances as [`RawBalanceRecord`]s. Failures never
//! escape a source: a failing wallet is logged and contributes nothing, so one
//! broken API key does not block the rest of the report.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use crate::config::{Config, ExchangeCredentials};
use crate::models::RawBalanceRecord;

mod binance;
mod bingx;
mod bybit;
mod coinbase;
mod ethereum;
mod gate;
mod manual;
mod signing;
mod solana;

pub use binance::BinanceSource;
pub use bingx::BingXSource;
pub use bybit::ByBitSource;
pub use coinbase::CoinbaseSource;
pub use ethereum::EthereumSource;
pub use gate::GateSource;
pub use manual::ManualSource;
pub use solana::SolanaSource;

/// Anything that can report balances.
#[async_trait::async_trait]
pub trait BalanceSource: Send + Sync {
    /// Source code, e.g. `binance`. Used for logging and ignore lists.
    fn name(&self) -> &str;

    /// All positive balances. Errors are logged, never returned.
    async fn get_balances(&self) -> Vec<RawBalanceRecord>;
}

/// Unwrap one wallet's result, logging failures as an empty wallet.
pub(crate) fn collect_wallet(
    source: &str,
    wallet: &str,
    result: Result<Vec<RawBalanceRecord>>,
) -> Vec<RawBalanceRecord> {
    match result {
        Ok(records) => {
            debug!(source, wallet, count = records.len(), "wallet balances extracted");
            records
        }
        Err(e) => {
            error!(source, wallet, error = %format!("{e:#}"), "failed to retrieve balances");
            Vec::new()
        }
    }
}

/// Read a JSON body, failing on non-success statuses.
pub(crate) async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response
        .text()
        .await
        .context("Failed to read response body")?;

    if !status.is_success() {
        anyhow::bail!("API request failed ({status}): {body}");
    }
    debug!(status = %status, body = %body, "source response");

    serde_json::from_str(&body).context("Failed to parse JSON response")
}

/// Known source kinds and the codes accepted for them on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceKind {
    Binance,
    BingX,
    ByBit,
    Coinbase,
    Gate,
    Ethereum,
    Solana,
}

impl SourceKind {
    pub const EXCHANGES: [SourceKind; 5] = [
        SourceKind::Binance,
        SourceKind::BingX,
        SourceKind::ByBit,
        SourceKind::Coinbase,
        SourceKind::Gate,
    ];

    pub const NETWORKS: [SourceKind; 2] = [SourceKind::Ethereum, SourceKind::Solana];

    /// Canonical code, also the key for ignore lists.
    pub fn code(self) -> &'static str {
        match self {
            SourceKind::Binance => "binance",
            SourceKind::BingX => "bingx",
            SourceKind::ByBit => "bybit",
            SourceKind::Coinbase => "coinbase",
            SourceKind::Gate => "gate",
            SourceKind::Ethereum => "ethereum",
            SourceKind::Solana => "solana",
        }
    }

    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            SourceKind::Binance => &["binance"],
            SourceKind::BingX => &["bingx", "bing-x", "bing_x"],
            SourceKind::ByBit => &["bybit", "by-bit"],
            SourceKind::Coinbase => &["coinbase", "coin_base"],
            SourceKind::Gate => &["gate", "gate-io", "gate_io"],
            SourceKind::Ethereum => &["ethereum", "eth"],
            SourceKind::Solana => &["solana", "sol"],
        }
    }

    pub fn is_network(self) -> bool {
        Self::NETWORKS.contains(&self)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for SourceKind {
    type Err = SelectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_lowercase();
        Self::EXCHANGES
            .iter()
            .chain(Self::NETWORKS.iter())
            .copied()
            .find(|kind| kind.aliases().contains(&code.as_str()))
            .ok_or_else(|| SelectionError::Unknown {
                group: "source",
                code: s.trim().to_string(),
                supported: supported_codes(Self::EXCHANGES.iter().chain(Self::NETWORKS.iter())),
            })
    }
}

fn supported_codes<'a>(kinds: impl Iterator<Item = &'a SourceKind>) -> String {
    let mut codes: Vec<&str> = kinds.flat_map(|k| k.aliases().iter().copied()).collect();
    codes.push("all");
    codes.join(", ")
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("unknown {group} code '{code}' (supported: {supported})")]
    Unknown {
        group: &'static str,
        code: String,
        supported: String,
    },
}

/// Which sources of one group (exchanges or networks) were requested.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    /// Every configured source of the group.
    All,
    /// Exactly these; missing configuration is reported.
    Only(Vec<SourceKind>),
    #[default]
    Empty,
}

impl Selection {
    /// Parse a comma-separated code list restricted to `allowed` kinds.
    pub fn parse(
        input: &str,
        group: &'static str,
        allowed: &[SourceKind],
    ) -> Result<Self, SelectionError> {
        let codes: Vec<&str> = input
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .collect();

        if codes.iter().any(|c| c.eq_ignore_ascii_case("all")) {
            return Ok(Selection::All);
        }

        let mut kinds = Vec::new();
        for code in codes {
            let kind = SourceKind::from_str(code)
                .ok()
                .filter(|kind| allowed.contains(kind))
                .ok_or_else(|| SelectionError::Unknown {
                    group,
                    code: code.to_string(),
                    supported: supported_codes(allowed.iter()),
                })?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }

        Ok(if kinds.is_empty() {
            Selection::Empty
        } else {
            Selection::Only(kinds)
        })
    }

    fn resolve(&self, group: &[SourceKind]) -> Vec<(SourceKind, bool)> {
        match self {
            Selection::All => group.iter().map(|k| (*k, false)).collect(),
            Selection::Only(kinds) => kinds.iter().map(|k| (*k, true)).collect(),
            Selection::Empty => Vec::new(),
        }
    }
}

/// Requested sources for one report run.
#[derive(Debug, Clone, Default)]
pub struct SourceSelection {
    pub exchanges: Selection,
    pub networks: Selection,
    pub include_manual: bool,
}

impl SourceSelection {
    pub fn parse(
        exchanges: Option<&str>,
        networks: Option<&str>,
        include_manual: bool,
    ) -> Result<Self, SelectionError> {
        Ok(Self {
            exchanges: exchanges
                .map(|s| Selection::parse(s, "exchange", &SourceKind::EXCHANGES))
                .transpose()?
                .unwrap_or_default(),
            networks: networks
                .map(|s| Selection::parse(s, "network", &SourceKind::NETWORKS))
                .transpose()?
                .unwrap_or_default(),
            include_manual,
        })
    }
}

/// Construct every requested source that has configuration.
///
/// Explicitly requested sources without configuration are skipped with a
/// warning.
pub fn build_sources(config: &Config, selection: &SourceSelection) -> Vec<Arc<dyn BalanceSource>> {
    let mut sources: Vec<Arc<dyn BalanceSource>> = Vec::new();

    let requested = selection
        .exchanges
        .resolve(&SourceKind::EXCHANGES)
        .into_iter()
        .chain(selection.networks.resolve(&SourceKind::NETWORKS));

    for (kind, explicit) in requested {
        match build_source(config, kind) {
            Some(source) => {
                info!(source = %kind, "source configured");
                sources.push(source);
            }
            None if explicit => {
                warn!(
                    source = %kind,
                    "no configuration found, skipping. Add {} to the config file",
                    config_hint(kind)
                );
            }
            None => debug!(source = %kind, "not configured"),
        }
    }

    if selection.include_manual {
        match config
            .manual_balances
            .as_ref()
            .and_then(|m| m.csv_file.clone())
        {
            Some(path) => {
                info!(source = "manual", path = %path.display(), "source configured");
                sources.push(Arc::new(ManualSource::new(path)));
            }
            None => warn!(
                source = "manual",
                "manual balances requested but [manual_balances] csv_file is not set"
            ),
        }
    }

    sources
}

fn config_hint(kind: SourceKind) -> String {
    if kind.is_network() {
        format!("`{} = [<addresses>]` under [networks]", kind.code())
    } else {
        format!("an [exchanges.{}] section with api_key and secret_key", kind.code())
    }
}

fn credentials(creds: &ExchangeCredentials) -> (String, secrecy::SecretString) {
    (
        creds.api_key.expose_secret().to_string(),
        creds.secret_key.clone(),
    )
}

fn build_source(config: &Config, kind: SourceKind) -> Option<Arc<dyn BalanceSource>> {
    let exchanges = &config.exchanges;
    let networks = &config.networks;

    let source: Arc<dyn BalanceSource> = match kind {
        SourceKind::Binance => {
            let (key, secret) = credentials(exchanges.binance.as_ref()?);
            Arc::new(BinanceSource::new(key, secret))
        }
        SourceKind::BingX => {
            let (key, secret) = credentials(exchanges.bingx.as_ref()?);
            Arc::new(BingXSource::new(key, secret))
        }
        SourceKind::ByBit => {
            let (key, secret) = credentials(exchanges.bybit.as_ref()?);
            Arc::new(ByBitSource::new(key, secret))
        }
        SourceKind::Coinbase => {
            let (key, secret) = credentials(exchanges.coinbase.as_ref()?);
            Arc::new(CoinbaseSource::new(key, secret))
        }
        SourceKind::Gate => {
            let (key, secret) = credentials(exchanges.gate.as_ref()?);
            Arc::new(GateSource::new(key, secret))
        }
        SourceKind::Ethereum if !networks.ethereum.is_empty() => {
            Arc::new(EthereumSource::new(networks.ethereum.clone()))
        }
        SourceKind::Solana if !networks.solana.is_empty() => {
            Arc::new(SolanaSource::new(networks.solana.clone()))
        }
        SourceKind::Ethereum | SourceKind::Solana => return None,
    };

    Some(source)
}
