// src/portfolio/service.rs
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::market_data::MarketDataEnricher;
use crate::models::RawBalanceRecord;
use crate::sources::BalanceSource;
use crate::symbols::normalize;

use super::{aggregate, compute, PortfolioRow};

/// Raised when no source is active and the run requires one.
#[derive(Debug, thiserror::Error)]
#[error("no balance source is active; configure at least one exchange, network or manual file")]
pub struct NoActiveSources;

/// Runs the report pipeline: collect, group, enrich and compute.
pub struct PortfolioService {
    sources: Vec<Arc<dyn BalanceSource>>,
    enricher: MarketDataEnricher,
    ignore_tokens: HashMap<String, HashSet<String>>,
    require_sources: bool,
}

impl PortfolioService {
    pub fn new(sources: Vec<Arc<dyn BalanceSource>>, enricher: MarketDataEnricher) -> Self {
        Self {
            sources,
            enricher,
            ignore_tokens: HashMap::new(),
            require_sources: false,
        }
    }

    /// Symbols to drop, keyed by source name. Matching uses canonical symbols.
    pub fn with_ignore_tokens(mut self, ignore: HashMap<String, Vec<String>>) -> Self {
        self.ignore_tokens = ignore
            .into_iter()
            .map(|(source, tokens)| {
                let tokens = tokens.iter().map(|t| normalize(t)).collect();
                (source.to_lowercase(), tokens)
            })
            .collect();
        self
    }

    pub fn with_require_sources(mut self, require: bool) -> Self {
        self.require_sources = require;
        self
    }

    /// Query every source in turn and drop ignored symbols.
    pub async fn collect(&self) -> Vec<RawBalanceRecord> {
        let mut records = Vec::new();

        for source in &self.sources {
            let name = source.name();
            let balances = source.get_balances().await;
            if balances.is_empty() {
                debug!(source = %name, "no balances found, skipping");
                continue;
            }

            let ignored = self.ignore_tokens.get(&name.to_lowercase());
            let before = balances.len();
            let kept: Vec<RawBalanceRecord> = balances
                .into_iter()
                .filter(|record| ignored.map_or(true, |set| !set.contains(&normalize(&record.symbol))))
                .collect();
            if kept.len() < before {
                info!(source = %name, dropped = before - kept.len(), "ignored tokens dropped");
            }
            records.extend(kept);
            info!(source = %name, "data collection completed");
        }

        records
    }

    /// Build the report rows.
    ///
    /// Fails when no source is active and sources are required, or when
    /// market data enrichment hits a fatal error.
    pub async fn build(&self) -> Result<Vec<PortfolioRow>> {
        if self.sources.is_empty() {
            if self.require_sources {
                return Err(NoActiveSources.into());
            }
            warn!("unable to retrieve data from any source, the report will be empty");
        }

        let records = self.collect().await;
        let grouped = aggregate(&records);
        info!(records = records.len(), symbols = grouped.len(), "balances grouped");

        let symbols: BTreeSet<String> = grouped.iter().map(|g| g.symbol.clone()).collect();
        let coins = self.enricher.enrich(&symbols).await?;

        Ok(compute(grouped, &coins))
    }
}
