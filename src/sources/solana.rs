//! Solana wallets: native SOL and SPL tokens.
//!
//! Balances come from the public JSON-RPC endpoint. Token accounts only carry
//! mint addresses, so symbols are resolved through DexScreener, which also
//! supplies a backup price and market cap for tokens CoinMarketCap may not
//! list.

use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{collect_wallet, read_json, BalanceSource};
use crate::decimal::{decimal_from_json, from_base_units};
use crate::models::RawBalanceRecord;

const SOLANA_RPC_URL: &str = "https://api.mainnet-beta.solana.com";
const DEXSCREENER_API_BASE: &str = "https://api.dexscreener.com";
const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
const LAMPORTS_DECIMALS: u32 = 9;
/// DexScreener accepts at most this many token addresses per call.
const DEXSCREENER_BATCH: usize = 30;
const SOURCE_LABEL: &str = "Solana";

pub struct SolanaSource {
    addresses: Vec<String>,
    client: Client,
    rpc_url: String,
    dexscreener_url: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RpcValue<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct TokenAccount {
    account: TokenAccountData,
}

#[derive(Debug, Deserialize)]
struct TokenAccountData {
    data: ParsedData,
}

#[derive(Debug, Deserialize)]
struct ParsedData {
    parsed: ParsedAccount,
}

#[derive(Debug, Deserialize)]
struct ParsedAccount {
    info: ParsedTokenInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParsedTokenInfo {
    mint: String,
    token_amount: TokenAmount,
}

#[derive(Debug, Deserialize)]
struct TokenAmount {
    amount: String,
    decimals: u32,
}

#[derive(Debug, Deserialize)]
struct DexTokensResponse {
    #[serde(default)]
    pairs: Option<Vec<DexPair>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DexPair {
    base_token: DexToken,
    #[serde(default)]
    price_usd: Value,
    #[serde(default)]
    fdv: Value,
}

#[derive(Debug, Deserialize)]
struct DexToken {
    address: String,
    symbol: String,
}

/// Symbol and market data for one mint.
#[derive(Debug, Clone, PartialEq)]
struct MintMarket {
    symbol: String,
    price_usd: Option<Decimal>,
    market_cap: Option<Decimal>,
}

impl SolanaSource {
    pub fn new(addresses: Vec<String>) -> Self {
        Self {
            addresses,
            client: Client::new(),
            rpc_url: SOLANA_RPC_URL.to_string(),
            dexscreener_url: DEXSCREENER_API_BASE.to_string(),
        }
    }

    pub fn with_rpc_url(mut self, rpc_url: impl Into<String>) -> Self {
        self.rpc_url = rpc_url.into();
        self
    }

    pub fn with_dexscreener_url(mut self, base_url: impl Into<String>) -> Self {
        self.dexscreener_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn rpc<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = self
            .client
            .post(&self.rpc_url)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("Solana RPC {method} failed"))?;

        let body: RpcResponse<T> = read_json(response).await?;
        if let Some(error) = body.error {
            anyhow::bail!("Solana RPC {method} error: {error}");
        }
        body.result
            .with_context(|| format!("Solana RPC {method} returned no result"))
    }

    async fn sol_balance(&self, address: &str) -> Result<Decimal> {
        let balance: RpcValue<u64> = self.rpc("getBalance", json!([address])).await?;
        Decimal::try_from_i128_with_scale(i128::from(balance.value), LAMPORTS_DECIMALS)
            .context("SOL balance out of range")
    }

    /// Positive token balances per mint, summed across token accounts.
    async fn token_balances(&self, address: &str) -> Result<BTreeMap<String, Decimal>> {
        let accounts: RpcValue<Vec<TokenAccount>> = self
            .rpc(
                "getTokenAccountsByOwner",
                json!([
                    address,
                    { "programId": TOKEN_PROGRAM_ID },
                    { "encoding": "jsonParsed" }
                ]),
            )
            .await?;

        let mut balances = BTreeMap::new();
        for account in accounts.value {
            let info = account.account.data.parsed.info;
            let amount = from_base_units(&info.token_amount.amount, info.token_amount.decimals)?;
            if amount <= Decimal::ZERO {
                continue;
            }
            let total: &mut Decimal = balances.entry(info.mint.clone()).or_insert(Decimal::ZERO);
            match total.checked_add(amount) {
                Some(sum) => *total = sum,
                None => warn!(source = "solana", mint = %info.mint, "token balance out of range, account left out"),
            }
        }
        Ok(balances)
    }

    /// Resolve mints through DexScreener in batches. The first pair listed for
    /// a mint wins.
    async fn mint_markets(&self, mints: &[String]) -> Result<HashMap<String, MintMarket>> {
        let mut markets = HashMap::new();

        for batch in mints.chunks(DEXSCREENER_BATCH) {
            debug!(mints = %batch.join(","), "calling DexScreener");
            let response = self
                .client
                .get(format!(
                    "{}/latest/dex/tokens/{}",
                    self.dexscreener_url,
                    batch.join(",")
                ))
                .send()
                .await
                .context("DexScreener request failed")?;
            let body: DexTokensResponse = read_json(response).await?;

            for pair in body.pairs.unwrap_or_default() {
                if !batch.contains(&pair.base_token.address) {
                    continue;
                }
                markets
                    .entry(pair.base_token.address.clone())
                    .or_insert_with(|| MintMarket {
                        symbol: pair.base_token.symbol.clone(),
                        price_usd: decimal_from_json(&pair.price_usd),
                        market_cap: decimal_from_json(&pair.fdv),
                    });
            }
        }

        Ok(markets)
    }

    async fn address_balances(&self, address: &str) -> Result<Vec<RawBalanceRecord>> {
        info!(source = "solana", address, "extracting balances");
        let mut records = Vec::new();

        let sol = self.sol_balance(address).await?;
        if sol > Decimal::ZERO {
            records.push(RawBalanceRecord::new(SOURCE_LABEL, "SOL", sol));
        }

        let tokens = self.token_balances(address).await?;
        debug!(source = "solana", address, ?tokens, "token balances found");
        if tokens.is_empty() {
            return Ok(records);
        }

        info!(source = "solana", address, "resolving mint symbols");
        let mints: Vec<String> = tokens.keys().cloned().collect();
        let markets = self.mint_markets(&mints).await?;

        for (mint, balance) in tokens {
            let Some(market) = markets.get(&mint) else {
                warn!(source = "solana", mint = %mint, "no DexScreener pair for mint, skipping");
                continue;
            };
            let mut record = RawBalanceRecord::new(SOURCE_LABEL, market.symbol.clone(), balance);
            record.backup_price_usd = market.price_usd;
            record.backup_market_cap = market.market_cap;
            records.push(record);
        }

        Ok(records)
    }
}

#[async_trait::async_trait]
impl BalanceSource for SolanaSource {
    fn name(&self) -> &str {
        "solana"
    }

    async fn get_balances(&self) -> Vec<RawBalanceRecord> {
        let mut records = Vec::new();
        for address in &self.addresses {
            records.extend(collect_wallet(
                self.name(),
                address,
                self.address_balances(address).await,
            ));
        }
        records
    }
}
