use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cryptonaire::clock::SystemClock;
use cryptonaire::config::{default_config_path, Config};
use cryptonaire::duration::format_duration;
use cryptonaire::format::format_usd;
use cryptonaire::market_data::providers::CoinMarketCapClient;
use cryptonaire::market_data::MarketDataEnricher;
use cryptonaire::portfolio::{total_value, PortfolioService};
use cryptonaire::report::{write_report, ReportFormat};
use cryptonaire::sources::{build_sources, SourceSelection};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "cryptonaire")]
#[command(about = "Crypto portfolio reports across exchanges, wallets and manual balances")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a portfolio report
    Portfolio(PortfolioArgs),
    /// Show current configuration
    Config,
}

#[derive(clap::Args)]
struct PortfolioArgs {
    /// Exchanges to query, comma separated (binance, bingx, bybit, coinbase, gate) or "all"
    #[arg(short, long)]
    exchanges: Option<String>,

    /// Networks to query, comma separated (ethereum, solana) or "all"
    #[arg(short, long)]
    networks: Option<String>,

    /// Include balances from the manual CSV file
    #[arg(short = 'm', long)]
    include_manual: bool,

    /// Write the raw CSV report instead of the formatted spreadsheet
    #[arg(long)]
    csv: bool,

    /// Verbose logging, including full API responses
    #[arg(long)]
    debug: bool,

    /// Fail instead of writing an empty report when no source is active
    #[arg(long)]
    require_sources: bool,

    /// Directory for the report file (overrides report.output_dir)
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_level(true),
        )
        .init();
}

async fn run_portfolio(config: Config, args: PortfolioArgs) -> Result<()> {
    let selection = SourceSelection::parse(
        args.exchanges.as_deref(),
        args.networks.as_deref(),
        args.include_manual,
    )?;

    let cmc = config
        .coinmarketcap
        .as_ref()
        .context("Missing [coinmarketcap] section with api_key in the config file")?;
    let mut client = CoinMarketCapClient::new(cmc.api_key.clone());
    if let Some(base_url) = &cmc.base_url {
        client = client.with_base_url(base_url.clone());
    }
    let enricher = MarketDataEnricher::new(Arc::new(client))
        .with_cooldown(cmc.rate_limit_cooldown)
        .with_max_rate_limit_retries(cmc.max_rate_limit_retries);

    let sources = build_sources(&config, &selection);
    let service = PortfolioService::new(sources, enricher)
        .with_ignore_tokens(config.ignore_tokens.clone())
        .with_require_sources(args.require_sources || config.report.require_sources);

    let rows = service.build().await?;

    let total = total_value(&rows);
    let unpriced = rows.iter().filter(|row| row.total_value_usd.is_none()).count();
    info!(
        symbols = rows.len(),
        unpriced,
        total = %format_usd(total),
        "portfolio computed"
    );

    let format = if args.csv {
        ReportFormat::Csv
    } else {
        ReportFormat::Xlsx
    };
    let output_dir = args.output_dir.unwrap_or(config.report.output_dir);
    let path = write_report(
        &rows,
        &output_dir,
        format,
        &SystemClock,
        config.report.min_styled_value_usd,
    )?;

    println!("{}", path.display());
    Ok(())
}

fn print_config(path: &std::path::Path, config: &Config) {
    println!("Config file: {}", path.display());
    match &config.coinmarketcap {
        Some(cmc) => println!(
            "CoinMarketCap: configured (cooldown {}, max retries {})",
            format_duration(cmc.rate_limit_cooldown),
            cmc.max_rate_limit_retries
                .map(|n| n.to_string())
                .unwrap_or_else(|| "unlimited".to_string())
        ),
        None => println!("CoinMarketCap: not configured"),
    }

    let exchanges = &config.exchanges;
    let configured: Vec<&str> = [
        ("binance", exchanges.binance.is_some()),
        ("bingx", exchanges.bingx.is_some()),
        ("bybit", exchanges.bybit.is_some()),
        ("coinbase", exchanges.coinbase.is_some()),
        ("gate", exchanges.gate.is_some()),
    ]
    .into_iter()
    .filter_map(|(code, present)| present.then_some(code))
    .collect();
    println!("Exchanges: {}", display_list(&configured));

    println!("Ethereum addresses: {}", config.networks.ethereum.len());
    println!("Solana addresses: {}", config.networks.solana.len());

    match config.manual_balances.as_ref().and_then(|m| m.csv_file.as_ref()) {
        Some(csv_file) => println!("Manual balances: {}", csv_file.display()),
        None => println!("Manual balances: not configured"),
    }

    let mut ignored: Vec<String> = config
        .ignore_tokens
        .iter()
        .map(|(source, tokens)| format!("{source} ({})", tokens.len()))
        .collect();
    ignored.sort();
    println!("Ignored tokens: {}", display_list(&ignored));

    println!("Report directory: {}", config.report.output_dir.display());
    println!("Require sources: {}", config.report.require_sources);
    println!(
        "Minimum styled value: {}",
        format_usd(config.report.min_styled_value_usd)
    );
}

fn display_list<S: AsRef<str>>(items: &[S]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(", ")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let debug = matches!(&cli.command, Command::Portfolio(args) if args.debug);
    init_tracing(debug);

    let config = Config::load_resolved(&cli.config)
        .with_context(|| format!("Failed to load cryptonaire config: {}", cli.config.display()))?;

    match cli.command {
        Command::Portfolio(args) => {
            if let Err(e) = run_portfolio(config, args).await {
                error!(error = %format!("{e:#}"), "portfolio report failed");
                return Err(e);
            }
        }
        Command::Config => print_config(&cli.config, &config),
    }

    Ok(())
}
