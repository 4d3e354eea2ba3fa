use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::allocate::AllocateArgs;
use commands::pools::RateArgs;

#[derive(Parser)]
#[command(name = "yd")]
#[command(about = "Tiered risk-parity yield allocator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (defaults -> overrides...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Allocate the global limit across a pool snapshot and export the run
    Allocate {
        /// Layered config paths in merge order
        #[arg(long = "config")]
        config_paths: Vec<String>,

        /// Pools CSV (protocol_name, token1, token2, chain, tier?, strategy_rating?, roi?)
        #[arg(long)]
        pools: String,

        /// Protocol-tier CSV (protocol_name, tier); when given, its tier replaces
        /// the pools' tier column and unlisted protocols get tier 4
        #[arg(long)]
        protocols: Option<String>,

        /// Export root; overrides exports.root from config
        #[arg(long = "exports-root")]
        exports_root: Option<String>,

        /// Override allocation.global_limit
        #[arg(long = "global-limit")]
        global_limit: Option<f64>,

        /// Fail instead of warn on config keys nothing reads
        #[arg(long = "strict-config", default_value_t = false)]
        strict_config: bool,
    },

    /// Print the rows of an allocation_summary.csv
    Show {
        #[arg(long)]
        summary: String,
    },

    /// Derive strategy_rating for each pool from token tiers
    Rate {
        #[arg(long)]
        pools: String,

        /// Token-tier CSV (token, chain, tier)
        #[arg(long)]
        tokens: String,

        /// Output pools CSV
        #[arg(long)]
        out: String,

        /// Layered config paths (ratings.scale)
        #[arg(long = "config")]
        config_paths: Vec<String>,

        /// TVL history CSV (pool_id, timestamp, tvl_usd, apy?); recomputes pool rating first
        #[arg(long)]
        tvl: Option<String>,

        #[arg(long = "strict-config", default_value_t = false)]
        strict_config: bool,
    },

    /// Impermanent loss of an LP position at the given prices
    Il {
        #[arg(long = "token1-before")]
        token1_before: f64,
        #[arg(long = "token1-after")]
        token1_after: f64,
        #[arg(long = "token2-before")]
        token2_before: f64,
        #[arg(long = "token2-after")]
        token2_after: f64,
        #[arg(long)]
        price1: f64,
        #[arg(long)]
        price2: f64,
        /// Fees earned, quote currency
        #[arg(long, default_value_t = 0.0)]
        fee: f64,
    },

    /// Replay a price series through the depeg detector
    Depeg {
        #[arg(long)]
        pair: String,

        /// Comma-separated prices, oldest first
        #[arg(long)]
        prices: String,

        #[arg(long, default_value_t = yd_pools::DEFAULT_WINDOW)]
        window: usize,

        #[arg(long, default_value_t = yd_pools::DEFAULT_DEPEG_THRESHOLD, allow_negative_numbers = true)]
        threshold: f64,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.cmd {
        Commands::ConfigHash { paths } => {
            let loaded = yd_config::load_layered_yaml(&paths)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Allocate {
            config_paths,
            pools,
            protocols,
            exports_root,
            global_limit,
            strict_config,
        } => commands::allocate::run(AllocateArgs {
            config_paths,
            pools,
            protocols,
            exports_root,
            global_limit,
            strict_config,
        })?,

        Commands::Show { summary } => commands::pools::show(&summary)?,

        Commands::Rate {
            pools,
            tokens,
            out,
            config_paths,
            tvl,
            strict_config,
        } => commands::pools::rate(RateArgs {
            pools,
            tokens,
            out,
            config_paths,
            tvl,
            strict_config,
        })?,

        Commands::Il {
            token1_before,
            token1_after,
            token2_before,
            token2_after,
            price1,
            price2,
            fee,
        } => commands::risk::il(&yd_pools::IlInputs {
            token1_qty_before: token1_before,
            token1_qty_after: token1_after,
            token2_qty_before: token2_before,
            token2_qty_after: token2_after,
            price1,
            price2,
            fee,
        })?,

        Commands::Depeg {
            pair,
            prices,
            window,
            threshold,
        } => commands::risk::depeg(&pair, &prices, window, threshold)?,
    }

    Ok(())
}

/// Logs go to stderr; stdout carries only `key=value` results.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}
