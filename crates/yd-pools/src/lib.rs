//! yd-pools
//!
//! Data side of an allocation run.
//!
//! Responsibilities:
//! - CSV ingest for pools, protocol tiers, token tiers and TVL history
//! - Normalization of pool rows into `yd_allocator::StrategyRecord`
//! - Strategy-rating derivation from token tiers, pool rating from TVL history
//! - Impermanent-loss arithmetic and rolling-window depeg detection
//!
//! It does **not** fetch anything over the network; callers supply files or
//! observations.

pub mod depeg;
pub mod il;
pub mod ingest_csv;
pub mod normalizer;
pub mod rating;

pub use depeg::{DepegDetector, DepegObservation, DEFAULT_DEPEG_THRESHOLD, DEFAULT_WINDOW};
pub use il::{impermanent_loss, IlError, IlInputs};
pub use ingest_csv::{
    parse_pools_csv_file, parse_pools_csv_str, parse_protocol_tiers_csv_file,
    parse_protocol_tiers_csv_str, parse_token_tiers_csv_file, parse_token_tiers_csv_str,
    parse_tvl_history_csv_file, parse_tvl_history_csv_str, CsvIngestError, PoolRow,
    ProtocolTierRow, TokenTierRow, TvlPoint,
};
pub use normalizer::{normalize_pools, NormalizeStats, DEFAULT_RATING};
pub use rating::{
    apply_tvl_history, derive_strategy_rating, pool_rating_from_tvl, rate_pools, token_key,
    PoolMetrics, RatingPass, RatingSettings, RatingSkip, TokenTiers, DEFAULT_RATING_SCALE,
};

use std::path::Path;

use anyhow::{Context, Result};
use yd_allocator::StrategyRecord;

/// Load a pools file (plus optional protocol-tier file) straight into engine input.
pub fn load_strategies(
    pools_path: &Path,
    protocols_path: Option<&Path>,
) -> Result<(Vec<StrategyRecord>, NormalizeStats)> {
    let pools = parse_pools_csv_file(pools_path)
        .with_context(|| format!("load pools: {}", pools_path.display()))?;
    let protocols = match protocols_path {
        Some(p) => Some(
            parse_protocol_tiers_csv_file(p)
                .with_context(|| format!("load protocol tiers: {}", p.display()))?,
        ),
        None => None,
    };
    Ok(normalize_pools(&pools, protocols.as_deref()))
}

/// Write pools back out with the canonical column order used by `yd rate`.
pub fn write_pools_csv(path: &Path, pools: &[PoolRow]) -> Result<()> {
    let mut w = csv::Writer::from_path(path)
        .with_context(|| format!("create pools csv: {}", path.display()))?;
    w.write_record([
        "pool_id",
        "protocol_name",
        "token1",
        "token2",
        "chain",
        "tier",
        "rating",
        "strategy_rating",
        "roi",
    ])?;
    for p in pools {
        w.write_record([
            p.pool_id.as_deref().unwrap_or(""),
            p.protocol_name.as_str(),
            p.token1.as_str(),
            p.token2.as_str(),
            p.chain.as_str(),
            p.tier.as_deref().unwrap_or(""),
            p.rating.as_deref().unwrap_or(""),
            p.strategy_rating.as_deref().unwrap_or(""),
            p.roi.as_deref().unwrap_or(""),
        ])?;
    }
    w.flush().context("flush pools csv")?;
    Ok(())
}
