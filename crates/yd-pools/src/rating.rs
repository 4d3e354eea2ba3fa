//! Strategy-rating derivation and pool rating from TVL history.
//!
//! ```text
//! token key        = UPPER(trim(token)) + "-" + UPPER(trim(chain))
//! avg token tier   = (tier(token1) + tier(token2)) / 2
//! strategy_rating  = pool_rating / avg / scale
//! pool_rating      = tvl_usd(last point) * ceil(days(first -> last))
//! ```
//!
//! A pool whose token tiers are missing or zero, or whose pool rating is not
//! positive, is skipped rather than given a made-up rating.

use std::collections::HashMap;
use std::fmt;

use anyhow::{anyhow, bail, Result};
use serde_json::Value;
use tracing::warn;

use crate::ingest_csv::{PoolRow, TokenTierRow, TvlPoint};

/// Divisor applied to `pool_rating / avg_token_tier`.
pub const DEFAULT_RATING_SCALE: f64 = 1e7;

const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingSettings {
    pub scale: f64,
}

impl Default for RatingSettings {
    fn default() -> Self {
        Self {
            scale: DEFAULT_RATING_SCALE,
        }
    }
}

impl RatingSettings {
    /// Optional field: ratings.scale (number, > 0).
    pub fn from_config_json(cfg: &Value) -> Result<Self> {
        let mut out = Self::default();
        if let Some(v) = cfg.pointer("/ratings/scale") {
            out.scale = v
                .as_f64()
                .ok_or_else(|| anyhow!("ratings.scale must be numeric"))?;
        }
        if !out.scale.is_finite() || out.scale <= 0.0 {
            bail!("ratings.scale must be > 0 (got {})", out.scale);
        }
        Ok(out)
    }
}

// ─── Token tiers ─────────────────────────────────────────────────────────────

pub fn token_key(token: &str, chain: &str) -> String {
    format!(
        "{}-{}",
        token.trim().to_uppercase(),
        chain.trim().to_uppercase()
    )
}

/// Token tier lookup keyed by [`token_key`].
#[derive(Debug, Clone, Default)]
pub struct TokenTiers(HashMap<String, f64>);

impl TokenTiers {
    /// Non-numeric tiers are dropped, which makes those tokens count as missing.
    pub fn from_rows(rows: &[TokenTierRow]) -> Self {
        let mut map = HashMap::new();
        for r in rows {
            match r.tier.trim().parse::<f64>() {
                Ok(t) if t.is_finite() => {
                    map.insert(token_key(&r.token, &r.chain), t);
                }
                _ => warn!(token = %r.token, chain = %r.chain, tier = %r.tier, "token tier not numeric; ignored"),
            }
        }
        Self(map)
    }

    pub fn get(&self, token: &str, chain: &str) -> Option<f64> {
        self.0.get(&token_key(token, chain)).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ─── Strategy rating ─────────────────────────────────────────────────────────

/// Why a pool got no strategy rating.
#[derive(Debug, Clone, PartialEq)]
pub enum RatingSkip {
    /// Token tier missing from the table, or zero.
    MissingTokenTier { token_key: String },
    /// Average token tier is not positive.
    NonPositiveTokenTier { average: f64 },
    /// Pool `rating` absent, non-numeric or <= 0.
    NonPositivePoolRating { raw: Option<String> },
}

impl fmt::Display for RatingSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RatingSkip::MissingTokenTier { token_key } => {
                write!(f, "missing or zero token tier for {token_key}")
            }
            RatingSkip::NonPositiveTokenTier { average } => {
                write!(f, "average token tier {average} is not positive")
            }
            RatingSkip::NonPositivePoolRating { raw } => match raw {
                Some(r) => write!(f, "pool rating '{r}' is not a positive number"),
                None => write!(f, "pool rating is missing"),
            },
        }
    }
}

impl std::error::Error for RatingSkip {}

/// Strategy rating for one pool.
pub fn derive_strategy_rating(
    pool: &PoolRow,
    tiers: &TokenTiers,
    settings: &RatingSettings,
) -> Result<f64, RatingSkip> {
    let t1 = nonzero_tier(tiers, &pool.token1, &pool.chain)?;
    let t2 = nonzero_tier(tiers, &pool.token2, &pool.chain)?;

    let average = (t1 + t2) / 2.0;
    if !(average > 0.0) {
        return Err(RatingSkip::NonPositiveTokenTier { average });
    }

    let rating = pool
        .rating
        .as_deref()
        .and_then(|r| r.trim().parse::<f64>().ok())
        .filter(|r| r.is_finite() && *r > 0.0)
        .ok_or_else(|| RatingSkip::NonPositivePoolRating {
            raw: pool.rating.clone(),
        })?;

    Ok(rating / average / settings.scale)
}

fn nonzero_tier(tiers: &TokenTiers, token: &str, chain: &str) -> Result<f64, RatingSkip> {
    match tiers.get(token, chain) {
        Some(t) if t != 0.0 => Ok(t),
        _ => Err(RatingSkip::MissingTokenTier {
            token_key: token_key(token, chain),
        }),
    }
}

/// Outcome of rating a whole snapshot.
#[derive(Debug, Clone, Default)]
pub struct RatingPass {
    /// Every input pool, `strategy_rating` filled in where derivable.
    /// Pools that were skipped keep whatever value they had.
    pub pools: Vec<PoolRow>,
    pub rated: usize,
    /// (pool index, reason)
    pub skipped: Vec<(usize, RatingSkip)>,
}

/// Fill `strategy_rating` for every pool that can be rated.
pub fn rate_pools(pools: &[PoolRow], tiers: &TokenTiers, settings: &RatingSettings) -> RatingPass {
    let mut pass = RatingPass::default();
    for (i, p) in pools.iter().enumerate() {
        let mut out = p.clone();
        match derive_strategy_rating(p, tiers, settings) {
            Ok(r) => {
                out.strategy_rating = Some(r.to_string());
                pass.rated += 1;
            }
            Err(reason) => {
                warn!(
                    pool = p.pool_id.as_deref().unwrap_or("-"),
                    protocol = %p.protocol_name,
                    %reason,
                    "pool skipped for strategy rating"
                );
                pass.skipped.push((i, reason));
            }
        }
        pass.pools.push(out);
    }
    pass
}

// ─── Pool rating from TVL ────────────────────────────────────────────────────

/// Pool rating and latest APY derived from one pool's history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolMetrics {
    pub rating: f64,
    pub apy: Option<f64>,
}

/// `tvl_usd(last) * ceil(days(first -> last))` over points in the given order.
///
/// `None` for an empty history.
pub fn pool_rating_from_tvl(history: &[TvlPoint]) -> Option<PoolMetrics> {
    let first = history.first()?;
    let last = history.last()?;
    let secs = (last.timestamp - first.timestamp).num_milliseconds() as f64 / 1000.0;
    let days = (secs / SECONDS_PER_DAY).ceil();
    Some(PoolMetrics {
        rating: last.tvl_usd * days,
        apy: last.apy,
    })
}

/// Replace `rating` (and `roi` when an APY is known) for pools that have a
/// TVL history. Pools without a `pool_id` or history are left untouched.
/// Returns the number of pools updated.
pub fn apply_tvl_history(pools: &mut [PoolRow], history: &[TvlPoint]) -> usize {
    let mut by_pool: HashMap<&str, Vec<TvlPoint>> = HashMap::new();
    for pt in history {
        by_pool.entry(pt.pool_id.as_str()).or_default().push(pt.clone());
    }

    let mut updated = 0;
    for p in pools.iter_mut() {
        let Some(points) = p.pool_id.as_deref().and_then(|id| by_pool.get(id)) else {
            continue;
        };
        if let Some(m) = pool_rating_from_tvl(points) {
            p.rating = Some(m.rating.to_string());
            if let Some(apy) = m.apy {
                p.roi = Some(apy.to_string());
            }
            updated += 1;
        }
    }
    updated
}
