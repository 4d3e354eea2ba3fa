//! Pool rows -> engine input.
//!
//! Converts [`PoolRow`]s into typed [`StrategyRecord`]s:
//! - protocol-tier table left-joined by protocol name (wins over a pool `tier`)
//! - tier coerced from `"2"`/`"2.0"`, default tier 4
//! - rating from `strategy_rating`, default 1 when absent or non-numeric
//! - ROI kept only when numeric
//!
//! It does **not** reject bad ratings. A parseable 0 or negative rating is
//! passed through so the engine can report it as a rejected strategy.

use std::collections::HashMap;

use tracing::{debug, warn};
use yd_allocator::{strategy_label, StrategyRecord, Tier};

use crate::ingest_csv::{PoolRow, ProtocolTierRow};

/// Rating used when a pool carries no usable `strategy_rating`.
pub const DEFAULT_RATING: f64 = 1.0;

/// Counters for one normalization pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    pub pools: usize,
    /// Pools whose tier came from the protocol-tier table.
    pub tier_from_protocols: usize,
    /// Pools that fell back to [`Tier::FALLBACK`].
    pub tier_defaulted: usize,
    /// Pools that fell back to [`DEFAULT_RATING`].
    pub rating_defaulted: usize,
}

/// Map protocol name -> raw tier cell. First row wins on duplicates.
pub fn protocol_tier_map(rows: &[ProtocolTierRow]) -> HashMap<&str, &str> {
    let mut map: HashMap<&str, &str> = HashMap::new();
    for r in rows {
        if map.contains_key(r.protocol_name.as_str()) {
            warn!(protocol = %r.protocol_name, "duplicate protocol in tier table; first row kept");
            continue;
        }
        map.insert(r.protocol_name.as_str(), r.tier.as_str());
    }
    map
}

/// Normalize a pools snapshot, optionally joined with a protocol-tier table.
pub fn normalize_pools(
    pools: &[PoolRow],
    protocol_tiers: Option<&[ProtocolTierRow]>,
) -> (Vec<StrategyRecord>, NormalizeStats) {
    let joined = protocol_tiers.map(protocol_tier_map);
    let mut stats = NormalizeStats {
        pools: pools.len(),
        ..NormalizeStats::default()
    };

    let records = pools
        .iter()
        .map(|p| {
            let raw_tier = match &joined {
                Some(map) => {
                    let hit = map.get(p.protocol_name.as_str()).copied();
                    if hit.is_some() {
                        stats.tier_from_protocols += 1;
                    }
                    hit
                }
                None => p.tier.as_deref(),
            };
            let tier = coerce_tier(raw_tier).unwrap_or_else(|| {
                stats.tier_defaulted += 1;
                Tier::FALLBACK
            });

            let rating = coerce_rating(p.strategy_rating.as_deref()).unwrap_or_else(|| {
                stats.rating_defaulted += 1;
                DEFAULT_RATING
            });

            let mut rec = StrategyRecord::new(
                strategy_label(&p.token1, &p.token2, &p.chain),
                p.protocol_name.clone(),
                tier,
                rating,
            );
            rec.roi = parse_roi(p.roi.as_deref());
            rec
        })
        .collect();

    debug!(?stats, "pools normalized");
    (records, stats)
}

/// Integral tier 1..=4 from `"2"`, `"2.0"`, `" 3 "`. Anything else is `None`.
pub fn coerce_tier(raw: Option<&str>) -> Option<Tier> {
    let v: f64 = raw?.trim().parse().ok()?;
    if !v.is_finite() || v.fract() != 0.0 {
        return None;
    }
    Tier::from_number(v as i64)
}

/// Numeric rating, or `None` when absent, non-numeric or NaN.
///
/// Zero, negative and infinite values are returned as-is.
pub fn coerce_rating(raw: Option<&str>) -> Option<f64> {
    raw?.trim().parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// Finite ROI, or `None` (e.g. `No APY Data`).
pub fn parse_roi(raw: Option<&str>) -> Option<f64> {
    raw?.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(protocol: &str, t1: &str, t2: &str, chain: &str) -> PoolRow {
        PoolRow {
            protocol_name: protocol.to_string(),
            token1: t1.to_string(),
            token2: t2.to_string(),
            chain: chain.to_string(),
            ..PoolRow::default()
        }
    }

    #[test]
    fn tier_coercion_variants() {
        assert_eq!(coerce_tier(Some("2")), Some(Tier::Two));
        assert_eq!(coerce_tier(Some("2.0")), Some(Tier::Two));
        assert_eq!(coerce_tier(Some(" 1 ")), Some(Tier::One));
        assert_eq!(coerce_tier(Some("2.5")), None);
        assert_eq!(coerce_tier(Some("7")), None);
        assert_eq!(coerce_tier(Some("0")), None);
        assert_eq!(coerce_tier(Some("high")), None);
        assert_eq!(coerce_tier(None), None);
    }

    #[test]
    fn rating_coercion_keeps_non_positive_values() {
        assert_eq!(coerce_rating(Some("0.75")), Some(0.75));
        assert_eq!(coerce_rating(Some("0")), Some(0.0));
        assert_eq!(coerce_rating(Some("-2")), Some(-2.0));
        assert_eq!(coerce_rating(Some("NaN")), None);
        assert_eq!(coerce_rating(Some("n/a")), None);
        assert_eq!(coerce_rating(None), None);
    }

    #[test]
    fn roi_non_numeric_is_absent() {
        assert_eq!(parse_roi(Some("4.2")), Some(4.2));
        assert_eq!(parse_roi(Some("No APY Data")), None);
        assert_eq!(parse_roi(Some("inf")), None);
    }

    #[test]
    fn defaults_apply_without_protocol_table() {
        let mut p = pool("aave", "USDC", "USDC", "Base");
        p.tier = Some("3".into());
        let (recs, stats) = normalize_pools(&[p, pool("curve", "DAI", "USDC", "Ethereum")], None);

        assert_eq!(recs[0].label, "USDC (Base)");
        assert_eq!(recs[0].tier, Tier::Three);
        assert_eq!(recs[0].rating, DEFAULT_RATING);

        assert_eq!(recs[1].label, "DAI/USDC (Ethereum)");
        assert_eq!(recs[1].tier, Tier::Four);

        assert_eq!(stats.tier_defaulted, 1);
        assert_eq!(stats.rating_defaulted, 2);
    }

    #[test]
    fn protocol_table_wins_over_pool_tier() {
        let mut p = pool("aave", "USDC", "ETH", "Arbitrum");
        p.tier = Some("4".into());
        p.strategy_rating = Some("2.5".into());
        let tiers = vec![ProtocolTierRow {
            protocol_name: "aave".into(),
            tier: "1".into(),
        }];
        let (recs, stats) = normalize_pools(&[p], Some(tiers.as_slice()));
        assert_eq!(recs[0].tier, Tier::One);
        assert_eq!(recs[0].rating, 2.5);
        assert_eq!(stats.tier_from_protocols, 1);
    }

    #[test]
    fn unmatched_protocol_defaults_to_tier_four() {
        let mut p = pool("unknown", "A", "B", "C");
        p.tier = Some("1".into());
        let (recs, stats) = normalize_pools(&[p], Some(&[][..]));
        assert_eq!(recs[0].tier, Tier::Four);
        assert_eq!(stats.tier_defaulted, 1);
    }

    #[test]
    fn duplicate_protocol_rows_keep_first() {
        let rows = vec![
            ProtocolTierRow {
                protocol_name: "aave".into(),
                tier: "1".into(),
            },
            ProtocolTierRow {
                protocol_name: "aave".into(),
                tier: "3".into(),
            },
        ];
        assert_eq!(protocol_tier_map(&rows).get("aave"), Some(&"1"));
    }
}
