//! yd-allocator: capping, aggregation and cap verification
//!
//! - `cap_tier`: clamp every strategy to its pool cap and convert to weight %.
//! - `aggregate`: concatenate tier results, sort descending by weight.
//! - `check_caps`: after-the-fact verification of pool, tier and global
//!   ceilings, producing violation reports rather than mutating anything.
//!
//! Capped dollars are not handed to other strategies. The shortfall stays
//! unallocated.

use std::collections::BTreeMap;

use crate::config::{AllocationConfig, FRACTION_SUM_TOLERANCE};
use crate::types::{AllocationRecord, StrategyRecord, Tier};

/// Absolute floor of the slack for comparisons against dollar ceilings.
const CAP_SLACK: f64 = 1e-6;

/// Slack per dollar of global limit. Base fractions are only required to sum
/// to 1 within [`FRACTION_SUM_TOLERANCE`], so budgets may legitimately
/// overshoot the limit by that share.
const CAP_SLACK_RELATIVE: f64 = 10.0 * FRACTION_SUM_TOLERANCE;

fn cap_slack(config: &AllocationConfig) -> f64 {
    CAP_SLACK.max(config.global_limit * CAP_SLACK_RELATIVE)
}

/// Clamp one tier's raw dollar weights to the pool cap.
///
/// `strategies` and `dollars` are parallel slices in the same order.
pub fn cap_tier(
    tier: Tier,
    strategies: &[&StrategyRecord],
    dollars: &[f64],
    config: &AllocationConfig,
) -> Vec<AllocationRecord> {
    let cap = config.pool_cap(tier);
    strategies
        .iter()
        .zip(dollars)
        .map(|(s, raw)| {
            let allocation = raw.min(cap);
            AllocationRecord {
                strategy: s.label.clone(),
                protocol: s.protocol.clone(),
                tier,
                roi: s.roi,
                allocation,
                weight_pct: 100.0 * allocation / config.global_limit,
            }
        })
        .collect()
}

/// Merge per-tier results and sort by weight, largest first.
///
/// The sort is stable: ties keep tier order, then input order.
pub fn aggregate<I>(tiers: I) -> Vec<AllocationRecord>
where
    I: IntoIterator<Item = Vec<AllocationRecord>>,
{
    let mut out: Vec<AllocationRecord> = tiers.into_iter().flatten().collect();
    out.sort_by(|a, b| b.weight_pct.total_cmp(&a.weight_pct));
    out
}

// ─── Verification ────────────────────────────────────────────────────────────

/// A ceiling breach found by [`check_caps`].
#[derive(Clone, Debug, PartialEq)]
pub enum CapViolation {
    /// One strategy exceeds `global_limit * max_pool_fraction[tier]`.
    PoolCapExceeded {
        strategy: String,
        tier: Tier,
        allocation: f64,
        limit: f64,
    },
    /// A tier's total exceeds `global_limit * max_tier_fraction[tier]`.
    TierCapExceeded { tier: Tier, total: f64, limit: f64 },
    /// The whole run exceeds the global limit.
    GlobalLimitExceeded { total: f64, limit: f64 },
    /// Negative or non-finite dollar amount.
    InvalidAllocation { strategy: String, allocation: f64 },
}

impl std::fmt::Display for CapViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PoolCapExceeded {
                strategy,
                tier,
                allocation,
                limit,
            } => write!(
                f,
                "'{strategy}' (tier {tier}) allocation {allocation:.2} exceeds pool cap {limit:.2}"
            ),
            Self::TierCapExceeded { tier, total, limit } => {
                write!(f, "tier {tier} total {total:.2} exceeds tier cap {limit:.2}")
            }
            Self::GlobalLimitExceeded { total, limit } => {
                write!(f, "total allocation {total:.2} exceeds global limit {limit:.2}")
            }
            Self::InvalidAllocation {
                strategy,
                allocation,
            } => write!(f, "'{strategy}' has invalid allocation {allocation}"),
        }
    }
}

/// Verify every ceiling. Empty result means all caps hold.
pub fn check_caps(records: &[AllocationRecord], config: &AllocationConfig) -> Vec<CapViolation> {
    let slack = cap_slack(config);
    let mut out = Vec::new();
    let mut tier_totals: BTreeMap<Tier, f64> = BTreeMap::new();

    for r in records {
        if !r.allocation.is_finite() || r.allocation < 0.0 {
            out.push(CapViolation::InvalidAllocation {
                strategy: r.strategy.clone(),
                allocation: r.allocation,
            });
            continue;
        }
        let limit = config.pool_cap(r.tier);
        if r.allocation > limit + slack {
            out.push(CapViolation::PoolCapExceeded {
                strategy: r.strategy.clone(),
                tier: r.tier,
                allocation: r.allocation,
                limit,
            });
        }
        *tier_totals.entry(r.tier).or_insert(0.0) += r.allocation;
    }

    for (tier, total) in &tier_totals {
        let limit = config.tier_cap(*tier);
        if *total > limit + slack {
            out.push(CapViolation::TierCapExceeded {
                tier: *tier,
                total: *total,
                limit,
            });
        }
    }

    let total: f64 = tier_totals.values().sum();
    if total > config.global_limit + slack {
        out.push(CapViolation::GlobalLimitExceeded {
            total,
            limit: config.global_limit,
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const G: f64 = 200_000.0;

    fn rec(name: &str, tier: Tier, allocation: f64) -> AllocationRecord {
        AllocationRecord {
            strategy: name.to_string(),
            protocol: "proto".to_string(),
            tier,
            roi: None,
            allocation,
            weight_pct: 100.0 * allocation / G,
        }
    }

    #[test]
    fn pool_cap_clamps_and_converts_to_percent() {
        let cfg = AllocationConfig::standard(G);
        let a = StrategyRecord::new("A", "p", Tier::Two, 1.0).with_roi(4.2);
        let b = StrategyRecord::new("B", "p", Tier::Two, 1.0);
        let out = cap_tier(Tier::Two, &[&a, &b], &[90_000.0, 10_000.0], &cfg);
        // tier-2 pool cap = 0.30 * 200_000
        assert_eq!(out[0].allocation, 60_000.0);
        assert!((out[0].weight_pct - 30.0).abs() < 1e-12);
        assert_eq!(out[0].roi, Some(4.2));
        assert_eq!(out[1].allocation, 10_000.0);
        assert!((out[1].weight_pct - 5.0).abs() < 1e-12);
    }

    #[test]
    fn aggregate_sorts_descending_and_is_stable() {
        let out = aggregate(vec![
            vec![rec("t1-a", Tier::One, 10.0), rec("t1-b", Tier::One, 50.0)],
            vec![rec("t2-a", Tier::Two, 10.0)],
        ]);
        let names: Vec<&str> = out.iter().map(|r| r.strategy.as_str()).collect();
        assert_eq!(names, vec!["t1-b", "t1-a", "t2-a"]);
    }

    #[test]
    fn aggregate_of_nothing_is_empty() {
        assert!(aggregate(Vec::<Vec<AllocationRecord>>::new()).is_empty());
    }

    #[test]
    fn check_caps_clean_for_compliant_records() {
        let cfg = AllocationConfig::standard(G);
        let records = vec![rec("a", Tier::One, 160_000.0), rec("b", Tier::Four, 10_000.0)];
        assert!(check_caps(&records, &cfg).is_empty());
    }

    #[test]
    fn check_caps_reports_each_breach() {
        let cfg = AllocationConfig::standard(G);
        let records = vec![
            rec("big", Tier::Four, 15_000.0),
            rec("more", Tier::Four, 9_000.0),
            rec("neg", Tier::Two, -1.0),
        ];
        let v = check_caps(&records, &cfg);
        assert!(v.iter().any(|x| matches!(x, CapViolation::PoolCapExceeded { strategy, .. } if strategy == "big")));
        assert!(v.iter().any(|x| matches!(x, CapViolation::TierCapExceeded { tier: Tier::Four, .. })));
        assert!(v.iter().any(|x| matches!(x, CapViolation::InvalidAllocation { .. })));
        assert!(!v.iter().any(|x| matches!(x, CapViolation::GlobalLimitExceeded { .. })));
    }

    #[test]
    fn check_caps_reports_global_breach() {
        let cfg = AllocationConfig::standard(1_000.0);
        let records = vec![
            AllocationRecord {
                weight_pct: 80.0,
                ..rec("a", Tier::One, 800.0)
            },
            AllocationRecord {
                weight_pct: 30.0,
                ..rec("b", Tier::Two, 300.0)
            },
        ];
        let v = check_caps(&records, &cfg);
        assert!(v.iter().any(|x| matches!(x, CapViolation::GlobalLimitExceeded { .. })), "{v:?}");
    }

    #[test]
    fn check_caps_slack_scales_with_global_limit() {
        let global = 1e12;
        let mut cfg = AllocationConfig::standard(global);
        cfg.tiers.get_mut(&Tier::One).unwrap().base_fraction += 8e-10;
        cfg.validate().unwrap();

        // Budgets from these fractions overshoot the limit by 800 dollars.
        let records = vec![
            rec("t1", Tier::One, global * (0.5 + 8e-10)),
            rec("t2", Tier::Two, global * 0.3),
            rec("t3", Tier::Three, global * 0.15),
            rec("t4", Tier::Four, global * 0.05),
        ];
        assert!(check_caps(&records, &cfg).is_empty());

        let mut over = records.clone();
        over[0] = rec("t1", Tier::One, global * 0.5 + 1e6);
        let v = check_caps(&over, &cfg);
        assert!(v.iter().any(|x| matches!(x, CapViolation::GlobalLimitExceeded { .. })), "{v:?}");
    }

    #[test]
    fn check_caps_slack_has_absolute_floor() {
        let cfg = AllocationConfig::standard(10.0);
        let records = vec![rec("a", Tier::One, 8.0 + 1e-7)];
        assert!(check_caps(&records, &cfg).is_empty());
        let records = vec![rec("a", Tier::One, 8.0 + 1e-4)];
        assert!(matches!(
            check_caps(&records, &cfg)[..],
            [CapViolation::PoolCapExceeded { .. }]
        ));
    }

    #[test]
    fn violation_display_is_informative() {
        let v = CapViolation::TierCapExceeded {
            tier: Tier::Three,
            total: 70_000.0,
            limit: 60_000.0,
        };
        let s = v.to_string();
        assert!(s.contains("tier 3"));
        assert!(s.contains("60000.00"));
    }
}
