//! yd-allocator: engine configuration
//!
//! Tier budget table + global limit. Built either from the standard table or
//! from canonical config JSON (produced by yd-config).

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::solver::DampedNewton;
use crate::types::Tier;

pub const DEFAULT_GLOBAL_LIMIT: f64 = 200_000.0;

pub(crate) const FRACTION_SUM_TOLERANCE: f64 = 1e-9;

/// Budget fractions for one tier. All fractions are of the global limit.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TierLimits {
    /// Share of the global budget before redistribution.
    pub base_fraction: f64,
    /// Ceiling on the tier's share after redistribution.
    pub max_tier_fraction: f64,
    /// Ceiling on any single strategy's share.
    pub max_pool_fraction: f64,
}

impl TierLimits {
    pub const fn new(base_fraction: f64, max_tier_fraction: f64, max_pool_fraction: f64) -> Self {
        Self {
            base_fraction,
            max_tier_fraction,
            max_pool_fraction,
        }
    }

    /// Standard table: 50/30/15/5 base, 100/75/30/10 tier cap, 80/30/15/5 pool cap.
    pub fn standard(tier: Tier) -> Self {
        match tier {
            Tier::One => Self::new(0.50, 1.00, 0.80),
            Tier::Two => Self::new(0.30, 0.75, 0.30),
            Tier::Three => Self::new(0.15, 0.30, 0.15),
            Tier::Four => Self::new(0.05, 0.10, 0.05),
        }
    }
}

/// Full configuration of one allocation pass. Read-only during a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AllocationConfig {
    pub global_limit: f64,
    pub tiers: BTreeMap<Tier, TierLimits>,
    pub solver: DampedNewton,
}

impl AllocationConfig {
    /// Standard tier table with the given global limit.
    pub fn standard(global_limit: f64) -> Self {
        Self {
            global_limit,
            tiers: Tier::ALL
                .iter()
                .map(|&t| (t, TierLimits::standard(t)))
                .collect(),
            solver: DampedNewton::default(),
        }
    }

    pub fn with_global_limit(mut self, global_limit: f64) -> Self {
        self.global_limit = global_limit;
        self
    }

    pub fn limits(&self, tier: Tier) -> TierLimits {
        self.tiers
            .get(&tier)
            .copied()
            .unwrap_or_else(|| TierLimits::standard(tier))
    }

    /// Base dollar budget per tier.
    pub fn base_budgets(&self) -> BTreeMap<Tier, f64> {
        Tier::ALL
            .iter()
            .map(|&t| (t, self.limits(t).base_fraction * self.global_limit))
            .collect()
    }

    /// Dollar ceiling for a tier after redistribution.
    pub fn tier_cap(&self, tier: Tier) -> f64 {
        self.global_limit * self.limits(tier).max_tier_fraction
    }

    /// Dollar ceiling for any single strategy in a tier.
    pub fn pool_cap(&self, tier: Tier) -> f64 {
        self.global_limit * self.limits(tier).max_pool_fraction
    }

    /// Reject configurations the engine cannot honour.
    pub fn validate(&self) -> Result<()> {
        if !self.global_limit.is_finite() || self.global_limit <= 0.0 {
            bail!("allocation.global_limit must be > 0 (got {})", self.global_limit);
        }

        let mut base_sum = 0.0;
        for tier in Tier::ALL {
            let l = self.limits(tier);
            for (name, v) in [
                ("base_fraction", l.base_fraction),
                ("max_tier_fraction", l.max_tier_fraction),
                ("max_pool_fraction", l.max_pool_fraction),
            ] {
                if !v.is_finite() || !(0.0..=1.0).contains(&v) {
                    bail!(
                        "allocation.tiers.{}.{name} must be within 0..=1 (got {v})",
                        tier.config_key()
                    );
                }
            }
            if l.base_fraction > l.max_tier_fraction {
                bail!(
                    "allocation.tiers.{}: base_fraction {} exceeds max_tier_fraction {}",
                    tier.config_key(),
                    l.base_fraction,
                    l.max_tier_fraction
                );
            }
            base_sum += l.base_fraction;
        }

        if (base_sum - 1.0).abs() > FRACTION_SUM_TOLERANCE {
            bail!("allocation tier base fractions must sum to 1.0 (got {base_sum})");
        }

        self.solver.validate()
    }

    /// Build from canonical config JSON (produced by yd-config).
    ///
    /// Optional fields (defaults from the standard table):
    /// - allocation.global_limit (number or numeric string)
    /// - allocation.tiers.tier_N.{base_fraction,max_tier_fraction,max_pool_fraction}
    /// - allocation.solver.{max_iterations,tolerance}
    ///
    /// The result is validated before it is returned.
    pub fn from_config_json(cfg: &Value) -> Result<Self> {
        let mut out = Self::standard(DEFAULT_GLOBAL_LIMIT);

        if let Some(v) = cfg.pointer("/allocation/global_limit") {
            out.global_limit = number_like(v).context("allocation.global_limit must be numeric")?;
        }

        for tier in Tier::ALL {
            let mut limits = TierLimits::standard(tier);
            let base = format!("/allocation/tiers/{}", tier.config_key());
            for (field, slot) in [
                ("base_fraction", &mut limits.base_fraction),
                ("max_tier_fraction", &mut limits.max_tier_fraction),
                ("max_pool_fraction", &mut limits.max_pool_fraction),
            ] {
                if let Some(v) = cfg.pointer(&format!("{base}/{field}")) {
                    *slot = number_like(v).with_context(|| {
                        format!("allocation.tiers.{}.{field} must be numeric", tier.config_key())
                    })?;
                }
            }
            out.tiers.insert(tier, limits);
        }

        if let Some(v) = cfg.pointer("/allocation/solver/max_iterations") {
            out.solver.max_iterations = v
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| anyhow!("allocation.solver.max_iterations must be a positive integer"))?;
        }
        if let Some(v) = cfg.pointer("/allocation/solver/tolerance") {
            out.solver.tolerance =
                number_like(v).context("allocation.solver.tolerance must be numeric")?;
        }

        out.validate()?;
        Ok(out)
    }
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self::standard(DEFAULT_GLOBAL_LIMIT)
    }
}

fn number_like(v: &Value) -> Result<f64> {
    match v {
        Value::Number(n) => n.as_f64().ok_or_else(|| anyhow!("number out of range: {n}")),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .with_context(|| format!("not a number: '{s}'")),
        other => Err(anyhow!("expected number, got {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn standard_table_is_valid() {
        let cfg = AllocationConfig::default();
        cfg.validate().unwrap();
        let base_sum: f64 = cfg.base_budgets().values().sum();
        assert!((base_sum - DEFAULT_GLOBAL_LIMIT).abs() < 1e-6);
        assert_eq!(cfg.pool_cap(Tier::One), 160_000.0);
        assert_eq!(cfg.tier_cap(Tier::Three), 60_000.0);
    }

    #[test]
    fn empty_config_json_yields_standard_table() {
        let cfg = AllocationConfig::from_config_json(&json!({})).unwrap();
        assert_eq!(cfg, AllocationConfig::default());
    }

    #[test]
    fn overrides_are_applied_per_field() {
        let v = json!({
            "allocation": {
                "global_limit": "50000",
                "tiers": {
                    "tier_3": { "max_pool_fraction": 0.10 }
                },
                "solver": { "max_iterations": 80, "tolerance": 1e-8 }
            }
        });
        let cfg = AllocationConfig::from_config_json(&v).unwrap();
        assert_eq!(cfg.global_limit, 50_000.0);
        assert_eq!(cfg.limits(Tier::Three).max_pool_fraction, 0.10);
        assert_eq!(cfg.limits(Tier::Three).base_fraction, 0.15);
        assert_eq!(cfg.solver.max_iterations, 80);
        assert_eq!(cfg.solver.tolerance, 1e-8);
    }

    #[test]
    fn non_positive_global_limit_rejected() {
        let v = json!({ "allocation": { "global_limit": 0 } });
        assert!(AllocationConfig::from_config_json(&v).is_err());
        let v = json!({ "allocation": { "global_limit": -10.0 } });
        assert!(AllocationConfig::from_config_json(&v).is_err());
    }

    #[test]
    fn base_fractions_must_sum_to_one() {
        let v = json!({ "allocation": { "tiers": { "tier_1": { "base_fraction": 0.4 } } } });
        let err = AllocationConfig::from_config_json(&v).unwrap_err();
        assert!(err.to_string().contains("sum to 1.0"), "{err}");
    }

    #[test]
    fn base_above_tier_cap_rejected() {
        let mut cfg = AllocationConfig::default();
        cfg.tiers
            .insert(Tier::Four, TierLimits::new(0.05, 0.04, 0.05));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn non_numeric_fraction_rejected() {
        let v = json!({ "allocation": { "tiers": { "tier_2": { "max_pool_fraction": "lots" } } } });
        assert!(AllocationConfig::from_config_json(&v).is_err());
    }
}
