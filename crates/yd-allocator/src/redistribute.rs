//! yd-allocator: tier budget redistribution
//!
//! Tiers that hold a base budget but have no strategies hand that budget to
//! the tiers that are present, proportional to each present tier's summed
//! rating. Every present tier is then clamped to its tier cap.
//!
//! The clamp can leave `sum(budgets) < global_limit`. That shortfall is not
//! redistributed a second time; callers see it as unallocated capital.

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::AllocationConfig;
use crate::types::Tier;

/// Adjusted dollar budget for every present tier.
///
/// `rating_sums` holds one entry per tier that has strategies; its keys are the
/// present tiers. Tiers absent from it get no budget in the result.
pub fn redistribute_tier_budgets(
    config: &AllocationConfig,
    rating_sums: &BTreeMap<Tier, f64>,
) -> BTreeMap<Tier, f64> {
    let base = config.base_budgets();

    let missing: Vec<Tier> = base
        .iter()
        .filter(|(t, b)| **b != 0.0 && !rating_sums.contains_key(*t))
        .map(|(t, _)| *t)
        .collect();
    let redistributable: f64 = missing.iter().map(|t| base[t]).sum();
    let total_rating: f64 = rating_sums.values().sum();

    let mut out: BTreeMap<Tier, f64> = rating_sums
        .keys()
        .map(|t| (*t, base.get(t).copied().unwrap_or(0.0)))
        .collect();

    if total_rating > 0.0 {
        for (tier, budget) in out.iter_mut() {
            let share = rating_sums[tier] / total_rating;
            *budget = (*budget + redistributable * share).min(config.tier_cap(*tier));
        }
    } else {
        debug!("present tiers carry zero total rating; keeping base budgets");
    }

    debug!(
        missing = ?missing,
        redistributable,
        budgets = ?out,
        "tier budgets redistributed"
    );

    out
}
