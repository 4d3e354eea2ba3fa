//! yd-allocator: allocation engine
//!
//! Pipeline for one batch run:
//!
//! 1. Screen ratings. A zero, negative or non-finite rating rejects that one
//!    strategy; the rest of its tier carries on.
//! 2. Group the survivors by tier and sum ratings per tier.
//! 3. Redistribute missing tiers' budgets (see `redistribute`).
//! 4. Per tier, in parallel: risk model -> risk-parity weights -> pool cap.
//! 5. Merge and sort descending by weight.
//!
//! The engine owns no mutable state; `allocate` is a pure function of
//! (strategies, config) and is safe to call concurrently.

use std::collections::BTreeMap;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::capper::{aggregate, cap_tier};
use crate::config::AllocationConfig;
use crate::optimizer::{optimize_tier, OptimizationStatus};
use crate::redistribute::redistribute_tier_budgets;
use crate::risk_model::{check_rating, RiskModel, RiskModelError};
use crate::solver::{ConstrainedMinimizer, DampedNewton, SolverError};
use crate::types::{AllocationRecord, StrategyRecord, Tier};

// ─── Error ───────────────────────────────────────────────────────────────────

/// Errors that prevent an engine from being built.
#[derive(Clone, Debug, PartialEq)]
pub enum AllocationError {
    /// Tier table, global limit or solver settings are unusable.
    InvalidConfig { reason: String },
}

impl std::fmt::Display for AllocationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidConfig { reason } => write!(f, "invalid allocation config: {reason}"),
        }
    }
}

impl std::error::Error for AllocationError {}

// ─── Outcome types ───────────────────────────────────────────────────────────

/// A strategy excluded before optimization.
#[derive(Clone, Debug, PartialEq)]
pub struct RejectedStrategy {
    pub strategy: String,
    pub protocol: String,
    pub tier: Tier,
    pub rating: f64,
    pub reason: RiskModelError,
}

/// How a tier's result was produced.
#[derive(Clone, Debug, PartialEq)]
pub enum TierStatus {
    Optimized { iterations: usize },
    /// Solver did not converge; uniform weights were used.
    UniformFallback { error: SolverError },
    /// Risk model could not be built; the tier produced nothing.
    Faulted { error: RiskModelError },
}

impl TierStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TierStatus::Optimized { .. } => "OPTIMIZED",
            TierStatus::UniformFallback { .. } => "UNIFORM_FALLBACK",
            TierStatus::Faulted { .. } => "FAULTED",
        }
    }
}

/// Per-tier bookkeeping for one run.
#[derive(Clone, Debug, PartialEq)]
pub struct TierReport {
    pub tier: Tier,
    pub strategies: usize,
    /// Budget after redistribution and the tier cap.
    pub budget: f64,
    /// Sum of capped allocations.
    pub allocated: f64,
    /// Number of strategies clamped by the pool cap.
    pub capped: usize,
    pub status: TierStatus,
}

/// A run that produced at least one allocation.
#[derive(Clone, Debug, PartialEq)]
pub struct AllocationSummary {
    pub global_limit: f64,
    /// Sorted descending by `weight_pct`.
    pub records: Vec<AllocationRecord>,
    /// One entry per present tier, ascending tier order.
    pub tiers: Vec<TierReport>,
    pub rejected: Vec<RejectedStrategy>,
}

impl AllocationSummary {
    pub fn total_allocated(&self) -> f64 {
        self.records.iter().map(|r| r.allocation).sum()
    }

    /// Capital left over because of tier/pool caps. Never redistributed.
    pub fn unallocated(&self) -> f64 {
        (self.global_limit - self.total_allocated()).max(0.0)
    }

    /// True when any tier fell back to uniform weights or faulted.
    pub fn is_degraded(&self) -> bool {
        self.tiers
            .iter()
            .any(|t| !matches!(t.status, TierStatus::Optimized { .. }))
    }
}

/// Result of one engine pass.
#[derive(Clone, Debug, PartialEq)]
pub enum AllocationOutcome {
    Allocated(AllocationSummary),
    /// No tier produced any allocation (no input, or every strategy rejected
    /// or faulted). Distinct from an empty success; the caller decides.
    NothingToAllocate {
        tiers: Vec<TierReport>,
        rejected: Vec<RejectedStrategy>,
    },
}

impl AllocationOutcome {
    pub fn records(&self) -> &[AllocationRecord] {
        match self {
            AllocationOutcome::Allocated(s) => &s.records,
            AllocationOutcome::NothingToAllocate { .. } => &[],
        }
    }

    pub fn rejected(&self) -> &[RejectedStrategy] {
        match self {
            AllocationOutcome::Allocated(s) => &s.rejected,
            AllocationOutcome::NothingToAllocate { rejected, .. } => rejected,
        }
    }

    pub fn tiers(&self) -> &[TierReport] {
        match self {
            AllocationOutcome::Allocated(s) => &s.tiers,
            AllocationOutcome::NothingToAllocate { tiers, .. } => tiers,
        }
    }

    pub fn summary(&self) -> Option<&AllocationSummary> {
        match self {
            AllocationOutcome::Allocated(s) => Some(s),
            AllocationOutcome::NothingToAllocate { .. } => None,
        }
    }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Tier-based risk-parity allocation engine.
pub struct AllocationEngine<S = DampedNewton> {
    config: AllocationConfig,
    solver: S,
}

impl AllocationEngine<DampedNewton> {
    /// Engine using the solver settings carried in `config`.
    pub fn new(config: AllocationConfig) -> Result<Self, AllocationError> {
        let solver = config.solver.clone();
        Self::with_solver(config, solver)
    }
}

impl<S: ConstrainedMinimizer> AllocationEngine<S> {
    pub fn with_solver(config: AllocationConfig, solver: S) -> Result<Self, AllocationError> {
        config
            .validate()
            .map_err(|e| AllocationError::InvalidConfig {
                reason: format!("{e:#}"),
            })?;
        Ok(Self { config, solver })
    }

    pub fn config(&self) -> &AllocationConfig {
        &self.config
    }

    /// Run one allocation pass over an input snapshot.
    pub fn allocate(&self, strategies: &[StrategyRecord]) -> AllocationOutcome {
        info!(
            strategies = strategies.len(),
            global_limit = self.config.global_limit,
            "allocation pass started"
        );

        // ── 1. Screen ratings ────────────────────────────────────────────────
        let mut rejected: Vec<RejectedStrategy> = Vec::new();
        let mut by_tier: BTreeMap<Tier, Vec<&StrategyRecord>> = BTreeMap::new();

        for (i, s) in strategies.iter().enumerate() {
            match check_rating(i, s.rating) {
                Ok(()) => by_tier.entry(s.tier).or_default().push(s),
                Err(reason) => {
                    warn!(
                        strategy = %s.label,
                        tier = %s.tier,
                        %reason,
                        "strategy rejected"
                    );
                    rejected.push(RejectedStrategy {
                        strategy: s.label.clone(),
                        protocol: s.protocol.clone(),
                        tier: s.tier,
                        rating: s.rating,
                        reason,
                    });
                }
            }
        }

        // ── 2-3. Rating sums + redistribution ────────────────────────────────
        let rating_sums: BTreeMap<Tier, f64> = by_tier
            .iter()
            .map(|(t, members)| (*t, members.iter().map(|s| s.rating).sum()))
            .collect();
        let budgets = redistribute_tier_budgets(&self.config, &rating_sums);

        // ── 4. Independent per-tier work ─────────────────────────────────────
        let groups: Vec<(Tier, Vec<&StrategyRecord>)> = by_tier.into_iter().collect();
        let results: Vec<(TierReport, Vec<AllocationRecord>)> = groups
            .par_iter()
            .map(|(tier, members)| {
                let budget = budgets.get(tier).copied().unwrap_or(0.0);
                self.run_tier(*tier, members, budget)
            })
            .collect();

        let (tiers, per_tier): (Vec<TierReport>, Vec<Vec<AllocationRecord>>) =
            results.into_iter().unzip();

        // ── 5. Merge ─────────────────────────────────────────────────────────
        let records = aggregate(per_tier);

        if records.is_empty() {
            warn!(rejected = rejected.len(), "no allocation computed");
            return AllocationOutcome::NothingToAllocate { tiers, rejected };
        }

        let summary = AllocationSummary {
            global_limit: self.config.global_limit,
            records,
            tiers,
            rejected,
        };
        info!(
            records = summary.records.len(),
            rejected = summary.rejected.len(),
            allocated = summary.total_allocated(),
            unallocated = summary.unallocated(),
            "allocation pass finished"
        );
        AllocationOutcome::Allocated(summary)
    }

    fn run_tier(
        &self,
        tier: Tier,
        members: &[&StrategyRecord],
        budget: f64,
    ) -> (TierReport, Vec<AllocationRecord>) {
        let ratings: Vec<f64> = members.iter().map(|s| s.rating).collect();

        let model = match RiskModel::from_ratings(&ratings) {
            Ok(m) => m,
            Err(error) => {
                warn!(%tier, %error, "tier faulted; skipping");
                let report = TierReport {
                    tier,
                    strategies: members.len(),
                    budget,
                    allocated: 0.0,
                    capped: 0,
                    status: TierStatus::Faulted { error },
                };
                return (report, Vec::new());
            }
        };

        let weights = optimize_tier(&model, budget, &self.solver);
        let records = cap_tier(tier, members, &weights.dollars, &self.config);

        let capped = weights
            .dollars
            .iter()
            .zip(&records)
            .filter(|(raw, r)| r.allocation < **raw)
            .count();
        let status = match weights.status {
            OptimizationStatus::Converged { iterations } => TierStatus::Optimized { iterations },
            OptimizationStatus::UniformFallback { error } => TierStatus::UniformFallback { error },
        };
        let report = TierReport {
            tier,
            strategies: members.len(),
            budget,
            allocated: records.iter().map(|r| r.allocation).sum(),
            capped,
            status,
        };
        (report, records)
    }
}

/// One-shot helper: validate `config`, build an engine, run it.
pub fn allocate(
    strategies: &[StrategyRecord],
    config: &AllocationConfig,
) -> Result<AllocationOutcome, AllocationError> {
    Ok(AllocationEngine::new(config.clone())?.allocate(strategies))
}
