//! yd-allocator
//!
//! Tiered risk-parity capital allocation.
//!
//! Responsibilities:
//! - Tier budget redistribution (missing tiers hand their budget to present ones)
//! - Per-tier diagonal risk model from strategy ratings
//! - Risk-parity weight optimization under a box + budget constraint
//! - Pool caps, aggregation into one ranked allocation table, cap verification
//!
//! Pure: no IO, no clock, no randomness. Identical inputs give identical output.

mod capper;
mod config;
mod engine;
mod optimizer;
mod redistribute;
mod risk_model;
mod solver;
mod types;

pub use capper::{aggregate, cap_tier, check_caps, CapViolation};
pub use config::{AllocationConfig, TierLimits, DEFAULT_GLOBAL_LIMIT};
pub use engine::{
    allocate, AllocationEngine, AllocationError, AllocationOutcome, AllocationSummary,
    RejectedStrategy, TierReport, TierStatus,
};
pub use optimizer::{
    closed_form_fractions, optimize_tier, uniform_weights, OptimizationStatus,
    RiskParityObjective, TierWeights,
};
pub use redistribute::redistribute_tier_budgets;
pub use risk_model::{check_rating, RiskModel, RiskModelError};
pub use solver::{
    Bound, BoundedProblem, ConstrainedMinimizer, DampedNewton, Objective, Solution,
    SolverError,
};
pub use types::{strategy_label, AllocationRecord, StrategyRecord, Tier};
