//! yd-allocator: risk-parity weight optimizer
//!
//! Minimizes the variance of fractional risk contributions
//! `c_i = w_i (Σw)_i / (wᵀΣw)` over budget fractions `w` with `Σw = 1`,
//! `w_i ∈ [0, 1]`, starting from uniform weights.
//!
//! For diagonal Σ the optimum is `w_i ∝ 1/sqrt(Σ_ii)`, i.e. `w_i ∝ sqrt(rating_i)`.

use nalgebra::{DMatrix, DVector};
use tracing::{debug, warn};

use crate::risk_model::RiskModel;
use crate::solver::{BoundedProblem, ConstrainedMinimizer, Objective, SolverError};

/// Variance of risk contributions under a fixed risk matrix.
pub struct RiskParityObjective<'a> {
    model: &'a RiskModel,
}

impl<'a> RiskParityObjective<'a> {
    pub fn new(model: &'a RiskModel) -> Self {
        Self { model }
    }

    /// Fractional risk contributions, or `None` when wᵀΣw is not positive.
    pub fn contributions(&self, w: &[f64]) -> Option<Vec<f64>> {
        let w = DVector::from_column_slice(w);
        let total = self.model.portfolio_risk(&w);
        if !(total > 0.0) {
            return None;
        }
        let marginal = self.model.marginal(&w);
        Some(w.component_mul(&marginal).iter().map(|x| x / total).collect())
    }
}

impl Objective for RiskParityObjective<'_> {
    fn value(&self, w: &[f64]) -> f64 {
        match self.contributions(w) {
            Some(c) => population_variance(&c),
            None => f64::INFINITY,
        }
    }

    /// ∂f/∂w = (2/n) [ (e∘m + Σᵀ(e∘w)) / T  -  2 m (e·c) / T ]
    /// with m = Σw, T = wᵀΣw, e = c - mean(c).
    fn gradient(&self, w: &[f64]) -> Vec<f64> {
        let n = w.len() as f64;
        let w = DVector::from_column_slice(w);
        let total = self.model.portfolio_risk(&w);
        if !(total > 0.0) {
            return vec![0.0; w.len()];
        }
        let m = self.model.marginal(&w);
        let c = w.component_mul(&m) / total;
        let mean = c.sum() / n;
        let e = c.map(|ci| ci - mean);
        let ec = e.dot(&c);

        let direct = e.component_mul(&m) + self.model.matrix().tr_mul(&e.component_mul(&w));
        let g = (direct / total - m * (2.0 * ec / total)) * (2.0 / n);
        g.iter().copied().collect()
    }

    /// Gauss-Newton curvature (2/n) JᵀJ with the contribution Jacobian
    /// J = (diag(m) + diag(w)Σ - 2 c mᵀ) / T. Exact wherever all
    /// contributions are equal, which is the optimum.
    fn hessian(&self, w: &[f64]) -> DMatrix<f64> {
        let n = w.len();
        let w = DVector::from_column_slice(w);
        let total = self.model.portfolio_risk(&w);
        if !(total > 0.0) {
            return DMatrix::zeros(n, n);
        }
        let m = self.model.marginal(&w);
        let c = w.component_mul(&m) / total;
        let mut jac = DMatrix::from_diagonal(&m) + DMatrix::from_diagonal(&w) * self.model.matrix()
            - (&c * m.transpose()) * 2.0;
        jac /= total;
        jac.tr_mul(&jac) * (2.0 / n as f64)
    }
}

fn population_variance(xs: &[f64]) -> f64 {
    let n = xs.len() as f64;
    let mean = xs.iter().sum::<f64>() / n;
    xs.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n
}

/// Uniform budget fractions `1/n`.
pub fn uniform_weights(n: usize) -> Vec<f64> {
    vec![1.0 / n as f64; n]
}

/// Closed-form risk-parity fractions for a diagonal model: `sqrt(r_i) / Σ sqrt(r_j)`.
pub fn closed_form_fractions(ratings: &[f64]) -> Vec<f64> {
    let roots: Vec<f64> = ratings.iter().map(|r| r.sqrt()).collect();
    let total: f64 = roots.iter().sum();
    roots.iter().map(|r| r / total).collect()
}

/// How a tier's weights were obtained.
#[derive(Clone, Debug, PartialEq)]
pub enum OptimizationStatus {
    Converged { iterations: usize },
    /// Solver failed; weights are uniform.
    UniformFallback { error: SolverError },
}

/// Dollar weights for one tier.
#[derive(Clone, Debug, PartialEq)]
pub struct TierWeights {
    /// One entry per strategy, in risk-model order; sums to the tier budget.
    pub dollars: Vec<f64>,
    pub status: OptimizationStatus,
}

/// Solve the risk-parity problem for one tier and scale to `budget` dollars.
///
/// Solver failure is not fatal: the tier falls back to uniform weights.
pub fn optimize_tier(
    model: &RiskModel,
    budget: f64,
    solver: &dyn ConstrainedMinimizer,
) -> TierWeights {
    let n = model.dim();
    let initial = uniform_weights(n);
    let objective = RiskParityObjective::new(model);
    let problem = BoundedProblem::simplex(&objective, initial.clone());

    match solver.minimize(&problem) {
        Ok(sol) => {
            debug!(
                strategies = n,
                iterations = sol.iterations,
                objective = sol.value,
                "risk-parity solve converged"
            );
            TierWeights {
                dollars: sol.x.iter().map(|w| w * budget).collect(),
                status: OptimizationStatus::Converged {
                    iterations: sol.iterations,
                },
            }
        }
        Err(error) => {
            warn!(%error, strategies = n, "optimization did not converge; using uniform weights");
            TierWeights {
                dollars: initial.iter().map(|w| w * budget).collect(),
                status: OptimizationStatus::UniformFallback { error },
            }
        }
    }
}
