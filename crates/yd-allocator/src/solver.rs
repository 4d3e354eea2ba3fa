//! yd-allocator: constrained minimizer capability
//!
//! The engine only needs `minimize(objective, initial guess, sum(w) = target,
//! bounds) -> w`. Anything that can honour that contract can sit behind
//! [`ConstrainedMinimizer`]; the engine never names a concrete solver.
//!
//! [`DampedNewton`] is the shipped implementation: Levenberg-damped Newton
//! steps on the affine slice `Σw = target`, kept strictly inside the box by a
//! fraction-to-boundary rule, with Armijo backtracking.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Smooth scalar function of a weight vector.
pub trait Objective: Sync {
    fn value(&self, w: &[f64]) -> f64;

    /// Gradient of [`Objective::value`]. Defaults to central differences.
    fn gradient(&self, w: &[f64]) -> Vec<f64> {
        let mut shifted = w.to_vec();
        (0..w.len())
            .map(|i| {
                let h = 1e-7 * w[i].abs().max(1.0);
                shifted[i] = w[i] + h;
                let up = self.value(&shifted);
                shifted[i] = w[i] - h;
                let down = self.value(&shifted);
                shifted[i] = w[i];
                (up - down) / (2.0 * h)
            })
            .collect()
    }

    /// Symmetric curvature model used for Newton steps.
    ///
    /// Defaults to central differences of [`Objective::gradient`]. Any
    /// positive semi-definite approximation works; the solver damps it.
    fn hessian(&self, w: &[f64]) -> DMatrix<f64> {
        let n = w.len();
        let mut h = DMatrix::<f64>::zeros(n, n);
        let mut shifted = w.to_vec();
        for j in 0..n {
            let step = 1e-6 * w[j].abs().max(1e-6);
            shifted[j] = w[j] + step;
            let up = self.gradient(&shifted);
            shifted[j] = w[j] - step;
            let down = self.gradient(&shifted);
            shifted[j] = w[j];
            for i in 0..n {
                h[(i, j)] = (up[i] - down[i]) / (2.0 * step);
            }
        }
        (&h + h.transpose()) * 0.5
    }
}

/// Closed interval for one coordinate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bound {
    pub lo: f64,
    pub hi: f64,
}

impl Bound {
    pub const UNIT: Bound = Bound { lo: 0.0, hi: 1.0 };

    fn clamp(&self, x: f64) -> f64 {
        x.max(self.lo).min(self.hi)
    }
}

/// One minimization problem: objective, start point, `Σw = sum_target`, bounds.
pub struct BoundedProblem<'a> {
    pub objective: &'a dyn Objective,
    pub initial: Vec<f64>,
    pub sum_target: f64,
    pub bounds: Vec<Bound>,
}

impl<'a> BoundedProblem<'a> {
    /// Budget-fraction problem: `Σw = 1`, every `w_i ∈ [0, 1]`.
    pub fn simplex(objective: &'a dyn Objective, initial: Vec<f64>) -> Self {
        let n = initial.len();
        Self {
            objective,
            initial,
            sum_target: 1.0,
            bounds: vec![Bound::UNIT; n],
        }
    }

    pub fn dim(&self) -> usize {
        self.initial.len()
    }
}

/// Successful minimization result.
#[derive(Clone, Debug, PartialEq)]
pub struct Solution {
    pub x: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
}

/// Why a minimization did not produce a usable optimum.
#[derive(Clone, Debug, PartialEq)]
pub enum SolverError {
    /// Initial guess and bounds disagree in length, or the problem is empty.
    DimensionMismatch { initial: usize, bounds: usize },
    /// No point satisfies both the sum constraint and the bounds.
    Infeasible { sum_target: f64 },
    /// Objective is NaN/inf at the start point.
    NonFiniteObjective,
    /// Iteration budget exhausted before the stationarity test passed.
    NotConverged { iterations: usize, residual: f64 },
    /// Backtracking could not find a decreasing step.
    LineSearchFailed { iterations: usize, residual: f64 },
}

impl std::fmt::Display for SolverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DimensionMismatch { initial, bounds } => write!(
                f,
                "dimension mismatch: initial guess has {initial} entries, bounds {bounds}"
            ),
            Self::Infeasible { sum_target } => {
                write!(f, "bounds cannot satisfy sum(w) = {sum_target}")
            }
            Self::NonFiniteObjective => write!(f, "objective is not finite at the start point"),
            Self::NotConverged {
                iterations,
                residual,
            } => write!(
                f,
                "did not converge after {iterations} iterations (residual {residual:.3e})"
            ),
            Self::LineSearchFailed {
                iterations,
                residual,
            } => write!(
                f,
                "line search failed at iteration {iterations} (residual {residual:.3e})"
            ),
        }
    }
}

impl std::error::Error for SolverError {}

/// Narrow capability the engine depends on.
pub trait ConstrainedMinimizer: Send + Sync {
    fn minimize(&self, problem: &BoundedProblem<'_>) -> Result<Solution, SolverError>;
}

const ARMIJO_C: f64 = 1e-4;
const MIN_STEP: f64 = 1e-16;
const PROJECTION_ROUNDS: usize = 200;
const FEASIBILITY_SLACK: f64 = 1e-12;
/// Share of the distance to the nearest bound a single step may cover.
const BOUNDARY_FRACTION: f64 = 0.9;
const DAMPING_ROUNDS: usize = 60;
const DAMPING_FLOOR: f64 = 1e-12;

/// Damped Newton with an equality-constrained step and interior line search.
///
/// Each iteration solves
///
/// ```text
/// [ H + λI  1 ] [p]   [-∇f]
/// [ 1ᵀ      0 ] [ν] = [ 0 ]
/// ```
///
/// over the coordinates free to move, raising λ until `p` is a descent
/// direction. The step length is capped so no coordinate crosses
/// [`BOUNDARY_FRACTION`] of its distance to a bound, then backtracked.
/// When no damped step descends, the projected-gradient direction is used.
///
/// Stops when the unit-step projected gradient `‖P(w - ∇f) - w‖` falls below
/// `tolerance * sqrt(n)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DampedNewton {
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for DampedNewton {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            tolerance: 1e-10,
        }
    }
}

impl DampedNewton {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_iterations == 0 {
            anyhow::bail!("allocation.solver.max_iterations must be > 0");
        }
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            anyhow::bail!(
                "allocation.solver.tolerance must be > 0 (got {})",
                self.tolerance
            );
        }
        Ok(())
    }
}

impl ConstrainedMinimizer for DampedNewton {
    fn minimize(&self, problem: &BoundedProblem<'_>) -> Result<Solution, SolverError> {
        let n = problem.dim();
        if n == 0 || problem.bounds.len() != n {
            return Err(SolverError::DimensionMismatch {
                initial: n,
                bounds: problem.bounds.len(),
            });
        }

        let lo_sum: f64 = problem.bounds.iter().map(|b| b.lo).sum();
        let hi_sum: f64 = problem.bounds.iter().map(|b| b.hi).sum();
        if problem.sum_target < lo_sum - FEASIBILITY_SLACK
            || problem.sum_target > hi_sum + FEASIBILITY_SLACK
        {
            return Err(SolverError::Infeasible {
                sum_target: problem.sum_target,
            });
        }

        let objective = problem.objective;
        let mut x = if is_feasible(&problem.initial, problem) {
            problem.initial.clone()
        } else {
            project(&problem.initial, problem)
        };
        let mut fx = objective.value(&x);
        if !fx.is_finite() {
            return Err(SolverError::NonFiniteObjective);
        }

        let scale = (n as f64).sqrt();
        let threshold = self.tolerance * scale;
        let mut damping = 0.0;
        let mut residual = f64::INFINITY;

        for iteration in 0..self.max_iterations {
            let g = objective.gradient(&x);

            let unit = project(&axpy(&x, -1.0, &g), problem);
            residual = distance(&unit, &x);
            if residual < threshold {
                return Ok(Solution {
                    x,
                    value: fx,
                    iterations: iteration,
                });
            }

            let hessian = objective.hessian(&x);
            let (direction, used, max_step) =
                match newton_direction(&hessian, &g, &x, &problem.bounds, damping) {
                    Some((p, used)) => {
                        let cap = max_interior_step(&x, &p, &problem.bounds);
                        (p, used, cap)
                    }
                    // The segment to a projected point stays feasible.
                    None => (axpy(&unit, -1.0, &x), damping, 1.0),
                };
            let slope = dot(&g, &direction);

            let mut step = max_step;
            let accepted = loop {
                if step < MIN_STEP {
                    break None;
                }
                let cand = axpy(&x, step, &direction);
                let fc = objective.value(&cand);
                if fc.is_finite() && fc <= fx + ARMIJO_C * step * slope {
                    break Some((cand, fc));
                }
                step *= 0.5;
            };

            match accepted {
                Some((cand, fc)) => {
                    x = cand;
                    fx = fc;
                    damping = if step >= max_step { used / 4.0 } else { used * 4.0 };
                }
                // No decrease is representable any more; a near-stationary
                // iterate is still the answer.
                None if residual < self.tolerance.sqrt() * scale => {
                    return Ok(Solution {
                        x,
                        value: fx,
                        iterations: iteration,
                    });
                }
                None => {
                    return Err(SolverError::LineSearchFailed {
                        iterations: iteration,
                        residual,
                    });
                }
            }
        }

        Err(SolverError::NotConverged {
            iterations: self.max_iterations,
            residual,
        })
    }
}

/// Damped Newton step over the coordinates allowed to move.
///
/// Interior coordinates always move. A coordinate sitting on a bound moves
/// only when its gradient points inward relative to the sum multiplier
/// estimate, and is pinned again if the step would push it outward.
fn newton_direction(
    hessian: &DMatrix<f64>,
    g: &[f64],
    x: &[f64],
    bounds: &[Bound],
    damping: f64,
) -> Option<(Vec<f64>, f64)> {
    let n = x.len();
    let interior: Vec<usize> = (0..n)
        .filter(|&i| x[i] > bounds[i].lo && x[i] < bounds[i].hi)
        .collect();
    let multiplier = if interior.is_empty() {
        g.iter().sum::<f64>() / n as f64
    } else {
        interior.iter().map(|&i| g[i]).sum::<f64>() / interior.len() as f64
    };

    let mut free: Vec<usize> = (0..n)
        .filter(|&i| {
            let b = &bounds[i];
            (x[i] > b.lo && x[i] < b.hi)
                || (x[i] <= b.lo && g[i] < multiplier)
                || (x[i] >= b.hi && g[i] > multiplier)
        })
        .collect();

    while free.len() >= 2 {
        let (p, lambda) = damped_step(hessian, g, &free, n, damping)?;
        let before = free.len();
        free.retain(|&i| {
            let b = &bounds[i];
            !((x[i] <= b.lo && p[i] < 0.0) || (x[i] >= b.hi && p[i] > 0.0))
        });
        if free.len() == before {
            return Some((p, lambda));
        }
    }
    None
}

/// Solves the damped KKT system on `free`, with `Σp = 0`, raising λ until
/// the step descends. `None` when the free gradient is already level or no
/// damping works.
fn damped_step(
    hessian: &DMatrix<f64>,
    g: &[f64],
    free: &[usize],
    n: usize,
    damping: f64,
) -> Option<(Vec<f64>, f64)> {
    let m = free.len();
    let mean = free.iter().map(|&i| g[i]).sum::<f64>() / m as f64;
    if free.iter().all(|&i| g[i] == mean) {
        return None;
    }

    let hessian_free = DMatrix::from_fn(m, m, |a, b| hessian[(free[a], free[b])]);
    let g_free = DVector::from_fn(m, |a, _| g[free[a]]);
    let scale = hessian.amax();
    let floor = DAMPING_FLOOR * if scale > 0.0 { scale } else { 1.0 };

    let mut rhs = DVector::<f64>::zeros(m + 1);
    rhs.rows_mut(0, m).copy_from(&(-&g_free));

    let mut lambda = damping;
    for _ in 0..DAMPING_ROUNDS {
        let damped = &hessian_free + DMatrix::identity(m, m) * lambda;
        let mut kkt = DMatrix::<f64>::zeros(m + 1, m + 1);
        kkt.view_mut((0, 0), (m, m)).copy_from(&damped);
        kkt.view_mut((0, m), (m, 1)).fill(1.0);
        kkt.view_mut((m, 0), (1, m)).fill(1.0);

        if let Some(sol) = kkt.lu().solve(&rhs) {
            let p = sol.rows(0, m).into_owned();
            let curvature = p.dot(&(&damped * &p));
            let slope = g_free.dot(&p);
            if p.iter().all(|v| v.is_finite()) && curvature > 0.0 && slope < 0.0 {
                let mut full = vec![0.0; n];
                for (a, &i) in free.iter().enumerate() {
                    full[i] = p[a];
                }
                return Some((full, lambda));
            }
        }
        lambda = (4.0 * lambda).max(floor);
    }
    None
}

/// Longest step along `p`, at most 1, that covers no more than
/// [`BOUNDARY_FRACTION`] of any coordinate's distance to its bound.
fn max_interior_step(x: &[f64], p: &[f64], bounds: &[Bound]) -> f64 {
    x.iter()
        .zip(p)
        .zip(bounds)
        .fold(1.0_f64, |cap, ((xi, pi), b)| {
            if *pi < 0.0 {
                cap.min(BOUNDARY_FRACTION * (xi - b.lo) / -pi)
            } else if *pi > 0.0 {
                cap.min(BOUNDARY_FRACTION * (b.hi - xi) / pi)
            } else {
                cap
            }
        })
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(ai, bi)| ai * bi).sum()
}

fn axpy(x: &[f64], a: f64, y: &[f64]) -> Vec<f64> {
    x.iter().zip(y).map(|(xi, yi)| xi + a * yi).collect()
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(ai, bi)| (ai - bi) * (ai - bi))
        .sum::<f64>()
        .sqrt()
}

fn is_feasible(x: &[f64], problem: &BoundedProblem<'_>) -> bool {
    let sum: f64 = x.iter().sum();
    x.len() == problem.bounds.len()
        && x.iter()
            .zip(&problem.bounds)
            .all(|(xi, b)| xi.is_finite() && *xi >= b.lo && *xi <= b.hi)
        && (sum - problem.sum_target).abs() <= FEASIBILITY_SLACK
}

/// Euclidean projection onto `{w : Σw = target, lo ≤ w ≤ hi}`.
///
/// The projection is `w_i = clamp(v_i - θ)` for the θ that hits the target;
/// `Σ clamp(v_i - θ)` is non-increasing in θ, so θ is found by bisection.
fn project(v: &[f64], problem: &BoundedProblem<'_>) -> Vec<f64> {
    let bounds = &problem.bounds;
    let shifted_sum = |theta: f64| -> f64 {
        v.iter()
            .zip(bounds)
            .map(|(vi, b)| b.clamp(vi - theta))
            .sum()
    };

    let mut a = v
        .iter()
        .zip(bounds)
        .map(|(vi, b)| vi - b.hi)
        .fold(f64::INFINITY, f64::min);
    let mut b = v
        .iter()
        .zip(bounds)
        .map(|(vi, bd)| vi - bd.lo)
        .fold(f64::NEG_INFINITY, f64::max);

    for _ in 0..PROJECTION_ROUNDS {
        let mid = 0.5 * (a + b);
        if mid <= a || mid >= b {
            break;
        }
        if shifted_sum(mid) > problem.sum_target {
            a = mid;
        } else {
            b = mid;
        }
    }

    let theta = 0.5 * (a + b);
    v.iter()
        .zip(bounds)
        .map(|(vi, bd)| bd.clamp(vi - theta))
        .collect()
}
