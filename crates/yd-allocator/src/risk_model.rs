//! yd-allocator: per-tier risk model
//!
//! Σ is diagonal with Σ_ii = 1 / rating_i (no cross-strategy correlation is
//! modelled), divided by its Frobenius norm so tiers of different sizes land
//! on the same scale.

use nalgebra::{DMatrix, DVector};

/// Why a tier's risk model could not be built.
#[derive(Clone, Debug, PartialEq)]
pub enum RiskModelError {
    /// The tier has no strategies.
    Empty,
    /// A rating is zero or negative; inverting it would yield inf or a negative risk.
    NonPositiveRating { index: usize, rating: f64 },
    /// A rating is NaN or infinite.
    NonFiniteRating { index: usize },
}

impl std::fmt::Display for RiskModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "risk model needs at least one rating"),
            Self::NonPositiveRating { index, rating } => {
                write!(f, "rating #{index} must be > 0 (got {rating})")
            }
            Self::NonFiniteRating { index } => write!(f, "rating #{index} is NaN or infinite"),
        }
    }
}

impl std::error::Error for RiskModelError {}

/// Check a single rating. Shared with the engine's per-strategy screen.
pub fn check_rating(index: usize, rating: f64) -> Result<(), RiskModelError> {
    if !rating.is_finite() {
        return Err(RiskModelError::NonFiniteRating { index });
    }
    if rating <= 0.0 {
        return Err(RiskModelError::NonPositiveRating { index, rating });
    }
    Ok(())
}

/// Normalized diagonal risk matrix for one tier.
#[derive(Clone, Debug, PartialEq)]
pub struct RiskModel {
    sigma: DMatrix<f64>,
}

impl RiskModel {
    /// Build Σ from ratings given in strategy order.
    pub fn from_ratings(ratings: &[f64]) -> Result<Self, RiskModelError> {
        if ratings.is_empty() {
            return Err(RiskModelError::Empty);
        }
        for (i, r) in ratings.iter().enumerate() {
            check_rating(i, *r)?;
        }

        let inverted = DVector::from_iterator(ratings.len(), ratings.iter().map(|r| 1.0 / r));
        let sigma = DMatrix::from_diagonal(&inverted);
        let norm = sigma.norm();

        Ok(Self {
            sigma: sigma / norm,
        })
    }

    pub fn dim(&self) -> usize {
        self.sigma.nrows()
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.sigma
    }

    /// Diagonal entries Σ_ii.
    pub fn variances(&self) -> Vec<f64> {
        self.sigma.diagonal().iter().copied().collect()
    }

    /// Portfolio risk wᵀΣw.
    pub fn portfolio_risk(&self, w: &DVector<f64>) -> f64 {
        w.dot(&(&self.sigma * w))
    }

    /// Marginal risk Σw.
    pub fn marginal(&self, w: &DVector<f64>) -> DVector<f64> {
        &self.sigma * w
    }
}
