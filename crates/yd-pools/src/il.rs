//! Impermanent loss for a two-token LP position.
//!
//! Prices are supplied by the caller (quote currency, e.g. USD). Result is in
//! the same quote currency; negative means a loss versus holding.
//!
//! ```text
//! il = (q2_after - q2_before - (q1_before - q1_after) * p1 / p2) * p2 + fee
//! ```

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IlInputs {
    pub token1_qty_before: f64,
    pub token1_qty_after: f64,
    pub token2_qty_before: f64,
    pub token2_qty_after: f64,
    /// Current price of token 1.
    pub price1: f64,
    /// Current price of token 2.
    pub price2: f64,
    /// Fees earned over the holding period, in quote currency.
    pub fee: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IlError {
    NonPositivePrice { token: u8, price: f64 },
    NonFiniteInput { field: &'static str },
}

impl fmt::Display for IlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IlError::NonPositivePrice { token, price } => {
                write!(f, "price of token {token} must be > 0 (got {price})")
            }
            IlError::NonFiniteInput { field } => write!(f, "{field} is NaN or infinite"),
        }
    }
}

impl std::error::Error for IlError {}

pub fn impermanent_loss(x: &IlInputs) -> Result<f64, IlError> {
    for (field, v) in [
        ("token1_qty_before", x.token1_qty_before),
        ("token1_qty_after", x.token1_qty_after),
        ("token2_qty_before", x.token2_qty_before),
        ("token2_qty_after", x.token2_qty_after),
        ("price1", x.price1),
        ("price2", x.price2),
        ("fee", x.fee),
    ] {
        if !v.is_finite() {
            return Err(IlError::NonFiniteInput { field });
        }
    }
    if x.price1 <= 0.0 {
        return Err(IlError::NonPositivePrice {
            token: 1,
            price: x.price1,
        });
    }
    if x.price2 <= 0.0 {
        return Err(IlError::NonPositivePrice {
            token: 2,
            price: x.price2,
        });
    }

    let token2_delta = x.token2_qty_after - x.token2_qty_before;
    let token1_given_up_in_token2 = (x.token1_qty_before - x.token1_qty_after) * x.price1 / x.price2;
    Ok((token2_delta - token1_given_up_in_token2) * x.price2 + x.fee)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> IlInputs {
        IlInputs {
            token1_qty_before: 1.0,
            token1_qty_after: 0.8,
            token2_qty_before: 2000.0,
            token2_qty_after: 2380.0,
            price1: 2000.0,
            price2: 1.0,
            fee: 5.0,
        }
    }

    #[test]
    fn untouched_position_reports_only_fees() {
        let x = IlInputs {
            token1_qty_after: 1.0,
            token2_qty_after: 2000.0,
            ..inputs()
        };
        assert_eq!(impermanent_loss(&x).unwrap(), 5.0);
    }

    #[test]
    fn rebalance_below_market_is_a_loss() {
        // Gave up 0.2 token1 (worth 400) for 380 token2: -20 + 5 fee.
        let il = impermanent_loss(&inputs()).unwrap();
        assert!((il - (-15.0)).abs() < 1e-9, "il={il}");
    }

    #[test]
    fn quote_scaling_applies_price2() {
        let x = IlInputs {
            price1: 4000.0,
            price2: 2.0,
            ..inputs()
        };
        // Same ratio, token2 worth 2: (380 - 400) * 2 + 5
        assert!((impermanent_loss(&x).unwrap() - (-35.0)).abs() < 1e-9);
    }

    #[test]
    fn bad_prices_rejected() {
        let x = IlInputs {
            price2: 0.0,
            ..inputs()
        };
        assert_eq!(
            impermanent_loss(&x),
            Err(IlError::NonPositivePrice {
                token: 2,
                price: 0.0
            })
        );
        let x = IlInputs {
            fee: f64::NAN,
            ..inputs()
        };
        assert_eq!(
            impermanent_loss(&x),
            Err(IlError::NonFiniteInput { field: "fee" })
        );
    }
}
