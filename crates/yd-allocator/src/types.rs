use serde::{Deserialize, Serialize};

/// Risk bucket a strategy is classified into. `One` is the lowest-risk tier,
/// `Four` the riskiest and most diluted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Tier {
    One,
    Two,
    Three,
    Four,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::One, Tier::Two, Tier::Three, Tier::Four];

    /// Tier assigned when the input carries no usable tier.
    pub const FALLBACK: Tier = Tier::Four;

    pub fn number(self) -> u8 {
        match self {
            Tier::One => 1,
            Tier::Two => 2,
            Tier::Three => 3,
            Tier::Four => 4,
        }
    }

    pub fn from_number(n: i64) -> Option<Tier> {
        match n {
            1 => Some(Tier::One),
            2 => Some(Tier::Two),
            3 => Some(Tier::Three),
            4 => Some(Tier::Four),
            _ => None,
        }
    }

    /// Config key for this tier (`tier_1` .. `tier_4`).
    pub fn config_key(self) -> &'static str {
        match self {
            Tier::One => "tier_1",
            Tier::Two => "tier_2",
            Tier::Three => "tier_3",
            Tier::Four => "tier_4",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.number())
    }
}

impl From<Tier> for u8 {
    fn from(t: Tier) -> u8 {
        t.number()
    }
}

impl TryFrom<u8> for Tier {
    type Error = String;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        Tier::from_number(i64::from(n)).ok_or_else(|| format!("tier out of range 1..=4: {n}"))
    }
}

/// One candidate yield strategy, already typed and defaulted by the loader.
///
/// Immutable for the duration of an allocation pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StrategyRecord {
    /// Display label, e.g. `USDC/ETH (Arbitrum)` or `USDC (Base)`.
    pub label: String,
    pub protocol: String,
    pub tier: Tier,
    /// Quality rating. Higher means more capital under risk parity.
    pub rating: f64,
    /// Pass-through; not used by the optimizer.
    pub roi: Option<f64>,
}

impl StrategyRecord {
    pub fn new<L, P>(label: L, protocol: P, tier: Tier, rating: f64) -> Self
    where
        L: Into<String>,
        P: Into<String>,
    {
        Self {
            label: label.into(),
            protocol: protocol.into(),
            tier,
            rating,
            roi: None,
        }
    }

    pub fn with_roi(mut self, roi: f64) -> Self {
        self.roi = Some(roi);
        self
    }
}

/// Build the display label for a pool: `T1/T2 (CHAIN)`, collapsing to
/// `T1 (CHAIN)` when both token symbols are equal.
pub fn strategy_label(token1: &str, token2: &str, chain: &str) -> String {
    if token1 == token2 {
        format!("{token1} ({chain})")
    } else {
        format!("{token1}/{token2} ({chain})")
    }
}

/// Final per-strategy output of one run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AllocationRecord {
    pub strategy: String,
    pub protocol: String,
    pub tier: Tier,
    pub roi: Option<f64>,
    /// Dollar amount after the per-strategy cap.
    pub allocation: f64,
    /// `100 * allocation / global_limit`.
    pub weight_pct: f64,
}
