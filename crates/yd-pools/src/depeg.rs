//! Depeg detection over a rolling price window.
//!
//! The caller pushes observations (no live feed here). Per pair, the last
//! `window` prices are kept; the current price is compared to their mean,
//! current price included.

use std::collections::{BTreeMap, VecDeque};

use tracing::{debug, info};

pub const DEFAULT_WINDOW: usize = 100;

/// Deviation at or below this fraction signals a depeg.
pub const DEFAULT_DEPEG_THRESHOLD: f64 = -0.01;

/// Result of pushing one price.
#[derive(Debug, Clone, PartialEq)]
pub struct DepegObservation {
    pub pair: String,
    pub price: f64,
    pub average: f64,
    /// `(price - average) / average`, or 0 when the average is 0.
    pub deviation: f64,
    pub depegged: bool,
}

#[derive(Debug, Clone)]
pub struct DepegDetector {
    window: usize,
    threshold: f64,
    histories: BTreeMap<String, VecDeque<f64>>,
}

impl Default for DepegDetector {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_DEPEG_THRESHOLD)
    }
}

impl DepegDetector {
    /// `window` is clamped to at least 1.
    pub fn new(window: usize, threshold: f64) -> Self {
        Self {
            window: window.max(1),
            threshold,
            histories: BTreeMap::new(),
        }
    }

    pub fn observe(&mut self, pair: &str, price: f64) -> DepegObservation {
        let history = self.histories.entry(pair.to_string()).or_default();
        if history.len() >= self.window {
            history.pop_front();
        }
        history.push_back(price);

        let average = history.iter().sum::<f64>() / history.len() as f64;
        let deviation = if average != 0.0 {
            (price - average) / average
        } else {
            0.0
        };
        let depegged = deviation <= self.threshold;

        if depegged {
            info!(pair, price, average, deviation, "depeg detected");
        } else {
            debug!(pair, price, average, deviation, "price observed");
        }

        DepegObservation {
            pair: pair.to_string(),
            price,
            average,
            deviation,
            depegged,
        }
    }

    /// Drop a pair's history (e.g. after the tracked pair list changes).
    pub fn reset(&mut self, pair: &str) {
        self.histories.remove(pair);
    }

    pub fn history_len(&self, pair: &str) -> usize {
        self.histories.get(pair).map_or(0, VecDeque::len)
    }
}
