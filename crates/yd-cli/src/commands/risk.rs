//! `yd il` and `yd depeg`.

use anyhow::{anyhow, bail, Context, Result};
use yd_pools::{impermanent_loss, DepegDetector, IlInputs};

pub fn il(inputs: &IlInputs) -> Result<()> {
    let il = impermanent_loss(inputs).map_err(|e| anyhow!("IL_INPUT_INVALID: {e}"))?;
    println!("impermanent_loss={:.6}", il);
    println!("loss={}", il < 0.0);
    Ok(())
}

/// Replay `prices` through a fresh detector; print every depeg signal.
pub fn depeg(pair: &str, prices: &str, window: usize, threshold: f64) -> Result<()> {
    let series = parse_prices(prices)?;
    let mut detector = DepegDetector::new(window, threshold);

    let mut signals = 0usize;
    for (i, price) in series.iter().enumerate() {
        let o = detector.observe(pair, *price);
        if o.depegged {
            signals += 1;
            println!(
                "depeg index={} pair={} price={} average={:.6} deviation={:.6}",
                i, o.pair, o.price, o.average, o.deviation
            );
        }
    }
    println!("observations={} depeg_signals={}", series.len(), signals);
    Ok(())
}

fn parse_prices(raw: &str) -> Result<Vec<f64>> {
    let mut out = Vec::new();
    for (i, cell) in raw.split(',').enumerate() {
        let cell = cell.trim();
        if cell.is_empty() {
            continue;
        }
        let p: f64 = cell
            .parse()
            .with_context(|| format!("--prices item {} is not a number: '{}'", i, cell))?;
        if !p.is_finite() {
            bail!("--prices item {} is not finite", i);
        }
        out.push(p);
    }
    if out.is_empty() {
        bail!("--prices must contain at least one price");
    }
    Ok(out)
}
