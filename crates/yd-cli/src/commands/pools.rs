//! Pool-data command handlers: `yd rate` and `yd show`.

use std::path::Path;

use anyhow::{Context, Result};
use yd_config::ConfigMode;
use yd_pools::{RatingSettings, TokenTiers};

use super::{load_config, opt_num};

pub struct RateArgs {
    pub pools: String,
    pub tokens: String,
    pub out: String,
    pub config_paths: Vec<String>,
    pub tvl: Option<String>,
    pub strict_config: bool,
}

/// Execute `yd rate`: fill `strategy_rating` and write the enriched pools CSV.
pub fn rate(args: RateArgs) -> Result<()> {
    let loaded = load_config(&args.config_paths, ConfigMode::Rate, args.strict_config)?;
    let settings = RatingSettings::from_config_json(&loaded.config_json)?;

    let mut pools = yd_pools::parse_pools_csv_file(Path::new(&args.pools))
        .with_context(|| format!("load pools: {}", args.pools))?;
    let token_rows = yd_pools::parse_token_tiers_csv_file(Path::new(&args.tokens))
        .with_context(|| format!("load token tiers: {}", args.tokens))?;
    let tiers = TokenTiers::from_rows(&token_rows);

    if let Some(tvl) = &args.tvl {
        let history = yd_pools::parse_tvl_history_csv_file(Path::new(tvl))
            .with_context(|| format!("load tvl history: {}", tvl))?;
        let updated = yd_pools::apply_tvl_history(&mut pools, &history);
        println!("tvl_points={} pools_rerated={}", history.len(), updated);
    }

    let pass = yd_pools::rate_pools(&pools, &tiers, &settings);
    yd_pools::write_pools_csv(Path::new(&args.out), &pass.pools)?;

    println!(
        "rated={} skipped={} token_tiers={} scale={}",
        pass.rated,
        pass.skipped.len(),
        tiers.len(),
        settings.scale
    );
    for (i, reason) in &pass.skipped {
        println!("skip row={} reason={}", i, reason);
    }
    println!("out_path={}", args.out);
    Ok(())
}

/// Execute `yd show`: one line per row of an allocation summary.
pub fn show(summary_path: &str) -> Result<()> {
    let rows = yd_artifacts::read_allocation_summary(Path::new(summary_path))?;
    let total: f64 = rows.iter().map(|r| r.allocation).sum();

    println!("rows={} total_allocated={:.2}", rows.len(), total);
    for r in &rows {
        println!(
            "strategy=\"{}\" protocol={} roi={} allocation={:.2} weight_pct={:.4}",
            r.strategy,
            r.protocol,
            opt_num(r.roi),
            r.allocation,
            r.weight_pct
        );
    }
    Ok(())
}
