//! Single-tier risk parity
//!
//! GREEN when:
//! - A lone tier-1 pair with ratings 1 and 4 receives the full global limit
//!   split 1:2 (sqrt of the rating ratio).
//! - weight_pct is expressed against the global limit.
//! - Output is sorted descending by weight.

use yd_allocator::{allocate, AllocationConfig, AllocationOutcome, StrategyRecord, Tier, TierStatus};

#[test]
fn two_strategy_tier_splits_by_sqrt_rating() {
    let input = vec![
        StrategyRecord::new("A (Base)", "aave", Tier::One, 1.0),
        StrategyRecord::new("B (Base)", "aave", Tier::One, 4.0),
    ];
    let out = allocate(&input, &AllocationConfig::standard(200_000.0)).unwrap();

    let summary = match out {
        AllocationOutcome::Allocated(s) => s,
        other => panic!("expected allocation, got {other:?}"),
    };

    assert_eq!(summary.records.len(), 2);
    // Largest first.
    assert_eq!(summary.records[0].strategy, "B (Base)");
    assert_eq!(summary.records[1].strategy, "A (Base)");

    let b = &summary.records[0];
    let a = &summary.records[1];
    assert!((b.allocation - 133_333.333_333).abs() < 0.01, "B={}", b.allocation);
    assert!((a.allocation - 66_666.666_667).abs() < 0.01, "A={}", a.allocation);
    assert!((b.weight_pct - 66.666_667).abs() < 1e-4);
    assert!((a.weight_pct - 33.333_333).abs() < 1e-4);

    assert!((summary.total_allocated() - 200_000.0).abs() < 1e-6);
    assert!(summary.unallocated() < 1e-6);

    assert_eq!(summary.tiers.len(), 1);
    assert!(matches!(summary.tiers[0].status, TierStatus::Optimized { .. }));
}

#[test]
fn single_strategy_is_limited_by_pool_cap() {
    let input = vec![StrategyRecord::new("USDC (Base)", "aave", Tier::One, 3.0)];
    let out = allocate(&input, &AllocationConfig::standard(200_000.0)).unwrap();
    let summary = out.summary().unwrap();

    // Whole budget lands on tier 1, the single strategy is capped at 80%.
    assert_eq!(summary.records[0].allocation, 160_000.0);
    assert!((summary.records[0].weight_pct - 80.0).abs() < 1e-9);
    assert_eq!(summary.tiers[0].capped, 1);
    assert!((summary.unallocated() - 40_000.0).abs() < 1e-6);
}

#[test]
fn roi_passes_through_untouched() {
    let input = vec![
        StrategyRecord::new("X (Eth)", "curve", Tier::Two, 2.0).with_roi(7.25),
        StrategyRecord::new("Y (Eth)", "curve", Tier::Two, 2.0),
    ];
    let out = allocate(&input, &AllocationConfig::default()).unwrap();
    let rois: Vec<Option<f64>> = out.records().iter().map(|r| r.roi).collect();
    assert!(rois.contains(&Some(7.25)));
    assert!(rois.contains(&None));
}
