//! Allocation artifacts
//!
//! GREEN when:
//! - write_allocation_artifacts creates exports/<run_id>/ with all four files.
//! - allocation_summary.csv carries the published header and reads back
//!   identically (blank roi stays None).
//! - manifest.json records config hash, totals and counts.
//! - rejected.csv lists rejected strategies with their reason.

use std::fs;

use uuid::Uuid;
use yd_allocator::{allocate, AllocationConfig, StrategyRecord, Tier};
use yd_artifacts::{
    read_allocation_summary, read_manifest, summary_rows, write_allocation_artifacts,
    WriteAllocationArtifactsArgs, SCHEMA_VERSION,
};

fn summary() -> yd_allocator::AllocationSummary {
    let input = vec![
        StrategyRecord::new("USDC (Base)", "aave", Tier::One, 1.0).with_roi(3.25),
        StrategyRecord::new("USDC/ETH (Base)", "uniswap", Tier::One, 4.0),
        StrategyRecord::new("DAI (Ethereum)", "maker", Tier::Two, 0.0),
    ];
    allocate(&input, &AllocationConfig::standard(200_000.0))
        .unwrap()
        .summary()
        .cloned()
        .unwrap()
}

#[test]
fn run_directory_contains_all_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let run_id = Uuid::new_v4();
    let summary = summary();

    let out = write_allocation_artifacts(WriteAllocationArtifactsArgs {
        exports_root: dir.path(),
        run_id,
        config_hash: "abc123",
        summary: &summary,
    })
    .unwrap();

    assert_eq!(out.run_dir, dir.path().join(run_id.to_string()));
    for name in [
        "manifest.json",
        "allocation_summary.csv",
        "tiers.json",
        "rejected.csv",
    ] {
        assert!(out.run_dir.join(name).exists(), "missing {name}");
    }

    let csv = fs::read_to_string(&out.summary_path).unwrap();
    assert!(
        csv.starts_with("Strategy,protocol_name,roi,Allocation ($),Weight (%)\n"),
        "unexpected header: {csv}"
    );

    let rows = read_allocation_summary(&out.summary_path).unwrap();
    assert_eq!(rows, summary_rows(&summary));
    assert_eq!(rows[0].strategy, "USDC/ETH (Base)");
    assert_eq!(rows[0].roi, None);
    assert_eq!(rows[1].roi, Some(3.25));

    let manifest = read_manifest(&out.manifest_path).unwrap();
    assert_eq!(manifest.schema_version, SCHEMA_VERSION);
    assert_eq!(manifest.run_id, run_id);
    assert_eq!(manifest.config_hash, "abc123");
    assert_eq!(manifest.record_count, 2);
    assert_eq!(manifest.rejected_count, 1);
    assert!(!manifest.degraded);
    assert!((manifest.total_allocated - 200_000.0).abs() < 1e-6);

    let rejected = fs::read_to_string(out.run_dir.join("rejected.csv")).unwrap();
    let mut lines = rejected.lines();
    assert_eq!(lines.next(), Some("strategy,protocol_name,tier,rating,reason"));
    let line = lines.next().unwrap();
    assert!(line.starts_with("DAI (Ethereum),maker,2,0"), "{line}");
    assert!(line.contains("must be > 0"), "{line}");

    let tiers: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.run_dir.join("tiers.json")).unwrap()).unwrap();
    assert_eq!(tiers[0]["tier"], 1);
    assert_eq!(tiers[0]["status"], "OPTIMIZED");
}

#[test]
fn rejected_csv_is_header_only_when_nothing_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let input = vec![StrategyRecord::new("X (Base)", "aave", Tier::Three, 2.0)];
    let summary = allocate(&input, &AllocationConfig::default())
        .unwrap()
        .summary()
        .cloned()
        .unwrap();
    let out = write_allocation_artifacts(WriteAllocationArtifactsArgs {
        exports_root: dir.path(),
        run_id: Uuid::new_v4(),
        config_hash: "h",
        summary: &summary,
    })
    .unwrap();
    let rejected = fs::read_to_string(out.run_dir.join("rejected.csv")).unwrap();
    assert_eq!(rejected, "strategy,protocol_name,tier,rating,reason\n");
}

#[test]
fn missing_summary_file_errors_with_path() {
    let dir = tempfile::tempdir().unwrap();
    let err = read_allocation_summary(&dir.path().join("absent.csv")).unwrap_err();
    assert!(format!("{err:#}").contains("absent.csv"));
}
