//! `yd allocate`: pools CSV -> engine -> cap check -> exports/<run_id>/.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use serde_json::Value;
use tracing::{error, info};
use uuid::Uuid;
use yd_allocator::{check_caps, AllocationConfig, AllocationEngine, AllocationOutcome};
use yd_artifacts::{write_allocation_artifacts, WriteAllocationArtifactsArgs};
use yd_config::ConfigMode;

use super::load_config;

const DEFAULT_EXPORTS_ROOT: &str = "exports";

pub struct AllocateArgs {
    pub config_paths: Vec<String>,
    pub pools: String,
    pub protocols: Option<String>,
    pub exports_root: Option<String>,
    pub global_limit: Option<f64>,
    pub strict_config: bool,
}

pub fn run(args: AllocateArgs) -> Result<()> {
    let loaded = load_config(&args.config_paths, ConfigMode::Allocate, args.strict_config)?;

    let mut config = AllocationConfig::from_config_json(&loaded.config_json)?;
    if let Some(limit) = args.global_limit {
        config.global_limit = limit;
    }
    let exports_root = resolve_exports_root(args.exports_root.as_deref(), &loaded.config_json);

    let (strategies, stats) = yd_pools::load_strategies(
        Path::new(&args.pools),
        args.protocols.as_deref().map(Path::new),
    )?;
    println!(
        "pools_loaded={} tier_from_protocols={} tier_defaulted={} rating_defaulted={}",
        stats.pools, stats.tier_from_protocols, stats.tier_defaulted, stats.rating_defaulted
    );

    let engine = AllocationEngine::new(config)?;
    let summary = match engine.allocate(&strategies) {
        AllocationOutcome::Allocated(summary) => summary,
        AllocationOutcome::NothingToAllocate { rejected, .. } => {
            println!(
                "allocated=false reason=nothing_to_allocate rejected={}",
                rejected.len()
            );
            return Ok(());
        }
    };

    let violations = check_caps(&summary.records, engine.config());
    if !violations.is_empty() {
        for v in &violations {
            error!(violation = %v, "cap check failed");
        }
        bail!(
            "CAP_VIOLATION: {} violation(s), nothing exported. first: {}",
            violations.len(),
            violations[0]
        );
    }

    let run_id = Uuid::new_v4();
    let out = write_allocation_artifacts(WriteAllocationArtifactsArgs {
        exports_root: &exports_root,
        run_id,
        config_hash: &loaded.config_hash,
        summary: &summary,
    })?;
    info!(%run_id, run_dir = %out.run_dir.display(), "allocation exported");

    println!("allocated=true run_id={}", run_id);
    println!("config_hash={}", loaded.config_hash);
    println!(
        "records={} rejected={} degraded={}",
        summary.records.len(),
        summary.rejected.len(),
        summary.is_degraded()
    );
    println!("global_limit={:.2}", summary.global_limit);
    println!("total_allocated={:.2}", summary.total_allocated());
    println!("unallocated={:.2}", summary.unallocated());
    for t in &summary.tiers {
        println!(
            "tier={} strategies={} budget={:.2} allocated={:.2} capped={} status={}",
            t.tier,
            t.strategies,
            t.budget,
            t.allocated,
            t.capped,
            t.status.as_str()
        );
    }
    println!("run_dir={}", out.run_dir.display());
    println!("summary_path={}", out.summary_path.display());
    println!("manifest_path={}", out.manifest_path.display());

    Ok(())
}

/// `--exports-root` > `exports.root` > `exports`.
fn resolve_exports_root(flag: Option<&str>, config_json: &Value) -> PathBuf {
    flag.or_else(|| config_json.pointer("/exports/root").and_then(Value::as_str))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_EXPORTS_ROOT))
}
