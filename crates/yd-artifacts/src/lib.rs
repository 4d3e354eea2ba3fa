use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;
use yd_allocator::{AllocationSummary, TierStatus};

pub const SCHEMA_VERSION: i32 = 1;

pub const SUMMARY_HEADER: &[&str] = &["Strategy", "protocol_name", "roi", "Allocation ($)", "Weight (%)"];
const REJECTED_HEADER: &[&str] = &["strategy", "protocol_name", "tier", "rating", "reason"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub schema_version: i32,
    pub run_id: Uuid,
    pub config_hash: String,
    pub global_limit: f64,
    pub total_allocated: f64,
    pub unallocated: f64,
    pub record_count: usize,
    pub rejected_count: usize,
    /// Any tier fell back to uniform weights or faulted.
    pub degraded: bool,
    pub created_at_utc: DateTime<Utc>,
    pub artifacts: ArtifactList,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactList {
    pub manifest_json: String,
    pub allocation_summary_csv: String,
    pub tiers_json: String,
    pub rejected_csv: String,
}

/// One line of `allocation_summary.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    #[serde(rename = "Strategy")]
    pub strategy: String,
    #[serde(rename = "protocol_name")]
    pub protocol: String,
    /// Blank when the pool had no numeric ROI.
    #[serde(rename = "roi")]
    pub roi: Option<f64>,
    #[serde(rename = "Allocation ($)")]
    pub allocation: f64,
    #[serde(rename = "Weight (%)")]
    pub weight_pct: f64,
}

/// One entry of `tiers.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierRow {
    pub tier: u8,
    pub strategies: usize,
    pub budget: f64,
    pub allocated: f64,
    pub capped: usize,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// One line of `rejected.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedRow {
    pub strategy: String,
    pub protocol_name: String,
    pub tier: u8,
    pub rating: f64,
    pub reason: String,
}

pub struct WriteAllocationArtifactsArgs<'a> {
    pub exports_root: &'a Path, // e.g. ./exports
    pub run_id: Uuid,
    pub config_hash: &'a str,
    pub summary: &'a AllocationSummary,
}

#[derive(Debug, Clone)]
pub struct WriteAllocationArtifactsResult {
    pub run_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub summary_path: PathBuf,
}

/// Write `exports/<run_id>/{manifest.json, allocation_summary.csv, tiers.json, rejected.csv}`.
///
/// Existing files in the run directory are overwritten.
pub fn write_allocation_artifacts(
    args: WriteAllocationArtifactsArgs<'_>,
) -> Result<WriteAllocationArtifactsResult> {
    let run_dir = args.exports_root.join(args.run_id.to_string());
    fs::create_dir_all(&run_dir)
        .with_context(|| format!("create exports dir failed: {}", run_dir.display()))?;

    let artifacts = ArtifactList {
        manifest_json: "manifest.json".to_string(),
        allocation_summary_csv: "allocation_summary.csv".to_string(),
        tiers_json: "tiers.json".to_string(),
        rejected_csv: "rejected.csv".to_string(),
    };
    let summary = args.summary;

    // allocation_summary.csv
    let summary_path = run_dir.join(&artifacts.allocation_summary_csv);
    write_csv(&summary_path, SUMMARY_HEADER, summary_rows(summary))?;

    // rejected.csv (header only when nothing was rejected)
    let rejected_path = run_dir.join(&artifacts.rejected_csv);
    write_csv(&rejected_path, REJECTED_HEADER, rejected_rows(summary))?;

    // tiers.json
    let tiers_path = run_dir.join(&artifacts.tiers_json);
    write_json(&tiers_path, &tier_rows(summary))?;

    // manifest.json last: its presence marks a complete run directory.
    let manifest = RunManifest {
        schema_version: SCHEMA_VERSION,
        run_id: args.run_id,
        config_hash: args.config_hash.to_string(),
        global_limit: summary.global_limit,
        total_allocated: summary.total_allocated(),
        unallocated: summary.unallocated(),
        record_count: summary.records.len(),
        rejected_count: summary.rejected.len(),
        degraded: summary.is_degraded(),
        created_at_utc: Utc::now(),
        artifacts: artifacts.clone(),
    };
    let manifest_path = run_dir.join(&artifacts.manifest_json);
    write_json(&manifest_path, &manifest)?;

    Ok(WriteAllocationArtifactsResult {
        run_dir,
        manifest_path,
        summary_path,
    })
}

/// Read an `allocation_summary.csv` back.
pub fn read_allocation_summary(path: &Path) -> Result<Vec<SummaryRow>> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("open allocation summary: {}", path.display()))?;
    let mut out = Vec::new();
    for rec in rdr.deserialize() {
        let row: SummaryRow = rec.context("deserialize SummaryRow failed")?;
        out.push(row);
    }
    Ok(out)
}

pub fn read_manifest(path: &Path) -> Result<RunManifest> {
    let s = fs::read_to_string(path).with_context(|| format!("read manifest: {}", path.display()))?;
    serde_json::from_str(&s).context("parse manifest json")
}

// ─── Row builders ────────────────────────────────────────────────────────────

pub fn summary_rows(summary: &AllocationSummary) -> Vec<SummaryRow> {
    summary
        .records
        .iter()
        .map(|r| SummaryRow {
            strategy: r.strategy.clone(),
            protocol: r.protocol.clone(),
            roi: r.roi,
            allocation: r.allocation,
            weight_pct: r.weight_pct,
        })
        .collect()
}

pub fn tier_rows(summary: &AllocationSummary) -> Vec<TierRow> {
    summary
        .tiers
        .iter()
        .map(|t| TierRow {
            tier: t.tier.number(),
            strategies: t.strategies,
            budget: t.budget,
            allocated: t.allocated,
            capped: t.capped,
            status: t.status.as_str().to_string(),
            detail: match &t.status {
                TierStatus::Optimized { iterations } => Some(format!("iterations={iterations}")),
                TierStatus::UniformFallback { error } => Some(error.to_string()),
                TierStatus::Faulted { error } => Some(error.to_string()),
            },
        })
        .collect()
}

pub fn rejected_rows(summary: &AllocationSummary) -> Vec<RejectedRow> {
    summary
        .rejected
        .iter()
        .map(|r| RejectedRow {
            strategy: r.strategy.clone(),
            protocol_name: r.protocol.clone(),
            tier: r.tier.number(),
            rating: r.rating,
            reason: r.reason.to_string(),
        })
        .collect()
}

/// Header is written explicitly so an empty table still has one.
fn write_csv<T: Serialize>(path: &Path, header: &[&str], rows: Vec<T>) -> Result<()> {
    let mut w = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("create csv failed: {}", path.display()))?;
    w.write_record(header)
        .with_context(|| format!("write csv header failed: {}", path.display()))?;
    for row in &rows {
        w.serialize(row)
            .with_context(|| format!("write csv row failed: {}", path.display()))?;
    }
    w.flush()
        .with_context(|| format!("flush csv failed: {}", path.display()))?;
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("serialize json failed")?;
    fs::write(path, format!("{json}\n"))
        .with_context(|| format!("write json failed: {}", path.display()))
}
