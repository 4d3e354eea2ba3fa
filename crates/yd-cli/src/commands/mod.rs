//! Command handler modules for yd-cli.
//!
//! Shared utilities used by multiple command paths live here.
//! Command-specific logic lives in the submodules.

pub mod allocate;
pub mod pools;
pub mod risk;

use anyhow::Result;
use yd_config::{report_unused_keys, ConfigMode, LoadedConfig, UnusedKeyPolicy};

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Load layered config and check it for keys `mode` never reads.
///
/// No paths means an empty config: every reader falls back to its defaults.
pub fn load_config(paths: &[String], mode: ConfigMode, strict: bool) -> Result<LoadedConfig> {
    let loaded = yd_config::load_layered_yaml(paths)?;
    let policy = if strict {
        UnusedKeyPolicy::Fail
    } else {
        UnusedKeyPolicy::Warn
    };
    report_unused_keys(mode, &loaded.config_json, policy)?;
    Ok(loaded)
}

/// Cell text for an optional number (`""` when absent).
pub fn opt_num(v: Option<f64>) -> String {
    v.map(|x| x.to_string()).unwrap_or_default()
}
