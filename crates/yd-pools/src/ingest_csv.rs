//! CSV ingestion for pool snapshots (yd-pools boundary).
//!
//! Read side only: rows come back as trimmed strings. Typing and defaulting
//! happen in [`crate::normalizer`] and [`crate::rating`].
//!
//! ## Column contracts (case-insensitive, order-independent)
//!
//! Pools file:
//!
//! | Column            | Required | Notes                                       |
//! |-------------------|----------|---------------------------------------------|
//! | `protocol_name`   | yes      | `protocol` accepted as an alias             |
//! | `token1`          | yes      |                                             |
//! | `token2`          | yes      |                                             |
//! | `chain`           | yes      |                                             |
//! | `tier`            | no       | Overridden by the protocol-tier table       |
//! | `strategy_rating` | no       | Engine rating                               |
//! | `rating`          | no       | Raw pool rating (TVL x days)                |
//! | `roi`             | no       | Pass-through                                |
//! | `pool_id`         | no       | Join key for TVL history                    |
//!
//! Protocol tiers file: `protocol_name` (or `protocol`), `tier`.
//!
//! Token tiers file: `token`, `chain`, `tier`.
//!
//! TVL history file: `pool_id`, `timestamp` (RFC 3339), `tvl_usd`, optional `apy`.
//!
//! Rows with an empty required field, or that the CSV reader cannot decode,
//! are skipped with a warning. Only IO and header problems are errors.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::warn;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors produced by CSV parsing in this module.
#[derive(Debug)]
pub enum CsvIngestError {
    /// An I/O or CSV-library error.
    Io(String),
    /// The header row is missing a required column.
    MissingHeader(String),
}

impl fmt::Display for CsvIngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CsvIngestError::Io(msg) => write!(f, "csv io error: {msg}"),
            CsvIngestError::MissingHeader(col) => {
                write!(f, "csv missing required header column: '{col}'")
            }
        }
    }
}

impl std::error::Error for CsvIngestError {}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// One pool as read from the pools file. Optional cells are `None` when the
/// column is absent or the cell is blank.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PoolRow {
    pub protocol_name: String,
    pub token1: String,
    pub token2: String,
    pub chain: String,
    pub tier: Option<String>,
    pub strategy_rating: Option<String>,
    pub rating: Option<String>,
    pub roi: Option<String>,
    pub pool_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolTierRow {
    pub protocol_name: String,
    pub tier: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenTierRow {
    pub token: String,
    pub chain: String,
    pub tier: String,
}

/// One point of a pool's TVL/APY history.
#[derive(Debug, Clone, PartialEq)]
pub struct TvlPoint {
    pub pool_id: String,
    pub timestamp: DateTime<Utc>,
    pub tvl_usd: f64,
    pub apy: Option<f64>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

pub fn parse_pools_csv_file(path: &Path) -> Result<Vec<PoolRow>, CsvIngestError> {
    parse_pools_csv_str(&read_file(path)?)
}

pub fn parse_pools_csv_str(src: &str) -> Result<Vec<PoolRow>, CsvIngestError> {
    let Some(table) = Table::read(src, &["protocol_name", "token1", "token2", "chain"])? else {
        return Ok(Vec::new());
    };

    let mut out = Vec::new();
    for (row, rec) in table.rows {
        let required = (
            table.cols.get(&rec, "protocol_name"),
            table.cols.get(&rec, "token1"),
            table.cols.get(&rec, "token2"),
            table.cols.get(&rec, "chain"),
        );
        let (Some(protocol_name), Some(token1), Some(token2), Some(chain)) = required else {
            warn!(row, "pools csv: blank required field; row skipped");
            continue;
        };
        out.push(PoolRow {
            protocol_name: protocol_name.to_string(),
            token1: token1.to_string(),
            token2: token2.to_string(),
            chain: chain.to_string(),
            tier: table.cols.get_owned(&rec, "tier"),
            strategy_rating: table.cols.get_owned(&rec, "strategy_rating"),
            rating: table.cols.get_owned(&rec, "rating"),
            roi: table.cols.get_owned(&rec, "roi"),
            pool_id: table.cols.get_owned(&rec, "pool_id"),
        });
    }
    Ok(out)
}

pub fn parse_protocol_tiers_csv_file(path: &Path) -> Result<Vec<ProtocolTierRow>, CsvIngestError> {
    parse_protocol_tiers_csv_str(&read_file(path)?)
}

pub fn parse_protocol_tiers_csv_str(src: &str) -> Result<Vec<ProtocolTierRow>, CsvIngestError> {
    let Some(table) = Table::read(src, &["protocol_name", "tier"])? else {
        return Ok(Vec::new());
    };

    let mut out = Vec::new();
    for (row, rec) in table.rows {
        let Some(protocol_name) = table.cols.get(&rec, "protocol_name") else {
            warn!(row, "protocol tiers csv: blank protocol_name; row skipped");
            continue;
        };
        out.push(ProtocolTierRow {
            protocol_name: protocol_name.to_string(),
            // Blank tier is kept; the normalizer falls back to the default tier.
            tier: table.cols.get(&rec, "tier").unwrap_or_default().to_string(),
        });
    }
    Ok(out)
}

pub fn parse_token_tiers_csv_file(path: &Path) -> Result<Vec<TokenTierRow>, CsvIngestError> {
    parse_token_tiers_csv_str(&read_file(path)?)
}

pub fn parse_token_tiers_csv_str(src: &str) -> Result<Vec<TokenTierRow>, CsvIngestError> {
    let Some(table) = Table::read(src, &["token", "chain", "tier"])? else {
        return Ok(Vec::new());
    };

    let mut out = Vec::new();
    for (row, rec) in table.rows {
        let (Some(token), Some(chain)) =
            (table.cols.get(&rec, "token"), table.cols.get(&rec, "chain"))
        else {
            warn!(row, "token tiers csv: blank token or chain; row skipped");
            continue;
        };
        out.push(TokenTierRow {
            token: token.to_string(),
            chain: chain.to_string(),
            tier: table.cols.get(&rec, "tier").unwrap_or_default().to_string(),
        });
    }
    Ok(out)
}

pub fn parse_tvl_history_csv_file(path: &Path) -> Result<Vec<TvlPoint>, CsvIngestError> {
    parse_tvl_history_csv_str(&read_file(path)?)
}

/// Rows with an unparseable timestamp or TVL are skipped. A blank or
/// non-numeric `apy` becomes `None`.
pub fn parse_tvl_history_csv_str(src: &str) -> Result<Vec<TvlPoint>, CsvIngestError> {
    let Some(table) = Table::read(src, &["pool_id", "timestamp", "tvl_usd"])? else {
        return Ok(Vec::new());
    };

    let mut out = Vec::new();
    for (row, rec) in table.rows {
        let Some(pool_id) = table.cols.get(&rec, "pool_id") else {
            warn!(row, "tvl csv: blank pool_id; row skipped");
            continue;
        };
        let timestamp = match table
            .cols
            .get(&rec, "timestamp")
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        {
            Some(ts) => ts.with_timezone(&Utc),
            None => {
                warn!(row, "tvl csv: unparseable timestamp; row skipped");
                continue;
            }
        };
        let tvl_usd = match table
            .cols
            .get(&rec, "tvl_usd")
            .and_then(|s| s.parse::<f64>().ok())
        {
            Some(v) if v.is_finite() => v,
            _ => {
                warn!(row, "tvl csv: unparseable tvl_usd; row skipped");
                continue;
            }
        };
        let apy = table
            .cols
            .get(&rec, "apy")
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|v| v.is_finite());

        out.push(TvlPoint {
            pool_id: pool_id.to_string(),
            timestamp,
            tvl_usd,
            apy,
        });
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, CsvIngestError> {
    std::fs::read_to_string(path)
        .map_err(|e| CsvIngestError::Io(format!("read '{}': {e}", path.display())))
}

/// Lower-cased header name -> column index. `protocol` is folded into
/// `protocol_name` unless both are present.
struct ColumnIndex(HashMap<String, usize>);

impl ColumnIndex {
    fn from_headers(headers: &csv::StringRecord) -> Self {
        let mut idx: HashMap<String, usize> = HashMap::new();
        for (i, col) in headers.iter().enumerate() {
            idx.entry(col.trim().to_ascii_lowercase()).or_insert(i);
        }
        if !idx.contains_key("protocol_name") {
            if let Some(i) = idx.get("protocol").copied() {
                idx.insert("protocol_name".to_string(), i);
            }
        }
        Self(idx)
    }

    /// Trimmed, non-blank cell for `name`.
    fn get<'r>(&self, rec: &'r csv::StringRecord, name: &str) -> Option<&'r str> {
        let i = *self.0.get(name)?;
        rec.get(i).map(str::trim).filter(|s| !s.is_empty())
    }

    fn get_owned(&self, rec: &csv::StringRecord, name: &str) -> Option<String> {
        self.get(rec, name).map(str::to_string)
    }
}

struct Table {
    cols: ColumnIndex,
    /// (1-based line number, record)
    rows: Vec<(u64, csv::StringRecord)>,
}

impl Table {
    /// `None` for an empty document (no header row).
    fn read(src: &str, required: &[&str]) -> Result<Option<Self>, CsvIngestError> {
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(src.as_bytes());

        let headers = rdr
            .headers()
            .map_err(|e| CsvIngestError::Io(e.to_string()))?
            .clone();
        if headers.iter().all(|h| h.trim().is_empty()) {
            return Ok(None);
        }

        let cols = ColumnIndex::from_headers(&headers);
        for req in required {
            if !cols.0.contains_key(*req) {
                return Err(CsvIngestError::MissingHeader((*req).to_string()));
            }
        }

        let mut rows = Vec::new();
        for rec in rdr.records() {
            match rec {
                Ok(r) => {
                    if r.iter().all(|c| c.trim().is_empty()) {
                        continue;
                    }
                    let line = r.position().map(|p| p.line()).unwrap_or(0);
                    rows.push((line, r));
                }
                Err(e) => warn!(error = %e, "csv: undecodable row skipped"),
            }
        }
        Ok(Some(Self { cols, rows }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
