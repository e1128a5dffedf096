//! palaver-traders: one-shot TornExchange active-trader snapshot
//!
//! Fetches the active-trader list, writes `trader_ids.json` (metadata plus
//! records) and `trader_ids.txt` (one id per line), and summarizes the most
//! recently active traders. A failed fetch is a value, not an error: the
//! caller gets `Snapshot::Unavailable` and existing files are left alone.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_URL: &str = "https://www.tornexchange.com/api/active_traders";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const JSON_FILE: &str = "trader_ids.json";
pub const TXT_FILE: &str = "trader_ids.txt";

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraderRecord {
    pub id: u64,
    pub name: String,
    /// Unix seconds of the trader's most recent trade.
    pub last_trade: i64,
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Error fetching data: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Error parsing JSON: {0}")]
    Parse(String),
}

#[derive(Error, Debug)]
pub enum SaveError {
    #[error("Error saving file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Error encoding snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Outcome of one fetch.
#[derive(Debug)]
pub enum Snapshot {
    Fetched(Vec<TraderRecord>),
    Unavailable(FetchError),
}

impl Snapshot {
    /// Records fetched, empty when the fetch failed.
    pub fn traders(&self) -> &[TraderRecord] {
        match self {
            Snapshot::Fetched(t) => t,
            Snapshot::Unavailable(_) => &[],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.traders().is_empty()
    }
}

/// Contents of `trader_ids.json`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub fetched_at: String,
    pub total_traders: usize,
    pub traders: Vec<TraderRecord>,
}

// ============================================================================
// API Response Types (private)
// ============================================================================

#[derive(Debug, Deserialize)]
struct ActiveTradersResponse {
    #[serde(default)]
    data: Option<ActiveTradersData>,
}

#[derive(Debug, Deserialize)]
struct ActiveTradersData {
    #[serde(default)]
    verbose: HashMap<String, TraderInfo>,
}

#[derive(Debug, Deserialize)]
struct TraderInfo {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    last_trade: Option<serde_json::Number>,
}

// ============================================================================
// Fetch
// ============================================================================

pub fn build_client(timeout_secs: u64) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
}

/// Parse the `{"data": {"verbose": {"<id>": {...}}}}` payload into records ordered by id.
pub fn parse_active_traders(body: &str) -> Result<Vec<TraderRecord>, FetchError> {
    let response: ActiveTradersResponse =
        serde_json::from_str(body).map_err(|e| FetchError::Parse(e.to_string()))?;

    let verbose = match response.data {
        Some(data) => data.verbose,
        None => return Ok(Vec::new()),
    };

    let mut traders = verbose
        .into_iter()
        .map(|(id, info)| -> Result<TraderRecord, FetchError> {
            let id = id
                .trim()
                .parse::<u64>()
                .map_err(|e| FetchError::Parse(format!("invalid trader id {:?}: {}", id, e)))?;
            let last_trade = info
                .last_trade
                .and_then(|n| n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)))
                .unwrap_or(0);
            Ok(TraderRecord {
                id,
                name: info.name.unwrap_or_default(),
                last_trade,
            })
        })
        .collect::<Result<Vec<_>, FetchError>>()?;

    traders.sort_by_key(|t| t.id);
    Ok(traders)
}

async fn fetch_once(client: &reqwest::Client, url: &str) -> Result<Vec<TraderRecord>, FetchError> {
    let body = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    parse_active_traders(&body)
}

/// Single GET; never panics or propagates, failures come back as `Snapshot::Unavailable`.
pub async fn fetch_active_traders(client: &reqwest::Client, url: &str) -> Snapshot {
    tracing::info!(url = %url, "Fetching active traders");

    match fetch_once(client, url).await {
        Ok(traders) => {
            tracing::info!(count = traders.len(), "Fetched active traders");
            Snapshot::Fetched(traders)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Trader fetch failed");
            Snapshot::Unavailable(e)
        }
    }
}

// ============================================================================
// Save
// ============================================================================

/// Paths written by `save_trader_ids`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedFiles {
    pub json: PathBuf,
    pub txt: PathBuf,
}

impl SavedFiles {
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            json: dir.as_ref().join(JSON_FILE),
            txt: dir.as_ref().join(TXT_FILE),
        }
    }
}

/// Replace `path` with `contents` via a sibling temp file so readers never see a partial write.
fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)
}

pub fn save_trader_ids(
    traders: &[TraderRecord],
    files: &SavedFiles,
    fetched_at: DateTime<Local>,
) -> Result<(), SaveError> {
    let snapshot = SnapshotFile {
        fetched_at: fetched_at.to_rfc3339(),
        total_traders: traders.len(),
        traders: traders.to_vec(),
    };
    write_atomic(&files.json, &serde_json::to_vec_pretty(&snapshot)?)?;
    tracing::info!(count = traders.len(), path = %files.json.display(), "Saved trader snapshot");

    let ids: String = traders.iter().map(|t| format!("{}\n", t.id)).collect();
    write_atomic(&files.txt, ids.as_bytes())?;
    tracing::info!(path = %files.txt.display(), "Saved trader ids");

    Ok(())
}

/// Result of one fetch-and-save run. A failed save keeps the fetched records
/// so the caller can still summarize them.
#[derive(Debug)]
pub struct Refresh {
    pub snapshot: Snapshot,
    pub save_error: Option<SaveError>,
}

/// Fetch, then save only when there is something to save. Existing files
/// survive an unavailable or empty snapshot untouched.
pub async fn refresh_snapshot(client: &reqwest::Client, url: &str, files: &SavedFiles) -> Refresh {
    let snapshot = fetch_active_traders(client, url).await;
    let save_error = if snapshot.is_empty() {
        None
    } else {
        save_trader_ids(snapshot.traders(), files, Local::now()).err()
    };
    Refresh {
        snapshot,
        save_error,
    }
}

// ============================================================================
// Summary
// ============================================================================

/// The `limit` traders with the newest `last_trade`, newest first.
pub fn most_recent(traders: &[TraderRecord], limit: usize) -> Vec<&TraderRecord> {
    let mut sorted: Vec<&TraderRecord> = traders.iter().collect();
    sorted.sort_by(|a, b| b.last_trade.cmp(&a.last_trade));
    sorted.truncate(limit);
    sorted
}

pub fn format_trade_time(last_trade: i64) -> String {
    match Utc.timestamp_opt(last_trade, 0).single() {
        Some(ts) => ts.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(),
        None => "unknown".to_string(),
    }
}

pub fn summary_lines(traders: &[TraderRecord], top: usize) -> Vec<String> {
    let mut lines = vec![
        String::new(),
        "Stats:".to_string(),
        format!("- Total active traders: {}", traders.len()),
        String::new(),
        "Most recently active traders:".to_string(),
    ];
    lines.extend(most_recent(traders, top).into_iter().map(|t| {
        format!(
            "- {} (ID: {}) - Last trade: {}",
            t.name,
            t.id,
            format_trade_time(t.last_trade)
        )
    }));
    lines
}

// ============================================================================
// Tests
// ============================================================================
