//! slx-audit
//!
//! Append-only trail of ledger calls. One [`AuditRecord`] per external call,
//! success, duplicate or error, written before the pipeline moves on.
//!
//! [`AuditSink`] is the seam the posting pipeline writes through. This crate
//! ships the JSON Lines sink with an optional SHA-256 hash chain; the
//! database sink lives in `slx-db`.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use slx_schemas::{AuditRecord, AuditStatus};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[async_trait::async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, rec: &AuditRecord) -> Result<()>;
}

/// Build a record stamped now with a fresh id.
pub fn new_record(
    order_code: &str,
    step: &str,
    request_payload: Value,
    response_payload: Value,
    status: AuditStatus,
    error_message: Option<String>,
) -> AuditRecord {
    AuditRecord {
        record_id: Uuid::new_v4(),
        order_code: order_code.to_string(),
        step: step.to_string(),
        request_payload,
        response_payload,
        status,
        error_message,
        timestamp: Utc::now(),
    }
}

// ---------------------------------------------------------------------------
// JSONL sink
// ---------------------------------------------------------------------------

/// One line of the JSONL log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub record: AuditRecord,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

struct ChainState {
    last_hash: Option<String>,
    lines: u64,
}

/// Append-only JSON Lines sink. Optional hash chain: each entry carries
/// `hash_prev` + `hash_self`.
pub struct JsonlAuditSink {
    path: PathBuf,
    hash_chain: bool,
    state: Mutex<ChainState>,
}

impl JsonlAuditSink {
    /// Creates the sink and ensures parent dirs exist. An existing log is
    /// resumed: the chain continues from its last line.
    pub fn open(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create_dir_all {:?}", parent))?;
        }

        let mut state = ChainState {
            last_hash: None,
            lines: 0,
        };
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("read audit log {:?}", path))?;
            for (i, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let entry: AuditEntry = serde_json::from_str(line.trim())
                    .with_context(|| format!("parse audit entry at line {}", i + 1))?;
                state.last_hash = entry.hash_self;
                state.lines += 1;
            }
        }

        Ok(Self {
            path,
            hash_chain,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries written so far, including resumed ones.
    pub fn lines(&self) -> u64 {
        self.state.lock().map(|s| s.lines).unwrap_or(0)
    }

    pub fn append(&self, rec: &AuditRecord) -> Result<AuditEntry> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("audit sink lock poisoned"))?;

        let mut entry = AuditEntry {
            record: rec.clone(),
            hash_prev: None,
            hash_self: None,
        };
        if self.hash_chain {
            entry.hash_prev = state.last_hash.clone();
            let self_hash = compute_entry_hash(&entry)?;
            entry.hash_self = Some(self_hash.clone());
            state.last_hash = Some(self_hash);
        }

        let line = canonical_json_line(&entry)?;
        append_line(&self.path, &line)?;
        state.lines += 1;
        Ok(entry)
    }
}

#[async_trait::async_trait]
impl AuditSink for JsonlAuditSink {
    async fn record(&self, rec: &AuditRecord) -> Result<()> {
        self.append(rec).map(|_| ())
    }
}

/// Writes each record to every inner sink in order. The first failure stops
/// the write and is returned.
pub struct FanoutAuditSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanoutAuditSink {
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self { sinks }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait::async_trait]
impl AuditSink for FanoutAuditSink {
    async fn record(&self, rec: &AuditRecord) -> Result<()> {
        for (i, sink) in self.sinks.iter().enumerate() {
            sink.record(rec)
                .await
                .with_context(|| format!("audit sink #{i} failed"))?;
        }
        Ok(())
    }
}

/// Every record of a JSONL log, in write order.
pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<AuditRecord>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("read audit log {:?}", path.as_ref()))?;
    content
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, l)| {
            serde_json::from_str::<AuditEntry>(l.trim())
                .map(|e| e.record)
                .with_context(|| format!("parse audit entry at line {}", i + 1))
        })
        .collect()
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open audit log {:?}", path))?;
    f.write_all(line.as_bytes())
        .context("write audit line failed")?;
    f.write_all(b"\n").context("write newline failed")?;
    Ok(())
}

/// Compact JSON with keys sorted recursively.
fn canonical_json_line<T: Serialize>(v: &T) -> Result<String> {
    let raw = serde_json::to_value(v).context("serialize audit entry failed")?;
    serde_json::to_string(&sort_keys(&raw)).context("json stringify failed")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// Hash of the canonical entry with `hash_self` cleared.
pub fn compute_entry_hash(entry: &AuditEntry) -> Result<String> {
    let mut clone = entry.clone();
    clone.hash_self = None;

    let canonical = canonical_json_line(&clone)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Valid { lines: usize },
    /// First broken line (1-based).
    Broken { line: usize, reason: String },
}

pub fn verify_hash_chain(path: impl AsRef<Path>) -> Result<VerifyResult> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("read audit log {:?}", path.as_ref()))?;
    verify_hash_chain_str(&content)
}

pub fn verify_hash_chain_str(content: &str) -> Result<VerifyResult> {
    let mut prev_hash: Option<String> = None;
    let mut line_count = 0usize;

    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let entry: AuditEntry = match serde_json::from_str(trimmed) {
            Ok(e) => e,
            Err(e) => {
                return Ok(VerifyResult::Broken {
                    line: i + 1,
                    reason: format!("unparseable entry: {e}"),
                })
            }
        };
        line_count += 1;

        if entry.hash_prev != prev_hash {
            return Ok(VerifyResult::Broken {
                line: i + 1,
                reason: format!(
                    "hash_prev mismatch: expected {:?}, got {:?}",
                    prev_hash, entry.hash_prev
                ),
            });
        }

        if let Some(ref claimed) = entry.hash_self {
            let recomputed = compute_entry_hash(&entry)?;
            if *claimed != recomputed {
                return Ok(VerifyResult::Broken {
                    line: i + 1,
                    reason: format!(
                        "hash_self mismatch: claimed {}, recomputed {}",
                        claimed, recomputed
                    ),
                });
            }
        }

        prev_hash = entry.hash_self.clone();
    }

    Ok(VerifyResult::Valid { lines: line_count })
}
