//! Append-only ladder event log.
//!
//! One JSON line per event. With chaining enabled every event carries the
//! digest of its predecessor plus its own, so a dispute about "who moved
//! whom, when" can be settled from the file alone: any edit breaks the
//! chain at the tampered line.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Namespace for deterministic event-id derivation.
const EVENT_ID_NS: Uuid = Uuid::from_bytes([
    0x8e, 0x1f, 0x4a, 0xd2, 0x6b, 0x0c, 0x4c, 0x7a, 0x9f, 0x3d, 0x5e, 0x21, 0x70, 0x8b, 0xa4,
    0x19,
]);

/// Everything the engine does to a ladder that is worth disputing later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LadderEventKind {
    MatchApplied,
    Seeded,
    FastTrackChoice,
    PlayerAdded,
    PlayerRemoved,
    PeriodReset,
}

impl LadderEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MatchApplied => "MATCH_APPLIED",
            Self::Seeded => "SEEDED",
            Self::FastTrackChoice => "FAST_TRACK_CHOICE",
            Self::PlayerAdded => "PLAYER_ADDED",
            Self::PlayerRemoved => "PLAYER_REMOVED",
            Self::PeriodReset => "PERIOD_RESET",
        }
    }
}

/// One logged event. `prev_digest`/`digest` are absent when the log was
/// opened without chaining.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LadderEvent {
    pub event_id: Uuid,
    pub ladder: String,
    pub ts_utc: DateTime<Utc>,
    pub event_type: String,
    pub payload: Value,
    pub prev_digest: Option<String>,
    pub digest: Option<String>,
}

/// Append-only writer over one log file. The handle stays open for the
/// writer's lifetime; every append is flushed before it is reported as
/// written.
pub struct LadderLog {
    file: File,
    path: PathBuf,
    chained: bool,
    /// Digest of the most recently written event (the chain tip).
    tip: Option<String>,
    next_seq: u64,
}

impl LadderLog {
    /// Open (creating parents and the file as needed) with chaining on.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_inner(path.as_ref(), true)
    }

    /// Open without digests — plain JSONL, for throwaway environments.
    pub fn open_unchained(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_inner(path.as_ref(), false)
    }

    fn open_inner(path: &Path, chained: bool) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create audit log dir {:?}", parent))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open audit log {:?}", path))?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            chained,
            tip: None,
            next_seq: 0,
        })
    }

    /// Restore chain state when resuming an existing log after a restart:
    /// `tip` is the last event's digest, `next_seq` the count of events
    /// already on disk.
    pub fn resume_at(&mut self, tip: Option<String>, next_seq: u64) {
        self.tip = tip;
        self.next_seq = next_seq;
    }

    pub fn tip(&self) -> Option<&str> {
        self.tip.as_deref()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event and flush it.
    pub fn append(
        &mut self,
        ladder: &str,
        kind: LadderEventKind,
        payload: Value,
    ) -> Result<LadderEvent> {
        // Ids are derived from chain state, not RNG, so replaying the same
        // log always yields the same ids.
        let event_id = derive_event_id(self.tip.as_deref(), self.next_seq, &payload);

        let mut ev = LadderEvent {
            event_id,
            ladder: ladder.to_string(),
            ts_utc: Utc::now(),
            event_type: kind.as_str().to_string(),
            payload,
            prev_digest: None,
            digest: None,
        };

        if self.chained {
            ev.prev_digest = self.tip.clone();
            let d = event_digest(&ev)?;
            ev.digest = Some(d.clone());
            self.tip = Some(d);
        }
        self.next_seq += 1;

        let line = canonical_json(&serde_json::to_value(&ev).context("serialize event")?)?;
        self.file
            .write_all(line.as_bytes())
            .with_context(|| format!("append to audit log {:?}", self.path))?;
        self.file.write_all(b"\n").context("write newline failed")?;
        self.file.flush().context("flush audit log failed")?;

        Ok(ev)
    }
}

fn derive_event_id(tip: Option<&str>, seq: u64, payload: &Value) -> Uuid {
    let mut material = String::new();
    material.push_str(tip.unwrap_or("genesis"));
    material.push(':');
    material.push_str(&seq.to_string());
    material.push(':');
    material.push_str(&payload.to_string());
    Uuid::new_v5(&EVENT_ID_NS, material.as_bytes())
}

/// Digest over the canonical JSON of the event with its own `digest` field
/// blanked (a digest cannot cover itself).
pub fn event_digest(ev: &LadderEvent) -> Result<String> {
    let mut v = serde_json::to_value(ev).context("serialize event for digest")?;
    if let Some(obj) = v.as_object_mut() {
        obj.insert("digest".to_string(), Value::Null);
    }
    let canonical = canonical_json(&v)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Compact JSON with object keys in sorted order at every depth, so the
/// digest input is independent of field declaration order.
fn canonical_json(v: &Value) -> Result<String> {
    fn ordered(v: &Value) -> Value {
        match v {
            Value::Object(map) => {
                let sorted: BTreeMap<&String, &Value> = map.iter().collect();
                Value::Object(
                    sorted
                        .into_iter()
                        .map(|(k, val)| (k.clone(), ordered(val)))
                        .collect(),
                )
            }
            Value::Array(items) => Value::Array(items.iter().map(ordered).collect()),
            scalar => scalar.clone(),
        }
    }
    serde_json::to_string(&ordered(v)).context("canonical json serialize failed")
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Outcome of walking a log's chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainReport {
    /// Every linked digest checks out.
    Intact { events: usize },
    /// The chain fails at `line` (1-based).
    Broken { line: usize, reason: String },
}

/// Verify a log file's digest chain.
pub fn verify_log(path: impl AsRef<Path>) -> Result<ChainReport> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("read audit log {:?}", path.as_ref()))?;
    verify_log_str(&content)
}

/// Verify JSONL content in memory.
pub fn verify_log_str(content: &str) -> Result<ChainReport> {
    let mut expected_prev: Option<String> = None;
    let mut events = 0usize;

    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let ev: LadderEvent = serde_json::from_str(line)
            .with_context(|| format!("parse audit event at line {}", idx + 1))?;
        events += 1;

        if ev.prev_digest != expected_prev {
            return Ok(ChainReport::Broken {
                line: idx + 1,
                reason: format!(
                    "prev_digest mismatch: expected {:?}, got {:?}",
                    expected_prev, ev.prev_digest
                ),
            });
        }

        if let Some(claimed) = &ev.digest {
            let actual = event_digest(&ev)?;
            if *claimed != actual {
                return Ok(ChainReport::Broken {
                    line: idx + 1,
                    reason: format!("digest mismatch: claimed {claimed}, recomputed {actual}"),
                });
            }
        }

        expected_prev = ev.digest.clone();
    }

    Ok(ChainReport::Intact { events })
}

/// Read the last event of an existing log so a restarted writer can resume
/// the chain instead of forking it.
pub fn chain_tip(path: impl AsRef<Path>) -> Result<(Option<String>, u64)> {
    let content = match fs::read_to_string(path.as_ref()) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((None, 0)),
        Err(e) => return Err(e).with_context(|| format!("read audit log {:?}", path.as_ref())),
    };

    let mut tip = None;
    let mut count = 0u64;
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let ev: LadderEvent = serde_json::from_str(line)
            .with_context(|| format!("parse audit event at line {}", idx + 1))?;
        tip = ev.digest;
        count += 1;
    }
    Ok((tip, count))
}

/// Convenience for boot paths that refuse to start over a corrupt log.
pub fn require_intact(path: impl AsRef<Path>) -> Result<()> {
    match verify_log(&path)? {
        ChainReport::Intact { .. } => Ok(()),
        ChainReport::Broken { line, reason } => {
            bail!("AUDIT_CHAIN_BROKEN line={line}: {reason}")
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn chain_verifies_and_detects_tampering() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.jsonl");

        let mut log = LadderLog::open(&path).unwrap();
        log.append("main", LadderEventKind::MatchApplied, json!({"winner": "a"}))
            .unwrap();
        log.append("main", LadderEventKind::Seeded, json!({"seeded": 8}))
            .unwrap();

        assert_eq!(verify_log(&path).unwrap(), ChainReport::Intact { events: 2 });
        assert!(require_intact(&path).is_ok());

        // Flip a payload byte in line 1; the chain must break there.
        let content = fs::read_to_string(&path).unwrap();
        let tampered = content.replacen("\"a\"", "\"b\"", 1);
        match verify_log_str(&tampered).unwrap() {
            ChainReport::Broken { line: 1, .. } => {}
            other => panic!("expected break at line 1, got {other:?}"),
        }
    }

    #[test]
    fn event_ids_are_deterministic_per_chain_state() {
        let a = derive_event_id(None, 0, &json!({"x": 1}));
        let b = derive_event_id(None, 0, &json!({"x": 1}));
        let c = derive_event_id(None, 1, &json!({"x": 1}));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn unchained_log_still_appends_and_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.jsonl");

        let mut log = LadderLog::open_unchained(&path).unwrap();
        let ev = log
            .append("main", LadderEventKind::PeriodReset, json!({}))
            .unwrap();
        assert!(ev.digest.is_none());
        assert_eq!(verify_log(&path).unwrap(), ChainReport::Intact { events: 1 });
    }

    #[test]
    fn resume_continues_the_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.jsonl");

        let first_tip = {
            let mut log = LadderLog::open(&path).unwrap();
            log.append("main", LadderEventKind::PlayerAdded, json!({"n": 1}))
                .unwrap();
            log.tip().map(str::to_string)
        };

        // New writer, same file: resume instead of forking the chain.
        let (tip, seq) = chain_tip(&path).unwrap();
        assert_eq!(tip, first_tip);
        assert_eq!(seq, 1);

        let mut log = LadderLog::open(&path).unwrap();
        log.resume_at(tip, seq);
        log.append("main", LadderEventKind::PlayerRemoved, json!({"n": 2}))
            .unwrap();

        assert_eq!(verify_log(&path).unwrap(), ChainReport::Intact { events: 2 });
    }

    #[test]
    fn missing_log_has_empty_tip() {
        let dir = tempfile::tempdir().unwrap();
        let (tip, seq) = chain_tip(dir.path().join("absent.jsonl")).unwrap();
        assert_eq!(tip, None);
        assert_eq!(seq, 0);
    }

    #[test]
    fn event_kind_strings_are_stable() {
        assert_eq!(LadderEventKind::MatchApplied.as_str(), "MATCH_APPLIED");
        assert_eq!(LadderEventKind::FastTrackChoice.as_str(), "FAST_TRACK_CHOICE");
    }
}
