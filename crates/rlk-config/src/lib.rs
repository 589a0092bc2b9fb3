//! Layered YAML configuration for the league.
//!
//! Config is merged base-first (league defaults, then venue/season
//! overrides), canonicalized, and hashed so a running daemon and its audit
//! trail can state exactly which rule set produced a reindex. Secret-looking
//! literal values abort the load — credentials belong in env vars, never in
//! committed YAML.

use anyhow::{bail, Context, Result};
use chrono_tz::Tz;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;

use rlk_schemas::LeagueRules;

/// Known secret-like prefixes. A leaf string starting with any of these
/// aborts the load with CONFIG_SECRET_DETECTED.
const SECRET_PREFIXES: &[&str] = &[
    "postgres://",
    "postgresql://",
    "-----BEGIN", // PEM private keys
    "ghp_",       // GitHub PAT
    "xoxb-",      // Slack bot token
    "AKIA",       // AWS access key ID
];

/// The effective config plus its identity hash.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

/// Read and merge YAML files in order; earlier paths are the base, later
/// paths override.
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut docs = Vec::with_capacity(paths.len());
    for p in paths {
        docs.push(fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?);
    }
    let refs: Vec<&str> = docs.iter().map(String::as_str).collect();
    load_layered_yaml_from_strings(&refs)
}

/// Same as [`load_layered_yaml`] but over in-memory documents.
pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut effective = Value::Object(serde_json::Map::new());
    for raw in yaml_docs {
        let layer: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        let layer = serde_json::to_value(layer).context("yaml->json conversion failed")?;
        effective = merge_over(effective, layer);
    }

    reject_secret_literals(&effective)?;

    let canonical_json = canonical_json(&effective)?;
    let config_hash = {
        let mut hasher = Sha256::new();
        hasher.update(canonical_json.as_bytes());
        hex::encode(hasher.finalize())
    };

    Ok(LoadedConfig { config_hash, canonical_json, config_json: effective })
}

// ---------------------------------------------------------------------------
// Typed rules accessor
// ---------------------------------------------------------------------------

/// Extract [`LeagueRules`] from the effective config under `/rules`.
///
/// Missing keys fall back to the rulebook defaults; present keys must have
/// the right type. The timezone must name a real IANA zone — an unknown
/// zone is a load error, not a silent fallback to UTC.
pub fn league_rules(config_json: &Value) -> Result<LeagueRules> {
    let mut rules = LeagueRules::default();
    let Some(section) = config_json.pointer("/rules") else {
        return Ok(rules);
    };

    read_i64(section, "immunity_days", &mut rules.immunity_days)?;
    read_i64(section, "smackback_days", &mut rules.smackback_days)?;
    read_i64(section, "fast_track_days", &mut rules.fast_track_days)?;
    read_i32(section, "fast_track_challenges", &mut rules.fast_track_challenges)?;
    read_i64(section, "fast_track_grace_days", &mut rules.fast_track_grace_days)?;
    read_i32(section, "max_declines_per_month", &mut rules.max_declines_per_month)?;
    read_i32(section, "smackdown_rise", &mut rules.smackdown_rise)?;
    read_i32(section, "smackdown_drop", &mut rules.smackdown_drop)?;
    read_i32(section, "smackdown_floor", &mut rules.smackdown_floor)?;

    if let Some(v) = section.get("timezone") {
        let s = v.as_str().context("rules.timezone must be a string")?;
        s.parse::<Tz>()
            .map_err(|_| anyhow::anyhow!("rules.timezone is not a known IANA zone: {s}"))?;
        rules.timezone = s.to_string();
    }

    Ok(rules)
}

fn read_i64(section: &Value, key: &str, out: &mut i64) -> Result<()> {
    if let Some(v) = section.get(key) {
        *out = v
            .as_i64()
            .with_context(|| format!("rules.{key} must be an integer"))?;
    }
    Ok(())
}

fn read_i32(section: &Value, key: &str, out: &mut i32) -> Result<()> {
    if let Some(v) = section.get(key) {
        let n = v
            .as_i64()
            .with_context(|| format!("rules.{key} must be an integer"))?;
        *out = i32::try_from(n).with_context(|| format!("rules.{key} out of range"))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Merge / canonicalize
// ---------------------------------------------------------------------------

/// Overlay `layer` on `base`: objects merge key-by-key recursively, anything
/// else (scalars, arrays) replaces the base value outright.
fn merge_over(base: Value, layer: Value) -> Value {
    match (base, layer) {
        (Value::Object(mut under), Value::Object(over)) => {
            for (key, over_val) in over {
                let merged = match under.remove(&key) {
                    Some(under_val) => merge_over(under_val, over_val),
                    None => over_val,
                };
                under.insert(key, merged);
            }
            Value::Object(under)
        }
        (_, replacement) => replacement,
    }
}

/// Compact JSON with object keys sorted at every depth — the hash input
/// must not depend on YAML key order.
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
// Secret guard
// ---------------------------------------------------------------------------

fn reject_secret_literals(v: &Value) -> Result<()> {
    let mut offender: Option<String> = None;
    visit_string_leaves(v, &mut String::new(), &mut |path, s| {
        if offender.is_none() && looks_like_secret(s) {
            offender = Some(path.to_string());
        }
    });

    if let Some(path) = offender {
        bail!("CONFIG_SECRET_DETECTED leaf={path} value=REDACTED");
    }
    Ok(())
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    t.len() >= 8 && SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}

/// Walk every string leaf, passing its JSON-pointer-ish path and value.
fn visit_string_leaves(v: &Value, path: &mut String, f: &mut impl FnMut(&str, &str)) {
    match v {
        Value::Object(map) => {
            for (k, child) in map {
                let len = path.len();
                path.push('/');
                path.push_str(&k.replace('~', "~0").replace('/', "~1"));
                visit_string_leaves(child, path, f);
                path.truncate(len);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                let len = path.len();
                path.push('/');
                path.push_str(&i.to_string());
                visit_string_leaves(child, path, f);
                path.truncate(len);
            }
        }
        Value::String(s) => f(path, s),
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
