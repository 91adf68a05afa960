//! Append-only, hash-chained audit trail of provisioning and rotation.
//!
//! Each line is a JSON entry whose `entry_hash` is the SHA-256 of the entry's
//! canonical JSON (keys sorted, `entry_hash` omitted) and whose `prev_hash`
//! is the previous entry's `entry_hash`.

use crate::constants;
use crate::core::file_lock::FileLock;
use crate::core::paths::WardenPaths;
use crate::error::{Error, IoContext, Result};
use crate::models::rotation::RotationState;
use crate::util::{fs as warden_fs, privilege};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub actor: String,
    /// Key file the action concerned, `<directory>/<name>`.
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<RotationState>,
    /// Public key identity active after the action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    pub result: AuditResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_hash: Option<String>,
}

/// What happened, before it is stamped and chained.
#[derive(Debug, Clone, Default)]
pub struct AuditRecord {
    pub action: String,
    pub key: String,
    pub target: Option<String>,
    pub state: Option<RotationState>,
    pub public_key: Option<String>,
}

impl AuditRecord {
    pub fn new(action: &str, key: impl Into<String>) -> Self {
        Self {
            action: action.to_string(),
            key: key.into(),
            ..Default::default()
        }
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn state(mut self, state: RotationState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn public_key(mut self, public_key: impl Into<String>) -> Self {
        self.public_key = Some(public_key.into());
        self
    }
}

pub fn append(
    paths: &WardenPaths,
    record: AuditRecord,
    outcome: std::result::Result<(), String>,
) -> Result<()> {
    warden_fs::ensure_dir(&paths.root, constants::WARDEN_ROOT_MODE)?;
    let _lock = FileLock::exclusive(&paths.audit_lock)?;
    let prev_hash = last_entry_hash(&paths.audit_log)?;

    let mut entry = AuditEntry {
        timestamp: Utc::now(),
        action: record.action,
        actor: privilege::invoking_user(),
        key: record.key,
        target: record.target,
        state: record.state,
        public_key: record.public_key,
        result: AuditResult {
            success: outcome.is_ok(),
            error: outcome.err(),
        },
        prev_hash,
        entry_hash: None,
    };
    entry.entry_hash = Some(compute_entry_hash(&entry)?);

    let line = serde_json::to_string(&entry)
        .map_err(|e| Error::Config(format!("serialize audit entry: {}", e)))?;
    append_line(&paths.audit_log, &line)
}

fn compute_entry_hash(entry: &AuditEntry) -> Result<String> {
    let mut value = serde_json::to_value(entry)
        .map_err(|e| Error::Config(format!("serialize audit entry: {}", e)))?;
    if let Some(obj) = value.as_object_mut() {
        obj.remove("entry_hash");
    }
    let canonical = canonicalize_value(&value);
    let hash = Sha256::digest(canonical.to_string().as_bytes());
    Ok(format!("{:064x}", hash))
}

/// Recursively sort object keys.
fn canonicalize_value(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for k in keys {
                out.insert(k.clone(), canonicalize_value(&map[k]));
            }
            serde_json::Value::Object(out)
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.iter().map(canonicalize_value).collect())
        }
        other => other.clone(),
    }
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .io_context(|| format!("open audit log {}", path.display()))?;
    writeln!(file, "{}", line).io_context(|| "write audit entry")?;
    warden_fs::set_permissions(path, constants::AUDIT_LOG_MODE)
}

fn last_entry_hash(path: &Path) -> Result<Option<String>> {
    let (entries, _) = read_entries(path)?;
    Ok(entries.last().and_then(|e| e.entry_hash.clone()))
}

fn read_entries(path: &Path) -> Result<(Vec<AuditEntry>, usize)> {
    if !path.exists() {
        return Ok((Vec::new(), 0));
    }
    let file = fs::File::open(path).io_context(|| format!("open audit log {}", path.display()))?;
    let mut entries = Vec::new();
    let mut malformed = 0usize;
    for line in BufReader::new(file).lines() {
        let line = line.io_context(|| "read audit log line")?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<AuditEntry>(trimmed) {
            Ok(entry) => entries.push(entry),
            Err(_) => malformed += 1,
        }
    }
    Ok((entries, malformed))
}

/// Entries oldest first, keeping only the last `limit` if given.
pub fn read_log(paths: &WardenPaths, limit: Option<usize>) -> Result<Vec<AuditEntry>> {
    let (mut entries, malformed) = read_entries(&paths.audit_log)?;
    if malformed > 0 {
        warn!(count = malformed, "malformed audit entries skipped");
    }
    if let Some(limit) = limit {
        if entries.len() > limit {
            entries = entries.split_off(entries.len() - limit);
        }
    }
    Ok(entries)
}

/// Check every hash and link. Returns (entries checked, problems found).
pub fn verify_chain(paths: &WardenPaths) -> Result<(usize, Vec<String>)> {
    let (entries, malformed) = read_entries(&paths.audit_log)?;
    let mut errors = Vec::new();
    if malformed > 0 {
        errors.push(format!("{} unparseable line(s)", malformed));
    }
    let mut prev: Option<String> = None;

    for (i, entry) in entries.iter().enumerate() {
        if entry.prev_hash != prev {
            errors.push(format!(
                "entry {}: prev_hash mismatch (expected {:?}, got {:?})",
                i + 1,
                prev,
                entry.prev_hash
            ));
        }
        match (&entry.entry_hash, compute_entry_hash(entry)) {
            (Some(stored), Ok(computed)) if *stored == computed => {}
            (Some(_), Ok(_)) => {
                errors.push(format!("entry {}: entry_hash mismatch (tampered?)", i + 1))
            }
            (None, _) => errors.push(format!("entry {}: missing entry_hash", i + 1)),
            (_, Err(e)) => errors.push(format!("entry {}: cannot compute hash: {}", i + 1, e)),
        }
        prev = entry.entry_hash.clone();
    }

    Ok((entries.len(), errors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_paths() -> (TempDir, WardenPaths) {
        let dir = TempDir::new().unwrap();
        let paths = WardenPaths::from_root(dir.path().to_path_buf());
        (dir, paths)
    }

    fn rotate_record() -> AuditRecord {
        AuditRecord::new("rotate", "/home/alice/.ssh/id_old")
            .target("alice@203.0.113.5:22")
            .state(RotationState::Promoted)
            .public_key("ssh-rsa AAAAB3NzaC1yc2E")
    }

    #[test]
    fn test_append_and_read() {
        let (_dir, paths) = test_paths();
        append(&paths, rotate_record(), Ok(())).unwrap();
        let entries = read_log(&paths, None).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "rotate");
        assert_eq!(entries[0].state, Some(RotationState::Promoted));
        assert!(entries[0].result.success);
        assert!(entries[0].prev_hash.is_none());
        assert!(entries[0].entry_hash.is_some());
    }

    #[test]
    fn test_failure_recorded_with_state() {
        let (_dir, paths) = test_paths();
        let record = AuditRecord::new("rotate", "k").state(RotationState::CandidateGenerated);
        append(&paths, record, Err("authentication failed".into())).unwrap();
        let entry = &read_log(&paths, None).unwrap()[0];
        assert!(!entry.result.success);
        assert_eq!(entry.result.error.as_deref(), Some("authentication failed"));
        assert_eq!(entry.state, Some(RotationState::CandidateGenerated));
    }

    #[test]
    fn test_read_log_limit() {
        let (_dir, paths) = test_paths();
        for i in 0..5 {
            append(&paths, AuditRecord::new(&format!("a{}", i), "k"), Ok(())).unwrap();
        }
        let entries = read_log(&paths, Some(2)).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].action, "a4");
    }

    #[test]
    fn test_canonical_json_sorted() {
        let c = canonicalize_value(&serde_json::json!({"b": 1, "a": {"d": 1, "c": 2}}));
        assert_eq!(c.to_string(), r#"{"a":{"c":2,"d":1},"b":1}"#);
    }

    #[test]
    fn test_verify_chain_ok() {
        let (_dir, paths) = test_paths();
        append(&paths, AuditRecord::new("client", "k"), Ok(())).unwrap();
        append(&paths, rotate_record(), Ok(())).unwrap();
        append(&paths, AuditRecord::new("tunnel-configure", "k"), Ok(())).unwrap();
        let (total, errors) = verify_chain(&paths).unwrap();
        assert_eq!(total, 3);
        assert!(errors.is_empty(), "errors: {:?}", errors);
    }

    #[test]
    fn test_verify_chain_detects_tamper() {
        let (_dir, paths) = test_paths();
        append(&paths, AuditRecord::new("client", "k"), Ok(())).unwrap();
        append(&paths, rotate_record(), Ok(())).unwrap();

        let content = fs::read_to_string(&paths.audit_log).unwrap();
        fs::write(&paths.audit_log, content.replace("\"rotate\"", "\"client\"")).unwrap();

        let (total, errors) = verify_chain(&paths).unwrap();
        assert_eq!(total, 2);
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_verify_chain_detects_deleted_entry() {
        let (_dir, paths) = test_paths();
        for action in ["client", "rotate", "rotate"] {
            append(&paths, AuditRecord::new(action, "k"), Ok(())).unwrap();
        }
        let content = fs::read_to_string(&paths.audit_log).unwrap();
        let kept: Vec<&str> = content
            .lines()
            .enumerate()
            .filter(|(i, _)| *i != 1)
            .map(|(_, l)| l)
            .collect();
        fs::write(&paths.audit_log, kept.join("\n")).unwrap();

        let (_, errors) = verify_chain(&paths).unwrap();
        assert!(errors.iter().any(|e| e.contains("prev_hash")));
    }
}
