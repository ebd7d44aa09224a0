// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only JSONL log of sync lifecycle events.
//!
//! Best-effort by contract: emission swallows every error so diagnostics
//! can never disrupt orchestration. The file is rotated once (to `.1`)
//! when it reaches the size cap.

use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use clawbox_core::utc_timestamp;

pub const SYNC_EVENT_LOG_MAX_BYTES_ENV: &str = "CLAWBOX_SYNC_EVENT_LOG_MAX_BYTES";
const DEFAULT_MAX_BYTES: u64 = 5 * 1024 * 1024;
const LOG_FILE: &str = "sync-events.jsonl";
const ROTATED_LOG_FILE: &str = "sync-events.jsonl.1";

fn max_log_size_bytes() -> u64 {
    let Ok(raw) = std::env::var(SYNC_EVENT_LOG_MAX_BYTES_ENV) else {
        return DEFAULT_MAX_BYTES;
    };
    match raw.parse::<i64>() {
        Ok(value) if value > 0 => value as u64,
        _ => DEFAULT_MAX_BYTES,
    }
}

fn log_path(state_dir: &Path) -> PathBuf {
    state_dir.join("logs").join(LOG_FILE)
}

fn rotated_log_path(state_dir: &Path) -> PathBuf {
    state_dir.join("logs").join(ROTATED_LOG_FILE)
}

fn maybe_rotate(path: &Path, rotated: &Path) -> std::io::Result<()> {
    let Ok(meta) = path.metadata() else {
        return Ok(());
    };
    if meta.len() < max_log_size_bytes() {
        return Ok(());
    }
    let _ = std::fs::remove_file(rotated);
    std::fs::rename(path, rotated)
}

/// Append one structured sync lifecycle event. Never fails.
pub fn emit_sync_event(
    state_dir: &Path,
    vm_name: &str,
    event: &str,
    actor: &str,
    reason: &str,
    details: Option<serde_json::Value>,
) {
    let _ = try_emit(state_dir, vm_name, event, actor, reason, details);
}

fn try_emit(
    state_dir: &Path,
    vm_name: &str,
    event: &str,
    actor: &str,
    reason: &str,
    details: Option<serde_json::Value>,
) -> std::io::Result<()> {
    let path = log_path(state_dir);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    maybe_rotate(&path, &rotated_log_path(state_dir))?;

    let mut payload = serde_json::json!({
        "timestamp": utc_timestamp(),
        "vm": vm_name,
        "event": event,
        "actor": actor,
        "reason": reason,
    });
    if let (Some(details), Some(map)) = (details, payload.as_object_mut()) {
        map.insert("details".to_string(), details);
    }

    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .mode(0o600)
        .open(&path)?;
    file.write_all(format!("{payload}\n").as_bytes())
}

#[cfg(test)]
#[path = "sync_events_tests.rs"]
mod tests;
