// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timestamp formatting.

use chrono::Utc;

/// Current time as ISO-8601 UTC with second resolution, the format used
/// by lock metadata, provision markers, and watcher records.
pub fn utc_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
