// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-scalar extraction from `key: value` configuration text.
//!
//! The group-vars file is YAML, but Clawbox only ever reads top-level
//! string scalars from it, so a full YAML parser is not warranted. The
//! rules here match what the provisioning tool accepts for the same keys:
//! comments start at an unquoted `#`, and a value wrapped in a matching
//! pair of quotes is unwrapped.

/// Truncate `value` at the first `#` that is not inside a quoted span.
pub fn strip_inline_comment(value: &str) -> &str {
    let mut in_single = false;
    let mut in_double = false;
    for (idx, ch) in value.char_indices() {
        match ch {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '#' if !in_single && !in_double => return &value[..idx],
            _ => {}
        }
    }
    value
}

/// Extract the scalar value for `key` from `text`, or `""` if absent.
pub fn parse_scalar(text: &str, key: &str) -> String {
    let prefix = format!("{key}:");
    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some(rest) = line.strip_prefix(&prefix) else {
            continue;
        };

        let raw_value = strip_inline_comment(rest).trim();
        if raw_value.is_empty() {
            return String::new();
        }
        let bytes = raw_value.as_bytes();
        if raw_value.len() >= 2
            && bytes[0] == bytes[raw_value.len() - 1]
            && (bytes[0] == b'"' || bytes[0] == b'\'')
        {
            return raw_value[1..raw_value.len() - 1].trim().to_string();
        }
        return raw_value.to_string();
    }
    String::new()
}

#[cfg(test)]
#[path = "scalar_tests.rs"]
mod tests;
