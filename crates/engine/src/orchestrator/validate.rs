// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Argument validation and the virtualization-limit hint.

use std::path::Path;

use clawbox_core::{unsupported_services, Profile, ServiceSelection};

use crate::error::UserFacingError;

/// Mount-path arguments are meaningful only in developer mode, where the
/// two OpenClaw directories are mandatory.
pub(crate) fn validate_profile_mount_args(
    profile: Profile,
    openclaw_source: &str,
    openclaw_payload: &str,
    signal_payload: &str,
) -> Result<(), UserFacingError> {
    if profile.is_developer() {
        if openclaw_source.is_empty() || openclaw_payload.is_empty() {
            return Err(UserFacingError::new(
                "Error: Developer profile requires --openclaw-source and --openclaw-payload.",
            ));
        }
        return Ok(());
    }

    if !openclaw_source.is_empty() || !openclaw_payload.is_empty() {
        return Err(UserFacingError::new(
            "Error: --openclaw-source/--openclaw-payload are only valid in developer mode.",
        ));
    }
    if !signal_payload.is_empty() {
        return Err(UserFacingError::new(
            "Error: --signal-cli-payload is only valid in developer mode.",
        ));
    }
    Ok(())
}

pub(crate) fn validate_feature_flags(
    profile: Profile,
    services: ServiceSelection,
    enable_signal_payload: bool,
    signal_payload_path: &str,
) -> Result<(), UserFacingError> {
    let unsupported = unsupported_services(profile, services);
    if !unsupported.is_empty() {
        let names: Vec<&str> = unsupported.iter().map(|spec| spec.display_name).collect();
        let mut profiles: Vec<&str> = unsupported
            .iter()
            .flat_map(|spec| spec.allowed_profiles.iter().map(|p| p.as_str()))
            .collect();
        profiles.sort_unstable();
        profiles.dedup();
        return Err(UserFacingError::new(format!(
            "Error: {} provisioning is not supported for profile '{profile}'.\nSupported profiles: {}",
            names.join(", "),
            profiles.join(", "),
        )));
    }

    if enable_signal_payload && !profile.is_developer() {
        return Err(UserFacingError::new(
            "Error: signal-cli payload mode is only valid in developer mode.\n\
             Standard mode supports signal-cli provisioning only (no custom payload mounts).",
        ));
    }

    if enable_signal_payload && !services.signal_cli {
        let payload_flag = if signal_payload_path.is_empty() {
            "--enable-signal-payload"
        } else {
            "--signal-cli-payload"
        };
        return Err(UserFacingError::new(format!(
            "Error: {payload_flag} requires --add-signal-cli-provisioning.\n\
             Enable signal-cli provisioning explicitly when using payload mode."
        )));
    }
    Ok(())
}

pub(crate) fn validate_dirs(paths: &[&str]) -> Result<(), UserFacingError> {
    for path in paths {
        if !path.is_empty() && !Path::new(path).is_dir() {
            return Err(UserFacingError::new(format!(
                "Error: Expected directory does not exist: {path}"
            )));
        }
    }
    Ok(())
}

const VIRTUALIZATION_LIMIT_INDICATORS: [&str; 7] = [
    "vzerrordomain",
    "virtualization",
    "virtual machine limit",
    "system limit",
    "exceeds the system limit",
    "maximum number of virtual machines",
    "resource busy",
];

const VIRTUALIZATION_LIMIT_HINT: &str =
    "Hint: macOS Virtualization.framework may be refusing another VM on this host.\n\
     Stop other VMs and retry (for example: clawbox down 1, clawbox down 2).";

/// Append a hint to backend errors that smell like the host's concurrent
/// VM limit. Applying twice never duplicates the hint.
pub(crate) fn with_virtualization_limit_hint(message: &str) -> String {
    if message.contains(VIRTUALIZATION_LIMIT_HINT) {
        return message.to_string();
    }
    let lowered = message.to_lowercase();
    if !VIRTUALIZATION_LIMIT_INDICATORS.iter().any(|token| lowered.contains(token)) {
        return message.to_string();
    }
    format!("{message}\n{VIRTUALIZATION_LIMIT_HINT}")
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;
