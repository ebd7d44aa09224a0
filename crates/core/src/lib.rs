// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! clawbox-core: domain types and host-side configuration for Clawbox.
//!
//! Everything here is process-free: configuration scalars, VM naming,
//! provision markers, the secrets file, and small filesystem helpers.
//! Process boundaries (tart, ansible, mutagen) live in clawbox-adapters.

pub mod config;
pub mod fsio;
pub mod marker;
pub mod paths;
pub mod profile;
pub mod scalar;
pub mod secrets;
pub mod services;
pub mod timefmt;

pub use config::{parse_vm_suffix_number, vm_name_for, GroupVars, DEFAULT_VM_BASE_NAME};
pub use fsio::{atomic_write_text, read_text_or_empty, tail_lines};
pub use marker::ProvisionMarker;
pub use paths::{
    default_secrets_file, default_state_dir, resolve_data_root, DATA_ROOT_ENV, SECRETS_FILE_ENV,
    STATE_DIR_ENV,
};
pub use profile::Profile;
pub use secrets::{
    ensure_vm_password_file, missing_secrets_message, parse_vm_password, read_vm_password,
    secrets_file_contents, vm_user_credentials, SecretsError, DEFAULT_VM_PASSWORD,
};
pub use services::{unsupported_services, OptionalServiceSpec, ServiceSelection, OPTIONAL_SERVICES};
pub use timefmt::utc_timestamp;
