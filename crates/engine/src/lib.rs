// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! clawbox-engine: the orchestration core.
//!
//! Composes the VM backend, path locks, sync controller, and watcher into
//! the `create/launch/provision/up/recreate/down/delete/ip/status` flows.
//! Everything is single-threaded and blocking; concurrency happens across
//! processes and is coordinated through the filesystem and POSIX signals.

pub mod context;
pub mod error;
pub mod image;
pub mod locks;
pub mod orchestrator;
pub mod status;
pub mod sync_events;
pub mod sync_flow;
pub mod watcher;

pub use context::EngineContext;
pub use error::UserFacingError;
pub use locks::{
    acquire_path_lock, cleanup_locks_for_vm, locked_path_for_vm, LockError, LockSpec,
    ALL_LOCK_SPECS, OPENCLAW_PAYLOAD_LOCK, OPENCLAW_SOURCE_LOCK, SIGNAL_PAYLOAD_LOCK,
};
pub use orchestrator::{LaunchOptions, Orchestrator, ProvisionOptions, UpOptions};
pub use sync_events::emit_sync_event;
pub use watcher::{
    reconcile_vm_watchers, run_watcher_loop, start_vm_watcher, stop_vm_watcher,
    ProcessWatcherSupervisor, WatcherError, WatcherLoopDeps, WatcherRecord, WatcherSupervisor,
};
