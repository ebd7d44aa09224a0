// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The orchestrator's error boundary.
//!
//! Every failure the orchestrator surfaces is a [`UserFacingError`]: a
//! display-ready, often multi-line message printed to stderr as-is, after
//! which the process exits 1. Adapter errors convert losslessly (their
//! `Display` output is already written for users) while the orchestrator
//! adds context (hints, recovery commands) where it has some.

use thiserror::Error;

use clawbox_adapters::{BackendError, RemoteShellError, SyncError};
use clawbox_core::SecretsError;

use crate::locks::LockError;
use crate::watcher::WatcherError;

#[derive(Debug, Error)]
#[error("{message}")]
pub struct UserFacingError {
    pub message: String,
}

impl UserFacingError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl From<BackendError> for UserFacingError {
    fn from(err: BackendError) -> Self {
        Self::new(err.to_string())
    }
}

impl From<SyncError> for UserFacingError {
    fn from(err: SyncError) -> Self {
        Self::new(err.to_string())
    }
}

impl From<LockError> for UserFacingError {
    fn from(err: LockError) -> Self {
        Self::new(err.to_string())
    }
}

impl From<WatcherError> for UserFacingError {
    fn from(err: WatcherError) -> Self {
        Self::new(err.to_string())
    }
}

impl From<RemoteShellError> for UserFacingError {
    fn from(err: RemoteShellError) -> Self {
        Self::new(err.to_string())
    }
}

impl From<SecretsError> for UserFacingError {
    fn from(err: SecretsError) -> Self {
        Self::new(err.to_string())
    }
}
