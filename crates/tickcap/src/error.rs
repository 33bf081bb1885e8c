// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Capture error taxonomy.
//!
//! Only construction-time and supervisor-level failures surface here; the
//! hot paths (receive loop, writer loop) classify per-record failures into
//! counters and never unwind.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while building or supervising a capture node.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The configured multicast address does not parse or is not a
    /// multicast group.
    #[error("invalid multicast address '{addr}': {reason}")]
    InvalidMulticastAddr { addr: String, reason: String },

    /// Socket creation, option setup, bind, or group join failed.
    #[error("socket setup failed: {0}")]
    Socket(#[source] io::Error),

    /// The output directory could not be created or is unwritable.
    #[error("output directory '{path}' is not usable: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Thread spawn or other I/O failure at the supervisor level.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// `start` called on a node that is already running.
    #[error("capture node already running")]
    AlreadyRunning,
}

/// Result alias for capture operations.
pub type Result<T> = std::result::Result<T, CaptureError>;
