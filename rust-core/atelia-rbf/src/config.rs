// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Atelia RBF - Options
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SyncMode
// ---------------------------------------------------------------------------

/// Controls how aggressively a log calls `fsync` after a committed frame.
///
/// `durable_flush` always syncs, whatever the mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SyncMode {
    /// Call `fsync` after every committed frame. The safest and slowest mode.
    Fsync,

    /// Call `fsync` at most once per the specified duration. Frames
    /// committed between syncs may be lost on crash.
    Periodic(Duration),

    /// Never sync implicitly; rely on the OS page cache and on explicit
    /// `durable_flush` calls from the caller.
    #[default]
    Async,
}

// ---------------------------------------------------------------------------
// RbfOptions
// ---------------------------------------------------------------------------

/// Tuning knobs for an `RbfFile` / `RbfReader`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RbfOptions {
    /// Implicit fsync policy after each commit.
    pub sync_mode: SyncMode,
    /// Initial capacity of the write buffer.
    pub write_buffer_capacity: usize,
    /// Buffered bytes that trigger an opportunistic push to storage while a
    /// frame is being built. Bytes behind an open reservation never move.
    pub flush_threshold: usize,
    /// Buffers kept by the read pool for reuse.
    pub pool_max_retained: usize,
    /// Page slots of the reverse-scan read cache (clamped to 2..=64).
    pub read_cache_pages: usize,
}

impl Default for RbfOptions {
    fn default() -> Self {
        Self {
            sync_mode: SyncMode::Async,
            write_buffer_capacity: 16 * 1024,
            flush_threshold: 64 * 1024,
            pool_max_retained: 16,
            read_cache_pages: 16,
        }
    }
}

impl RbfOptions {
    pub fn with_sync_mode(mut self, sync_mode: SyncMode) -> Self {
        self.sync_mode = sync_mode;
        self
    }

    pub fn with_flush_threshold(mut self, bytes: usize) -> Self {
        self.flush_threshold = bytes;
        self
    }

    pub fn with_pool_max_retained(mut self, count: usize) -> Self {
        self.pool_max_retained = count;
        self
    }

    pub fn with_read_cache_pages(mut self, pages: usize) -> Self {
        self.read_cache_pages = pages;
        self
    }
}
