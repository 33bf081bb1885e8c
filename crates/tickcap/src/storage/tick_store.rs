// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Append-only tick files, one per symbol.
//!
//! # On-disk format
//!
//! `{base}/{symbol_id}.tick`: the concatenation of that symbol's records,
//! byte-for-byte as received, in arrival order. Files are opened in append
//! mode and created on first write, so a reader can `mmap` or linearly
//! scan any tick file as a contiguous array of 64-byte records, and a
//! restarted capture process continues the same files.
//!
//! Storage is owned exclusively by the writer thread; there is no
//! cross-thread sharing and no locking.

use crate::error::{CaptureError, Result};
use crate::message::{MarketMessage, MAX_SYMBOL_ID, MESSAGE_SIZE};
use crate::stats::CaptureMetrics;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

/// Tick file durability mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPolicy {
    /// Flush after every record: strongest freshness, lower throughput.
    PerRecord,
    /// Flush at batch boundaries and at shutdown.
    Batched,
}

/// Per-symbol write statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymbolFileStats {
    pub messages_written: u64,
    pub bytes_written: u64,
}

/// One open tick file.
struct SymbolFile {
    writer: BufWriter<File>,
    stats: SymbolFileStats,
}

/// Append-only writer for per-symbol tick files, created lazily.
pub struct TickStorage {
    base_path: PathBuf,
    files: HashMap<u32, SymbolFile>,
    flush_policy: FlushPolicy,
    metrics: Arc<CaptureMetrics>,
}

impl TickStorage {
    /// Create storage rooted at `base_path`, creating the directory tree.
    ///
    /// An unusable output directory is a construction-time fatal error.
    pub fn new(
        base_path: impl Into<PathBuf>,
        flush_policy: FlushPolicy,
        metrics: Arc<CaptureMetrics>,
    ) -> Result<Self> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path).map_err(|source| CaptureError::OutputDir {
            path: base_path.clone(),
            source,
        })?;

        Ok(Self {
            base_path,
            files: HashMap::new(),
            flush_policy,
            metrics,
        })
    }

    /// Append one record to its symbol's tick file.
    ///
    /// Returns `false` when the record was aborted (invalid symbol, file
    /// open or append failure); the failure is counted, never propagated,
    /// so one bad record cannot take down the writer thread.
    pub fn store(&mut self, msg: &MarketMessage) -> bool {
        if msg.symbol_id == 0 || msg.symbol_id > MAX_SYMBOL_ID {
            self.metrics.write_errors.fetch_add(1, Ordering::Relaxed);
            log::warn!("[STORE] rejecting record with symbol_id={}", msg.symbol_id);
            return false;
        }

        let start = Instant::now();
        match self.append(msg) {
            Ok(()) => {
                self.metrics.messages_stored.fetch_add(1, Ordering::Relaxed);
                self.metrics
                    .bytes_written
                    .fetch_add(MESSAGE_SIZE as u64, Ordering::Relaxed);
                self.metrics
                    .write_time_ns
                    .fetch_add(start.elapsed().as_nanos() as u64, Ordering::Relaxed);
                true
            }
            Err(err) => {
                self.metrics.write_errors.fetch_add(1, Ordering::Relaxed);
                log::error!("[STORE] append failed for symbol {}: {}", msg.symbol_id, err);
                false
            }
        }
    }

    /// Append the record bytes, honoring per-record durability.
    fn append(&mut self, msg: &MarketMessage) -> std::io::Result<()> {
        let flush_per_record = self.flush_policy == FlushPolicy::PerRecord;
        let handle = self.file_for(msg.symbol_id)?;
        handle.writer.write_all(&msg.to_bytes())?;
        if flush_per_record {
            handle.writer.flush()?;
        }
        handle.stats.messages_written += 1;
        handle.stats.bytes_written += MESSAGE_SIZE as u64;
        Ok(())
    }

    /// Flush every open tick file. After this returns, every record
    /// already appended is observable to subsequent readers.
    pub fn flush(&mut self) {
        for (symbol_id, handle) in &mut self.files {
            if let Err(err) = handle.writer.flush() {
                self.metrics.write_errors.fetch_add(1, Ordering::Relaxed);
                log::error!("[STORE] flush failed for symbol {}: {}", symbol_id, err);
            }
        }
    }

    /// Flush at a batch boundary, honoring the durability mode.
    pub fn flush_batch(&mut self) {
        if self.flush_policy == FlushPolicy::Batched {
            self.flush();
        }
    }

    /// Number of tick files opened so far.
    #[must_use]
    pub fn open_files(&self) -> usize {
        self.files.len()
    }

    /// Write statistics for one symbol, if it has a file.
    #[must_use]
    pub fn symbol_stats(&self, symbol_id: u32) -> Option<SymbolFileStats> {
        self.files.get(&symbol_id).map(|f| f.stats)
    }

    /// Path of a symbol's tick file.
    #[must_use]
    pub fn tick_path(&self, symbol_id: u32) -> PathBuf {
        self.base_path.join(format!("{symbol_id}.tick"))
    }

    /// Get or lazily create the file handle for a symbol.
    fn file_for(&mut self, symbol_id: u32) -> std::io::Result<&mut SymbolFile> {
        use std::collections::hash_map::Entry;
        match self.files.entry(symbol_id) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let path = self.base_path.join(format!("{symbol_id}.tick"));
                let file = OpenOptions::new().create(true).append(true).open(&path)?;
                log::debug!("[STORE] opened {}", path.display());
                Ok(entry.insert(SymbolFile {
                    writer: BufWriter::new(file),
                    stats: SymbolFileStats::default(),
                }))
            }
        }
    }
}

impl Drop for TickStorage {
    fn drop(&mut self) {
        self.flush();
    }
}
