// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pipeline counters and the statistics snapshot.
//!
//! Counters are plain atomics updated with Relaxed ordering from the hot
//! paths and readable from any thread without synchronization. The
//! snapshot is a pure function over them.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared atomic counters for one capture pipeline.
///
/// The receiver owns the receive-side counters, the writer the store-side
/// ones; the stats reporter and external observers only read.
#[derive(Debug, Default)]
pub struct CaptureMetrics {
    /// Valid records successfully enqueued by the receiver.
    pub messages_received: AtomicU64,
    /// Valid records dropped because the ring was full.
    pub messages_dropped: AtomicU64,
    /// Records that failed the validity gate.
    pub messages_invalid: AtomicU64,
    /// Records rejected by checksum verification.
    pub checksum_errors: AtomicU64,
    /// Sequence discontinuities observed by the writer.
    pub sequence_gaps: AtomicU64,
    /// Records appended to tick files.
    pub messages_stored: AtomicU64,
    /// Bytes appended to tick files.
    pub bytes_written: AtomicU64,
    /// Records aborted at the writer (bad symbol, file open/append failure).
    pub write_errors: AtomicU64,
    /// Cumulative store() wall time in nanoseconds.
    pub write_time_ns: AtomicU64,

    // Receive-to-store latency, tracked when enable_timestamps is set.
    latency_total_ns: AtomicU64,
    latency_max_ns: AtomicU64,
    latency_samples: AtomicU64,
}

impl CaptureMetrics {
    /// Fresh zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one receive-to-store latency sample.
    pub fn record_latency(&self, latency_ns: u64) {
        self.latency_total_ns.fetch_add(latency_ns, Ordering::Relaxed);
        self.latency_max_ns.fetch_max(latency_ns, Ordering::Relaxed);
        self.latency_samples.fetch_add(1, Ordering::Relaxed);
    }

    /// Average latency over all samples, zero when none were taken.
    #[must_use]
    pub fn avg_latency_ns(&self) -> u64 {
        let samples = self.latency_samples.load(Ordering::Relaxed);
        if samples == 0 {
            return 0;
        }
        self.latency_total_ns.load(Ordering::Relaxed) / samples
    }

    /// Maximum observed latency.
    #[must_use]
    pub fn max_latency_ns(&self) -> u64 {
        self.latency_max_ns.load(Ordering::Relaxed)
    }
}

/// Point-in-time statistics snapshot.
///
/// `messages_processed` reports end-to-end progress: it is the writer's
/// stored counter, not the receiver-level `received - dropped` estimate.
/// Serializable so a status coordinator can publish it as-is.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CaptureStats {
    pub messages_received: u64,
    pub messages_processed: u64,
    pub messages_dropped: u64,
    pub messages_invalid: u64,
    pub checksum_errors: u64,
    pub sequence_gaps: u64,
    pub messages_stored: u64,
    pub bytes_written: u64,
    pub write_errors: u64,
    /// Records sitting in the ring at sample time.
    pub ring_depth: u64,
    pub total_pushed: u64,
    pub total_popped: u64,
    pub push_failures: u64,
    pub avg_latency_ns: u64,
    pub max_latency_ns: u64,
}

impl CaptureStats {
    /// Snapshot the shared counters. Ring figures are supplied by the
    /// caller, which owns the ring handle.
    #[must_use]
    pub fn sample(
        metrics: &CaptureMetrics,
        ring_depth: u64,
        total_pushed: u64,
        total_popped: u64,
        push_failures: u64,
    ) -> Self {
        Self {
            messages_received: metrics.messages_received.load(Ordering::Relaxed),
            messages_processed: metrics.messages_stored.load(Ordering::Relaxed),
            messages_dropped: metrics.messages_dropped.load(Ordering::Relaxed),
            messages_invalid: metrics.messages_invalid.load(Ordering::Relaxed),
            checksum_errors: metrics.checksum_errors.load(Ordering::Relaxed),
            sequence_gaps: metrics.sequence_gaps.load(Ordering::Relaxed),
            messages_stored: metrics.messages_stored.load(Ordering::Relaxed),
            bytes_written: metrics.bytes_written.load(Ordering::Relaxed),
            write_errors: metrics.write_errors.load(Ordering::Relaxed),
            ring_depth,
            total_pushed,
            total_popped,
            push_failures,
            avg_latency_ns: metrics.avg_latency_ns(),
            max_latency_ns: metrics.max_latency_ns(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let metrics = CaptureMetrics::new();
        metrics.messages_received.store(100, Ordering::Relaxed);
        metrics.messages_dropped.store(3, Ordering::Relaxed);
        metrics.messages_stored.store(90, Ordering::Relaxed);
        metrics.bytes_written.store(90 * 64, Ordering::Relaxed);

        let stats = CaptureStats::sample(&metrics, 7, 97, 90, 3);
        assert_eq!(stats.messages_received, 100);
        assert_eq!(stats.messages_processed, 90);
        assert_eq!(stats.messages_dropped, 3);
        assert_eq!(stats.bytes_written, 5760);
        assert_eq!(stats.ring_depth, 7);
    }

    #[test]
    fn latency_accounting() {
        let metrics = CaptureMetrics::new();
        assert_eq!(metrics.avg_latency_ns(), 0);

        metrics.record_latency(100);
        metrics.record_latency(300);
        assert_eq!(metrics.avg_latency_ns(), 200);
        assert_eq!(metrics.max_latency_ns(), 300);
    }
}
