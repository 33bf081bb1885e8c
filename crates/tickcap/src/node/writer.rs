// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Writer thread: drains the ring in bulk and persists records by symbol.
//!
//! The writer is the ring's single consumer. Per record it runs the
//! checksum check (when enabled), sequence-gap detection, and the store;
//! per batch it honors the batched flush policy. On stop it drains the
//! ring to empty and flushes every open tick file before exiting, so stop
//! never loses enqueued records.

use crate::config::WRITER_IDLE_SLEEP;
use crate::message::MarketMessage;
use crate::ring::SpscRing;
use crate::stats::CaptureMetrics;
use crate::storage::TickStorage;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{SystemTime, UNIX_EPOCH};

/// Writer tuning, split off the full capture config.
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Bulk-pop ceiling per iteration.
    pub max_batch_size: usize,
    /// Re-verify record checksums before storing.
    pub verify_checksums: bool,
    /// Sample receive-to-store latency from record timestamps.
    pub enable_timestamps: bool,
}

/// Dedicated writer thread draining the ring (the single consumer).
pub struct CaptureWriter {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CaptureWriter {
    /// Spawn the writer thread. Takes ownership of the storage; it is
    /// writer-local from here on.
    pub fn spawn(
        ring: Arc<SpscRing<MarketMessage>>,
        storage: TickStorage,
        metrics: Arc<CaptureMetrics>,
        options: WriterOptions,
    ) -> io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = Arc::clone(&running);

        let handle = std::thread::Builder::new()
            .name("tickcap-writer".to_string())
            .spawn(move || {
                run_loop(ring, storage, metrics, running_clone, &options);
            })?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Signal the writer to stop and wait for it to drain and flush.
    /// Idempotent.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CaptureWriter {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Main writer loop (runs in the dedicated thread).
///
/// Exits only once the stop flag is clear AND the ring is empty, which is
/// what guarantees the shutdown drain.
fn run_loop(
    ring: Arc<SpscRing<MarketMessage>>,
    mut storage: TickStorage,
    metrics: Arc<CaptureMetrics>,
    running: Arc<AtomicBool>,
    options: &WriterOptions,
) {
    let mut batch = Vec::with_capacity(options.max_batch_size);
    let mut last_sequence = 0u64;
    log::info!("[WRITER] started, max batch {}", options.max_batch_size);

    loop {
        let popped = ring.pop_bulk(&mut batch, options.max_batch_size);
        if popped == 0 {
            if !running.load(Ordering::Relaxed) {
                break;
            }
            std::thread::sleep(WRITER_IDLE_SLEEP);
            continue;
        }

        for msg in batch.drain(..) {
            process_record(&msg, &mut storage, &metrics, &mut last_sequence, options);
        }
        storage.flush_batch();
    }

    storage.flush();
    log::info!(
        "[WRITER] exiting: stored={} gaps={}",
        metrics.messages_stored.load(Ordering::Relaxed),
        metrics.sequence_gaps.load(Ordering::Relaxed)
    );
}

/// Post-process and persist one record, in ring order.
fn process_record(
    msg: &MarketMessage,
    storage: &mut TickStorage,
    metrics: &CaptureMetrics,
    last_sequence: &mut u64,
    options: &WriterOptions,
) {
    if options.verify_checksums && !msg.verify_checksum() {
        metrics.checksum_errors.fetch_add(1, Ordering::Relaxed);
        return;
    }

    if *last_sequence > 0 && msg.sequence_number > *last_sequence + 1 {
        metrics.sequence_gaps.fetch_add(1, Ordering::Relaxed);
        log::debug!(
            "[WRITER] sequence gap: {} -> {}",
            last_sequence,
            msg.sequence_number
        );
    }
    *last_sequence = msg.sequence_number;

    if storage.store(msg) && options.enable_timestamps {
        let now_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        if now_ns >= msg.timestamp_ns {
            metrics.record_latency(now_ns - msg.timestamp_ns);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MESSAGE_SIZE;
    use crate::storage::FlushPolicy;
    use std::time::Duration;
    use tempfile::tempdir;

    fn record(seq: u64, symbol_id: u32) -> MarketMessage {
        let mut msg = MarketMessage::trade(seq, 3000, symbol_id, 99.5, 42, 0);
        msg.update_checksum();
        msg
    }

    fn options() -> WriterOptions {
        WriterOptions {
            max_batch_size: 32,
            verify_checksums: true,
            enable_timestamps: false,
        }
    }

    #[test]
    fn stop_drains_ring_and_flushes() {
        let dir = tempdir().expect("tempdir");
        let ring = Arc::new(SpscRing::new(2048));
        let metrics = Arc::new(CaptureMetrics::new());
        let storage =
            TickStorage::new(dir.path(), FlushPolicy::Batched, Arc::clone(&metrics))
                .expect("storage");

        for seq in 1..=1023u64 {
            assert!(ring.try_push(record(seq, 1)));
        }

        let mut writer =
            CaptureWriter::spawn(Arc::clone(&ring), storage, Arc::clone(&metrics), options())
                .expect("spawn");
        writer.stop();

        assert!(ring.is_empty(), "writer must drain before exit");
        assert_eq!(metrics.messages_stored.load(Ordering::Relaxed), 1023);

        let bytes = std::fs::read(dir.path().join("1.tick")).expect("read");
        assert_eq!(bytes.len(), 1023 * MESSAGE_SIZE);
        // No partially written record at the tail.
        assert_eq!(bytes.len() % MESSAGE_SIZE, 0);
    }

    #[test]
    fn partitions_across_symbols_in_ring_order() {
        let dir = tempdir().expect("tempdir");
        let ring = Arc::new(SpscRing::new(128));
        let metrics = Arc::new(CaptureMetrics::new());
        let storage =
            TickStorage::new(dir.path(), FlushPolicy::PerRecord, Arc::clone(&metrics))
                .expect("storage");

        let mut writer =
            CaptureWriter::spawn(Arc::clone(&ring), storage, Arc::clone(&metrics), options())
                .expect("spawn");

        for seq in 1..=60u64 {
            let symbol = (seq % 3 + 1) as u32;
            assert!(ring.try_push(record(seq, symbol)));
        }

        // Let the writer catch up before stopping.
        while metrics.messages_stored.load(Ordering::Relaxed) < 60 {
            std::thread::sleep(Duration::from_millis(1));
        }
        writer.stop();

        for symbol in 1..=3u32 {
            let bytes = std::fs::read(dir.path().join(format!("{symbol}.tick"))).expect("read");
            assert_eq!(bytes.len(), 20 * MESSAGE_SIZE);
            // Monotone sequence numbers within each symbol file.
            let mut prev = 0u64;
            for chunk in bytes.chunks_exact(MESSAGE_SIZE) {
                let msg = MarketMessage::from_bytes(chunk).expect("record");
                assert_eq!(msg.symbol_id, symbol);
                assert!(msg.sequence_number > prev);
                prev = msg.sequence_number;
            }
        }
    }

    #[test]
    fn detects_sequence_gaps() {
        let dir = tempdir().expect("tempdir");
        let ring = Arc::new(SpscRing::new(64));
        let metrics = Arc::new(CaptureMetrics::new());
        let storage =
            TickStorage::new(dir.path(), FlushPolicy::PerRecord, Arc::clone(&metrics))
                .expect("storage");

        for seq in [1u64, 2, 5, 6, 10] {
            assert!(ring.try_push(record(seq, 1)));
        }

        let mut writer =
            CaptureWriter::spawn(Arc::clone(&ring), storage, Arc::clone(&metrics), options())
                .expect("spawn");
        writer.stop();

        // 2 -> 5 and 6 -> 10.
        assert_eq!(metrics.sequence_gaps.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.messages_stored.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn corrupted_record_dropped_before_store() {
        let dir = tempdir().expect("tempdir");
        let ring = Arc::new(SpscRing::new(64));
        let metrics = Arc::new(CaptureMetrics::new());
        let storage =
            TickStorage::new(dir.path(), FlushPolicy::PerRecord, Arc::clone(&metrics))
                .expect("storage");

        let mut corrupted = record(1, 1);
        corrupted.checksum ^= 1;
        assert!(ring.try_push(corrupted));
        assert!(ring.try_push(record(2, 1)));

        let mut writer =
            CaptureWriter::spawn(Arc::clone(&ring), storage, Arc::clone(&metrics), options())
                .expect("spawn");
        writer.stop();

        assert_eq!(metrics.checksum_errors.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.messages_stored.load(Ordering::Relaxed), 1);

        let bytes = std::fs::read(dir.path().join("1.tick")).expect("read");
        assert_eq!(bytes.len(), MESSAGE_SIZE);
    }
}
