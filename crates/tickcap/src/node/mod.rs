// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Capture node supervisor.
//!
//! Owns the ring, the receive socket, the writer, and the stats reporter;
//! starts them in dependency order and coordinates shutdown:
//!
//! ```text
//! start:  ring -> writer thread -> receiver thread -> reporter
//! stop:   receiver (flag + socket shutdown, join)
//!         -> writer (drain ring, flush, join)
//!         -> reporter (join)
//! ```
//!
//! The ring is the only shared mutable state on the hot path; the
//! supervisor hands the producer end to the receiver and the consumer end
//! to the writer. No mutex is taken anywhere in the pipeline.

mod writer;

pub use writer::{CaptureWriter, WriterOptions};

use crate::capture::{open_multicast_socket, MulticastReceiver, ReceiverOptions};
use crate::config::{CaptureConfig, STATS_INTERVAL};
use crate::error::{CaptureError, Result};
use crate::message::MarketMessage;
use crate::ring::SpscRing;
use crate::stats::{CaptureMetrics, CaptureStats};
use crate::storage::TickStorage;
use std::io;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Sleep granularity inside the reporter, so stop() joins promptly.
const REPORTER_POLL: Duration = Duration::from_millis(50);

/// One capture node: receiver -> ring -> writer, plus a 1 Hz stats line.
///
/// Construction opens the socket and the output directory so that all
/// configuration errors surface before any thread starts. A node runs
/// once: `start` consumes the storage, `stop` tears the pipeline down.
pub struct CaptureNode {
    config: CaptureConfig,
    ring: Arc<SpscRing<MarketMessage>>,
    metrics: Arc<CaptureMetrics>,
    socket: Arc<UdpSocket>,
    storage: Option<TickStorage>,
    receiver: Option<MulticastReceiver>,
    writer: Option<CaptureWriter>,
    reporter: Option<Reporter>,
}

impl CaptureNode {
    /// Build the node: ring, socket (bound and joined to the group), and
    /// output directory. Fatal on invalid multicast address, bind failure,
    /// or unusable output path.
    pub fn new(config: CaptureConfig) -> Result<Self> {
        let metrics = Arc::new(CaptureMetrics::new());
        let ring = Arc::new(SpscRing::new(config.ring_buffer_size));
        let socket = Arc::new(open_multicast_socket(&config)?);
        let storage = TickStorage::new(
            &config.output_dir,
            config.flush_policy,
            Arc::clone(&metrics),
        )?;

        Ok(Self {
            config,
            ring,
            metrics,
            socket,
            storage: Some(storage),
            receiver: None,
            writer: None,
            reporter: None,
        })
    }

    /// Start the pipeline: writer first (blocked on the empty ring), then
    /// the receiver, then the stats reporter.
    pub fn start(&mut self) -> Result<()> {
        let storage = self.storage.take().ok_or(CaptureError::AlreadyRunning)?;

        let writer = CaptureWriter::spawn(
            Arc::clone(&self.ring),
            storage,
            Arc::clone(&self.metrics),
            WriterOptions {
                max_batch_size: self.config.max_batch_size,
                verify_checksums: self.config.verify_checksums,
                enable_timestamps: self.config.enable_timestamps,
            },
        )?;
        self.writer = Some(writer);

        let receiver = MulticastReceiver::spawn(
            Arc::clone(&self.socket),
            Arc::clone(&self.ring),
            Arc::clone(&self.metrics),
            ReceiverOptions {
                udp_buffer_size: self.config.udp_buffer_size,
                verify_checksums: self.config.verify_checksums,
            },
        )?;
        self.receiver = Some(receiver);

        self.reporter = Some(Reporter::spawn(
            Arc::clone(&self.metrics),
            Arc::clone(&self.ring),
            STATS_INTERVAL,
        )?);

        log::info!(
            "[NODE] capture started on {}:{}, ring capacity {}, output {}",
            self.config.multicast_addr,
            self.config.port,
            self.ring.capacity(),
            self.config.output_dir.display()
        );
        Ok(())
    }

    /// Stop the pipeline in order: receiver, then writer (which drains the
    /// ring and flushes), then the reporter. Idempotent; on return every
    /// enqueued record is on disk.
    pub fn stop(&mut self) {
        if let Some(mut receiver) = self.receiver.take() {
            receiver.stop();
        }
        if let Some(mut writer) = self.writer.take() {
            writer.stop();
        }
        if let Some(mut reporter) = self.reporter.take() {
            reporter.stop();
        }
        log::info!("[NODE] capture stopped");
    }

    /// Whether the pipeline threads are running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.receiver.is_some()
    }

    /// Statistics snapshot: a pure function over the atomic counters plus
    /// the ring's own figures.
    #[must_use]
    pub fn stats(&self) -> CaptureStats {
        CaptureStats::sample(
            &self.metrics,
            self.ring.len() as u64,
            self.ring.total_pushed(),
            self.ring.total_popped(),
            self.ring.push_failures(),
        )
    }

    /// Node configuration.
    #[must_use]
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }
}

impl Drop for CaptureNode {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Low-frequency stats reporter with absolute scheduled deadlines, so the
/// report cadence stays stable under scheduling jitter.
struct Reporter {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Reporter {
    fn spawn(
        metrics: Arc<CaptureMetrics>,
        ring: Arc<SpscRing<MarketMessage>>,
        interval: Duration,
    ) -> io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = Arc::clone(&running);

        let handle = std::thread::Builder::new()
            .name("tickcap-stats".to_string())
            .spawn(move || {
                Self::run_loop(metrics, ring, running_clone, interval);
            })?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    fn run_loop(
        metrics: Arc<CaptureMetrics>,
        ring: Arc<SpscRing<MarketMessage>>,
        running: Arc<AtomicBool>,
        interval: Duration,
    ) {
        let mut next_report = Instant::now() + interval;
        let mut last_processed = 0u64;

        while running.load(Ordering::Relaxed) {
            let now = Instant::now();
            if now < next_report {
                std::thread::sleep(REPORTER_POLL.min(next_report - now));
                continue;
            }
            next_report += interval;

            let stats = CaptureStats::sample(
                &metrics,
                ring.len() as u64,
                ring.total_pushed(),
                ring.total_popped(),
                ring.push_failures(),
            );
            let rate = stats.messages_processed.saturating_sub(last_processed);
            last_processed = stats.messages_processed;

            log::info!(
                "[STATS] received={} processed={} dropped={} invalid={} ring={} rate={:.2}k/s",
                stats.messages_received,
                stats.messages_processed,
                stats.messages_dropped,
                stats.messages_invalid,
                stats.ring_depth,
                rate as f64 / 1000.0
            );
        }
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Reporter {
    fn drop(&mut self) {
        self.stop();
    }
}
