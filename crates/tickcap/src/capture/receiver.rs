// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Multicast receive thread: datagrams in, validated records into the ring.
//!
//! # Architecture
//!
//! ```text
//! recv_from(scratch_buf)
//!     v
//! slice into 64-byte records (trailing fragment discarded)
//!     v
//! validity gate (+ checksum when enabled)
//!     v
//! SpscRing::try_push  -- full? count drop, keep going
//! ```
//!
//! The loop never retries an enqueue and never blocks on the ring; under
//! overload the drop counter is the backpressure signal. Cancellation is
//! cooperative: `stop()` clears the running flag, then shuts down the read
//! half of the socket to unblock a pending receive.

use crate::config::RECORD_LOG_INTERVAL;
use crate::message::{MarketMessage, MESSAGE_SIZE};
use crate::ring::SpscRing;
use crate::stats::CaptureMetrics;
use std::io;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use super::socket::shutdown_read;

/// Receiver tuning, split off the full capture config.
#[derive(Debug, Clone)]
pub struct ReceiverOptions {
    /// Scratch buffer size for a single datagram.
    pub udp_buffer_size: usize,
    /// Reject records whose stored checksum does not match.
    pub verify_checksums: bool,
}

/// Dedicated receive thread feeding the ring (the single producer).
pub struct MulticastReceiver {
    socket: Arc<UdpSocket>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl MulticastReceiver {
    /// Spawn the receive thread on an already-configured socket.
    pub fn spawn(
        socket: Arc<UdpSocket>,
        ring: Arc<SpscRing<MarketMessage>>,
        metrics: Arc<CaptureMetrics>,
        options: ReceiverOptions,
    ) -> io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = Arc::clone(&running);
        let socket_clone = Arc::clone(&socket);

        let handle = std::thread::Builder::new()
            .name("tickcap-rx".to_string())
            .spawn(move || {
                run_loop(socket_clone, ring, metrics, running_clone, &options);
            })?;

        Ok(Self {
            socket,
            running,
            handle: Some(handle),
        })
    }

    /// Stop the receive thread: clear the flag, unblock the pending read,
    /// join. Idempotent.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        shutdown_read(&self.socket);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MulticastReceiver {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Main receive loop (runs in the dedicated thread).
fn run_loop(
    socket: Arc<UdpSocket>,
    ring: Arc<SpscRing<MarketMessage>>,
    metrics: Arc<CaptureMetrics>,
    running: Arc<AtomicBool>,
    options: &ReceiverOptions,
) {
    let mut scratch = vec![0u8; options.udp_buffer_size];
    log::info!(
        "[RX] capture loop started, record size {} bytes, scratch {} bytes",
        MESSAGE_SIZE,
        scratch.len()
    );

    while running.load(Ordering::Relaxed) {
        match socket.recv_from(&mut scratch) {
            Ok((len, _src)) => {
                ingest_datagram(&ring, &metrics, options.verify_checksums, &scratch[..len]);
            }
            Err(err) => {
                if !running.load(Ordering::Relaxed) {
                    // Socket was shut down by stop(); normal exit.
                    log::debug!("[RX] receive interrupted for shutdown");
                    break;
                }
                log::warn!("[RX] receive error (continuing): {}", err);
            }
        }
    }

    log::info!(
        "[RX] capture loop exiting: received={} dropped={} invalid={}",
        metrics.messages_received.load(Ordering::Relaxed),
        metrics.messages_dropped.load(Ordering::Relaxed),
        metrics.messages_invalid.load(Ordering::Relaxed)
    );
}

/// Slice one datagram into records and enqueue the valid ones.
///
/// Datagram framing contract: consecutive 64-byte records with no headers
/// or separators; a trailing fragment shorter than one record is garbage
/// and silently discarded.
pub(crate) fn ingest_datagram(
    ring: &SpscRing<MarketMessage>,
    metrics: &CaptureMetrics,
    verify_checksums: bool,
    datagram: &[u8],
) {
    for chunk in datagram.chunks_exact(MESSAGE_SIZE) {
        let Some(msg) = MarketMessage::from_bytes(chunk) else {
            // chunks_exact only yields full records.
            continue;
        };

        if !msg.is_valid() {
            let invalid = metrics.messages_invalid.fetch_add(1, Ordering::Relaxed) + 1;
            if invalid % RECORD_LOG_INTERVAL == 0 {
                log::warn!(
                    "[RX] invalid record #{}: seq={} sym={} kind={} price={:.2}",
                    invalid,
                    msg.sequence_number,
                    msg.symbol_id,
                    msg.kind,
                    msg.trade_price()
                );
            }
            continue;
        }

        if verify_checksums && !msg.verify_checksum() {
            metrics.checksum_errors.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        if ring.try_push(msg) {
            let received = metrics.messages_received.fetch_add(1, Ordering::Relaxed) + 1;
            if received % RECORD_LOG_INTERVAL == 0 {
                log::debug!("[RX] received {} records", received);
            }
        } else {
            let dropped = metrics.messages_dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped % RECORD_LOG_INTERVAL == 0 {
                log::warn!("[RX] ring full, dropped {} records", dropped);
            }
        }
    }
}
