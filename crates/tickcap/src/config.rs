// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Capture configuration: defaults and the per-node config struct.
//!
//! All tunables flow through [`CaptureConfig`] into the node at
//! construction; there are no configuration singletons.

use crate::storage::FlushPolicy;
use std::path::PathBuf;
use std::time::Duration;

/// Default multicast group for market data feeds.
pub const DEFAULT_MULTICAST_GROUP: &str = "239.255.0.1";

/// Default UDP port.
pub const DEFAULT_PORT: u16 = 12345;

/// Default ring capacity (entries; rounded up to a power of two).
pub const DEFAULT_RING_CAPACITY: usize = 131_072;

/// Default scratch buffer for a single datagram (256 KiB).
pub const DEFAULT_UDP_BUFFER_SIZE: usize = 262_144;

/// Default kernel SO_RCVBUF request (32 MiB).
pub const DEFAULT_SOCKET_BUFFER_SIZE: usize = 32 * 1024 * 1024;

/// Default writer bulk-pop ceiling.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 256;

/// Writer idle sleep when the ring is empty.
pub const WRITER_IDLE_SLEEP: Duration = Duration::from_micros(100);

/// Stats reporter cadence.
pub const STATS_INTERVAL: Duration = Duration::from_secs(1);

/// Rate limit for per-record diagnostics (one log line per this many).
pub const RECORD_LOG_INTERVAL: u64 = 1000;

/// Configuration for one capture node.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// IPv4 multicast group to join.
    pub multicast_addr: String,
    /// UDP port to bind.
    pub port: u16,
    /// Requested ring capacity (rounded up to a power of two).
    pub ring_buffer_size: usize,
    /// Scratch buffer size for a single datagram.
    pub udp_buffer_size: usize,
    /// Kernel receive buffer (SO_RCVBUF) request.
    pub socket_buffer_size: usize,
    /// Writer bulk-pop ceiling.
    pub max_batch_size: usize,
    /// Base path for per-symbol tick files.
    pub output_dir: PathBuf,
    /// Record receive-time latency metrics from message timestamps.
    pub enable_timestamps: bool,
    /// Verify record checksums on receive and store.
    pub verify_checksums: bool,
    /// Tick file durability mode.
    pub flush_policy: FlushPolicy,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            multicast_addr: DEFAULT_MULTICAST_GROUP.to_string(),
            port: DEFAULT_PORT,
            ring_buffer_size: DEFAULT_RING_CAPACITY,
            udp_buffer_size: DEFAULT_UDP_BUFFER_SIZE,
            socket_buffer_size: DEFAULT_SOCKET_BUFFER_SIZE,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            output_dir: PathBuf::from("."),
            enable_timestamps: false,
            verify_checksums: true,
            flush_policy: FlushPolicy::PerRecord,
        }
    }
}

impl CaptureConfig {
    /// Config with defaults writing under `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    /// Set the multicast group.
    #[must_use]
    pub fn multicast_addr(mut self, addr: impl Into<String>) -> Self {
        self.multicast_addr = addr.into();
        self
    }

    /// Set the UDP port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the requested ring capacity.
    #[must_use]
    pub fn ring_buffer_size(mut self, size: usize) -> Self {
        self.ring_buffer_size = size;
        self
    }

    /// Set the writer bulk-pop ceiling.
    #[must_use]
    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    /// Enable or disable latency timestamps.
    #[must_use]
    pub fn enable_timestamps(mut self, enabled: bool) -> Self {
        self.enable_timestamps = enabled;
        self
    }

    /// Enable or disable checksum verification.
    #[must_use]
    pub fn verify_checksums(mut self, enabled: bool) -> Self {
        self.verify_checksums = enabled;
        self
    }

    /// Set the tick file durability mode.
    #[must_use]
    pub fn flush_policy(mut self, policy: FlushPolicy) -> Self {
        self.flush_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let config = CaptureConfig::default();
        assert_eq!(config.multicast_addr, "239.255.0.1");
        assert_eq!(config.port, 12345);
        assert_eq!(config.ring_buffer_size, 131_072);
        assert_eq!(config.udp_buffer_size, 262_144);
        assert_eq!(config.socket_buffer_size, 33_554_432);
        assert_eq!(config.max_batch_size, 256);
        assert!(config.verify_checksums);
        assert!(!config.enable_timestamps);
    }

    #[test]
    fn builder_chain() {
        let config = CaptureConfig::new("/tmp/ticks")
            .port(9000)
            .ring_buffer_size(4096)
            .max_batch_size(64)
            .verify_checksums(false)
            .flush_policy(FlushPolicy::Batched);
        assert_eq!(config.port, 9000);
        assert_eq!(config.ring_buffer_size, 4096);
        assert_eq!(config.max_batch_size, 64);
        assert!(!config.verify_checksums);
        assert_eq!(config.flush_policy, FlushPolicy::Batched);
    }
}
