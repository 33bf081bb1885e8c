// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # tickcap - market data tick capture
//!
//! High-throughput capture of fixed-size binary market messages from UDP
//! multicast, persisted to per-symbol tick files.
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------+
//! |                        CaptureNode                            |
//! |                                                               |
//! |  UDP multicast --> MulticastReceiver (producer thread)        |
//! |                         |  validate + frame 64-byte records   |
//! |                         v                                     |
//! |                     SpscRing  (wait-free, bounded)            |
//! |                         |  pop_bulk                           |
//! |                         v                                     |
//! |                  CaptureWriter (consumer thread)              |
//! |                         |  checksum / gap check               |
//! |                         v                                     |
//! |                   TickStorage  ({symbol_id}.tick files)       |
//! +---------------------------------------------------------------+
//! ```
//!
//! Three long-lived threads participate: the receiver, the writer, and a
//! 1 Hz stats reporter. The ring is the only shared mutable state on the
//! hot path; backpressure is a counted drop, never a block.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tickcap::{CaptureConfig, CaptureNode};
//!
//! fn main() -> tickcap::Result<()> {
//!     let config = CaptureConfig::new("/var/lib/ticks")
//!         .multicast_addr("239.255.0.1")
//!         .port(12345);
//!
//!     let mut node = CaptureNode::new(config)?;
//!     node.start()?;
//!     std::thread::sleep(std::time::Duration::from_secs(60));
//!     node.stop();
//!
//!     let stats = node.stats();
//!     println!("stored {} records", stats.messages_stored);
//!     Ok(())
//! }
//! ```

/// Multicast socket setup and the receive thread.
pub mod capture;
/// Capture configuration and defaults.
pub mod config;
/// Error taxonomy.
pub mod error;
/// The fixed 64-byte market message.
pub mod message;
/// Capture node supervisor and writer thread.
pub mod node;
/// Wait-free bounded SPSC ring buffer.
pub mod ring;
/// Pipeline counters and statistics snapshots.
pub mod stats;
/// Per-symbol tick file storage.
pub mod storage;

pub use capture::{MulticastReceiver, ReceiverOptions};
pub use config::CaptureConfig;
pub use error::{CaptureError, Result};
pub use message::{MarketMessage, MessageType, MAX_SYMBOL_ID, MESSAGE_SIZE};
pub use node::{CaptureNode, CaptureWriter, WriterOptions};
pub use ring::SpscRing;
pub use stats::{CaptureMetrics, CaptureStats};
pub use storage::{FlushPolicy, TickStorage};
