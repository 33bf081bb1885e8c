// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Market data simulator: generates paced trade records onto the
//! multicast group, with a sent-message log for capture verification.
//!
//! Prices follow a bounded random walk per symbol; send pacing uses
//! absolute deadlines on the monotonic clock so the configured rate holds
//! under scheduling jitter.

use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tickcap::MarketMessage;

/// Send buffer request for the simulator socket (10 MiB).
const SEND_BUFFER_SIZE: usize = 10 * 1024 * 1024;

/// Backoff after a failed send.
const SEND_RETRY_BACKOFF: Duration = Duration::from_micros(100);

/// Simulator tuning.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Multicast destination group.
    pub multicast_addr: String,
    /// Destination UDP port.
    pub port: u16,
    /// Number of symbols to simulate (ids 1..=num_symbols).
    pub num_symbols: u32,
    /// Messages per second.
    pub msg_rate: u32,
    /// Price random walk standard bounds (fraction per step).
    pub price_volatility: f64,
    /// Trade size range.
    pub min_trade_size: u32,
    pub max_trade_size: u32,
    /// Hard price clamp.
    pub min_price: f64,
    pub max_price: f64,
    /// Starting price range.
    pub initial_price_min: f64,
    pub initial_price_max: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            multicast_addr: "239.255.0.1".to_string(),
            port: 12345,
            num_symbols: 100,
            msg_rate: 1000,
            price_volatility: 0.0005,
            min_trade_size: 100,
            max_trade_size: 10_000,
            min_price: 50.0,
            max_price: 1000.0,
            initial_price_min: 100.0,
            initial_price_max: 500.0,
        }
    }
}

/// Simulator send statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatorStats {
    pub messages_sent: u64,
    pub send_failures: u64,
}

/// Multicast market data generator on its own thread.
pub struct MarketDataSimulator {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    messages_sent: Arc<AtomicU64>,
    send_failures: Arc<AtomicU64>,
    message_log: Arc<DashMap<u64, MarketMessage>>,
}

impl MarketDataSimulator {
    /// Open the send socket and spawn the simulation thread.
    pub fn spawn(config: SimulatorConfig) -> io::Result<Self> {
        let group: Ipv4Addr = config
            .multicast_addr
            .parse()
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, format!("{err}")))?;
        if !group.is_multicast() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "destination is not a multicast address",
            ));
        }
        let dest = SocketAddrV4::new(group, config.port);

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_send_buffer_size(SEND_BUFFER_SIZE)?;
        socket.set_multicast_loop_v4(true)?;
        socket.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0).into())?;
        let socket: UdpSocket = socket.into();

        let running = Arc::new(AtomicBool::new(true));
        let messages_sent = Arc::new(AtomicU64::new(0));
        let send_failures = Arc::new(AtomicU64::new(0));
        let message_log = Arc::new(DashMap::new());

        let running_clone = Arc::clone(&running);
        let sent_clone = Arc::clone(&messages_sent);
        let failures_clone = Arc::clone(&send_failures);
        let log_clone = Arc::clone(&message_log);

        let handle = std::thread::Builder::new()
            .name("tickcap-sim".to_string())
            .spawn(move || {
                run_simulation(
                    &config,
                    &socket,
                    dest,
                    &running_clone,
                    &sent_clone,
                    &failures_clone,
                    &log_clone,
                );
            })?;

        Ok(Self {
            running,
            handle: Some(handle),
            messages_sent,
            send_failures,
            message_log,
        })
    }

    /// Stop the simulation thread. Idempotent.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// Send statistics.
    #[must_use]
    pub fn stats(&self) -> SimulatorStats {
        SimulatorStats {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
        }
    }

    /// Every message sent, keyed by sequence number, for verification.
    #[must_use]
    pub fn message_log(&self) -> Arc<DashMap<u64, MarketMessage>> {
        Arc::clone(&self.message_log)
    }
}

impl Drop for MarketDataSimulator {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Per-symbol random walk state.
struct SymbolState {
    last_price: f64,
}

fn run_simulation(
    config: &SimulatorConfig,
    socket: &UdpSocket,
    dest: SocketAddrV4,
    running: &AtomicBool,
    messages_sent: &AtomicU64,
    send_failures: &AtomicU64,
    message_log: &DashMap<u64, MarketMessage>,
) {
    log::info!("[SIM] starting at {} msgs/sec -> {}", config.msg_rate, dest);

    let mut rng = StdRng::from_entropy();
    let mut symbols: Vec<SymbolState> = (0..config.num_symbols)
        .map(|_| SymbolState {
            last_price: rng.gen_range(config.initial_price_min..config.initial_price_max),
        })
        .collect();

    let base_interval = Duration::from_nanos(1_000_000_000 / u64::from(config.msg_rate.max(1)));
    let mut next_send = Instant::now();
    let mut sequence = 0u64;

    let mut sent_this_second = 0u64;
    let mut rate_reset = Instant::now() + Duration::from_secs(1);

    while running.load(Ordering::Relaxed) {
        let now = Instant::now();

        if now >= rate_reset {
            log::debug!("[SIM] current rate: {} msgs/sec", sent_this_second);
            sent_this_second = 0;
            rate_reset += Duration::from_secs(1);
        }

        if now >= next_send {
            sequence += 1;
            let msg = generate_message(config, &mut rng, &mut symbols, sequence);
            message_log.insert(msg.sequence_number, msg);

            match socket.send_to(&msg.to_bytes(), dest) {
                Ok(_) => {
                    let sent = messages_sent.fetch_add(1, Ordering::Relaxed) + 1;
                    sent_this_second += 1;
                    if sent % 1000 == 0 {
                        log::debug!("[SIM] sent {} messages", sent);
                    }
                    next_send += base_interval;
                }
                Err(err) => {
                    let failures = send_failures.fetch_add(1, Ordering::Relaxed) + 1;
                    log::warn!(
                        "[SIM] send failed for seq {} ({} total): {}",
                        msg.sequence_number,
                        failures,
                        err
                    );
                    next_send += SEND_RETRY_BACKOFF;
                }
            }
        }

        // Sleep off any schedule headroom.
        if let Some(sleep_for) = next_send.checked_duration_since(Instant::now()) {
            if !sleep_for.is_zero() {
                std::thread::sleep(sleep_for);
            }
        }
    }

    log::info!(
        "[SIM] stopping, total sent: {}",
        messages_sent.load(Ordering::Relaxed)
    );
}

/// Generate the next trade with a bounded per-symbol price walk.
fn generate_message(
    config: &SimulatorConfig,
    rng: &mut StdRng,
    symbols: &mut [SymbolState],
    sequence: u64,
) -> MarketMessage {
    let symbol_id = rng.gen_range(1..=config.num_symbols);
    let state = &mut symbols[(symbol_id - 1) as usize];

    if config.price_volatility > 0.0 {
        let step = rng.gen_range(-config.price_volatility..config.price_volatility);
        state.last_price =
            (state.last_price * (1.0 + step)).clamp(config.min_price, config.max_price);
    }

    let size = rng.gen_range(config.min_trade_size..=config.max_trade_size);
    let timestamp_ns = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);

    let mut msg = MarketMessage::trade(sequence, timestamp_ns, symbol_id, state.last_price, size, 0);
    msg.update_checksum();
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_messages_are_valid_and_checksummed() {
        let config = SimulatorConfig {
            num_symbols: 10,
            ..SimulatorConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(7);
        let mut symbols: Vec<SymbolState> = (0..10)
            .map(|_| SymbolState { last_price: 200.0 })
            .collect();

        for seq in 1..=1000u64 {
            let msg = generate_message(&config, &mut rng, &mut symbols, seq);
            assert!(msg.is_valid(), "seq {seq} must pass the capture gate");
            assert!(msg.verify_checksum());
            assert_eq!(msg.sequence_number, seq);
            assert!(msg.trade_price() >= config.min_price);
            assert!(msg.trade_price() <= config.max_price);
            assert!(msg.trade_size() >= config.min_trade_size);
            assert!(msg.trade_size() <= config.max_trade_size);
        }
    }
}
