// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! tickcap-bench - capture benchmark harness
//!
//! Runs the market data simulator against a capture node over a rate
//! ladder, reports capture rates, and optionally verifies every persisted
//! record against the simulator's sent log.
//!
//! ```bash
//! # Default ladder (10/50/100/200/500 msgs/sec), 60s per rate
//! tickcap-bench --output-dir /tmp/tick_bench
//!
//! # Custom rates with latency measurement
//! tickcap-bench --rate 1000 --rate 5000 --duration 10 --latency
//! ```
//!
//! Exits 0 when every rate holds a capture rate of at least 99%, 1
//! otherwise.

mod simulator;
mod verify;

use clap::Parser;
use colored::Colorize;
use serde::Serialize;
use simulator::{MarketDataSimulator, SimulatorConfig};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tickcap::{CaptureConfig, CaptureNode, FlushPolicy};
use verify::verify_capture;

/// Capture rate below which the ladder stops and the run fails.
const CAPTURE_RATE_THRESHOLD: f64 = 99.0;

/// Symbols simulated per benchmark run.
const BENCH_NUM_SYMBOLS: u32 = 10;

/// Pause between ladder runs.
const INTER_RUN_PAUSE: Duration = Duration::from_secs(5);

/// Capture benchmark harness
#[derive(Parser, Debug)]
#[command(name = "tickcap-bench")]
#[command(version, about = "Benchmark tick capture against a simulated feed")]
struct Args {
    /// Output directory for captured data
    #[arg(long, default_value = "/tmp/tick_bench")]
    output_dir: PathBuf,

    /// Benchmark duration per rate in seconds
    #[arg(long, default_value_t = 60)]
    duration: u64,

    /// Enable latency measurements
    #[arg(long)]
    latency: bool,

    /// Verify captured messages against the sent log
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    verify: bool,

    /// Message rates to test (msgs/sec); repeatable
    #[arg(long = "rate")]
    rates: Vec<u32>,

    /// Multicast group
    #[arg(long, default_value = "239.255.0.1")]
    addr: String,

    /// UDP port
    #[arg(long, default_value_t = 12345)]
    port: u16,

    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct BenchmarkResult {
    target_rate: u32,
    messages_sent: u64,
    messages_captured: u64,
    messages_dropped: u64,
    capture_rate: f64,
    avg_latency_ns: u64,
    max_latency_ns: u64,
    run_time_secs: f64,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    if let Err(err) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        eprintln!("{}: {}", "Error".red().bold(), err);
        std::process::exit(1);
    }

    let rates = if args.rates.is_empty() {
        vec![10, 50, 100, 200, 500]
    } else {
        args.rates.clone()
    };

    let mut below_threshold = false;
    for (i, &rate) in rates.iter().enumerate() {
        if !running.load(Ordering::SeqCst) {
            eprintln!("{}", "Interrupted, stopping ladder".yellow());
            break;
        }

        match run_benchmark(&args, rate, &running) {
            Ok(result) => {
                print_result(&args, &result);
                if result.capture_rate < CAPTURE_RATE_THRESHOLD {
                    eprintln!(
                        "{}",
                        format!(
                            "Capture rate {:.2}% fell below {:.0}% - stopping benchmark",
                            result.capture_rate, CAPTURE_RATE_THRESHOLD
                        )
                        .red()
                        .bold()
                    );
                    below_threshold = true;
                    break;
                }
            }
            Err(err) => {
                eprintln!("{}: {}", "Error".red().bold(), err);
                std::process::exit(1);
            }
        }

        if i + 1 < rates.len() {
            sleep_interruptible(INTER_RUN_PAUSE, &running);
        }
    }

    std::process::exit(i32::from(below_threshold));
}

fn run_benchmark(
    args: &Args,
    target_rate: u32,
    running: &Arc<AtomicBool>,
) -> Result<BenchmarkResult, Box<dyn std::error::Error>> {
    eprintln!(
        "{} benchmark at {} msgs/sec for {}s",
        ">>>".green().bold(),
        target_rate,
        args.duration
    );

    let capture_dir = args.output_dir.join(format!("bench_{target_rate}"));
    let capture_config = CaptureConfig::new(&capture_dir)
        .multicast_addr(&args.addr)
        .port(args.port)
        .enable_timestamps(args.latency)
        .flush_policy(FlushPolicy::Batched);

    let sim_config = SimulatorConfig {
        multicast_addr: args.addr.clone(),
        port: args.port,
        num_symbols: BENCH_NUM_SYMBOLS,
        msg_rate: target_rate,
        ..SimulatorConfig::default()
    };

    // Capture first, so the group is joined before the first datagram.
    let mut node = CaptureNode::new(capture_config)?;
    node.start()?;
    std::thread::sleep(Duration::from_millis(100));

    let start = Instant::now();
    let mut simulator = MarketDataSimulator::spawn(sim_config)?;

    sleep_interruptible(Duration::from_secs(args.duration), running);

    // Stop in reverse order, leaving time for in-flight datagrams.
    simulator.stop();
    std::thread::sleep(Duration::from_millis(100));
    node.stop();
    let run_time = start.elapsed();

    let sim_stats = simulator.stats();
    let capture_stats = node.stats();

    let capture_rate = if sim_stats.messages_sent > 0 {
        capture_stats.messages_processed as f64 / sim_stats.messages_sent as f64 * 100.0
    } else {
        0.0
    };

    if args.verify {
        let report = verify_capture(&simulator.message_log(), &capture_dir, BENCH_NUM_SYMBOLS)?;
        eprintln!(
            "    verify: read={} valid={} invalid={} mismatches={} missing={}",
            report.total_read,
            report.valid_messages,
            report.invalid_messages,
            report.mismatches,
            report.missing_sent
        );
        if report.mismatches > 0 || report.invalid_messages > 0 {
            eprintln!("{}", "    verification found corrupted records".red());
        }
    }

    Ok(BenchmarkResult {
        target_rate,
        messages_sent: sim_stats.messages_sent,
        messages_captured: capture_stats.messages_processed,
        messages_dropped: capture_stats.messages_dropped,
        capture_rate,
        avg_latency_ns: capture_stats.avg_latency_ns,
        max_latency_ns: capture_stats.max_latency_ns,
        run_time_secs: run_time.as_secs_f64(),
    })
}

fn print_result(args: &Args, result: &BenchmarkResult) {
    if args.json {
        match serde_json::to_string(result) {
            Ok(json) => println!("{json}"),
            Err(err) => eprintln!("{}: {}", "Error".red().bold(), err),
        }
        return;
    }

    println!("\n{}", "Benchmark Results".bold());
    println!("{}", "=================".bold());
    println!("Target Rate:       {} msgs/sec", result.target_rate);
    println!("Messages Sent:     {}", result.messages_sent);
    println!("Messages Captured: {}", result.messages_captured);
    println!("Messages Dropped:  {}", result.messages_dropped);
    let rate_line = format!("Capture Rate:      {:.2}%", result.capture_rate);
    if result.capture_rate >= CAPTURE_RATE_THRESHOLD {
        println!("{}", rate_line.green());
    } else {
        println!("{}", rate_line.red());
    }
    println!("Run Time:          {:.2}s", result.run_time_secs);
    if args.latency && result.avg_latency_ns > 0 {
        println!(
            "Latency:           avg {} ns, max {} ns",
            result.avg_latency_ns, result.max_latency_ns
        );
    }
}

fn sleep_interruptible(total: Duration, running: &Arc<AtomicBool>) {
    let deadline = Instant::now() + total;
    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep((deadline - now).min(Duration::from_millis(100)));
    }
}
