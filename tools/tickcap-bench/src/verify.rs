// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Post-run capture verification: compare tick files against the
//! simulator's sent-message log.

use dashmap::DashMap;
use std::fs::File;
use std::io::{self, BufReader, ErrorKind};
use std::path::Path;
use tickcap::{MarketMessage, MessageType, MAX_SYMBOL_ID};

/// Floating point tolerance when comparing captured vs sent prices.
const PRICE_TOLERANCE: f64 = 0.001;

/// Result of one verification pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerifyReport {
    /// Records read from tick files.
    pub total_read: u64,
    /// Records passing the structural check.
    pub valid_messages: u64,
    /// Records failing the structural check.
    pub invalid_messages: u64,
    /// Records differing from what the simulator sent.
    pub mismatches: u64,
    /// Records on disk with no entry in the sent log.
    pub missing_sent: u64,
    pub min_sequence: u64,
    pub max_sequence: u64,
}

/// Verify every tick file under `capture_dir` against `sent_messages`.
pub fn verify_capture(
    sent_messages: &DashMap<u64, MarketMessage>,
    capture_dir: &Path,
    num_symbols: u32,
) -> io::Result<VerifyReport> {
    let mut report = VerifyReport {
        min_sequence: u64::MAX,
        ..VerifyReport::default()
    };

    for entry in std::fs::read_dir(capture_dir)? {
        let path = entry?.path();
        if !is_tick_file(&path) {
            continue;
        }
        log::debug!("[VERIFY] scanning {}", path.display());
        verify_file(&path, sent_messages, num_symbols, &mut report)?;
    }

    if report.total_read == 0 {
        report.min_sequence = 0;
    }
    Ok(report)
}

/// A verifiable tick file: `.tick` extension with a numeric stem naming a
/// symbol in range.
fn is_tick_file(path: &Path) -> bool {
    if path.extension().and_then(|e| e.to_str()) != Some("tick") {
        return false;
    }
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.parse::<u32>().ok())
        .is_some_and(|id| id >= 1 && id <= MAX_SYMBOL_ID)
}

fn verify_file(
    path: &Path,
    sent_messages: &DashMap<u64, MarketMessage>,
    num_symbols: u32,
    report: &mut VerifyReport,
) -> io::Result<()> {
    let mut reader = BufReader::new(File::open(path)?);

    loop {
        let msg = match MarketMessage::decode(&mut reader) {
            Ok(msg) => msg,
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => break,
            Err(err) => return Err(err),
        };
        report.total_read += 1;

        let structurally_valid = msg.sequence_number > 0
            && msg.symbol_id >= 1
            && msg.symbol_id <= num_symbols
            && msg.message_type() == Some(MessageType::Trade)
            && msg.trade_price() > 0.0;
        if !structurally_valid {
            report.invalid_messages += 1;
            if report.invalid_messages <= 10 {
                log::warn!(
                    "[VERIFY] invalid record in {}: seq={} sym={} kind={} price={:.2}",
                    path.display(),
                    msg.sequence_number,
                    msg.symbol_id,
                    msg.kind,
                    msg.trade_price()
                );
            }
            continue;
        }

        report.valid_messages += 1;
        report.min_sequence = report.min_sequence.min(msg.sequence_number);
        report.max_sequence = report.max_sequence.max(msg.sequence_number);

        match sent_messages.get(&msg.sequence_number) {
            Some(sent) => {
                if !messages_match(&msg, &sent) {
                    report.mismatches += 1;
                    if report.mismatches <= 10 {
                        log::warn!(
                            "[VERIFY] mismatch at seq {}: captured sym={} price={:.2} size={}, \
                             sent sym={} price={:.2} size={}",
                            msg.sequence_number,
                            msg.symbol_id,
                            msg.trade_price(),
                            msg.trade_size(),
                            sent.symbol_id,
                            sent.trade_price(),
                            sent.trade_size()
                        );
                    }
                }
            }
            None => {
                report.missing_sent += 1;
                if report.missing_sent <= 10 {
                    log::warn!(
                        "[VERIFY] record on disk was never sent: seq={}",
                        msg.sequence_number
                    );
                }
            }
        }
    }

    Ok(())
}

/// Field-wise comparison with a small price tolerance.
fn messages_match(captured: &MarketMessage, sent: &MarketMessage) -> bool {
    captured.sequence_number == sent.sequence_number
        && captured.symbol_id == sent.symbol_id
        && captured.kind == sent.kind
        && (captured.trade_price() - sent.trade_price()).abs() < PRICE_TOLERANCE
        && captured.trade_size() == sent.trade_size()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn record(seq: u64, symbol_id: u32, price: f64) -> MarketMessage {
        let mut msg = MarketMessage::trade(seq, 5000, symbol_id, price, 100, 0);
        msg.update_checksum();
        msg
    }

    fn write_tick_file(dir: &Path, symbol_id: u32, records: &[MarketMessage]) {
        let mut file = File::create(dir.join(format!("{symbol_id}.tick"))).expect("create");
        for msg in records {
            file.write_all(&msg.to_bytes()).expect("write");
        }
    }

    #[test]
    fn clean_capture_verifies() {
        let dir = tempdir().expect("tempdir");
        let sent = DashMap::new();
        let mut by_symbol: Vec<Vec<MarketMessage>> = vec![Vec::new(); 3];

        for seq in 1..=30u64 {
            let symbol = ((seq - 1) % 3 + 1) as u32;
            let msg = record(seq, symbol, 150.0);
            sent.insert(seq, msg);
            by_symbol[(symbol - 1) as usize].push(msg);
        }
        for (i, records) in by_symbol.iter().enumerate() {
            write_tick_file(dir.path(), i as u32 + 1, records);
        }

        let report = verify_capture(&sent, dir.path(), 3).expect("verify");
        assert_eq!(report.total_read, 30);
        assert_eq!(report.valid_messages, 30);
        assert_eq!(report.invalid_messages, 0);
        assert_eq!(report.mismatches, 0);
        assert_eq!(report.missing_sent, 0);
        assert_eq!(report.min_sequence, 1);
        assert_eq!(report.max_sequence, 30);
    }

    #[test]
    fn detects_mismatch_and_unsent_records() {
        let dir = tempdir().expect("tempdir");
        let sent = DashMap::new();
        sent.insert(1, record(1, 1, 100.0));

        // Price tampered relative to the log, plus a record never sent.
        write_tick_file(dir.path(), 1, &[record(1, 1, 100.5), record(99, 1, 100.0)]);

        let report = verify_capture(&sent, dir.path(), 1).expect("verify");
        assert_eq!(report.mismatches, 1);
        assert_eq!(report.missing_sent, 1);
    }

    #[test]
    fn ignores_non_tick_files() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("notes.txt"), b"not ticks").expect("write");
        std::fs::write(dir.path().join("abc.tick"), b"bad stem").expect("write");
        std::fs::write(dir.path().join("20000.tick"), b"symbol out of range").expect("write");

        let sent = DashMap::new();
        let report = verify_capture(&sent, dir.path(), 10).expect("verify");
        assert_eq!(report.total_read, 0);
        assert_eq!(report.min_sequence, 0);
    }
}
