// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fixed 64-byte market message: the on-wire and on-disk record.
//!
//! # Layout (little-endian, frozen)
//!
//! ```text
//! +--------+------+------------------------------------------------+
//! | Offset | Size | Field                                          |
//! +--------+------+------------------------------------------------+
//! |  0     |  8   | sequence_number (monotonic per sender, > 0)    |
//! |  8     |  8   | timestamp_ns (sender wall clock, ns since epoch)|
//! | 16     |  4   | checksum (XOR fold, see below)                 |
//! | 20     |  4   | reserved (zero)                                |
//! | 24     |  4   | symbol_id (1..=10000)                          |
//! | 28     |  1   | type (Trade=1 .. OrderCancel=5)                |
//! | 29     |  3   | pad (zero)                                     |
//! | 32     | 32   | payload, tagged by type                        |
//! +--------+------+------------------------------------------------+
//! ```
//!
//! Trade payload: f64 price, u32 size, u8 flags, 3 pad bytes, 16 zero bytes.
//!
//! The checksum is an XOR fold of every 32-bit little-endian word of the
//! record except the word at offset 16 (the checksum itself). The sender
//! sets it before transmission; the receiver recomputes and compares when
//! verification is enabled.

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

/// Size of one record on the wire and on disk.
pub const MESSAGE_SIZE: usize = 64;

/// Size of the type-tagged payload section.
pub const PAYLOAD_SIZE: usize = 32;

/// Highest admissible symbol identifier.
pub const MAX_SYMBOL_ID: u32 = 10_000;

/// Exclusive upper bound on a valid trade price.
pub const MAX_TRADE_PRICE: f64 = 1_000_000.0;

/// Byte offset of the checksum word (skipped by the fold).
const CHECKSUM_OFFSET: usize = 16;

/// Market message kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Trade = 1,
    Quote = 2,
    OrderAdd = 3,
    OrderModify = 4,
    OrderCancel = 5,
}

impl MessageType {
    /// Decode a wire tag. Returns `None` for unknown tags.
    #[must_use]
    pub fn from_wire(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Trade),
            2 => Some(Self::Quote),
            3 => Some(Self::OrderAdd),
            4 => Some(Self::OrderModify),
            5 => Some(Self::OrderCancel),
            _ => None,
        }
    }
}

/// One fixed-size market data record.
///
/// Field bytes are carried verbatim (including padding and the raw payload)
/// so that a decoded record re-encodes byte-for-byte identical to its wire
/// image. Typed access to the trade payload goes through accessors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketMessage {
    pub sequence_number: u64,
    pub timestamp_ns: u64,
    pub checksum: u32,
    pub reserved: u32,
    pub symbol_id: u32,
    /// Raw kind tag; `MessageType::from_wire` interprets it.
    pub kind: u8,
    pub pad: [u8; 3],
    pub payload: [u8; PAYLOAD_SIZE],
}

impl Default for MarketMessage {
    fn default() -> Self {
        Self {
            sequence_number: 0,
            timestamp_ns: 0,
            checksum: 0,
            reserved: 0,
            symbol_id: 0,
            kind: MessageType::Trade as u8,
            pad: [0; 3],
            payload: [0; PAYLOAD_SIZE],
        }
    }
}

impl MarketMessage {
    /// Build a trade record. The checksum is left at zero; call
    /// [`update_checksum`](Self::update_checksum) before transmission.
    #[must_use]
    pub fn trade(
        sequence_number: u64,
        timestamp_ns: u64,
        symbol_id: u32,
        price: f64,
        size: u32,
        flags: u8,
    ) -> Self {
        let mut payload = [0u8; PAYLOAD_SIZE];
        LittleEndian::write_f64(&mut payload[0..8], price);
        LittleEndian::write_u32(&mut payload[8..12], size);
        payload[12] = flags;

        Self {
            sequence_number,
            timestamp_ns,
            symbol_id,
            kind: MessageType::Trade as u8,
            payload,
            ..Self::default()
        }
    }

    /// Message kind, if the tag is a known value.
    #[must_use]
    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_wire(self.kind)
    }

    /// Trade price (payload bytes 0..8).
    #[must_use]
    pub fn trade_price(&self) -> f64 {
        LittleEndian::read_f64(&self.payload[0..8])
    }

    /// Trade size (payload bytes 8..12).
    #[must_use]
    pub fn trade_size(&self) -> u32 {
        LittleEndian::read_u32(&self.payload[8..12])
    }

    /// Trade flags (payload byte 12).
    #[must_use]
    pub fn trade_flags(&self) -> u8 {
        self.payload[12]
    }

    /// Serialize to the frozen 64-byte wire image.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; MESSAGE_SIZE] {
        let mut buf = [0u8; MESSAGE_SIZE];
        LittleEndian::write_u64(&mut buf[0..8], self.sequence_number);
        LittleEndian::write_u64(&mut buf[8..16], self.timestamp_ns);
        LittleEndian::write_u32(&mut buf[16..20], self.checksum);
        LittleEndian::write_u32(&mut buf[20..24], self.reserved);
        LittleEndian::write_u32(&mut buf[24..28], self.symbol_id);
        buf[28] = self.kind;
        buf[29..32].copy_from_slice(&self.pad);
        buf[32..64].copy_from_slice(&self.payload);
        buf
    }

    /// Deserialize from a wire image. Returns `None` if `bytes` is shorter
    /// than [`MESSAGE_SIZE`]; extra trailing bytes are ignored.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < MESSAGE_SIZE {
            return None;
        }
        let mut pad = [0u8; 3];
        pad.copy_from_slice(&bytes[29..32]);
        let mut payload = [0u8; PAYLOAD_SIZE];
        payload.copy_from_slice(&bytes[32..64]);

        Some(Self {
            sequence_number: LittleEndian::read_u64(&bytes[0..8]),
            timestamp_ns: LittleEndian::read_u64(&bytes[8..16]),
            checksum: LittleEndian::read_u32(&bytes[16..20]),
            reserved: LittleEndian::read_u32(&bytes[20..24]),
            symbol_id: LittleEndian::read_u32(&bytes[24..28]),
            kind: bytes[28],
            pad,
            payload,
        })
    }

    /// Write the record to a stream (tick file format).
    pub fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u64::<LittleEndian>(self.sequence_number)?;
        w.write_u64::<LittleEndian>(self.timestamp_ns)?;
        w.write_u32::<LittleEndian>(self.checksum)?;
        w.write_u32::<LittleEndian>(self.reserved)?;
        w.write_u32::<LittleEndian>(self.symbol_id)?;
        w.write_all(&[self.kind])?;
        w.write_all(&self.pad)?;
        w.write_all(&self.payload)?;
        Ok(())
    }

    /// Read one record from a stream (tick file format).
    pub fn decode<R: Read>(r: &mut R) -> io::Result<Self> {
        let sequence_number = r.read_u64::<LittleEndian>()?;
        let timestamp_ns = r.read_u64::<LittleEndian>()?;
        let checksum = r.read_u32::<LittleEndian>()?;
        let reserved = r.read_u32::<LittleEndian>()?;
        let symbol_id = r.read_u32::<LittleEndian>()?;
        let mut tail = [0u8; 4];
        r.read_exact(&mut tail)?;
        let mut payload = [0u8; PAYLOAD_SIZE];
        r.read_exact(&mut payload)?;

        Ok(Self {
            sequence_number,
            timestamp_ns,
            checksum,
            reserved,
            symbol_id,
            kind: tail[0],
            pad: [tail[1], tail[2], tail[3]],
            payload,
        })
    }

    /// XOR fold of every 32-bit word of the wire image except the checksum
    /// word itself.
    #[must_use]
    pub fn compute_checksum(&self) -> u32 {
        let bytes = self.to_bytes();
        let mut sum = 0u32;
        for offset in (0..MESSAGE_SIZE).step_by(4) {
            if offset == CHECKSUM_OFFSET {
                continue;
            }
            sum ^= LittleEndian::read_u32(&bytes[offset..offset + 4]);
        }
        sum
    }

    /// Set the checksum field from the current contents.
    pub fn update_checksum(&mut self) {
        self.checksum = self.compute_checksum();
    }

    /// Recompute the checksum and compare against the stored field.
    #[must_use]
    pub fn verify_checksum(&self) -> bool {
        self.checksum == self.compute_checksum()
    }

    /// Structural validity gate: positive sequence, symbol in range,
    /// admitted kind (only `Trade` in the capture core), and payload
    /// bounds. The checksum predicate is separate; see
    /// [`verify_checksum`](Self::verify_checksum).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        if self.sequence_number == 0 {
            return false;
        }
        if self.symbol_id == 0 || self.symbol_id > MAX_SYMBOL_ID {
            return false;
        }
        if self.message_type() != Some(MessageType::Trade) {
            return false;
        }
        let price = self.trade_price();
        price > 0.0 && price < MAX_TRADE_PRICE && self.trade_size() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MarketMessage {
        let mut msg = MarketMessage::trade(42, 1_700_000_000_000_000_000, 7, 123.45, 500, 1);
        msg.update_checksum();
        msg
    }

    #[test]
    fn wire_image_is_64_bytes_and_round_trips() {
        let msg = sample();
        let bytes = msg.to_bytes();
        assert_eq!(bytes.len(), MESSAGE_SIZE);

        let back = MarketMessage::from_bytes(&bytes).expect("64 bytes");
        assert_eq!(back, msg);
        assert_eq!(back.to_bytes(), bytes);
    }

    #[test]
    fn field_offsets_match_contract() {
        let msg = sample();
        let bytes = msg.to_bytes();

        assert_eq!(LittleEndian::read_u64(&bytes[0..8]), 42);
        assert_eq!(LittleEndian::read_u32(&bytes[16..20]), msg.checksum);
        assert_eq!(LittleEndian::read_u32(&bytes[20..24]), 0);
        assert_eq!(LittleEndian::read_u32(&bytes[24..28]), 7);
        assert_eq!(bytes[28], MessageType::Trade as u8);
        assert_eq!(&bytes[29..32], &[0, 0, 0]);
        assert_eq!(LittleEndian::read_f64(&bytes[32..40]), 123.45);
        assert_eq!(LittleEndian::read_u32(&bytes[40..44]), 500);
        assert_eq!(bytes[44], 1);
        // Unused payload tail stays zero.
        assert!(bytes[48..64].iter().all(|&b| b == 0));
    }

    #[test]
    fn from_bytes_rejects_short_input() {
        assert!(MarketMessage::from_bytes(&[0u8; MESSAGE_SIZE - 1]).is_none());
    }

    #[test]
    fn stream_codec_round_trips() {
        let msg = sample();
        let mut buf = Vec::new();
        msg.encode(&mut buf).expect("encode");
        assert_eq!(buf.len(), MESSAGE_SIZE);

        let back = MarketMessage::decode(&mut buf.as_slice()).expect("decode");
        assert_eq!(back, msg);
    }

    #[test]
    fn checksum_round_trip() {
        let msg = sample();
        assert!(msg.verify_checksum());
    }

    #[test]
    fn checksum_detects_any_non_checksum_bit_flip() {
        let msg = sample();
        let clean = msg.to_bytes();

        for byte in 0..MESSAGE_SIZE {
            if (CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4).contains(&byte) {
                continue;
            }
            for bit in 0..8 {
                let mut corrupted = clean;
                corrupted[byte] ^= 1 << bit;
                let decoded = MarketMessage::from_bytes(&corrupted).expect("64 bytes");
                assert!(
                    !decoded.verify_checksum(),
                    "flip at byte {byte} bit {bit} went undetected"
                );
            }
        }
    }

    #[test]
    fn checksum_covers_sequence_number() {
        // The fold skips only the checksum word; sequence_number is covered.
        let mut a = sample();
        let mut b = sample();
        b.sequence_number += 1;
        a.update_checksum();
        b.update_checksum();
        assert_ne!(a.checksum, b.checksum);
    }

    #[test]
    fn validity_gate() {
        assert!(sample().is_valid());

        let mut msg = sample();
        msg.sequence_number = 0;
        assert!(!msg.is_valid());

        let mut msg = sample();
        msg.symbol_id = 0;
        assert!(!msg.is_valid());

        let mut msg = sample();
        msg.symbol_id = MAX_SYMBOL_ID + 1;
        assert!(!msg.is_valid());

        let mut msg = sample();
        msg.kind = MessageType::Quote as u8;
        assert!(!msg.is_valid());

        let mut msg = sample();
        msg.kind = 0xff;
        assert!(!msg.is_valid());

        let mut msg = sample();
        LittleEndian::write_f64(&mut msg.payload[0..8], -1.0);
        assert!(!msg.is_valid());

        let mut msg = sample();
        LittleEndian::write_f64(&mut msg.payload[0..8], MAX_TRADE_PRICE);
        assert!(!msg.is_valid());

        let mut msg = sample();
        LittleEndian::write_u32(&mut msg.payload[8..12], 0);
        assert!(!msg.is_valid());
    }

    #[test]
    fn message_type_wire_tags() {
        assert_eq!(MessageType::from_wire(1), Some(MessageType::Trade));
        assert_eq!(MessageType::from_wire(5), Some(MessageType::OrderCancel));
        assert_eq!(MessageType::from_wire(0), None);
        assert_eq!(MessageType::from_wire(6), None);
    }
}
