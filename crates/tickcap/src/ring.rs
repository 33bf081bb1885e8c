// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wait-free bounded SPSC ring buffer for fixed-size records.
//!
//! # Synchronization Protocol
//!
//! Producer `try_push`:
//! 1. Load consumer index (Acquire), check for a free slot
//! 2. Copy the record into `buffer[write & mask]`
//! 3. Publish: store producer index + 1 (Release)
//!
//! Consumer `try_pop`:
//! 1. Load producer index (Acquire), check for an available slot
//! 2. Copy the record out of `buffer[read & mask]`
//! 3. Release the slot: store consumer index + 1 (Release)
//!
//! Indices are monotonic u64; slot identity is `index & mask`. One slot is
//! sacrificed to disambiguate full from empty, so at most `capacity - 1`
//! records are in flight. Both indices live on their own cache line to
//! avoid false sharing between the producer and consumer cores.
//!
//! Exactly one thread may push and exactly one (distinct) thread may pop.
//! Neither operation blocks, yields, or panics.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic ring index, alone on its cache line.
#[repr(align(64))]
struct CacheAligned(AtomicU64);

/// Bounded wait-free single-producer/single-consumer queue.
///
/// Capacity is fixed at construction and rounded up to the next power of
/// two. `T` must be trivially copyable; a slot write is a single memory
/// copy, so no per-slot sequence counter is needed for two-thread use
/// (that would only matter for multi-producer or multi-consumer variants).
pub struct SpscRing<T> {
    buffer: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: u64,
    write_idx: CacheAligned,
    read_idx: CacheAligned,

    // Monitoring counters (Relaxed; read by the stats reporter).
    total_pushed: AtomicU64,
    total_popped: AtomicU64,
    push_failures: AtomicU64,
}

// SAFETY: slot access is coordinated by the acquire/release protocol on
// write_idx/read_idx documented above. The single-producer/single-consumer
// contract means a slot is never written and read concurrently: the
// producer only writes slots it observed as free (consumer index Acquire),
// and the consumer only reads slots the producer published (producer index
// Acquire pairs with the Release store after the slot copy).
unsafe impl<T: Send> Send for SpscRing<T> {}
// SAFETY: see above; &SpscRing is shared between exactly two threads with
// disjoint roles, and all shared fields are atomics or protocol-guarded.
unsafe impl<T: Send> Sync for SpscRing<T> {}

impl<T: Copy> SpscRing<T> {
    /// Create a ring with at least `capacity` slots (rounded up to a power
    /// of two, minimum 2).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2).next_power_of_two();
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || UnsafeCell::new(MaybeUninit::uninit()));

        Self {
            buffer: slots.into_boxed_slice(),
            mask: (capacity - 1) as u64,
            write_idx: CacheAligned(AtomicU64::new(0)),
            read_idx: CacheAligned(AtomicU64::new(0)),
            total_pushed: AtomicU64::new(0),
            total_popped: AtomicU64::new(0),
            push_failures: AtomicU64::new(0),
        }
    }

    /// Try to enqueue one record. Returns `false` iff the ring is full;
    /// the slot is left untouched and `push_failures` is incremented.
    ///
    /// Producer side only.
    #[inline]
    pub fn try_push(&self, item: T) -> bool {
        let write = self.write_idx.0.load(Ordering::Relaxed);
        let read = self.read_idx.0.load(Ordering::Acquire);

        if (write + 1) & self.mask == read & self.mask {
            self.push_failures.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let slot = (write & self.mask) as usize;
        // SAFETY:
        // - slot < buffer.len() because mask = len - 1
        // - The full check above guarantees the consumer is not reading
        //   this slot: it still holds a value the consumer already released
        //   (or was never written), so exclusive write access is ours
        // - The Release store below publishes the copy before the consumer
        //   can observe the advanced producer index
        unsafe {
            (*self.buffer[slot].get()).write(item);
        }

        self.write_idx.0.store(write + 1, Ordering::Release);
        self.total_pushed.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Try to dequeue one record. Returns `None` iff the ring is empty.
    ///
    /// Consumer side only.
    #[inline]
    pub fn try_pop(&self) -> Option<T> {
        let read = self.read_idx.0.load(Ordering::Relaxed);
        let write = self.write_idx.0.load(Ordering::Acquire);

        if read == write {
            return None;
        }

        let slot = (read & self.mask) as usize;
        // SAFETY:
        // - slot < buffer.len() because mask = len - 1
        // - read < write (checked above) with write loaded Acquire, pairing
        //   with the producer's Release store, so the slot is initialized
        //   and the copy into it happens-before this read
        // - T: Copy, so reading the value out leaves no ownership behind
        let item = unsafe { (*self.buffer[slot].get()).assume_init_read() };

        self.read_idx.0.store(read + 1, Ordering::Release);
        self.total_popped.fetch_add(1, Ordering::Relaxed);
        Some(item)
    }

    /// Dequeue up to `max` records into `out`, in FIFO order. Stops at the
    /// first empty observation and returns the number appended. Never
    /// blocks.
    ///
    /// Consumer side only.
    pub fn pop_bulk(&self, out: &mut Vec<T>, max: usize) -> usize {
        let mut popped = 0;
        while popped < max {
            match self.try_pop() {
                Some(item) => {
                    out.push(item);
                    popped += 1;
                }
                None => break,
            }
        }
        popped
    }

    /// Number of records currently queued. Approximate under concurrency
    /// but consistent with a linearization.
    #[must_use]
    pub fn len(&self) -> usize {
        let read = self.read_idx.0.load(Ordering::Acquire);
        let write = self.write_idx.0.load(Ordering::Acquire);
        write.wrapping_sub(read) as usize
    }

    /// True when no records are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slot count (power of two). Usable capacity is one less.
    #[must_use]
    pub fn capacity(&self) -> usize {
        (self.mask + 1) as usize
    }

    /// Total successful pushes since construction.
    #[must_use]
    pub fn total_pushed(&self) -> u64 {
        self.total_pushed.load(Ordering::Relaxed)
    }

    /// Total successful pops since construction.
    #[must_use]
    pub fn total_popped(&self) -> u64 {
        self.total_popped.load(Ordering::Relaxed)
    }

    /// Pushes rejected because the ring was full.
    #[must_use]
    pub fn push_failures(&self) -> u64 {
        self.push_failures.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn capacity_rounds_up_to_power_of_two() {
        assert_eq!(SpscRing::<u64>::new(1000).capacity(), 1024);
        assert_eq!(SpscRing::<u64>::new(1024).capacity(), 1024);
        assert_eq!(SpscRing::<u64>::new(1).capacity(), 2);
    }

    #[test]
    fn empty_ring_pops_nothing() {
        let ring = SpscRing::<u64>::new(8);
        assert!(ring.is_empty());
        assert_eq!(ring.len(), 0);
        assert!(ring.try_pop().is_none());
    }

    #[test]
    fn fifo_order() {
        let ring = SpscRing::new(8);
        for i in 0..7u64 {
            assert!(ring.try_push(i));
        }
        for i in 0..7u64 {
            assert_eq!(ring.try_pop(), Some(i));
        }
        assert!(ring.try_pop().is_none());
    }

    #[test]
    fn holds_at_most_capacity_minus_one() {
        let ring = SpscRing::new(8);
        for i in 0..7u64 {
            assert!(ring.try_push(i), "push {i} should fit");
        }
        assert_eq!(ring.len(), 7);
        assert!(!ring.try_push(7), "slot 8 is the full/empty sentinel");
        assert_eq!(ring.push_failures(), 1);

        // Freeing one slot admits exactly one more record.
        assert_eq!(ring.try_pop(), Some(0));
        assert!(ring.try_push(7));
        assert!(!ring.try_push(8));
    }

    #[test]
    fn overload_accounting() {
        // Saturate a 1024-slot ring with 2000 attempted pushes and a paused
        // consumer: 1023 land, 977 are rejected, nothing is corrupted.
        let ring = SpscRing::new(1024);
        for i in 0..2000u64 {
            ring.try_push(i);
        }
        assert_eq!(ring.total_pushed(), 1023);
        assert_eq!(ring.push_failures(), 977);
        assert_eq!(ring.total_pushed() + ring.push_failures(), 2000);

        let mut out = Vec::new();
        ring.pop_bulk(&mut out, 2048);
        assert_eq!(out, (0..1023).collect::<Vec<u64>>());
    }

    #[test]
    fn pop_bulk_stops_at_empty() {
        let ring = SpscRing::new(64);
        for i in 0..10u64 {
            assert!(ring.try_push(i));
        }

        let mut out = Vec::new();
        assert_eq!(ring.pop_bulk(&mut out, 4), 4);
        assert_eq!(out, vec![0, 1, 2, 3]);

        assert_eq!(ring.pop_bulk(&mut out, 100), 6);
        assert_eq!(out.len(), 10);
        assert_eq!(ring.pop_bulk(&mut out, 100), 0);
    }

    #[test]
    fn concurrent_producer_consumer_no_loss() {
        const COUNT: u64 = 100_000;
        let ring = Arc::new(SpscRing::new(1024));

        let consumer = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                let mut next = 0u64;
                while next < COUNT {
                    if let Some(v) = ring.try_pop() {
                        assert_eq!(v, next, "FIFO violated");
                        next += 1;
                    } else {
                        thread::yield_now();
                    }
                }
                next
            })
        };

        // Producer retries on full so the consumer sees every value: a
        // contiguous, gap-free, duplicate-free prefix of 0..COUNT.
        for i in 0..COUNT {
            while !ring.try_push(i) {
                thread::yield_now();
            }
        }

        assert_eq!(consumer.join().expect("consumer panicked"), COUNT);
        assert!(ring.is_empty());
        assert_eq!(ring.total_popped(), COUNT);
    }

    #[test]
    fn no_loss_under_slack() {
        // Peak queue depth stays below capacity: every push succeeds.
        let ring = SpscRing::new(16);
        let mut out = Vec::new();
        for round in 0..1000u64 {
            for i in 0..8 {
                assert!(ring.try_push(round * 8 + i));
            }
            assert_eq!(ring.pop_bulk(&mut out, 8), 8);
        }
        assert_eq!(ring.push_failures(), 0);
        assert_eq!(ring.total_pushed(), 8000);
        assert_eq!(out.len(), 8000);
    }
}
