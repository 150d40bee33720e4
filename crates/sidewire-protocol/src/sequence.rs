//! Correlation-number allocation.
//!
//! Sequences run `1, 2, ..., max, 1, 2, ...`. Zero is the push marker and
//! is never returned. The counter is a single atomic, so any number of
//! tasks or threads can allocate concurrently and each gets a distinct
//! value (until the space wraps).
//!
//! `max` is also the ceiling on concurrently pending calls: after `max`
//! allocations the numbers repeat, so a caller that keeps a number
//! longer than that risks a collision. The correlator guards against
//! this by skipping numbers that are still pending.

use std::sync::atomic::{AtomicU32, Ordering};

/// Default upper bound of the sequence space.
pub const DEFAULT_MAX_SEQUENCE: u32 = 24011;

/// Hands out correlation numbers in `[1, max]`, wrapping to 1.
#[derive(Debug)]
pub struct SequenceAllocator {
    /// The most recently issued value; 0 before the first allocation.
    last: AtomicU32,
    max: u32,
}

impl SequenceAllocator {
    /// Creates an allocator whose first value is 1.
    ///
    /// A `max` of zero is treated as 1 (every call gets sequence 1).
    pub fn new(max: u32) -> Self {
        Self::starting_after(max, 0)
    }

    /// Creates an allocator that behaves as if `last` was the most
    /// recently issued value. Values above `max` wrap on the next call.
    pub fn starting_after(max: u32, last: u32) -> Self {
        Self {
            last: AtomicU32::new(last),
            max: max.max(1),
        }
    }

    /// The upper bound of the sequence space.
    pub fn max(&self) -> u32 {
        self.max
    }

    /// Returns the next sequence number.
    pub fn next(&self) -> u32 {
        let step = |current: u32| {
            if current == 0 || current >= self.max {
                1
            } else {
                current + 1
            }
        };
        // `fetch_update` retries the closure until the CAS wins, so the
        // value we compute from `previous` is exactly the one stored.
        match self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| Some(step(c)))
        {
            Ok(previous) | Err(previous) => step(previous),
        }
    }
}

impl Default for SequenceAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SEQUENCE)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_first_value_is_one() {
        let alloc = SequenceAllocator::new(10);
        assert_eq!(alloc.next(), 1);
        assert_eq!(alloc.next(), 2);
        assert_eq!(alloc.next(), 3);
    }

    #[test]
    fn test_wraps_to_one_after_max() {
        let alloc = SequenceAllocator::starting_after(DEFAULT_MAX_SEQUENCE, DEFAULT_MAX_SEQUENCE - 1);
        assert_eq!(alloc.next(), DEFAULT_MAX_SEQUENCE);
        assert_eq!(alloc.next(), 1);
        assert_eq!(alloc.next(), 2);
    }

    #[test]
    fn test_never_returns_zero_over_several_wraps() {
        let alloc = SequenceAllocator::new(5);
        let seen: Vec<u32> = (0..17).map(|_| alloc.next()).collect();
        assert!(seen.iter().all(|s| (1..=5).contains(s)));
        assert_eq!(&seen[..7], &[1, 2, 3, 4, 5, 1, 2]);
    }

    #[test]
    fn test_max_of_one_always_returns_one() {
        let alloc = SequenceAllocator::new(1);
        assert_eq!(alloc.next(), 1);
        assert_eq!(alloc.next(), 1);
    }

    #[test]
    fn test_zero_max_is_clamped() {
        let alloc = SequenceAllocator::new(0);
        assert_eq!(alloc.max(), 1);
        assert_eq!(alloc.next(), 1);
    }

    #[test]
    fn test_out_of_range_start_wraps() {
        let alloc = SequenceAllocator::starting_after(10, 500);
        assert_eq!(alloc.next(), 1);
    }

    #[test]
    fn test_concurrent_allocations_are_distinct() {
        // 8 threads × 500 allocations stays below max, so no value
        // may repeat.
        let alloc = Arc::new(SequenceAllocator::new(DEFAULT_MAX_SEQUENCE));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let alloc = Arc::clone(&alloc);
                std::thread::spawn(move || (0..500).map(|_| alloc.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            for seq in handle.join().unwrap() {
                assert!((1..=DEFAULT_MAX_SEQUENCE).contains(&seq));
                assert!(all.insert(seq), "sequence {seq} issued twice");
            }
        }
        assert_eq!(all.len(), 4000);
    }
}
