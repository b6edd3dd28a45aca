//! Seen-line gate.

use std::collections::HashSet;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a 64-bit. Stable across runs and platforms.
pub fn line_hash(line: &str) -> u64 {
    line.as_bytes().iter().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Bounded set of line hashes. Once full it is cleared wholesale rather than
/// evicting, so a line may occasionally be seen twice.
#[derive(Debug)]
pub struct LineDedup {
    seen: HashSet<u64>,
    capacity: usize,
}

impl LineDedup {
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: HashSet::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    /// Returns true if the line is new and should be processed.
    pub fn check_and_insert(&mut self, line: &str) -> bool {
        let hash = line_hash(line);
        if self.seen.contains(&hash) {
            return false;
        }
        if self.seen.len() >= self.capacity {
            tracing::debug!(capacity = self.capacity, "Line dedup set full, clearing");
            self.seen.clear();
        }
        self.seen.insert(hash);
        true
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
