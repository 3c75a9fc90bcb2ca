//! Run-level dedup of processed transactions.

use alloy::primitives::B256;
use std::collections::{HashSet, VecDeque};

/// Bounded rolling set of tx hashes: the oldest entry is evicted once
/// `capacity` is reached.
#[derive(Debug)]
pub struct SeenReports {
    order: VecDeque<B256>,
    members: HashSet<B256>,
    capacity: usize,
}

impl SeenReports {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            order: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// Record `tx_hash`. Returns false if it was already present.
    pub fn insert(&mut self, tx_hash: B256) -> bool {
        if !self.members.insert(tx_hash) {
            return false;
        }
        self.order.push_back(tx_hash);
        if self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.members.remove(&evicted);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeat_is_rejected() {
        let mut seen = SeenReports::new(8);
        assert!(seen.insert(B256::repeat_byte(1)));
        assert!(!seen.insert(B256::repeat_byte(1)));
        assert!(seen.insert(B256::repeat_byte(2)));
    }

    #[test]
    fn test_oldest_is_evicted() {
        let mut seen = SeenReports::new(2);
        seen.insert(B256::repeat_byte(1));
        seen.insert(B256::repeat_byte(2));
        seen.insert(B256::repeat_byte(3));
        // 3 and 2 are still remembered, 1 was evicted.
        assert!(!seen.insert(B256::repeat_byte(3)));
        assert!(!seen.insert(B256::repeat_byte(2)));
        assert!(seen.insert(B256::repeat_byte(1)));
    }
}
