// Record ID Generator - Snowflake-like ids, monotonic per node
// 64-bit layout: [timestamp:41][node_id:10][sequence:12]

use std::sync::atomic::{AtomicU64, Ordering};

/// 2024-01-01T00:00:00Z, the zero point of the embedded timestamp
const ID_EPOCH_MILLIS: i64 = 1_704_067_200_000;
const SEQUENCE_BITS: u32 = 12;
const NODE_BITS: u32 = 10;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;
const NODE_MASK: u64 = (1 << NODE_BITS) - 1;

/// Generates ids whose numeric order follows creation order on one node.
///
/// The last issued (timestamp, sequence) pair is packed into a single atomic
/// so concurrent callers never observe the same slot. When the sequence of a
/// millisecond is exhausted, or the wall clock steps backwards, the generator
/// keeps counting on the latest timestamp it issued instead of sleeping.
#[derive(Debug)]
pub struct IdGenerator {
    node_id: u16,
    state: AtomicU64,
}

impl IdGenerator {
    pub fn new(node_id: u16) -> Self {
        Self {
            node_id: (node_id as u64 & NODE_MASK) as u16,
            state: AtomicU64::new(0),
        }
    }

    fn elapsed_millis() -> u64 {
        (chrono::Utc::now().timestamp_millis() - ID_EPOCH_MILLIS).max(0) as u64
    }

    pub fn next_id(&self) -> i64 {
        loop {
            let now = Self::elapsed_millis();
            let current = self.state.load(Ordering::Acquire);
            let last_ts = current >> SEQUENCE_BITS;
            let last_seq = current & SEQUENCE_MASK;

            let (ts, seq) = if now > last_ts {
                (now, 0)
            } else if last_seq < SEQUENCE_MASK {
                (last_ts, last_seq + 1)
            } else {
                (last_ts + 1, 0)
            };

            let next = (ts << SEQUENCE_BITS) | seq;
            if self
                .state
                .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let id = (ts << (NODE_BITS + SEQUENCE_BITS))
                    | ((self.node_id as u64) << SEQUENCE_BITS)
                    | seq;
                return id as i64;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn node_of(id: i64) -> u16 {
        (((id as u64) >> SEQUENCE_BITS) & NODE_MASK) as u16
    }

    fn issued_at_millis(id: i64) -> i64 {
        ((id as u64) >> (NODE_BITS + SEQUENCE_BITS)) as i64 + ID_EPOCH_MILLIS
    }

    #[test]
    fn test_ids_are_strictly_increasing() {
        let generator = IdGenerator::new(7);
        let ids: Vec<i64> = (0..10_000).map(|_| generator.next_id()).collect();
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(ids.iter().all(|id| node_of(*id) == 7));
    }

    #[test]
    fn test_timestamp_is_recoverable() {
        let generator = IdGenerator::new(1);
        let before = chrono::Utc::now().timestamp_millis();
        let id = generator.next_id();
        let issued = issued_at_millis(id);
        assert!(issued >= before);
        assert!(issued <= chrono::Utc::now().timestamp_millis() + 1);
    }

    #[test]
    fn test_unique_across_threads() {
        let generator = Arc::new(IdGenerator::new(3));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let generator = Arc::clone(&generator);
                std::thread::spawn(move || {
                    (0..2_000)
                        .map(|_| generator.next_id())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {}", id);
            }
        }
        assert_eq!(seen.len(), 8_000);
    }
}
