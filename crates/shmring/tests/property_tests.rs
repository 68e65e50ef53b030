//! Property-based tests for the queue invariants.
//!
//! - Bounded depth: `0 ≤ head − tail ≤ capacity` after any op sequence.
//! - FIFO: dequeues always match a sequential model of prior enqueues.

use proptest::prelude::*;
use shmring::{CancelOrder, CancelOrderQueue, QueueError};
use std::collections::VecDeque;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Depth never exceeds capacity, dequeues replay enqueues in order.
    #[test]
    fn prop_fifo_against_model(ops in prop::collection::vec(prop::bool::ANY, 1..200)) {
        let dir = tempfile::tempdir().unwrap();
        let queue = CancelOrderQueue::create(dir.path().join("q")).unwrap();
        let capacity = queue.capacity() as u64;

        let mut model: VecDeque<u64> = VecDeque::new();
        let mut seq = 0u64;

        for enqueue in ops {
            if enqueue {
                match queue.enqueue(CancelOrder::new(seq, 1, 0)) {
                    Ok(()) => {
                        model.push_back(seq);
                        seq += 1;
                    }
                    Err(QueueError::Full) => {
                        prop_assert_eq!(model.len() as u64, capacity);
                    }
                    Err(e) => prop_assert!(false, "enqueue: {}", e),
                }
            } else {
                let expected = model.pop_front();
                let actual = queue.dequeue().map(|r| r.order_id);
                prop_assert_eq!(actual, expected);
            }

            prop_assert!(queue.depth() <= capacity,
                "depth {} exceeds capacity {}", queue.depth(), capacity);
            prop_assert_eq!(queue.depth(), model.len() as u64);
        }
    }

    /// Depth reported after a burst of enqueues is exact.
    #[test]
    fn prop_depth_tracks_enqueues(count in 0u64..500) {
        let dir = tempfile::tempdir().unwrap();
        let queue = CancelOrderQueue::create(dir.path().join("q")).unwrap();

        for i in 0..count {
            queue.enqueue(CancelOrder::new(i, 1, 0)).unwrap();
        }
        prop_assert_eq!(queue.depth(), count);

        for _ in 0..count {
            prop_assert!(queue.dequeue().is_some());
        }
        prop_assert!(queue.is_empty());
    }
}
