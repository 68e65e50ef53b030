//! Integration tests for the queue family: FIFO, capacity bound, on-disk
//! layout, reopen durability, header validation, and a producer/consumer
//! thread pair over two handles of one file.

use shmring::{
    order_type, side, CancelOrder, CancelOrderQueue, Order, OrderEvent, OrderEventQueue,
    PostOrderQueue, QueueError, HEADER_SIZE, QUEUE_CAPACITY,
};
use std::fs;
use std::thread;

fn sample_order(i: u64) -> Order {
    let order_side = if i % 2 == 0 { side::BUY } else { side::SELL };
    Order::new(
        i,
        10_000 + i,
        1_700_000_000_000 + i,
        i % 13,
        100,
        1,
        order_side,
        order_type::LIMIT,
    )
}

#[test]
fn fifo_roundtrip_bit_identical() {
    let dir = tempfile::tempdir().unwrap();
    let queue = PostOrderQueue::create(dir.path().join("PostOrders")).unwrap();

    let inputs: Vec<Order> = (0..10_000).map(sample_order).collect();
    for order in &inputs {
        queue.enqueue(*order).unwrap();
    }
    assert_eq!(queue.depth(), inputs.len() as u64);

    for expected in &inputs {
        assert_eq!(queue.dequeue().as_ref(), Some(expected));
    }
    assert!(queue.is_empty());
}

#[test]
fn capacity_bound_and_recovery() {
    let dir = tempfile::tempdir().unwrap();
    let queue = CancelOrderQueue::create(dir.path().join("CancelOrders")).unwrap();

    for i in 0..QUEUE_CAPACITY as u64 {
        queue.enqueue(CancelOrder::new(i, 1, 1)).unwrap();
    }
    assert!(queue.is_full());

    let err = queue
        .enqueue(CancelOrder::new(u64::MAX, 1, 1))
        .unwrap_err();
    assert!(matches!(err, QueueError::Full));
    assert!(err.is_recoverable());

    // One slot freed, one enqueue succeeds again.
    assert_eq!(queue.dequeue(), Some(CancelOrder::new(0, 1, 1)));
    queue.enqueue(CancelOrder::new(u64::MAX, 1, 1)).unwrap();
}

#[test]
fn record_written_by_conforming_peer_reads_back() {
    // An independent writer following the layout contract: header words at
    // offsets 0 / 64 / 128 / 132, first slot right after the header.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("CancelOrders");

    let mut bytes = vec![0u8; CancelOrderQueue::TOTAL_SIZE];
    bytes[0..8].copy_from_slice(&1u64.to_ne_bytes()); // producer_head
    bytes[64..72].copy_from_slice(&0u64.to_ne_bytes()); // consumer_tail
    bytes[128..132].copy_from_slice(&0x00CA_CECEu32.to_ne_bytes());
    bytes[132..136].copy_from_slice(&(QUEUE_CAPACITY as u32).to_ne_bytes());

    let slot = HEADER_SIZE;
    bytes[slot..slot + 8].copy_from_slice(&0xAABB_CCDDu64.to_ne_bytes()); // order_id
    bytes[slot + 8..slot + 16].copy_from_slice(&7u64.to_ne_bytes()); // user_id
    bytes[slot + 16..slot + 20].copy_from_slice(&3u32.to_ne_bytes()); // symbol
    fs::write(&path, &bytes).unwrap();

    let queue = CancelOrderQueue::open(&path).unwrap();
    assert_eq!(queue.depth(), 1);
    assert_eq!(queue.dequeue(), Some(CancelOrder::new(0xAABB_CCDD, 7, 3)));
    assert_eq!(queue.dequeue(), None);
}

#[test]
fn reopen_preserves_pending_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("OrderEvents");

    let inputs: Vec<OrderEvent> = (0..500)
        .map(|i| OrderEvent::new(i % 5, i, 1, (i % 5) as u32, 10, 90, 100, 0))
        .collect();
    {
        let queue = OrderEventQueue::create(&path).unwrap();
        for ev in &inputs {
            queue.enqueue(*ev).unwrap();
        }
        queue.close().unwrap();
    }

    let queue = OrderEventQueue::open(&path).unwrap();
    assert_eq!(queue.depth(), inputs.len() as u64);
    for expected in &inputs {
        assert_eq!(queue.dequeue().as_ref(), Some(expected));
    }
}

#[test]
fn open_rejects_altered_magic() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("PostOrders");
    PostOrderQueue::create(&path).unwrap().close().unwrap();

    let mut bytes = fs::read(&path).unwrap();
    bytes[128] ^= 0xFF;
    fs::write(&path, &bytes).unwrap();

    let err = PostOrderQueue::open(&path).unwrap_err();
    assert!(matches!(err, QueueError::BadMagic { .. }));
}

#[test]
fn open_rejects_wrong_record_type() {
    // A cancel-order file is a foreign file to the post-order queue.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("CancelOrders");
    CancelOrderQueue::create(&path).unwrap().close().unwrap();

    let err = PostOrderQueue::open(&path).unwrap_err();
    assert!(matches!(err, QueueError::SizeMismatch { .. }));
}

#[test]
fn open_rejects_truncated_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("PostOrders");
    PostOrderQueue::create(&path).unwrap().close().unwrap();

    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() - 1]).unwrap();

    let err = PostOrderQueue::open(&path).unwrap_err();
    assert!(matches!(err, QueueError::SizeMismatch { .. }));
}

#[test]
fn open_rejects_capacity_drift() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("PostOrders");
    PostOrderQueue::create(&path).unwrap().close().unwrap();

    let mut bytes = fs::read(&path).unwrap();
    bytes[132..136].copy_from_slice(&1024u32.to_ne_bytes());
    fs::write(&path, &bytes).unwrap();

    let err = PostOrderQueue::open(&path).unwrap_err();
    assert!(matches!(
        err,
        QueueError::CapacityMismatch { actual: 1024, .. }
    ));
}

#[test]
fn producer_consumer_threads_no_gaps_no_duplicates() {
    const COUNT: u64 = 1_000_000;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("CancelOrders");

    // Two handles on one file, as the gateway and the engine would hold.
    let producer = CancelOrderQueue::create(&path).unwrap();
    let consumer = CancelOrderQueue::open(&path).unwrap();

    let writer = thread::spawn(move || {
        for i in 0..COUNT {
            let record = CancelOrder::new(i, i, 0);
            loop {
                match producer.enqueue(record) {
                    Ok(()) => break,
                    Err(QueueError::Full) => thread::yield_now(),
                    Err(e) => panic!("enqueue failed: {e}"),
                }
            }
        }
    });

    let reader = thread::spawn(move || {
        let mut next = 0u64;
        while next < COUNT {
            match consumer.dequeue() {
                Some(record) => {
                    assert_eq!(record.order_id, next, "gap or duplicate at {next}");
                    next += 1;
                }
                None => thread::yield_now(),
            }
        }
        assert_eq!(consumer.dequeue(), None);
    });

    writer.join().unwrap();
    reader.join().unwrap();
}
