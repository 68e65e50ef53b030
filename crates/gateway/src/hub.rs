//! Order-events hub: per-user session registry and fan-out.
//!
//! One hub task drains three bounded channels (register, unregister,
//! broadcast), making the session map single-writer without a lock. The hub
//! itself never blocks on a client: each session has a bounded outbound
//! queue, and a session that cannot keep up is dropped from, marked for
//! disconnect, and left to its write pump to tear down.

use shmring::OrderEvent;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Outbound frames buffered per session before it is considered too slow.
pub const OUTBOUND_CAPACITY: usize = 256;

const REGISTER_DEPTH: usize = 256;
const BROADCAST_DEPTH: usize = 10_000;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// One authenticated `/ws/orderEvents` connection.
pub struct Session {
    id: u64,
    user_id: u64,
    outbound: mpsc::Sender<Vec<u8>>,
    kill_flag: AtomicBool,
    kill_notify: Notify,
}

impl Session {
    /// Creates a session and the receiving half of its outbound queue; the
    /// caller hands the receiver to the write pump.
    pub fn new(user_id: u64) -> (Arc<Self>, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let session = Arc::new(Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            user_id,
            outbound: tx,
            kill_flag: AtomicBool::new(false),
            kill_notify: Notify::new(),
        });
        (session, rx)
    }

    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Marks the session for disconnect; the write pump exits on its next
    /// poll. Idempotent.
    pub fn kill(&self) {
        self.kill_flag.store(true, Ordering::Release);
        self.kill_notify.notify_one();
    }

    pub fn is_killed(&self) -> bool {
        self.kill_flag.load(Ordering::Acquire)
    }

    /// Resolves once the session has been marked for disconnect.
    pub async fn killed(&self) {
        while !self.is_killed() {
            self.kill_notify.notified().await;
        }
    }
}

/// Handle to the hub task. All mutation goes through the channels; the map
/// lives inside [`run_hub`]. The hub stops once every handle clone is gone.
pub struct OrderEventsHub {
    register_tx: mpsc::Sender<Arc<Session>>,
    unregister_tx: mpsc::Sender<Arc<Session>>,
    broadcast_tx: mpsc::Sender<OrderEvent>,
}

impl OrderEventsHub {
    /// Spawns the hub task.
    pub fn start() -> (Arc<Self>, JoinHandle<()>) {
        let (register_tx, register_rx) = mpsc::channel(REGISTER_DEPTH);
        let (unregister_tx, unregister_rx) = mpsc::channel(REGISTER_DEPTH);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(BROADCAST_DEPTH);
        let task = tokio::spawn(run_hub(register_rx, unregister_rx, broadcast_rx));
        (
            Arc::new(Self {
                register_tx,
                unregister_tx,
                broadcast_tx,
            }),
            task,
        )
    }

    pub async fn register(&self, session: Arc<Session>) {
        let _ = self.register_tx.send(session).await;
    }

    pub async fn unregister(&self, session: Arc<Session>) {
        let _ = self.unregister_tx.send(session).await;
    }

    pub async fn broadcast(&self, event: OrderEvent) {
        let _ = self.broadcast_tx.send(event).await;
    }

    /// Blocking variant for the shared-memory poller thread. Returns `false`
    /// once the hub is gone.
    pub fn broadcast_blocking(&self, event: OrderEvent) -> bool {
        self.broadcast_tx.blocking_send(event).is_ok()
    }
}

async fn run_hub(
    mut register_rx: mpsc::Receiver<Arc<Session>>,
    mut unregister_rx: mpsc::Receiver<Arc<Session>>,
    mut broadcast_rx: mpsc::Receiver<OrderEvent>,
) {
    let mut sessions: HashMap<u64, Vec<Arc<Session>>> = HashMap::new();

    loop {
        tokio::select! {
            maybe = register_rx.recv() => match maybe {
                Some(session) => {
                    debug!(user_id = session.user_id(), session = session.id(), "session registered");
                    sessions.entry(session.user_id()).or_default().push(session);
                }
                None => break,
            },
            maybe = unregister_rx.recv() => match maybe {
                Some(session) => {
                    if let Some(list) = sessions.get_mut(&session.user_id()) {
                        list.retain(|other| !Arc::ptr_eq(other, &session));
                        if list.is_empty() {
                            sessions.remove(&session.user_id());
                        }
                    }
                    debug!(user_id = session.user_id(), session = session.id(), "session unregistered");
                }
                None => break,
            },
            maybe = broadcast_rx.recv() => match maybe {
                Some(event) => deliver(&sessions, &event),
                None => break,
            },
        }
    }
    debug!("hub task finished");
}

/// Serializes the event once, then attempts a non-blocking push to every
/// session of the event's user.
fn deliver(sessions: &HashMap<u64, Vec<Arc<Session>>>, event: &OrderEvent) {
    let Some(list) = sessions.get(&event.user_id) else {
        return;
    };

    let frame = match serde_json::to_vec(event) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(user_id = event.user_id, error = %e, "order event serialization failed");
            return;
        }
    };

    for session in list {
        if session.is_killed() {
            continue;
        }
        match session.outbound.try_send(frame.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(
                    user_id = event.user_id,
                    session = session.id(),
                    "outbound queue full, disconnecting slow session"
                );
                session.kill();
            }
            // Pump already gone; the unregister is in flight.
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn event(user_id: u64, order_id: u64) -> OrderEvent {
        OrderEvent::new(user_id, order_id, 1, shmring::event_kind::FILLED, 10, 0, 10, 0)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn events_delivered_in_arrival_order_to_all_sessions_of_user() {
        let (hub, _task) = OrderEventsHub::start();
        let (s1, mut rx1) = Session::new(7);
        let (s2, mut rx2) = Session::new(7);
        let (other, mut rx_other) = Session::new(8);
        hub.register(s1).await;
        hub.register(s2).await;
        hub.register(other).await;
        settle().await;

        for order_id in 0..10 {
            hub.broadcast(event(7, order_id)).await;
        }

        for expected in 0..10 {
            let frame = rx1.recv().await.unwrap();
            let json: serde_json::Value = serde_json::from_slice(&frame).unwrap();
            assert_eq!(json["OrderId"], expected);
            let frame = rx2.recv().await.unwrap();
            let json: serde_json::Value = serde_json::from_slice(&frame).unwrap();
            assert_eq!(json["OrderId"], expected);
        }
        assert!(rx_other.try_recv().is_err());
    }

    #[tokio::test]
    async fn unregister_stops_delivery_and_duplicates_are_noops() {
        let (hub, _task) = OrderEventsHub::start();
        let (session, mut rx) = Session::new(3);
        hub.register(Arc::clone(&session)).await;
        settle().await;

        hub.unregister(Arc::clone(&session)).await;
        hub.unregister(Arc::clone(&session)).await;
        settle().await;

        hub.broadcast(event(3, 1)).await;
        settle().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn slow_session_is_dropped_without_affecting_siblings() {
        let (hub, _task) = OrderEventsHub::start();

        // `slow` never drains; `fast` drains eagerly from a separate task.
        let (slow, mut slow_rx) = Session::new(7);
        let (fast, mut fast_rx) = Session::new(7);
        hub.register(Arc::clone(&slow)).await;
        hub.register(Arc::clone(&fast)).await;
        settle().await;

        let collector = tokio::spawn(async move {
            let mut frames = Vec::new();
            while frames.len() < 300 {
                match tokio::time::timeout(Duration::from_secs(5), fast_rx.recv()).await {
                    Ok(Some(frame)) => frames.push(frame),
                    _ => break,
                }
            }
            frames
        });

        for order_id in 0..300 {
            hub.broadcast(event(7, order_id)).await;
        }

        let frames = collector.await.unwrap();
        assert_eq!(frames.len(), 300, "healthy sibling must see every event");

        settle().await;
        assert!(slow.is_killed(), "overflowing session must be marked");

        // Exactly the first OUTBOUND_CAPACITY frames were queued before the
        // overflow; the rest were dropped.
        let mut buffered = 0;
        while slow_rx.try_recv().is_ok() {
            buffered += 1;
        }
        assert_eq!(buffered, OUTBOUND_CAPACITY);
    }
}
