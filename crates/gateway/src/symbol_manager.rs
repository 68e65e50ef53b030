//! Per-stream subscriber registry and market-data fan-out.

use crate::contracts::{FrameSink, RemoteBroadcaster, SinkError, StreamEnvelope, StreamUplink};
use async_trait::async_trait;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

static NEXT_SOCKET_ID: AtomicU64 = AtomicU64::new(1);

/// One market-data connection. The mutex serializes writes on this socket;
/// writes across sockets run concurrently. Identity (for membership and
/// cleanup) is the `Arc` pointer.
pub struct ClientSocket {
    id: u64,
    sink: Mutex<Box<dyn FrameSink>>,
}

impl ClientSocket {
    pub fn new(sink: Box<dyn FrameSink>) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_SOCKET_ID.fetch_add(1, Ordering::Relaxed),
            sink: Mutex::new(sink),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    async fn send_text(&self, frame: &str) -> Result<(), SinkError> {
        self.sink.lock().await.send_text(frame).await
    }
}

/// Routes remote market-data messages to subscribed sockets and drives the
/// upstream subscription lifecycle: the first subscriber of a stream opens
/// the remote subscription, the last one leaving closes it.
pub struct SymbolManager {
    subs: RwLock<HashMap<String, Vec<Arc<ClientSocket>>>>,
    uplink: OnceLock<Arc<dyn StreamUplink>>,
}

impl SymbolManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            subs: RwLock::new(HashMap::new()),
            uplink: OnceLock::new(),
        })
    }

    /// Wires the pub/sub side after construction. First call wins.
    pub fn set_uplink(&self, uplink: Arc<dyn StreamUplink>) {
        let _ = self.uplink.set(uplink);
    }

    // Upstream calls run in spawned tasks: broker I/O must never block a
    // websocket read loop or a broadcast.
    fn trigger_upstream_subscribe(&self, stream: String) {
        if let Some(uplink) = self.uplink.get() {
            let uplink = Arc::clone(uplink);
            tokio::spawn(async move { uplink.subscribe_stream(&stream).await });
        }
    }

    fn trigger_upstream_unsubscribe(&self, stream: String) {
        if let Some(uplink) = self.uplink.get() {
            let uplink = Arc::clone(uplink);
            tokio::spawn(async move { uplink.unsubscribe_stream(&stream).await });
        }
    }

    /// Adds `socket` to `stream`'s subscriber set. Duplicate subscribes by
    /// the same socket are idempotent; the first subscriber triggers exactly
    /// one upstream subscribe.
    pub async fn subscribe(&self, stream: &str, socket: Arc<ClientSocket>) {
        let first_subscriber = {
            let mut subs = self.subs.write().await;
            if let Some(sockets) = subs.get_mut(stream) {
                if !sockets.iter().any(|s| Arc::ptr_eq(s, &socket)) {
                    sockets.push(socket);
                }
                false
            } else {
                subs.insert(stream.to_owned(), vec![socket]);
                true
            }
        };
        if first_subscriber {
            debug!(stream, "first subscriber, opening remote subscription");
            self.trigger_upstream_subscribe(stream.to_owned());
        }
    }

    /// Removes `socket` from `stream`. The last subscriber leaving erases
    /// the key and closes the remote subscription. Absent streams are a
    /// no-op.
    pub async fn unsubscribe(&self, stream: &str, socket: &Arc<ClientSocket>) {
        let emptied = {
            let mut subs = self.subs.write().await;
            if let Some(sockets) = subs.get_mut(stream) {
                sockets.retain(|s| !Arc::ptr_eq(s, socket));
                if sockets.is_empty() {
                    subs.remove(stream);
                    true
                } else {
                    false
                }
            } else {
                false
            }
        };
        if emptied {
            debug!(stream, "last subscriber left, closing remote subscription");
            self.trigger_upstream_unsubscribe(stream.to_owned());
        }
    }

    /// Removes `socket` from every stream; invoked when its connection
    /// closes. Streams that empty out close their remote subscription.
    pub async fn cleanup_connection(&self, socket: &Arc<ClientSocket>) {
        let emptied: Vec<String> = {
            let mut subs = self.subs.write().await;
            let mut emptied = Vec::new();
            subs.retain(|stream, sockets| {
                sockets.retain(|s| !Arc::ptr_eq(s, socket));
                if sockets.is_empty() {
                    emptied.push(stream.clone());
                    false
                } else {
                    true
                }
            });
            emptied
        };
        for stream in emptied {
            debug!(stream = %stream, socket = socket.id, "stream emptied by cleanup");
            self.trigger_upstream_unsubscribe(stream);
        }
    }

    /// Subscriber count for a stream.
    pub async fn subscriber_count(&self, stream: &str) -> usize {
        self.subs.read().await.get(stream).map_or(0, Vec::len)
    }

    /// Number of streams with at least one subscriber.
    pub async fn stream_count(&self) -> usize {
        self.subs.read().await.len()
    }
}

#[async_trait]
impl RemoteBroadcaster for SymbolManager {
    /// Snapshots the subscriber set, releases the lock, then writes the
    /// serialized envelope to every socket concurrently. A failed write
    /// cleans up that socket only.
    async fn broadcast_from_remote(&self, envelope: StreamEnvelope) {
        let targets: Vec<Arc<ClientSocket>> = {
            let subs = self.subs.read().await;
            match subs.get(&envelope.stream) {
                Some(sockets) => sockets.clone(),
                None => return,
            }
        };

        let frame = match serde_json::to_string(&envelope) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(stream = %envelope.stream, error = %e, "envelope serialization failed");
                return;
            }
        };

        let results = join_all(targets.iter().map(|socket| socket.send_text(&frame))).await;
        for (socket, result) in targets.iter().zip(results) {
            if let Err(e) = result {
                warn!(
                    stream = %envelope.stream,
                    socket = socket.id,
                    error = %e,
                    "write failed, cleaning up connection"
                );
                self.cleanup_connection(socket).await;
            }
        }
    }
}
