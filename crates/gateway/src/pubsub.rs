//! Pub/sub client: tracks remote stream subscriptions and feeds delivered
//! envelopes to the broadcaster.
//!
//! The broker itself is behind the [`MarketBus`] contract; anything that can
//! deliver per-channel payloads with subscribe/unsubscribe fits. [`LocalBus`]
//! is the in-process implementation used by the default wiring and tests.

use crate::contracts::{RemoteBroadcaster, StreamEnvelope, StreamUplink};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus transport: {0}")]
    Transport(String),
    #[error("bus closed")]
    Closed,
}

/// One message delivered on a subscribed channel.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub channel: String,
    pub payload: Vec<u8>,
}

/// A live subscription handle. Dropping it closes the delivery stream.
pub struct BusSubscription {
    pub messages: mpsc::Receiver<BusMessage>,
}

/// Broker contract: per-channel payload delivery with subscribe/unsubscribe.
#[async_trait]
pub trait MarketBus: Send + Sync + 'static {
    async fn subscribe(&self, channel: &str) -> Result<BusSubscription, BusError>;
    async fn unsubscribe(&self, channel: &str) -> Result<(), BusError>;
}

/// Client-side subscription registry plus one delivery task per stream.
pub struct PubSubClient {
    bus: Arc<dyn MarketBus>,
    broadcaster: OnceLock<Arc<dyn RemoteBroadcaster>>,
    subscriptions: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl PubSubClient {
    pub fn new(bus: Arc<dyn MarketBus>) -> Arc<Self> {
        Arc::new(Self {
            bus,
            broadcaster: OnceLock::new(),
            subscriptions: Mutex::new(HashMap::new()),
        })
    }

    /// Wires the broadcast side after construction. First call wins.
    pub fn set_broadcaster(&self, broadcaster: Arc<dyn RemoteBroadcaster>) {
        let _ = self.broadcaster.set(broadcaster);
    }

    /// Opens a broker subscription for `stream` and spawns its delivery
    /// task. Already-subscribed streams are a no-op.
    pub async fn subscribe(&self, stream: &str) {
        let mut subscriptions = self.subscriptions.lock().await;
        if subscriptions.contains_key(stream) {
            return;
        }

        let mut subscription = match self.bus.subscribe(stream).await {
            Ok(s) => s,
            Err(e) => {
                error!(stream, error = %e, "bus subscribe failed");
                return;
            }
        };

        let broadcaster = self.broadcaster.get().cloned();
        let stream_name = stream.to_owned();
        let task = tokio::spawn(async move {
            while let Some(message) = subscription.messages.recv().await {
                let envelope: StreamEnvelope = match serde_json::from_slice(&message.payload) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        warn!(stream = %stream_name, error = %e, "dropping malformed bus message");
                        continue;
                    }
                };
                if let Some(broadcaster) = &broadcaster {
                    broadcaster.broadcast_from_remote(envelope).await;
                }
            }
            debug!(stream = %stream_name, "delivery task finished");
        });
        subscriptions.insert(stream.to_owned(), task);
    }

    /// Drops the stream's subscription, tells the broker, and stops the
    /// delivery task. Unknown streams are a no-op.
    pub async fn unsubscribe(&self, stream: &str) {
        let task = self.subscriptions.lock().await.remove(stream);
        let Some(task) = task else { return };

        if let Err(e) = self.bus.unsubscribe(stream).await {
            warn!(stream, error = %e, "bus unsubscribe failed");
        }
        task.abort();
    }

    /// Streams with a live subscription.
    pub async fn active_streams(&self) -> Vec<String> {
        self.subscriptions.lock().await.keys().cloned().collect()
    }
}

#[async_trait]
impl StreamUplink for PubSubClient {
    async fn subscribe_stream(&self, stream: &str) {
        self.subscribe(stream).await;
    }

    async fn unsubscribe_stream(&self, stream: &str) {
        self.unsubscribe(stream).await;
    }
}

/// In-process bus: `publish` fans out to every current subscriber of the
/// channel. Stands behind [`MarketBus`] where a deployment would put its
/// broker client.
pub struct LocalBus {
    topics: Mutex<HashMap<String, Vec<mpsc::Sender<BusMessage>>>>,
}

const LOCAL_BUS_DEPTH: usize = 1024;

impl LocalBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            topics: Mutex::new(HashMap::new()),
        })
    }

    /// Delivers `payload` to every subscriber of `channel`.
    pub async fn publish(&self, channel: &str, payload: &[u8]) {
        let senders: Vec<mpsc::Sender<BusMessage>> = {
            self.topics
                .lock()
                .await
                .get(channel)
                .cloned()
                .unwrap_or_default()
        };
        for sender in senders {
            let _ = sender
                .send(BusMessage {
                    channel: channel.to_owned(),
                    payload: payload.to_vec(),
                })
                .await;
        }
    }

    /// Current subscriber count for a channel.
    pub async fn subscriber_count(&self, channel: &str) -> usize {
        self.topics
            .lock()
            .await
            .get(channel)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl MarketBus for LocalBus {
    async fn subscribe(&self, channel: &str) -> Result<BusSubscription, BusError> {
        let (tx, rx) = mpsc::channel(LOCAL_BUS_DEPTH);
        self.topics
            .lock()
            .await
            .entry(channel.to_owned())
            .or_default()
            .push(tx);
        Ok(BusSubscription { messages: rx })
    }

    async fn unsubscribe(&self, channel: &str) -> Result<(), BusError> {
        self.topics.lock().await.remove(channel);
        Ok(())
    }
}
