//! Owner of the six engine queues: typed enqueue for the inbound path,
//! poller threads for the outbound path.

use crate::config::QueuePaths;
use crate::error::{GatewayError, SubmitError};
use crate::hub::OrderEventsHub;
use crate::shutdown::ShutdownSignal;
use shmring::{
    event_kind, Backoff, BalanceResponse, BalanceResponseQueue, CancelOrder, CancelOrderQueue,
    HoldingResponse, HoldingResponseQueue, Order, OrderEventQueue, PostOrderQueue, Query,
    QueryQueue,
};
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Park time once spinning and yielding are exhausted.
const POLL_SLEEP: Duration = Duration::from_micros(200);

/// Receiver of decoded query responses; routing by query id happens
/// downstream of this seam.
pub trait QueryResponseSink: Send + Sync + 'static {
    fn on_balance(&self, response: BalanceResponse);
    fn on_holdings(&self, response: HoldingResponse);
}

/// Default sink: log and drop.
pub struct TracingResponseSink;

impl QueryResponseSink for TracingResponseSink {
    fn on_balance(&self, response: BalanceResponse) {
        debug!(
            query_id = response.query_id,
            user_id = response.user_id,
            "balance response"
        );
    }

    fn on_holdings(&self, response: HoldingResponse) {
        debug!(
            query_id = response.query_id,
            user_id = response.user_id,
            "holdings response"
        );
    }
}

/// One handle of each queue shared with the matching engine. The gateway is
/// the producer of PostOrders/CancelOrders/Queries and the consumer of
/// OrderEvents/BalanceResponse/HoldingResponse.
#[derive(Debug)]
pub struct ShmManager {
    post_orders: PostOrderQueue,
    cancel_orders: CancelOrderQueue,
    order_events: OrderEventQueue,
    queries: QueryQueue,
    balance_responses: BalanceResponseQueue,
    holding_responses: HoldingResponseQueue,
}

impl ShmManager {
    /// Opens all six queues. The engine creates them at boot; any missing,
    /// missized, or foreign file fails the whole gateway before a listener
    /// binds.
    pub fn open_all(paths: &QueuePaths) -> Result<Arc<Self>, GatewayError> {
        Ok(Arc::new(Self {
            post_orders: PostOrderQueue::open(&paths.post_orders)?,
            cancel_orders: CancelOrderQueue::open(&paths.cancel_orders)?,
            order_events: OrderEventQueue::open(&paths.order_events)?,
            queries: QueryQueue::open(&paths.queries)?,
            balance_responses: BalanceResponseQueue::open(&paths.balance_responses)?,
            holding_responses: HoldingResponseQueue::open(&paths.holding_responses)?,
        }))
    }

    /// Enqueues a new order for the engine.
    pub fn submit_order(&self, order: Order) -> Result<(), SubmitError> {
        self.post_orders
            .enqueue(order)
            .map_err(|_| SubmitError::EngineBusy {
                queue: "post-order",
            })
    }

    /// Enqueues a cancel request.
    pub fn submit_cancel(&self, cancel: CancelOrder) -> Result<(), SubmitError> {
        self.cancel_orders
            .enqueue(cancel)
            .map_err(|_| SubmitError::EngineBusy { queue: "cancel" })
    }

    /// Enqueues a balance/holdings query.
    pub fn submit_query(&self, query: Query) -> Result<(), SubmitError> {
        self.queries
            .enqueue(query)
            .map_err(|_| SubmitError::EngineBusy { queue: "query" })
    }

    /// Spawns the two consumer threads. Each observes the shutdown signal
    /// between probes and exits after one final empty probe, so pending
    /// records are drained.
    pub fn spawn_pollers(
        self: &Arc<Self>,
        hub: Arc<OrderEventsHub>,
        responses: Arc<dyn QueryResponseSink>,
        shutdown: ShutdownSignal,
    ) -> io::Result<PollerHandles> {
        let order_events = {
            let shm = Arc::clone(self);
            let shutdown = shutdown.clone();
            thread::Builder::new()
                .name("order-events-poller".into())
                .spawn(move || shm.poll_order_events(&hub, &shutdown))?
        };
        let query_responses = {
            let shm = Arc::clone(self);
            thread::Builder::new()
                .name("query-response-poller".into())
                .spawn(move || shm.poll_query_responses(responses.as_ref(), &shutdown))?
        };
        Ok(PollerHandles {
            order_events,
            query_responses,
        })
    }

    fn poll_order_events(&self, hub: &OrderEventsHub, shutdown: &ShutdownSignal) {
        let mut backoff = Backoff::new();
        loop {
            match self.order_events.dequeue() {
                Some(event) => {
                    backoff.reset();
                    // A bad record is logged and skipped; the poller never
                    // dies on one.
                    if event.event_kind > event_kind::MAX {
                        warn!(
                            user_id = event.user_id,
                            order_id = event.order_id,
                            event_kind = event.event_kind,
                            "skipping undecodable order event"
                        );
                        continue;
                    }
                    if !hub.broadcast_blocking(event) {
                        debug!("hub gone, order-events poller exiting");
                        return;
                    }
                }
                None => {
                    if shutdown.is_shutdown() {
                        break;
                    }
                    park(&mut backoff);
                }
            }
        }
        info!("order-events poller stopped");
    }

    fn poll_query_responses(&self, sink: &dyn QueryResponseSink, shutdown: &ShutdownSignal) {
        let mut backoff = Backoff::new();
        loop {
            let mut progressed = false;
            if let Some(response) = self.balance_responses.dequeue() {
                sink.on_balance(response);
                progressed = true;
            }
            if let Some(response) = self.holding_responses.dequeue() {
                sink.on_holdings(response);
                progressed = true;
            }
            if progressed {
                backoff.reset();
                continue;
            }
            if shutdown.is_shutdown() {
                break;
            }
            park(&mut backoff);
        }
        info!("query-response poller stopped");
    }

    /// Msyncs every mapping; called once at shutdown.
    pub fn flush_all(&self) -> Result<(), GatewayError> {
        self.post_orders.flush()?;
        self.cancel_orders.flush()?;
        self.order_events.flush()?;
        self.queries.flush()?;
        self.balance_responses.flush()?;
        self.holding_responses.flush()?;
        Ok(())
    }
}

/// Spin briefly, yield, then take a sub-millisecond sleep. Balances dequeue
/// latency against idle CPU burn.
fn park(backoff: &mut Backoff) {
    if backoff.is_completed() {
        thread::sleep(POLL_SLEEP);
        backoff.reset();
    } else {
        backoff.snooze();
    }
}

/// Join handles for the two poller threads.
pub struct PollerHandles {
    order_events: thread::JoinHandle<()>,
    query_responses: thread::JoinHandle<()>,
}

impl PollerHandles {
    /// Blocks until both pollers have drained and exited.
    pub fn join(self) {
        if self.order_events.join().is_err() {
            warn!("order-events poller panicked");
        }
        if self.query_responses.join().is_err() {
            warn!("query-response poller panicked");
        }
    }
}
