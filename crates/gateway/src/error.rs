//! Gateway error types.

use shmring::QueueError;
use thiserror::Error;

/// Fatal gateway-level failures.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// A shared-memory queue could not be opened or flushed. At startup
    /// this refuses the whole gateway; no listener may bind against
    /// missing or corrupt engine queues.
    #[error("shared-memory queue: {0}")]
    Queue(#[from] QueueError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Typed rejection for an inbound client request. The gateway never spins
/// retrying an enqueue; the engine being behind is the client's signal to
/// back off.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("engine busy: {queue} queue is full")]
    EngineBusy { queue: &'static str },
}
