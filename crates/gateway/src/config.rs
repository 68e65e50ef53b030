//! Gateway configuration.

use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Runtime configuration. Defaults match the engine's deployment layout;
/// both knobs can be overridden through the environment.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address the websocket listener binds to (`SHMGATE_LISTEN`).
    pub listen_addr: SocketAddr,
    /// Directory holding the six queue files (`SHMGATE_SHM_DIR`).
    pub shm_dir: PathBuf,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            shm_dir: PathBuf::from("/tmp/trading"),
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(value) = env::var("SHMGATE_LISTEN") {
            match value.parse() {
                Ok(addr) => config.listen_addr = addr,
                Err(e) => warn!(value = %value, error = %e, "ignoring invalid SHMGATE_LISTEN"),
            }
        }
        if let Ok(value) = env::var("SHMGATE_SHM_DIR") {
            config.shm_dir = PathBuf::from(value);
        }
        config
    }

    pub fn queue_paths(&self) -> QueuePaths {
        QueuePaths::new(&self.shm_dir)
    }
}

/// The six queue file locations under the shared-memory directory.
#[derive(Debug, Clone)]
pub struct QueuePaths {
    pub post_orders: PathBuf,
    pub cancel_orders: PathBuf,
    pub order_events: PathBuf,
    pub queries: PathBuf,
    pub balance_responses: PathBuf,
    pub holding_responses: PathBuf,
}

impl QueuePaths {
    pub fn new(dir: &Path) -> Self {
        Self {
            post_orders: dir.join("PostOrders"),
            cancel_orders: dir.join("CancelOrders"),
            order_events: dir.join("OrderEvents"),
            queries: dir.join("Queries"),
            balance_responses: dir.join("BalanceResponse"),
            holding_responses: dir.join("HoldingResponse"),
        }
    }
}
