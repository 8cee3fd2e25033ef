use crate::config::{BreakerConfig, ToolServerConfig};
use crate::connection::{BreakerStatus, CircuitBreakers, TransportConfig};
use crate::error::ToolError;
use crate::traits::{Connector, ConnectorBuilder};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

struct ConnectionRecord {
    connector: Arc<dyn Connector>,
    generation: u64,
    monitor: JoinHandle<()>,
}

type ConnectionMap = DashMap<Uuid, ConnectionRecord>;

/// Process-wide cache of live connectors, one per tool server, guarded by a
/// circuit breaker per server.
///
/// Reads go straight to the sharded maps. Creation for a given server id is
/// serialized through a per-server lock so concurrent first use builds a
/// single connector.
pub struct ConnectionRegistry {
    builder: Arc<dyn ConnectorBuilder>,
    breakers: CircuitBreakers,
    connections: Arc<ConnectionMap>,
    creation_locks: DashMap<Uuid, Arc<Mutex<()>>>,
    next_generation: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new(builder: Arc<dyn ConnectorBuilder>, breaker: BreakerConfig) -> Self {
        Self {
            builder,
            breakers: CircuitBreakers::new(breaker),
            connections: Arc::new(DashMap::new()),
            creation_locks: DashMap::new(),
            next_generation: AtomicU64::new(1),
        }
    }

    pub async fn acquire(&self, server: &ToolServerConfig) -> Result<Arc<dyn Connector>, ToolError> {
        self.check_breaker(server)?;

        if let Some(connector) = self.cached(server.id) {
            return Ok(connector);
        }

        let lock = self.creation_locks.entry(server.id).or_default().clone();
        let _guard = lock.lock().await;

        // Another caller may have finished (or failed) a build while we waited.
        if let Some(connector) = self.cached(server.id) {
            return Ok(connector);
        }
        self.check_breaker(server)?;

        let transport = TransportConfig::from_server(server).map_err(|e| ToolError::Configuration {
            reason: e.to_string(),
        })?;

        let started = Instant::now();
        let connector = match self.builder.build(server, &transport).await {
            Ok(connector) => connector,
            Err(e) => {
                warn!(
                    server_id = %server.id,
                    server = %server.name,
                    error = %format!("{e:#}"),
                    "Failed to build connector"
                );
                self.record_failure(server.id).await;
                return Err(ToolError::Connection {
                    server: server.name.clone(),
                    reason: format!("{e:#}"),
                });
            }
        };

        self.breakers.record_success(server.id);
        self.install(server, connector.clone());

        info!(
            server_id = %server.id,
            server = %server.name,
            kind = %transport.kind(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Connected to tool server"
        );
        Ok(connector)
    }

    /// Removes the cached connection and shuts it down. Returns `false` if
    /// there was nothing to release.
    pub async fn release(&self, server_id: Uuid) -> bool {
        let Some((_, record)) = self.connections.remove(&server_id) else {
            return false;
        };

        record.monitor.abort();
        record.connector.shutdown().await;
        info!(%server_id, "Released tool server connection");
        true
    }

    pub async fn release_all(&self) {
        let ids: Vec<Uuid> = self.connections.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            self.release(id).await;
        }
    }

    pub fn record_success(&self, server_id: Uuid) {
        self.breakers.record_success(server_id);
    }

    /// Records a failure against the server's breaker. If that opens the
    /// breaker the cached connection is dropped, so the first attempt after
    /// the reset deadline starts from a fresh connector.
    pub async fn record_failure(&self, server_id: Uuid) {
        if !self.breakers.record_failure(server_id) {
            return;
        }

        if let Some((_, record)) = self.connections.remove(&server_id) {
            record.monitor.abort();
            record.connector.shutdown().await;
            warn!(%server_id, "Dropped cached connection after circuit opened");
        }
    }

    pub fn is_connected(&self, server_id: Uuid) -> bool {
        self.connections
            .get(&server_id)
            .is_some_and(|record| record.connector.is_alive())
    }

    pub fn breaker_status(&self, server_id: Uuid) -> BreakerStatus {
        self.breakers.status(server_id)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn check_breaker(&self, server: &ToolServerConfig) -> Result<(), ToolError> {
        self.breakers.check(server.id).map_err(|retry_in| {
            debug!(server_id = %server.id, server = %server.name, "Circuit open, failing fast");
            ToolError::CircuitOpen {
                server: server.name.clone(),
                retry_in,
            }
        })
    }

    fn cached(&self, server_id: Uuid) -> Option<Arc<dyn Connector>> {
        let (connector, generation) = {
            let record = self.connections.get(&server_id)?;
            (record.connector.clone(), record.generation)
        };

        if connector.is_alive() {
            return Some(connector);
        }

        if let Some((_, record)) = self
            .connections
            .remove_if(&server_id, |_, r| r.generation == generation)
        {
            record.monitor.abort();
            debug!(%server_id, "Discarded dead connection");
            tokio::spawn(async move { record.connector.shutdown().await });
        }
        None
    }

    fn install(&self, server: &ToolServerConfig, connector: Arc<dyn Connector>) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let monitor = tokio::spawn(watch_termination(
            self.connections.clone(),
            server.id,
            server.name.clone(),
            generation,
            connector.clone(),
        ));

        let previous = self.connections.insert(
            server.id,
            ConnectionRecord {
                connector,
                generation,
                monitor,
            },
        );

        if let Some(previous) = previous {
            previous.monitor.abort();
            tokio::spawn(async move { previous.connector.shutdown().await });
        }
    }
}

async fn watch_termination(
    connections: Arc<ConnectionMap>,
    server_id: Uuid,
    server_name: String,
    generation: u64,
    connector: Arc<dyn Connector>,
) {
    connector.terminated().await;

    if connections
        .remove_if(&server_id, |_, r| r.generation == generation)
        .is_some()
    {
        warn!(%server_id, server = %server_name, "Tool server terminated, connection evicted");
    }
}
