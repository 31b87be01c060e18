// ============================
// promstream-backend/src/hub.rs
// ============================
//! Connection hub.
//!
//! The [`Hub`] owns the registry of live connections. It runs as a single
//! actor: every register, unregister and broadcast request is a [`HubMsg`]
//! on one mailbox, and only the actor's loop mutates the registry. A
//! broadcast therefore always sees a consistent membership, and the capacity
//! check happens in the same step as the insert.
//!
//! Broadcasts never block. Each payload is offered to every connection's
//! outbound queue with a non-blocking push; a connection whose queue is full
//! (or whose writer is gone) is evicted on the spot.

use std::collections::HashMap;

use axum::body::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connection::{
    write_pump, CloseNotice, Connection, ConnectionId, EnqueueError, Transport,
};
use crate::error::AppError;
use crate::metrics::Metrics;

/// Default bound on registered connections
pub const DEFAULT_MAX_CONNECTIONS: usize = 64;

/// Pending requests the hub buffers before callers wait
const MAILBOX_CAPACITY: usize = 128;

/// Outcome of a registration request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    Rejected(RejectReason),
}

/// Why a connection was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    CapacityExceeded,
}

/// Message sent *into* the hub
#[derive(Debug)]
pub enum HubMsg {
    Register {
        connection: Connection,
        resp_tx: oneshot::Sender<Admission>,
    },
    Unregister {
        id: ConnectionId,
    },
    Broadcast {
        payload: Bytes,
    },
    Count {
        resp_tx: oneshot::Sender<usize>,
    },
}

/// Result of fanning one payload out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub evicted: usize,
}

/// A transport admitted by [`HubHandle::serve_connection`]
#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: ConnectionId,
    /// Cancelled when the connection's writer has finished
    pub writer_done: CancellationToken,
}

/// Handle that other components keep: the hub's mailbox
#[derive(Clone)]
pub struct HubHandle {
    cmd_tx: mpsc::Sender<HubMsg>,
    queue_capacity: usize,
}

impl HubHandle {
    /// Spawn the hub's control loop and return a handle to it.
    ///
    /// Each call starts exactly one loop; the loop ends once every handle
    /// has been dropped.
    pub fn spawn(max_connections: usize, queue_capacity: usize, metrics: Metrics) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(MAILBOX_CAPACITY);
        let hub = Hub::new(max_connections, metrics);

        tokio::spawn(hub.run(cmd_rx));

        Self {
            cmd_tx,
            queue_capacity,
        }
    }

    /// Capacity of the outbound queue given to new connections
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Ask the hub to admit a connection
    pub async fn register(&self, connection: Connection) -> Result<Admission, AppError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.cmd_tx
            .send(HubMsg::Register {
                connection,
                resp_tx,
            })
            .await?;
        Ok(resp_rx.await?)
    }

    /// Ask the hub to drop a connection; unknown ids are ignored
    pub async fn unregister(&self, id: ConnectionId) -> Result<(), AppError> {
        self.cmd_tx.send(HubMsg::Unregister { id }).await?;
        Ok(())
    }

    /// Queue a payload for every connection registered when the hub gets to it
    pub async fn broadcast(&self, payload: Bytes) -> Result<(), AppError> {
        self.cmd_tx.send(HubMsg::Broadcast { payload }).await?;
        Ok(())
    }

    /// Number of registered connections, after all earlier requests
    pub async fn connection_count(&self) -> Result<usize, AppError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.cmd_tx.send(HubMsg::Count { resp_tx }).await?;
        Ok(resp_rx.await?)
    }

    /// Admit an established transport and start its writer.
    ///
    /// A refused transport is sent a 1013 close notice and released.
    pub async fn serve_connection<T: Transport>(
        &self,
        mut transport: T,
    ) -> Result<Subscription, AppError> {
        let (connection, outbound) = Connection::new(self.queue_capacity);
        let id = connection.id();

        match self.register(connection).await? {
            Admission::Accepted => {
                let writer_done = CancellationToken::new();
                tokio::spawn(write_pump(
                    id,
                    outbound,
                    transport,
                    self.clone(),
                    writer_done.clone(),
                ));
                Ok(Subscription { id, writer_done })
            },
            Admission::Rejected(RejectReason::CapacityExceeded) => {
                if let Err(e) = transport
                    .close(Some(CloseNotice::capacity_exceeded()))
                    .await
                {
                    debug!(connection = %id, error = %e, "closing rejected transport");
                }
                Err(AppError::CapacityExceeded)
            },
        }
    }
}

/// The hub actor: registry state plus its control loop
pub struct Hub {
    connections: HashMap<ConnectionId, Connection>,
    max_connections: usize,
    metrics: Metrics,
}

impl Hub {
    pub fn new(max_connections: usize, metrics: Metrics) -> Self {
        Self {
            connections: HashMap::new(),
            max_connections,
            metrics,
        }
    }

    /// Number of registered connections
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Admit a connection unless the registry is full.
    ///
    /// A refused connection is dropped, which closes its queue.
    pub fn register(&mut self, connection: Connection) -> Admission {
        let id = connection.id();
        if self.connections.len() >= self.max_connections {
            warn!(
                connection = %id,
                max_connections = self.max_connections,
                "rejecting connection, hub at capacity"
            );
            self.metrics.admissions_rejected.inc();
            return Admission::Rejected(RejectReason::CapacityExceeded);
        }

        self.connections.insert(id, connection);
        self.metrics.connections.set(self.connections.len() as i64);
        info!(connection = %id, connections = self.connections.len(), "connection registered");
        Admission::Accepted
    }

    /// Remove a connection, closing its queue.
    ///
    /// Returns whether it was registered.
    pub fn unregister(&mut self, id: ConnectionId) -> bool {
        let removed = self.connections.remove(&id).is_some();
        if removed {
            self.metrics.connections.set(self.connections.len() as i64);
            info!(connection = %id, connections = self.connections.len(), "connection unregistered");
        }
        removed
    }

    /// Offer `payload` to every registered connection, evicting any that
    /// cannot take it right now.
    pub fn broadcast(&mut self, payload: &Bytes) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        self.connections.retain(|id, connection| {
            match connection.try_enqueue(payload.clone()) {
                Ok(()) => {
                    report.delivered += 1;
                    true
                },
                Err(EnqueueError::Full) => {
                    warn!(connection = %id, "evicting slow consumer");
                    report.evicted += 1;
                    false
                },
                Err(EnqueueError::Closed) => {
                    debug!(connection = %id, "evicting connection with closed queue");
                    report.evicted += 1;
                    false
                },
            }
        });

        self.metrics.broadcasts.inc();
        if report.evicted > 0 {
            self.metrics.evictions.inc_by(report.evicted as u64);
            self.metrics.connections.set(self.connections.len() as i64);
        }
        debug!(
            delivered = report.delivered,
            evicted = report.evicted,
            bytes = payload.len(),
            "broadcast"
        );
        report
    }

    pub async fn run(mut self, mut rx: mpsc::Receiver<HubMsg>) {
        while let Some(msg) = rx.recv().await {
            match msg {
                HubMsg::Register { connection, resp_tx } => {
                    let admission = self.register(connection);
                    let _ = resp_tx.send(admission);
                },
                HubMsg::Unregister { id } => {
                    self.unregister(id);
                },
                HubMsg::Broadcast { payload } => {
                    self.broadcast(&payload);
                },
                HubMsg::Count { resp_tx } => {
                    let _ = resp_tx.send(self.connections.len());
                },
            }
        }
        debug!("hub mailbox closed, control loop exiting");
    }
}
