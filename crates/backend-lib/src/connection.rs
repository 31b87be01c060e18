// ==================
// crates/backend-lib/src/connection.rs
// ==================
//! Subscriber connections and their writer tasks.
//!
//! A [`Connection`] is the hub-side end of one subscriber: an id plus the
//! sending half of a bounded outbound queue. The receiving half is drained by
//! exactly one writer task, which is the only code that touches the
//! subscriber's [`Transport`].
//!
//! Lifecycle: a connection is *pending* while its value is held by the
//! accepting task, *registered* once the hub has taken ownership of it, and
//! *closed* once the hub drops it (which closes the queue). Since the hub
//! consumes the value on registration, the same connection cannot be
//! registered twice.

use async_trait::async_trait;
use axum::body::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::hub::HubHandle;

/// Outstanding payloads a connection may buffer before it is evicted
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Close code sent when the hub is full ("Try Again Later")
pub const CLOSE_TRY_AGAIN_LATER: u16 = 1013;
/// Close reason sent when the hub is full
pub const CAPACITY_REASON: &str = "Maximum connections reached, try again later";

pub type ConnectionId = Uuid;

/// Receiving half of a connection's outbound queue
pub type Outbound = mpsc::Receiver<Bytes>;

/// Close notification sent to the peer before the transport shuts down
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseNotice {
    pub code: u16,
    pub reason: String,
}

impl CloseNotice {
    /// Notice sent to connections refused at admission
    pub fn capacity_exceeded() -> Self {
        Self {
            code: CLOSE_TRY_AGAIN_LATER,
            reason: CAPACITY_REASON.to_string(),
        }
    }
}

/// An established, bidirectional byte stream to one subscriber.
///
/// Handshake and upgrade happen before a transport reaches the hub.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Write one payload as a text frame
    async fn send_text(&mut self, payload: Bytes) -> Result<(), AppError>;

    /// Optionally notify the peer, then release the transport
    async fn close(&mut self, notice: Option<CloseNotice>) -> Result<(), AppError>;
}

/// Why a payload could not be queued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    /// The writer is not draining fast enough
    Full,
    /// The writer has gone away
    Closed,
}

/// Hub-side handle of one subscriber
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    outbound: mpsc::Sender<Bytes>,
}

impl Connection {
    /// Create a connection with a queue of `capacity` payloads.
    ///
    /// The returned receiver belongs to the connection's writer.
    pub fn new(capacity: usize) -> (Self, Outbound) {
        let (outbound, rx) = mpsc::channel(capacity);
        let connection = Self {
            id: Uuid::new_v4(),
            outbound,
        };
        (connection, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a payload without waiting
    pub fn try_enqueue(&self, payload: Bytes) -> Result<(), EnqueueError> {
        self.outbound.try_send(payload).map_err(|e| match e {
            TrySendError::Full(_) => EnqueueError::Full,
            TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }
}

/// Drain `outbound` into `transport` until the queue closes or a write fails.
///
/// On a failed write the writer stops draining, asks the hub to unregister
/// it, and releases the transport. `done` is cancelled once the writer has
/// finished, however it ends.
pub async fn write_pump<T: Transport>(
    id: ConnectionId,
    mut outbound: Outbound,
    mut transport: T,
    hub: HubHandle,
    done: CancellationToken,
) {
    let _done = done.drop_guard();

    while let Some(payload) = outbound.recv().await {
        if let Err(e) = transport.send_text(payload).await {
            warn!(connection = %id, error = %e, "write failed, dropping connection");
            outbound.close();
            if let Err(e) = hub.unregister(id).await {
                debug!(connection = %id, error = %e, "unregister after write failure");
            }
            break;
        }
    }

    if let Err(e) = transport.close(None).await {
        debug!(connection = %id, error = %e, "closing transport");
    }
    debug!(connection = %id, "writer finished");
}
