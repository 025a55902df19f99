//! One client's session: its identity, outbound queue and the two pumps that
//! move frames between the socket and the hub.
//!
//! The pumps are generic over `Stream`/`Sink` of axum WebSocket messages so the
//! split halves of a real socket and in-memory channels drive them the same way.

use std::fmt;

use axum::extract::ws::Message;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, warn};

use crate::{
    envelope::{Envelope, Payload},
    hub::HubHandle,
};

/// Opaque, unique, immutable identity of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Mints a fresh identity. Identities are never reused.
    pub fn mint() -> Self {
        Self(nanoid::nanoid!())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The hub's side of a connection: where to deliver, and under which name.
///
/// This holds the only sender of the outbound queue, so dropping the handle
/// is what closes the queue and lets the write pump finish.
#[derive(Debug)]
pub struct ConnectionHandle {
    pub(crate) id: ConnectionId,
    pub(crate) outbound: mpsc::Sender<Payload>,
}

impl ConnectionHandle {
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }
}

pub(crate) fn outbound_queue(
    id: ConnectionId,
    capacity: usize,
) -> (ConnectionHandle, mpsc::Receiver<Payload>) {
    // tokio rejects zero-capacity channels.
    let (outbound, rx) = mpsc::channel(capacity.max(1));
    (ConnectionHandle { id, outbound }, rx)
}

/// A connection that has not started pumping yet.
pub struct Connection {
    id: ConnectionId,
    outbound: mpsc::Receiver<Payload>,
}

/// Join handles for a connection's two pumps.
pub struct ConnectionTasks {
    pub reader: JoinHandle<()>,
    pub writer: JoinHandle<()>,
}

impl Connection {
    pub fn new(id: ConnectionId, queue_capacity: usize) -> (Self, ConnectionHandle) {
        let (handle, outbound) = outbound_queue(id.clone(), queue_capacity);
        (Self { id, outbound }, handle)
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Starts the inbound and outbound pumps on their own tasks.
    pub fn spawn<W, R, E>(self, sink: W, stream: R, hub: HubHandle) -> ConnectionTasks
    where
        W: Sink<Message> + Unpin + Send + 'static,
        W::Error: fmt::Display + Send + 'static,
        R: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let Connection { id, outbound } = self;
        let writer = tokio::spawn(write_pump(id.clone(), sink, outbound));
        let reader = tokio::spawn(read_pump(id, stream, hub));
        ConnectionTasks { reader, writer }
    }
}

/// Forwards every inbound frame to the hub until the socket errors or closes,
/// then unregisters exactly once.
pub async fn read_pump<R, E>(id: ConnectionId, mut stream: R, hub: HubHandle)
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(data)) => match String::from_utf8(data) {
                Ok(text) => text,
                Err(_) => {
                    debug!(conn_id = %id, "skipping non-utf8 binary frame");
                    continue;
                }
            },
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(Message::Close(_)) => {
                debug!(conn_id = %id, "peer sent close frame");
                break;
            }
            Err(error) => {
                debug!(conn_id = %id, %error, "read failed, treating as disconnect");
                break;
            }
        };

        let payload = match Envelope::relayed(id.as_str(), &text).encode() {
            Ok(payload) => payload,
            Err(error) => {
                warn!(conn_id = %id, %error, "failed to encode relayed message");
                continue;
            }
        };

        if hub.relay(id.clone(), payload).await.is_err() {
            debug!(conn_id = %id, "hub stopped while relaying");
            return;
        }
    }

    if hub.unregister(id.clone()).await.is_err() {
        debug!(conn_id = %id, "hub stopped before unregister");
    }
}

/// Drains the outbound queue to the socket in order. Once the hub closes the
/// queue and it is empty, sends a close frame and closes the sink.
pub async fn write_pump<W>(
    id: ConnectionId,
    mut sink: W,
    mut outbound: mpsc::Receiver<Payload>,
) where
    W: Sink<Message> + Unpin,
    W::Error: fmt::Display,
{
    while let Some(payload) = outbound.recv().await {
        if let Err(error) = sink.send(Message::Text(payload.to_string())).await {
            warn!(conn_id = %id, %error, "failed to write to socket");
            return;
        }
    }

    debug!(conn_id = %id, "outbound queue closed, closing socket");
    if let Err(error) = sink.send(Message::Close(None)).await {
        debug!(conn_id = %id, %error, "failed to send close frame");
    }
    if let Err(error) = sink.close().await {
        debug!(conn_id = %id, %error, "failed to close socket");
    }
}
