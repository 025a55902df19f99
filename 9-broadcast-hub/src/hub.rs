//! The hub: one task that owns the set of live connections.
//!
//! Every register, unregister and broadcast arrives as an event on a single
//! queue and is handled to completion before the next one is taken, so the
//! live set needs no lock and is never observed half-updated.
//!
//! Delivery never waits on a recipient. A connection whose outbound queue is
//! full (or whose write pump is gone) is evicted on the spot rather than
//! slowing down everybody else.

use std::collections::HashMap;

use tokio::{
    sync::{
        mpsc::{self, error::TrySendError},
        oneshot,
    },
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    config::HubConfig,
    connection::{ConnectionHandle, ConnectionId},
    envelope::{Envelope, JOINED_NOTICE, LEFT_NOTICE, Payload},
    error::HubError,
};

/// Requests processed by the control loop, one at a time, in arrival order.
#[derive(Debug)]
enum HubEvent {
    Register(ConnectionHandle),
    Unregister(ConnectionId),
    Broadcast {
        payload: Payload,
        origin: Option<ConnectionId>,
    },
    Members {
        respond_to: oneshot::Sender<Vec<ConnectionId>>,
    },
    Shutdown,
}

/// Cloneable handle for submitting events to a running hub.
///
/// All methods only hand the event over; the effect is applied by the
/// control loop in the order events were submitted.
#[derive(Debug, Clone)]
pub struct HubHandle {
    events: mpsc::Sender<HubEvent>,
}

impl HubHandle {
    /// Adds a connection to the live set and announces it to everyone else.
    pub async fn register(&self, connection: ConnectionHandle) -> Result<(), HubError> {
        self.submit(HubEvent::Register(connection)).await
    }

    /// Removes a connection, closes its queue and announces the departure.
    /// Unregistering an unknown or already removed connection does nothing.
    pub async fn unregister(&self, id: ConnectionId) -> Result<(), HubError> {
        self.submit(HubEvent::Unregister(id)).await
    }

    /// Delivers `payload` to every live connection.
    pub async fn broadcast(&self, payload: Payload) -> Result<(), HubError> {
        self.submit(HubEvent::Broadcast {
            payload,
            origin: None,
        })
        .await
    }

    /// Delivers a message read from `origin` to every other live connection.
    pub async fn relay(&self, origin: ConnectionId, payload: Payload) -> Result<(), HubError> {
        self.submit(HubEvent::Broadcast {
            payload,
            origin: Some(origin),
        })
        .await
    }

    /// Snapshot of the live set, taken after every previously submitted event.
    pub async fn members(&self) -> Result<Vec<ConnectionId>, HubError> {
        let (respond_to, response) = oneshot::channel();
        self.submit(HubEvent::Members { respond_to }).await?;
        response.await.map_err(|_| HubError::Closed)
    }

    /// Closes every outbound queue and stops the control loop.
    pub async fn shutdown(&self) -> Result<(), HubError> {
        self.submit(HubEvent::Shutdown).await
    }

    async fn submit(&self, event: HubEvent) -> Result<(), HubError> {
        self.events.send(event).await.map_err(|_| HubError::Closed)
    }
}

pub struct Hub {
    config: HubConfig,
    live: HashMap<ConnectionId, ConnectionHandle>,
    events: mpsc::Receiver<HubEvent>,
}

impl Hub {
    /// Starts the control loop on its own task.
    pub fn spawn(config: HubConfig) -> (HubHandle, JoinHandle<()>) {
        let (events_tx, events) = mpsc::channel(config.event_capacity.max(1));
        let hub = Hub {
            config,
            live: HashMap::new(),
            events,
        };
        let task = tokio::spawn(hub.run());
        (HubHandle { events: events_tx }, task)
    }

    async fn run(mut self) {
        info!("hub started");
        while let Some(event) = self.events.recv().await {
            match event {
                HubEvent::Register(connection) => self.register(connection),
                HubEvent::Unregister(id) => self.unregister(&id),
                HubEvent::Broadcast { payload, origin } => {
                    let exclude = origin.as_ref().filter(|_| !self.config.echo_to_sender);
                    self.fan_out(&payload, exclude);
                }
                HubEvent::Members { respond_to } => {
                    let mut members: Vec<_> = self.live.keys().cloned().collect();
                    members.sort();
                    let _ = respond_to.send(members);
                }
                HubEvent::Shutdown => break,
            }
        }

        // Dropping the handles closes every queue, so each write pump sends
        // its close frame and exits.
        info!(live = self.live.len(), "hub stopping");
        self.live.clear();
    }

    fn register(&mut self, connection: ConnectionHandle) {
        let id = connection.id.clone();
        if self.live.contains_key(&id) {
            warn!(conn_id = %id, "ignoring duplicate registration");
            return;
        }

        self.live.insert(id.clone(), connection);
        info!(conn_id = %id, live = self.live.len(), "connection registered");

        if let Some(notice) = encode_notice(JOINED_NOTICE) {
            self.fan_out(&notice, Some(&id));
        }
    }

    fn unregister(&mut self, id: &ConnectionId) {
        // Membership check and removal are one step; a second unregister for
        // the same connection finds nothing and its queue is never touched again.
        let Some(connection) = self.live.remove(id) else {
            debug!(conn_id = %id, "unregister for connection not in live set");
            return;
        };
        drop(connection);
        info!(conn_id = %id, live = self.live.len(), "connection unregistered");

        if let Some(notice) = encode_notice(LEFT_NOTICE) {
            self.fan_out(&notice, None);
        }
    }

    /// Offers `payload` to every live connection except `exclude` without
    /// waiting. Connections that cannot take it are removed, which closes
    /// their queues, and are returned so the caller can announce them.
    fn deliver(
        &mut self,
        payload: &Payload,
        exclude: Option<&ConnectionId>,
    ) -> Vec<ConnectionId> {
        let mut evicted = Vec::new();
        self.live.retain(|id, connection| {
            if Some(id) == exclude {
                return true;
            }
            match connection.outbound.try_send(Payload::clone(payload)) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!(conn_id = %id, "outbound queue full, evicting connection");
                    evicted.push(id.clone());
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(conn_id = %id, "write pump gone, evicting connection");
                    evicted.push(id.clone());
                    false
                }
            }
        });
        evicted
    }

    /// Delivers `payload`, then announces a departure for every connection
    /// the delivery evicted.
    ///
    /// An evicted connection leaves the same way as a clean disconnect. Those
    /// notices can evict further connections; they go on the work list rather
    /// than being announced from inside the delivery pass.
    fn fan_out(&mut self, payload: &Payload, exclude: Option<&ConnectionId>) {
        let mut evicted = self.deliver(payload, exclude);
        if evicted.is_empty() {
            return;
        }
        let Some(notice) = encode_notice(LEFT_NOTICE) else {
            return;
        };
        while let Some(id) = evicted.pop() {
            debug!(conn_id = %id, live = self.live.len(), "announcing evicted connection");
            evicted.extend(self.deliver(&notice, None));
        }
    }
}

fn encode_notice(text: &str) -> Option<Payload> {
    match Envelope::notice(text).encode() {
        Ok(payload) => Some(payload),
        Err(error) => {
            warn!(%error, notice = text, "failed to encode system notice");
            None
        }
    }
}
