use std::{future::Future, net::SocketAddr};

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::{
        State,
        ws::{WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use futures::StreamExt;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::{
    config::{HubConfig, WS_PATH},
    connection::{Connection, ConnectionId},
    hub::{Hub, HubHandle},
};

#[derive(Clone)]
struct AppState {
    hub: HubHandle,
    queue_capacity: usize,
}

pub struct Server {
    listener: TcpListener,
    config: HubConfig,
}

impl Server {
    pub fn new(listener: TcpListener, config: HubConfig) -> Self {
        Self { listener, config }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves WebSocket sessions until `shutdown` resolves, then stops the hub
    /// so every connected client is sent a close frame.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Server { listener, config } = self;
        let queue_capacity = config.queue_capacity;
        let (hub, hub_task) = Hub::spawn(config);

        let app = router(hub.clone(), queue_capacity);
        let stopping = hub.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.await;
                info!("server shutting down");
                if stopping.shutdown().await.is_err() {
                    debug!("hub already stopped");
                }
            })
            .await
            .context("server error")?;

        drop(hub);
        hub_task.await.context("hub task panicked")?;
        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

/// Builds the HTTP surface: one WebSocket route backed by `hub`.
pub fn router(hub: HubHandle, queue_capacity: usize) -> Router {
    Router::new()
        .route(WS_PATH, get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState {
            hub,
            queue_capacity,
        })
}

// Origins are not checked: any page may open a socket here.
async fn ws_handler(
    State(state): State<AppState>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    match upgrade {
        Ok(upgrade) => upgrade
            .on_failed_upgrade(|error| warn!(%error, "websocket upgrade failed"))
            .on_upgrade(move |socket| accept_session(socket, state)),
        Err(rejection) => {
            debug!(%rejection, "rejecting non-websocket request");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

async fn accept_session(socket: WebSocket, state: AppState) {
    let id = ConnectionId::mint();
    let (connection, handle) = Connection::new(id.clone(), state.queue_capacity);

    if state.hub.register(handle).await.is_err() {
        warn!(conn_id = %id, "hub stopped, dropping session");
        return;
    }

    let (sink, stream) = socket.split();
    connection.spawn(sink, stream, state.hub);
    debug!(conn_id = %id, "session started");
}
