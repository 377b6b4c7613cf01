//! HTTP server setup and routing
//!
//! Control and observer endpoints for a running simulation.

use aura_client::ClientHandle;
use aura_common::events::SyncEvent;
use aura_common::PeerId;
use aura_host::HostHandle;
use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::loopback::LoopbackRadio;
use crate::sim::{SimClient, Simulation};

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub host: HostHandle,
    pub host_address: PeerId,
    pub clients: Arc<Vec<SimClient>>,
    pub radio: LoopbackRadio,
}

impl AppContext {
    pub fn from_simulation(sim: &Simulation) -> Self {
        Self {
            host: sim.host.clone(),
            host_address: sim.host_address(),
            clients: Arc::new(sim.clients.clone()),
            radio: sim.radio.clone(),
        }
    }

    pub fn client(&self, index: usize) -> Option<&SimClient> {
        self.clients.get(index)
    }

    pub fn client_handle(&self, index: usize) -> Option<&ClientHandle> {
        self.clients.get(index).map(|c| &c.handle)
    }

    /// Fresh subscriptions to every actor, labelled `host` / `client-N`
    pub fn event_sources(&self) -> Vec<(String, broadcast::Receiver<SyncEvent>)> {
        let mut sources = vec![("host".to_string(), self.host.subscribe_events())];
        for (index, client) in self.clients.iter().enumerate() {
            sources.push((format!("client-{}", index), client.handle.subscribe_events()));
        }
        sources
    }
}

/// Build the router with every route attached
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        // Health endpoint
        .route("/health", get(super::handlers::health))
        // Host control
        .route("/host/status", get(super::handlers::host_status))
        .route("/host/play", post(super::handlers::host_play))
        .route("/host/pause", post(super::handlers::host_pause))
        .route("/host/seek", post(super::handlers::host_seek))
        .route("/host/track", post(super::handlers::host_track))
        // Clients
        .route("/clients", get(super::handlers::list_clients))
        .route("/clients/:index/connect", post(super::handlers::client_connect))
        .route("/clients/:index/disconnect", post(super::handlers::client_disconnect))
        // Radio fault injection
        .route("/radio/:index/drop", post(super::handlers::radio_drop))
        .route("/radio/:index/bond", post(super::handlers::radio_bond))
        // SSE event stream
        .route("/events", get(super::sse::event_stream))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        // Enable CORS for local access
        .layer(CorsLayer::permissive())
}

/// Serve the API until `shutdown` resolves
pub async fn run(
    ctx: AppContext,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let app = create_router(ctx);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
