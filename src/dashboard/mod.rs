use std::net::SocketAddr;

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};

use crate::monitor::SchedulerSnapshot;

/// Serves the latest snapshot published through a
/// [`WatchMonitor`](crate::monitor::WatchMonitor).
#[derive(Clone)]
pub struct DashboardState {
    pub snapshots: watch::Receiver<SchedulerSnapshot>,
}

pub fn router(state: DashboardState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/status", get(status_handler))
        .route("/api/queues", get(queues_handler))
        .route("/api/workers", get(workers_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn run_dashboard(addr: SocketAddr, state: DashboardState) {
    tracing::info!(addr = %addr, "Starting dashboard server");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind dashboard server");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, router(state)).await {
        tracing::error!(error = %e, "Dashboard server failed");
    }
}

async fn status_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    let snapshot = state.snapshots.borrow().clone();
    Json(snapshot)
}

async fn queues_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    let queues = state.snapshots.borrow().queues.clone();
    Json(queues)
}

async fn workers_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    let workers = state.snapshots.borrow().workers.clone();
    Json(workers)
}
