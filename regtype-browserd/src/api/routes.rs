use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::sync::watch;
use shared::protocol::API_PREFIX;
use shared::types::RegTypeSnapshot;
use crate::discovery::coordinator::{DiscoveryCoordinator, DiscoveryState};
use crate::error::DiscoveryError;
use crate::mdns::browser::MdnsBrowseSource;
use crate::view::ViewState;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: DiscoveryCoordinator<MdnsBrowseSource>,
    pub view_rx: watch::Receiver<ViewState>,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub state: DiscoveryState,
    pub subscriptions: usize,
    pub registration_types: usize,
    pub listed: usize,
    pub last_error: Option<String>,
}

pub fn router(state: AppState) -> Router {
    let v1 = Router::new()
        .route("/regtypes", get(get_regtypes))
        .route("/regtypes/hash", get(get_hash))
        .route("/status", get(get_status))
        .route("/discovery/start", post(start_discovery))
        .route("/discovery/stop", post(stop_discovery));

    Router::new().nest(API_PREFIX, v1).with_state(state)
}

async fn get_regtypes(State(state): State<AppState>) -> Json<RegTypeSnapshot> {
    Json(state.view_rx.borrow().snapshot.clone())
}

async fn get_hash(State(state): State<AppState>) -> String {
    state.view_rx.borrow().hash.clone()
}

async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let (listed, last_error) = {
        let view = state.view_rx.borrow();
        (view.snapshot.entries.len(), view.last_error.clone())
    };

    Json(StatusResponse {
        state: state.coordinator.state().await,
        subscriptions: state.coordinator.subscription_count().await,
        registration_types: state.coordinator.record_count().await,
        listed,
        last_error,
    })
}

async fn start_discovery(State(state): State<AppState>) -> Result<StatusCode, (StatusCode, String)> {
    match state.coordinator.start().await {
        Ok(()) => Ok(StatusCode::ACCEPTED),
        Err(DiscoveryError::AlreadyStarted) => {
            Err((StatusCode::CONFLICT, DiscoveryError::AlreadyStarted.to_string()))
        }
        Err(e) => {
            tracing::error!("Failed to start discovery: {}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

async fn stop_discovery(State(state): State<AppState>) -> StatusCode {
    state.coordinator.stop().await;
    StatusCode::ACCEPTED
}
