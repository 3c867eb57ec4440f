//! HTTP interface: the occupancy query, the chat-style command endpoint and
//! the per-subscriber notification stream.
//!
//! All handlers only read. The capture task is the sole writer, so an answer
//! here is always the last completed cycle.

use crate::commands::CommandHandler;
use crate::core_modules::census::CensusSnapshot;
use crate::core_modules::occupancy::OccupancyReader;
use crate::notify::{self, NotificationBus};
use axum::{
    Json, Router,
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub occupancy: OccupancyReader,
    pub commands: CommandHandler,
    pub bus: NotificationBus,
}

/// GET /state body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateResponse {
    pub inuse: bool,
    pub balls: CensusSnapshot,
    #[serde(rename = "lastChanged")]
    pub last_changed: bool,
}

/// POST /command body
#[derive(Debug, Clone, Deserialize)]
pub struct CommandRequest {
    pub user: String,
    #[serde(default)]
    pub name: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandReply {
    pub reply: String,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/state", get(get_state))
        .route("/command", post(post_command))
        .route("/notifications/:id", get(notifications))
        .route("/healthz", get(healthz))
        .with_state(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
}

/// GET /state - Current occupancy and the latest census
async fn get_state(State(state): State<AppState>) -> Json<StateResponse> {
    let occupancy = state.occupancy.occupancy();
    Json(StateResponse {
        inuse: occupancy.in_use,
        balls: occupancy.latest.snapshot,
        last_changed: occupancy.latest.changed,
    })
}

/// POST /command - Run one chat command
async fn post_command(State(state): State<AppState>, Json(request): Json<CommandRequest>) -> Json<CommandReply> {
    let reply = state.commands.handle(&request.user, &request.name, &request.text);
    Json(CommandReply { reply })
}

/// GET /notifications/:id - Server-sent transition messages for one subscriber
async fn notifications(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::info!(subscriber = %id, "Notification stream opened");
    let events = notify::deliveries_for(state.bus.subscribe(), id)
        .map(|message| Ok(Event::default().event("transition").data(message)));
    Sse::new(events).keep_alive(KeepAlive::default())
}

async fn healthz() -> &'static str {
    "ok"
}

/// Bind `addr` and serve until the listener fails.
pub async fn serve(addr: &str, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);
    axum::serve(listener, create_router(state)).await?;
    Ok(())
}
