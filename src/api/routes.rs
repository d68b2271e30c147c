use crate::api::api_error::APIError;
use crate::api::model::{CommandRequest, CommandResult};
use crate::api::server::AppState;
use crate::controller::Controller;
use crate::error::Error;
use crate::notify::Event;
use crate::transcript::Transcript;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::WithRejection;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub(super) fn new(state: AppState) -> Router {
    Router::new()
        .route("/healthcheck", get(health_check))
        .route("/command", post(command))
        .route("/ws", get(observe))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(state.config.rpc_timeout))
        .with_state(state)
}

#[allow(clippy::unused_async)]
async fn health_check() -> impl IntoResponse {
    Json(json!({"ok":"healthy"}))
}

async fn command(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<CommandRequest>, APIError>,
) -> Result<Json<CommandResult>, APIError> {
    if let Some(name) = payload.args.first().filter(|name| *name == "daemon") {
        return Err(Error::NoRemoteCall(name.clone()).into());
    }

    let mut output = Transcript::new();
    match state.controller.execute(&payload.args, &mut output).await {
        Ok(()) => Ok(Json(CommandResult { output })),
        Err(err) => {
            tracing::debug!(args = ?payload.args, %err, "remote command failed");
            Err(APIError::with_output(err, output))
        }
    }
}

#[allow(clippy::unused_async)]
async fn observe(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> impl IntoResponse {
    upgrade.on_upgrade(move |socket| forward_events(socket, state.controller))
}

async fn send(socket: &mut WebSocket, event: &Event) -> Result<(), axum::Error> {
    match serde_json::to_string(event) {
        Ok(text) => socket.send(Message::Text(text)).await,
        Err(err) => {
            tracing::warn!(%err, "dropping unserializable event");
            Ok(())
        }
    }
}

async fn forward_events(mut socket: WebSocket, controller: Arc<Controller>) {
    let (current, mut events) = controller.subscribe().await;
    tracing::debug!(groups = current.len(), "observer connected");
    for event in &current {
        if send(&mut socket, event).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if send(&mut socket, &event).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::debug!(missed, "observer lagging, events dropped");
                }
                Err(RecvError::Closed) => break,
            },
            msg = socket.recv() => match msg {
                None | Some(Err(_) | Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
            },
        }
    }
    tracing::debug!("observer disconnected");
}
