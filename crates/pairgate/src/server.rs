//! HTTP surface: JSON API over the session controller plus the static page.

use std::net::SocketAddr;
use std::path::Path;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use pairgate_core::SessionController;
use serde_json::{Value, json};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::api::{ApiReply, GenerateCodeRequest, SendMessageRequest, StatusResponse};
use crate::error::CliError;

#[derive(Clone)]
pub struct AppState {
    pub controller: SessionController,
}

pub fn router(state: AppState, public_dir: &Path) -> Router {
    let api = Router::new()
        .route("/generate-code", post(generate_code))
        .route("/status", get(status))
        .route("/clear-session", post(clear_session))
        .route("/send-message", post(send_message))
        .route("/reconnect", post(reconnect));

    Router::new()
        .nest("/api", api)
        .route("/health", get(health))
        .fallback_service(ServeDir::new(public_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl-C, then shut the controller down.
pub async fn serve(addr: SocketAddr, public_dir: &Path, controller: SessionController) -> Result<(), CliError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| CliError::Bind {
            addr: addr.to_string(),
            source,
        })?;
    info!(%addr, public_dir = %public_dir.display(), "listening");

    let app = router(
        AppState {
            controller: controller.clone(),
        },
        public_dir,
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    controller.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

// ── Handlers ─────────────────────────────────────────────────────────

async fn generate_code(
    State(state): State<AppState>,
    Json(request): Json<GenerateCodeRequest>,
) -> Json<ApiReply> {
    let Some(number) = request.phone_number.filter(|n| !n.trim().is_empty()) else {
        return Json(ApiReply::failure("Phone number is required"));
    };

    // Run detached so a client hanging up mid-sequence cannot abort it halfway.
    let controller = state.controller.clone();
    let task = tokio::spawn(async move { controller.request_pairing(&number).await });
    match task.await {
        Ok(Ok(code)) => Json(ApiReply::from_code(&code)),
        Ok(Err(e)) => Json(ApiReply::from_error(&e)),
        Err(e) => {
            error!(error = %e, "pairing task panicked");
            Json(ApiReply::failure("Internal error while generating the code"))
        }
    }
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse::from(&state.controller.status_snapshot()))
}

async fn clear_session(State(state): State<AppState>) -> Json<ApiReply> {
    match state.controller.clear_session().await {
        Ok(()) => Json(ApiReply::with_message(
            "Session cleared. You can request a new code.",
        )),
        Err(e) => Json(ApiReply::from_error(&e)),
    }
}

async fn send_message(
    State(state): State<AppState>,
    Json(request): Json<SendMessageRequest>,
) -> Json<ApiReply> {
    match state
        .controller
        .send_message(&request.to, &request.message)
        .await
    {
        Ok(()) => Json(ApiReply::ok()),
        Err(e) => Json(ApiReply::from_error(&e)),
    }
}

async fn reconnect(State(state): State<AppState>) -> Json<ApiReply> {
    match state.controller.reconnect_now().await {
        Ok(()) => Json(ApiReply::with_message("Reconnecting")),
        Err(e) => Json(ApiReply::from_error(&e)),
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
