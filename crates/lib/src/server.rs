//! HTTP front door: webhook verification and intake, manual send, health.

use crate::channels::{NotificationPayload, WhatsAppChannel};
use crate::config::{self, Config};
use crate::conversation::ConversationStore;
use crate::llm::CompletionClient;
use crate::relay::{self, RelayError};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared state for the relay server.
#[derive(Clone)]
pub struct ServerState {
    config: Arc<Config>,
    store: Arc<ConversationStore>,
    completion: CompletionClient,
    whatsapp: Arc<WhatsAppChannel>,
    /// Serializes relay cycles: one notification is handled to completion
    /// (load, external calls, save) before the next starts.
    cycle_lock: Arc<Mutex<()>>,
    verify_token: Option<String>,
}

/// Run the relay server; binds to config.server.bind:config.server.port.
/// Requires the WhatsApp token, number id, and completion API key to be
/// resolvable from config or environment. Blocks until shutdown.
pub async fn run_server(config: Config) -> Result<()> {
    let Some(api_token) = config::resolve_whatsapp_token(&config) else {
        anyhow::bail!("whatsapp api token not configured (set WHATSAPP_API_TOKEN or whatsapp.apiToken)");
    };
    let Some(number_id) = config::resolve_number_id(&config) else {
        anyhow::bail!("whatsapp number id not configured (set WHATSAPP_NUMBER_ID or whatsapp.numberId)");
    };
    let Some(api_key) = config::resolve_completion_key(&config) else {
        anyhow::bail!("completion api key not configured (set OPENAI_API_KEY or completion.apiKey)");
    };
    let verify_token = config::resolve_verify_token(&config);
    if verify_token.is_none() {
        log::warn!(
            "webhook verification secret not configured; GET /webhook will reject all handshakes"
        );
    }

    let store = Arc::new(ConversationStore::new(config::resolve_store_dir(&config)));
    let completion = CompletionClient::new(
        api_key,
        config.completion.base_url.clone(),
        config.completion.model.clone(),
    );
    let whatsapp = Arc::new(WhatsAppChannel::new(
        api_token,
        number_id,
        config.whatsapp.api_base.clone(),
    ));

    let bind_addr = format!("{}:{}", config.server.bind.trim(), config.server.port);
    let state = ServerState {
        config: Arc::new(config),
        store,
        completion,
        whatsapp,
        cycle_lock: Arc::new(Mutex::new(())),
        verify_token,
    };

    let app = Router::new()
        .route("/", get(health_http))
        .route("/webhook", get(verify_webhook).post(receive_webhook))
        .route("/send_message", post(send_message_http))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("relay listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("relay server exited")?;
    log::info!("relay stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received");
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<ServerState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.config.server.port,
    }))
}

#[derive(Debug, Deserialize)]
struct VerifyParams {
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

/// GET /webhook — subscription verification handshake: echoes hub.challenge
/// when hub.verify_token matches the configured secret.
async fn verify_webhook(
    State(state): State<ServerState>,
    Query(params): Query<VerifyParams>,
) -> Response {
    let authorized = match (state.verify_token.as_deref(), params.verify_token.as_deref()) {
        (Some(expected), Some(provided)) => provided == expected,
        _ => false,
    };
    if !authorized {
        return error_response(
            StatusCode::FORBIDDEN,
            "Authentication failed. Invalid token.",
        );
    }
    (StatusCode::OK, params.challenge.unwrap_or_default()).into_response()
}

/// POST /webhook — receives a notification JSON and runs one relay cycle.
async fn receive_webhook(State(state): State<ServerState>, body: Bytes) -> Response {
    let payload: NotificationPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            log::debug!("webhook payload did not parse: {}", e);
            return error_response(StatusCode::BAD_REQUEST, "could not parse notification payload");
        }
    };
    let _guard = state.cycle_lock.lock().await;
    let result = relay::process_notification(
        state.store.as_ref(),
        &state.completion,
        state.whatsapp.as_ref(),
        &payload,
    )
    .await;
    match result {
        Ok(_) => (StatusCode::OK, Json(json!({ "status": "success" }))).into_response(),
        Err(e) => relay_error_response(e),
    }
}

#[derive(Debug, Default, Deserialize)]
struct SendMessageRequest {
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    phone_number: Option<String>,
}

/// POST /send_message — manual outbound send, bypassing the relay.
async fn send_message_http(State(state): State<ServerState>, body: Bytes) -> Response {
    let req: SendMessageRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "Missing request body"),
    };
    let Some(text) = req.body else {
        return error_response(StatusCode::BAD_REQUEST, "Missing message");
    };
    let Some(phone_number) = req.phone_number else {
        return error_response(StatusCode::BAD_REQUEST, "Missing phone_number");
    };
    match state.whatsapp.send_message(&phone_number, &text).await {
        Ok(status) => {
            (StatusCode::OK, Json(json!({ "status": "success", "data": status }))).into_response()
        }
        Err(e) => {
            log::warn!("manual send failed: {}", e);
            error_response(StatusCode::BAD_GATEWAY, &e.to_string())
        }
    }
}

fn relay_error_response(e: RelayError) -> Response {
    let status = match &e {
        RelayError::MalformedNotification(_) => StatusCode::BAD_REQUEST,
        RelayError::Completion(_) | RelayError::Delivery(_) => StatusCode::BAD_GATEWAY,
        RelayError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        log::warn!("relay cycle failed: {}", e);
    } else {
        log::debug!("relay cycle rejected: {}", e);
    }
    error_response(status, &e.to_string())
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
