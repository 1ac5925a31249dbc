use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use prometheus::{IntCounterVec, Registry};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;

use crate::{
    alert,
    dispatcher::{BatchOutcome, Dispatcher},
    settings::Settings,
    telemetry_endpoint,
};

#[derive(Debug, Deserialize, Clone)]
pub struct AlertReceiverSettings {
    pub bind_address: IpAddr,
    pub port: u16,
}

impl AlertReceiverSettings {
    pub fn to_socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

/// static readiness information reported by `GET /health`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub telegram_enabled: bool,
    pub bot_token_configured: bool,
    /// number of configured chats
    pub chat_ids: usize,
}

impl HealthReport {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            telegram_enabled: settings.telegram.enabled,
            bot_token_configured: settings.telegram.bot_token().is_some(),
            chat_ids: settings.telegram.chat_ids.len(),
        }
    }
}

#[derive(Debug, Serialize)]
struct WebhookResponse {
    status: &'static str,
    #[serde(flatten)]
    outcome: BatchOutcome,
}

pub struct ReceiverState {
    dispatcher: Dispatcher,
    health: HealthReport,
    registry: Registry,
    requests: IntCounterVec,
}

impl ReceiverState {
    /// # Arguments
    ///
    /// * `dispatcher` - processes every accepted batch
    ///
    /// * `health` - reported as is by `GET /health`
    ///
    /// * `registry` - exposed by `GET /metrics`, the request counter is registered in it
    pub fn new(dispatcher: Dispatcher, health: HealthReport, registry: Registry) -> Result<Self> {
        use prometheus::opts;

        let requests = IntCounterVec::new(
            opts!("requests_total", "total number of webhook requests by result")
                .namespace("alertbridge")
                .subsystem("alertmanager_webhook"),
            &["result"],
        )?;
        registry
            .register(Box::new(requests.clone()))
            .context("failed to register webhook metrics")?;

        Ok(Self {
            dispatcher,
            health,
            registry,
            requests,
        })
    }
}

async fn webhook_receiver(
    State(state): State<Arc<ReceiverState>>,
    batch: Result<Json<alert::Data>, JsonRejection>,
) -> Response {
    let batch = match batch {
        Ok(Json(batch)) => batch,
        Err(err) => {
            tracing::warn!("rejected webhook request: {}", err.body_text());
            state.requests.with_label_values(&["rejected"]).inc();

            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": err.body_text() })),
            )
                .into_response();
        }
    };

    state.requests.with_label_values(&["accepted"]).inc();

    let outcome = state.dispatcher.process_batch(&batch).await;

    Json(WebhookResponse {
        status: "processed",
        outcome,
    })
    .into_response()
}

async fn health(State(state): State<Arc<ReceiverState>>) -> Json<serde_json::Value> {
    let HealthReport {
        telegram_enabled,
        bot_token_configured,
        chat_ids,
    } = state.health;

    Json(json!({
        "status": "ok",
        "telegram_enabled": telegram_enabled,
        "bot_token_configured": bot_token_configured,
        "chat_ids": chat_ids,
    }))
}

async fn metrics(State(state): State<Arc<ReceiverState>>) -> Response {
    telemetry_endpoint::metrics_response(&state.registry)
}

pub fn router(state: Arc<ReceiverState>) -> Router {
    Router::new()
        .route("/webhook", post(webhook_receiver))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}

pub async fn run_receiver(settings: &AlertReceiverSettings, state: Arc<ReceiverState>) -> Result<()> {
    let addr = settings.to_socket_addr();

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind alertmanager webhook receiver to {addr}"))?;

    tracing::info!("listening for alertmanager webhooks on {}", addr);

    axum::serve(listener, router(state))
        .await
        .context("alertmanager webhook receiver crashed")?;

    Ok(())
}
