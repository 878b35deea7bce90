//! Webhook HTTP server: LINE webhook intake, daily digest trigger, health.

use crate::channels::LineClient;
use crate::config::{self, Config};
use crate::digest::{format_digest, Deal};
use crate::forward::GasForwarder;
use crate::llm::DifyClient;
use crate::pipeline::{self, PipelineContext};
use crate::signature::{verify_signature, SIGNATURE_HEADER};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

/// Shared state for the relay server.
#[derive(Clone)]
pub struct ServerState {
    pub ctx: Arc<PipelineContext>,
    /// Channel secret for webhook signature checks. `None` skips verification
    /// (local development only).
    pub channel_secret: Option<String>,
    pub digest_recipient: Option<String>,
    pub port: u16,
}

/// Build the server state from config: construct every client once and hand
/// it to the pipeline instead of relying on process-wide singletons.
pub fn build_state(config: &Config) -> ServerState {
    let channel_secret = config::resolve_channel_secret(config);
    let access_token = config::resolve_channel_access_token(config);
    let dify = config::resolve_dify_api_key(config).map(|key| {
        DifyClient::new(
            key,
            Some(config::resolve_dify_base_url(config)),
            Some(config::resolve_dify_user(config)),
        )
    });
    if dify.is_none() {
        log::warn!("dify api key not configured; inbound messages will not be answered");
    }
    let forwarder = GasForwarder::new(config::resolve_gas_webhook_url(config));
    if !forwarder.is_configured() {
        log::warn!("gas webhook url not configured; deal forwarding will report failures");
    }
    let notifier = Arc::new(LineClient::new(access_token));
    let ctx = Arc::new(PipelineContext {
        dify,
        forwarder,
        notifier,
        required_fields: crate::extract::field_set_for_version(config.fields.version),
    });
    ServerState {
        ctx,
        channel_secret,
        digest_recipient: config::resolve_digest_recipient(config),
        port: config.server.port,
    }
}

/// Run the relay server; binds to config.server.bind:config.server.port.
/// Blocks until shutdown (Ctrl+C or SIGTERM).
pub async fn run_server(config: Config) -> Result<()> {
    let bind = config.server.bind.trim().to_string();
    let state = build_state(&config);
    if !config::is_loopback_bind(&bind) && state.channel_secret.is_none() {
        log::warn!(
            "binding to {} without a channel secret; webhook signatures will not be verified",
            bind
        );
    }

    let app = Router::new()
        .route("/", get(health_http))
        .route("/linebot", post(linebot_webhook))
        .route("/daily_notify", post(daily_notify))
        .with_state(state);

    let bind_addr = format!("{}:{}", bind, config.server.port);
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
    log::info!("shutdown signal received, draining connections");
}

/// POST /linebot — receives one LINE webhook envelope; verifies the signature,
/// schedules the pipeline, and acknowledges immediately. The acknowledgment is
/// unconditional: pipeline failures only ever show up in the logs.
async fn linebot_webhook(
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    if let Some(ref secret) = state.channel_secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !verify_signature(secret, signature, &body) {
            log::warn!("webhook rejected: signature verification failed");
            return (StatusCode::FORBIDDEN, "forbidden");
        }
    } else {
        log::debug!("webhook accepted without signature check (no channel secret)");
    }

    let raw_body = String::from_utf8_lossy(&body).into_owned();
    let ctx = state.ctx.clone();
    tokio::spawn(async move {
        pipeline::process_event(ctx, raw_body).await;
    });
    (StatusCode::OK, "ok")
}

#[derive(Debug, Deserialize)]
struct DailyNotifyRequest {
    #[serde(default)]
    deals: Vec<Deal>,
}

/// POST /daily_notify — push a formatted summary of the day's deals to the
/// configured recipient. Skips silently on an empty list.
async fn daily_notify(
    State(state): State<ServerState>,
    Json(req): Json<DailyNotifyRequest>,
) -> Json<serde_json::Value> {
    let Some(text) = format_digest(&req.deals) else {
        return Json(json!({ "status": "skip", "reason": "no deals" }));
    };
    let Some(ref recipient) = state.digest_recipient else {
        log::warn!("daily digest requested but no recipient configured");
        return Json(json!({ "status": "error", "reason": "digest recipient not configured" }));
    };
    match state.ctx.notifier.push(recipient, &text).await {
        Ok(()) => Json(json!({ "status": "ok", "count": req.deals.len() })),
        Err(e) => {
            log::warn!("daily digest push failed: {}", e);
            Json(json!({ "status": "error", "reason": e }))
        }
    }
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<ServerState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.port,
    }))
}
