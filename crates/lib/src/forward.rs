//! Forwarding of validated deal payloads to the GAS web app.
//!
//! The forwarder never fails: every outcome, including a missing URL or a
//! network error, is folded into a human-readable status string that the
//! pipeline logs and relays to the sender.

use serde_json::{Map, Value};
use std::time::Duration;

const FORWARD_TIMEOUT: Duration = Duration::from_secs(10);

/// POSTs deal objects to the configured Google Apps Script web app.
#[derive(Clone)]
pub struct GasForwarder {
    webhook_url: Option<String>,
    client: reqwest::Client,
}

impl GasForwarder {
    /// `webhook_url` is the deployed /exec URL; `None` makes every forward a
    /// reported failure rather than a crash.
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            webhook_url,
            client: reqwest::Client::builder()
                .timeout(FORWARD_TIMEOUT)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.webhook_url.is_some()
    }

    /// True when a status string from [`post_payload`](Self::post_payload)
    /// reports a completed POST (any HTTP status) rather than a request failure.
    pub fn is_delivery_report(status: &str) -> bool {
        status.starts_with("GAS status=")
    }

    /// POST the payload as JSON and report the outcome as a status string.
    pub async fn post_payload(&self, payload: &Map<String, Value>) -> String {
        let Some(ref url) = self.webhook_url else {
            return "GAS request failed: webhook URL not configured".to_string();
        };
        let res = self
            .client
            .post(url)
            .header("Content-Type", "application/json; charset=utf-8")
            .json(payload)
            .send()
            .await;
        match res {
            Ok(res) => {
                let status = res.status().as_u16();
                let body = res.text().await.unwrap_or_default();
                format!("GAS status={}, body={}", status, body)
            }
            Err(e) => format!("GAS request failed: {}", e),
        }
    }
}
