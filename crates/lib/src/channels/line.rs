//! LINE Messaging API client: push and reply via the bot REST endpoints.

use async_trait::async_trait;
use serde_json::json;

const LINE_API_BASE: &str = "https://api.line.me/v2/bot";

/// Sends a status/result text to a user, independent of any inbound event.
/// Seam for the pipeline so tests can observe notifications without LINE.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn push(&self, user_id: &str, text: &str) -> Result<(), String>;
}

/// LINE bot client for push and reply messages.
#[derive(Clone)]
pub struct LineClient {
    token: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl LineClient {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token,
            base_url: line_api_base(),
            client: reqwest::Client::new(),
        }
    }

    fn token(&self) -> Result<&str, String> {
        self.token
            .as_deref()
            .ok_or_else(|| "line channel access token not configured".to_string())
    }

    /// Send a push message to a user (not tied to any inbound event).
    pub async fn push_message(&self, to: &str, text: &str) -> Result<(), String> {
        let token = self.token()?;
        let url = format!("{}/message/push", self.base_url);
        let body = push_body(to, text);
        self.send(&url, token, &body, "push").await
    }

    /// Send one direct reply using the single-use reply token from an event.
    pub async fn reply_message(&self, reply_token: &str, text: &str) -> Result<(), String> {
        let token = self.token()?;
        let url = format!("{}/message/reply", self.base_url);
        let body = reply_body(reply_token, text);
        self.send(&url, token, &body, "reply").await
    }

    async fn send(
        &self,
        url: &str,
        token: &str,
        body: &serde_json::Value,
        what: &str,
    ) -> Result<(), String> {
        let res = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("{} failed: {} {}", what, status, body));
        }
        Ok(())
    }
}

fn push_body(to: &str, text: &str) -> serde_json::Value {
    json!({
        "to": to,
        "messages": [{ "type": "text", "text": text }]
    })
}

fn reply_body(reply_token: &str, text: &str) -> serde_json::Value {
    json!({
        "replyToken": reply_token,
        "messages": [{ "type": "text", "text": text }]
    })
}

#[async_trait]
impl Notifier for LineClient {
    async fn push(&self, user_id: &str, text: &str) -> Result<(), String> {
        self.push_message(user_id, text).await
    }
}

/// Resolve the LINE bot API base URL (for tests or custom endpoints).
fn line_api_base() -> String {
    std::env::var("LINE_API_BASE").unwrap_or_else(|_| LINE_API_BASE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_body_wraps_text_in_message_list() {
        let body = push_body("U123", "hello");
        assert_eq!(body["to"], "U123");
        assert_eq!(body["messages"][0]["type"], "text");
        assert_eq!(body["messages"][0]["text"], "hello");
    }

    #[test]
    fn reply_body_carries_the_reply_token() {
        let body = reply_body("rtok", "hi");
        assert_eq!(body["replyToken"], "rtok");
        assert_eq!(body["messages"][0]["text"], "hi");
    }

    #[tokio::test]
    async fn missing_token_is_an_error_not_a_panic() {
        let client = LineClient::new(None);
        let err = client.push_message("U123", "hello").await.unwrap_err();
        assert!(err.contains("not configured"));
    }
}
