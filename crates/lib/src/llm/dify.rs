//! Dify chat-messages API client (https://api.dify.ai/v1 by default).
//! Blocking response mode only; every query starts a fresh conversation.

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_DIFY_BASE_URL: &str = "https://api.dify.ai/v1";
pub const DEFAULT_DIFY_USER: &str = "abc-123";

const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the Dify chat app API.
#[derive(Clone)]
pub struct DifyClient {
    base_url: String,
    api_key: String,
    user: String,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum DifyError {
    #[error("dify request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("dify api error: {0}")]
    Api(String),
}

#[derive(Debug, Serialize)]
struct ChatMessageRequest<'a> {
    inputs: serde_json::Map<String, serde_json::Value>,
    query: &'a str,
    response_mode: &'static str,
    conversation_id: &'static str,
    user: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    answer: Option<String>,
}

impl DifyClient {
    /// `base_url` and `user` fall back to the public API and the default user id.
    pub fn new(api_key: String, base_url: Option<String>, user: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_DIFY_BASE_URL.to_string());
        let user = user.unwrap_or_else(|| DEFAULT_DIFY_USER.to_string());
        Self {
            base_url,
            api_key,
            user,
            client: reqwest::Client::builder()
                .timeout(QUERY_TIMEOUT)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    /// POST /chat-messages — send one query in blocking mode and return the answer text.
    /// An absent `answer` field on a 200 response is an empty answer, not an error.
    pub async fn send_query(&self, query: &str) -> Result<String, DifyError> {
        let url = format!("{}/chat-messages", self.base_url);
        let body = ChatMessageRequest {
            inputs: serde_json::Map::new(),
            query,
            response_mode: "blocking",
            conversation_id: "",
            user: &self.user,
        };
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(DifyError::Api(format!("{} {}", status, body)));
        }
        let data: ChatMessageResponse = res.json().await?;
        Ok(data.answer.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_matches_wire_format() {
        let body = ChatMessageRequest {
            inputs: serde_json::Map::new(),
            query: "こんにちは、テストメッセージです",
            response_mode: "blocking",
            conversation_id: "",
            user: "abc-123",
        };
        let v = serde_json::to_value(&body).expect("serialize request");
        assert_eq!(v["inputs"], serde_json::json!({}));
        assert_eq!(v["query"], "こんにちは、テストメッセージです");
        assert_eq!(v["response_mode"], "blocking");
        assert_eq!(v["conversation_id"], "");
        assert_eq!(v["user"], "abc-123");
    }

    #[test]
    fn answer_defaults_to_empty_when_absent() {
        let res: ChatMessageResponse =
            serde_json::from_str(r#"{"conversation_id":"c1"}"#).expect("parse");
        assert_eq!(res.answer.unwrap_or_default(), "");
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let c = DifyClient::new(
            "app-key".to_string(),
            Some("https://dify.example/v1/".to_string()),
            None,
        );
        assert_eq!(c.base_url, "https://dify.example/v1");
        assert_eq!(c.user, DEFAULT_DIFY_USER);
    }
}
