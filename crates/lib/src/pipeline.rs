//! Per-event relay pipeline: extract → query Dify → extract deal fields →
//! forward to GAS → notify the sender.
//!
//! Runs as a detached task after the webhook has already been acknowledged.
//! No stage is allowed to propagate: each one logs its outcome under the
//! event's request id and either continues or stops the pipeline.

use crate::channels::Notifier;
use crate::event::extract_event;
use crate::extract::{extract_payload, SkipReason};
use crate::forward::GasForwarder;
use crate::llm::DifyClient;
use std::sync::Arc;

/// Push text when the extracted object lacks required fields.
const MISSING_FIELDS_NOTICE: &str = "抽出結果に不足項目があります";
/// Push prefix after a completed GAS forward (wording kept from the sheet workflow).
const FORWARD_OK_PREFIX: &str = "GAS に書き込みました";
/// Push prefix when the GAS forward itself failed.
const FORWARD_ERR_PREFIX: &str = "GAS 連携エラー";

/// Everything one pipeline run needs; built once at startup and shared.
pub struct PipelineContext {
    /// AI client; `None` when no API key is configured (pipeline stops before querying).
    pub dify: Option<DifyClient>,
    pub forwarder: GasForwarder,
    pub notifier: Arc<dyn Notifier>,
    /// Active required-field set (one of the versioned constants).
    pub required_fields: &'static [&'static str],
}

/// Process one inbound webhook body end to end. Never returns an error;
/// the HTTP response was already sent when this runs.
pub async fn process_event(ctx: Arc<PipelineContext>, raw_body: String) {
    let request_id = uuid::Uuid::new_v4().to_string();
    let event = extract_event(&raw_body);
    let sender = event.sender_id.as_deref();

    let Some(ref text) = event.message_text else {
        log::info!("relay [{}] extract: no text message, stopping", request_id);
        return;
    };
    log::info!(
        "relay [{}] extract: text message ({} chars), sender={}",
        request_id,
        text.chars().count(),
        sender.unwrap_or("unknown")
    );

    let Some(ref dify) = ctx.dify else {
        log::warn!("relay [{}] query: dify api key not configured, stopping", request_id);
        return;
    };
    let answer = match dify.send_query(text).await {
        Ok(answer) => answer,
        Err(e) => {
            log::warn!("relay [{}] query: {}", request_id, e);
            return;
        }
    };
    log::info!("relay [{}] query: answer ({} chars)", request_id, answer.chars().count());

    process_answer(&ctx, &request_id, sender, &answer).await;
}

/// Field-extraction and forwarding half of the pipeline, split out so it can
/// be driven directly with a canned answer.
pub async fn process_answer(
    ctx: &PipelineContext,
    request_id: &str,
    sender: Option<&str>,
    answer: &str,
) {
    let payload = match extract_payload(answer, ctx.required_fields) {
        Ok(payload) => payload,
        Err(reason) => {
            log::info!("relay [{}] fields: skipped ({})", request_id, reason);
            if let SkipReason::MissingFields(ref missing) = reason {
                let text = format!("{}: {}", MISSING_FIELDS_NOTICE, missing.join(", "));
                notify(ctx, request_id, sender, &text).await;
            }
            return;
        }
    };
    log::info!("relay [{}] fields: all {} required fields present", request_id, ctx.required_fields.len());

    let status = ctx.forwarder.post_payload(&payload).await;
    log::info!("relay [{}] forward: {}", request_id, status);

    let text = if GasForwarder::is_delivery_report(&status) {
        format!("{}:\n{}", FORWARD_OK_PREFIX, status)
    } else {
        format!("{}: {}", FORWARD_ERR_PREFIX, status)
    };
    notify(ctx, request_id, sender, &text).await;
}

/// Push `text` to the sender. No-op (logged) when the sender is unknown;
/// push failures are logged and never affect the pipeline outcome.
async fn notify(ctx: &PipelineContext, request_id: &str, sender: Option<&str>, text: &str) {
    let Some(user_id) = sender else {
        log::debug!("relay [{}] notify: no sender id, skipping push", request_id);
        return;
    };
    if let Err(e) = ctx.notifier.push(user_id, text).await {
        log::warn!("relay [{}] notify: {}", request_id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::DEAL_FIELDS_V1;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    /// Records pushes instead of calling LINE.
    struct RecordingNotifier {
        pushes: Mutex<Vec<(String, String)>>,
    }

    impl RecordingNotifier {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                pushes: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn push(&self, user_id: &str, text: &str) -> Result<(), String> {
            self.pushes
                .lock()
                .await
                .push((user_id.to_string(), text.to_string()));
            Ok(())
        }
    }

    fn test_ctx(notifier: Arc<RecordingNotifier>) -> PipelineContext {
        PipelineContext {
            dify: None,
            forwarder: GasForwarder::new(None),
            notifier,
            required_fields: DEAL_FIELDS_V1,
        }
    }

    const FULL_DEAL: &str = r#"{"overview":"X","location":"Y","startDate":"Z","vehicle":"A","headCount":"B","operation":"C","hours":"D","amount":"E","cases":"F","training":"G"}"#;

    #[tokio::test]
    async fn prose_answer_stops_without_forward_or_push() {
        let notifier = RecordingNotifier::new();
        let ctx = test_ctx(notifier.clone());
        process_answer(&ctx, "req-1", Some("U1"), "こんにちはだけの返事です").await;
        assert!(notifier.pushes.lock().await.is_empty());
    }

    #[tokio::test]
    async fn out_of_domain_answer_stops_silently() {
        let notifier = RecordingNotifier::new();
        let ctx = test_ctx(notifier.clone());
        process_answer(
            &ctx,
            "req-2",
            Some("U1"),
            crate::extract::OUT_OF_DOMAIN_SENTINEL,
        )
        .await;
        assert!(notifier.pushes.lock().await.is_empty());
    }

    #[tokio::test]
    async fn missing_fields_notify_the_sender_with_the_list() {
        let notifier = RecordingNotifier::new();
        let ctx = test_ctx(notifier.clone());
        process_answer(&ctx, "req-3", Some("U1"), r#"{"overview":"X"}"#).await;
        let pushes = notifier.pushes.lock().await;
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0].0, "U1");
        assert!(pushes[0].1.contains(MISSING_FIELDS_NOTICE));
        assert!(pushes[0].1.contains("startDate"));
        // A skip at the field stage never reaches the forwarder.
        assert!(!pushes[0].1.contains("GAS"));
    }

    #[tokio::test]
    async fn full_deal_reaches_the_forwarder_and_relays_its_status() {
        let notifier = RecordingNotifier::new();
        let ctx = test_ctx(notifier.clone());
        process_answer(&ctx, "req-4", Some("U1"), FULL_DEAL).await;
        let pushes = notifier.pushes.lock().await;
        assert_eq!(pushes.len(), 1);
        // Unconfigured forwarder: the failure string is relayed as a GAS error.
        assert!(pushes[0].1.starts_with(FORWARD_ERR_PREFIX));
        assert!(pushes[0].1.contains("webhook URL not configured"));
    }

    #[tokio::test]
    async fn fenced_deal_behaves_like_the_bare_one() {
        let notifier = RecordingNotifier::new();
        let ctx = test_ctx(notifier.clone());
        let fenced = format!("```json\n{}\n```", FULL_DEAL);
        process_answer(&ctx, "req-5", Some("U1"), &fenced).await;
        let pushes = notifier.pushes.lock().await;
        assert_eq!(pushes.len(), 1);
        assert!(pushes[0].1.starts_with(FORWARD_ERR_PREFIX));
    }

    #[tokio::test]
    async fn unknown_sender_suppresses_pushes() {
        let notifier = RecordingNotifier::new();
        let ctx = test_ctx(notifier.clone());
        process_answer(&ctx, "req-6", None, r#"{"overview":"X"}"#).await;
        assert!(notifier.pushes.lock().await.is_empty());
    }

    #[tokio::test]
    async fn non_text_event_stops_before_querying() {
        let notifier = RecordingNotifier::new();
        let ctx = Arc::new(test_ctx(notifier.clone()));
        let raw = r#"{"events":[{"type":"follow","source":{"userId":"U1"}}]}"#.to_string();
        process_event(ctx, raw).await;
        assert!(notifier.pushes.lock().await.is_empty());
    }
}
