/// Webhook delivery: wraps one message in a section block and POSTs it.
///
/// Delivery happens at most once per job. Every transport failure is folded
/// into a [`NotificationResult`] so the caller can fall back to writing the
/// failure locally.
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Success,
    Error,
}

/// Outcome of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationResult {
    pub status: DeliveryStatus,
    /// The delivered text on success, a readable error description otherwise.
    pub detail: String,
}

impl NotificationResult {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            status: DeliveryStatus::Success,
            detail: text.into(),
        }
    }

    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            status: DeliveryStatus::Error,
            detail: detail.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == DeliveryStatus::Success
    }
}

/// Something a finished job can be reported to.
pub trait Notifier: Send + Sync {
    fn send<'a>(
        &'a self,
        message: &'a str,
    ) -> Pin<Box<dyn Future<Output = NotificationResult> + Send + 'a>>;
}

#[derive(Debug, Serialize)]
struct Payload<'a> {
    blocks: [Block<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Block<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: Text<'a>,
}

#[derive(Debug, Serialize)]
struct Text<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

/// Build the JSON body for a message.
pub fn payload_json(message: &str) -> serde_json::Result<Vec<u8>> {
    let payload = Payload {
        blocks: [Block {
            kind: "section",
            text: Text {
                kind: "mrkdwn",
                text: message,
            },
        }],
    };
    serde_json::to_vec(&payload)
}

/// Posts messages to an incoming-webhook URL.
pub struct WebhookNotifier {
    client: reqwest::Client,
    endpoint: String,
}

impl WebhookNotifier {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "falling back to default http client");
                reqwest::Client::new()
            });
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    async fn deliver(&self, message: &str) -> Result<(), String> {
        let body = payload_json(message).map_err(|e| format!("failed to encode payload: {e}"))?;

        let resp = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| format!("request to webhook failed: {e}"))?;

        let status = resp.status();
        // Drain the body so the exchange is complete before we report.
        let text = resp
            .text()
            .await
            .map_err(|e| format!("failed to read webhook response: {e}"))?;

        if !status.is_success() {
            return Err(format!("webhook returned {status}: {}", text.trim()));
        }
        Ok(())
    }
}

impl Notifier for WebhookNotifier {
    fn send<'a>(
        &'a self,
        message: &'a str,
    ) -> Pin<Box<dyn Future<Output = NotificationResult> + Send + 'a>> {
        Box::pin(async move {
            match self.deliver(message).await {
                Ok(()) => {
                    tracing::info!(bytes = message.len(), "notification delivered");
                    NotificationResult::success(message)
                }
                Err(detail) => {
                    tracing::warn!(error = %detail, "notification delivery failed");
                    NotificationResult::error(detail)
                }
            }
        })
    }
}
