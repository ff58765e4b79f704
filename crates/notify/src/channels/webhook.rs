//! Generic webhook notification channel.
//!
//! Posts a Discord-compatible `{"content": "..."}` JSON body, which is also
//! accepted by most chat bridges and incoming-webhook relays.

use std::time::Duration;

use async_trait::async_trait;
use chrono::SecondsFormat;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ChannelError;
use crate::events::NotifyEvent;
use crate::NotifyChannel;

/// Webhook notification channel.
pub struct WebhookChannel {
    webhook_url: String,
    client: reqwest::Client,
}

impl WebhookChannel {
    /// Create a webhook channel posting to `webhook_url`, bounding every
    /// request by `timeout`.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(webhook_url: impl Into<String>, timeout: Duration) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            webhook_url: webhook_url.into().trim().to_string(),
            client,
        })
    }

    /// Format an event as a webhook payload.
    fn format_payload(event: &NotifyEvent) -> WebhookPayload {
        let content = format!(
            "🏥 **{}**\n\n{}\n\n_{}_",
            event.title(),
            event.body(),
            event
                .timestamp()
                .to_rfc3339_opts(SecondsFormat::Millis, true)
        );
        WebhookPayload { content }
    }
}

#[async_trait]
impl NotifyChannel for WebhookChannel {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn enabled(&self) -> bool {
        !self.webhook_url.is_empty()
    }

    async fn send(&self, event: &NotifyEvent) -> Result<(), ChannelError> {
        let payload = Self::format_payload(event);

        debug!(
            channel = "webhook",
            severity = event.severity().as_str(),
            "Sending notification"
        );

        let response = self.client.post(&self.webhook_url).json(&payload).send().await?;

        if response.status().is_success() {
            debug!(channel = "webhook", "Notification sent successfully");
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            warn!(
                channel = "webhook",
                status = %status,
                body = %body,
                "Webhook request failed"
            );

            Err(ChannelError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Severity;
    use chrono::{TimeZone, Utc};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn alert() -> NotifyEvent {
        NotifyEvent::StackHealth {
            severity: Severity::Critical,
            lines: vec!["alpha: c2 is exited (auto-restarted)".to_string()],
            timestamp: Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(),
        }
    }

    #[test]
    fn test_payload_content() {
        let payload = WebhookChannel::format_payload(&alert());
        assert_eq!(
            payload.content,
            "🏥 **AgentForge Monitor Alert**\n\nalpha: c2 is exited (auto-restarted)\n\n_2026-01-02T03:04:05.000Z_"
        );
    }

    #[tokio::test]
    async fn test_send_posts_json_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let channel = WebhookChannel::new(format!("{}/hook", server.uri()), Duration::from_secs(5)).unwrap();
        channel.send(&alert()).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(body["content"]
            .as_str()
            .unwrap()
            .contains("alpha: c2 is exited (auto-restarted)"));
    }

    #[tokio::test]
    async fn test_send_rejected_status_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let channel = WebhookChannel::new(server.uri(), Duration::from_secs(5)).unwrap();
        let err = channel.send(&alert()).await.unwrap_err();
        assert!(matches!(err, ChannelError::Rejected { status: 500, .. }));
    }

    #[test]
    fn test_blank_url_is_disabled() {
        let channel = WebhookChannel::new("  ", Duration::from_secs(5)).unwrap();
        assert!(!channel.enabled());
        let channel = WebhookChannel::new("https://hooks.example/x", Duration::from_secs(5)).unwrap();
        assert!(channel.enabled());
    }
}
