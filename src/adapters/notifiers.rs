//! Human-operator notifiers.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, StatusCode};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::domain::ports::{Notification, Notifier, NotifyError};

/// Writes alerts to the log. Used when no webhook is configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, channel: &str, notification: &Notification) -> Result<(), NotifyError> {
        tracing::warn!(
            channel,
            ticket_id = %notification.ticket_id,
            request_id = %notification.request_id,
            reason = %notification.reason,
            priority = %notification.priority,
            summary = %notification.summary,
            "Escalation requires a human operator"
        );
        Ok(())
    }
}

/// Keeps every alert it is sent. Handy for tests and dry runs.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, Notification)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<(String, Notification)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, channel: &str, notification: &Notification) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .await
            .push((channel.to_string(), notification.clone()));
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookBody<'a> {
    channel: &'a str,
    #[serde(flatten)]
    notification: &'a Notification,
}

/// Posts alerts as JSON to an operator webhook.
///
/// Connection failures, timeouts, 429 and 5xx responses are reported as
/// `Unavailable` so the caller retries them; other 4xx are `Rejected`.
pub struct WebhookNotifier {
    http_client: ReqwestClient,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(url, Duration::from_secs(10))
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http_client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, channel: &str, notification: &Notification) -> Result<(), NotifyError> {
        let response = self
            .http_client
            .post(&self.url)
            .json(&WebhookBody {
                channel,
                notification,
            })
            .send()
            .await
            .map_err(|e| NotifyError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(ticket_id = %notification.ticket_id, %status, "Webhook accepted alert");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            Err(NotifyError::Unavailable(format!("{status}: {body}")))
        } else {
            Err(NotifyError::Rejected(format!("{status}: {body}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{PriorityClass, TriggerReason};
    use chrono::Utc;
    use uuid::Uuid;

    fn notification() -> Notification {
        Notification {
            ticket_id: Uuid::new_v4(),
            request_id: Uuid::new_v4(),
            reason: TriggerReason::Breach,
            priority: PriorityClass::High,
            summary: "escalation deadline passed".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_webhook_posts_json() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/alerts")
            .match_header("content-type", "application/json")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"channel": "operators", "reason": "breach", "priority": "high"}"#.to_string(),
            ))
            .with_status(202)
            .create_async()
            .await;

        let notifier = WebhookNotifier::new(format!("{}/alerts", server.url())).unwrap();
        notifier.notify("operators", &notification()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/alerts")
            .with_status(503)
            .with_body("maintenance")
            .create_async()
            .await;

        let notifier = WebhookNotifier::new(format!("{}/alerts", server.url())).unwrap();
        let err = notifier.notify("operators", &notification()).await.unwrap_err();
        assert!(matches!(err, NotifyError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_client_error_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/alerts")
            .with_status(400)
            .create_async()
            .await;

        let notifier = WebhookNotifier::new(format!("{}/alerts", server.url())).unwrap();
        let err = notifier.notify("operators", &notification()).await.unwrap_err();
        assert!(matches!(err, NotifyError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_recording_notifier_keeps_alerts() {
        let notifier = RecordingNotifier::new();
        notifier.notify("ops", &notification()).await.unwrap();
        assert_eq!(notifier.sent().await.len(), 1);
    }
}
