use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use thiserror::Error;

use crate::domain::{DispatchItem, MessageStatus};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to open listing in browser: {0}")]
    Browser(#[from] std::io::Error),
    #[error("outbound request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("outbound endpoint rejected message with status {0}")]
    Rejected(StatusCode),
    #[error("dispatch task aborted: {0}")]
    Aborted(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub status: MessageStatus,
    pub reason: Option<String>,
}

#[async_trait]
pub trait DispatchAction: Send + Sync {
    async fn dispatch(&self, item: &DispatchItem, message: &str)
        -> Result<DispatchOutcome, DispatchError>;
}

#[derive(Debug, Default)]
pub struct DryRunAction;

#[async_trait]
impl DispatchAction for DryRunAction {
    async fn dispatch(
        &self,
        item: &DispatchItem,
        message: &str,
    ) -> Result<DispatchOutcome, DispatchError> {
        tracing::info!(target: "dispatch", url = %item.url, message, "dry run dispatch");
        Ok(DispatchOutcome {
            status: MessageStatus::ConfirmedButNotSent,
            reason: Some("dry_run".to_string()),
        })
    }
}

#[derive(Debug, Default)]
pub struct BrowserOpenAction;

#[async_trait]
impl DispatchAction for BrowserOpenAction {
    async fn dispatch(
        &self,
        item: &DispatchItem,
        _message: &str,
    ) -> Result<DispatchOutcome, DispatchError> {
        let url = item.url.clone();
        tokio::task::spawn_blocking(move || open::that(url))
            .await
            .map_err(|err| DispatchError::Aborted(err.to_string()))??;
        Ok(DispatchOutcome {
            status: MessageStatus::ConfirmedButNotSent,
            reason: None,
        })
    }
}

#[derive(Debug, Serialize)]
struct OutboundMessage<'a> {
    listing_url: &'a str,
    message: &'a str,
    metadata: &'a std::collections::BTreeMap<String, String>,
}

pub struct WebhookAction {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl WebhookAction {
    pub fn new(client: Client, endpoint: String, timeout: Duration) -> Self {
        Self {
            client,
            endpoint,
            timeout,
        }
    }
}

#[async_trait]
impl DispatchAction for WebhookAction {
    async fn dispatch(
        &self,
        item: &DispatchItem,
        message: &str,
    ) -> Result<DispatchOutcome, DispatchError> {
        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&OutboundMessage {
                listing_url: &item.url,
                message,
                metadata: &item.metadata,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::Rejected(status));
        }
        Ok(DispatchOutcome {
            status: MessageStatus::Sent,
            reason: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use wiremock::{
        matchers::{body_partial_json, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    fn item() -> DispatchItem {
        DispatchItem::new("https://www.zillow.com/homedetails/7_zpid/").with_meta("listing_id", "7_zpid")
    }

    async fn webhook(server: &MockServer) -> WebhookAction {
        WebhookAction::new(
            Client::new(),
            format!("{}/outbound", server.uri()),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn dry_run_confirms_without_sending() {
        let outcome = DryRunAction.dispatch(&item(), "hello").await.unwrap();
        assert_eq!(outcome.status, MessageStatus::ConfirmedButNotSent);
        assert_eq!(outcome.reason.as_deref(), Some("dry_run"));
    }

    #[tokio::test]
    async fn webhook_success_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/outbound"))
            .and(body_partial_json(serde_json::json!({
                "listing_url": "https://www.zillow.com/homedetails/7_zpid/",
                "message": "hello",
                "metadata": { "listing_id": "7_zpid" },
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = webhook(&server).await.dispatch(&item(), "hello").await.unwrap();
        assert_eq!(outcome.status, MessageStatus::Sent);
        assert_eq!(outcome.reason, None);
    }

    #[tokio::test]
    async fn webhook_error_status_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = webhook(&server).await.dispatch(&item(), "hello").await.unwrap_err();
        assert!(matches!(err, DispatchError::Rejected(StatusCode::SERVICE_UNAVAILABLE)));
    }
}
