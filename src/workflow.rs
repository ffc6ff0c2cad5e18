use crate::types::WorkflowPayload;
use std::time::Duration;
use tracing::{error, info};

const FORWARD_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts payloads to the configured Slack workflow webhook.
///
/// Delivery is best-effort: one attempt, no retry. Failures are logged and
/// reported as `false`, never returned as errors.
pub struct WorkflowClient {
    url: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug)]
pub enum ForwardError {
    Client(String),
    NotConfigured,
    Network(String),
    Status(u16, String),
}

impl std::fmt::Display for ForwardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForwardError::Client(msg) => write!(f, "Failed to build HTTP client: {}", msg),
            ForwardError::NotConfigured => write!(f, "No workflow URL configured"),
            ForwardError::Network(msg) => write!(f, "Network error: {}", msg),
            ForwardError::Status(status, body) => {
                write!(f, "Workflow HTTP error {}: {}", status, body)
            }
        }
    }
}

impl std::error::Error for ForwardError {}

impl WorkflowClient {
    pub fn new(url: Option<String>) -> Result<Self, ForwardError> {
        Self::with_timeout(url, FORWARD_TIMEOUT)
    }

    fn with_timeout(url: Option<String>, timeout: Duration) -> Result<Self, ForwardError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ForwardError::Client(e.to_string()))?;
        Ok(Self {
            url: url.filter(|u| !u.is_empty()),
            client,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }

    pub async fn forward(&self, payload: &WorkflowPayload) -> bool {
        match self.try_forward(payload).await {
            Ok(()) => {
                info!("Sent to workflow successfully");
                true
            }
            Err(ForwardError::NotConfigured) => {
                info!("No workflow URL configured");
                false
            }
            Err(e) => {
                error!("Workflow error: {}", e);
                false
            }
        }
    }

    async fn try_forward(&self, payload: &WorkflowPayload) -> Result<(), ForwardError> {
        let url = self.url.as_deref().ok_or(ForwardError::NotConfigured)?;

        info!(
            "Sending to workflow: user={} channel={} query_len={}",
            payload.user,
            payload.channel,
            payload.query.len()
        );

        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| ForwardError::Network(e.to_string()))?;

        let status = response.status();
        info!("Workflow response status: {}", status);

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ForwardError::Status(status.as_u16(), text));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn payload() -> WorkflowPayload {
        WorkflowPayload {
            user: "alice".to_string(),
            channel: "C1".to_string(),
            query: "hello".to_string(),
            message: "hello".to_string(),
            ai_response: None,
            timestamp: 1_700_000_000,
        }
    }

    #[tokio::test]
    async fn posts_json_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/triggers/T1/abc"))
            .and(header("content-type", "application/json"))
            .and(body_json(serde_json::json!({
                "user": "alice",
                "channel": "C1",
                "query": "hello",
                "message": "hello",
                "timestamp": 1_700_000_000
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = WorkflowClient::new(Some(format!("{}/triggers/T1/abc", server.uri()))).unwrap();
        assert!(client.forward(&payload()).await);
    }

    #[tokio::test]
    async fn non_success_status_returns_false() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_workflow"))
            .expect(1)
            .mount(&server)
            .await;

        let client = WorkflowClient::new(Some(server.uri())).unwrap();
        assert!(!client.forward(&payload()).await);
    }

    #[tokio::test]
    async fn unreachable_url_returns_false() {
        let client = WorkflowClient::new(Some("http://127.0.0.1:1/unreachable".to_string())).unwrap();
        assert!(!client.forward(&payload()).await);
    }

    #[tokio::test]
    async fn missing_url_returns_false() {
        let client = WorkflowClient::new(None).unwrap();
        assert!(!client.is_configured());
        assert!(!client.forward(&payload()).await);
    }

    #[tokio::test]
    async fn slow_workflow_hits_the_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let client =
            WorkflowClient::with_timeout(Some(server.uri()), Duration::from_millis(200)).unwrap();
        assert!(!client.forward(&payload()).await);
    }
}
