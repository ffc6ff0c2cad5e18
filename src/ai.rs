use crate::config::AiConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

const RESEARCH_DIRECTIVE: &str = "You are a seasoned researcher with a knack for uncovering the latest developments in the topic of the user's question. Find the most relevant information and present it clearly and concisely.";

const REPORT_DIRECTIVE: &str = "You are a meticulous assistant who turns research notes into a short, clear report that is easy to act on.\n===Context===\n{context}\n===End Context===\nAnswer the user's question using only the information in the context. Keep it brief enough for a Slack message.";

/// Gemini client that answers a question with a two-stage chain:
/// a research pass, then a report written from the research output.
pub struct AiClient {
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug)]
pub enum AiError {
    Network(String),
    Api(String),
    EmptyResponse,
    Timeout(Duration),
}

impl std::fmt::Display for AiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AiError::Network(msg) => write!(f, "Network error: {}", msg),
            AiError::Api(msg) => write!(f, "API error: {}", msg),
            AiError::EmptyResponse => write!(f, "Model returned no text"),
            AiError::Timeout(d) => write!(f, "Timed out after {:?}", d),
        }
    }
}

impl std::error::Error for AiError {}

impl AiClient {
    /// Returns `None` when no API key is configured.
    pub fn from_config(config: &AiConfig) -> Option<Self> {
        let api_key = config.api_key.clone()?;
        Some(Self {
            api_key,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.timeout,
            client: reqwest::Client::new(),
        })
    }

    /// Runs research then report for `question`, bounded by the configured timeout.
    pub async fn enrich(&self, question: &str) -> Result<String, AiError> {
        match tokio::time::timeout(self.timeout, self.research_then_report(question)).await {
            Ok(result) => result,
            Err(_) => Err(AiError::Timeout(self.timeout)),
        }
    }

    async fn research_then_report(&self, question: &str) -> Result<String, AiError> {
        let context = self.generate(RESEARCH_DIRECTIVE, question).await?;
        let directive = REPORT_DIRECTIVE.replace("{context}", &context);
        let report = self.generate(&directive, question).await?;

        let preview: String = question.chars().take(50).collect();
        info!("AI processed: {}...", preview);
        Ok(report)
    }

    async fn generate(&self, system: &str, question: &str) -> Result<String, AiError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let payload = GenerateContentRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: system.to_string(),
                }],
            },
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: question.to_string(),
                }],
            }],
            generation_config: GenerationConfig { temperature: 0.0 },
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AiError::Network(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!("Gemini returned {} for model {}", status, self.model);
            return Err(AiError::Api(format!("{} - {}", status, text)));
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| AiError::Network(format!("Parse failed: {}", e)))?;

        let text: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(AiError::EmptyResponse);
        }
        Ok(text)
    }
}

/// Keyword gate carried over from the first deployment: only questions,
/// help requests, or messages starting with "ai" get enriched.
pub fn wants_ai(text: &str) -> bool {
    let text = text.to_lowercase();
    text.contains("help") || text.contains('?') || text.starts_with("ai")
}
