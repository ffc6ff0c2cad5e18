use crate::ai::{self, AiClient};
use crate::config::Config;
use crate::slack::{SignatureVerifier, RETRY_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use crate::types::{normalize, Inbound, NormalizedMessage, WorkflowPayload};
use crate::workflow::{ForwardError, WorkflowClient};
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, Response, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::any::Any;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::{error, info, warn};

/// Substituted for the AI response when the model call fails.
pub const AI_ERROR_RESPONSE: &str = "AI error occurred";

#[derive(Clone)]
pub struct AppState {
    verifier: Arc<SignatureVerifier>,
    ai: Option<Arc<AiClient>>,
    workflow: Arc<WorkflowClient>,
    ai_keyword_filter: bool,
}

impl AppState {
    pub fn from_config(config: &Config) -> Result<Self, ForwardError> {
        Ok(Self {
            verifier: Arc::new(SignatureVerifier::new(
                config.signing_secret.clone(),
                config.max_request_age,
            )),
            ai: AiClient::from_config(&config.ai).map(Arc::new),
            workflow: Arc::new(WorkflowClient::new(config.workflow_url.clone())?),
            ai_keyword_filter: config.ai.keyword_filter,
        })
    }

    pub fn verification_disabled(&self) -> bool {
        self.verifier.is_open()
    }

    pub fn ai_enabled(&self) -> bool {
        self.ai.is_some()
    }

    pub fn workflow_configured(&self) -> bool {
        self.workflow.is_configured()
    }
}

#[derive(Debug)]
pub enum RelayError {
    Unauthorized,
    Internal,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> axum::response::Response {
        match self {
            RelayError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "invalid signature" })),
            )
                .into_response(),
            RelayError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Server error" })),
            )
                .into_response(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/", get(health_handler))
        .route("/health", get(health_handler))
        .route("/slack", post(slack_handler))
        .route("/v1/slack", post(slack_handler))
        .with_state(state);
    with_layers(routes)
}

fn with_layers(router: Router) -> Router {
    router
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn handle_panic(_err: Box<dyn Any + Send + 'static>) -> Response<Body> {
    error!("Request handler panicked");
    RelayError::Internal.into_response()
}

pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "ai_enabled": state.ai_enabled(),
        "workflow_configured": state.workflow_configured(),
    }))
}

pub async fn slack_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, RelayError> {
    info!("Received Slack request, body length: {} bytes", body.len());

    let timestamp = header_str(&headers, TIMESTAMP_HEADER);
    let signature = header_str(&headers, SIGNATURE_HEADER);

    if !state.verifier.verify(&body, timestamp, signature) {
        warn!("Signature verification failed");
        return Err(RelayError::Unauthorized);
    }

    // The first delivery already ran (or is still running) the AI call and the
    // forward; a redelivery would duplicate both.
    if let Some(retry) = headers.get(RETRY_HEADER) {
        info!("Ignoring Slack retry {:?}", retry);
        return Ok(Json(json!({ "status": "ignored" })));
    }

    let message = match normalize(&body) {
        Inbound::UrlVerification { challenge } => {
            info!("Responding to url_verification challenge");
            return Ok(Json(json!({ "challenge": challenge })));
        }
        Inbound::Ignored => {
            info!("Ignoring bot message");
            return Ok(Json(json!({ "status": "ignored" })));
        }
        Inbound::Message(message) => message,
    };

    // Downstream calls run on their own task so the request loop stays free;
    // a panic there surfaces as a JoinError instead of tearing down the connection.
    let task_state = state.clone();
    let forwarded = tokio::spawn(async move { relay_message(&task_state, message).await })
        .await
        .map_err(|e| {
            error!("Relay task failed: {}", e);
            RelayError::Internal
        })?;

    Ok(Json(json!({ "status": "ok", "forwarded": forwarded })))
}

async fn relay_message(state: &AppState, message: NormalizedMessage) -> bool {
    let ai_response = enrich(state, &message.text).await;
    let timestamp = time::OffsetDateTime::now_utc().unix_timestamp();
    let payload = WorkflowPayload::new(&message, ai_response, timestamp);
    state.workflow.forward(&payload).await
}

async fn enrich(state: &AppState, text: &str) -> Option<String> {
    if text.trim().is_empty() {
        return None;
    }
    if state.ai_keyword_filter && !ai::wants_ai(text) {
        return None;
    }
    let client = state.ai.as_ref()?;

    match client.enrich(text).await {
        Ok(answer) => Some(answer),
        Err(e) => {
            error!("AI error: {}", e);
            Some(AI_ERROR_RESPONSE.to_string())
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("")
}
