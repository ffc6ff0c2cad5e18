use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Inbound Slack body. Covers the Events API envelope, the url_verification
/// handshake and slash-command form fields; everything is optional.
///
/// Fields are read one at a time: a field with an unexpected type becomes
/// `None` and leaves its neighbours intact.
#[derive(Debug, Default, Deserialize)]
pub struct SlackEnvelope {
    #[serde(rename = "type", default, deserialize_with = "lenient")]
    pub event_type: Option<String>,
    /// Echoed back as-is, whatever its JSON type.
    #[serde(default)]
    pub challenge: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub event: Option<SlackEvent>,
    #[serde(default, deserialize_with = "lenient")]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub user_name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub channel_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SlackEvent {
    #[serde(default, deserialize_with = "lenient")]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub user: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub channel: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub subtype: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub bot_id: Option<String>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NormalizedMessage {
    pub text: String,
    pub user: String,
    pub channel: String,
}

#[derive(Debug, PartialEq)]
pub enum Inbound {
    UrlVerification { challenge: Option<Value> },
    /// Bot-originated message; must not be enriched or forwarded.
    Ignored,
    Message(NormalizedMessage),
}

/// Body posted to the workflow webhook.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowPayload {
    pub user: String,
    pub channel: String,
    /// The user's original text.
    pub query: String,
    /// AI response when one was produced, otherwise the original text.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_response: Option<String>,
    pub timestamp: i64,
}

impl WorkflowPayload {
    pub fn new(message: &NormalizedMessage, ai_response: Option<String>, timestamp: i64) -> Self {
        Self {
            user: message.user.clone(),
            channel: message.channel.clone(),
            query: message.text.clone(),
            message: ai_response
                .clone()
                .unwrap_or_else(|| message.text.clone()),
            ai_response,
            timestamp,
        }
    }
}

/// Parses a raw Slack body and classifies it. Never fails: input that is
/// neither JSON nor a usable form body yields an empty message.
pub fn normalize(raw_body: &[u8]) -> Inbound {
    let value = parse_body(raw_body);
    let envelope: SlackEnvelope = serde_json::from_value(value).unwrap_or_default();

    if envelope.event_type.as_deref() == Some("url_verification") {
        return Inbound::UrlVerification {
            challenge: envelope.challenge,
        };
    }

    if let Some(event) = envelope.event {
        if event.subtype.as_deref() == Some("bot_message") || event.bot_id.is_some() {
            return Inbound::Ignored;
        }
        return Inbound::Message(NormalizedMessage {
            text: event.text.unwrap_or_default(),
            user: event.user.unwrap_or_default(),
            channel: event.channel.unwrap_or_default(),
        });
    }

    match envelope.text {
        Some(text) => Inbound::Message(NormalizedMessage {
            text,
            user: envelope
                .user_name
                .filter(|u| !u.is_empty())
                .or(envelope.user_id)
                .unwrap_or_default(),
            channel: envelope.channel_id.unwrap_or_default(),
        }),
        None => Inbound::Message(NormalizedMessage::default()),
    }
}

fn parse_body(raw_body: &[u8]) -> Value {
    match serde_json::from_slice::<Value>(raw_body) {
        Ok(value @ Value::Object(_)) => value,
        Ok(_) => Value::Object(Map::new()),
        Err(_) => Value::Object(parse_form(&String::from_utf8_lossy(raw_body))),
    }
}

/// `application/x-www-form-urlencoded` decoding. Pairs without `=` are skipped
/// and a repeated key keeps its last value.
fn parse_form(body: &str) -> Map<String, Value> {
    let mut form = Map::new();
    for pair in body.split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let key = decode_component(key);
        if key.is_empty() {
            continue;
        }
        form.insert(key, Value::String(decode_component(value)));
    }
    form
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        // Invalid UTF-8 after decoding; keep the undecoded text.
        Err(_) => spaced,
    }
}
