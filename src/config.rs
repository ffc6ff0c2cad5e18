use std::time::Duration;

const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_AI_TIMEOUT_SECS: u64 = 60;
const DEFAULT_PORT: u16 = 3000;

/// Process configuration. Built once in `main` and cloned into the app state.
#[derive(Clone, Debug)]
pub struct Config {
    /// `None` means signature verification is disabled (open mode).
    pub signing_secret: Option<String>,
    pub workflow_url: Option<String>,
    /// Reject requests whose timestamp is older than this. Disabled when `None`.
    pub max_request_age: Option<Duration>,
    pub ai: AiConfig,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct AiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
    pub keyword_filter: bool,
}

#[derive(Debug, PartialEq)]
pub enum ConfigError {
    Invalid { key: &'static str, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid { key, value } => {
                write!(f, "Invalid value for {}: {:?}", key, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let max_request_age = match get("SLACK_MAX_REQUEST_AGE_SECS") {
            Some(raw) => match parse::<u64>("SLACK_MAX_REQUEST_AGE_SECS", &raw)? {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            None => None,
        };

        let timeout_secs = match get("AI_TIMEOUT_SECS") {
            Some(raw) => parse::<u64>("AI_TIMEOUT_SECS", &raw)?,
            None => DEFAULT_AI_TIMEOUT_SECS,
        };

        let keyword_filter = match get("AI_KEYWORD_FILTER") {
            Some(raw) => parse::<bool>("AI_KEYWORD_FILTER", &raw)?,
            None => false,
        };

        let port = match get("PORT") {
            Some(raw) => parse::<u16>("PORT", &raw)?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            signing_secret: get("SLACK_SIGNING_SECRET"),
            workflow_url: get("SLACK_WORKFLOW_URL"),
            max_request_age,
            ai: AiConfig {
                api_key: get("GOOGLE_API_KEY"),
                model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
                base_url: get("GEMINI_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
                timeout: Duration::from_secs(timeout_secs),
                keyword_filter,
            },
            port,
        })
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse::<T>().map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_string(),
    })
}
