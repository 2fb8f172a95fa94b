#![deny(unsafe_code)]

//! Configuration loading and validation for CrmPilot.
//!
//! Loads a TOML configuration file and validates it before anything else in the
//! process starts. [`AppConfig`] is constructed once and then passed by
//! reference into the orchestrator, the tool registry and the CRM client.
//!
//! Secrets are never stored in the file. Each section only names the
//! environment variable that holds a credential; the core crate resolves
//! those names at startup.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Language model endpoint configuration.
    #[serde(default)]
    pub llm: LlmConfig,

    /// CRM backend configuration.
    #[serde(default)]
    pub crm: CrmConfig,

    /// Conversation orchestration tuning.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// OpenAI-compatible chat completions endpoint.
///
/// ## TOML Example
///
/// ```toml
/// [llm]
/// base_url = "https://api.groq.com/openai/v1/chat/completions"
/// model = "qwen/qwen3-32b"
/// api_key_env = "GROQ_DEV_API"
/// max_retries = 2
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Full URL of the chat completions endpoint.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Model identifier sent with every request.
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_llm_api_key_env")]
    pub api_key_env: String,

    /// Sampling temperature (0.0–2.0).
    #[serde(default)]
    pub temperature: f32,

    /// Maximum tokens for agent turns.
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,

    /// Maximum tokens for summarization turns.
    #[serde(default = "default_summary_max_tokens")]
    pub summary_max_tokens: u32,

    /// Retries on transient model failures (0 disables retrying).
    #[serde(default = "default_llm_max_retries")]
    pub max_retries: u32,

    /// Base delay between retries, multiplied by the attempt number.
    #[serde(default = "default_llm_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            api_key_env: default_llm_api_key_env(),
            temperature: 0.0,
            max_tokens: default_llm_max_tokens(),
            summary_max_tokens: default_summary_max_tokens(),
            max_retries: default_llm_max_retries(),
            retry_backoff_ms: default_llm_retry_backoff_ms(),
        }
    }
}

fn default_llm_base_url() -> String {
    "https://api.groq.com/openai/v1/chat/completions".to_string()
}

fn default_llm_model() -> String {
    "qwen/qwen3-32b".to_string()
}

fn default_llm_api_key_env() -> String {
    "GROQ_DEV_API".to_string()
}

fn default_llm_max_tokens() -> u32 {
    4096
}

fn default_summary_max_tokens() -> u32 {
    512
}

fn default_llm_max_retries() -> u32 {
    2
}

fn default_llm_retry_backoff_ms() -> u64 {
    500
}

/// CRM backend endpoints and the environment variables holding its credentials.
///
/// ## TOML Example
///
/// ```toml
/// [crm]
/// api_base_url = "https://www.zohoapis.com/crm/v8"
/// refresh_token_env = "ZDH_1_REFRESH"
/// client_id_env = "ZDH_1_CLIENTID"
/// client_secret_env = "ZDH_1_CLIENTSECRET"
/// mail_api_key_env = "MAIL_API_KEY"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmConfig {
    /// Base URL of the versioned CRM REST API (no trailing slash).
    #[serde(default = "default_crm_api_base_url")]
    pub api_base_url: String,

    /// OAuth token endpoint used for the refresh-token grant.
    #[serde(default = "default_crm_accounts_url")]
    pub accounts_url: String,

    /// URL of the server-side mail function.
    #[serde(default = "default_crm_mail_function_url")]
    pub mail_function_url: String,

    #[serde(default = "default_refresh_token_env")]
    pub refresh_token_env: String,

    #[serde(default = "default_client_id_env")]
    pub client_id_env: String,

    #[serde(default = "default_client_secret_env")]
    pub client_secret_env: String,

    #[serde(default = "default_mail_api_key_env")]
    pub mail_api_key_env: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_crm_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_crm_api_base_url(),
            accounts_url: default_crm_accounts_url(),
            mail_function_url: default_crm_mail_function_url(),
            refresh_token_env: default_refresh_token_env(),
            client_id_env: default_client_id_env(),
            client_secret_env: default_client_secret_env(),
            mail_api_key_env: default_mail_api_key_env(),
            request_timeout_secs: default_crm_request_timeout_secs(),
        }
    }
}

fn default_crm_api_base_url() -> String {
    "https://www.zohoapis.com/crm/v8".to_string()
}

fn default_crm_accounts_url() -> String {
    "https://accounts.zoho.com/oauth/v2/token".to_string()
}

fn default_crm_mail_function_url() -> String {
    "https://www.zohoapis.com/crm/v7/functions/agentmail/actions/execute".to_string()
}

fn default_refresh_token_env() -> String {
    "ZDH_1_REFRESH".to_string()
}

fn default_client_id_env() -> String {
    "ZDH_1_CLIENTID".to_string()
}

fn default_client_secret_env() -> String {
    "ZDH_1_CLIENTSECRET".to_string()
}

fn default_mail_api_key_env() -> String {
    "MAIL_API_KEY".to_string()
}

fn default_crm_request_timeout_secs() -> u64 {
    30
}

/// Conversation orchestration tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Number of recent messages sent to the model (N).
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Messages per summarization round; the threshold is
    /// `(summary_count + 1) * summary_interval`.
    #[serde(default = "default_summary_interval")]
    pub summary_interval: usize,

    /// How many raw trailing messages the summarizer reads.
    #[serde(default = "default_summary_source_len")]
    pub summary_source_len: usize,

    /// Maximum `Tools` visits within one conversation step.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,

    /// Offset of the operator's local time zone, in minutes east of UTC.
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,

    /// Optional file whose contents replace the built-in base prompt.
    #[serde(default)]
    pub system_prompt_file: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            summary_interval: default_summary_interval(),
            summary_source_len: default_summary_source_len(),
            max_tool_rounds: default_max_tool_rounds(),
            utc_offset_minutes: default_utc_offset_minutes(),
            system_prompt_file: None,
        }
    }
}

fn default_window_size() -> usize {
    10
}

fn default_summary_interval() -> usize {
    10
}

fn default_summary_source_len() -> usize {
    10
}

fn default_max_tool_rounds() -> usize {
    25
}

fn default_utc_offset_minutes() -> i32 {
    330 // IST
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let urls = [
            ("llm.base_url", &self.llm.base_url),
            ("crm.api_base_url", &self.crm.api_base_url),
            ("crm.accounts_url", &self.crm.accounts_url),
            ("crm.mail_function_url", &self.crm.mail_function_url),
        ];
        for (key, url) in urls {
            if url.trim().is_empty() {
                return Err(ConfigError::Validation(format!("{key} must not be empty")));
            }
        }
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::Validation(
                "llm.model must not be empty".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::Validation(format!(
                "llm.temperature must be in [0.0, 2.0], got {}",
                self.llm.temperature
            )));
        }
        if self.llm.max_tokens == 0 || self.llm.summary_max_tokens == 0 {
            return Err(ConfigError::Validation(
                "llm.max_tokens and llm.summary_max_tokens must be non-zero".to_string(),
            ));
        }

        let env_names = [
            ("llm.api_key_env", &self.llm.api_key_env),
            ("crm.refresh_token_env", &self.crm.refresh_token_env),
            ("crm.client_id_env", &self.crm.client_id_env),
            ("crm.client_secret_env", &self.crm.client_secret_env),
            ("crm.mail_api_key_env", &self.crm.mail_api_key_env),
        ];
        for (key, name) in env_names {
            if name.is_empty() {
                return Err(ConfigError::Validation(format!("{key} must not be empty")));
            }
        }
        if self.crm.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "crm.request_timeout_secs must be non-zero".to_string(),
            ));
        }

        // The window holds the system message plus at least one turn once a
        // summary exists, so N - 1 must stay positive.
        if self.agent.window_size < 2 {
            return Err(ConfigError::Validation(format!(
                "agent.window_size must be at least 2, got {}",
                self.agent.window_size
            )));
        }
        if self.agent.summary_interval == 0 {
            return Err(ConfigError::Validation(
                "agent.summary_interval must be at least 1".to_string(),
            ));
        }
        if self.agent.summary_source_len == 0 {
            return Err(ConfigError::Validation(
                "agent.summary_source_len must be at least 1".to_string(),
            ));
        }
        if self.agent.max_tool_rounds == 0 {
            return Err(ConfigError::Validation(
                "agent.max_tool_rounds must be at least 1".to_string(),
            ));
        }
        if self.agent.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(ConfigError::Validation(format!(
                "agent.utc_offset_minutes must be within ±1439, got {}",
                self.agent.utc_offset_minutes
            )));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.level must be one of {:?}, got {:?}",
                valid_levels, self.logging.level
            )));
        }

        Ok(())
    }
}
