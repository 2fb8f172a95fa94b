//! Configuration builders for tests.
//!
//! Use [`TestConfigBuilder`] to create customised [`AppConfig`] values without
//! repeating boilerplate across crate boundaries.

use crmpilot_config::AppConfig;

/// Fluent builder for [`AppConfig`] in tests.
///
/// # Example
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .window_size(4)
///     .max_tool_rounds(2)
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn model(mut self, model: &str) -> Self {
        self.config.llm.model = model.to_string();
        self
    }

    pub fn summary_max_tokens(mut self, n: u32) -> Self {
        self.config.llm.summary_max_tokens = n;
        self
    }

    pub fn window_size(mut self, n: usize) -> Self {
        self.config.agent.window_size = n;
        self
    }

    pub fn summary_interval(mut self, n: usize) -> Self {
        self.config.agent.summary_interval = n;
        self
    }

    pub fn summary_source_len(mut self, n: usize) -> Self {
        self.config.agent.summary_source_len = n;
        self
    }

    pub fn max_tool_rounds(mut self, n: usize) -> Self {
        self.config.agent.max_tool_rounds = n;
        self
    }

    pub fn utc_offset_minutes(mut self, minutes: i32) -> Self {
        self.config.agent.utc_offset_minutes = minutes;
        self
    }

    /// Point every CRM endpoint at a local server rooted at `base`
    /// (e.g. `http://127.0.0.1:4000`).
    pub fn crm_server(mut self, base: &str) -> Self {
        self.config.crm.api_base_url = format!("{base}/crm/v8");
        self.config.crm.accounts_url = format!("{base}/oauth/v2/token");
        self.config.crm.mail_function_url = format!("{base}/crm/v7/functions/agentmail/actions/execute");
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.crm.request_timeout_secs = secs;
        self
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
