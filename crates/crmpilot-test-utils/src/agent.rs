//! Orchestrator test harness.
//!
//! [`TestAgent`] wires an [`Orchestrator`] to a [`ScriptedProvider`] and a
//! [`RecordingBackend`], with the full CRM tool catalogue registered.

use std::path::PathBuf;
use std::sync::Arc;

use crmpilot_config::AppConfig;
use crmpilot_core::{BasePrompt, Orchestrator, ToolRegistry, register_crm_tools};
use tempfile::TempDir;

use crate::backend::RecordingBackend;
use crate::provider::ScriptedProvider;

/// Base prompt used by every test agent.
pub const TEST_PROMPT: &str = "You are a test assistant.";

/// An orchestrator plus handles to its scripted collaborators.
pub struct TestAgent {
    pub orchestrator: Orchestrator,
    pub provider: ScriptedProvider,
    pub backend: RecordingBackend,
}

impl TestAgent {
    pub fn new(config: &AppConfig) -> Self {
        let provider = ScriptedProvider::new();
        let backend = RecordingBackend::new();

        let mut tools = ToolRegistry::new();
        register_crm_tools(&mut tools, Arc::new(backend.clone()));

        let orchestrator = Orchestrator::new(
            config,
            Box::new(provider.clone()),
            tools,
            BasePrompt::new(TEST_PROMPT, 0),
        );

        Self {
            orchestrator,
            provider,
            backend,
        }
    }

    pub fn default_config() -> Self {
        Self::new(&AppConfig::default())
    }
}

/// A config file in a temporary directory, deleted on drop.
pub struct TempConfig {
    pub path: PathBuf,
    _temp_dir: TempDir,
}

impl TempConfig {
    pub async fn with_toml(toml_content: &str) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let path = temp_dir.path().join("crmpilot.toml");
        tokio::fs::write(&path, toml_content)
            .await
            .expect("failed to write test config");
        Self {
            path,
            _temp_dir: temp_dir,
        }
    }

    pub async fn load(&self) -> AppConfig {
        AppConfig::load(&self.path)
            .await
            .expect("failed to parse test config")
    }
}
