use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ErrataError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_endpoint() -> String {
    "http://127.0.0.1:5000/chat-stream".into()
}

fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatConfig {
    /// Template for the seeded system message. `{analysis}` is replaced
    /// with the question's AI analysis when a chat is opened.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
        }
    }
}

fn default_system_prompt() -> String {
    "Based on the following analysis, answer the user's questions. Analysis: {analysis}".into()
}

impl ChatConfig {
    /// The system prompt for one question's chat session.
    pub fn system_prompt_for(&self, analysis: &str) -> String {
        self.system_prompt.replace("{analysis}", analysis)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub file_path: String,
    #[serde(default)]
    pub database_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            file_path: default_storage_path(),
            database_url: None,
        }
    }
}

fn default_storage_path() -> String {
    "transcript.jsonl".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let cfg: Self = toml::from_str(&raw)
            .map_err(|err| ErrataError::Config(format!("failed to parse configuration: {err}")))?;
        Ok(cfg)
    }

    pub fn from_env_or_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut cfg = Self::from_file(path)?;
        if let Ok(endpoint) = env::var("ERRATA_ENDPOINT") {
            cfg.backend.endpoint = endpoint;
        }
        if let Ok(timeout) = env::var("ERRATA_TIMEOUT_SECS") {
            if let Ok(parsed) = timeout.parse::<u64>() {
                cfg.backend.timeout_secs = parsed;
            }
        }
        if let Ok(prompt) = env::var("ERRATA_SYSTEM_PROMPT") {
            cfg.chat.system_prompt = prompt;
        }
        if let Ok(path) = env::var("ERRATA_STORAGE_PATH") {
            cfg.storage.file_path = path;
        }
        if let Ok(url) = env::var("ERRATA_DATABASE_URL") {
            cfg.storage.database_url = Some(url);
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn loads_and_overrides() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[backend]\nendpoint='http://example.test/chat-stream'\ntimeout_secs=10"
        )
        .unwrap();

        env::set_var("ERRATA_TIMEOUT_SECS", "20");
        let cfg = AppConfig::from_env_or_file(file.path()).unwrap();

        assert_eq!(cfg.backend.endpoint, "http://example.test/chat-stream");
        assert_eq!(cfg.backend.timeout_secs, 20);
        assert_eq!(cfg.storage.file_path, "transcript.jsonl");
        env::remove_var("ERRATA_TIMEOUT_SECS");
    }

    #[test]
    fn system_prompt_template_fills_in_the_analysis() {
        let chat = ChatConfig::default();
        let prompt = chat.system_prompt_for("the derivative sign was flipped");

        assert!(prompt.starts_with("Based on the following analysis"));
        assert!(prompt.ends_with("the derivative sign was flipped"));
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[chat]\nsystem_prompt='tutor: {{analysis}}'").unwrap();

        let cfg = AppConfig::from_file(file.path()).unwrap();

        assert_eq!(cfg.backend, BackendConfig::default());
        assert_eq!(cfg.chat.system_prompt_for("x"), "tutor: x");
    }
}
