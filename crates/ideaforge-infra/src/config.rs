//! Configuration loader for Ideaforge.
//!
//! Reads `ideaforge.toml` from a config directory and deserializes it into
//! [`ForgeConfig`]. Falls back to defaults when the file is missing or
//! malformed, then applies `IDEAFORGE_*` environment overrides.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    /// Chat model identifier passed to the provider.
    pub model: String,
    /// Base URL of the Ollama backend.
    pub ollama_base_url: String,
    /// Sampling temperature for generation calls.
    pub temperature: f64,
    /// Ollama keep-alive duration (e.g. "5m").
    pub keep_alive: String,
    /// Directory holding the prompt assets.
    pub prompts_dir: PathBuf,
    /// Return empty field values instead of failing when no chat backend is
    /// reachable.
    pub deterministic_fallback: bool,
    pub store: StoreConfig,
}

/// Record-store connection settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub base_url: Option<String>,
    pub service_key: Option<String>,
    pub table: String,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            model: "llama3.1".to_string(),
            ollama_base_url: "http://127.0.0.1:11434".to_string(),
            temperature: 0.2,
            keep_alive: "5m".to_string(),
            prompts_dir: PathBuf::from("prompts"),
            deterministic_fallback: false,
            store: StoreConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            service_key: None,
            table: "discovery_records".to_string(),
        }
    }
}

impl ForgeConfig {
    /// Apply overrides from a variable lookup (normally [`std::env::var`]).
    ///
    /// Recognized keys: `IDEAFORGE_MODEL`, `IDEAFORGE_OLLAMA_URL`,
    /// `IDEAFORGE_TEMPERATURE`, `IDEAFORGE_PROMPTS_DIR`,
    /// `IDEAFORGE_STORE_URL`, `IDEAFORGE_STORE_KEY`,
    /// `IDEAFORGE_STORE_TABLE`, `IDEAFORGE_DETERMINISTIC_FALLBACK`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(model) = lookup("IDEAFORGE_MODEL") {
            self.model = model;
        }
        if let Some(url) = lookup("IDEAFORGE_OLLAMA_URL") {
            self.ollama_base_url = url;
        }
        if let Some(temperature) = lookup("IDEAFORGE_TEMPERATURE") {
            match temperature.parse() {
                Ok(parsed) => self.temperature = parsed,
                Err(_) => tracing::warn!(
                    value = %temperature,
                    "ignoring unparseable IDEAFORGE_TEMPERATURE"
                ),
            }
        }
        if let Some(dir) = lookup("IDEAFORGE_PROMPTS_DIR") {
            self.prompts_dir = PathBuf::from(dir);
        }
        if let Some(url) = lookup("IDEAFORGE_STORE_URL") {
            self.store.base_url = Some(url);
        }
        if let Some(key) = lookup("IDEAFORGE_STORE_KEY") {
            self.store.service_key = Some(key);
        }
        if let Some(table) = lookup("IDEAFORGE_STORE_TABLE") {
            self.store.table = table;
        }
        if let Some(flag) = lookup("IDEAFORGE_DETERMINISTIC_FALLBACK") {
            self.deterministic_fallback = flag == "true" || flag == "1";
        }
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }
}

/// Load configuration from `{config_dir}/ideaforge.toml`.
///
/// - Missing file: returns [`ForgeConfig::default()`].
/// - Unreadable or malformed file: logs a warning and returns the default.
pub async fn load_config(config_dir: &Path) -> ForgeConfig {
    let config_path = config_dir.join("ideaforge.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(
                "no ideaforge.toml at {}, using defaults",
                config_path.display()
            );
            return ForgeConfig::default();
        }
        Err(err) => {
            tracing::warn!(
                "failed to read {}: {err}, using defaults",
                config_path.display()
            );
            return ForgeConfig::default();
        }
    };

    match toml::from_str::<ForgeConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            ForgeConfig::default()
        }
    }
}
