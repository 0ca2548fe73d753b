//! Application configuration for personagraph.
//!
//! User config lives at `~/.personagraph/personagraph.toml`, or wherever
//! `PERSONAGRAPH_CONFIG` points. Every key is optional; missing keys take
//! their defaults. Secrets are read from the environment, never from the file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PersonaGraphError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "personagraph.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".personagraph";

/// Env var overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "PERSONAGRAPH_CONFIG";

// ---------------------------------------------------------------------------
// Config structs (matching personagraph.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Chat-completion model settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Query embedding settings.
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,

    /// Vector index settings.
    #[serde(default)]
    pub vector: VectorConfig,

    /// Local data files.
    #[serde(default)]
    pub data: DataConfig,

    /// Tone selection.
    #[serde(default)]
    pub tone: ToneConfig,

    /// Graph execution.
    #[serde(default)]
    pub graph: GraphConfig,
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_openai_base")]
    pub base_url: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,

    /// Chat model identifier.
    #[serde(default = "default_chat_model")]
    pub model: String,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base(),
            api_key_env: default_openai_key_env(),
            model: default_chat_model(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_openai_base() -> String {
    "https://api.openai.com/v1".into()
}
fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_chat_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.05
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[embeddings]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_openai_base")]
    pub base_url: String,

    /// Name of the env var holding the API key.
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,

    /// Embedding model identifier.
    #[serde(default = "default_embedding_model")]
    pub model: String,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base(),
            api_key_env: default_openai_key_env(),
            model: default_embedding_model(),
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}

/// `[vector]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    /// Index data-plane host, e.g. `https://nico-factual-abc123.svc.pinecone.io`.
    #[serde(default)]
    pub index_host: String,

    /// Name of the env var holding the index API key.
    #[serde(default = "default_vector_key_env")]
    pub api_key_env: String,

    /// Number of matches requested per query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Optional namespace inside the index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            index_host: String::new(),
            api_key_env: default_vector_key_env(),
            top_k: default_top_k(),
            namespace: None,
        }
    }
}

fn default_vector_key_env() -> String {
    "PINECONE_API_KEY".into()
}
fn default_top_k() -> usize {
    10
}

/// `[data]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// JSON file with the dated work-experience records.
    #[serde(default = "default_experience_path")]
    pub experience_path: String,

    /// JSON file with tone example metadata (`[{"texto": ...}]`).
    #[serde(default = "default_tone_examples_path")]
    pub tone_examples_path: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            experience_path: default_experience_path(),
            tone_examples_path: default_tone_examples_path(),
        }
    }
}

fn default_experience_path() -> String {
    "data/temporal_experience.json".into()
}
fn default_tone_examples_path() -> String {
    "data/tone_examples.json".into()
}

/// `[tone]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToneConfig {
    /// Style label handed to synthesis.
    #[serde(default = "default_tone_label")]
    pub label: String,

    /// How many style examples to sample per query.
    #[serde(default = "default_examples_per_prompt")]
    pub examples_per_prompt: usize,

    /// Fixed sampling seed; unset means seeded from entropy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            label: default_tone_label(),
            examples_per_prompt: default_examples_per_prompt(),
            seed: None,
        }
    }
}

fn default_tone_label() -> String {
    "Nico, average tone".into()
}
fn default_examples_per_prompt() -> usize {
    3
}

/// `[graph]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Run independent ready stages concurrently.
    #[serde(default = "default_true")]
    pub concurrent_branches: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            concurrent_branches: true,
        }
    }
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.personagraph/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PersonaGraphError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.personagraph/personagraph.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config. Returns defaults if the file does not exist.
///
/// `PERSONAGRAPH_CONFIG` takes precedence over the home-directory file.
pub fn load_config() -> Result<AppConfig> {
    let path = match std::env::var_os(CONFIG_PATH_ENV) {
        Some(custom) if !custom.is_empty() => PathBuf::from(custom),
        _ => config_file_path()?,
    };

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PersonaGraphError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        PersonaGraphError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Write a default config file unless one already exists.
/// Returns the path either way.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    let path = dir.join(CONFIG_FILE_NAME);
    if path.exists() {
        tracing::info!(?path, "config file already present, left untouched");
        return Ok(path);
    }

    std::fs::create_dir_all(&dir).map_err(|e| PersonaGraphError::io(&dir, e))?;
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PersonaGraphError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PersonaGraphError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a non-empty secret from the env var named `var_name`.
fn read_key(var_name: &str, what: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(PersonaGraphError::config(format!(
            "{what} API key not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Secrets resolved from the environment.
#[derive(Clone)]
pub struct ApiKeys {
    pub llm: String,
    pub embeddings: String,
    pub vector: String,
}

impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKeys { .. }")
    }
}

/// Check that every hosted-service key is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<ApiKeys> {
    let llm = read_key(&config.llm.api_key_env, "language model")?;
    let embeddings = if config.embeddings.api_key_env == config.llm.api_key_env {
        llm.clone()
    } else {
        read_key(&config.embeddings.api_key_env, "embeddings")?
    };
    let vector = read_key(&config.vector.api_key_env, "vector index")?;
    Ok(ApiKeys {
        llm,
        embeddings,
        vector,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("experience_path"));
        assert!(toml_str.contains("OPENAI_API_KEY"));
        assert!(toml_str.contains("PINECONE_API_KEY"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.vector.top_k, 10);
        assert_eq!(parsed.llm.model, "gpt-4o-mini");
        assert_eq!(parsed.tone.examples_per_prompt, 3);
        assert!(parsed.graph.concurrent_branches);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[vector]
index_host = "https://nico-factual.svc.example.io"
top_k = 5

[tone]
seed = 7
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.vector.top_k, 5);
        assert_eq!(config.vector.api_key_env, "PINECONE_API_KEY");
        assert_eq!(config.tone.seed, Some(7));
        assert_eq!(config.tone.label, "Nico, average tone");
        assert_eq!(config.embeddings.model, "text-embedding-3-small");
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.llm.api_key_env = "PG_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }

    #[test]
    fn load_from_file_and_report_bad_toml() {
        let dir = std::env::temp_dir().join(format!("pg-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let good = dir.join("good.toml");
        std::fs::write(&good, "[graph]\nconcurrent_branches = false\n").unwrap();
        let config = load_config_from(&good).unwrap();
        assert!(!config.graph.concurrent_branches);
        assert_eq!(config.vector.top_k, 10);

        let bad = dir.join("bad.toml");
        std::fs::write(&bad, "[vector\ntop_k = ").unwrap();
        let err = load_config_from(&bad).unwrap_err();
        assert!(matches!(err, PersonaGraphError::Config { .. }));
        assert!(err.to_string().contains("bad.toml"));
    }
}
