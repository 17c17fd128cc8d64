//! Application configuration for the synthesizer.
//!
//! User config lives at `~/.sdsynth/sdsynth.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SynthError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "sdsynth.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".sdsynth";

// ---------------------------------------------------------------------------
// Config structs (matching sdsynth.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// File locations.
    #[serde(default)]
    pub paths: PathsConfig,

    /// LLM backend settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Sampling settings per backend call.
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Relevance-check parsing.
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Knowledge base model.
    #[serde(default)]
    pub store: StoreConfig,
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Solution document template (structured markup).
    #[serde(default = "default_template_path")]
    pub template: PathBuf,

    /// Keyed knowledge base file.
    #[serde(default = "default_knowledge_base_path")]
    pub knowledge_base: PathBuf,

    /// Unkeyed document log file.
    #[serde(default = "default_document_log_path")]
    pub document_log: PathBuf,

    /// Directory exports are written to when no explicit path is given.
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            template: default_template_path(),
            knowledge_base: default_knowledge_base_path(),
            document_log: default_document_log_path(),
            export_dir: default_export_dir(),
        }
    }
}

fn default_template_path() -> PathBuf {
    PathBuf::from("template.xml")
}
fn default_knowledge_base_path() -> PathBuf {
    PathBuf::from("knowledge_base.json")
}
fn default_document_log_path() -> PathBuf {
    PathBuf::from("document_log.json")
}
fn default_export_dir() -> PathBuf {
    PathBuf::from(".")
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL of an OpenAI-compatible chat completions API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Fast tier: relevance validation and gap analysis.
    #[serde(default = "default_fast_model")]
    pub fast_model: String,

    /// Large tier: synthesis and refinement.
    #[serde(default = "default_synthesis_model")]
    pub synthesis_model: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            fast_model: default_fast_model(),
            synthesis_model: default_synthesis_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_key_env() -> String {
    "GROQ_API_KEY".into()
}
fn default_base_url() -> String {
    "https://api.groq.com/openai/v1".into()
}
fn default_fast_model() -> String {
    "llama-3.1-8b-instant".into()
}
fn default_synthesis_model() -> String {
    "llama-3.3-70b-versatile".into()
}
fn default_timeout_secs() -> u64 {
    120
}

/// `[generation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_validation_temperature")]
    pub validation_temperature: f32,

    #[serde(default = "default_validation_max_tokens")]
    pub validation_max_tokens: u32,

    #[serde(default = "default_gap_temperature")]
    pub gap_temperature: f32,

    #[serde(default = "default_gap_max_tokens")]
    pub gap_max_tokens: u32,

    /// Low-moderate: biased toward determinism.
    #[serde(default = "default_synthesis_temperature")]
    pub synthesis_temperature: f32,

    /// Lower than synthesis, favoring precise edits.
    #[serde(default = "default_refinement_temperature")]
    pub refinement_temperature: f32,

    /// Output ceiling for synthesis and refinement.
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            validation_temperature: default_validation_temperature(),
            validation_max_tokens: default_validation_max_tokens(),
            gap_temperature: default_gap_temperature(),
            gap_max_tokens: default_gap_max_tokens(),
            synthesis_temperature: default_synthesis_temperature(),
            refinement_temperature: default_refinement_temperature(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

fn default_validation_temperature() -> f32 {
    0.0
}
fn default_validation_max_tokens() -> u32 {
    60
}
fn default_gap_temperature() -> f32 {
    0.1
}
fn default_gap_max_tokens() -> u32 {
    300
}
fn default_synthesis_temperature() -> f32 {
    0.4
}
fn default_refinement_temperature() -> f32 {
    0.3
}
fn default_max_output_tokens() -> u32 {
    4096
}

/// How strictly relevance-classifier responses are parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationPolicy {
    /// Anything not starting with the invalid sentinel is valid.
    #[default]
    Lenient,
    /// The response must be exactly the valid sentinel.
    Strict,
}

/// `[validation]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default)]
    pub policy: ValidationPolicy,
}

/// Which knowledge base model the CLI stores into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreVariant {
    /// CR-keyed records with auto-numbering and conflict detection.
    #[default]
    Keyed,
    /// Append-only list with derived titles.
    Unkeyed,
}

/// `[store]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub variant: StoreVariant,
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.sdsynth/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| SynthError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.sdsynth/sdsynth.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| SynthError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| SynthError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SynthError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content = toml::to_string_pretty(&config).map_err(|e| SynthError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SynthError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the backend credential from the environment variable named in the config.
///
/// Absence is not an error here: generation-dependent actions check for `None`
/// and refuse with a visible warning.
pub fn resolve_api_key(config: &AppConfig) -> Option<String> {
    match std::env::var(&config.llm.api_key_env) {
        Ok(val) if !val.trim().is_empty() => Some(val),
        _ => {
            tracing::debug!(var = %config.llm.api_key_env, "backend credential not set");
            None
        }
    }
}
