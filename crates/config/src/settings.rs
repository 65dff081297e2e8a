//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Refinement pipeline configuration
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// Refiner backend configuration
    #[serde(default)]
    pub refiner: RefinerSettings,

    /// Segment storage configuration
    #[serde(default)]
    pub storage: StorageSettings,
}

impl Settings {
    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.concurrency".to_string(),
                message: "concurrency must be at least 1".to_string(),
            });
        }
        if self.pipeline.chunk_max_chars < self.pipeline.chunk_min_chars {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.chunk_max_chars".to_string(),
                message: format!(
                    "chunk_max_chars ({}) is below chunk_min_chars ({})",
                    self.pipeline.chunk_max_chars, self.pipeline.chunk_min_chars
                ),
            });
        }
        if self.pipeline.heartbeat_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.heartbeat_interval_secs".to_string(),
                message: "heartbeat interval must be at least 1 second".to_string(),
            });
        }
        if self.refiner.base_url.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "refiner.base_url".to_string(),
                message: "refiner base_url must be set".to_string(),
            });
        }
        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Bind host
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Enable permissive CORS (development only)
    #[serde(default)]
    pub cors_permissive: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_permissive: false,
        }
    }
}

/// Refinement pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Maximum simultaneous refine calls
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Maximum characters per chunk
    #[serde(default = "default_chunk_max_chars")]
    pub chunk_max_chars: usize,

    /// Minimum characters per chunk (tuning hint, see chunker docs)
    #[serde(default = "default_chunk_min_chars")]
    pub chunk_min_chars: usize,

    /// Heartbeat interval for streaming consumers (seconds)
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
}

fn default_concurrency() -> usize {
    8
}
fn default_chunk_max_chars() -> usize {
    500
}
fn default_chunk_min_chars() -> usize {
    100
}
fn default_heartbeat_interval() -> u64 {
    2
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            chunk_max_chars: default_chunk_max_chars(),
            chunk_min_chars: default_chunk_min_chars(),
            heartbeat_interval_secs: default_heartbeat_interval(),
        }
    }
}

/// Refiner backend (chat-completions style) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinerSettings {
    /// Backend base URL, e.g. `http://localhost:11434/v1`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key, sent as a bearer token when present
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Completion token limit
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Connect timeout (seconds)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Read timeout for one refine call (seconds)
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:11434/v1".to_string()
}
fn default_model() -> String {
    "gemma3:12b".to_string()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_read_timeout() -> u64 {
    120
}

impl Default for RefinerSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
        }
    }
}

/// Segment storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite database URL; `sqlite::memory:` keeps everything in RAM
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Directory where generated audio files live
    #[serde(default = "default_audio_dir")]
    pub audio_dir: String,
}

fn default_database_url() -> String {
    "sqlite://narrata.db?mode=rwc".to_string()
}
fn default_audio_dir() -> String {
    "audio".to_string()
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            audio_dir: default_audio_dir(),
        }
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (NARRATA__ prefix)
/// 2. config/{env}.yaml (if env specified)
/// 3. config/default.yaml
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("NARRATA")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}
