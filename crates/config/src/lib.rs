//! Configuration for narrata
//!
//! Settings are layered from `config/default.yaml`, an optional
//! environment-specific file, and `NARRATA__`-prefixed environment
//! variables.

mod settings;

pub use settings::{
    load_settings, PipelineSettings, RefinerSettings, ServerSettings, Settings, StorageSettings,
};

use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
