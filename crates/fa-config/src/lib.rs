//! Configuration loading for the assistant's event pipeline
//!
//! Configuration lives in `configuration.yaml` inside a config directory and
//! supports three custom tags:
//!
//! - `!include path` - Include another YAML file
//! - `!secret key` - Substitute from secrets.yaml
//! - `!env_var VAR [default]` - Environment variable substitution
//!
//! # Example
//!
//! ```ignore
//! use fa_config::AssistantConfig;
//!
//! let config = AssistantConfig::load("/config")?;
//! println!("cache ttl: {:?}", config.event_processor.cache_ttl());
//! ```

mod error;
mod loader;
mod secrets;
mod settings;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_yaml, load_yaml_string, YamlLoader};
pub use secrets::Secrets;
pub use settings::{
    AssistantConfig, ConfirmationSettings, EventProcessorSettings, HomeAssistantSettings,
    ScriptSettings, ServerSettings, StorageSettings, CONFIG_FILE,
};

// Re-export serde_yaml::Value for convenience
pub use serde_yaml::Value;
