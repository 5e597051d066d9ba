//! Typed settings parsed from `configuration.yaml`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::{ConfigError, ConfigResult};
use crate::loader::YamlLoader;

/// Name of the main configuration file inside the config directory
pub const CONFIG_FILE: &str = "configuration.yaml";

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub event_processor: EventProcessorSettings,
    pub script: ScriptSettings,
    /// Home Assistant source; disabled when absent
    pub home_assistant: Option<HomeAssistantSettings>,
    pub storage: StorageSettings,
    pub server: ServerSettings,
    pub confirmation: ConfirmationSettings,
}

impl AssistantConfig {
    /// Load `configuration.yaml` from `config_dir`
    ///
    /// A missing file yields the defaults.
    pub fn load(config_dir: impl AsRef<Path>) -> ConfigResult<Self> {
        let config_dir = config_dir.as_ref();
        let path = config_dir.join(CONFIG_FILE);
        if !path.exists() {
            info!("No {} in {:?}, using defaults", CONFIG_FILE, config_dir);
            return Ok(Self::default());
        }

        let mut loader = YamlLoader::new(config_dir)?;
        let value = loader.load_file(&path)?;
        let config: Self = if value.is_null() {
            Self::default()
        } else {
            serde_yaml::from_value(value).map_err(|e| ConfigError::Schema {
                path: path.clone(),
                source: e,
            })?
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the runtime cannot work with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.script.max_script_bytes == 0 {
            return Err(invalid("script.max_script_bytes", "must be greater than 0"));
        }
        if self.script.timeout_secs <= 0.0 {
            return Err(invalid("script.timeout_secs", "must be positive"));
        }
        if self.event_processor.dispatch_timeout_secs <= 0.0 {
            return Err(invalid(
                "event_processor.dispatch_timeout_secs",
                "must be positive",
            ));
        }
        if let Some(ha) = &self.home_assistant {
            if ha.url.trim().is_empty() {
                return Err(invalid("home_assistant.url", "cannot be empty"));
            }
            if ha.base_reconnect_delay_secs <= 0.0 {
                return Err(invalid(
                    "home_assistant.base_reconnect_delay_secs",
                    "must be positive",
                ));
            }
            if ha.max_reconnect_delay_secs < ha.base_reconnect_delay_secs {
                return Err(invalid(
                    "home_assistant.max_reconnect_delay_secs",
                    "must not be smaller than base_reconnect_delay_secs",
                ));
            }
            if ha.health_check_interval_secs <= 0.0 {
                return Err(invalid(
                    "home_assistant.health_check_interval_secs",
                    "must be positive",
                ));
            }
        }
        Ok(())
    }
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

/// Event processor tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventProcessorSettings {
    /// Listener cache staleness window
    pub cache_ttl_secs: f64,
    /// Window for suppressing identical payloads per listener; 0 disables
    pub dedup_window_ms: u64,
    /// Upper bound on a single action dispatch
    pub dispatch_timeout_secs: f64,
}

impl Default for EventProcessorSettings {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 60.0,
            dedup_window_ms: 0,
            dispatch_timeout_secs: 120.0,
        }
    }
}

impl EventProcessorSettings {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs_f64(self.cache_ttl_secs.max(0.0))
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::from_millis(self.dedup_window_ms)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.dispatch_timeout_secs)
    }
}

/// Script sandbox limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptSettings {
    pub max_script_bytes: usize,
    pub timeout_secs: f64,
    /// Instruction budget per evaluation
    pub fuel: u64,
}

impl Default for ScriptSettings {
    fn default() -> Self {
        Self {
            max_script_bytes: 10 * 1024,
            timeout_secs: 5.0,
            fuel: 100_000,
        }
    }
}

impl ScriptSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs)
    }
}

/// Home Assistant connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomeAssistantSettings {
    /// Base URL, e.g. `http://homeassistant.local:8123`
    pub url: String,
    /// Long-lived access token
    pub token: String,
    #[serde(default = "default_base_delay")]
    pub base_reconnect_delay_secs: f64,
    #[serde(default = "default_max_delay")]
    pub max_reconnect_delay_secs: f64,
    #[serde(default = "default_health_interval")]
    pub health_check_interval_secs: f64,
    /// Silence after which the health loop pings the connection
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: f64,
}

fn default_base_delay() -> f64 {
    1.0
}

fn default_max_delay() -> f64 {
    300.0
}

fn default_health_interval() -> f64 {
    60.0
}

fn default_stale_after() -> f64 {
    300.0
}

impl HomeAssistantSettings {
    pub fn base_reconnect_delay(&self) -> Duration {
        Duration::from_secs_f64(self.base_reconnect_delay_secs)
    }

    pub fn max_reconnect_delay(&self) -> Duration {
        Duration::from_secs_f64(self.max_reconnect_delay_secs)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs_f64(self.health_check_interval_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs_f64(self.stale_after_secs.max(0.0))
    }
}

/// Listener persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Storage directory, relative to the config dir unless absolute
    pub path: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".storage"),
        }
    }
}

impl StorageSettings {
    /// Resolve the storage directory against the config dir
    pub fn resolve(&self, config_dir: &Path) -> PathBuf {
        if self.path.is_absolute() {
            self.path.clone()
        } else {
            config_dir.join(&self.path)
        }
    }
}

/// HTTP surface for webhooks and diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8321".to_string(),
        }
    }
}

/// Tool confirmation waits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationSettings {
    /// Ceiling applied to any requested confirmation timeout
    pub max_timeout_secs: f64,
}

impl Default for ConfirmationSettings {
    fn default() -> Self {
        Self {
            max_timeout_secs: 300.0,
        }
    }
}

impl ConfirmationSettings {
    pub fn max_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.max_timeout_secs.max(0.0))
    }
}
