//! `secrets.yaml`, the only place access tokens should be written down

use crate::error::{ConfigError, ConfigResult};
use serde_yaml::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

pub const SECRETS_FILE: &str = "secrets.yaml";

/// Flat name to value table read once per load
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    values: HashMap<String, String>,
}

impl Secrets {
    /// Absence of the file is not an error; every lookup then fails instead
    pub fn load(config_dir: &Path) -> ConfigResult<Self> {
        let path = config_dir.join(SECRETS_FILE);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => return Err(ConfigError::ReadFile { path, source }),
        };

        let table: HashMap<String, Value> =
            serde_yaml::from_str(&text).map_err(|source| ConfigError::ParseYaml {
                path: path.clone(),
                source,
            })?;

        let values: HashMap<_, _> = table
            .into_iter()
            .map(|(name, value)| (name, flatten(value)))
            .collect();
        debug!(count = values.len(), "secrets loaded");
        Ok(Self { values })
    }

    pub fn get(&self, key: &str) -> ConfigResult<&str> {
        match self.values.get(key) {
            Some(value) => Ok(value.as_str()),
            None => Err(ConfigError::SecretNotFound {
                key: key.to_string(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Scalars become their text form; anything nested is re-serialized
fn flatten(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        nested => serde_yaml::to_string(&nested)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}
