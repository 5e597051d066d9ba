//! Reads `configuration.yaml` and expands its custom tags
//!
//! `!include` paths resolve against the directory of the file that names
//! them. `!secret` reads from `secrets.yaml` in the config directory.
//! `!env_var NAME fallback` uses the fallback only when `NAME` is unset.

use crate::error::{ConfigError, ConfigResult};
use crate::secrets::Secrets;
use serde_yaml::value::TaggedValue;
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

enum Tag {
    Include,
    Secret,
    EnvVar,
}

impl Tag {
    fn parse(tag: &str) -> Option<Self> {
        match tag {
            "!include" => Some(Self::Include),
            "!secret" => Some(Self::Secret),
            "!env_var" => Some(Self::EnvVar),
            _ => None,
        }
    }
}

/// Expands tagged YAML rooted at one config directory
pub struct YamlLoader {
    root: PathBuf,
    secrets: Secrets,
    /// Files being expanded, outermost first
    chain: Vec<PathBuf>,
}

impl YamlLoader {
    /// Loader rooted at `config_dir`; reads `secrets.yaml` eagerly
    pub fn new(config_dir: impl Into<PathBuf>) -> ConfigResult<Self> {
        let root = config_dir.into();
        let secrets = Secrets::load(&root)?;
        Ok(Self {
            root,
            secrets,
            chain: Vec::new(),
        })
    }

    pub fn load_file(&mut self, path: impl AsRef<Path>) -> ConfigResult<Value> {
        let path = absolutize(&self.root, path.as_ref());
        if self.chain.contains(&path) {
            return Err(ConfigError::CircularInclude { path });
        }

        debug!(file = %path.display(), depth = self.chain.len(), "reading config file");
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::ReadFile {
            path: path.clone(),
            source,
        })?;

        self.chain.push(path.clone());
        let expanded = self.load_string(&text, &path);
        self.chain.pop();
        expanded
    }

    /// Parse `text` as if it were read from `origin`
    pub fn load_string(&mut self, text: &str, origin: &Path) -> ConfigResult<Value> {
        let parsed = serde_yaml::from_str(text).map_err(|source| ConfigError::ParseYaml {
            path: origin.to_path_buf(),
            source,
        })?;
        self.expand(parsed, origin)
    }

    fn expand(&mut self, value: Value, origin: &Path) -> ConfigResult<Value> {
        Ok(match value {
            Value::Tagged(tagged) => self.expand_tag(*tagged, origin)?,
            Value::Sequence(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.expand(item, origin)?);
                }
                Value::Sequence(out)
            }
            Value::Mapping(entries) => {
                let mut out = Mapping::with_capacity(entries.len());
                for (key, item) in entries {
                    let item = self.expand(item, origin)?;
                    out.insert(key, item);
                }
                Value::Mapping(out)
            }
            scalar => scalar,
        })
    }

    fn expand_tag(&mut self, tagged: TaggedValue, origin: &Path) -> ConfigResult<Value> {
        let name = tagged.tag.to_string();
        trace!(tag = %name, "expanding tag");

        let Some(tag) = Tag::parse(&name) else {
            return Err(ConfigError::InvalidValue {
                key: name,
                reason: "tag is not one of !include, !secret, !env_var".to_string(),
            });
        };

        match (tag, tagged.value) {
            (Tag::Include, Value::String(target)) => self.include(&target, origin),
            (Tag::Include, other) => Err(ConfigError::InvalidIncludePath {
                path: format!("{other:?}"),
                reason: "expected a file path".to_string(),
            }),
            (Tag::Secret, Value::String(key)) => {
                let secret = self.secrets.get(&key)?;
                Ok(Value::String(secret.to_string()))
            }
            (Tag::Secret, _) => Err(ConfigError::InvalidValue {
                key: "!secret".to_string(),
                reason: "expected a secret name".to_string(),
            }),
            (Tag::EnvVar, Value::String(spec)) => env_var(&spec),
            (Tag::EnvVar, _) => Err(ConfigError::InvalidValue {
                key: "!env_var".to_string(),
                reason: "expected a variable name".to_string(),
            }),
        }
    }

    fn include(&mut self, target: &str, origin: &Path) -> ConfigResult<Value> {
        let base = origin.parent().unwrap_or(&self.root);
        let path = absolutize(base, Path::new(target));
        if !path.is_file() {
            return Err(ConfigError::IncludeNotFound { path });
        }
        self.load_file(path)
    }
}

fn env_var(spec: &str) -> ConfigResult<Value> {
    let mut parts = spec.trim().splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or_default();
    let fallback = parts.next().map(str::trim);

    match std::env::var(name) {
        Ok(set) => Ok(Value::String(set)),
        Err(_) => match fallback {
            Some(fallback) => Ok(Value::String(fallback.to_string())),
            None => Err(ConfigError::EnvVarNotFound {
                var: name.to_string(),
            }),
        },
    }
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Read `file` (relative to `config_dir`) with tags expanded
pub fn load_yaml(config_dir: impl Into<PathBuf>, file: impl AsRef<Path>) -> ConfigResult<Value> {
    YamlLoader::new(config_dir)?.load_file(file)
}

/// Expand tags in an in-memory document; `origin` anchors relative includes
pub fn load_yaml_string(
    config_dir: impl Into<PathBuf>,
    text: &str,
    origin: &str,
) -> ConfigResult<Value> {
    YamlLoader::new(config_dir)?.load_string(text, Path::new(origin))
}
