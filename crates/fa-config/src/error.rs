use std::path::PathBuf;
use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Why a configuration directory could not be turned into settings
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid YAML: {source}")]
    ParseYaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Well-formed YAML whose shape does not match the settings structs
    #[error("{path} does not match the expected settings: {source}")]
    Schema {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("no secret named '{key}' in secrets.yaml")]
    SecretNotFound { key: String },

    #[error("bad !include target {path}: {reason}")]
    InvalidIncludePath { path: String, reason: String },

    #[error("!include target does not exist: {path}")]
    IncludeNotFound { path: PathBuf },

    /// A file includes itself, directly or through other files
    #[error("include cycle through {path}")]
    CircularInclude { path: PathBuf },

    #[error("environment variable '{var}' is unset and has no fallback")]
    EnvVarNotFound { var: String },

    #[error("{key}: {reason}")]
    InvalidValue { key: String, reason: String },
}
