//! Store configuration with layered resolution using figment.
//!
//! Resolution order (highest priority last):
//! 1. Built-in defaults (in-memory backend)
//! 2. Optional TOML file
//! 3. Environment variables: `SPECSTORE_*`, `__` separating nested keys
//!
//! ```toml
//! backend = "relational"
//!
//! [relational]
//! path = "/var/lib/app/store.sqlite3"
//!
//! [key_value]
//! use_double_filter = true
//! ```

use crate::error::DataError;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

const ENV_PREFIX: &str = "SPECSTORE_";

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Boxed to keep `Result<_, ConfigError>` small.
    #[error(transparent)]
    Load(Box<figment::Error>),
    #[error("backend `{backend}` requires `{parameter}`")]
    Missing {
        backend: Backend,
        parameter: &'static str,
    },
    #[error("unknown backend `{0}`; expected relational|document|key_value|memory")]
    UnknownBackend(String),
    #[error("failed to open {backend} session: {source}")]
    Session {
        backend: Backend,
        #[source]
        source: DataError,
    },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Load(Box::new(err))
    }
}

/// Storage backend selected by configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Relational,
    Document,
    KeyValue,
    #[default]
    Memory,
}

impl Backend {
    pub const ALL: [Backend; 4] = [
        Backend::Relational,
        Backend::Document,
        Backend::KeyValue,
        Backend::Memory,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Relational => "relational",
            Self::Document => "document",
            Self::KeyValue => "key_value",
            Self::Memory => "memory",
        }
    }
}

impl Display for Backend {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "relational" | "sql" | "sqlite" => Ok(Self::Relational),
            "document" | "mongo" => Ok(Self::Document),
            "key_value" | "key-value" | "kv" | "redis" => Ok(Self::KeyValue),
            "memory" | "internal" => Ok(Self::Memory),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationalConfig {
    /// SQLite database file; `":memory:"` opens a private in-memory database.
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentConfig {
    #[serde(default)]
    pub database: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValueConfig {
    /// Narrow the key pattern with the specifications before decoding.
    /// The specifications are always re-applied over the decoded models.
    #[serde(default = "default_true")]
    pub use_double_filter: bool,
}

impl Default for KeyValueConfig {
    fn default() -> Self {
        Self {
            use_double_filter: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub level: Option<String>,
    /// Absolute directory for rolling log files; logging stays off when unset.
    #[serde(default)]
    pub dir: Option<String>,
}

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: Backend,
    #[serde(default)]
    pub relational: RelationalConfig,
    #[serde(default)]
    pub document: DocumentConfig,
    #[serde(default)]
    pub key_value: KeyValueConfig,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_true() -> bool {
    true
}

impl StoreConfig {
    /// Loads defaults, then `file` when given, then `SPECSTORE_*` variables.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(StoreConfig::default()));
        if let Some(file) = file {
            figment = figment.merge(Toml::file(file));
        }
        Self::from_figment(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Extracts and validates a configuration from an arbitrary figment.
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: StoreConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Self-contained configuration for `backend` that needs no files or servers.
    pub fn in_memory(backend: Backend) -> Self {
        let mut config = Self {
            backend,
            ..Self::default()
        };
        match backend {
            Backend::Relational => config.relational.path = Some(":memory:".to_string()),
            Backend::Document => config.document.database = Some("specstore".to_string()),
            Backend::KeyValue | Backend::Memory => {}
        }
        config
    }

    /// Rejects configurations missing a parameter the selected backend needs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let missing = match self.backend {
            Backend::Relational if is_blank(&self.relational.path) => Some("relational.path"),
            Backend::Document if is_blank(&self.document.database) => Some("document.database"),
            _ => None,
        };
        match missing {
            Some(parameter) => Err(ConfigError::Missing {
                backend: self.backend,
                parameter,
            }),
            None => Ok(()),
        }
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |value| value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::{Backend, ConfigError, StoreConfig};
    use figment::providers::{Format, Serialized, Toml};
    use figment::Figment;

    fn from_toml(source: &str) -> Result<StoreConfig, ConfigError> {
        StoreConfig::from_figment(
            Figment::from(Serialized::defaults(StoreConfig::default())).merge(Toml::string(source)),
        )
    }

    #[test]
    fn defaults_select_memory_with_double_filter() {
        let config = from_toml("").unwrap();
        assert_eq!(config.backend, Backend::Memory);
        assert!(config.key_value.use_double_filter);
    }

    #[test]
    fn toml_selects_backend_and_parameters() {
        let config = from_toml(
            r#"
            backend = "key_value"

            [key_value]
            use_double_filter = false
            "#,
        )
        .unwrap();
        assert_eq!(config.backend, Backend::KeyValue);
        assert!(!config.key_value.use_double_filter);

        let config = from_toml(
            r#"
            backend = "relational"
            [relational]
            path = ":memory:"
            "#,
        )
        .unwrap();
        assert_eq!(config.relational.path.as_deref(), Some(":memory:"));
    }

    #[test]
    fn missing_backend_parameters_are_rejected() {
        assert!(matches!(
            from_toml("backend = \"relational\""),
            Err(ConfigError::Missing {
                backend: Backend::Relational,
                parameter: "relational.path"
            })
        ));
        assert!(matches!(
            from_toml("backend = \"document\"\n[document]\ndatabase = \"  \""),
            Err(ConfigError::Missing {
                parameter: "document.database",
                ..
            })
        ));
        assert!(matches!(
            from_toml("backend = \"cassandra\""),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn backend_names_parse_with_aliases() {
        assert_eq!("redis".parse::<Backend>().unwrap(), Backend::KeyValue);
        assert_eq!(" SQL ".parse::<Backend>().unwrap(), Backend::Relational);
        assert!("nope".parse::<Backend>().is_err());
        for backend in Backend::ALL {
            assert_eq!(backend.as_str().parse::<Backend>().unwrap(), backend);
            StoreConfig::in_memory(backend).validate().unwrap();
        }
    }
}
