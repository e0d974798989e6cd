//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/preftree/preftree.toml`
//! 3. Environment variables: `PREFTREE_*` prefix (`__` separates sections)

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::application::binding::KeyResolutionStrategy;
use crate::application::ApplicationError;
use crate::infrastructure::codec::Format;

pub const DEFAULT_APPLICATION_NAME: &str = "preftree";

/// Where and how the preferences file is stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Codec of the preferences file
    pub format: Format,
    /// Explicit file location; relative paths resolve under the preferences dir
    pub location: Option<PathBuf>,
}

/// Raw persistence config for intermediate parsing (`None` = not specified).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawPersistenceConfig {
    pub format: Option<String>,
    pub location: Option<PathBuf>,
}

/// Raw settings for intermediate parsing.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub application_name: Option<String>,
    pub key_resolution_strategy: Option<String>,
    pub persistence: RawPersistenceConfig,
}

/// Unified configuration for preftree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Names the per-user preferences directory `~/.<application_name>/preferences`
    pub application_name: String,
    /// `declaring_type` or `instance_type`; kept verbatim, parsed leniently
    pub key_resolution_strategy: String,
    pub persistence: PersistenceConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            application_name: DEFAULT_APPLICATION_NAME.to_string(),
            key_resolution_strategy: KeyResolutionStrategy::default().to_string(),
            persistence: PersistenceConfig::default(),
        }
    }
}

/// Expand `~`, `$VAR` and `${VAR}`; on failure the input is returned unchanged.
pub fn expand_env_vars(path: &str) -> String {
    shellexpand::full(path)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| path.to_string())
}

/// Get the XDG config directory for preftree.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", DEFAULT_APPLICATION_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join(format!("{DEFAULT_APPLICATION_NAME}.toml")))
}

fn home_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~"))
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path).map_err(|e| ApplicationError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

fn parse_format(value: &str) -> Result<Format, ApplicationError> {
    value.parse().map_err(|e| ApplicationError::Config {
        message: format!("persistence.format: {e}"),
    })
}

impl Settings {
    /// The configured strategy; unknown values fall back to `declaring_type`.
    pub fn resolution_strategy(&self) -> KeyResolutionStrategy {
        KeyResolutionStrategy::parse_lenient(&self.key_resolution_strategy)
    }

    /// `~/.<application_name>/preferences`
    pub fn preferences_dir(&self) -> PathBuf {
        home_dir()
            .join(format!(".{}", self.application_name))
            .join("preferences")
    }

    /// Resolved location of the preferences file.
    ///
    /// Defaults to `default.<ext>` in [`Settings::preferences_dir`]; a relative
    /// configured location is resolved against that directory.
    pub fn preferences_file(&self) -> PathBuf {
        match &self.persistence.location {
            Some(location) if location.is_absolute() => location.clone(),
            Some(location) => self.preferences_dir().join(location),
            None => self.preferences_dir().join(format!(
                "default{}",
                self.persistence.format.codec().extension()
            )),
        }
    }

    /// Expand shell variables and tilde in path-like fields.
    fn expand_paths(&mut self) {
        if let Some(location) = &self.persistence.location {
            let expanded = expand_env_vars(location.to_string_lossy().as_ref());
            self.persistence.location = Some(PathBuf::from(expanded));
        }
    }

    /// Apply file config onto self; specified values replace.
    fn apply_file(&self, raw: &RawSettings) -> Result<Self, ApplicationError> {
        Ok(Self {
            application_name: raw
                .application_name
                .clone()
                .unwrap_or_else(|| self.application_name.clone()),
            key_resolution_strategy: raw
                .key_resolution_strategy
                .clone()
                .unwrap_or_else(|| self.key_resolution_strategy.clone()),
            persistence: PersistenceConfig {
                format: match raw.persistence.format.as_deref() {
                    Some(format) => parse_format(format)?,
                    None => self.persistence.format,
                },
                location: raw
                    .persistence
                    .location
                    .clone()
                    .or_else(|| self.persistence.location.clone()),
            },
        })
    }

    /// Load settings with layered precedence.
    ///
    /// # Precedence (lowest to highest)
    /// 1. Compiled defaults
    /// 2. Global config: `$XDG_CONFIG_HOME/preftree/preftree.toml`
    /// 3. Environment variables: `PREFTREE_*` prefix
    pub fn load() -> Result<Self, ApplicationError> {
        Self::load_with(global_config_path().as_deref())
    }

    /// Like [`Settings::load`], reading the file layer from `config_file`.
    pub fn load_with(config_file: Option<&Path>) -> Result<Self, ApplicationError> {
        let mut current = Self::default();

        if let Some(path) = config_file {
            if path.exists() {
                debug!("config: loading {}", path.display());
                let raw = load_raw_settings(path)?;
                current = current.apply_file(&raw)?;
            }
        }

        current = Self::apply_env_overrides(current)?;
        current.expand_paths();

        Ok(current)
    }

    /// Apply PREFTREE_* environment variables as explicit overrides.
    fn apply_env_overrides(mut settings: Self) -> Result<Self, ApplicationError> {
        let config = Config::builder()
            .add_source(Environment::with_prefix("PREFTREE").separator("__"))
            .build()
            .map_err(config_err)?;

        if let Ok(val) = config.get_string("application_name") {
            settings.application_name = val;
        }
        if let Ok(val) = config.get_string("key_resolution_strategy") {
            settings.key_resolution_strategy = val;
        }
        if let Ok(val) = config.get_string("persistence.format") {
            settings.persistence.format = parse_format(&val)?;
        }
        if let Ok(val) = config.get_string("persistence.location") {
            settings.persistence.location = Some(PathBuf::from(val));
        }

        Ok(settings)
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# preftree configuration
#
# Locations (by precedence, lowest to highest):
#   Global: ~/.config/preftree/preftree.toml
#   Env:    PREFTREE_* environment variables, e.g. PREFTREE_PERSISTENCE__FORMAT=yaml

# Names the preferences directory ~/.<application_name>/preferences
# application_name = "preftree"

# Path synthesis for attributes without an explicit key:
#   declaring_type - the struct that declares the attribute
#   instance_type  - the runtime type of the bound object
# key_resolution_strategy = "declaring_type"

[persistence]
# json, yaml or toml
# format = "json"

# Preferences file; relative paths resolve under the preferences directory
# location = "default.json"
"#
        .to_string()
    }
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}
