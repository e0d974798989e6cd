//! Codecs for the persisted preferences file.
//!
//! All formats decode into the same insertion-ordered [`PrefMap`]; the
//! top-level document must be a mapping.

use std::fmt;
use std::io;
use std::str::FromStr;
use std::sync::Arc;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::infrastructure::traits::{Codec, PrefMap};
use crate::infrastructure::InfraError;

fn invalid_data(err: impl std::error::Error + Send + Sync + 'static) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(u8::is_ascii_whitespace)
}

fn into_map(value: Value, format: &str) -> io::Result<PrefMap> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(PrefMap::new()),
        other => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{format} document is not a mapping: {other}"),
        )),
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn extension(&self) -> &'static str {
        ".json"
    }

    fn decode(&self, bytes: &[u8]) -> io::Result<PrefMap> {
        if is_blank(bytes) {
            return Ok(PrefMap::new());
        }
        let value: Value = serde_json::from_slice(bytes).map_err(invalid_data)?;
        into_map(value, self.name())
    }

    fn encode(&self, map: &PrefMap) -> io::Result<Vec<u8>> {
        let mut out = serde_json::to_vec_pretty(map).map_err(invalid_data)?;
        out.push(b'\n');
        Ok(out)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct YamlCodec;

impl Codec for YamlCodec {
    fn name(&self) -> &'static str {
        "yaml"
    }

    fn extension(&self) -> &'static str {
        ".yaml"
    }

    fn decode(&self, bytes: &[u8]) -> io::Result<PrefMap> {
        if is_blank(bytes) {
            return Ok(PrefMap::new());
        }
        let value: Value = serde_yaml::from_slice(bytes).map_err(invalid_data)?;
        into_map(value, self.name())
    }

    fn encode(&self, map: &PrefMap) -> io::Result<Vec<u8>> {
        serde_yaml::to_string(map)
            .map(String::into_bytes)
            .map_err(invalid_data)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TomlCodec;

impl Codec for TomlCodec {
    fn name(&self) -> &'static str {
        "toml"
    }

    fn extension(&self) -> &'static str {
        ".toml"
    }

    fn decode(&self, bytes: &[u8]) -> io::Result<PrefMap> {
        let text = std::str::from_utf8(bytes).map_err(invalid_data)?;
        if text.trim().is_empty() {
            return Ok(PrefMap::new());
        }
        let value: Value = toml::from_str(text).map_err(invalid_data)?;
        into_map(value, self.name())
    }

    fn encode(&self, map: &PrefMap) -> io::Result<Vec<u8>> {
        let value = toml::Value::try_from(map).map_err(invalid_data)?;
        toml::to_string(&value)
            .map(String::into_bytes)
            .map_err(invalid_data)
    }
}

/// Supported on-disk formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Json,
    #[value(alias = "yml")]
    Yaml,
    Toml,
}

impl Format {
    pub fn codec(self) -> Arc<dyn Codec> {
        match self {
            Format::Json => Arc::new(JsonCodec),
            Format::Yaml => Arc::new(YamlCodec),
            Format::Toml => Arc::new(TomlCodec),
        }
    }

    /// Guesses the format from a file extension.
    pub fn from_extension(path: &std::path::Path) -> Option<Format> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(Format::Json),
            "yaml" | "yml" => Some(Format::Yaml),
            "toml" => Some(Format::Toml),
            _ => None,
        }
    }
}

impl FromStr for Format {
    type Err = InfraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "yaml" | "yml" => Ok(Format::Yaml),
            "toml" => Ok(Format::Toml),
            other => Err(InfraError::UnknownFormat(other.to_string())),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Format::Json => "json",
            Format::Yaml => "yaml",
            Format::Toml => "toml",
        })
    }
}
