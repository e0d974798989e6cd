//! Persistence service
//!
//! Walks the preferences tree into and out of a codec's map shape, and reads
//! or writes the preferences file through the filesystem boundary.
//! Nested mappings are child nodes; scalars and flat lists are properties.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Number, Value};
use tracing::{debug, info, instrument, warn};

use crate::application::error_ext::is_not_found;
use crate::application::{ApplicationError, ApplicationResult, IoResultExt};
use crate::domain::path;
use crate::domain::{DomainError, DomainResult, Node, PrefValue, Preferences};
use crate::infrastructure::traits::{Codec, FileSystem, PrefMap};

/// Result of reading the preferences file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The file existed and was merged into the tree.
    Loaded,
    /// No file yet; nothing was stored before.
    Missing,
}

/// Reads and writes the preferences file.
pub struct PersistenceService {
    fs: Arc<dyn FileSystem>,
    codec: Arc<dyn Codec>,
    location: PathBuf,
}

impl PersistenceService {
    pub fn new(fs: Arc<dyn FileSystem>, codec: Arc<dyn Codec>, location: PathBuf) -> Self {
        Self {
            fs,
            codec,
            location,
        }
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn codec(&self) -> &Arc<dyn Codec> {
        &self.codec
    }

    /// Loads the preferences file into the tree. A missing file is not an error.
    #[instrument(level = "debug", skip_all, fields(location = %self.location.display()))]
    pub fn read(&self, preferences: &Preferences) -> ApplicationResult<ReadOutcome> {
        let bytes = match self.fs.read(&self.location) {
            Ok(bytes) => bytes,
            Err(e) if is_not_found(&e) => {
                debug!("read: no preferences file yet");
                return Ok(ReadOutcome::Missing);
            }
            Err(e) => {
                return Err::<ReadOutcome, _>(e).with_path_context("read preferences", &self.location)
            }
        };
        let map = self
            .codec
            .decode(&bytes)
            .with_codec_context(self.codec.name(), "decode", &self.location)?;
        read_into(&preferences.root(), &map)?;
        info!(
            "read {} top-level entries from {}",
            map.len(),
            self.location.display()
        );
        Ok(ReadOutcome::Loaded)
    }

    /// Writes the whole tree to the preferences file.
    #[instrument(level = "debug", skip_all, fields(location = %self.location.display()))]
    pub fn write(&self, preferences: &Preferences) -> ApplicationResult<()> {
        let bytes = export(preferences, self.codec.as_ref())
            .with_codec_context(self.codec.name(), "encode", &self.location)?;
        self.fs
            .write(&self.location, &bytes)
            .with_path_context("write preferences", &self.location)?;
        info!("wrote preferences to {}", self.location.display());
        Ok(())
    }

    /// Merges another file into the tree; `source` values win. Fires no events.
    pub fn import(
        &self,
        preferences: &Preferences,
        source: &Path,
        codec: &dyn Codec,
    ) -> ApplicationResult<()> {
        let bytes = self
            .fs
            .read(source)
            .with_path_context("read import", source)?;
        let map = codec
            .decode(&bytes)
            .with_codec_context(codec.name(), "decode", source)?;
        let staging = Preferences::with_converters(Arc::clone(preferences.converters()));
        read_into(&staging.root(), &map)?;
        preferences.root().merge(&staging.root());
        info!("imported {} into preferences", source.display());
        Ok(())
    }
}

/// Encodes the tree with `codec`.
pub fn export(preferences: &Preferences, codec: &dyn Codec) -> std::io::Result<Vec<u8>> {
    codec.encode(&to_map(&preferences.root()))
}

/// Loads `map` into `node`: mappings become child nodes, everything else a property.
///
/// Change events fire as for any other mutation; listener failures are logged.
pub fn read_into(node: &Node, map: &PrefMap) -> ApplicationResult<()> {
    for (key, value) in map {
        match value {
            Value::Object(children) => {
                let child = match tolerate(node.child_node(key))? {
                    Some(child) => child,
                    None => node.get_child_node(key).ok_or_else(|| {
                        DomainError::InvalidPath(format!("node '{key}' vanished"))
                    })?,
                };
                read_into(&child, children)?;
            }
            other => {
                let pref = to_pref_value(other, &node.path(), key)?;
                tolerate(node.put(key, pref))?;
            }
        }
    }
    Ok(())
}

fn tolerate<T>(result: DomainResult<T>) -> ApplicationResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(DomainError::ListenersFailed { event, failures }) => {
            warn!("{} listener(s) failed on {}", failures.len(), event);
            Ok(None)
        }
        Err(e) => Err(ApplicationError::Domain(e)),
    }
}

fn invalid(node_path: &str, key: &str, message: impl Into<String>) -> DomainError {
    DomainError::InvalidValue {
        path: path::dotted(node_path, key),
        message: message.into(),
    }
}

fn scalar(value: &Value, node_path: &str, key: &str) -> DomainResult<PrefValue> {
    match value {
        Value::Bool(b) => Ok(PrefValue::Bool(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(PrefValue::Int(i)),
            None => n
                .as_f64()
                .map(PrefValue::Float)
                .ok_or_else(|| invalid(node_path, key, format!("unsupported number {n}"))),
        },
        Value::String(s) => Ok(PrefValue::Text(s.clone())),
        Value::Null => Err(invalid(node_path, key, "null is not a preference value")),
        Value::Array(_) => Err(invalid(node_path, key, "nested lists are not supported")),
        Value::Object(_) => Err(invalid(node_path, key, "mappings inside lists are not supported")),
    }
}

fn to_pref_value(value: &Value, node_path: &str, key: &str) -> DomainResult<PrefValue> {
    let Value::Array(items) = value else {
        return scalar(value, node_path, key);
    };
    let list = PrefValue::List(
        items
            .iter()
            .map(|item| scalar(item, node_path, key))
            .collect::<DomainResult<Vec<_>>>()?,
    );
    list.validate()
        .map_err(|message| invalid(node_path, key, message))?;
    Ok(list)
}

/// Snapshot of `node` in codec shape. Callables and non-finite floats are skipped.
pub fn to_map(node: &Node) -> PrefMap {
    let mut map = PrefMap::new();
    let node_path = node.path();
    for (key, value) in node.properties() {
        match to_json(&value) {
            Some(json) => {
                map.insert(key, json);
            }
            None => warn!(
                "skipping {}: {} cannot be persisted",
                path::dotted(&node_path, &key),
                value
            ),
        }
    }
    for child in node.children() {
        map.insert(child.name().to_string(), Value::Object(to_map(&child)));
    }
    map
}

fn to_json(value: &PrefValue) -> Option<Value> {
    match value {
        PrefValue::Bool(b) => Some(Value::Bool(*b)),
        PrefValue::Int(i) => Some(Value::Number((*i).into())),
        PrefValue::Float(f) => Number::from_f64(*f).map(Value::Number),
        PrefValue::Text(s) => Some(Value::String(s.clone())),
        PrefValue::List(items) => items
            .iter()
            .map(to_json)
            .collect::<Option<Vec<_>>>()
            .map(Value::Array),
        PrefValue::Callable(_) => None,
    }
}
