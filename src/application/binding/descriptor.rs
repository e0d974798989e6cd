//! Binding descriptors and the harvester that produces them.

use std::any::TypeId;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::application::binding::bindable::{AttributeSpec, Bindable};
use crate::application::binding::report::BindingFailure;
use crate::domain::path;
use crate::domain::DomainError;

/// Which type name synthesizes a preference path when no key is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyResolutionStrategy {
    /// The type that declares the attribute (a base struct for inherited ones).
    #[default]
    DeclaringType,
    /// The runtime type of the bound object.
    InstanceType,
}

impl KeyResolutionStrategy {
    /// Parses a configured value, falling back to [`KeyResolutionStrategy::DeclaringType`].
    pub fn parse_lenient(value: &str) -> Self {
        value.parse().unwrap_or_else(|e| {
            warn!("{}; using {}", e, KeyResolutionStrategy::DeclaringType);
            KeyResolutionStrategy::DeclaringType
        })
    }
}

impl FromStr for KeyResolutionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "declaring_type" | "declaring_class" => Ok(Self::DeclaringType),
            "instance_type" | "instance_class" => Ok(Self::InstanceType),
            other => Err(format!("unknown key resolution strategy '{other}'")),
        }
    }
}

impl fmt::Display for KeyResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeclaringType => f.write_str("declaring_type"),
            Self::InstanceType => f.write_str("instance_type"),
        }
    }
}

/// Resolved binding of one attribute to one preference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingDescriptor {
    /// `app.Server.timeout`
    pub qualified_name: String,
    pub attribute: String,
    pub value_type: TypeId,
    pub value_type_name: &'static str,
    /// Dotted reference as resolved.
    pub path: String,
    pub node_path: String,
    pub key: String,
    pub args: Vec<String>,
    pub default_value: Option<String>,
    pub format: Option<String>,
    pub converter: Option<String>,
}

impl BindingDescriptor {
    /// Canonical dotted form, matched against change events.
    pub fn canonical_path(&self) -> String {
        path::dotted(&self.node_path, &self.key)
    }

    /// True when a named converter other than the no-op marker is configured.
    pub fn has_converter_override(&self) -> bool {
        self.converter
            .as_deref()
            .is_some_and(|c| c != crate::domain::NOOP_CONVERTER)
    }
}

/// Outcome of harvesting one object.
#[derive(Debug, Default)]
pub struct Harvest {
    pub descriptors: Vec<BindingDescriptor>,
    pub rejected: Vec<BindingFailure>,
}

/// Collects the descriptors of `instance`, first declaration per name winning.
pub fn harvest(instance: &dyn Bindable, strategy: KeyResolutionStrategy) -> Harvest {
    let mut seen = HashSet::new();
    let mut result = Harvest::default();
    for spec in instance.declared_attributes() {
        if !seen.insert(spec.name.clone()) {
            debug!("harvest: {} shadowed, skipping", spec.name);
            continue;
        }
        match describe(instance.type_name(), &spec, strategy) {
            Ok(descriptor) => {
                debug!(
                    "harvest: {} -> {}",
                    descriptor.qualified_name,
                    descriptor.canonical_path()
                );
                result.descriptors.push(descriptor);
            }
            Err(err) => {
                warn!("harvest: {}", err);
                result.rejected.push(BindingFailure {
                    attribute: qualified_name(spec.declaring_type, &spec.name),
                    path: spec.preference.key.clone(),
                    error: err.into(),
                });
            }
        }
    }
    result
}

fn qualified_name(type_name: &str, attribute: &str) -> String {
    format!("{}.{}", path::qualified_type_name(type_name), attribute)
}

fn describe(
    instance_type: &str,
    spec: &AttributeSpec,
    strategy: KeyResolutionStrategy,
) -> Result<BindingDescriptor, DomainError> {
    let preference = &spec.preference;
    let dotted = match preference.key.as_deref().filter(|k| !k.trim().is_empty()) {
        Some(key) => key.to_string(),
        None => {
            let owner = match strategy {
                KeyResolutionStrategy::DeclaringType => spec.declaring_type,
                KeyResolutionStrategy::InstanceType => instance_type,
            };
            format!("{}.{}", path::type_path(owner), spec.name)
        }
    };
    let parsed = path::parse_dotted(&dotted);
    let key = parsed
        .key
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| {
            DomainError::InvalidPath(format!(
                "'{}' for {} has no key",
                dotted,
                qualified_name(spec.declaring_type, &spec.name)
            ))
        })?;
    Ok(BindingDescriptor {
        qualified_name: qualified_name(spec.declaring_type, &spec.name),
        attribute: spec.name.clone(),
        value_type: spec.value_type,
        value_type_name: spec.value_type_name,
        path: dotted,
        node_path: parsed.node_path,
        key,
        args: preference.args.clone(),
        default_value: preference.default_value.clone(),
        format: preference.format.clone(),
        converter: preference.converter.clone(),
    })
}
