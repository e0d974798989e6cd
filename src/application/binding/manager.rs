//! Bind and save objects against the preferences tree, and keep tracked
//! instances in sync with it.
//!
//! # Invariants
//! - A shared instance is locked only while its attributes are harvested,
//!   read or written, never across a tree operation.
//! - Tree listeners hold the manager weakly; dropping the last manager handle
//!   unregisters them.
//! - One failing descriptor never stops the remaining ones.

use std::any::Any;
use std::sync::{Arc, MutexGuard, PoisonError, Weak};

use itertools::Itertools;
use tracing::{debug, instrument, warn};

use crate::application::binding::bindable::{AccessError, Bindable, SharedInstance};
use crate::application::binding::descriptor::{harvest, BindingDescriptor, KeyResolutionStrategy};
use crate::application::binding::instance_store::{InstanceEntry, InstanceHandle, InstanceStore};
use crate::application::binding::report::{BindReport, BindingFailure, SaveReport};
use crate::application::binding::resolve::substitute;
use crate::application::{ApplicationError, ApplicationResult};
use crate::domain::event::{ListenerError, ListenerResult};
use crate::domain::path;
use crate::domain::{
    AttributeValue, DomainError, ListenerId, Node, NodeChangeEvent, NodeChangeKind,
    PrefValue, PreferenceChangeEvent, Preferences,
};

/// Binding engine over one preferences tree. Clones share state.
#[derive(Clone)]
pub struct PreferencesManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    preferences: Preferences,
    store: InstanceStore,
    strategy: KeyResolutionStrategy,
    node_listener: ListenerId,
    preference_listener: ListenerId,
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        self.preferences.remove_node_listener(self.node_listener);
        self.preferences
            .remove_preference_listener(self.preference_listener);
    }
}

impl std::fmt::Debug for PreferencesManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreferencesManager")
            .field("strategy", &self.inner.strategy)
            .field("tracked", &self.inner.store.len())
            .finish()
    }
}

fn lock(instance: &SharedInstance) -> MutexGuard<'_, dyn Bindable> {
    instance.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PreferencesManager {
    pub fn new(preferences: Preferences, strategy: KeyResolutionStrategy) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<ManagerInner>| {
            let on_node = weak.clone();
            let node_listener =
                preferences.add_node_listener(Arc::new(move |event: &NodeChangeEvent| {
                    match on_node.upgrade() {
                        Some(inner) => inner.on_node_changed(event),
                        None => Ok(()),
                    }
                }));
            let on_pref = weak.clone();
            let preference_listener = preferences.add_preference_listener(Arc::new(
                move |event: &PreferenceChangeEvent| match on_pref.upgrade() {
                    Some(inner) => inner.on_preference_changed(event),
                    None => Ok(()),
                },
            ));
            ManagerInner {
                preferences,
                store: InstanceStore::new(),
                strategy,
                node_listener,
                preference_listener,
            }
        });
        Self { inner }
    }

    pub fn preferences(&self) -> &Preferences {
        &self.inner.preferences
    }

    pub fn store(&self) -> &InstanceStore {
        &self.inner.store
    }

    pub fn strategy(&self) -> KeyResolutionStrategy {
        self.inner.strategy
    }

    /// Binds an object that is not shared; it is never tracked.
    #[instrument(level = "debug", skip_all, fields(type_name = instance.type_name()))]
    pub fn bind(&self, instance: &mut dyn Bindable) -> BindReport {
        let harvest = harvest(instance, self.inner.strategy);
        let mut report = self.inner.apply_bindings(harvest.descriptors.iter(), |name, value| {
            instance.write_attribute(name, value)
        });
        prepend(&mut report.failures, harvest.rejected);
        report
    }

    /// Binds a shared object and tracks it when it opts into live updates.
    #[instrument(level = "debug", skip_all)]
    pub fn bind_shared(&self, instance: &SharedInstance) -> BindReport {
        let (harvest, type_name, tracked) = {
            let guard = lock(instance);
            (
                harvest(&*guard, self.inner.strategy),
                guard.type_name(),
                guard.tracks_changes(),
            )
        };
        let mut report = self
            .inner
            .apply_bindings(harvest.descriptors.iter(), |name, value| {
                lock(instance).write_attribute(name, value)
            });
        prepend(&mut report.failures, harvest.rejected);
        if tracked {
            report.handle = Some(
                self.inner
                    .store
                    .register(instance, type_name, &harvest.descriptors),
            );
        }
        debug!(
            "bind {}: {} applied, {} skipped, {} failed",
            type_name,
            report.applied.len(),
            report.skipped.len(),
            report.failures.len()
        );
        report
    }

    /// Writes the object's attribute values into the tree.
    #[instrument(level = "debug", skip_all, fields(type_name = instance.type_name()))]
    pub fn save(&self, instance: &dyn Bindable) -> SaveReport {
        let harvest = harvest(instance, self.inner.strategy);
        let values = harvest
            .descriptors
            .into_iter()
            .map(|d| {
                let value = instance.read_attribute(&d.attribute);
                (d, value)
            })
            .collect();
        let mut report = self.inner.store_values(values);
        prepend(&mut report.failures, harvest.rejected);
        report
    }

    #[instrument(level = "debug", skip_all)]
    pub fn save_shared(&self, instance: &SharedInstance) -> SaveReport {
        let (harvest, values) = {
            let guard = lock(instance);
            let mut harvest = harvest(&*guard, self.inner.strategy);
            let values: Vec<_> = std::mem::take(&mut harvest.descriptors)
                .into_iter()
                .map(|d| {
                    let value = guard.read_attribute(&d.attribute);
                    (d, value)
                })
                .collect();
            (harvest, values)
        };
        let mut report = self.inner.store_values(values);
        prepend(&mut report.failures, harvest.rejected);
        report
    }

    pub fn unregister(&self, handle: InstanceHandle) -> bool {
        self.inner.store.unregister(handle)
    }

    pub fn unregister_instance(&self, instance: &SharedInstance) -> Option<InstanceHandle> {
        self.inner.store.remove_instance(instance)
    }

    pub fn is_tracked(&self, instance: &SharedInstance) -> bool {
        self.inner.store.contains(instance)
    }
}

enum Resolved {
    Value(AttributeValue),
    Absent,
}

impl ManagerInner {
    fn converters(&self) -> &crate::domain::ConverterRegistry {
        self.preferences.converters()
    }

    /// Resolves a node, tolerating listener failures of the creation itself.
    fn node(&self, node_path: &str) -> ApplicationResult<Node> {
        match self.preferences.node(node_path) {
            Ok(node) => Ok(node),
            Err(DomainError::ListenersFailed { event, failures }) => {
                warn!("{} listener(s) failed on {}", failures.len(), event);
                self.preferences.find_node(node_path).ok_or_else(|| {
                    DomainError::InvalidPath(format!("node '{node_path}' vanished")).into()
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn apply_bindings<'a, W>(
        &self,
        descriptors: impl IntoIterator<Item = &'a BindingDescriptor>,
        mut write: W,
    ) -> BindReport
    where
        W: FnMut(&str, AttributeValue) -> Result<(), AccessError>,
    {
        let mut report = BindReport::default();
        for descriptor in descriptors {
            let outcome = match self.resolve_binding(descriptor) {
                Ok(Resolved::Value(value)) => write(descriptor.attribute.as_str(), value)
                    .map(|()| true)
                    .map_err(ApplicationError::from),
                Ok(Resolved::Absent) => Ok(false),
                Err(e) => Err(e),
            };
            match outcome {
                Ok(true) => report.applied.push(descriptor.qualified_name.clone()),
                Ok(false) => report.skipped.push(descriptor.qualified_name.clone()),
                Err(error) => {
                    warn!("bind {}: {}", descriptor.qualified_name, error);
                    report.failures.push(BindingFailure {
                        attribute: descriptor.qualified_name.clone(),
                        path: Some(descriptor.path.clone()),
                        error,
                    });
                }
            }
        }
        report
    }

    fn resolve_binding(&self, descriptor: &BindingDescriptor) -> ApplicationResult<Resolved> {
        let node = self.node(&descriptor.node_path)?;
        let raw = match node.get(&descriptor.key) {
            Some(value) => substitute(value, &descriptor.args),
            None => match &descriptor.default_value {
                Some(default) => {
                    let value = PrefValue::text(default.as_str());
                    debug!("bind {}: storing default", descriptor.canonical_path());
                    if let Err(e) = node.put(&descriptor.key, value.clone()) {
                        match e {
                            DomainError::ListenersFailed { event, failures } => {
                                warn!("{} listener(s) failed on {}", failures.len(), event)
                            }
                            other => return Err(other.into()),
                        }
                    }
                    value
                }
                None => return Ok(Resolved::Absent),
            },
        };
        self.to_attribute(descriptor, &raw).map(Resolved::Value)
    }

    /// Converts a resolved value into the declared attribute type.
    fn to_attribute(
        &self,
        descriptor: &BindingDescriptor,
        value: &PrefValue,
    ) -> ApplicationResult<AttributeValue> {
        if !descriptor.has_converter_override() {
            if let Some(native) = value.to_native() {
                if (*native).type_id() == descriptor.value_type {
                    return Ok(native);
                }
            }
        }
        let converter = self
            .converters()
            .resolve(
                descriptor.value_type,
                descriptor.value_type_name,
                descriptor.format.as_deref(),
                descriptor.converter.as_deref(),
            )?
            .ok_or_else(|| {
                DomainError::conversion(descriptor.value_type_name, "no converter registered")
            })?;
        Ok(converter.from_value(value)?)
    }

    /// Maps an attribute value to what gets stored in the tree.
    fn to_pref_value(
        &self,
        descriptor: &BindingDescriptor,
        value: &(dyn Any + Send),
    ) -> ApplicationResult<PrefValue> {
        let opt_in = descriptor.has_converter_override() || descriptor.format.is_some();
        if !opt_in {
            if let Some(native) = PrefValue::from_native(value) {
                return Ok(native);
            }
        }
        let converter = self.converters().resolve(
            descriptor.value_type,
            descriptor.value_type_name,
            descriptor.format.as_deref(),
            descriptor.converter.as_deref(),
        )?;
        match converter {
            Some(converter) => Ok(PrefValue::Text(converter.to_text(value)?)),
            None => Err(DomainError::conversion(
                descriptor.value_type_name,
                "no converter registered",
            )
            .into()),
        }
    }

    fn store_values(
        &self,
        values: Vec<(BindingDescriptor, Result<Option<AttributeValue>, AccessError>)>,
    ) -> SaveReport {
        let mut report = SaveReport::default();
        for (descriptor, value) in values {
            let canonical = descriptor.canonical_path();
            match self.store_value(&descriptor, value) {
                Ok(true) => report.stored.push(canonical),
                Ok(false) => report.removed.push(canonical),
                Err(error) => {
                    warn!("save {}: {}", descriptor.qualified_name, error);
                    report.failures.push(BindingFailure {
                        attribute: descriptor.qualified_name.clone(),
                        path: Some(descriptor.path.clone()),
                        error,
                    });
                }
            }
        }
        report
    }

    /// `Ok(true)` when stored, `Ok(false)` when the key was removed.
    fn store_value(
        &self,
        descriptor: &BindingDescriptor,
        value: Result<Option<AttributeValue>, AccessError>,
    ) -> ApplicationResult<bool> {
        let value = value?;
        let node = self.node(&descriptor.node_path)?;
        let stored = value.is_some();
        let outcome = match value {
            Some(value) => {
                let pref = self.to_pref_value(descriptor, value.as_ref())?;
                node.put(&descriptor.key, pref)
            }
            None => node.remove(&descriptor.key).map(|_| ()),
        };
        match outcome {
            Ok(()) => Ok(stored),
            Err(DomainError::ListenersFailed { event, failures }) => {
                warn!("{} listener(s) failed on {}", failures.len(), event);
                Ok(stored)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn rebind(&self, entry: &InstanceEntry) -> Vec<BindingFailure> {
        let Some(instance) = entry.upgrade() else {
            return Vec::new();
        };
        debug!("re-sync: re-binding {}", entry.type_name);
        self.apply_bindings(entry.bindings.values(), |name, value| {
            lock(&instance).write_attribute(name, value)
        })
        .failures
    }

    fn on_node_changed(&self, event: &NodeChangeEvent) -> ListenerResult {
        if event.kind != NodeChangeKind::Added {
            return Ok(());
        }
        let failures: Vec<BindingFailure> = self
            .store
            .snapshot()
            .into_iter()
            .filter(|(_, entry)| {
                entry
                    .bindings
                    .values()
                    .any(|d| path::is_same_or_descendant(&d.node_path, &event.path))
            })
            .flat_map(|(_, entry)| self.rebind(&entry))
            .collect();
        into_listener_result(failures)
    }

    /// Applies the property's value as it is now, not the event payload,
    /// which an earlier listener may already have superseded.
    fn on_preference_changed(&self, event: &PreferenceChangeEvent) -> ListenerResult {
        let canonical = event.dotted_path();
        let current = self
            .preferences
            .find_node(&event.path)
            .and_then(|node| node.get(&event.key));
        let mut failures = Vec::new();
        for (_, entry) in self.store.snapshot() {
            let Some(descriptor) = entry.bindings.get(&canonical) else {
                continue;
            };
            let Some(instance) = entry.upgrade() else {
                continue;
            };
            debug!("re-sync: {} on {}", canonical, entry.type_name);
            let written = match &current {
                Some(value) => self
                    .to_attribute(descriptor, &substitute(value.clone(), &descriptor.args))
                    .and_then(|value| {
                        lock(&instance)
                            .write_attribute(&descriptor.attribute, value)
                            .map_err(ApplicationError::from)
                    }),
                None => lock(&instance)
                    .clear_attribute(&descriptor.attribute)
                    .map(|cleared| {
                        if !cleared {
                            debug!("re-sync: {} keeps its value", descriptor.qualified_name);
                        }
                    })
                    .map_err(ApplicationError::from),
            };
            if let Err(error) = written {
                warn!("re-sync {}: {}", descriptor.qualified_name, error);
                failures.push(BindingFailure {
                    attribute: descriptor.qualified_name.clone(),
                    path: Some(canonical.clone()),
                    error,
                });
            }
        }
        into_listener_result(failures)
    }
}

fn prepend(failures: &mut Vec<BindingFailure>, mut rejected: Vec<BindingFailure>) {
    rejected.append(failures);
    *failures = rejected;
}

fn into_listener_result(failures: Vec<BindingFailure>) -> ListenerResult {
    if failures.is_empty() {
        return Ok(());
    }
    Err(ListenerError::new(format!(
        "re-sync failed for {}",
        failures
            .iter()
            .map(|f| format!("{} ({})", f.attribute, f.error))
            .join(", ")
    )))
}
