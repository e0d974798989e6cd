//! Registry of live-tracked instances and their bindings.
//!
//! # Invariants
//! - Instances are held weakly; an entry whose instance is gone is stale and
//!   gets pruned lazily on the next snapshot.
//! - One entry per instance: re-registering refreshes the bindings in place
//!   and keeps the handle.
//! - Readers receive snapshots, never a guard into the store.

use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use generational_arena::{Arena, Index};
use indexmap::IndexMap;
use tracing::{debug, instrument};

use crate::application::binding::bindable::{Bindable, SharedInstance};
use crate::application::binding::descriptor::BindingDescriptor;

/// Stable handle of a tracked instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceHandle(Index);

#[derive(Debug)]
pub struct InstanceEntry {
    instance: Weak<Mutex<dyn Bindable>>,
    pub type_name: &'static str,
    /// Canonical dotted path to descriptor, in harvest order.
    pub bindings: IndexMap<String, BindingDescriptor>,
}

impl InstanceEntry {
    pub fn upgrade(&self) -> Option<SharedInstance> {
        self.instance.upgrade()
    }

    pub fn is_stale(&self) -> bool {
        self.instance.strong_count() == 0
    }

    fn holds(&self, instance: &SharedInstance) -> bool {
        Weak::ptr_eq(&self.instance, &Arc::downgrade(instance))
    }
}

#[derive(Debug, Default)]
pub struct InstanceStore {
    entries: RwLock<Arena<Arc<InstanceEntry>>>,
}

impl InstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks `instance` with `descriptors`, refreshing an existing entry.
    #[instrument(level = "debug", skip(self, instance, descriptors))]
    pub fn register(
        &self,
        instance: &SharedInstance,
        type_name: &'static str,
        descriptors: &[BindingDescriptor],
    ) -> InstanceHandle {
        let entry = Arc::new(InstanceEntry {
            instance: Arc::downgrade(instance),
            type_name,
            bindings: descriptors
                .iter()
                .map(|d| (d.canonical_path(), d.clone()))
                .collect(),
        });
        let mut arena = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let existing = arena
            .iter()
            .find(|(_, e)| e.holds(instance))
            .map(|(idx, _)| idx);
        match existing {
            Some(idx) => {
                debug!("register: refreshing {} binding(s)", entry.bindings.len());
                arena[idx] = entry;
                InstanceHandle(idx)
            }
            None => {
                debug!("register: tracking {} binding(s)", entry.bindings.len());
                InstanceHandle(arena.insert(entry))
            }
        }
    }

    pub fn handle_of(&self, instance: &SharedInstance) -> Option<InstanceHandle> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(_, e)| e.holds(instance))
            .map(|(idx, _)| InstanceHandle(idx))
    }

    pub fn contains(&self, instance: &SharedInstance) -> bool {
        self.handle_of(instance).is_some()
    }

    pub fn get(&self, handle: InstanceHandle) -> Option<Arc<InstanceEntry>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(handle.0)
            .cloned()
    }

    pub fn unregister(&self, handle: InstanceHandle) -> bool {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(handle.0)
            .is_some()
    }

    pub fn remove_instance(&self, instance: &SharedInstance) -> Option<InstanceHandle> {
        let handle = self.handle_of(instance)?;
        self.unregister(handle).then_some(handle)
    }

    /// Live entries, in insertion order of their slots. Stale entries are pruned.
    pub fn snapshot(&self) -> Vec<(InstanceHandle, Arc<InstanceEntry>)> {
        let (live, stale): (Vec<_>, Vec<_>) = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(idx, e)| (InstanceHandle(idx), Arc::clone(e)))
            .partition(|(_, e)| !e.is_stale());
        if !stale.is_empty() {
            self.prune();
        }
        live
    }

    /// Drops entries whose instance no longer exists. Returns how many went.
    pub fn prune(&self) -> usize {
        let mut arena = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = arena.len();
        arena.retain(|_, e| !e.is_stale());
        let pruned = before - arena.len();
        if pruned > 0 {
            debug!("prune: dropped {} stale instance(s)", pruned);
        }
        pruned
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
