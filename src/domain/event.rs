//! Change events and their synchronous fan-out.
//!
//! # Invariants
//! - Listeners run on the caller's thread, in registration order.
//! - Dispatch iterates a snapshot, so listeners may register or remove
//!   listeners (or mutate the tree) while being notified.
//! - A failing listener does not stop later ones; failures are collected
//!   and handed back to the notifying caller.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;
use tracing::trace;

use crate::domain::error::{DomainError, DomainResult};
use crate::domain::path;
use crate::domain::value::PrefValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeChangeKind {
    Added,
    Removed,
}

/// A node was attached to or detached from the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeChangeEvent {
    pub path: String,
    pub kind: NodeChangeKind,
}

impl NodeChangeEvent {
    pub fn added(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: NodeChangeKind::Added,
        }
    }

    pub fn removed(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: NodeChangeKind::Removed,
        }
    }
}

impl fmt::Display for NodeChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node {:?} {}", self.kind, self.path)
    }
}

/// A property value changed. `new_value` is `None` on removal.
#[derive(Debug, Clone, PartialEq)]
pub struct PreferenceChangeEvent {
    pub path: String,
    pub key: String,
    pub old_value: Option<PrefValue>,
    pub new_value: Option<PrefValue>,
}

impl PreferenceChangeEvent {
    /// Canonical dotted reference of the changed property (`server.timeout`).
    pub fn dotted_path(&self) -> String {
        path::dotted(&self.path, &self.key)
    }
}

impl fmt::Display for PreferenceChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "preference {}", self.dotted_path())
    }
}

/// Error reported by a listener.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ListenerError(pub String);

impl ListenerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub type ListenerResult = Result<(), ListenerError>;

pub trait NodeChangeListener: Send + Sync {
    fn node_changed(&self, event: &NodeChangeEvent) -> ListenerResult;
}

impl<F> NodeChangeListener for F
where
    F: Fn(&NodeChangeEvent) -> ListenerResult + Send + Sync,
{
    fn node_changed(&self, event: &NodeChangeEvent) -> ListenerResult {
        self(event)
    }
}

pub trait PreferenceChangeListener: Send + Sync {
    fn preference_changed(&self, event: &PreferenceChangeEvent) -> ListenerResult;
}

impl<F> PreferenceChangeListener for F
where
    F: Fn(&PreferenceChangeEvent) -> ListenerResult + Send + Sync,
{
    fn preference_changed(&self, event: &PreferenceChangeEvent) -> ListenerResult {
        self(event)
    }
}

/// Registration token returned by the notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Registry<L> = RwLock<Vec<(ListenerId, Arc<L>)>>;

/// Listener registries for node-lifecycle and key-value events.
#[derive(Default)]
pub struct ChangeNotifier {
    next_id: AtomicU64,
    node_listeners: Registry<dyn NodeChangeListener>,
    preference_listeners: Registry<dyn PreferenceChangeListener>,
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("node_listeners", &self.node_listener_count())
            .field("preference_listeners", &self.preference_listener_count())
            .finish()
    }
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> ListenerId {
        ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn add_node_listener(&self, listener: Arc<dyn NodeChangeListener>) -> ListenerId {
        let id = self.next_id();
        self.node_listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    pub fn remove_node_listener(&self, id: ListenerId) -> bool {
        remove_listener(&self.node_listeners, id)
    }

    pub fn add_preference_listener(
        &self,
        listener: Arc<dyn PreferenceChangeListener>,
    ) -> ListenerId {
        let id = self.next_id();
        self.preference_listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    pub fn remove_preference_listener(&self, id: ListenerId) -> bool {
        remove_listener(&self.preference_listeners, id)
    }

    pub fn node_listener_count(&self) -> usize {
        self.node_listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn preference_listener_count(&self) -> usize {
        self.preference_listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn notify_node_changed(&self, event: &NodeChangeEvent) -> DomainResult<()> {
        trace!("dispatch: {}", event);
        let listeners = snapshot(&self.node_listeners);
        let failures: Vec<ListenerError> = listeners
            .iter()
            .filter_map(|l| l.node_changed(event).err())
            .collect();
        into_result(event.to_string(), failures)
    }

    pub fn notify_preference_changed(&self, event: &PreferenceChangeEvent) -> DomainResult<()> {
        trace!("dispatch: {}", event);
        let listeners = snapshot(&self.preference_listeners);
        let failures: Vec<ListenerError> = listeners
            .iter()
            .filter_map(|l| l.preference_changed(event).err())
            .collect();
        into_result(event.to_string(), failures)
    }
}

fn remove_listener<L: ?Sized>(registry: &Registry<L>, id: ListenerId) -> bool {
    let mut guard = registry.write().unwrap_or_else(PoisonError::into_inner);
    let before = guard.len();
    guard.retain(|(candidate, _)| *candidate != id);
    guard.len() != before
}

fn snapshot<L: ?Sized>(registry: &Registry<L>) -> Vec<Arc<L>> {
    registry
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .map(|(_, l)| Arc::clone(l))
        .collect()
}

fn into_result(event: String, failures: Vec<ListenerError>) -> DomainResult<()> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(DomainError::ListenersFailed { event, failures })
    }
}

/// Merges two dispatch outcomes, keeping every listener failure.
pub(crate) fn combine(first: DomainResult<()>, second: DomainResult<()>) -> DomainResult<()> {
    match (first, second) {
        (Ok(()), other) | (other, Ok(())) => other,
        (
            Err(DomainError::ListenersFailed {
                event,
                mut failures,
            }),
            Err(DomainError::ListenersFailed {
                failures: more, ..
            }),
        ) => {
            failures.extend(more);
            Err(DomainError::ListenersFailed { event, failures })
        }
        (Err(e), _) => Err(e),
    }
}
