//! Tree vertices holding preference properties and named children.
//!
//! # Invariants
//! - A node's path is recomputed from its parent chain; the root path is `/`.
//! - The parent owns its children; children only hold a weak back-reference.
//! - Per-node state is guarded by one mutex; events fire after it is released,
//!   with values captured while it was held.
//! - `put` of an unchanged value and `remove` of a missing key fire nothing.

use std::any::type_name;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use indexmap::IndexMap;
use tracing::{debug, instrument};

use crate::domain::convert::ConverterRegistry;
use crate::domain::error::{require_non_blank, DomainError, DomainResult};
use crate::domain::event::{combine, ChangeNotifier, NodeChangeEvent, PreferenceChangeEvent};
use crate::domain::path::{self, PATH_SEPARATOR};
use crate::domain::value::{FromPrefValue, PrefValue};

/// Collaborators shared by every node of one tree.
#[derive(Debug)]
pub(crate) struct TreeShared {
    pub(crate) notifier: Arc<ChangeNotifier>,
    pub(crate) converters: Arc<ConverterRegistry>,
}

#[derive(Default)]
struct NodeState {
    properties: IndexMap<String, PrefValue>,
    children: IndexMap<String, Node>,
}

struct NodeInner {
    name: String,
    parent: Option<Weak<NodeInner>>,
    shared: Arc<TreeShared>,
    state: Mutex<NodeState>,
}

/// Handle to a node. Clones share the node; identity is [`Node::ptr_eq`].
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

/// Deep, detached copy of a subtree, comparable by value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeSnapshot {
    pub name: String,
    pub properties: IndexMap<String, PrefValue>,
    pub children: IndexMap<String, NodeSnapshot>,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("path", &self.path())
            .field("keys", &self.keys())
            .finish()
    }
}

impl Node {
    pub(crate) fn new_root(shared: Arc<TreeShared>) -> Self {
        Self {
            inner: Arc::new(NodeInner {
                name: PATH_SEPARATOR.to_string(),
                parent: None,
                shared,
                state: Mutex::new(NodeState::default()),
            }),
        }
    }

    fn new_child(&self, name: &str) -> Self {
        Self {
            inner: Arc::new(NodeInner {
                name: name.to_string(),
                parent: Some(Arc::downgrade(&self.inner)),
                shared: Arc::clone(&self.inner.shared),
                state: Mutex::new(NodeState::default()),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, NodeState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn notifier(&self) -> &ChangeNotifier {
        &self.inner.shared.notifier
    }

    pub fn converters(&self) -> &Arc<ConverterRegistry> {
        &self.inner.shared.converters
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_root(&self) -> bool {
        self.inner.parent.is_none()
    }

    pub fn parent(&self) -> Option<Node> {
        self.inner
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| Node { inner })
    }

    /// Absolute path built from the parent chain.
    pub fn path(&self) -> String {
        if self.is_root() {
            return PATH_SEPARATOR.to_string();
        }
        let mut names = vec![self.inner.name.clone()];
        let mut current = self.parent();
        while let Some(node) = current {
            if node.is_root() {
                break;
            }
            names.push(node.inner.name.clone());
            current = node.parent();
        }
        names.reverse();
        path::join(&names)
    }

    pub fn ptr_eq(&self, other: &Node) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn is_ancestor_or_self(&self, candidate: &Node) -> bool {
        let mut current = Some(self.clone());
        while let Some(node) = current {
            if node.ptr_eq(candidate) {
                return true;
            }
            current = node.parent();
        }
        false
    }

    // ---- children ----

    /// Resolves `path` relative to this node, creating missing nodes.
    ///
    /// Fires one ADDED event per newly created node, ancestors first.
    #[instrument(level = "debug", skip(self), fields(base = %self.path()))]
    pub fn node(&self, path: &str) -> DomainResult<Node> {
        let mut current = self.clone();
        let mut created = Vec::new();
        for segment in path::segments(path) {
            let next = {
                let mut state = current.state();
                match state.children.get(segment) {
                    Some(child) => child.clone(),
                    None => {
                        let child = current.new_child(segment);
                        state.children.insert(segment.to_string(), child.clone());
                        created.push(child.clone());
                        child
                    }
                }
            };
            current = next;
        }
        let mut outcome = Ok(());
        for node in &created {
            let node_path = node.path();
            debug!("node: created {}", node_path);
            let fired = self
                .notifier()
                .notify_node_changed(&NodeChangeEvent::added(node_path));
            outcome = combine(outcome, fired);
        }
        outcome.map(|()| current)
    }

    /// Looks a relative path up without creating anything.
    pub fn find_node(&self, path: &str) -> Option<Node> {
        let mut current = self.clone();
        for segment in path::segments(path) {
            let next = current.state().children.get(segment).cloned();
            current = next?;
        }
        Some(current)
    }

    pub fn contains_node(&self, path: &str) -> bool {
        self.find_node(path).is_some()
    }

    /// Detaches the node at `path` and its subtree.
    ///
    /// Fires a single REMOVED event for the detached node; descendants are
    /// not reported individually.
    pub fn remove_node(&self, path: &str) -> DomainResult<Option<Node>> {
        let segments = path::segments(path);
        let Some((last, ancestors)) = segments.split_last() else {
            return Err(DomainError::InvalidPath(format!(
                "cannot remove '{}' from itself",
                self.path()
            )));
        };
        let Some(parent) = self.find_node(&path::join(ancestors)) else {
            return Ok(None);
        };
        parent.remove_child_node(last)
    }

    /// A detached child whose parent is this node.
    pub fn create_child_node(&self, name: &str) -> DomainResult<Node> {
        validate_child_name(name)?;
        Ok(self.new_child(name))
    }

    /// Attaches `node` under `name` and fires ADDED.
    pub fn store_child_node(&self, name: &str, node: Node) -> DomainResult<()> {
        validate_child_name(name)?;
        if node.name() != name {
            return Err(DomainError::InvalidPath(format!(
                "child named '{}' cannot be stored as '{}'",
                node.name(),
                name
            )));
        }
        if !node.parent().is_some_and(|p| p.ptr_eq(self)) {
            return Err(DomainError::InvalidPath(format!(
                "'{}' is not a child of '{}'",
                node.path(),
                self.path()
            )));
        }
        if self.is_ancestor_or_self(&node) {
            return Err(DomainError::InvalidPath(format!(
                "storing '{}' would create a cycle",
                node.path()
            )));
        }
        let node_path = node.path();
        self.state().children.insert(name.to_string(), node);
        self.notifier()
            .notify_node_changed(&NodeChangeEvent::added(node_path))
    }

    /// Returns the child called exactly `name`, creating it if missing.
    ///
    /// Unlike [`Node::node`], `name` is not parsed as a path: a blank name or
    /// one containing `/` is rejected. Fires ADDED when the child is created.
    pub fn child_node(&self, name: &str) -> DomainResult<Node> {
        validate_child_name(name)?;
        let (child, created) = {
            let mut state = self.state();
            match state.children.get(name) {
                Some(child) => (child.clone(), false),
                None => {
                    let child = self.new_child(name);
                    state.children.insert(name.to_string(), child.clone());
                    (child, true)
                }
            }
        };
        if !created {
            return Ok(child);
        }
        let child_path = child.path();
        debug!("node: created {}", child_path);
        self.notifier()
            .notify_node_changed(&NodeChangeEvent::added(child_path))
            .map(|()| child)
    }

    /// Detaches the named child and fires REMOVED if it existed.
    pub fn remove_child_node(&self, name: &str) -> DomainResult<Option<Node>> {
        let removed = self.state().children.shift_remove(name);
        match removed {
            Some(child) => {
                let child_path = child.path();
                debug!("node: removed {}", child_path);
                self.notifier()
                    .notify_node_changed(&NodeChangeEvent::removed(child_path))
                    .map(|()| Some(child))
            }
            None => Ok(None),
        }
    }

    pub fn get_child_node(&self, name: &str) -> Option<Node> {
        self.state().children.get(name).cloned()
    }

    pub fn children(&self) -> Vec<Node> {
        self.state().children.values().cloned().collect()
    }

    pub fn child_names(&self) -> Vec<String> {
        self.state().children.keys().cloned().collect()
    }

    pub fn node_for<T: ?Sized>(&self) -> DomainResult<Node> {
        self.node(&path::type_path(type_name::<T>()))
    }

    pub fn contains_node_for<T: ?Sized>(&self) -> bool {
        self.contains_node(&path::type_path(type_name::<T>()))
    }

    pub fn remove_node_for<T: ?Sized>(&self) -> DomainResult<Option<Node>> {
        self.remove_node(&path::type_path(type_name::<T>()))
    }

    // ---- properties ----

    pub fn get(&self, key: &str) -> Option<PrefValue> {
        self.state().properties.get(key).cloned()
    }

    pub fn get_or(&self, key: &str, default: PrefValue) -> PrefValue {
        self.get(key).unwrap_or(default)
    }

    /// Exact-variant lookup: a stored value of another variant yields `default`.
    pub fn get_as<T: FromPrefValue>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| T::from_pref(&v))
            .unwrap_or(default)
    }

    /// Lookup through the registry converter for `T`.
    pub fn get_converted<T: 'static>(&self, key: &str, default: T) -> DomainResult<T> {
        match self.get(key) {
            Some(value) => self.converters().convert::<T>(&value, None),
            None => Ok(default),
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.state().properties.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.state().properties.keys().cloned().collect()
    }

    pub fn properties(&self) -> Vec<(String, PrefValue)> {
        self.state()
            .properties
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Stores `value` under `key`; fires a change event unless the value is unchanged.
    pub fn put(&self, key: &str, value: impl Into<PrefValue>) -> DomainResult<()> {
        let key = require_non_blank(key, "preference key")?;
        let value = value.into();
        value.validate().map_err(|message| DomainError::InvalidValue {
            path: path::dotted(&self.path(), key),
            message,
        })?;
        let old = self
            .state()
            .properties
            .insert(key.to_string(), value.clone());
        if old.as_ref() == Some(&value) {
            return Ok(());
        }
        self.notifier()
            .notify_preference_changed(&PreferenceChangeEvent {
                path: self.path(),
                key: key.to_string(),
                old_value: old,
                new_value: Some(value),
            })
    }

    pub fn remove(&self, key: &str) -> DomainResult<Option<PrefValue>> {
        let removed = self.state().properties.shift_remove(key);
        let Some(old) = removed else {
            return Ok(None);
        };
        self.notifier()
            .notify_preference_changed(&PreferenceChangeEvent {
                path: self.path(),
                key: key.to_string(),
                old_value: Some(old.clone()),
                new_value: None,
            })
            .map(|()| Some(old))
    }

    /// Removes every property, firing one removal event per key.
    pub fn clear(&self) -> DomainResult<()> {
        let removed = std::mem::take(&mut self.state().properties);
        let node_path = self.path();
        removed
            .into_iter()
            .map(|(key, old)| {
                self.notifier()
                    .notify_preference_changed(&PreferenceChangeEvent {
                        path: node_path.clone(),
                        key,
                        old_value: Some(old),
                        new_value: None,
                    })
            })
            .fold(Ok(()), combine)
    }

    // ---- structure ----

    pub fn snapshot(&self) -> NodeSnapshot {
        let (properties, children) = {
            let state = self.state();
            (state.properties.clone(), state.children.clone())
        };
        NodeSnapshot {
            name: self.inner.name.clone(),
            properties,
            children: children
                .into_iter()
                .map(|(name, child)| (name, child.snapshot()))
                .collect(),
        }
    }

    /// Copies properties and children of `other` into this node, `other` winning.
    ///
    /// Fires no events. `other` is captured first, so merging the node itself
    /// or one of its descendants terminates.
    pub fn merge(&self, other: &Node) -> Node {
        if !self.ptr_eq(other) {
            let snapshot = other.snapshot();
            self.apply_snapshot(&snapshot);
        }
        self.clone()
    }

    fn apply_snapshot(&self, snapshot: &NodeSnapshot) {
        let children: Vec<(Node, &NodeSnapshot)> = {
            let mut state = self.state();
            for (key, value) in &snapshot.properties {
                state.properties.insert(key.clone(), value.clone());
            }
            snapshot
                .children
                .iter()
                .map(|(name, child_snapshot)| {
                    let child = match state.children.get(name) {
                        Some(existing) => existing.clone(),
                        None => {
                            let created = self.new_child(name);
                            state.children.insert(name.clone(), created.clone());
                            created
                        }
                    };
                    (child, child_snapshot)
                })
                .collect()
        };
        for (child, child_snapshot) in children {
            child.apply_snapshot(child_snapshot);
        }
    }
}

fn validate_child_name(name: &str) -> DomainResult<&str> {
    let name = require_non_blank(name, "node name")?;
    if name.contains(PATH_SEPARATOR) {
        return Err(DomainError::InvalidPath(format!(
            "node name '{name}' must not contain '{PATH_SEPARATOR}'"
        )));
    }
    Ok(name)
}
