//! The preferences tree: root node, path routing and listener registration.

use std::sync::Arc;

use tracing::debug;

use crate::domain::convert::ConverterRegistry;
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::event::{
    ChangeNotifier, ListenerId, NodeChangeListener, PreferenceChangeListener,
};
use crate::domain::node::{Node, TreeShared};
use crate::domain::path;

/// A tree of preference nodes. Clones share the same tree.
#[derive(Debug, Clone)]
pub struct Preferences {
    root: Node,
    shared: Arc<TreeShared>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self::new()
    }
}

impl Preferences {
    pub fn new() -> Self {
        Self::with_converters(Arc::new(ConverterRegistry::with_builtins()))
    }

    pub fn with_converters(converters: Arc<ConverterRegistry>) -> Self {
        let shared = Arc::new(TreeShared {
            notifier: Arc::new(ChangeNotifier::new()),
            converters,
        });
        Self {
            root: Node::new_root(Arc::clone(&shared)),
            shared,
        }
    }

    pub fn root(&self) -> Node {
        self.root.clone()
    }

    /// Resolves `path`, creating missing nodes. `""` and `"/"` yield the root.
    pub fn node(&self, path: &str) -> DomainResult<Node> {
        self.root.node(path)
    }

    pub fn find_node(&self, path: &str) -> Option<Node> {
        self.root.find_node(path)
    }

    pub fn contains_node(&self, path: &str) -> bool {
        self.root.contains_node(path)
    }

    /// Detaches a node and its subtree. Removing the root is an error.
    pub fn remove_node(&self, path: &str) -> DomainResult<Option<Node>> {
        if path::segments(path).is_empty() {
            return Err(DomainError::InvalidPath(
                "the root node cannot be removed".to_string(),
            ));
        }
        self.root.remove_node(path)
    }

    pub fn node_for<T: ?Sized>(&self) -> DomainResult<Node> {
        self.root.node_for::<T>()
    }

    pub fn contains_node_for<T: ?Sized>(&self) -> bool {
        self.root.contains_node_for::<T>()
    }

    pub fn remove_node_for<T: ?Sized>(&self) -> DomainResult<Option<Node>> {
        self.root.remove_node_for::<T>()
    }

    /// An independent tree with the same content and converters, and no listeners.
    pub fn copy(&self) -> Preferences {
        let copy = Preferences::with_converters(Arc::clone(&self.shared.converters));
        copy.root.merge(&self.root);
        debug!("copy: {} top-level node(s)", copy.root.child_names().len());
        copy
    }

    pub fn converters(&self) -> &Arc<ConverterRegistry> {
        &self.shared.converters
    }

    pub fn notifier(&self) -> &Arc<ChangeNotifier> {
        &self.shared.notifier
    }

    pub fn add_node_listener(&self, listener: Arc<dyn NodeChangeListener>) -> ListenerId {
        self.shared.notifier.add_node_listener(listener)
    }

    pub fn remove_node_listener(&self, id: ListenerId) -> bool {
        self.shared.notifier.remove_node_listener(id)
    }

    pub fn add_preference_listener(
        &self,
        listener: Arc<dyn PreferenceChangeListener>,
    ) -> ListenerId {
        self.shared.notifier.add_preference_listener(listener)
    }

    pub fn remove_preference_listener(&self, id: ListenerId) -> bool {
        self.shared.notifier.remove_preference_listener(id)
    }
}
