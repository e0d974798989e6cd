//! preftree: a hierarchical, observable preferences store
//!
//! A tree of named nodes holding key/value pairs, change notification for
//! node and value events, and a binding engine that keeps fields of
//! application objects in sync with the tree.

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod util;

pub use application::binding::{
    shared, Bindable, KeyResolutionStrategy, Preference, PreferencesManager, SharedInstance,
};
pub use domain::{Node, PrefValue, Preferences};
