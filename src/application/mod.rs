//! Application layer: binding engine, persistence and lifecycle
//!
//! This layer orchestrates domain logic and depends on I/O boundary traits.

pub mod binding;
pub mod error;
pub mod error_ext;
pub mod lifecycle;
pub mod services;

pub use error::{ApplicationError, ApplicationResult};
pub use error_ext::IoResultExt;
pub use lifecycle::{Flow, LifecycleEvent, PreferencesLifecycle};
