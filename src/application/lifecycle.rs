//! Ties the preferences tree to an application's object lifecycle.
//!
//! Preferences are read once on init, created objects are bound, destroyed
//! ones unregistered, and the tree is written back on shutdown, but only when
//! the initial read succeeded, so a broken file is never overwritten.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::application::binding::{InstanceHandle, PreferencesManager, SharedInstance};
use crate::application::services::{PersistenceService, ReadOutcome};
use crate::application::ApplicationResult;

/// Signals emitted by the hosting application.
pub enum LifecycleEvent {
    ObjectCreated(SharedInstance),
    ObjectDestroyed(InstanceHandle),
    ObjectDropped(SharedInstance),
    ShutdownRequested,
}

impl std::fmt::Debug for LifecycleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ObjectCreated(_) => f.write_str("ObjectCreated"),
            Self::ObjectDestroyed(handle) => write!(f, "ObjectDestroyed({handle:?})"),
            Self::ObjectDropped(_) => f.write_str("ObjectDropped"),
            Self::ShutdownRequested => f.write_str("ShutdownRequested"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

pub struct PreferencesLifecycle {
    manager: PreferencesManager,
    persistence: Arc<PersistenceService>,
    preferences_were_read: AtomicBool,
}

impl PreferencesLifecycle {
    pub fn new(manager: PreferencesManager, persistence: Arc<PersistenceService>) -> Self {
        Self {
            manager,
            persistence,
            preferences_were_read: AtomicBool::new(false),
        }
    }

    pub fn manager(&self) -> &PreferencesManager {
        &self.manager
    }

    pub fn preferences_were_read(&self) -> bool {
        self.preferences_were_read.load(Ordering::SeqCst)
    }

    /// Reads the preferences file. A missing file counts as a successful read.
    pub fn init(&self) -> ApplicationResult<ReadOutcome> {
        match self.persistence.read(self.manager.preferences()) {
            Ok(outcome) => {
                self.preferences_were_read.store(true, Ordering::SeqCst);
                Ok(outcome)
            }
            Err(e) => {
                warn!("preferences not read, shutdown write disabled: {}", e);
                Err(e)
            }
        }
    }

    pub fn handle(&self, event: LifecycleEvent) -> ApplicationResult<Flow> {
        debug!("lifecycle: {:?}", event);
        match event {
            LifecycleEvent::ObjectCreated(instance) => {
                let report = self.manager.bind_shared(&instance);
                if !report.is_clean() {
                    warn!("bind reported {} failure(s)", report.failures.len());
                }
                Ok(Flow::Continue)
            }
            LifecycleEvent::ObjectDestroyed(handle) => {
                self.manager.unregister(handle);
                Ok(Flow::Continue)
            }
            LifecycleEvent::ObjectDropped(instance) => {
                self.manager.unregister_instance(&instance);
                Ok(Flow::Continue)
            }
            LifecycleEvent::ShutdownRequested => {
                self.shutdown()?;
                Ok(Flow::Stop)
            }
        }
    }

    /// Handles events until shutdown or until the source runs dry.
    pub fn drain(&self, events: impl IntoIterator<Item = LifecycleEvent>) -> ApplicationResult<()> {
        for event in events {
            if self.handle(event)? == Flow::Stop {
                break;
            }
        }
        Ok(())
    }

    /// Writes the tree if the initial read succeeded. Returns whether it wrote.
    pub fn shutdown(&self) -> ApplicationResult<bool> {
        if !self.preferences_were_read() {
            info!("skipping preferences write: initial read did not succeed");
            return Ok(false);
        }
        self.persistence.write(self.manager.preferences())?;
        Ok(true)
    }
}
