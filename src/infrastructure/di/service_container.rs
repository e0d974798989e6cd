//! Service container for dependency injection
//!
//! Wires up all services with their dependencies. Containers are independent:
//! each one owns its own tree, notifier and instance store.

use std::sync::Arc;

use tracing::debug;

use crate::application::binding::PreferencesManager;
use crate::application::services::PersistenceService;
use crate::application::PreferencesLifecycle;
use crate::config::Settings;
use crate::domain::{ConverterRegistry, Preferences};
use crate::infrastructure::traits::{Codec, FileSystem, RealFileSystem};

/// Container holding all application services.
pub struct ServiceContainer {
    /// Application settings
    pub settings: Arc<Settings>,

    /// Filesystem abstraction
    pub fs: Arc<dyn FileSystem>,

    /// Codec of the preferences file
    pub codec: Arc<dyn Codec>,

    pub converters: Arc<ConverterRegistry>,

    /// The preferences tree; clones share the same root
    pub preferences: Preferences,

    pub manager: PreferencesManager,

    pub persistence: Arc<PersistenceService>,

    pub lifecycle: Arc<PreferencesLifecycle>,
}

impl ServiceContainer {
    /// Create a new service container with real implementations.
    pub fn new(settings: Settings) -> Self {
        let codec = settings.persistence.format.codec();
        Self::with_deps(settings, Arc::new(RealFileSystem), codec)
    }

    /// Create a service container with custom dependencies (for testing).
    pub fn with_deps(settings: Settings, fs: Arc<dyn FileSystem>, codec: Arc<dyn Codec>) -> Self {
        let settings = Arc::new(settings);
        let converters = Arc::new(ConverterRegistry::with_builtins());
        let preferences = Preferences::with_converters(Arc::clone(&converters));
        let manager = PreferencesManager::new(preferences.clone(), settings.resolution_strategy());

        let location = settings.preferences_file();
        debug!("container: preferences file {}", location.display());
        let persistence = Arc::new(PersistenceService::new(
            Arc::clone(&fs),
            Arc::clone(&codec),
            location,
        ));
        let lifecycle = Arc::new(PreferencesLifecycle::new(
            manager.clone(),
            Arc::clone(&persistence),
        ));

        Self {
            settings,
            fs,
            codec,
            converters,
            preferences,
            manager,
            persistence,
            lifecycle,
        }
    }
}
