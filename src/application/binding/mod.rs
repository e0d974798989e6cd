//! Binding engine: attribute declarations, descriptor harvesting, the
//! instance store and the manager driving bind, save and re-sync.

pub mod bindable;
pub mod descriptor;
pub mod instance_store;
pub mod manager;
pub mod report;
pub mod resolve;

pub use bindable::{shared, AccessError, AttributeSpec, Bindable, Preference, SharedInstance};
pub use descriptor::{harvest, BindingDescriptor, Harvest, KeyResolutionStrategy};
pub use instance_store::{InstanceEntry, InstanceHandle, InstanceStore};
pub use manager::PreferencesManager;
pub use report::{BindReport, BindingFailure, SaveReport};
