//! Outcome records of bind and save runs.

use crate::application::binding::instance_store::InstanceHandle;
use crate::application::ApplicationError;

/// A descriptor that could not be processed.
#[derive(Debug)]
pub struct BindingFailure {
    /// `app.Server.timeout`
    pub attribute: String,
    pub path: Option<String>,
    pub error: ApplicationError,
}

#[derive(Debug, Default)]
pub struct BindReport {
    /// Attributes written from the tree.
    pub applied: Vec<String>,
    /// Attributes left untouched because no value and no default exist.
    pub skipped: Vec<String>,
    pub failures: Vec<BindingFailure>,
    /// Set when the instance is tracked for live updates.
    pub handle: Option<InstanceHandle>,
}

impl BindReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct SaveReport {
    /// Keys written to the tree.
    pub stored: Vec<String>,
    /// Keys removed because the attribute held no value.
    pub removed: Vec<String>,
    pub failures: Vec<BindingFailure>,
}

impl SaveReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}
