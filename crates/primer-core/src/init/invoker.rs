//! Initializer handles and invocation

use crate::init::{InitRecord, Thrown};
use crate::types::RuntimeType;
use std::fmt;
use std::sync::Arc;

/// Signature of a type initializer routine
pub type InitializerFn = dyn Fn() -> Result<(), Thrown> + Send + Sync;

/// Handle to a type's initializer routine, resolved when the type is linked.
///
/// A handle whose entry point is missing stands for a corrupted image: the
/// type declares an initializer but nothing was linked for it. Invoking such
/// a handle is a fatal engine error.
#[derive(Clone)]
pub struct InitializerHandle {
    entry: Option<Arc<InitializerFn>>,
}

impl InitializerHandle {
    /// Handle for a resolved initializer
    pub fn new<F>(entry: F) -> Self
    where
        F: Fn() -> Result<(), Thrown> + Send + Sync + 'static,
    {
        Self {
            entry: Some(Arc::new(entry)),
        }
    }

    /// Handle whose entry point failed to resolve
    pub fn unresolved() -> Self {
        Self { entry: None }
    }

    /// Whether the entry point is present
    pub fn is_resolved(&self) -> bool {
        self.entry.is_some()
    }
}

impl fmt::Debug for InitializerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitializerHandle")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// Run the initializer of `hub`, if it has one.
///
/// Errors raised by the routine are returned untouched; classifying them is
/// the coordinator's job.
///
/// # Panics
///
/// Panics if the record declares an initializer whose entry point is missing.
pub(crate) fn invoke_initializer(info: &InitRecord, hub: &RuntimeType) -> Result<(), Thrown> {
    if !info.has_initializer() {
        return Ok(());
    }

    // Types defined at run time declare an initializer without a handle
    let Some(handle) = info.initializer() else {
        return Ok(());
    };

    match &handle.entry {
        Some(entry) => entry(),
        None => panic!("No initializer entry point for type {}", hub.name()),
    }
}
