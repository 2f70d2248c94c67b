//! Primer type initialization engine
//!
//! This crate provides run-time class initialization for a managed runtime:
//! - **Init**: per-type initialization records, the initialization protocol
//!   and reachability tracking (`init` module)
//! - **Types**: runtime type metadata and the type registry (`types` module)
//! - **Scheduler**: carrier threads, cooperative tasks and pinning
//!   (`scheduler` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use primer_core::{RuntimeType, Thrown, TypeRegistry};
//!
//! let registry = TypeRegistry::new();
//! let base = registry.define(RuntimeType::builder("Base"))?;
//! let config = registry.define(
//!     RuntimeType::builder("Config")
//!         .extends(&base)
//!         .initializer(|| load_config().map_err(Thrown::exception)),
//! )?;
//!
//! // Initializes Base, then Config, exactly once
//! config.ensure_initialized()?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// ============================================================================
// Core Modules
// ============================================================================

/// Init module: initialization records and protocol
pub mod init;

/// Scheduler module: carriers, tasks and pinning
pub mod scheduler;

/// Types module: runtime type metadata and registry
pub mod types;

// ============================================================================
// Re-exports
// ============================================================================

pub use init::{
    ensure_initialized, mark_type_reached, InitError, InitRecord, InitState, InitializerHandle,
    RecordError, Thrown, TypeReached,
};
pub use scheduler::{
    current_carrier, pin, CarrierId, PinGuard, Scheduler, SchedulerError, SchedulerOptions,
    TaskHandle,
};
pub use types::{RegistryError, RuntimeType, TypeBuilder, TypeId, TypeKind, TypeRegistry};
