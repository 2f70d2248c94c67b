//! Run-time type initialization
//!
//! Each [`RuntimeType`](crate::types::RuntimeType) owns an [`InitRecord`]
//! holding its initialization state machine:
//!
//! ```text
//! Linked -> BeingInitialized -> FullyInitialized
//!                            \-> InitializationError
//! ```
//!
//! [`ensure_initialized`] drives a record through it under the record's own
//! lock, initializing supertypes first and running the initializer at most
//! once. [`mark_type_reached`] maintains the reachability flags that let the
//! fast path skip types for good once they are initialized.

mod coordinator;
mod error;
mod invoker;
mod reachability;
mod record;

pub use coordinator::ensure_initialized;
pub use error::{InitError, Thrown};
pub use invoker::{InitializerFn, InitializerHandle};
pub use reachability::mark_type_reached;
pub use record::{InitRecord, InitState, RecordError, TypeReached};
