//! Type metadata and the type registry

mod registry;
mod runtime_type;

pub use registry::TypeRegistry;
pub use runtime_type::{RuntimeType, TypeBuilder, TypeId, TypeKind};

use crate::init::TypeReached;
use thiserror::Error;

/// Errors from building or registering types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A type with this name is already registered
    #[error("Type {0} is already registered")]
    DuplicateType(String),

    /// A supertype or interface was never registered
    #[error("Type {type_name} refers to unregistered type {missing}")]
    UnknownSupertype {
        /// Type being registered
        type_name: String,
        /// Supertype or interface that is missing
        missing: String,
    },

    /// Interfaces cannot have a superclass
    #[error("Interface {0} cannot extend a class")]
    InterfaceWithSuperclass(String),

    /// Superclass is an interface
    #[error("Type {type_name} cannot extend interface {super_name}")]
    SuperclassIsInterface {
        /// Type being built
        type_name: String,
        /// Offending supertype
        super_name: String,
    },

    /// Implemented type is a class
    #[error("Type {type_name} cannot implement class {iface_name}")]
    NotAnInterface {
        /// Type being built
        type_name: String,
        /// Offending type
        iface_name: String,
    },

    /// Only interfaces declare default methods
    #[error("Class {0} cannot declare default methods")]
    DefaultMethodsOnClass(String),

    /// Both an initializer and a prebuilt record were given
    #[error("Type {0} has both an initializer and a prebuilt record")]
    ConflictingInitializer(String),

    /// A supertype is tracked more strictly than the type
    #[error("Type {type_name} is {own:?} but its supertype {parent_name} is {parent:?}")]
    ReachabilityConstraint {
        /// Type being built
        type_name: String,
        /// Its reachability
        own: TypeReached,
        /// Offending supertype
        parent_name: String,
        /// The supertype's reachability
        parent: TypeReached,
    },
}
