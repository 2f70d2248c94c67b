//! Runtime type metadata

use crate::init::{self, InitError, InitRecord, InitializerHandle, Thrown};
use crate::types::RegistryError;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Unique identifier for a type
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

static NEXT_TYPE_ID: AtomicU32 = AtomicU32::new(1);

impl TypeId {
    fn next() -> Self {
        TypeId(NEXT_TYPE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

/// Class or interface
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// Concrete or abstract class
    Class,
    /// Interface
    Interface,
}

/// Metadata of a loaded type, plus its initialization record
///
/// Everything except the loaded flag and the record is fixed at build time.
pub struct RuntimeType {
    id: TypeId,
    name: String,
    kind: TypeKind,
    super_type: Option<Arc<RuntimeType>>,
    interfaces: Vec<Arc<RuntimeType>>,

    /// Declares at least one non-abstract, non-static (default) method
    declares_default_methods: bool,

    /// Declares or inherits default methods
    has_default_methods: bool,

    loaded: AtomicBool,
    init: Arc<InitRecord>,
}

impl RuntimeType {
    /// Start building a class named `name`
    pub fn builder(name: impl Into<String>) -> TypeBuilder {
        TypeBuilder::new(name)
    }

    /// Type ID
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Human-readable name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Class or interface
    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    /// Whether this is an interface
    pub fn is_interface(&self) -> bool {
        self.kind == TypeKind::Interface
    }

    /// Direct superclass; None for root types and interfaces
    pub fn super_type(&self) -> Option<&Arc<RuntimeType>> {
        self.super_type.as_ref()
    }

    /// Directly implemented (or, for interfaces, extended) interfaces
    pub fn interfaces(&self) -> &[Arc<RuntimeType>] {
        &self.interfaces
    }

    /// Whether the type itself declares a default method
    pub fn declares_default_methods(&self) -> bool {
        self.declares_default_methods
    }

    /// Whether the type declares or inherits a default method
    pub fn has_default_methods(&self) -> bool {
        self.has_default_methods
    }

    /// Whether the type has been defined by its loader
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    pub(crate) fn define(&self) {
        self.loaded.store(true, Ordering::Release);
    }

    /// The type's initialization record
    pub fn init_record(&self) -> &InitRecord {
        &self.init
    }

    /// Initialize the type if needed.
    ///
    /// Skips the slow path when the record says no check is needed.
    pub fn ensure_initialized(&self) -> Result<(), InitError> {
        if !self.init.requires_slow_path() {
            return Ok(());
        }
        init::ensure_initialized(self)
    }
}

impl fmt::Debug for RuntimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeType")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("super_type", &self.super_type.as_ref().map(|s| s.name()))
            .field(
                "interfaces",
                &self.interfaces.iter().map(|i| i.name()).collect::<Vec<_>>(),
            )
            .field("init", &self.init)
            .finish()
    }
}

/// Builder for [`RuntimeType`]
///
/// Types are built bottom-up: supertypes and interfaces must exist first.
/// By default the type is a loaded, tracked class with no initializer.
pub struct TypeBuilder {
    name: String,
    kind: TypeKind,
    super_type: Option<Arc<RuntimeType>>,
    interfaces: Vec<Arc<RuntimeType>>,
    declares_default_methods: bool,
    loaded: bool,
    tracked: bool,
    initializer: Option<InitializerHandle>,
    record: Option<Arc<InitRecord>>,
}

impl TypeBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Class,
            super_type: None,
            interfaces: Vec::new(),
            declares_default_methods: false,
            loaded: true,
            tracked: true,
            initializer: None,
            record: None,
        }
    }

    /// Build an interface instead of a class
    pub fn interface(mut self) -> Self {
        self.kind = TypeKind::Interface;
        self
    }

    /// Set the superclass
    pub fn extends(mut self, super_type: &Arc<RuntimeType>) -> Self {
        self.super_type = Some(super_type.clone());
        self
    }

    /// Add a direct interface
    pub fn implements(mut self, iface: &Arc<RuntimeType>) -> Self {
        self.interfaces.push(iface.clone());
        self
    }

    /// The type declares a default method (interfaces only)
    pub fn declares_default_methods(mut self) -> Self {
        self.declares_default_methods = true;
        self
    }

    /// The type is not defined yet; it is defined when first initialized
    pub fn unloaded(mut self) -> Self {
        self.loaded = false;
        self
    }

    /// Do not track reachability for this type
    pub fn untracked(mut self) -> Self {
        self.tracked = false;
        self
    }

    /// Initializer routine to run on first initialization
    pub fn initializer<F>(self, entry: F) -> Self
    where
        F: Fn() -> Result<(), Thrown> + Send + Sync + 'static,
    {
        self.initializer_handle(InitializerHandle::new(entry))
    }

    /// Initializer handle to run on first initialization
    pub fn initializer_handle(mut self, handle: InitializerHandle) -> Self {
        self.initializer = Some(handle);
        self
    }

    /// Use a prebuilt record instead of a fresh linked one
    pub fn record(mut self, record: Arc<InitRecord>) -> Self {
        self.record = Some(record);
        self
    }

    /// Validate and build the type
    pub fn build(self) -> Result<Arc<RuntimeType>, RegistryError> {
        let name = self.name;

        if let Some(super_type) = &self.super_type {
            if self.kind == TypeKind::Interface {
                return Err(RegistryError::InterfaceWithSuperclass(name));
            }
            if super_type.is_interface() {
                return Err(RegistryError::SuperclassIsInterface {
                    type_name: name,
                    super_name: super_type.name().to_string(),
                });
            }
        }
        if let Some(iface) = self.interfaces.iter().find(|i| !i.is_interface()) {
            return Err(RegistryError::NotAnInterface {
                type_name: name,
                iface_name: iface.name().to_string(),
            });
        }
        if self.declares_default_methods && self.kind == TypeKind::Class {
            return Err(RegistryError::DefaultMethodsOnClass(name));
        }

        let init = match (self.record, self.initializer) {
            (Some(_), Some(_)) => return Err(RegistryError::ConflictingInitializer(name)),
            (Some(record), None) => record,
            (None, initializer) => InitRecord::new(initializer, self.tracked),
        };

        // Supertypes must be tracked no more strictly than the type itself
        let own = init.type_reached();
        for parent in self.super_type.iter().chain(self.interfaces.iter()) {
            if parent.init_record().type_reached() < own {
                return Err(RegistryError::ReachabilityConstraint {
                    type_name: name,
                    own,
                    parent_name: parent.name().to_string(),
                    parent: parent.init_record().type_reached(),
                });
            }
        }

        let has_default_methods = self.declares_default_methods
            || self.super_type.as_ref().map_or(false, |s| s.has_default_methods())
            || self.interfaces.iter().any(|i| i.has_default_methods());

        Ok(Arc::new(RuntimeType {
            id: TypeId::next(),
            name,
            kind: self.kind,
            super_type: self.super_type,
            interfaces: self.interfaces,
            declares_default_methods: self.declares_default_methods,
            has_default_methods,
            loaded: AtomicBool::new(self.loaded),
            init,
        }))
    }
}
