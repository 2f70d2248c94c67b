//! Registry of runtime types

use crate::types::{RegistryError, RuntimeType, TypeBuilder, TypeId};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
struct Entries {
    /// Types in registration order
    types: Vec<Arc<RuntimeType>>,
    /// Type name to index
    by_name: FxHashMap<String, usize>,
    /// Type ID to index
    by_id: FxHashMap<TypeId, usize>,
}

/// Registry of all types known to the runtime
///
/// A type can only be registered after its superclass and interfaces.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    entries: RwLock<Entries>,
}

impl TypeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a built type
    pub fn register(&self, ty: Arc<RuntimeType>) -> Result<TypeId, RegistryError> {
        let mut entries = self.entries.write();

        if entries.by_name.contains_key(ty.name()) {
            return Err(RegistryError::DuplicateType(ty.name().to_string()));
        }
        for parent in ty.super_type().into_iter().chain(ty.interfaces()) {
            if !entries.by_id.contains_key(&parent.id()) {
                return Err(RegistryError::UnknownSupertype {
                    type_name: ty.name().to_string(),
                    missing: parent.name().to_string(),
                });
            }
        }

        let index = entries.types.len();
        let id = ty.id();
        entries.by_name.insert(ty.name().to_string(), index);
        entries.by_id.insert(id, index);
        entries.types.push(ty);
        Ok(id)
    }

    /// Build a type and register it
    pub fn define(&self, builder: TypeBuilder) -> Result<Arc<RuntimeType>, RegistryError> {
        let ty = builder.build()?;
        self.register(ty.clone())?;
        Ok(ty)
    }

    /// Get type by ID
    pub fn get(&self, id: TypeId) -> Option<Arc<RuntimeType>> {
        let entries = self.entries.read();
        entries.by_id.get(&id).map(|&i| entries.types[i].clone())
    }

    /// Get type by name
    pub fn get_by_name(&self, name: &str) -> Option<Arc<RuntimeType>> {
        let entries = self.entries.read();
        entries.by_name.get(name).map(|&i| entries.types[i].clone())
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.entries.read().types.len()
    }

    /// Whether no type is registered
    pub fn is_empty(&self) -> bool {
        self.entries.read().types.is_empty()
    }

    /// Snapshot of all types in registration order
    pub fn types(&self) -> Vec<Arc<RuntimeType>> {
        self.entries.read().types.clone()
    }
}
