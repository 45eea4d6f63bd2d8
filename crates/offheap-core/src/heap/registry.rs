use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use tracing::debug;

use super::metadata::{ConstructorEntry, TypeDescriptor, TypeMetadata, TypeMetadataProvider};
use crate::error::{Error, Result};

#[derive(Debug)]
struct RegisteredType {
    metadata: TypeMetadata,
    constructors: Vec<(Vec<TypeDescriptor>, ConstructorEntry)>,
}

/// In-process [`TypeMetadataProvider`] fed by the host.
///
/// The host registers what its introspection facility reports for each
/// type: the runtime metadata pointer, instance sizes and constructor entry
/// points keyed by parameter types.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: RwLock<HashMap<TypeDescriptor, RegisteredType>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a type's metadata, keeping known constructors
    pub fn register(&self, ty: TypeDescriptor, metadata: TypeMetadata) -> Result<()> {
        metadata.validate(&ty)?;
        debug!(
            "Registered {} (metadata: {:#x}, size: {}, payload: {})",
            ty,
            metadata.handle.address(),
            metadata.total_instance_size,
            metadata.payload_size
        );

        let mut types = self.types.write().unwrap_or_else(PoisonError::into_inner);
        types
            .entry(ty)
            .and_modify(|registered| registered.metadata = metadata)
            .or_insert(RegisteredType {
                metadata,
                constructors: Vec::new(),
            });
        Ok(())
    }

    pub fn register_type<T: ?Sized + 'static>(&self, metadata: TypeMetadata) -> Result<()> {
        self.register(TypeDescriptor::of::<T>(), metadata)
    }

    /// Register the constructor of `ty` taking exactly `args`
    pub fn register_constructor(
        &self,
        ty: TypeDescriptor,
        args: &[TypeDescriptor],
        entry: ConstructorEntry,
    ) -> Result<()> {
        let mut types = self.types.write().unwrap_or_else(PoisonError::into_inner);
        let registered = types
            .get_mut(&ty)
            .ok_or_else(|| Error::type_resolution(ty.name(), "type is not registered"))?;

        match registered
            .constructors
            .iter_mut()
            .find(|(params, _)| params.as_slice() == args)
        {
            Some((_, existing)) => *existing = entry,
            None => registered.constructors.push((args.to_vec(), entry)),
        }
        Ok(())
    }

    pub fn contains(&self, ty: &TypeDescriptor) -> bool {
        self.types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(ty)
    }

    pub fn len(&self) -> usize {
        self.types.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TypeMetadataProvider for TypeRegistry {
    fn resolve_metadata(&self, ty: &TypeDescriptor) -> Result<TypeMetadata> {
        self.types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(ty)
            .map(|registered| registered.metadata)
            .ok_or_else(|| Error::type_resolution(ty.name(), "no metadata registered"))
    }

    fn resolve_constructor(
        &self,
        ty: &TypeDescriptor,
        args: &[TypeDescriptor],
    ) -> Result<ConstructorEntry> {
        let types = self.types.read().unwrap_or_else(PoisonError::into_inner);
        let registered = types
            .get(ty)
            .ok_or_else(|| Error::type_resolution(ty.name(), "no metadata registered"))?;

        registered
            .constructors
            .iter()
            .find(|(params, _)| params.as_slice() == args)
            .map(|(_, entry)| *entry)
            .ok_or_else(|| {
                let params = args
                    .iter()
                    .map(|arg| arg.name())
                    .collect::<Vec<_>>()
                    .join(", ");
                Error::type_resolution(ty.name(), format!("no constructor ({})", params))
            })
    }
}
