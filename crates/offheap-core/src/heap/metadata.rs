//! Type metadata as seen by the allocation engine
//!
//! The engine never introspects types itself. Everything it needs (instance
//! sizes, the runtime's metadata pointer and constructor entry points) comes
//! from a [`TypeMetadataProvider`].

use std::any::TypeId;
use std::ffi::c_void;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ptr::NonNull;
use std::sync::Arc;

use super::object::ObjectRef;
use crate::error::{Error, Result};
use crate::memory::HeaderLayout;

/// Identifies a type across the provider boundary
#[derive(Clone, Copy)]
pub struct TypeDescriptor {
    id: TypeId,
    name: &'static str,
}

impl TypeDescriptor {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeDescriptor {}

impl Hash for TypeDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// The runtime's metadata pointer for a type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetadataHandle(NonNull<c_void>);

// SAFETY: the handle is an opaque address into runtime-owned, immutable metadata.
unsafe impl Send for MetadataHandle {}
// SAFETY: see above.
unsafe impl Sync for MetadataHandle {}

impl MetadataHandle {
    pub fn from_ptr(ptr: *const c_void) -> Option<Self> {
        NonNull::new(ptr.cast_mut()).map(Self)
    }

    pub fn from_address(address: usize) -> Option<Self> {
        Self::from_ptr(address as *const c_void)
    }

    pub fn as_ptr(&self) -> *const c_void {
        self.0.as_ptr()
    }

    pub fn address(&self) -> usize {
        self.0.as_ptr() as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeMetadata {
    pub handle: MetadataHandle,
    /// Header plus payload, in bytes
    pub total_instance_size: usize,
    /// Bytes of field data, never more than `total_instance_size` minus the header
    pub payload_size: usize,
}

impl TypeMetadata {
    pub fn new(handle: MetadataHandle, total_instance_size: usize, payload_size: usize) -> Self {
        Self {
            handle,
            total_instance_size,
            payload_size,
        }
    }

    /// Bytes available after the header
    pub fn payload_capacity(&self) -> usize {
        self.total_instance_size
            .saturating_sub(HeaderLayout::NATIVE.header_size())
    }

    /// Reject metadata that would place the header or payload out of bounds
    pub fn validate(&self, ty: &TypeDescriptor) -> Result<()> {
        let layout = HeaderLayout::NATIVE;
        if self.total_instance_size < layout.min_instance_size() {
            return Err(Error::type_resolution(
                ty.name(),
                format!(
                    "instance size {} is smaller than the {}-byte object header",
                    self.total_instance_size,
                    layout.header_size()
                ),
            ));
        }
        if self.payload_size > self.payload_capacity() {
            return Err(Error::type_resolution(
                ty.name(),
                format!(
                    "payload size {} exceeds instance capacity {}",
                    self.payload_size,
                    self.payload_capacity()
                ),
            ));
        }
        Ok(())
    }
}

/// Raw entry point of a constructor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstructorEntry(NonNull<c_void>);

// SAFETY: an entry point is a code address; calling it is what requires care.
unsafe impl Send for ConstructorEntry {}
// SAFETY: see above.
unsafe impl Sync for ConstructorEntry {}

impl ConstructorEntry {
    pub fn from_ptr(ptr: *const c_void) -> Option<Self> {
        NonNull::new(ptr.cast_mut()).map(Self)
    }

    /// Entry point of a parameterless constructor
    pub fn from_fn(f: unsafe extern "C" fn(*mut c_void)) -> Self {
        // SAFETY: function pointers are never null.
        Self(unsafe { NonNull::new_unchecked(f as *mut c_void) })
    }

    /// Entry point of a single-argument constructor
    pub fn from_fn_with<A: Copy>(f: unsafe extern "C" fn(*mut c_void, A)) -> Self {
        // SAFETY: function pointers are never null.
        Self(unsafe { NonNull::new_unchecked(f as *mut c_void) })
    }

    pub fn address(&self) -> usize {
        self.0.as_ptr() as usize
    }

    /// Call the entry point as `ctor(this)`.
    ///
    /// # Safety
    ///
    /// The entry point must be a parameterless constructor using the C calling
    /// convention, and `this` must be a live object of the type it constructs.
    pub unsafe fn invoke(self, this: ObjectRef) {
        // SAFETY: guaranteed by the caller.
        unsafe {
            let ctor: unsafe extern "C" fn(*mut c_void) = std::mem::transmute(self.0.as_ptr());
            ctor(this.as_ptr());
        }
    }

    /// Call the entry point as `ctor(this, arg0)`.
    ///
    /// # Safety
    ///
    /// As [`ConstructorEntry::invoke`], and the constructor's single
    /// parameter must have the ABI of `A`. `A` must be FFI-safe: a primitive,
    /// a raw pointer or a `#[repr(C)]` plain-data struct.
    pub unsafe fn invoke_with<A: Copy>(self, this: ObjectRef, arg0: A) {
        // SAFETY: guaranteed by the caller.
        unsafe {
            let ctor: unsafe extern "C" fn(*mut c_void, A) = std::mem::transmute_copy(&self.0);
            ctor(this.as_ptr(), arg0);
        }
    }
}

/// Type introspection capability consumed by the allocation engine
pub trait TypeMetadataProvider {
    fn resolve_metadata(&self, ty: &TypeDescriptor) -> Result<TypeMetadata>;

    /// Constructor of `ty` whose parameter types are exactly `args`,
    /// regardless of its visibility
    fn resolve_constructor(
        &self,
        ty: &TypeDescriptor,
        args: &[TypeDescriptor],
    ) -> Result<ConstructorEntry>;
}

impl<P: TypeMetadataProvider + ?Sized> TypeMetadataProvider for &P {
    fn resolve_metadata(&self, ty: &TypeDescriptor) -> Result<TypeMetadata> {
        (**self).resolve_metadata(ty)
    }

    fn resolve_constructor(
        &self,
        ty: &TypeDescriptor,
        args: &[TypeDescriptor],
    ) -> Result<ConstructorEntry> {
        (**self).resolve_constructor(ty, args)
    }
}

impl<P: TypeMetadataProvider + ?Sized> TypeMetadataProvider for Arc<P> {
    fn resolve_metadata(&self, ty: &TypeDescriptor) -> Result<TypeMetadata> {
        (**self).resolve_metadata(ty)
    }

    fn resolve_constructor(
        &self,
        ty: &TypeDescriptor,
        args: &[TypeDescriptor],
    ) -> Result<ConstructorEntry> {
        (**self).resolve_constructor(ty, args)
    }
}
