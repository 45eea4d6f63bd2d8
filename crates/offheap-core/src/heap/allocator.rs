//! Unmanaged object construction
//!
//! Each operation performs exactly one raw allocation, owned by the returned
//! [`UnmanagedAllocationHandle`]. The header is fully written before an
//! [`ObjectRef`] exists, and any failure after the raw allocation drops the
//! handle, which frees the memory before the error reaches the caller.

use std::mem;
use std::sync::Arc;

use tracing::{debug, trace};

use super::handle::UnmanagedAllocationHandle;
use super::metadata::{TypeDescriptor, TypeMetadata, TypeMetadataProvider};
use super::object::ObjectRef;
use super::raw::{RawMemory, SystemHeap};
use crate::error::{Error, Result};
use crate::memory::ObjectHeader;

/// Handle and object produced by an allocation
pub type Allocation = (UnmanagedAllocationHandle, ObjectRef);

pub struct UnmanagedHeapAllocator<P: TypeMetadataProvider> {
    provider: P,
    heap: Arc<dyn RawMemory>,
}

impl<P: TypeMetadataProvider> UnmanagedHeapAllocator<P> {
    pub fn new(provider: P) -> Self {
        Self::with_heap(provider, Arc::new(SystemHeap))
    }

    pub fn with_heap(provider: P, heap: Arc<dyn RawMemory>) -> Self {
        Self { provider, heap }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Zeroed instance of `ty`, no constructor run
    pub fn uninitialized_allocation(&self, ty: &TypeDescriptor) -> Result<Allocation> {
        let metadata = self.metadata_for(ty)?;
        let handle =
            UnmanagedAllocationHandle::allocate(self.heap.clone(), metadata.total_instance_size)?;
        let payload = handle.payload_ptr();

        let object = stamp_header(&handle, &metadata);
        // SAFETY: the payload span lies inside the allocation.
        unsafe {
            handle
                .heap()
                .zero_fill(payload, metadata.total_instance_size - header_size())
        };

        trace!("Uninitialized {} at {:?}", ty, object);
        Ok((handle, object))
    }

    pub fn uninitialized_allocation_of<T: 'static>(&self) -> Result<Allocation> {
        self.uninitialized_allocation(&TypeDescriptor::of::<T>())
    }

    /// Equivalent of `new T()`: zeroed instance, then the parameterless
    /// constructor called directly on it
    pub fn allocate(&self, ty: &TypeDescriptor) -> Result<Allocation> {
        let (handle, object) = self.uninitialized_allocation(ty)?;
        let ctor = self.provider.resolve_constructor(ty, &[])?;

        debug!("Invoking {}() at {:#x}", ty, ctor.address());
        // SAFETY: the provider vouches for the entry point and the object is
        // fully initialized.
        unsafe { ctor.invoke(object) };
        Ok((handle, object))
    }

    pub fn allocate_of<T: 'static>(&self) -> Result<Allocation> {
        self.allocate(&TypeDescriptor::of::<T>())
    }

    /// Equivalent of `new T(arg0)`, picking the constructor whose single
    /// parameter has the type of `arg0`.
    ///
    /// `arg0` crosses a C-ABI call, so it must be plain data: a primitive,
    /// a raw pointer or a `#[repr(C)]` `Copy` struct. Owning types are
    /// rejected at compile time:
    ///
    /// ```compile_fail
    /// use offheap_core::{TypeRegistry, UnmanagedHeapAllocator};
    ///
    /// let allocator = UnmanagedHeapAllocator::new(TypeRegistry::new());
    /// let _ = allocator.allocate_with_of::<u64, String>(String::from("seed"));
    /// ```
    pub fn allocate_with<A: Copy + 'static>(
        &self,
        ty: &TypeDescriptor,
        arg0: A,
    ) -> Result<Allocation> {
        let (handle, object) = self.uninitialized_allocation(ty)?;
        let arg_type = TypeDescriptor::of::<A>();
        let ctor = self.provider.resolve_constructor(ty, &[arg_type])?;

        debug!("Invoking {}({}) at {:#x}", ty, arg_type, ctor.address());
        // SAFETY: as in allocate(); the provider matched the parameter type to A.
        unsafe { ctor.invoke_with(object, arg0) };
        Ok((handle, object))
    }

    pub fn allocate_with_of<T: 'static, A: Copy + 'static>(
        &self,
        arg0: A,
    ) -> Result<Allocation> {
        self.allocate_with(&TypeDescriptor::of::<T>(), arg0)
    }

    /// Object-shaped copy of a value.
    ///
    /// Exactly `payload_size` bytes of the value's representation are copied;
    /// any remaining instance bytes are zeroed.
    pub fn box_value<T: Copy + 'static>(&self, value: T) -> Result<Allocation> {
        let ty = TypeDescriptor::of::<T>();
        let metadata = self.metadata_for(&ty)?;
        if metadata.payload_size > mem::size_of::<T>() {
            return Err(Error::type_resolution(
                ty.name(),
                format!(
                    "payload size {} exceeds the {}-byte value",
                    metadata.payload_size,
                    mem::size_of::<T>()
                ),
            ));
        }

        let handle =
            UnmanagedAllocationHandle::allocate(self.heap.clone(), metadata.total_instance_size)?;
        let payload = handle.payload_ptr();
        let capacity = metadata.total_instance_size - header_size();
        let src = (&value as *const T).cast::<u8>();

        let object = stamp_header(&handle, &metadata);
        // SAFETY: payload_size <= size_of::<T>() and <= capacity, both checked above.
        unsafe {
            handle.heap().copy(payload, src, metadata.payload_size);
            handle.heap().zero_fill(
                payload.add(metadata.payload_size),
                capacity - metadata.payload_size,
            );
        }

        trace!("Boxed {} at {:?}", ty, object);
        Ok((handle, object))
    }

    fn metadata_for(&self, ty: &TypeDescriptor) -> Result<TypeMetadata> {
        let metadata = self.provider.resolve_metadata(ty)?;
        metadata.validate(ty)?;
        Ok(metadata)
    }
}

fn header_size() -> usize {
    mem::size_of::<ObjectHeader>()
}

/// Write sync slot and metadata pointer, then hand out the reference
fn stamp_header(handle: &UnmanagedAllocationHandle, metadata: &TypeMetadata) -> ObjectRef {
    let header = handle.header_ptr();
    // SAFETY: the allocation is at least one header long and header-aligned.
    unsafe { header.as_ptr().write(ObjectHeader::new(metadata.handle.as_ptr())) };
    ObjectRef::from_header(header)
}
