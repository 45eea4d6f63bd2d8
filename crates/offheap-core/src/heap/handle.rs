use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use tracing::trace;

use super::object::ObjectRef;
use super::raw::RawMemory;
use crate::error::Result;
use crate::memory::{HeaderLayout, ObjectHeader};

/// Owner of exactly one unmanaged object allocation.
///
/// Dropping or [releasing](UnmanagedAllocationHandle::release) the handle
/// frees the memory once. Object references derived from it dangle
/// afterwards; keeping the handle alive for as long as managed code can
/// reach the object is up to the caller.
pub struct UnmanagedAllocationHandle {
    ptr: NonNull<u8>,
    size: usize,
    heap: Arc<dyn RawMemory>,
}

// SAFETY: the handle exclusively owns its allocation and the heap is Send + Sync.
unsafe impl Send for UnmanagedAllocationHandle {}

impl UnmanagedAllocationHandle {
    /// Allocate `size` raw bytes. Contents are uninitialized until the
    /// engine stamps the header.
    pub(crate) fn allocate(heap: Arc<dyn RawMemory>, size: usize) -> Result<Self> {
        let ptr = heap.allocate(size)?;
        trace!("Allocated {} unmanaged bytes at {:#x}", size, ptr.as_ptr() as usize);
        Ok(Self { ptr, size, heap })
    }

    pub(crate) fn heap(&self) -> &dyn RawMemory {
        self.heap.as_ref()
    }

    pub(crate) fn header_ptr(&self) -> NonNull<ObjectHeader> {
        self.ptr.cast()
    }

    pub(crate) fn payload_ptr(&self) -> *mut u8 {
        crate::memory::payload_pointer(self.header_ptr().as_ptr())
    }

    pub fn address(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Total bytes owned, header included
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn object(&self) -> ObjectRef {
        ObjectRef::from_header(self.header_ptr())
    }

    pub fn header(&self) -> &ObjectHeader {
        // SAFETY: handles only leave the engine after the header is written.
        unsafe { self.header_ptr().as_ref() }
    }

    /// Every byte after the header
    pub fn payload(&self) -> &[u8] {
        let (ptr, len) = self.payload_span();
        // SAFETY: the span lies inside the allocation and was initialized by the engine.
        unsafe { std::slice::from_raw_parts(ptr, len) }
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        let (ptr, len) = self.payload_span();
        // SAFETY: as in payload(), and `&mut self` makes the view exclusive.
        unsafe { std::slice::from_raw_parts_mut(ptr, len) }
    }

    /// Free the allocation now
    pub fn release(self) {
        drop(self);
    }

    fn payload_span(&self) -> (*mut u8, usize) {
        let header = HeaderLayout::NATIVE.header_size();
        (self.payload_ptr(), self.size.saturating_sub(header))
    }
}

impl Drop for UnmanagedAllocationHandle {
    fn drop(&mut self) {
        trace!("Releasing {} unmanaged bytes at {:#x}", self.size, self.address());
        // SAFETY: ptr came from heap.allocate(size) and Drop runs once.
        unsafe { self.heap.free(self.ptr, self.size) }
    }
}

impl fmt::Debug for UnmanagedAllocationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnmanagedAllocationHandle")
            .field("address", &format_args!("{:#x}", self.address()))
            .field("size", &self.size)
            .finish()
    }
}
