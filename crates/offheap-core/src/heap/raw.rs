//! Primitive, non-collected memory operations

use std::alloc::{self, Layout};
use std::mem;
use std::ptr::{self, NonNull};

use crate::error::{Error, Result};
use crate::memory::ObjectHeader;

/// Raw heap used for unmanaged objects
pub trait RawMemory: Send + Sync {
    fn allocate(&self, size: usize) -> Result<NonNull<u8>>;

    /// Release an allocation.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `allocate(size)` on this heap and must not have
    /// been freed already.
    unsafe fn free(&self, ptr: NonNull<u8>, size: usize);

    /// # Safety
    ///
    /// `ptr..ptr + len` must be writable.
    unsafe fn zero_fill(&self, ptr: *mut u8, len: usize) {
        // SAFETY: guaranteed by the caller.
        unsafe { ptr::write_bytes(ptr, 0, len) }
    }

    /// # Safety
    ///
    /// `src` must be readable and `dest` writable for `len` bytes, and the
    /// two ranges must not overlap.
    unsafe fn copy(&self, dest: *mut u8, src: *const u8, len: usize) {
        // SAFETY: guaranteed by the caller.
        unsafe { ptr::copy_nonoverlapping(src, dest, len) }
    }
}

/// Process heap via the global allocator, aligned for object headers
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHeap;

impl SystemHeap {
    fn layout(size: usize) -> Result<Layout> {
        if size == 0 {
            return Err(Error::AllocationFailed { size });
        }
        Layout::from_size_align(size, mem::align_of::<ObjectHeader>())
            .map_err(|_| Error::AllocationFailed { size })
    }
}

impl RawMemory for SystemHeap {
    fn allocate(&self, size: usize) -> Result<NonNull<u8>> {
        let layout = Self::layout(size)?;
        // SAFETY: layout has a non-zero size.
        NonNull::new(unsafe { alloc::alloc(layout) }).ok_or(Error::AllocationFailed { size })
    }

    unsafe fn free(&self, ptr: NonNull<u8>, size: usize) {
        // allocate() already accepted this size
        if let Ok(layout) = Self::layout(size) {
            // SAFETY: guaranteed by the caller.
            unsafe { alloc::dealloc(ptr.as_ptr(), layout) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_heap_alignment() {
        let heap = SystemHeap;
        let ptr = heap.allocate(40).unwrap();
        assert_eq!(ptr.as_ptr() as usize % mem::align_of::<ObjectHeader>(), 0);

        // SAFETY: 40 bytes were just allocated.
        unsafe {
            heap.zero_fill(ptr.as_ptr(), 40);
            assert!(std::slice::from_raw_parts(ptr.as_ptr(), 40).iter().all(|&b| b == 0));
            heap.free(ptr, 40);
        }
    }

    #[test]
    fn test_system_heap_rejects_empty_and_huge() {
        assert!(matches!(
            SystemHeap.allocate(0),
            Err(Error::AllocationFailed { size: 0 })
        ));
        assert!(matches!(
            SystemHeap.allocate(usize::MAX),
            Err(Error::AllocationFailed { .. })
        ));
    }
}
