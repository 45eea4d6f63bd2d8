//! Test doubles for the raw heap

use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use super::raw::{RawMemory, SystemHeap};
use crate::error::{Error, Result};

/// System heap that records every allocation and release
#[derive(Debug, Default)]
pub struct TrackingHeap {
    allocated: Mutex<Vec<usize>>,
    freed: Mutex<Vec<usize>>,
    fail_next: AtomicBool,
}

impl TrackingHeap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next allocation report exhaustion
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Sizes of all allocations, in order
    pub fn allocated(&self) -> Vec<usize> {
        self.allocated.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Sizes of all releases, in order
    pub fn freed(&self) -> Vec<usize> {
        self.freed.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn live_bytes(&self) -> usize {
        self.allocated().iter().sum::<usize>() - self.freed().iter().sum::<usize>()
    }
}

impl RawMemory for TrackingHeap {
    fn allocate(&self, size: usize) -> Result<NonNull<u8>> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(Error::AllocationFailed { size });
        }
        let ptr = SystemHeap.allocate(size)?;
        // poison fresh memory so missed initialization shows up in tests
        // SAFETY: size bytes were just allocated.
        unsafe { std::ptr::write_bytes(ptr.as_ptr(), 0xAB, size) };
        self.allocated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(size);
        Ok(ptr)
    }

    unsafe fn free(&self, ptr: NonNull<u8>, size: usize) {
        self.freed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(size);
        // SAFETY: forwarded from the caller.
        unsafe { SystemHeap.free(ptr, size) }
    }
}
