use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;

use crate::memory::layout::{self, ObjectHeader};

/// Reference to an object, in the form managed code expects.
///
/// Like the runtime's own references it points at the metadata pointer,
/// not at the start of the header. It does not own the object and does not
/// keep the backing allocation alive.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef(NonNull<u8>);

impl ObjectRef {
    /// Reference for the object whose header starts at `header`
    pub(crate) fn from_header(header: NonNull<ObjectHeader>) -> Self {
        // SAFETY: the metadata slot lies inside a non-null header.
        Self(unsafe { NonNull::new_unchecked(layout::object_pointer(header.as_ptr())) })
    }

    /// Wrap a raw reference obtained from the runtime
    pub fn from_ptr(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr.cast::<u8>()).map(Self)
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr().cast()
    }

    pub fn address(self) -> usize {
        self.0.as_ptr() as usize
    }

    pub fn header_ptr(self) -> *mut ObjectHeader {
        layout::header_pointer(self.0.as_ptr())
    }

    pub fn payload_ptr(self) -> *mut u8 {
        layout::payload_pointer(self.header_ptr())
    }

    /// Read the metadata pointer of the referenced object.
    ///
    /// # Safety
    ///
    /// The object must still be alive.
    pub unsafe fn metadata(self) -> *const c_void {
        // SAFETY: guaranteed by the caller.
        unsafe { (*self.header_ptr()).metadata }
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({:#x})", self.address())
    }
}
