//! Object header layout of the managed runtime
//!
//! Every managed object starts with a fixed header:
//!
//! ```text
//!  header                          object reference
//!  │                               │
//!  ▼                               ▼
//!  ┌──────────────┬───────────────┬──────────────────┬─────────────┐
//!  │ sync slot i32│ pad i32 (64b) │ metadata pointer │ payload ... │
//!  └──────────────┴───────────────┴──────────────────┴─────────────┘
//! ```
//!
//! Object references handed to managed code point at the metadata pointer,
//! so the payload sits one pointer past the reference and one full header
//! past the allocation start.

use std::ffi::c_void;
use std::mem;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Raw header as written at the start of every unmanaged object
#[repr(C)]
#[derive(Debug)]
pub struct ObjectHeader {
    pub sync_slot: i32,
    #[cfg(target_pointer_width = "64")]
    _pad: i32,
    pub metadata: *const c_void,
}

impl ObjectHeader {
    pub fn new(metadata: *const c_void) -> Self {
        Self {
            sync_slot: 0,
            #[cfg(target_pointer_width = "64")]
            _pad: 0,
            metadata,
        }
    }
}

/// Address width of the runtime build the header must match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum PointerWidth {
    #[strum(serialize = "32")]
    #[serde(rename = "32")]
    Bits32,
    #[strum(serialize = "64")]
    #[serde(rename = "64")]
    Bits64,
}

impl PointerWidth {
    #[cfg(target_pointer_width = "64")]
    pub const NATIVE: PointerWidth = PointerWidth::Bits64;
    #[cfg(not(target_pointer_width = "64"))]
    pub const NATIVE: PointerWidth = PointerWidth::Bits32;

    pub const fn bytes(self) -> usize {
        match self {
            PointerWidth::Bits32 => 4,
            PointerWidth::Bits64 => 8,
        }
    }
}

/// Header geometry for a given pointer width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderLayout {
    pub pointer_width: PointerWidth,
}

/// Size of the synchronization slot (always a 32-bit integer)
pub const SYNC_SLOT_SIZE: usize = 4;

impl HeaderLayout {
    pub const NATIVE: HeaderLayout = HeaderLayout::new(PointerWidth::NATIVE);

    pub const fn new(pointer_width: PointerWidth) -> Self {
        Self { pointer_width }
    }

    /// Padding after the sync slot so the metadata pointer is aligned
    pub const fn padding(&self) -> usize {
        self.pointer_width.bytes() - SYNC_SLOT_SIZE
    }

    /// Offset of the metadata pointer from the header start.
    ///
    /// Object references point here.
    pub const fn metadata_offset(&self) -> usize {
        SYNC_SLOT_SIZE + self.padding()
    }

    pub const fn header_size(&self) -> usize {
        self.metadata_offset() + self.pointer_width.bytes()
    }

    /// Payload offset measured from an object reference
    pub const fn payload_offset_from_object(&self) -> usize {
        self.pointer_width.bytes()
    }

    /// Smallest allocation that can hold a header
    pub const fn min_instance_size(&self) -> usize {
        self.header_size()
    }
}

const _: () = assert!(HeaderLayout::NATIVE.header_size() == mem::size_of::<ObjectHeader>());
const _: () = assert!(HeaderLayout::NATIVE.metadata_offset() == mem::offset_of!(ObjectHeader, metadata));

/// Address immediately following the header
pub fn payload_pointer(header: *mut ObjectHeader) -> *mut u8 {
    header
        .cast::<u8>()
        .wrapping_add(HeaderLayout::NATIVE.header_size())
}

/// Address of the metadata pointer slot, which is what object references point at
pub fn object_pointer(header: *mut ObjectHeader) -> *mut u8 {
    header
        .cast::<u8>()
        .wrapping_add(HeaderLayout::NATIVE.metadata_offset())
}

/// Header start recovered from an object reference
pub fn header_pointer(object: *mut u8) -> *mut ObjectHeader {
    object
        .wrapping_sub(HeaderLayout::NATIVE.metadata_offset())
        .cast()
}
