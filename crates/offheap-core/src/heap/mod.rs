//! Unmanaged allocation engine

mod allocator;
mod handle;
mod metadata;
mod object;
mod raw;
mod registry;

#[cfg(test)]
pub mod mock;

pub use allocator::{Allocation, UnmanagedHeapAllocator};
pub use handle::UnmanagedAllocationHandle;
pub use metadata::{
    ConstructorEntry, MetadataHandle, TypeDescriptor, TypeMetadata, TypeMetadataProvider,
};
pub use object::ObjectRef;
pub use raw::{RawMemory, SystemHeap};
pub use registry::TypeRegistry;

#[cfg(test)]
pub use mock::TrackingHeap;
