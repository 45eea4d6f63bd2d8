//! # offheap-core
//!
//! Builds managed-runtime objects in memory the runtime's garbage collector
//! does not own, and finds unexported runtime routines by signature.
//!
//! This crate provides:
//! - Runtime module location in the current process
//! - Signature scanning with wildcards, per-architecture pattern sets and a
//!   per-routine result cache
//! - The object header layout model
//! - An allocation engine that stamps headers, zero-fills or copies payloads
//!   and calls constructors through their raw entry points

pub mod error;
pub mod heap;
pub mod memory;
pub mod signature;

pub use error::{Error, Result};
pub use heap::{
    Allocation, ConstructorEntry, MetadataHandle, ObjectRef, RawMemory, SystemHeap,
    TypeDescriptor, TypeMetadata, TypeMetadataProvider, TypeRegistry, UnmanagedAllocationHandle,
    UnmanagedHeapAllocator,
};
pub use memory::{
    DEFAULT_RUNTIME_MODULES, HeaderLayout, LoadedModule, LocatorConfig, MemoryRegion,
    ModuleEnumerator, ModuleLocator, ObjectHeader, PointerWidth, ProcessModules, payload_pointer,
};
pub use signature::{
    Arch, BytePattern, PatternByte, PatternSet, RoutineEntry, RoutineSignature, ScanResult,
    SignatureScanner, TRIAL_ALLOC_FAST, builtin_patterns, load_patterns, runtime_scanner,
    save_patterns, scan,
};
