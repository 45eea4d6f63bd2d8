//! Layout command implementation.
//!
//! Prints the object header geometry for both pointer widths, then boxes a
//! sample value with the native allocator and dumps what was written.

use anyhow::Result;
use offheap_core::{
    HeaderLayout, MetadataHandle, PointerWidth, TypeMetadata, TypeRegistry,
    UnmanagedHeapAllocator,
};

use super::hexdump;

/// Stand-in metadata record; only its address is stored in the header
static SAMPLE_METADATA: u64 = 0;

/// Run the layout command
pub fn run() -> Result<()> {
    println!("{:<8} {:>8} {:>8} {:>8} {:>8}", "Width", "Padding", "Metadata", "Header", "Payload");
    for width in [PointerWidth::Bits32, PointerWidth::Bits64] {
        let layout = HeaderLayout::new(width);
        let native = if layout == HeaderLayout::NATIVE { " (native)" } else { "" };
        println!(
            "{:<8} {:>8} {:>8} {:>8} {:>8}{}",
            format!("{}-bit", width),
            layout.padding(),
            layout.metadata_offset(),
            layout.header_size(),
            layout.payload_offset_from_object(),
            native
        );
    }

    let header_size = HeaderLayout::NATIVE.header_size();
    let registry = TypeRegistry::new();
    let handle = MetadataHandle::from_ptr((&SAMPLE_METADATA as *const u64).cast())
        .ok_or_else(|| anyhow::anyhow!("Sample metadata has a null address"))?;
    registry.register_type::<u64>(TypeMetadata::new(handle, header_size + 8, 8))?;

    let allocator = UnmanagedHeapAllocator::new(&registry);
    let (allocation, object) = allocator.box_value(0x1122_3344_5566_7788_u64)?;

    println!();
    println!("Boxed 0x1122334455667788u64:");
    println!("  allocation: 0x{:X} ({} bytes)", allocation.address(), allocation.size());
    println!("  object:     0x{:X}", object.address());
    println!("  sync slot:  {}", allocation.header().sync_slot);
    println!("  metadata:   {:p}", allocation.header().metadata);
    println!("  payload:");
    hexdump(header_size, allocation.payload());

    allocation.release();
    Ok(())
}
