use std::fmt;
use std::marker::PhantomData;

/// A read-only span of process memory that can be scanned for signatures.
///
/// A region is a `(base, size)` pair. The lifetime ties it to whatever owns
/// the bytes; regions over a loaded module use `'static` because the module
/// stays mapped for the rest of the process.
#[derive(Clone, Copy)]
pub struct MemoryRegion<'a> {
    base: *const u8,
    size: usize,
    _bytes: PhantomData<&'a [u8]>,
}

// SAFETY: a region only ever hands out shared, read-only views of its bytes.
unsafe impl Send for MemoryRegion<'_> {}
// SAFETY: see above.
unsafe impl Sync for MemoryRegion<'_> {}

impl<'a> MemoryRegion<'a> {
    /// Create a region over an in-memory byte slice
    pub fn from_slice(bytes: &'a [u8]) -> Self {
        Self {
            base: bytes.as_ptr(),
            size: bytes.len(),
            _bytes: PhantomData,
        }
    }

    /// Create a region over raw process memory.
    ///
    /// # Safety
    ///
    /// `base..base + size` must be readable and stay mapped and unmodified
    /// for `'a`.
    pub unsafe fn from_raw_parts(base: *const u8, size: usize) -> Self {
        Self {
            base,
            size,
            _bytes: PhantomData,
        }
    }

    pub fn base_address(&self) -> usize {
        self.base as usize
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// View the whole region as a byte slice
    pub fn as_bytes(&self) -> &'a [u8] {
        if self.size == 0 {
            return &[];
        }
        // SAFETY: guaranteed by the constructors.
        unsafe { std::slice::from_raw_parts(self.base, self.size) }
    }

    /// Bounds-checked view of `len` bytes starting at `offset`
    pub fn bytes_at(&self, offset: usize, len: usize) -> Option<&'a [u8]> {
        let end = offset.checked_add(len)?;
        self.as_bytes().get(offset..end)
    }

    /// Absolute address of an offset inside the region
    pub fn address_of(&self, offset: usize) -> Option<usize> {
        (offset <= self.size).then(|| self.base_address() + offset)
    }

    /// Offset of an absolute address inside the region
    pub fn offset_of(&self, address: usize) -> Option<usize> {
        let offset = address.checked_sub(self.base_address())?;
        (offset < self.size).then_some(offset)
    }
}

impl fmt::Debug for MemoryRegion<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryRegion")
            .field("base", &format_args!("{:#x}", self.base_address()))
            .field("size", &format_args!("{:#x}", self.size))
            .finish()
    }
}
