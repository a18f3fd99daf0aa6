//! Zero-filled anonymous memory for GC side tables.
//!
//! Side tables such as card tables are sized in proportion to the reserved
//! heap, which can be far larger than the memory actually in use. Mapping
//! them straight from the OS means untouched pages cost nothing and every
//! byte starts out as zero.

use std::io;

#[cfg(unix)]
mod unix;
#[cfg(unix)]
use unix as os;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
use windows as os;

pub use os::page_size;

/// Round `len` up to a whole number of system pages.
///
/// Returns `None` on overflow.
#[must_use]
pub fn round_to_page(len: usize) -> Option<usize> {
    let page = page_size();
    len.checked_add(page - 1).map(|n| n & !(page - 1))
}

/// An owned, zero-filled, read-write anonymous mapping.
///
/// The mapping is released when this handle is dropped.
pub struct Mmap {
    inner: os::MmapInner,
    /// Bytes requested by the caller (the mapping itself is page-rounded).
    len: usize,
}

impl Mmap {
    /// Map `len` zeroed bytes with default options.
    ///
    /// # Errors
    ///
    /// Returns an error if `len` is zero or the OS refuses the mapping.
    pub fn zeroed(len: usize) -> io::Result<Self> {
        MmapOptions::new().len(len).map_zeroed()
    }

    /// Pointer to the first byte of the mapping.
    #[must_use]
    pub fn as_ptr(&self) -> *mut u8 {
        self.inner.ptr()
    }

    /// Number of usable bytes, as requested.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Always `false`; empty mappings cannot be created.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size of the underlying mapping, rounded up to whole pages.
    #[must_use]
    pub fn mapped_len(&self) -> usize {
        self.inner.len()
    }
}

// SAFETY: the mapping is plain memory owned by this handle; synchronizing
// access to its contents is the responsibility of whoever reads and writes it.
unsafe impl Send for Mmap {}
// SAFETY: see above.
unsafe impl Sync for Mmap {}

impl std::fmt::Debug for Mmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mmap")
            .field("ptr", &self.as_ptr())
            .field("len", &self.len)
            .finish()
    }
}

/// Options for creating a zero-filled mapping.
#[derive(Debug, Clone, Default)]
pub struct MmapOptions {
    len: usize,
    no_reserve: bool,
}

impl MmapOptions {
    /// Options with length 0. A length must be set before mapping.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            len: 0,
            no_reserve: false,
        }
    }

    /// Set the number of bytes to map.
    #[must_use]
    pub const fn len(mut self, len: usize) -> Self {
        self.len = len;
        self
    }

    /// Skip reserving swap for the mapping.
    ///
    /// On Linux this adds `MAP_NORESERVE`. Useful for tables covering a large
    /// reservation of which only a small part is ever touched.
    #[must_use]
    pub const fn no_reserve(mut self, no_reserve: bool) -> Self {
        self.no_reserve = no_reserve;
        self
    }

    /// Create the mapping.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a zero length or a length that overflows
    /// when rounded to pages, otherwise the OS error.
    pub fn map_zeroed(&self) -> io::Result<Mmap> {
        if self.len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "length must be greater than 0",
            ));
        }
        let mapped = round_to_page(self.len).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "length overflows page rounding")
        })?;

        // SAFETY: no address hint is passed, so the OS picks a fresh region
        // and no existing mapping can be clobbered.
        let inner = unsafe { os::MmapInner::map_zeroed(mapped, self.no_reserve)? };

        Ok(Mmap {
            inner,
            len: self.len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size() {
        let ps = page_size();
        assert!(ps > 0);
        assert!(ps.is_power_of_two(), "Page size should be power of 2");
    }

    #[test]
    fn test_round_to_page() {
        let ps = page_size();
        assert_eq!(round_to_page(1), Some(ps));
        assert_eq!(round_to_page(ps), Some(ps));
        assert_eq!(round_to_page(ps + 1), Some(ps * 2));
        assert_eq!(round_to_page(usize::MAX), None);
    }

    #[test]
    fn test_zero_length_rejected() {
        let err = Mmap::zeroed(0).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_mapping_is_zeroed_and_writable() {
        let len = page_size() * 2 + 17;
        let mmap = Mmap::zeroed(len).expect("failed to map");
        assert_eq!(mmap.len(), len);
        assert!(mmap.mapped_len() >= len);
        assert_eq!(mmap.as_ptr() as usize % page_size(), 0);

        // SAFETY: the mapping is `len` bytes long and owned by this test.
        let bytes = unsafe { std::slice::from_raw_parts_mut(mmap.as_ptr(), len) };
        assert!(bytes.iter().all(|&b| b == 0));
        bytes[len - 1] = 0xAB;
        assert_eq!(bytes[len - 1], 0xAB);
    }

    #[test]
    fn test_no_reserve_mapping() {
        let mmap = MmapOptions::new()
            .len(1 << 20)
            .no_reserve(true)
            .map_zeroed()
            .expect("failed to map");
        // SAFETY: in bounds of the mapping.
        unsafe {
            assert_eq!(std::ptr::read_volatile(mmap.as_ptr().add(4096)), 0);
        }
    }
}
