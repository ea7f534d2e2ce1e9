//! Arena views - typed word/byte access over a flat shared segment.
//!
//! The producer writes these bytes from another process without any locking.
//! Readers copy out what they need and tolerate torn reads; the McV dirty
//! word handshake is the only ordering signal.
//!
//! Two views implement [`Arena`]:
//! - [`RawArena`]: a pointer + length into attached shared memory
//! - [`HeapArena`]: an owned, cloneable buffer (in-process mirrors, tests)

use std::ptr;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{FrameStoreError, Result};
use crate::layout::WORD_SIZE;

// =============================================================================
// ARENA TRAIT
// =============================================================================

/// Bounds-checked access to a flat segment of native-endian words.
///
/// Implementors provide the byte-level primitives; word helpers are derived.
pub trait Arena {
    /// Segment size in bytes
    fn len(&self) -> usize;

    /// Copy `out.len()` bytes starting at `offset`.
    fn read_bytes(&self, offset: usize, out: &mut [u8]) -> Result<()>;

    /// Overwrite `data.len()` bytes starting at `offset`.
    fn write_bytes(&self, offset: usize, data: &[u8]) -> Result<()>;

    #[inline]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read the i32 at a byte offset.
    #[inline]
    fn read_i32_at(&self, offset: usize) -> Result<i32> {
        let mut bytes = [0u8; WORD_SIZE];
        self.read_bytes(offset, &mut bytes)?;
        Ok(i32::from_ne_bytes(bytes))
    }

    /// Write an i32 at a byte offset.
    #[inline]
    fn write_i32_at(&self, offset: usize, value: i32) -> Result<()> {
        self.write_bytes(offset, &value.to_ne_bytes())
    }

    /// Read word `index` (byte offset `index * 4`).
    #[inline]
    fn read_word(&self, index: usize) -> Result<i32> {
        self.read_i32_at(index * WORD_SIZE)
    }

    /// Write word `index` (byte offset `index * 4`).
    #[inline]
    fn write_word(&self, index: usize, value: i32) -> Result<()> {
        self.write_i32_at(index * WORD_SIZE, value)
    }

    /// Read `out.len()` consecutive i32 values starting at a byte offset.
    fn read_i32s_at(&self, offset: usize, out: &mut [i32]) -> Result<()> {
        check_range(offset, out.len() * WORD_SIZE, self.len())?;
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.read_i32_at(offset + i * WORD_SIZE)?;
        }
        Ok(())
    }
}

/// Fail with `OutOfBounds` unless `offset..offset + len` lies in `0..size`.
#[inline]
pub fn check_range(offset: usize, len: usize, size: usize) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(FrameStoreError::OutOfBounds { offset, len, size }),
    }
}

// =============================================================================
// RAW ARENA
// =============================================================================

/// Zero-copy view over attached shared memory.
pub struct RawArena {
    ptr: *mut u8,
    len: usize,
}

// SAFETY: The segment is shared with the producer process by design.
// Every access is a bounds-checked byte copy; races are tolerated.
unsafe impl Send for RawArena {}
unsafe impl Sync for RawArena {}

impl RawArena {
    /// Create from a raw pointer.
    ///
    /// # Safety
    /// - `ptr` must point to a mapping of at least `len` bytes
    /// - The mapping must remain valid for the lifetime of this struct
    pub unsafe fn from_raw(ptr: *mut u8, len: usize) -> Self {
        Self { ptr, len }
    }

    /// Get raw pointer
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr
    }

    /// Get mutable raw pointer
    #[inline]
    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.ptr
    }
}

impl Arena for RawArena {
    #[inline]
    fn len(&self) -> usize {
        self.len
    }

    fn read_bytes(&self, offset: usize, out: &mut [u8]) -> Result<()> {
        check_range(offset, out.len(), self.len)?;
        unsafe { ptr::copy_nonoverlapping(self.ptr.add(offset), out.as_mut_ptr(), out.len()) }
        Ok(())
    }

    fn write_bytes(&self, offset: usize, data: &[u8]) -> Result<()> {
        check_range(offset, data.len(), self.len)?;
        unsafe { ptr::copy_nonoverlapping(data.as_ptr(), self.ptr.add(offset), data.len()) }
        Ok(())
    }
}

// =============================================================================
// HEAP ARENA
// =============================================================================

/// Owned arena. Clones share the same bytes, so one clone can play the
/// producer while another is read by a session.
#[derive(Clone, Default)]
pub struct HeapArena {
    bytes: Arc<RwLock<Vec<u8>>>,
}

impl HeapArena {
    /// Zero-filled arena of `len` bytes.
    pub fn zeroed(len: usize) -> Self {
        Self::from_bytes(vec![0; len])
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Arc::new(RwLock::new(bytes)),
        }
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.read().clone()
    }
}

impl std::fmt::Debug for HeapArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapArena").field("len", &self.len()).finish()
    }
}

impl Arena for HeapArena {
    #[inline]
    fn len(&self) -> usize {
        self.bytes.read().len()
    }

    fn read_bytes(&self, offset: usize, out: &mut [u8]) -> Result<()> {
        let bytes = self.bytes.read();
        check_range(offset, out.len(), bytes.len())?;
        out.copy_from_slice(&bytes[offset..offset + out.len()]);
        Ok(())
    }

    fn write_bytes(&self, offset: usize, data: &[u8]) -> Result<()> {
        let mut bytes = self.bytes.write();
        check_range(offset, data.len(), bytes.len())?;
        bytes[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
