//! Frame Store Layout - the shared memory contract in one place.
//!
//! The producer (McIDAS-X) and every reader MUST agree on these offsets
//! byte-for-byte. Nothing else in the crate is allowed to hardcode an offset.
//!
//! Memory Layout (main arena, 4-byte native-endian words):
//!   - Word 13:              frame count (highest valid frame id)
//!   - Word 51:              current (displayed) frame id
//!   - Word 505:             graphics arena key
//!   - Words 2000 + frame:   byte offset of the frame's `FrameRecord`
//!   - Words 3000 + frame:   packed size `elements * 65536 + lines`
//!   - Words 8000 + gframe:  head block of the graphics list (-1 = empty)
//!   - Words 10000 + frame:  display frame -> graphics frame
//!
//! Each `FrameRecord` is followed by one element row (skipped) and then
//! `lines * elements` pixel bytes.
//!
//! Graphics arena: an array of 1 KB `GraphicsPointsBlock`s chained by index.

use std::mem::{offset_of, size_of};

use crate::error::{FrameStoreError, Result};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Bytes per arena word
pub const WORD_SIZE: usize = 4;

/// Entries in each of the stretch, color and graphics tables
pub const TABLE_ENTRIES: usize = 256;

/// Bytes per table (256 × 4)
pub const TABLE_BYTES: usize = TABLE_ENTRIES * WORD_SIZE;

/// Packed frame size radix: `elements * FRAME_SIZE_RADIX + lines`
pub const FRAME_SIZE_RADIX: u32 = 65_536;

// =============================================================================
// ARENA WORD INDICES
// =============================================================================

pub const W_FRAME_COUNT: usize = 13;
pub const W_CURRENT_FRAME: usize = 51;
pub const W_GRAPHICS_KEY: usize = 505;
pub const W_FRAME_OFFSET_BASE: usize = 2000;
pub const W_FRAME_SIZE_BASE: usize = 3000;
pub const W_GRAPHICS_HEAD_BASE: usize = 8000;
pub const W_GRAPHICS_FRAME_BASE: usize = 10_000;

// =============================================================================
// FRAME RECORD
// =============================================================================

/// Bounding rectangle in frame coordinates. (1,1) is the upper left corner,
/// all zeros means empty.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoundingBox {
    pub ul_line: i32,
    pub ul_elem: i32,
    pub lr_line: i32,
    pub lr_elem: i32,
}

impl BoundingBox {
    #[inline]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Per-frame flags and tables as the producer lays them out.
///
/// Never instantiated over the arena directly: the arena is read through
/// [`crate::arena::Arena`] at the offsets derived from this struct.
#[repr(C)]
pub struct FrameRecord {
    /// Producer dirty word; set to -1 (all ones) when frame contents change.
    pub dirty: i32,
    pub bbox: BoundingBox,
    /// Dirty word owned by this reader's handshake.
    pub mcv_dirty: i32,
    pub mcv_bbox: BoundingBox,
    /// Always 256 entries, 0..maxcolors-1
    pub stretch_table: [i32; TABLE_ENTRIES],
    pub color_table: [u32; TABLE_ENTRIES],
    pub graphics_table: [u32; TABLE_ENTRIES],
    pub graphics_mask: u32,
}

pub const FRAME_RECORD_SIZE: usize = size_of::<FrameRecord>();

pub const R_DIRTY: usize = offset_of!(FrameRecord, dirty);
pub const R_BBOX: usize = offset_of!(FrameRecord, bbox);
pub const R_MCV_DIRTY: usize = offset_of!(FrameRecord, mcv_dirty);
pub const R_MCV_BBOX: usize = offset_of!(FrameRecord, mcv_bbox);
pub const R_STRETCH_TABLE: usize = offset_of!(FrameRecord, stretch_table);
pub const R_COLOR_TABLE: usize = offset_of!(FrameRecord, color_table);
pub const R_GRAPHICS_TABLE: usize = offset_of!(FrameRecord, graphics_table);
pub const R_GRAPHICS_MASK: usize = offset_of!(FrameRecord, graphics_mask);

const _: () = assert!(R_MCV_DIRTY == 5 * WORD_SIZE);
const _: () = assert!(R_STRETCH_TABLE == 40);
const _: () = assert!(R_COLOR_TABLE == R_STRETCH_TABLE + TABLE_BYTES);
const _: () = assert!(R_GRAPHICS_TABLE == R_COLOR_TABLE + TABLE_BYTES);
const _: () = assert!(FRAME_RECORD_SIZE == 3116);

// =============================================================================
// GRAPHICS BLOCKS
// =============================================================================

/// Points per block; the block is (254 + 2) × 4 = 1 KB.
pub const POINTS_PER_BLOCK: usize = 254;

/// `nextBlock` value terminating a graphics list.
pub const END_OF_LIST: i32 = -1;

/// One link of a frame's graphics point list.
#[repr(C)]
pub struct GraphicsPointsBlock {
    pub number_of_points: i32,
    /// Bits 8-31: 1-based pixel location, bits 0-7: color level
    pub points_list: [i32; POINTS_PER_BLOCK],
    pub next_block: i32,
}

pub const BLOCK_SIZE: usize = size_of::<GraphicsPointsBlock>();

pub const B_NUMBER_OF_POINTS: usize = offset_of!(GraphicsPointsBlock, number_of_points);
pub const B_POINTS_LIST: usize = offset_of!(GraphicsPointsBlock, points_list);
pub const B_NEXT_BLOCK: usize = offset_of!(GraphicsPointsBlock, next_block);

const _: () = assert!(BLOCK_SIZE == 1024);

// =============================================================================
// FRAME DIRECTORY FILE
// =============================================================================

/// Words in a `Frame<n>.0` directory file
pub const FRAME_DIRECTORY_WORDS: usize = 704;

/// First word of the navigation block inside the directory
pub const NAV_BLOCK_START: usize = 64;

/// Navigation block length in words
pub const NAV_BLOCK_WORDS: usize = FRAME_DIRECTORY_WORDS - NAV_BLOCK_START;

// =============================================================================
// OFFSET ARITHMETIC
// =============================================================================

/// Word index of a per-frame table entry (`base + frame`).
///
/// Negative frame ids never reach the arena.
#[inline]
pub fn frame_word(base: usize, frame: i32) -> Result<usize> {
    let frame = usize::try_from(frame).map_err(|_| FrameStoreError::InvalidFrame {
        frame,
        count: None,
    })?;
    Ok(base + frame)
}

/// Byte address of the pixel region for a record starting at `record`.
#[inline]
pub fn pixel_offset(record: usize, elements: usize) -> usize {
    record + FRAME_RECORD_SIZE + elements
}

/// Byte address of block `index` in the graphics arena.
#[inline]
pub fn block_offset(index: usize) -> usize {
    index * BLOCK_SIZE
}

// =============================================================================
// FRAME SIZE
// =============================================================================

/// Frame dimensions decoded from a packed directory word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FrameSize {
    pub lines: u32,
    pub elements: u32,
}

impl FrameSize {
    pub fn new(lines: u32, elements: u32) -> Self {
        Self { lines, elements }
    }

    /// Decode `elements * 65536 + lines`.
    ///
    /// The word is treated as unsigned so both halves land in `0..=65535`.
    #[inline]
    pub fn from_packed(packed: i32) -> Self {
        let packed = packed as u32;
        Self {
            lines: packed % FRAME_SIZE_RADIX,
            elements: packed / FRAME_SIZE_RADIX,
        }
    }

    /// Encode `elements * 65536 + lines`, wrapping like the `u32` word it
    /// came from. Halves above 65535 do not round-trip.
    #[inline]
    pub fn to_packed(&self) -> i32 {
        self.elements
            .wrapping_mul(FRAME_SIZE_RADIX)
            .wrapping_add(self.lines) as i32
    }

    /// Bytes in the pixel region (one byte per pixel).
    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.lines as usize * self.elements as usize
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_offsets() {
        assert_eq!(R_DIRTY, 0);
        assert_eq!(R_BBOX, 4);
        assert_eq!(R_MCV_DIRTY, 20);
        assert_eq!(R_MCV_BBOX, 24);
        assert_eq!(R_STRETCH_TABLE, 40);
        assert_eq!(R_COLOR_TABLE, 1064);
        assert_eq!(R_GRAPHICS_TABLE, 2088);
        assert_eq!(R_GRAPHICS_MASK, 3112);
        assert_eq!(FRAME_RECORD_SIZE, 3116);
    }

    #[test]
    fn test_block_offsets() {
        assert_eq!(B_NUMBER_OF_POINTS, 0);
        assert_eq!(B_POINTS_LIST, 4);
        assert_eq!(B_NEXT_BLOCK, 1020);
        assert_eq!(block_offset(3), 3072);
    }

    #[test]
    fn test_frame_size_packing() {
        let size = FrameSize::from_packed(640 * 65_536 + 480);
        assert_eq!(size, FrameSize::new(480, 640));
        assert_eq!(size.to_packed(), 640 * 65_536 + 480);
        assert_eq!(size.pixel_count(), 480 * 640);
    }

    #[test]
    fn test_frame_size_unsigned_decomposition() {
        // High bit set: elements must still come out below 65536
        let size = FrameSize::from_packed(-1);
        assert_eq!(size.lines, 65_535);
        assert_eq!(size.elements, 65_535);
    }

    #[test]
    fn test_frame_size_packing_wraps() {
        let wide = FrameSize::new(0, 70_000);
        assert_eq!(wide.to_packed(), 70_000u32.wrapping_mul(65_536) as i32);
        assert_eq!(FrameSize::new(65_535, 65_535).to_packed(), -1);
        assert_eq!(FrameSize::new(u32::MAX, u32::MAX).to_packed(), (u32::MAX.wrapping_mul(65_536).wrapping_add(u32::MAX)) as i32);
    }

    #[test]
    fn test_frame_word_rejects_negative() {
        assert_eq!(frame_word(W_FRAME_SIZE_BASE, 4).unwrap(), 3004);
        assert!(frame_word(W_FRAME_SIZE_BASE, -2).is_err());
    }

    #[test]
    fn test_pixel_offset_skips_one_row() {
        assert_eq!(pixel_offset(100_000, 640), 100_000 + 3116 + 640);
    }

    #[test]
    fn test_empty_bbox() {
        assert!(BoundingBox::default().is_empty());
        let bbox = BoundingBox { ul_line: 1, ul_elem: 1, lr_line: 10, lr_elem: 10 };
        assert!(!bbox.is_empty());
    }
}
