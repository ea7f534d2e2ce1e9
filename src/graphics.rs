//! Graphics overlays - the block-linked point lists in the graphics arena.
//!
//! ```text
//! main arena                         graphics arena (1 KB blocks)
//! ──────────                         ────────────────────────────
//! word 10000+frame ─▶ gframe         ┌─────────┬──────────────┬──────┐
//! word 8000+gframe ─▶ head ────────▶ │ npoints │ points[254]  │ next │──▶ ... ─▶ -1
//!                                    └─────────┴──────────────┴──────┘
//! ```
//!
//! Links are indices into the block array, never pointers. Walks are bounded
//! by the number of blocks the arena can hold, so a corrupt (cyclic) chain
//! ends in an error instead of a hang.

use tracing::warn;

use crate::arena::Arena;
use crate::error::{FrameStoreError, Result};
use crate::layout::{
    block_offset, FrameSize, BLOCK_SIZE, B_NEXT_BLOCK, B_NUMBER_OF_POINTS, B_POINTS_LIST,
    END_OF_LIST, POINTS_PER_BLOCK,
};

/// Rows at the top of a McIDAS frame reserved for the documentation line.
pub const DOC_LINES: u32 = 12;

// =============================================================================
// SUMMARY
// =============================================================================

/// Size of one frame's graphics overlay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphicsSummary {
    /// Sum of `numberOfPoints` over the visited blocks
    pub points: usize,
    /// Blocks visited
    pub blocks: usize,
    /// Color level mask from the graphics frame's record
    pub mask: u32,
}

// =============================================================================
// BLOCK CHAIN
// =============================================================================

/// One visited block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRef {
    pub index: usize,
    /// Points stored in the block, clamped to `0..=254`
    pub points: usize,
}

impl BlockRef {
    /// Byte offset of the block's point list.
    #[inline]
    pub fn points_offset(&self) -> usize {
        block_offset(self.index) + B_POINTS_LIST
    }
}

/// Iterator over the blocks of one list, starting at its head index.
pub struct BlockChain<'a, A: Arena> {
    arena: &'a A,
    frame: i32,
    next: i32,
    visited: usize,
    capacity: usize,
    done: bool,
}

impl<'a, A: Arena> BlockChain<'a, A> {
    /// `frame` is only used to label errors.
    pub fn new(arena: &'a A, frame: i32, head: i32) -> Self {
        Self {
            arena,
            frame,
            next: head,
            visited: 0,
            capacity: arena.len() / BLOCK_SIZE,
            done: false,
        }
    }

    fn corrupt(&mut self, detail: String) -> Option<Result<BlockRef>> {
        self.done = true;
        warn!(target: "frame_store::graphics", frame = self.frame, %detail, "corrupt graphics list");
        Some(Err(FrameStoreError::CorruptGraphics {
            frame: self.frame,
            detail,
        }))
    }

    fn read_block(&self, index: usize) -> Result<(i32, i32)> {
        let base = block_offset(index);
        let count = self.arena.read_i32_at(base + B_NUMBER_OF_POINTS)?;
        let next = self.arena.read_i32_at(base + B_NEXT_BLOCK)?;
        Ok((count, next))
    }
}

impl<A: Arena> Iterator for BlockChain<'_, A> {
    type Item = Result<BlockRef>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.next == END_OF_LIST {
            return None;
        }

        let Ok(index) = usize::try_from(self.next) else {
            return self.corrupt(format!("negative block index {}", self.next));
        };
        if index >= self.capacity {
            return self.corrupt(format!(
                "block index {index} beyond arena of {} blocks",
                self.capacity
            ));
        }
        if self.visited == self.capacity {
            return self.corrupt(format!("chain longer than {} blocks", self.capacity));
        }
        self.visited += 1;

        let (count, next) = match self.read_block(index) {
            Ok(block) => block,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };
        self.next = next;

        let points = count.clamp(0, POINTS_PER_BLOCK as i32) as usize;
        if points as i32 != count {
            warn!(target: "frame_store::graphics", frame = self.frame, block = index, count, "point count clamped");
        }
        Some(Ok(BlockRef { index, points }))
    }
}

/// Total points and blocks in the list starting at `head`.
pub fn count_points<A: Arena>(arena: &A, frame: i32, head: i32) -> Result<(usize, usize)> {
    let mut points = 0;
    let mut blocks = 0;
    for block in BlockChain::new(arena, frame, head) {
        points += block?.points;
        blocks += 1;
    }
    Ok((points, blocks))
}

/// Copy raw packed points into `out`, stopping once it is full.
///
/// Returns the number of points copied. Filling `out` ends the walk before
/// the chain is checked any further, so a corrupt tail past that point goes
/// unnoticed. Otherwise the walk is bounded by the arena's block count, not
/// by `out.len()`: a cyclic chain reached before `out` fills is
/// `CorruptGraphics`, even though looping around the cycle could fill it.
pub fn copy_points<A: Arena>(arena: &A, frame: i32, head: i32, out: &mut [i32]) -> Result<usize> {
    let mut copied = 0;
    if out.is_empty() {
        return Ok(0);
    }
    for block in BlockChain::new(arena, frame, head) {
        let block = block?;
        let take = block.points.min(out.len() - copied);
        arena.read_i32s_at(block.points_offset(), &mut out[copied..copied + take])?;
        copied += take;
        if copied == out.len() {
            break;
        }
    }
    Ok(copied)
}

// =============================================================================
// POINT DECODE
// =============================================================================

/// A packed graphics point: bits 8-31 location, bits 0-7 color level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphicsPoint {
    /// 1-based linear pixel location within the frame
    pub location: i32,
    pub color: u8,
}

impl GraphicsPoint {
    #[inline]
    pub fn from_packed(raw: i32) -> Self {
        Self {
            location: raw / 0x100,
            color: (raw & 0xff) as u8,
        }
    }

    #[inline]
    /// Encode `location * 256 + color`; locations past 24 bits wrap.
    pub fn to_packed(&self) -> i32 {
        self.location.wrapping_mul(0x100).wrapping_add(self.color as i32)
    }

    /// 0-based `(line, element)` in a frame `elements` wide.
    pub fn locate(&self, elements: u32) -> Option<(u32, u32)> {
        if elements == 0 || self.location < 1 {
            return None;
        }
        let offset = (self.location - 1) as u32;
        Some((offset / elements, offset % elements))
    }
}

/// A drawable overlay pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayPoint {
    pub line: u32,
    pub element: u32,
    pub color: u8,
}

/// Decode raw points into image coordinates.
///
/// Locations index the magnified frame, `size.elements * element_mag`
/// wide; the line and element are divided back down by the magnifications.
/// Points landing in the documentation rows are dropped. Every color level
/// is kept, including 0. Magnifications below 1 count as 1.
pub fn overlay_points(raw: &[i32], size: FrameSize, magnification: (i32, i32)) -> Vec<OverlayPoint> {
    let line_mag = magnification.0.max(1) as u32;
    let elem_mag = magnification.1.max(1) as u32;
    let width = size.elements.saturating_mul(elem_mag);

    raw.iter()
        .map(|&packed| GraphicsPoint::from_packed(packed))
        .filter_map(|point| {
            let (line, element) = point.locate(width)?;
            let line = line / line_mag;
            (line >= DOC_LINES).then_some(OverlayPoint {
                line,
                element: element / elem_mag,
                color: point.color,
            })
        })
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================
