//! In-memory fixtures: build arenas laid out like a live McIDAS-X session
//! and hand them out through a [`SegmentProvider`] that counts attachments.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::arena::{Arena, HeapArena};
use crate::error::Result;
use crate::layout::*;
use crate::shm::SegmentProvider;

fn put(bytes: &mut [u8], offset: usize, value: i32) {
    bytes[offset..offset + WORD_SIZE].copy_from_slice(&value.to_ne_bytes());
}

// =============================================================================
// FRAME SPEC
// =============================================================================

/// Contents of one frame record.
#[derive(Debug, Clone)]
pub struct FrameSpec {
    size: FrameSize,
    pixels: Vec<u8>,
    dirty: i32,
    bbox: BoundingBox,
    mcv_dirty: i32,
    mcv_bbox: BoundingBox,
    stretch: [i32; TABLE_ENTRIES],
    color: [u32; TABLE_ENTRIES],
    graphics: [u32; TABLE_ENTRIES],
    graphics_mask: u32,
}

impl FrameSpec {
    /// Zero pixels, zero tables, clean.
    pub fn new(lines: u32, elements: u32) -> Self {
        let size = FrameSize::new(lines, elements);
        Self {
            size,
            pixels: vec![0; size.pixel_count()],
            dirty: 0,
            bbox: BoundingBox::default(),
            mcv_dirty: 0,
            mcv_bbox: BoundingBox::default(),
            stretch: [0; TABLE_ENTRIES],
            color: [0; TABLE_ENTRIES],
            graphics: [0; TABLE_ENTRIES],
            graphics_mask: 0,
        }
    }

    pub fn size(&self) -> FrameSize {
        self.size
    }

    pub fn fill(mut self, value: u8) -> Self {
        self.pixels.fill(value);
        self
    }

    /// Pixels from a function of `(line, element)`.
    pub fn pattern(mut self, f: impl Fn(u32, u32) -> u8) -> Self {
        let elements = self.size.elements.max(1);
        for (i, px) in self.pixels.iter_mut().enumerate() {
            let i = i as u32;
            *px = f(i / elements, i % elements);
        }
        self
    }

    pub fn dirty(mut self, value: i32) -> Self {
        self.dirty = value;
        self
    }

    pub fn bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = bbox;
        self
    }

    pub fn mcv_dirty(mut self, value: i32) -> Self {
        self.mcv_dirty = value;
        self
    }

    pub fn mcv_bbox(mut self, bbox: BoundingBox) -> Self {
        self.mcv_bbox = bbox;
        self
    }

    pub fn stretch(mut self, level: usize, value: i32) -> Self {
        self.stretch[level] = value;
        self
    }

    pub fn color(mut self, level: usize, packed: u32) -> Self {
        self.color[level] = packed;
        self
    }

    pub fn graphics_color(mut self, level: usize, packed: u32) -> Self {
        self.graphics[level] = packed;
        self
    }

    pub fn graphics_mask(mut self, mask: u32) -> Self {
        self.graphics_mask = mask;
        self
    }

    fn record_len(&self) -> usize {
        pixel_offset(0, self.size.elements as usize) + self.pixels.len()
    }

    fn write(&self, bytes: &mut [u8], record: usize) {
        put(bytes, record + R_DIRTY, self.dirty);
        write_bbox(bytes, record + R_BBOX, self.bbox);
        put(bytes, record + R_MCV_DIRTY, self.mcv_dirty);
        write_bbox(bytes, record + R_MCV_BBOX, self.mcv_bbox);
        for level in 0..TABLE_ENTRIES {
            put(bytes, record + R_STRETCH_TABLE + level * WORD_SIZE, self.stretch[level]);
            put(bytes, record + R_COLOR_TABLE + level * WORD_SIZE, self.color[level] as i32);
            put(bytes, record + R_GRAPHICS_TABLE + level * WORD_SIZE, self.graphics[level] as i32);
        }
        put(bytes, record + R_GRAPHICS_MASK, self.graphics_mask as i32);

        let start = pixel_offset(record, self.size.elements as usize);
        bytes[start..start + self.pixels.len()].copy_from_slice(&self.pixels);
    }
}

fn write_bbox(bytes: &mut [u8], offset: usize, bbox: BoundingBox) {
    put(bytes, offset, bbox.ul_line);
    put(bytes, offset + WORD_SIZE, bbox.ul_elem);
    put(bytes, offset + 2 * WORD_SIZE, bbox.lr_line);
    put(bytes, offset + 3 * WORD_SIZE, bbox.lr_elem);
}

// =============================================================================
// MAIN ARENA BUILDER
// =============================================================================

/// Builds a main arena for frames `1..=frame_count`.
///
/// Defaults: current frame 1, every frame an empty `0x0` record, graphics
/// frame of `f` is `f`, every graphics list empty, graphics key 0.
#[derive(Debug, Clone)]
pub struct ArenaBuilder {
    frame_count: i32,
    current_frame: i32,
    frames: HashMap<i32, FrameSpec>,
    graphics_key: i32,
    graphics_frames: HashMap<i32, i32>,
    graphics_heads: HashMap<i32, i32>,
}

impl ArenaBuilder {
    pub fn new(frame_count: i32) -> Self {
        Self {
            frame_count,
            current_frame: 1,
            frames: HashMap::new(),
            graphics_key: 0,
            graphics_frames: HashMap::new(),
            graphics_heads: HashMap::new(),
        }
    }

    pub fn current_frame(mut self, frame: i32) -> Self {
        self.current_frame = frame;
        self
    }

    pub fn frame(mut self, frame: i32, spec: FrameSpec) -> Self {
        self.frames.insert(frame, spec);
        self
    }

    pub fn graphics_key(mut self, key: i32) -> Self {
        self.graphics_key = key;
        self
    }

    /// Route `frame`'s overlay to another frame's graphics list.
    pub fn graphics_frame(mut self, frame: i32, graphics_frame: i32) -> Self {
        self.graphics_frames.insert(frame, graphics_frame);
        self
    }

    /// First block index of `graphics_frame`'s list.
    pub fn graphics_head(mut self, graphics_frame: i32, head: i32) -> Self {
        self.graphics_heads.insert(graphics_frame, head);
        self
    }

    pub fn build(&self) -> HeapArena {
        let last = self.frame_count.max(0) as usize;
        let header_len = (W_GRAPHICS_FRAME_BASE + last + 1) * WORD_SIZE;

        let empty = FrameSpec::new(0, 0);
        let spec = |frame: i32| self.frames.get(&frame).unwrap_or(&empty);

        let mut offsets = Vec::with_capacity(last);
        let mut total = header_len;
        for frame in 1..=last as i32 {
            offsets.push((frame, total));
            total += spec(frame).record_len();
        }

        let mut bytes = vec![0u8; total];
        put(&mut bytes, W_FRAME_COUNT * WORD_SIZE, self.frame_count);
        put(&mut bytes, W_CURRENT_FRAME * WORD_SIZE, self.current_frame);
        put(&mut bytes, W_GRAPHICS_KEY * WORD_SIZE, self.graphics_key);

        for &(frame, record) in &offsets {
            let f = frame as usize;
            let spec = spec(frame);
            put(&mut bytes, (W_FRAME_OFFSET_BASE + f) * WORD_SIZE, record as i32);
            put(&mut bytes, (W_FRAME_SIZE_BASE + f) * WORD_SIZE, spec.size.to_packed());
            spec.write(&mut bytes, record);

            let graphics_frame = self.graphics_frames.get(&frame).copied().unwrap_or(frame);
            put(&mut bytes, (W_GRAPHICS_FRAME_BASE + f) * WORD_SIZE, graphics_frame);
            let head = self.graphics_heads.get(&frame).copied().unwrap_or(END_OF_LIST);
            put(&mut bytes, (W_GRAPHICS_HEAD_BASE + f) * WORD_SIZE, head);
        }

        HeapArena::from_bytes(bytes)
    }
}

// =============================================================================
// GRAPHICS ARENA BUILDER
// =============================================================================

/// Builds a graphics arena out of linked point blocks.
#[derive(Debug, Clone, Default)]
pub struct GraphicsBuilder {
    blocks: Vec<Option<(Vec<i32>, i32)>>,
}

impl GraphicsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a block at `index` with its points and `next` link.
    pub fn block(mut self, index: usize, points: &[i32], next: i32) -> Self {
        self.set(index, points, next);
        self
    }

    fn set(&mut self, index: usize, points: &[i32], next: i32) {
        if self.blocks.len() <= index {
            self.blocks.resize(index + 1, None);
        }
        self.blocks[index] = Some((points.to_vec(), next));
    }

    /// Store `points` in consecutive full blocks starting at `first`.
    ///
    /// Returns the head index, or `END_OF_LIST` for no points.
    pub fn chain(&mut self, first: usize, points: &[i32]) -> i32 {
        if points.is_empty() {
            return END_OF_LIST;
        }
        let chunks: Vec<&[i32]> = points.chunks(POINTS_PER_BLOCK).collect();
        for (i, chunk) in chunks.iter().enumerate() {
            let index = first + i;
            let next = if i + 1 == chunks.len() { END_OF_LIST } else { (index + 1) as i32 };
            self.set(index, chunk, next);
        }
        first as i32
    }

    pub fn build(&self) -> HeapArena {
        let mut bytes = vec![0u8; self.blocks.len().max(1) * BLOCK_SIZE];
        for (index, block) in self.blocks.iter().enumerate() {
            let Some((points, next)) = block else { continue };
            let base = block_offset(index);
            put(&mut bytes, base + B_NUMBER_OF_POINTS, points.len() as i32);
            for (i, &p) in points.iter().enumerate() {
                put(&mut bytes, base + B_POINTS_LIST + i * WORD_SIZE, p);
            }
            put(&mut bytes, base + B_NEXT_BLOCK, *next);
        }
        HeapArena::from_bytes(bytes)
    }
}

// =============================================================================
// HEAP PROVIDER
// =============================================================================

/// Hands out registered [`HeapArena`]s by key and tracks live attachments.
///
/// Clones share the registry and counters.
#[derive(Debug, Clone, Default)]
pub struct HeapProvider {
    segments: Arc<Mutex<HashMap<i32, HeapArena>>>,
    attaches: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
}

impl HeapProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: i32, arena: HeapArena) {
        self.segments.lock().insert(key, arena);
    }

    pub fn remove(&self, key: i32) -> Option<HeapArena> {
        self.segments.lock().remove(&key)
    }

    /// Successful attaches so far.
    pub fn attach_count(&self) -> usize {
        self.attaches.load(Ordering::SeqCst)
    }

    /// Segments attached and not yet dropped.
    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl SegmentProvider for HeapProvider {
    type Segment = HeapSegment;

    fn attach(&self, key: i32) -> io::Result<HeapSegment> {
        let arena = self.segments.lock().get(&key).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no segment registered for key {key}"))
        })?;
        self.attaches.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(HeapSegment {
            arena,
            live: Arc::clone(&self.live),
        })
    }
}

/// A [`HeapArena`] handed out by [`HeapProvider`].
#[derive(Debug)]
pub struct HeapSegment {
    arena: HeapArena,
    live: Arc<AtomicUsize>,
}

impl Arena for HeapSegment {
    #[inline]
    fn len(&self) -> usize {
        self.arena.len()
    }

    #[inline]
    fn read_bytes(&self, offset: usize, out: &mut [u8]) -> Result<()> {
        self.arena.read_bytes(offset, out)
    }

    #[inline]
    fn write_bytes(&self, offset: usize, data: &[u8]) -> Result<()> {
        self.arena.write_bytes(offset, data)
    }
}

impl Drop for HeapSegment {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_layout() {
        let arena = ArenaBuilder::new(3)
            .current_frame(2)
            .frame(2, FrameSpec::new(4, 5).fill(7))
            .build();
        assert_eq!(arena.read_word(W_FRAME_COUNT).unwrap(), 3);
        assert_eq!(arena.read_word(W_CURRENT_FRAME).unwrap(), 2);
        assert_eq!(arena.read_word(W_FRAME_SIZE_BASE + 2).unwrap(), 5 * 65_536 + 4);

        let record = arena.read_word(W_FRAME_OFFSET_BASE + 2).unwrap() as usize;
        let mut px = [0u8; 20];
        arena.read_bytes(pixel_offset(record, 5), &mut px).unwrap();
        assert_eq!(px, [7u8; 20]);
        assert_eq!(arena.read_word(W_GRAPHICS_HEAD_BASE + 3).unwrap(), END_OF_LIST);
    }

    #[test]
    fn test_chain_splits_blocks() {
        let mut g = GraphicsBuilder::new();
        let points: Vec<i32> = (0..300).collect();
        assert_eq!(g.chain(2, &points), 2);
        assert_eq!(g.chain(9, &[]), END_OF_LIST);
        let arena = g.build();
        assert_eq!(arena.len(), 4 * BLOCK_SIZE);
        assert_eq!(arena.read_i32_at(block_offset(2) + B_NUMBER_OF_POINTS).unwrap(), 254);
        assert_eq!(arena.read_i32_at(block_offset(2) + B_NEXT_BLOCK).unwrap(), 3);
        assert_eq!(arena.read_i32_at(block_offset(3) + B_NUMBER_OF_POINTS).unwrap(), 46);
        assert_eq!(arena.read_i32_at(block_offset(3) + B_NEXT_BLOCK).unwrap(), END_OF_LIST);
    }

    #[test]
    fn test_provider_counts_live_segments() {
        let provider = HeapProvider::new();
        provider.insert(1, HeapArena::zeroed(8));
        let a = provider.attach(1).unwrap();
        let b = provider.attach(1).unwrap();
        assert_eq!(provider.live_count(), 2);
        drop(a);
        assert_eq!(provider.live_count(), 1);
        drop(b);
        assert_eq!(provider.live_count(), 0);
        assert_eq!(provider.attach_count(), 2);
        assert_eq!(provider.attach(2).unwrap_err().kind(), io::ErrorKind::NotFound);
    }
}
