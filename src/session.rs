//! Frame Store Session - the reader's process state and every accessor.
//!
//! A session owns the main arena attachment, the remembered key and the
//! last serviced frame. Every accessor attaches on demand, computes offsets
//! from [`crate::layout`], and copies data out. The graphics arena is
//! attached per call and released when the call returns, on every path.
//!
//! The transport is the provider's business: System V shared memory in
//! production, memory-mapped files where McIDAS-X runs without it
//! ([`FrameStoreSession::mapped`]), heap buffers in tests.
//!
//! The session is `&mut self` throughout; callers sharing one across threads
//! wrap it in a mutex (the C ABI layer does).

use bitflags::bitflags;
use tracing::{debug, warn};

use crate::arena::Arena;
use crate::config::FrameStoreConfig;
use crate::directory::{self, FrameDirectory};
use crate::dirty::DirtyResult;
use crate::enhancement::EnhancementTable;
use crate::error::{FrameStoreError, Result};
use crate::graphics::{self, GraphicsSummary};
use crate::layout::*;
use crate::shm::{MappedFileProvider, SegmentProvider};

// =============================================================================
// FETCH OPTIONS
// =============================================================================

bitflags! {
    /// Parts of a frame to copy out. An omitted part is not an error: its
    /// output gets a 0 in the first element instead.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FetchOptions: u32 {
        const PIXELS = 1 << 0;
        const TABLES = 1 << 1;
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::PIXELS | Self::TABLES
    }
}

impl FetchOptions {
    #[inline]
    pub fn include_pixels(self) -> bool {
        self.contains(Self::PIXELS)
    }

    #[inline]
    pub fn include_tables(self) -> bool {
        self.contains(Self::TABLES)
    }
}

// =============================================================================
// OUTPUT TYPES
// =============================================================================

/// A frame id after `-1` substitution, with its dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedFrame {
    pub frame: i32,
    pub size: FrameSize,
}

/// Caller-owned destination for [`FrameStoreSession::fetch_frame_into`].
///
/// Preconditions (not checked beyond slice bounds): with `PIXELS`,
/// `pixels` holds at least `lines * elements` bytes; with `TABLES`, each
/// table holds at least 256 entries; an omitted part still needs one
/// element to receive the 0 marker.
pub struct FrameBuffers<'a> {
    pub pixels: &'a mut [u8],
    pub stretch: &'a mut [i32],
    pub color: &'a mut [u32],
    pub graphics: &'a mut [u32],
}

/// An owned copy of one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameImage {
    pub frame: i32,
    pub size: FrameSize,
    /// `lines * elements` bytes, or a single 0 when pixels were skipped
    pub pixels: Vec<u8>,
    pub stretch: [i32; TABLE_ENTRIES],
    pub color: [u32; TABLE_ENTRIES],
    pub graphics: [u32; TABLE_ENTRIES],
}

impl FrameImage {
    pub fn enhancement(&self) -> EnhancementTable {
        EnhancementTable::from_tables(&self.stretch, &self.color)
    }
}

/// The non-table part of a `FrameRecord`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameHeader {
    pub dirty: i32,
    pub bbox: BoundingBox,
    pub mcv_dirty: i32,
    pub mcv_bbox: BoundingBox,
    pub graphics_mask: u32,
}

/// Main-arena words needed to walk a frame's graphics list.
struct GraphicsTarget {
    graphics_frame: i32,
    head: i32,
    main_key: i32,
    key: i32,
}

/// The main arena and the key it was attached with.
struct Attached<S> {
    key: i32,
    segment: S,
}

// =============================================================================
// SESSION
// =============================================================================

/// Reader state over one main arena.
pub struct FrameStoreSession<P: SegmentProvider> {
    provider: P,
    config: FrameStoreConfig,
    arena: Option<Attached<P::Segment>>,
    remembered_key: Option<i32>,
    last_serviced_frame: i32,
}

impl<P: SegmentProvider + Default> FrameStoreSession<P> {
    /// Session configured from `MCENV_POSUC` / `MCPATH`.
    pub fn from_env() -> Self {
        Self::new(P::default(), FrameStoreConfig::from_env())
    }
}

impl FrameStoreSession<MappedFileProvider> {
    /// Session over the memory-mapped files named by `MCVTEMP` / `MCVNUM`.
    ///
    /// The session number becomes the key and `MCVNUM` the variable named
    /// when it is missing.
    pub fn mapped(mut config: FrameStoreConfig) -> Result<Self> {
        let prefix = config
            .temp_prefix
            .clone()
            .ok_or_else(|| FrameStoreError::NoPath {
                var: config.temp_var.clone(),
            })?;
        config.key_var = config.session_var.clone();
        config.key = config.session_number;
        Ok(Self::new(MappedFileProvider::new(prefix), config))
    }
}

impl<P: SegmentProvider> FrameStoreSession<P> {
    pub fn new(provider: P, config: FrameStoreConfig) -> Self {
        Self {
            provider,
            config,
            arena: None,
            remembered_key: None,
            last_serviced_frame: 0,
        }
    }

    #[inline]
    pub fn config(&self) -> &FrameStoreConfig {
        &self.config
    }

    #[inline]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    #[inline]
    pub fn is_attached(&self) -> bool {
        self.arena.is_some()
    }

    /// Key captured by the first successful attach.
    #[inline]
    pub fn remembered_key(&self) -> Option<i32> {
        self.remembered_key
    }

    /// Frame whose dirty flag was last serviced.
    #[inline]
    pub fn last_serviced_frame(&self) -> i32 {
        self.last_serviced_frame
    }

    // =========================================================================
    // ATTACHMENT
    // =========================================================================

    /// Attach the main arena. A no-op when already attached.
    ///
    /// Key precedence: `key`, then the remembered key, then the configured
    /// environment key.
    pub fn attach(&mut self, key: Option<i32>) -> Result<()> {
        if self.arena.is_none() {
            let attached = self.open(key)?;
            self.arena = Some(attached);
        }
        Ok(())
    }

    /// Release the main arena. Safe when not attached.
    pub fn detach(&mut self) {
        if self.arena.take().is_some() {
            debug!(target: "frame_store::session", "detached main arena");
        }
    }

    fn open(&mut self, key: Option<i32>) -> Result<Attached<P::Segment>> {
        let key = key
            .or(self.remembered_key)
            .or(self.config.key)
            .ok_or_else(|| FrameStoreError::NoKey {
                var: self.config.key_var.clone(),
            })?;

        match self.provider.attach(key) {
            Ok(segment) => {
                debug!(target: "frame_store::session", key, len = segment.len(), "attached main arena");
                self.remembered_key.get_or_insert(key);
                Ok(Attached { key, segment })
            }
            Err(source) => {
                warn!(target: "frame_store::session", key, error = %source, "unable to attach shared memory");
                Err(FrameStoreError::Attach { key, source })
            }
        }
    }

    /// The attachment, attaching on demand.
    fn attached(&mut self) -> Result<&Attached<P::Segment>> {
        let attached = match self.arena.take() {
            Some(attached) => attached,
            None => self.open(None)?,
        };
        Ok(self.arena.insert(attached))
    }

    fn arena(&mut self) -> Result<&P::Segment> {
        Ok(&self.attached()?.segment)
    }

    // =========================================================================
    // FRAME METADATA
    // =========================================================================

    /// Highest valid frame id.
    pub fn frame_count(&mut self) -> Result<i32> {
        self.arena()?.read_word(W_FRAME_COUNT)
    }

    /// Frame currently displayed by the producer.
    pub fn current_frame(&mut self) -> Result<i32> {
        self.arena()?.read_word(W_CURRENT_FRAME)
    }

    /// Resolve a frame id (negative = current frame) and decode its size.
    ///
    /// A frame beyond the frame count detaches the arena: the attachment
    /// is likely stale.
    pub fn resolve_frame_size(&mut self, frame: i32) -> Result<ResolvedFrame> {
        let frame = if frame < 0 { self.current_frame()? } else { frame };

        let count = self.frame_count()?;
        if frame > count {
            warn!(target: "frame_store::session", frame, count, "invalid frame number");
            self.detach();
            return Err(FrameStoreError::InvalidFrame {
                frame,
                count: Some(count),
            });
        }

        let packed = self.arena()?.read_word(frame_word(W_FRAME_SIZE_BASE, frame)?)?;
        Ok(ResolvedFrame {
            frame,
            size: FrameSize::from_packed(packed),
        })
    }

    /// Decode the flags and bounding boxes of a frame's record.
    pub fn frame_header(&mut self, frame: i32) -> Result<FrameHeader> {
        let arena = self.arena()?;
        let record = record_offset(arena, frame)?;
        Ok(FrameHeader {
            dirty: arena.read_i32_at(record + R_DIRTY)?,
            bbox: read_bbox(arena, record + R_BBOX)?,
            mcv_dirty: arena.read_i32_at(record + R_MCV_DIRTY)?,
            mcv_bbox: read_bbox(arena, record + R_MCV_BBOX)?,
            graphics_mask: arena.read_i32_at(record + R_GRAPHICS_MASK)? as u32,
        })
    }

    // =========================================================================
    // BULK FETCH
    // =========================================================================

    /// Copy a frame's pixels and/or tables into caller buffers.
    ///
    /// `size` is trusted as given; see [`FrameBuffers`] for the buffer
    /// preconditions.
    pub fn fetch_frame_into(
        &mut self,
        frame: i32,
        size: FrameSize,
        options: FetchOptions,
        out: FrameBuffers<'_>,
    ) -> Result<()> {
        let arena = self.arena()?;
        let record = record_offset(arena, frame)?;

        if options.include_pixels() {
            let start = pixel_offset(record, size.elements as usize);
            arena.read_bytes(start, &mut out.pixels[..size.pixel_count()])?;
        } else {
            out.pixels[0] = 0;
        }

        if options.include_tables() {
            let mut raw = [0u8; 3 * TABLE_BYTES];
            arena.read_bytes(record + R_STRETCH_TABLE, &mut raw)?;
            let (stretch, rest) = raw.split_at(TABLE_BYTES);
            let (color, graphics) = rest.split_at(TABLE_BYTES);
            decode_table(stretch, &mut out.stretch[..TABLE_ENTRIES], i32::from_ne_bytes);
            decode_table(color, &mut out.color[..TABLE_ENTRIES], u32::from_ne_bytes);
            decode_table(graphics, &mut out.graphics[..TABLE_ENTRIES], u32::from_ne_bytes);
        } else {
            out.stretch[0] = 0;
            out.color[0] = 0;
            out.graphics[0] = 0;
        }
        Ok(())
    }

    /// Owned variant of [`Self::fetch_frame_into`].
    pub fn fetch_frame(
        &mut self,
        frame: i32,
        size: FrameSize,
        options: FetchOptions,
    ) -> Result<FrameImage> {
        let pixel_len = if options.include_pixels() { size.pixel_count() } else { 1 };
        let mut image = FrameImage {
            frame,
            size,
            pixels: vec![0; pixel_len],
            stretch: [0; TABLE_ENTRIES],
            color: [0; TABLE_ENTRIES],
            graphics: [0; TABLE_ENTRIES],
        };
        self.fetch_frame_into(
            frame,
            size,
            options,
            FrameBuffers {
                pixels: &mut image.pixels,
                stretch: &mut image.stretch,
                color: &mut image.color,
                graphics: &mut image.graphics,
            },
        )?;
        Ok(image)
    }

    // =========================================================================
    // DIRTY FLAG
    // =========================================================================

    /// Query and consume a frame's McV dirty flag.
    ///
    /// A frame other than the last serviced one always reports dirty. When
    /// dirty, the McV word is cleared so the next query sees the producer's
    /// next change only.
    pub fn is_dirty(&mut self, frame: i32) -> Result<DirtyResult> {
        let ResolvedFrame { frame, .. } = self.resolve_frame_size(frame)?;
        let switched = frame != self.last_serviced_frame;
        let strategy = self.config.dirty_strategy;

        let arena = self.arena()?;
        let word = record_offset(arena, frame)? + R_MCV_DIRTY;
        let raw = arena.read_i32_at(word)?;
        let result = strategy.evaluate(frame, switched, raw);
        if result.changed {
            arena.write_i32_at(word, 0)?;
        }

        self.last_serviced_frame = frame;
        Ok(result)
    }

    // =========================================================================
    // GRAPHICS
    // =========================================================================

    fn graphics_target(&mut self, frame: i32) -> Result<GraphicsTarget> {
        let Attached { key: main_key, segment: arena } = self.attached()?;
        let graphics_frame = arena.read_word(frame_word(W_GRAPHICS_FRAME_BASE, frame)?)?;
        let head = arena.read_word(frame_word(W_GRAPHICS_HEAD_BASE, graphics_frame)?)?;
        let key = arena.read_word(W_GRAPHICS_KEY)?;
        Ok(GraphicsTarget {
            graphics_frame,
            head,
            main_key: *main_key,
            key,
        })
    }

    /// Attach the graphics arena for the duration of one call.
    ///
    /// Failure also detaches the main arena.
    fn attach_graphics(&mut self, target: &GraphicsTarget) -> Result<P::Segment> {
        let key = target.key;
        match self.provider.attach_graphics(target.main_key, key) {
            Ok(segment) => Ok(segment),
            Err(source) => {
                warn!(target: "frame_store::session", key, error = %source, "unable to attach graphics shared memory");
                self.detach();
                Err(FrameStoreError::GraphicsAttach { key, source })
            }
        }
    }

    /// Count a frame's graphics points and blocks, and read its color mask.
    pub fn graphics_size(&mut self, frame: i32) -> Result<GraphicsSummary> {
        let target = self.graphics_target(frame)?;
        let mask = {
            let arena = self.arena()?;
            let record = record_offset(arena, target.graphics_frame)?;
            arena.read_i32_at(record + R_GRAPHICS_MASK)? as u32
        };

        let segment = self.attach_graphics(&target)?;
        let (points, blocks) = graphics::count_points(&segment, frame, target.head)?;

        debug!(
            target: "frame_store::session",
            frame,
            graphics_frame = target.graphics_frame,
            points,
            blocks,
            "graphics size"
        );
        Ok(GraphicsSummary { points, blocks, mask })
    }

    /// Copy up to `out.len()` raw packed points; the rest of `out` is zeroed.
    ///
    /// Returns the number of points copied.
    pub fn fetch_graphics_into(&mut self, frame: i32, out: &mut [i32]) -> Result<usize> {
        out.fill(0);
        let target = self.graphics_target(frame)?;
        let segment = self.attach_graphics(&target)?;
        let copied = graphics::copy_points(&segment, frame, target.head, out)?;

        debug!(target: "frame_store::session", frame, copied, capacity = out.len(), "fetched graphics");
        Ok(copied)
    }

    /// Owned variant of [`Self::fetch_graphics_into`] holding at most
    /// `capacity` points.
    pub fn fetch_graphics(&mut self, frame: i32, capacity: usize) -> Result<Vec<i32>> {
        let mut points = vec![0; capacity];
        let copied = self.fetch_graphics_into(frame, &mut points)?;
        points.truncate(copied);
        Ok(points)
    }

    // =========================================================================
    // FRAME DIRECTORY
    // =========================================================================

    /// Read `Frame<frame>.0` from the last directory of the path list.
    pub fn read_frame_directory(&self, frame: i32) -> Result<FrameDirectory> {
        if frame < 1 {
            return Err(FrameStoreError::InvalidDirectoryFrame { frame });
        }
        let paths = self
            .config
            .path_list
            .as_deref()
            .ok_or_else(|| FrameStoreError::NoPath {
                var: self.config.path_var.clone(),
            })?;

        let path = directory::directory_path(paths, frame);
        debug!(target: "frame_store::session", frame, path = %path.display(), "reading frame directory");
        directory::read_directory_file(&path)
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Byte offset of a frame's record.
///
/// The table entry is read as unsigned, so a garbage negative entry fails
/// the bounds check rather than wrapping.
fn record_offset<A: Arena>(arena: &A, frame: i32) -> Result<usize> {
    let offset = arena.read_word(frame_word(W_FRAME_OFFSET_BASE, frame)?)?;
    Ok(offset as u32 as usize)
}

fn read_bbox<A: Arena>(arena: &A, offset: usize) -> Result<BoundingBox> {
    let mut w = [0i32; 4];
    arena.read_i32s_at(offset, &mut w)?;
    Ok(BoundingBox {
        ul_line: w[0],
        ul_elem: w[1],
        lr_line: w[2],
        lr_elem: w[3],
    })
}

fn decode_table<T>(bytes: &[u8], out: &mut [T], decode: fn([u8; WORD_SIZE]) -> T) {
    for (slot, chunk) in out.iter_mut().zip(bytes.chunks_exact(WORD_SIZE)) {
        *slot = decode([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
}

// =============================================================================
// TESTS
// =============================================================================
