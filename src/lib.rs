//! # frame-store
//!
//! Read-only access to the McIDAS-X frame buffer held in shared memory.
//!
//! The producer (McIDAS-X) publishes frames into a System V segment: a word
//! directory, one fixed-layout record per frame with its color tables, the
//! raw image bytes, and a second segment of linked blocks holding vector
//! graphics points. Without shared memory it writes the same bytes to two
//! memory-mapped files instead. This crate attaches either transport,
//! resolves frame ids, copies data out, and runs the dirty-flag handshake
//! with the producer.
//!
//! ## Architecture
//!
//! ```text
//! C ABI (ffi)                        Rust API (FrameStoreSession)
//! ───────────                        ────────────────────────────
//! frame_store_* ────── lock ───────▶ attach / detach
//!   negative status codes            frame_count / current_frame
//!                                    resolve_frame_size / frame_header
//!                                    fetch_frame / is_dirty
//!                                    graphics_size / fetch_graphics
//!                                    read_frame_directory
//!                                         │
//!            ┌────────────────────────────┼──────────────────────┐
//!            ▼                            ▼                      ▼
//!   Arena (RawArena, HeapArena)   layout offsets           Frame<n>.0 files
//!            ▲                    graphics block walk      enhancement tables
//!            │
//!   SegmentProvider (SysV shmat/shmdt, MCIMEM/MCGMEM mapped files,
//!                    in-memory for tests)
//! ```
//!
//! ## Modules
//!
//! - [`layout`] - Word indices, record/block layouts, frame size packing
//! - [`arena`] - Bounds-checked word access over a segment
//! - [`shm`] - Segment providers (System V shared memory, mapped files)
//! - [`session`] - The session and every accessor
//! - [`dirty`] - Dirty-flag strategies
//! - [`graphics`] - Graphics block lists and point decoding
//! - [`directory`] - Frame directory files
//! - [`enhancement`] - RGB enhancement tables
//! - [`config`] - Environment-derived configuration
//! - [`error`] - Error type and C status codes
//! - [`ffi`] - C ABI exports
//! - [`testing`] - In-memory fixtures

pub mod arena;
pub mod config;
pub mod directory;
pub mod dirty;
pub mod enhancement;
pub mod error;
#[cfg(unix)]
pub mod ffi;
pub mod graphics;
pub mod layout;
pub mod session;
pub mod shm;
pub mod testing;

pub use arena::{Arena, HeapArena, RawArena};
pub use config::FrameStoreConfig;
pub use directory::FrameDirectory;
pub use dirty::{DirtyResult, DirtyStrategy};
pub use enhancement::{EnhancementTable, Rgb};
pub use error::{FrameStoreError, Result};
pub use graphics::{GraphicsPoint, GraphicsSummary, OverlayPoint};
pub use layout::{BoundingBox, FrameSize};
pub use session::{FetchOptions, FrameBuffers, FrameHeader, FrameImage, FrameStoreSession, ResolvedFrame};
pub use shm::{MappedFileProvider, MappedSegment, SegmentProvider};
#[cfg(unix)]
pub use shm::{ShmSegment, SysVShm};

/// Session over live System V shared memory.
#[cfg(unix)]
pub type ShmSession = FrameStoreSession<SysVShm>;

/// Session over McIDAS-X memory-mapped files.
pub type MappedSession = FrameStoreSession<MappedFileProvider>;
