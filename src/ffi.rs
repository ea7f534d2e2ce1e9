//! C ABI over one process-wide session.
//!
//! Every export returns an `i32`: a value or `0` on success, a negative
//! [`FrameStoreError::status_code`] on failure. `frame_store_dirty` reports
//! every failure as [`DIRTY_FAILURE`] instead, since its success range
//! already covers negative values.
//!
//! The session is created on first use from the process environment and
//! lives behind a mutex, so calls from different threads serialize.

use std::slice;

use parking_lot::{Mutex, const_mutex};

use crate::error::{FrameStoreError, Result};
use crate::layout::{FRAME_DIRECTORY_WORDS, FrameSize, TABLE_ENTRIES};
use crate::session::{FetchOptions, FrameBuffers, FrameStoreSession};
use crate::shm::SysVShm;

/// `frame_store_dirty` failure sentinel.
pub const DIRTY_FAILURE: i32 = -666;

/// A required pointer argument was null.
pub const MISUSE: i32 = -99;

// =============================================================================
// GLOBAL STATE
// =============================================================================

static SESSION: Mutex<Option<FrameStoreSession<SysVShm>>> = const_mutex(None);

fn with_session<T>(f: impl FnOnce(&mut FrameStoreSession<SysVShm>) -> Result<T>) -> Result<T> {
    let mut guard = SESSION.lock();
    let session = guard.get_or_insert_with(FrameStoreSession::from_env);
    f(session)
}

fn status(result: Result<i32>) -> i32 {
    result.unwrap_or_else(|e| e.status_code())
}

/// Only a flag of exactly 1 selects a part.
fn fetch_options(pixels: i32, tables: i32) -> FetchOptions {
    let mut options = FetchOptions::empty();
    options.set(FetchOptions::PIXELS, pixels == 1);
    options.set(FetchOptions::TABLES, tables == 1);
    options
}

fn to_status(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

// =============================================================================
// FFI EXPORTS
// =============================================================================

/// Attach the main arena. A negative `key` means "no explicit key": use the
/// remembered key or `MCENV_POSUC`.
#[unsafe(no_mangle)]
pub extern "C" fn frame_store_attach(key: i32) -> i32 {
    let key = (key >= 0).then_some(key);
    status(with_session(|s| s.attach(key).map(|()| 0)))
}

/// Release the main arena. Always succeeds.
#[unsafe(no_mangle)]
pub extern "C" fn frame_store_detach() -> i32 {
    if let Some(session) = SESSION.lock().as_mut() {
        session.detach();
    }
    0
}

#[unsafe(no_mangle)]
pub extern "C" fn frame_store_frame_count() -> i32 {
    status(with_session(|s| s.frame_count()))
}

#[unsafe(no_mangle)]
pub extern "C" fn frame_store_current_frame() -> i32 {
    status(with_session(|s| s.current_frame()))
}

/// Resolve `*frame` (negative = current frame) and write its dimensions.
///
/// # Safety
///
/// All three pointers must be valid for writes of one `i32`; `frame` also
/// for a read.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn frame_store_frame_size(
    frame: *mut i32,
    lines: *mut i32,
    elements: *mut i32,
) -> i32 {
    if frame.is_null() || lines.is_null() || elements.is_null() {
        return MISUSE;
    }
    let requested = unsafe { *frame };
    status(with_session(|s| {
        let resolved = s.resolve_frame_size(requested)?;
        unsafe {
            *frame = resolved.frame;
            *lines = resolved.size.lines as i32;
            *elements = resolved.size.elements as i32;
        }
        Ok(0)
    }))
}

/// Copy a frame's pixels and/or tables. A `pixels` / `tables` flag of
/// exactly 1 selects the part; any other value omits it, and an omitted
/// part gets a 0 in its first element.
///
/// # Safety
///
/// `img` must be writable for `lines * elements` bytes when `pixels` is 1,
/// else for one byte. `stretch`, `color` and `graphics` must be writable
/// for 256 entries when `tables` is 1, else for one.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn frame_store_fetch_frame(
    pixels: i32,
    tables: i32,
    frame: i32,
    lines: i32,
    elements: i32,
    img: *mut u8,
    stretch: *mut i32,
    color: *mut u32,
    graphics: *mut u32,
) -> i32 {
    if img.is_null() || stretch.is_null() || color.is_null() || graphics.is_null() {
        return MISUSE;
    }
    if lines < 0 || elements < 0 {
        return FrameStoreError::InvalidFrame { frame, count: None }.status_code();
    }

    let options = fetch_options(pixels, tables);
    let size = FrameSize::new(lines as u32, elements as u32);
    let pixel_len = if options.include_pixels() { size.pixel_count() } else { 1 };
    let table_len = if options.include_tables() { TABLE_ENTRIES } else { 1 };

    let out = unsafe {
        FrameBuffers {
            pixels: slice::from_raw_parts_mut(img, pixel_len),
            stretch: slice::from_raw_parts_mut(stretch, table_len),
            color: slice::from_raw_parts_mut(color, table_len),
            graphics: slice::from_raw_parts_mut(graphics, table_len),
        }
    };
    status(with_session(|s| s.fetch_frame_into(frame, size, options, out).map(|()| 0)))
}

/// Query and consume a frame's McV dirty flag. Returns the value reported
/// by the configured strategy, or [`DIRTY_FAILURE`].
#[unsafe(no_mangle)]
pub extern "C" fn frame_store_dirty(frame: i32) -> i32 {
    with_session(|s| s.is_dirty(frame))
        .map(|r| r.value)
        .unwrap_or(DIRTY_FAILURE)
}

/// # Safety
///
/// All three pointers must be valid for writes of one `i32`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn frame_store_graphics_size(
    frame: i32,
    npts: *mut i32,
    nblocks: *mut i32,
    mask: *mut i32,
) -> i32 {
    if npts.is_null() || nblocks.is_null() || mask.is_null() {
        return MISUSE;
    }
    status(with_session(|s| {
        let summary = s.graphics_size(frame)?;
        unsafe {
            *npts = to_status(summary.points);
            *nblocks = to_status(summary.blocks);
            *mask = summary.mask as i32;
        }
        Ok(0)
    }))
}

/// Copy up to `npts` raw graphics points into `gra`, zeroing the rest.
/// Returns the number copied.
///
/// # Safety
///
/// `gra` must be writable for `npts` entries.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn frame_store_fetch_graphics(frame: i32, npts: i32, gra: *mut i32) -> i32 {
    if gra.is_null() || npts < 0 {
        return MISUSE;
    }
    let out = unsafe { slice::from_raw_parts_mut(gra, npts as usize) };
    status(with_session(|s| s.fetch_graphics_into(frame, out).map(to_status)))
}

/// Read `Frame<frame>.0` into `frmdir`.
///
/// # Safety
///
/// `frmdir` must be writable for 704 entries.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn frame_store_frame_directory(frame: i32, frmdir: *mut i32) -> i32 {
    if frmdir.is_null() {
        return MISUSE;
    }
    status(with_session(|s| {
        let directory = s.read_frame_directory(frame)?;
        let out = unsafe { slice::from_raw_parts_mut(frmdir, FRAME_DIRECTORY_WORDS) };
        out.copy_from_slice(directory.words());
        Ok(0)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_pointers_are_misuse() {
        let mut x = 0i32;
        unsafe {
            assert_eq!(frame_store_frame_size(std::ptr::null_mut(), &mut x, &mut x), MISUSE);
            assert_eq!(
                frame_store_graphics_size(1, &mut x, std::ptr::null_mut(), &mut x),
                MISUSE
            );
            assert_eq!(frame_store_fetch_graphics(1, 4, std::ptr::null_mut()), MISUSE);
            assert_eq!(frame_store_frame_directory(1, std::ptr::null_mut()), MISUSE);
        }
    }

    #[test]
    fn test_directory_frame_zero_rejected() {
        let mut words = [0i32; FRAME_DIRECTORY_WORDS];
        let code = unsafe { frame_store_frame_directory(0, words.as_mut_ptr()) };
        assert_eq!(code, FrameStoreError::InvalidDirectoryFrame { frame: 0 }.status_code());
    }

    #[test]
    fn test_fetch_flags_must_be_one() {
        assert_eq!(fetch_options(1, 1), FetchOptions::PIXELS | FetchOptions::TABLES);
        assert_eq!(fetch_options(1, 0), FetchOptions::PIXELS);
        assert_eq!(fetch_options(0, 1), FetchOptions::TABLES);
        assert_eq!(fetch_options(2, -1), FetchOptions::empty());
    }

    #[test]
    fn test_detach_without_attach() {
        assert_eq!(frame_store_detach(), 0);
        assert_eq!(frame_store_detach(), 0);
    }
}
