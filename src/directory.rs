//! Frame directory files (`<prefix>/Frame<n>.0`).
//!
//! Each file is exactly 704 native-endian words with no header: frame
//! metadata in words 0-63, the navigation block in words 64-703. The
//! navigation block is carried as an opaque payload.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{FrameStoreError, Result};
use crate::layout::{FRAME_DIRECTORY_WORDS, NAV_BLOCK_START, WORD_SIZE};

// --- Metadata word indices ---
pub const D_SENSOR: usize = 0;
pub const D_CYD: usize = 1;
pub const D_HMS: usize = 2;
pub const D_BAND: usize = 3;
pub const D_UL_LINE: usize = 4;
pub const D_UL_ELEM: usize = 5;
pub const D_LINE_RES: usize = 10;
pub const D_ELEM_RES: usize = 11;
pub const D_LINE_MAG: usize = 19;
pub const D_ELEM_MAG: usize = 20;

/// Sensor number meaning "no source".
pub const NO_SENSOR: i32 = -1;

// =============================================================================
// PATH RESOLUTION
// =============================================================================

/// Directory file for `frame` under the last entry of a colon-delimited
/// path list (or the whole list when it has no colon).
pub fn directory_path(path_list: &str, frame: i32) -> PathBuf {
    let prefix = path_list.rsplit(':').next().unwrap_or(path_list);
    PathBuf::from(format!("{prefix}/Frame{frame}.0"))
}

/// Read and validate a directory file.
pub fn read_directory_file(path: &Path) -> Result<FrameDirectory> {
    let file = File::open(path).map_err(|source| FrameStoreError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let expected_bytes = FRAME_DIRECTORY_WORDS * WORD_SIZE;
    let mut bytes = Vec::with_capacity(expected_bytes);
    file.take(expected_bytes as u64)
        .read_to_end(&mut bytes)
        .map_err(|source| FrameStoreError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    if bytes.len() < expected_bytes {
        return Err(FrameStoreError::ShortRead {
            path: path.to_path_buf(),
            expected: FRAME_DIRECTORY_WORDS,
            actual: bytes.len() / WORD_SIZE,
        });
    }

    let mut words = Box::new([0i32; FRAME_DIRECTORY_WORDS]);
    for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(WORD_SIZE)) {
        *word = i32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    Ok(FrameDirectory { words })
}

// =============================================================================
// FRAME DIRECTORY
// =============================================================================

/// The 704-word directory of one frame.
#[derive(Clone, PartialEq, Eq)]
pub struct FrameDirectory {
    words: Box<[i32; FRAME_DIRECTORY_WORDS]>,
}

impl FrameDirectory {
    pub fn from_words(words: [i32; FRAME_DIRECTORY_WORDS]) -> Self {
        Self { words: Box::new(words) }
    }

    /// All 704 words, as read.
    #[inline]
    pub fn words(&self) -> &[i32; FRAME_DIRECTORY_WORDS] {
        &self.words
    }

    /// Sensor source number, `None` when the frame has no source.
    pub fn sensor(&self) -> Option<i32> {
        Some(self.words[D_SENSOR]).filter(|&s| s != NO_SENSOR)
    }

    /// Date as `yyddd` or `ccyyddd`.
    pub fn cyd(&self) -> i32 {
        self.words[D_CYD]
    }

    /// Time as `hhmmss`.
    pub fn hms(&self) -> i32 {
        self.words[D_HMS]
    }

    pub fn band(&self) -> i32 {
        self.words[D_BAND]
    }

    /// Upper-left corner in satellite coordinates `(line, element)`.
    pub fn upper_left(&self) -> (i32, i32) {
        (self.words[D_UL_LINE], self.words[D_UL_ELEM])
    }

    /// `(line, element)` resolution.
    pub fn resolution(&self) -> (i32, i32) {
        (self.words[D_LINE_RES], self.words[D_ELEM_RES])
    }

    /// `(line, element)` magnification.
    pub fn magnification(&self) -> (i32, i32) {
        (self.words[D_LINE_MAG], self.words[D_ELEM_MAG])
    }

    /// Navigation block, words 64-703.
    pub fn navigation(&self) -> &[i32] {
        &self.words[NAV_BLOCK_START..]
    }

    /// Nominal image time as seconds since the Unix epoch.
    pub fn nominal_time_secs(&self) -> Option<i64> {
        day_time_to_secs(self.cyd(), self.hms())
    }
}

impl std::fmt::Debug for FrameDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameDirectory")
            .field("sensor", &self.sensor())
            .field("cyd", &self.cyd())
            .field("hms", &self.hms())
            .field("band", &self.band())
            .field("upper_left", &self.upper_left())
            .field("resolution", &self.resolution())
            .field("magnification", &self.magnification())
            .finish_non_exhaustive()
    }
}

/// McIDAS day/time to Unix seconds.
///
/// Years below 1900 count from 1900 (`105001` is 2005 day 1); years from
/// 1900 up are taken as written (`2005001`).
pub fn day_time_to_secs(cyd: i32, hms: i32) -> Option<i64> {
    if cyd < 0 || hms < 0 {
        return None;
    }
    let year = cyd / 1000;
    let year = if year >= 1900 { year } else { 1900 + year };
    let day = cyd % 1000;
    let days_in_year = if is_leap(year) { 366 } else { 365 };
    if day < 1 || day > days_in_year {
        return None;
    }

    let (h, m, s) = (hms / 10_000, hms / 100 % 100, hms % 100);
    if h > 23 || m > 59 || s > 59 {
        return None;
    }

    let days = days_from_civil(year as i64) + (day as i64 - 1);
    Some(days * 86_400 + (h * 3600 + m * 60 + s) as i64)
}

fn is_leap(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Days from 1970-01-01 to January 1st of `year`.
fn days_from_civil(year: i64) -> i64 {
    // Proleptic Gregorian, counting from March to put leap days last
    let y = year - 1;
    let era = y.div_euclid(400);
    let yoe = y - era * 400;
    let doy = 306; // Jan 1 is day 306 of the March-based year
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}
