//! Segment providers - how an arena gets attached.
//!
//! A [`SegmentProvider`] turns a key into an attached [`Arena`]. Dropping the
//! segment detaches it, so scoped acquisition falls out of ownership.
//!
//! McIDAS-X publishes System V shared memory; the "key" it hands out is the
//! segment id passed straight to `shmat(2)`. Where shared memory is not
//! available it writes the same bytes to memory-mapped files instead, named
//! after the session number ([`MappedFileProvider`]).

use std::io;

use crate::arena::Arena;

/// Attaches segments by key.
pub trait SegmentProvider {
    type Segment: Arena;

    /// Attach the segment identified by `key`. Single attempt, no retry.
    fn attach(&self, key: i32) -> io::Result<Self::Segment>;

    /// Attach the graphics segment belonging to the main arena attached
    /// with `main_key`. `graphics_key` is the key the main arena publishes.
    fn attach_graphics(&self, main_key: i32, graphics_key: i32) -> io::Result<Self::Segment> {
        let _ = main_key;
        self.attach(graphics_key)
    }
}

pub use mapped::{GRAPHICS_FILE_STEM, MAIN_FILE_STEM, MappedFileProvider, MappedSegment};

#[cfg(unix)]
pub use sysv::{ShmSegment, SysVShm};

#[cfg(unix)]
mod sysv {
    use std::io;
    use std::ptr;

    use tracing::debug;

    use super::SegmentProvider;
    use crate::arena::{Arena, RawArena};
    use crate::error::Result;

    /// System V shared memory via `shmat`/`shmdt`.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SysVShm;

    /// An attached System V segment; detaches on drop.
    pub struct ShmSegment {
        id: i32,
        arena: RawArena,
    }

    impl ShmSegment {
        /// Segment id this mapping was attached from.
        pub fn id(&self) -> i32 {
            self.id
        }
    }

    impl SegmentProvider for SysVShm {
        type Segment = ShmSegment;

        fn attach(&self, key: i32) -> io::Result<ShmSegment> {
            // Size comes from the kernel so every access can be bounds-checked
            let mut stat: libc::shmid_ds = unsafe { std::mem::zeroed() };
            if unsafe { libc::shmctl(key, libc::IPC_STAT, &mut stat) } != 0 {
                return Err(io::Error::last_os_error());
            }
            let len = stat.shm_segsz as usize;

            let addr = unsafe { libc::shmat(key, ptr::null(), 0) };
            if addr as isize == -1 {
                return Err(io::Error::last_os_error());
            }

            debug!(target: "frame_store::shm", id = key, len, "attached segment");
            let arena = unsafe { RawArena::from_raw(addr.cast::<u8>(), len) };
            Ok(ShmSegment { id: key, arena })
        }
    }

    impl Arena for ShmSegment {
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

    impl Drop for ShmSegment {
        fn drop(&mut self) {
            let addr = self.arena.as_ptr().cast::<libc::c_void>();
            if unsafe { libc::shmdt(addr) } != 0 {
                debug!(
                    target: "frame_store::shm",
                    id = self.id,
                    error = %io::Error::last_os_error(),
                    "shmdt failed"
                );
            } else {
                debug!(target: "frame_store::shm", id = self.id, "detached segment");
            }
        }
    }

}

mod mapped {
    use std::fs::{File, OpenOptions};
    use std::io;
    use std::path::{Path, PathBuf};

    use memmap2::{Mmap, MmapMut, MmapOptions};
    use tracing::debug;

    use super::SegmentProvider;
    use crate::arena::{Arena, RawArena};
    use crate::error::{FrameStoreError, Result};

    /// File name of the main arena, between prefix and session number
    pub const MAIN_FILE_STEM: &str = "MCIMEM";

    /// File name of the graphics arena, between prefix and session number
    pub const GRAPHICS_FILE_STEM: &str = "MCGMEM";

    /// Memory-mapped files in place of shared memory.
    ///
    /// The key is the session number: key `n` maps `<prefix>MCIMEM<n>`
    /// read-write, and its graphics arena is `<prefix>MCGMEM<n>`, mapped
    /// read-only. The graphics key published in the main arena is ignored.
    /// The prefix is joined verbatim, so a directory needs its trailing
    /// separator.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct MappedFileProvider {
        prefix: String,
    }

    impl MappedFileProvider {
        pub fn new(prefix: impl Into<String>) -> Self {
            Self { prefix: prefix.into() }
        }

        #[inline]
        pub fn prefix(&self) -> &str {
            &self.prefix
        }

        pub fn main_path(&self, number: i32) -> PathBuf {
            PathBuf::from(format!("{}{MAIN_FILE_STEM}{number}", self.prefix))
        }

        pub fn graphics_path(&self, number: i32) -> PathBuf {
            PathBuf::from(format!("{}{GRAPHICS_FILE_STEM}{number}", self.prefix))
        }
    }

    impl SegmentProvider for MappedFileProvider {
        type Segment = MappedSegment;

        fn attach(&self, key: i32) -> io::Result<MappedSegment> {
            MappedSegment::open_writable(&self.main_path(key))
        }

        fn attach_graphics(&self, main_key: i32, _graphics_key: i32) -> io::Result<MappedSegment> {
            MappedSegment::open_read_only(&self.graphics_path(main_key))
        }
    }

    enum Mapping {
        Writable(MmapMut),
        ReadOnly(Mmap),
    }

    /// A mapped file; unmapped on drop.
    pub struct MappedSegment {
        path: PathBuf,
        arena: RawArena,
        map: Mapping,
    }

    impl MappedSegment {
        /// Map the whole file shared and writable.
        pub fn open_writable(path: &Path) -> io::Result<Self> {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(path)
                .map_err(|e| with_path(path, e))?;
            // SAFETY: The length is fixed at map time and every access is
            // bounds-checked against it. The producer must not truncate the
            // file while it is mapped.
            let mut map = unsafe { MmapOptions::new().map_mut(&file) }.map_err(|e| with_path(path, e))?;
            let arena = unsafe { RawArena::from_raw(map.as_mut_ptr(), map.len()) };

            debug!(target: "frame_store::shm", path = %path.display(), len = map.len(), "mapped file read-write");
            Ok(Self {
                path: path.to_path_buf(),
                arena,
                map: Mapping::Writable(map),
            })
        }

        /// Map the whole file shared and read-only; writes fail with
        /// [`FrameStoreError::ReadOnly`].
        pub fn open_read_only(path: &Path) -> io::Result<Self> {
            let file = File::open(path).map_err(|e| with_path(path, e))?;
            // SAFETY: As above; the arena never writes through this pointer.
            let map = unsafe { Mmap::map(&file) }.map_err(|e| with_path(path, e))?;
            let arena = unsafe { RawArena::from_raw(map.as_ptr().cast_mut(), map.len()) };

            debug!(target: "frame_store::shm", path = %path.display(), len = map.len(), "mapped file read-only");
            Ok(Self {
                path: path.to_path_buf(),
                arena,
                map: Mapping::ReadOnly(map),
            })
        }

        #[inline]
        pub fn path(&self) -> &Path {
            &self.path
        }

        #[inline]
        pub fn is_writable(&self) -> bool {
            matches!(self.map, Mapping::Writable(_))
        }
    }

    impl Arena for MappedSegment {
        #[inline]
        fn len(&self) -> usize {
            self.arena.len()
        }

        #[inline]
        fn read_bytes(&self, offset: usize, out: &mut [u8]) -> Result<()> {
            self.arena.read_bytes(offset, out)
        }

        fn write_bytes(&self, offset: usize, data: &[u8]) -> Result<()> {
            if !self.is_writable() {
                return Err(FrameStoreError::ReadOnly { offset, len: data.len() });
            }
            self.arena.write_bytes(offset, data)
        }
    }

    impl Drop for MappedSegment {
        fn drop(&mut self) {
            if let Mapping::Writable(map) = &self.map {
                if let Err(error) = map.flush() {
                    debug!(target: "frame_store::shm", path = %self.path.display(), %error, "flush failed");
                }
            }
            debug!(target: "frame_store::shm", path = %self.path.display(), "unmapped file");
        }
    }

    fn with_path(path: &Path, error: io::Error) -> io::Error {
        io::Error::new(error.kind(), format!("{}: {error}", path.display()))
    }

    #[cfg(test)]
    mod tests {
        use std::fs;

        use super::*;

        fn provider(dir: &tempfile::TempDir) -> MappedFileProvider {
            MappedFileProvider::new(format!("{}/", dir.path().display()))
        }

        #[test]
        fn test_file_names() {
            let provider = MappedFileProvider::new("/var/tmp/mcv/");
            assert_eq!(provider.main_path(4), PathBuf::from("/var/tmp/mcv/MCIMEM4"));
            assert_eq!(provider.graphics_path(4), PathBuf::from("/var/tmp/mcv/MCGMEM4"));
        }

        #[test]
        fn test_missing_file_names_path() {
            let dir = tempfile::tempdir().unwrap();
            let err = provider(&dir).attach(9).err().unwrap();
            assert_eq!(err.kind(), io::ErrorKind::NotFound);
            assert!(err.to_string().contains("MCIMEM9"));
        }

        #[test]
        fn test_main_writes_reach_file() {
            let dir = tempfile::tempdir().unwrap();
            let provider = provider(&dir);
            fs::write(provider.main_path(2), [0u8; 64]).unwrap();

            let segment = provider.attach(2).unwrap();
            assert!(segment.is_writable());
            assert_eq!(segment.len(), 64);
            segment.write_word(3, 77).unwrap();
            assert!(segment.read_word(16).is_err());
            drop(segment);

            let bytes = fs::read(provider.main_path(2)).unwrap();
            assert_eq!(&bytes[12..16], &77i32.to_ne_bytes());
        }

        #[test]
        fn test_graphics_is_read_only_and_named_by_main_key() {
            let dir = tempfile::tempdir().unwrap();
            let provider = provider(&dir);
            let mut bytes = vec![0u8; 32];
            bytes[4..8].copy_from_slice(&5i32.to_ne_bytes());
            fs::write(provider.graphics_path(2), &bytes).unwrap();

            let segment = provider.attach_graphics(2, 12_345).unwrap();
            assert!(!segment.is_writable());
            assert_eq!(segment.read_word(1).unwrap(), 5);
            assert!(matches!(
                segment.write_word(1, 0),
                Err(FrameStoreError::ReadOnly { offset: 4, len: 4 })
            ));
        }
    }
}
