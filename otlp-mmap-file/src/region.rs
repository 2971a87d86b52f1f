//! `memmap2`-backed implementations of `MappedRegion`/`ResizableRegion`.
//!
//! Growing a mapping may relocate it to a new address, so neither type
//! caches a pointer or slice across calls: every `with_bytes` call takes a
//! fresh read lock and hands out a view scoped to the closure.

use std::fs::File;
use std::sync::RwLock;

use memmap2::{Mmap, MmapMut};
use otlp_mmap_header::region::{MappedRegion, ResizableRegion};

use crate::FileError;

/// Extra bytes requested beyond what's strictly needed, and the rounding
/// granularity for file growth, so that frequent small appends don't each
/// trigger a `set_len` + remap.
const GROWTH_CHUNK: usize = 64 * 1024;

fn grow_target(min_len: usize) -> usize {
    let rounded = min_len.div_ceil(GROWTH_CHUNK) * GROWTH_CHUNK;
    rounded + GROWTH_CHUNK
}

/// A writer's mapping: extends the backing file and remaps when asked to
/// cover more bytes than are currently mapped.
pub struct WriterFile {
    file: File,
    mmap: RwLock<MmapMut>,
}

impl WriterFile {
    pub fn new(file: File) -> Result<Self, FileError> {
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(WriterFile {
            file,
            mmap: RwLock::new(mmap),
        })
    }
}

impl MappedRegion for WriterFile {
    type Error = FileError;

    fn with_bytes<T>(&self, f: impl FnOnce(&[u8]) -> T) -> Result<T, FileError> {
        let guard = self.mmap.read().map_err(|_| FileError::Poisoned)?;
        Ok(f(&guard))
    }
}

impl ResizableRegion for WriterFile {
    fn ensure_len(&self, min_len: usize) -> Result<(), FileError> {
        {
            let guard = self.mmap.read().map_err(|_| FileError::Poisoned)?;
            if guard.len() >= min_len {
                return Ok(());
            }
        }
        let mut guard = self.mmap.write().map_err(|_| FileError::Poisoned)?;
        if guard.len() >= min_len {
            return Ok(());
        }
        let new_len = grow_target(min_len);
        self.file.set_len(new_len as u64)?;
        let new_mmap = unsafe { MmapMut::map_mut(&self.file)? };

        #[cfg(feature = "tracing")]
        tracing::debug!(old_len = guard.len(), new_len, "grew writer mapping");

        *guard = new_mmap;
        Ok(())
    }
}

/// A reader's mapping: only ever re-syncs to the file's current on-disk
/// size. Never extends the file itself.
pub struct ReaderFile {
    file: File,
    mmap: RwLock<Mmap>,
}

impl ReaderFile {
    pub fn new(file: File) -> Result<Self, FileError> {
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(ReaderFile {
            file,
            mmap: RwLock::new(mmap),
        })
    }
}

impl MappedRegion for ReaderFile {
    type Error = FileError;

    fn with_bytes<T>(&self, f: impl FnOnce(&[u8]) -> T) -> Result<T, FileError> {
        let guard = self.mmap.read().map_err(|_| FileError::Poisoned)?;
        Ok(f(&guard))
    }
}

impl ResizableRegion for ReaderFile {
    fn ensure_len(&self, min_len: usize) -> Result<(), FileError> {
        {
            let guard = self.mmap.read().map_err(|_| FileError::Poisoned)?;
            if guard.len() >= min_len {
                return Ok(());
            }
        }
        let mut guard = self.mmap.write().map_err(|_| FileError::Poisoned)?;
        if guard.len() >= min_len {
            return Ok(());
        }
        let on_disk = self.file.metadata()?.len() as usize;
        if on_disk < min_len {
            return Err(FileError::InvalidLayout(format!(
                "reader needs {min_len} bytes but file is only {on_disk} bytes on disk"
            )));
        }
        let new_mmap = unsafe { Mmap::map(&self.file)? };

        #[cfg(feature = "tracing")]
        tracing::debug!(old_len = guard.len(), new_len = on_disk, "resynced reader mapping");

        *guard = new_mmap;
        Ok(())
    }
}
