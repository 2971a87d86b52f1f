//! Abstraction over "a growable byte-addressable region", so that
//! `otlp-mmap-dict` and `otlp-mmap-ring` never depend on `memmap2` or
//! `std::fs` directly.
//!
//! Growing a mapping can relocate it to a new address (`memmap2` has no
//! cross-platform in-place growth, unlike Linux's `mremap`). Because of that,
//! nothing downstream may hold onto a `&[u8]` across a growth point. Every
//! operation instead goes through [`MappedRegion::with_bytes`], which hands
//! out a fresh view for the duration of a closure and nothing longer.

use alloc::sync::Arc;

/// A region that can be read byte-for-byte through a closure, re-resolving
/// its current mapping on each call.
///
/// Implementors must guarantee that the slice passed to `f` stays valid for
/// the duration of the call, but make no promise about its address or length
/// staying the same across two different calls.
pub trait MappedRegion {
    /// The error type for regions whose current mapping cannot be resolved
    /// (a writer-side file error, for instance).
    type Error;

    /// Invoke `f` with the region's current byte view.
    fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Result<R, Self::Error>;
}

/// A [`MappedRegion`] that can also be asked to grow.
pub trait ResizableRegion: MappedRegion {
    /// Ensure the region covers at least `min_len` bytes, growing (and
    /// possibly relocating) the mapping if needed.
    ///
    /// Writer-side implementations extend the backing file and remap.
    /// Reader-side implementations only refresh the mapping to the file's
    /// current on-disk size and error if that is still short of `min_len`,
    /// since readers never grow the file themselves.
    fn ensure_len(&self, min_len: usize) -> Result<(), Self::Error>;
}

impl<T: MappedRegion> MappedRegion for Arc<T> {
    type Error = T::Error;

    fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Result<R, Self::Error> {
        T::with_bytes(self, f)
    }
}

impl<T: ResizableRegion> ResizableRegion for Arc<T> {
    fn ensure_len(&self, min_len: usize) -> Result<(), Self::Error> {
        T::ensure_len(self, min_len)
    }
}

impl<T: MappedRegion> MappedRegion for &T {
    type Error = T::Error;

    fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Result<R, Self::Error> {
        T::with_bytes(self, f)
    }
}

impl<T: ResizableRegion> ResizableRegion for &T {
    fn ensure_len(&self, min_len: usize) -> Result<(), Self::Error> {
        T::ensure_len(self, min_len)
    }
}
