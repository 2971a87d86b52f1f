#![cfg_attr(not(feature = "std"), no_std)]
//! Typed, ordered views over a byte-addressable mapped region.
//!
//! Every field access goes through [`AccessError`]-checked helpers that
//! verify bounds and alignment before handing back a reference to an atomic
//! cell. Nothing here knows about files or growth; it is the shared
//! vocabulary the rest of the `otlp-mmap-*` crates build field access on top
//! of.

extern crate alloc;

pub mod region;
pub mod varint;

use core::sync::atomic::{AtomicI32, AtomicI64, AtomicU32, AtomicU64, AtomicU8, Ordering};

/// A field could not be resolved to a typed reference into the mapped bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessError {
    /// The offset is not a multiple of the field's required alignment.
    Unaligned { offset: usize, align: usize },
    /// The field would read or write past the end of the mapped bytes.
    OutOfBounds {
        offset: usize,
        needed: usize,
        available: usize,
    },
}

impl core::fmt::Display for AccessError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            AccessError::Unaligned { offset, align } => {
                write!(f, "offset {offset} is not {align}-byte aligned")
            }
            AccessError::OutOfBounds {
                offset,
                needed,
                available,
            } => write!(
                f,
                "field at {offset} needs {needed} bytes but only {available} are mapped"
            ),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for AccessError {}

fn checked_ptr(bytes: &[u8], offset: usize, size: usize, align: usize) -> Result<*const u8, AccessError> {
    if offset % align != 0 {
        return Err(AccessError::Unaligned { offset, align });
    }
    let end = offset.checked_add(size).ok_or(AccessError::OutOfBounds {
        offset,
        needed: size,
        available: bytes.len(),
    })?;
    if end > bytes.len() {
        return Err(AccessError::OutOfBounds {
            offset,
            needed: size,
            available: bytes.len(),
        });
    }
    Ok(unsafe { bytes.as_ptr().add(offset) })
}

/// Resolve a `u32` atomic cell at `offset`.
///
/// # Safety contract
///
/// The caller must ensure that every access to the bytes at `[offset, offset+4)`,
/// for the lifetime of the mapping, goes exclusively through atomic operations
/// (this function and its siblings). Plain reads/writes of the same bytes
/// from elsewhere are undefined behavior.
pub fn u32_ref(bytes: &[u8], offset: usize) -> Result<&AtomicU32, AccessError> {
    let ptr = checked_ptr(bytes, offset, 4, 4)?;
    Ok(unsafe { &*(ptr as *const AtomicU32) })
}

/// Resolve a `u64` atomic cell at `offset`. See [`u32_ref`] for the safety contract.
pub fn u64_ref(bytes: &[u8], offset: usize) -> Result<&AtomicU64, AccessError> {
    let ptr = checked_ptr(bytes, offset, 8, 8)?;
    Ok(unsafe { &*(ptr as *const AtomicU64) })
}

/// Resolve an `i64` atomic cell at `offset`. See [`u32_ref`] for the safety contract.
pub fn i64_ref(bytes: &[u8], offset: usize) -> Result<&AtomicI64, AccessError> {
    let ptr = checked_ptr(bytes, offset, 8, 8)?;
    Ok(unsafe { &*(ptr as *const AtomicI64) })
}

/// Resolve a contiguous run of `len` `i32` generation cells starting at `offset`.
/// See [`u32_ref`] for the safety contract.
pub fn i32_slice(bytes: &[u8], offset: usize, len: usize) -> Result<&[AtomicI32], AccessError> {
    let size = len.checked_mul(4).ok_or(AccessError::OutOfBounds {
        offset,
        needed: usize::MAX,
        available: bytes.len(),
    })?;
    let ptr = checked_ptr(bytes, offset, size, 4)?;
    Ok(unsafe { core::slice::from_raw_parts(ptr as *const AtomicI32, len) })
}

/// Resolve a contiguous run of `len` raw bytes, viewed as individually
/// atomic `u8` cells, starting at `offset`. Used for opaque payload copies
/// where only the publishing fence (not the byte-level store) needs to be
/// ordered.
pub fn u8_slice(bytes: &[u8], offset: usize, len: usize) -> Result<&[AtomicU8], AccessError> {
    let ptr = checked_ptr(bytes, offset, len, 1)?;
    Ok(unsafe { core::slice::from_raw_parts(ptr as *const AtomicU8, len) })
}

/// Copy `src` into `dst` byte-by-byte with `Relaxed` ordering.
///
/// Ordering for the copy itself is irrelevant: visibility is established by
/// whatever release store publishes the record that contains `dst` (a ring
/// slot's availability cell, or a dictionary entry becoming reachable via a
/// ring record). Panics if the lengths differ.
pub fn copy_into(dst: &[AtomicU8], src: &[u8]) {
    assert_eq!(dst.len(), src.len(), "copy_into: length mismatch");
    for (d, s) in dst.iter().zip(src.iter()) {
        d.store(*s, Ordering::Relaxed);
    }
}

/// Copy `src` out into `dst` byte-by-byte with `Relaxed` ordering.
///
/// Callers must have already established happens-before visibility (e.g. by
/// observing the generation/availability cell that guards `src`) before
/// calling this.
pub fn copy_out(src: &[AtomicU8], dst: &mut [u8]) {
    assert_eq!(src.len(), dst.len(), "copy_out: length mismatch");
    for (s, d) in src.iter().zip(dst.iter_mut()) {
        *d = s.load(Ordering::Relaxed);
    }
}

/// A `u64` field supporting the plain/acquire/release/CAS/fetch-add operations
/// described in the transport's header-primitives contract.
#[derive(Clone, Copy)]
pub struct Field64<'a> {
    cell: &'a AtomicU64,
}

impl<'a> Field64<'a> {
    pub fn at(bytes: &'a [u8], offset: usize) -> Result<Self, AccessError> {
        Ok(Field64 {
            cell: u64_ref(bytes, offset)?,
        })
    }

    pub fn load(&self) -> u64 {
        self.cell.load(Ordering::Relaxed)
    }

    pub fn load_acquire(&self) -> u64 {
        self.cell.load(Ordering::Acquire)
    }

    pub fn store(&self, value: u64) {
        self.cell.store(value, Ordering::Relaxed);
    }

    pub fn store_release(&self, value: u64) {
        self.cell.store(value, Ordering::Release);
    }

    /// Returns the value *before* the add, as `fetch_add` conventionally does.
    pub fn fetch_add(&self, delta: u64) -> u64 {
        self.cell.fetch_add(delta, Ordering::AcqRel)
    }

    pub fn compare_exchange(&self, current: u64, new: u64) -> Result<u64, u64> {
        self.cell
            .compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire)
    }
}

/// A signed `i64` field, used for `reader_index`/`writer_index` which start
/// at `-1` and are compared/CASed as signed quantities.
#[derive(Clone, Copy)]
pub struct SignedField64<'a> {
    cell: &'a AtomicI64,
}

impl<'a> SignedField64<'a> {
    pub fn at(bytes: &'a [u8], offset: usize) -> Result<Self, AccessError> {
        Ok(SignedField64 {
            cell: i64_ref(bytes, offset)?,
        })
    }

    pub fn load(&self) -> i64 {
        self.cell.load(Ordering::Relaxed)
    }

    pub fn load_acquire(&self) -> i64 {
        self.cell.load(Ordering::Acquire)
    }

    pub fn store_release(&self, value: i64) {
        self.cell.store(value, Ordering::Release);
    }

    pub fn compare_exchange(&self, current: i64, new: i64) -> Result<i64, i64> {
        self.cell
            .compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire)
    }
}

/// Describes where a containing file's version epoch lives and what value
/// was observed there at attach time, so a ring or dictionary section can
/// detect a writer-triggered reset on its own hot path instead of relying on
/// a caller to poll a separate epoch check.
#[derive(Clone, Copy, Debug)]
pub struct EpochCheck {
    pub offset: usize,
    pub expected: u64,
}

/// The per-slot availability array: one `i32` generation counter per ring
/// position, initialized to `-1`.
#[derive(Clone, Copy)]
pub struct Availability<'a> {
    cells: &'a [AtomicI32],
}

impl<'a> Availability<'a> {
    pub fn at(bytes: &'a [u8], offset: usize, num_slots: usize) -> Result<Self, AccessError> {
        Ok(Availability {
            cells: i32_slice(bytes, offset, num_slots)?,
        })
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn load_acquire(&self, pos: usize) -> i32 {
        self.cells[pos].load(Ordering::Acquire)
    }

    pub fn store_release(&self, pos: usize, generation: i32) {
        self.cells[pos].store(generation, Ordering::Release);
    }
}
