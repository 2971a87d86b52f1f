//! The dictionary section: an append-only log of variable- or fixed-size
//! entries, addressed by a monotonically increasing byte offset.
//!
//! Layout (relative to `section_start`), matching the file header's section
//! table:
//! - `[0..8)` `end`: u64, next free byte offset, advanced by `fetch_add`.
//! - `[8..16)` `num_entries`: u64, advisory.
//! - `[64..)` entry bodies, framed per [`Framing`].

use std::fmt;

use otlp_mmap_header::region::{MappedRegion, ResizableRegion};
use otlp_mmap_header::varint::{self, DecodeError as VarintDecodeError};
use otlp_mmap_header::{u8_slice, AccessError, EpochCheck, Field64};

/// Size in bytes of the dictionary section header.
pub const HEADER_LEN: usize = 64;

/// Errors raised by dictionary operations.
#[derive(Debug)]
pub enum DictError {
    /// The mapping could not be grown to hold a new entry (disk full, or a
    /// size limit enforced by the region).
    CapacityExceeded,
    /// A stored varint length prefix was malformed or truncated.
    Decode(VarintDecodeError),
    /// A payload exceeded the fixed slot size of a `Fixed`-framed section.
    PayloadTooLarge { len: usize, max: usize },
    /// A field access fell outside the mapped region or was misaligned.
    Access(AccessError),
    /// The containing file's version epoch no longer matches the one
    /// observed when this section was attached.
    VersionMismatch { expected: u64, found: u64 },
    /// The underlying region failed to resolve its bytes.
    Region(String),
}

impl fmt::Display for DictError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DictError::CapacityExceeded => write!(f, "dictionary could not grow to fit entry"),
            DictError::Decode(e) => write!(f, "malformed dictionary entry: {e}"),
            DictError::PayloadTooLarge { len, max } => {
                write!(f, "payload of {len} bytes exceeds fixed slot size {max}")
            }
            DictError::Access(e) => write!(f, "{e}"),
            DictError::VersionMismatch { expected, found } => {
                write!(f, "epoch changed: expected {expected}, found {found}")
            }
            DictError::Region(msg) => write!(f, "region error: {msg}"),
        }
    }
}

impl std::error::Error for DictError {}

/// A framing strategy for dictionary entries: how much space `append`
/// reserves, and how to encode/decode a payload into reserved bytes.
pub trait Framing: Clone {
    /// Number of bytes `append` should reserve via `fetch_add` for a payload
    /// of `payload_len` bytes.
    fn reserve_len(&self, payload_len: usize) -> Result<usize, DictError>;

    /// Encode `payload` into the region at `offset`, which has at least
    /// `reserve_len(payload.len())` bytes available.
    fn write_at(&self, bytes: &[u8], offset: usize, payload: &[u8]) -> Result<(), DictError>;

    /// Decode the entry starting at `offset`.
    fn read_at(&self, bytes: &[u8], offset: usize) -> Result<Vec<u8>, DictError>;

    /// Bytes a reader must have mapped at `offset` before it can even tell
    /// how long the entry there is (a length prefix for `Varint`, the whole
    /// slot for `Fixed`).
    fn probe_len(&self) -> usize;

    /// Total size in bytes of the entry starting at `offset`, once at least
    /// `probe_len()` bytes are mapped there.
    fn entry_len(&self, bytes: &[u8], offset: usize) -> Result<usize, DictError>;
}

/// Length-prefixed entries: LEB128 varint length, then the raw payload.
#[derive(Clone, Copy, Debug, Default)]
pub struct Varint;

impl Framing for Varint {
    fn reserve_len(&self, payload_len: usize) -> Result<usize, DictError> {
        let mut scratch = [0u8; varint::MAX_ENCODED_LEN];
        let prefix_len = varint::encode(payload_len as u64, &mut scratch);
        prefix_len
            .checked_add(payload_len)
            .ok_or(DictError::CapacityExceeded)
    }

    fn write_at(&self, bytes: &[u8], offset: usize, payload: &[u8]) -> Result<(), DictError> {
        let mut scratch = [0u8; varint::MAX_ENCODED_LEN];
        let prefix_len = varint::encode(payload.len() as u64, &mut scratch);
        let prefix_cells = u8_slice(bytes, offset, prefix_len).map_err(DictError::Access)?;
        otlp_mmap_header::copy_into(prefix_cells, &scratch[..prefix_len]);
        let payload_cells =
            u8_slice(bytes, offset + prefix_len, payload.len()).map_err(DictError::Access)?;
        otlp_mmap_header::copy_into(payload_cells, payload);
        Ok(())
    }

    fn read_at(&self, bytes: &[u8], offset: usize) -> Result<Vec<u8>, DictError> {
        let probe_len = varint::MAX_ENCODED_LEN.min(bytes.len().saturating_sub(offset));
        let probe_cells = u8_slice(bytes, offset, probe_len).map_err(DictError::Access)?;
        let mut probe = [0u8; varint::MAX_ENCODED_LEN];
        otlp_mmap_header::copy_out(probe_cells, &mut probe[..probe_len]);
        let (len, prefix_len) = varint::decode(&probe[..probe_len]).map_err(DictError::Decode)?;
        let len = len as usize;
        let payload_cells =
            u8_slice(bytes, offset + prefix_len, len).map_err(DictError::Access)?;
        let mut out = vec![0u8; len];
        otlp_mmap_header::copy_out(payload_cells, &mut out);
        Ok(out)
    }

    fn probe_len(&self) -> usize {
        varint::MAX_ENCODED_LEN
    }

    fn entry_len(&self, bytes: &[u8], offset: usize) -> Result<usize, DictError> {
        let probe_len = varint::MAX_ENCODED_LEN.min(bytes.len().saturating_sub(offset));
        let probe_cells = u8_slice(bytes, offset, probe_len).map_err(DictError::Access)?;
        let mut probe = [0u8; varint::MAX_ENCODED_LEN];
        otlp_mmap_header::copy_out(probe_cells, &mut probe[..probe_len]);
        let (len, prefix_len) = varint::decode(&probe[..probe_len]).map_err(DictError::Decode)?;
        Ok(prefix_len + len as usize)
    }
}

/// Fixed-size entries: no length prefix, every entry occupies exactly
/// `slot_size` bytes. A payload shorter than `slot_size` is zero-padded on
/// write; reads always return the full slot.
#[derive(Clone, Copy, Debug)]
pub struct Fixed {
    pub slot_size: usize,
}

impl Framing for Fixed {
    fn reserve_len(&self, payload_len: usize) -> Result<usize, DictError> {
        if payload_len > self.slot_size {
            return Err(DictError::PayloadTooLarge {
                len: payload_len,
                max: self.slot_size,
            });
        }
        Ok(self.slot_size)
    }

    fn write_at(&self, bytes: &[u8], offset: usize, payload: &[u8]) -> Result<(), DictError> {
        let cells = u8_slice(bytes, offset, self.slot_size).map_err(DictError::Access)?;
        let mut padded = vec![0u8; self.slot_size];
        padded[..payload.len()].copy_from_slice(payload);
        otlp_mmap_header::copy_into(cells, &padded);
        Ok(())
    }

    fn read_at(&self, bytes: &[u8], offset: usize) -> Result<Vec<u8>, DictError> {
        let cells = u8_slice(bytes, offset, self.slot_size).map_err(DictError::Access)?;
        let mut out = vec![0u8; self.slot_size];
        otlp_mmap_header::copy_out(cells, &mut out);
        Ok(out)
    }

    fn probe_len(&self) -> usize {
        self.slot_size
    }

    fn entry_len(&self, _bytes: &[u8], _offset: usize) -> Result<usize, DictError> {
        Ok(self.slot_size)
    }
}

/// A read-only snapshot of a dictionary's bookkeeping fields, for
/// diagnostics. Never used on the append/read hot path.
#[derive(Clone, Copy, Debug)]
pub struct DictMetrics {
    pub end: u64,
    pub num_entries: u64,
}

/// An append-only dictionary mapped onto region `R` with framing `F`.
pub struct DictSection<R, F> {
    region: R,
    section_start: usize,
    framing: F,
    epoch: Option<EpochCheck>,
}

impl<R, F> DictSection<R, F>
where
    F: Framing,
{
    fn end_offset(&self) -> usize {
        self.section_start
    }

    fn num_entries_offset(&self) -> usize {
        self.section_start + 8
    }

    /// Initialize a fresh dictionary section: `end` starts right after the
    /// header, `num_entries` at zero.
    ///
    /// `epoch` is normally `None` here: the containing file's epoch field is
    /// written only after every section has been initialized, so checking it
    /// this early would always fail.
    pub fn init(
        region: R,
        section_start: usize,
        framing: F,
        epoch: Option<EpochCheck>,
    ) -> Result<Self, DictError>
    where
        R: ResizableRegion,
        R::Error: fmt::Debug,
    {
        region
            .ensure_len(section_start + HEADER_LEN)
            .map_err(|e| DictError::Region(format!("{e:?}")))?;
        let section = DictSection {
            region,
            section_start,
            framing,
            epoch,
        };
        let start = section.section_start + HEADER_LEN;
        section.with_bytes_mut(|bytes| {
            Field64::at(bytes, section.end_offset())
                .map_err(DictError::Access)?
                .store_release(start as u64);
            Field64::at(bytes, section.num_entries_offset())
                .map_err(DictError::Access)?
                .store_release(0);
            Ok(())
        })?;
        Ok(section)
    }

    /// Attach to an already-initialized dictionary section at `section_start`.
    /// No validation is performed here; callers that need layout validation
    /// should consult the file crate's discovery report first. `epoch`, if
    /// set, is checked on every subsequent operation.
    pub fn attach(region: R, section_start: usize, framing: F, epoch: Option<EpochCheck>) -> Self {
        DictSection {
            region,
            section_start,
            framing,
            epoch,
        }
    }

    fn check_epoch(&self, bytes: &[u8]) -> Result<(), DictError> {
        if let Some(epoch) = self.epoch {
            let found = Field64::at(bytes, epoch.offset)
                .map_err(DictError::Access)?
                .load_acquire();
            if found != epoch.expected {
                return Err(DictError::VersionMismatch {
                    expected: epoch.expected,
                    found,
                });
            }
        }
        Ok(())
    }

    fn with_bytes_mut<T>(
        &self,
        f: impl FnOnce(&[u8]) -> Result<T, DictError>,
    ) -> Result<T, DictError>
    where
        R: MappedRegion,
        R::Error: fmt::Debug,
    {
        match self.region.with_bytes(|bytes| {
            self.check_epoch(bytes)?;
            f(bytes)
        }) {
            Ok(inner) => inner,
            Err(e) => Err(DictError::Region(format!("{e:?}"))),
        }
    }

    /// Append `payload`, returning the absolute byte offset of the entry.
    pub fn append(&self, payload: &[u8]) -> Result<u64, DictError>
    where
        R: ResizableRegion,
        R::Error: fmt::Debug,
    {
        let total = self.framing.reserve_len(payload.len())?;
        let base = self.with_bytes_mut(|bytes| {
            let end = Field64::at(bytes, self.end_offset()).map_err(DictError::Access)?;
            Ok(end.fetch_add(total as u64))
        })?;
        self.region
            .ensure_len(base as usize + total)
            .map_err(|_| DictError::CapacityExceeded)?;
        self.with_bytes_mut(|bytes| self.framing.write_at(bytes, base as usize, payload))?;
        self.with_bytes_mut(|bytes| {
            Field64::at(bytes, self.num_entries_offset())
                .map_err(DictError::Access)?
                .fetch_add(1);
            Ok(())
        })?;
        Ok(base)
    }

    /// Read the entry at `offset`, previously returned by `append`. Grows
    /// this reader's own mapping first if the writer has since extended the
    /// dictionary past it, so an entry that genuinely exists is never
    /// rejected as out of bounds.
    pub fn read(&self, offset: u64) -> Result<Vec<u8>, DictError>
    where
        R: ResizableRegion,
        R::Error: fmt::Debug,
    {
        let offset = offset as usize;
        self.region
            .ensure_len(offset + self.framing.probe_len())
            .map_err(|e| DictError::Region(format!("{e:?}")))?;
        let total = self.with_bytes_mut(|bytes| self.framing.entry_len(bytes, offset))?;
        self.region
            .ensure_len(offset + total)
            .map_err(|e| DictError::Region(format!("{e:?}")))?;
        self.with_bytes_mut(|bytes| self.framing.read_at(bytes, offset))
    }

    /// Snapshot the dictionary's bookkeeping fields.
    pub fn metrics(&self) -> Result<DictMetrics, DictError>
    where
        R: MappedRegion,
        R::Error: fmt::Debug,
    {
        self.with_bytes_mut(|bytes| {
            let end = Field64::at(bytes, self.end_offset())
                .map_err(DictError::Access)?
                .load();
            let num_entries = Field64::at(bytes, self.num_entries_offset())
                .map_err(DictError::Access)?
                .load();
            Ok(DictMetrics { end, num_entries })
        })
    }
}
