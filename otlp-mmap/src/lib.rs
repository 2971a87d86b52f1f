//! Public surface of the OTLP-MMAP transport substrate.
//!
//! A [`Writer`] creates or re-attaches to a file laid out as a sequence of
//! named ring and dictionary sections; a [`Reader`] attaches read-only and
//! detects when the writer has changed the version epoch. Everything below
//! this layer (the bit-exact layout, the ring protocol, the dictionary) is
//! implemented in `otlp-mmap-header`, `otlp-mmap-dict`, `otlp-mmap-ring`, and
//! `otlp-mmap-file`; this crate only assembles named handles on top.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

pub use otlp_mmap_dict::{DictError, DictMetrics, Fixed as DictFixed, Framing, Varint as DictVarint};
pub use otlp_mmap_file::{DictFraming, FileError, LayoutDescriptor, SectionKind, SectionTable};
pub use otlp_mmap_ring::{Backoff, BodyKind, RingError, RingMetrics, SpinBackoff, YieldBackoff};

use otlp_mmap_dict::DictSection;
use otlp_mmap_file::{MappedFile, MappedReader, ReaderFile, WriterFile};
use otlp_mmap_ring::RingSection;

/// Errors surfaced at the public `Writer`/`Reader` layer: everything the
/// lower crates can report, plus name-lookup failures specific to this
/// layer's named-section registry.
#[derive(Debug)]
pub enum OtlpMmapError {
    File(FileError),
    Dict(DictError),
    Ring(RingError),
    /// No section with this name exists in the attached layout.
    UnknownSection(String),
    /// The section exists but is not the kind the caller asked for (e.g.
    /// `ring("resources")` on a dictionary section).
    WrongSectionKind { name: String, expected: &'static str },
}

impl fmt::Display for OtlpMmapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OtlpMmapError::File(e) => write!(f, "{e}"),
            OtlpMmapError::Dict(e) => write!(f, "{e}"),
            OtlpMmapError::Ring(e) => write!(f, "{e}"),
            OtlpMmapError::UnknownSection(name) => write!(f, "no section named {name:?}"),
            OtlpMmapError::WrongSectionKind { name, expected } => {
                write!(f, "section {name:?} is not a {expected}")
            }
        }
    }
}

impl std::error::Error for OtlpMmapError {}

impl From<FileError> for OtlpMmapError {
    fn from(e: FileError) -> Self {
        OtlpMmapError::File(e)
    }
}

impl From<DictError> for OtlpMmapError {
    fn from(e: DictError) -> Self {
        OtlpMmapError::Dict(e)
    }
}

impl From<RingError> for OtlpMmapError {
    fn from(e: RingError) -> Self {
        OtlpMmapError::Ring(e)
    }
}

/// A dictionary handle over either framing, so a named-section registry can
/// hold both kinds without dynamic dispatch on the hot path.
pub enum DictHandle<R> {
    Varint(DictSection<R, DictVarint>),
    Fixed(DictSection<R, DictFixed>),
}

impl<R> DictHandle<R>
where
    R: otlp_mmap_header::region::ResizableRegion,
    R::Error: fmt::Debug,
{
    pub fn append(&self, payload: &[u8]) -> Result<u64, DictError> {
        match self {
            DictHandle::Varint(d) => d.append(payload),
            DictHandle::Fixed(d) => d.append(payload),
        }
    }

    pub fn read(&self, offset: u64) -> Result<Vec<u8>, DictError> {
        match self {
            DictHandle::Varint(d) => d.read(offset),
            DictHandle::Fixed(d) => d.read(offset),
        }
    }

    pub fn metrics(&self) -> Result<DictMetrics, DictError> {
        match self {
            DictHandle::Varint(d) => d.metrics(),
            DictHandle::Fixed(d) => d.metrics(),
        }
    }
}

fn section_index(layout: &LayoutDescriptor, name: &str) -> Result<usize, OtlpMmapError> {
    layout
        .sections
        .iter()
        .position(|s| s.name == name)
        .ok_or_else(|| OtlpMmapError::UnknownSection(name.to_string()))
}

fn ring_params(
    layout: &LayoutDescriptor,
    index: usize,
) -> Option<(u64, u64, BodyKind)> {
    match &layout.sections[index].kind {
        SectionKind::Ring {
            num_slots,
            slot_size,
            body_kind,
        } => Some((*num_slots, *slot_size, *body_kind)),
        SectionKind::Dict { .. } => None,
    }
}

fn dict_framing(layout: &LayoutDescriptor, index: usize) -> Option<DictFraming> {
    match &layout.sections[index].kind {
        SectionKind::Dict { framing } => Some(*framing),
        SectionKind::Ring { .. } => None,
    }
}

/// Owns a writable mapping of a named layout of ring and dictionary
/// sections. Multiple threads within the producer process may share a
/// `Writer` (wrap it in `Arc` as needed); every write operation is
/// claim/CAS-arbitrated or fetch-add-reserved, never lock-based.
pub struct Writer {
    file: MappedFile,
    layout: LayoutDescriptor,
}

impl Writer {
    /// Create and initialize a new file at `path`, choosing `epoch` as the
    /// writer's version epoch. `epoch` must be nonzero; callers typically
    /// use wall-clock nanoseconds.
    pub fn create(path: impl AsRef<Path>, epoch: u64, layout: LayoutDescriptor) -> Result<Self, OtlpMmapError> {
        let file = MappedFile::create(path, epoch, layout.clone())?;
        #[cfg(feature = "tracing")]
        tracing::info!(epoch, "writer created file");
        Ok(Writer { file, layout })
    }

    /// Re-attach to an existing file, preserving its current epoch and
    /// continuing from wherever the dead writer left off.
    pub fn attach_preserving_epoch(path: impl AsRef<Path>, layout: LayoutDescriptor) -> Result<Self, OtlpMmapError> {
        let file = MappedFile::attach_preserving_epoch(path, layout.clone())?;
        #[cfg(feature = "tracing")]
        tracing::info!(epoch = file.epoch(), "writer re-attached, epoch preserved");
        Ok(Writer { file, layout })
    }

    /// Re-attach to an existing file, choosing a new epoch and
    /// re-initializing every section. Any reader still watching the old
    /// epoch will observe the change and reset.
    pub fn attach_with_new_epoch(
        path: impl AsRef<Path>,
        new_epoch: u64,
        layout: LayoutDescriptor,
    ) -> Result<Self, OtlpMmapError> {
        let file = MappedFile::attach_with_new_epoch(path, new_epoch, layout.clone())?;
        #[cfg(feature = "tracing")]
        tracing::warn!(epoch = new_epoch, "writer re-initialized with new epoch");
        Ok(Writer { file, layout })
    }

    pub fn epoch(&self) -> u64 {
        self.file.epoch()
    }

    pub fn section_table(&self) -> SectionTable {
        self.file.section_table()
    }

    /// Look up a ring section by its declared name.
    pub fn ring(&self, name: &str) -> Result<RingSection<&WriterFile>, OtlpMmapError> {
        let index = section_index(&self.layout, name)?;
        let (num_slots, slot_size, body_kind) = ring_params(&self.layout, index)
            .ok_or(OtlpMmapError::WrongSectionKind { name: name.to_string(), expected: "ring" })?;
        Ok(self.file.ring(index, num_slots, slot_size, body_kind)?)
    }

    /// Look up a dictionary section by its declared name.
    pub fn dict(&self, name: &str) -> Result<DictHandle<&WriterFile>, OtlpMmapError> {
        let index = section_index(&self.layout, name)?;
        let framing = dict_framing(&self.layout, index)
            .ok_or(OtlpMmapError::WrongSectionKind { name: name.to_string(), expected: "dict" })?;
        Ok(match framing {
            DictFraming::Varint => DictHandle::Varint(self.file.dict_varint(index)?),
            DictFraming::Fixed { slot_size } => DictHandle::Fixed(self.file.dict_fixed(index, slot_size)?),
        })
    }
}

/// A read-only attachment to a layout of ring and dictionary sections.
/// Sharing a single `Reader` across threads is not supported by contract:
/// the protocol assumes exactly one consumer of `reader_index` per ring.
pub struct Reader {
    file: MappedReader,
    layout: LayoutDescriptor,
}

impl Reader {
    /// Attach read-only to an existing, initialized file.
    pub fn attach(path: impl AsRef<Path>, layout: LayoutDescriptor) -> Result<Self, OtlpMmapError> {
        let file = MappedReader::attach(path, layout.clone())?;
        #[cfg(feature = "tracing")]
        tracing::info!(epoch = file.epoch(), "reader attached");
        Ok(Reader { file, layout })
    }

    /// The epoch cached at attach time.
    pub fn epoch(&self) -> u64 {
        self.file.epoch()
    }

    /// Re-check the file header's epoch; `Err` means the writer
    /// re-initialized and this reader must be dropped and re-attached.
    pub fn check_epoch(&self) -> Result<(), OtlpMmapError> {
        self.file.check_epoch()?;
        Ok(())
    }

    pub fn section_table(&self) -> SectionTable {
        self.file.section_table()
    }

    pub fn ring(&self, name: &str) -> Result<RingSection<&ReaderFile>, OtlpMmapError> {
        let index = section_index(&self.layout, name)?;
        let (num_slots, slot_size, body_kind) = ring_params(&self.layout, index)
            .ok_or(OtlpMmapError::WrongSectionKind { name: name.to_string(), expected: "ring" })?;
        Ok(self.file.ring(index, num_slots, slot_size, body_kind)?)
    }

    pub fn dict(&self, name: &str) -> Result<DictHandle<&ReaderFile>, OtlpMmapError> {
        let index = section_index(&self.layout, name)?;
        let framing = dict_framing(&self.layout, index)
            .ok_or(OtlpMmapError::WrongSectionKind { name: name.to_string(), expected: "dict" })?;
        Ok(match framing {
            DictFraming::Varint => DictHandle::Varint(self.file.dict_varint(index)?),
            DictFraming::Fixed { slot_size } => DictHandle::Fixed(self.file.dict_fixed(index, slot_size)?),
        })
    }
}
