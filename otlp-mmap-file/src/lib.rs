//! The top-level file: header, section table, version epoch, and the
//! growable `memmap2` regions that back the dictionary and ring sections.
//!
//! File header, 64 bytes, little-endian:
//! - `[0..8)` epoch (u64), zero means uninitialized.
//! - `[8..8+8k)` absolute byte offset of each of up to 7 sections.
//! - Remaining bytes zero.

mod region;

pub use region::{ReaderFile, WriterFile};

use std::path::Path;

use otlp_mmap_dict::{DictSection, Fixed as DictFixed, Varint as DictVarint};
use otlp_mmap_header::{AccessError, EpochCheck, Field64};
use otlp_mmap_ring::{BodyKind, RingSection};

/// Size in bytes of the file header.
pub const HEADER_LEN: usize = 64;

/// Maximum number of sections a single file can declare: `(64 - 8) / 8`.
pub const MAX_SECTIONS: usize = 7;

/// Errors raised while creating, attaching to, or growing a mapped file.
#[derive(Debug)]
pub enum FileError {
    /// A filesystem or mapping operation failed.
    Io(std::io::Error),
    /// The file header's epoch is zero: no writer has initialized it yet.
    Uninitialized,
    /// The cached epoch no longer matches what the file header reports.
    VersionMismatch { expected: u64, found: u64 },
    /// A layout descriptor could not be realized (too many sections, or a
    /// growable dictionary section that is not last).
    InvalidLayout(String),
    /// A field access fell outside the mapped region or was misaligned.
    Access(AccessError),
    /// A mapping's lock was poisoned by a panicking thread.
    Poisoned,
}

impl std::fmt::Display for FileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileError::Io(e) => write!(f, "io error: {e}"),
            FileError::Uninitialized => write!(f, "file header epoch is zero (uninitialized)"),
            FileError::VersionMismatch { expected, found } => {
                write!(f, "epoch changed: expected {expected}, found {found}")
            }
            FileError::InvalidLayout(msg) => write!(f, "invalid layout: {msg}"),
            FileError::Access(e) => write!(f, "{e}"),
            FileError::Poisoned => write!(f, "mapping lock poisoned"),
        }
    }
}

impl std::error::Error for FileError {}

impl From<std::io::Error> for FileError {
    fn from(e: std::io::Error) -> Self {
        FileError::Io(e)
    }
}

/// How a dictionary section's entries are framed. Mirrors
/// `otlp_mmap_dict::Framing` but as a plain data description, since the two
/// framings are different concrete types.
#[derive(Clone, Copy, Debug)]
pub enum DictFraming {
    Varint,
    Fixed { slot_size: usize },
}

/// The kind and parameters of one section in a [`LayoutDescriptor`].
#[derive(Clone, Debug)]
pub enum SectionKind {
    Ring {
        num_slots: u64,
        slot_size: u64,
        body_kind: BodyKind,
    },
    Dict {
        framing: DictFraming,
    },
}

impl SectionKind {
    /// Bytes this section needs reserved at file-creation time. Ring
    /// sections reserve their full fixed size; dictionary sections reserve
    /// only their header, since they grow by remap afterward.
    fn initial_len(&self) -> usize {
        match self {
            SectionKind::Ring {
                num_slots,
                slot_size,
                ..
            } => RingSection::<WriterFile>::section_len(*num_slots, *slot_size),
            SectionKind::Dict { .. } => otlp_mmap_dict::HEADER_LEN,
        }
    }

    fn is_growable(&self) -> bool {
        matches!(self, SectionKind::Dict { .. })
    }
}

/// A named section within a layout descriptor.
#[derive(Clone, Debug)]
pub struct SectionSpec {
    pub name: String,
    pub kind: SectionKind,
}

/// The full set of sections a file should contain, in order.
#[derive(Clone, Debug, Default)]
pub struct LayoutDescriptor {
    pub sections: Vec<SectionSpec>,
}

impl LayoutDescriptor {
    pub fn new() -> Self {
        LayoutDescriptor { sections: vec![] }
    }

    pub fn with_section(mut self, name: impl Into<String>, kind: SectionKind) -> Self {
        self.sections.push(SectionSpec {
            name: name.into(),
            kind,
        });
        self
    }

    /// Validate the descriptor: at most [`MAX_SECTIONS`] sections, and at
    /// most one growable (dictionary) section, which must be last if
    /// present, since growth extends the file past its final byte.
    fn validate(&self) -> Result<(), FileError> {
        if self.sections.is_empty() {
            return Err(FileError::InvalidLayout("layout has no sections".into()));
        }
        if self.sections.len() > MAX_SECTIONS {
            return Err(FileError::InvalidLayout(format!(
                "{} sections exceeds the {} a 64-byte header can address",
                self.sections.len(),
                MAX_SECTIONS
            )));
        }
        let growable_count = self.sections.iter().filter(|s| s.kind.is_growable()).count();
        if growable_count > 1 {
            return Err(FileError::InvalidLayout(
                "at most one growable dictionary section is supported per file".into(),
            ));
        }
        if growable_count == 1 && !self.sections.last().unwrap().kind.is_growable() {
            return Err(FileError::InvalidLayout(
                "a growable dictionary section must be the last section in the file".into(),
            ));
        }
        Ok(())
    }

    /// Compute absolute byte offsets for each section, given the header.
    fn offsets(&self) -> Vec<usize> {
        let mut offset = HEADER_LEN;
        let mut out = Vec::with_capacity(self.sections.len());
        for section in &self.sections {
            out.push(offset);
            offset += section.kind.initial_len();
        }
        out
    }

    fn total_len(&self) -> usize {
        HEADER_LEN + self.sections.iter().map(|s| s.kind.initial_len()).sum::<usize>()
    }

    /// Read back a file's declared section offsets and epoch without
    /// assuming they match `self`, for the discovery step that decides
    /// whether a reattaching writer can reuse the file or must reinitialize.
    pub fn discover(path: impl AsRef<Path>) -> Result<DiscoveredLayout, FileError> {
        let file = std::fs::OpenOptions::new().read(true).open(path)?;
        let len = file.metadata()?.len() as usize;
        if len < HEADER_LEN {
            return Ok(DiscoveredLayout {
                epoch: 0,
                section_offsets: vec![],
            });
        }
        let mmap = unsafe { memmap2::Mmap::map(&file)? };
        let epoch = Field64::at(&mmap, 0).map_err(FileError::Access)?.load_acquire();
        let mut section_offsets = vec![];
        for k in 0..MAX_SECTIONS {
            let value = Field64::at(&mmap, 8 + 8 * k).map_err(FileError::Access)?.load();
            if value == 0 {
                break;
            }
            section_offsets.push(value);
        }
        Ok(DiscoveredLayout {
            epoch,
            section_offsets,
        })
    }
}

/// The result of [`LayoutDescriptor::discover`]: what a file actually
/// contains, independent of what the caller expects.
#[derive(Clone, Debug)]
pub struct DiscoveredLayout {
    pub epoch: u64,
    pub section_offsets: Vec<u64>,
}

impl DiscoveredLayout {
    pub fn is_initialized(&self) -> bool {
        self.epoch != 0
    }
}

/// A read-only view of a file's section table, for introspection by
/// surrounding tooling. No CLI is provided at this layer, only this
/// structured description.
#[derive(Clone, Debug)]
pub struct SectionTable {
    pub epoch: u64,
    pub sections: Vec<(String, usize)>,
}

/// A writer-owned, growable mapping of a section-laid-out file.
pub struct MappedFile {
    writer: WriterFile,
    layout: LayoutDescriptor,
    offsets: Vec<usize>,
    epoch: u64,
}

impl MappedFile {
    /// Create and initialize a new file at `path` with the given `epoch`
    /// and `layout`: truncates, writes the header, and initializes every
    /// section's bookkeeping fields. The epoch is release-stored last, so
    /// any attacher that observes a nonzero epoch sees a fully initialized
    /// file.
    pub fn create(path: impl AsRef<Path>, epoch: u64, layout: LayoutDescriptor) -> Result<Self, FileError> {
        assert_ne!(epoch, 0, "epoch zero means uninitialized");
        layout.validate()?;
        let offsets = layout.offsets();
        let total_len = layout.total_len();

        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(total_len as u64)?;
        let writer = WriterFile::new(file)?;

        // `set_len` zero-fills new bytes, so the header starts all-zero.
        // Write the section offset table before the epoch, so epoch is the
        // last thing a reader observes as nonzero.
        writer.with_bytes(|bytes| {
            for (k, &offset) in offsets.iter().enumerate() {
                Field64::at(bytes, 8 + 8 * k)
                    .map_err(FileError::Access)?
                    .store(offset as u64);
            }
            Ok::<(), FileError>(())
        })??;

        for (section, &offset) in layout.sections.iter().zip(offsets.iter()) {
            Self::init_section(&writer, &section.kind, offset)?;
        }

        writer.with_bytes(|bytes| {
            Field64::at(bytes, 0).map_err(FileError::Access)?.store_release(epoch);
            Ok::<(), FileError>(())
        })??;

        #[cfg(feature = "tracing")]
        tracing::debug!(epoch, sections = layout.sections.len(), "initialized mapped file");

        Ok(MappedFile {
            writer,
            layout,
            offsets,
            epoch,
        })
    }

    fn init_section(writer: &WriterFile, kind: &SectionKind, offset: usize) -> Result<(), FileError> {
        match kind {
            SectionKind::Ring {
                num_slots,
                slot_size,
                body_kind,
            } => {
                RingSection::init(writer, offset, *num_slots, *slot_size, *body_kind, None)
                    .map_err(|e| FileError::InvalidLayout(e.to_string()))?;
                Ok(())
            }
            SectionKind::Dict { framing } => {
                match framing {
                    DictFraming::Varint => {
                        DictSection::init(writer, offset, DictVarint, None).map_err(|e| FileError::InvalidLayout(e.to_string()))?;
                    }
                    DictFraming::Fixed { slot_size } => {
                        DictSection::init(writer, offset, DictFixed { slot_size: *slot_size }, None)
                            .map_err(|e| FileError::InvalidLayout(e.to_string()))?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Re-attach a writer to an already-initialized file, preserving
    /// whatever epoch is currently stored (continuing in place).
    pub fn attach_preserving_epoch(path: impl AsRef<Path>, layout: LayoutDescriptor) -> Result<Self, FileError> {
        layout.validate()?;
        let file = std::fs::OpenOptions::new().read(true).write(true).open(path)?;
        let writer = WriterFile::new(file)?;
        let epoch = writer
            .with_bytes(|bytes| Field64::at(bytes, 0).map_err(FileError::Access).map(|f| f.load_acquire()))??;
        if epoch == 0 {
            return Err(FileError::Uninitialized);
        }
        let offsets = layout.offsets();
        Ok(MappedFile {
            writer,
            layout,
            offsets,
            epoch,
        })
    }

    /// Re-attach a writer to an already-initialized file, choosing a new
    /// epoch and re-initializing every section. This forces any existing
    /// reader to reset.
    pub fn attach_with_new_epoch(
        path: impl AsRef<Path>,
        new_epoch: u64,
        layout: LayoutDescriptor,
    ) -> Result<Self, FileError> {
        Self::create(path, new_epoch, layout)
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Attach a ring section by its position in the layout.
    pub fn ring(
        &self,
        index: usize,
        num_slots: u64,
        slot_size: u64,
        body_kind: BodyKind,
    ) -> Result<RingSection<&WriterFile>, FileError> {
        let offset = *self.offsets.get(index).ok_or_else(|| {
            FileError::InvalidLayout(format!("no section at index {index}"))
        })?;
        RingSection::attach(
            &self.writer,
            offset,
            num_slots,
            slot_size,
            body_kind,
            Some(EpochCheck { offset: 0, expected: self.epoch }),
        )
        .map_err(|e| FileError::InvalidLayout(e.to_string()))
    }

    /// Attach a varint-framed dictionary section by its position in the layout.
    pub fn dict_varint(&self, index: usize) -> Result<DictSection<&WriterFile, DictVarint>, FileError> {
        let offset = *self.offsets.get(index).ok_or_else(|| {
            FileError::InvalidLayout(format!("no section at index {index}"))
        })?;
        Ok(DictSection::attach(
            &self.writer,
            offset,
            DictVarint,
            Some(EpochCheck { offset: 0, expected: self.epoch }),
        ))
    }

    /// Attach a fixed-framed dictionary section by its position in the layout.
    pub fn dict_fixed(&self, index: usize, slot_size: usize) -> Result<DictSection<&WriterFile, DictFixed>, FileError> {
        let offset = *self.offsets.get(index).ok_or_else(|| {
            FileError::InvalidLayout(format!("no section at index {index}"))
        })?;
        Ok(DictSection::attach(
            &self.writer,
            offset,
            DictFixed { slot_size },
            Some(EpochCheck { offset: 0, expected: self.epoch }),
        ))
    }

    /// A read-only description of this file's section table.
    pub fn section_table(&self) -> SectionTable {
        SectionTable {
            epoch: self.epoch,
            sections: self
                .layout
                .sections
                .iter()
                .zip(self.offsets.iter())
                .map(|(s, &o)| (s.name.clone(), o))
                .collect(),
        }
    }
}

/// A reader-owned mapping of a section-laid-out file. Never grows the
/// file itself; only re-syncs its view to the file's current on-disk size.
pub struct MappedReader {
    reader: ReaderFile,
    layout: LayoutDescriptor,
    offsets: Vec<usize>,
    epoch: u64,
}

impl MappedReader {
    /// Attach to an existing, initialized file. Errors with
    /// [`FileError::Uninitialized`] if the epoch is still zero.
    pub fn attach(path: impl AsRef<Path>, layout: LayoutDescriptor) -> Result<Self, FileError> {
        layout.validate()?;
        let file = std::fs::OpenOptions::new().read(true).open(path)?;
        let reader = ReaderFile::new(file)?;
        let epoch = reader
            .with_bytes(|bytes| Field64::at(bytes, 0).map_err(FileError::Access).map(|f| f.load_acquire()))??;
        if epoch == 0 {
            return Err(FileError::Uninitialized);
        }
        let offsets = layout.offsets();
        Ok(MappedReader {
            reader,
            layout,
            offsets,
            epoch,
        })
    }

    /// Re-check the file header's epoch against the one cached at attach
    /// time. A mismatch means the writer re-initialized and the caller must
    /// re-attach from scratch.
    pub fn check_epoch(&self) -> Result<(), FileError> {
        let found = self
            .reader
            .with_bytes(|bytes| Field64::at(bytes, 0).map_err(FileError::Access).map(|f| f.load_acquire()))??;
        if found != self.epoch {
            return Err(FileError::VersionMismatch {
                expected: self.epoch,
                found,
            });
        }
        Ok(())
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn ring(
        &self,
        index: usize,
        num_slots: u64,
        slot_size: u64,
        body_kind: BodyKind,
    ) -> Result<RingSection<&ReaderFile>, FileError> {
        let offset = *self.offsets.get(index).ok_or_else(|| {
            FileError::InvalidLayout(format!("no section at index {index}"))
        })?;
        RingSection::attach(
            &self.reader,
            offset,
            num_slots,
            slot_size,
            body_kind,
            Some(EpochCheck { offset: 0, expected: self.epoch }),
        )
        .map_err(|e| FileError::InvalidLayout(e.to_string()))
    }

    pub fn dict_varint(&self, index: usize) -> Result<DictSection<&ReaderFile, DictVarint>, FileError> {
        let offset = *self.offsets.get(index).ok_or_else(|| {
            FileError::InvalidLayout(format!("no section at index {index}"))
        })?;
        Ok(DictSection::attach(
            &self.reader,
            offset,
            DictVarint,
            Some(EpochCheck { offset: 0, expected: self.epoch }),
        ))
    }

    pub fn dict_fixed(&self, index: usize, slot_size: usize) -> Result<DictSection<&ReaderFile, DictFixed>, FileError> {
        let offset = *self.offsets.get(index).ok_or_else(|| {
            FileError::InvalidLayout(format!("no section at index {index}"))
        })?;
        Ok(DictSection::attach(
            &self.reader,
            offset,
            DictFixed { slot_size },
            Some(EpochCheck { offset: 0, expected: self.epoch }),
        ))
    }

    pub fn section_table(&self) -> SectionTable {
        SectionTable {
            epoch: self.epoch,
            sections: self
                .layout
                .sections
                .iter()
                .zip(self.offsets.iter())
                .map(|(s, &o)| (s.name.clone(), o))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_ring_layout() -> LayoutDescriptor {
        LayoutDescriptor::new().with_section(
            "spans",
            SectionKind::Ring {
                num_slots: 4,
                slot_size: 8,
                body_kind: BodyKind::Fixed,
            },
        )
    }

    #[test]
    fn create_then_attach_roundtrips_a_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spans.mmap");
        let mapped = MappedFile::create(&path, 42, single_ring_layout()).unwrap();
        let ring = mapped.ring(0, 4, 8, BodyKind::Fixed).unwrap();
        ring.claim_and_write(&7u64.to_le_bytes()).unwrap();
        drop(ring);
        drop(mapped);

        let reader = MappedReader::attach(&path, single_ring_layout()).unwrap();
        assert_eq!(reader.epoch(), 42);
        let ring = reader.ring(0, 4, 8, BodyKind::Fixed).unwrap();
        let body = ring.next_readable().unwrap().unwrap();
        assert_eq!(u64::from_le_bytes(body.try_into().unwrap()), 7);
    }

    #[test]
    fn dictionary_grows_the_file_on_demand() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resources.mmap");
        let layout = LayoutDescriptor::new().with_section("resources", SectionKind::Dict { framing: DictFraming::Varint });
        let mapped = MappedFile::create(&path, 1, layout).unwrap();
        let dict = mapped.dict_varint(0).unwrap();
        let big = vec![0xee_u8; 1 << 20];
        let offset = dict.append(&big).unwrap();
        assert_eq!(dict.read(offset).unwrap(), big);
        let on_disk = std::fs::metadata(&path).unwrap().len();
        assert!(on_disk as usize > HEADER_LEN + otlp_mmap_dict::HEADER_LEN);
    }

    #[test]
    fn reattach_with_new_epoch_invalidates_readers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spans.mmap");
        MappedFile::create(&path, 1, single_ring_layout()).unwrap();
        let reader = MappedReader::attach(&path, single_ring_layout()).unwrap();
        MappedFile::attach_with_new_epoch(&path, 2, single_ring_layout()).unwrap();
        assert!(matches!(
            reader.check_epoch(),
            Err(FileError::VersionMismatch { expected: 1, found: 2 })
        ));
    }

    #[test]
    fn layout_rejects_non_terminal_dict_section() {
        let layout = LayoutDescriptor::new()
            .with_section("resources", SectionKind::Dict { framing: DictFraming::Varint })
            .with_section(
                "spans",
                SectionKind::Ring {
                    num_slots: 4,
                    slot_size: 8,
                    body_kind: BodyKind::Fixed,
                },
            );
        assert!(layout.validate().is_err());
    }
}
