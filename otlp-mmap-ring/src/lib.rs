//! The MPSC fixed-slot ring buffer: CAS-arbitrated claims, release-published
//! availability cells, and a single reader cursor.
//!
//! Layout (relative to `section_start`):
//! - Header, 32 bytes: `num_slots` (u64), `slot_size` (u64), `reader_index`
//!   (i64, -1 initial), `writer_index` (i64, -1 initial).
//! - Availability array: `4 * num_slots` bytes, one i32 generation per slot,
//!   -1 initial.
//! - Slot area: `slot_size * num_slots` bytes.

use std::fmt;

use otlp_mmap_header::region::MappedRegion;
use otlp_mmap_header::varint::{self, DecodeError as VarintDecodeError};
use otlp_mmap_header::{u8_slice, AccessError, Availability, EpochCheck, Field64, SignedField64};

/// Size in bytes of the ring section header.
pub const HEADER_LEN: usize = 32;

/// Errors raised by ring operations.
#[derive(Debug)]
pub enum RingError {
    /// No capacity for a claim: the writer would advance more than
    /// `num_slots` ahead of the reader.
    RingFull,
    /// Encoded payload size exceeds a variable-body ring's `slot_size`, or a
    /// fixed-body ring received a payload of the wrong length.
    PayloadTooLarge { len: usize, max: usize },
    /// An attached file's `num_slots`/`slot_size` disagree with expectation.
    LayoutMismatch { expected: (u64, u64), found: (u64, u64) },
    /// The layout requested at `init` time can't be realized (e.g. a
    /// `num_slots` that isn't a power of two).
    InvalidLayout(String),
    /// The containing file's version epoch no longer matches the one
    /// observed when this section was attached.
    VersionMismatch { expected: u64, found: u64 },
    /// A stored variable-body varint length prefix was malformed.
    Decode(VarintDecodeError),
    /// A field access fell outside the mapped region or was misaligned.
    Access(AccessError),
    /// The underlying region failed to resolve its bytes.
    Region(String),
}

impl fmt::Display for RingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RingError::RingFull => write!(f, "ring has no free capacity for a claim"),
            RingError::PayloadTooLarge { len, max } => {
                write!(f, "payload of {len} bytes exceeds slot size {max}")
            }
            RingError::LayoutMismatch { expected, found } => write!(
                f,
                "ring layout mismatch: expected (num_slots={}, slot_size={}), found (num_slots={}, slot_size={})",
                expected.0, expected.1, found.0, found.1
            ),
            RingError::InvalidLayout(msg) => write!(f, "invalid ring layout: {msg}"),
            RingError::VersionMismatch { expected, found } => {
                write!(f, "epoch changed: expected {expected}, found {found}")
            }
            RingError::Decode(e) => write!(f, "malformed slot body: {e}"),
            RingError::Access(e) => write!(f, "{e}"),
            RingError::Region(msg) => write!(f, "region error: {msg}"),
        }
    }
}

impl std::error::Error for RingError {}

/// How a ring's slot bodies are framed, declared once at init time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyKind {
    /// Every slot carries exactly `slot_size` raw bytes.
    Fixed,
    /// Slots carry a varint length prefix followed by up to `slot_size -
    /// prefix_len` bytes of payload.
    Variable,
}

impl BodyKind {
    fn write(&self, bytes: &[u8], offset: usize, slot_size: usize, payload: &[u8]) -> Result<(), RingError> {
        match self {
            BodyKind::Fixed => {
                if payload.len() != slot_size {
                    return Err(RingError::PayloadTooLarge {
                        len: payload.len(),
                        max: slot_size,
                    });
                }
                let cells = u8_slice(bytes, offset, slot_size).map_err(RingError::Access)?;
                otlp_mmap_header::copy_into(cells, payload);
                Ok(())
            }
            BodyKind::Variable => {
                let mut scratch = [0u8; varint::MAX_ENCODED_LEN];
                let prefix_len = varint::encode(payload.len() as u64, &mut scratch);
                let total = prefix_len + payload.len();
                if total > slot_size {
                    return Err(RingError::PayloadTooLarge {
                        len: total,
                        max: slot_size,
                    });
                }
                let prefix_cells = u8_slice(bytes, offset, prefix_len).map_err(RingError::Access)?;
                otlp_mmap_header::copy_into(prefix_cells, &scratch[..prefix_len]);
                let payload_cells = u8_slice(bytes, offset + prefix_len, payload.len())
                    .map_err(RingError::Access)?;
                otlp_mmap_header::copy_into(payload_cells, payload);
                Ok(())
            }
        }
    }

    fn read(&self, bytes: &[u8], offset: usize, slot_size: usize) -> Result<Vec<u8>, RingError> {
        match self {
            BodyKind::Fixed => {
                let cells = u8_slice(bytes, offset, slot_size).map_err(RingError::Access)?;
                let mut out = vec![0u8; slot_size];
                otlp_mmap_header::copy_out(cells, &mut out);
                Ok(out)
            }
            BodyKind::Variable => {
                let probe_len = varint::MAX_ENCODED_LEN.min(slot_size);
                let probe_cells = u8_slice(bytes, offset, probe_len).map_err(RingError::Access)?;
                let mut probe = [0u8; varint::MAX_ENCODED_LEN];
                otlp_mmap_header::copy_out(probe_cells, &mut probe[..probe_len]);
                let (len, prefix_len) =
                    varint::decode(&probe[..probe_len]).map_err(RingError::Decode)?;
                let len = len as usize;
                let payload_cells =
                    u8_slice(bytes, offset + prefix_len, len).map_err(RingError::Access)?;
                let mut out = vec![0u8; len];
                otlp_mmap_header::copy_out(payload_cells, &mut out);
                Ok(out)
            }
        }
    }
}

/// An injection point for how a caller wants to wait on a spinning
/// operation. The substrate never sleeps or waits on the OS itself; callers
/// supply the policy.
pub trait Backoff {
    /// Called once per failed attempt, with the number of prior attempts.
    fn spin(&mut self, attempt: u32);
}

/// Spins on a CPU hint with no yielding. Appropriate when the caller expects
/// the other side to make progress within a handful of cycles.
#[derive(Default)]
pub struct SpinBackoff;

impl Backoff for SpinBackoff {
    fn spin(&mut self, _attempt: u32) {
        std::hint::spin_loop();
    }
}

/// Spin-hints briefly, then yields the thread to the scheduler.
#[derive(Default)]
pub struct YieldBackoff;

impl Backoff for YieldBackoff {
    fn spin(&mut self, attempt: u32) {
        if attempt < 64 {
            std::hint::spin_loop();
        } else {
            std::thread::yield_now();
        }
    }
}

/// Read-only snapshot of a ring's bookkeeping fields, for diagnostics.
#[derive(Clone, Copy, Debug)]
pub struct RingMetrics {
    pub num_slots: u64,
    pub slot_size: u64,
    pub reader_index: i64,
    pub writer_index: i64,
}

impl RingMetrics {
    /// Slots claimed but not yet consumed by the reader.
    pub fn outstanding(&self) -> i64 {
        self.writer_index - self.reader_index
    }
}

/// A ring buffer mapped onto region `R`.
pub struct RingSection<R> {
    region: R,
    section_start: usize,
    num_slots: u64,
    slot_size: u64,
    log2_n: u32,
    body_kind: BodyKind,
    epoch: Option<EpochCheck>,
}

impl<R> RingSection<R>
where
    R: MappedRegion,
    R::Error: fmt::Debug,
{
    fn check_epoch(&self, bytes: &[u8]) -> Result<(), RingError> {
        if let Some(epoch) = self.epoch {
            let found = Field64::at(bytes, epoch.offset)
                .map_err(RingError::Access)?
                .load_acquire();
            if found != epoch.expected {
                return Err(RingError::VersionMismatch {
                    expected: epoch.expected,
                    found,
                });
            }
        }
        Ok(())
    }

    fn with_bytes<T>(&self, f: impl FnOnce(&[u8]) -> Result<T, RingError>) -> Result<T, RingError> {
        match self.region.with_bytes(|bytes| {
            self.check_epoch(bytes)?;
            f(bytes)
        }) {
            Ok(inner) => inner,
            Err(e) => Err(RingError::Region(format!("{e:?}"))),
        }
    }

    fn mask(&self) -> u64 {
        self.num_slots - 1
    }

    fn avail_offset(&self) -> usize {
        self.section_start + HEADER_LEN
    }

    fn slot_area_offset(&self) -> usize {
        self.avail_offset() + 4 * self.num_slots as usize
    }

    fn slot_offset(&self, index: u64) -> usize {
        self.slot_area_offset() + (index & self.mask()) as usize * self.slot_size as usize
    }

    /// Total bytes this ring section occupies, for sizing the containing
    /// file.
    pub fn section_len(num_slots: u64, slot_size: u64) -> usize {
        HEADER_LEN + 4 * num_slots as usize + (slot_size * num_slots) as usize
    }

    /// Initialize a fresh ring section: header zeroed except indices at -1,
    /// availability cells at -1. `epoch` is normally `None` here: the
    /// containing file's epoch field is written only after every section has
    /// been initialized, so checking it during `init` would always fail.
    pub fn init(
        region: R,
        section_start: usize,
        num_slots: u64,
        slot_size: u64,
        body_kind: BodyKind,
        epoch: Option<EpochCheck>,
    ) -> Result<Self, RingError> {
        if !num_slots.is_power_of_two() {
            return Err(RingError::InvalidLayout(format!(
                "num_slots {num_slots} is not a power of two"
            )));
        }
        let log2_n = num_slots.trailing_zeros();
        let section = RingSection {
            region,
            section_start,
            num_slots,
            slot_size,
            log2_n,
            body_kind,
            epoch,
        };
        section.with_bytes(|bytes| {
            Field64::at(bytes, section.section_start)
                .map_err(RingError::Access)?
                .store_release(num_slots);
            Field64::at(bytes, section.section_start + 8)
                .map_err(RingError::Access)?
                .store_release(slot_size);
            SignedField64::at(bytes, section.section_start + 16)
                .map_err(RingError::Access)?
                .store_release(-1);
            SignedField64::at(bytes, section.section_start + 24)
                .map_err(RingError::Access)?
                .store_release(-1);
            let avail = Availability::at(bytes, section.avail_offset(), num_slots as usize)
                .map_err(RingError::Access)?;
            for pos in 0..avail.len() {
                avail.store_release(pos, -1);
            }
            Ok(())
        })?;
        Ok(section)
    }

    /// Attach to an existing ring section, verifying its declared layout
    /// matches `expected_num_slots`/`expected_slot_size`. Pass `epoch` to
    /// have every subsequent operation on this handle check the containing
    /// file's version epoch and fail with `VersionMismatch` instead of
    /// silently reading across a writer-triggered reset.
    pub fn attach(
        region: R,
        section_start: usize,
        expected_num_slots: u64,
        expected_slot_size: u64,
        body_kind: BodyKind,
        epoch: Option<EpochCheck>,
    ) -> Result<Self, RingError> {
        let section = RingSection {
            region,
            section_start,
            num_slots: expected_num_slots,
            slot_size: expected_slot_size,
            log2_n: expected_num_slots.trailing_zeros(),
            body_kind,
            epoch,
        };
        let (found_slots, found_size) = section.with_bytes(|bytes| {
            let slots = Field64::at(bytes, section.section_start)
                .map_err(RingError::Access)?
                .load();
            let size = Field64::at(bytes, section.section_start + 8)
                .map_err(RingError::Access)?
                .load();
            Ok((slots, size))
        })?;
        if found_slots != expected_num_slots || found_size != expected_slot_size {
            return Err(RingError::LayoutMismatch {
                expected: (expected_num_slots, expected_slot_size),
                found: (found_slots, found_size),
            });
        }
        Ok(section)
    }

    fn writer_index_field<'a>(&self, bytes: &'a [u8]) -> Result<SignedField64<'a>, RingError> {
        SignedField64::at(bytes, self.section_start + 24).map_err(RingError::Access)
    }

    fn reader_index_field<'a>(&self, bytes: &'a [u8]) -> Result<SignedField64<'a>, RingError> {
        SignedField64::at(bytes, self.section_start + 16).map_err(RingError::Access)
    }

    /// Reserve the next claim index, if there is capacity.
    pub fn try_claim(&self) -> Result<Option<u64>, RingError> {
        self.with_bytes(|bytes| {
            let writer_field = self.writer_index_field(bytes)?;
            let reader_field = self.reader_index_field(bytes)?;
            loop {
                let w = writer_field.load();
                let candidate = w + 1;
                let r = reader_field.load_acquire();
                if (candidate - r) as u64 > self.num_slots {
                    return Ok(None);
                }
                match writer_field.compare_exchange(w, candidate) {
                    Ok(_) => return Ok(Some(candidate as u64)),
                    Err(_) => continue,
                }
            }
        })
    }

    /// Spin (via `backoff`) until a claim succeeds.
    pub fn claim_blocking(&self, backoff: &mut impl Backoff) -> Result<u64, RingError> {
        let mut attempt = 0u32;
        loop {
            if let Some(index) = self.try_claim()? {
                return Ok(index);
            }
            backoff.spin(attempt);
            attempt = attempt.wrapping_add(1);
        }
    }

    /// Write `payload` into the body of slot `index` (already claimed by the
    /// caller). Does not publish; call [`RingSection::publish`] after.
    pub fn write_slot(&self, index: u64, payload: &[u8]) -> Result<(), RingError> {
        let offset = self.slot_offset(index);
        self.with_bytes(|bytes| self.body_kind.write(bytes, offset, self.slot_size as usize, payload))
    }

    /// Release-publish slot `index` as readable.
    pub fn publish(&self, index: u64) -> Result<(), RingError> {
        self.with_bytes(|bytes| {
            let avail = Availability::at(bytes, self.avail_offset(), self.num_slots as usize)
                .map_err(RingError::Access)?;
            let pos = (index & self.mask()) as usize;
            let generation = (index >> self.log2_n) as i32;
            avail.store_release(pos, generation);
            Ok(())
        })
    }

    /// Claim the next slot, write `payload`, and publish it in one call.
    pub fn claim_and_write(&self, payload: &[u8]) -> Result<u64, RingError> {
        let index = self.try_claim()?.ok_or(RingError::RingFull)?;
        self.write_slot(index, payload)?;
        self.publish(index)?;
        Ok(index)
    }

    /// Like [`RingSection::claim_and_write`] but spins via `backoff` instead
    /// of reporting `RingFull`.
    pub fn claim_and_write_blocking(
        &self,
        payload: &[u8],
        backoff: &mut impl Backoff,
    ) -> Result<u64, RingError> {
        let index = self.claim_blocking(backoff)?;
        self.write_slot(index, payload)?;
        self.publish(index)?;
        Ok(index)
    }

    /// The next index the reader may consume, if it has been published.
    pub fn try_next_readable(&self) -> Result<Option<u64>, RingError> {
        self.with_bytes(|bytes| {
            let reader_field = self.reader_index_field(bytes)?;
            let r = reader_field.load_acquire();
            let next = r + 1;
            let pos = (next as u64 & self.mask()) as usize;
            let generation = (next >> self.log2_n) as i32;
            let avail = Availability::at(bytes, self.avail_offset(), self.num_slots as usize)
                .map_err(RingError::Access)?;
            if avail.load_acquire(pos) == generation {
                Ok(Some(next as u64))
            } else {
                Ok(None)
            }
        })
    }

    /// Read the body of slot `index`, previously confirmed readable by
    /// [`RingSection::try_next_readable`].
    pub fn read_slot(&self, index: u64) -> Result<Vec<u8>, RingError> {
        let offset = self.slot_offset(index);
        self.with_bytes(|bytes| self.body_kind.read(bytes, offset, self.slot_size as usize))
    }

    /// Release-store `reader_index = index`, marking it consumed.
    pub fn advance_reader(&self, index: u64) -> Result<(), RingError> {
        self.with_bytes(|bytes| {
            self.reader_index_field(bytes)?.store_release(index as i64);
            Ok(())
        })
    }

    /// Read the next readable slot and advance the reader past it, in one
    /// call. Returns `Ok(None)` if nothing is published yet.
    pub fn next_readable(&self) -> Result<Option<Vec<u8>>, RingError> {
        match self.try_next_readable()? {
            Some(index) => {
                let body = self.read_slot(index)?;
                self.advance_reader(index)?;
                Ok(Some(body))
            }
            None => Ok(None),
        }
    }

    /// Snapshot the ring's bookkeeping fields.
    pub fn metrics(&self) -> Result<RingMetrics, RingError> {
        self.with_bytes(|bytes| {
            Ok(RingMetrics {
                num_slots: self.num_slots,
                slot_size: self.slot_size,
                reader_index: self.reader_index_field(bytes)?.load(),
                writer_index: self.writer_index_field(bytes)?.load(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::UnsafeCell;
    use std::convert::Infallible;
    use std::sync::Arc;

    /// A fixed-size in-memory stand-in for a mapped file, used by tests that
    /// exercise the atomics contract across real threads. Never resized, so
    /// the only aliasing in play is exactly the kind the ring protocol is
    /// designed to make safe: concurrent atomic access to disjoint or
    /// CAS-arbitrated regions of the same buffer.
    pub(crate) struct VecRegion(UnsafeCell<Vec<u8>>);

    impl VecRegion {
        pub(crate) fn new(len: usize) -> Self {
            VecRegion(UnsafeCell::new(vec![0u8; len]))
        }
    }

    unsafe impl Sync for VecRegion {}

    impl MappedRegion for VecRegion {
        type Error = Infallible;

        fn with_bytes<T>(&self, f: impl FnOnce(&[u8]) -> T) -> Result<T, Infallible> {
            let bytes: &[u8] = unsafe { &*self.0.get() };
            Ok(f(bytes))
        }
    }

    fn ring(num_slots: u64, slot_size: u64, kind: BodyKind) -> RingSection<VecRegion> {
        let len = RingSection::<VecRegion>::section_len(num_slots, slot_size);
        RingSection::init(VecRegion::new(len), 0, num_slots, slot_size, kind, None).unwrap()
    }

    #[test]
    fn scenario_a_single_writer_single_reader() {
        let ring = ring(4, 8, BodyKind::Fixed);
        let values: [u64; 5] = [
            0x0101010101010101,
            0x0202020202020202,
            0x0303030303030303,
            0x0404040404040404,
            0x0505050505050505,
        ];
        let mut consumed = vec![];
        for v in values {
            ring.claim_and_write(&v.to_le_bytes()).unwrap();
            if let Some(body) = ring.next_readable().unwrap() {
                consumed.push(u64::from_le_bytes(body.try_into().unwrap()));
            }
        }
        assert_eq!(consumed, values);
        assert!(ring.next_readable().unwrap().is_none());
    }

    #[test]
    fn scenario_b_back_pressure() {
        let ring = ring(4, 8, BodyKind::Fixed);
        for i in 0..4u64 {
            ring.claim_and_write(&i.to_le_bytes()).unwrap();
        }
        assert!(matches!(
            ring.claim_and_write(&4u64.to_le_bytes()),
            Err(RingError::RingFull)
        ));
        let first = ring.next_readable().unwrap().unwrap();
        assert_eq!(u64::from_le_bytes(first.try_into().unwrap()), 0);
        let retried = ring.claim_and_write(&4u64.to_le_bytes());
        assert!(retried.is_ok());
    }

    #[test]
    fn scenario_c_multi_writer_interleave() {
        let ring = Arc::new(ring(1024, 16, BodyKind::Fixed));
        let threads: Vec<_> = (0..8u64)
            .map(|tid| {
                let ring = Arc::clone(&ring);
                std::thread::spawn(move || {
                    let mut backoff = SpinBackoff;
                    for i in 0..10_000u64 {
                        let value = (tid << 32) | i;
                        ring.claim_and_write_blocking(&value.to_le_bytes(), &mut backoff)
                            .unwrap();
                    }
                })
            })
            .collect();

        let mut per_tid: std::collections::HashMap<u64, Vec<u64>> = std::collections::HashMap::new();
        let mut total = 0usize;
        let mut backoff = SpinBackoff;
        while total < 80_000 {
            match ring.next_readable().unwrap() {
                Some(body) => {
                    let value = u64::from_le_bytes(body.try_into().unwrap());
                    per_tid.entry(value >> 32).or_default().push(value & 0xffff_ffff);
                    total += 1;
                }
                None => backoff.spin(0),
            }
        }
        for t in threads {
            t.join().unwrap();
        }
        for tid in 0..8u64 {
            let expected: Vec<u64> = (0..10_000).collect();
            assert_eq!(per_tid[&tid], expected);
        }
    }

    #[test]
    fn variable_body_rejects_oversized_payload() {
        let ring = ring(4, 4, BodyKind::Variable);
        assert!(matches!(
            ring.claim_and_write(b"toolong"),
            Err(RingError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn attach_rejects_layout_mismatch() {
        let len = RingSection::<Arc<VecRegion>>::section_len(4, 8);
        let region = Arc::new(VecRegion::new(len));
        RingSection::init(Arc::clone(&region), 0, 4, 8, BodyKind::Fixed, None).unwrap();
        let attached = RingSection::attach(Arc::clone(&region), 0, 4, 16, BodyKind::Fixed, None);
        assert!(matches!(attached, Err(RingError::LayoutMismatch { .. })));
    }

    #[test]
    fn init_rejects_non_power_of_two_num_slots() {
        let len = RingSection::<VecRegion>::section_len(3, 8);
        let result = RingSection::init(VecRegion::new(len), 0, 3, 8, BodyKind::Fixed, None);
        assert!(matches!(result, Err(RingError::InvalidLayout(_))));
    }

    #[test]
    fn attach_detects_epoch_change() {
        // Byte 0 stands in for a containing file's epoch field; the ring
        // section itself starts right after it.
        let epoch_offset = 0;
        let section_start = 8;
        let len = section_start + RingSection::<Arc<VecRegion>>::section_len(4, 8);
        let region = Arc::new(VecRegion::new(len));
        region
            .with_bytes(|bytes| {
                Field64::at(bytes, epoch_offset).unwrap().store_release(1);
            })
            .unwrap();
        RingSection::init(Arc::clone(&region), section_start, 4, 8, BodyKind::Fixed, None).unwrap();

        let attached = RingSection::attach(
            Arc::clone(&region),
            section_start,
            4,
            8,
            BodyKind::Fixed,
            Some(EpochCheck { offset: epoch_offset, expected: 1 }),
        )
        .unwrap();
        attached.claim_and_write(&1u64.to_le_bytes()).unwrap();

        region
            .with_bytes(|bytes| {
                Field64::at(bytes, epoch_offset).unwrap().store_release(2);
            })
            .unwrap();
        assert!(matches!(
            attached.next_readable(),
            Err(RingError::VersionMismatch { expected: 1, found: 2 })
        ));
    }

    #[test]
    fn generation_wrap_near_i32_max_is_consistent() {
        let ring = ring(4, 8, BodyKind::Fixed);
        // Jump the reader/writer indices close to where `(index >> log2_n)
        // as i32` approaches `i32::MAX`, instead of looping billions of
        // times to get there.
        let target_generation = (i32::MAX as i64) - 2;
        let near_boundary = target_generation << ring.log2_n;
        ring.with_bytes(|bytes| {
            ring.writer_index_field(bytes)?.store_release(near_boundary - 1);
            ring.reader_index_field(bytes)?.store_release(near_boundary - 1);
            Ok(())
        })
        .unwrap();

        ring.claim_and_write(&42u64.to_le_bytes()).unwrap();
        let body = ring.next_readable().unwrap().unwrap();
        assert_eq!(u64::from_le_bytes(body.try_into().unwrap()), 42);
        assert!(ring.next_readable().unwrap().is_none());
    }
}

#[cfg(test)]
mod proptests {
    use super::tests::*;
    use super::*;
    use proptest::prelude::*;

    fn drain_until_written(
        ring: &RingSection<VecRegion>,
        payload: &[u8],
        consumed: &mut Vec<u64>,
    ) {
        loop {
            match ring.claim_and_write(payload) {
                Ok(_) => return,
                Err(RingError::RingFull) => {
                    if let Some(body) = ring.next_readable().unwrap() {
                        consumed.push(u64::from_le_bytes(body.try_into().unwrap()));
                    }
                }
                Err(e) => panic!("unexpected ring error: {e}"),
            }
        }
    }

    proptest! {
        #[test]
        fn degenerate_single_slot_ring_stays_fifo(values in proptest::collection::vec(any::<u64>(), 1..100)) {
            let ring = ring(1, 8, BodyKind::Fixed);
            let mut consumed = vec![];
            for v in &values {
                drain_until_written(&ring, &v.to_le_bytes(), &mut consumed);
            }
            while let Some(body) = ring.next_readable().unwrap() {
                consumed.push(u64::from_le_bytes(body.try_into().unwrap()));
            }
            prop_assert_eq!(&consumed, &values);
        }

        #[test]
        fn random_claim_and_drain_schedule_stays_fifo(values in proptest::collection::vec(any::<u64>(), 1..300)) {
            let ring = ring(4, 8, BodyKind::Fixed);
            let mut consumed = vec![];
            for v in &values {
                drain_until_written(&ring, &v.to_le_bytes(), &mut consumed);
            }
            while let Some(body) = ring.next_readable().unwrap() {
                consumed.push(u64::from_le_bytes(body.try_into().unwrap()));
            }
            prop_assert_eq!(&consumed, &values);
        }
    }
}
