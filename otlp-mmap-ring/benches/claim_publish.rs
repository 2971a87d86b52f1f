use criterion::{criterion_group, criterion_main, Criterion};
use otlp_mmap_header::region::MappedRegion;
use otlp_mmap_ring::{BodyKind, RingSection};
use std::cell::UnsafeCell;
use std::convert::Infallible;

struct VecRegion(UnsafeCell<Vec<u8>>);

impl VecRegion {
    fn new(len: usize) -> Self {
        VecRegion(UnsafeCell::new(vec![0u8; len]))
    }
}

unsafe impl Sync for VecRegion {}

impl MappedRegion for VecRegion {
    type Error = Infallible;

    fn with_bytes<T>(&self, f: impl FnOnce(&[u8]) -> T) -> Result<T, Infallible> {
        Ok(f(unsafe { &*self.0.get() }))
    }
}

fn claim_publish_consume(c: &mut Criterion) {
    let num_slots = 1024u64;
    let slot_size = 64u64;
    let len = RingSection::<VecRegion>::section_len(num_slots, slot_size);
    let ring =
        RingSection::init(VecRegion::new(len), 0, num_slots, slot_size, BodyKind::Fixed, None).unwrap();
    let payload = vec![0xab_u8; slot_size as usize];

    c.bench_function("claim_write_publish_consume", |b| {
        b.iter(|| {
            ring.claim_and_write(&payload).unwrap();
            ring.next_readable().unwrap();
        })
    });
}

criterion_group!(benches, claim_publish_consume);
criterion_main!(benches);
