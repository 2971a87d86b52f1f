use std::path::PathBuf;

use clap::Parser;
use otlp_mmap::{Backoff, BodyKind, LayoutDescriptor, Reader, SectionKind, YieldBackoff};

#[derive(Parser)]
struct ReaderArgs {
    /// Path to the shared-memory file to attach to.
    file: PathBuf,

    #[arg(long, default_value_t = 64)]
    num_slots: u64,

    /// Stop once this many consecutive empty polls have been observed,
    /// treating the writer as done (dead or caught up).
    #[arg(long, default_value_t = 10_000)]
    idle_polls_before_stop: u32,
}

fn main() {
    let args = ReaderArgs::parse();

    let layout = LayoutDescriptor::new().with_section(
        "events",
        SectionKind::Ring {
            num_slots: args.num_slots,
            slot_size: 8,
            body_kind: BodyKind::Fixed,
        },
    );

    let reader = Reader::attach(&args.file, layout).expect("failed to attach to shared file");
    let events = reader.ring("events").expect("events section missing");

    let mut backoff = YieldBackoff;
    let mut idle = 0u32;
    loop {
        match events.next_readable().expect("next_readable failed") {
            Some(body) => {
                let value = u64::from_le_bytes(body.try_into().expect("slot is 8 bytes"));
                println!("{value}");
                idle = 0;
            }
            None => {
                idle += 1;
                if idle >= args.idle_polls_before_stop {
                    break;
                }
                backoff.spin(idle);
            }
        }
    }
}
