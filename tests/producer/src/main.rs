use std::path::PathBuf;

use clap::Parser;
use otlp_mmap::{BodyKind, LayoutDescriptor, SectionKind, Writer};

#[derive(Parser)]
struct ProducerArgs {
    /// Path to the shared-memory file to create.
    file: PathBuf,

    /// How many fixed-size u64 values to publish.
    #[arg(long, default_value_t = 50)]
    count: u64,

    #[arg(long, default_value_t = 64)]
    num_slots: u64,

    /// Exit without flushing or closing anything after publishing this many
    /// values, to simulate a crash mid-stream. `None` publishes all `count`
    /// values and exits cleanly.
    #[arg(long)]
    crash_after: Option<u64>,
}

fn main() {
    let args = ProducerArgs::parse();

    let layout = LayoutDescriptor::new().with_section(
        "events",
        SectionKind::Ring {
            num_slots: args.num_slots,
            slot_size: 8,
            body_kind: BodyKind::Fixed,
        },
    );

    let epoch = std::process::id() as u64 + 1;
    let writer = Writer::create(&args.file, epoch, layout).expect("failed to create shared file");
    let events = writer.ring("events").expect("events section missing");

    for i in 0..args.count {
        events.claim_and_write(&i.to_le_bytes()).expect("claim_and_write failed");

        if args.crash_after == Some(i) {
            // Simulate a crash: no flush, no graceful shutdown, just stop.
            std::process::abort();
        }
    }
}
