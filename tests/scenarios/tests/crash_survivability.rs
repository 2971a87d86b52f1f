use std::process::Command;
use std::time::Duration;

use otlp_mmap_test_harness::Env;

const PRODUCER: &str = env!("CARGO_BIN_FILE_OTLP_MMAP_TEST_PRODUCER_producer");
const READER: &str = env!("CARGO_BIN_FILE_OTLP_MMAP_TEST_READER_reader");

/// Crash survivability. The producer publishes values and is killed (not
/// asked to shut down) after a known count; a reader attached afterward
/// must recover exactly that prefix and then observe no further progress.
#[test]
fn reader_recovers_exact_prefix_after_producer_is_killed() {
    let env = Env::new();
    let path = env.file_path();

    let mut producer = Command::new(PRODUCER);
    producer
        .arg(&path)
        .args(["--count", "40", "--num-slots", "64"]);
    let mut child = env.spawn(producer);

    // Give the producer time to publish, then kill it uncleanly rather than
    // waiting for it to exit on its own, since a real crash gives no warning.
    std::thread::sleep(Duration::from_millis(300));
    child.kill().expect("failed to kill producer");
    child.wait().expect("failed to reap killed producer");

    let mut reader = Command::new(READER);
    reader
        .arg(&path)
        .args(["--num-slots", "64", "--idle-polls-before-stop", "200"]);
    let assert = env.run(reader).success();
    let output = assert.get_output();
    let stdout = String::from_utf8_lossy(&output.stdout);

    let consumed: Vec<u64> = stdout
        .lines()
        .map(|line| line.parse().expect("reader printed a non-u64 line"))
        .collect();

    assert!(!consumed.is_empty(), "reader recovered no values at all");
    for (i, &value) in consumed.iter().enumerate() {
        assert_eq!(value, i as u64, "recovered sequence is not a monotonic prefix from zero");
    }
}
