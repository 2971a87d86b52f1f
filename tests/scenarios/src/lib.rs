//! Real cross-process scenarios live under `tests/`; this crate exists only
//! to pull in the `producer`/`reader` binaries as artifact dependencies so
//! their paths are available via `env!("CARGO_BIN_FILE_...")`.
