use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::assert::Assert;
use assert_cmd::Command as AssertCommand;

/// A scratch directory holding one shared-memory file, shared across a
/// producer and reader process spawned as children of the test.
pub struct Env {
    dir: tempfile::TempDir,
}

impl Env {
    pub fn new() -> Self {
        Env {
            dir: tempfile::tempdir().expect("failed to create scratch dir"),
        }
    }

    /// Absolute path of the shared telemetry file within this environment.
    pub fn file_path(&self) -> PathBuf {
        self.dir.path().join("telemetry.mmap")
    }

    /// Run `cmd` to completion and assert on its outcome.
    pub fn run(&self, cmd: Command) -> Assert {
        AssertCommand::from_std(cmd).assert()
    }

    /// Spawn `cmd` without waiting for it to complete, for scenarios that
    /// need to kill the process mid-run (crash simulation).
    pub fn spawn(&self, mut cmd: Command) -> std::process::Child {
        cmd.spawn().expect("failed to spawn child process")
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}
