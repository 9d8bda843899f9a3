//! Worker liveness through file metadata.
//!
//! Each worker owns an unlinked temporary file. The worker flips the file's
//! mode on every loop iteration, which bumps its change time; the arbiter
//! reads that change time to decide whether the worker still makes progress.
//! The file is created by the arbiter before fork, so both sides hold the same
//! descriptor, and it disappears with the last process holding it.

use std::fs::{File, Permissions};
use std::io;
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;
use std::time::{Duration, SystemTime};

/// A per-worker heartbeat file.
#[derive(Debug)]
pub struct Heartbeat {
    file: File,
    spinner: bool,
}

impl Heartbeat {
    /// Creates the heartbeat file in `dir`. The file has no name on disk.
    pub fn new<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        let file = tempfile::tempfile_in(dir)?;
        Ok(Self { file, spinner: false })
    }

    /// Records that the worker is alive.
    pub fn notify(&mut self) -> io::Result<()> {
        self.spinner = !self.spinner;
        let mode = if self.spinner { 0o1 } else { 0o0 };
        self.file.set_permissions(Permissions::from_mode(mode))
    }

    /// When the worker last called [`notify`](Self::notify), or when the file was created.
    pub fn last_update(&self) -> io::Result<SystemTime> {
        let metadata = self.file.metadata()?;
        let seconds = u64::try_from(metadata.ctime()).unwrap_or_default();
        let nanos = u32::try_from(metadata.ctime_nsec()).unwrap_or_default();
        Ok(SystemTime::UNIX_EPOCH + Duration::new(seconds, nanos))
    }
}

impl AsFd for Heartbeat {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}
