//! Advisory file locks
//!
//! An exclusive `flock(2)` is held around every append and every rename of a
//! buffer file, so external tools that honour the lock never observe a
//! half-written row.

use std::fs::File;
use std::io;
use std::os::unix::io::AsRawFd;

/// Exclusive `flock` held for the guard's lifetime
pub(crate) struct FileLock<'a> {
    file: &'a File,
}

impl<'a> FileLock<'a> {
    /// Block until an exclusive lock on `file` is acquired
    pub(crate) fn exclusive(file: &'a File) -> io::Result<Self> {
        loop {
            // SAFETY: the fd stays valid for as long as `file` is borrowed
            let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
            if result == 0 {
                return Ok(Self { file });
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }
}

impl Drop for FileLock<'_> {
    fn drop(&mut self) {
        // Best effort; closing the fd releases the lock anyway
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}
