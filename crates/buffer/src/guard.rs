//! Non-reentrant sweep guards
//!
//! A sweep that is still uploading when its timer fires again must not start
//! a second pass over the same files. Each sweep kind owns a [`SweepFlag`];
//! the [`SweepGuard`] returned by `try_acquire` clears it on drop, including
//! on early returns and panics.

use std::sync::atomic::{AtomicBool, Ordering};

/// Try-acquire flag for one kind of sweep
#[derive(Debug, Default)]
pub struct SweepFlag {
    running: AtomicBool,
}

impl SweepFlag {
    /// Create an idle flag
    pub const fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
        }
    }

    /// Claim the flag, or `None` if a sweep already holds it
    pub fn try_acquire(&self) -> Option<SweepGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SweepGuard { flag: self })
    }

    /// True while a guard is held
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Held while a sweep runs
#[derive(Debug)]
pub struct SweepGuard<'a> {
    flag: &'a SweepFlag,
}

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.flag.running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails() {
        let flag = SweepFlag::new();
        let guard = flag.try_acquire();
        assert!(guard.is_some());
        assert!(flag.is_running());
        assert!(flag.try_acquire().is_none());

        drop(guard);
        assert!(!flag.is_running());
        assert!(flag.try_acquire().is_some());
    }

    #[test]
    fn test_released_on_panic() {
        let flag = SweepFlag::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = flag.try_acquire().unwrap();
            panic!("sweep failed");
        }));
        assert!(result.is_err());
        assert!(!flag.is_running());
    }

    #[test]
    fn test_flags_are_independent() {
        let scheduled = SweepFlag::new();
        let forced = SweepFlag::new();
        let _a = scheduled.try_acquire().unwrap();
        assert!(forced.try_acquire().is_some());
    }
}
