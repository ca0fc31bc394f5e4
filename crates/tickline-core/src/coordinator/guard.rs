use std::sync::atomic::{AtomicBool, Ordering};

/// Holds the "refresh in progress" flag; releases it on drop, unwinding included.
pub(super) struct RefreshGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RefreshGuard<'a> {
    /// Take the flag if nobody holds it. Never blocks.
    pub(super) fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_until_release() {
        let flag = AtomicBool::new(false);
        let first = RefreshGuard::try_acquire(&flag);
        assert!(first.is_some());
        assert!(RefreshGuard::try_acquire(&flag).is_none());

        drop(first);
        assert!(RefreshGuard::try_acquire(&flag).is_some());
    }

    #[test]
    fn released_on_panic() {
        let flag = AtomicBool::new(false);
        let result = std::panic::catch_unwind(|| {
            let _guard = RefreshGuard::try_acquire(&flag);
            panic!("aggregation failed");
        });
        assert!(result.is_err());
        assert!(!flag.load(Ordering::SeqCst));
    }
}
