#[cfg(target_os = "linux")]
use linux_futex::{Futex, Private};
use std::sync::atomic::{AtomicU32, Ordering};

/// A 32-bit atomic word that threads can block on.
///
/// On Linux the word is a futex: `wait` parks the calling thread in the
/// kernel until another thread calls `wake_one`/`wake_all`, or immediately
/// returns if the value no longer matches. On other targets `wait` degrades
/// to yielding to the scheduler. Either way `wait` may return spuriously, so
/// every caller re-checks the word in a loop.
pub(crate) struct WaitState {
    #[cfg(target_os = "linux")]
    word: Futex<Private>,
    #[cfg(not(target_os = "linux"))]
    word: AtomicU32,
}

impl WaitState {
    pub(crate) const fn new(value: u32) -> Self {
        Self {
            #[cfg(target_os = "linux")]
            word: Futex::new(value),
            #[cfg(not(target_os = "linux"))]
            word: AtomicU32::new(value),
        }
    }

    fn atomic(&self) -> &AtomicU32 {
        #[cfg(target_os = "linux")]
        {
            &self.word.value
        }
        #[cfg(not(target_os = "linux"))]
        {
            &self.word
        }
    }

    pub(crate) fn load(&self, order: Ordering) -> u32 {
        self.atomic().load(order)
    }

    pub(crate) fn store(&self, value: u32, order: Ordering) {
        self.atomic().store(value, order)
    }

    pub(crate) fn swap(&self, value: u32, order: Ordering) -> u32 {
        self.atomic().swap(value, order)
    }

    pub(crate) fn compare_exchange(
        &self,
        current: u32,
        new: u32,
        success: Ordering,
        failure: Ordering,
    ) -> Result<u32, u32> {
        self.atomic().compare_exchange(current, new, success, failure)
    }

    pub(crate) fn compare_exchange_weak(
        &self,
        current: u32,
        new: u32,
        success: Ordering,
        failure: Ordering,
    ) -> Result<u32, u32> {
        self.atomic().compare_exchange_weak(current, new, success, failure)
    }

    pub(crate) fn fetch_add(&self, value: u32, order: Ordering) -> u32 {
        self.atomic().fetch_add(value, order)
    }

    pub(crate) fn fetch_sub(&self, value: u32, order: Ordering) -> u32 {
        self.atomic().fetch_sub(value, order)
    }

    /// Blocks while the word still holds `expected`.
    pub(crate) fn wait(&self, expected: u32) {
        #[cfg(target_os = "linux")]
        {
            // WrongValue and Interrupted both mean "go re-check the word".
            let _ = self.word.wait(expected);
        }
        #[cfg(not(target_os = "linux"))]
        {
            if self.word.load(Ordering::Relaxed) == expected {
                std::thread::yield_now();
            }
        }
    }

    pub(crate) fn wake_one(&self) {
        #[cfg(target_os = "linux")]
        self.word.wake(1);
    }

    pub(crate) fn wake_all(&self) {
        #[cfg(target_os = "linux")]
        self.word.wake(i32::MAX);
    }
}
