use crate::poison::{Flag, LockResult, PoisonError, TryLockError, TryLockResult};
use crate::wait::WaitState;
use std::cell::UnsafeCell;
use std::fmt;
use std::hint::spin_loop;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::Ordering;

/// A mutual exclusion lock: at most one thread at a time can reach the
/// protected value.
///
/// [`lock`](Mutex::lock) puts the calling thread to sleep until the current
/// holder releases; [`try_lock`](Mutex::try_lock) reports contention instead
/// of waiting. Either way the value is only reachable through the returned
/// [`MutexGuard`], and dropping that guard is what releases the lock.
///
/// # Poisoning
///
/// A guard dropped mid-panic marks the mutex as poisoned, because the holder
/// may have left the value half-updated. Every later acquisition then returns
/// `Err`, but the error still carries a live guard: call
/// [`PoisonError::into_inner`] to reach the value anyway, repair it, and
/// [`clear_poison`](Mutex::clear_poison) once it is consistent again.
///
/// # Fairness
///
/// None. Waiters wake in whatever order the OS picks, and a thread that
/// arrives at just the right moment can slip in ahead of threads already
/// asleep.
pub struct Mutex<T> {
    state: WaitState,
    poison: Flag,
    value: UnsafeCell<T>,
}

// The mutex hands out &mut T across threads, so T must be Send; no Sync
// bound on T because only one thread at a time can touch the value.
unsafe impl<T: Send> Send for Mutex<T> {}
unsafe impl<T: Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    const UNLOCKED: u32 = 0;
    const LOCKED: u32 = 1;
    /// Locked, and at least one thread may be asleep waiting for it.
    const CONTENDED: u32 = 2;

    pub const fn new(value: T) -> Self {
        Self {
            state: WaitState::new(Self::UNLOCKED),
            poison: Flag::new(),
            value: UnsafeCell::new(value),
        }
    }

    /// Acquires the lock, sleeping until it is available.
    ///
    /// Returns `Err` if the mutex is poisoned; the error wraps a guard that
    /// holds the lock all the same.
    pub fn lock(&self) -> LockResult<MutexGuard<'_, T>> {
        if self
            .state
            .compare_exchange(
                Self::UNLOCKED,
                Self::LOCKED,
                Ordering::Acquire,
                Ordering::Relaxed,
            )
            .is_err()
        {
            self.lock_contended();
        }
        self.poison.wrap(MutexGuard { mutex: self })
    }

    #[cold]
    fn lock_contended(&self) {
        // Spin briefly first: if the holder is about to leave we skip the
        // futex syscall, and while we only spin the state stays LOCKED so
        // the uncontended unlock remains a plain store with no wake.
        let mut spins = 100;
        while self.state.load(Ordering::Relaxed) == Self::LOCKED && spins > 0 {
            spins -= 1;
            spin_loop();
        }

        if self
            .state
            .compare_exchange(
                Self::UNLOCKED,
                Self::LOCKED,
                Ordering::Acquire,
                Ordering::Relaxed,
            )
            .is_ok()
        {
            return;
        }

        // About to sleep, so the state must say CONTENDED from here on: the
        // unlocking thread only issues a wake when it sees that value. If
        // the swap finds UNLOCKED we own the lock, already marked contended,
        // which costs at most one spurious wake later.
        while self.state.swap(Self::CONTENDED, Ordering::Acquire) != Self::UNLOCKED {
            self.state.wait(Self::CONTENDED);
        }
    }

    /// Acquires the lock only if it is free right now.
    ///
    /// Fails with [`TryLockError::WouldBlock`] when another thread holds the
    /// lock, and with [`TryLockError::Poisoned`] when the lock was acquired
    /// but the mutex is poisoned.
    pub fn try_lock(&self) -> TryLockResult<MutexGuard<'_, T>> {
        if self
            .state
            .compare_exchange(
                Self::UNLOCKED,
                Self::LOCKED,
                Ordering::Acquire,
                Ordering::Relaxed,
            )
            .is_ok()
        {
            Ok(self.poison.wrap(MutexGuard { mutex: self })?)
        } else {
            Err(TryLockError::WouldBlock)
        }
    }

    /// Whether some holder panicked while holding this lock.
    pub fn is_poisoned(&self) -> bool {
        self.poison.get()
    }

    /// Clears the poison flag, declaring the value consistent again.
    pub fn clear_poison(&self) {
        self.poison.clear();
    }

    /// Consumes the mutex and returns the value it protected.
    ///
    /// Poison is reported the same way `lock` reports it, with the value
    /// inside the error.
    pub fn into_inner(self) -> LockResult<T> {
        let poisoned = self.is_poisoned();
        let value = self.value.into_inner();
        if poisoned {
            Err(PoisonError::new(value))
        } else {
            Ok(value)
        }
    }

    /// Returns a mutable reference to the value without locking.
    ///
    /// `&mut self` already proves no other thread holds a guard.
    pub fn get_mut(&mut self) -> LockResult<&mut T> {
        let poisoned = self.is_poisoned();
        let value = self.value.get_mut();
        if poisoned {
            Err(PoisonError::new(value))
        } else {
            Ok(value)
        }
    }

    fn unlock(&self) {
        if self.state.swap(Self::UNLOCKED, Ordering::Release) == Self::CONTENDED {
            self.state.wake_one();
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Mutex");
        match self.try_lock() {
            Ok(guard) => d.field("value", &&*guard),
            Err(TryLockError::Poisoned(err)) => d.field("value", &&**err.get_ref()),
            Err(TryLockError::WouldBlock) => d.field("value", &format_args!("<locked>")),
        };
        d.field("poisoned", &self.is_poisoned()).finish()
    }
}

impl<T: Default> Default for Mutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> From<T> for Mutex<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

/// Exclusive access to the value inside a [`Mutex`], released on drop.
pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
}

// Sharing &MutexGuard across threads hands out &T, so it is fine
// exactly when &T is.
unsafe impl<T: Sync> Sync for MutexGuard<'_, T> {}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: this guard exists only while its thread holds the lock,
        // so nobody else can be accessing the value.
        unsafe { &*self.mutex.value.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: as in deref; holding the lock means exclusive access.
        unsafe { &mut *self.mutex.value.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        // If this thread is unwinding the value may be mid-update; flag it
        // before the next holder can acquire.
        self.mutex.poison.set_if_panicking();
        self.mutex.unlock();
    }
}

impl<T: fmt::Debug> fmt::Debug for MutexGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<T: fmt::Display> fmt::Display for MutexGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&**self, f)
    }
}
