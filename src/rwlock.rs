use crate::poison::{Flag, LockResult, PoisonError, TryLockError, TryLockResult};
use crate::wait::WaitState;
use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::Ordering;

/// A reader-writer lock: any number of readers or at most one writer at any
/// point in time.
///
/// [`read`](RwLock::read) grants shared access through a [`RwLockReadGuard`]
/// and can be held by many threads at once; [`write`](RwLock::write) grants
/// exclusive access through a [`RwLockWriteGuard`]. Dropping a guard releases
/// its share of the lock.
///
/// # Fairness
///
/// Writer-preferring: once a writer is waiting, new readers queue up behind
/// it instead of piling onto the current reader crowd, so a steady stream of
/// readers cannot starve a writer. No order is guaranteed among writers.
///
/// # Poisoning
///
/// Only a writer can poison the lock, by panicking while its guard is live;
/// readers cannot have modified the value, so a panicking reader leaves the
/// lock clean. After poisoning, `read` and `write` return `Err` carrying a
/// live guard, the same protocol as [`Mutex`](crate::Mutex).
pub struct RwLock<T> {
    /// Readers times two, plus one if a writer is waiting; `u32::MAX` means
    /// write-locked. Readers may acquire while the state is even and must
    /// hold off while it is odd.
    state: WaitState,
    /// Bumped on every release a writer might care about. Writers sleep on
    /// this word rather than on `state`, so a reader leaving does not wake
    /// the whole crowd.
    writer_wake_counter: WaitState,
    poison: Flag,
    value: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for RwLock<T> {}
unsafe impl<T: Send + Sync> Sync for RwLock<T> {}

impl<T> RwLock<T> {
    pub const fn new(value: T) -> RwLock<T> {
        RwLock {
            state: WaitState::new(0),
            writer_wake_counter: WaitState::new(0),
            poison: Flag::new(),
            value: UnsafeCell::new(value),
        }
    }

    /// Acquires shared access, sleeping while a writer holds or awaits the
    /// lock.
    pub fn read(&self) -> LockResult<RwLockReadGuard<'_, T>> {
        let mut s = self.state.load(Ordering::Relaxed);
        loop {
            if s % 2 == 0 {
                assert!(s <= u32::MAX - 4, "too many concurrent readers");
                match self.state.compare_exchange_weak(
                    s,
                    s + 2,
                    Ordering::Acquire,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => return self.poison.wrap(RwLockReadGuard { lock: self }),
                    Err(e) => s = e,
                }
            } else {
                // Odd state: a writer holds the lock or is waiting for it.
                self.state.wait(s);
                s = self.state.load(Ordering::Relaxed);
            }
        }
    }

    /// Acquires exclusive access, sleeping until every reader and writer
    /// ahead of us is gone.
    pub fn write(&self) -> LockResult<RwLockWriteGuard<'_, T>> {
        let mut s = self.state.load(Ordering::Relaxed);
        loop {
            // Free, apart from possibly the waiting bit: take it.
            if s <= 1 {
                match self
                    .state
                    .compare_exchange(s, u32::MAX, Ordering::Acquire, Ordering::Relaxed)
                {
                    Ok(_) => return self.poison.wrap(RwLockWriteGuard { lock: self }),
                    Err(e) => {
                        s = e;
                        continue;
                    }
                }
            }
            // Make the state odd so new readers hold off.
            if s % 2 == 0 {
                if let Err(e) =
                    self.state
                        .compare_exchange(s, s + 1, Ordering::Relaxed, Ordering::Relaxed)
                {
                    s = e;
                    continue;
                }
            }
            // Sleep until a release bumps the counter. The counter is read
            // before the state so a release happening between the two loads
            // still changes the word we are about to sleep on.
            let w = self.writer_wake_counter.load(Ordering::Acquire);
            s = self.state.load(Ordering::Relaxed);
            if s >= 2 {
                self.writer_wake_counter.wait(w);
                s = self.state.load(Ordering::Relaxed);
            }
        }
    }

    /// Acquires shared access only if no writer holds or awaits the lock.
    pub fn try_read(&self) -> TryLockResult<RwLockReadGuard<'_, T>> {
        let mut s = self.state.load(Ordering::Relaxed);
        while s % 2 == 0 {
            assert!(s <= u32::MAX - 4, "too many concurrent readers");
            match self
                .state
                .compare_exchange_weak(s, s + 2, Ordering::Acquire, Ordering::Relaxed)
            {
                Ok(_) => return Ok(self.poison.wrap(RwLockReadGuard { lock: self })?),
                Err(e) => s = e,
            }
        }
        Err(TryLockError::WouldBlock)
    }

    /// Acquires exclusive access only if the lock is free right now.
    pub fn try_write(&self) -> TryLockResult<RwLockWriteGuard<'_, T>> {
        let mut s = self.state.load(Ordering::Relaxed);
        while s <= 1 {
            match self
                .state
                .compare_exchange_weak(s, u32::MAX, Ordering::Acquire, Ordering::Relaxed)
            {
                Ok(_) => return Ok(self.poison.wrap(RwLockWriteGuard { lock: self })?),
                Err(e) => s = e,
            }
        }
        Err(TryLockError::WouldBlock)
    }

    /// Whether some writer panicked while holding this lock.
    pub fn is_poisoned(&self) -> bool {
        self.poison.get()
    }

    /// Clears the poison flag, declaring the value consistent again.
    pub fn clear_poison(&self) {
        self.poison.clear();
    }

    /// Consumes the lock and returns the value it protected, reporting
    /// poison the same way `write` does.
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
    pub fn get_mut(&mut self) -> LockResult<&mut T> {
        let poisoned = self.is_poisoned();
        let value = self.value.get_mut();
        if poisoned {
            Err(PoisonError::new(value))
        } else {
            Ok(value)
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for RwLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("RwLock");
        match self.try_read() {
            Ok(guard) => d.field("value", &&*guard),
            Err(TryLockError::Poisoned(err)) => d.field("value", &&**err.get_ref()),
            Err(TryLockError::WouldBlock) => d.field("value", &format_args!("<write-locked>")),
        };
        d.field("poisoned", &self.is_poisoned()).finish()
    }
}

impl<T: Default> Default for RwLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> From<T> for RwLock<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

/// Shared access to the value inside an [`RwLock`], released on drop.
pub struct RwLockReadGuard<'a, T> {
    lock: &'a RwLock<T>,
}

unsafe impl<T: Sync> Sync for RwLockReadGuard<'_, T> {}

impl<T> Deref for RwLockReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // SAFETY: readers hold the lock in shared mode, so no writer can be
        // mutating the value.
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> Drop for RwLockReadGuard<'_, T> {
    fn drop(&mut self) {
        // Readers never poison: shared access cannot have left the value
        // half-updated.
        if self.lock.state.fetch_sub(2, Ordering::Release) == 3 {
            // 3 -> 1: we were the last reader out and a writer is waiting.
            self.lock.writer_wake_counter.fetch_add(1, Ordering::Release);
            self.lock.writer_wake_counter.wake_one();
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for RwLockReadGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

/// Exclusive access to the value inside an [`RwLock`], released on drop.
pub struct RwLockWriteGuard<'a, T> {
    lock: &'a RwLock<T>,
}

unsafe impl<T: Sync> Sync for RwLockWriteGuard<'_, T> {}

impl<T> Deref for RwLockWriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // SAFETY: the writer holds the lock exclusively.
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> DerefMut for RwLockWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: as in deref; exclusive access.
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T> Drop for RwLockWriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.poison.set_if_panicking();
        self.lock.state.store(0, Ordering::Release);
        self.lock.writer_wake_counter.fetch_add(1, Ordering::Release);
        // One waiting writer gets first crack through its own word; readers
        // pile back in through the state word.
        self.lock.writer_wake_counter.wake_one();
        self.lock.state.wake_all();
    }
}

impl<T: fmt::Debug> fmt::Debug for RwLockWriteGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::RwLock;
    use crate::arc::Arc;
    use crate::poison::TryLockError;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_read_then_write() {
        let lock = RwLock::new(5);

        // many reader locks can be held at once
        {
            let r1 = lock.read().unwrap();
            let r2 = lock.read().unwrap();
            assert_eq!(*r1, 5);
            assert_eq!(*r2, 5);
        } // read locks are dropped at this point

        // only one write lock may be held, however
        {
            let mut w = lock.write().unwrap();
            *w += 1;
            assert_eq!(*w, 6);
        }
    }

    #[test]
    fn test_parallel_readers() {
        let lock = Arc::new(RwLock::new(123));

        let mut threads = vec![];

        for _ in 0..10 {
            let lk = lock.clone();
            threads.push(thread::spawn(move || {
                for _ in 0..100_000 {
                    let r = lk.read().unwrap();
                    assert_eq!(*r, 123);
                }
            }));
        }

        for t in threads {
            t.join().unwrap();
        }
    }

    #[test]
    fn test_writer_exclusivity() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let lock = Arc::new(RwLock::new(0));
        let active_writers = Arc::new(AtomicUsize::new(0));
        let max_writers = Arc::new(AtomicUsize::new(0));

        let mut threads = vec![];

        for _ in 0..8 {
            let lk = lock.clone();
            let aw = active_writers.clone();
            let mw = max_writers.clone();
            threads.push(thread::spawn(move || {
                for _ in 0..1000 {
                    let _w = lk.write().unwrap();

                    // Track concurrent writers.
                    let count = aw.fetch_add(1, Ordering::SeqCst) + 1;
                    mw.fetch_max(count, Ordering::SeqCst);

                    // simulate "work"
                    std::thread::yield_now();

                    aw.fetch_sub(1, Ordering::SeqCst);
                }
            }));
        }

        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(
            max_writers.load(Ordering::SeqCst),
            1,
            "More than one writer entered critical section!"
        );
    }

    #[test]
    fn test_writer_excludes_readers() {
        let lock = Arc::new(RwLock::new(0));
        let mut w = lock.write().unwrap();

        let lk = lock.clone();
        let reader = thread::spawn(move || *lk.read().unwrap());

        // The reader has to wait for the guard, so it can only ever observe
        // the final value.
        thread::sleep(Duration::from_millis(50));
        *w = 99;
        drop(w);
        assert_eq!(reader.join().unwrap(), 99);
    }

    #[test]
    fn test_waiting_writer_holds_back_new_readers() {
        let lock = Arc::new(RwLock::new(0));
        let r = lock.read().unwrap();

        let lk = lock.clone();
        let writer = thread::spawn(move || {
            *lk.write().unwrap() += 1;
        });

        // Give the writer time to queue up and flip the waiting bit.
        thread::sleep(Duration::from_millis(100));
        assert!(matches!(lock.try_read(), Err(TryLockError::WouldBlock)));

        drop(r);
        writer.join().unwrap();
        assert_eq!(*lock.read().unwrap(), 1);
    }

    #[test]
    fn test_try_write_blocked_by_reader() {
        let lock = RwLock::new(1);
        let r = lock.read().unwrap();
        assert!(matches!(lock.try_write(), Err(TryLockError::WouldBlock)));
        drop(r);
        *lock.try_write().unwrap() += 1;
        assert_eq!(*lock.read().unwrap(), 2);
    }

    #[test]
    fn test_panicking_writer_poisons() {
        let lock = Arc::new(RwLock::new(vec![1]));
        let lk = lock.clone();
        let result = thread::spawn(move || {
            let mut w = lk.write().unwrap();
            w.push(2);
            panic!("writer dies mid-update");
        })
        .join();
        assert!(result.is_err());
        assert!(lock.is_poisoned());

        let err = lock.read().unwrap_err();
        assert_eq!(**err.get_ref(), vec![1, 2]);
    }

    #[test]
    fn test_panicking_reader_leaves_lock_clean() {
        let lock = Arc::new(RwLock::new(7));
        let lk = lock.clone();
        let result = thread::spawn(move || {
            let _r = lk.read().unwrap();
            panic!("reader dies");
        })
        .join();
        assert!(result.is_err());
        assert!(!lock.is_poisoned());
        assert_eq!(*lock.read().unwrap(), 7);
        assert_eq!(*lock.write().unwrap(), 7);
    }

    #[test]
    fn test_into_inner_and_get_mut() {
        let mut lock = RwLock::new(String::from("a"));
        lock.get_mut().unwrap().push('b');
        assert_eq!(lock.into_inner().unwrap(), "ab");
    }
}
