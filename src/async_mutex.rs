use std::cell::UnsafeCell;
use std::fmt;
use tokio::sync::{AcquireError, Semaphore, SemaphorePermit, TryAcquireError};

/// An async mutual exclusion lock for tasks instead of threads.
///
/// [`lock`](AsyncMutex::lock) yields to the runtime instead of blocking the
/// thread, so it is safe to call from async code where a blocking
/// [`Mutex`](crate::Mutex) would stall the executor. Built on a one-permit
/// [`Semaphore`], which also makes acquisition FIFO fair: tasks get the lock
/// in the order they asked for it.
///
/// Unlike the blocking locks in this crate, an async mutex does not poison.
/// A task that panics mid-update never resumes, but cancellation makes
/// "holder vanished" ordinary rather than exceptional, so the value is
/// always handed to the next task as-is.
pub struct AsyncMutex<T> {
    value: UnsafeCell<T>,
    locked: Semaphore,
}

// Same reasoning as the blocking Mutex: access to the value is serialized,
// so T only needs Send.
unsafe impl<T: Send> Send for AsyncMutex<T> {}
unsafe impl<T: Send> Sync for AsyncMutex<T> {}

impl<T> AsyncMutex<T> {
    pub fn new(value: T) -> AsyncMutex<T> {
        Self {
            value: UnsafeCell::new(value),
            locked: Semaphore::new(1),
        }
    }

    /// Acquires the lock, yielding to the runtime until it is available.
    pub async fn lock(&self) -> Result<AsyncMutexGuard<'_, T>, AcquireError> {
        let permit = self.locked.acquire().await?;
        Ok(AsyncMutexGuard {
            mutex: self,
            _permit: permit,
        })
    }

    /// Acquires the lock only if it is free right now.
    pub fn try_lock(&self) -> Result<AsyncMutexGuard<'_, T>, TryAcquireError> {
        let permit = self.locked.try_acquire()?;
        Ok(AsyncMutexGuard {
            mutex: self,
            _permit: permit,
        })
    }

    /// Consumes the mutex and returns the value it protected.
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }

    /// Returns a mutable reference to the value without locking.
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }
}

impl<T: fmt::Debug> fmt::Debug for AsyncMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("AsyncMutex");
        match self.try_lock() {
            Ok(guard) => d.field("value", &&*guard),
            Err(_) => d.field("value", &format_args!("<locked>")),
        };
        d.finish()
    }
}

impl<T: Default> Default for AsyncMutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> From<T> for AsyncMutex<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

/// Exclusive access to the value inside an [`AsyncMutex`]; dropping it
/// returns the permit and wakes the next task in line.
pub struct AsyncMutexGuard<'a, T> {
    mutex: &'a AsyncMutex<T>,
    _permit: SemaphorePermit<'a>,
}

unsafe impl<T: Sync> Sync for AsyncMutexGuard<'_, T> {}

impl<T> std::ops::Deref for AsyncMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // SAFETY: this guard owns the semaphore's only permit, so no other
        // task can be accessing the value.
        unsafe { &*self.mutex.value.get() }
    }
}

impl<T> std::ops::DerefMut for AsyncMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: as in deref; the single permit means exclusive access.
        unsafe { &mut *self.mutex.value.get() }
    }
}

impl<T: fmt::Debug> fmt::Debug for AsyncMutexGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}
