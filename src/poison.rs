use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

/// Result of blocking lock acquisition: the guard, or the guard wrapped in a
/// [`PoisonError`].
pub type LockResult<G> = Result<G, PoisonError<G>>;

/// Result of non-blocking lock acquisition.
pub type TryLockResult<G> = Result<G, TryLockError<G>>;

/// Returned when a lock is acquired after some holder panicked.
///
/// The protected value may have been left inconsistent, so acquisition
/// reports the fact. The error still carries the guard (or the value, for
/// `into_inner`), and [`PoisonError::into_inner`] is the explicit opt-in to
/// use it anyway.
pub struct PoisonError<G> {
    guard: G,
}

impl<G> PoisonError<G> {
    pub fn new(guard: G) -> PoisonError<G> {
        PoisonError { guard }
    }

    /// Consumes the error, yielding the guard (or value) it carries.
    pub fn into_inner(self) -> G {
        self.guard
    }

    pub fn get_ref(&self) -> &G {
        &self.guard
    }

    pub fn get_mut(&mut self) -> &mut G {
        &mut self.guard
    }
}

// No bound on G: a lock result must be debuggable (and unwrappable in tests)
// whatever the guarded type is.
impl<G> fmt::Debug for PoisonError<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoisonError").finish_non_exhaustive()
    }
}

impl<G> fmt::Display for PoisonError<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "poisoned lock: another holder panicked")
    }
}

impl<G> std::error::Error for PoisonError<G> {}

/// Returned by the non-blocking acquisition methods, which distinguish
/// "held by someone else right now" from "a previous holder panicked".
pub enum TryLockError<G> {
    /// The lock is poisoned; the guard is still carried inside.
    Poisoned(PoisonError<G>),
    /// The lock is currently held elsewhere; retrying later may succeed.
    WouldBlock,
}

impl<G> From<PoisonError<G>> for TryLockError<G> {
    fn from(err: PoisonError<G>) -> Self {
        TryLockError::Poisoned(err)
    }
}

impl<G> fmt::Debug for TryLockError<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TryLockError::Poisoned(..) => f.write_str("Poisoned(..)"),
            TryLockError::WouldBlock => f.write_str("WouldBlock"),
        }
    }
}

impl<G> fmt::Display for TryLockError<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TryLockError::Poisoned(..) => write!(f, "poisoned lock: another holder panicked"),
            TryLockError::WouldBlock => {
                write!(f, "try_lock failed because the operation would block")
            }
        }
    }
}

impl<G> std::error::Error for TryLockError<G> {}

/// The poison flag a lock carries next to its state word.
///
/// Set when a guard drops mid-unwind; orthogonal to the locked/unlocked
/// state and persistent until explicitly cleared.
pub(crate) struct Flag {
    poisoned: AtomicBool,
}

impl Flag {
    pub(crate) const fn new() -> Flag {
        Flag {
            poisoned: AtomicBool::new(false),
        }
    }

    /// Relaxed is enough: the flag is read after winning the lock's acquire,
    /// which already orders it against the store in `set_if_panicking`.
    pub(crate) fn get(&self) -> bool {
        self.poisoned.load(Ordering::Relaxed)
    }

    pub(crate) fn clear(&self) {
        self.poisoned.store(false, Ordering::Relaxed);
    }

    /// Called from guard drops, before the unlock store.
    pub(crate) fn set_if_panicking(&self) {
        if thread::panicking() {
            self.poisoned.store(true, Ordering::Relaxed);
        }
    }

    /// Hands out `guard`, wrapped in a [`PoisonError`] if the flag is set.
    pub(crate) fn wrap<G>(&self, guard: G) -> LockResult<G> {
        if self.get() {
            Err(PoisonError::new(guard))
        } else {
            Ok(guard)
        }
    }
}
