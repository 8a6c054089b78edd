use std::fmt;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ops::Deref;
use std::process;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering, fence};

/// Thread-safe reference-counting pointer: the atomic sibling of
/// [`Rc`](crate::Rc).
///
/// Handles can be cloned and dropped from any thread. The counters are
/// atomics, the value is dropped exactly once when the last strong handle
/// goes away, and the allocation survives beyond that while [`Weak`] handles
/// remain. `Arc<T>` is `Send` and `Sync` whenever `T` is both.
pub struct Arc<T> {
    ptr: NonNull<ArcInner<T>>,
    _marker: PhantomData<ArcInner<T>>,
}

unsafe impl<T: Send + Sync> Send for Arc<T> {}
unsafe impl<T: Send + Sync> Sync for Arc<T> {}

struct ArcInner<T> {
    strong: AtomicUsize,
    weak: AtomicUsize,
    data: ManuallyDrop<T>,
}

impl<T> Arc<T> {
    pub fn new(data: T) -> Arc<T> {
        let inner = Box::new(ArcInner {
            strong: AtomicUsize::new(1),
            // All strong handles together hold one weak reference; the block
            // is freed when the weak count alone reaches zero.
            weak: AtomicUsize::new(1),
            data: ManuallyDrop::new(data),
        });
        Self {
            ptr: unsafe { NonNull::new_unchecked(Box::into_raw(inner)) },
            _marker: PhantomData,
        }
    }

    /// Number of strong handles at the instant of the load.
    ///
    /// Another thread can change the count before the caller acts on the
    /// answer; treat it as a snapshot, not a fact.
    pub fn strong_count(&self) -> usize {
        self.inner().strong.load(Ordering::Acquire)
    }

    /// Number of outstanding weak handles, same snapshot caveat as
    /// [`Arc::strong_count`].
    pub fn weak_count(&self) -> usize {
        self.inner().weak.load(Ordering::Acquire) - 1
    }

    /// Creates a [`Weak`] handle that observes the value without keeping it
    /// alive.
    pub fn downgrade(&self) -> Weak<T> {
        if self.inner().weak.fetch_add(1, Ordering::Relaxed) > usize::MAX / 2 {
            process::abort();
        }
        Weak { ptr: self.ptr }
    }

    /// Returns the value if `this` is the last strong handle, consuming the
    /// handle either way.
    ///
    /// When two threads race this on the final two handles, exactly one gets
    /// `Some` and the other `None`; the value is never dropped behind the
    /// winner's back.
    pub fn into_inner(this: Self) -> Option<T> {
        let ptr = this.ptr.as_ptr();
        // The counter updates happen right here, so the normal Drop must not
        // run as well.
        std::mem::forget(this);
        unsafe {
            if (*ptr).strong.fetch_sub(1, Ordering::Release) != 1 {
                return None;
            }
            fence(Ordering::Acquire);
            let data = ManuallyDrop::take(&mut (*ptr).data);
            if (*ptr).weak.fetch_sub(1, Ordering::Release) == 1 {
                fence(Ordering::Acquire);
                drop(Box::from_raw(ptr));
            }
            Some(data)
        }
    }

    fn inner(&self) -> &ArcInner<T> {
        // SAFETY: a strong handle keeps the block allocated.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> Clone for Arc<T> {
    fn clone(&self) -> Self {
        // Relaxed is enough: this handle already pins the value, so the
        // increment needs no ordering with the data itself. An overflowed
        // count would free the value while handles remain, hence the abort.
        if self.inner().strong.fetch_add(1, Ordering::Relaxed) > usize::MAX / 2 {
            process::abort();
        }
        Self {
            ptr: self.ptr,
            _marker: PhantomData,
        }
    }
}

impl<T> Deref for Arc<T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &*self.inner().data
    }
}

impl<T: fmt::Debug> fmt::Debug for Arc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<T> Drop for Arc<T> {
    fn drop(&mut self) {
        let ptr = self.ptr.as_ptr();
        unsafe {
            if (*ptr).strong.fetch_sub(1, Ordering::Release) == 1 {
                // The Acquire fence pairs with the Release decrements, so
                // every other thread's last use of the data happens-before
                // the drop below.
                fence(Ordering::Acquire);
                ManuallyDrop::drop(&mut (*ptr).data);
                // Release the weak reference the strong handles held
                // collectively.
                if (*ptr).weak.fetch_sub(1, Ordering::Release) == 1 {
                    fence(Ordering::Acquire);
                    drop(Box::from_raw(ptr));
                }
            }
        }
    }
}

/// A non-owning handle to an [`Arc`] allocation.
///
/// A `Weak` keeps the allocation alive but not the value. Access goes
/// through [`Weak::upgrade`], which succeeds only while some strong handle
/// still exists.
pub struct Weak<T> {
    ptr: NonNull<ArcInner<T>>,
}

unsafe impl<T: Send + Sync> Send for Weak<T> {}
unsafe impl<T: Send + Sync> Sync for Weak<T> {}

impl<T> Weak<T> {
    /// Returns a new strong handle, or `None` if the value is gone.
    ///
    /// The check and the increment are a single atomic step (a CAS loop), so
    /// an upgrade can never resurrect a value that a concurrent drop has
    /// claimed: once the strong count hits zero, no CAS from zero exists.
    pub fn upgrade(&self) -> Option<Arc<T>> {
        // SAFETY: a weak handle keeps the block allocated.
        let inner = unsafe { self.ptr.as_ref() };
        let mut strong = inner.strong.load(Ordering::Relaxed);
        loop {
            if strong == 0 {
                return None;
            }
            if strong > usize::MAX / 2 {
                process::abort();
            }
            match inner.strong.compare_exchange_weak(
                strong,
                strong + 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    return Some(Arc {
                        ptr: self.ptr,
                        _marker: PhantomData,
                    });
                }
                Err(actual) => strong = actual,
            }
        }
    }
}

impl<T> Clone for Weak<T> {
    fn clone(&self) -> Self {
        // SAFETY: a weak handle keeps the block allocated.
        let inner = unsafe { self.ptr.as_ref() };
        if inner.weak.fetch_add(1, Ordering::Relaxed) > usize::MAX / 2 {
            process::abort();
        }
        Weak { ptr: self.ptr }
    }
}

impl<T> Drop for Weak<T> {
    fn drop(&mut self) {
        let ptr = self.ptr.as_ptr();
        unsafe {
            if (*ptr).weak.fetch_sub(1, Ordering::Release) == 1 {
                fence(Ordering::Acquire);
                drop(Box::from_raw(ptr));
            }
        }
    }
}
