use crate::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ops::Deref;
use std::ptr::NonNull;

/// Single-threaded reference-counting pointer. 'Rc' stands for 'Reference
/// Counted'.
///
/// `Rc<T>` provides shared ownership of a heap-allocated value: cloning a
/// handle bumps the strong count instead of copying the value, and the value
/// is dropped when the last strong handle goes away. The allocation itself
/// outlives the value while [`Weak`] handles remain, so an upgrade can still
/// safely discover that the value is gone.
///
/// Two `Rc`s that own each other keep both strong counts above zero forever;
/// break such cycles by making one direction a [`Weak`] handle.
///
/// The counters are plain [`Cell`]s, so the type is confined to one thread:
///
/// ```compile_fail
/// use shared::Rc;
///
/// let rc = Rc::new(0);
/// std::thread::spawn(move || drop(rc));
/// ```
pub struct Rc<T> {
    ptr: NonNull<RcInner<T>>,
    _marker: PhantomData<RcInner<T>>,
}

struct RcInner<T> {
    strong: Cell<usize>,
    weak: Cell<usize>,
    value: ManuallyDrop<T>,
}

impl<T> Rc<T> {
    pub fn new(value: T) -> Self {
        // All strong handles together hold one weak reference; the block is
        // freed when the weak count alone reaches zero.
        let inner = Box::new(RcInner {
            strong: Cell::new(1),
            weak: Cell::new(1),
            value: ManuallyDrop::new(value),
        });

        Self {
            ptr: unsafe { NonNull::new_unchecked(Box::into_raw(inner)) },
            _marker: PhantomData,
        }
    }

    /// Number of strong handles keeping the value alive.
    pub fn strong_count(&self) -> usize {
        self.inner().strong.get()
    }

    /// Number of outstanding weak handles.
    pub fn weak_count(&self) -> usize {
        self.inner().weak.get() - 1
    }

    /// Creates a [`Weak`] handle that observes the value without keeping it
    /// alive.
    pub fn downgrade(&self) -> Weak<T> {
        let weak = self.inner().weak.get();
        if weak > usize::MAX / 2 {
            std::process::abort();
        }
        self.inner().weak.set(weak + 1);
        Weak { ptr: self.ptr }
    }

    /// Returns the value if `this` is the last strong handle, consuming the
    /// handle either way.
    pub fn into_inner(this: Self) -> Option<T> {
        let ptr = this.ptr.as_ptr();
        // The counter updates happen right here, so the normal Drop must not
        // run as well.
        std::mem::forget(this);
        unsafe {
            let strong = (*ptr).strong.get() - 1;
            (*ptr).strong.set(strong);
            if strong != 0 {
                return None;
            }
            let value = ManuallyDrop::take(&mut (*ptr).value);
            let weak = (*ptr).weak.get() - 1;
            (*ptr).weak.set(weak);
            if weak == 0 {
                drop(Box::from_raw(ptr));
            }
            Some(value)
        }
    }

    fn inner(&self) -> &RcInner<T> {
        // SAFETY: a strong handle keeps the block allocated.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> Clone for Rc<T> {
    fn clone(&self) -> Self {
        let strong = self.inner().strong.get();
        if strong > usize::MAX / 2 {
            std::process::abort();
        }
        self.inner().strong.set(strong + 1);
        Rc {
            ptr: self.ptr,
            _marker: PhantomData,
        }
    }
}

impl<T> Deref for Rc<T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &*self.inner().value
    }
}

impl<T: fmt::Debug> fmt::Debug for Rc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<T> Drop for Rc<T> {
    fn drop(&mut self) {
        let ptr = self.ptr.as_ptr();
        unsafe {
            let strong = (*ptr).strong.get() - 1;
            (*ptr).strong.set(strong);
            if strong == 0 {
                // Last owner: the value goes now. The block stays while weak
                // handles remain so upgrades can observe the empty state.
                ManuallyDrop::drop(&mut (*ptr).value);
                let weak = (*ptr).weak.get() - 1;
                (*ptr).weak.set(weak);
                if weak == 0 {
                    drop(Box::from_raw(ptr));
                }
            }
        }
    }
}

/// A non-owning handle to an [`Rc`] allocation.
///
/// A `Weak` keeps the allocation alive but not the value. Access goes
/// through [`Weak::upgrade`], which returns a new strong handle only while
/// at least one other strong handle still exists.
pub struct Weak<T> {
    ptr: NonNull<RcInner<T>>,
}

impl<T> Weak<T> {
    /// Returns a new strong handle, or `None` if the value has already been
    /// dropped.
    pub fn upgrade(&self) -> Option<Rc<T>> {
        // SAFETY: a weak handle keeps the block allocated.
        let inner = unsafe { self.ptr.as_ref() };
        let strong = inner.strong.get();
        if strong == 0 {
            return None;
        }
        if strong > usize::MAX / 2 {
            std::process::abort();
        }
        inner.strong.set(strong + 1);
        Some(Rc {
            ptr: self.ptr,
            _marker: PhantomData,
        })
    }
}

impl<T> Clone for Weak<T> {
    fn clone(&self) -> Self {
        // SAFETY: a weak handle keeps the block allocated.
        let inner = unsafe { self.ptr.as_ref() };
        let weak = inner.weak.get();
        if weak > usize::MAX / 2 {
            std::process::abort();
        }
        inner.weak.set(weak + 1);
        Weak { ptr: self.ptr }
    }
}

impl<T> Drop for Weak<T> {
    fn drop(&mut self) {
        let ptr = self.ptr.as_ptr();
        unsafe {
            let weak = (*ptr).weak.get() - 1;
            (*ptr).weak.set(weak);
            if weak == 0 {
                // The strong handles collectively held one weak reference,
                // so none of them remain either; free the block.
                drop(Box::from_raw(ptr));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_shares_the_value() {
        let a = Rc::new("hello".to_string());
        let b = Rc::clone(&a);
        assert_eq!(*a, "hello");
        assert_eq!(*b, "hello");
        drop(b);
        assert_eq!(*a, "hello");
        drop(a);
    }

    #[test]
    fn strong_count_tracks_clones_and_drops() {
        let rc = Rc::new(10);
        assert_eq!(rc.strong_count(), 1);
        let rc2 = rc.clone();
        assert_eq!(rc.strong_count(), 2);
        drop(rc);
        assert_eq!(rc2.strong_count(), 1);
    }

    #[test]
    fn weak_count_tracks_downgrades() {
        let rc = Rc::new(0);
        assert_eq!(rc.weak_count(), 0);
        let w1 = rc.downgrade();
        let w2 = w1.clone();
        assert_eq!(rc.weak_count(), 2);
        drop(w1);
        assert_eq!(rc.weak_count(), 1);
        drop(w2);
        assert_eq!(rc.weak_count(), 0);
    }

    #[test]
    fn upgrade_succeeds_only_while_alive() {
        let rc = Rc::new(7);
        let weak = rc.downgrade();

        let again = weak.upgrade().unwrap();
        assert_eq!(*again, 7);
        assert_eq!(rc.strong_count(), 2);

        drop(again);
        drop(rc);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn value_drops_when_last_strong_goes() {
        struct DropTally<'a>(&'a Cell<usize>);
        impl Drop for DropTally<'_> {
            fn drop(&mut self) {
                self.0.set(self.0.get() + 1);
            }
        }

        let drops = Cell::new(0);
        let rc = Rc::new(DropTally(&drops));
        let weak = rc.downgrade();
        let rc2 = rc.clone();

        drop(rc);
        assert_eq!(drops.get(), 0);
        drop(rc2);
        assert_eq!(drops.get(), 1);

        assert!(weak.upgrade().is_none());
        drop(weak);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn into_inner_yields_value_only_for_last_handle() {
        let a = Rc::new(String::from("payload"));
        let b = a.clone();
        assert_eq!(Rc::into_inner(a), None);
        assert_eq!(Rc::into_inner(b), Some(String::from("payload")));
    }

    #[test]
    fn weak_parent_pointer_does_not_keep_value_alive() {
        use crate::refcell::RefCell;

        struct Node {
            parent: RefCell<Option<Weak<Node>>>,
            value: u32,
        }

        let root = Rc::new(Node {
            parent: RefCell::new(None),
            value: 1,
        });
        let child = Rc::new(Node {
            parent: RefCell::new(Some(root.downgrade())),
            value: 2,
        });

        {
            let parent = child.parent.borrow();
            let upgraded = parent.as_ref().unwrap().upgrade().unwrap();
            assert_eq!(upgraded.value, 1);
            assert_eq!(root.strong_count(), 2);
        }

        drop(root);
        assert!(child.parent.borrow().as_ref().unwrap().upgrade().is_none());
        assert_eq!(child.value, 2);
    }
}
