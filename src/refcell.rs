use crate::cell::Cell;
use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};

/// How the contents of a `RefCell` are borrowed right now.
#[derive(Debug, Copy, Clone)]
enum RefState {
    Unshared,
    Shared(usize),
    Exclusive,
}

/// Returned by [`RefCell::try_borrow`] when an exclusive borrow is
/// outstanding.
#[derive(Debug)]
pub struct BorrowError;

impl fmt::Display for BorrowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "already mutably borrowed")
    }
}

impl std::error::Error for BorrowError {}

/// Returned by [`RefCell::try_borrow_mut`] when any borrow is outstanding.
#[derive(Debug)]
pub struct BorrowMutError;

impl fmt::Display for BorrowMutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "already borrowed")
    }
}

impl std::error::Error for BorrowMutError {}

/// A mutable memory location with dynamically checked borrow rules.
///
/// Borrows are tracked at runtime rather than by the compiler: any number of
/// shared borrows may coexist, an exclusive borrow tolerates no company, and
/// each claim is released when its guard drops. A violation through the
/// infallible methods is treated as a logic error and panics the calling
/// thread; the `try_` methods report the same condition as a value so the
/// caller can retry, skip, or escalate.
///
/// Like [`Cell`](crate::Cell), the type is `!Sync` and never leaves the
/// thread that uses it:
///
/// ```compile_fail
/// use std::sync::Arc;
/// use shared::RefCell;
///
/// let cell = Arc::new(RefCell::new(0));
/// let c = Arc::clone(&cell);
/// std::thread::spawn(move || *c.borrow_mut() = 1);
/// ```
pub struct RefCell<T> {
    value: UnsafeCell<T>,
    state: Cell<RefState>,
}

impl<T> RefCell<T> {
    pub fn new(value: T) -> RefCell<T> {
        Self {
            value: UnsafeCell::new(value),
            state: Cell::new(RefState::Unshared),
        }
    }

    /// Immutably borrows the wrapped value until the returned `Ref` drops.
    ///
    /// # Panics
    ///
    /// Panics if the value is currently mutably borrowed.
    pub fn borrow(&self) -> Ref<'_, T> {
        match self.try_borrow() {
            Ok(guard) => guard,
            Err(err) => panic!("{err}"),
        }
    }

    /// Mutably borrows the wrapped value until the returned `RefMut` drops.
    ///
    /// # Panics
    ///
    /// Panics if any borrow, shared or exclusive, is outstanding.
    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        match self.try_borrow_mut() {
            Ok(guard) => guard,
            Err(err) => panic!("{err}"),
        }
    }

    /// Like [`RefCell::borrow`], but reports a conflict instead of panicking.
    pub fn try_borrow(&self) -> Result<Ref<'_, T>, BorrowError> {
        match self.state.get() {
            RefState::Exclusive => Err(BorrowError),
            RefState::Shared(count) => {
                // No exclusive borrow exists, and the incremented count keeps
                // it that way until every Ref has dropped. A count that would
                // wrap (reachable only by leaking guards) is refused like any
                // other conflict.
                let count = count.checked_add(1).ok_or(BorrowError)?;
                self.state.set(RefState::Shared(count));
                Ok(Ref { cell: self })
            }
            RefState::Unshared => {
                self.state.set(RefState::Shared(1));
                Ok(Ref { cell: self })
            }
        }
    }

    /// Like [`RefCell::borrow_mut`], but reports a conflict instead of
    /// panicking.
    pub fn try_borrow_mut(&self) -> Result<RefMut<'_, T>, BorrowMutError> {
        match self.state.get() {
            RefState::Exclusive | RefState::Shared(_) => Err(BorrowMutError),
            RefState::Unshared => {
                // No borrow exists, and Exclusive blocks new ones until the
                // RefMut drops.
                self.state.set(RefState::Exclusive);
                Ok(RefMut { cell: self })
            }
        }
    }

    /// Consumes the cell and returns the wrapped value.
    pub fn into_inner(self) -> T {
        // No borrow can be outstanding: guards hold a reference to the cell,
        // and ownership of `self` proves there is none.
        self.value.into_inner()
    }

    /// Returns a mutable reference to the wrapped value without any runtime
    /// check; `&mut self` already guarantees exclusivity.
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }
}

impl<T: fmt::Debug> fmt::Debug for RefCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("RefCell");
        match self.try_borrow() {
            Ok(guard) => d.field("value", &&*guard),
            Err(_) => d.field("value", &format_args!("<mutably borrowed>")),
        };
        d.finish()
    }
}

impl<T: Default> Default for RefCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> From<T> for RefCell<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

/// A shared borrow of a `RefCell`'s value.
pub struct Ref<'refcell, T> {
    cell: &'refcell RefCell<T>,
}

impl<T> Drop for Ref<'_, T> {
    fn drop(&mut self) {
        match self.cell.state.get() {
            // A live Ref means the state is Shared.
            RefState::Exclusive | RefState::Unshared => unreachable!(),
            RefState::Shared(1) => self.cell.state.set(RefState::Unshared),
            RefState::Shared(count) => self.cell.state.set(RefState::Shared(count - 1)),
        }
    }
}

impl<T> Deref for Ref<'_, T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        // SAFETY: a Ref exists only while the state is Shared, so no
        // exclusive access can appear and alias this reference.
        unsafe { &*self.cell.value.get() }
    }
}

impl<T: fmt::Debug> fmt::Debug for Ref<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

/// An exclusive borrow of a `RefCell`'s value.
pub struct RefMut<'refcell, T> {
    cell: &'refcell RefCell<T>,
}

impl<T> Drop for RefMut<'_, T> {
    fn drop(&mut self) {
        match self.cell.state.get() {
            // A live RefMut means the state is Exclusive.
            RefState::Shared(_) | RefState::Unshared => unreachable!(),
            RefState::Exclusive => self.cell.state.set(RefState::Unshared),
        }
    }
}

impl<T> Deref for RefMut<'_, T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        // SAFETY: a RefMut exists only while the state is Exclusive, so this
        // is the one live reference into the cell.
        unsafe { &*self.cell.value.get() }
    }
}

impl<T> DerefMut for RefMut<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: as above; Exclusive state guarantees uniqueness.
        unsafe { &mut *self.cell.value.get() }
    }
}

impl<T: fmt::Debug> fmt::Debug for RefMut<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}
