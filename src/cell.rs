use std::cell::UnsafeCell;

/// A mutable memory location for values that move in and out whole.
///
/// `Cell<T>` implements interior mutability by moving values in and out of
/// the cell: an `&mut T` to the inner value can never be obtained, and the
/// value cannot be read without copying or replacing it. Because no
/// references into the contents are ever handed out, updating through a
/// shared `&Cell<T>` is always sound on a single thread.
///
/// `UnsafeCell` makes the type `!Sync`, so handles cannot cross threads:
///
/// ```compile_fail
/// use std::sync::Arc;
/// use shared::Cell;
///
/// let cell = Arc::new(Cell::new(0));
/// let c = Arc::clone(&cell);
/// std::thread::spawn(move || c.set(1));
/// ```
pub struct Cell<T> {
    value: UnsafeCell<T>,
}

impl<T> Cell<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: UnsafeCell::new(value),
        }
    }

    /// Stores `value`, dropping the previous contents.
    pub fn set(&self, value: T) {
        let old = self.replace(value);
        // The old value is dropped only after the swap window has closed, so
        // a Drop impl that reaches back into this cell sees the new value.
        drop(old);
    }

    /// Stores `value` and returns the previous contents.
    pub fn replace(&self, value: T) -> T {
        // SAFETY: we never hand out references to the contents, and !Sync
        // keeps all access on this thread, so nobody can observe the swap
        // half-done.
        unsafe { std::mem::replace(&mut *self.value.get(), value) }
    }
}

impl<T: Copy> Cell<T> {
    /// Returns a copy of the contained value.
    pub fn get(&self) -> T {
        // SAFETY: only this thread can be mutating the value (!Sync), and no
        // mutation is in progress while we copy it out.
        unsafe { *self.value.get() }
    }
}

impl<T: Copy + std::fmt::Debug> std::fmt::Debug for Cell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cell").field("value", &self.get()).finish()
    }
}

impl<T: Default> Default for Cell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> From<T> for Cell<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}
