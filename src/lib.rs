//! Shared-state building blocks: cells, reference counting, and locks.
//!
//! Everything here exists to let more than one place in a program reach the
//! same value without tripping over the aliasing rules. The single-threaded
//! types move the borrow rules to runtime; the thread-safe types move them
//! behind atomics and the OS.
//!
//! # Cell
//!
//! Copy-by-value interior mutability: mutate through `&Cell<T>` by replacing
//! or copying the whole value. No reference into the inside is ever given
//! out, which is exactly why it needs no bookkeeping.
//!
//! # RefCell
//!
//! Interior mutability with the borrow rules enforced at runtime: any number
//! of shared borrows, or one exclusive borrow, never both. Violations panic
//! on [`RefCell::borrow`]/[`RefCell::borrow_mut`] and come back as `Err`
//! from the `try_` variants.
//!
//! # Rc and Arc
//!
//! Multiple ownership via reference counting: the value lives until the last
//! strong handle is gone, and [`rc::Weak`]/[`arc::Weak`] observe it without
//! keeping it alive. [`Rc`] counts with plain cells and stays on one thread;
//! [`Arc`] counts with atomics and crosses threads. Neither allows mutation
//! on its own; combine with a cell or a lock for that.
//!
//! # Mutex and RwLock
//!
//! Blocking locks that park the thread on contention. [`Mutex`] serializes
//! all access; [`RwLock`] lets readers share and writers exclude, preferring
//! writers so readers cannot starve them. Both poison themselves when a
//! holder panics mid-update, and every acquisition reports that through
//! [`LockResult`]/[`TryLockResult`].
//!
//! # AsyncMutex
//!
//! The task-world mutex: acquisition yields to the runtime instead of
//! blocking the thread, and waiters are served in FIFO order.
//!
//! ```
//! use shared::{Rc, RefCell};
//!
//! let log = Rc::new(RefCell::new(Vec::new()));
//! let writer = log.clone();
//! writer.borrow_mut().push("hello");
//! assert_eq!(log.borrow().len(), 1);
//! ```
//!
//! ```
//! use shared::Mutex;
//! use std::thread;
//!
//! let counter = Mutex::new(0);
//! thread::scope(|s| {
//!     for _ in 0..4 {
//!         s.spawn(|| *counter.lock().unwrap() += 1);
//!     }
//! });
//! assert_eq!(counter.into_inner().unwrap(), 4);
//! ```
//!
//! # Deadlocks
//!
//! Locks compose, but nothing here orders them: two threads taking the same
//! pair of locks in opposite order will wait on each other forever. When a
//! critical section needs more than one lock, acquire them in one fixed
//! order everywhere, and keep guards alive no longer than the work needs.

pub mod arc;
pub mod async_mutex;
pub mod cell;
pub mod mutex;
pub mod poison;
pub mod rc;
pub mod refcell;
pub mod rwlock;

mod wait;

pub use arc::Arc;
pub use async_mutex::{AsyncMutex, AsyncMutexGuard};
pub use cell::Cell;
pub use mutex::{Mutex, MutexGuard};
pub use poison::{LockResult, PoisonError, TryLockError, TryLockResult};
pub use rc::Rc;
pub use refcell::{BorrowError, BorrowMutError, Ref, RefCell, RefMut};
pub use rwlock::{RwLock, RwLockReadGuard, RwLockWriteGuard};
