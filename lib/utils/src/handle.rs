//! Lightweight handle types for shared ownership and weak back references.
//!
//! Provide two complementary handle types:
//! - [Handle<T>] owns a strong reference to an object using [alloc::sync::Arc]. Use it where
//!   the owner keeps the object alive (for example a parent owning its child nodes).
//! - [HandleRef<T>] stores a weak reference ([alloc::sync::Weak]) and is suitable for parent
//!   pointers or other non-owning references that must not keep the target alive.
//!
//! Key guarantees and semantics:
//! - Call [Handle::create_ref] to derive a [HandleRef] from an existing strong [Handle].
//! - Call [HandleRef::get_handle] to attempt an upgrade; it returns [None] if the strong owner(s)
//!   have dropped the object. **Consumers must handle the [None] case explicitly.**
use alloc::sync::{Arc, Weak};
use core::{fmt::Debug, ops::Deref};

/// Strong owning handle backed by [Arc<T>].
///
/// Cloning the handle increments the reference count.
/// Use [Handle<T>::create_ref] to produce a weak [HandleRef<T>] suitable for parent pointers.
pub struct Handle<T: ?Sized> {
    inner: Arc<T>,
}

impl<T: ?Sized> Deref for Handle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> From<T> for Handle<T> {
    fn from(value: T) -> Self {
        Self {
            inner: Arc::new(value),
        }
    }
}

impl<T: ?Sized> From<Arc<T>> for Handle<T> {
    fn from(inner: Arc<T>) -> Self {
        Self { inner }
    }
}

impl<T: ?Sized> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: ?Sized + Debug> Debug for Handle<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.inner.fmt(f)
    }
}

impl<T> Handle<T> {
    /// Build a value that keeps a weak reference to its own allocation.
    ///
    /// The [HandleRef<T>] passed to `f` cannot be upgraded until this function returns.
    pub fn new_cyclic(f: impl FnOnce(HandleRef<T>) -> T) -> Handle<T> {
        Handle {
            inner: Arc::new_cyclic(|weak| {
                f(HandleRef {
                    inner: weak.clone(),
                })
            }),
        }
    }
}

impl<T: ?Sized> Handle<T> {
    /// Create a non-owning [HandleRef<T>] that refers to the same underlying object.
    ///
    /// The returned [HandleRef<T>] does not increment the strong reference count and
    /// must be upgraded with [HandleRef::get_handle] before use.
    pub fn create_ref(&self) -> HandleRef<T> {
        HandleRef {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Return whether both handles point to the same allocation.
    pub fn ptr_eq(&self, other: &Handle<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Weak (non-owning) handle backed by [Weak<T>].
///
/// A [HandleRef<T>] represents an optional reference to an object which may be destroyed
/// independently of the referrers. Use [HandleRef<T>::get_handle] to attempt to obtain a strong [Handle<T>].
pub struct HandleRef<T: ?Sized> {
    inner: Weak<T>,
}

impl<T: ?Sized> Clone for HandleRef<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: ?Sized> Debug for HandleRef<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("HandleRef(..)")
    }
}

impl<T: ?Sized> HandleRef<T> {
    /// Attempt to upgrade the weak reference into a strong [Handle<T>].
    ///
    /// Return `Some(Handle<T>)` if the target is still alive, otherwise return `None`.
    pub fn get_handle(&self) -> Option<Handle<T>> {
        Weak::upgrade(&self.inner).map(|inner| Handle { inner })
    }

    /// Return whether this reference points to the allocation owned by `handle`.
    pub fn refers_to(&self, handle: &Handle<T>) -> bool {
        Weak::ptr_eq(&self.inner, &Arc::downgrade(&handle.inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weak_ref_dies_with_owner() {
        let owner = Handle::from(5u32);
        let weak = owner.create_ref();
        assert_eq!(*weak.get_handle().unwrap(), 5);
        drop(owner);
        assert!(weak.get_handle().is_none());
    }

    #[test]
    fn cyclic_handle_points_to_itself() {
        struct Cell {
            me: HandleRef<Cell>,
        }
        let cell = Handle::new_cyclic(|me| Cell { me });
        let again = cell.me.get_handle().unwrap();
        assert!(again.ptr_eq(&cell));
        assert!(cell.me.refers_to(&cell));
    }
}
