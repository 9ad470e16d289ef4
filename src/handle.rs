use crate::pool::Pool;
use crate::ref_count::Referenceable;
use std::fmt;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

/// An exclusively owned payload, fresh from the pool and not yet published.
///
/// `Fresh` is the only handle that dereferences mutably: while nobody else can see
/// the instance, its owner may fill it in. Publishing it with
/// [`Container::update`](crate::Container::update) hands this single hold to the
/// container; dropping it (or passing it to [`Pool::release`]) resets it and
/// returns it to the pool.
///
/// Its lifetime `'p` is bound to the pool it came from, so it cannot outlive it.
///
/// 一个从池中新取出、尚未发布的独占负载。
///
/// `Fresh` 是唯一可以可变解引用的句柄：在没有其他人能看到该实例时，持有者可以填充它。
/// 通过 [`Container::update`](crate::Container::update) 发布会将这份持有权交给容器；
/// drop 它（或传给 [`Pool::release`]）会重置它并归还给池。
#[must_use = "dropping a Fresh payload immediately returns it to the pool"]
pub struct Fresh<'p, T: Referenceable> {
    ptr: NonNull<T>,
    pool: &'p Pool<T>,
    _owned: PhantomData<Box<T>>,
}

impl<'p, T: Referenceable> Fresh<'p, T> {
    /// Wrap a boxed payload whose count is already 1.
    #[inline]
    pub(crate) fn from_box(boxed: Box<T>, pool: &'p Pool<T>) -> Self {
        Self {
            // SAFETY: `Box::into_raw` never returns null.
            ptr: unsafe { NonNull::new_unchecked(Box::into_raw(boxed)) },
            pool,
            _owned: PhantomData,
        }
    }

    /// Give up this handle without releasing, returning the raw pointer.
    ///
    /// The count is forced back to 1: the caller becomes the single holder whatever
    /// the owner did to the payload through `DerefMut`.
    #[inline]
    pub(crate) fn into_raw(self) -> NonNull<T> {
        let this = ManuallyDrop::new(self);
        // SAFETY: we still own the allocation exclusively.
        unsafe { this.ptr.as_ref() }.ref_count().set(1);
        this.ptr
    }

    #[inline]
    pub(crate) fn pool(&self) -> &'p Pool<T> {
        self.pool
    }

    /// Turn the exclusive handle into a shared hold on the same instance.
    ///
    /// 将独占句柄转换为同一实例上的共享持有。
    #[inline]
    pub fn share(self) -> Held<'p, T> {
        let pool = self.pool;
        // SAFETY: `into_raw` leaves exactly one hold, which the new `Held` takes over.
        unsafe { Held::from_raw(self.into_raw(), pool) }
    }

    /// Address of the payload, for identity comparisons.
    #[inline]
    pub fn as_ptr(this: &Self) -> *const T {
        this.ptr.as_ptr()
    }
}

impl<T: Referenceable> Deref for Fresh<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // SAFETY: the allocation is live and exclusively ours.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T: Referenceable> DerefMut for Fresh<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the allocation is live and no other holder exists.
        unsafe { self.ptr.as_mut() }
    }
}

impl<T: Referenceable> Drop for Fresh<'_, T> {
    #[inline]
    fn drop(&mut self) {
        // SAFETY: we are the only holder, so the instance goes straight back.
        unsafe { self.pool.recycle(self.ptr) }
    }
}

impl<T: Referenceable + fmt::Debug> fmt::Debug for Fresh<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Fresh").field(&**self).finish()
    }
}

// SAFETY: a `Fresh` behaves like a `Box<T>` that recycles into a `Pool<T>`, which is
// `Sync` whenever `T: Send`.
unsafe impl<T: Referenceable + Send> Send for Fresh<'_, T> {}
unsafe impl<T: Referenceable + Sync> Sync for Fresh<'_, T> {}

/// One counted hold on a payload that may be shared with other holders.
///
/// Obtained from [`Container::acquire`](crate::Container::acquire) or
/// [`Fresh::share`]. It dereferences immutably only. Dropping it, or passing it to
/// [`Pool::release`] / [`Container::release`](crate::Container::release), gives the
/// hold back; whoever drops the last hold of a superseded payload runs the pool's
/// reset function.
///
/// Cloning adds another hold on the same instance.
///
/// 对一个可能与其他持有者共享的负载的一份计数持有。
///
/// 通过 [`Container::acquire`](crate::Container::acquire) 或 [`Fresh::share`] 获得。
/// 只能不可变解引用。drop 它会归还持有；最后一个持有者会执行池的重置函数。
/// 克隆会在同一实例上增加一份持有。
#[must_use = "dropping a Held payload immediately releases it"]
pub struct Held<'p, T: Referenceable> {
    ptr: NonNull<T>,
    pool: &'p Pool<T>,
    _shared: PhantomData<T>,
}

impl<'p, T: Referenceable> Held<'p, T> {
    /// Adopt one hold already counted in the payload's reference count.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a live payload allocated by `pool`, and the caller must
    /// transfer one hold it has counted.
    #[inline]
    pub(crate) unsafe fn from_raw(ptr: NonNull<T>, pool: &'p Pool<T>) -> Self {
        Self {
            ptr,
            pool,
            _shared: PhantomData,
        }
    }

    #[inline]
    pub(crate) fn pool(&self) -> &'p Pool<T> {
        self.pool
    }

    /// Address of the payload, for identity comparisons.
    #[inline]
    pub fn as_ptr(this: &Self) -> *const T {
        this.ptr.as_ptr()
    }

    /// Whether two holds refer to the same payload instance.
    #[inline]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.ptr == other.ptr
    }
}

impl<T: Referenceable> Deref for Held<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // SAFETY: our hold keeps the count above zero, so the payload is neither
        // reset nor handed to a new owner while this reference lives.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T: Referenceable> Clone for Held<'_, T> {
    #[inline]
    fn clone(&self) -> Self {
        // Our own hold keeps the count from reaching zero concurrently.
        (**self).ref_count().increment(1);
        Self {
            ptr: self.ptr,
            pool: self.pool,
            _shared: PhantomData,
        }
    }
}

impl<T: Referenceable> Drop for Held<'_, T> {
    #[inline]
    fn drop(&mut self) {
        // SAFETY: this handle owns exactly one counted hold.
        unsafe { self.pool.release_raw(self.ptr) }
    }
}

impl<T: Referenceable + fmt::Debug> fmt::Debug for Held<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Held").field(&**self).finish()
    }
}

impl<'p, T: Referenceable> From<Fresh<'p, T>> for Held<'p, T> {
    #[inline]
    fn from(fresh: Fresh<'p, T>) -> Self {
        fresh.share()
    }
}

impl<'p, T: Referenceable> From<Fresh<'p, T>> for Option<Held<'p, T>> {
    #[inline]
    fn from(fresh: Fresh<'p, T>) -> Self {
        Some(fresh.share())
    }
}

// SAFETY: holders on several threads read the payload concurrently (`T: Sync`), and
// whichever thread drops the last hold runs the reset on it (`T: Send`).
unsafe impl<T: Referenceable + Send + Sync> Send for Held<'_, T> {}
unsafe impl<T: Referenceable + Send + Sync> Sync for Held<'_, T> {}
