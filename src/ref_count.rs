use crate::sync::{AtomicIsize, Ordering};
use std::fmt;
use std::ops::{Deref, DerefMut};

/// An atomic count of the outstanding holders of a pooled payload.
///
/// Embed one in every payload type managed by a [`Pool`](crate::Pool) and expose it
/// through [`Referenceable`]. Only the pool, the container and the handles move the
/// count; outside the crate it can only be observed with [`peek`](RefCount::peek).
///
/// Cloning a `RefCount` yields a fresh zero counter, so payload types can derive
/// `Clone` without copying a live count into the copy.
///
/// 一个原子计数器，记录池化负载当前的持有者数量。
///
/// 将其嵌入到由 [`Pool`](crate::Pool) 管理的每个负载类型中，并通过 [`Referenceable`] 暴露。
/// 只有池、容器和句柄会修改计数；在 crate 外部只能通过 [`peek`](RefCount::peek) 观察。
pub struct RefCount {
    count: AtomicIsize,
}

impl RefCount {
    /// Create a counter with no holders.
    /// 创建一个没有持有者的计数器。
    #[inline]
    pub fn new() -> Self {
        Self {
            count: AtomicIsize::new(0),
        }
    }

    /// Atomically add `delta` (which may be negative) and return the new value.
    /// 原子地加上 `delta`（可以为负），并返回新值。
    #[inline]
    pub(crate) fn increment(&self, delta: isize) -> isize {
        self.count.fetch_add(delta, Ordering::AcqRel) + delta
    }

    /// Atomically assign an absolute value.
    ///
    /// Only used while a single party owns the payload (fresh from the pool, or
    /// being installed into a container), never under contention.
    ///
    /// 原子地赋一个绝对值。
    /// 仅在单一方独占负载时使用，从不在竞争下使用。
    #[inline]
    pub(crate) fn set(&self, value: isize) {
        self.count.store(value, Ordering::Release);
    }

    /// Read the current count. For tests and debugging only.
    ///
    /// The value may already be stale when it is returned; never branch on it in
    /// production code.
    ///
    /// 读取当前计数。仅用于测试和调试。
    /// 返回时该值可能已经过期；不要在生产代码中基于它做判断。
    #[inline]
    pub fn peek(&self) -> isize {
        self.count.load(Ordering::Acquire)
    }
}

impl Default for RefCount {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for RefCount {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl fmt::Debug for RefCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RefCount").field(&self.peek()).finish()
    }
}

/// A [`RefCount`] alone on its own 64-byte cache line.
///
/// Use it instead of `RefCount` when a payload is acquired and released from many
/// cores at once and its neighbouring fields are hot, to prevent false sharing.
///
/// 独占一个 64 字节缓存行的 [`RefCount`]。
/// 当负载被许多核心同时获取和释放时使用，以防止伪共享。
#[derive(Debug, Default, Clone)]
#[repr(align(64))]
pub struct PaddedRefCount {
    inner: RefCount,
}

impl PaddedRefCount {
    /// Create a padded counter with no holders.
    /// 创建一个没有持有者的填充计数器。
    #[inline]
    pub fn new() -> Self {
        Self {
            inner: RefCount::new(),
        }
    }
}

impl Deref for PaddedRefCount {
    type Target = RefCount;

    #[inline]
    fn deref(&self) -> &RefCount {
        &self.inner
    }
}

/// Payload types that carry their own [`RefCount`].
///
/// # Safety
///
/// `ref_count` must return the same counter on every call, and that counter must
/// belong to this instance alone: it must not be shared with any other value. The
/// pool relies on it to decide when nobody can still be reading the instance; a
/// counter that lies about that lets the reset function run while readers hold
/// the value.
///
/// The easy way to satisfy this is to store a `RefCount` (or `PaddedRefCount`) as a
/// plain field and return a reference to it, or to wrap the payload in [`Counted`].
///
/// 携带自身 [`RefCount`] 的负载类型。
///
/// # 安全性
///
/// `ref_count` 每次调用必须返回同一个计数器，并且该计数器只属于此实例：
/// 不得与其他值共享。池依赖它来判断何时不再有人读取该实例；
/// 一个不真实的计数器会让重置函数在读者持有该值时运行。
pub unsafe trait Referenceable {
    /// The counter embedded in this payload.
    /// 嵌入在此负载中的计数器。
    fn ref_count(&self) -> &RefCount;

    /// Shorthand for `self.ref_count().peek()`. For tests and debugging only.
    /// `self.ref_count().peek()` 的简写。仅用于测试和调试。
    #[inline]
    fn peek_ref(&self) -> isize {
        self.ref_count().peek()
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::RefCount {}
    impl Sealed for super::PaddedRefCount {}
}

/// Counter layouts usable inside [`Counted`]: [`RefCount`] or [`PaddedRefCount`].
pub trait CounterLayout: sealed::Sealed + Default {
    #[doc(hidden)]
    fn counter(&self) -> &RefCount;
}

impl CounterLayout for RefCount {
    #[inline]
    fn counter(&self) -> &RefCount {
        self
    }
}

impl CounterLayout for PaddedRefCount {
    #[inline]
    fn counter(&self) -> &RefCount {
        &self.inner
    }
}

/// Envelope that makes any value poolable by pairing it with a counter.
///
/// `Counted<T>` dereferences to `T`, so a `Counted<HashMap<K, V>>` can be used
/// exactly like the map. The counter is padded to a cache line by default; use
/// `Counted::<T, RefCount>::with_layout` for the compact layout.
///
/// ```
/// use std::collections::HashMap;
/// use swap_pool::{Counted, Pool};
///
/// let pool = Pool::new(
///     || Counted::new(HashMap::<String, u64>::new()),
///     |map| {
///         map.clear();
///         true
///     },
/// );
/// let mut fresh = pool.get();
/// fresh.insert("hits".to_owned(), 1);
/// assert_eq!(fresh["hits"], 1);
/// ```
///
/// 通过为任意值配对一个计数器，使其可被池化的包装。
/// `Counted<T>` 解引用为 `T`。计数器默认填充到一个缓存行；
/// 使用 `Counted::<T, RefCount>::with_layout` 获得紧凑布局。
#[derive(Default, Clone)]
pub struct Counted<T, R: CounterLayout = PaddedRefCount> {
    count: R,
    value: T,
}

impl<T> Counted<T> {
    /// Wrap `value` with a zero, cache-padded counter.
    #[inline]
    pub fn new(value: T) -> Self {
        Self::with_layout(value)
    }
}

impl<T, R: CounterLayout> Counted<T, R> {
    /// Wrap `value` with a zero counter of layout `R`.
    #[inline]
    pub fn with_layout(value: T) -> Self {
        Self {
            count: R::default(),
            value,
        }
    }

    /// Unwrap the payload, discarding the counter.
    #[inline]
    pub fn into_inner(self) -> T {
        self.value
    }
}

// SAFETY: the counter is a private field of this instance and is only ever
// reached through `counter()`, which returns that field.
unsafe impl<T, R: CounterLayout> Referenceable for Counted<T, R> {
    #[inline]
    fn ref_count(&self) -> &RefCount {
        self.count.counter()
    }
}

impl<T, R: CounterLayout> Deref for Counted<T, R> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T, R: CounterLayout> DerefMut for Counted<T, R> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T: fmt::Debug, R: CounterLayout> fmt::Debug for Counted<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Counted")
            .field("count", &self.count.counter().peek())
            .field("value", &self.value)
            .finish()
    }
}
