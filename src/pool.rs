use crate::handle::{Fresh, Held};
use crate::ref_count::Referenceable;
use crate::sync::{AtomicUsize, Mutex, Ordering};
use std::fmt;
use std::mem;
use std::ptr::NonNull;

/// Default cap on the number of idle instances kept by a pool (unbounded).
/// 池中保留的空闲实例数量的默认上限（无上限）。
pub(crate) const DEFAULT_MAX_IDLE: Option<usize> = None;

/// Default number of instances built up front.
/// 预先构建的实例的默认数量。
pub(crate) const DEFAULT_PREWARM: usize = 0;

type Factory<T> = Box<dyn Fn() -> T + Send + Sync>;
type Reset<T> = Box<dyn Fn(&mut T) -> bool + Send + Sync>;

/// Builder for configuring a [`Pool`].
///
/// - `reset`: the policy run on an instance once its last holder lets go
/// - `max_idle`: cap on the free list; reusable instances beyond it are dropped
/// - `prewarm`: number of instances built at construction
///
/// # Example
/// ```
/// use swap_pool::{Counted, Pool};
///
/// let pool = Pool::builder(|| Counted::new(Vec::<u8>::with_capacity(4096)))
///     .reset(|buf| {
///         buf.clear();
///         true
///     })
///     .max_idle(8)
///     .prewarm(2)
///     .build();
/// assert_eq!(pool.idle(), 2);
/// ```
///
/// 用于配置 [`Pool`] 的构建器。
pub struct PoolBuilder<T> {
    factory: Factory<T>,
    reset: Reset<T>,
    max_idle: Option<usize>,
    prewarm: usize,
}

impl<T: Referenceable> PoolBuilder<T> {
    /// Create a builder around `factory`, with default settings.
    /// 使用 `factory` 和默认设置创建构建器。
    #[inline]
    pub fn new(factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            reset: Box::new(|_: &mut T| true),
            max_idle: DEFAULT_MAX_IDLE,
            prewarm: DEFAULT_PREWARM,
        }
    }

    /// Set the reset policy.
    ///
    /// It runs once an instance's count reaches zero, with exclusive access. It
    /// should clear the domain state (clear maps, truncate buffers) and return
    /// `true` to put the instance back on the free list, or `false` to drop it.
    ///
    /// Default: keep every instance untouched.
    ///
    /// 设置重置策略。
    /// 当实例计数归零时以独占方式运行。它应清除领域状态并返回
    /// `true` 将实例放回空闲列表，或返回 `false` 将其丢弃。
    #[inline]
    pub fn reset(mut self, reset: impl Fn(&mut T) -> bool + Send + Sync + 'static) -> Self {
        self.reset = Box::new(reset);
        self
    }

    /// Cap the free list at `max_idle` instances.
    ///
    /// Reusable instances released while the free list is full are dropped.
    /// Pass `None` for an unbounded free list.
    ///
    /// Default: `None`
    ///
    /// 将空闲列表上限设为 `max_idle` 个实例。
    /// 空闲列表已满时释放的可复用实例会被丢弃。传递 `None` 表示无上限。
    #[inline]
    pub fn max_idle(mut self, max_idle: impl Into<Option<usize>>) -> Self {
        self.max_idle = max_idle.into();
        self
    }

    /// Build `count` instances at construction, capped by `max_idle`.
    ///
    /// Default: `0`
    ///
    /// 在构建时预先创建 `count` 个实例（受 `max_idle` 限制）。
    #[inline]
    pub fn prewarm(mut self, count: usize) -> Self {
        self.prewarm = count;
        self
    }

    /// Build the [`Pool`] with the configured settings.
    /// 使用配置的设置构建 [`Pool`]。
    pub fn build(self) -> Pool<T> {
        let prewarm = self
            .max_idle
            .map_or(self.prewarm, |max| self.prewarm.min(max));

        let pool = Pool {
            free: Mutex::new(Vec::with_capacity(prewarm)),
            factory: self.factory,
            reset: self.reset,
            max_idle: self.max_idle,
            created: AtomicUsize::new(0),
            discarded: AtomicUsize::new(0),
        };

        if prewarm > 0 {
            let warmed: Vec<Box<T>> = (0..prewarm).map(|_| pool.create()).collect();
            pool.free.lock().extend(warmed);
            tracing::debug!(prewarm, "pool: prewarmed free list");
        }

        pool
    }
}

/// A concurrent recycling allocator for reference-counted payloads.
///
/// [`get`](Pool::get) hands out an instance with count 1, popped from the free list
/// or built by the factory when the list is empty. When the last hold on an
/// instance is released, the pool runs the reset policy on it and either keeps it
/// for a later `get` or drops it.
///
/// `get` and `release` may be called from any number of threads. The free list is
/// a mutex-protected stack; the lock is never held while the factory or the reset
/// policy runs.
///
/// **Typical Usage**:
/// ```
/// use swap_pool::{Counted, Pool};
///
/// let pool = Pool::new(|| Counted::new(String::new()), |s| {
///     s.clear();
///     true
/// });
///
/// let mut s = pool.get();
/// s.push_str("draft");
/// pool.release(s);
///
/// // The same allocation comes back, cleared.
/// let again = pool.get();
/// assert!(again.is_empty());
/// assert_eq!(pool.created(), 1);
/// ```
///
/// 引用计数负载的并发回收分配器。
///
/// [`get`](Pool::get) 返回计数为 1 的实例，来自空闲列表，或在列表为空时由工厂构建。
/// 当实例上的最后一份持有被释放时，池对其执行重置策略，并将其保留给之后的 `get` 或丢弃。
/// `get` 和 `release` 可以从任意多个线程调用。空闲列表是一个受互斥锁保护的栈；
/// 在工厂或重置策略运行时从不持有该锁。
pub struct Pool<T> {
    free: Mutex<Vec<Box<T>>>,
    factory: Factory<T>,
    reset: Reset<T>,
    max_idle: Option<usize>,
    created: AtomicUsize,
    discarded: AtomicUsize,
}

impl<T: Referenceable> Pool<T> {
    /// Create a pool from a factory and a reset policy, with default settings.
    ///
    /// `factory` builds a new, empty payload. `reset` clears a used payload in place
    /// and returns whether it may be reused.
    ///
    /// 使用工厂和重置策略以及默认设置创建池。
    #[inline]
    pub fn new(
        factory: impl Fn() -> T + Send + Sync + 'static,
        reset: impl Fn(&mut T) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self::builder(factory).reset(reset).build()
    }

    /// Create a builder for configuring the pool.
    /// 创建一个用于配置池的构建器。
    #[inline]
    pub fn builder(factory: impl Fn() -> T + Send + Sync + 'static) -> PoolBuilder<T> {
        PoolBuilder::new(factory)
    }

    /// Take an instance with count 1, reused when possible.
    ///
    /// The returned [`Fresh`] is exclusively owned by the caller. A panicking factory
    /// propagates to the caller.
    ///
    /// 取出一个计数为 1 的实例，尽可能复用。
    /// 返回的 [`Fresh`] 由调用者独占。工厂中的 panic 会传播给调用者。
    pub fn get(&self) -> Fresh<'_, T> {
        let reused = self.free.lock().pop();
        let boxed = match reused {
            Some(boxed) => boxed,
            None => self.create(),
        };
        boxed.ref_count().set(1);
        Fresh::from_box(boxed, self)
    }

    /// Give back one hold on a payload.
    ///
    /// `None` is a no-op. Otherwise the count is decremented; if that was the last
    /// hold, the reset policy runs and the instance goes back on the free list or is
    /// dropped. A panicking reset propagates to the caller.
    ///
    /// Accepts a [`Held`], a [`Fresh`] or an `Option<Held>`. Every handle releases
    /// into the pool it came from; passing one from another pool is a caller bug
    /// reported in debug builds.
    ///
    /// 归还负载上的一份持有。
    /// `None` 不做任何事。否则计数减一；如果这是最后一份持有，
    /// 重置策略会运行，实例被放回空闲列表或被丢弃。重置中的 panic 会传播给调用者。
    #[inline]
    pub fn release<'a>(&self, obj: impl Into<Option<Held<'a, T>>>)
    where
        T: 'a,
    {
        if let Some(held) = obj.into() {
            debug_assert!(
                std::ptr::eq(held.pool(), self),
                "BUG: releasing a payload into a pool it was not taken from"
            );
            drop(held);
        }
    }

    /// Number of instances currently on the free list.
    /// 当前空闲列表中的实例数量。
    #[inline]
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }

    /// Number of instances the factory has built so far.
    /// 工厂迄今为止构建的实例数量。
    #[inline]
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// Number of instances dropped instead of reused, by reset verdict, a panicking
    /// reset, or the idle cap.
    /// 因重置结果、重置 panic 或空闲上限而被丢弃（而非复用）的实例数量。
    #[inline]
    pub fn discarded(&self) -> usize {
        self.discarded.load(Ordering::Relaxed)
    }

    fn create(&self) -> Box<T> {
        let boxed = Box::new((self.factory)());
        let created = self.created.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::trace!(created, "pool: built new payload");
        boxed
    }

    /// Drop one counted hold on `ptr`, recycling the payload if it was the last.
    ///
    /// # Safety
    ///
    /// `ptr` must come from this pool and the caller must own one counted hold on it,
    /// which it gives up.
    #[inline]
    pub(crate) unsafe fn release_raw(&self, ptr: NonNull<T>) {
        // SAFETY: our hold keeps the payload alive until this decrement.
        let remaining = unsafe { ptr.as_ref() }.ref_count().increment(-1);
        debug_assert!(
            remaining >= 0,
            "BUG: reference count went negative ({remaining}); a payload was released too often"
        );
        if remaining == 0 {
            // SAFETY: the count reached zero, so no other holder remains. The AcqRel
            // decrement orders every earlier holder's reads before the reset.
            unsafe { self.recycle(ptr) }
        }
    }

    /// Run the reset policy on an unheld payload and keep or drop it.
    ///
    /// # Safety
    ///
    /// `ptr` must come from this pool and no holder may remain.
    pub(crate) unsafe fn recycle(&self, ptr: NonNull<T>) {
        // SAFETY: allocated by `Box::new` in `create`, and now exclusively ours.
        let mut boxed = unsafe { Box::from_raw(ptr.as_ptr()) };
        boxed.ref_count().set(0);

        // A panicking reset drops the instance while unwinding; count it as discarded.
        let unwinding = DiscardOnUnwind(&self.discarded);
        let reusable = (self.reset)(&mut *boxed);
        mem::forget(unwinding);

        if !reusable {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            tracing::trace!("pool: reset rejected payload, discarding");
            return;
        }

        let mut free = self.free.lock();
        if self.max_idle.is_some_and(|max| free.len() >= max) {
            drop(free);
            self.discarded.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(max_idle = ?self.max_idle, "pool: free list full, discarding");
            return;
        }
        free.push(boxed);
    }
}

/// Counts one discard if dropped, i.e. if the reset policy unwinds past it.
struct DiscardOnUnwind<'a>(&'a AtomicUsize);

impl Drop for DiscardOnUnwind<'_> {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("pool: reset panicked, discarding");
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("idle", &self.free.lock().len())
            .field("max_idle", &self.max_idle)
            .field("created", &self.created.load(Ordering::Relaxed))
            .field("discarded", &self.discarded.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
