use crate::handle::{Fresh, Held};
use crate::pool::Pool;
use crate::ref_count::Referenceable;
use crate::sync::RwLock;
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

/// A hot-swappable slot holding the current version of a pooled payload.
///
/// One writer (or several, serialised by the container) publishes new versions
/// with [`update`](Container::update); any number of readers borrow the current
/// version with [`acquire`](Container::acquire). A superseded version stays valid
/// for every reader still holding it and returns to the pool once the last of
/// them lets go, so replacing the payload neither blocks on readers nor allocates
/// when the pool has a spare instance.
///
/// **Safety Contract**:
/// - While a payload is current, the container itself counts as one of its holders.
/// - `acquire` increments the count *inside* the shared critical section that also
///   guards the swap in `update`. The container's own hold therefore cannot be
///   given up between reading the slot and counting the new holder, and a payload
///   can never be reset while a reader is still using it.
/// - The old payload is released after the exclusive lock is dropped, so a slow
///   reset policy never stalls readers.
///
/// **Typical Usage**:
/// ```
/// use std::collections::HashMap;
/// use std::sync::Arc;
/// use swap_pool::{Container, Counted, Pool};
///
/// type Config = Counted<HashMap<String, String>>;
///
/// let pool = Arc::new(Pool::new(
///     || Config::new(HashMap::new()),
///     |cfg| {
///         cfg.clear();
///         true
///     },
/// ));
/// let container = Container::empty(pool);
///
/// // Writer: fill a fresh instance, then publish it.
/// let mut next = container.get_new();
/// next.insert("mode".to_owned(), "fast".to_owned());
/// container.update(next);
///
/// // Reader: borrow the current version.
/// let current = container.acquire().expect("published above");
/// assert_eq!(current["mode"], "fast");
/// container.release(current);
///
/// // Or scoped, released on every exit path.
/// let mode = container.with_acquire(|cfg| cfg.map(|cfg| cfg["mode"].clone()));
/// assert_eq!(mode.as_deref(), Some("fast"));
/// ```
///
/// 一个可热替换的槽，保存池化负载的当前版本。
///
/// 写入者通过 [`update`](Container::update) 发布新版本；任意数量的读者通过
/// [`acquire`](Container::acquire) 借用当前版本。被替换的版本对仍持有它的读者保持有效，
/// 并在最后一个读者释放后回到池中，因此替换负载既不会阻塞在读者上，
/// 在池中有空闲实例时也不会分配。
///
/// **安全合约**：
/// - 当负载为当前值时，容器本身算作它的一个持有者。
/// - `acquire` 在共享临界区*内部*增加计数，该临界区同时保护 `update` 中的交换。
///   因此容器自己的持有不会在读取槽位和计数新持有者之间被放弃，
///   负载永远不会在读者仍在使用时被重置。
/// - 旧负载在独占锁释放之后才被释放，所以缓慢的重置策略不会阻塞读者。
pub struct Container<T: Referenceable> {
    pool: Arc<Pool<T>>,
    current: RwLock<Option<NonNull<T>>>,
}

impl<T: Referenceable> Container<T> {
    /// Create a container with nothing published yet.
    /// 创建一个尚未发布任何内容的容器。
    #[inline]
    pub fn empty(pool: Arc<Pool<T>>) -> Self {
        Self {
            pool,
            current: RwLock::new(None),
        }
    }

    /// Create a container with `init` as the current payload.
    ///
    /// The container takes over the single hold of `init`. `init` must come from
    /// `pool`.
    ///
    /// 创建一个以 `init` 为当前负载的容器。
    /// 容器接管 `init` 的唯一持有。`init` 必须来自 `pool`。
    pub fn new(pool: Arc<Pool<T>>, init: Fresh<'_, T>) -> Self {
        debug_assert!(
            std::ptr::eq(init.pool(), &*pool),
            "BUG: initial payload was taken from a different pool"
        );
        let ptr = init.into_raw();
        Self {
            pool,
            current: RwLock::new(Some(ptr)),
        }
    }

    /// Borrow the current payload, or `None` if nothing has been published.
    ///
    /// The returned [`Held`] counts as one holder until it is released or dropped.
    ///
    /// 借用当前负载；如果尚未发布任何内容则返回 `None`。
    /// 返回的 [`Held`] 在被释放或 drop 之前算作一个持有者。
    #[inline]
    pub fn acquire(&self) -> Option<Held<'_, T>> {
        let current = self.current.read();
        let ptr = (*current)?;
        // SAFETY: the slot holds the container's own hold, and `update` cannot
        // give it up until this read guard is dropped.
        unsafe { ptr.as_ref() }.ref_count().increment(1);
        drop(current);

        // SAFETY: the increment above is the hold we transfer.
        Some(unsafe { Held::from_raw(ptr, &self.pool) })
    }

    /// Publish `new` as the current payload and release the previous one.
    ///
    /// The container takes over the single hold of `new`. The previous payload goes
    /// back to the pool once every reader still holding it has released it.
    ///
    /// 将 `new` 发布为当前负载，并释放之前的负载。
    /// 容器接管 `new` 的唯一持有。之前的负载在所有仍持有它的读者释放后回到池中。
    pub fn update(&self, new: Fresh<'_, T>) {
        debug_assert!(
            std::ptr::eq(new.pool(), &*self.pool),
            "BUG: publishing a payload taken from a different pool"
        );
        let new_ptr = new.into_raw();

        let old = {
            let mut current = self.current.write();
            current.replace(new_ptr)
        };

        match old {
            // SAFETY: the slot owned one hold on `old`, which we now give up.
            Some(old) => unsafe { self.pool.release_raw(old) },
            None => tracing::debug!("container: published first payload"),
        }
    }

    /// Give back one hold. Same as [`Pool::release`] on the underlying pool.
    /// 归还一份持有。等同于在底层池上调用 [`Pool::release`]。
    #[inline]
    pub fn release<'a>(&self, obj: impl Into<Option<Held<'a, T>>>)
    where
        T: 'a,
    {
        self.pool.release(obj);
    }

    /// Take a fresh, writable instance. Same as [`Pool::get`] on the underlying pool.
    /// 取出一个新的可写实例。等同于在底层池上调用 [`Pool::get`]。
    #[inline]
    pub fn get_new(&self) -> Fresh<'_, T> {
        self.pool.get()
    }

    /// Run `f` with the current payload (or `None`) and release it afterwards.
    ///
    /// The hold is given back on every exit path, including a panic unwinding out of
    /// `f`. If that panic drops the last hold on a superseded payload, the reset
    /// policy runs during unwinding, and a reset that panics as well aborts the
    /// process.
    ///
    /// 以当前负载（或 `None`）运行 `f`，之后释放它。
    /// 在所有退出路径上都会归还持有，包括从 `f` 中展开的 panic。
    /// 如果该 panic 放弃了被替换负载的最后一份持有，重置策略会在展开期间运行；
    /// 此时重置若再次 panic 会导致进程中止。
    #[inline]
    pub fn with_acquire<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        let held = self.acquire();
        f(held.as_deref())
    }

    /// The pool this container draws from.
    #[inline]
    pub fn pool(&self) -> &Arc<Pool<T>> {
        &self.pool
    }

    /// Whether nothing is published. Racy; for diagnostics only.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.current.read().is_none()
    }
}

impl<T: Referenceable> Drop for Container<T> {
    /// Give up the container's hold on the current payload.
    ///
    /// Every `Held` handed out by `acquire` borrows the container, so none is left
    /// at this point and the payload goes straight back to the pool.
    fn drop(&mut self) {
        let current = self.current.write().take();
        if let Some(ptr) = current {
            // SAFETY: the slot owned one hold on `ptr`.
            unsafe { self.pool.release_raw(ptr) }
        }
    }
}

impl<T: Referenceable> fmt::Debug for Container<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let current = *self.current.read();
        f.debug_struct("Container")
            .field("current", &current)
            .field("pool", &self.pool)
            .finish()
    }
}

// SAFETY: the container shares its payloads with readers on other threads
// (`T: Sync`) and may run the reset on whichever thread supersedes one (`T: Send`).
unsafe impl<T: Referenceable + Send + Sync> Send for Container<T> {}
unsafe impl<T: Referenceable + Send + Sync> Sync for Container<T> {}
