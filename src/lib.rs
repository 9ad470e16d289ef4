//! # Hot-swappable pooled objects
//!
//! This crate lets one writer periodically replace a large shared object (a cache,
//! a config snapshot, a routing table) while many readers consult the current
//! version, without readers blocking on the replacement and without a fresh
//! allocation for every new version.
//!
//! ## Core Concepts
//!
//! - **Payload**: the heavy object, carrying its own atomic [`RefCount`]
//!   (through the [`Referenceable`] trait, or the [`Counted`] envelope).
//! - **Pool**: a recycling allocator. [`Pool::get`] hands out an instance with count 1;
//!   when the last hold on an instance is released, the pool's reset policy clears it
//!   and it goes back on the free list.
//! - **Container**: holds the current payload. [`Container::update`] publishes a new
//!   version, [`Container::acquire`] borrows the current one. A superseded version
//!   stays valid for the readers still holding it.
//!
//! ## Typical Usage
//!
//! ```rust
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use std::thread;
//! use swap_pool::{Container, Counted, Pool};
//!
//! type Routes = Counted<HashMap<u32, String>>;
//!
//! // 1. A pool that builds empty tables and clears used ones for reuse
//! let pool = Arc::new(Pool::new(
//!     || Routes::new(HashMap::new()),
//!     |routes| {
//!         routes.clear();
//!         true
//!     },
//! ));
//!
//! // 2. A container starting from an initial version
//! let mut init = pool.get();
//! init.insert(1, "eu-west".to_owned());
//! let routes = Arc::new(Container::new(pool.clone(), init));
//!
//! // 3. Readers borrow the current version
//! let reader = {
//!     let routes = routes.clone();
//!     thread::spawn(move || {
//!         let current = routes.acquire().expect("initial version published");
//!         assert!(current.contains_key(&1));
//!     })
//! };
//!
//! // 4. The writer fills a recycled instance and publishes it
//! let mut next = routes.get_new();
//! next.insert(1, "us-east".to_owned());
//! routes.update(next);
//!
//! reader.join().unwrap();
//! let region = routes.with_acquire(|table| table.map(|t| t[&1].clone()));
//! assert_eq!(region.as_deref(), Some("us-east"));
//! ```
//!
//! ## Ownership
//!
//! Handles carry the ownership rules: a [`Fresh`] instance is exclusively owned and
//! writable until it is published; a [`Held`] is one read-only hold that is given
//! back when it is released or dropped. Both borrow the pool, so no hold outlives it.
mod container;
mod handle;
mod pool;
mod ref_count;
mod sync;

pub use container::Container;
pub use handle::{Fresh, Held};
pub use pool::{Pool, PoolBuilder};
pub use ref_count::{Counted, CounterLayout, PaddedRefCount, RefCount, Referenceable};

#[cfg(test)]
mod tests;
