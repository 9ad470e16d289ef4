//! Loom-based concurrency tests
//!
//! These tests use the `loom` library to exhaustively check all possible
//! thread interleavings of acquire, release and update, and detect payloads
//! being reset while a reader still holds them.
//!
//! Run with: `RUSTFLAGS="--cfg loom" cargo test --test loom_tests --release`

#![cfg(loom)]

use loom::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use loom::sync::Arc;
use loom::thread;
use swap_pool::{Container, Pool, RefCount, Referenceable};

struct Payload {
    ref_count: RefCount,
    version: usize,
    recycled: AtomicBool,
}

unsafe impl Referenceable for Payload {
    fn ref_count(&self) -> &RefCount {
        &self.ref_count
    }
}

/// Pool whose reset marks the payload as recycled and counts resets.
fn marking_pool(resets: Arc<AtomicUsize>) -> std::sync::Arc<Pool<Payload>> {
    std::sync::Arc::new(Pool::new(
        || Payload {
            ref_count: RefCount::new(),
            version: 0,
            recycled: AtomicBool::new(false),
        },
        move |payload| {
            resets.fetch_add(1, Ordering::SeqCst);
            payload.recycled.store(true, Ordering::SeqCst);
            true
        },
    ))
}

fn publish(container: &Container<Payload>, version: usize) {
    let mut next = container.get_new();
    next.version = version;
    next.recycled.store(false, Ordering::SeqCst);
    container.update(next);
}

/// Test: A reader racing an update never sees its payload recycled
#[test]
fn loom_acquire_races_update() {
    loom::model(|| {
        let resets = Arc::new(AtomicUsize::new(0));
        let pool = marking_pool(resets.clone());
        let container = Arc::new(Container::empty(pool));
        publish(&container, 1);

        let reader_container = container.clone();
        let reader = thread::spawn(move || {
            let held = reader_container.acquire().unwrap();
            assert!(held.version == 1 || held.version == 2);
            assert!(!held.recycled.load(Ordering::SeqCst));
            thread::yield_now();
            assert!(!held.recycled.load(Ordering::SeqCst));
            reader_container.release(held);
        });

        publish(&container, 2);

        reader.join().unwrap();

        // Version 1 is recycled exactly once, whoever let go of it last.
        assert_eq!(resets.load(Ordering::SeqCst), 1);
    });
}

/// Test: Two readers releasing a superseded payload concurrently reset it once
#[test]
fn loom_last_release_resets_once() {
    loom::model(|| {
        let resets = Arc::new(AtomicUsize::new(0));
        let pool = marking_pool(resets.clone());
        let container = Arc::new(Container::empty(pool.clone()));
        publish(&container, 1);

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let container = container.clone();
                thread::spawn(move || {
                    container.with_acquire(|payload| {
                        let payload = payload.unwrap();
                        assert!(!payload.recycled.load(Ordering::SeqCst));
                        payload.version
                    })
                })
            })
            .collect();

        publish(&container, 2);

        for handle in handles {
            let seen = handle.join().unwrap();
            assert!(seen == 1 || seen == 2);
        }

        assert_eq!(resets.load(Ordering::SeqCst), 1);
        assert_eq!(pool.idle(), 1);
    });
}

/// Test: Concurrent get/release on a shared pool keeps every instance accounted for
#[test]
fn loom_pool_get_release() {
    loom::model(|| {
        let resets = Arc::new(AtomicUsize::new(0));
        let pool = marking_pool(resets.clone());

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let pool = pool.clone();
                thread::spawn(move || {
                    let mut payload = pool.get();
                    assert_eq!(payload.peek_ref(), 1);
                    payload.version = i;
                    pool.release(payload);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(resets.load(Ordering::SeqCst), 2);
        assert_eq!(pool.idle(), pool.created());
        assert!(pool.created() >= 1 && pool.created() <= 2);
    });
}

/// Test: Sequential updates racing a reader that holds across both
#[test]
fn loom_reader_holds_across_updates() {
    loom::model(|| {
        let resets = Arc::new(AtomicUsize::new(0));
        let pool = marking_pool(resets.clone());
        let container = Arc::new(Container::empty(pool));
        publish(&container, 1);

        let reader_container = container.clone();
        let reader = thread::spawn(move || {
            if let Some(held) = reader_container.acquire() {
                let version = held.version;
                thread::yield_now();
                assert_eq!(held.version, version);
                assert!(!held.recycled.load(Ordering::SeqCst));
            }
        });

        publish(&container, 2);
        publish(&container, 3);

        reader.join().unwrap();

        // Versions 1 and 2 are both superseded and released by now.
        assert_eq!(resets.load(Ordering::SeqCst), 2);
    });
}
