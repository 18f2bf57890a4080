//! Work queue, resource recyclers, and cancellation token shared across the
//! pipeline. Cross-cutting — the order builder, scanner, and parser pool all
//! share one [`CancellationToken`] and use [`WorkQueue`]/[`Recycler`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Shared boolean cell tripped by cancellation or an unhandled fatal error,
/// polled at every file/entry/work-unit boundary (spec.md §4.7, §5).
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A bounded-in-spirit FIFO work queue with a remaining-units counter.
///
/// `remaining` starts equal to the number of units seeded and is incremented
/// whenever a unit enqueues more work (e.g. a manifest `Class-Path` child),
/// so [`WorkQueue::is_drained`] only returns true once no in-flight unit can
/// possibly produce more work — not merely once the queue looks empty.
pub struct WorkQueue<T> {
    items: Mutex<VecDeque<T>>,
    remaining: AtomicUsize,
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            remaining: AtomicUsize::new(0),
        }
    }

    pub fn seed(&self, items: impl IntoIterator<Item = T>) {
        let mut guard = self.items.lock().expect("work queue mutex poisoned");
        for item in items {
            guard.push_back(item);
            self.remaining.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Push a unit discovered while processing another unit (e.g. a
    /// manifest-referenced child archive). Must be balanced by a later
    /// [`WorkQueue::complete`] call for the unit that produced it.
    pub fn push(&self, item: T) {
        self.remaining.fetch_add(1, Ordering::SeqCst);
        self.items.lock().expect("work queue mutex poisoned").push_back(item);
    }

    /// Pop the next unit, if any is immediately available. Does not block;
    /// callers spin on [`WorkQueue::is_drained`].
    pub fn pop(&self) -> Option<T> {
        self.items.lock().expect("work queue mutex poisoned").pop_front()
    }

    /// Mark one previously popped unit as fully processed (including any
    /// children it may have pushed).
    pub fn complete(&self) {
        self.remaining.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn is_drained(&self) -> bool {
        self.remaining.load(Ordering::SeqCst) == 0
    }
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A thread-safe free list of resettable, reusable resources (parser
/// buffers, archive handles). Acquisition is scoped: the guard returned by
/// [`Recycler::acquire`] returns its resource to the pool on every exit path,
/// including an early return or unwind, via `Drop`.
pub struct Recycler<T> {
    free: Mutex<Vec<T>>,
    make: Box<dyn Fn() -> T + Send + Sync>,
}

impl<T: Send> Recycler<T> {
    pub fn new(make: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            make: Box::new(make),
        }
    }

    pub fn acquire(self: &Arc<Self>) -> RecycledGuard<T> {
        let item = self
            .free
            .lock()
            .expect("recycler mutex poisoned")
            .pop()
            .unwrap_or_else(|| (self.make)());
        RecycledGuard {
            item: Some(item),
            recycler: Arc::clone(self),
        }
    }
}

pub struct RecycledGuard<T: Send> {
    item: Option<T>,
    recycler: Arc<Recycler<T>>,
}

impl<T: Send> std::ops::Deref for RecycledGuard<T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.item.as_ref().expect("guard used after drop")
    }
}

impl<T: Send> std::ops::DerefMut for RecycledGuard<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.item.as_mut().expect("guard used after drop")
    }
}

impl<T: Send> Drop for RecycledGuard<T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.recycler.free.lock().expect("recycler mutex poisoned").push(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;

    #[test]
    fn work_queue_drains_only_after_pushed_children_complete() {
        let queue: WorkQueue<i32> = WorkQueue::new();
        queue.seed([1]);
        assert!(!queue.is_drained());
        let unit = queue.pop().expect("unit");
        queue.push(unit + 1);
        assert!(!queue.is_drained());
        let _child = queue.pop().expect("child");
        queue.complete();
        assert!(!queue.is_drained());
        queue.complete();
        assert!(queue.is_drained());
    }

    #[test]
    fn cancellation_token_is_shared_across_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn recycler_returns_resource_on_drop() {
        let created = Arc::new(StdAtomicUsize::new(0));
        let created_clone = Arc::clone(&created);
        let recycler = Arc::new(Recycler::new(move || {
            created_clone.fetch_add(1, Ordering::SeqCst);
            Vec::<u8>::with_capacity(16 * 1024)
        }));

        {
            let mut guard = recycler.acquire();
            guard.push(1);
        }
        let guard2 = recycler.acquire();
        assert_eq!(created.load(Ordering::SeqCst), 1, "second acquire should reuse the freed buffer");
        drop(guard2);
    }
}
