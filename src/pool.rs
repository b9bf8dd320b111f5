//! Object pooling for per-connection receive state.
//!
//! Every accepted connection needs a read scratch buffer and a
//! reassembler. Both are allocation-heavy, so they are pooled and handed
//! back on disconnect instead of rebuilt per connection.

use std::sync::Mutex;

/// An object that can be returned to a [`Pool`] after use.
pub trait Reusable {
    /// Restore the object to its fresh state before reuse.
    fn reset(&mut self);
}

/// A simple free-list pool backed by a factory.
pub struct Pool<T: Reusable> {
    items: Mutex<Vec<T>>,
    factory: Box<dyn Fn() -> T + Send + Sync>,
}

impl<T: Reusable> Pool<T> {
    pub fn new(factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            factory: Box::new(factory),
        }
    }

    /// Take a pooled object, or build a fresh one if the pool is empty.
    pub fn take(&self) -> T {
        let pooled = self
            .items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop();
        pooled.unwrap_or_else(|| (self.factory)())
    }

    /// Return an object to the pool, resetting it first.
    pub fn release(&self, mut item: T) {
        item.reset();
        self.items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(item);
    }

    /// Number of idle pooled objects.
    pub fn idle(&self) -> usize {
        self.items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        value: u32,
    }

    impl Reusable for Counter {
        fn reset(&mut self) {
            self.value = 0;
        }
    }

    #[test]
    fn take_builds_when_empty() {
        let pool = Pool::new(|| Counter { value: 0 });
        assert_eq!(pool.idle(), 0);
        let item = pool.take();
        assert_eq!(item.value, 0);
    }

    #[test]
    fn release_resets_and_recycles() {
        let pool = Pool::new(|| Counter { value: 0 });
        let mut item = pool.take();
        item.value = 42;
        pool.release(item);
        assert_eq!(pool.idle(), 1);

        let recycled = pool.take();
        assert_eq!(recycled.value, 0);
        assert_eq!(pool.idle(), 0);
    }
}
