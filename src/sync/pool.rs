use super::spinlock::SpinLock;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Bounded free list of boxed objects, guarded by a [`SpinLock`] so the
/// producer can take and return objects without parking.
pub struct ObjectPool<T> {
    free: SpinLock<Vec<Box<T>>>,
    capacity: usize,
    allocations: AtomicU64,
}

impl<T: Default> ObjectPool<T> {
    /// Create a pool holding up to `capacity` idle objects, prefilled.
    pub fn new(capacity: usize) -> Arc<Self> {
        let mut free = Vec::with_capacity(capacity);
        free.extend((0..capacity).map(|_| Box::<T>::default()));
        Arc::new(Self {
            free: SpinLock::new(free),
            capacity,
            allocations: AtomicU64::new(0),
        })
    }

    /// Take an idle object, allocating only when the pool is exhausted.
    ///
    /// The object keeps whatever state it had when it was returned; callers
    /// overwrite it.
    pub fn acquire(self: &Arc<Self>) -> Pooled<T> {
        let reused = self.free.lock().pop();
        let value = match reused {
            Some(value) => value,
            None => {
                self.allocations.fetch_add(1, Ordering::Relaxed);
                Box::default()
            }
        };
        Pooled {
            value: ManuallyDrop::new(value),
            pool: Arc::clone(self),
        }
    }
}

impl<T> ObjectPool<T> {
    fn release(&self, value: Box<T>) {
        let mut free = self.free.lock();
        if free.len() < self.capacity {
            free.push(value);
        }
    }

    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Objects allocated because the pool was empty.
    pub fn allocations(&self) -> u64 {
        self.allocations.load(Ordering::Relaxed)
    }
}

/// An object on loan from an [`ObjectPool`]. Returns to the pool when dropped,
/// whichever path drops it.
pub struct Pooled<T> {
    value: ManuallyDrop<Box<T>>,
    pool: Arc<ObjectPool<T>>,
}

impl<T> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T> Drop for Pooled<T> {
    fn drop(&mut self) {
        // SAFETY: `value` is never touched again after this.
        let value = unsafe { ManuallyDrop::take(&mut self.value) };
        self.pool.release(value);
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Pooled").field(&**self).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropped_objects_return_to_the_pool() {
        let pool = ObjectPool::<u64>::new(2);
        let a = pool.acquire();
        let b = pool.acquire();
        assert_eq!(pool.idle(), 0);
        drop(a);
        assert_eq!(pool.idle(), 1);
        drop(b);
        assert_eq!(pool.idle(), 2);
        assert_eq!(pool.allocations(), 0);
    }

    #[test]
    fn exhausted_pool_allocates_and_caps_on_return() {
        let pool = ObjectPool::<u64>::new(1);
        let a = pool.acquire();
        let b = pool.acquire();
        assert_eq!(pool.allocations(), 1);
        drop(a);
        drop(b);
        assert_eq!(pool.idle(), 1);
    }
}
