use std::cell::UnsafeCell;
use std::hint;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;

const SLOTS: usize = 3;
const SLOT_SHIFT: u32 = 62;
const ARRIVALS: u64 = (1 << SLOT_SHIFT) - 1;

/// Front/back publication of a composite value with an atomically swapped
/// active slot.
///
/// Readers never retry and never wait: entering a read is a single
/// `fetch_add` on `entry`, which both counts the reader against the active
/// slot and tells it which slot that is. Writers are admitted one at a time,
/// rebuild a back slot from the active one, mutate it and publish it by
/// swapping the slot index.
///
/// There are two back slots. A writer takes whichever one every reader has
/// left, so a reader that lingers on an old generation pins only that slot
/// and the writer carries on with the other. The writer spins only when
/// readers are still inside both old generations at once.
///
/// Meant for one logical writer (the producer thread). The admission flag
/// keeps a second writer correct, but it will spin behind the first.
pub struct DoubleBuffer<T> {
    slots: [UnsafeCell<T>; SLOTS],
    /// Active slot in the top two bits, readers that entered it below.
    entry: AtomicU64,
    departed: [AtomicU64; SLOTS],
    /// Arrivals on a slot at the moment it was retired. Writer-only.
    retired: [AtomicU64; SLOTS],
    updating: AtomicBool,
}

unsafe impl<T: Send> Send for DoubleBuffer<T> {}
unsafe impl<T: Send + Sync> Sync for DoubleBuffer<T> {}

impl<T: Clone> DoubleBuffer<T> {
    pub fn new(value: T) -> Self {
        Self {
            slots: [
                UnsafeCell::new(value.clone()),
                UnsafeCell::new(value.clone()),
                UnsafeCell::new(value),
            ],
            entry: AtomicU64::new(0),
            departed: [AtomicU64::new(0), AtomicU64::new(0), AtomicU64::new(0)],
            retired: [AtomicU64::new(0), AtomicU64::new(0), AtomicU64::new(0)],
            updating: AtomicBool::new(false),
        }
    }

    /// Run `f` against the currently published generation.
    ///
    /// `f` should copy out and return. The slot stays pinned until it does.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let entered = self.entry.fetch_add(1, Ordering::Acquire);
        let slot = (entered >> SLOT_SHIFT) as usize;
        let _departure = Departure(&self.departed[slot]);
        // SAFETY: the writer never mutates a slot while readers counted on it
        // are still inside.
        f(unsafe { &*self.slots[slot].get() })
    }

    pub fn snapshot(&self) -> T {
        self.read(T::clone)
    }

    /// Copy the published value into a free back slot, apply `f` to it and
    /// publish the result.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let _admission = self.admit();

        let active = (self.entry.load(Ordering::Acquire) >> SLOT_SHIFT) as usize;
        let target = self.free_slot(active);
        self.departed[target].store(0, Ordering::Relaxed);
        self.retired[target].store(0, Ordering::Relaxed);

        // SAFETY: admission excludes other writers, no reader is inside
        // `target`, and `active` is only ever read.
        let (published, spare) =
            unsafe { (&*self.slots[active].get(), &mut *self.slots[target].get()) };
        spare.clone_from(published);
        let result = f(spare);

        let previous = self
            .entry
            .swap((target as u64) << SLOT_SHIFT, Ordering::AcqRel);
        self.retired[active].store(previous & ARRIVALS, Ordering::Relaxed);
        result
    }

    /// A back slot that every reader has left.
    fn free_slot(&self, active: usize) -> usize {
        let candidates = [(active + 1) % SLOTS, (active + 2) % SLOTS];
        loop {
            for slot in candidates {
                let retired = self.retired[slot].load(Ordering::Relaxed);
                if self.departed[slot].load(Ordering::Acquire) >= retired {
                    return slot;
                }
            }
            hint::spin_loop();
        }
    }

    fn admit(&self) -> Admission<'_> {
        while self
            .updating
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            thread::yield_now();
        }
        Admission(&self.updating)
    }
}

impl<T: Clone + Default> Default for DoubleBuffer<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

struct Departure<'a>(&'a AtomicU64);

impl Drop for Departure<'_> {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::Release);
    }
}

struct Admission<'a>(&'a AtomicBool);

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
