use crate::event::{ButtonEvent, MouseSample};
use crate::settings::MonitorConfig;
use crate::sync::{ObjectPool, Pooled, SpinLock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// What one wake cycle hands to the dispatcher.
#[derive(Debug, Default)]
pub struct Batch {
    /// Newest pending move. Everything older was discarded.
    pub latest_move: Option<Pooled<MouseSample>>,
    /// Button edges in the order the producer saw them.
    pub buttons: Vec<Pooled<ButtonEvent>>,
    /// Moves dropped in favour of `latest_move`.
    pub coalesced: usize,
    /// Button edges refused since the last drain because the queue was full.
    pub dropped_buttons: u64,
}

impl Batch {
    pub fn is_empty(&self) -> bool {
        self.latest_move.is_none() && self.buttons.is_empty()
    }
}

struct Consumer {
    wake_rx: Receiver<()>,
    spare_moves: VecDeque<Pooled<MouseSample>>,
    spare_buttons: VecDeque<Pooled<ButtonEvent>>,
}

/// Queues between the producer callback and the dispatch thread.
///
/// The producer side (`push_move`, `push_button`, `wake`) only takes the
/// pool and queue spinlocks for O(1) work. The consumer side (`wait`,
/// `drain`) belongs to a single dispatch thread and swaps whole queues out
/// under the lock instead of draining them in place.
pub struct EventCoalescer {
    samples: Arc<ObjectPool<MouseSample>>,
    button_events: Arc<ObjectPool<ButtonEvent>>,
    moves: SpinLock<VecDeque<Pooled<MouseSample>>>,
    buttons: SpinLock<VecDeque<Pooled<ButtonEvent>>>,
    max_batch_size: usize,
    max_pending_buttons: usize,
    dropped_buttons: AtomicU64,
    interval: Duration,
    wake_tx: Sender<()>,
    wake_pending: AtomicBool,
    consumer: Mutex<Consumer>,
}

impl EventCoalescer {
    pub fn new(config: &MonitorConfig) -> Self {
        let max_batch_size = config.max_batch_size.max(1);
        let max_pending_buttons = config.pool_capacity.max(1);
        let (wake_tx, wake_rx) = mpsc::channel();
        Self {
            samples: ObjectPool::new(config.pool_capacity),
            button_events: ObjectPool::new(config.pool_capacity),
            moves: SpinLock::new(VecDeque::with_capacity(max_batch_size)),
            buttons: SpinLock::new(VecDeque::with_capacity(max_pending_buttons)),
            max_batch_size,
            max_pending_buttons,
            dropped_buttons: AtomicU64::new(0),
            interval: config.batch_interval(),
            wake_tx,
            wake_pending: AtomicBool::new(false),
            consumer: Mutex::new(Consumer {
                wake_rx,
                spare_moves: VecDeque::with_capacity(max_batch_size),
                spare_buttons: VecDeque::with_capacity(max_pending_buttons),
            }),
        }
    }

    /// Queue a position sample. The queue never holds more than
    /// `max_batch_size` moves; reaching that size wakes the dispatcher early.
    pub fn push_move(&self, sample: MouseSample) {
        let mut pooled = self.samples.acquire();
        *pooled = sample;

        let (evicted, pending) = {
            let mut moves = self.moves.lock();
            let evicted = if moves.len() >= self.max_batch_size {
                moves.pop_front()
            } else {
                None
            };
            moves.push_back(pooled);
            (evicted, moves.len())
        };
        drop(evicted);

        if pending >= self.max_batch_size {
            self.wake();
        }
    }

    /// Queue a button edge and wake the dispatcher. At most `pool_capacity`
    /// edges wait at once; past that the new edge is refused and counted, and
    /// `false` is returned.
    pub fn push_button(&self, event: ButtonEvent) -> bool {
        let accepted = {
            let mut buttons = self.buttons.lock();
            if buttons.len() < self.max_pending_buttons {
                let mut pooled = self.button_events.acquire();
                *pooled = event;
                buttons.push_back(pooled);
                true
            } else {
                false
            }
        };
        if !accepted {
            self.dropped_buttons.fetch_add(1, Ordering::Relaxed);
        }
        self.wake();
        accepted
    }

    /// Ask the dispatcher to run a cycle now. At most one wake is ever in
    /// flight, so a burst of calls costs one channel send.
    pub fn wake(&self) {
        if !self.wake_pending.swap(true, Ordering::AcqRel) {
            let _ = self.wake_tx.send(());
        }
    }

    /// Block the dispatch thread until a wake or the batch interval elapses.
    /// Returns `true` when woken explicitly.
    pub fn wait(&self) -> bool {
        let woken = {
            let consumer = self.consumer();
            match consumer.wake_rx.recv_timeout(self.interval) {
                Ok(()) => true,
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
            }
        };
        self.wake_pending.store(false, Ordering::Release);
        woken
    }

    /// Take everything queued since the last drain.
    pub fn drain(&self) -> Batch {
        let mut consumer = self.consumer();
        let consumer = &mut *consumer;
        std::mem::swap(&mut *self.moves.lock(), &mut consumer.spare_moves);
        std::mem::swap(&mut *self.buttons.lock(), &mut consumer.spare_buttons);

        let latest_move = consumer.spare_moves.pop_back();
        let coalesced = consumer.spare_moves.len();
        consumer.spare_moves.clear();
        let buttons = consumer.spare_buttons.drain(..).collect();

        Batch {
            latest_move,
            buttons,
            coalesced,
            dropped_buttons: self.dropped_buttons.swap(0, Ordering::Relaxed),
        }
    }

    /// Drop everything pending, returning the objects to their pools.
    pub fn clear(&self) {
        drop(self.drain());
    }

    pub fn pending_moves(&self) -> usize {
        self.moves.lock().len()
    }

    pub fn pending_buttons(&self) -> usize {
        self.buttons.lock().len()
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn sample_pool(&self) -> &Arc<ObjectPool<MouseSample>> {
        &self.samples
    }

    pub fn button_pool(&self) -> &Arc<ObjectPool<ButtonEvent>> {
        &self.button_events
    }

    fn consumer(&self) -> MutexGuard<'_, Consumer> {
        self.consumer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
