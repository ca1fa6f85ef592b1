//! Publication primitives shared by the producer (hook callback) and the
//! background threads.
//!
//! None of these ever park the calling thread. [`SpinLock`] and the
//! [`DoubleBuffer`] writer spin briefly; [`SeqLock`] readers retry while a
//! write is in flight; [`DoubleBuffer`] readers never wait at all.

pub mod double_buffer;
pub mod ordering;
pub mod pool;
pub mod seqlock;
pub mod spinlock;

pub use double_buffer::DoubleBuffer;
pub use pool::{ObjectPool, Pooled};
pub use seqlock::SeqLock;
pub use spinlock::{SpinLock, SpinLockGuard};
