//! Process-wide slot for the one running monitor.
//!
//! Low-level hook procedures receive no user context, so they find their
//! handler here. At most one monitor holds the slot at a time; the slot is
//! claimed with a compare-and-swap and released when the guard drops.

use crate::error::MonitorError;
use crate::hook::HookHandler;
use crate::sync::SpinLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static ACTIVE: AtomicU64 = AtomicU64::new(0);
static NEXT_ID: AtomicU64 = AtomicU64::new(1);
static HANDLER: SpinLock<Option<Arc<dyn HookHandler>>> = SpinLock::new(None);

/// Ownership of the instance slot. Dropping it withdraws the handler and
/// frees the slot for the next monitor.
#[must_use = "the slot is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct InstanceGuard {
    id: u64,
}

/// Claim the slot, failing with [`MonitorError::AlreadyActive`] when another
/// monitor already runs in this process.
pub fn claim() -> Result<InstanceGuard, MonitorError> {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    ACTIVE
        .compare_exchange(0, id, Ordering::AcqRel, Ordering::Acquire)
        .map_err(|_| MonitorError::AlreadyActive)?;
    Ok(InstanceGuard { id })
}

impl InstanceGuard {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Route platform callbacks to `handler`.
    pub fn publish(&self, handler: Arc<dyn HookHandler>) {
        let previous = HANDLER.lock().replace(handler);
        drop(previous);
    }

    /// Stop routing callbacks. Calls already inside the handler finish.
    pub fn withdraw(&self) {
        let previous = HANDLER.lock().take();
        drop(previous);
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        self.withdraw();
        let _ = ACTIVE.compare_exchange(self.id, 0, Ordering::AcqRel, Ordering::Relaxed);
    }
}

/// Id of the monitor holding the slot, if any.
pub fn active_id() -> Option<u64> {
    match ACTIVE.load(Ordering::Acquire) {
        0 => None,
        id => Some(id),
    }
}

/// Call `f` with the published handler. The handler is cloned under the
/// spinlock and invoked outside it, so a slow handler never holds the lock.
pub fn with_active<R>(f: impl FnOnce(&dyn HookHandler) -> R) -> Option<R> {
    let handler = HANDLER.lock().clone()?;
    Some(f(handler.as_ref()))
}
