//! Pointer event sources.
//!
//! A [`HookEventSource`] owns whatever platform machinery delivers raw
//! pointer events and forwards them to a [`HookHandler`] on its own callback
//! thread. The core never installs system hooks itself.

#[cfg(windows)]
mod win;

#[cfg(windows)]
pub use win::WindowsHookSource;

use crate::event::{MouseButton, Point};
use anyhow::anyhow;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Receiver of raw pointer events. Runs on the producer thread: must not
/// block, allocate unboundedly or log above `trace`.
pub trait HookHandler: Send + Sync {
    fn on_button_down(&self, button: MouseButton, point: Point, time_ms: u64);
    fn on_button_up(&self, button: MouseButton, point: Point, time_ms: u64);
    fn on_move(&self, point: Point, time_ms: u64);
}

pub trait HookEventSource: Send {
    /// Start delivering events to `handler`. Installing twice is a no-op.
    fn install(&mut self, handler: Arc<dyn HookHandler>) -> anyhow::Result<()>;
    /// Stop delivering events. No callback may start after this returns.
    fn uninstall(&mut self) -> anyhow::Result<()>;
    fn is_installed(&self) -> bool;
}

/// The event source for the current platform.
pub fn platform_source() -> Box<dyn HookEventSource> {
    #[cfg(windows)]
    {
        Box::new(WindowsHookSource::default())
    }
    #[cfg(not(windows))]
    {
        Box::new(UnsupportedHookSource)
    }
}

#[cfg(not(windows))]
#[derive(Debug, Default)]
pub struct UnsupportedHookSource;

#[cfg(not(windows))]
impl HookEventSource for UnsupportedHookSource {
    fn install(&mut self, _handler: Arc<dyn HookHandler>) -> anyhow::Result<()> {
        Err(anyhow!("pointer hooks are not supported on this platform"))
    }

    fn uninstall(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn is_installed(&self) -> bool {
        false
    }
}

/// Event source driven by hand through a [`MockHookHandle`]. Used by tests and
/// by hosts that already receive pointer events from elsewhere.
#[derive(Clone)]
pub struct MockHookSource {
    state: Arc<MockHookState>,
}

#[derive(Default)]
struct MockHookState {
    install_count: AtomicUsize,
    uninstall_count: AtomicUsize,
    fail_install: AtomicBool,
    handler: Mutex<Option<Arc<dyn HookHandler>>>,
}

impl MockHookSource {
    pub fn new() -> (Self, MockHookHandle) {
        let state = Arc::new(MockHookState::default());
        (
            Self {
                state: Arc::clone(&state),
            },
            MockHookHandle { state },
        )
    }
}

impl HookEventSource for MockHookSource {
    fn install(&mut self, handler: Arc<dyn HookHandler>) -> anyhow::Result<()> {
        if self.state.fail_install.swap(false, Ordering::SeqCst) {
            return Err(anyhow!("mock hook install refused"));
        }
        let mut guard = self.state.handler.lock().map_err(|_| anyhow!("lock"))?;
        if guard.is_none() {
            self.state.install_count.fetch_add(1, Ordering::SeqCst);
            *guard = Some(handler);
        }
        Ok(())
    }

    fn uninstall(&mut self) -> anyhow::Result<()> {
        let mut guard = self.state.handler.lock().map_err(|_| anyhow!("lock"))?;
        if guard.is_some() {
            self.state.uninstall_count.fetch_add(1, Ordering::SeqCst);
        }
        *guard = None;
        Ok(())
    }

    fn is_installed(&self) -> bool {
        match self.state.handler.lock() {
            Ok(guard) => guard.is_some(),
            Err(_) => false,
        }
    }
}

/// Test-side handle of a [`MockHookSource`]. The `emit` helpers return
/// `false` when no handler is installed.
#[derive(Clone)]
pub struct MockHookHandle {
    state: Arc<MockHookState>,
}

impl MockHookHandle {
    pub fn install_count(&self) -> usize {
        self.state.install_count.load(Ordering::SeqCst)
    }

    pub fn uninstall_count(&self) -> usize {
        self.state.uninstall_count.load(Ordering::SeqCst)
    }

    pub fn is_installed(&self) -> bool {
        match self.state.handler.lock() {
            Ok(guard) => guard.is_some(),
            Err(_) => false,
        }
    }

    /// Make the next `install` fail.
    pub fn fail_next_install(&self) {
        self.state.fail_install.store(true, Ordering::SeqCst);
    }

    pub fn button_down(&self, button: MouseButton, point: Point, time_ms: u64) -> bool {
        self.emit(|handler| handler.on_button_down(button, point, time_ms))
    }

    pub fn button_up(&self, button: MouseButton, point: Point, time_ms: u64) -> bool {
        self.emit(|handler| handler.on_button_up(button, point, time_ms))
    }

    pub fn move_to(&self, point: Point, time_ms: u64) -> bool {
        self.emit(|handler| handler.on_move(point, time_ms))
    }

    // The lock is held across the call so `uninstall` waits for callbacks in
    // flight, like a real hook thread being joined.
    fn emit(&self, f: impl FnOnce(&dyn HookHandler)) -> bool {
        match self.state.handler.lock() {
            Ok(guard) => match guard.as_ref() {
                Some(handler) => {
                    f(handler.as_ref());
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }
}
