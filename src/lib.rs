//! Pointer-event pipeline that detects file drags without blocking the hook
//! thread.
//!
//! A [`HookEventSource`] feeds raw events into a [`DragMonitor`]. The monitor
//! updates the [`GestureDetector`] and queues samples on the hook thread using
//! only atomics and short spinlocks, then a dispatch thread coalesces them and
//! forwards them to a [`DispatchSink`]. A [`HealthMonitor`] watches the whole
//! thing from its own thread.

pub mod clock;
pub mod coalescer;
pub mod error;
pub mod event;
pub mod gesture;
pub mod health;
pub mod hook;
pub mod instance;
pub mod logging;
pub mod monitor;
pub mod settings;
pub mod sink;
pub mod sync;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ErrorCode, ErrorInfo, MonitorError};
pub use event::{ButtonEvent, MouseButton, MouseSample, Point};
pub use gesture::{
    Confirmation, DragState, DraggedFileEntry, FileListProvider, GestureDetector, GesturePhase,
    NoFiles,
};
pub use health::{HealthMetrics, HealthMonitor, HealthStatus, ModuleHandle};
pub use hook::{HookEventSource, HookHandler, MockHookHandle, MockHookSource};
pub use monitor::{DragMonitor, PerformanceMetrics};
pub use settings::{HealthThresholds, MonitorConfig};
pub use sink::{DispatchSink, NullSink};
