use crate::clock::{Clock, SystemClock};
use crate::coalescer::EventCoalescer;
use crate::error::{ErrorCode, ErrorInfo, MonitorError};
use crate::event::{ButtonEvent, MouseButton, MouseSample, Point};
use crate::gesture::{
    DragState, DragThresholds, DraggedFileEntry, FileListProvider, GestureDetector, GesturePhase,
};
use crate::health::{HealthMonitor, ModuleHandle};
use crate::hook::{HookEventSource, HookHandler};
use crate::instance::{self, InstanceGuard};
use crate::settings::MonitorConfig;
use crate::sink::DispatchSink;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle};

const HOOK_MODULE: &str = "hook";
const DISPATCH_MODULE: &str = "dispatch";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PerformanceMetrics {
    /// Raw events accepted from the hook.
    pub events_processed: u64,
    /// Coalesced samples delivered to the sink.
    pub events_batched: u64,
    /// Sink calls that returned an error.
    pub dispatch_errors: u64,
}

type SharedSource = Arc<Mutex<Box<dyn HookEventSource>>>;

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Everything the hook callback and the dispatch thread share.
struct Pipeline {
    clock: Arc<dyn Clock>,
    coalescer: EventCoalescer,
    detector: GestureDetector,
    sink: Arc<dyn DispatchSink>,
    health: Arc<HealthMonitor>,
    hook_module: ModuleHandle,
    dispatch_module: ModuleHandle,
    running: AtomicBool,
    left_down: AtomicBool,
    right_down: AtomicBool,
    events_processed: AtomicU64,
    events_batched: AtomicU64,
    dispatch_errors: AtomicU64,
    last_error: Mutex<ErrorInfo>,
}

impl Pipeline {
    fn button_flag(&self, button: MouseButton) -> &AtomicBool {
        match button {
            MouseButton::Left => &self.left_down,
            MouseButton::Right => &self.right_down,
        }
    }

    fn button_edge(&self, button: MouseButton, down: bool, point: Point, time_ms: u64) {
        if !self.running.load(Ordering::Acquire) {
            return;
        }
        self.events_processed.fetch_add(1, Ordering::Relaxed);
        self.hook_module.report_activity();

        let changed = self.button_flag(button).swap(down, Ordering::AcqRel) != down;
        let left_down = self.left_down.load(Ordering::Acquire);
        let right_down = self.right_down.load(Ordering::Acquire);

        if changed && button == MouseButton::Left {
            if down {
                self.detector.on_button_down(point, time_ms);
            } else {
                self.detector.on_button_up(time_ms);
            }
        }

        self.coalescer.push_move(MouseSample {
            x: point.x,
            y: point.y,
            left_down,
            right_down,
            omit_button_state: !changed,
            timestamp_ms: time_ms,
        });
        if changed {
            self.coalescer.push_button(ButtonEvent {
                left_down,
                right_down,
            });
        }
        tracing::trace!(?button, down, changed, "button");
    }

    fn set_last_error(&self, info: ErrorInfo) {
        *lock(&self.last_error) = info;
    }

    fn dispatch_failed(&self, what: &'static str, err: anyhow::Error) {
        tracing::warn!(?err, what, "dispatch sink failed");
        self.dispatch_module.report_error();
        self.set_last_error(ErrorInfo::new(
            ErrorCode::CallbackInvokeFailed,
            format!("{what}: {err:#}"),
        ));
        self.dispatch_errors.fetch_add(1, Ordering::Release);
    }

    /// One dispatch cycle. `reported` is the drag flag last sent to the sink.
    fn dispatch(&self, reported: &mut bool) {
        let batch = self.coalescer.drain();
        let now = self.clock.now_ms();
        if batch.dropped_buttons > 0 {
            tracing::warn!(dropped = batch.dropped_buttons, "button queue full, edges dropped");
            self.dispatch_module.report_error();
        }

        if let Some(sample) = batch.latest_move.as_deref() {
            match self.sink.on_mouse_sample(*sample) {
                Ok(()) => {
                    self.events_batched.fetch_add(1, Ordering::Relaxed);
                    self.health
                        .report_latency(now.saturating_sub(sample.timestamp_ms) as f64);
                }
                Err(err) => self.dispatch_failed("mouse sample", err),
            }
        }
        for event in &batch.buttons {
            if let Err(err) = self.sink.on_button_event(**event) {
                self.dispatch_failed("button event", err);
            }
        }
        // Pooled objects go back to their pools here, delivered or not.
        drop(batch);

        if let Some(confirmed) = self.detector.evaluate() {
            tracing::info!(
                files = confirmed.file_count,
                released = confirmed.released,
                "file drag detected"
            );
            // Already over by the time the files were known: report both edges.
            if !self.detector.has_active_drag() && !*reported {
                match self.sink.on_drag_state_changed(true, confirmed.file_count) {
                    Ok(()) => *reported = true,
                    Err(err) => self.dispatch_failed("drag state", err),
                }
            }
        }
        self.detector.tick(now);

        let active = self.detector.has_active_drag();
        if active != *reported {
            let file_count = self.detector.file_count();
            match self.sink.on_drag_state_changed(active, file_count) {
                Ok(()) => *reported = active,
                Err(err) => self.dispatch_failed("drag state", err),
            }
        }
        self.dispatch_module.heartbeat();
    }

    fn reset(&self) {
        self.coalescer.clear();
        self.detector.reset();
        self.left_down.store(false, Ordering::Release);
        self.right_down.store(false, Ordering::Release);
    }
}

impl HookHandler for Pipeline {
    fn on_button_down(&self, button: MouseButton, point: Point, time_ms: u64) {
        self.button_edge(button, true, point, time_ms);
    }

    fn on_button_up(&self, button: MouseButton, point: Point, time_ms: u64) {
        self.button_edge(button, false, point, time_ms);
    }

    fn on_move(&self, point: Point, time_ms: u64) {
        if !self.running.load(Ordering::Acquire) {
            return;
        }
        self.events_processed.fetch_add(1, Ordering::Relaxed);
        self.hook_module.report_activity();

        if self.detector.on_move(point, time_ms) {
            self.coalescer.wake();
        }
        self.coalescer.push_move(MouseSample {
            x: point.x,
            y: point.y,
            left_down: self.left_down.load(Ordering::Acquire),
            right_down: self.right_down.load(Ordering::Acquire),
            omit_button_state: true,
            timestamp_ms: time_ms,
        });
    }
}

fn run_dispatcher(pipeline: Arc<Pipeline>) {
    let mut reported = false;
    while pipeline.running.load(Ordering::Acquire) {
        pipeline.coalescer.wait();
        if !pipeline.running.load(Ordering::Acquire) {
            break;
        }
        pipeline.dispatch(&mut reported);
    }
    if reported {
        if let Err(err) = pipeline.sink.on_drag_state_changed(false, 0) {
            pipeline.dispatch_failed("drag state", err);
        }
    }
}

struct Running {
    dispatcher: JoinHandle<()>,
    // Dropped last: releases the instance slot after everything else stopped.
    instance: InstanceGuard,
}

/// Wires a [`HookEventSource`] to the coalescer, the gesture detector and a
/// [`DispatchSink`], and owns the dispatch and health threads.
///
/// Only one monitor can run per process at a time; see [`instance`].
pub struct DragMonitor {
    config: MonitorConfig,
    pipeline: Arc<Pipeline>,
    source: SharedSource,
    health: Arc<HealthMonitor>,
    running: Mutex<Option<Running>>,
}

impl DragMonitor {
    pub fn new(
        config: MonitorConfig,
        source: Box<dyn HookEventSource>,
        provider: Arc<dyn FileListProvider>,
        sink: Arc<dyn DispatchSink>,
    ) -> Result<Self, MonitorError> {
        Self::with_clock(config, source, provider, sink, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: MonitorConfig,
        source: Box<dyn HookEventSource>,
        provider: Arc<dyn FileListProvider>,
        sink: Arc<dyn DispatchSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, MonitorError> {
        config.validate()?;

        let source: SharedSource = Arc::new(Mutex::new(source));
        let health = Arc::new(HealthMonitor::new(config.health.clone(), Arc::clone(&clock)));

        let pipeline = Arc::new_cyclic(|weak: &Weak<Pipeline>| {
            let hook_module = {
                let pipeline = weak.clone();
                let source = Arc::downgrade(&source);
                health.register_module_with_recovery(HOOK_MODULE, move || {
                    if let (Some(pipeline), Some(source)) = (pipeline.upgrade(), source.upgrade()) {
                        reinstall_source(&pipeline, &source);
                    }
                })
            };
            let dispatch_module = {
                let pipeline = weak.clone();
                health.register_module_with_recovery(DISPATCH_MODULE, move || {
                    if let Some(pipeline) = pipeline.upgrade() {
                        pipeline.coalescer.wake();
                    }
                })
            };

            Pipeline {
                coalescer: EventCoalescer::new(&config),
                detector: GestureDetector::new(
                    DragThresholds::from(&config),
                    provider,
                    Arc::clone(&clock),
                ),
                clock,
                sink,
                health: Arc::clone(&health),
                hook_module,
                dispatch_module,
                running: AtomicBool::new(false),
                left_down: AtomicBool::new(false),
                right_down: AtomicBool::new(false),
                events_processed: AtomicU64::new(0),
                events_batched: AtomicU64::new(0),
                dispatch_errors: AtomicU64::new(0),
                last_error: Mutex::new(ErrorInfo::success()),
            }
        });

        Ok(Self {
            config,
            pipeline,
            source,
            health,
            running: Mutex::new(None),
        })
    }

    /// Start monitoring. Calling it while already running is a no-op. On
    /// failure nothing is left running and [`last_error`](Self::last_error)
    /// holds the cause.
    pub fn start(&self) -> Result<(), MonitorError> {
        let mut running = lock(&self.running);
        if running.is_some() {
            return Ok(());
        }

        match self.launch() {
            Ok(started) => {
                *running = Some(started);
                self.pipeline.set_last_error(ErrorInfo::success());
                tracing::info!("drag monitor started");
                Ok(())
            }
            Err(err) => {
                tracing::error!(?err, "failed to start drag monitor");
                self.pipeline.set_last_error(err.to_info());
                Err(err)
            }
        }
    }

    fn launch(&self) -> Result<Running, MonitorError> {
        let instance = instance::claim()?;
        let handler: Arc<dyn HookHandler> = self.pipeline.clone();
        instance.publish(Arc::clone(&handler));
        self.pipeline.running.store(true, Ordering::Release);

        if let Err(err) = lock(&self.source).install(handler) {
            self.pipeline.running.store(false, Ordering::Release);
            return Err(MonitorError::HookInstall(err));
        }

        let pipeline = Arc::clone(&self.pipeline);
        let dispatcher = match thread::Builder::new()
            .name("dragwatch-dispatch".into())
            .spawn(move || run_dispatcher(pipeline))
        {
            Ok(join) => join,
            Err(source) => {
                self.pipeline.running.store(false, Ordering::Release);
                self.uninstall_source();
                return Err(MonitorError::ThreadSpawn {
                    name: "dispatch",
                    source,
                });
            }
        };

        if let Err(err) = self.health.start() {
            self.pipeline.running.store(false, Ordering::Release);
            self.uninstall_source();
            self.pipeline.coalescer.wake();
            let _ = dispatcher.join();
            self.pipeline.reset();
            return Err(err);
        }

        Ok(Running {
            dispatcher,
            instance,
        })
    }

    /// Stop monitoring. Safe to call repeatedly, from any thread, and before
    /// `start`. A concurrent caller waits until the first one has finished.
    pub fn stop(&self) {
        let mut running = lock(&self.running);
        let Some(started) = running.take() else {
            return;
        };

        self.pipeline.running.store(false, Ordering::Release);
        self.health.stop();
        self.uninstall_source();
        started.instance.withdraw();

        self.pipeline.coalescer.wake();
        if started.dispatcher.join().is_err() {
            tracing::error!("dispatch thread panicked");
            self.pipeline.set_last_error(ErrorInfo::new(
                ErrorCode::TrackerStopFailed,
                "dispatch thread panicked",
            ));
        }
        self.pipeline.reset();
        drop(started.instance);
        tracing::info!("drag monitor stopped");
    }

    fn uninstall_source(&self) {
        if let Err(err) = lock(&self.source).uninstall() {
            tracing::error!(?err, "failed to uninstall pointer hook");
            self.pipeline.set_last_error(ErrorInfo::new(
                ErrorCode::TrackerStopFailed,
                format!("{err:#}"),
            ));
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.running).is_some()
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn last_error(&self) -> ErrorInfo {
        lock(&self.pipeline.last_error).clone()
    }

    pub fn performance_metrics(&self) -> PerformanceMetrics {
        PerformanceMetrics {
            events_processed: self.pipeline.events_processed.load(Ordering::Relaxed),
            events_batched: self.pipeline.events_batched.load(Ordering::Relaxed),
            dispatch_errors: self.pipeline.dispatch_errors.load(Ordering::Acquire),
        }
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    pub fn has_active_drag(&self) -> bool {
        self.pipeline.detector.has_active_drag()
    }

    pub fn file_count(&self) -> usize {
        self.pipeline.detector.file_count()
    }

    pub fn dragged_files(&self) -> Vec<DraggedFileEntry> {
        self.pipeline.detector.dragged_files()
    }

    pub fn drag_state(&self) -> DragState {
        self.pipeline.detector.snapshot()
    }

    pub fn phase(&self) -> GesturePhase {
        self.pipeline.detector.phase()
    }

    /// The detector behind this monitor, for hosts that drive evaluation
    /// themselves or want the raw trajectory.
    pub fn detector(&self) -> &GestureDetector {
        &self.pipeline.detector
    }
}

impl Drop for DragMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn reinstall_source(pipeline: &Arc<Pipeline>, source: &Mutex<Box<dyn HookEventSource>>) {
    if !pipeline.running.load(Ordering::Acquire) {
        return;
    }
    // Skip when start/stop holds the source; they are changing it anyway.
    let Ok(mut source) = source.try_lock() else {
        return;
    };
    let handler: Arc<dyn HookHandler> = pipeline.clone();
    let result = source.uninstall().and_then(|()| source.install(handler));
    if let Err(err) = result {
        tracing::error!(?err, "failed to reinstall pointer hook");
        pipeline.set_last_error(ErrorInfo::new(
            ErrorCode::HookInstallFailed,
            format!("{err:#}"),
        ));
    }
}
