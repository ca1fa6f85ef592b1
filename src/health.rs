//! Watchdog over the event pipeline.
//!
//! Producers only bump atomics through [`HealthMonitor`] and [`ModuleHandle`].
//! All threshold logic runs in [`HealthMonitor::tick`], either on the
//! monitor's own thread or when a caller drives it directly.

use crate::clock::Clock;
use crate::error::MonitorError;
use crate::settings::HealthThresholds;
use crate::sync::SeqLock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[repr(u8)]
pub enum HealthStatus {
    #[default]
    Healthy = 0,
    Degraded = 1,
    Unhealthy = 2,
    Critical = 3,
}

impl HealthStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => HealthStatus::Degraded,
            2 => HealthStatus::Unhealthy,
            3 => HealthStatus::Critical,
            _ => HealthStatus::Healthy,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HealthMetrics {
    pub last_event_time_ms: u64,
    pub events_processed: u64,
    pub errors_count: u64,
    pub avg_latency_ms: f64,
    pub status: HealthStatus,
}

/// Everything [`classify`] looks at.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HealthSample {
    /// Time since the last reported activity.
    pub idle_ms: u64,
    pub events: u64,
    pub errors: u64,
    pub avg_latency_ms: f64,
    pub unresponsive_modules: usize,
}

/// Status for a metrics snapshot. Checks run in a fixed order and the first
/// hit wins: idle time, then average latency, then error rate, then modules.
/// The error rate only counts once at least one event was processed.
pub fn classify(sample: &HealthSample, thresholds: &HealthThresholds) -> HealthStatus {
    if sample.idle_ms > thresholds.critical_timeout_ms {
        return HealthStatus::Critical;
    }
    if sample.idle_ms > thresholds.event_timeout_ms {
        return HealthStatus::Unhealthy;
    }

    if sample.avg_latency_ms > thresholds.critical_latency_ms {
        return HealthStatus::Critical;
    }
    if sample.avg_latency_ms > thresholds.high_latency_ms {
        return HealthStatus::Degraded;
    }

    if sample.events > 0 {
        let error_rate = sample.errors as f64 / sample.events as f64;
        if error_rate > thresholds.unhealthy_error_rate {
            return HealthStatus::Unhealthy;
        }
        if error_rate > thresholds.degraded_error_rate {
            return HealthStatus::Degraded;
        }
    }

    if sample.unresponsive_modules > 0 {
        return HealthStatus::Degraded;
    }
    HealthStatus::Healthy
}

type RecoveryAction = Box<dyn Fn() + Send + Sync>;
type StatusCallback = Arc<dyn Fn(HealthStatus) + Send + Sync>;
type RecoveryCallback = Arc<dyn Fn(&str) + Send + Sync>;

struct ModuleHealth {
    name: String,
    last_activity_ms: AtomicU64,
    error_count: AtomicU64,
    responding: AtomicBool,
    recovery: Option<RecoveryAction>,
}

/// Reporting handle for one registered subsystem.
#[derive(Clone)]
pub struct ModuleHandle {
    module: Arc<ModuleHealth>,
    shared: Arc<Shared>,
}

impl ModuleHandle {
    pub fn name(&self) -> &str {
        &self.module.name
    }

    /// Record one processed event for this module.
    pub fn report_activity(&self) {
        let now = self.shared.clock.now_ms();
        self.module.last_activity_ms.store(now, Ordering::Relaxed);
        self.module.responding.store(true, Ordering::Relaxed);
        self.shared.record_event(now);
    }

    /// Mark the module alive without counting an event.
    pub fn heartbeat(&self) {
        self.module
            .last_activity_ms
            .store(self.shared.clock.now_ms(), Ordering::Relaxed);
        self.module.responding.store(true, Ordering::Relaxed);
    }

    pub fn report_error(&self) {
        self.module.error_count.fetch_add(1, Ordering::Relaxed);
        self.shared.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn is_responding(&self) -> bool {
        self.module.responding.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u64 {
        self.module.error_count.load(Ordering::Relaxed)
    }

    pub fn last_activity_ms(&self) -> u64 {
        self.module.last_activity_ms.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("name", &self.module.name)
            .field("responding", &self.is_responding())
            .finish()
    }
}

struct Shared {
    thresholds: HealthThresholds,
    clock: Arc<dyn Clock>,
    last_event_ms: AtomicU64,
    events: AtomicU64,
    errors: AtomicU64,
    latency_total_us: AtomicU64,
    latency_count: AtomicU64,
    modules: Mutex<Vec<Arc<ModuleHealth>>>,
    last_status: AtomicU8,
    on_status_change: Mutex<Option<StatusCallback>>,
    on_recovery: Mutex<Option<RecoveryCallback>>,
    published: SeqLock<HealthMetrics>,
    // Serializes ticks; the published seqlock has a single writer.
    tick_lock: Mutex<()>,
}

impl Shared {
    fn record_event(&self, now: u64) {
        self.last_event_ms.store(now, Ordering::Relaxed);
        self.events.fetch_add(1, Ordering::Relaxed);
    }

    fn avg_latency_ms(&self) -> f64 {
        let count = self.latency_count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        self.latency_total_us.load(Ordering::Relaxed) as f64 / (count as f64 * 1000.0)
    }

    fn modules(&self) -> Vec<Arc<ModuleHealth>> {
        lock(&self.modules).clone()
    }

    fn sample(&self, now: u64) -> HealthSample {
        HealthSample {
            idle_ms: now.saturating_sub(self.last_event_ms.load(Ordering::Relaxed)),
            events: self.events.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            avg_latency_ms: self.avg_latency_ms(),
            unresponsive_modules: lock(&self.modules)
                .iter()
                .filter(|m| !m.responding.load(Ordering::Relaxed))
                .count(),
        }
    }

    fn metrics(&self) -> HealthMetrics {
        let sample = self.sample(self.clock.now_ms());
        HealthMetrics {
            last_event_time_ms: self.last_event_ms.load(Ordering::Relaxed),
            events_processed: sample.events,
            errors_count: sample.errors,
            avg_latency_ms: sample.avg_latency_ms,
            status: classify(&sample, &self.thresholds),
        }
    }

    fn recover(&self, module: &ModuleHealth) -> bool {
        let Some(action) = module.recovery.as_ref() else {
            return false;
        };
        tracing::warn!(module = %module.name, "running recovery action");
        action();
        let callback = lock(&self.on_recovery).clone();
        if let Some(callback) = callback {
            callback(&module.name);
        }
        true
    }

    fn tick(&self) -> HealthStatus {
        let _serial = lock(&self.tick_lock);
        let now = self.clock.now_ms();
        let modules = self.modules();

        let metrics = self.metrics();
        let status = metrics.status;
        self.published.write(metrics);

        let previous =
            HealthStatus::from_u8(self.last_status.swap(status as u8, Ordering::AcqRel));
        if previous != status {
            tracing::info!(?previous, ?status, "health status changed");
            let callback = lock(&self.on_status_change).clone();
            if let Some(callback) = callback {
                callback(status);
            }
        }

        for module in &modules {
            let last = module.last_activity_ms.load(Ordering::Relaxed);
            if last > 0
                && now.saturating_sub(last) > self.thresholds.event_timeout_ms
                && module.responding.swap(false, Ordering::AcqRel)
            {
                tracing::warn!(module = %module.name, idle_ms = now - last, "module stopped responding");
                self.recover(module);
            }
        }

        if status == HealthStatus::Critical {
            self.emergency_cleanup(&modules);
        }
        status
    }

    fn emergency_cleanup(&self, modules: &[Arc<ModuleHealth>]) {
        self.errors.store(0, Ordering::Relaxed);
        self.latency_total_us.store(0, Ordering::Relaxed);
        self.latency_count.store(0, Ordering::Relaxed);
        for module in modules {
            if !module.responding.load(Ordering::Relaxed) {
                self.recover(module);
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct WorkerHandle {
    stop_tx: Sender<()>,
    join: JoinHandle<()>,
}

pub struct HealthMonitor {
    shared: Arc<Shared>,
    worker: Mutex<Option<WorkerHandle>>,
}

impl HealthMonitor {
    pub fn new(thresholds: HealthThresholds, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now_ms();
        Self {
            shared: Arc::new(Shared {
                thresholds,
                clock,
                last_event_ms: AtomicU64::new(now),
                events: AtomicU64::new(0),
                errors: AtomicU64::new(0),
                latency_total_us: AtomicU64::new(0),
                latency_count: AtomicU64::new(0),
                modules: Mutex::new(Vec::new()),
                last_status: AtomicU8::new(HealthStatus::Healthy as u8),
                on_status_change: Mutex::new(None),
                on_recovery: Mutex::new(None),
                published: SeqLock::new(HealthMetrics {
                    last_event_time_ms: now,
                    ..HealthMetrics::default()
                }),
                tick_lock: Mutex::new(()),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn thresholds(&self) -> &HealthThresholds {
        &self.shared.thresholds
    }

    pub fn register_module(&self, name: impl Into<String>) -> ModuleHandle {
        self.add_module(name.into(), None)
    }

    /// Register a module whose `recovery` runs when it stops responding and
    /// on every tick spent in [`HealthStatus::Critical`] while it stays so.
    pub fn register_module_with_recovery(
        &self,
        name: impl Into<String>,
        recovery: impl Fn() + Send + Sync + 'static,
    ) -> ModuleHandle {
        self.add_module(name.into(), Some(Box::new(recovery)))
    }

    fn add_module(&self, name: String, recovery: Option<RecoveryAction>) -> ModuleHandle {
        let module = Arc::new(ModuleHealth {
            name,
            last_activity_ms: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            responding: AtomicBool::new(true),
            recovery,
        });
        lock(&self.shared.modules).push(Arc::clone(&module));
        ModuleHandle {
            module,
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn report_activity(&self) {
        self.shared.record_event(self.shared.clock.now_ms());
    }

    pub fn report_error(&self) {
        self.shared.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn report_latency(&self, latency_ms: f64) {
        let micros = (latency_ms.max(0.0) * 1000.0) as u64;
        self.shared
            .latency_total_us
            .fetch_add(micros, Ordering::Relaxed);
        self.shared.latency_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_status_change(&self, callback: impl Fn(HealthStatus) + Send + Sync + 'static) {
        *lock(&self.shared.on_status_change) = Some(Arc::new(callback));
    }

    pub fn on_recovery(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        *lock(&self.shared.on_recovery) = Some(Arc::new(callback));
    }

    /// Status computed from the live counters.
    pub fn status(&self) -> HealthStatus {
        self.metrics().status
    }

    /// Metrics computed from the live counters.
    pub fn metrics(&self) -> HealthMetrics {
        self.shared.metrics()
    }

    /// Metrics as of the last tick.
    pub fn published_metrics(&self) -> HealthMetrics {
        self.shared.published.read()
    }

    /// Run the recovery action of `module` now. Returns `false` when no such
    /// module exists or it has no recovery action.
    pub fn attempt_recovery(&self, module: &str) -> bool {
        let found = self
            .shared
            .modules()
            .into_iter()
            .find(|m| m.name == module);
        match found {
            Some(module) => self.shared.recover(&module),
            None => false,
        }
    }

    /// One watchdog pass: evaluate status, fire callbacks on edges, check
    /// modules and clean up while critical.
    pub fn tick(&self) -> HealthStatus {
        self.shared.tick()
    }

    pub fn start(&self) -> Result<(), MonitorError> {
        let mut worker = lock(&self.worker);
        if worker.is_some() {
            return Ok(());
        }

        self.shared
            .last_event_ms
            .store(self.shared.clock.now_ms(), Ordering::Relaxed);

        let (stop_tx, stop_rx) = mpsc::channel();
        let shared = Arc::clone(&self.shared);
        let interval = shared.thresholds.check_interval();
        let join = thread::Builder::new()
            .name("dragwatch-health".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        shared.tick();
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(|source| MonitorError::ThreadSpawn {
                name: "health monitor",
                source,
            })?;

        *worker = Some(WorkerHandle { stop_tx, join });
        tracing::debug!("health monitor started");
        Ok(())
    }

    pub fn stop(&self) {
        let worker = lock(&self.worker).take();
        if let Some(worker) = worker {
            let _ = worker.stop_tx.send(());
            if worker.join.join().is_err() {
                tracing::error!("health monitor thread panicked");
            }
            tracing::debug!("health monitor stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.worker).is_some()
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
