use crate::clock::Clock;
use crate::event::Point;
use crate::gesture::files::{DraggedFileEntry, FileListProvider};
use crate::gesture::state::DragState;
use crate::settings::MonitorConfig;
use crate::sync::DoubleBuffer;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum GesturePhase {
    Idle = 0,
    PotentialDrag = 1,
    ConfirmedDrag = 2,
    Ended = 3,
    GracePeriod = 4,
}

impl GesturePhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => GesturePhase::PotentialDrag,
            2 => GesturePhase::ConfirmedDrag,
            3 => GesturePhase::Ended,
            4 => GesturePhase::GracePeriod,
            _ => GesturePhase::Idle,
        }
    }

    fn holds_files(self) -> bool {
        matches!(
            self,
            GesturePhase::ConfirmedDrag | GesturePhase::Ended | GesturePhase::GracePeriod
        )
    }
}

const MAX_FILE_COUNT: u32 = (1 << 24) - 1;
const PHASE_MASK: u64 = 0x7f;
const QUERY_PENDING: u64 = 1 << 31;

/// Generation, phase and file count packed into one atomic word so both the
/// producer and the coalescer thread can move the state machine with a
/// single compare-exchange.
///
/// Layout: generation in the high 32 bits, then the query-pending flag, seven
/// phase bits and a 24-bit file count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Word {
    generation: u32,
    phase: GesturePhase,
    /// Thresholds were met and `evaluate` has not answered yet. Survives the
    /// button release so a quick flick is still confirmed.
    query_pending: bool,
    file_count: u32,
}

impl Word {
    fn pack(self) -> u64 {
        let pending = if self.query_pending { QUERY_PENDING } else { 0 };
        (u64::from(self.generation) << 32)
            | pending
            | (u64::from(self.phase as u8) << 24)
            | u64::from(self.file_count.min(MAX_FILE_COUNT))
    }

    fn unpack(raw: u64) -> Self {
        Self {
            generation: (raw >> 32) as u32,
            phase: GesturePhase::from_u8(((raw >> 24) & PHASE_MASK) as u8),
            query_pending: raw & QUERY_PENDING != 0,
            file_count: (raw as u32) & MAX_FILE_COUNT,
        }
    }

    fn with(self, phase: GesturePhase, file_count: u32) -> Self {
        Self {
            phase,
            file_count,
            ..self
        }
    }

    /// The file cache may be read for this word's generation.
    fn holds_files(self) -> bool {
        !self.query_pending && self.phase.holds_files()
    }

    fn settled(self) -> Self {
        Self {
            query_pending: false,
            ..self
        }
    }
}

/// Outcome of an [`GestureDetector::evaluate`] call that found files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    pub file_count: usize,
    /// The button was already up when the query answered: the drag is
    /// confirmed and ended at once, and only the grace window remains.
    pub released: bool,
}

fn next_generation(current: u32) -> u32 {
    match current.wrapping_add(1) {
        0 => 1,
        next => next,
    }
}

/// Numeric conditions a press-and-move must meet before the file provider is
/// consulted. All comparisons are inclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct DragThresholds {
    pub min_distance: f64,
    pub min_duration_ms: u64,
    pub min_move_count: u32,
    pub min_displacement: f64,
    pub trajectory_capacity: usize,
    pub grace_period_ms: u64,
}

impl DragThresholds {
    pub fn is_met(&self, state: &DragState) -> bool {
        state.total_distance >= self.min_distance
            && state.elapsed_ms() >= self.min_duration_ms
            && state.move_count >= self.min_move_count
            && state.displacement() >= self.min_displacement
    }
}

impl Default for DragThresholds {
    fn default() -> Self {
        Self::from(&MonitorConfig::default())
    }
}

impl From<&MonitorConfig> for DragThresholds {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            min_distance: config.min_drag_distance,
            min_duration_ms: config.min_drag_duration_ms,
            min_move_count: config.min_move_count,
            min_displacement: config.min_displacement,
            trajectory_capacity: config.trajectory_capacity,
            grace_period_ms: config.grace_period_ms,
        }
    }
}

#[derive(Debug, Default)]
struct FileCache {
    generation: u32,
    files: Vec<DraggedFileEntry>,
}

/// File-drag state machine.
///
/// `on_button_down`, `on_move` and `on_button_up` run on the producer thread
/// and only touch atomics and the [`DoubleBuffer`]. `evaluate` and `tick` run
/// on the coalescer thread; `evaluate` is where the provider is called.
pub struct GestureDetector {
    thresholds: DragThresholds,
    provider: Arc<dyn FileListProvider>,
    clock: Arc<dyn Clock>,
    state: DoubleBuffer<DragState>,
    word: AtomicU64,
    /// Generation whose thresholds were just met and still awaits its query.
    armed: AtomicU32,
    grace_deadline_ms: AtomicU64,
    files: Mutex<FileCache>,
    queries: AtomicU64,
}

impl GestureDetector {
    pub fn new(
        thresholds: DragThresholds,
        provider: Arc<dyn FileListProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let state = DragState::new(thresholds.trajectory_capacity);
        Self {
            thresholds,
            provider,
            clock,
            state: DoubleBuffer::new(state),
            word: AtomicU64::new(Word::unpack(0).pack()),
            armed: AtomicU32::new(0),
            grace_deadline_ms: AtomicU64::new(0),
            files: Mutex::new(FileCache::default()),
            queries: AtomicU64::new(0),
        }
    }

    pub fn thresholds(&self) -> &DragThresholds {
        &self.thresholds
    }

    /// Start a new gesture. Any file list from the previous gesture stops
    /// being readable immediately.
    pub fn on_button_down(&self, point: Point, time_ms: u64) {
        let generation = next_generation(self.load().generation);
        self.state
            .update(|state| state.reset(generation, point, time_ms));
        self.transition(|_| {
            Some(Word {
                generation,
                phase: GesturePhase::PotentialDrag,
                query_pending: false,
                file_count: 0,
            })
        });
    }

    /// Record a move. Returns `true` when this move first satisfied every
    /// threshold and the coalescer should run [`evaluate`](Self::evaluate).
    pub fn on_move(&self, point: Point, time_ms: u64) -> bool {
        let word = self.load();
        if !matches!(
            word.phase,
            GesturePhase::PotentialDrag | GesturePhase::ConfirmedDrag
        ) {
            return false;
        }

        let thresholds = &self.thresholds;
        let armed = self.state.update(|state| {
            if state.generation != word.generation {
                return false;
            }
            state.record_move(point, time_ms);
            if word.phase == GesturePhase::PotentialDrag
                && !state.query_armed
                && thresholds.is_met(state)
            {
                state.query_armed = true;
                return true;
            }
            false
        });

        if armed {
            self.transition(|current| {
                (current.generation == word.generation
                    && current.phase == GesturePhase::PotentialDrag)
                    .then_some(Word {
                        query_pending: true,
                        ..current
                    })
            });
            self.armed.store(word.generation, Ordering::Release);
            tracing::trace!(generation = word.generation, "drag thresholds met");
        }
        armed
    }

    /// Finish the gesture. A confirmed drag enters its grace window, and so
    /// does one whose file query is still outstanding. Anything else goes
    /// straight back to idle.
    pub fn on_button_up(&self, time_ms: u64) {
        self.grace_deadline_ms.store(
            time_ms.saturating_add(self.thresholds.grace_period_ms),
            Ordering::Release,
        );
        self.transition(|word| match word.phase {
            GesturePhase::ConfirmedDrag => Some(word.with(GesturePhase::Ended, 0)),
            GesturePhase::PotentialDrag if word.query_pending => {
                Some(word.with(GesturePhase::Ended, 0))
            }
            GesturePhase::PotentialDrag => Some(word.with(GesturePhase::Idle, 0)),
            _ => None,
        });
    }

    /// Run the pending file query, if any. Returns what this call confirmed,
    /// including drags whose button came up before the query ran.
    pub fn evaluate(&self) -> Option<Confirmation> {
        let generation = self.armed.swap(0, Ordering::AcqRel);
        if generation == 0 {
            return None;
        }
        let word = self.load();
        if word.generation != generation || !word.query_pending {
            return None;
        }

        self.queries.fetch_add(1, Ordering::Relaxed);
        let files = self.provider.try_get_dragged_files();
        if files.is_empty() {
            tracing::debug!(generation, "drag without files");
            self.transition(|current| {
                if current.generation != generation || !current.query_pending {
                    return None;
                }
                Some(match current.phase {
                    GesturePhase::Ended => current.settled().with(GesturePhase::Idle, 0),
                    _ => current.settled(),
                })
            });
            return None;
        }

        let count = files.len();
        {
            let mut cache = self.cache();
            cache.generation = generation;
            cache.files = files;
        }

        let outcome = self.transition(|current| {
            if current.generation != generation || !current.query_pending {
                return None;
            }
            match current.phase {
                GesturePhase::PotentialDrag => Some(
                    current
                        .settled()
                        .with(GesturePhase::ConfirmedDrag, count as u32),
                ),
                GesturePhase::Ended => Some(current.settled().with(GesturePhase::Ended, 0)),
                _ => None,
            }
        })?;

        let released = outcome.phase == GesturePhase::Ended;
        tracing::debug!(generation, files = count, released, "file drag confirmed");
        Some(Confirmation {
            file_count: count,
            released,
        })
    }

    /// Advance the grace window and drop file lists nobody can read anymore.
    pub fn tick(&self, now_ms: u64) {
        let deadline = self.grace_deadline_ms.load(Ordering::Acquire);
        let settled = self.transition(|word| match word.phase {
            // Still waiting on evaluate.
            _ if word.query_pending => None,
            GesturePhase::Ended | GesturePhase::GracePeriod if now_ms >= deadline => {
                Some(word.with(GesturePhase::Idle, 0))
            }
            GesturePhase::Ended => Some(word.with(GesturePhase::GracePeriod, 0)),
            _ => None,
        });
        if let Some(word) = settled {
            if word.phase == GesturePhase::Idle {
                tracing::debug!(generation = word.generation, "grace period over");
            }
        }

        let word = self.load();
        let mut cache = self.cache();
        let readable = cache.generation == word.generation && word.holds_files();
        if !readable && !cache.files.is_empty() {
            cache.files.clear();
        }
    }

    /// Forget the current gesture, e.g. when the monitor stops.
    pub fn reset(&self) {
        self.armed.store(0, Ordering::Release);
        self.transition(|word| {
            (word.phase != GesturePhase::Idle || word.query_pending)
                .then(|| word.settled().with(GesturePhase::Idle, 0))
        });
        self.cache().files.clear();
    }

    pub fn phase(&self) -> GesturePhase {
        self.load().phase
    }

    pub fn has_active_drag(&self) -> bool {
        self.load().phase == GesturePhase::ConfirmedDrag
    }

    pub fn file_count(&self) -> usize {
        let word = self.load();
        if word.phase == GesturePhase::ConfirmedDrag {
            word.file_count as usize
        } else {
            0
        }
    }

    pub fn dragged_files(&self) -> Vec<DraggedFileEntry> {
        self.dragged_files_at(self.clock.now_ms())
    }

    /// Files of the current gesture: while the drag is active, and after it
    /// ended until the grace deadline or the next press.
    pub fn dragged_files_at(&self, now_ms: u64) -> Vec<DraggedFileEntry> {
        let cache = self.cache();
        let word = self.load();
        if cache.generation != word.generation || word.query_pending {
            return Vec::new();
        }
        match word.phase {
            GesturePhase::ConfirmedDrag => cache.files.clone(),
            GesturePhase::Ended | GesturePhase::GracePeriod
                if now_ms < self.grace_deadline_ms.load(Ordering::Acquire) =>
            {
                cache.files.clone()
            }
            _ => Vec::new(),
        }
    }

    /// Consistent copy of the gesture state.
    pub fn snapshot(&self) -> DragState {
        let mut state = self.state.snapshot();
        let word = self.load();
        state.has_files = state.generation == word.generation && word.holds_files();
        state
    }

    /// How many times the file provider has been called.
    pub fn provider_queries(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    fn load(&self) -> Word {
        Word::unpack(self.word.load(Ordering::Acquire))
    }

    fn transition(&self, mut next: impl FnMut(Word) -> Option<Word>) -> Option<Word> {
        let mut current = self.word.load(Ordering::Acquire);
        loop {
            let target = next(Word::unpack(current))?;
            match self.word.compare_exchange_weak(
                current,
                target.pack(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(target),
                Err(actual) => current = actual,
            }
        }
    }

    fn cache(&self) -> MutexGuard<'_, FileCache> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn files(n: usize) -> Vec<DraggedFileEntry> {
        (0..n)
            .map(|i| DraggedFileEntry::from_path(format!("/tmp/drag-{i}.txt")))
            .collect()
    }

    fn detector_with(n: usize) -> GestureDetector {
        let provider = move || files(n);
        GestureDetector::new(
            DragThresholds::default(),
            Arc::new(provider),
            Arc::new(ManualClock::new(0)),
        )
    }

    #[test]
    fn word_round_trips_through_packing() {
        let word = Word {
            generation: 0xdead_beef,
            phase: GesturePhase::GracePeriod,
            query_pending: false,
            file_count: 42,
        };
        assert_eq!(Word::unpack(word.pack()), word);

        let pending = Word {
            phase: GesturePhase::Ended,
            query_pending: true,
            file_count: MAX_FILE_COUNT,
            ..word
        };
        assert_eq!(Word::unpack(pending.pack()), pending);
    }

    #[test]
    fn generation_skips_zero_on_wrap() {
        assert_eq!(next_generation(u32::MAX), 1);
        assert_eq!(next_generation(0), 1);
    }

    #[test]
    fn press_starts_potential_drag() {
        let detector = detector_with(1);
        detector.on_button_down(Point::new(10.0, 10.0), 0);
        assert_eq!(detector.phase(), GesturePhase::PotentialDrag);
        assert!(!detector.has_active_drag());
        let state = detector.snapshot();
        assert_eq!(state.start_point, Point::new(10.0, 10.0));
        assert_eq!(state.move_count, 0);
    }

    #[test]
    fn moves_without_press_are_ignored() {
        let detector = detector_with(1);
        assert!(!detector.on_move(Point::new(5.0, 5.0), 10));
        assert_eq!(detector.snapshot().move_count, 0);
    }

    #[test]
    fn release_before_thresholds_returns_to_idle_without_query() {
        let detector = detector_with(1);
        detector.on_button_down(Point::new(0.0, 0.0), 0);
        detector.on_move(Point::new(1.0, 0.0), 5);
        detector.on_button_up(10);
        assert_eq!(detector.evaluate(), None);
        assert_eq!(detector.phase(), GesturePhase::Idle);
        assert_eq!(detector.provider_queries(), 0);
    }

    #[test]
    fn empty_file_list_is_queried_once_per_gesture() {
        let detector = detector_with(0);
        detector.on_button_down(Point::new(0.0, 0.0), 0);
        let mut wakes = 0;
        for i in 1..=10u64 {
            if detector.on_move(Point::new(i as f64 * 10.0, 0.0), i * 10) {
                wakes += 1;
            }
            detector.evaluate();
        }
        assert_eq!(wakes, 1);
        assert_eq!(detector.provider_queries(), 1);
        assert_eq!(detector.phase(), GesturePhase::PotentialDrag);
    }

    fn flick(detector: &GestureDetector) {
        detector.on_button_down(Point::new(0.0, 0.0), 0);
        for i in 1..=5u64 {
            detector.on_move(Point::new(i as f64 * 5.0, 0.0), i * 10);
        }
        detector.on_button_up(51);
    }

    #[test]
    fn release_before_evaluate_still_confirms() {
        let detector = detector_with(3);
        flick(&detector);
        assert_eq!(detector.phase(), GesturePhase::Ended);
        assert!(detector.dragged_files_at(52).is_empty());
        detector.tick(52);
        assert_eq!(detector.phase(), GesturePhase::Ended);

        assert_eq!(
            detector.evaluate(),
            Some(Confirmation {
                file_count: 3,
                released: true
            })
        );
        assert_eq!(detector.provider_queries(), 1);
        assert!(!detector.has_active_drag());
        assert_eq!(detector.dragged_files_at(100).len(), 3);
        assert!(detector.snapshot().has_files);

        detector.tick(100);
        assert_eq!(detector.phase(), GesturePhase::GracePeriod);
        assert!(detector.dragged_files_at(551).is_empty());
        detector.tick(551);
        assert_eq!(detector.phase(), GesturePhase::Idle);
    }

    #[test]
    fn release_before_evaluate_with_no_files_goes_idle() {
        let detector = detector_with(0);
        flick(&detector);
        assert_eq!(detector.evaluate(), None);
        assert_eq!(detector.provider_queries(), 1);
        assert_eq!(detector.phase(), GesturePhase::Idle);
        assert!(!detector.snapshot().has_files);
    }

    #[test]
    fn next_press_discards_an_unanswered_query() {
        let detector = detector_with(2);
        flick(&detector);
        detector.on_button_down(Point::new(9.0, 9.0), 60);
        assert_eq!(detector.evaluate(), None);
        assert_eq!(detector.provider_queries(), 0);
        assert_eq!(detector.phase(), GesturePhase::PotentialDrag);
    }

    #[test]
    fn slow_state_reader_does_not_stall_moves() {
        let detector = Arc::new(detector_with(0));
        detector.on_button_down(Point::new(0.0, 0.0), 0);

        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let reader = {
            let detector = Arc::clone(&detector);
            std::thread::spawn(move || {
                detector.state.read(|state| {
                    entered_tx.send(()).unwrap();
                    std::thread::sleep(std::time::Duration::from_millis(300));
                    state.move_count
                })
            })
        };
        entered_rx.recv().unwrap();

        let started = std::time::Instant::now();
        for i in 1..=10u64 {
            detector.on_move(Point::new(i as f64, 0.0), i);
        }
        let elapsed = started.elapsed();
        assert!(
            elapsed < std::time::Duration::from_millis(100),
            "moves took {elapsed:?}"
        );
        assert_eq!(reader.join().unwrap(), 0);
        assert_eq!(detector.snapshot().move_count, 10);
    }

    #[test]
    fn stale_cache_is_dropped_on_tick_after_new_press() {
        let detector = detector_with(2);
        detector.on_button_down(Point::new(0.0, 0.0), 0);
        for i in 1..=5u64 {
            detector.on_move(Point::new(i as f64 * 10.0, 0.0), i * 20);
        }
        assert_eq!(
            detector.evaluate(),
            Some(Confirmation {
                file_count: 2,
                released: false
            })
        );
        detector.on_button_up(200);
        detector.on_button_down(Point::new(0.0, 0.0), 210);
        assert!(detector.dragged_files_at(220).is_empty());
        detector.tick(220);
        assert!(detector.cache().files.is_empty());
    }
}
