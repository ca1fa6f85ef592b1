use crate::event::Point;
use std::collections::VecDeque;

/// Bounded FIFO of pointer positions. When full, the oldest point is evicted.
#[derive(Debug, PartialEq)]
pub struct Trajectory {
    points: VecDeque<Point>,
    capacity: usize,
}

impl Trajectory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, point: Point) {
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn back(&self) -> Option<&Point> {
        self.points.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Point> + '_ {
        self.points.iter()
    }
}

impl Clone for Trajectory {
    fn clone(&self) -> Self {
        let mut points = VecDeque::with_capacity(self.capacity);
        points.extend(self.points.iter().copied());
        Self {
            points,
            capacity: self.capacity,
        }
    }

    // The double buffer copies the published state into its spare slot on
    // every update; reuse the spare's allocation.
    fn clone_from(&mut self, source: &Self) {
        self.points.clear();
        self.points.extend(source.points.iter().copied());
        self.capacity = source.capacity;
    }
}

/// Everything known about the gesture in progress.
///
/// Written only by the producer thread through the detector's double buffer.
/// `last_point` always equals the newest trajectory entry once at least one
/// move has been recorded.
#[derive(Debug, PartialEq)]
pub struct DragState {
    /// Gesture counter; bumped on every press.
    pub generation: u32,
    pub start_point: Point,
    pub last_point: Point,
    pub start_time_ms: u64,
    pub last_move_time_ms: u64,
    /// Sum of per-move Euclidean step lengths.
    pub total_distance: f64,
    pub move_count: u32,
    /// Whether the file provider confirmed this gesture.
    pub has_files: bool,
    pub trajectory: Trajectory,
    /// Fastest single step, px/ms.
    pub max_velocity: f64,
    /// `total_distance` over the elapsed gesture time, px/ms.
    pub avg_velocity: f64,
    /// Consecutive steps turning by more than 90 degrees.
    pub direction_changes: u32,
    last_step: Option<(f64, f64)>,
    pub(crate) query_armed: bool,
}

impl DragState {
    pub fn new(trajectory_capacity: usize) -> Self {
        Self {
            generation: 0,
            start_point: Point::default(),
            last_point: Point::default(),
            start_time_ms: 0,
            last_move_time_ms: 0,
            total_distance: 0.0,
            move_count: 0,
            has_files: false,
            trajectory: Trajectory::new(trajectory_capacity),
            max_velocity: 0.0,
            avg_velocity: 0.0,
            direction_changes: 0,
            last_step: None,
            query_armed: false,
        }
    }

    /// Start a new gesture at `point`.
    pub fn reset(&mut self, generation: u32, point: Point, time_ms: u64) {
        self.generation = generation;
        self.start_point = point;
        self.last_point = point;
        self.start_time_ms = time_ms;
        self.last_move_time_ms = time_ms;
        self.total_distance = 0.0;
        self.move_count = 0;
        self.has_files = false;
        self.trajectory.clear();
        self.max_velocity = 0.0;
        self.avg_velocity = 0.0;
        self.direction_changes = 0;
        self.last_step = None;
        self.query_armed = false;
    }

    pub fn record_move(&mut self, point: Point, time_ms: u64) {
        let dx = point.x - self.last_point.x;
        let dy = point.y - self.last_point.y;
        let step = dx.hypot(dy);
        let dt = time_ms.saturating_sub(self.last_move_time_ms);

        self.total_distance += step;
        self.move_count += 1;
        self.last_point = point;
        self.last_move_time_ms = time_ms.max(self.last_move_time_ms);
        self.trajectory.push(point);

        if dt > 0 {
            self.max_velocity = self.max_velocity.max(step / dt as f64);
        }
        let elapsed = self.elapsed_ms();
        self.avg_velocity = if elapsed > 0 {
            self.total_distance / elapsed as f64
        } else {
            0.0
        };

        if step > 0.0 {
            if let Some((px, py)) = self.last_step {
                if px * dx + py * dy < 0.0 {
                    self.direction_changes += 1;
                }
            }
            self.last_step = Some((dx, dy));
        }
    }

    /// Time between the press and the latest move.
    pub fn elapsed_ms(&self) -> u64 {
        self.last_move_time_ms.saturating_sub(self.start_time_ms)
    }

    /// Straight-line distance between the press point and the latest point.
    pub fn displacement(&self) -> f64 {
        self.start_point.distance_to(self.last_point)
    }

    pub(crate) fn is_consistent(&self) -> bool {
        match self.trajectory.back() {
            Some(back) => *back == self.last_point,
            None => self.move_count == 0,
        }
    }
}

impl Default for DragState {
    fn default() -> Self {
        Self::new(100)
    }
}

impl Clone for DragState {
    fn clone(&self) -> Self {
        Self {
            generation: self.generation,
            start_point: self.start_point,
            last_point: self.last_point,
            start_time_ms: self.start_time_ms,
            last_move_time_ms: self.last_move_time_ms,
            total_distance: self.total_distance,
            move_count: self.move_count,
            has_files: self.has_files,
            trajectory: self.trajectory.clone(),
            max_velocity: self.max_velocity,
            avg_velocity: self.avg_velocity,
            direction_changes: self.direction_changes,
            last_step: self.last_step,
            query_armed: self.query_armed,
        }
    }

    fn clone_from(&mut self, source: &Self) {
        self.generation = source.generation;
        self.start_point = source.start_point;
        self.last_point = source.last_point;
        self.start_time_ms = source.start_time_ms;
        self.last_move_time_ms = source.last_move_time_ms;
        self.total_distance = source.total_distance;
        self.move_count = source.move_count;
        self.has_files = source.has_files;
        self.trajectory.clone_from(&source.trajectory);
        self.max_velocity = source.max_velocity;
        self.avg_velocity = source.avg_velocity;
        self.direction_changes = source.direction_changes;
        self.last_step = source.last_step;
        self.query_armed = source.query_armed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trajectory_evicts_oldest_first() {
        let mut trajectory = Trajectory::new(3);
        for i in 0..5 {
            trajectory.push(Point::new(i as f64, 0.0));
        }
        let xs: Vec<f64> = trajectory.iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn distance_is_sum_of_steps_not_displacement() {
        let mut state = DragState::new(100);
        state.reset(1, Point::new(0.0, 0.0), 0);
        state.record_move(Point::new(3.0, 4.0), 10);
        state.record_move(Point::new(0.0, 0.0), 20);
        assert!((state.total_distance - 10.0).abs() < 1e-9);
        assert_eq!(state.displacement(), 0.0);
        assert_eq!(state.direction_changes, 1);
        assert_eq!(state.move_count, 2);
    }

    #[test]
    fn velocities_are_per_millisecond() {
        let mut state = DragState::new(100);
        state.reset(1, Point::new(0.0, 0.0), 100);
        state.record_move(Point::new(10.0, 0.0), 110);
        state.record_move(Point::new(40.0, 0.0), 120);
        assert!((state.max_velocity - 3.0).abs() < 1e-9);
        assert!((state.avg_velocity - 2.0).abs() < 1e-9);
        assert_eq!(state.direction_changes, 0);
    }

    #[test]
    fn reset_clears_previous_gesture() {
        let mut state = DragState::new(4);
        state.reset(1, Point::new(0.0, 0.0), 0);
        state.record_move(Point::new(5.0, 0.0), 5);
        state.reset(2, Point::new(9.0, 9.0), 50);
        assert_eq!(state.generation, 2);
        assert_eq!(state.move_count, 0);
        assert!(state.trajectory.is_empty());
        assert_eq!(state.last_point, Point::new(9.0, 9.0));
        assert!(state.is_consistent());
    }
}
