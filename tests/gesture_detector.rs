use dragwatch::gesture::{DragThresholds, DraggedFileEntry, GestureDetector, GesturePhase};
use dragwatch::{ManualClock, Point};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

fn two_files() -> Vec<DraggedFileEntry> {
    vec![
        DraggedFileEntry::from_path("/tmp/a.txt"),
        DraggedFileEntry::from_path("/tmp/b.png"),
    ]
}

fn detector(files: Vec<DraggedFileEntry>) -> (GestureDetector, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let provider = move || {
        counter.fetch_add(1, Ordering::SeqCst);
        files.clone()
    };
    let detector = GestureDetector::new(
        DragThresholds::default(),
        Arc::new(provider),
        Arc::new(ManualClock::new(0)),
    );
    (detector, calls)
}

/// Press at the origin at t=0, then walk along the x axis.
fn drag(detector: &GestureDetector, steps: &[(f64, u64)]) -> usize {
    detector.on_button_down(Point::new(0.0, 0.0), 0);
    let mut x = 0.0;
    let mut wakes = 0;
    for &(dx, t) in steps {
        x += dx;
        if detector.on_move(Point::new(x, 0.0), t) {
            wakes += 1;
        }
        detector.evaluate();
    }
    wakes
}

#[test]
fn thresholds_met_exactly_confirm_the_drag() {
    let (detector, calls) = detector(two_files());
    let wakes = drag(
        &detector,
        &[(5.0, 10), (5.0, 20), (5.0, 30), (5.0, 40), (5.0, 50)],
    );

    assert_eq!(wakes, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(detector.has_active_drag());
    assert_eq!(detector.phase(), GesturePhase::ConfirmedDrag);
    assert_eq!(detector.file_count(), 2);
    assert_eq!(detector.dragged_files_at(60).len(), 2);
    assert!(detector.snapshot().has_files);
}

#[test]
fn distance_one_unit_short_does_not_confirm() {
    let (detector, calls) = detector(two_files());
    drag(
        &detector,
        &[(5.0, 10), (5.0, 20), (5.0, 30), (5.0, 40), (4.0, 50)],
    );
    assert!(!detector.has_active_drag());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn duration_one_unit_short_does_not_confirm() {
    let (detector, calls) = detector(two_files());
    drag(
        &detector,
        &[(5.0, 10), (5.0, 20), (5.0, 30), (5.0, 40), (5.0, 49)],
    );
    assert!(!detector.has_active_drag());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn move_count_one_short_does_not_confirm() {
    let (detector, calls) = detector(two_files());
    drag(&detector, &[(5.0, 10), (5.0, 20), (5.0, 30), (10.0, 50)]);
    assert!(!detector.has_active_drag());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(detector.phase(), GesturePhase::PotentialDrag);
}

#[test]
fn empty_file_list_never_confirms() {
    let (detector, calls) = detector(Vec::new());
    let steps: Vec<(f64, u64)> = (1..=20).map(|i| (5.0, i * 10)).collect();
    drag(&detector, &steps);
    assert!(!detector.has_active_drag());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn release_before_thresholds_goes_straight_to_idle() {
    let (detector, calls) = detector(two_files());
    drag(&detector, &[(5.0, 10), (5.0, 20)]);
    detector.on_button_up(30);
    assert_eq!(detector.phase(), GesturePhase::Idle);
    assert!(detector.dragged_files_at(31).is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn files_stay_readable_for_the_grace_period() {
    let (detector, _calls) = detector(two_files());
    drag(
        &detector,
        &[(5.0, 10), (5.0, 20), (5.0, 30), (5.0, 40), (5.0, 50)],
    );
    detector.on_button_up(100);

    assert!(!detector.has_active_drag());
    assert_eq!(detector.file_count(), 0);
    assert_eq!(detector.phase(), GesturePhase::Ended);
    assert_eq!(detector.dragged_files_at(599).len(), 2);

    detector.tick(300);
    assert_eq!(detector.phase(), GesturePhase::GracePeriod);
    assert_eq!(detector.dragged_files_at(300).len(), 2);

    assert!(detector.dragged_files_at(600).is_empty());
    detector.tick(600);
    assert_eq!(detector.phase(), GesturePhase::Idle);
    assert!(detector.dragged_files_at(601).is_empty());
}

#[test]
fn next_press_clears_files_before_the_grace_period_ends() {
    let (detector, calls) = detector(two_files());
    drag(
        &detector,
        &[(5.0, 10), (5.0, 20), (5.0, 30), (5.0, 40), (5.0, 50)],
    );
    detector.on_button_up(100);
    detector.on_button_down(Point::new(50.0, 50.0), 150);

    assert!(detector.dragged_files_at(150).is_empty());
    assert_eq!(detector.phase(), GesturePhase::PotentialDrag);
    assert!(!detector.snapshot().has_files);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn distance_is_the_sum_of_steps() {
    let (detector, _calls) = detector(Vec::new());
    detector.on_button_down(Point::new(0.0, 0.0), 0);

    let mut expected = 0.0;
    let mut point = Point::new(0.0, 0.0);
    for i in 0..250u64 {
        let dx = ((i * 7) % 11) as f64 - 5.0;
        let dy = ((i * 3) % 5) as f64 - 2.0;
        let next = Point::new(point.x + dx, point.y + dy);
        expected += point.distance_to(next);
        point = next;
        detector.on_move(next, i + 1);

        let state = detector.snapshot();
        assert_eq!(state.trajectory.len(), (state.move_count as usize).min(100));
    }

    let state = detector.snapshot();
    assert!((state.total_distance - expected).abs() < 1e-6);
    assert_eq!(state.move_count, 250);
    assert_eq!(state.trajectory.len(), 100);
    assert_eq!(state.trajectory.back(), Some(&state.last_point));
}

#[test]
fn concurrent_readers_never_see_torn_state() {
    let (detector, _calls) = detector(Vec::new());
    let detector = Arc::new(detector);
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let detector = detector.clone();
            let done = done.clone();
            thread::spawn(move || {
                let mut checked = 0u64;
                while !done.load(Ordering::Acquire) {
                    let state = detector.snapshot();
                    match state.trajectory.back() {
                        Some(back) => assert_eq!(*back, state.last_point),
                        None => assert_eq!(state.move_count, 0),
                    }
                    assert_eq!(
                        state.trajectory.len(),
                        (state.move_count as usize).min(state.trajectory.capacity())
                    );
                    checked += 1;
                }
                checked
            })
        })
        .collect();

    for gesture in 0..20u64 {
        detector.on_button_down(Point::new(0.0, 0.0), gesture * 1_000);
        for i in 1..=300u64 {
            detector.on_move(
                Point::new(i as f64, (i % 7) as f64),
                gesture * 1_000 + i,
            );
        }
        detector.on_button_up(gesture * 1_000 + 301);
    }
    done.store(true, Ordering::Release);

    for reader in readers {
        reader.join().unwrap();
    }
}

#[test]
fn quick_release_is_confirmed_once_evaluated() {
    let (detector, calls) = detector(two_files());
    detector.on_button_down(Point::new(0.0, 0.0), 0);
    let mut x = 0.0;
    for t in [10, 20, 30, 40, 50] {
        x += 5.0;
        detector.on_move(Point::new(x, 0.0), t);
    }
    detector.on_button_up(51);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let confirmed = detector.evaluate().expect("drag confirmed after release");
    assert_eq!(confirmed.file_count, 2);
    assert!(confirmed.released);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!detector.has_active_drag());
    assert_eq!(detector.dragged_files_at(300).len(), 2);
    assert!(detector.dragged_files_at(551).is_empty());
}
