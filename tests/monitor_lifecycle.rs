use dragwatch::instance;
use dragwatch::{
    DragMonitor, ErrorCode, MockHookHandle, MockHookSource, MonitorConfig, MonitorError,
    MouseButton, NoFiles, NullSink, Point,
};
use serial_test::serial;
use std::sync::Arc;
use std::thread;

fn monitor() -> (DragMonitor, MockHookHandle) {
    let (source, handle) = MockHookSource::new();
    let monitor = DragMonitor::new(
        MonitorConfig::default(),
        Box::new(source),
        Arc::new(NoFiles),
        Arc::new(NullSink),
    )
    .unwrap();
    (monitor, handle)
}

#[test]
#[serial]
fn start_and_stop_are_idempotent() {
    let (monitor, handle) = monitor();

    monitor.start().unwrap();
    monitor.start().unwrap();
    assert!(monitor.is_running());
    assert!(monitor.health().is_running());
    assert_eq!(handle.install_count(), 1);

    monitor.stop();
    monitor.stop();
    assert!(!monitor.is_running());
    assert!(!monitor.health().is_running());
    assert_eq!(handle.uninstall_count(), 1);
    assert_eq!(instance::active_id(), None);
}

#[test]
#[serial]
fn concurrent_stops_complete_once() {
    let (monitor, handle) = monitor();
    let monitor = Arc::new(monitor);
    monitor.start().unwrap();

    let stoppers: Vec<_> = (0..2)
        .map(|_| {
            let monitor = monitor.clone();
            thread::spawn(move || monitor.stop())
        })
        .collect();
    for stopper in stoppers {
        stopper.join().unwrap();
    }

    assert!(!monitor.is_running());
    assert_eq!(handle.uninstall_count(), 1);
}

#[test]
#[serial]
fn failed_hook_install_leaves_everything_stopped() {
    let (monitor, handle) = monitor();
    handle.fail_next_install();

    let err = monitor.start().unwrap_err();
    assert!(matches!(err, MonitorError::HookInstall(_)));
    assert_eq!(err.code().as_u16(), 200);
    assert_eq!(monitor.last_error().code, ErrorCode::HookInstallFailed);
    assert!(!monitor.is_running());
    assert!(!monitor.health().is_running());
    assert_eq!(instance::active_id(), None);

    monitor.start().unwrap();
    assert!(monitor.last_error().is_success());
    monitor.stop();
}

#[test]
#[serial]
fn second_monitor_is_rejected_while_first_runs() {
    let (first, _first_handle) = monitor();
    let (second, second_handle) = monitor();

    first.start().unwrap();
    let err = second.start().unwrap_err();
    assert!(matches!(err, MonitorError::AlreadyActive));
    assert_eq!(second.last_error().code, ErrorCode::AlreadyInitialized);
    assert_eq!(second_handle.install_count(), 0);

    first.stop();
    second.start().unwrap();
    assert!(second.is_running());
    second.stop();
}

#[test]
#[serial]
fn callbacks_stop_after_stop_returns() {
    let (monitor, handle) = monitor();
    monitor.start().unwrap();
    assert!(handle.move_to(Point::new(1.0, 1.0), 1));
    assert!(handle.button_down(MouseButton::Right, Point::new(1.0, 1.0), 2));

    monitor.stop();
    assert!(!handle.move_to(Point::new(2.0, 2.0), 3));
    assert_eq!(monitor.performance_metrics().events_processed, 2);
}

#[test]
#[serial]
fn dropping_a_running_monitor_stops_it() {
    let (monitor, handle) = monitor();
    monitor.start().unwrap();
    drop(monitor);
    assert_eq!(handle.uninstall_count(), 1);
    assert_eq!(instance::active_id(), None);
}

#[test]
#[serial]
fn debug_config_leaves_the_subscriber_to_the_host() {
    let (source, _handle) = MockHookSource::new();
    let monitor = DragMonitor::new(
        MonitorConfig {
            debug_logging: true,
            ..Default::default()
        },
        Box::new(source),
        Arc::new(NoFiles),
        Arc::new(NullSink),
    )
    .unwrap();
    monitor.start().unwrap();
    monitor.stop();
    assert!(!tracing::dispatcher::has_been_set());
}
