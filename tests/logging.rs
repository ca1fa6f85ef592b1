use std::{fs, thread::sleep, time::Duration};

use serial_test::serial;
use tempfile::tempdir;

#[test]
#[serial]
fn writes_log_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("dragwatch.log");

    dragwatch::logging::init(true, Some(path.clone()));
    tracing::info!("monitor log line");
    // A second init keeps the first subscriber.
    dragwatch::logging::init(false, None);
    tracing::info!("still routed to file");

    sleep(Duration::from_millis(100));

    assert!(path.exists(), "log file was not created");
    let contents = fs::read_to_string(path).unwrap();
    assert!(contents.contains("monitor log line"));
    assert!(contents.contains("still routed to file"));
}
