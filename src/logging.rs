use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Initialise logging for hosts that do not install their own subscriber.
///
/// Without `debug` the level is forced to `info` regardless of `RUST_LOG`, so
/// a stray environment variable cannot turn on fast-path tracing. With
/// `debug`, `RUST_LOG` may override the `debug` default.
///
/// When `file` is given, output goes there instead of stderr. Calling this
/// more than once is harmless; only the first subscriber sticks.
pub fn init(debug: bool, file: Option<PathBuf>) {
    let filter = build_filter(debug);

    match file.as_ref().and_then(|path| split_log_path(path)) {
        Some((dir, name)) => {
            let appender = tracing_appender::rolling::never(dir, name);
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(appender)
                .try_init();
        }
        None => {
            let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
        }
    }
}

fn build_filter(debug: bool) -> EnvFilter {
    if debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::new("info")
    }
}

fn split_log_path(path: &PathBuf) -> Option<(PathBuf, PathBuf)> {
    let name = path.file_name()?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Some((dir, PathBuf::from(name)))
}
