//! Platform-native logging initialization.
//!
//! - iOS: tracing-oslog → Apple unified logging (os_log) + file fallback
//! - Android: paranoid-android → logcat
//! - Tests / desktop: tracing-subscriber::fmt → stderr + `<data_dir>/desk.log`

use std::path::Path;

const DEFAULT_FILTER: &str = "desk_core=debug,info";
const LOG_FILE_NAME: &str = "desk.log";

fn open_log_file(data_dir: &str) -> Option<std::fs::File> {
    let _ = std::fs::create_dir_all(data_dir);
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(Path::new(data_dir).join(LOG_FILE_NAME))
        .ok()
}

fn env_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER))
}

/// Called once at the start of `FfiDesk::new()`. Safe to call again; later
/// calls are no-ops.
pub fn init_logging(data_dir: &str) {
    use tracing_subscriber::prelude::*;

    let file_layer = open_log_file(data_dir).map(|file| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .with_target(true)
    });

    #[cfg(target_os = "ios")]
    {
        let os_log = tracing_oslog::OsLogger::new("com.desk.console", "default");
        let _ = tracing_subscriber::registry()
            .with(env_filter())
            .with(os_log)
            .with(file_layer)
            .try_init();
    }

    #[cfg(target_os = "android")]
    {
        let android_layer = paranoid_android::layer("desk");
        let _ = tracing_subscriber::registry()
            .with(env_filter())
            .with(android_layer)
            .with(file_layer)
            .try_init();
    }

    #[cfg(not(any(target_os = "ios", target_os = "android")))]
    {
        let _ = tracing_subscriber::registry()
            .with(env_filter())
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .with(file_layer)
            .try_init();
    }
}
