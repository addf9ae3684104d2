//! Debug logging for tracing accumulator activity.
//!
//! Enable by setting environment variable: ECOTRAIL_DEBUG_LOG=1
//! Logs are written to /tmp/ecotrail-debug.log

use std::fs::OpenOptions;
use std::io::Write;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

const LOG_PATH: &str = "/tmp/ecotrail-debug.log";

static ENABLED: AtomicBool = AtomicBool::new(false);
static START_TIME: OnceLock<Instant> = OnceLock::new();
static LOG_FILE: OnceLock<std::sync::Mutex<std::fs::File>> = OnceLock::new();

/// Initialize debug logging. Call once at startup.
pub fn init() {
    if std::env::var("ECOTRAIL_DEBUG_LOG").is_err() {
        return;
    }

    START_TIME.get_or_init(Instant::now);
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(LOG_PATH);

    match file {
        Ok(file) => {
            let _ = LOG_FILE.set(std::sync::Mutex::new(file));
            ENABLED.store(true, Ordering::SeqCst);
            log("DEBUG", "init", "Debug logging initialized");
        }
        Err(e) => eprintln!("Warning: could not open {LOG_PATH}: {e}"),
    }
}

/// Check if debug logging is enabled.
#[inline]
pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

/// Log a debug message with timestamp and thread ID.
pub fn log(category: &str, action: &str, detail: &str) {
    if !is_enabled() {
        return;
    }

    let elapsed = START_TIME
        .get()
        .map(|s| s.elapsed().as_millis())
        .unwrap_or(0);
    let thread_id = std::thread::current().id();

    let msg = format!(
        "[{:>8}ms] [{:?}] [{}] {} - {}\n",
        elapsed, thread_id, category, action, detail
    );

    if let Some(file_mutex) = LOG_FILE.get()
        && let Ok(mut file) = file_mutex.lock()
    {
        let _ = file.write_all(msg.as_bytes());
        let _ = file.flush();
    }
}

/// Log an accumulator event. The detail is only formatted when logging is on.
#[inline]
pub fn session_event(action: &str, detail: impl FnOnce() -> String) {
    if is_enabled() {
        log("SESSION", action, &detail());
    }
}
