use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Global log storage for HTTP requests
static HTTP_LOGS: Mutex<Vec<String>> = Mutex::new(Vec::new());

const MAX_HTTP_LOGS: usize = 100;

fn push_log(line: String) {
    if let Ok(mut logs) = HTTP_LOGS.lock() {
        logs.push(line);
        // Keep only last 100 logs
        if logs.len() > MAX_HTTP_LOGS {
            logs.remove(0);
        }
    }
}

/// Log an HTTP request
pub fn log_request(method: &str, url: &str) {
    let timestamp = chrono::Local::now().format("%H:%M:%S");
    push_log(format!("[{}] {} {}", timestamp, method, url));
    tracing::debug!(method, url, "request");
}

/// Log an HTTP response
pub fn log_response(status: u16, url: &str) {
    let timestamp = chrono::Local::now().format("%H:%M:%S");
    push_log(format!("[{}] <- {} {}", timestamp, status, url));
    tracing::debug!(status, url, "response");
}

/// Get recent logs for display, newest first
pub fn get_recent_logs(count: usize) -> Vec<String> {
    if let Ok(logs) = HTTP_LOGS.lock() {
        logs.iter().rev().take(count).cloned().collect()
    } else {
        Vec::new()
    }
}

/// Route `tracing` output to a file so the terminal UI stays clean.
/// `COLENDAR_LOG` overrides the default `info` filter.
pub fn init_tracing(log_path: &Path) -> std::io::Result<()> {
    if let Some(dir) = log_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(log_path)?;

    let filter = EnvFilter::try_from_env("COLENDAR_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    // A second init (tests, re-entry) is harmless
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init();
    Ok(())
}
