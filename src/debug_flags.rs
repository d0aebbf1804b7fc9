use std::sync::OnceLock;

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON"))
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

/// Per-instruction trace logging (`CPU_TRACE`).
pub fn trace() -> bool {
    static ON: OnceLock<bool> = OnceLock::new();
    *ON.get_or_init(|| env_flag("CPU_TRACE", false))
}

/// Rethrow execution errors from the run loop instead of only recording them (`CPU_RETHROW`).
pub fn rethrow_errors() -> bool {
    static ON: OnceLock<bool> = OnceLock::new();
    *ON.get_or_init(|| env_flag("CPU_RETHROW", false))
}

/// Trace ring buffer size (`CPU_TRACE_HISTORY`); 0 disables it.
pub fn trace_history() -> usize {
    static SIZE: OnceLock<usize> = OnceLock::new();
    *SIZE.get_or_init(|| env_usize("CPU_TRACE_HISTORY", 0))
}
