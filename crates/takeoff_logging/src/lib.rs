#![deny(missing_docs)]
//! Shared logging utilities for the takeoff workspace.
//!
//! This crate provides the `takeoff_*` logging macros used across the codebase
//! and a minimal test initializer for the global logger. Every line is tagged
//! with the dispatch sequence number of the message being processed, so log
//! output from the core, the engine callbacks and the app loop can be lined up.

use std::cell::Cell;

thread_local! {
    /// Thread-local storage for the sequence number of the message in dispatch.
    static DISPATCH_SEQ: Cell<u64> = const { Cell::new(0) };
}

/// Sets the dispatch sequence number for the current thread.
/// The app's dispatch loop calls this once per message before running `update`.
pub fn set_dispatch_seq(seq: u64) {
    DISPATCH_SEQ.with(|v| v.set(seq));
}

/// Retrieves the dispatch sequence number for the current thread.
/// Returns 0 outside of the dispatch loop (engine threads, tests).
pub fn dispatch_seq() -> u64 {
    DISPATCH_SEQ.with(|v| v.get())
}

/// Logs a trace-level message tagged with the dispatch sequence.
#[macro_export]
macro_rules! takeoff_trace {
    ($($arg:tt)*) => {{
        log::trace!("[#{}] {}", $crate::dispatch_seq(), format_args!($($arg)*));
    }};
}

/// Logs an info-level message tagged with the dispatch sequence.
#[macro_export]
macro_rules! takeoff_info {
    ($($arg:tt)*) => {{
        log::info!("[#{}] {}", $crate::dispatch_seq(), format_args!($($arg)*));
    }};
}

/// Logs a debug-level message tagged with the dispatch sequence.
#[macro_export]
macro_rules! takeoff_debug {
    ($($arg:tt)*) => {{
        log::debug!("[#{}] {}", $crate::dispatch_seq(), format_args!($($arg)*));
    }};
}

/// Logs a warn-level message tagged with the dispatch sequence.
#[macro_export]
macro_rules! takeoff_warn {
    ($($arg:tt)*) => {{
        log::warn!("[#{}] {}", $crate::dispatch_seq(), format_args!($($arg)*));
    }};
}

/// Logs an error-level message tagged with the dispatch sequence.
#[macro_export]
macro_rules! takeoff_error {
    ($($arg:tt)*) => {{
        log::error!("[#{}] {}", $crate::dispatch_seq(), format_args!($($arg)*));
    }};
}

/// Initializes a simple terminal logger for use in unit tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

    // Use debug level in debug builds, info in release builds.
    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // Ignore the error if a logger was already set by another test.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}

#[cfg(test)]
mod tests {
    use super::{dispatch_seq, set_dispatch_seq};

    #[test]
    fn dispatch_seq_is_per_thread() {
        set_dispatch_seq(41);
        assert_eq!(dispatch_seq(), 41);
        let other = std::thread::spawn(dispatch_seq).join().unwrap();
        assert_eq!(other, 0);
    }

    #[test]
    fn macros_accept_format_arguments() {
        super::initialize_for_tests();
        takeoff_info!("run {} started", "r-1");
        takeoff_debug!("plain message");
    }
}
