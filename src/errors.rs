// Error types and user-friendly error messages
//
// Typed errors for the background service and its supervisor, plus helpers
// that turn host-level failures into actionable messages.

use std::time::Duration;
use thiserror::Error;

/// Errors raised by a background service.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ServiceError {
    /// `start()` was invoked on a service that is already running.
    #[error("service '{name}' was already started")]
    AlreadyStarted { name: String },

    /// The service is not accepting peers (not ready yet, or stopping).
    #[error("service is not running")]
    NotRunning,

    /// Room names must be non-empty.
    #[error("invalid room name: {0:?}")]
    InvalidRoom(String),

    /// A frame exceeded the configured size limit.
    #[error("frame of {size} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { size: usize, limit: usize },

    /// The room was closed underneath a peer.
    #[error("room '{0}' closed")]
    RoomClosed(String),

    /// Service-specific failure.
    #[error("service failed: {0}")]
    Failed(String),
}

impl ServiceError {
    /// Returns a short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ServiceError::AlreadyStarted { .. } => "service_already_started",
            ServiceError::NotRunning => "service_not_running",
            ServiceError::InvalidRoom(_) => "service_invalid_room",
            ServiceError::FrameTooLarge { .. } => "service_frame_too_large",
            ServiceError::RoomClosed(_) => "service_room_closed",
            ServiceError::Failed(_) => "service_failed",
        }
    }
}

/// Errors surfaced by the supervisor's startup path.
///
/// Shutdown never produces one of these: its failures are classified in
/// [`crate::supervisor::ShutdownOutcome`] and absorbed.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// `on_startup()` was called while a task handle is still held.
    #[error("background service '{name}' is already started")]
    AlreadyStarted { name: String },

    /// The task finished before it ever signaled readiness.
    #[error("background service '{name}' exited before becoming ready: {detail}")]
    ExitedBeforeReady { name: String, detail: String },
}

/// Format a bind failure with helpful suggestions
pub fn bind_failed_error(address: &str, error: impl std::fmt::Display) -> String {
    format!(
        "Could not bind HTTP listener on {}\n\n\
        \x1b[1;33mError:\x1b[0m {}\n\n\
        \x1b[1;33mPossible causes:\x1b[0m\n\
        • Another process is already listening on that port\n\
        • The address is not local to this machine\n\
        • Binding a port below 1024 without privileges\n\n\
        \x1b[1;32mTry:\x1b[0m\n\
        1. Pick another address:\n\
           \x1b[36msyncdock --bind 127.0.0.1:8001\x1b[0m\n\n\
        2. Find the process holding the port:\n\
           \x1b[36mlsof -i :{}\x1b[0m",
        address,
        error,
        address.rsplit(':').next().unwrap_or(address)
    )
}

/// Format a missing web directory warning
pub fn web_dir_missing_error(path: &str) -> String {
    format!(
        "Web directory not found: {}\n\n\
        \x1b[1;33mPossible causes:\x1b[0m\n\
        • The frontend has not been built yet\n\
        • The build output was written somewhere else\n\n\
        \x1b[1;32mTry:\x1b[0m\n\
        1. Build the frontend into that directory\n\n\
        2. Point the server at the build output:\n\
           \x1b[36msyncdock --static-dir path/to/static\x1b[0m",
        path
    )
}

/// Format a config parse error with helpful suggestions
pub fn config_parse_error(path: &str, error: impl std::fmt::Display) -> String {
    format!(
        "Failed to parse config file {}\n\n\
        \x1b[1;33mError:\x1b[0m {}\n\n\
        \x1b[1;32mTry:\x1b[0m\n\
        1. Print the effective configuration:\n\
           \x1b[36msyncdock config\x1b[0m\n\n\
        2. Common mistakes:\n\
           • Missing quotes around strings\n\
           • Unknown section names\n\
           • Negative or zero durations",
        path, error
    )
}

/// Human-readable duration for log lines ("5s", "1.5s")
pub fn format_grace(grace: Duration) -> String {
    let secs = grace.as_secs_f64();
    if secs.fract() == 0.0 {
        format!("{}s", grace.as_secs())
    } else {
        format!("{:.1}s", secs)
    }
}
