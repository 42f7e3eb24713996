// Background service supervisor
//
// Owns the task running a single background service. Startup launches the
// task and waits for the service's readiness signal; shutdown asks the service
// to stop, waits a bounded grace period, then aborts the task and classifies
// how it ended. Shutdown never fails and never hangs.

pub mod lifespan;
#[cfg(test)]
pub(crate) mod testing;

pub use lifespan::lifespan;

use serde::Serialize;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::{JoinError, JoinHandle};
use tokio::time;
use tracing::{error, info, warn};

use crate::errors::{format_grace, ServiceError, SupervisorError};
use crate::service::{BackgroundService, Latch};

/// Grace period used when nothing else is configured
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Lifecycle of the supervised task, as observed by the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    NotStarted,
    Running,
    StopRequested,
    CompletedGracefully,
    Cancelled,
    FailedDuringUnwind,
}

impl TaskState {
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskState::NotStarted => "not_started",
            TaskState::Running => "running",
            TaskState::StopRequested => "stop_requested",
            TaskState::CompletedGracefully => "completed_gracefully",
            TaskState::Cancelled => "cancelled",
            TaskState::FailedDuringUnwind => "failed_during_unwind",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::CompletedGracefully | TaskState::Cancelled | TaskState::FailedDuringUnwind
        )
    }
}

/// Where a shutdown fault was observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultStage {
    /// The task failed on its own while we waited for it to finish
    GracePeriod,
    /// The task failed while being torn down after `abort()`
    AfterCancel,
}

/// How a shutdown sequence ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// No task was held; nothing to do
    NotRunning,
    /// The task finished by itself
    Graceful,
    /// The grace period elapsed and the task acknowledged cancellation
    Cancelled,
    /// The task raised an error or panicked; logged and absorbed
    Faulted { stage: FaultStage, detail: String },
}

impl ShutdownOutcome {
    fn final_state(&self) -> Option<TaskState> {
        match self {
            ShutdownOutcome::NotRunning => None,
            ShutdownOutcome::Graceful => Some(TaskState::CompletedGracefully),
            ShutdownOutcome::Cancelled => Some(TaskState::Cancelled),
            ShutdownOutcome::Faulted { .. } => Some(TaskState::FailedDuringUnwind),
        }
    }
}

type ServiceTask = JoinHandle<Result<(), ServiceError>>;

/// Sets the latch when the task body ends, including by panic or abort.
struct ExitGuard(Latch);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.0.set();
    }
}

/// Aborts the task if shutdown is dropped while waiting on it.
/// Aborting a finished task does nothing.
struct AbortOnDrop(ServiceTask);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Supervises exactly one background service
pub struct ServiceSupervisor<S: BackgroundService> {
    service: Arc<S>,
    shutdown_grace: Duration,
    task: Mutex<Option<ServiceTask>>,
    state: StdMutex<TaskState>,
}

impl<S: BackgroundService> ServiceSupervisor<S> {
    /// Create a supervisor; the service is not launched until `on_startup()`
    pub fn new(service: Arc<S>, shutdown_grace: Duration) -> Self {
        Self {
            service,
            shutdown_grace,
            task: Mutex::new(None),
            state: StdMutex::new(TaskState::NotStarted),
        }
    }

    pub fn service(&self) -> &Arc<S> {
        &self.service
    }

    pub fn shutdown_grace(&self) -> Duration {
        self.shutdown_grace
    }

    pub fn state(&self) -> TaskState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: TaskState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Launch the service and wait until it reports ready.
    ///
    /// No timeout is applied to the readiness wait. If the task ends before
    /// readiness is ever observed, the wait ends with
    /// [`SupervisorError::ExitedBeforeReady`].
    pub async fn on_startup(&self) -> Result<(), SupervisorError> {
        let name = self.service.name().to_string();
        let exited = Latch::new();

        {
            let mut task = self.task.lock().await;
            if task.is_some() {
                return Err(SupervisorError::AlreadyStarted { name });
            }

            info!(service = %name, "Starting background service");
            let service = Arc::clone(&self.service);
            let guard = ExitGuard(exited.clone());
            *task = Some(tokio::spawn(async move {
                let _guard = guard;
                service.start().await
            }));
        }
        self.set_state(TaskState::Running);

        tokio::select! {
            biased;
            _ = self.service.readiness().wait() => {
                info!(service = %name, "Background service started, yielding to application");
                Ok(())
            }
            _ = exited.wait() => {
                let detail = self.reap_early_exit().await;
                error!(service = %name, detail = %detail, "Background service exited before becoming ready");
                Err(SupervisorError::ExitedBeforeReady { name, detail })
            }
        }
    }

    /// Collect a task that ended during startup
    async fn reap_early_exit(&self) -> String {
        let task = self.task.lock().await.take();
        let Some(task) = task else {
            return "task handle already released".to_string();
        };

        match task.await {
            Ok(Ok(())) => {
                self.set_state(TaskState::CompletedGracefully);
                "returned without signaling readiness".to_string()
            }
            Ok(Err(e)) => {
                self.set_state(TaskState::FailedDuringUnwind);
                e.to_string()
            }
            Err(e) => {
                self.set_state(if e.is_cancelled() {
                    TaskState::Cancelled
                } else {
                    TaskState::FailedDuringUnwind
                });
                e.to_string()
            }
        }
    }

    /// Stop the service: request stop, wait up to the grace period, abort
    /// on timeout. Always returns.
    pub async fn on_shutdown(&self) -> ShutdownOutcome {
        let name = self.service.name().to_string();
        info!(service = %name, "Stopping background service");

        let task = self.task.lock().await.take();
        let Some(task) = task else {
            info!(service = %name, "Background service task was not found or already completed");
            return ShutdownOutcome::NotRunning;
        };
        let mut task = AbortOnDrop(task);

        if !self.service.is_stopped() {
            self.service.request_stop().await;
        }
        self.set_state(TaskState::StopRequested);

        let outcome = match time::timeout(self.shutdown_grace, &mut task.0).await {
            Ok(joined) => classify(joined, FaultStage::GracePeriod),
            Err(_) => {
                warn!(
                    service = %name,
                    grace = %format_grace(self.shutdown_grace),
                    "Timeout waiting for background service task to complete. Cancelling."
                );
                task.0.abort();
                classify((&mut task.0).await, FaultStage::AfterCancel)
            }
        };

        match &outcome {
            ShutdownOutcome::Graceful => {
                info!(service = %name, "Background service task completed")
            }
            ShutdownOutcome::Cancelled => {
                info!(service = %name, "Background service task was cancelled")
            }
            ShutdownOutcome::Faulted { stage, detail } => error!(
                service = %name,
                stage = ?stage,
                detail = %detail,
                "Exception during background service task shutdown"
            ),
            ShutdownOutcome::NotRunning => {}
        }
        if let Some(state) = outcome.final_state() {
            self.set_state(state);
        }

        info!(
            service = %name,
            state = self.state().as_label(),
            "Background service shutdown process finished"
        );
        outcome
    }

    /// Synchronous last-resort teardown for callers that cannot await
    /// `on_shutdown()`, such as a drop guard. Aborts the held task without a
    /// grace period and schedules a stop request on the current runtime.
    /// Returns false when no task was held.
    pub fn abort_now(&self) -> bool {
        let task = match self.task.try_lock() {
            Ok(mut held) => held.take(),
            Err(_) => None,
        };
        let Some(task) = task else {
            return false;
        };

        task.abort();
        if !self.service.is_stopped() {
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                let service = Arc::clone(&self.service);
                runtime.spawn(async move { service.request_stop().await });
            }
        }
        if !self.state().is_terminal() {
            self.set_state(TaskState::Cancelled);
        }

        warn!(service = %self.service.name(), "Background service task aborted without a grace period");
        true
    }
}

fn classify(joined: Result<Result<(), ServiceError>, JoinError>, stage: FaultStage) -> ShutdownOutcome {
    match joined {
        Ok(Ok(())) => ShutdownOutcome::Graceful,
        Ok(Err(e)) => ShutdownOutcome::Faulted {
            stage,
            detail: e.to_string(),
        },
        Err(e) if e.is_cancelled() => ShutdownOutcome::Cancelled,
        Err(e) => ShutdownOutcome::Faulted {
            stage,
            detail: e.to_string(),
        },
    }
}
