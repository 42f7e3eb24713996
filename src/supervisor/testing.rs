// Scripted background service for supervisor tests

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::errors::ServiceError;
use crate::service::{BackgroundService, Latch};

/// How the scripted service behaves once started
#[derive(Debug, Clone, Copy)]
pub(crate) enum Script {
    /// Honors stop requests, finishing `after` the request
    StopsOnRequest { after: Duration },
    /// Never finishes by itself
    IgnoresStop,
    /// Never finishes, and panics while being torn down
    PanicsOnCancel,
    /// Returns an error when asked to stop
    FailsOnStop,
    /// Panics when asked to stop
    PanicsOnStop,
    /// Fails before signaling readiness
    ExitsBeforeReady,
}

struct PanicOnDrop;

impl Drop for PanicOnDrop {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            panic!("cleanup exploded");
        }
    }
}

/// Sets the latch when `start()` ends, however it ends
struct FinishedGuard(Latch);

impl Drop for FinishedGuard {
    fn drop(&mut self) {
        self.0.set();
    }
}

pub(crate) struct ScriptedService {
    script: Script,
    ready_after: Duration,
    ready: Latch,
    stop: Latch,
    finished: Latch,
    stop_requests: AtomicUsize,
}

impl ScriptedService {
    pub(crate) fn new(script: Script) -> Self {
        Self {
            script,
            ready_after: Duration::ZERO,
            ready: Latch::new(),
            stop: Latch::new(),
            finished: Latch::new(),
            stop_requests: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_ready_after(mut self, delay: Duration) -> Self {
        self.ready_after = delay;
        self
    }

    /// Set once the body of `start()` has ended or been dropped
    pub(crate) fn finished(&self) -> &Latch {
        &self.finished
    }

    pub(crate) fn stop_requests(&self) -> usize {
        self.stop_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackgroundService for ScriptedService {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn start(&self) -> Result<(), ServiceError> {
        let _finished = FinishedGuard(self.finished.clone());
        if let Script::ExitsBeforeReady = self.script {
            return Err(ServiceError::Failed("boom".to_string()));
        }

        if !self.ready_after.is_zero() {
            tokio::time::sleep(self.ready_after).await;
        }
        self.ready.set();

        match self.script {
            Script::StopsOnRequest { after } => {
                self.stop.wait().await;
                tokio::time::sleep(after).await;
                Ok(())
            }
            Script::IgnoresStop => {
                std::future::pending::<()>().await;
                Ok(())
            }
            Script::PanicsOnCancel => {
                let _guard = PanicOnDrop;
                std::future::pending::<()>().await;
                Ok(())
            }
            Script::FailsOnStop => {
                self.stop.wait().await;
                Err(ServiceError::Failed("flush failed".to_string()))
            }
            Script::PanicsOnStop => {
                self.stop.wait().await;
                panic!("flush panicked");
            }
            Script::ExitsBeforeReady => unreachable!(),
        }
    }

    fn readiness(&self) -> &Latch {
        &self.ready
    }

    async fn request_stop(&self) {
        self.stop_requests.fetch_add(1, Ordering::SeqCst);
        self.stop.set();
    }

    fn is_stopped(&self) -> bool {
        self.stop.is_set()
    }
}
