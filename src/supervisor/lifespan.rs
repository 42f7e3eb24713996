// Scoped startup/teardown around the host application
//
// Startup must finish before the application future is first polled, and
// teardown runs on every exit path: normal return, error, panic, or a failed
// startup.

use futures::FutureExt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error, warn};

use super::ServiceSupervisor;
use crate::service::BackgroundService;

/// Aborts the service if the lifespan future is dropped before teardown
/// has run, e.g. when the caller times out or cancels the host future.
struct TeardownGuard<'a, S: BackgroundService> {
    supervisor: &'a ServiceSupervisor<S>,
    armed: bool,
}

impl<S: BackgroundService> Drop for TeardownGuard<'_, S> {
    fn drop(&mut self) {
        if self.armed && self.supervisor.abort_now() {
            warn!(
                service = %self.supervisor.service().name(),
                "Lifespan dropped before teardown, background service aborted"
            );
        }
    }
}

/// Run `app` between `on_startup()` and `on_shutdown()`.
///
/// `app` is not polled until the service has signaled readiness. Panics in
/// `app` are resumed after teardown has completed. If the returned future is
/// dropped early, the service task is aborted instead of being left running.
pub async fn lifespan<S, F, T>(supervisor: &ServiceSupervisor<S>, app: F) -> anyhow::Result<T>
where
    S: BackgroundService,
    F: Future<Output = anyhow::Result<T>>,
{
    let mut guard = TeardownGuard {
        supervisor,
        armed: true,
    };

    if let Err(e) = supervisor.on_startup().await {
        error!(error = %e, "Background service failed to start");
        let outcome = supervisor.on_shutdown().await;
        guard.armed = false;
        debug!(?outcome, "Teardown after failed startup finished");
        return Err(e.into());
    }

    let result = AssertUnwindSafe(app).catch_unwind().await;

    let outcome = supervisor.on_shutdown().await;
    guard.armed = false;
    debug!(
        ?outcome,
        terminal = supervisor.state().is_terminal(),
        "Lifespan teardown finished"
    );

    match result {
        Ok(result) => result,
        Err(payload) => panic::resume_unwind(payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use crate::service::DocumentRelay;
    use crate::supervisor::testing::{Script, ScriptedService};
    use crate::supervisor::{TaskState, DEFAULT_SHUTDOWN_GRACE};
    use std::sync::Arc;
    use std::time::Duration;

    fn slow_starter() -> (Arc<ScriptedService>, Arc<ServiceSupervisor<ScriptedService>>) {
        let service = Arc::new(
            ScriptedService::new(Script::StopsOnRequest { after: Duration::ZERO })
                .with_ready_after(Duration::from_secs(3)),
        );
        let supervisor = Arc::new(ServiceSupervisor::new(
            Arc::clone(&service),
            DEFAULT_SHUTDOWN_GRACE,
        ));
        (service, supervisor)
    }

    #[tokio::test(start_paused = true)]
    async fn test_app_runs_only_after_readiness() {
        let (service, supervisor) = slow_starter();
        let observer = Arc::clone(&service);

        let ready_when_app_ran = lifespan(&*supervisor, async move {
            Ok(observer.readiness().is_set())
        })
        .await
        .unwrap();

        assert!(ready_when_app_ran);
        assert_eq!(supervisor.state(), TaskState::CompletedGracefully);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_runs_when_app_fails() {
        let (service, supervisor) = slow_starter();

        let result: anyhow::Result<()> =
            lifespan(&*supervisor, async { anyhow::bail!("handler exploded") }).await;

        assert!(result.unwrap_err().to_string().contains("handler exploded"));
        assert!(service.is_stopped());
        assert_eq!(supervisor.state(), TaskState::CompletedGracefully);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_runs_when_app_panics() {
        let (service, supervisor) = slow_starter();

        let task_supervisor = Arc::clone(&supervisor);
        let observer = Arc::clone(&supervisor);
        let joined = tokio::spawn(async move {
            lifespan(&*task_supervisor, async move {
                if observer.state() == TaskState::Running {
                    panic!("request handler panicked");
                }
                Ok(())
            })
            .await
        })
        .await;

        assert!(joined.unwrap_err().is_panic());
        assert!(service.is_stopped());
        assert_eq!(supervisor.state(), TaskState::CompletedGracefully);
    }

    #[tokio::test]
    async fn test_failed_startup_skips_app() {
        let service = Arc::new(ScriptedService::new(Script::ExitsBeforeReady));
        let supervisor = ServiceSupervisor::new(service, DEFAULT_SHUTDOWN_GRACE);

        let result: anyhow::Result<()> = lifespan(&supervisor, async {
            Err(anyhow::anyhow!("app must not run"))
        })
        .await;

        let err = result.unwrap_err().to_string();
        assert!(err.contains("exited before becoming ready"), "{}", err);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_lifespan_aborts_service() {
        let service = Arc::new(ScriptedService::new(Script::IgnoresStop));
        let supervisor = ServiceSupervisor::new(Arc::clone(&service), DEFAULT_SHUTDOWN_GRACE);

        let dropped = tokio::time::timeout(
            Duration::from_millis(100),
            lifespan(&supervisor, std::future::pending::<anyhow::Result<()>>()),
        )
        .await;
        assert!(dropped.is_err());

        tokio::time::timeout(Duration::from_secs(1), service.finished().wait())
            .await
            .expect("service task must not outlive the lifespan");
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(supervisor.state().is_terminal());
        assert!(service.is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_stops_when_lifespan_dropped() {
        let relay = Arc::new(DocumentRelay::new(RelayConfig::default()));
        let supervisor = ServiceSupervisor::new(Arc::clone(&relay), DEFAULT_SHUTDOWN_GRACE);

        let dropped = tokio::time::timeout(
            Duration::from_millis(100),
            lifespan(&supervisor, std::future::pending::<anyhow::Result<()>>()),
        )
        .await;
        assert!(dropped.is_err());
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(!relay.is_running());
        assert!(relay.join("doc").is_err());
        assert_eq!(supervisor.state(), TaskState::Cancelled);
    }
}
