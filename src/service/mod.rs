// Background service contract
//
// A background service is a long-running task hosted next to the HTTP
// server. The supervisor only relies on the narrow surface below.

pub mod relay;
pub mod signal;

pub use relay::{DocumentRelay, Frame, Payload, Peer, RelayStats};
pub use signal::Latch;

use async_trait::async_trait;

use crate::errors::ServiceError;

/// Minimum interface a supervised service must provide.
#[async_trait]
pub trait BackgroundService: Send + Sync + 'static {
    /// Name used in log lines
    fn name(&self) -> &str;

    /// Run the service until stop is requested or the task is aborted.
    ///
    /// Implementations must set [`BackgroundService::readiness`] once they
    /// are safe to rely on.
    async fn start(&self) -> Result<(), ServiceError>;

    /// Readiness signal, set at most once
    fn readiness(&self) -> &Latch;

    /// Ask the service to end itself. Safe to call in any state, any number
    /// of times.
    async fn request_stop(&self);

    /// True once a stop has been requested or the service has completed
    fn is_stopped(&self) -> bool;
}
