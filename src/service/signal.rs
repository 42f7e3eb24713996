// One-shot notification primitive
//
// A `Latch` starts unset, can be set exactly once, and never resets.
// Any number of tasks may wait on it; waiters that arrive after it was set
// resolve immediately.

use std::sync::Arc;
use tokio::sync::watch;

/// Write-once, many-reader flag.
#[derive(Debug, Clone)]
pub struct Latch {
    tx: Arc<watch::Sender<bool>>,
}

impl Latch {
    /// Create an unset latch
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Set the latch.
    ///
    /// Returns `true` only for the call that actually flipped it.
    pub fn set(&self) -> bool {
        self.tx.send_if_modified(|value| {
            if *value {
                false
            } else {
                *value = true;
                true
            }
        })
    }

    /// Check whether the latch has been set
    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the latch is set
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|value| *value).await;
    }
}

impl Default for Latch {
    fn default() -> Self {
        Self::new()
    }
}
