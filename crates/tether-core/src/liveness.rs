use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::PluginError;

/// One-shot signal that fires when the plugin process or its connection is gone.
///
/// Cloning shares the signal. Firing more than once is a no-op.
#[derive(Debug, Clone, Default)]
pub struct Liveness {
    token: CancellationToken,
    fired: Arc<AtomicBool>,
}

impl Liveness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal. Returns `true` only for the call that fired it.
    pub fn fire(&self) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        debug!(target: "tether.liveness", "plugin liveness lost");
        self.token.cancel();
        true
    }

    pub fn is_fired(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn fired(&self) {
        self.token.cancelled().await
    }
}

/// Caller cancellation joined with plugin liveness.
///
/// Resolves when either side fires. When both have fired, liveness wins:
/// an operation that was cancelled *because* the plugin died reports
/// [`PluginError::Shutdown`].
#[derive(Debug, Clone)]
pub struct Joined {
    caller: CancellationToken,
    liveness: Liveness,
}

impl Joined {
    pub fn new(caller: &CancellationToken, liveness: &Liveness) -> Self {
        Self {
            caller: caller.clone(),
            liveness: liveness.clone(),
        }
    }

    pub fn caller(&self) -> &CancellationToken {
        &self.caller
    }

    pub fn liveness(&self) -> &Liveness {
        &self.liveness
    }

    pub fn is_cancelled(&self) -> bool {
        self.liveness.is_fired() || self.caller.is_cancelled()
    }

    pub async fn cancelled(&self) {
        tokio::select! {
            _ = self.caller.cancelled() => {}
            _ = self.liveness.fired() => {}
        }
    }

    /// Error describing why the joined signal fired, or `None` if it has not.
    pub fn reason(&self) -> Option<PluginError> {
        if self.liveness.is_fired() {
            Some(PluginError::Shutdown)
        } else if self.caller.is_cancelled() {
            Some(PluginError::Cancelled)
        } else {
            None
        }
    }
}
