use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// A cancellable sleep used by every polling loop in the engine.
///
/// Cloning shares the cancellation token, so one token can stop a
/// stability watch, the per-file settle checks and the continuous loop
/// together.
#[derive(Debug, Clone, Default)]
pub struct Ticker {
    cancel: CancellationToken,
}

impl Ticker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Sleeps for `period`. Returns `false` if cancellation arrived
    /// before the period elapsed.
    pub async fn wait(&self, period: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(period) => true,
            _ = self.cancel.cancelled() => false,
        }
    }
}
