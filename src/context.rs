use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Overall deadline and cancellation of a run.
///
/// Only the top-level run holds a `RunContext`, so it is the only place able
/// to cancel. Everything else gets a [`RunSignal`], which can only observe.
#[derive(Debug)]
pub struct RunContext {
    token: CancellationToken,
}

impl RunContext {
    /// Start the clock: the returned context cancels itself once `time_limit`
    /// has elapsed.
    pub fn with_deadline(time_limit: Duration) -> Self {
        let token = CancellationToken::new();
        let deadline = Instant::now() + time_limit;

        let timer = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => timer.cancel(),
                _ = timer.cancelled() => {}
            }
        });

        Self { token }
    }

    pub fn signal(&self) -> RunSignal {
        RunSignal {
            token: self.token.clone(),
        }
    }

    /// Cancel the run on Ctrl-C, the same way the deadline does.
    pub fn cancel_on_ctrl_c(&self) {
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    if signal.is_ok() {
                        token.cancel();
                    }
                }
                _ = token.cancelled() => {}
            }
        });
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }
}

impl Drop for RunContext {
    fn drop(&mut self) {
        // Stops the deadline timer task.
        self.token.cancel();
    }
}

/// Read-only view of a [`RunContext`].
#[derive(Debug, Clone)]
pub struct RunSignal {
    token: CancellationToken,
}

impl RunSignal {
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Owned future resolving on cancellation, for `'static` stream adapters.
    pub fn cancelled_owned(&self) -> tokio_util::sync::WaitForCancellationFutureOwned {
        self.token.clone().cancelled_owned()
    }
}
