//! Caller-side handle to a spawned sweep worker.

use super::events::RunReport;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Owns the worker task and its cancellation flag.
///
/// Dropping the handle does not stop the run; use [`SweepHandle::shutdown`]
/// when the application is exiting so the supply output is turned off first.
#[derive(Debug)]
pub struct SweepHandle {
    cancel: CancellationToken,
    task: JoinHandle<RunReport>,
}

impl SweepHandle {
    pub(super) fn new(cancel: CancellationToken, task: JoinHandle<RunReport>) -> Self {
        Self { cancel, task }
    }

    /// Request a stop at the next point boundary. Returns immediately.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Clone of the flag, e.g. for a Ctrl-C listener.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the run to reach a terminal state.
    pub async fn join(self) -> Result<RunReport, JoinError> {
        self.task.await
    }

    /// Cancel, then wait until teardown has finished.
    pub async fn shutdown(self) -> Result<RunReport, JoinError> {
        info!("Shutdown requested, waiting for the sweep to finalize");
        self.cancel.cancel();
        self.task.await
    }
}
