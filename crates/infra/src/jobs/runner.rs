//! A single in-flight archiver run: cancellation signal plus exit signal.

use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::types::{JobError, RunId};

/// Handle to the active run, held by the supervisor.
#[derive(Debug)]
pub(crate) struct RunInstance {
    pub(crate) id: RunId,
    cancel: CancellationToken,
    exited: watch::Receiver<bool>,
}

/// Held by the running task; fires the exit signal when dropped, including
/// when the run unwinds.
#[derive(Debug)]
pub(crate) struct ExitSignal(watch::Sender<bool>);

impl Drop for ExitSignal {
    fn drop(&mut self) {
        self.0.send_replace(true);
    }
}

impl RunInstance {
    pub(crate) fn new() -> (Self, ExitSignal) {
        let (tx, rx) = watch::channel(false);
        let instance = Self {
            id: RunId::new(),
            cancel: CancellationToken::new(),
            exited: rx,
        };
        (instance, ExitSignal(tx))
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel the run and wait up to `timeout` for it to exit.
    ///
    /// On timeout the run keeps finishing in the background.
    pub(crate) async fn stop(mut self, timeout: Duration) -> Result<(), JobError> {
        self.cancel.cancel();
        // A closed channel also means the sender is gone.
        let exited = tokio::time::timeout(timeout, self.exited.wait_for(|exited| *exited))
            .await
            .is_ok();
        if exited {
            Ok(())
        } else {
            Err(JobError::StopTimeout(timeout))
        }
    }
}
