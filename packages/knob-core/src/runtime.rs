//! Handle to the background poll loop.
//!
//! The loop runs on the host's Tokio runtime. [`PollTask`] keeps the spawned
//! task together with the token that stops it, so the owner can stop the
//! loop and wait for the poll in flight to wind down.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A spawned poll loop.
#[derive(Debug)]
pub struct PollTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PollTask {
    /// Spawns `poll_loop` on the current runtime.
    ///
    /// `poll_loop` must return once `cancel` fires.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    pub fn spawn<F>(cancel: CancellationToken, poll_loop: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            cancel,
            handle: tokio::spawn(poll_loop),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Cancels the loop and waits up to `grace` for it to return.
    ///
    /// A loop still running after `grace` is aborted. Returns `true` only if
    /// the loop returned on its own.
    pub async fn stop(self, grace: Duration) -> bool {
        self.cancel.cancel();
        let abort = self.handle.abort_handle();
        match tokio::time::timeout(grace, self.handle).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                log::error!("[PollTask] Poll loop ended abnormally: {}", e);
                false
            }
            Err(_) => {
                log::warn!(
                    "[PollTask] Poll loop ignored cancellation for {:?}, aborting",
                    grace
                );
                abort.abort();
                false
            }
        }
    }
}
