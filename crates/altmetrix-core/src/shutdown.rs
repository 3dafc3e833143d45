//! Cancellable pauses.
//!
//! Backoff and pacing waits race against an explicit [`ShutdownSignal`]
//! handed to the fetcher. Without a signal a pause is a plain timed sleep.

use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

use crate::error::ProviderError;

/// Sending half, owned by whoever decides the process is stopping.
#[derive(Debug)]
pub struct ShutdownHandle {
    sender: watch::Sender<bool>,
}

/// Receiving half, cloned into every fetcher.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

/// Create a connected handle/signal pair.
///
/// Dropping the handle without calling [`ShutdownHandle::shutdown`] leaves
/// every signal un-triggered for good.
pub fn channel() -> (ShutdownHandle, ShutdownSignal) {
    let (sender, receiver) = watch::channel(false);
    (ShutdownHandle { sender }, ShutdownSignal { receiver })
}

impl ShutdownHandle {
    /// Request shutdown; every pending and future pause returns early.
    pub fn shutdown(&self) {
        self.sender.send_replace(true);
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            receiver: self.sender.subscribe(),
        }
    }
}

impl ShutdownSignal {
    pub fn is_shutdown(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once shutdown is requested. Never resolves if the handle
    /// was dropped before requesting it.
    pub async fn cancelled(&mut self) {
        if self.receiver.wait_for(|stopping| *stopping).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Sleep for `duration`, returning early with an `Interrupted` error if the
/// signal fires first.
pub async fn pause(duration: Duration, signal: Option<&ShutdownSignal>) -> Result<(), ProviderError> {
    if duration.is_zero() {
        return Ok(());
    }

    let Some(signal) = signal else {
        tokio::time::sleep(duration).await;
        return Ok(());
    };

    if signal.is_shutdown() {
        return Err(ProviderError::interrupted());
    }

    let mut signal = signal.clone();
    tokio::select! {
        () = tokio::time::sleep(duration) => Ok(()),
        () = signal.cancelled() => {
            debug!(pause_ms = duration.as_millis() as u64, "pause interrupted by shutdown");
            Err(ProviderError::interrupted())
        }
    }
}
