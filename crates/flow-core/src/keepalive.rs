//! Background keep-alive task.
//!
//! The Flow 2 stops notifying unless it receives the activation command
//! periodically. While a session streams, [`KeepAlive`] re-sends it without
//! response every interval. A failed write means the link is gone: the task
//! clears the streaming flag and exits instead of retrying.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use btleplug::api::WriteType;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::transport::Link;

/// What the keep-alive task writes, where, and how often.
#[derive(Debug, Clone)]
pub(crate) struct Pulse {
    pub characteristic: Uuid,
    pub payload: Vec<u8>,
    pub interval: Duration,
}

/// Handle to a running keep-alive task.
///
/// Dropping the handle cancels the task without waiting for it.
pub(crate) struct KeepAlive {
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

impl KeepAlive {
    /// Spawn the keep-alive loop on the current tokio runtime.
    pub fn spawn<L>(link: Arc<L>, streaming: Arc<AtomicBool>, pulse: Pulse) -> Self
    where
        L: Link + ?Sized + 'static,
    {
        let cancel_token = CancellationToken::new();
        let task_token = cancel_token.clone();
        let handle = tokio::spawn(run(link, streaming, pulse, task_token));

        Self {
            handle,
            cancel_token,
        }
    }

    /// Cancel the task and wait until it has exited.
    pub async fn stop(&mut self) {
        self.cancel_token.cancel();
        if let Err(e) = (&mut self.handle).await
            && e.is_panic()
        {
            warn!("Keep-alive task panicked: {}", e);
        }
    }

    #[cfg(test)]
    fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

async fn run<L>(link: Arc<L>, streaming: Arc<AtomicBool>, pulse: Pulse, cancel: CancellationToken)
where
    L: Link + ?Sized,
{
    debug!(interval = ?pulse.interval, "Keep-alive started");

    loop {
        if cancel.is_cancelled() || !streaming.load(Ordering::SeqCst) {
            break;
        }

        if link.is_connected().await {
            let write = link.write(
                pulse.characteristic,
                &pulse.payload,
                WriteType::WithoutResponse,
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = write => match result {
                    Ok(()) => trace!("Keep-alive sent"),
                    Err(e) => {
                        warn!(error = %e, "Keep-alive write failed, stopping stream");
                        streaming.store(false, Ordering::SeqCst);
                        break;
                    }
                },
            }
        } else {
            debug!("Link reports disconnected, skipping keep-alive");
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = sleep(pulse.interval) => {}
        }
    }

    debug!("Keep-alive stopped");
}
