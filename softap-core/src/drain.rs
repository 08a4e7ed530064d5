//! Background consumer of wpa_supplicant's unsolicited events.
//!
//! The supplicant queues events for every attached monitor; somebody has to
//! read them while the AP is up. The worker throws them away until it sees
//! `CTRL-EVENT-TERMINATING`, the connection closes, or it is cancelled.

use crate::traits::SupplicantControl;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const TERMINATING_EVENT: &str = "CTRL-EVENT-TERMINATING";

/// Why the worker stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainExit {
    Terminated,
    ConnectionClosed,
    Cancelled,
}

pub struct DrainWorker {
    handle: JoinHandle<DrainExit>,
    cancel: watch::Sender<bool>,
}

impl DrainWorker {
    pub fn spawn(control: Arc<dyn SupplicantControl>) -> Self {
        let (cancel, cancel_rx) = watch::channel(false);
        let handle = tokio::spawn(drain_events(control, cancel_rx));
        Self { handle, cancel }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits up to `timeout` for the worker to exit on its own, then cancels
    /// it. Problems are logged; the caller's teardown carries on regardless.
    pub async fn join(mut self, timeout: Duration) -> Option<DrainExit> {
        let waited = tokio::time::timeout(timeout, &mut self.handle).await;
        let joined = match waited {
            Ok(joined) => joined,
            Err(_) => {
                tracing::warn!(
                    "Event drain worker still running after {:?}, supplicant connection looks stuck; cancelling",
                    timeout
                );
                let _ = self.cancel.send(true);
                self.handle.await
            }
        };

        match joined {
            Ok(exit) => {
                tracing::debug!(?exit, "Event drain worker joined");
                Some(exit)
            }
            Err(e) => {
                tracing::error!("Failed to join event drain worker: {}", e);
                None
            }
        }
    }
}

async fn drain_events(control: Arc<dyn SupplicantControl>, mut cancel: watch::Receiver<bool>) -> DrainExit {
    tracing::debug!("Event drain worker: ENTER");
    let exit = loop {
        tokio::select! {
            _ = cancel.changed() => break DrainExit::Cancelled,
            event = control.wait_for_event() => match event {
                Ok(event) if event.starts_with(TERMINATING_EVENT) => break DrainExit::Terminated,
                Ok(event) => tracing::trace!("Dropping supplicant event: {}", event),
                Err(e) => {
                    tracing::debug!("Event wait returned: {}", e);
                    break DrainExit::ConnectionClosed;
                }
            },
        }
    };
    tracing::debug!(?exit, "Event drain worker: LEAVE");
    exit
}
