//! Background status poller
//!
//! Periodically refreshes job status through the driver while a job is
//! running. The poller holds only a weak reference to its target so it never
//! keeps a dropped driver alive, and it exits on its own once the target
//! reports that the link is gone.

use resinkit_core::Result;
use std::io;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Weak;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// What the poller drives
pub trait PollTarget: Send + Sync {
    /// The poller exits once this turns false
    fn is_connected(&self) -> bool;

    /// Whether the current state warrants a refresh
    fn should_poll(&self) -> bool;

    /// Refresh status; errors are logged by the poller and never stop it
    fn poll(&self) -> Result<()>;
}

/// Poller timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Delay between polls
    pub interval: Duration,
    /// Delay after a failed poll
    pub error_backoff: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            error_backoff: Duration::from_secs(5),
        }
    }
}

/// Handle to a running poller thread
pub struct StatusPoller {
    stop_tx: Sender<()>,
    done_rx: Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl StatusPoller {
    /// Spawn the poller thread
    pub fn spawn<T>(target: Weak<T>, config: PollerConfig) -> io::Result<Self>
    where
        T: PollTarget + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();

        let handle = thread::Builder::new()
            .name("status-poller".to_string())
            .spawn(move || {
                poll_loop(target, config, stop_rx);
                // Dropping the sender on unwind also wakes a waiting `stop`.
                let _ = done_tx.send(());
            })?;

        tracing::debug!(
            "Status poller started (interval {:?}, backoff {:?})",
            config.interval,
            config.error_backoff
        );

        Ok(Self {
            stop_tx,
            done_rx,
            handle: Some(handle),
        })
    }

    /// Whether the thread is still running
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Signal the poller to stop and wait at most `timeout` for it.
    ///
    /// Returns false if the thread did not exit in time; it is then
    /// detached and finishes its current poll on its own.
    pub fn stop(mut self, timeout: Duration) -> bool {
        let _ = self.stop_tx.send(());

        match self.done_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.handle.take() {
                    if handle.join().is_err() {
                        tracing::error!("Status poller panicked");
                    }
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
        }
    }
}

fn poll_loop<T: PollTarget>(target: Weak<T>, config: PollerConfig, stop_rx: Receiver<()>) {
    let mut delay = config.interval;

    loop {
        match stop_rx.recv_timeout(delay) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        let Some(target) = target.upgrade() else {
            break;
        };
        if !target.is_connected() {
            break;
        }

        delay = config.interval;
        if target.should_poll() {
            if let Err(e) = target.poll() {
                tracing::warn!("Status poll failed: {}", e);
                delay = config.error_backoff;
            }
        }
    }

    tracing::debug!("Status poller stopped");
}
