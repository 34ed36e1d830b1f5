//! Background lease reaper
//!
//! A thread that runs an expiry pass every interval until either its
//! owner is dropped or the pass reports that the store is gone.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, RecvTimeoutError, Sender};

/// Handle to the reaper thread; dropping it stops the thread
///
/// Drop never joins: the last store handle may be released from the
/// reaper thread itself.
pub struct Reaper {
    _shutdown: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Reaper {
    /// Spawn a thread calling `pass` every `interval`
    ///
    /// `pass` returns `false` to stop the thread.
    pub fn spawn<F>(interval: Duration, mut pass: F) -> std::io::Result<Self>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let (shutdown, signal) = channel::bounded::<()>(0);

        let handle = thread::Builder::new()
            .name("lease-reaper".to_string())
            .spawn(move || loop {
                match signal.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if !pass() {
                            break;
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        tracing::debug!("Lease reaper started (interval {:?})", interval);

        Ok(Self {
            _shutdown: shutdown,
            handle: Some(handle),
        })
    }

    /// Whether the reaper thread is still running
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}
