//! Graceful-shutdown coordination.
//!
//! Shutdown is level-triggered state, not an event: the proxy server,
//! the admin server and the sampler are spawned at different times, and
//! a task that starts watching after the signal has already fired must
//! still stop. A watch channel carries the flag so late watchers observe
//! the current state instead of missing a one-shot broadcast.

use tokio::sync::watch;

/// Process-wide shutdown flag. Long-running tasks take a [`Watcher`] and
/// park on it; triggering flips the flag for all of them at once.
pub struct Shutdown {
    state: watch::Sender<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self { state }
    }

    /// Hand out a watcher on the shutdown flag.
    pub fn subscribe(&self) -> Watcher {
        Watcher {
            state: self.state.subscribe(),
        }
    }

    /// Flip the flag. Idempotent; every watcher past and future observes
    /// the stop state.
    pub fn trigger(&self) {
        if self.state.send_replace(true) {
            return;
        }
        tracing::info!("Shutdown triggered");
    }

    pub fn is_triggered(&self) -> bool {
        *self.state.borrow()
    }

    /// Number of tasks still watching the flag.
    pub fn watcher_count(&self) -> usize {
        self.state.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// A task-side view of the shutdown flag.
#[derive(Debug, Clone)]
pub struct Watcher {
    state: watch::Receiver<bool>,
}

impl Watcher {
    /// Resolve once shutdown is triggered. Resolves immediately when the
    /// flag is already set, and treats a dropped [`Shutdown`] as a stop.
    pub async fn triggered(&mut self) {
        let _ = self.state.wait_for(|stop| *stop).await;
    }

    pub fn is_triggered(&self) -> bool {
        *self.state.borrow()
    }
}
